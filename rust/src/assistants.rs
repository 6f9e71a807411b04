//! "Ask an AI assistant" chooser.

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct AssistantEntry {
    pub name: String,
    pub package_id: String,
    pub web_url: String,
}

impl AssistantEntry {
    fn new(name: &str, package_id: &str, web_url: &str) -> Self {
        Self {
            name: name.to_string(),
            package_id: package_id.to_string(),
            web_url: web_url.to_string(),
        }
    }
}

/// Assistants offered, in display order. The first entry doubles as the web
/// fallback when nothing is installed.
pub fn default_catalog() -> Vec<AssistantEntry> {
    vec![
        AssistantEntry::new("ChatGPT", "com.openai.chatgpt", "https://chatgpt.com"),
        AssistantEntry::new(
            "Gemini",
            "com.google.android.apps.bard",
            "https://gemini.google.com",
        ),
        AssistantEntry::new("Claude", "com.anthropic.claude", "https://claude.ai"),
        AssistantEntry::new(
            "Copilot",
            "com.microsoft.copilot",
            "https://copilot.microsoft.com",
        ),
        AssistantEntry::new("Perplexity", "ai.perplexity.app.android", "https://perplexity.ai"),
    ]
}

/// Host package manager lookup.
pub trait PackageQuery {
    fn is_installed(&self, package_id: &str) -> bool;
}

/// Host external-link launcher. Fire-and-forget.
pub trait LinkLauncher {
    fn open_url(&self, url: &str);
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum AssistantChoice {
    /// At least one assistant is installed; let the user pick.
    Pick { entries: Vec<AssistantEntry> },
    /// Nothing installed; the web fallback was opened.
    OpenedWeb { url: String },
    /// Nothing installed and no fallback configured.
    Unavailable,
}

pub fn available<Q>(catalog: &[AssistantEntry], query: &Q) -> Vec<AssistantEntry>
where
    Q: PackageQuery + ?Sized,
{
    catalog
        .iter()
        .filter(|entry| query.is_installed(&entry.package_id))
        .cloned()
        .collect()
}

pub fn choose<Q, L>(catalog: &[AssistantEntry], query: &Q, launcher: &L) -> AssistantChoice
where
    Q: PackageQuery + ?Sized,
    L: LinkLauncher + ?Sized,
{
    let entries = available(catalog, query);
    if !entries.is_empty() {
        return AssistantChoice::Pick { entries };
    }
    match catalog.first() {
        Some(fallback) => {
            tracing::debug!(url = %fallback.web_url, "no assistant installed, opening web");
            launcher.open_url(&fallback.web_url);
            AssistantChoice::OpenedWeb {
                url: fallback.web_url.clone(),
            }
        }
        None => AssistantChoice::Unavailable,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashSet;

    use super::*;

    struct Installed(HashSet<&'static str>);

    impl PackageQuery for Installed {
        fn is_installed(&self, package_id: &str) -> bool {
            self.0.contains(package_id)
        }
    }

    #[derive(Default)]
    struct RecordingLauncher(RefCell<Vec<String>>);

    impl LinkLauncher for RecordingLauncher {
        fn open_url(&self, url: &str) {
            self.0.borrow_mut().push(url.to_string());
        }
    }

    #[test]
    fn available_keeps_catalog_order() {
        let installed = Installed(HashSet::from(["com.anthropic.claude", "com.openai.chatgpt"]));
        let names: Vec<_> = available(&default_catalog(), &installed)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["ChatGPT", "Claude"]);
    }

    #[test]
    fn choose_offers_installed_without_launching() {
        let installed = Installed(HashSet::from(["com.microsoft.copilot"]));
        let launcher = RecordingLauncher::default();
        let choice = choose(&default_catalog(), &installed, &launcher);
        assert!(matches!(choice, AssistantChoice::Pick { ref entries } if entries.len() == 1));
        assert!(launcher.0.borrow().is_empty());
    }

    #[test]
    fn choose_falls_back_to_web() {
        let launcher = RecordingLauncher::default();
        let choice = choose(&default_catalog(), &Installed(HashSet::new()), &launcher);
        assert_eq!(
            choice,
            AssistantChoice::OpenedWeb {
                url: "https://chatgpt.com".to_string()
            }
        );
        assert_eq!(*launcher.0.borrow(), vec!["https://chatgpt.com".to_string()]);
    }

    #[test]
    fn empty_catalog_is_unavailable() {
        let launcher = RecordingLauncher::default();
        let choice = choose(&[], &Installed(HashSet::new()), &launcher);
        assert_eq!(choice, AssistantChoice::Unavailable);
    }
}
