/// Normalized search box input.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchQuery {
    terms: Vec<String>,
}

impl SearchQuery {
    pub fn new(raw: &str) -> Self {
        Self {
            terms: raw
                .split_whitespace()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Canonical form: lowercase terms joined by single spaces.
    pub fn normalized(&self) -> String {
        self.terms.join(" ")
    }

    /// Every term must appear somewhere in `text`, case-insensitively.
    pub fn matches(&self, text: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        let haystack = text.to_lowercase();
        self.terms.iter().all(|t| haystack.contains(t.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_whitespace_and_case() {
        let q = SearchQuery::new("  Battery   HEALTH\t");
        assert_eq!(q.normalized(), "battery health");
        assert!(!q.is_empty());
        assert!(SearchQuery::new("   ").is_empty());
    }

    #[test]
    fn all_terms_must_match() {
        let q = SearchQuery::new("health batt");
        assert!(q.matches("Battery Health Check"));
        assert!(!q.matches("Battery temperature"));
        assert!(SearchQuery::new("").matches("anything"));
    }
}
