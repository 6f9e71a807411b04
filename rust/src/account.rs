//! Account linking as seen by the sign-in dialog.
//!
//! The linking service decides; this module only classifies the answer into
//! something the dialog can present. Nothing here is fatal: every failure is
//! recoverable by re-running the action.

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("link service unreachable: {0}")]
    Unreachable(String),
    #[error("unexpected link failure: {0}")]
    Unexpected(String),
}

pub trait AccountLinker {
    /// `Ok(true)` linked, `Ok(false)` refused by the service.
    fn link(&self, token: &str) -> Result<bool, LinkError>;
}

/// Crash/diagnostics reporting collaborator.
pub trait DiagnosticsSink {
    fn record_error(&self, context: &str, message: &str);
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum LinkErrorKind {
    Canceled,
    Rejected,
    Failed,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct LinkAccountResult {
    pub ok: bool,
    pub error_kind: Option<LinkErrorKind>,
    /// Short user-facing notice. `None` on success.
    pub notice: Option<String>,
}

impl LinkAccountResult {
    fn linked() -> Self {
        Self {
            ok: true,
            error_kind: None,
            notice: None,
        }
    }

    fn failed(kind: LinkErrorKind, notice: &str) -> Self {
        Self {
            ok: false,
            error_kind: Some(kind),
            notice: Some(notice.to_string()),
        }
    }
}

pub(crate) fn link_account<L, D>(
    linker: &L,
    diagnostics: &D,
    token: Option<&str>,
) -> LinkAccountResult
where
    L: AccountLinker + ?Sized,
    D: DiagnosticsSink + ?Sized,
{
    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        tracing::info!("sign-in canceled before link");
        return LinkAccountResult::failed(LinkErrorKind::Canceled, "Sign-in canceled");
    };

    match linker.link(token) {
        Ok(true) => {
            tracing::info!("account linked");
            LinkAccountResult::linked()
        }
        Ok(false) => {
            tracing::warn!("account link rejected");
            LinkAccountResult::failed(LinkErrorKind::Rejected, "Could not link account")
        }
        Err(e) => {
            tracing::error!(error = %e, "account link failed");
            diagnostics.record_error("link_account", &e.to_string());
            LinkAccountResult::failed(LinkErrorKind::Failed, "Something went wrong, try again")
        }
    }
}
