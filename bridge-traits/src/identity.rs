//! Principal Resolution
//!
//! Audit stamping records *who* performed a write. The core never reads the
//! process identity itself; it asks an injected [`PrincipalResolver`].

/// Resolves the identifier of the principal performing the current operation.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::identity::{PrincipalResolver, StaticPrincipal};
///
/// let principal = StaticPrincipal::new("alice");
/// assert_eq!(principal.current_principal_id(), "alice");
/// ```
pub trait PrincipalResolver: Send + Sync {
    /// Identifier written into `created_by` / `updated_by`
    fn current_principal_id(&self) -> String;
}

/// Resolves the operating-system account running the process.
///
/// Reads `USER` (Unix) or `USERNAME` (Windows), optionally prefixed with the
/// `USERDOMAIN` the way Windows account names are usually displayed. Falls back
/// to `"unknown"` when neither variable is present.
#[derive(Debug, Clone, Default)]
pub struct ProcessPrincipal;

impl PrincipalResolver for ProcessPrincipal {
    fn current_principal_id(&self) -> String {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok()
            .filter(|name| !name.trim().is_empty());

        match (std::env::var("USERDOMAIN").ok(), user) {
            (Some(domain), Some(user)) if !domain.trim().is_empty() => {
                format!("{}\\{}", domain, user)
            }
            (_, Some(user)) => user,
            (_, None) => "unknown".to_string(),
        }
    }
}

/// Fixed principal, used by tests and by hosts that authenticate users themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPrincipal {
    id: String,
}

impl StaticPrincipal {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl PrincipalResolver for StaticPrincipal {
    fn current_principal_id(&self) -> String {
        self.id.clone()
    }
}
