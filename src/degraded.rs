/// Degraded collaborator calls
///
/// Ledger, content-store and mail failures never fail a user request. They
/// surface as a `Degraded` value that is logged, counted and then folded into
/// the workflow's outcome.
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degraded {
    pub service: &'static str,
    pub operation: &'static str,
    pub reason: String,
}

impl Degraded {
    pub fn new(service: &'static str, operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            service,
            operation,
            reason: reason.into(),
        }
    }

    /// Collaborator not configured for this deployment
    pub fn disabled(service: &'static str, operation: &'static str) -> Self {
        Self::new(service, operation, "not configured")
    }

    pub fn is_disabled(&self) -> bool {
        self.reason == "not configured"
    }

    /// Emit a warning and bump the degraded-call counter
    pub fn log(&self) {
        if self.is_disabled() {
            tracing::debug!("{} {} skipped: not configured", self.service, self.operation);
        } else {
            tracing::warn!(
                service = self.service,
                operation = self.operation,
                "Collaborator call degraded: {}",
                self.reason
            );
        }
        crate::metrics::record_degraded(self.service, self.operation);
    }
}

impl fmt::Display for Degraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} failed: {}", self.service, self.operation, self.reason)
    }
}

impl std::error::Error for Degraded {}

/// Log a degraded result and keep only the success value
pub fn tolerate<T>(result: Result<T, Degraded>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(degraded) => {
            degraded.log();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerate_drops_errors() {
        assert_eq!(tolerate::<u32>(Ok(7)), Some(7));
        assert_eq!(
            tolerate::<u32>(Err(Degraded::new("ledger", "attest", "timeout"))),
            None
        );
    }

    #[test]
    fn test_display() {
        let d = Degraded::new("content", "pin", "HTTP 500");
        assert_eq!(d.to_string(), "content pin failed: HTTP 500");
        assert!(!d.is_disabled());
        assert!(Degraded::disabled("ledger", "register").is_disabled());
    }
}
