use crate::logging::log_poll_failure;
use crate::wire::DecodeWarning;

use super::transport::PollError;

/// Pluggable reaction to failed polls and decode warnings.
pub trait FailureHandler {
    fn on_failure(&mut self, session: &str, err: &PollError);
    fn on_success(&mut self) {}
    fn on_warning(&mut self, _warning: &DecodeWarning) {}
    /// Status line to show the user, if any.
    fn status(&self) -> Option<String> {
        None
    }
}

/// Default handler: logs each failure, keeps the last one for the status line,
/// and escalates to error level once `threshold` polls in a row have failed.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    pub consecutive: u32,
    pub threshold: u32,
    pub last_error: Option<String>,
    pub warnings: u64,
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive: 0,
            threshold,
            last_error: None,
            warnings: 0,
        }
    }

    pub fn escalated(&self) -> bool {
        self.consecutive >= self.threshold
    }
}

impl FailureHandler for FailureTracker {
    fn on_failure(&mut self, session: &str, err: &PollError) {
        self.consecutive += 1;
        self.last_error = Some(err.to_string());
        log_poll_failure(session, &err.to_string(), self.consecutive, self.escalated());
    }

    fn on_success(&mut self) {
        self.consecutive = 0;
        self.last_error = None;
    }

    fn on_warning(&mut self, _warning: &DecodeWarning) {
        self.warnings += 1;
    }

    fn status(&self) -> Option<String> {
        let err = self.last_error.as_ref()?;
        Some(format!("poll failed ({}x): {}", self.consecutive, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_on_threshold() {
        let mut t = FailureTracker::new(3);
        t.on_failure("s", &PollError::Sentinel);
        t.on_failure("s", &PollError::Status(500));
        assert!(!t.escalated());
        t.on_failure("s", &PollError::Sentinel);
        assert!(t.escalated());
        assert_eq!(
            t.status().as_deref(),
            Some("poll failed (3x): server reported failure")
        );
    }

    #[test]
    fn resets_on_success() {
        let mut t = FailureTracker::new(2);
        t.on_failure("s", &PollError::Sentinel);
        t.on_failure("s", &PollError::Sentinel);
        assert!(t.escalated());
        t.on_success();
        assert!(!t.escalated());
        assert!(t.status().is_none());
    }
}
