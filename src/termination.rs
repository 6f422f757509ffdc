//! Termination marker and turn budget

use serde::{Deserialize, Serialize};

use crate::error::{MootError, Result};

/// Per-conversation stop rules, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnPolicy {
    marker: Option<String>,
    max_turns: usize,
}

impl TurnPolicy {
    /// Budget-only policy
    pub fn new(max_turns: usize) -> Self {
        Self {
            marker: None,
            max_turns,
        }
    }

    /// Stop as soon as a message mentions `marker`
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Returns the marker if `text` contains it
    pub fn matches(&self, text: &str) -> Option<&str> {
        self.marker.as_deref().filter(|m| text.contains(m))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if matches!(self.marker.as_deref(), Some("")) {
            return Err(MootError::Setup(
                "termination marker must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Why a conversation loop ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// A message mentioned the marker
    Terminated { marker: String },
    /// The turn budget ran out first
    Exhausted { max_turns: usize },
}

impl StopReason {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StopReason::Terminated { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_match() {
        let policy = TurnPolicy::new(4).with_marker("APPROVE");
        assert_eq!(policy.matches("draft... READY"), None);
        assert_eq!(policy.matches("ok, APPROVE"), Some("APPROVE"));
        assert_eq!(policy.matches("approve"), None);
    }

    #[test]
    fn test_budget_only_policy_never_matches() {
        let policy = TurnPolicy::new(1);
        assert!(policy.marker().is_none());
        assert_eq!(policy.matches("APPROVE"), None);
        assert_eq!(policy.max_turns(), 1);
    }

    #[test]
    fn test_empty_marker_rejected() {
        assert!(TurnPolicy::new(3).with_marker("").validate().is_err());
        assert!(TurnPolicy::new(3).with_marker("OK").validate().is_ok());
    }

    #[test]
    fn test_stop_reason() {
        assert!(StopReason::Terminated { marker: "OK".into() }.is_terminal());
        assert!(!StopReason::Exhausted { max_turns: 3 }.is_terminal());
    }
}
