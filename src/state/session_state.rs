/// Session state definitions for the per-unit setup sequence
///
/// The setup phases run strictly in order. A degraded phase is stepped over,
/// never revisited; a fatal failure moves the session to `Failed`.
use std::fmt;

/// Represents how far a unit's browser session has been set up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionState {
    /// Fresh session, nothing done yet
    Init,

    /// Logged into the portal
    Authenticated,

    /// Reached the target system through the proxy
    Connected,

    /// Search for the unit's range has been submitted
    SearchConfigured,

    /// Collection filter step finished (applied or degraded)
    Filtered,

    /// Page size step finished (applied or degraded); ready for paging
    PageSizeSet,

    /// A fatal setup error ended the unit
    Failed,
}

impl SessionState {
    /// Position of the state in the setup sequence
    fn ordinal(&self) -> u8 {
        match self {
            Self::Init => 0,
            Self::Authenticated => 1,
            Self::Connected => 2,
            Self::SearchConfigured => 3,
            Self::Filtered => 4,
            Self::PageSizeSet => 5,
            Self::Failed => 6,
        }
    }

    /// Returns true if moving from `self` to `next` is allowed
    ///
    /// Forward moves only; any non-terminal state may fail.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || next.ordinal() > self.ordinal()
    }

    /// Returns true once no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Returns true when the session is ready for page processing
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::PageSizeSet)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Authenticated => "authenticated",
            Self::Connected => "connected",
            Self::SearchConfigured => "search_configured",
            Self::Filtered => "filtered",
            Self::PageSizeSet => "page_size_set",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(SessionState::Init.can_transition_to(SessionState::Authenticated));
        assert!(SessionState::Connected.can_transition_to(SessionState::SearchConfigured));
        assert!(SessionState::SearchConfigured.can_transition_to(SessionState::PageSizeSet));
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!SessionState::Connected.can_transition_to(SessionState::Authenticated));
        assert!(!SessionState::Filtered.can_transition_to(SessionState::Filtered));
    }

    #[test]
    fn test_any_active_state_can_fail() {
        assert!(SessionState::Init.can_transition_to(SessionState::Failed));
        assert!(SessionState::PageSizeSet.can_transition_to(SessionState::Failed));
        assert!(!SessionState::Failed.can_transition_to(SessionState::Failed));
        assert!(!SessionState::Failed.can_transition_to(SessionState::Authenticated));
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::SearchConfigured.to_string(), "search_configured");
        assert!(SessionState::PageSizeSet.is_ready());
        assert!(!SessionState::Filtered.is_ready());
    }
}
