//! Applet lifecycle
//!
//! The lifecycle state decides which commands are legal. Transitions are
//! driven only by the command handlers in [`super::applet`].

use std::fmt;

/// Lifecycle state of the minihsm applet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing set yet
    #[default]
    Creation,
    /// PUK set, PIN not set yet
    Initialization,
    /// PIN set, the protected asset can be unlocked by VERIFY
    Activated,
    /// PIN blocked, only RESET RETRY COUNTER is accepted
    Deactivated,
    /// PUK blocked, every command is refused
    Terminated,
}

impl LifecycleState {
    /// On-card lifecycle byte
    ///
    /// Reported in the low byte of the status word once terminated.
    pub const fn code(self) -> u8 {
        match self {
            Self::Creation => 0x00,
            Self::Initialization => 0x01,
            Self::Deactivated => 0x04,
            Self::Activated => 0x05,
            Self::Terminated => 0x0C,
        }
    }

    pub const fn is_terminated(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Creation => "creation",
            Self::Initialization => "initialization",
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
            Self::Terminated => "terminated",
        };
        write!(f, "{} (0x{:02X})", name, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_creation() {
        assert_eq!(LifecycleState::default(), LifecycleState::Creation);
    }

    #[test]
    fn test_codes() {
        assert_eq!(LifecycleState::Creation.code(), 0x00);
        assert_eq!(LifecycleState::Initialization.code(), 0x01);
        assert_eq!(LifecycleState::Deactivated.code(), 0x04);
        assert_eq!(LifecycleState::Activated.code(), 0x05);
        assert_eq!(LifecycleState::Terminated.code(), 0x0C);
    }

    #[test]
    fn test_only_terminated_is_terminal() {
        assert!(LifecycleState::Terminated.is_terminated());
        assert!(!LifecycleState::Deactivated.is_terminated());
        assert!(!LifecycleState::Activated.is_terminated());
    }

    #[test]
    fn test_display() {
        assert_eq!(LifecycleState::Activated.to_string(), "activated (0x05)");
    }
}
