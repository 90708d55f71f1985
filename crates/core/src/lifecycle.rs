//! Typed lifecycles (state machines) for status enums.
//!
//! Each status enum declares its legal successors once; aggregates call
//! [`ensure_transition`] instead of comparing states inline.

use crate::error::{DomainError, DomainResult};

pub trait Lifecycle: Copy + Eq + core::fmt::Debug + 'static {
    /// Stable name used in messages and on the wire.
    fn as_str(self) -> &'static str;

    /// States reachable from `self` in one step.
    fn successors(self) -> &'static [Self];

    fn can_transition_to(self, next: Self) -> bool {
        self.successors().contains(&next)
    }

    /// No further transitions are possible.
    fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }
}

/// Reject an illegal transition with an invariant violation.
pub fn ensure_transition<S: Lifecycle>(from: S, to: S) -> DomainResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(DomainError::invariant(format!(
            "cannot move from '{}' to '{}'",
            from.as_str(),
            to.as_str()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Door {
        Open,
        Closed,
        Bricked,
    }

    impl Lifecycle for Door {
        fn as_str(self) -> &'static str {
            match self {
                Door::Open => "open",
                Door::Closed => "closed",
                Door::Bricked => "bricked",
            }
        }

        fn successors(self) -> &'static [Self] {
            match self {
                Door::Open => &[Door::Closed],
                Door::Closed => &[Door::Open, Door::Bricked],
                Door::Bricked => &[],
            }
        }
    }

    #[test]
    fn legal_transition_passes() {
        assert!(ensure_transition(Door::Open, Door::Closed).is_ok());
    }

    #[test]
    fn illegal_transition_names_both_states() {
        match ensure_transition(Door::Open, Door::Bricked) {
            Err(DomainError::InvariantViolation(msg)) => {
                assert_eq!(msg, "cannot move from 'open' to 'bricked'");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn terminal_states_have_no_successors() {
        assert!(Door::Bricked.is_terminal());
        assert!(!Door::Closed.is_terminal());
    }
}
