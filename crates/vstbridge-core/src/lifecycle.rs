//! Instance lifecycle shared by both sides of the bridge.
//!
//! ```text
//! Constructed -> Opened -> { Suspended <-> Processing } -> Closed
//! ```
//!
//! `Closed` is terminal: nothing, including `open`, leaves it.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    Constructed = 0,
    Opened = 1,
    Suspended = 2,
    Processing = 3,
    Closed = 4,
}

/// Lifecycle-changing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Open,
    Suspend,
    Resume,
    Close,
}

/// Anything that can be attempted against an instance, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Open,
    Suspend,
    Resume,
    Close,
    Dispatch,
    Parameter,
    Process,
    Events,
    /// Channel layout changes, only while audio is stopped.
    Configure,
}

impl From<Transition> for Operation {
    fn from(transition: Transition) -> Self {
        match transition {
            Transition::Open => Operation::Open,
            Transition::Suspend => Operation::Suspend,
            Transition::Resume => Operation::Resume,
            Transition::Close => Operation::Close,
        }
    }
}

/// A call made in a state that does not allow it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Protocol violation: {operation:?} while {state}")]
pub struct ProtocolViolation {
    pub state: LifecycleState,
    pub operation: Operation,
}

impl LifecycleState {
    pub fn apply(self, transition: Transition) -> Result<LifecycleState, ProtocolViolation> {
        use LifecycleState::*;

        let next = match (transition, self) {
            (_, Closed) => None,
            (Transition::Open, Constructed) => Some(Opened),
            (Transition::Open, state) => Some(state),
            (Transition::Resume | Transition::Suspend, Constructed) => None,
            (Transition::Resume, _) => Some(Processing),
            (Transition::Suspend, _) => Some(Suspended),
            (Transition::Close, _) => Some(Closed),
        };

        next.ok_or(ProtocolViolation {
            state: self,
            operation: transition.into(),
        })
    }

    /// Check a non-transition operation against this state.
    pub fn check(self, operation: Operation) -> Result<(), ProtocolViolation> {
        let allowed = match operation {
            Operation::Process | Operation::Events => self.can_process(),
            Operation::Configure => self.latency_mutable(),
            _ => self.accepts_calls(),
        };
        if allowed {
            Ok(())
        } else {
            Err(ProtocolViolation {
                state: self,
                operation,
            })
        }
    }

    pub fn can_process(self) -> bool {
        self == LifecycleState::Processing
    }

    pub fn accepts_calls(self) -> bool {
        self != LifecycleState::Closed
    }

    /// Latency may only change while audio is not running.
    pub fn latency_mutable(self) -> bool {
        !matches!(self, LifecycleState::Processing | LifecycleState::Closed)
    }

    pub fn is_open(self) -> bool {
        matches!(
            self,
            LifecycleState::Opened | LifecycleState::Suspended | LifecycleState::Processing
        )
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Constructed,
            1 => LifecycleState::Opened,
            2 => LifecycleState::Suspended,
            3 => LifecycleState::Processing,
            _ => LifecycleState::Closed,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Constructed => write!(f, "constructed"),
            LifecycleState::Opened => write!(f, "opened"),
            LifecycleState::Suspended => write!(f, "suspended"),
            LifecycleState::Processing => write!(f, "processing"),
            LifecycleState::Closed => write!(f, "closed"),
        }
    }
}
