//! Error types for the bridge

use std::path::PathBuf;
use thiserror::Error;

use crate::buffer::SampleFormat;
use crate::lifecycle::ProtocolViolation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Scanning,
    Opening,
    EntryPoint,
    Instantiation,
    Validation,
    Setup,
    Activation,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStage::Scanning => write!(f, "scanning"),
            LoadStage::Opening => write!(f, "opening library"),
            LoadStage::EntryPoint => write!(f, "resolving entry point"),
            LoadStage::Instantiation => write!(f, "creating instance"),
            LoadStage::Validation => write!(f, "validating descriptor"),
            LoadStage::Setup => write!(f, "setting up audio"),
            LoadStage::Activation => write!(f, "activating"),
        }
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Plugin load failed at {stage} stage: {path}\n  Reason: {reason}")]
    LoadFailed {
        path: PathBuf,
        stage: LoadStage,
        reason: String,
    },

    #[error("Plugin construction failed: {0}")]
    ConstructionFailed(String),

    #[error("Invalid descriptor magic {0:#010x}")]
    InvalidMagic(i32),

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    #[error("Plugin instance is closed")]
    Closed,

    #[error("Parameter index {index} out of range (plugin has {count})")]
    ParameterOutOfRange { index: i32, count: i32 },

    #[error("Channel mismatch: plugin expects {expected} channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("Plugin does not support {0:?} processing")]
    UnsupportedPrecision(SampleFormat),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Reentry depth {depth} exceeds limit")]
    ReentryLimit { depth: u32 },

    #[error("Event queue full ({capacity} events)")]
    QueueFull { capacity: usize },

    #[error("Snapshot belongs to plugin {found:#x}, expected {expected:#x}")]
    PluginMismatch { expected: i32, found: i32 },

    #[error("Failed to save plugin state: {0}")]
    StateSaveError(String),

    #[error("Failed to restore plugin state: {0}")]
    StateRestoreError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{LifecycleState, Operation};

    #[test]
    fn test_load_stage_display() {
        assert_eq!(LoadStage::Scanning.to_string(), "scanning");
        assert_eq!(LoadStage::Opening.to_string(), "opening library");
        assert_eq!(LoadStage::EntryPoint.to_string(), "resolving entry point");
        assert_eq!(LoadStage::Instantiation.to_string(), "creating instance");
        assert_eq!(LoadStage::Validation.to_string(), "validating descriptor");
        assert_eq!(LoadStage::Setup.to_string(), "setting up audio");
        assert_eq!(LoadStage::Activation.to_string(), "activating");
    }

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::InvalidMagic(0x1234);
        assert!(err.to_string().contains("0x00001234"));

        let err = BridgeError::ParameterOutOfRange { index: 9, count: 4 };
        assert!(err.to_string().contains('9'));
        assert!(err.to_string().contains('4'));

        let err = BridgeError::Closed;
        assert_eq!(err.to_string(), "Plugin instance is closed");
    }

    #[test]
    fn test_protocol_violation_converts() {
        let violation = ProtocolViolation {
            state: LifecycleState::Closed,
            operation: Operation::Resume,
        };
        let err: BridgeError = violation.into();
        assert!(matches!(err, BridgeError::Protocol(_)));
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_state_errors() {
        let err = BridgeError::StateSaveError("failed to serialize".into());
        assert!(err.to_string().contains("save"));
        assert!(err.to_string().contains("failed to serialize"));

        let err = BridgeError::PluginMismatch {
            expected: 0x10,
            found: 0x20,
        };
        assert!(err.to_string().contains("0x20"));
        assert!(err.to_string().contains("0x10"));
    }
}
