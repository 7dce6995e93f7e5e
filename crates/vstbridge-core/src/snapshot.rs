//! Persistable plugin reference: identity plus opaque state.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// What a host stores to recreate a plugin's state later.
///
/// `chunk` is whatever the plugin returned from a chunk request; its format
/// belongs to the plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSnapshot {
    pub unique_id: i32,
    pub version: i32,
    pub program: i32,
    pub parameters: Vec<f32>,
    pub chunk: Option<Vec<u8>>,
}

impl PluginSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| BridgeError::StateSaveError(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| BridgeError::StateRestoreError(e.to_string()))
    }

    /// Refuse snapshots taken from a different plugin.
    pub fn check_identity(&self, unique_id: i32) -> Result<()> {
        if self.unique_id != unique_id {
            return Err(BridgeError::PluginMismatch {
                expected: unique_id,
                found: self.unique_id,
            });
        }
        Ok(())
    }
}
