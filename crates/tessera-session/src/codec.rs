//! Byte encoding for sessions persisted outside the process.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::Value;

/// Serialized form of a session's entries.
///
/// Stored as an opaque blob under `<prefix><identifier>` by remote backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub entries: HashMap<String, Value>,
}

impl SessionRecord {
    /// Create a record from a set of entries.
    pub fn new(entries: HashMap<String, Value>) -> Self {
        Self { entries }
    }

    /// Encode the record to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a record previously produced by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
