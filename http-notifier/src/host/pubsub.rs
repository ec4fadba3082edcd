//! Push-subscription envelopes carrying build events.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::build::Build;
use crate::{Error, Result};

/// Body of a push delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// Base64-encoded build JSON.
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default, alias = "message_id")]
    pub message_id: String,
}

impl PushRequest {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| Error::InvalidEvent(format!("malformed push request: {e}")))
    }

    /// Wrap `build` the way the event source would.
    pub fn for_build(build: &Build, message_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            message: PushMessage {
                data: STANDARD.encode(serde_json::to_vec(build)?),
                attributes: HashMap::from([
                    ("buildId".to_string(), build.id.clone()),
                    ("status".to_string(), build.status.to_string()),
                ]),
                message_id: message_id.into(),
            },
            subscription: String::new(),
        })
    }

    pub fn decode_build(&self) -> Result<Build> {
        if self.message.data.is_empty() {
            return Err(Error::InvalidEvent("push message has no data".into()));
        }
        let raw = STANDARD
            .decode(self.message.data.trim())
            .map_err(|e| Error::InvalidEvent(format!("message data is not base64: {e}")))?;
        serde_json::from_slice(&raw)
            .map_err(|e| Error::InvalidEvent(format!("message data is not a build: {e}")))
    }
}
