//! Wire messages exchanged with the transcoding sandbox.
//!
//! Every message is a tagged JSON object `{type, id?, …}`. Request/response
//! pairs are correlated by a host-assigned, monotonically increasing id;
//! `ready` and `progress` are uncorrelated stream events.

use serde::{Deserialize, Serialize};

pub type CallId = u64;

/// Opaque token identifying the execution context a message came from. The
/// client drops inbound messages whose source does not match the launched
/// sandbox instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum HostMessage {
    Init {
        id: CallId,
    },
    Convert {
        id: CallId,
        input_bytes: Vec<u8>,
        input_ext: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SandboxMessage {
    /// Unsolicited, once, when the engine context has finished loading.
    Ready {
        ffmpeg_available: bool,
        #[serde(default)]
        error: Option<String>,
    },
    InitResult {
        id: CallId,
        success: bool,
        #[serde(default)]
        error: Option<String>,
    },
    ConvertResult {
        id: CallId,
        success: bool,
        #[serde(default)]
        data: Option<Vec<u8>>,
        #[serde(default)]
        error: Option<String>,
    },
    /// Zero or more per active convert, not guaranteed monotone.
    Progress {
        fraction: f64,
    },
}

impl SandboxMessage {
    pub fn call_id(&self) -> Option<CallId> {
        match *self {
            SandboxMessage::InitResult { id, .. } | SandboxMessage::ConvertResult { id, .. } => {
                Some(id)
            }
            SandboxMessage::Ready { .. } | SandboxMessage::Progress { .. } => None,
        }
    }
}

/// An inbound message together with its source token.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub source: SourceId,
    pub message: SandboxMessage,
}
