//! RPC plumbing toward the isolated transcoding engine.

pub mod channel;
pub mod client;
pub mod protocol;

pub use channel::{CallError, PendingCalls};
pub use client::{
    SandboxClient, SandboxError, SandboxHandle, SandboxResult, SandboxTimeouts, SandboxTransport,
    SessionStatus,
};
pub use protocol::{CallId, HostMessage, Inbound, SandboxMessage, SourceId};
