//! Client for the transcoding engine running in an isolated context.
//!
//! The engine is reachable only through asynchronous messages, so a heavy
//! engine binary or an engine fault cannot affect the host. The client owns
//! the pending-call table and verifies the source of every inbound message
//! against the launched sandbox instance.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use super::channel::{CallError, PendingCalls};
use super::protocol::{HostMessage, Inbound, SandboxMessage};
use crate::config::AppConfig;

pub type SandboxResult<T> = std::result::Result<T, SandboxError>;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox call timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("transcoding engine unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("sandbox transport failed: {message}")]
    Transport { message: String },

    #[error("sandbox protocol violation: {message}")]
    Protocol { message: String },

    #[error("transcoding engine reported an error: {message}")]
    Engine { message: String },
}

impl From<CallError> for SandboxError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Timeout { timeout, .. } => SandboxError::Timeout { timeout },
            CallError::Closed { .. } => SandboxError::Transport {
                message: "sandbox channel closed mid-call".to_string(),
            },
        }
    }
}

/// Boundary to the isolated execution context. `launch` creates the context
/// (an iframe in the browser build) and hands back its source token plus the
/// inbound message stream; `post` sends one host message into it.
pub trait SandboxTransport: Send + Sync {
    fn launch(&self) -> SandboxResult<SandboxHandle>;
    fn post(&self, message: HostMessage) -> SandboxResult<()>;
}

pub struct SandboxHandle {
    pub source: super::protocol::SourceId,
    pub inbound: mpsc::UnboundedReceiver<Inbound>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Uninitialized,
    Loading,
    Ready { ffmpeg_available: bool },
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct SandboxTimeouts {
    /// Generous: covers fetching the engine binary on first load.
    pub init: Duration,
    /// Generous: large media can take minutes to transcode.
    pub convert: Duration,
}

impl Default for SandboxTimeouts {
    fn default() -> Self {
        Self {
            init: Duration::from_secs(120),
            convert: Duration::from_secs(300),
        }
    }
}

impl From<&AppConfig> for SandboxTimeouts {
    fn from(config: &AppConfig) -> Self {
        Self {
            init: Duration::from_secs(config.init_timeout_secs),
            convert: Duration::from_secs(config.convert_timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
struct ReadySignal {
    ffmpeg_available: bool,
    error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct ClientState {
    status: SessionStatus,
    launched: bool,
}

/// One client per player, living for the player's lifetime. Conversions come
/// and go; a failed or cancelled conversion never tears the session down.
pub struct SandboxClient {
    transport: Arc<dyn SandboxTransport>,
    timeouts: SandboxTimeouts,
    calls: Arc<PendingCalls<SandboxMessage>>,
    state: Mutex<ClientState>,
    ready_tx: Arc<watch::Sender<Option<ReadySignal>>>,
    progress_tx: Arc<watch::Sender<f64>>,
}

impl SandboxClient {
    pub fn new(transport: Arc<dyn SandboxTransport>, timeouts: SandboxTimeouts) -> Self {
        let (ready_tx, _) = watch::channel(None);
        let (progress_tx, _) = watch::channel(0.0);
        Self {
            transport,
            timeouts,
            calls: Arc::new(PendingCalls::new()),
            state: Mutex::new(ClientState {
                status: SessionStatus::Uninitialized,
                launched: false,
            }),
            ready_tx: Arc::new(ready_tx),
            progress_tx: Arc::new(progress_tx),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.state
            .lock()
            .map(|state| state.status)
            .unwrap_or(SessionStatus::Failed)
    }

    /// Raw engine progress for the active convert, clamped to `[0,1]`.
    pub fn progress(&self) -> watch::Receiver<f64> {
        self.progress_tx.subscribe()
    }

    /// Creates the isolated context and waits for it to signal readiness.
    /// Idempotent once the context is up; rejects after a permanent failure.
    pub async fn bootstrap(&self) -> SandboxResult<()> {
        let needs_launch = {
            let Ok(mut state) = self.state.lock() else {
                return Err(SandboxError::Unavailable {
                    reason: "sandbox state unavailable".to_string(),
                });
            };
            match state.status {
                SessionStatus::Ready { .. } => return Ok(()),
                SessionStatus::Failed => {
                    return Err(SandboxError::Unavailable {
                        reason: "sandbox previously failed to load".to_string(),
                    })
                }
                SessionStatus::Uninitialized | SessionStatus::Loading => {}
            }
            state.status = SessionStatus::Loading;
            let needs = !state.launched;
            state.launched = true;
            needs
        };

        if needs_launch {
            match self.transport.launch() {
                Ok(handle) => self.spawn_dispatch(handle),
                Err(err) => {
                    tracing::warn!(%err, "sandbox launch failed");
                    self.fail();
                    return Err(err);
                }
            }
        }

        let mut ready = self.ready_tx.subscribe();
        let signal = match tokio::time::timeout(
            self.timeouts.init,
            ready.wait_for(|signal| signal.is_some()),
        )
        .await
        {
            Ok(Ok(signal)) => signal.as_ref().cloned(),
            Ok(Err(_)) => {
                self.fail();
                return Err(SandboxError::Transport {
                    message: "sandbox closed before signaling readiness".to_string(),
                });
            }
            Err(_) => {
                self.fail();
                return Err(SandboxError::Timeout {
                    timeout: self.timeouts.init,
                });
            }
        };
        let Some(signal) = signal else {
            self.fail();
            return Err(SandboxError::Transport {
                message: "readiness signal lost".to_string(),
            });
        };

        if let Some(error) = signal.error {
            self.fail();
            return Err(SandboxError::Unavailable { reason: error });
        }
        if !signal.ffmpeg_available {
            self.fail();
            return Err(SandboxError::Unavailable {
                reason: "transcoding engine is not available here; convert the file with an \
                         external tool instead"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Initializes the engine. Must follow a successful [`bootstrap`]; the
    /// `init` message is only ever sent after the readiness signal.
    ///
    /// [`bootstrap`]: SandboxClient::bootstrap
    pub async fn init(&self) -> SandboxResult<()> {
        let ready = self.ready_tx.borrow().as_ref().cloned();
        match self.status() {
            SessionStatus::Ready { .. } => return Ok(()),
            SessionStatus::Failed => {
                return Err(SandboxError::Unavailable {
                    reason: "sandbox previously failed to load".to_string(),
                })
            }
            SessionStatus::Uninitialized | SessionStatus::Loading => {}
        }
        let Some(signal) = ready else {
            return Err(SandboxError::Unavailable {
                reason: "sandbox has not signaled readiness".to_string(),
            });
        };

        let (id, rx) = self.calls.register();
        if let Err(err) = self.transport.post(HostMessage::Init { id }) {
            self.fail();
            return Err(err);
        }
        match self.calls.wait(id, rx, self.timeouts.init).await {
            Ok(SandboxMessage::InitResult { success: true, .. }) => {
                self.set_status(SessionStatus::Ready {
                    ffmpeg_available: signal.ffmpeg_available,
                });
                tracing::info!("transcoding engine initialized");
                Ok(())
            }
            Ok(SandboxMessage::InitResult { error, .. }) => {
                self.fail();
                Err(SandboxError::Engine {
                    message: error.unwrap_or_else(|| "engine failed to initialize".to_string()),
                })
            }
            Ok(other) => {
                self.fail();
                Err(SandboxError::Protocol {
                    message: format!("unexpected reply to init: {other:?}"),
                })
            }
            Err(err) => {
                self.fail();
                Err(err.into())
            }
        }
    }

    /// Converts one file. The session must be `Ready`; a timeout or engine
    /// failure fails this call only, never the session.
    pub async fn convert(&self, input_bytes: Vec<u8>, input_ext: &str) -> SandboxResult<Vec<u8>> {
        if !matches!(self.status(), SessionStatus::Ready { .. }) {
            return Err(SandboxError::Unavailable {
                reason: "transcoding engine is not initialized".to_string(),
            });
        }

        let (id, rx) = self.calls.register();
        self.transport.post(HostMessage::Convert {
            id,
            input_bytes,
            input_ext: input_ext.to_ascii_lowercase(),
        })?;
        match self.calls.wait(id, rx, self.timeouts.convert).await? {
            SandboxMessage::ConvertResult {
                success: true,
                data: Some(data),
                ..
            } => Ok(data),
            SandboxMessage::ConvertResult { success: true, .. } => Err(SandboxError::Protocol {
                message: "convert result carried no data".to_string(),
            }),
            SandboxMessage::ConvertResult { error, .. } => Err(SandboxError::Engine {
                message: error.unwrap_or_else(|| "conversion failed".to_string()),
            }),
            other => Err(SandboxError::Protocol {
                message: format!("unexpected reply to convert: {other:?}"),
            }),
        }
    }

    fn spawn_dispatch(&self, mut handle: SandboxHandle) {
        let calls = Arc::clone(&self.calls);
        let ready_tx = Arc::clone(&self.ready_tx);
        let progress_tx = Arc::clone(&self.progress_tx);
        tokio::spawn(async move {
            let expected = handle.source;
            while let Some(inbound) = handle.inbound.recv().await {
                if inbound.source != expected {
                    tracing::warn!(
                        source = inbound.source.0,
                        "dropping message from unrelated source"
                    );
                    continue;
                }
                match inbound.message {
                    SandboxMessage::Ready {
                        ffmpeg_available,
                        error,
                    } => {
                        let already_ready = ready_tx.borrow().is_some();
                        if already_ready {
                            tracing::debug!("duplicate readiness signal ignored");
                        } else {
                            let _ = ready_tx.send(Some(ReadySignal {
                                ffmpeg_available,
                                error,
                            }));
                        }
                    }
                    SandboxMessage::Progress { fraction } => {
                        let _ = progress_tx.send(fraction.clamp(0.0, 1.0));
                    }
                    message => {
                        if let Some(id) = message.call_id() {
                            calls.resolve(id, message);
                        }
                    }
                }
            }
            tracing::debug!("sandbox inbound channel closed");
        });
    }

    fn fail(&self) {
        self.set_status(SessionStatus::Failed);
    }

    fn set_status(&self, status: SessionStatus) {
        if let Ok(mut state) = self.state.lock() {
            state.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::protocol::SourceId;

    fn short_timeouts() -> SandboxTimeouts {
        SandboxTimeouts {
            init: Duration::from_millis(50),
            convert: Duration::from_millis(50),
        }
    }

    /// Test transport that replies synchronously from `post` according to a
    /// small script, so message ordering is deterministic.
    struct ScriptedTransport {
        source: SourceId,
        inbound_tx: mpsc::UnboundedSender<Inbound>,
        inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
        ffmpeg_available: bool,
        reply_to_init: bool,
        reply_to_convert: bool,
        launch_fails: bool,
        posted: Mutex<Vec<HostMessage>>,
    }

    impl ScriptedTransport {
        fn raw() -> Self {
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            Self {
                source: SourceId(7),
                inbound_tx,
                inbound_rx: Mutex::new(Some(inbound_rx)),
                ffmpeg_available: true,
                reply_to_init: true,
                reply_to_convert: true,
                launch_fails: false,
                posted: Mutex::new(Vec::new()),
            }
        }

        fn new() -> Arc<Self> {
            Arc::new(Self::raw())
        }

        fn with(adjust: impl FnOnce(&mut Self)) -> Arc<Self> {
            let mut transport = Self::raw();
            adjust(&mut transport);
            Arc::new(transport)
        }

        fn send(&self, source: SourceId, message: SandboxMessage) {
            let _ = self.inbound_tx.send(Inbound { source, message });
        }

        fn posted(&self) -> Vec<HostMessage> {
            self.posted.lock().expect("posted lock").clone()
        }
    }

    impl SandboxTransport for ScriptedTransport {
        fn launch(&self) -> SandboxResult<SandboxHandle> {
            if self.launch_fails {
                return Err(SandboxError::Transport {
                    message: "iframe creation blocked".to_string(),
                });
            }
            let inbound = self
                .inbound_rx
                .lock()
                .expect("inbound lock")
                .take()
                .expect("launch called once");
            self.send(
                self.source,
                SandboxMessage::Ready {
                    ffmpeg_available: self.ffmpeg_available,
                    error: None,
                },
            );
            Ok(SandboxHandle {
                source: self.source,
                inbound,
            })
        }

        fn post(&self, message: HostMessage) -> SandboxResult<()> {
            self.posted.lock().expect("posted lock").push(message.clone());
            match message {
                HostMessage::Init { id } if self.reply_to_init => {
                    self.send(
                        self.source,
                        SandboxMessage::InitResult {
                            id,
                            success: true,
                            error: None,
                        },
                    );
                }
                HostMessage::Convert {
                    id, input_bytes, ..
                } if self.reply_to_convert => {
                    self.send(self.source, SandboxMessage::Progress { fraction: 0.5 });
                    self.send(
                        self.source,
                        SandboxMessage::ConvertResult {
                            id,
                            success: true,
                            data: Some(input_bytes),
                            error: None,
                        },
                    );
                }
                _ => {}
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn full_session_bootstraps_initializes_and_converts() {
        let transport = ScriptedTransport::new();
        let client = SandboxClient::new(transport.clone(), short_timeouts());

        client.bootstrap().await.expect("bootstrap");
        client.init().await.expect("init");
        assert_eq!(
            client.status(),
            SessionStatus::Ready {
                ffmpeg_available: true
            }
        );

        let data = client
            .convert(vec![9, 9, 9], "AVI")
            .await
            .expect("convert");
        assert_eq!(data, vec![9, 9, 9]);

        // The extension is lowercased on the wire and init preceded convert.
        let posted = transport.posted();
        assert!(matches!(posted[0], HostMessage::Init { .. }));
        assert!(
            matches!(&posted[1], HostMessage::Convert { input_ext, .. } if input_ext == "avi")
        );
    }

    #[tokio::test]
    async fn convert_before_init_rejects_as_unavailable() {
        let transport = ScriptedTransport::new();
        let client = SandboxClient::new(transport, short_timeouts());

        let err = client
            .convert(vec![1], "avi")
            .await
            .expect_err("convert without init must fail");
        assert!(matches!(err, SandboxError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn init_timeout_rejects_once_and_fails_the_session() {
        let transport = ScriptedTransport::with(|transport| transport.reply_to_init = false);
        let client = SandboxClient::new(transport, short_timeouts());

        client.bootstrap().await.expect("bootstrap");
        let err = client.init().await.expect_err("init must time out");
        assert!(matches!(err, SandboxError::Timeout { .. }));
        assert_eq!(client.status(), SessionStatus::Failed);

        let err = client
            .convert(vec![1], "avi")
            .await
            .expect_err("failed session rejects convert");
        assert!(matches!(err, SandboxError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn missing_engine_rejects_bootstrap_with_external_tool_guidance() {
        let transport = ScriptedTransport::with(|transport| transport.ffmpeg_available = false);
        let client = SandboxClient::new(transport, short_timeouts());

        let err = client.bootstrap().await.expect_err("bootstrap must fail");
        match err {
            SandboxError::Unavailable { reason } => assert!(reason.contains("external tool")),
            other => panic!("expected Unavailable, got {other:?}"),
        }
        assert_eq!(client.status(), SessionStatus::Failed);
    }

    #[tokio::test]
    async fn launch_failure_rejects_bootstrap() {
        let transport = ScriptedTransport::with(|transport| transport.launch_fails = true);
        let client = SandboxClient::new(transport, short_timeouts());

        let err = client.bootstrap().await.expect_err("bootstrap must fail");
        assert!(matches!(err, SandboxError::Transport { .. }));
        assert_eq!(client.status(), SessionStatus::Failed);
    }

    #[tokio::test]
    async fn messages_from_unrelated_sources_are_dropped() {
        let transport = ScriptedTransport::with(|transport| transport.reply_to_init = false);
        let client = SandboxClient::new(transport.clone(), short_timeouts());
        client.bootstrap().await.expect("bootstrap");

        // A forged failure from another frame must not settle the call; the
        // genuine reply afterwards must.
        let init = client.init();
        tokio::pin!(init);
        tokio::select! {
            _ = &mut init => panic!("init should still be pending"),
            _ = tokio::time::sleep(Duration::from_millis(5)) => {
                let posted = transport.posted();
                let HostMessage::Init { id } = posted[0] else {
                    panic!("expected init to be posted");
                };
                transport.send(
                    SourceId(999),
                    SandboxMessage::InitResult { id, success: false, error: Some("forged".into()) },
                );
                transport.send(
                    transport.source,
                    SandboxMessage::InitResult { id, success: true, error: None },
                );
            }
        }
        init.await.expect("genuine reply should initialize");
        assert_eq!(
            client.status(),
            SessionStatus::Ready {
                ffmpeg_available: true
            }
        );
    }

    #[tokio::test]
    async fn engine_progress_is_clamped_into_unit_range() {
        let transport = ScriptedTransport::new();
        let client = SandboxClient::new(transport.clone(), short_timeouts());
        client.bootstrap().await.expect("bootstrap");
        client.init().await.expect("init");

        let progress = client.progress();
        transport.send(transport.source, SandboxMessage::Progress { fraction: 3.5 });
        client.convert(vec![1], "avi").await.expect("convert");
        assert!(*progress.borrow() <= 1.0);
    }
}
