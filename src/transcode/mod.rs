//! Format classification and the conversion workflow driving the sandbox.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::watch;

use crate::notification::Notifier;
use crate::sandbox::{SandboxClient, SandboxError, SandboxTimeouts, SandboxTransport};

pub type ConversionResult<T> = std::result::Result<T, ConversionError>;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("conversion cancelled")]
    Cancelled,

    #[error("native playback failed: {message}")]
    Playback { message: String },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// What the player does with a file of a given container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatClass {
    /// Plays natively; never converted.
    Native,
    /// Attempt native playback first; convert only after a decode error.
    TryDirect,
    /// Always routed through the sandbox before playback.
    Convertible,
}

const NATIVE_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "webm", "ogg", "ogv", "png", "jpg", "jpeg", "gif", "webp", "bmp", "avif",
];
const TRY_DIRECT_EXTENSIONS: &[&str] = &["mkv", "mov", "ts", "m2ts"];
const CONVERTIBLE_EXTENSIONS: &[&str] = &[
    "avi", "wmv", "flv", "f4v", "3gp", "3g2", "mpg", "mpeg", "vob", "rm", "rmvb", "asf", "divx",
];

/// Lowercased extension of a file name, empty when there is none.
pub fn extension_of(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn classify(file_name: &str) -> FormatClass {
    let ext = extension_of(file_name);
    if NATIVE_EXTENSIONS.contains(&ext.as_str()) {
        FormatClass::Native
    } else if CONVERTIBLE_EXTENSIONS.contains(&ext.as_str()) {
        FormatClass::Convertible
    } else if TRY_DIRECT_EXTENSIONS.contains(&ext.as_str()) {
        FormatClass::TryDirect
    } else {
        // Unknown containers get one native attempt before conversion.
        FormatClass::TryDirect
    }
}

/// How a file reaches the player surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPlan {
    Direct,
    DirectThenConvert,
    ConvertFirst,
}

pub fn plan_for(file_name: &str) -> PlaybackPlan {
    match classify(file_name) {
        FormatClass::Native => PlaybackPlan::Direct,
        FormatClass::TryDirect => PlaybackPlan::DirectThenConvert,
        FormatClass::Convertible => PlaybackPlan::ConvertFirst,
    }
}

/// Whether a decode error still has a conversion route left. `Native` files
/// are never converted, and a `Convertible` file that failed after conversion
/// has exhausted its options; both surface as [`ConversionError::Playback`].
pub fn should_convert_after_playback_error(class: FormatClass, already_converted: bool) -> bool {
    match class {
        FormatClass::Native => false,
        FormatClass::TryDirect | FormatClass::Convertible => !already_converted,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Converting,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionJob {
    pub id: u64,
    pub input_ext: String,
    pub status: JobStatus,
    pub progress: f64,
}

/// Receives job lifecycle updates. The UI adapter swaps in the converted
/// media on completion and restores the pre-conversion surface on any
/// terminal failure or cancellation.
pub trait ConversionObserver: Send + Sync {
    fn job_started(&self, job: &ConversionJob);
    fn progress_changed(&self, fraction: f64);
    fn job_finished(&self, job: &ConversionJob);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStage {
    Bootstrap,
    EngineInit,
    Transcode,
}

/// Maps a stage-local fraction onto the overall progress scale: sandbox
/// bootstrap covers 0–10%, engine init 10–30%, transcode 30–100%.
pub fn stage_progress(stage: ConversionStage, inner: f64) -> f64 {
    let inner = inner.clamp(0.0, 1.0);
    let percent = match stage {
        ConversionStage::Bootstrap => 10.0 * inner,
        ConversionStage::EngineInit => 10.0 + 20.0 * inner,
        ConversionStage::Transcode => 30.0 + 70.0 * inner,
    };
    percent / 100.0
}

/// Cooperative cancellation flag, checked at every resume point of the
/// conversion workflow.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; pends forever when the handle
    /// is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

struct ProgressReporter<'a> {
    observer: &'a dyn ConversionObserver,
    job: &'a mut ConversionJob,
}

impl ProgressReporter<'_> {
    /// Clamps and ignores regressions, so out-of-order engine progress never
    /// walks the bar backwards.
    fn report(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction > self.job.progress {
            self.job.progress = fraction;
            self.observer.progress_changed(fraction);
        }
    }
}

/// Drives conversions through one lazily created sandbox client that then
/// lives for the player's lifetime.
pub struct TranscodeOrchestrator {
    transport: Arc<dyn SandboxTransport>,
    notifier: Arc<dyn Notifier>,
    timeouts: SandboxTimeouts,
    client: Mutex<Option<Arc<SandboxClient>>>,
    next_job_id: AtomicU64,
}

impl TranscodeOrchestrator {
    pub fn new(
        transport: Arc<dyn SandboxTransport>,
        notifier: Arc<dyn Notifier>,
        timeouts: SandboxTimeouts,
    ) -> Self {
        Self {
            transport,
            notifier,
            timeouts,
            client: Mutex::new(None),
            next_job_id: AtomicU64::new(1),
        }
    }

    fn client(&self) -> Arc<SandboxClient> {
        match self.client.lock() {
            Ok(mut slot) => Arc::clone(slot.get_or_insert_with(|| {
                Arc::new(SandboxClient::new(Arc::clone(&self.transport), self.timeouts))
            })),
            Err(_) => Arc::new(SandboxClient::new(Arc::clone(&self.transport), self.timeouts)),
        }
    }

    /// Converts `input_bytes` into a natively playable form.
    ///
    /// Every terminal outcome ends with exactly one `job_finished` call so
    /// the UI always has a defined reset transition; failures additionally
    /// produce exactly one user notification. Cancellation rejects promptly
    /// while the in-flight sandbox call finishes in the background and has
    /// its result discarded.
    pub async fn convert_for_playback(
        &self,
        file_name: &str,
        input_bytes: Vec<u8>,
        observer: &dyn ConversionObserver,
        mut cancel: CancelToken,
    ) -> ConversionResult<Vec<u8>> {
        let mut job = ConversionJob {
            id: self.next_job_id.fetch_add(1, Ordering::Relaxed),
            input_ext: extension_of(file_name),
            status: JobStatus::Queued,
            progress: 0.0,
        };
        observer.job_started(&job);

        match self
            .run_stages(&mut job, input_bytes, observer, &mut cancel)
            .await
        {
            Ok(data) => {
                job.status = JobStatus::Completed;
                if job.progress < 1.0 {
                    job.progress = 1.0;
                    observer.progress_changed(1.0);
                }
                observer.job_finished(&job);
                Ok(data)
            }
            Err(ConversionError::Cancelled) => {
                tracing::info!(job = job.id, "conversion cancelled");
                job.status = JobStatus::Cancelled;
                observer.job_finished(&job);
                Err(ConversionError::Cancelled)
            }
            Err(err) => {
                tracing::warn!(job = job.id, %err, "conversion failed");
                job.status = JobStatus::Failed;
                observer.job_finished(&job);
                self.notifier.notify(&format!("Conversion failed: {err}"));
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        job: &mut ConversionJob,
        input_bytes: Vec<u8>,
        observer: &dyn ConversionObserver,
        cancel: &mut CancelToken,
    ) -> ConversionResult<Vec<u8>> {
        let client = self.client();
        job.status = JobStatus::Converting;
        let input_ext = job.input_ext.clone();
        let mut reporter = ProgressReporter { observer, job };

        if cancel.is_cancelled() {
            return Err(ConversionError::Cancelled);
        }
        tokio::select! {
            result = client.bootstrap() => result?,
            _ = cancel.cancelled() => return Err(ConversionError::Cancelled),
        }
        reporter.report(stage_progress(ConversionStage::Bootstrap, 1.0));

        if cancel.is_cancelled() {
            return Err(ConversionError::Cancelled);
        }
        tokio::select! {
            result = client.init() => result?,
            _ = cancel.cancelled() => return Err(ConversionError::Cancelled),
        }
        reporter.report(stage_progress(ConversionStage::EngineInit, 1.0));

        if cancel.is_cancelled() {
            return Err(ConversionError::Cancelled);
        }
        let mut progress = client.progress();
        // Mark whatever a previous job left in the watch as seen.
        progress.borrow_and_update();
        let mut convert = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.convert(input_bytes, &input_ext).await }
        });

        loop {
            tokio::select! {
                result = &mut convert => {
                    return match result {
                        Ok(Ok(data)) => Ok(data),
                        Ok(Err(err)) => Err(err.into()),
                        Err(join_err) => Err(SandboxError::Transport {
                            message: format!("conversion task aborted: {join_err}"),
                        }
                        .into()),
                    };
                }
                changed = progress.changed() => {
                    if changed.is_ok() {
                        let fraction = *progress.borrow_and_update();
                        reporter.report(stage_progress(ConversionStage::Transcode, fraction));
                    }
                }
                _ = cancel.cancelled() => {
                    // The detached task keeps the sandbox call alive; its
                    // eventual result is discarded, never awaited.
                    return Err(ConversionError::Cancelled);
                }
            }
        }
    }
}
