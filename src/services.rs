//! Explicitly constructed service bundle passed to player consumers.
//!
//! There are no ambient globals: everything a consumer needs is wired here
//! once and handed down.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::notification::{DesktopNotifier, Notifier};
use crate::sandbox::{SandboxTimeouts, SandboxTransport};
use crate::selection::SelectionTuning;
use crate::transcode::TranscodeOrchestrator;

pub struct PlayerServices {
    config: AppConfig,
    notifier: Arc<dyn Notifier>,
    orchestrator: TranscodeOrchestrator,
}

impl PlayerServices {
    pub fn new(
        config: AppConfig,
        transport: Arc<dyn SandboxTransport>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let timeouts = SandboxTimeouts::from(&config);
        let orchestrator = TranscodeOrchestrator::new(transport, Arc::clone(&notifier), timeouts);
        Self {
            config,
            notifier,
            orchestrator,
        }
    }

    /// Convenience wiring with the on-disk config and desktop notifications.
    pub fn with_defaults(transport: Arc<dyn SandboxTransport>) -> Self {
        Self::new(
            crate::config::load_app_config(),
            transport,
            Arc::new(DesktopNotifier),
        )
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn selection_tuning(&self) -> SelectionTuning {
        SelectionTuning::from(&self.config)
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn orchestrator(&self) -> &TranscodeOrchestrator {
        &self.orchestrator
    }
}
