//! Everything one transfer run shares between its components.

use std::sync::Arc;

use rtransfer_client::{MetadataService, SourcePlugin, TargetAuth};
use rtransfer_state::StateStore;

use crate::config::EngineConfig;
use crate::events::EventSink;
use crate::failures::FailureLog;
use crate::limiter::UploadLimiter;
use crate::progress::FileCounters;

/// Remote endpoints a transfer talks to.
#[derive(Clone)]
pub struct TransferServices {
    /// Transfer plugin on the source server.
    pub source: Arc<dyn SourcePlugin>,
    /// Metadata queries and repository listing on the source server.
    pub source_meta: Arc<dyn MetadataService>,
    /// Repository listing on the target server.
    pub target_meta: Arc<dyn MetadataService>,
    /// Credentials the plugin uses to deploy into the target.
    pub target_auth: TargetAuth,
}

/// Per-run state passed to every phase. Nothing here is process-global,
/// so independent runs can share one process.
pub(crate) struct TransferContext {
    pub config: EngineConfig,
    pub services: TransferServices,
    pub state: Arc<StateStore>,
    pub limiter: Arc<UploadLimiter>,
    pub failures: Arc<FailureLog>,
    pub events: EventSink,
    pub counters: Arc<FileCounters>,
}

impl TransferContext {
    pub fn new(
        config: EngineConfig,
        services: TransferServices,
        state: StateStore,
        events: EventSink,
    ) -> Self {
        let failures = FailureLog::new(state.dir());
        let limiter = UploadLimiter::new(config.threads);
        Self {
            config,
            services,
            state: Arc::new(state),
            limiter: Arc::new(limiter),
            failures: Arc::new(failures),
            events,
            counters: Arc::new(FileCounters::new()),
        }
    }
}
