use std::sync::Arc;

use storlink_checksum::{ChecksumEngine, ChecksumRequest, CommandSink, ExternalHelper};
use storlink_protocol::{ByteRange, ChecksumAlgorithm, ErrorKind, FailureReport};
use storlink_transfer::{
    LoopbackConfig, PosixStorage, Preflight, PreflightChain, Storage, Transfer,
    TransferCoordinator, Transport,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::Command;
use crate::config::DsiConfig;
use crate::preflight::PathRewrite;
use crate::DsiError;

/// The storage interface a transport drives: windowed sends and receives
/// plus checksum commands, all against one storage backend.
pub struct PosixDsi {
    config: DsiConfig,
    storage: Arc<dyn Storage>,
    preflight: Option<Arc<dyn Preflight>>,
    helpers: Vec<(ChecksumAlgorithm, ExternalHelper)>,
    runtime: Handle,
    checksums: ChecksumEngine,
}

impl PosixDsi {
    /// Builds the interface over the local filesystem. Must be called from
    /// within a tokio runtime, which then runs checksum commands.
    pub fn new(config: DsiConfig) -> Result<Self, DsiError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| DsiError::NoRuntime(e.to_string()))?;
        let helpers = config.checksum_helpers()?;
        let preflight = preflight_from(&config);
        let storage: Arc<dyn Storage> = Arc::new(PosixStorage);
        let checksums = checksum_engine(&config, &storage, &helpers, &runtime);
        Ok(Self {
            config,
            storage,
            preflight,
            helpers,
            runtime,
            checksums,
        })
    }

    /// Swaps the storage backend.
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.checksums = checksum_engine(&self.config, &storage, &self.helpers, &self.runtime);
        self.storage = storage;
        self
    }

    /// Replaces the configured receive checks.
    pub fn with_preflight(mut self, preflight: Arc<dyn Preflight>) -> Self {
        self.preflight = Some(preflight);
        self
    }

    pub fn config(&self) -> &DsiConfig {
        &self.config
    }

    /// Loopback parameters for `range` taken from the configuration.
    pub fn loopback_config(&self, range: ByteRange) -> LoopbackConfig {
        LoopbackConfig {
            block_size: self.config.block_size,
            concurrency: self.config.concurrency,
            range,
        }
    }

    pub fn start_send(&self, path: &str, transport: Arc<dyn Transport>) -> Transfer {
        self.coordinator(transport).start_send(path)
    }

    /// Runs the configured pre-flight checks on the calling thread before
    /// anything is opened. A path-rewrite helper or a quota lookup blocks, so
    /// async callers should wrap this in `tokio::task::block_in_place` or
    /// `spawn_blocking`.
    pub fn start_receive(&self, path: &str, transport: Arc<dyn Transport>) -> Transfer {
        self.coordinator(transport).start_receive(path)
    }

    /// Starts a digest. `sink` hears exactly one result.
    pub fn start_checksum(
        &self,
        request: ChecksumRequest,
        sink: Arc<dyn CommandSink>,
        cancel: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        self.checksums.start(request, sink, cancel)
    }

    /// Dispatches a transport command. Only checksums are served; every
    /// other command resolves at once with `UnsupportedCommand`.
    pub fn command(
        &self,
        command: Command,
        sink: Arc<dyn CommandSink>,
        cancel: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let name = command.name();
        match command {
            Command::Checksum {
                path,
                algorithm,
                offset,
                length,
            } => {
                let request = ChecksumRequest {
                    path,
                    algorithm,
                    range: ByteRange { offset, length },
                };
                self.start_checksum(request, sink, cancel)
            }
            _ => {
                warn!(command = name, "unsupported command");
                sink.command_finished(Err(FailureReport {
                    kind: ErrorKind::UnsupportedCommand,
                    operation: name.to_string(),
                    os_code: None,
                    message: DsiError::UnsupportedCommand(name).to_string(),
                }));
                None
            }
        }
    }

    fn coordinator(&self, transport: Arc<dyn Transport>) -> TransferCoordinator {
        let coordinator = TransferCoordinator::new(self.storage.clone(), transport);
        match &self.preflight {
            Some(preflight) => coordinator.with_preflight(preflight.clone()),
            None => coordinator,
        }
    }
}

fn checksum_engine(
    config: &DsiConfig,
    storage: &Arc<dyn Storage>,
    helpers: &[(ChecksumAlgorithm, ExternalHelper)],
    runtime: &Handle,
) -> ChecksumEngine {
    helpers.iter().fold(
        ChecksumEngine::new(storage.clone(), config.checksum_settings(), runtime.clone()),
        |engine, (algorithm, helper)| {
            debug!(%algorithm, helper = %helper.command_line(), "checksum helper configured");
            engine.with_helper(*algorithm, helper.clone())
        },
    )
}

fn preflight_from(config: &DsiConfig) -> Option<Arc<dyn Preflight>> {
    let mut chain = PreflightChain::new();

    if let Some(url) = &config.space_quota_url {
        #[cfg(target_os = "linux")]
        {
            use crate::preflight::{SpaceQuotaCheck, XattrSpaceUsage};
            chain.push(SpaceQuotaCheck::new(XattrSpaceUsage::new(url.clone())));
        }
        #[cfg(not(target_os = "linux"))]
        warn!(url = %url, "space quota checks need extended attributes, skipping");
    }
    if let Some(helper) = config.path_rewrite() {
        chain.push(PathRewrite::new(helper));
    }

    if chain.is_empty() {
        None
    } else {
        Some(Arc::new(chain))
    }
}
