use std::collections::HashMap;
use std::sync::Arc;

use storlink_protocol::{ByteRange, ChecksumAlgorithm};
use storlink_transfer::Storage;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::external::ExternalHelper;
use crate::scheduler;
use crate::task::{ChecksumSettings, ChecksumTask};
use crate::{ChecksumError, CommandSink};

/// A digest command as received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRequest {
    pub path: String,
    /// Algorithm name, matched case-insensitively.
    pub algorithm: String,
    pub range: ByteRange,
}

/// Starts checksum commands, either stepped in-process or delegated to a
/// configured helper.
pub struct ChecksumEngine {
    storage: Arc<dyn Storage>,
    settings: ChecksumSettings,
    helpers: HashMap<ChecksumAlgorithm, ExternalHelper>,
    runtime: Handle,
}

impl ChecksumEngine {
    pub fn new(storage: Arc<dyn Storage>, settings: ChecksumSettings, runtime: Handle) -> Self {
        Self {
            storage,
            settings,
            helpers: HashMap::new(),
            runtime,
        }
    }

    /// Delegates `algorithm` to `helper`. Helpers always digest the whole
    /// object.
    pub fn with_helper(mut self, algorithm: ChecksumAlgorithm, helper: ExternalHelper) -> Self {
        self.helpers.insert(algorithm, helper);
        self
    }

    pub fn settings(&self) -> &ChecksumSettings {
        &self.settings
    }

    pub fn helper(&self, algorithm: ChecksumAlgorithm) -> Option<&ExternalHelper> {
        self.helpers.get(&algorithm)
    }

    /// Starts `request`. `sink` hears exactly one result; when the command
    /// fails before any work is scheduled that happens before this returns
    /// and `None` is returned.
    pub fn start(
        &self,
        request: ChecksumRequest,
        sink: Arc<dyn CommandSink>,
        cancel: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let algorithm = match request.algorithm.parse::<ChecksumAlgorithm>() {
            Ok(algorithm) => algorithm,
            Err(unknown) => {
                warn!(path = %request.path, %unknown, "rejecting checksum command");
                sink.command_finished(Err(ChecksumError::from(unknown).report()));
                return None;
            }
        };

        if let Some(helper) = self.helpers.get(&algorithm).cloned() {
            let path = request.path;
            return Some(self.runtime.spawn_blocking(move || {
                let result = helper.run(&path);
                match &result {
                    Ok(hex) => {
                        info!(path = %path, %algorithm, digest = %hex, "external checksum finished")
                    }
                    Err(error) => {
                        error!(path = %path, %algorithm, %error, "external checksum failed")
                    }
                }
                sink.command_finished(result.map_err(|e| e.report()));
            }));
        }

        match ChecksumTask::open(
            self.storage.as_ref(),
            &request.path,
            algorithm,
            request.range,
            self.settings.clone(),
            &sink,
        ) {
            Ok(task) => Some(scheduler::spawn(&self.runtime, task, cancel)),
            Err(error) => {
                error!(path = %request.path, %algorithm, %error, "checksum could not start");
                sink.command_finished(Err(error.report()));
                None
            }
        }
    }
}
