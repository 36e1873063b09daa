use std::sync::{Arc, Mutex, PoisonError};

use storlink_protocol::{FailureReport, ProgressMarker};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::CommandSink;

pub type CommandResult = Result<String, FailureReport>;

/// A [`CommandSink`] that forwards the result over a oneshot channel and
/// progress markers over an unbounded channel.
pub struct ChannelSink {
    result: Mutex<Option<oneshot::Sender<CommandResult>>>,
    progress: mpsc::UnboundedSender<ProgressMarker>,
}

impl ChannelSink {
    pub fn channel() -> (
        Arc<Self>,
        oneshot::Receiver<CommandResult>,
        mpsc::UnboundedReceiver<ProgressMarker>,
    ) {
        let (result_tx, result_rx) = oneshot::channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let sink = Arc::new(Self {
            result: Mutex::new(Some(result_tx)),
            progress: progress_tx,
        });
        (sink, result_rx, progress_rx)
    }
}

impl CommandSink for ChannelSink {
    fn progress(&self, marker: ProgressMarker) {
        // The receiver may have been dropped by a caller that only wants the result.
        let _ = self.progress.send(marker);
    }

    fn command_finished(&self, result: CommandResult) {
        let sender = self
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                if tx.send(result).is_err() {
                    debug!("command result dropped, receiver gone");
                }
            }
            None => warn!("command reported finished more than once"),
        }
    }
}
