use std::path::Path;

use anyhow::bail;
use storlink_checksum::ChannelSink;
use storlink_dsi::{Command, DsiConfig, PosixDsi};
use storlink_protocol::ByteRange;
use storlink_transfer::{LoopbackTransport, TransferOutcome};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::Action;

pub async fn run(action: Action, config: DsiConfig) -> anyhow::Result<()> {
    let dsi = PosixDsi::new(config)?;
    match action {
        Action::Put {
            source,
            path,
            offset,
        } => put(&dsi, &source, &path, offset).await,
        Action::Get {
            path,
            output,
            offset,
            length,
        } => get(&dsi, &path, &output, ByteRange { offset, length }).await,
        Action::Cksum {
            path,
            algorithm,
            offset,
            length,
        } => {
            let digest = cksum(&dsi, &path, &algorithm, offset, length).await?;
            println!("{digest}  {path}");
            Ok(())
        }
    }
}

async fn put(dsi: &PosixDsi, source: &str, path: &str, offset: u64) -> anyhow::Result<()> {
    let loopback = dsi.loopback_config(ByteRange::unbounded(offset));
    let (transport, finished) = if source == "-" {
        LoopbackTransport::receiving_from(tokio::io::stdin(), loopback)?
    } else {
        LoopbackTransport::receiving_from(tokio::fs::File::open(source).await?, loopback)?
    };
    // Pre-flight helpers and xattr lookups block.
    let _transfer = tokio::task::block_in_place(|| dsi.start_receive(path, transport));
    finish(path, finished).await
}

async fn get(dsi: &PosixDsi, path: &str, output: &Path, range: ByteRange) -> anyhow::Result<()> {
    let sink = tokio::fs::File::create(output).await?;
    let (transport, finished) = LoopbackTransport::sending_to(sink, dsi.loopback_config(range))?;
    let _transfer = dsi.start_send(path, transport);
    finish(path, finished).await
}

async fn finish(path: &str, finished: oneshot::Receiver<TransferOutcome>) -> anyhow::Result<()> {
    let outcome = finished.await?;
    let stats = &outcome.stats;
    for run in &stats.block_runs {
        debug!(path, "{} blocks of size {}", run.count, run.size);
    }
    if let Some(report) = outcome.failure() {
        bail!("{path}: {report}");
    }
    info!(
        path,
        bytes = stats.bytes,
        operations = stats.operations,
        elapsed_ms = stats.elapsed_ms,
        mib_per_sec = stats.bytes_per_second() / (1024.0 * 1024.0),
        "transfer complete"
    );
    Ok(())
}

/// Runs a checksum command, cancelling it on Ctrl-C.
async fn cksum(
    dsi: &PosixDsi,
    path: &str,
    algorithm: &str,
    offset: u64,
    length: Option<u64>,
) -> anyhow::Result<String> {
    let (sink, mut result, mut progress) = ChannelSink::channel();
    let cancel = CancellationToken::new();
    dsi.command(
        Command::Checksum {
            path: path.to_string(),
            algorithm: algorithm.to_string(),
            offset,
            length,
        },
        sink,
        cancel.clone(),
    );

    loop {
        tokio::select! {
            outcome = &mut result => {
                return match outcome? {
                    Ok(digest) => Ok(digest),
                    Err(report) => bail!("{path}: {report}"),
                };
            }
            Some(mark) = progress.recv() => {
                info!(path, bytes = mark.total_bytes, "checksum in progress");
            }
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                warn!(path, "interrupted, cancelling checksum");
                cancel.cancel();
            }
        }
    }
}
