//! Per-transfer tallies, reported with the finished outcome.

use std::time::Instant;

use storlink_protocol::{BlockRun, Direction, TransferStats};
use tracing::debug;

/// Accumulates [`TransferStats`] for one transfer.
///
/// Consecutive operations of the same size are folded into runs, so a
/// typical transfer reports one long run plus a short tail.
#[derive(Debug)]
pub struct StatsRecorder {
    direction: Direction,
    started: Instant,
    bytes: u64,
    operations: u64,
    peak_outstanding: usize,
    runs: Vec<BlockRun>,
}

impl StatsRecorder {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            started: Instant::now(),
            bytes: 0,
            operations: 0,
            peak_outstanding: 0,
            runs: Vec::new(),
        }
    }

    /// Records one operation that moved `nbytes`.
    pub fn record(&mut self, nbytes: usize) {
        self.bytes += nbytes as u64;
        self.operations += 1;
        if let Some(run) = self.runs.last_mut() {
            if run.size == nbytes {
                run.count += 1;
                return;
            }
            debug!(direction = %self.direction, "{run}");
        }
        self.runs.push(BlockRun {
            size: nbytes,
            count: 1,
        });
    }

    pub fn observe_outstanding(&mut self, outstanding: usize) {
        self.peak_outstanding = self.peak_outstanding.max(outstanding);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn snapshot(&self) -> TransferStats {
        TransferStats {
            direction: self.direction,
            bytes: self.bytes,
            operations: self.operations,
            peak_outstanding: self.peak_outstanding,
            block_runs: self.runs.clone(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_sizes_fold_into_one_run() {
        let mut rec = StatsRecorder::new(Direction::Receive);
        for _ in 0..3 {
            rec.record(64);
        }
        rec.record(10);
        let stats = rec.snapshot();
        assert_eq!(stats.bytes, 202);
        assert_eq!(stats.operations, 4);
        assert_eq!(
            stats.block_runs,
            vec![
                BlockRun { size: 64, count: 3 },
                BlockRun { size: 10, count: 1 }
            ]
        );
    }

    #[test]
    fn peak_outstanding_is_max() {
        let mut rec = StatsRecorder::new(Direction::Send);
        rec.observe_outstanding(2);
        rec.observe_outstanding(4);
        rec.observe_outstanding(1);
        assert_eq!(rec.snapshot().peak_outstanding, 4);
    }

    #[test]
    fn empty_recorder() {
        let stats = StatsRecorder::new(Direction::Send).snapshot();
        assert_eq!(stats.bytes, 0);
        assert!(stats.block_runs.is_empty());
    }
}
