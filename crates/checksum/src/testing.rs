use std::sync::Mutex;

use storlink_protocol::{FailureReport, ProgressMarker};

use crate::CommandSink;

#[derive(Default)]
pub(crate) struct RecordingSink {
    marks: Mutex<Vec<u64>>,
    results: Mutex<Vec<Result<String, FailureReport>>>,
}

impl RecordingSink {
    pub(crate) fn marks(&self) -> Vec<u64> {
        self.marks.lock().unwrap().clone()
    }

    pub(crate) fn finished_count(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    pub(crate) fn take_results(&self) -> Vec<Result<String, FailureReport>> {
        std::mem::take(&mut *self.results.lock().unwrap())
    }

    /// The single successful result.
    pub(crate) fn digest(&self) -> String {
        let results = self.results.lock().unwrap();
        assert_eq!(results.len(), 1, "expected exactly one result");
        match &results[0] {
            Ok(hex) => hex.clone(),
            Err(e) => panic!("checksum failed: {e}"),
        }
    }
}

impl CommandSink for RecordingSink {
    fn progress(&self, marker: ProgressMarker) {
        self.marks.lock().unwrap().push(marker.total_bytes);
    }

    fn command_finished(&self, result: Result<String, FailureReport>) {
        self.results.lock().unwrap().push(result);
    }
}
