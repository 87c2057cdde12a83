//! Progress reporting protocol
//!
//! Progress goes out on two channels: one JSON line per event on the live
//! stream (stdout) and a last-write-wins snapshot file keyed by job id. The
//! terminal result goes out once on the live stream.

pub mod estimator;
pub mod reporter;
pub mod result;

pub use estimator::{EstimatorHandle, ProgressEstimator};
pub use reporter::{read_snapshot, snapshot_path_for, Phase, ProgressEvent, ProgressReporter};
pub use result::JobResult;

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    /// Cloneable in-memory live stream
    #[derive(Clone, Default)]
    pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub fn lines(&self) -> Vec<serde_json::Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
