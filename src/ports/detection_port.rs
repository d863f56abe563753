//! Detection persistence port trait.

use crate::domain::detector::DetectionRun;
use crate::domain::error::BlockscanError;

pub trait DetectionPort {
    /// Persist the detections of `runs`; returns the number of rows written.
    fn save_runs(&self, runs: &[DetectionRun]) -> Result<usize, BlockscanError>;
}
