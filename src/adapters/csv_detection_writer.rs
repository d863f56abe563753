//! CSV detection writer.
//!
//! One row per instance. Superseded instances are written too, flagged in
//! the `superseded` column. Spot dates and parent ids are `;`-joined.

use crate::domain::block::{BlockStatus, DynamicBlockDetection};
use crate::domain::detector::DetectionRun;
use crate::domain::error::BlockscanError;
use crate::ports::detection_port::DetectionPort;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct DetectionRow<'a> {
    ticker: &'a str,
    block_id: &'a str,
    block_type: u32,
    status: BlockStatus,
    started_at: Option<NaiveDate>,
    ended_at: Option<NaiveDate>,
    peak_price: f64,
    peak_date: Option<NaiveDate>,
    peak_volume: i64,
    prev_close: Option<f64>,
    spot_count: usize,
    spot_dates: String,
    parent_blocks: String,
    is_virtual: bool,
    superseded: bool,
}

impl<'a> DetectionRow<'a> {
    fn new(block: &'a DynamicBlockDetection, superseded: bool) -> Self {
        Self {
            ticker: &block.ticker,
            block_id: &block.block_id,
            block_type: block.block_type,
            status: block.status,
            started_at: block.started_at,
            ended_at: block.ended_at,
            peak_price: block.peak_price,
            peak_date: block.peak_date,
            peak_volume: block.peak_volume,
            prev_close: block.prev_close,
            spot_count: block.spots.len(),
            spot_dates: block
                .spots
                .iter()
                .map(|s| s.date.to_string())
                .collect::<Vec<_>>()
                .join(";"),
            parent_blocks: block.parent_blocks.join(";"),
            is_virtual: block.is_virtual,
            superseded,
        }
    }
}

/// Writes to a file, or to stdout when no path is given.
pub struct CsvDetectionWriter {
    path: Option<PathBuf>,
}

impl CsvDetectionWriter {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn write_runs<W: Write>(writer: W, runs: &[DetectionRun]) -> Result<usize, BlockscanError> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut rows = 0;
        for run in runs {
            let blocks = run
                .superseded
                .iter()
                .map(|b| (b, true))
                .chain(run.detections.iter().map(|b| (b, false)));
            for (block, superseded) in blocks {
                wtr.serialize(DetectionRow::new(block, superseded))
                    .map_err(|e| BlockscanError::Data {
                        reason: format!("CSV write error: {}", e),
                    })?;
                rows += 1;
            }
        }
        wtr.flush()?;
        Ok(rows)
    }
}

impl DetectionPort for CsvDetectionWriter {
    fn save_runs(&self, runs: &[DetectionRun]) -> Result<usize, BlockscanError> {
        match &self.path {
            Some(path) => Self::write_runs(File::create(path)?, runs),
            None => Self::write_runs(io::stdout().lock(), runs),
        }
    }
}
