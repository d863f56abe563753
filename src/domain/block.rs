//! Detected block instances and their lifecycle.

use crate::domain::error::BlockStateError;
use crate::domain::stock::Stock;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Maximum number of spot snapshots one instance may carry.
pub const MAX_SPOTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockStatus {
    Active,
    Completed,
}

impl BlockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockStatus::Active => "ACTIVE",
            BlockStatus::Completed => "COMPLETED",
        }
    }
}

/// OHLCV snapshot of a day folded into an existing instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spot {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl From<&Stock> for Spot {
    fn from(stock: &Stock) -> Self {
        Self {
            date: stock.date,
            open: stock.open,
            high: stock.high,
            low: stock.low,
            close: stock.close,
            volume: stock.volume,
        }
    }
}

/// One detected instance of a block node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicBlockDetection {
    pub block_id: String,
    pub block_type: u32,
    pub ticker: String,
    pub status: BlockStatus,
    pub started_at: Option<NaiveDate>,
    pub ended_at: Option<NaiveDate>,
    pub peak_price: f64,
    pub peak_date: Option<NaiveDate>,
    pub peak_volume: i64,
    /// Close of the last trading day before `started_at`.
    pub prev_close: Option<f64>,
    pub spots: Vec<Spot>,
    pub parent_blocks: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub is_virtual: bool,
}

impl DynamicBlockDetection {
    /// New ACTIVE instance anchored on `start`, with the peak seeded from it.
    pub fn start(
        block_id: impl Into<String>,
        block_type: u32,
        ticker: impl Into<String>,
        start: &Stock,
    ) -> Self {
        Self {
            block_id: block_id.into(),
            block_type,
            ticker: ticker.into(),
            status: BlockStatus::Active,
            started_at: Some(start.date),
            ended_at: None,
            peak_price: start.high,
            peak_date: Some(start.date),
            peak_volume: start.volume,
            prev_close: None,
            spots: Vec::new(),
            parent_blocks: Vec::new(),
            metadata: BTreeMap::new(),
            is_virtual: false,
        }
    }

    /// ACTIVE instance without a trading-day anchor, used to seed a scan with
    /// a predecessor found outside the scanned range.
    pub fn virtual_block(
        block_id: impl Into<String>,
        block_type: u32,
        ticker: impl Into<String>,
        peak_price: f64,
        peak_volume: i64,
    ) -> Self {
        Self {
            block_id: block_id.into(),
            block_type,
            ticker: ticker.into(),
            status: BlockStatus::Active,
            started_at: None,
            ended_at: None,
            peak_price,
            peak_date: None,
            peak_volume,
            prev_close: None,
            spots: Vec::new(),
            parent_blocks: Vec::new(),
            metadata: BTreeMap::new(),
            is_virtual: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BlockStatus::Active
    }

    pub fn can_accept_spot(&self) -> bool {
        self.is_active() && self.spots.len() < MAX_SPOTS
    }

    pub fn free_spot_slots(&self) -> usize {
        MAX_SPOTS.saturating_sub(self.spots.len())
    }

    pub fn add_spot(&mut self, spot: Spot) -> Result<(), BlockStateError> {
        if !self.is_active() {
            return Err(BlockStateError::AlreadyCompleted(self.block_id.clone()));
        }
        if self.spots.len() >= MAX_SPOTS {
            return Err(BlockStateError::SpotsFull(self.block_id.clone()));
        }
        self.spots.push(spot);
        Ok(())
    }

    /// Raise the running peaks with `stock`. Returns true if the price peak moved.
    pub fn update_peak(&mut self, stock: &Stock) -> bool {
        if stock.volume > self.peak_volume {
            self.peak_volume = stock.volume;
        }
        if stock.high > self.peak_price {
            self.peak_price = stock.high;
            self.peak_date = Some(stock.date);
            return true;
        }
        false
    }

    /// ACTIVE -> COMPLETED. The end date is clamped so it never precedes the start.
    pub fn complete(&mut self, ended_at: NaiveDate) -> Result<(), BlockStateError> {
        if !self.is_active() {
            return Err(BlockStateError::AlreadyCompleted(self.block_id.clone()));
        }
        let ended_at = match self.started_at {
            Some(start) if ended_at < start => start,
            _ => ended_at,
        };
        self.ended_at = Some(ended_at);
        self.status = BlockStatus::Completed;
        Ok(())
    }
}
