//! Per-day evaluation context.
//!
//! Typed slots for the fixed day variables, a map of tracked block
//! instances keyed by block id, and free-form scalar variables. Name
//! lookup consults them in that order.

use crate::domain::block::DynamicBlockDetection;
use crate::domain::stock::Stock;
use crate::domain::value::Value;
use std::collections::BTreeMap;

/// Names bound by every context; block ids may not shadow them.
pub const RESERVED_NAMES: [&str; 5] = [
    "current",
    "prev",
    "prev_raw",
    "days_since_prev",
    "all_stocks",
];

#[derive(Debug, Clone)]
pub struct Context<'a> {
    current: &'a Stock,
    prev: Option<&'a Stock>,
    prev_raw: Option<&'a Stock>,
    history: &'a [Stock],
    blocks: BTreeMap<&'a str, &'a DynamicBlockDetection>,
    vars: BTreeMap<String, Value<'a>>,
}

/// Index of the last trading day (volume > 0) strictly before `index`.
pub fn last_trading_day_before(series: &[Stock], index: usize) -> Option<usize> {
    series[..index.min(series.len())]
        .iter()
        .rposition(Stock::is_trading_day)
}

impl<'a> Context<'a> {
    /// Context holding only `current`; extend it with the `with_*` builders.
    pub fn new(current: &'a Stock) -> Self {
        Self {
            current,
            prev: None,
            prev_raw: None,
            history: std::slice::from_ref(current),
            blocks: BTreeMap::new(),
            vars: BTreeMap::new(),
        }
    }

    /// Context for `series[index]`: `prev` is the last trading day before it,
    /// `prev_raw` the literal prior record and `all_stocks` the series up to
    /// and including `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn for_day(series: &'a [Stock], index: usize) -> Self {
        let mut ctx = Self::new(&series[index]).with_history(&series[..=index]);
        ctx.prev = last_trading_day_before(series, index).map(|i| &series[i]);
        ctx.prev_raw = index.checked_sub(1).map(|i| &series[i]);
        ctx
    }

    pub fn with_history(mut self, history: &'a [Stock]) -> Self {
        self.history = history;
        self
    }

    pub fn with_block(mut self, block: &'a DynamicBlockDetection) -> Self {
        self.blocks.insert(block.block_id.as_str(), block);
        self
    }

    pub fn with_blocks<I>(mut self, blocks: I) -> Self
    where
        I: IntoIterator<Item = &'a DynamicBlockDetection>,
    {
        for block in blocks {
            self.blocks.insert(block.block_id.as_str(), block);
        }
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: Value<'a>) -> Self {
        self.vars.insert(name.into(), value);
        self
    }

    pub fn current(&self) -> &'a Stock {
        self.current
    }

    pub fn prev(&self) -> Option<&'a Stock> {
        self.prev
    }

    pub fn prev_raw(&self) -> Option<&'a Stock> {
        self.prev_raw
    }

    /// Calendar days between `current` and `prev`.
    pub fn days_since_prev(&self) -> Option<i64> {
        self.prev
            .map(|p| (self.current.date - p.date).num_days())
    }

    /// Every record up to and including `current`.
    pub fn history(&self) -> &'a [Stock] {
        self.history
    }

    pub fn block(&self, block_id: &str) -> Option<&'a DynamicBlockDetection> {
        self.blocks.get(block_id).copied()
    }

    pub fn lookup(&self, name: &str) -> Option<Value<'a>> {
        let stock = |s: Option<&'a Stock>| s.map(Value::Stock).unwrap_or(Value::None);
        match name {
            "current" => Some(Value::Stock(self.current)),
            "prev" => Some(stock(self.prev)),
            "prev_raw" => Some(stock(self.prev_raw)),
            "days_since_prev" => Some(
                self.days_since_prev()
                    .map(Value::Int)
                    .unwrap_or(Value::None),
            ),
            "all_stocks" => Some(Value::Stocks(self.history)),
            _ => self
                .block(name)
                .map(Value::Block)
                .or_else(|| self.vars.get(name).cloned()),
        }
    }
}
