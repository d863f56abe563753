//! Daily OHLCV stock record and forward-fill preprocessing.

use crate::domain::error::StockError;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// One trading day for one ticker. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stock {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub trading_value: Option<f64>,
    pub market_cap: Option<f64>,
    /// Pre-computed indicator values, reachable from expressions as
    /// `current.<name>` when no direct field matches.
    pub indicators: BTreeMap<String, f64>,
}

impl Stock {
    /// Build a validated record.
    ///
    /// Trading days (volume > 0) must have positive prices with
    /// `low <= close <= high`. Zero-volume placeholders only need
    /// non-negative prices; they are rewritten by [`forward_fill`].
    pub fn new(
        ticker: impl Into<String>,
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: i64,
    ) -> Result<Self, StockError> {
        let stock = Self {
            ticker: ticker.into(),
            date,
            open,
            high,
            low,
            close,
            volume,
            trading_value: None,
            market_cap: None,
            indicators: BTreeMap::new(),
        };
        stock.validate()?;
        Ok(stock)
    }

    pub fn with_indicator(mut self, name: impl Into<String>, value: f64) -> Self {
        self.indicators.insert(name.into(), value);
        self
    }

    pub fn with_trading_value(mut self, value: f64) -> Self {
        self.trading_value = Some(value);
        self
    }

    pub fn with_market_cap(mut self, value: f64) -> Self {
        self.market_cap = Some(value);
        self
    }

    pub fn is_trading_day(&self) -> bool {
        self.volume > 0
    }

    fn validate(&self) -> Result<(), StockError> {
        if self.volume < 0 {
            return Err(StockError::NegativeVolume {
                ticker: self.ticker.clone(),
                date: self.date,
                volume: self.volume,
            });
        }

        let prices = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ];
        for (field, value) in prices {
            let invalid = value.is_nan()
                || if self.is_trading_day() {
                    value <= 0.0
                } else {
                    value < 0.0
                };
            if invalid {
                return Err(StockError::NonPositivePrice {
                    ticker: self.ticker.clone(),
                    date: self.date,
                    field,
                    value,
                });
            }
        }

        if !self.is_trading_day() {
            return Ok(());
        }

        if self.high < self.low {
            return Err(StockError::HighBelowLow {
                ticker: self.ticker.clone(),
                date: self.date,
                high: self.high,
                low: self.low,
            });
        }
        if self.close < self.low || self.close > self.high {
            return Err(StockError::CloseOutOfRange {
                ticker: self.ticker.clone(),
                date: self.date,
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}

/// Sort by date and copy the last valid close into the OHLC fields of every
/// zero-volume day. Volume stays zero. Leading zero-volume days with no
/// earlier trading day are left untouched.
pub fn forward_fill(stocks: &[Stock]) -> Vec<Stock> {
    let mut sorted = stocks.to_vec();
    sorted.sort_by_key(|s| s.date);

    let mut last_close: Option<f64> = None;
    for stock in &mut sorted {
        if stock.is_trading_day() {
            last_close = Some(stock.close);
        } else if let Some(close) = last_close {
            stock.open = close;
            stock.high = close;
            stock.low = close;
            stock.close = close;
        }
    }
    sorted
}
