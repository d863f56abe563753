#![allow(dead_code)]

use blockscan::domain::condition::Condition;
use blockscan::domain::error::BlockscanError;
use blockscan::domain::stock::Stock;
use blockscan::ports::stock_port::StockPort;
use chrono::NaiveDate;
use std::collections::HashMap;

pub struct MockStockPort {
    pub data: HashMap<String, Vec<Stock>>,
    pub errors: HashMap<String, String>,
}

impl MockStockPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_series(mut self, ticker: &str, series: Vec<Stock>) -> Self {
        self.data.insert(ticker.to_string(), series);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl StockPort for MockStockPort {
    fn fetch_stocks(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Stock>, BlockscanError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(BlockscanError::Data {
                reason: reason.clone(),
            });
        }
        let series = self.data.get(ticker).ok_or_else(|| BlockscanError::NoData {
            ticker: ticker.to_string(),
        })?;
        Ok(series
            .iter()
            .filter(|s| start_date.is_none_or(|d| s.date >= d))
            .filter(|s| end_date.is_none_or(|d| s.date <= d))
            .cloned()
            .collect())
    }

    fn list_tickers(&self) -> Result<Vec<String>, BlockscanError> {
        let mut tickers: Vec<String> = self.data.keys().cloned().collect();
        tickers.sort();
        Ok(tickers)
    }
}

pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Day `d` of January 2024.
pub fn jan(d: u32) -> NaiveDate {
    date(2024, 1, d)
}

/// A trading day with a one-point range around `close`.
pub fn make_stock(ticker: &str, day: NaiveDate, close: f64, volume: i64) -> Stock {
    Stock::new(ticker, day, close, close + 1.0, close - 1.0, close, volume).unwrap()
}

/// Consecutive January days starting on the 1st, one per close.
pub fn make_series(ticker: &str, closes: &[f64]) -> Vec<Stock> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_stock(ticker, jan(i as u32 + 1), close, 1_000))
        .collect()
}

/// A zero-volume placeholder row, as found before forward fill.
pub fn make_gap(ticker: &str, day: NaiveDate) -> Stock {
    Stock::new(ticker, day, 0.0, 0.0, 0.0, 0.0, 0).unwrap()
}

pub fn cond(name: &str, text: &str) -> Condition {
    Condition::new(name, text).unwrap()
}
