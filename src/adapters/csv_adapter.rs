//! CSV stock data adapter.
//!
//! One file per ticker, `<dir>/<TICKER>.csv`, with a header row. The columns
//! `date,open,high,low,close,volume` are required; `trading_value` and
//! `market_cap` are optional; every other column is read as an indicator.
//! Blank cells in optional columns are skipped.

use crate::domain::error::BlockscanError;
use crate::domain::stock::Stock;
use crate::ports::stock_port::StockPort;
use chrono::NaiveDate;
use csv::StringRecord;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

const REQUIRED: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

pub struct CsvStockAdapter {
    base_path: PathBuf,
}

/// Column positions resolved from the header row.
struct Layout {
    required: [usize; 6],
    trading_value: Option<usize>,
    market_cap: Option<usize>,
    indicators: Vec<(usize, String)>,
}

impl Layout {
    fn from_headers(headers: &StringRecord, path: &str) -> Result<Self, BlockscanError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let mut required = [0usize; 6];
        for (slot, name) in required.iter_mut().zip(REQUIRED) {
            *slot = find(name).ok_or_else(|| BlockscanError::Data {
                reason: format!("{}: missing {} column", path, name),
            })?;
        }
        let trading_value = find("trading_value");
        let market_cap = find("market_cap");
        let indicators = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                !required.contains(i) && Some(*i) != trading_value && Some(*i) != market_cap
            })
            .filter(|(_, h)| !h.trim().is_empty() && !h.trim().eq_ignore_ascii_case("ticker"))
            .map(|(i, h)| (i, h.trim().to_string()))
            .collect();
        Ok(Self {
            required,
            trading_value,
            market_cap,
            indicators,
        })
    }
}

fn cell<'r>(record: &'r StringRecord, index: usize, name: &str) -> Result<&'r str, BlockscanError> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| BlockscanError::Data {
            reason: format!("missing {} value", name),
        })
}

fn number<T: std::str::FromStr>(
    record: &StringRecord,
    index: usize,
    name: &str,
) -> Result<T, BlockscanError>
where
    T::Err: std::fmt::Display,
{
    cell(record, index, name)?
        .parse()
        .map_err(|e| BlockscanError::Data {
            reason: format!("invalid {} value: {}", name, e),
        })
}

fn optional_number(record: &StringRecord, index: Option<usize>, name: &str) -> Result<Option<f64>, BlockscanError> {
    match index {
        Some(i) if !cell(record, i, name)?.is_empty() => number(record, i, name).map(Some),
        _ => Ok(None),
    }
}

impl CsvStockAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", ticker))
    }

    fn parse_record(
        ticker: &str,
        layout: &Layout,
        record: &StringRecord,
    ) -> Result<Stock, BlockscanError> {
        let [d, o, h, l, c, v] = layout.required;
        let date_str = cell(record, d, "date")?;
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
            BlockscanError::Data {
                reason: format!("invalid date '{}': {}", date_str, e),
            }
        })?;

        let mut stock = Stock::new(
            ticker,
            date,
            number(record, o, "open")?,
            number(record, h, "high")?,
            number(record, l, "low")?,
            number(record, c, "close")?,
            number(record, v, "volume")?,
        )?;
        stock.trading_value = optional_number(record, layout.trading_value, "trading_value")?;
        stock.market_cap = optional_number(record, layout.market_cap, "market_cap")?;
        for (index, name) in &layout.indicators {
            if let Some(value) = optional_number(record, Some(*index), name)? {
                stock.indicators.insert(name.clone(), value);
            }
        }
        Ok(stock)
    }
}

impl StockPort for CsvStockAdapter {
    fn fetch_stocks(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Stock>, BlockscanError> {
        let path = self.csv_path(ticker);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => BlockscanError::NoData {
                ticker: ticker.to_string(),
            },
            _ => BlockscanError::Data {
                reason: format!("failed to read {}: {}", path.display(), e),
            },
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr.headers().map_err(|e| BlockscanError::Data {
            reason: format!("CSV header error in {}: {}", path.display(), e),
        })?;
        let layout = Layout::from_headers(headers, &path.display().to_string())?;

        let mut stocks = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| BlockscanError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;
            let stock = Self::parse_record(ticker, &layout, &record)?;
            if start_date.is_some_and(|start| stock.date < start)
                || end_date.is_some_and(|end| stock.date > end)
            {
                continue;
            }
            stocks.push(stock);
        }

        stocks.sort_by_key(|s| s.date);
        Ok(stocks)
    }

    fn list_tickers(&self) -> Result<Vec<String>, BlockscanError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| BlockscanError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut tickers = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(ticker) = name.strip_suffix(".csv") {
                tickers.push(ticker.to_string());
            }
        }

        tickers.sort();
        Ok(tickers)
    }
}
