//! Stock series source port trait.

use crate::domain::error::BlockscanError;
use crate::domain::stock::Stock;
use chrono::NaiveDate;

pub trait StockPort {
    /// Records for `ticker` within the optional inclusive date range,
    /// sorted by date.
    fn fetch_stocks(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Stock>, BlockscanError>;

    fn list_tickers(&self) -> Result<Vec<String>, BlockscanError>;
}
