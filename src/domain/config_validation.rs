//! Configuration validation.
//!
//! Validates the detector and data sections before any scan runs. Graph
//! sections are validated by the graph loader.

use crate::domain::error::BlockscanError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_scan_config(config: &dyn ConfigPort) -> Result<(), BlockscanError> {
    validate_detector(config)?;
    validate_data_dir(config)?;
    validate_dates(config)?;
    validate_tickers(config)?;
    Ok(())
}

fn validate_detector(config: &dyn ConfigPort) -> Result<(), BlockscanError> {
    for key in ["forward_fill", "spot_fallback"] {
        if let Some(value) = config.get_string("detector", key) {
            // A malformed flag reads back as both defaults disagreeing.
            if config.get_bool("detector", key, true) != config.get_bool("detector", key, false) {
                return Err(BlockscanError::ConfigInvalid {
                    section: "detector".to_string(),
                    key: key.to_string(),
                    reason: format!("expected a boolean, got '{}'", value),
                });
            }
        }
    }
    Ok(())
}

fn validate_data_dir(config: &dyn ConfigPort) -> Result<(), BlockscanError> {
    match config.get_string("data", "dir") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(BlockscanError::ConfigMissing {
            section: "data".to_string(),
            key: "dir".to_string(),
        }),
    }
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), BlockscanError> {
    let start_date = parse_optional_date(config, "start_date")?;
    let end_date = parse_optional_date(config, "end_date")?;

    if let (Some(start), Some(end)) = (start_date, end_date)
        && start > end
    {
        return Err(BlockscanError::ConfigInvalid {
            section: "data".to_string(),
            key: "start_date".to_string(),
            reason: "start_date must not be after end_date".to_string(),
        });
    }
    Ok(())
}

/// `[data] <field>` as a date; absent or blank means unbounded.
pub fn parse_optional_date(
    config: &dyn ConfigPort,
    field: &str,
) -> Result<Option<NaiveDate>, BlockscanError> {
    match config.get_string("data", field) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| BlockscanError::ConfigInvalid {
                section: "data".to_string(),
                key: field.to_string(),
                reason: format!("invalid {} format, expected YYYY-MM-DD", field),
            }),
    }
}

fn validate_tickers(config: &dyn ConfigPort) -> Result<(), BlockscanError> {
    if let Some(list) = config.get_string("data", "tickers")
        && list.split(',').any(|t| t.trim().is_empty())
    {
        return Err(BlockscanError::ConfigInvalid {
            section: "data".to_string(),
            key: "tickers".to_string(),
            reason: "tickers must be a comma separated list without empty entries".to_string(),
        });
    }
    Ok(())
}

/// Configured tickers, upper-cased and de-duplicated in order.
pub fn parse_tickers(config: &dyn ConfigPort) -> Vec<String> {
    let mut tickers: Vec<String> = Vec::new();
    for ticker in config
        .get_string("data", "tickers")
        .unwrap_or_default()
        .split(',')
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
    {
        if !tickers.contains(&ticker) {
            tickers.push(ticker);
        }
    }
    tickers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn valid_scan_config_passes() {
        let config = make_config(
            r#"
[detector]
forward_fill = true
spot_fallback = false

[data]
dir = ./stocks
start_date = 2024-01-01
end_date = 2024-06-30
tickers = aaa, BBB
"#,
        );
        assert!(validate_scan_config(&config).is_ok());
    }

    #[test]
    fn missing_data_dir_fails() {
        let config = make_config("[data]\nstart_date = 2024-01-01\n");
        let err = validate_scan_config(&config).unwrap_err();
        assert!(matches!(err, BlockscanError::ConfigMissing { key, .. } if key == "dir"));
    }

    #[test]
    fn malformed_bool_fails() {
        let config = make_config("[detector]\nforward_fill = sometimes\n[data]\ndir = x\n");
        let err = validate_scan_config(&config).unwrap_err();
        assert!(matches!(err, BlockscanError::ConfigInvalid { key, .. } if key == "forward_fill"));
    }

    #[test]
    fn invalid_date_format_fails() {
        let config = make_config("[data]\ndir = x\nstart_date = 2024/01/01\n");
        let err = validate_scan_config(&config).unwrap_err();
        assert!(matches!(err, BlockscanError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn start_after_end_fails() {
        let config = make_config("[data]\ndir = x\nstart_date = 2024-05-01\nend_date = 2024-01-01\n");
        let err = validate_scan_config(&config).unwrap_err();
        assert!(matches!(err, BlockscanError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn dates_are_optional() {
        let config = make_config("[data]\ndir = x\n");
        assert!(validate_scan_config(&config).is_ok());
        assert_eq!(parse_optional_date(&config, "start_date").unwrap(), None);
    }

    #[test]
    fn empty_ticker_entry_fails() {
        let config = make_config("[data]\ndir = x\ntickers = AAA,,BBB\n");
        let err = validate_scan_config(&config).unwrap_err();
        assert!(matches!(err, BlockscanError::ConfigInvalid { key, .. } if key == "tickers"));
    }

    #[test]
    fn tickers_are_normalised() {
        let config = make_config("[data]\ndir = x\ntickers = aaa, BBB ,aaa\n");
        assert_eq!(parse_tickers(&config), ["AAA", "BBB"]);
    }
}
