//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use log::warn;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvStockAdapter;
use crate::adapters::csv_detection_writer::CsvDetectionWriter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::graph_config_adapter::load_graph;
use crate::domain::condition::Condition;
use crate::domain::config_validation::{parse_optional_date, parse_tickers, validate_scan_config};
use crate::domain::detector::{BlockDetector, DetectorConfig};
use crate::domain::error::BlockscanError;
use crate::domain::expr_eval::ExpressionEngine;
use crate::domain::graph::BlockGraph;
use crate::domain::registry::FunctionRegistry;
use crate::domain::scan::detect_many;
use crate::domain::stock::Stock;
use crate::ports::config_port::ConfigPort;
use crate::ports::detection_port::DetectionPort;
use crate::ports::stock_port::StockPort;

#[derive(Parser, Debug)]
#[command(name = "blockscan", about = "Block pattern detection over daily stock series")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan tickers and write detections as CSV
    Detect {
        #[arg(short, long)]
        config: PathBuf,
        /// Graph file, when the graph is not in the main config
        #[arg(short, long)]
        graph: Option<PathBuf>,
        /// Overrides [data] tickers; repeatable
        #[arg(short, long)]
        ticker: Vec<String>,
        /// Output CSV path; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration and its block graph
    Validate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        graph: Option<PathBuf>,
    },
    /// List the functions available in expressions
    Functions,
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Detect {
            config,
            graph,
            ticker,
            output,
        } => run_detect(&config, graph.as_deref(), &ticker, output),
        Command::Validate { config, graph } => run_validate(&config, graph.as_deref()),
        Command::Functions => {
            run_functions();
            Ok(())
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Load the config and the graph, which may live in a separate file.
pub fn load_setup(
    config_path: &Path,
    graph_path: Option<&Path>,
) -> Result<(FileConfigAdapter, BlockGraph), BlockscanError> {
    let config = FileConfigAdapter::from_file(config_path)?;
    validate_scan_config(&config)?;
    let graph = match graph_path {
        Some(path) => load_graph(&FileConfigAdapter::from_file(path)?)?,
        None => load_graph(&config)?,
    };
    Ok((config, graph))
}

/// Ticker override, else `[data] tickers`, else every ticker in the data dir.
pub fn resolve_tickers(
    overrides: &[String],
    config: &dyn ConfigPort,
    stocks: &dyn StockPort,
) -> Result<Vec<String>, BlockscanError> {
    if !overrides.is_empty() {
        return Ok(overrides.iter().map(|t| t.trim().to_uppercase()).collect());
    }
    let configured = parse_tickers(config);
    if !configured.is_empty() {
        return Ok(configured);
    }
    stocks.list_tickers()
}

/// Fetch every ticker; tickers without data are skipped with a warning.
pub fn load_universe(
    tickers: &[String],
    config: &dyn ConfigPort,
    stocks: &dyn StockPort,
) -> Result<BTreeMap<String, Vec<Stock>>, BlockscanError> {
    let start = parse_optional_date(config, "start_date")?;
    let end = parse_optional_date(config, "end_date")?;

    let mut universe = BTreeMap::new();
    for ticker in tickers {
        match stocks.fetch_stocks(ticker, start, end) {
            Ok(series) if series.is_empty() => warn!("{}: no rows in range, skipped", ticker),
            Ok(series) => {
                universe.insert(ticker.clone(), series);
            }
            Err(BlockscanError::NoData { .. }) => warn!("{}: no data file, skipped", ticker),
            Err(e) => return Err(e),
        }
    }
    if universe.is_empty() {
        return Err(BlockscanError::NoData {
            ticker: tickers.join(","),
        });
    }
    Ok(universe)
}

fn run_detect(
    config_path: &Path,
    graph_path: Option<&Path>,
    ticker_overrides: &[String],
    output: Option<PathBuf>,
) -> Result<(), BlockscanError> {
    eprintln!("Loading config from {}", config_path.display());
    let (config, graph) = load_setup(config_path, graph_path)?;

    let data_dir = config.get_string("data", "dir").unwrap_or_default();
    let stocks = CsvStockAdapter::new(PathBuf::from(data_dir.trim()));
    let tickers = resolve_tickers(ticker_overrides, &config, &stocks)?;
    eprintln!("Loading {} tickers...", tickers.len());
    let universe = load_universe(&tickers, &config, &stocks)?;

    let detector = BlockDetector::new(
        ExpressionEngine::default(),
        DetectorConfig::from_config(&config),
    );
    eprintln!(
        "Scanning {} tickers with {} block nodes...",
        universe.len(),
        graph.nodes().len()
    );
    let runs = detect_many(&detector, &graph, &universe);

    let rows = CsvDetectionWriter::new(output.clone()).save_runs(&runs)?;
    match output {
        Some(path) => eprintln!("Wrote {} detections to {}", rows, path.display()),
        None => eprintln!("{} detections", rows),
    }
    Ok(())
}

fn run_validate(config_path: &Path, graph_path: Option<&Path>) -> Result<(), BlockscanError> {
    eprintln!("Validating {}", config_path.display());
    let (_config, graph) = load_setup(config_path, graph_path)?;

    eprintln!("\nRoot: {}", graph.root_node_id);
    for node in graph.nodes() {
        eprintln!(
            "\n[{}] type {} ({} entry, {} exit, {} spot entry)",
            node.block_id,
            node.block_type,
            node.entry_conditions.len(),
            node.exit_conditions.len(),
            node.spot_entry_conditions.len()
        );
        for c in &node.entry_conditions {
            eprintln!("  entry {}: {}{}", c.name, c.expression, described(c));
        }
        for c in &node.exit_conditions {
            eprintln!(
                "  exit {} ({:?}): {}{}",
                c.name,
                c.termination(),
                c.expression,
                described(c)
            );
        }
        if let Some(reference) = node.spot_reference() {
            eprintln!(
                "  spot predecessor {} offsets {}..={}{}",
                reference.predecessor,
                reference.nearest,
                reference.farthest,
                if node.levelup { " (levelup)" } else { "" }
            );
        }
        for edge in graph.get_parents(&node.block_id) {
            eprintln!(
                "  parent {}{}",
                edge.from_block_id,
                if edge.condition.is_some() { " (gated)" } else { "" }
            );
        }
    }

    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn described(condition: &Condition) -> String {
    if condition.description.is_empty() {
        String::new()
    } else {
        format!("  # {}", condition.description)
    }
}

fn run_functions() {
    let registry = FunctionRegistry::with_builtins();
    for spec in registry.functions() {
        println!(
            "{:<10} {:<40} v{:<5} {}",
            spec.category.to_string(),
            spec.signature(),
            spec.version,
            spec.description
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn resolve_tickers_prefers_overrides_then_config() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ZZZ.csv"), "date,open,high,low,close,volume\n").unwrap();
        let stocks = CsvStockAdapter::new(dir.path().to_path_buf());

        let config = FileConfigAdapter::from_string("[data]\ndir = x\ntickers = bbb\n").unwrap();
        assert_eq!(
            resolve_tickers(&["aaa".to_string()], &config, &stocks).unwrap(),
            ["AAA"]
        );
        assert_eq!(resolve_tickers(&[], &config, &stocks).unwrap(), ["BBB"]);

        let config = FileConfigAdapter::from_string("[data]\ndir = x\n").unwrap();
        assert_eq!(resolve_tickers(&[], &config, &stocks).unwrap(), ["ZZZ"]);
    }

    #[test]
    fn load_universe_skips_missing_and_fails_when_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("AAA.csv"),
            "date,open,high,low,close,volume\n2024-01-02,1,2,1,1.5,10\n",
        )
        .unwrap();
        let stocks = CsvStockAdapter::new(dir.path().to_path_buf());
        let config = FileConfigAdapter::from_string("[data]\ndir = x\n").unwrap();

        let universe =
            load_universe(&["AAA".to_string(), "NOPE".to_string()], &config, &stocks).unwrap();
        assert_eq!(universe.keys().collect::<Vec<_>>(), ["AAA"]);

        assert!(matches!(
            load_universe(&["NOPE".to_string()], &config, &stocks),
            Err(BlockscanError::NoData { .. })
        ));
    }
}
