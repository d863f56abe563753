//! CLI integration tests for the detect / validate / functions commands.
//!
//! Tests cover:
//! - Setup loading (config + graph, inline or in a separate file)
//! - Ticker resolution and universe loading with a mock stock port
//! - Full detect runs over CSV fixtures on disk
//! - Exit codes for config, graph and data failures

mod common;

use blockscan::adapters::file_config_adapter::FileConfigAdapter;
use blockscan::cli::{self, Cli};
use blockscan::domain::error::{BlockscanError, GraphError};
use clap::Parser;
use common::*;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use tempfile::TempDir;

const GRAPH: &str = r#"
[graph]
root = block1
nodes = block1, block2

[node block1]
type = 1

[node block1 entry]
price = current.close >= 10 and not exists('block2')
price.description = first close at or above 10

[node block1 exit]
next = exists('block2')

[node block2]
type = 2

[node block2 entry]
surge = current.close > prev.close * 1.2

[edge block1 block2]
condition = current.volume > 0
"#;

const AAA_CSV: &str = "date,open,high,low,close,volume\n\
    2024-01-02,10,11,9,10,1000\n\
    2024-01-03,10,12,10,11,1200\n\
    2024-01-04,11,15,11,14,3000\n\
    2024-01-05,14,15,13,14,900\n";

const BBB_CSV: &str = "date,open,high,low,close,volume\n\
    2024-01-02,5,6,4,5,1000\n\
    2024-01-03,5,6,4,5,1000\n";

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("AAA.csv"), AAA_CSV).unwrap();
    fs::write(dir.path().join("BBB.csv"), BBB_CSV).unwrap();
    dir
}

fn scan_ini(data: &Path, extra: &str) -> String {
    format!("[data]\ndir = {}\n{}\n{}", data.display(), extra, GRAPH)
}

fn assert_exit(code: ExitCode, expected: u8) {
    assert_eq!(
        format!("{:?}", code),
        format!("{:?}", ExitCode::from(expected))
    );
}

fn run(args: &[&str]) -> ExitCode {
    let mut argv = vec!["blockscan"];
    argv.extend_from_slice(args);
    cli::run(Cli::parse_from(argv))
}

mod setup_loading {
    use super::*;

    #[test]
    fn inline_graph() {
        let data = data_dir();
        let ini = write_temp_ini(&scan_ini(data.path(), ""));
        let (_config, graph) = cli::load_setup(ini.path(), None).unwrap();
        assert_eq!(graph.root_node_id, "block1");
        assert_eq!(graph.nodes().len(), 2);
        assert_eq!(graph.get_parents("block2").len(), 1);
    }

    #[test]
    fn condition_descriptions_are_loaded() {
        let ini = write_temp_ini(&scan_ini(Path::new("./stocks"), ""));
        let (_config, graph) = cli::load_setup(ini.path(), None).unwrap();
        let entry = &graph.get_node("block1").unwrap().entry_conditions;
        assert_eq!(entry.len(), 1);
        assert_eq!(entry[0].description, "first close at or above 10");
    }

    #[test]
    fn separate_graph_file() {
        let ini = write_temp_ini("[data]\ndir = ./stocks\n");
        let graph_ini = write_temp_ini(GRAPH);
        let (_config, graph) = cli::load_setup(ini.path(), Some(graph_ini.path())).unwrap();
        assert!(graph.get_node("block2").is_some());
    }

    #[test]
    fn invalid_detector_flag_is_rejected_before_graph() {
        let ini = write_temp_ini("[detector]\nforward_fill = maybe\n[data]\ndir = x\n");
        let err = cli::load_setup(ini.path(), None).unwrap_err();
        assert!(matches!(err, BlockscanError::ConfigInvalid { key, .. } if key == "forward_fill"));
    }

    #[test]
    fn unknown_spot_predecessor_is_graph_error() {
        let ini = write_temp_ini(
            "[data]\ndir = x\n[graph]\nroot = a\nnodes = a\n[node a]\ntype = 1\nspot_condition = is_spot_candidate('ghost')\n",
        );
        let err = cli::load_setup(ini.path(), None).unwrap_err();
        assert!(matches!(err, BlockscanError::Graph(_)));
    }
}

mod universe {
    use super::*;

    #[test]
    fn config_tickers_then_port_listing() {
        let port = MockStockPort::new()
            .with_series("AAA", make_series("AAA", &[10.0]))
            .with_series("BBB", make_series("BBB", &[10.0]));

        let config = FileConfigAdapter::from_string("[data]\ndir = x\ntickers = bbb\n").unwrap();
        assert_eq!(cli::resolve_tickers(&[], &config, &port).unwrap(), ["BBB"]);

        let config = FileConfigAdapter::from_string("[data]\ndir = x\n").unwrap();
        assert_eq!(
            cli::resolve_tickers(&[], &config, &port).unwrap(),
            ["AAA", "BBB"]
        );
    }

    #[test]
    fn date_range_applies_to_every_ticker() {
        let port = MockStockPort::new()
            .with_series("AAA", make_series("AAA", &[10.0, 11.0, 12.0, 13.0]));
        let config = FileConfigAdapter::from_string(
            "[data]\ndir = x\nstart_date = 2024-01-02\nend_date = 2024-01-03\n",
        )
        .unwrap();
        let universe = cli::load_universe(&["AAA".to_string()], &config, &port).unwrap();
        let dates: Vec<_> = universe["AAA"].iter().map(|s| s.date).collect();
        assert_eq!(dates, [jan(2), jan(3)]);
    }

    #[test]
    fn port_failure_aborts() {
        let port = MockStockPort::new()
            .with_series("AAA", make_series("AAA", &[10.0]))
            .with_error("BAD", "disk on fire");
        let config = FileConfigAdapter::from_string("[data]\ndir = x\n").unwrap();
        let err = cli::load_universe(&["AAA".to_string(), "BAD".to_string()], &config, &port)
            .unwrap_err();
        assert!(matches!(err, BlockscanError::Data { .. }));
    }
}

mod detect_command {
    use super::*;

    #[test]
    fn writes_detections_for_every_ticker() {
        init_logging();
        let data = data_dir();
        let ini = write_temp_ini(&scan_ini(data.path(), ""));
        let out = data.path().join("out.csv");

        let code = run(&[
            "detect",
            "--config",
            ini.path().to_str().unwrap(),
            "--output",
            out.to_str().unwrap(),
        ]);
        assert_exit(code, 0);

        let text = fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("ticker,block_id"));
        // AAA: block1 from the 2nd, closed by block2 on the 4th.
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("AAA,block1,1,COMPLETED,2024-01-02,2024-01-03"));
        assert!(lines[2].starts_with("AAA,block2,2,ACTIVE,2024-01-04,"));
        assert!(lines[2].contains(",block1,"));
    }

    #[test]
    fn ticker_override_limits_the_scan() {
        let data = data_dir();
        let ini = write_temp_ini(&scan_ini(data.path(), "tickers = AAA"));
        let out = data.path().join("bbb.csv");

        let code = run(&[
            "detect",
            "-c",
            ini.path().to_str().unwrap(),
            "-t",
            "bbb",
            "-o",
            out.to_str().unwrap(),
        ]);
        assert_exit(code, 0);
        // BBB never closes above 10, so nothing is written.
        assert!(fs::read_to_string(&out).unwrap().trim().is_empty());
    }

    #[test]
    fn missing_tickers_exit_with_no_data() {
        let data = data_dir();
        let ini = write_temp_ini(&scan_ini(data.path(), "tickers = ZZZ"));
        let code = run(&["detect", "--config", ini.path().to_str().unwrap()]);
        assert_exit(code, 5);
    }

    #[test]
    fn missing_data_dir_is_config_error() {
        let ini = write_temp_ini(GRAPH);
        let code = run(&["detect", "--config", ini.path().to_str().unwrap()]);
        assert_exit(code, 2);
    }

    #[test]
    fn unreadable_config_is_io_or_config_error() {
        let code = run(&["detect", "--config", "/nonexistent/blockscan.ini"]);
        let debug = format!("{:?}", code);
        assert_ne!(debug, format!("{:?}", ExitCode::SUCCESS));
    }
}

mod validate_and_functions {
    use super::*;

    #[test]
    fn valid_graph_passes() {
        let ini = write_temp_ini(&scan_ini(Path::new("./stocks"), ""));
        assert_exit(run(&["validate", "--config", ini.path().to_str().unwrap()]), 0);
    }

    #[test]
    fn dangling_edge_exits_with_graph_code() {
        let ini = write_temp_ini(
            "[data]\ndir = x\n[graph]\nroot = a\nnodes = a\n[node a]\ntype = 1\n[edge a ghost]\ncondition = True\n",
        );
        let config = FileConfigAdapter::from_file(ini.path()).unwrap();
        assert!(matches!(
            blockscan::adapters::graph_config_adapter::load_graph(&config),
            Err(BlockscanError::Graph(GraphError::DanglingEdge { .. }))
        ));
        assert_exit(run(&["validate", "--config", ini.path().to_str().unwrap()]), 4);
    }

    #[test]
    fn functions_lists_registry() {
        assert_exit(run(&["functions"]), 0);
    }
}
