//! Multi-ticker batch scanning.
//!
//! Each ticker is an independent sequential scan; tickers run in parallel
//! and share only the read-only graph and detector.

use crate::domain::block::DynamicBlockDetection;
use crate::domain::detector::{BlockDetector, DetectionRun};
use crate::domain::graph::BlockGraph;
use crate::domain::stock::Stock;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Scan every ticker in `universe`. Results are ordered by ticker.
pub fn detect_many(
    detector: &BlockDetector,
    graph: &BlockGraph,
    universe: &BTreeMap<String, Vec<Stock>>,
) -> Vec<DetectionRun> {
    let jobs: Vec<(&String, &Vec<Stock>)> = universe.iter().collect();
    jobs.par_iter()
        .map(|(ticker, stocks)| detector.run(ticker, stocks, graph))
        .collect()
}

/// Flatten runs into one detection list, ticker order then graph order.
pub fn flatten(runs: &[DetectionRun]) -> Vec<&DynamicBlockDetection> {
    runs.iter().flat_map(|r| r.detections.iter()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::condition::Condition;
    use crate::domain::graph::BlockNode;
    use chrono::NaiveDate;

    fn series(ticker: &str, closes: &[f64]) -> Vec<Stock> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Stock::new(
                    ticker,
                    NaiveDate::from_ymd_opt(2024, 4, 1 + i as u32).unwrap(),
                    c,
                    c,
                    c,
                    c,
                    10,
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn parallel_matches_sequential() {
        let graph = BlockGraph::new(
            "surge",
            vec![
                BlockNode::new("surge", 1)
                    .with_entry(Condition::new("up", "current.close > 20").unwrap())
                    .with_exit(Condition::new("down", "current.close < 15").unwrap()),
            ],
            vec![],
        )
        .unwrap();
        let universe: BTreeMap<String, Vec<Stock>> = [
            ("BBB", vec![10.0, 25.0, 30.0, 12.0]),
            ("AAA", vec![21.0, 22.0, 23.0]),
            ("CCC", vec![1.0, 2.0]),
        ]
        .into_iter()
        .map(|(t, closes)| (t.to_string(), series(t, &closes)))
        .collect();

        let detector = BlockDetector::default();
        let runs = detect_many(&detector, &graph, &universe);

        let tickers: Vec<&str> = runs.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, ["AAA", "BBB", "CCC"]);
        for run in &runs {
            assert_eq!(run, &detector.run(&run.ticker, &universe[&run.ticker], &graph));
        }
        assert_eq!(flatten(&runs).len(), 2);
    }
}
