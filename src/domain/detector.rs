//! Day-by-day block detector.
//!
//! # Per-day passes
//!
//! 1. New instances: every node without an ACTIVE instance evaluates its
//!    entry conditions (AND). The spot chain may fold the event into an
//!    existing instance or backdate it; otherwise a new instance starts today.
//! 2. New instances join the tracked set.
//! 3. Exits: every ACTIVE instance evaluates its exit conditions (OR). An
//!    existence-based exit ends on the previous trading day, or today when
//!    the referenced sibling started the same day; a value-based exit ends
//!    today.
//! 4. Peaks: every instance still ACTIVE absorbs today's high and volume.
//!
//! Contexts are rebuilt per node, so a fold or completion made for one node
//! is visible to the nodes after it.

use crate::domain::block::{BlockStatus, DynamicBlockDetection};
use crate::domain::condition::{Condition, TerminationKind};
use crate::domain::context::{Context, last_trading_day_before};
use crate::domain::expr_eval::ExpressionEngine;
use crate::domain::graph::{BlockGraph, BlockNode};
use crate::domain::spot::{SpotChain, SpotDecision, SpotInput, SpotOutcome};
use crate::domain::stock::{Stock, forward_fill};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use log::{debug, info};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Forward-fill zero-volume days before scanning.
    pub forward_fill: bool,
    /// Enable the fallback spot strategy.
    pub spot_fallback: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            forward_fill: true,
            spot_fallback: true,
        }
    }
}

impl DetectorConfig {
    /// Read the `[detector]` section.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let defaults = Self::default();
        Self {
            forward_fill: config.get_bool("detector", "forward_fill", defaults.forward_fill),
            spot_fallback: config.get_bool("detector", "spot_fallback", defaults.spot_fallback),
        }
    }
}

/// Result of one ticker scan.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRun {
    pub ticker: String,
    /// Latest instance per block id, in graph node order.
    pub detections: Vec<DynamicBlockDetection>,
    /// Completed instances replaced by a later instance of the same id, in
    /// the order they were replaced.
    pub superseded: Vec<DynamicBlockDetection>,
}

#[derive(Debug)]
pub struct BlockDetector {
    engine: ExpressionEngine,
    chain: SpotChain,
    config: DetectorConfig,
}

impl Default for BlockDetector {
    fn default() -> Self {
        Self::new(ExpressionEngine::default(), DetectorConfig::default())
    }
}

impl BlockDetector {
    pub fn new(engine: ExpressionEngine, config: DetectorConfig) -> Self {
        Self {
            engine,
            chain: SpotChain::standard(config.spot_fallback),
            config,
        }
    }

    pub fn with_chain(mut self, chain: SpotChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn engine(&self) -> &ExpressionEngine {
        &self.engine
    }

    pub fn config(&self) -> DetectorConfig {
        self.config
    }

    /// Latest instance per block id.
    pub fn detect(
        &self,
        ticker: &str,
        stocks: &[Stock],
        graph: &BlockGraph,
    ) -> Vec<DynamicBlockDetection> {
        self.run(ticker, stocks, graph).detections
    }

    pub fn run(&self, ticker: &str, stocks: &[Stock], graph: &BlockGraph) -> DetectionRun {
        self.run_seeded(ticker, stocks, graph, Vec::new())
    }

    /// Scan with `seeds` already tracked, e.g. a predecessor found before the
    /// scanned range. Seeds may be virtual.
    pub fn run_seeded(
        &self,
        ticker: &str,
        stocks: &[Stock],
        graph: &BlockGraph,
        seeds: Vec<DynamicBlockDetection>,
    ) -> DetectionRun {
        let series = self.prepare(stocks);
        let mut scan = Scan {
            detector: self,
            graph,
            series: &series,
            ticker,
            tracked: seeds
                .into_iter()
                .map(|b| (b.block_id.clone(), b))
                .collect(),
            superseded: Vec::new(),
        };
        for index in 0..series.len() {
            scan.step(index);
        }
        let run = scan.finish();

        info!(
            "{}: scanned {} days, {} detections ({} active), {} superseded",
            ticker,
            series.len(),
            run.detections.len(),
            run.detections.iter().filter(|b| b.is_active()).count(),
            run.superseded.len()
        );
        run
    }

    fn prepare(&self, stocks: &[Stock]) -> Vec<Stock> {
        if self.config.forward_fill {
            forward_fill(stocks)
        } else {
            let mut series = stocks.to_vec();
            series.sort_by_key(|s| s.date);
            series
        }
    }
}

/// Scan-local state for one ticker.
struct Scan<'d> {
    detector: &'d BlockDetector,
    graph: &'d BlockGraph,
    series: &'d [Stock],
    ticker: &'d str,
    tracked: BTreeMap<String, DynamicBlockDetection>,
    superseded: Vec<DynamicBlockDetection>,
}

impl Scan<'_> {
    fn context(&self, index: usize) -> Context<'_> {
        Context::for_day(self.series, index).with_blocks(self.tracked.values())
    }

    fn engine(&self) -> &ExpressionEngine {
        &self.detector.engine
    }

    fn is_active(&self, block_id: &str) -> bool {
        self.tracked.get(block_id).is_some_and(|b| b.is_active())
    }

    fn step(&mut self, index: usize) {
        let graph = self.graph;
        let mut created = Vec::new();
        for node in graph.nodes() {
            if self.is_active(&node.block_id) {
                continue;
            }
            if let Some(instance) = self.try_enter(node, index) {
                created.push(instance);
            }
        }
        for instance in created {
            self.track(instance);
        }

        for node in graph.nodes() {
            if self.is_active(&node.block_id) {
                self.try_exit(node, index);
            }
        }

        let current = &self.series[index];
        for block in self.tracked.values_mut().filter(|b| b.is_active()) {
            block.update_peak(current);
        }
    }

    /// Entry pass for one node; returns a new instance to track, if any.
    fn try_enter(&mut self, node: &BlockNode, index: usize) -> Option<DynamicBlockDetection> {
        if node.entry_conditions.is_empty() {
            return None;
        }
        let (outcome, parents) = {
            let ctx = self.context(index);
            let engine = self.engine();
            if !node
                .entry_conditions
                .iter()
                .all(|c| c.holds(engine, &ctx, &node.block_id))
            {
                return None;
            }
            let spot_condition_met = node
                .spot_condition
                .as_ref()
                .is_some_and(|c| c.holds(engine, &ctx, &node.block_id));
            let input = SpotInput {
                node,
                graph: self.graph,
                engine,
                series: self.series,
                index,
                tracked: &self.tracked,
                spot_condition_met,
            };
            (self.detector.chain.decide(&input), self.parents(node, &ctx))
        };

        match outcome {
            None => {
                let mut instance = self.instance(node, index, parents);
                instance.prev_close = last_trading_day_before(self.series, index)
                    .map(|i| self.series[i].close);
                debug!(
                    "{} {} [{}] started",
                    self.ticker, self.series[index].date, node.block_id
                );
                Some(instance)
            }
            Some(SpotOutcome {
                strategy,
                decision: SpotDecision::Fold { target, spots },
            }) => {
                let date = self.series[index].date;
                if let Some(block) = self.tracked.get_mut(&target) {
                    for spot in spots {
                        if let Err(err) = block.add_spot(spot) {
                            debug!("{} {} [{}] spot refused: {}", self.ticker, date, target, err);
                        }
                    }
                    block
                        .metadata
                        .insert("spot_strategy".to_string(), strategy.to_string());
                    debug!(
                        "{} {} [{}] folded into {} via {} ({} spots)",
                        self.ticker,
                        date,
                        node.block_id,
                        target,
                        strategy,
                        block.spots.len()
                    );
                }
                None
            }
            Some(SpotOutcome {
                strategy,
                decision: SpotDecision::Levelup { predecessor, anchor },
            }) => {
                let mut instance = self.instance(node, anchor, parents);
                for day in &self.series[anchor + 1..=index] {
                    instance.update_peak(day);
                }
                instance.prev_close =
                    last_trading_day_before(self.series, anchor).map(|i| self.series[i].close);
                instance
                    .metadata
                    .insert("spot_strategy".to_string(), strategy.to_string());

                let ended_at = last_trading_day_before(self.series, anchor)
                    .or_else(|| anchor.checked_sub(1))
                    .map_or(self.series[anchor].date, |i| self.series[i].date);
                self.complete(&predecessor, ended_at, "levelup");
                debug!(
                    "{} {} [{}] levelup from {} backdated to {}",
                    self.ticker,
                    self.series[index].date,
                    node.block_id,
                    predecessor,
                    self.series[anchor].date
                );
                Some(instance)
            }
        }
    }

    fn instance(&self, node: &BlockNode, start: usize, parents: Vec<String>) -> DynamicBlockDetection {
        let mut instance = DynamicBlockDetection::start(
            node.block_id.as_str(),
            node.block_type,
            self.ticker,
            &self.series[start],
        );
        instance.parent_blocks = parents;
        instance
    }

    /// Ids of ACTIVE graph parents whose edge condition (if any) holds today.
    fn parents(&self, node: &BlockNode, ctx: &Context<'_>) -> Vec<String> {
        self.graph
            .get_parents(&node.block_id)
            .into_iter()
            .filter(|edge| self.is_active(&edge.from_block_id))
            .filter(|edge| {
                edge.condition
                    .as_ref()
                    .is_none_or(|c| c.holds(self.engine(), ctx, &node.block_id))
            })
            .map(|edge| edge.from_block_id.clone())
            .fold(Vec::new(), |mut ids, id| {
                if !ids.contains(&id) {
                    ids.push(id);
                }
                ids
            })
    }

    fn track(&mut self, instance: DynamicBlockDetection) {
        if let Some(old) = self.tracked.insert(instance.block_id.clone(), instance)
            && old.status == BlockStatus::Completed
        {
            self.superseded.push(old);
        }
    }

    fn try_exit(&mut self, node: &BlockNode, index: usize) {
        let ended_at = {
            let ctx = self.context(index);
            let Some(condition) = node
                .exit_conditions
                .iter()
                .find(|c| c.holds(self.engine(), &ctx, &node.block_id))
            else {
                return;
            };
            self.exit_date(node, condition, index)
        };
        self.complete(&node.block_id, ended_at, "exit");
    }

    fn exit_date(&self, node: &BlockNode, condition: &Condition, index: usize) -> NaiveDate {
        let today = self.series[index].date;
        match condition.termination() {
            TerminationKind::ValueBased => today,
            TerminationKind::ExistsBased => {
                let started_at = self
                    .tracked
                    .get(&node.block_id)
                    .and_then(|b| b.started_at);
                let same_day_sibling = condition.referenced_blocks().iter().any(|id| {
                    self.tracked
                        .get(id)
                        .is_some_and(|b| b.started_at.is_some() && b.started_at == started_at)
                });
                if same_day_sibling {
                    today
                } else {
                    last_trading_day_before(self.series, index)
                        .map_or(today, |i| self.series[i].date)
                }
            }
        }
    }

    fn complete(&mut self, block_id: &str, ended_at: NaiveDate, reason: &str) {
        let Some(block) = self.tracked.get_mut(block_id) else {
            return;
        };
        match block.complete(ended_at) {
            Ok(()) => debug!(
                "{} [{}] completed on {:?} ({})",
                self.ticker, block_id, block.ended_at, reason
            ),
            Err(err) => debug!("{} [{}] not completed: {}", self.ticker, block_id, err),
        }
    }

    fn finish(self) -> DetectionRun {
        let mut tracked = self.tracked;
        let mut detections: Vec<DynamicBlockDetection> = self
            .graph
            .nodes()
            .iter()
            .filter_map(|n| tracked.remove(&n.block_id))
            .collect();
        detections.extend(tracked.into_values());
        DetectionRun {
            ticker: self.ticker.to_string(),
            detections,
            superseded: self.superseded,
        }
    }
}
