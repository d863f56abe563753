//! Spot strategy chain.
//!
//! When a node's entry conditions fire, the chain decides whether the event
//! is a new instance or a refinement of an existing one. Strategies are tried
//! in order and the first decision wins; no decision means "create a new
//! instance anchored today".
//!
//! Strategies only decide. The detector applies the decision to its tracked
//! instances.

use crate::domain::block::{DynamicBlockDetection, Spot};
use crate::domain::context::{Context, last_trading_day_before};
use crate::domain::expr_eval::ExpressionEngine;
use crate::domain::graph::{BlockGraph, BlockNode, RetroStrategy, SpotReference};
use crate::domain::stock::Stock;
use std::collections::BTreeMap;

/// Everything a strategy may look at for one (node, day) event.
pub struct SpotInput<'a> {
    pub node: &'a BlockNode,
    pub graph: &'a BlockGraph,
    pub engine: &'a ExpressionEngine,
    pub series: &'a [Stock],
    pub index: usize,
    pub tracked: &'a BTreeMap<String, DynamicBlockDetection>,
    /// Result of the node's spot condition today; false when it has none.
    pub spot_condition_met: bool,
}

impl<'a> SpotInput<'a> {
    fn current(&self) -> &'a Stock {
        &self.series[self.index]
    }

    /// Tracked predecessor named by the spot condition, if it is ACTIVE.
    fn active_predecessor(&self) -> Option<(&'a SpotReference, &'a DynamicBlockDetection)> {
        let reference = self.node.spot_reference()?;
        let tracked: &'a BTreeMap<String, DynamicBlockDetection> = self.tracked;
        let predecessor = tracked.get(&reference.predecessor)?;
        predecessor.is_active().then_some((reference, predecessor))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpotDecision {
    /// Append `spots` to the ACTIVE instance `target`; no new instance.
    Fold { target: String, spots: Vec<Spot> },
    /// Create the new instance backdated to `series[anchor]` and complete
    /// `predecessor` on the last trading day before the anchor.
    Levelup { predecessor: String, anchor: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpotOutcome {
    pub strategy: &'static str,
    pub decision: SpotDecision,
}

pub trait SpotStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn decide(&self, input: &SpotInput<'_>) -> Option<SpotDecision>;
}

/// Index of the `offset`-th trading day before `index`.
fn trading_day_back(series: &[Stock], index: usize, offset: usize) -> Option<usize> {
    let mut at = index;
    for _ in 0..offset {
        at = last_trading_day_before(series, at)?;
    }
    Some(at)
}

/// Nearest offset whose day satisfies every spot-entry condition the
/// strategy evaluates. Anchors must fall after the predecessor's start.
fn retrospective_anchor(
    input: &SpotInput<'_>,
    strategy: RetroStrategy,
    reference: &SpotReference,
    predecessor: &DynamicBlockDetection,
) -> Option<usize> {
    if input.node.spot_entry_conditions.is_empty() {
        return None;
    }
    for offset in reference.offsets() {
        let anchor = trading_day_back(input.series, input.index, offset)?;
        let anchor_date = input.series[anchor].date;
        if predecessor.started_at.is_some_and(|start| anchor_date <= start) {
            break;
        }
        let ctx = Context::for_day(input.series, anchor).with_blocks(input.tracked.values());
        let satisfied = input
            .node
            .spot_entry_for(strategy)
            .all(|c| c.holds(input.engine, &ctx, &input.node.block_id));
        if satisfied {
            return Some(anchor);
        }
    }
    None
}

/// Promote to a new instance whose start is backdated to the retrospective
/// anchor, closing the predecessor just before it.
pub struct LevelupSpot;

impl SpotStrategy for LevelupSpot {
    fn name(&self) -> &'static str {
        "levelup"
    }

    fn decide(&self, input: &SpotInput<'_>) -> Option<SpotDecision> {
        if !input.node.levelup || !input.spot_condition_met {
            return None;
        }
        let (reference, predecessor) = input.active_predecessor()?;
        if !predecessor.can_accept_spot() {
            return None;
        }
        let anchor = retrospective_anchor(input, RetroStrategy::Levelup, reference, predecessor)?;
        Some(SpotDecision::Levelup {
            predecessor: reference.predecessor.clone(),
            anchor,
        })
    }
}

/// Keep the predecessor alive, folding the anchor day and today as spots.
pub struct StaySpot;

impl SpotStrategy for StaySpot {
    fn name(&self) -> &'static str {
        "stay"
    }

    fn decide(&self, input: &SpotInput<'_>) -> Option<SpotDecision> {
        if !input.spot_condition_met {
            return None;
        }
        let (reference, predecessor) = input.active_predecessor()?;
        if predecessor.free_spot_slots() < 2 {
            return None;
        }
        let anchor = retrospective_anchor(input, RetroStrategy::Stay, reference, predecessor)?;
        Some(SpotDecision::Fold {
            target: reference.predecessor.clone(),
            spots: vec![
                Spot::from(&input.series[anchor]),
                Spot::from(input.current()),
            ],
        })
    }
}

/// Fold today into the predecessor named by the spot condition.
pub struct ExpressionBasedSpot;

impl SpotStrategy for ExpressionBasedSpot {
    fn name(&self) -> &'static str {
        "expression"
    }

    fn decide(&self, input: &SpotInput<'_>) -> Option<SpotDecision> {
        if !input.spot_condition_met {
            return None;
        }
        let (reference, predecessor) = input.active_predecessor()?;
        predecessor.can_accept_spot().then(|| SpotDecision::Fold {
            target: reference.predecessor.clone(),
            spots: vec![Spot::from(input.current())],
        })
    }
}

/// Nodes without a spot condition fold into the first ACTIVE instance one
/// block type below them, in graph node order.
pub struct FallbackSpot;

impl SpotStrategy for FallbackSpot {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn decide(&self, input: &SpotInput<'_>) -> Option<SpotDecision> {
        if input.node.spot_condition.is_some() {
            return None;
        }
        let wanted = input.node.block_type.checked_sub(1)?;
        input
            .graph
            .nodes()
            .iter()
            .filter(|n| n.block_id != input.node.block_id)
            .filter_map(|n| input.tracked.get(&n.block_id))
            .find(|b| b.block_type == wanted && b.can_accept_spot())
            .map(|b| SpotDecision::Fold {
                target: b.block_id.clone(),
                spots: vec![Spot::from(input.current())],
            })
    }
}

pub struct SpotChain {
    strategies: Vec<Box<dyn SpotStrategy>>,
}

impl Default for SpotChain {
    fn default() -> Self {
        Self::standard(true)
    }
}

impl SpotChain {
    pub fn new(strategies: Vec<Box<dyn SpotStrategy>>) -> Self {
        Self { strategies }
    }

    /// Levelup, Stay, ExpressionBased and, when enabled, Fallback.
    pub fn standard(fallback: bool) -> Self {
        let mut strategies: Vec<Box<dyn SpotStrategy>> = vec![
            Box::new(LevelupSpot),
            Box::new(StaySpot),
            Box::new(ExpressionBasedSpot),
        ];
        if fallback {
            strategies.push(Box::new(FallbackSpot));
        }
        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn decide(&self, input: &SpotInput<'_>) -> Option<SpotOutcome> {
        self.strategies.iter().find_map(|s| {
            s.decide(input).map(|decision| SpotOutcome {
                strategy: s.name(),
                decision,
            })
        })
    }
}

impl std::fmt::Debug for SpotChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.strategy_names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::condition::Condition;
    use crate::domain::graph::BlockEdge;
    use chrono::NaiveDate;

    fn day(d: u32, close: f64, volume: i64) -> Stock {
        Stock::new(
            "T",
            NaiveDate::from_ymd_opt(2024, 7, d).unwrap(),
            close,
            close + 1.0,
            close - 1.0,
            close,
            volume,
        )
        .unwrap()
    }

    fn series() -> Vec<Stock> {
        vec![
            day(1, 10.0, 100),
            day(2, 11.0, 100),
            day(3, 30.0, 900),
            day(4, 31.0, 100),
            day(5, 32.0, 100),
        ]
    }

    fn cond(name: &str, text: &str) -> Condition {
        Condition::new(name, text).unwrap()
    }

    fn node2() -> BlockNode {
        BlockNode::new("block2", 2)
            .with_spot_condition(cond("spot", "is_spot_candidate('block1', 1, 2)"))
            .with_spot_entry(cond("surge", "current.volume >= 500"))
    }

    fn graph(node: BlockNode) -> BlockGraph {
        BlockGraph::new(
            "block1",
            vec![BlockNode::new("block1", 1), node],
            vec![BlockEdge::new("block1", "block2")],
        )
        .unwrap()
    }

    fn tracked(block: DynamicBlockDetection) -> BTreeMap<String, DynamicBlockDetection> {
        BTreeMap::from([(block.block_id.clone(), block)])
    }

    fn decide(
        chain: &SpotChain,
        graph: &BlockGraph,
        series: &[Stock],
        index: usize,
        tracked: &BTreeMap<String, DynamicBlockDetection>,
        met: bool,
    ) -> Option<SpotOutcome> {
        let engine = ExpressionEngine::default();
        let input = SpotInput {
            node: graph.get_node("block2").unwrap(),
            graph,
            engine: &engine,
            series,
            index,
            tracked,
            spot_condition_met: met,
        };
        chain.decide(&input)
    }

    #[test]
    fn stay_folds_anchor_and_today() {
        let s = series();
        let g = graph(node2());
        let t = tracked(DynamicBlockDetection::start("block1", 1, "T", &s[0]));
        let outcome = decide(&SpotChain::default(), &g, &s, 4, &t, true).unwrap();
        assert_eq!(outcome.strategy, "stay");
        assert_eq!(
            outcome.decision,
            SpotDecision::Fold {
                target: "block1".into(),
                spots: vec![Spot::from(&s[2]), Spot::from(&s[4])],
            }
        );
    }

    #[test]
    fn levelup_wins_when_enabled() {
        let s = series();
        let g = graph(node2().with_levelup(true));
        let t = tracked(DynamicBlockDetection::start("block1", 1, "T", &s[0]));
        let outcome = decide(&SpotChain::default(), &g, &s, 4, &t, true).unwrap();
        assert_eq!(outcome.strategy, "levelup");
        assert_eq!(
            outcome.decision,
            SpotDecision::Levelup {
                predecessor: "block1".into(),
                anchor: 2,
            }
        );
    }

    #[test]
    fn excluded_condition_changes_scan() {
        let s = series();
        let node = node2()
            .with_spot_entry(cond("never", "current.volume > 10000"))
            .exclude(RetroStrategy::Stay, "never");
        let g = graph(node);
        let t = tracked(DynamicBlockDetection::start("block1", 1, "T", &s[0]));
        let outcome = decide(&SpotChain::default(), &g, &s, 4, &t, true).unwrap();
        assert_eq!(outcome.strategy, "stay");
    }

    #[test]
    fn expression_based_when_retro_scan_misses() {
        let s = series();
        let g = graph(node2());
        let t = tracked(DynamicBlockDetection::start("block1", 1, "T", &s[0]));
        // Offsets 1..=2 from day index 1 reach only index 0, the predecessor's start.
        let outcome = decide(&SpotChain::default(), &g, &s, 1, &t, true).unwrap();
        assert_eq!(outcome.strategy, "expression");
        assert_eq!(
            outcome.decision,
            SpotDecision::Fold {
                target: "block1".into(),
                spots: vec![Spot::from(&s[1])],
            }
        );
    }

    #[test]
    fn stay_needs_two_free_slots() {
        let s = series();
        let g = graph(node2());
        let mut b = DynamicBlockDetection::start("block1", 1, "T", &s[0]);
        b.add_spot(Spot::from(&s[1])).unwrap();
        let t = tracked(b);
        let outcome = decide(&SpotChain::default(), &g, &s, 4, &t, true).unwrap();
        assert_eq!(outcome.strategy, "expression");
    }

    #[test]
    fn no_decision_without_spot_condition_result() {
        let s = series();
        let g = graph(node2());
        let t = tracked(DynamicBlockDetection::start("block1", 1, "T", &s[0]));
        assert!(decide(&SpotChain::default(), &g, &s, 4, &t, false).is_none());
    }

    #[test]
    fn full_or_completed_predecessor_is_refused() {
        let s = series();
        let g = graph(node2());
        let mut b = DynamicBlockDetection::start("block1", 1, "T", &s[0]);
        b.add_spot(Spot::from(&s[1])).unwrap();
        b.add_spot(Spot::from(&s[2])).unwrap();
        assert!(decide(&SpotChain::default(), &g, &s, 4, &tracked(b), true).is_none());

        let mut b = DynamicBlockDetection::start("block1", 1, "T", &s[0]);
        b.complete(s[1].date).unwrap();
        assert!(decide(&SpotChain::default(), &g, &s, 4, &tracked(b), true).is_none());
    }

    #[test]
    fn fallback_targets_previous_block_type() {
        let s = series();
        let g = graph(BlockNode::new("block2", 2));
        let t = tracked(DynamicBlockDetection::start("block1", 1, "T", &s[0]));
        let outcome = decide(&SpotChain::default(), &g, &s, 3, &t, false).unwrap();
        assert_eq!(outcome.strategy, "fallback");
        assert_eq!(
            outcome.decision,
            SpotDecision::Fold {
                target: "block1".into(),
                spots: vec![Spot::from(&s[3])],
            }
        );

        assert!(decide(&SpotChain::standard(false), &g, &s, 3, &t, false).is_none());
    }

    #[test]
    fn retrospective_offsets_skip_zero_volume_days() {
        let s = vec![
            day(1, 10.0, 100),
            day(2, 30.0, 900),
            day(3, 30.0, 0),
            day(4, 31.0, 100),
        ];
        assert_eq!(trading_day_back(&s, 3, 1), Some(1));
        assert_eq!(trading_day_back(&s, 3, 2), Some(0));
        assert_eq!(trading_day_back(&s, 3, 3), None);
    }
}
