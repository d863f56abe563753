//! Block graph model: rule-bearing nodes and parent/child edges.
//!
//! Nodes keep insertion order; the detector visits them in that order.
//! Structural validation runs once when the graph is built, so the detector
//! can assume every referenced id resolves.

use crate::domain::condition::Condition;
use crate::domain::context::RESERVED_NAMES;
use crate::domain::error::GraphError;
use crate::domain::expr::{Expr, Literal};
use std::collections::{BTreeMap, BTreeSet};

/// Default retrospective offsets, in trading records before the current day.
pub const DEFAULT_NEAREST_OFFSET: usize = 1;
pub const DEFAULT_FARTHEST_OFFSET: usize = 2;

/// Predecessor named by a spot condition, with the retrospective scan range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotReference {
    pub predecessor: String,
    pub nearest: usize,
    pub farthest: usize,
}

impl SpotReference {
    /// Taken from the first call carrying a string literal: the literal names
    /// the predecessor and the integer literals after it give the offsets.
    pub fn from_expr(expr: &Expr) -> Option<Self> {
        expr.calls().into_iter().find_map(|call| {
            let Expr::Call { args, .. } = call else {
                return None;
            };
            let at = args
                .iter()
                .position(|a| matches!(a, Expr::Literal(Literal::Str(_))))?;
            let Expr::Literal(Literal::Str(predecessor)) = &args[at] else {
                return None;
            };

            let offsets: Vec<usize> = args[at + 1..]
                .iter()
                .filter_map(|a| match a {
                    Expr::Literal(Literal::Int(v)) if *v > 0 => usize::try_from(*v).ok(),
                    _ => None,
                })
                .take(2)
                .collect();
            let (nearest, farthest) = match offsets.as_slice() {
                [] => (DEFAULT_NEAREST_OFFSET, DEFAULT_FARTHEST_OFFSET),
                [one] => (*one, *one),
                [a, b, ..] => ((*a).min(*b), (*a).max(*b)),
            };

            Some(Self {
                predecessor: predecessor.clone(),
                nearest,
                farthest,
            })
        })
    }

    /// Offsets nearest first.
    pub fn offsets(&self) -> std::ops::RangeInclusive<usize> {
        self.nearest..=self.farthest
    }
}

/// Spot strategies that support excluding spot-entry conditions by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RetroStrategy {
    Levelup,
    Stay,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub block_id: String,
    pub block_type: u32,
    /// All must hold (AND).
    pub entry_conditions: Vec<Condition>,
    /// Any may hold (OR); the first satisfied one decides the end date.
    pub exit_conditions: Vec<Condition>,
    pub spot_condition: Option<Condition>,
    pub spot_entry_conditions: Vec<Condition>,
    /// Opt-in to the level-up strategy.
    pub levelup: bool,
    pub exclude_conditions: BTreeMap<RetroStrategy, BTreeSet<String>>,
    spot_reference: Option<SpotReference>,
}

impl BlockNode {
    pub fn new(block_id: &str, block_type: u32) -> Self {
        Self {
            block_id: block_id.to_string(),
            block_type,
            entry_conditions: Vec::new(),
            exit_conditions: Vec::new(),
            spot_condition: None,
            spot_entry_conditions: Vec::new(),
            levelup: false,
            exclude_conditions: BTreeMap::new(),
            spot_reference: None,
        }
    }

    pub fn with_entry(mut self, condition: Condition) -> Self {
        self.entry_conditions.push(condition);
        self
    }

    pub fn with_exit(mut self, condition: Condition) -> Self {
        self.exit_conditions.push(condition);
        self
    }

    pub fn with_spot_condition(mut self, condition: Condition) -> Self {
        self.spot_reference = SpotReference::from_expr(condition.ast());
        self.spot_condition = Some(condition);
        self
    }

    pub fn with_spot_entry(mut self, condition: Condition) -> Self {
        self.spot_entry_conditions.push(condition);
        self
    }

    pub fn with_levelup(mut self, levelup: bool) -> Self {
        self.levelup = levelup;
        self
    }

    pub fn exclude(mut self, strategy: RetroStrategy, condition_name: &str) -> Self {
        self.exclude_conditions
            .entry(strategy)
            .or_default()
            .insert(condition_name.to_string());
        self
    }

    pub fn spot_reference(&self) -> Option<&SpotReference> {
        self.spot_reference.as_ref()
    }

    /// Spot-entry conditions a strategy evaluates, minus its exclusions.
    pub fn spot_entry_for(&self, strategy: RetroStrategy) -> impl Iterator<Item = &Condition> {
        let excluded = self.exclude_conditions.get(&strategy);
        self.spot_entry_conditions
            .iter()
            .filter(move |c| excluded.is_none_or(|names| !names.contains(&c.name)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockEdge {
    pub from_block_id: String,
    pub to_block_id: String,
    /// When present, must hold on the creation day for the parent link.
    pub condition: Option<Condition>,
}

impl BlockEdge {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from_block_id: from.to_string(),
            to_block_id: to.to_string(),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockGraph {
    pub root_node_id: String,
    nodes: Vec<BlockNode>,
    index: BTreeMap<String, usize>,
    edges: Vec<BlockEdge>,
}

impl BlockGraph {
    /// Build and validate a graph.
    pub fn new(
        root_node_id: &str,
        nodes: Vec<BlockNode>,
        edges: Vec<BlockEdge>,
    ) -> Result<Self, GraphError> {
        let mut index = BTreeMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if RESERVED_NAMES.contains(&node.block_id.as_str()) {
                return Err(GraphError::ReservedBlockId(node.block_id.clone()));
            }
            if index.insert(node.block_id.clone(), i).is_some() {
                return Err(GraphError::DuplicateNode(node.block_id.clone()));
            }
        }

        let graph = Self {
            root_node_id: root_node_id.to_string(),
            nodes,
            index,
            edges,
        };
        graph.validate()?;
        Ok(graph)
    }

    fn validate(&self) -> Result<(), GraphError> {
        if !self.index.contains_key(&self.root_node_id) {
            return Err(GraphError::MissingRoot(self.root_node_id.clone()));
        }
        for edge in &self.edges {
            for id in [&edge.from_block_id, &edge.to_block_id] {
                if !self.index.contains_key(id) {
                    return Err(GraphError::DanglingEdge {
                        from: edge.from_block_id.clone(),
                        to: edge.to_block_id.clone(),
                        missing: id.clone(),
                    });
                }
            }
        }
        for node in &self.nodes {
            if let Some(reference) = node.spot_reference()
                && !self.index.contains_key(&reference.predecessor)
            {
                return Err(GraphError::UnknownSpotPredecessor {
                    node: node.block_id.clone(),
                    predecessor: reference.predecessor.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn get_node(&self, block_id: &str) -> Option<&BlockNode> {
        self.index.get(block_id).map(|&i| &self.nodes[i])
    }

    /// Nodes in iteration order.
    pub fn nodes(&self) -> &[BlockNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[BlockEdge] {
        &self.edges
    }

    /// Edges pointing at `block_id`.
    pub fn get_parents(&self, block_id: &str) -> Vec<&BlockEdge> {
        self.edges
            .iter()
            .filter(|e| e.to_block_id == block_id)
            .collect()
    }

    pub fn get_edges_from(&self, block_id: &str) -> Vec<&BlockEdge> {
        self.edges
            .iter()
            .filter(|e| e.from_block_id == block_id)
            .collect()
    }
}
