//! Block graph loader over INI configuration.
//!
//! ```ini
//! [graph]
//! root = block1
//! nodes = block1, block2
//!
//! [node block2]
//! type = 2
//! spot_condition = is_spot_candidate('block1', 1, 2)
//! levelup = true
//! exclude_stay = volume_check
//!
//! [node block2 entry]
//! surge = current.close >= prev.close * 1.1
//! surge.description = close up 10% on the day
//!
//! [edge block1 block2]
//! condition = current.volume > 0
//! ```
//!
//! Node iteration order is the `nodes` list. Conditions within a section are
//! ordered by key; a `<name>.description` key documents condition `<name>`.

use crate::domain::condition::Condition;
use crate::domain::error::{BlockscanError, GraphError};
use crate::domain::graph::{BlockEdge, BlockGraph, BlockNode, RetroStrategy};
use crate::ports::config_port::ConfigPort;
use log::warn;

fn missing(section: &str, key: &str) -> BlockscanError {
    BlockscanError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn comma_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn condition(node: &str, name: &str, text: &str) -> Result<Condition, GraphError> {
    Condition::new(name, text).map_err(|source| GraphError::InvalidCondition {
        node: node.to_string(),
        condition: name.to_string(),
        source,
    })
}

const DESCRIPTION_SUFFIX: &str = ".description";

/// Conditions of `[node <id> <kind>]`, ordered by key.
fn conditions(
    config: &dyn ConfigPort,
    node: &str,
    kind: &str,
) -> Result<Vec<Condition>, BlockscanError> {
    let section = format!("node {} {}", node, kind);
    let keys = config.keys(&section);
    let mut out = Vec::new();
    for key in &keys {
        if let Some(name) = key.strip_suffix(DESCRIPTION_SUFFIX) {
            if !keys.iter().any(|k| k == name) {
                warn!("[{}] {} describes no condition", section, key);
            }
            continue;
        }
        let text = config.get_string(&section, key).unwrap_or_default();
        if text.trim().is_empty() {
            return Err(BlockscanError::ConfigInvalid {
                section,
                key: key.clone(),
                reason: "condition expression is empty".to_string(),
            });
        }
        let mut parsed = condition(node, key, &text)?;
        if let Some(description) =
            config.get_string(&section, &format!("{}{}", key, DESCRIPTION_SUFFIX))
        {
            parsed = parsed.with_description(description.trim());
        }
        out.push(parsed);
    }
    Ok(out)
}

fn load_node(config: &dyn ConfigPort, block_id: &str) -> Result<BlockNode, BlockscanError> {
    let section = format!("node {}", block_id);
    let type_text = config
        .get_string(&section, "type")
        .ok_or_else(|| missing(&section, "type"))?;
    let block_type: u32 = type_text
        .trim()
        .parse()
        .map_err(|_| BlockscanError::ConfigInvalid {
            section: section.clone(),
            key: "type".to_string(),
            reason: format!("expected a non-negative integer, got '{}'", type_text),
        })?;

    let mut node = BlockNode::new(block_id, block_type)
        .with_levelup(config.get_bool(&section, "levelup", false));
    for c in conditions(config, block_id, "entry")? {
        node = node.with_entry(c);
    }
    for c in conditions(config, block_id, "exit")? {
        node = node.with_exit(c);
    }
    for c in conditions(config, block_id, "spot_entry")? {
        node = node.with_spot_entry(c);
    }
    if let Some(text) = config
        .get_string(&section, "spot_condition")
        .filter(|t| !t.trim().is_empty())
    {
        node = node.with_spot_condition(condition(block_id, "spot_condition", &text)?);
    }

    for (key, strategy) in [
        ("exclude_levelup", RetroStrategy::Levelup),
        ("exclude_stay", RetroStrategy::Stay),
    ] {
        for name in comma_list(config.get_string(&section, key)) {
            if !node.spot_entry_conditions.iter().any(|c| c.name == name) {
                warn!("[{}] {} names unknown spot_entry condition '{}'", section, key, name);
            }
            node = node.exclude(strategy, &name);
        }
    }
    Ok(node)
}

fn load_edges(config: &dyn ConfigPort) -> Result<Vec<BlockEdge>, BlockscanError> {
    let mut edges = Vec::new();
    for section in config.sections() {
        let mut parts = section.split_whitespace();
        if parts.next() != Some("edge") {
            continue;
        }
        let (Some(from), Some(to), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(BlockscanError::ConfigInvalid {
                section: section.clone(),
                key: String::new(),
                reason: "edge sections are named [edge <from> <to>]".to_string(),
            });
        };
        let mut edge = BlockEdge::new(from, to);
        if let Some(text) = config
            .get_string(&section, "condition")
            .filter(|t| !t.trim().is_empty())
        {
            edge = edge.with_condition(condition(to, "edge_condition", &text)?);
        }
        edges.push(edge);
    }
    Ok(edges)
}

/// Build and validate the block graph described by `config`.
pub fn load_graph(config: &dyn ConfigPort) -> Result<BlockGraph, BlockscanError> {
    let root = config
        .get_string("graph", "root")
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .ok_or_else(|| missing("graph", "root"))?;
    let ids = comma_list(config.get_string("graph", "nodes"));
    if ids.is_empty() {
        return Err(missing("graph", "nodes"));
    }

    for section in config.sections() {
        let mut parts = section.split_whitespace();
        if parts.next() == Some("node")
            && let Some(id) = parts.next()
            && !ids.iter().any(|n| n == id)
        {
            warn!("[{}] is not listed in [graph] nodes and is ignored", section);
        }
    }

    let nodes = ids
        .iter()
        .map(|id| load_node(config, id))
        .collect::<Result<Vec<_>, _>>()?;
    let edges = load_edges(config)?;
    Ok(BlockGraph::new(&root, nodes, edges)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::condition::TerminationKind;

    const GRAPH: &str = r#"
[graph]
root = block1
nodes = block1, block2

[node block1]
type = 1

[node block1 entry]
b_volume = current.volume >= 1000
b_volume.description = liquid enough to trade
a_price = current.close > 10

[node block1 exit]
next = exists('block2')
drop = current.close < block1.peak_price * 0.8

[node block2]
type = 2
spot_condition = is_spot_candidate('block1', 1, 3)
levelup = yes
exclude_stay = volume

[node block2 entry]
surge = current.close >= prev.close * 1.1

[node block2 spot_entry]
volume = current.volume > 5000
price = current.close > 12

[edge block1 block2]
condition = current.volume > 0
"#;

    fn load(content: &str) -> Result<BlockGraph, BlockscanError> {
        load_graph(&FileConfigAdapter::from_string(content).unwrap())
    }

    #[test]
    fn loads_nodes_conditions_and_edges() {
        let graph = load(GRAPH).unwrap();
        assert_eq!(graph.root_node_id, "block1");

        let b1 = graph.get_node("block1").unwrap();
        let entry: Vec<&str> = b1.entry_conditions.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(entry, ["a_price", "b_volume"]);
        assert_eq!(b1.entry_conditions[0].description, "");
        assert_eq!(b1.entry_conditions[1].description, "liquid enough to trade");
        let exits: Vec<TerminationKind> =
            b1.exit_conditions.iter().map(|c| c.termination()).collect();
        assert_eq!(exits, [TerminationKind::ValueBased, TerminationKind::ExistsBased]);

        let b2 = graph.get_node("block2").unwrap();
        assert!(b2.levelup);
        let reference = b2.spot_reference().unwrap();
        assert_eq!(
            (reference.predecessor.as_str(), reference.nearest, reference.farthest),
            ("block1", 1, 3)
        );
        let stay: Vec<&str> = b2
            .spot_entry_for(RetroStrategy::Stay)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(stay, ["price"]);

        let parents = graph.get_parents("block2");
        assert_eq!(parents.len(), 1);
        assert!(parents[0].condition.is_some());
    }

    #[test]
    fn node_order_follows_nodes_list() {
        let graph = load(
            "[graph]\nroot = b\nnodes = z, b, m\n[node z]\ntype = 3\n[node b]\ntype = 1\n[node m]\ntype = 2\n",
        )
        .unwrap();
        let order: Vec<&str> = graph.nodes().iter().map(|n| n.block_id.as_str()).collect();
        assert_eq!(order, ["z", "b", "m"]);
    }

    #[test]
    fn missing_root_key() {
        assert!(matches!(
            load("[graph]\nnodes = a\n[node a]\ntype = 1\n"),
            Err(BlockscanError::ConfigMissing { key, .. }) if key == "root"
        ));
    }

    #[test]
    fn root_not_in_nodes_is_graph_error() {
        assert!(matches!(
            load("[graph]\nroot = x\nnodes = a\n[node a]\ntype = 1\n"),
            Err(BlockscanError::Graph(GraphError::MissingRoot(_)))
        ));
    }

    #[test]
    fn bad_type_is_invalid() {
        assert!(matches!(
            load("[graph]\nroot = a\nnodes = a\n[node a]\ntype = -1\n"),
            Err(BlockscanError::ConfigInvalid { key, .. }) if key == "type"
        ));
        assert!(matches!(
            load("[graph]\nroot = a\nnodes = a\n"),
            Err(BlockscanError::ConfigMissing { key, .. }) if key == "type"
        ));
    }

    #[test]
    fn unparseable_condition_is_graph_error() {
        let err = load("[graph]\nroot = a\nnodes = a\n[node a]\ntype = 1\n[node a entry]\nbroken = current.close >\n")
            .unwrap_err();
        assert!(matches!(
            err,
            BlockscanError::Graph(GraphError::InvalidCondition { condition, .. }) if condition == "broken"
        ));
    }

    #[test]
    fn orphan_description_is_ignored() {
        let graph = load(
            "[graph]\nroot = a\nnodes = a\n[node a]\ntype = 1\n[node a exit]\nstop = current.close < 5\nghost.description = nothing here\n",
        )
        .unwrap();
        let exits = &graph.get_node("a").unwrap().exit_conditions;
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].name, "stop");
    }

    #[test]
    fn dangling_edge_is_graph_error() {
        assert!(matches!(
            load("[graph]\nroot = a\nnodes = a\n[node a]\ntype = 1\n[edge a ghost]\ncondition = True\n"),
            Err(BlockscanError::Graph(GraphError::DanglingEdge { .. }))
        ));
    }
}
