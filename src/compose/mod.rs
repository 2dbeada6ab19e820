//! Response composition
//!
//! Pure aggregation of ranked items into the final payload: a deterministic
//! template summary (no model call), the ordered item list, and a
//! deduplicated subgraph of every node and edge the explanation traces
//! touched, shaped for a visualization layer.

use crate::exec::EdgeRecord;
use crate::intent::{FilterAnchor, QueryIntent, ScalarValue, Signal};
use crate::rank::RankedItem;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A node shaped for visualization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphNode {
    pub id: u64,
    pub kind: String,
    pub label: String,
    /// "result" for recommended nodes, "context" for everything on the
    /// evidence paths
    pub group: String,
}

/// An edge shaped for visualization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphLink {
    pub id: u64,
    pub kind: String,
    pub source: u64,
    pub target: u64,
    pub weight: Option<f64>,
}

/// Union of all evidence paths, deduplicated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<SubgraphNode>,
    pub links: Vec<SubgraphLink>,
}

/// Final payload handed back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub summary: String,
    pub items: Vec<RankedItem>,
    pub subgraph: Subgraph,
    /// The intent that produced this payload, echoed so the caller can
    /// build follow-up turns
    pub intent: QueryIntent,
}

impl ResponsePayload {
    /// The payload for a zero-limit request: empty, not an error
    pub fn empty(intent: QueryIntent) -> Self {
        Self {
            summary: "No results requested.".into(),
            items: Vec::new(),
            subgraph: Subgraph::default(),
            intent,
        }
    }
}

/// Merge ranked items and the originating intent into a payload
pub fn compose(intent: &QueryIntent, items: Vec<RankedItem>) -> ResponsePayload {
    let subgraph = build_subgraph(&items);
    let summary = render_summary(intent, &items);
    ResponsePayload {
        summary,
        items,
        subgraph,
        intent: intent.clone(),
    }
}

fn build_subgraph(items: &[RankedItem]) -> Subgraph {
    let mut nodes: IndexMap<u64, SubgraphNode> = IndexMap::new();
    let mut links: IndexMap<u64, SubgraphLink> = IndexMap::new();

    for item in items {
        nodes.insert(
            item.node.id,
            SubgraphNode {
                id: item.node.id,
                kind: item.node.kind.clone(),
                label: item.node.display_label(),
                group: "result".into(),
            },
        );
    }

    for item in items {
        for path in &item.trace.paths {
            for node in &path.nodes {
                nodes.entry(node.id).or_insert_with(|| SubgraphNode {
                    id: node.id,
                    kind: node.kind.clone(),
                    label: node.display_label(),
                    group: "context".into(),
                });
            }
            for edge in &path.edges {
                links.entry(edge.id).or_insert_with(|| SubgraphLink {
                    id: edge.id,
                    kind: edge.kind.clone(),
                    source: edge.source,
                    target: edge.target,
                    weight: edge_weight(edge),
                });
            }
        }
    }

    Subgraph {
        nodes: nodes.into_values().collect(),
        links: links.into_values().collect(),
    }
}

/// First numeric attribute on the edge, if any
fn edge_weight(edge: &EdgeRecord) -> Option<f64> {
    edge.attrs.values().find_map(ScalarValue::as_float)
}

fn render_summary(intent: &QueryIntent, items: &[RankedItem]) -> String {
    let subject = describe_intent(intent);
    if items.is_empty() {
        return format!("No {subject} found.");
    }

    let mut summary = format!("Top {subject}:\n");
    for (position, item) in items.iter().enumerate() {
        summary.push_str(&format!("{}. {}", position + 1, item.node.display_label()));
        if let Some(reason) = dominant_reason(item) {
            summary.push_str(&format!(" — {reason}"));
        }
        summary.push('\n');
    }
    summary
}

/// "Movie results related to \"Inception\"" and similar
fn describe_intent(intent: &QueryIntent) -> String {
    let anchor_value = intent.filters.iter().find_map(|filter| {
        matches!(filter.anchor, FilterAnchor::PathStart(_))
            .then(|| filter.value.clone())
    });
    match anchor_value {
        Some(ScalarValue::String(name)) => {
            format!("{} results related to \"{}\"", intent.target, name)
        }
        Some(value) => format!("{} results related to {}", intent.target, value),
        None => format!("{} results", intent.target),
    }
}

fn dominant_reason(item: &RankedItem) -> Option<String> {
    let dominant = item.trace.dominant?;
    let raw = item
        .signals
        .iter()
        .find(|signal| signal.signal == dominant)?
        .raw;
    let reason = match dominant {
        Signal::SharedNeighbors => format!("{raw:.0} shared raters"),
        Signal::AverageRating => format!("rated {raw:.1} on average"),
        Signal::RatingOverlap => format!("{raw:.0} closely matched ratings"),
        Signal::PathLength => format!("{raw:.0} hops away"),
        Signal::EdgeWeight => format!("similarity {raw:.2}"),
        Signal::GenreOverlap => format!("{raw:.0} shared genres"),
        Signal::Popularity => format!("popularity {raw:.0}"),
    };
    Some(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{NodeRecord, PathRecord};
    use crate::rank::{ExplanationTrace, SignalValue};

    fn node(id: u64, title: &str) -> NodeRecord {
        let mut attrs = IndexMap::new();
        attrs.insert("title".to_string(), ScalarValue::String(title.into()));
        NodeRecord {
            id,
            kind: "Movie".into(),
            attrs,
        }
    }

    fn edge(id: u64, source: u64, target: u64) -> EdgeRecord {
        EdgeRecord {
            id,
            kind: "RATED".into(),
            source,
            target,
            attrs: IndexMap::new(),
        }
    }

    fn item_with_path(id: u64, title: &str, path: PathRecord) -> RankedItem {
        RankedItem {
            node: node(id, title),
            score: 1.0,
            signals: vec![SignalValue {
                signal: Signal::SharedNeighbors,
                raw: 2.0,
                normalized: 1.0,
                weight: 1.0,
                contribution: 1.0,
            }],
            trace: ExplanationTrace {
                paths: vec![path],
                dominant: Some(Signal::SharedNeighbors),
            },
        }
    }

    fn intent() -> QueryIntent {
        QueryIntent {
            target: "Movie".into(),
            filters: vec![],
            paths: vec![],
            ranking: vec![],
            limit: 10,
        }
    }

    #[test]
    fn test_subgraph_deduplicates_shared_evidence() {
        // Two items reached through the same user node
        let shared_user = NodeRecord {
            id: 100,
            kind: "User".into(),
            attrs: IndexMap::new(),
        };
        let path_a = PathRecord {
            nodes: vec![node(1, "Inception"), shared_user.clone(), node(2, "The Matrix")],
            edges: vec![edge(10, 100, 1), edge(11, 100, 2)],
        };
        let path_b = PathRecord {
            nodes: vec![node(1, "Inception"), shared_user, node(3, "Memento")],
            edges: vec![edge(10, 100, 1), edge(12, 100, 3)],
        };

        let payload = compose(
            &intent(),
            vec![
                item_with_path(2, "The Matrix", path_a),
                item_with_path(3, "Memento", path_b),
            ],
        );

        // user 100 and edge 10 appear once
        assert_eq!(
            payload.subgraph.nodes.iter().filter(|n| n.id == 100).count(),
            1
        );
        assert_eq!(
            payload.subgraph.links.iter().filter(|l| l.id == 10).count(),
            1
        );
    }

    #[test]
    fn test_result_group_wins_over_context() {
        let path = PathRecord {
            nodes: vec![node(2, "The Matrix")],
            edges: vec![],
        };
        let payload = compose(&intent(), vec![item_with_path(2, "The Matrix", path)]);
        assert_eq!(payload.subgraph.nodes.len(), 1);
        assert_eq!(payload.subgraph.nodes[0].group, "result");
    }

    #[test]
    fn test_summary_names_items_and_reasons() {
        let path = PathRecord {
            nodes: vec![],
            edges: vec![],
        };
        let payload = compose(&intent(), vec![item_with_path(2, "The Matrix", path)]);
        assert!(payload.summary.contains("1. The Matrix"));
        assert!(payload.summary.contains("2 shared raters"));
    }

    #[test]
    fn test_empty_payload_has_no_items() {
        let payload = ResponsePayload::empty(intent());
        assert!(payload.items.is_empty());
        assert!(payload.subgraph.nodes.is_empty());
    }
}
