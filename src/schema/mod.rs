//! Graph schema model
//!
//! Typed description of the node kinds and edge kinds the engine is allowed
//! to query. The schema is loaded once at startup, validated, and shared
//! read-only (`Arc<GraphSchema>`) for the process lifetime. Everything
//! downstream — intent validation, plan binding, cost estimation — is
//! expressed against these declarations, never against raw strings.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Schema errors
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Edge kind references a node kind that was never declared
    #[error("edge kind {edge} references undeclared node kind {endpoint}")]
    DanglingEndpoint { edge: String, endpoint: String },

    /// Duplicate declaration
    #[error("duplicate declaration: {0}")]
    Duplicate(String),

    /// Declaration file could not be read
    #[error("failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    /// Declaration file could not be parsed
    #[error("failed to parse schema declaration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Attribute value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrType {
    String,
    Integer,
    Float,
    Boolean,
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrType::String => write!(f, "string"),
            AttrType::Integer => write!(f, "integer"),
            AttrType::Float => write!(f, "float"),
            AttrType::Boolean => write!(f, "boolean"),
        }
    }
}

/// A declared category of graph vertex (e.g. Movie, User)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeKind {
    pub name: String,
    /// Attribute name -> type, in declaration order
    #[serde(default)]
    pub attributes: IndexMap<String, AttrType>,
    /// Rough population of this kind in the store. Used as the cost
    /// estimate for zero-hop scans, the way `fanout_hint` is for hops.
    #[serde(default = "default_expected_count")]
    pub expected_count: u64,
}

fn default_expected_count() -> u64 {
    10_000
}

impl NodeKind {
    pub fn attr_type(&self, attribute: &str) -> Option<AttrType> {
        self.attributes.get(attribute).copied()
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }
}

/// A declared, typed relationship between two node kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeKind {
    pub name: String,
    /// Source node kind name
    pub source: String,
    /// Target node kind name
    pub target: String,
    /// Directed edges may only be traversed source->target (forward) or
    /// target->source (reverse); undirected edges traverse either way.
    #[serde(default = "default_directed")]
    pub directed: bool,
    #[serde(default)]
    pub attributes: IndexMap<String, AttrType>,
    /// Expected out-degree per node. The plan builder multiplies these
    /// along a bound path to estimate how many nodes a traversal touches.
    #[serde(default = "default_fanout")]
    pub fanout_hint: u64,
}

fn default_directed() -> bool {
    true
}

fn default_fanout() -> u64 {
    50
}

/// Declaration document shape for YAML loading
#[derive(Debug, Deserialize)]
struct SchemaDecl {
    #[serde(default)]
    nodes: Vec<NodeKind>,
    #[serde(default)]
    edges: Vec<EdgeKind>,
}

/// Immutable, validated graph schema
///
/// Invariant: every edge kind's endpoints reference declared node kinds.
/// Construction is the only place this is checked; once built the schema
/// never changes.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSchema {
    node_kinds: IndexMap<String, NodeKind>,
    edge_kinds: IndexMap<String, EdgeKind>,
}

impl GraphSchema {
    /// Build a schema from declarations, validating edge endpoints
    pub fn new(nodes: Vec<NodeKind>, edges: Vec<EdgeKind>) -> SchemaResult<Self> {
        let mut node_kinds = IndexMap::new();
        for node in nodes {
            if node_kinds.contains_key(&node.name) {
                return Err(SchemaError::Duplicate(node.name));
            }
            node_kinds.insert(node.name.clone(), node);
        }

        let mut edge_kinds = IndexMap::new();
        for edge in edges {
            for endpoint in [&edge.source, &edge.target] {
                if !node_kinds.contains_key(endpoint) {
                    return Err(SchemaError::DanglingEndpoint {
                        edge: edge.name.clone(),
                        endpoint: endpoint.clone(),
                    });
                }
            }
            if edge_kinds.contains_key(&edge.name) {
                return Err(SchemaError::Duplicate(edge.name));
            }
            edge_kinds.insert(edge.name.clone(), edge);
        }

        Ok(Self {
            node_kinds,
            edge_kinds,
        })
    }

    /// Load a schema from a YAML declaration string
    pub fn from_yaml_str(decl: &str) -> SchemaResult<Self> {
        let decl: SchemaDecl = serde_yaml::from_str(decl)?;
        Self::new(decl.nodes, decl.edges)
    }

    /// Load a schema from a YAML declaration file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn node_kind(&self, name: &str) -> Option<&NodeKind> {
        self.node_kinds.get(name)
    }

    pub fn edge_kind(&self, name: &str) -> Option<&EdgeKind> {
        self.edge_kinds.get(name)
    }

    pub fn node_kinds(&self) -> impl Iterator<Item = &NodeKind> {
        self.node_kinds.values()
    }

    pub fn edge_kinds(&self) -> impl Iterator<Item = &EdgeKind> {
        self.edge_kinds.values()
    }

    /// Render the closed vocabulary block embedded in the intent prompt.
    ///
    /// Only names that appear here are legal in a model reply; the parser
    /// rejects anything else.
    pub fn vocabulary(&self) -> String {
        let mut out = String::from("Node kinds:\n");
        for kind in self.node_kinds.values() {
            let attrs: Vec<String> = kind
                .attributes
                .iter()
                .map(|(name, ty)| format!("{name}: {ty}"))
                .collect();
            out.push_str(&format!("  {} {{ {} }}\n", kind.name, attrs.join(", ")));
        }
        out.push_str("Edge kinds:\n");
        for edge in self.edge_kinds.values() {
            let arrow = if edge.directed { "->" } else { "--" };
            out.push_str(&format!(
                "  {}: ({}) {} ({})\n",
                edge.name, edge.source, arrow, edge.target
            ));
        }
        out
    }

    /// Built-in MovieLens-shaped schema used by the demo binary and tests
    pub fn movielens() -> Self {
        let nodes = vec![
            NodeKind {
                name: "User".into(),
                attributes: IndexMap::from([("name".to_string(), AttrType::String)]),
                expected_count: 1_000,
            },
            NodeKind {
                name: "Movie".into(),
                attributes: IndexMap::from([
                    ("title".to_string(), AttrType::String),
                    ("year".to_string(), AttrType::Integer),
                    ("popularity".to_string(), AttrType::Float),
                ]),
                expected_count: 10_000,
            },
            NodeKind {
                name: "Genre".into(),
                attributes: IndexMap::from([("name".to_string(), AttrType::String)]),
                expected_count: 20,
            },
            NodeKind {
                name: "Person".into(),
                attributes: IndexMap::from([("name".to_string(), AttrType::String)]),
                expected_count: 5_000,
            },
        ];
        let edges = vec![
            EdgeKind {
                name: "RATED".into(),
                source: "User".into(),
                target: "Movie".into(),
                directed: true,
                attributes: IndexMap::from([("rating".to_string(), AttrType::Float)]),
                fanout_hint: 100,
            },
            EdgeKind {
                name: "BELONGS_TO".into(),
                source: "Movie".into(),
                target: "Genre".into(),
                directed: true,
                attributes: IndexMap::new(),
                fanout_hint: 3,
            },
            EdgeKind {
                name: "ACTED_IN".into(),
                source: "Person".into(),
                target: "Movie".into(),
                directed: true,
                attributes: IndexMap::from([("role".to_string(), AttrType::String)]),
                fanout_hint: 10,
            },
            EdgeKind {
                name: "SIMILAR_TO".into(),
                source: "Movie".into(),
                target: "Movie".into(),
                directed: false,
                attributes: IndexMap::from([("similarity".to_string(), AttrType::Float)]),
                fanout_hint: 10,
            },
        ];
        Self::new(nodes, edges).expect("built-in schema is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movielens_schema_is_valid() {
        let schema = GraphSchema::movielens();
        assert!(schema.node_kind("Movie").is_some());
        assert!(schema.edge_kind("RATED").is_some());
        assert!(schema.edge_kind("DIRECTED_BY").is_none());
    }

    #[test]
    fn test_dangling_endpoint_rejected() {
        let nodes = vec![NodeKind {
            name: "Movie".into(),
            attributes: IndexMap::new(),
            expected_count: 10,
        }];
        let edges = vec![EdgeKind {
            name: "DIRECTED_BY".into(),
            source: "Movie".into(),
            target: "Director".into(),
            directed: true,
            attributes: IndexMap::new(),
            fanout_hint: 1,
        }];
        let err = GraphSchema::new(nodes, edges).unwrap_err();
        assert!(matches!(err, SchemaError::DanglingEndpoint { .. }));
    }

    #[test]
    fn test_yaml_round_trip() {
        let decl = r#"
nodes:
  - name: Movie
    attributes:
      title: string
      year: integer
  - name: Genre
    attributes:
      name: string
edges:
  - name: BELONGS_TO
    source: Movie
    target: Genre
    fanout_hint: 3
"#;
        let schema = GraphSchema::from_yaml_str(decl).unwrap();
        let movie = schema.node_kind("Movie").unwrap();
        assert_eq!(movie.attr_type("year"), Some(AttrType::Integer));
        // defaults applied
        assert!(schema.edge_kind("BELONGS_TO").unwrap().directed);
        assert_eq!(movie.expected_count, 10_000);
    }

    #[test]
    fn test_vocabulary_contains_declared_names_only() {
        let schema = GraphSchema::movielens();
        let vocab = schema.vocabulary();
        assert!(vocab.contains("RATED"));
        assert!(vocab.contains("Movie"));
        assert!(vocab.contains("SIMILAR_TO: (Movie) -- (Movie)"));
    }
}
