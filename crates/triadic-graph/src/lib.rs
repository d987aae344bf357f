//! Per-triad knowledge graph store.
//!
//! Each triad owns exactly one graph file, `<triad>_graph.json`, under the
//! graphs directory. The stop-hook orchestrator is the only writer;
//! everything else reads. The save protocol is non-negotiable:
//!
//! 1. validate against the schema (typed [`ValidationError`] with a field
//!    path on failure),
//! 2. back up the existing file under `backups/`,
//! 3. atomic-write the new file under an exclusive advisory lock,
//! 4. on a post-validation failure, restore the freshest backup.
//!
//! Graphs are directed multigraphs and may be cyclic. Referential
//! integrity (every edge endpoint names an existing node) is checked
//! before every save.
//!
//! # Example
//!
//! ```
//! use triadic_graph::{GraphStore, KnowledgeGraph, Node};
//!
//! let dir = tempfile::tempdir().expect("tempdir");
//! let mut store = GraphStore::new(dir.path());
//!
//! let mut graph = KnowledgeGraph::default();
//! graph.nodes.push(Node::new("auth_decision", "Use OAuth2", "decision"));
//! store.save("design", &graph).expect("save");
//!
//! assert_eq!(store.list_triads().expect("list"), vec!["design".to_string()]);
//! ```

pub mod issues;
pub mod model;
pub mod repair;
pub mod search;
pub mod store;
pub mod validate;

pub use issues::{KmIssue, detect_issues, update_queue};
pub use model::{Edge, KnowledgeGraph, Node, NODE_TYPES, is_valid_node_type};
pub use repair::{RepairReport, repair_graph};
pub use search::{SearchResult, search_graph};
pub use store::{BackupManager, GraphStore, graph_file_name, is_valid_triad_name};
pub use validate::{ValidationError, validate_graph};
