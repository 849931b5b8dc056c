//! Core of an OpenStreetMap editor: the in-memory object graph, its editing
//! operations, OSM XML input and output and the per-project diff files that
//! keep unsaved edits across sessions.

pub mod data;
pub mod diff;
pub mod errors;
pub mod graph;
pub mod map;
pub mod project;
pub mod xml;

pub use crate::diff::{DirtySummary, RestoreStatus};
pub use crate::errors::{Error, ErrorKind, Result};
pub use crate::graph::OsmGraph;
pub use crate::project::{OpenProject, Project};
