//! Error types for tree operations
//!
//! Flat taxonomy. Every variant is caller misuse of a structural invariant,
//! never a transient fault, so nothing here is retried.

use crate::types::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TreeError>;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Index out of range: {0}")]
    InvalidIndex(usize),

    #[error("Index has no element: {0}")]
    EmptyIndex(usize),

    #[error("List is empty")]
    EmptyList,

    #[error("Index already holds an element: {0}")]
    IndexNotEmpty(usize),

    #[error("Operation can not be performed: {0}")]
    InvalidOperation(&'static str),

    #[error("Invalid node type: {0}")]
    InvalidNodeType(u8),

    #[error("Value can not be empty: {0}")]
    ValueCannotBeNil(&'static str),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Render error: {0}")]
    Render(#[from] std::fmt::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
