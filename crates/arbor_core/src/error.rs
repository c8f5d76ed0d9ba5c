//! Error types

use thiserror::Error;

/// Errors raised by node construction and tree mutation
#[derive(Error, Debug)]
pub enum NodeError {
    /// The handle refers to a node that is not (or no longer) in the tree
    #[error("Unknown node")]
    UnknownNode,

    /// Appending would make a node its own ancestor
    #[error("Cannot append a node beneath itself or one of its descendants")]
    Cycle,

    /// Count nodes, nested states and machine roots cannot change owner
    #[error("Node is pinned to its owner and cannot be re-parented")]
    Pinned,

    /// The value cannot be represented as a structured node value
    #[error("Value cannot be stored in a node: {0}")]
    NotSerializable(#[from] serde_json::Error),
}

/// Errors raised while configuring a statechart
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `configure` was called on a state that is already configured
    #[error("State '{0}' already configured")]
    AlreadyConfigured(String),

    #[error("State '{state}' references unknown action '{action}'.")]
    UnknownAction { state: String, action: String },

    #[error("State '{state}' references unknown condition '{condition}'.")]
    UnknownCondition { state: String, condition: String },

    #[error("State '{state}' references unknown sibling state '{target}'.")]
    UnknownTarget { state: String, target: String },

    /// Entry and exit handlers run while a transition is already in flight
    #[error("State '{state}' declares a {list} handler with transition to '{target}'")]
    LifecycleTransition {
        state: String,
        list: &'static str,
        target: String,
    },

    /// A machine needs at least one top-level state to enter
    #[error("Include one or more states")]
    NoStates,

    /// The state handle does not refer to a state node
    #[error("Unknown state node")]
    UnknownState,

    #[error(transparent)]
    Node(#[from] NodeError),

    /// A TOML or JSON definition could not be parsed
    #[error("Invalid state definition: {0}")]
    Definition(String),
}

/// Result type for node operations
pub type Result<T, E = NodeError> = std::result::Result<T, E>;
