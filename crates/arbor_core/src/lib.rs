//! Arbor Core Runtime
//!
//! This crate provides reactive node trees and the statecharts that drive them:
//!
//! - **Node Tree**: Typed leaves and containers that bubble every change to
//!   their ancestors
//! - **Containers**: Arrays and maps with a live count node
//! - **Statecharts**: Hierarchical states with guards, transient transitions
//!   and entry/exit handlers, loadable from TOML or JSON
//!
//! # Example
//!
//! ```rust
//! use arbor_core::{HandlerConfig, Machine, Map, NodeTree, Number, StateConfig};
//!
//! let mut tree = NodeTree::new();
//!
//! // Build a small tree
//! let count = Number::new(&mut tree, 0);
//! let model = Map::new(&mut tree, [("count", count.id())]).unwrap();
//!
//! // Observe it; subscribers run once immediately
//! tree.subscribe(model, |tree, id| {
//!     println!("model is now: {:?}", tree.to_json(id));
//! })
//! .unwrap();
//!
//! // Drive it with a statechart
//! let config = StateConfig::new()
//!     .action("increment", move |tree, _, _| {
//!         let next = tree.get(count).unwrap_or(0.0) + 1.0;
//!         tree.set(count, next);
//!     })
//!     .state(
//!         "idle",
//!         StateConfig::new().on("CLICK", HandlerConfig::new().action("increment")),
//!     );
//! let machine = Machine::with_subject(&mut tree, &config, model).unwrap();
//!
//! machine.dispatch(&mut tree, "CLICK", &[]);
//! assert_eq!(tree.get(count), Some(1.0));
//! ```

pub mod config;
pub mod container;
pub mod error;
pub mod machine;
pub mod state;
pub mod tree;
pub mod value;

pub use config::{HandlerConfig, StateConfig};
pub use container::{Array, Map, MAX_ARRAY_LENGTH};
pub use error::{ConfigError, NodeError, Result};
pub use machine::Machine;
pub use state::{Action, Guard, State, Transition};
pub use tree::{NodeId, NodeKind, NodeTree, Subscriber, Subscription};
pub use value::{Boolean, Json, Leaf, Natural, Number, Primitive, Scalar, Text, TextView};
