//! Statechart definitions
//!
//! A [`StateConfig`] describes one state: its handler lists, its nested states
//! and the named actions and conditions those handlers refer to. Definitions
//! are built in code or loaded from TOML/JSON text, after which the callables
//! are registered by name:
//!
//! ```rust
//! use arbor_core::StateConfig;
//!
//! let config = StateConfig::from_toml_str(
//!     r#"
//!     [states.idle.on]
//!     START = [{ transitionTo = "running", actions = ["log"] }]
//!
//!     [states.running.on]
//!     STOP = [{ transitionTo = "idle" }]
//!     "#,
//! )
//! .unwrap()
//! .action("log", |_, _, _| {});
//!
//! assert_eq!(config.states.keys().collect::<Vec<_>>(), ["idle", "running"]);
//! ```

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::state::{Action, Guard, State};
use crate::tree::NodeTree;

/// One entry of a handler list
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct HandlerConfig {
    /// Names of actions to run, in order
    pub actions: Vec<String>,
    /// Name of the guard; omitted means always true
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Sibling state to transition to
    #[serde(alias = "transition_to", skip_serializing_if = "Option::is_none")]
    pub transition_to: Option<String>,
}

impl HandlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(mut self, name: impl Into<String>) -> Self {
        self.actions.push(name.into());
        self
    }

    pub fn condition(mut self, name: impl Into<String>) -> Self {
        self.condition = Some(name.into());
        self
    }

    pub fn transition_to(mut self, target: impl Into<String>) -> Self {
        self.transition_to = Some(target.into());
        self
    }
}

/// Declarative description of a state and its nested states
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct StateConfig {
    /// Callables available to handlers of this state and its nested states
    #[serde(skip)]
    pub actions: FxHashMap<String, Action>,
    #[serde(skip)]
    pub conditions: FxHashMap<String, Guard>,

    /// Handlers run after entering this state and after every handled event
    pub always: Vec<HandlerConfig>,
    pub entry: Vec<HandlerConfig>,
    pub exit: Vec<HandlerConfig>,
    pub on: IndexMap<String, Vec<HandlerConfig>>,
    /// Nested states in declaration order; the first one is entered initially
    pub states: IndexMap<String, StateConfig>,
}

impl StateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a definition from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Definition(err.to_string()))
    }

    /// Parse a definition from JSON text
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|err| ConfigError::Definition(err.to_string()))
    }

    /// Register a named action
    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut NodeTree, State, &[Value]) + 'static,
    {
        self.actions.insert(name.into(), Rc::new(action));
        self
    }

    /// Register a named guard
    pub fn condition<F>(mut self, name: impl Into<String>, condition: F) -> Self
    where
        F: Fn(&NodeTree, State, &[Value]) -> bool + 'static,
    {
        self.conditions.insert(name.into(), Rc::new(condition));
        self
    }

    pub fn always(mut self, handler: HandlerConfig) -> Self {
        self.always.push(handler);
        self
    }

    pub fn entry(mut self, handler: HandlerConfig) -> Self {
        self.entry.push(handler);
        self
    }

    pub fn exit(mut self, handler: HandlerConfig) -> Self {
        self.exit.push(handler);
        self
    }

    /// Add a handler for an event
    pub fn on(mut self, event: impl Into<String>, handler: HandlerConfig) -> Self {
        self.on.entry(event.into()).or_default().push(handler);
        self
    }

    /// Declare a nested state. Redeclaring a name replaces its definition but
    /// keeps its position.
    pub fn state(mut self, name: impl Into<String>, config: StateConfig) -> Self {
        self.states.insert(name.into(), config);
        self
    }
}

impl fmt::Debug for StateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<&String> = self.actions.keys().collect();
        actions.sort();
        let mut conditions: Vec<&String> = self.conditions.keys().collect();
        conditions.sort();

        f.debug_struct("StateConfig")
            .field("actions", &actions)
            .field("conditions", &conditions)
            .field("always", &self.always)
            .field("entry", &self.entry)
            .field("exit", &self.exit)
            .field("on", &self.on)
            .field("states", &self.states)
            .finish()
    }
}
