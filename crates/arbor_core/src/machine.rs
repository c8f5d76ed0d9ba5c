//! Machine node
//!
//! A [`Machine`] wraps a root [`State`] named `root` and, optionally, the
//! subject node whose value the statechart controls. Both are children of the
//! machine, so every handled dispatch and every change to the subject bubbles
//! through it.

use serde_json::{json, Value};
use tracing::debug;

use crate::config::StateConfig;
use crate::error::ConfigError;
use crate::state::{self, State, Transition};
use crate::tree::{NodeData, NodeId, NodeKind, NodeTree};

const ROOT: &str = "root";

pub(crate) struct MachineData {
    root: NodeId,
    subject: Option<NodeId>,
}

/// Handle to a statechart machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Machine(NodeId);

impl Machine {
    /// Build a machine from a definition with at least one top-level state
    pub fn new(tree: &mut NodeTree, config: &StateConfig) -> Result<Self, ConfigError> {
        Self::build(tree, config, None)
    }

    /// Build a machine that owns `subject`
    ///
    /// The subject is adopted before the initial transition runs, so entry
    /// actions can reach it through [`Machine::of`]. On error the subject is
    /// left where it was.
    pub fn with_subject(
        tree: &mut NodeTree,
        config: &StateConfig,
        subject: impl Into<NodeId>,
    ) -> Result<Self, ConfigError> {
        Self::build(tree, config, Some(subject.into()))
    }

    fn build(
        tree: &mut NodeTree,
        config: &StateConfig,
        subject: Option<NodeId>,
    ) -> Result<Self, ConfigError> {
        let plan = state::prepare(ROOT, config)?;
        if !plan.has_states() {
            return Err(ConfigError::NoStates);
        }

        let root = State::new(tree, ROOT).id();
        let id = tree.insert(NodeData::Machine(MachineData { root, subject }));
        tree.link(id, root);
        tree.pin(root);

        if let Some(subject) = subject {
            if let Err(err) = tree.check_insertable(id, subject) {
                tree.free(id);
                return Err(err.into());
            }
            tree.append(id, &[subject])?;
        }
        debug!(
            "Machine::new: {:?} with {} top-level state(s)",
            id,
            config.states.len()
        );

        state::apply(tree, root, plan, &[]);
        Ok(Machine(id))
    }

    pub fn from_id(id: NodeId) -> Self {
        Machine(id)
    }

    pub fn id(&self) -> NodeId {
        self.0
    }

    /// The nearest machine at or above `node`
    pub fn of(tree: &NodeTree, node: impl Into<NodeId>) -> Option<Machine> {
        let mut current = Some(node.into());
        while let Some(id) = current {
            if tree.kind(id) == Some(NodeKind::Machine) {
                return Some(Machine(id));
            }
            current = tree.parent(id);
        }
        None
    }

    /// Dispatch an event to the root state
    pub fn dispatch(&self, tree: &mut NodeTree, event: &str, args: &[Value]) -> bool {
        match self.root(tree) {
            Some(root) => root.dispatch(tree, event, args),
            None => false,
        }
    }

    /// The active top-level state
    pub fn state(&self, tree: &NodeTree) -> Option<State> {
        self.root(tree)?.active(tree)
    }

    pub fn transition(&self, tree: &NodeTree) -> Transition {
        self.root(tree)
            .map(|root| root.transition(tree))
            .unwrap_or_default()
    }

    pub fn root(&self, tree: &NodeTree) -> Option<State> {
        self.data(tree).map(|data| State::from_id(data.root))
    }

    /// The controlled node, while it is still owned by this machine
    pub fn subject(&self, tree: &NodeTree) -> Option<NodeId> {
        self.data(tree)?
            .subject
            .filter(|subject| tree.parent(*subject) == Some(self.0))
    }

    fn data<'t>(&self, tree: &'t NodeTree) -> Option<&'t MachineData> {
        match tree.data(self.0)? {
            NodeData::Machine(data) => Some(data),
            _ => None,
        }
    }
}

impl From<Machine> for NodeId {
    fn from(machine: Machine) -> Self {
        machine.0
    }
}

impl NodeTree {
    pub(crate) fn machine_json(&self, data: &MachineData) -> Value {
        let root = State::from_id(data.root);
        let name = |state: Option<State>| {
            state
                .and_then(|state| state.name(self))
                .map_or(Value::Null, Value::from)
        };
        let transition = root.transition(self);
        // The root's parent is the machine itself
        let machine = self.parent(data.root);
        let subject = data
            .subject
            .filter(|subject| machine.is_some() && self.parent(*subject) == machine)
            .and_then(|subject| self.to_json(subject))
            .unwrap_or(Value::Null);

        json!({
            "state": name(root.active(self)),
            "transition": {
                "active": transition.active,
                "from": name(transition.from),
                "to": name(transition.to),
            },
            "subject": subject,
        })
    }
}
