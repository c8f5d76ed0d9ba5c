//! Hierarchical statechart interpreter
//!
//! A [`State`] is a node that owns named nested states and tracks which one is
//! active. Events are dispatched to a state and matched against the handlers
//! of its active substate:
//!
//! - Handlers without a target run their actions when their guard passes
//! - A handler with a target and a passing guard discards the rest of the
//!   queue and replaces it with the transition: exit handlers of the current
//!   substate, the handler's own actions, the switch itself, then the target's
//!   entry and always handlers
//! - `always` handlers of the target may transition again (transient chains)
//!
//! Nested states are pinned children, so a change of any substate bubbles
//! through its parent states like any other node change.

use std::collections::VecDeque;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::config::{HandlerConfig, StateConfig};
use crate::error::ConfigError;
use crate::tree::{NodeData, NodeId, NodeTree};

/// A named action, invoked with the state running the handler queue and the
/// dispatch arguments
pub type Action = Rc<dyn Fn(&mut NodeTree, State, &[Value])>;

/// A named condition gating a handler
pub type Guard = Rc<dyn Fn(&NodeTree, State, &[Value]) -> bool>;

#[derive(Clone)]
struct Handler {
    actions: SmallVec<[Action; 2]>,
    guard: Option<Guard>,
    target: Option<NodeId>,
}

/// Metadata about the most recent transition between substates
///
/// `active` is true from the moment the transition begins (before exit
/// handlers run) until the target's always handlers have finished.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Transition {
    pub active: bool,
    pub from: Option<State>,
    pub to: Option<State>,
}

pub(crate) struct StateData {
    name: String,
    configured: bool,
    always: Vec<Handler>,
    entry: Vec<Handler>,
    exit: Vec<Handler>,
    on: IndexMap<String, Vec<Handler>>,
    states: IndexMap<String, NodeId>,
    active: Option<NodeId>,
    transition: Transition,
}

impl StateData {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            configured: false,
            always: Vec::new(),
            entry: Vec::new(),
            exit: Vec::new(),
            on: IndexMap::new(),
            states: IndexMap::new(),
            active: None,
            transition: Transition::default(),
        }
    }
}

/// One unit of work in a handler queue
enum Step {
    Handler(Handler),
    Actions(SmallVec<[Action; 2]>),
    TransitionBegin { from: Option<NodeId>, to: NodeId },
    Enter(NodeId),
    TransitionEnd,
}

/// Handle to a statechart state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct State(NodeId);

impl State {
    /// Create an unconfigured, unattached state
    pub fn new(tree: &mut NodeTree, name: impl Into<String>) -> Self {
        State(tree.insert(NodeData::State(Box::new(StateData::new(name.into())))))
    }

    pub fn from_id(id: NodeId) -> Self {
        State(id)
    }

    pub fn id(&self) -> NodeId {
        self.0
    }

    /// Resolve `config` and enter the first nested state
    ///
    /// The whole definition is validated before anything is created, so an
    /// error leaves the tree untouched. A state can be configured only once.
    pub fn configure(&self, tree: &mut NodeTree, config: &StateConfig) -> Result<(), ConfigError> {
        let data = tree.state_data(self.0).ok_or(ConfigError::UnknownState)?;
        if data.configured {
            return Err(ConfigError::AlreadyConfigured(data.name.clone()));
        }
        let plan = prepare(&data.name, config)?;
        apply(tree, self.0, plan, &[]);
        Ok(())
    }

    /// Dispatch an event to the active substate
    ///
    /// Returns `false` without running anything when there is no active
    /// substate or it has no handlers for `event`. Otherwise the handlers run
    /// and the change bubbles from this state.
    pub fn dispatch(&self, tree: &mut NodeTree, event: &str, args: &[Value]) -> bool {
        let Some(active) = tree.state_data(self.0).and_then(|data| data.active) else {
            return false;
        };
        let Some(target) = tree.state_data(active) else {
            return false;
        };
        let Some(handlers) = target.on.get(event) else {
            trace!("State::dispatch: '{}' ignores '{}'", target.name, event);
            return false;
        };

        let queue: VecDeque<Step> = handlers
            .iter()
            .chain(&target.always)
            .cloned()
            .map(Step::Handler)
            .collect();
        run(tree, self.0, queue, args);
        tree.bubble(self.0);
        true
    }

    pub fn name<'t>(&self, tree: &'t NodeTree) -> Option<&'t str> {
        tree.state_data(self.0).map(|data| data.name.as_str())
    }

    /// The active substate, if this state has nested states
    pub fn active(&self, tree: &NodeTree) -> Option<State> {
        tree.state_data(self.0)?.active.map(State)
    }

    /// Active substates from this state down to a leaf state
    pub fn active_path(&self, tree: &NodeTree) -> Vec<State> {
        let mut path = Vec::new();
        let mut current = self.active(tree);
        while let Some(state) = current {
            path.push(state);
            current = state.active(tree);
        }
        path
    }

    pub fn transition(&self, tree: &NodeTree) -> Transition {
        tree.state_data(self.0)
            .map(|data| data.transition)
            .unwrap_or_default()
    }

    /// Nested state by name
    pub fn nested(&self, tree: &NodeTree, name: &str) -> Option<State> {
        tree.state_data(self.0)?.states.get(name).copied().map(State)
    }

    /// Nested states in declaration order
    pub fn nested_states(&self, tree: &NodeTree) -> Vec<State> {
        tree.state_data(self.0)
            .map(|data| data.states.values().copied().map(State).collect())
            .unwrap_or_default()
    }

    pub fn is_configured(&self, tree: &NodeTree) -> bool {
        tree.state_data(self.0).is_some_and(|data| data.configured)
    }

    /// Check if dispatching `event` would run any handlers
    pub fn handles(&self, tree: &NodeTree, event: &str) -> bool {
        self.active(tree)
            .and_then(|active| tree.state_data(active.0))
            .is_some_and(|data| data.on.contains_key(event))
    }

    /// Events the active substate handles, in declaration order
    pub fn events(&self, tree: &NodeTree) -> Vec<String> {
        self.active(tree)
            .and_then(|active| tree.state_data(active.0))
            .map(|data| data.on.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl From<State> for NodeId {
    fn from(state: State) -> Self {
        state.0
    }
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Clone, Default)]
struct Tables {
    actions: FxHashMap<String, Action>,
    conditions: FxHashMap<String, Guard>,
}

impl Tables {
    /// Inherited entries overlaid with the state's own; local names win
    fn extend(&self, config: &StateConfig) -> Self {
        let mut tables = self.clone();
        for (name, action) in &config.actions {
            tables.actions.insert(name.clone(), Rc::clone(action));
        }
        for (name, condition) in &config.conditions {
            tables.conditions.insert(name.clone(), Rc::clone(condition));
        }
        tables
    }
}

/// A handler whose names are resolved; targets are sibling indices
struct Planned {
    actions: SmallVec<[Action; 2]>,
    guard: Option<Guard>,
    target: Option<usize>,
}

impl Planned {
    fn bind(self, siblings: &[NodeId]) -> Handler {
        Handler {
            actions: self.actions,
            guard: self.guard,
            target: self.target.and_then(|index| siblings.get(index).copied()),
        }
    }
}

/// A fully validated state definition
pub(crate) struct Plan {
    always: Vec<Planned>,
    entry: Vec<Planned>,
    exit: Vec<Planned>,
    on: IndexMap<String, Vec<Planned>>,
    states: Vec<(String, Plan)>,
}

impl Plan {
    pub(crate) fn has_states(&self) -> bool {
        !self.states.is_empty()
    }
}

struct Resolver<'a> {
    state: &'a str,
    tables: &'a Tables,
    siblings: Option<&'a IndexMap<String, StateConfig>>,
}

impl Resolver<'_> {
    fn handlers(
        &self,
        configs: &[HandlerConfig],
        lifecycle: Option<&'static str>,
    ) -> Result<Vec<Planned>, ConfigError> {
        configs
            .iter()
            .map(|config| self.handler(config, lifecycle))
            .collect()
    }

    fn handler(
        &self,
        config: &HandlerConfig,
        lifecycle: Option<&'static str>,
    ) -> Result<Planned, ConfigError> {
        let actions = config
            .actions
            .iter()
            .map(|name| {
                self.tables
                    .actions
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownAction {
                        state: self.state.to_string(),
                        action: name.clone(),
                    })
            })
            .collect::<Result<SmallVec<[Action; 2]>, _>>()?;

        let guard = match &config.condition {
            Some(name) => Some(self.tables.conditions.get(name).cloned().ok_or_else(|| {
                ConfigError::UnknownCondition {
                    state: self.state.to_string(),
                    condition: name.clone(),
                }
            })?),
            None => None,
        };

        let target = match (&config.transition_to, lifecycle) {
            (None, _) => None,
            (Some(target), Some(list)) => {
                return Err(ConfigError::LifecycleTransition {
                    state: self.state.to_string(),
                    list,
                    target: target.clone(),
                })
            }
            (Some(target), None) => Some(
                self.siblings
                    .and_then(|siblings| siblings.get_index_of(target))
                    .ok_or_else(|| ConfigError::UnknownTarget {
                        state: self.state.to_string(),
                        target: target.clone(),
                    })?,
            ),
        };

        Ok(Planned {
            actions,
            guard,
            target,
        })
    }
}

/// Validate a definition without touching the tree
pub(crate) fn prepare(name: &str, config: &StateConfig) -> Result<Plan, ConfigError> {
    plan(name, config, &Tables::default(), None)
}

fn plan(
    name: &str,
    config: &StateConfig,
    inherited: &Tables,
    siblings: Option<&IndexMap<String, StateConfig>>,
) -> Result<Plan, ConfigError> {
    let tables = inherited.extend(config);
    let resolver = Resolver {
        state: name,
        tables: &tables,
        siblings,
    };

    let always = resolver.handlers(&config.always, None)?;
    let entry = resolver.handlers(&config.entry, Some("entry"))?;
    let exit = resolver.handlers(&config.exit, Some("exit"))?;
    let mut on = IndexMap::with_capacity(config.on.len());
    for (event, handlers) in &config.on {
        on.insert(event.clone(), resolver.handlers(handlers, None)?);
    }

    let states = config
        .states
        .iter()
        .map(|(child, child_config)| {
            plan(child, child_config, &tables, Some(&config.states))
                .map(|child_plan| (child.clone(), child_plan))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Plan {
        always,
        entry,
        exit,
        on,
        states,
    })
}

/// Materialize a validated definition on an unconfigured state node
///
/// Nested states are created and configured first, so their initial
/// transitions run before this state enters its first substate.
pub(crate) fn apply(tree: &mut NodeTree, id: NodeId, plan: Plan, siblings: &[NodeId]) {
    let Plan {
        always,
        entry,
        exit,
        on,
        states,
    } = plan;

    let mut nested = IndexMap::with_capacity(states.len());
    let mut children = Vec::with_capacity(states.len());
    for (name, child_plan) in states {
        let child = State::new(tree, name.clone()).id();
        tree.link(id, child);
        tree.pin(child);
        nested.insert(name, child);
        children.push((child, child_plan));
    }
    let ids: SmallVec<[NodeId; 8]> = children.iter().map(|(child, _)| *child).collect();

    let bind = |planned: Vec<Planned>| -> Vec<Handler> {
        planned
            .into_iter()
            .map(|handler| handler.bind(siblings))
            .collect()
    };
    if let Some(data) = tree.state_data_mut(id) {
        debug!(
            "State::configure: '{}' with {} nested state(s)",
            data.name,
            ids.len()
        );
        data.configured = true;
        data.always = bind(always);
        data.entry = bind(entry);
        data.exit = bind(exit);
        data.on = on
            .into_iter()
            .map(|(event, handlers)| (event, bind(handlers)))
            .collect();
        data.states = nested;
    }

    for (child, child_plan) in children {
        apply(tree, child, child_plan, &ids);
    }

    if let Some(&first) = ids.first() {
        let initial = Handler {
            actions: SmallVec::new(),
            guard: None,
            target: Some(first),
        };
        run(tree, id, VecDeque::from([Step::Handler(initial)]), &[]);
    }
}

// =============================================================================
// Execution
// =============================================================================

fn run(tree: &mut NodeTree, owner: NodeId, mut queue: VecDeque<Step>, args: &[Value]) {
    let state = State(owner);
    while let Some(step) = queue.pop_front() {
        match step {
            Step::Handler(handler) => {
                if let Some(guard) = &handler.guard {
                    if !guard(&*tree, state, args) {
                        continue;
                    }
                }
                match handler.target {
                    Some(target) => queue = tree.transition_steps(owner, target, handler.actions),
                    None => run_actions(tree, state, &handler.actions, args),
                }
            }
            Step::Actions(actions) => run_actions(tree, state, &actions, args),
            Step::TransitionBegin { from, to } => {
                debug!(
                    "State::transition: '{}' {} -> {}",
                    tree.state_name(owner),
                    from.map_or("(none)", |from| tree.state_name(from)),
                    tree.state_name(to)
                );
                if let Some(data) = tree.state_data_mut(owner) {
                    data.transition = Transition {
                        active: true,
                        from: from.map(State),
                        to: Some(State(to)),
                    };
                }
            }
            Step::Enter(target) => {
                if let Some(data) = tree.state_data_mut(owner) {
                    data.active = Some(target);
                }
            }
            Step::TransitionEnd => {
                if let Some(data) = tree.state_data_mut(owner) {
                    data.transition.active = false;
                }
            }
        }
    }
}

fn run_actions(tree: &mut NodeTree, state: State, actions: &[Action], args: &[Value]) {
    for action in actions {
        action(tree, state, args);
    }
}

impl NodeTree {
    pub(crate) fn state_data(&self, id: NodeId) -> Option<&StateData> {
        match self.data(id)? {
            NodeData::State(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn state_data_mut(&mut self, id: NodeId) -> Option<&mut StateData> {
        match self.data_mut(id)? {
            NodeData::State(data) => Some(data),
            _ => None,
        }
    }

    fn state_name(&self, id: NodeId) -> &str {
        self.state_data(id).map_or("?", |data| data.name.as_str())
    }

    /// The queue that replaces the remainder of a queue when `owner`
    /// transitions to `target`
    fn transition_steps(
        &self,
        owner: NodeId,
        target: NodeId,
        actions: SmallVec<[Action; 2]>,
    ) -> VecDeque<Step> {
        let from = self.state_data(owner).and_then(|data| data.active);

        let mut steps = VecDeque::new();
        steps.push_back(Step::TransitionBegin { from, to: target });
        if let Some(current) = from.and_then(|from| self.state_data(from)) {
            steps.extend(current.exit.iter().cloned().map(Step::Handler));
        }
        steps.push_back(Step::Actions(actions));
        steps.push_back(Step::Enter(target));
        if let Some(next) = self.state_data(target) {
            steps.extend(next.entry.iter().cloned().map(Step::Handler));
            steps.extend(next.always.iter().cloned().map(Step::Handler));
        }
        steps.push_back(Step::TransitionEnd);
        steps
    }

    pub(crate) fn state_json(&self, data: &StateData) -> Value {
        let states: serde_json::Map<String, Value> = data
            .states
            .iter()
            .map(|(name, id)| (name.clone(), self.to_json(*id).unwrap_or(Value::Null)))
            .collect();
        let snapshot = |state: Option<State>| {
            state
                .and_then(|state| self.to_json(state))
                .unwrap_or(Value::Null)
        };

        json!({
            "name": data.name,
            "states": states,
            "transition": {
                "active": data.transition.active,
                "from": snapshot(data.transition.from),
                "to": snapshot(data.transition.to),
            },
        })
    }
}
