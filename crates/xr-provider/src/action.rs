use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock};

use openxr::sys;
use tracing::debug;

use crate::error::{call_order, check, ProviderResult};
use crate::handle::Owned;
use crate::runtime::XrRuntime;
use crate::types::{ActionKind, ActionState};

/// Invoked with the action and the sub-action index whose state was refreshed.
pub type ActionCallback = Arc<dyn Fn(&Action, usize) + Send + Sync>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One logical input (or haptic output).
///
/// The runtime action handle belongs to the owning [`ActionSet`] and is
/// invalidated when that set is destroyed. Action spaces are owned here.
pub struct Action {
    kind: ActionKind,
    handle: sys::Action,
    name: String,
    subaction_names: Vec<String>,
    subaction_paths: Vec<sys::Path>,
    states: Mutex<Vec<ActionState>>,
    spaces: Mutex<Vec<Option<Owned<sys::Space>>>>,
    callback: Option<ActionCallback>,
}

impl Action {
    pub(crate) fn new(
        kind: ActionKind,
        handle: sys::Action,
        name: String,
        subaction_names: Vec<String>,
        subaction_paths: Vec<sys::Path>,
        callback: Option<ActionCallback>,
    ) -> Self {
        // an action without sub-action paths still carries one state slot
        let slots = subaction_paths.len().max(1);
        Self {
            kind,
            handle,
            name,
            subaction_names,
            subaction_paths,
            states: Mutex::new(vec![ActionState::empty(kind); slots]),
            spaces: Mutex::new((0..slots).map(|_| None).collect()),
            callback,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn handle(&self) -> sys::Action {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subaction_names(&self) -> &[String] {
        &self.subaction_names
    }

    pub fn subaction_paths(&self) -> &[sys::Path] {
        &self.subaction_paths
    }

    /// Number of independent state slots.
    pub fn slot_count(&self) -> usize {
        self.subaction_paths.len().max(1)
    }

    pub fn subaction_index(&self, name: &str) -> Option<usize> {
        self.subaction_names.iter().position(|n| n == name)
    }

    /// Sub-action path for a slot; `NULL` when the action has none.
    pub fn subaction_path(&self, index: usize) -> sys::Path {
        self.subaction_paths
            .get(index)
            .copied()
            .unwrap_or(sys::Path::NULL)
    }

    pub fn state(&self, index: usize) -> Option<ActionState> {
        lock(&self.states).get(index).copied()
    }

    pub fn states(&self) -> Vec<ActionState> {
        lock(&self.states).clone()
    }

    pub(crate) fn store_state(&self, index: usize, state: ActionState) {
        if let Some(slot) = lock(&self.states).get_mut(index) {
            *slot = state;
        }
    }

    pub(crate) fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub(crate) fn notify(&self, index: usize) {
        if let Some(callback) = &self.callback {
            callback(self, index);
        }
    }

    pub fn space(&self, index: usize) -> Option<sys::Space> {
        lock(&self.spaces)
            .get(index)
            .and_then(|space| space.as_ref().map(Owned::raw))
    }

    pub(crate) fn set_space(&self, index: usize, space: Owned<sys::Space>) -> bool {
        match lock(&self.spaces).get_mut(index) {
            Some(slot) => {
                *slot = Some(space);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .field("subaction_names", &self.subaction_names)
            .finish()
    }
}

/// Named, prioritized group of actions sharing one runtime action set.
pub struct ActionSet {
    name: String,
    localized_name: String,
    priority: u32,
    handle: OnceLock<Owned<sys::ActionSet>>,
    init_lock: Mutex<()>,
    actions: RwLock<Vec<Arc<Action>>>,
}

impl ActionSet {
    pub fn new(name: impl Into<String>, localized_name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            localized_name: localized_name.into(),
            priority,
            handle: OnceLock::new(),
            init_lock: Mutex::new(()),
            actions: RwLock::new(Vec::new()),
        }
    }

    /// Creates the runtime action set. Repeat calls are no-ops.
    pub fn init(&self, runtime: &Arc<dyn XrRuntime>) -> ProviderResult<()> {
        let _guard = lock(&self.init_lock);
        if self.handle.get().is_some() {
            return Ok(());
        }
        let owned = check(
            Owned::create(runtime, |rt| {
                rt.create_action_set(&self.name, &self.localized_name, self.priority)
            }),
            "create action set",
        )?;
        debug!(name = %self.name, priority = self.priority, "action set created");
        let _ = self.handle.set(owned);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.handle.get().is_some()
    }

    pub fn handle(&self) -> ProviderResult<sys::ActionSet> {
        match self.handle.get() {
            Some(owned) => Ok(owned.raw()),
            None => call_order("action set used before init"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn localized_name(&self) -> &str {
        &self.localized_name
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub(crate) fn push(&self, action: Arc<Action>) {
        match self.actions.write() {
            Ok(mut actions) => actions.push(action),
            Err(poisoned) => poisoned.into_inner().push(action),
        }
    }

    /// Snapshot of the contained actions in creation order.
    pub fn actions(&self) -> Vec<Arc<Action>> {
        match self.actions.read() {
            Ok(actions) => actions.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn action(&self, name: &str) -> Option<Arc<Action>> {
        self.actions().into_iter().find(|action| action.name() == name)
    }
}

impl Drop for ActionSet {
    fn drop(&mut self) {
        // action spaces must go before the set that invalidates their actions
        let actions = match self.actions.get_mut() {
            Ok(actions) => std::mem::take(actions),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for action in &actions {
            lock(&action.spaces).clear();
        }
    }
}

impl fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSet")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimRuntime;
    use openxr::sys::Handle;

    #[test]
    fn test_action_set_init_is_idempotent() {
        let sim = SimRuntime::default();
        let runtime: Arc<dyn XrRuntime> = Arc::new(sim.clone());
        let set = ActionSet::new("main", "Main", 0);
        set.init(&runtime).unwrap();
        let first = set.handle().unwrap();
        set.init(&runtime).unwrap();
        assert_eq!(set.handle().unwrap(), first);
        assert_eq!(sim.call_count("create_action_set"), 1);
    }

    #[test]
    fn test_action_set_destroyed_once() {
        let sim = SimRuntime::default();
        let runtime: Arc<dyn XrRuntime> = Arc::new(sim.clone());
        let set = ActionSet::new("main", "Main", 0);
        set.init(&runtime).unwrap();
        set.init(&runtime).unwrap();
        drop(set);
        assert_eq!(sim.call_count("destroy_action_set"), 1);
    }

    #[test]
    fn test_handle_before_init_is_call_order() {
        let set = ActionSet::new("main", "Main", 0);
        let err = set.handle().unwrap_err();
        assert_eq!(err.code(), sys::Result::ERROR_CALL_ORDER_INVALID);
    }

    #[test]
    fn test_action_without_subpaths_has_one_slot() {
        let action = Action::new(
            ActionKind::Float,
            sys::Action::from_raw(3),
            "squeeze".into(),
            Vec::new(),
            Vec::new(),
            None,
        );
        assert_eq!(action.slot_count(), 1);
        assert_eq!(action.subaction_path(0), sys::Path::NULL);
        assert_eq!(action.state(0).map(|s| s.kind()), Some(ActionKind::Float));
        assert!(action.state(1).is_none());
        assert!(action.space(0).is_none());
    }
}
