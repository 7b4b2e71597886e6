//! Input manager: the action sets polled each frame and the per-frame sweep
//! that refreshes every action's state.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use openxr::sys;
use tracing::{debug, error, trace, warn};

use crate::action::{lock, Action, ActionCallback, ActionSet};
use crate::controllers::{Component, Controller, Qualifier};
use crate::error::{check, ProviderError, ProviderResult};
use crate::handle::Owned;
use crate::runtime::{HapticVibration, SpaceLocation, XrRuntime};
use crate::types::{ActionKind, ActionState, Hand, Pose};

/// Upper bound on concurrently running [`Input::dispatch`] sweeps.
pub const MAX_IN_FLIGHT: usize = 4;

/// Runtime-facing sync array and the action sets it was built from, index for index.
#[derive(Default)]
struct SyncList {
    active: Vec<sys::ActiveActionSet>,
    sets: Vec<Arc<ActionSet>>,
}

#[derive(Default)]
struct InFlight {
    slots: [Option<JoinHandle<ProviderResult<()>>>; MAX_IN_FLIGHT],
    next: usize,
    dispatched: u64,
}

pub struct Input {
    runtime: Arc<dyn XrRuntime>,
    session: sys::Session,
    reference_space: sys::Space,
    app_space: sys::Space,
    sync: Mutex<SyncList>,
    in_flight: Mutex<InFlight>,
}

impl Input {
    pub fn new(
        runtime: Arc<dyn XrRuntime>,
        session: sys::Session,
        reference_space: sys::Space,
        app_space: sys::Space,
    ) -> Self {
        Self {
            runtime,
            session,
            reference_space,
            app_space,
            sync: Mutex::new(SyncList::default()),
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    pub(crate) fn runtime(&self) -> &Arc<dyn XrRuntime> {
        &self.runtime
    }

    pub fn session(&self) -> sys::Session {
        self.session
    }

    pub fn reference_space(&self) -> sys::Space {
        self.reference_space
    }

    pub fn app_space(&self) -> sys::Space {
        self.app_space
    }

    pub fn create_action_set(
        &self,
        name: &str,
        localized_name: &str,
        priority: u32,
    ) -> ProviderResult<Arc<ActionSet>> {
        let set = Arc::new(ActionSet::new(name, localized_name, priority));
        set.init(&self.runtime)?;
        Ok(set)
    }

    /// Creates an action in `set` with one state slot per sub-action path.
    pub fn create_action(
        &self,
        set: &ActionSet,
        kind: ActionKind,
        name: &str,
        localized_name: &str,
        subaction_names: &[&str],
        callback: Option<ActionCallback>,
    ) -> ProviderResult<Arc<Action>> {
        let set_handle = set.handle()?;
        let subaction_paths = subaction_names
            .iter()
            .map(|path| self.string_to_path(path))
            .collect::<ProviderResult<Vec<_>>>()?;
        let handle = check(
            self.runtime
                .create_action(set_handle, name, localized_name, kind, &subaction_paths),
            "create action",
        )?;
        let action = Arc::new(Action::new(
            kind,
            handle,
            name.to_string(),
            subaction_names.iter().map(|s| s.to_string()).collect(),
            subaction_paths,
            callback,
        ));
        set.push(Arc::clone(&action));
        debug!(
            set = set.name(),
            action = name,
            kind = ?kind,
            subactions = subaction_names.len(),
            "action created"
        );
        Ok(action)
    }

    /// Creates the action space for one sub-action slot of a pose action.
    pub fn create_action_space(
        &self,
        action: &Action,
        subaction_index: usize,
        pose: Pose,
    ) -> ProviderResult<()> {
        if action.kind() != ActionKind::Pose {
            return Err(ProviderError::Runtime(sys::Result::ERROR_ACTION_TYPE_MISMATCH));
        }
        if subaction_index >= action.slot_count() {
            return Err(ProviderError::validation());
        }
        let space = check(
            Owned::create(&self.runtime, |rt| {
                rt.create_action_space(
                    self.session,
                    action.handle(),
                    action.subaction_path(subaction_index),
                    pose.to_sys(),
                )
            }),
            "create action space",
        )?;
        action.set_space(subaction_index, space);
        Ok(())
    }

    /// Creates one action space per sub-action slot.
    pub fn create_action_spaces(&self, action: &Action, pose: Pose) -> ProviderResult<()> {
        for index in 0..action.slot_count() {
            self.create_action_space(action, index, pose)?;
        }
        Ok(())
    }

    /// Registers `set` for the per-frame sync, optionally filtered to one sub-action path.
    /// Registering a set again replaces its filter.
    pub fn add_actionset_for_sync(
        &self,
        set: &Arc<ActionSet>,
        subaction_filter: Option<&str>,
    ) -> ProviderResult<()> {
        let action_set = set.handle()?;
        let subaction_path = match subaction_filter {
            Some(path) => self.string_to_path(path)?,
            None => sys::Path::NULL,
        };
        let entry = sys::ActiveActionSet {
            action_set,
            subaction_path,
        };
        let mut sync = lock(&self.sync);
        match sync.active.iter().position(|a| a.action_set == action_set) {
            Some(index) => sync.active[index] = entry,
            None => {
                sync.active.push(entry);
                sync.sets.push(Arc::clone(set));
            }
        }
        Ok(())
    }

    /// Returns whether the set was registered.
    pub fn remove_actionset_for_sync(&self, set: &ActionSet) -> bool {
        let Ok(action_set) = set.handle() else {
            return false;
        };
        let mut sync = lock(&self.sync);
        match sync.active.iter().position(|a| a.action_set == action_set) {
            Some(index) => {
                sync.active.remove(index);
                sync.sets.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn sync_set_count(&self) -> usize {
        lock(&self.sync).active.len()
    }

    pub fn attach_action_sets_to_session(&self, sets: &[Arc<ActionSet>]) -> ProviderResult<()> {
        let handles = sets
            .iter()
            .map(|set| set.handle())
            .collect::<ProviderResult<Vec<_>>>()?;
        check(
            self.runtime.attach_action_sets(self.session, &handles),
            "attach action sets",
        )?;
        debug!(count = handles.len(), "action sets attached");
        Ok(())
    }

    /// Syncs every registered set in a single runtime call.
    pub fn sync_actionsets(&self) -> ProviderResult<()> {
        let active = lock(&self.sync).active.clone();
        check(self.runtime.sync_actions(self.session, &active), "sync actions")
    }

    /// Syncs, then refreshes every sub-action slot of every input action in
    /// the registered sets, running each action's callback after its slot is stored.
    pub fn process_input(&self) -> ProviderResult<()> {
        self.sync_actionsets()?;
        let sets = lock(&self.sync).sets.clone();
        for set in &sets {
            for action in set.actions() {
                if !action.kind().is_input() {
                    continue;
                }
                for index in 0..action.slot_count() {
                    let state = self.query_state(&action, index)?;
                    action.store_state(index, state);
                    if action.has_callback() {
                        action.notify(index);
                    }
                }
            }
        }
        Ok(())
    }

    fn query_state(&self, action: &Action, index: usize) -> ProviderResult<ActionState> {
        check(
            self.runtime.action_state(
                self.session,
                action.handle(),
                action.kind(),
                action.subaction_path(index),
            ),
            "get action state",
        )
    }

    /// Refreshes one action outside the batched sweep, without a sync and without its callback.
    pub fn get_action_state(&self, action: &Action) -> ProviderResult<Vec<ActionState>> {
        if !action.kind().is_input() {
            return Err(ProviderError::Runtime(sys::Result::ERROR_ACTION_TYPE_MISMATCH));
        }
        for index in 0..action.slot_count() {
            let state = self.query_state(action, index)?;
            action.store_state(index, state);
        }
        Ok(action.states())
    }

    /// Locates a pose action's sub-action space relative to the reference space.
    pub fn get_action_pose(
        &self,
        action: &Action,
        subaction_index: usize,
        time: sys::Time,
    ) -> ProviderResult<SpaceLocation> {
        let Some(space) = action.space(subaction_index) else {
            error!(
                action = action.name(),
                subaction_index, "no action space for sub-action"
            );
            return Err(ProviderError::validation());
        };
        check(
            self.runtime.locate_space(space, self.reference_space, time),
            "locate action space",
        )
    }

    pub fn add_binding(
        &self,
        controller: &mut dyn Controller,
        action: &Action,
        hand: Hand,
        component: Component,
        qualifier: Qualifier,
    ) -> ProviderResult<()> {
        controller.add_binding(
            self.runtime.as_ref(),
            action.handle(),
            hand,
            component,
            qualifier,
        )
    }

    pub fn add_binding_path(
        &self,
        controller: &mut dyn Controller,
        action: &Action,
        path: &str,
    ) -> ProviderResult<()> {
        controller.add_binding_path(self.runtime.as_ref(), action.handle(), path)
    }

    pub fn suggest_bindings(&self, controller: &dyn Controller) -> ProviderResult<()> {
        controller.suggest_bindings(self.runtime.as_ref())
    }

    /// Fire-and-forget vibration on one sub-action slot, or on all of them.
    pub fn generate_haptic(
        &self,
        action: &Action,
        duration: sys::Duration,
        amplitude: f32,
        frequency: f32,
        subaction_index: Option<usize>,
    ) -> ProviderResult<()> {
        let subaction_path = match subaction_index {
            Some(index) => action.subaction_path(index),
            None => sys::Path::NULL,
        };
        let vibration = HapticVibration {
            duration,
            frequency,
            amplitude,
        };
        check(
            self.runtime.apply_haptic_feedback(
                self.session,
                action.handle(),
                subaction_path,
                &vibration,
            ),
            "apply haptic feedback",
        )
    }

    pub fn string_to_path(&self, path: &str) -> ProviderResult<sys::Path> {
        check(self.runtime.string_to_path(path), "string to path")
    }

    pub fn path_to_string(&self, path: sys::Path) -> ProviderResult<String> {
        check(self.runtime.path_to_string(path), "path to string")
    }

    /// Interaction profile bound to a top-level user path, if any.
    pub fn current_interaction_profile(&self, user_path: &str) -> ProviderResult<Option<String>> {
        let user = self.string_to_path(user_path)?;
        let profile = check(
            self.runtime.current_interaction_profile(self.session, user),
            "get current interaction profile",
        )?;
        if profile == sys::Path::NULL {
            return Ok(None);
        }
        self.path_to_string(profile).map(Some)
    }

    /// Runs [`Input::process_input`] on a worker thread.
    ///
    /// Holds at most [`MAX_IN_FLIGHT`] sweeps; when every slot is taken the
    /// oldest sweep is joined before its slot is reused.
    pub fn dispatch(self: &Arc<Self>) -> ProviderResult<()> {
        let mut in_flight = lock(&self.in_flight);
        let slot = in_flight.next;
        if let Some(previous) = in_flight.slots[slot].take() {
            if !previous.is_finished() {
                trace!(slot, "in-flight ring full, joining oldest sweep");
            }
            // the slot is reused; its failure is logged here and never reaches collect
            if let Err(err) = report_sweep(previous) {
                debug!(slot, "reused slot after failed sweep: {err}");
            }
        }

        let input = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("xr-input-{slot}"))
            .spawn(move || input.process_input())
            .map_err(|e| {
                error!("input worker spawn failed: {e}");
                ProviderError::runtime_failure()
            })?;

        in_flight.slots[slot] = Some(handle);
        in_flight.next = (slot + 1) % MAX_IN_FLIGHT;
        in_flight.dispatched += 1;
        Ok(())
    }

    /// Joins every outstanding dispatch and returns the first failure among them.
    pub fn collect(&self) -> ProviderResult<()> {
        let mut in_flight = lock(&self.in_flight);
        let mut first_error = None;
        // oldest first
        for offset in 0..MAX_IN_FLIGHT {
            let slot = (in_flight.next + offset) % MAX_IN_FLIGHT;
            if let Some(handle) = in_flight.slots[slot].take() {
                if let Err(err) = report_sweep(handle) {
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight)
            .slots
            .iter()
            .filter(|slot| slot.as_ref().is_some_and(|h| !h.is_finished()))
            .count()
    }

    pub fn dispatched(&self) -> u64 {
        lock(&self.in_flight).dispatched
    }
}

fn report_sweep(handle: JoinHandle<ProviderResult<()>>) -> ProviderResult<()> {
    match handle.join() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            warn!("input sweep failed: {err}");
            Err(err)
        }
        Err(_) => {
            error!("input sweep panicked");
            Err(ProviderError::runtime_failure())
        }
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Input")
            .field("session", &self.session)
            .field("reference_space", &self.reference_space)
            .field("sync_sets", &self.sync_set_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::VulkanBinding;
    use crate::sim::SimRuntime;

    fn running_input() -> (SimRuntime, Input, Vec<Owned<sys::Space>>) {
        let sim = SimRuntime::default();
        let runtime: Arc<dyn XrRuntime> = Arc::new(sim.clone());
        let system = runtime.system(sys::FormFactor::HEAD_MOUNTED_DISPLAY).unwrap();
        let binding: VulkanBinding = runtime.negotiate_graphics(system).unwrap();
        let session = runtime.create_session(system, &binding).unwrap();
        while runtime.poll_event().unwrap().is_some() {}
        runtime
            .begin_session(session, sys::ViewConfigurationType::PRIMARY_STEREO)
            .unwrap();
        let space = Owned::create(&runtime, |rt| {
            rt.create_reference_space(
                session,
                sys::ReferenceSpaceType::STAGE,
                Pose::IDENTITY.to_sys(),
            )
        })
        .unwrap();
        let input = Input::new(runtime, session, space.raw(), space.raw());
        (sim, input, vec![space])
    }

    #[test]
    fn test_sync_is_one_call_for_all_sets() {
        let (sim, input, _spaces) = running_input();
        let a = input.create_action_set("a", "A", 0).unwrap();
        let b = input.create_action_set("b", "B", 1).unwrap();
        input
            .attach_action_sets_to_session(&[Arc::clone(&a), Arc::clone(&b)])
            .unwrap();
        input.add_actionset_for_sync(&a, None).unwrap();
        input.add_actionset_for_sync(&b, None).unwrap();
        input.add_actionset_for_sync(&b, Some("/user/hand/left")).unwrap();
        assert_eq!(input.sync_set_count(), 2);

        sim.clear_calls();
        input.process_input().unwrap();
        assert_eq!(sim.call_count("sync_actions"), 1);
    }

    #[test]
    fn test_remove_keeps_lists_parallel() {
        let (_sim, input, _spaces) = running_input();
        let a = input.create_action_set("a", "A", 0).unwrap();
        let b = input.create_action_set("b", "B", 0).unwrap();
        input.add_actionset_for_sync(&a, None).unwrap();
        input.add_actionset_for_sync(&b, None).unwrap();
        assert!(input.remove_actionset_for_sync(&a));
        assert!(!input.remove_actionset_for_sync(&a));
        let sync = lock(&input.sync);
        assert_eq!(sync.active.len(), sync.sets.len());
        assert_eq!(sync.active[0].action_set, b.handle().unwrap());
    }

    #[test]
    fn test_action_space_rejects_non_pose_action() {
        let (_sim, input, _spaces) = running_input();
        let set = input.create_action_set("main", "Main", 0).unwrap();
        let trigger = input
            .create_action(&set, ActionKind::Float, "trigger", "Trigger", &[], None)
            .unwrap();
        let err = input
            .create_action_space(&trigger, 0, Pose::IDENTITY)
            .unwrap_err();
        assert_eq!(err.code(), sys::Result::ERROR_ACTION_TYPE_MISMATCH);
    }

    #[test]
    fn test_haptic_actions_are_skipped_by_sweep() {
        let (sim, input, _spaces) = running_input();
        let set = input.create_action_set("main", "Main", 0).unwrap();
        let buzz = input
            .create_action(&set, ActionKind::Haptic, "buzz", "Buzz", &["/user/hand/left"], None)
            .unwrap();
        input.attach_action_sets_to_session(&[Arc::clone(&set)]).unwrap();
        input.add_actionset_for_sync(&set, None).unwrap();
        input.process_input().unwrap();
        assert_eq!(sim.call_count("action_state"), 0);

        input
            .generate_haptic(&buzz, sys::Duration::from_nanos(1_000_000), 0.5, 0.0, Some(0))
            .unwrap();
        assert_eq!(sim.haptic_count(), 1);
    }

    #[test]
    fn test_single_action_refresh_skips_sync_and_callback() {
        let (sim, input, _spaces) = running_input();
        let set = input.create_action_set("main", "Main", 0).unwrap();
        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        let callback: ActionCallback = Arc::new(move |_: &Action, _: usize| *lock(&counter) += 1);
        let trigger = input
            .create_action(
                &set,
                ActionKind::Float,
                "trigger",
                "Trigger",
                &["/user/hand/left", "/user/hand/right"],
                Some(callback),
            )
            .unwrap();
        let buzz = input
            .create_action(&set, ActionKind::Haptic, "buzz", "Buzz", &[], None)
            .unwrap();
        input.attach_action_sets_to_session(&[Arc::clone(&set)]).unwrap();
        input.add_actionset_for_sync(&set, None).unwrap();
        sim.set_float(trigger.handle(), "/user/hand/left", 0.25);
        sim.set_float(trigger.handle(), "/user/hand/right", 0.75);

        sim.clear_calls();
        let states = input.get_action_state(&trigger).unwrap();
        assert_eq!(sim.call_count("sync_actions"), 0);
        assert_eq!(sim.call_count("action_state"), 2);
        assert_eq!(
            states.iter().map(|s| s.as_float()).collect::<Vec<_>>(),
            vec![Some(0.25), Some(0.75)]
        );
        assert_eq!(trigger.state(1).and_then(|s| s.as_float()), Some(0.75));
        assert_eq!(*lock(&fired), 0);

        assert_eq!(
            input.get_action_state(&buzz).unwrap_err().code(),
            sys::Result::ERROR_ACTION_TYPE_MISMATCH
        );
    }

    #[test]
    fn test_interaction_profile_lookup() {
        let (sim, input, _spaces) = running_input();
        let set = input.create_action_set("main", "Main", 0).unwrap();
        input.attach_action_sets_to_session(&[Arc::clone(&set)]).unwrap();
        assert_eq!(
            input.current_interaction_profile("/user/hand/left").unwrap(),
            None
        );
        sim.set_interaction_profile(
            "/user/hand/left",
            "/interaction_profiles/valve/index_controller",
        );
        assert_eq!(
            input
                .current_interaction_profile("/user/hand/left")
                .unwrap()
                .as_deref(),
            Some("/interaction_profiles/valve/index_controller")
        );
    }
}
