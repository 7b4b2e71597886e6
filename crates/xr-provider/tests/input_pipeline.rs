//! Input manager scenarios: bindings, sweeps, callbacks and async dispatch.

use std::sync::{Arc, Mutex};

use xr_provider::controllers::{
    HTC_VIVE_PROFILE, MICROSOFT_MIXED_REALITY_PROFILE, OCULUS_TOUCH_PROFILE, VALVE_INDEX_PROFILE,
};
use xr_provider::extensions::{ViveTrackerInteraction, HTCX_VIVE_TRACKER_INTERACTION};
use xr_provider::input::MAX_IN_FLIGHT;
use xr_provider::sim::{SimLoader, SimRuntime};
use xr_provider::{
    sys, Action, ActionCallback, ActionKind, AppInstanceInfo, BaseController, Component, Hand,
    Pose, Provider, Qualifier, SessionConfig, TrackerRole,
};

const LEFT: &str = "/user/hand/left";
const RIGHT: &str = "/user/hand/right";

fn running_provider() -> (SimRuntime, Provider) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let loader = SimLoader::default();
    let mut provider = Provider::new();
    provider.init(&loader, &AppInstanceInfo::default()).unwrap();
    provider.create_session(&SessionConfig::default()).unwrap();
    provider.poll_events().unwrap();
    provider
        .session_mut()
        .unwrap()
        .begin(sys::ViewConfigurationType::PRIMARY_STEREO)
        .unwrap();
    (loader.runtime(), provider)
}

#[test]
fn test_callback_sees_each_hand_in_index_order() {
    let (sim, provider) = running_provider();
    let input = provider.input().unwrap();
    let seen: Arc<Mutex<Vec<(usize, Option<bool>)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let callback: ActionCallback = Arc::new(move |action: &Action, index: usize| {
        let value = action.state(index).and_then(|s| s.as_bool());
        sink.lock().unwrap().push((index, value));
    });

    let set = input.create_action_set("main", "Main", 0).unwrap();
    let select = input
        .create_action(
            &set,
            ActionKind::Boolean,
            "select",
            "Select",
            &[LEFT, RIGHT],
            Some(callback),
        )
        .unwrap();
    input.attach_action_sets_to_session(&[Arc::clone(&set)]).unwrap();
    input.add_actionset_for_sync(&set, None).unwrap();

    sim.set_boolean(select.handle(), LEFT, true);
    sim.set_boolean(select.handle(), RIGHT, false);
    input.process_input().unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(0, Some(true)), (1, Some(false))]
    );
    assert_eq!(sim.call_count("sync_actions"), 1);
}

#[test]
fn test_pose_without_action_space_fails() {
    let (_sim, provider) = running_provider();
    let input = provider.input().unwrap();
    let set = input.create_action_set("main", "Main", 0).unwrap();
    let grip = input
        .create_action(&set, ActionKind::Pose, "grip", "Grip", &[LEFT, RIGHT], None)
        .unwrap();
    input.create_action_space(&grip, 0, Pose::IDENTITY).unwrap();

    let time = sys::Time::from_nanos(1);
    assert!(input.get_action_pose(&grip, 0, time).is_ok());
    for index in [1, 2, 99] {
        let err = input.get_action_pose(&grip, index, time).unwrap_err();
        assert_eq!(err.code(), sys::Result::ERROR_VALIDATION_FAILURE);
    }
}

#[test]
fn test_base_controller_suggests_every_hand_profile() {
    let (sim, provider) = running_provider();
    let input = provider.input().unwrap();
    let set = input.create_action_set("main", "Main", 0).unwrap();
    let trigger = input
        .create_action(&set, ActionKind::Float, "trigger", "Trigger", &[LEFT, RIGHT], None)
        .unwrap();
    let menu = input
        .create_action(&set, ActionKind::Boolean, "menu", "Menu", &[LEFT, RIGHT], None)
        .unwrap();

    let mut controller = BaseController::default();
    for hand in Hand::BOTH {
        input
            .add_binding(&mut controller, &trigger, hand, Component::Trigger, Qualifier::Value)
            .unwrap();
        // touch has no right menu, trackers have no hands: both absorbed
        input
            .add_binding(&mut controller, &menu, hand, Component::Menu, Qualifier::Click)
            .unwrap();
    }
    input.suggest_bindings(&controller).unwrap();

    let suggested = sim.suggested_bindings();
    let profiles: Vec<&str> = suggested.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(
        profiles,
        vec![
            HTC_VIVE_PROFILE,
            MICROSOFT_MIXED_REALITY_PROFILE,
            OCULUS_TOUCH_PROFILE,
            VALVE_INDEX_PROFILE,
        ]
    );
    let (_, touch) = &suggested[2];
    assert_eq!(touch.len(), 3);
    assert!(touch.contains(&"/user/hand/right/input/trigger/value".to_string()));
}

#[test]
fn test_hard_binding_failure_stops_fan_out() {
    let (sim, provider) = running_provider();
    let input = provider.input().unwrap();
    let set = input.create_action_set("main", "Main", 0).unwrap();
    let trigger = input
        .create_action(&set, ActionKind::Float, "trigger", "Trigger", &[LEFT], None)
        .unwrap();

    let mut controller = BaseController::default();
    input
        .add_binding(&mut controller, &trigger, Hand::Left, Component::Trigger, Qualifier::Value)
        .unwrap();
    sim.fail_on(
        "suggest_interaction_profile_bindings",
        2,
        sys::Result::ERROR_PATH_UNSUPPORTED,
    );
    let err = input.suggest_bindings(&controller).unwrap_err();
    assert_eq!(err.code(), sys::Result::ERROR_PATH_UNSUPPORTED);
    assert_eq!(sim.call_count("suggest_interaction_profile_bindings"), 2);
}

#[test]
fn test_dispatch_ring_bounds_in_flight_sweeps() {
    let (sim, provider) = running_provider();
    let input = provider.input().unwrap();
    let set = input.create_action_set("main", "Main", 0).unwrap();
    let squeeze = input
        .create_action(&set, ActionKind::Float, "squeeze", "Squeeze", &[LEFT, RIGHT], None)
        .unwrap();
    input.attach_action_sets_to_session(&[Arc::clone(&set)]).unwrap();
    input.add_actionset_for_sync(&set, None).unwrap();
    sim.set_float(squeeze.handle(), RIGHT, 0.75);

    for _ in 0..(MAX_IN_FLIGHT * 2 + 1) {
        input.dispatch().unwrap();
        assert!(input.in_flight() <= MAX_IN_FLIGHT);
    }
    input.collect().unwrap();

    assert_eq!(input.in_flight(), 0);
    assert_eq!(input.dispatched(), (MAX_IN_FLIGHT * 2 + 1) as u64);
    assert_eq!(sim.call_count("sync_actions"), MAX_IN_FLIGHT * 2 + 1);
    assert_eq!(squeeze.state(1).and_then(|s| s.as_float()), Some(0.75));
    assert_eq!(squeeze.state(0).and_then(|s| s.as_float()), Some(0.0));
}

#[test]
fn test_dispatch_failure_surfaces_on_collect() {
    let (sim, provider) = running_provider();
    let input = provider.input().unwrap();
    let set = input.create_action_set("main", "Main", 0).unwrap();
    input.attach_action_sets_to_session(&[Arc::clone(&set)]).unwrap();
    input.add_actionset_for_sync(&set, None).unwrap();

    sim.fail_next("sync_actions", sys::Result::ERROR_SESSION_LOST);
    input.dispatch().unwrap();
    let err = input.collect().unwrap_err();
    assert_eq!(err.code(), sys::Result::ERROR_SESSION_LOST);
    input.collect().unwrap();
}

#[test]
fn test_tracker_roles_get_one_space_each() {
    let (sim, provider) = running_provider();
    let input = provider.input().unwrap();
    let trackers = provider
        .extension_as::<ViveTrackerInteraction>(HTCX_VIVE_TRACKER_INTERACTION)
        .unwrap();
    let spaces_before = sim.live_spaces();

    let set = input.create_action_set("trackers", "Trackers", 0).unwrap();
    let pose = trackers.setup_all_tracker_roles(input, &set).unwrap();
    assert_eq!(pose.name(), "tracker_pose");
    assert_eq!(pose.slot_count(), TrackerRole::ALL.len());
    assert_eq!(sim.live_spaces(), spaces_before + TrackerRole::ALL.len());

    sim.connect_tracker("/devices/htc/vive_trackerLHR-1", &TrackerRole::Waist.user_path());
    let connected = trackers.connected_trackers(input).unwrap();
    assert_eq!(connected.len(), 1);
    assert_eq!(connected[0].role(), Some(TrackerRole::Waist));

    drop(set);
    drop(pose);
    assert_eq!(sim.live_spaces(), spaces_before);
}
