//! Interaction-profile binding tables.
//!
//! Each controller family translates an abstract `(hand, component,
//! qualifier)` request into the literal input path its profile defines.
//! Requests a family has no equivalent for return `XR_ERROR_FEATURE_UNSUPPORTED`;
//! [`BaseController`] fans out over every family and absorbs that code.

use openxr::sys;
use tracing::{debug, info};

use crate::error::{check, ProviderError, ProviderResult};
use crate::runtime::{SuggestedBinding, XrRuntime};
use crate::types::Hand;

const INPUT: &str = "/input";
const OUTPUT: &str = "/output";

const TRIGGER: &str = "/trigger";
const THUMBSTICK: &str = "/thumbstick";
const TRACKPAD: &str = "/trackpad";
const SQUEEZE: &str = "/squeeze";
const MENU: &str = "/menu";
const SYSTEM: &str = "/system";

const GRIP_POSE: &str = "/grip/pose";
const AIM_POSE: &str = "/aim/pose";
const HAPTIC: &str = "/haptic";

const CLICK: &str = "/click";
const TOUCH: &str = "/touch";
const VALUE: &str = "/value";
const FORCE: &str = "/force";

const A: &str = "/a";
const B: &str = "/b";
const X: &str = "/x";
const Y: &str = "/y";

pub const HTC_VIVE_PROFILE: &str = "/interaction_profiles/htc/vive_controller";
pub const MICROSOFT_MIXED_REALITY_PROFILE: &str =
    "/interaction_profiles/microsoft/motion_controller";
pub const OCULUS_TOUCH_PROFILE: &str = "/interaction_profiles/oculus/touch_controller";
pub const VALVE_INDEX_PROFILE: &str = "/interaction_profiles/valve/index_controller";
pub const VIVE_TRACKER_PROFILE: &str = "/interaction_profiles/htc/vive_tracker_htcx";

pub const TRACKER_ROLE_ROOT: &str = "/user/vive_tracker_htcx/role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    GripPose,
    AimPose,
    Trigger,
    PrimaryButton,
    SecondaryButton,
    AxisControl,
    Squeeze,
    Menu,
    System,
    Haptic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Qualifier {
    None,
    Click,
    Touch,
    Value,
    Force,
    X,
    Y,
    Grip,
    Haptic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerRole {
    HandheldObject,
    FootLeft,
    FootRight,
    ShoulderLeft,
    ShoulderRight,
    ElbowLeft,
    ElbowRight,
    KneeLeft,
    KneeRight,
    Waist,
    Chest,
    Camera,
    Keyboard,
}

impl TrackerRole {
    pub const ALL: [TrackerRole; 13] = [
        TrackerRole::HandheldObject,
        TrackerRole::FootLeft,
        TrackerRole::FootRight,
        TrackerRole::ShoulderLeft,
        TrackerRole::ShoulderRight,
        TrackerRole::ElbowLeft,
        TrackerRole::ElbowRight,
        TrackerRole::KneeLeft,
        TrackerRole::KneeRight,
        TrackerRole::Waist,
        TrackerRole::Chest,
        TrackerRole::Camera,
        TrackerRole::Keyboard,
    ];

    fn segment(self) -> &'static str {
        match self {
            TrackerRole::HandheldObject => "/handheld_object",
            TrackerRole::FootLeft => "/left_foot",
            TrackerRole::FootRight => "/right_foot",
            TrackerRole::ShoulderLeft => "/left_shoulder",
            TrackerRole::ShoulderRight => "/right_shoulder",
            TrackerRole::ElbowLeft => "/left_elbow",
            TrackerRole::ElbowRight => "/right_elbow",
            TrackerRole::KneeLeft => "/left_knee",
            TrackerRole::KneeRight => "/right_knee",
            TrackerRole::Waist => "/waist",
            TrackerRole::Chest => "/chest",
            TrackerRole::Camera => "/camera",
            TrackerRole::Keyboard => "/keyboard",
        }
    }

    /// Top-level user path, e.g. `/user/vive_tracker_htcx/role/waist`.
    pub fn user_path(self) -> String {
        format!("{TRACKER_ROLE_ROOT}{}", self.segment())
    }

    pub fn from_user_path(path: &str) -> Option<Self> {
        let segment = path.strip_prefix(TRACKER_ROLE_ROOT)?;
        Self::ALL.into_iter().find(|role| role.segment() == segment)
    }
}

pub trait Controller: Send {
    fn profile_path(&self) -> &'static str;

    fn add_binding(
        &mut self,
        runtime: &dyn XrRuntime,
        action: sys::Action,
        hand: Hand,
        component: Component,
        qualifier: Qualifier,
    ) -> ProviderResult<()>;

    /// Adds a binding by its full literal input path.
    fn add_binding_path(
        &mut self,
        runtime: &dyn XrRuntime,
        action: sys::Action,
        path: &str,
    ) -> ProviderResult<()>;

    fn suggest_bindings(&self, runtime: &dyn XrRuntime) -> ProviderResult<()>;
}

/// Bindings accumulated for one interaction profile.
#[derive(Debug, Clone)]
pub struct BindingTable {
    profile: &'static str,
    bindings: Vec<SuggestedBinding>,
    paths: Vec<String>,
}

impl BindingTable {
    pub fn new(profile: &'static str) -> Self {
        Self {
            profile,
            bindings: Vec::new(),
            paths: Vec::new(),
        }
    }

    pub fn push(
        &mut self,
        runtime: &dyn XrRuntime,
        action: sys::Action,
        path: String,
    ) -> ProviderResult<()> {
        let binding = check(runtime.string_to_path(&path), "binding path conversion")?;
        info!("added binding path {path} for {}", self.profile);
        self.bindings.push(SuggestedBinding { action, binding });
        self.paths.push(path);
        Ok(())
    }

    /// One runtime call for the whole table. An empty table has nothing to
    /// suggest and reports unsupported without calling the runtime.
    pub fn suggest(&self, runtime: &dyn XrRuntime) -> ProviderResult<()> {
        if self.bindings.is_empty() {
            debug!("no bindings to suggest for {}", self.profile);
            return Err(ProviderError::unsupported());
        }
        let profile = check(
            runtime.string_to_path(self.profile),
            "interaction profile path conversion",
        )?;
        check(
            runtime.suggest_interaction_profile_bindings(profile, &self.bindings),
            "suggest interaction profile bindings",
        )?;
        info!(
            count = self.bindings.len(),
            "suggested bindings for {}", self.profile
        );
        Ok(())
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

type BindingMap = fn(Hand, Component, Qualifier) -> Option<String>;

/// A hand-held controller family backed by one binding map.
pub struct ProfileController {
    table: BindingTable,
    map: BindingMap,
}

impl ProfileController {
    pub fn htc_vive() -> Self {
        Self::with_map(HTC_VIVE_PROFILE, htc_vive_binding)
    }

    pub fn microsoft_mixed_reality() -> Self {
        Self::with_map(MICROSOFT_MIXED_REALITY_PROFILE, microsoft_binding)
    }

    pub fn oculus_touch() -> Self {
        Self::with_map(OCULUS_TOUCH_PROFILE, oculus_touch_binding)
    }

    pub fn valve_index() -> Self {
        Self::with_map(VALVE_INDEX_PROFILE, valve_index_binding)
    }

    fn with_map(profile: &'static str, map: BindingMap) -> Self {
        Self {
            table: BindingTable::new(profile),
            map,
        }
    }

    /// Literal path for a request, without touching the runtime.
    pub fn binding_path(
        &self,
        hand: Hand,
        component: Component,
        qualifier: Qualifier,
    ) -> Option<String> {
        (self.map)(hand, component, qualifier)
    }

    pub fn table(&self) -> &BindingTable {
        &self.table
    }
}

impl Controller for ProfileController {
    fn profile_path(&self) -> &'static str {
        self.table.profile
    }

    fn add_binding(
        &mut self,
        runtime: &dyn XrRuntime,
        action: sys::Action,
        hand: Hand,
        component: Component,
        qualifier: Qualifier,
    ) -> ProviderResult<()> {
        match self.binding_path(hand, component, qualifier) {
            Some(path) => self.table.push(runtime, action, path),
            None => {
                debug!(
                    "{} has no {component:?}/{qualifier:?} on {hand:?}",
                    self.table.profile
                );
                Err(ProviderError::unsupported())
            }
        }
    }

    fn add_binding_path(
        &mut self,
        runtime: &dyn XrRuntime,
        action: sys::Action,
        path: &str,
    ) -> ProviderResult<()> {
        self.table.push(runtime, action, path.to_string())
    }

    fn suggest_bindings(&self, runtime: &dyn XrRuntime) -> ProviderResult<()> {
        self.table.suggest(runtime)
    }
}

/// Vive trackers are keyed by role rather than by hand.
pub struct ViveTracker {
    table: BindingTable,
}

impl Default for ViveTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ViveTracker {
    pub fn new() -> Self {
        Self {
            table: BindingTable::new(VIVE_TRACKER_PROFILE),
        }
    }

    pub fn binding_path(
        role: TrackerRole,
        component: Component,
        qualifier: Qualifier,
    ) -> Option<String> {
        let io = if component == Component::Haptic { OUTPUT } else { INPUT };
        let tail = match component {
            Component::GripPose => GRIP_POSE.to_string(),
            Component::Trigger => {
                let suffix = if qualifier == Qualifier::Click { CLICK } else { VALUE };
                format!("{TRIGGER}{suffix}")
            }
            Component::AxisControl => format!("{TRACKPAD}{}", axis_suffix(qualifier)),
            Component::Squeeze => format!("{SQUEEZE}{CLICK}"),
            Component::Menu => format!("{MENU}{CLICK}"),
            Component::Haptic => HAPTIC.to_string(),
            Component::AimPose
            | Component::PrimaryButton
            | Component::SecondaryButton
            | Component::System => return None,
        };
        Some(format!("{}{io}{tail}", role.user_path()))
    }

    pub fn add_role_binding(
        &mut self,
        runtime: &dyn XrRuntime,
        action: sys::Action,
        role: TrackerRole,
        component: Component,
        qualifier: Qualifier,
    ) -> ProviderResult<()> {
        match Self::binding_path(role, component, qualifier) {
            Some(path) => self.table.push(runtime, action, path),
            None => Err(ProviderError::unsupported()),
        }
    }

    pub fn table(&self) -> &BindingTable {
        &self.table
    }
}

impl Controller for ViveTracker {
    fn profile_path(&self) -> &'static str {
        self.table.profile
    }

    fn add_binding(
        &mut self,
        _runtime: &dyn XrRuntime,
        _action: sys::Action,
        _hand: Hand,
        _component: Component,
        _qualifier: Qualifier,
    ) -> ProviderResult<()> {
        Err(ProviderError::unsupported())
    }

    fn add_binding_path(
        &mut self,
        runtime: &dyn XrRuntime,
        action: sys::Action,
        path: &str,
    ) -> ProviderResult<()> {
        self.table.push(runtime, action, path.to_string())
    }

    fn suggest_bindings(&self, runtime: &dyn XrRuntime) -> ProviderResult<()> {
        self.table.suggest(runtime)
    }
}

/// Fans every request out to its children in order.
///
/// Children reporting unsupported are skipped; the first other failure is
/// returned and later children are not called.
pub struct BaseController {
    children: Vec<Box<dyn Controller>>,
}

impl Default for BaseController {
    fn default() -> Self {
        Self::new(vec![
            Box::new(ProfileController::htc_vive()),
            Box::new(ProfileController::microsoft_mixed_reality()),
            Box::new(ProfileController::oculus_touch()),
            Box::new(ProfileController::valve_index()),
            Box::new(ViveTracker::new()),
        ])
    }
}

impl BaseController {
    pub fn new(children: Vec<Box<dyn Controller>>) -> Self {
        Self { children }
    }

    pub fn children(&self) -> impl Iterator<Item = &dyn Controller> {
        self.children.iter().map(|child| child.as_ref())
    }
}

fn absorb_unsupported(result: ProviderResult<()>) -> ProviderResult<()> {
    match result {
        Err(err) if err.is_unsupported() => Ok(()),
        other => other,
    }
}

impl Controller for BaseController {
    fn profile_path(&self) -> &'static str {
        "base"
    }

    fn add_binding(
        &mut self,
        runtime: &dyn XrRuntime,
        action: sys::Action,
        hand: Hand,
        component: Component,
        qualifier: Qualifier,
    ) -> ProviderResult<()> {
        for child in &mut self.children {
            absorb_unsupported(child.add_binding(runtime, action, hand, component, qualifier))?;
        }
        Ok(())
    }

    fn add_binding_path(
        &mut self,
        _runtime: &dyn XrRuntime,
        _action: sys::Action,
        _path: &str,
    ) -> ProviderResult<()> {
        Err(ProviderError::unsupported())
    }

    fn suggest_bindings(&self, runtime: &dyn XrRuntime) -> ProviderResult<()> {
        for child in &self.children {
            absorb_unsupported(child.suggest_bindings(runtime))?;
        }
        Ok(())
    }
}

fn hand_path(hand: Hand, component: Component, parts: &[&str]) -> String {
    let mut path = String::from(hand.user_path());
    path.push_str(if component == Component::Haptic { OUTPUT } else { INPUT });
    for part in parts {
        path.push_str(part);
    }
    path
}

fn axis_suffix(qualifier: Qualifier) -> &'static str {
    match qualifier {
        Qualifier::Click => CLICK,
        Qualifier::Touch => TOUCH,
        Qualifier::X => X,
        Qualifier::Y => Y,
        _ => "",
    }
}

fn click_or_touch(qualifier: Qualifier) -> &'static str {
    if qualifier == Qualifier::Touch {
        TOUCH
    } else {
        CLICK
    }
}

fn htc_vive_binding(hand: Hand, component: Component, qualifier: Qualifier) -> Option<String> {
    let parts: [&str; 2] = match component {
        Component::GripPose => [GRIP_POSE, ""],
        Component::AimPose => [AIM_POSE, ""],
        Component::Trigger => [TRIGGER, if qualifier == Qualifier::Click { CLICK } else { VALUE }],
        Component::PrimaryButton | Component::SecondaryButton => return None,
        Component::AxisControl => [TRACKPAD, axis_suffix(qualifier)],
        Component::Squeeze => [SQUEEZE, CLICK],
        Component::Menu => [MENU, CLICK],
        Component::System => [SYSTEM, CLICK],
        Component::Haptic => [HAPTIC, ""],
    };
    Some(hand_path(hand, component, &parts))
}

fn microsoft_binding(hand: Hand, component: Component, qualifier: Qualifier) -> Option<String> {
    let parts: [&str; 2] = match component {
        Component::GripPose => [GRIP_POSE, ""],
        Component::AimPose => [AIM_POSE, ""],
        Component::Trigger => [TRIGGER, VALUE],
        Component::PrimaryButton | Component::SecondaryButton => return None,
        Component::AxisControl => {
            let suffix = match qualifier {
                Qualifier::X => X,
                Qualifier::Y => Y,
                Qualifier::None => "",
                _ => CLICK,
            };
            [THUMBSTICK, suffix]
        }
        Component::Squeeze => [SQUEEZE, CLICK],
        Component::Menu => [MENU, CLICK],
        Component::System => [SYSTEM, CLICK],
        Component::Haptic => [HAPTIC, ""],
    };
    Some(hand_path(hand, component, &parts))
}

fn oculus_touch_binding(hand: Hand, component: Component, qualifier: Qualifier) -> Option<String> {
    let parts: [&str; 2] = match component {
        Component::GripPose => [GRIP_POSE, ""],
        Component::AimPose => [AIM_POSE, ""],
        Component::Trigger => [TRIGGER, if qualifier == Qualifier::Touch { TOUCH } else { VALUE }],
        Component::PrimaryButton => {
            let button = if hand == Hand::Left { X } else { A };
            [button, click_or_touch(qualifier)]
        }
        Component::SecondaryButton => {
            let button = if hand == Hand::Left { Y } else { B };
            [button, click_or_touch(qualifier)]
        }
        Component::AxisControl => [THUMBSTICK, axis_suffix(qualifier)],
        Component::Squeeze => [SQUEEZE, if qualifier == Qualifier::Value { VALUE } else { "" }],
        // menu exists on the left controller only, system on the right only
        Component::Menu if hand == Hand::Left => [MENU, CLICK],
        Component::System if hand == Hand::Right => [SYSTEM, CLICK],
        Component::Menu | Component::System => return None,
        Component::Haptic => [HAPTIC, ""],
    };
    Some(hand_path(hand, component, &parts))
}

fn valve_index_binding(hand: Hand, component: Component, qualifier: Qualifier) -> Option<String> {
    let parts: [&str; 2] = match component {
        Component::GripPose => [GRIP_POSE, ""],
        Component::AimPose => [AIM_POSE, ""],
        Component::Trigger => [TRIGGER, if qualifier == Qualifier::Value { VALUE } else { CLICK }],
        Component::PrimaryButton => [A, click_or_touch(qualifier)],
        Component::SecondaryButton => [B, click_or_touch(qualifier)],
        Component::AxisControl => [THUMBSTICK, axis_suffix(qualifier)],
        Component::Squeeze => [SQUEEZE, if qualifier == Qualifier::Value { VALUE } else { FORCE }],
        Component::Menu | Component::System => [SYSTEM, click_or_touch(qualifier)],
        Component::Haptic => [HAPTIC, ""],
    };
    Some(hand_path(hand, component, &parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimRuntime;
    use openxr::sys::Handle;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_vive_trigger_paths() {
        let vive = ProfileController::htc_vive();
        assert_eq!(
            vive.binding_path(Hand::Left, Component::Trigger, Qualifier::Click).as_deref(),
            Some("/user/hand/left/input/trigger/click")
        );
        assert_eq!(
            vive.binding_path(Hand::Right, Component::Trigger, Qualifier::None).as_deref(),
            Some("/user/hand/right/input/trigger/value")
        );
        assert_eq!(
            vive.binding_path(Hand::Right, Component::PrimaryButton, Qualifier::Click),
            None
        );
        assert_eq!(
            vive.binding_path(Hand::Left, Component::AxisControl, Qualifier::None).as_deref(),
            Some("/user/hand/left/input/trackpad")
        );
    }

    #[test]
    fn test_haptic_uses_output_path() {
        let index = ProfileController::valve_index();
        assert_eq!(
            index.binding_path(Hand::Right, Component::Haptic, Qualifier::Haptic).as_deref(),
            Some("/user/hand/right/output/haptic")
        );
    }

    #[test]
    fn test_touch_buttons_depend_on_hand() {
        let touch = ProfileController::oculus_touch();
        assert_eq!(
            touch.binding_path(Hand::Left, Component::PrimaryButton, Qualifier::Click).as_deref(),
            Some("/user/hand/left/input/x/click")
        );
        assert_eq!(
            touch
                .binding_path(Hand::Right, Component::SecondaryButton, Qualifier::Touch)
                .as_deref(),
            Some("/user/hand/right/input/b/touch")
        );
        assert_eq!(touch.binding_path(Hand::Right, Component::Menu, Qualifier::Click), None);
        assert_eq!(touch.binding_path(Hand::Left, Component::System, Qualifier::Click), None);
        assert_eq!(
            touch.binding_path(Hand::Left, Component::Squeeze, Qualifier::None).as_deref(),
            Some("/user/hand/left/input/squeeze")
        );
    }

    #[test]
    fn test_index_menu_maps_to_system() {
        let index = ProfileController::valve_index();
        assert_eq!(
            index.binding_path(Hand::Left, Component::Menu, Qualifier::Touch).as_deref(),
            Some("/user/hand/left/input/system/touch")
        );
        assert_eq!(
            index.binding_path(Hand::Left, Component::Squeeze, Qualifier::None).as_deref(),
            Some("/user/hand/left/input/squeeze/force")
        );
    }

    #[test]
    fn test_microsoft_thumbstick_defaults_to_click() {
        let wmr = ProfileController::microsoft_mixed_reality();
        assert_eq!(
            wmr.binding_path(Hand::Left, Component::AxisControl, Qualifier::Touch).as_deref(),
            Some("/user/hand/left/input/thumbstick/click")
        );
        assert_eq!(
            wmr.binding_path(Hand::Left, Component::AxisControl, Qualifier::None).as_deref(),
            Some("/user/hand/left/input/thumbstick")
        );
    }

    #[test]
    fn test_tracker_roles_round_trip() {
        for role in TrackerRole::ALL {
            assert_eq!(TrackerRole::from_user_path(&role.user_path()), Some(role));
        }
        assert_eq!(
            ViveTracker::binding_path(TrackerRole::Waist, Component::GripPose, Qualifier::None)
                .as_deref(),
            Some("/user/vive_tracker_htcx/role/waist/input/grip/pose")
        );
        assert_eq!(
            ViveTracker::binding_path(TrackerRole::Camera, Component::AimPose, Qualifier::None),
            None
        );
    }

    #[test]
    fn test_unsupported_request_does_not_touch_table() {
        let runtime = SimRuntime::default();
        let mut vive = ProfileController::htc_vive();
        let err = vive
            .add_binding(
                &runtime,
                sys::Action::from_raw(1),
                Hand::Left,
                Component::PrimaryButton,
                Qualifier::Click,
            )
            .unwrap_err();
        assert!(err.is_unsupported());
        assert!(vive.table().is_empty());
    }

    struct Scripted {
        name: &'static str,
        result: ProviderResult<()>,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Controller for Scripted {
        fn profile_path(&self) -> &'static str {
            self.name
        }

        fn add_binding(
            &mut self,
            _runtime: &dyn XrRuntime,
            _action: sys::Action,
            _hand: Hand,
            _component: Component,
            _qualifier: Qualifier,
        ) -> ProviderResult<()> {
            self.log.lock().unwrap().push(self.name);
            self.result
        }

        fn add_binding_path(
            &mut self,
            _runtime: &dyn XrRuntime,
            _action: sys::Action,
            _path: &str,
        ) -> ProviderResult<()> {
            self.result
        }

        fn suggest_bindings(&self, _runtime: &dyn XrRuntime) -> ProviderResult<()> {
            self.log.lock().unwrap().push(self.name);
            self.result
        }
    }

    fn scripted_base(log: &Arc<Mutex<Vec<&'static str>>>) -> BaseController {
        let child = |name, result| -> Box<dyn Controller> {
            Box::new(Scripted {
                name,
                result,
                log: Arc::clone(log),
            })
        };
        BaseController::new(vec![
            child("a", Err(ProviderError::unsupported())),
            child("b", Err(ProviderError::Runtime(sys::Result::ERROR_PATH_UNSUPPORTED))),
            child("c", Ok(())),
        ])
    }

    #[test]
    fn test_fan_out_returns_first_hard_failure() {
        let runtime = SimRuntime::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut base = scripted_base(&log);

        let err = base
            .add_binding(
                &runtime,
                sys::Action::from_raw(1),
                Hand::Left,
                Component::Trigger,
                Qualifier::Value,
            )
            .unwrap_err();
        assert_eq!(err.code(), sys::Result::ERROR_PATH_UNSUPPORTED);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);

        log.lock().unwrap().clear();
        let err = base.suggest_bindings(&runtime).unwrap_err();
        assert_eq!(err.code(), sys::Result::ERROR_PATH_UNSUPPORTED);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_fan_out_absorbs_unsupported() {
        let runtime = SimRuntime::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut base = BaseController::new(vec![
            Box::new(Scripted {
                name: "a",
                result: Err(ProviderError::unsupported()),
                log: Arc::clone(&log),
            }),
            Box::new(Scripted {
                name: "b",
                result: Ok(()),
                log: Arc::clone(&log),
            }),
        ]);
        assert!(base
            .add_binding(
                &runtime,
                sys::Action::from_raw(1),
                Hand::Right,
                Component::Menu,
                Qualifier::Click,
            )
            .is_ok());
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }
}
