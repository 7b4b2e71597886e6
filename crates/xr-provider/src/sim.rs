//! In-process scriptable runtime.
//!
//! Behaves like a small conformant runtime (session lifecycle events, frame
//! pacing, swapchain image cycling, action state) without a device, so the
//! provider can run headless and be exercised by tests. Every entry point is
//! recorded by name and any of them can be scripted to fail.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use glam::Vec2;
use openxr::sys::{self, Handle};

use crate::config::AppInstanceInfo;
use crate::extensions::{
    EXT_EYE_GAZE_INTERACTION, EXT_HAND_TRACKING, FB_DISPLAY_REFRESH_RATE, FB_PASSTHROUGH,
    HTCX_VIVE_TRACKER_INTERACTION, KHR_COMPOSITION_LAYER_DEPTH, KHR_VISIBILITY_MASK,
    KHR_VULKAN_ENABLE, KHR_VULKAN_ENABLE2,
};
use crate::runtime::{
    ApiLayerProperties, CompositionLayer, ExtensionProperties, FrameState, HapticVibration,
    LocatedView, RuntimeEvent, RuntimeProperties, SpaceLocation, SuggestedBinding,
    SwapchainCreateInfo, SystemProperties, ViewConfigView, ViveTrackerPaths, VulkanBinding,
    XrLoader, XrResult, XrRuntime,
};
use crate::session::{is_depth_format, VK_FORMAT_D24_UNORM_S8_UINT, VK_FORMAT_D32_SFLOAT};
use crate::types::{ActionKind, ActionState, InputSample, Pose};

pub const VK_FORMAT_R8G8B8A8_UNORM: i64 = 37;
pub const VK_FORMAT_R8G8B8A8_SRGB: i64 = 43;
pub const VK_FORMAT_B8G8R8A8_SRGB: i64 = 50;

const FRAME_PERIOD_NS: i64 = 11_111_111;
const HMD_SYSTEM_ID: u64 = 1;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub runtime_name: String,
    pub extensions: Vec<String>,
    pub api_layers: Vec<String>,
    pub view_configurations: Vec<sys::ViewConfigurationType>,
    pub view: ViewConfigView,
    pub view_count: usize,
    pub swapchain_formats: Vec<i64>,
    pub swapchain_image_count: u32,
    /// Image count of depth swapchains; `None` matches the color count.
    pub depth_image_count: Option<u32>,
    pub reference_spaces: Vec<sys::ReferenceSpaceType>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            runtime_name: "xr-provider simulator".to_string(),
            extensions: [
                KHR_VULKAN_ENABLE,
                KHR_VULKAN_ENABLE2,
                KHR_COMPOSITION_LAYER_DEPTH,
                KHR_VISIBILITY_MASK,
                EXT_HAND_TRACKING,
                EXT_EYE_GAZE_INTERACTION,
                FB_PASSTHROUGH,
                FB_DISPLAY_REFRESH_RATE,
                HTCX_VIVE_TRACKER_INTERACTION,
                "XR_KHR_opengl_enable",
                "XR_KHR_D3D11_enable",
            ]
            .iter()
            .map(|name| name.to_string())
            .collect(),
            api_layers: vec!["XR_APILAYER_LUNARG_core_validation".to_string()],
            view_configurations: vec![
                sys::ViewConfigurationType::PRIMARY_STEREO,
                sys::ViewConfigurationType::PRIMARY_MONO,
            ],
            view: ViewConfigView {
                recommended_width: 1832,
                max_width: 4096,
                recommended_height: 1920,
                max_height: 4096,
                recommended_sample_count: 1,
                max_sample_count: 4,
            },
            view_count: 2,
            swapchain_formats: vec![
                VK_FORMAT_D32_SFLOAT,
                VK_FORMAT_R8G8B8A8_SRGB,
                VK_FORMAT_B8G8R8A8_SRGB,
                VK_FORMAT_D24_UNORM_S8_UINT,
                VK_FORMAT_R8G8B8A8_UNORM,
            ],
            swapchain_image_count: 3,
            depth_image_count: None,
            reference_spaces: vec![
                sys::ReferenceSpaceType::VIEW,
                sys::ReferenceSpaceType::LOCAL,
                sys::ReferenceSpaceType::STAGE,
            ],
        }
    }
}

/// One submitted frame as seen by the runtime.
#[derive(Debug, Clone)]
pub struct SubmittedFrame {
    pub display_time: sys::Time,
    pub blend_mode: sys::EnvironmentBlendMode,
    pub layers: Vec<CompositionLayer>,
}

impl SubmittedFrame {
    pub fn projection_layers(&self) -> usize {
        self.layers.iter().filter(|l| l.is_projection()).count()
    }
}

#[derive(Debug, Clone, Default)]
struct SimSwapchain {
    image_count: u32,
    next_index: u32,
    acquired: VecDeque<u32>,
    waited: Option<u32>,
}

#[derive(Debug, Clone)]
struct SimAction {
    action_set: u64,
    kind: ActionKind,
}

#[derive(Default)]
struct SimState {
    next_handle: u64,
    instance_live: bool,
    calls: Vec<&'static str>,
    failures: HashMap<&'static str, VecDeque<Option<sys::Result>>>,
    events: VecDeque<RuntimeEvent>,
    paths: Vec<String>,
    session: Option<sys::Session>,
    session_state: Option<sys::SessionState>,
    running: bool,
    frame_begun: bool,
    frame_index: i64,
    should_render: bool,
    orientation_valid: bool,
    spaces: HashMap<u64, Pose>,
    swapchains: HashMap<u64, SimSwapchain>,
    action_sets: HashSet<u64>,
    attached: HashSet<u64>,
    actions: HashMap<u64, SimAction>,
    inputs: HashMap<(u64, u64), ActionState>,
    suggested: Vec<(String, Vec<String>)>,
    haptics: Vec<(sys::Action, sys::Path, HapticVibration)>,
    frames: Vec<SubmittedFrame>,
    trackers: Vec<(String, String)>,
    interaction_profiles: HashMap<u64, u64>,
}

struct SimInner {
    config: SimConfig,
    state: Mutex<SimState>,
}

/// Handle to a simulated runtime. Clones share the same state.
#[derive(Clone)]
pub struct SimRuntime {
    inner: Arc<SimInner>,
}

impl Default for SimRuntime {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimRuntime {
    pub fn new(config: SimConfig) -> Self {
        let state = SimState {
            next_handle: 100,
            should_render: true,
            orientation_valid: true,
            ..SimState::default()
        };
        Self {
            inner: Arc::new(SimInner {
                config,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Records the call and pops a scripted failure for it, if any.
    fn enter(&self, call: &'static str) -> XrResult<MutexGuard<'_, SimState>> {
        let mut state = self.state();
        state.calls.push(call);
        if let Some(Some(code)) = state.failures.get_mut(call).and_then(VecDeque::pop_front) {
            return Err(code);
        }
        Ok(state)
    }

    /// Makes the next call to `call` fail with `code`.
    pub fn fail_next(&self, call: &'static str, code: sys::Result) {
        self.fail_on(call, 1, code);
    }

    /// Makes the `nth` upcoming call to `call` (1-based) fail with `code`.
    pub fn fail_on(&self, call: &'static str, nth: usize, code: sys::Result) {
        let nth = nth.max(1);
        let mut state = self.state();
        let queue = state.failures.entry(call).or_default();
        while queue.len() < nth {
            queue.push_back(None);
        }
        queue[nth - 1] = Some(code);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == call).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn set_should_render(&self, should_render: bool) {
        self.state().should_render = should_render;
    }

    pub fn set_orientation_valid(&self, valid: bool) {
        self.state().orientation_valid = valid;
    }

    /// Queues a state change for the live session, as the compositor would.
    pub fn push_session_state(&self, state: sys::SessionState) {
        let mut guard = self.state();
        push_state(&mut guard, state);
    }

    pub fn push_event(&self, event: RuntimeEvent) {
        self.state().events.push_back(event);
    }

    pub fn path(&self, path: &str) -> sys::Path {
        intern(&mut self.state(), path)
    }

    pub fn set_input(&self, action: sys::Action, subaction_path: &str, state: ActionState) {
        let mut guard = self.state();
        let path = intern(&mut guard, subaction_path);
        guard
            .inputs
            .insert((action.into_raw(), path.into_raw()), state);
    }

    pub fn set_boolean(&self, action: sys::Action, subaction_path: &str, value: bool) {
        self.set_input(action, subaction_path, active_sample(value, ActionState::Boolean));
    }

    pub fn set_float(&self, action: sys::Action, subaction_path: &str, value: f32) {
        self.set_input(action, subaction_path, active_sample(value, ActionState::Float));
    }

    pub fn set_vector2f(&self, action: sys::Action, subaction_path: &str, value: Vec2) {
        self.set_input(action, subaction_path, active_sample(value, ActionState::Vector2f));
    }

    pub fn connect_tracker(&self, persistent: &str, role: &str) {
        self.state()
            .trackers
            .push((persistent.to_string(), role.to_string()));
    }

    pub fn set_interaction_profile(&self, user_path: &str, profile: &str) {
        let mut guard = self.state();
        let user = intern(&mut guard, user_path);
        let profile = intern(&mut guard, profile);
        guard
            .interaction_profiles
            .insert(user.into_raw(), profile.into_raw());
    }

    pub fn submitted_frames(&self) -> Vec<SubmittedFrame> {
        self.state().frames.clone()
    }

    /// Suggested bindings per interaction profile, as path strings.
    pub fn suggested_bindings(&self) -> Vec<(String, Vec<String>)> {
        self.state().suggested.clone()
    }

    pub fn haptic_count(&self) -> usize {
        self.state().haptics.len()
    }

    pub fn live_spaces(&self) -> usize {
        self.state().spaces.len()
    }

    pub fn live_swapchains(&self) -> usize {
        self.state().swapchains.len()
    }

    pub fn live_action_sets(&self) -> usize {
        self.state().action_sets.len()
    }

    pub fn has_session(&self) -> bool {
        self.state().session.is_some()
    }

    pub fn instance_live(&self) -> bool {
        self.state().instance_live
    }
}

fn active_sample<T>(value: T, wrap: fn(InputSample<T>) -> ActionState) -> ActionState {
    wrap(InputSample {
        current: value,
        changed_since_last_sync: true,
        last_change_time: sys::Time::from_nanos(1),
        is_active: true,
    })
}

fn next_handle(state: &mut SimState) -> u64 {
    state.next_handle += 1;
    state.next_handle
}

fn intern(state: &mut SimState, path: &str) -> sys::Path {
    let index = match state.paths.iter().position(|p| p == path) {
        Some(index) => index,
        None => {
            state.paths.push(path.to_string());
            state.paths.len() - 1
        }
    };
    sys::Path::from_raw(index as u64 + 1)
}

fn lookup(state: &SimState, path: sys::Path) -> XrResult<String> {
    let index = path.into_raw() as usize;
    match index.checked_sub(1).and_then(|i| state.paths.get(i)) {
        Some(path) => Ok(path.clone()),
        None => Err(sys::Result::ERROR_PATH_INVALID),
    }
}

fn push_state(state: &mut SimState, next: sys::SessionState) {
    if let Some(session) = state.session {
        state.session_state = Some(next);
        let time = sys::Time::from_nanos(state.frame_index * FRAME_PERIOD_NS);
        state.events.push_back(RuntimeEvent::SessionStateChanged {
            session,
            state: next,
            time,
        });
    }
}

fn check_session(state: &SimState, session: sys::Session) -> XrResult<()> {
    if state.session == Some(session) {
        Ok(())
    } else {
        Err(sys::Result::ERROR_HANDLE_INVALID)
    }
}

fn identity_view(eye: usize) -> LocatedView {
    let offset = if eye == 0 { -0.032 } else { 0.032 };
    let mut pose = Pose::IDENTITY.to_sys();
    pose.position.x = offset;
    LocatedView {
        pose,
        fov: sys::Fovf {
            angle_left: -0.8,
            angle_right: 0.8,
            angle_up: 0.8,
            angle_down: -0.8,
        },
    }
}

/// Loader that hands out the shared simulated runtime.
#[derive(Clone, Default)]
pub struct SimLoader {
    runtime: SimRuntime,
}

impl SimLoader {
    pub fn new(runtime: SimRuntime) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> SimRuntime {
        self.runtime.clone()
    }
}

impl XrLoader for SimLoader {
    fn enumerate_extensions(&self) -> XrResult<Vec<ExtensionProperties>> {
        let _state = self.runtime.enter("enumerate_extensions")?;
        Ok(self
            .runtime
            .config()
            .extensions
            .iter()
            .map(|name| ExtensionProperties {
                name: name.clone(),
                version: 1,
            })
            .collect())
    }

    fn enumerate_api_layers(&self) -> XrResult<Vec<ApiLayerProperties>> {
        let _state = self.runtime.enter("enumerate_api_layers")?;
        Ok(self
            .runtime
            .config()
            .api_layers
            .iter()
            .map(|name| ApiLayerProperties {
                name: name.clone(),
                spec_version: sys::Version::new(1, 0, 0),
                layer_version: 1,
                description: "simulated layer".to_string(),
            })
            .collect())
    }

    fn create_instance(
        &self,
        _app: &AppInstanceInfo,
        extensions: &[String],
        api_layers: &[String],
    ) -> XrResult<Box<dyn XrRuntime>> {
        let mut state = self.runtime.enter("create_instance")?;
        let config = self.runtime.config();
        if extensions.iter().any(|e| !config.extensions.contains(e)) {
            return Err(sys::Result::ERROR_EXTENSION_NOT_PRESENT);
        }
        if api_layers.iter().any(|l| !config.api_layers.contains(l)) {
            return Err(sys::Result::ERROR_API_LAYER_NOT_PRESENT);
        }
        state.instance_live = true;
        Ok(Box::new(self.runtime.clone()))
    }
}

impl XrRuntime for SimRuntime {
    fn instance_properties(&self) -> XrResult<RuntimeProperties> {
        let _state = self.enter("instance_properties")?;
        Ok(RuntimeProperties {
            runtime_name: self.config().runtime_name.clone(),
            runtime_version: sys::Version::new(0, 1, 0),
        })
    }

    fn system(&self, form_factor: sys::FormFactor) -> XrResult<sys::SystemId> {
        let _state = self.enter("system")?;
        if form_factor == sys::FormFactor::HEAD_MOUNTED_DISPLAY {
            Ok(sys::SystemId::from_raw(HMD_SYSTEM_ID))
        } else {
            Err(sys::Result::ERROR_FORM_FACTOR_UNSUPPORTED)
        }
    }

    fn system_properties(&self, system: sys::SystemId) -> XrResult<SystemProperties> {
        let _state = self.enter("system_properties")?;
        Ok(SystemProperties {
            system_id: system,
            vendor_id: 0,
            system_name: "simulated headset".to_string(),
            max_swapchain_image_width: self.config().view.max_width,
            max_swapchain_image_height: self.config().view.max_height,
            max_layer_count: 16,
            orientation_tracking: true,
            position_tracking: true,
        })
    }

    fn enumerate_view_configurations(
        &self,
        _system: sys::SystemId,
    ) -> XrResult<Vec<sys::ViewConfigurationType>> {
        let _state = self.enter("enumerate_view_configurations")?;
        Ok(self.config().view_configurations.clone())
    }

    fn enumerate_view_configuration_views(
        &self,
        _system: sys::SystemId,
        view_configuration: sys::ViewConfigurationType,
    ) -> XrResult<Vec<ViewConfigView>> {
        let _state = self.enter("enumerate_view_configuration_views")?;
        let count = if view_configuration == sys::ViewConfigurationType::PRIMARY_MONO {
            1
        } else {
            self.config().view_count
        };
        Ok(vec![self.config().view; count])
    }

    fn negotiate_graphics(&self, _system: sys::SystemId) -> XrResult<VulkanBinding> {
        let _state = self.enter("negotiate_graphics")?;
        Ok(VulkanBinding {
            instance: 1,
            physical_device: 2,
            device: 3,
            queue_family_index: 0,
            queue_index: 0,
        })
    }

    fn poll_event(&self) -> XrResult<Option<RuntimeEvent>> {
        let mut state = self.enter("poll_event")?;
        Ok(state.events.pop_front())
    }

    fn string_to_path(&self, path: &str) -> XrResult<sys::Path> {
        let mut state = self.enter("string_to_path")?;
        if !path.starts_with('/') || path.ends_with('/') || path.contains("//") {
            return Err(sys::Result::ERROR_PATH_FORMAT_INVALID);
        }
        Ok(intern(&mut state, path))
    }

    fn path_to_string(&self, path: sys::Path) -> XrResult<String> {
        let state = self.enter("path_to_string")?;
        lookup(&state, path)
    }

    fn create_session(
        &self,
        _system: sys::SystemId,
        _graphics: &VulkanBinding,
    ) -> XrResult<sys::Session> {
        let mut state = self.enter("create_session")?;
        if state.session.is_some() {
            return Err(sys::Result::ERROR_LIMIT_REACHED);
        }
        let session = sys::Session::from_raw(next_handle(&mut state));
        state.session = Some(session);
        push_state(&mut state, sys::SessionState::IDLE);
        push_state(&mut state, sys::SessionState::READY);
        Ok(session)
    }

    fn destroy_session(&self, session: sys::Session) -> XrResult<()> {
        let mut state = self.enter("destroy_session")?;
        check_session(&state, session)?;
        state.session = None;
        state.session_state = None;
        state.running = false;
        state.attached.clear();
        Ok(())
    }

    fn begin_session(
        &self,
        session: sys::Session,
        view_configuration: sys::ViewConfigurationType,
    ) -> XrResult<()> {
        let mut state = self.enter("begin_session")?;
        check_session(&state, session)?;
        if !self.config().view_configurations.contains(&view_configuration) {
            return Err(sys::Result::ERROR_VIEW_CONFIGURATION_TYPE_UNSUPPORTED);
        }
        if state.running {
            return Err(sys::Result::ERROR_SESSION_RUNNING);
        }
        if state.session_state != Some(sys::SessionState::READY) {
            return Err(sys::Result::ERROR_SESSION_NOT_READY);
        }
        state.running = true;
        push_state(&mut state, sys::SessionState::SYNCHRONIZED);
        push_state(&mut state, sys::SessionState::VISIBLE);
        push_state(&mut state, sys::SessionState::FOCUSED);
        Ok(())
    }

    fn end_session(&self, session: sys::Session) -> XrResult<()> {
        let mut state = self.enter("end_session")?;
        check_session(&state, session)?;
        if !state.running {
            return Err(sys::Result::ERROR_SESSION_NOT_RUNNING);
        }
        if state.session_state != Some(sys::SessionState::STOPPING) {
            return Err(sys::Result::ERROR_SESSION_NOT_STOPPING);
        }
        state.running = false;
        push_state(&mut state, sys::SessionState::IDLE);
        push_state(&mut state, sys::SessionState::EXITING);
        Ok(())
    }

    fn request_exit_session(&self, session: sys::Session) -> XrResult<()> {
        let mut state = self.enter("request_exit_session")?;
        check_session(&state, session)?;
        if !state.running {
            return Err(sys::Result::ERROR_SESSION_NOT_RUNNING);
        }
        push_state(&mut state, sys::SessionState::VISIBLE);
        push_state(&mut state, sys::SessionState::SYNCHRONIZED);
        push_state(&mut state, sys::SessionState::STOPPING);
        Ok(())
    }

    fn enumerate_reference_spaces(
        &self,
        session: sys::Session,
    ) -> XrResult<Vec<sys::ReferenceSpaceType>> {
        let state = self.enter("enumerate_reference_spaces")?;
        check_session(&state, session)?;
        Ok(self.config().reference_spaces.clone())
    }

    fn create_reference_space(
        &self,
        session: sys::Session,
        space_type: sys::ReferenceSpaceType,
        pose: sys::Posef,
    ) -> XrResult<sys::Space> {
        let mut state = self.enter("create_reference_space")?;
        check_session(&state, session)?;
        if !self.config().reference_spaces.contains(&space_type) {
            return Err(sys::Result::ERROR_REFERENCE_SPACE_UNSUPPORTED);
        }
        let handle = next_handle(&mut state);
        state.spaces.insert(handle, Pose::from_sys(pose));
        Ok(sys::Space::from_raw(handle))
    }

    fn destroy_space(&self, space: sys::Space) -> XrResult<()> {
        let mut state = self.enter("destroy_space")?;
        match state.spaces.remove(&space.into_raw()) {
            Some(_) => Ok(()),
            None => Err(sys::Result::ERROR_HANDLE_INVALID),
        }
    }

    fn locate_space(
        &self,
        space: sys::Space,
        base: sys::Space,
        _time: sys::Time,
    ) -> XrResult<SpaceLocation> {
        let state = self.enter("locate_space")?;
        let (Some(pose), Some(_)) = (
            state.spaces.get(&space.into_raw()),
            state.spaces.get(&base.into_raw()),
        ) else {
            return Err(sys::Result::ERROR_HANDLE_INVALID);
        };
        Ok(SpaceLocation {
            flags: sys::SpaceLocationFlags::ORIENTATION_VALID
                | sys::SpaceLocationFlags::POSITION_VALID,
            pose: pose.to_sys(),
        })
    }

    fn locate_views(
        &self,
        session: sys::Session,
        view_configuration: sys::ViewConfigurationType,
        _time: sys::Time,
        space: sys::Space,
    ) -> XrResult<(sys::ViewStateFlags, Vec<LocatedView>)> {
        let state = self.enter("locate_views")?;
        check_session(&state, session)?;
        if !state.spaces.contains_key(&space.into_raw()) {
            return Err(sys::Result::ERROR_HANDLE_INVALID);
        }
        let count = if view_configuration == sys::ViewConfigurationType::PRIMARY_MONO {
            1
        } else {
            self.config().view_count
        };
        let flags = if state.orientation_valid {
            sys::ViewStateFlags::ORIENTATION_VALID | sys::ViewStateFlags::POSITION_VALID
        } else {
            sys::ViewStateFlags::EMPTY
        };
        Ok((flags, (0..count).map(identity_view).collect()))
    }

    fn enumerate_swapchain_formats(&self, session: sys::Session) -> XrResult<Vec<i64>> {
        let state = self.enter("enumerate_swapchain_formats")?;
        check_session(&state, session)?;
        Ok(self.config().swapchain_formats.clone())
    }

    fn create_swapchain(
        &self,
        session: sys::Session,
        info: &SwapchainCreateInfo,
    ) -> XrResult<sys::Swapchain> {
        let mut state = self.enter("create_swapchain")?;
        check_session(&state, session)?;
        if !self.config().swapchain_formats.contains(&info.format) {
            return Err(sys::Result::ERROR_SWAPCHAIN_FORMAT_UNSUPPORTED);
        }
        if info.width == 0
            || info.height == 0
            || info.width > self.config().view.max_width
            || info.height > self.config().view.max_height
        {
            return Err(sys::Result::ERROR_SIZE_INSUFFICIENT);
        }
        let image_count = match self.config().depth_image_count {
            Some(count) if is_depth_format(info.format) => count,
            _ => self.config().swapchain_image_count,
        };
        let handle = next_handle(&mut state);
        state.swapchains.insert(
            handle,
            SimSwapchain {
                image_count,
                ..SimSwapchain::default()
            },
        );
        Ok(sys::Swapchain::from_raw(handle))
    }

    fn destroy_swapchain(&self, swapchain: sys::Swapchain) -> XrResult<()> {
        let mut state = self.enter("destroy_swapchain")?;
        match state.swapchains.remove(&swapchain.into_raw()) {
            Some(_) => Ok(()),
            None => Err(sys::Result::ERROR_HANDLE_INVALID),
        }
    }

    fn enumerate_swapchain_images(&self, swapchain: sys::Swapchain) -> XrResult<Vec<u64>> {
        let state = self.enter("enumerate_swapchain_images")?;
        let chain = state
            .swapchains
            .get(&swapchain.into_raw())
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)?;
        let base = swapchain.into_raw() << 8;
        Ok((0..chain.image_count as u64).map(|i| base | i).collect())
    }

    fn acquire_swapchain_image(&self, swapchain: sys::Swapchain) -> XrResult<u32> {
        let mut state = self.enter("acquire_swapchain_image")?;
        let chain = state
            .swapchains
            .get_mut(&swapchain.into_raw())
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)?;
        if chain.acquired.len() as u32 >= chain.image_count {
            return Err(sys::Result::ERROR_CALL_ORDER_INVALID);
        }
        let index = chain.next_index;
        chain.next_index = (chain.next_index + 1) % chain.image_count.max(1);
        chain.acquired.push_back(index);
        Ok(index)
    }

    fn wait_swapchain_image(
        &self,
        swapchain: sys::Swapchain,
        _timeout: sys::Duration,
    ) -> XrResult<()> {
        let mut state = self.enter("wait_swapchain_image")?;
        let chain = state
            .swapchains
            .get_mut(&swapchain.into_raw())
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)?;
        match (chain.waited, chain.acquired.front()) {
            (None, Some(&index)) => {
                chain.waited = Some(index);
                Ok(())
            }
            _ => Err(sys::Result::ERROR_CALL_ORDER_INVALID),
        }
    }

    fn release_swapchain_image(&self, swapchain: sys::Swapchain) -> XrResult<()> {
        let mut state = self.enter("release_swapchain_image")?;
        let chain = state
            .swapchains
            .get_mut(&swapchain.into_raw())
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)?;
        if chain.waited.take().is_none() {
            return Err(sys::Result::ERROR_CALL_ORDER_INVALID);
        }
        chain.acquired.pop_front();
        Ok(())
    }

    fn wait_frame(&self, session: sys::Session) -> XrResult<FrameState> {
        let mut state = self.enter("wait_frame")?;
        check_session(&state, session)?;
        if !state.running {
            return Err(sys::Result::ERROR_SESSION_NOT_RUNNING);
        }
        state.frame_index += 1;
        Ok(FrameState {
            predicted_display_time: sys::Time::from_nanos(state.frame_index * FRAME_PERIOD_NS),
            predicted_display_period: sys::Duration::from_nanos(FRAME_PERIOD_NS),
            should_render: state.should_render,
        })
    }

    fn begin_frame(&self, session: sys::Session) -> XrResult<()> {
        let mut state = self.enter("begin_frame")?;
        check_session(&state, session)?;
        if !state.running {
            return Err(sys::Result::ERROR_SESSION_NOT_RUNNING);
        }
        state.frame_begun = true;
        Ok(())
    }

    fn end_frame(
        &self,
        session: sys::Session,
        display_time: sys::Time,
        blend_mode: sys::EnvironmentBlendMode,
        layers: &[CompositionLayer],
    ) -> XrResult<()> {
        let mut state = self.enter("end_frame")?;
        check_session(&state, session)?;
        if !state.frame_begun {
            return Err(sys::Result::ERROR_CALL_ORDER_INVALID);
        }
        state.frame_begun = false;
        state.frames.push(SubmittedFrame {
            display_time,
            blend_mode,
            layers: layers.to_vec(),
        });
        Ok(())
    }

    fn create_action_set(
        &self,
        name: &str,
        _localized_name: &str,
        _priority: u32,
    ) -> XrResult<sys::ActionSet> {
        let mut state = self.enter("create_action_set")?;
        if name.is_empty() {
            return Err(sys::Result::ERROR_NAME_INVALID);
        }
        let handle = next_handle(&mut state);
        state.action_sets.insert(handle);
        Ok(sys::ActionSet::from_raw(handle))
    }

    fn destroy_action_set(&self, action_set: sys::ActionSet) -> XrResult<()> {
        let mut state = self.enter("destroy_action_set")?;
        let raw = action_set.into_raw();
        if !state.action_sets.remove(&raw) {
            return Err(sys::Result::ERROR_HANDLE_INVALID);
        }
        state.actions.retain(|_, action| action.action_set != raw);
        state.attached.remove(&raw);
        Ok(())
    }

    fn create_action(
        &self,
        action_set: sys::ActionSet,
        name: &str,
        _localized_name: &str,
        kind: ActionKind,
        _subaction_paths: &[sys::Path],
    ) -> XrResult<sys::Action> {
        let mut state = self.enter("create_action")?;
        let raw_set = action_set.into_raw();
        if !state.action_sets.contains(&raw_set) {
            return Err(sys::Result::ERROR_HANDLE_INVALID);
        }
        if state.attached.contains(&raw_set) {
            return Err(sys::Result::ERROR_ACTIONSETS_ALREADY_ATTACHED);
        }
        if name.is_empty() {
            return Err(sys::Result::ERROR_NAME_INVALID);
        }
        let handle = next_handle(&mut state);
        state.actions.insert(
            handle,
            SimAction {
                action_set: raw_set,
                kind,
            },
        );
        Ok(sys::Action::from_raw(handle))
    }

    fn suggest_interaction_profile_bindings(
        &self,
        interaction_profile: sys::Path,
        bindings: &[SuggestedBinding],
    ) -> XrResult<()> {
        let mut state = self.enter("suggest_interaction_profile_bindings")?;
        let profile = lookup(&state, interaction_profile)?;
        if !profile.starts_with("/interaction_profiles/") {
            return Err(sys::Result::ERROR_PATH_UNSUPPORTED);
        }
        let mut paths = Vec::with_capacity(bindings.len());
        for binding in bindings {
            if !state.actions.contains_key(&binding.action.into_raw()) {
                return Err(sys::Result::ERROR_HANDLE_INVALID);
            }
            paths.push(lookup(&state, binding.binding)?);
        }
        state.suggested.push((profile, paths));
        Ok(())
    }

    fn attach_action_sets(
        &self,
        session: sys::Session,
        action_sets: &[sys::ActionSet],
    ) -> XrResult<()> {
        let mut state = self.enter("attach_action_sets")?;
        check_session(&state, session)?;
        if !state.attached.is_empty() {
            return Err(sys::Result::ERROR_ACTIONSETS_ALREADY_ATTACHED);
        }
        for set in action_sets {
            if !state.action_sets.contains(&set.into_raw()) {
                return Err(sys::Result::ERROR_HANDLE_INVALID);
            }
        }
        state
            .attached
            .extend(action_sets.iter().map(|set| set.into_raw()));
        Ok(())
    }

    fn sync_actions(
        &self,
        session: sys::Session,
        active: &[sys::ActiveActionSet],
    ) -> XrResult<()> {
        let state = self.enter("sync_actions")?;
        check_session(&state, session)?;
        for set in active {
            if !state.attached.contains(&set.action_set.into_raw()) {
                return Err(sys::Result::ERROR_ACTIONSET_NOT_ATTACHED);
            }
        }
        if !state.running {
            return Err(sys::Result::ERROR_SESSION_NOT_RUNNING);
        }
        Ok(())
    }

    fn action_state(
        &self,
        session: sys::Session,
        action: sys::Action,
        kind: ActionKind,
        subaction_path: sys::Path,
    ) -> XrResult<ActionState> {
        let state = self.enter("action_state")?;
        check_session(&state, session)?;
        let record = state
            .actions
            .get(&action.into_raw())
            .ok_or(sys::Result::ERROR_HANDLE_INVALID)?;
        if record.kind != kind || !kind.is_input() {
            return Err(sys::Result::ERROR_ACTION_TYPE_MISMATCH);
        }
        if !state.attached.contains(&record.action_set) {
            return Err(sys::Result::ERROR_ACTIONSET_NOT_ATTACHED);
        }
        let stored = state
            .inputs
            .get(&(action.into_raw(), subaction_path.into_raw()))
            .copied();
        Ok(match (kind, stored) {
            (ActionKind::Pose, _) => ActionState::Pose {
                is_active: stored.is_some(),
            },
            (_, Some(value)) if value.kind() == kind => value,
            _ => ActionState::empty(kind),
        })
    }

    fn create_action_space(
        &self,
        session: sys::Session,
        action: sys::Action,
        _subaction_path: sys::Path,
        pose: sys::Posef,
    ) -> XrResult<sys::Space> {
        let mut state = self.enter("create_action_space")?;
        check_session(&state, session)?;
        match state.actions.get(&action.into_raw()) {
            Some(record) if record.kind == ActionKind::Pose => {}
            Some(_) => return Err(sys::Result::ERROR_ACTION_TYPE_MISMATCH),
            None => return Err(sys::Result::ERROR_HANDLE_INVALID),
        }
        let handle = next_handle(&mut state);
        state.spaces.insert(handle, Pose::from_sys(pose));
        Ok(sys::Space::from_raw(handle))
    }

    fn apply_haptic_feedback(
        &self,
        session: sys::Session,
        action: sys::Action,
        subaction_path: sys::Path,
        vibration: &HapticVibration,
    ) -> XrResult<()> {
        let mut state = self.enter("apply_haptic_feedback")?;
        check_session(&state, session)?;
        match state.actions.get(&action.into_raw()) {
            Some(record) if record.kind == ActionKind::Haptic => {}
            Some(_) => return Err(sys::Result::ERROR_ACTION_TYPE_MISMATCH),
            None => return Err(sys::Result::ERROR_HANDLE_INVALID),
        }
        state.haptics.push((action, subaction_path, *vibration));
        Ok(())
    }

    fn current_interaction_profile(
        &self,
        session: sys::Session,
        top_level_user_path: sys::Path,
    ) -> XrResult<sys::Path> {
        let state = self.enter("current_interaction_profile")?;
        check_session(&state, session)?;
        if state.attached.is_empty() {
            return Err(sys::Result::ERROR_ACTIONSET_NOT_ATTACHED);
        }
        Ok(state
            .interaction_profiles
            .get(&top_level_user_path.into_raw())
            .map(|raw| sys::Path::from_raw(*raw))
            .unwrap_or(sys::Path::NULL))
    }

    fn enumerate_vive_tracker_paths(&self) -> XrResult<Vec<ViveTrackerPaths>> {
        let mut state = self.enter("enumerate_vive_tracker_paths")?;
        let trackers = state.trackers.clone();
        Ok(trackers
            .iter()
            .map(|(persistent, role)| ViveTrackerPaths {
                persistent: intern(&mut state, persistent),
                role: intern(&mut state, role),
            })
            .collect())
    }
}
