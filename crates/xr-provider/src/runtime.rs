//! Seam between the provider and an XR runtime.
//!
//! [`XrLoader`] covers the entry points available before an instance exists,
//! [`XrRuntime`] everything bound to one live instance. Both speak raw
//! `openxr::sys` handles and return the runtime's native result code
//! unchanged on failure.

use openxr::sys;

use crate::config::AppInstanceInfo;
use crate::types::{ActionKind, ActionState};

pub type XrResult<T> = Result<T, sys::Result>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionProperties {
    pub name: String,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiLayerProperties {
    pub name: String,
    pub spec_version: sys::Version,
    pub layer_version: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeProperties {
    pub runtime_name: String,
    pub runtime_version: sys::Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemProperties {
    pub system_id: sys::SystemId,
    pub vendor_id: u32,
    pub system_name: String,
    pub max_swapchain_image_width: u32,
    pub max_swapchain_image_height: u32,
    pub max_layer_count: u32,
    pub orientation_tracking: bool,
    pub position_tracking: bool,
}

/// Per-view extent and sample count limits for one view configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewConfigView {
    pub recommended_width: u32,
    pub max_width: u32,
    pub recommended_height: u32,
    pub max_height: u32,
    pub recommended_sample_count: u32,
    pub max_sample_count: u32,
}

/// Raw Vulkan handles a session is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulkanBinding {
    pub instance: u64,
    pub physical_device: u64,
    pub device: u64,
    pub queue_family_index: u32,
    pub queue_index: u32,
}

#[derive(Debug, Clone, Copy)]
pub enum RuntimeEvent {
    SessionStateChanged {
        session: sys::Session,
        state: sys::SessionState,
        time: sys::Time,
    },
    EventsLost {
        count: u32,
    },
    InstanceLossPending {
        loss_time: sys::Time,
    },
    InteractionProfileChanged {
        session: sys::Session,
    },
    ReferenceSpaceChangePending {
        session: sys::Session,
        reference_space_type: sys::ReferenceSpaceType,
    },
    Other(sys::StructureType),
}

#[derive(Debug, Clone, Copy)]
pub struct SpaceLocation {
    pub flags: sys::SpaceLocationFlags,
    pub pose: sys::Posef,
}

#[derive(Debug, Clone, Copy)]
pub struct LocatedView {
    pub pose: sys::Posef,
    pub fov: sys::Fovf,
}

#[derive(Debug, Clone, Copy)]
pub struct SwapchainCreateInfo {
    pub usage: sys::SwapchainUsageFlags,
    pub format: i64,
    pub sample_count: u32,
    pub width: u32,
    pub height: u32,
    pub face_count: u32,
    pub array_size: u32,
    pub mip_count: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct FrameState {
    pub predicted_display_time: sys::Time,
    pub predicted_display_period: sys::Duration,
    pub should_render: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SubImage {
    pub swapchain: sys::Swapchain,
    pub rect: sys::Rect2Di,
    pub array_index: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct DepthInfo {
    pub sub_image: SubImage,
    pub min_depth: f32,
    pub max_depth: f32,
    pub near_z: f32,
    pub far_z: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct ProjectionView {
    pub pose: sys::Posef,
    pub fov: sys::Fovf,
    pub sub_image: SubImage,
    pub depth: Option<DepthInfo>,
}

#[derive(Debug, Clone)]
pub struct ProjectionLayer {
    pub flags: sys::CompositionLayerFlags,
    pub space: sys::Space,
    pub views: Vec<ProjectionView>,
}

#[derive(Debug, Clone)]
pub enum CompositionLayer {
    Projection(ProjectionLayer),
    /// `XR_FB_passthrough` layer, referenced by its raw layer handle.
    Passthrough {
        flags: sys::CompositionLayerFlags,
        space: sys::Space,
        layer: u64,
    },
}

impl CompositionLayer {
    pub fn is_projection(&self) -> bool {
        matches!(self, CompositionLayer::Projection(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SuggestedBinding {
    pub action: sys::Action,
    pub binding: sys::Path,
}

#[derive(Debug, Clone, Copy)]
pub struct HapticVibration {
    pub duration: sys::Duration,
    pub frequency: f32,
    pub amplitude: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct ViveTrackerPaths {
    pub persistent: sys::Path,
    pub role: sys::Path,
}

pub trait XrLoader: Send + Sync {
    fn enumerate_extensions(&self) -> XrResult<Vec<ExtensionProperties>>;
    fn enumerate_api_layers(&self) -> XrResult<Vec<ApiLayerProperties>>;
    fn create_instance(
        &self,
        app: &AppInstanceInfo,
        extensions: &[String],
        api_layers: &[String],
    ) -> XrResult<Box<dyn XrRuntime>>;
}

pub trait XrRuntime: Send + Sync {
    fn instance_properties(&self) -> XrResult<RuntimeProperties>;
    fn system(&self, form_factor: sys::FormFactor) -> XrResult<sys::SystemId>;
    fn system_properties(&self, system: sys::SystemId) -> XrResult<SystemProperties>;
    fn enumerate_view_configurations(
        &self,
        system: sys::SystemId,
    ) -> XrResult<Vec<sys::ViewConfigurationType>>;
    fn enumerate_view_configuration_views(
        &self,
        system: sys::SystemId,
        view_configuration: sys::ViewConfigurationType,
    ) -> XrResult<Vec<ViewConfigView>>;
    /// Creates (or reuses) a graphics device that satisfies the runtime's requirements.
    fn negotiate_graphics(&self, system: sys::SystemId) -> XrResult<VulkanBinding>;
    fn poll_event(&self) -> XrResult<Option<RuntimeEvent>>;

    fn string_to_path(&self, path: &str) -> XrResult<sys::Path>;
    fn path_to_string(&self, path: sys::Path) -> XrResult<String>;

    fn create_session(
        &self,
        system: sys::SystemId,
        graphics: &VulkanBinding,
    ) -> XrResult<sys::Session>;
    fn destroy_session(&self, session: sys::Session) -> XrResult<()>;
    fn begin_session(
        &self,
        session: sys::Session,
        view_configuration: sys::ViewConfigurationType,
    ) -> XrResult<()>;
    fn end_session(&self, session: sys::Session) -> XrResult<()>;
    fn request_exit_session(&self, session: sys::Session) -> XrResult<()>;

    fn enumerate_reference_spaces(
        &self,
        session: sys::Session,
    ) -> XrResult<Vec<sys::ReferenceSpaceType>>;
    fn create_reference_space(
        &self,
        session: sys::Session,
        space_type: sys::ReferenceSpaceType,
        pose: sys::Posef,
    ) -> XrResult<sys::Space>;
    fn destroy_space(&self, space: sys::Space) -> XrResult<()>;
    fn locate_space(
        &self,
        space: sys::Space,
        base: sys::Space,
        time: sys::Time,
    ) -> XrResult<SpaceLocation>;
    fn locate_views(
        &self,
        session: sys::Session,
        view_configuration: sys::ViewConfigurationType,
        time: sys::Time,
        space: sys::Space,
    ) -> XrResult<(sys::ViewStateFlags, Vec<LocatedView>)>;

    fn enumerate_swapchain_formats(&self, session: sys::Session) -> XrResult<Vec<i64>>;
    fn create_swapchain(
        &self,
        session: sys::Session,
        info: &SwapchainCreateInfo,
    ) -> XrResult<sys::Swapchain>;
    fn destroy_swapchain(&self, swapchain: sys::Swapchain) -> XrResult<()>;
    /// Raw `VkImage` handles backing the swapchain.
    fn enumerate_swapchain_images(&self, swapchain: sys::Swapchain) -> XrResult<Vec<u64>>;
    fn acquire_swapchain_image(&self, swapchain: sys::Swapchain) -> XrResult<u32>;
    fn wait_swapchain_image(&self, swapchain: sys::Swapchain, timeout: sys::Duration)
        -> XrResult<()>;
    fn release_swapchain_image(&self, swapchain: sys::Swapchain) -> XrResult<()>;

    fn wait_frame(&self, session: sys::Session) -> XrResult<FrameState>;
    fn begin_frame(&self, session: sys::Session) -> XrResult<()>;
    fn end_frame(
        &self,
        session: sys::Session,
        display_time: sys::Time,
        blend_mode: sys::EnvironmentBlendMode,
        layers: &[CompositionLayer],
    ) -> XrResult<()>;

    fn create_action_set(
        &self,
        name: &str,
        localized_name: &str,
        priority: u32,
    ) -> XrResult<sys::ActionSet>;
    fn destroy_action_set(&self, action_set: sys::ActionSet) -> XrResult<()>;
    fn create_action(
        &self,
        action_set: sys::ActionSet,
        name: &str,
        localized_name: &str,
        kind: ActionKind,
        subaction_paths: &[sys::Path],
    ) -> XrResult<sys::Action>;
    fn suggest_interaction_profile_bindings(
        &self,
        interaction_profile: sys::Path,
        bindings: &[SuggestedBinding],
    ) -> XrResult<()>;
    fn attach_action_sets(
        &self,
        session: sys::Session,
        action_sets: &[sys::ActionSet],
    ) -> XrResult<()>;
    fn sync_actions(&self, session: sys::Session, active: &[sys::ActiveActionSet])
        -> XrResult<()>;
    fn action_state(
        &self,
        session: sys::Session,
        action: sys::Action,
        kind: ActionKind,
        subaction_path: sys::Path,
    ) -> XrResult<ActionState>;
    fn create_action_space(
        &self,
        session: sys::Session,
        action: sys::Action,
        subaction_path: sys::Path,
        pose: sys::Posef,
    ) -> XrResult<sys::Space>;
    fn apply_haptic_feedback(
        &self,
        session: sys::Session,
        action: sys::Action,
        subaction_path: sys::Path,
        vibration: &HapticVibration,
    ) -> XrResult<()>;
    fn current_interaction_profile(
        &self,
        session: sys::Session,
        top_level_user_path: sys::Path,
    ) -> XrResult<sys::Path>;

    /// `XR_HTCX_vive_tracker_interaction`: trackers currently known to the runtime.
    fn enumerate_vive_tracker_paths(&self) -> XrResult<Vec<ViveTrackerPaths>>;
}
