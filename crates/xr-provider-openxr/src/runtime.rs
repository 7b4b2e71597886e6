//! [`XrRuntime`] over a loader-created instance.
//!
//! Instance-level queries go through the `openxr` wrappers; everything bound
//! to a session handle is called through the raw function table so handle
//! lifetimes stay with the provider.

use std::ffi::c_void;
use std::os::raw::c_char;
use std::ptr;
use std::sync::{Mutex, MutexGuard};

use glam::Vec2;
use openxr as xr;
use xr::sys::{self, Handle};
use xr_provider::runtime::{
    CompositionLayer, DepthInfo, FrameState, HapticVibration, LocatedView, ProjectionView,
    RuntimeEvent, RuntimeProperties, SpaceLocation, SubImage, SuggestedBinding,
    SwapchainCreateInfo, SystemProperties, ViewConfigView, ViveTrackerPaths, VulkanBinding,
    XrResult, XrRuntime,
};
use xr_provider::types::InputSample;
use xr_provider::{ActionKind, ActionState};

use crate::vulkan::VulkanDevice;

// qualified successes pass
fn cvt(result: sys::Result) -> XrResult<()> {
    if result.into_raw() >= 0 {
        Ok(())
    } else {
        Err(result)
    }
}

fn enumerate<T: Copy>(
    blank: T,
    mut call: impl FnMut(u32, &mut u32, *mut T) -> sys::Result,
) -> XrResult<Vec<T>> {
    let mut count = 0;
    cvt(call(0, &mut count, ptr::null_mut()))?;
    let mut items = vec![blank; count as usize];
    cvt(call(count, &mut count, items.as_mut_ptr()))?;
    items.truncate(count as usize);
    Ok(items)
}

fn place_name<const N: usize>(name: &str, invalid: sys::Result) -> XrResult<[c_char; N]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() >= N || bytes.contains(&0) {
        return Err(invalid);
    }
    let mut out = [0 as c_char; N];
    for (dst, src) in out.iter_mut().zip(bytes) {
        *dst = *src as c_char;
    }
    Ok(out)
}

pub(crate) fn fixed_str(chars: &[c_char]) -> String {
    let bytes: Vec<u8> = chars
        .iter()
        .take_while(|c| **c != 0)
        .map(|c| *c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn sub_image(sub: &SubImage) -> sys::SwapchainSubImage {
    sys::SwapchainSubImage {
        swapchain: sub.swapchain,
        image_rect: sub.rect,
        image_array_index: sub.array_index,
    }
}

fn depth_info(depth: &DepthInfo) -> sys::CompositionLayerDepthInfoKHR {
    sys::CompositionLayerDepthInfoKHR {
        ty: sys::CompositionLayerDepthInfoKHR::TYPE,
        next: ptr::null(),
        sub_image: sub_image(&depth.sub_image),
        min_depth: depth.min_depth,
        max_depth: depth.max_depth,
        near_z: depth.near_z,
        far_z: depth.far_z,
    }
}

fn projection_view(
    view: &ProjectionView,
    depth: Option<&sys::CompositionLayerDepthInfoKHR>,
) -> sys::CompositionLayerProjectionView {
    sys::CompositionLayerProjectionView {
        ty: sys::CompositionLayerProjectionView::TYPE,
        next: depth.map_or(ptr::null(), |d| d as *const _ as *const c_void),
        pose: view.pose,
        fov: view.fov,
        sub_image: sub_image(&view.sub_image),
    }
}

enum RawLayer {
    Projection(sys::CompositionLayerProjection),
    Passthrough(sys::CompositionLayerPassthroughFB),
}

impl RawLayer {
    fn header(&self) -> *const sys::CompositionLayerBaseHeader {
        match self {
            RawLayer::Projection(layer) => layer as *const _ as *const _,
            RawLayer::Passthrough(layer) => layer as *const _ as *const _,
        }
    }
}

const IDENTITY: sys::Posef = sys::Posef {
    orientation: sys::Quaternionf {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    },
    position: sys::Vector3f {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    },
};

pub struct OpenXrRuntime {
    vulkan: Mutex<Option<VulkanDevice>>,
    instance: xr::Instance,
}

impl OpenXrRuntime {
    pub(crate) fn new(instance: xr::Instance) -> Self {
        Self {
            vulkan: Mutex::new(None),
            instance,
        }
    }

    fn fp(&self) -> &xr::raw::Instance {
        self.instance.fp()
    }

    fn vulkan(&self) -> MutexGuard<'_, Option<VulkanDevice>> {
        self.vulkan
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state_info(action: sys::Action, subaction_path: sys::Path) -> sys::ActionStateGetInfo {
        sys::ActionStateGetInfo {
            ty: sys::ActionStateGetInfo::TYPE,
            next: ptr::null(),
            action,
            subaction_path,
        }
    }
}

impl XrRuntime for OpenXrRuntime {
    fn instance_properties(&self) -> XrResult<RuntimeProperties> {
        let props = self.instance.properties()?;
        Ok(RuntimeProperties {
            runtime_name: props.runtime_name,
            runtime_version: props.runtime_version,
        })
    }

    fn system(&self, form_factor: sys::FormFactor) -> XrResult<sys::SystemId> {
        self.instance.system(form_factor)
    }

    fn system_properties(&self, system: sys::SystemId) -> XrResult<SystemProperties> {
        let props = self.instance.system_properties(system)?;
        Ok(SystemProperties {
            system_id: props.system_id,
            vendor_id: props.vendor_id,
            system_name: props.system_name,
            max_swapchain_image_width: props.graphics_properties.max_swapchain_image_width,
            max_swapchain_image_height: props.graphics_properties.max_swapchain_image_height,
            max_layer_count: props.graphics_properties.max_layer_count,
            orientation_tracking: props.tracking_properties.orientation_tracking.into(),
            position_tracking: props.tracking_properties.position_tracking.into(),
        })
    }

    fn enumerate_view_configurations(
        &self,
        system: sys::SystemId,
    ) -> XrResult<Vec<sys::ViewConfigurationType>> {
        self.instance.enumerate_view_configurations(system)
    }

    fn enumerate_view_configuration_views(
        &self,
        system: sys::SystemId,
        view_configuration: sys::ViewConfigurationType,
    ) -> XrResult<Vec<ViewConfigView>> {
        let views = self
            .instance
            .enumerate_view_configuration_views(system, view_configuration)?;
        Ok(views
            .into_iter()
            .map(|v| ViewConfigView {
                recommended_width: v.recommended_image_rect_width,
                max_width: v.max_image_rect_width,
                recommended_height: v.recommended_image_rect_height,
                max_height: v.max_image_rect_height,
                recommended_sample_count: v.recommended_swapchain_sample_count,
                max_sample_count: v.max_swapchain_sample_count,
            })
            .collect())
    }

    fn negotiate_graphics(&self, system: sys::SystemId) -> XrResult<VulkanBinding> {
        let mut vulkan = self.vulkan();
        if let Some(device) = vulkan.as_ref() {
            return Ok(device.binding());
        }
        let enable2 = self.instance.exts().khr_vulkan_enable2.is_some();
        if !enable2 && self.instance.exts().khr_vulkan_enable.is_none() {
            log::error!("no Vulkan enable extension on this instance");
            return Err(sys::Result::ERROR_EXTENSION_NOT_PRESENT);
        }
        let device = VulkanDevice::negotiate(&self.instance, system, enable2)?;
        let binding = device.binding();
        *vulkan = Some(device);
        Ok(binding)
    }

    fn poll_event(&self) -> XrResult<Option<RuntimeEvent>> {
        let mut buffer = xr::EventDataBuffer::new();
        let event = match self.instance.poll_event(&mut buffer)? {
            None => return Ok(None),
            Some(event) => event,
        };
        use xr::Event::*;
        Ok(Some(match event {
            SessionStateChanged(e) => RuntimeEvent::SessionStateChanged {
                session: e.session(),
                state: e.state(),
                time: e.time(),
            },
            EventsLost(e) => RuntimeEvent::EventsLost {
                count: e.lost_event_count(),
            },
            InstanceLossPending(e) => RuntimeEvent::InstanceLossPending {
                loss_time: e.loss_time(),
            },
            InteractionProfileChanged(e) => RuntimeEvent::InteractionProfileChanged {
                session: e.session(),
            },
            ReferenceSpaceChangePending(e) => RuntimeEvent::ReferenceSpaceChangePending {
                session: e.session(),
                reference_space_type: e.reference_space_type(),
            },
            _ => RuntimeEvent::Other(sys::StructureType::UNKNOWN),
        }))
    }

    fn string_to_path(&self, path: &str) -> XrResult<sys::Path> {
        self.instance.string_to_path(path)
    }

    fn path_to_string(&self, path: sys::Path) -> XrResult<String> {
        self.instance.path_to_string(path)
    }

    fn create_session(
        &self,
        system: sys::SystemId,
        graphics: &VulkanBinding,
    ) -> XrResult<sys::Session> {
        let binding = sys::GraphicsBindingVulkanKHR {
            ty: sys::GraphicsBindingVulkanKHR::TYPE,
            next: ptr::null(),
            instance: graphics.instance as usize as _,
            physical_device: graphics.physical_device as usize as _,
            device: graphics.device as usize as _,
            queue_family_index: graphics.queue_family_index,
            queue_index: graphics.queue_index,
        };
        let info = sys::SessionCreateInfo {
            ty: sys::SessionCreateInfo::TYPE,
            next: &binding as *const _ as *const c_void,
            create_flags: sys::SessionCreateFlags::EMPTY,
            system_id: system,
        };
        let mut session = sys::Session::NULL;
        cvt(unsafe { (self.fp().create_session)(self.instance.as_raw(), &info, &mut session) })?;
        Ok(session)
    }

    fn destroy_session(&self, session: sys::Session) -> XrResult<()> {
        cvt(unsafe { (self.fp().destroy_session)(session) })
    }

    fn begin_session(
        &self,
        session: sys::Session,
        view_configuration: sys::ViewConfigurationType,
    ) -> XrResult<()> {
        let info = sys::SessionBeginInfo {
            ty: sys::SessionBeginInfo::TYPE,
            next: ptr::null(),
            primary_view_configuration_type: view_configuration,
        };
        cvt(unsafe { (self.fp().begin_session)(session, &info) })
    }

    fn end_session(&self, session: sys::Session) -> XrResult<()> {
        cvt(unsafe { (self.fp().end_session)(session) })
    }

    fn request_exit_session(&self, session: sys::Session) -> XrResult<()> {
        cvt(unsafe { (self.fp().request_exit_session)(session) })
    }

    fn enumerate_reference_spaces(
        &self,
        session: sys::Session,
    ) -> XrResult<Vec<sys::ReferenceSpaceType>> {
        let fp = self.fp().enumerate_reference_spaces;
        enumerate(sys::ReferenceSpaceType::VIEW, |cap, count, out| unsafe {
            fp(session, cap, count, out)
        })
    }

    fn create_reference_space(
        &self,
        session: sys::Session,
        space_type: sys::ReferenceSpaceType,
        pose: sys::Posef,
    ) -> XrResult<sys::Space> {
        let info = sys::ReferenceSpaceCreateInfo {
            ty: sys::ReferenceSpaceCreateInfo::TYPE,
            next: ptr::null(),
            reference_space_type: space_type,
            pose_in_reference_space: pose,
        };
        let mut space = sys::Space::NULL;
        cvt(unsafe { (self.fp().create_reference_space)(session, &info, &mut space) })?;
        Ok(space)
    }

    fn destroy_space(&self, space: sys::Space) -> XrResult<()> {
        cvt(unsafe { (self.fp().destroy_space)(space) })
    }

    fn locate_space(
        &self,
        space: sys::Space,
        base: sys::Space,
        time: sys::Time,
    ) -> XrResult<SpaceLocation> {
        let mut location = sys::SpaceLocation {
            ty: sys::SpaceLocation::TYPE,
            next: ptr::null_mut(),
            location_flags: sys::SpaceLocationFlags::EMPTY,
            pose: IDENTITY,
        };
        cvt(unsafe { (self.fp().locate_space)(space, base, time, &mut location) })?;
        Ok(SpaceLocation {
            flags: location.location_flags,
            pose: location.pose,
        })
    }

    fn locate_views(
        &self,
        session: sys::Session,
        view_configuration: sys::ViewConfigurationType,
        time: sys::Time,
        space: sys::Space,
    ) -> XrResult<(sys::ViewStateFlags, Vec<LocatedView>)> {
        let info = sys::ViewLocateInfo {
            ty: sys::ViewLocateInfo::TYPE,
            next: ptr::null(),
            view_configuration_type: view_configuration,
            display_time: time,
            space,
        };
        let mut state = sys::ViewState {
            ty: sys::ViewState::TYPE,
            next: ptr::null_mut(),
            view_state_flags: sys::ViewStateFlags::EMPTY,
        };
        let blank = sys::View {
            ty: sys::View::TYPE,
            next: ptr::null_mut(),
            pose: IDENTITY,
            fov: sys::Fovf {
                angle_left: 0.0,
                angle_right: 0.0,
                angle_up: 0.0,
                angle_down: 0.0,
            },
        };
        let fp = self.fp().locate_views;
        let views = enumerate(blank, |cap, count, out| unsafe {
            fp(session, &info, &mut state, cap, count, out)
        })?;
        let views = views
            .into_iter()
            .map(|v| LocatedView {
                pose: v.pose,
                fov: v.fov,
            })
            .collect();
        Ok((state.view_state_flags, views))
    }

    fn enumerate_swapchain_formats(&self, session: sys::Session) -> XrResult<Vec<i64>> {
        let fp = self.fp().enumerate_swapchain_formats;
        enumerate(0i64, |cap, count, out| unsafe { fp(session, cap, count, out) })
    }

    fn create_swapchain(
        &self,
        session: sys::Session,
        info: &SwapchainCreateInfo,
    ) -> XrResult<sys::Swapchain> {
        let create = sys::SwapchainCreateInfo {
            ty: sys::SwapchainCreateInfo::TYPE,
            next: ptr::null(),
            create_flags: sys::SwapchainCreateFlags::EMPTY,
            usage_flags: info.usage,
            format: info.format,
            sample_count: info.sample_count,
            width: info.width,
            height: info.height,
            face_count: info.face_count,
            array_size: info.array_size,
            mip_count: info.mip_count,
        };
        let mut swapchain = sys::Swapchain::NULL;
        cvt(unsafe { (self.fp().create_swapchain)(session, &create, &mut swapchain) })?;
        Ok(swapchain)
    }

    fn destroy_swapchain(&self, swapchain: sys::Swapchain) -> XrResult<()> {
        cvt(unsafe { (self.fp().destroy_swapchain)(swapchain) })
    }

    fn enumerate_swapchain_images(&self, swapchain: sys::Swapchain) -> XrResult<Vec<u64>> {
        let blank = sys::SwapchainImageVulkanKHR {
            ty: sys::SwapchainImageVulkanKHR::TYPE,
            next: ptr::null_mut(),
            image: 0,
        };
        let fp = self.fp().enumerate_swapchain_images;
        let images = enumerate(blank, |cap, count, out| unsafe {
            fp(swapchain, cap, count, out as *mut sys::SwapchainImageBaseHeader)
        })?;
        Ok(images.into_iter().map(|image| image.image).collect())
    }

    fn acquire_swapchain_image(&self, swapchain: sys::Swapchain) -> XrResult<u32> {
        let info = sys::SwapchainImageAcquireInfo {
            ty: sys::SwapchainImageAcquireInfo::TYPE,
            next: ptr::null(),
        };
        let mut index = 0;
        cvt(unsafe { (self.fp().acquire_swapchain_image)(swapchain, &info, &mut index) })?;
        Ok(index)
    }

    fn wait_swapchain_image(
        &self,
        swapchain: sys::Swapchain,
        timeout: sys::Duration,
    ) -> XrResult<()> {
        let info = sys::SwapchainImageWaitInfo {
            ty: sys::SwapchainImageWaitInfo::TYPE,
            next: ptr::null(),
            timeout,
        };
        let result = unsafe { (self.fp().wait_swapchain_image)(swapchain, &info) };
        if result == sys::Result::TIMEOUT_EXPIRED {
            return Err(result);
        }
        cvt(result)
    }

    fn release_swapchain_image(&self, swapchain: sys::Swapchain) -> XrResult<()> {
        let info = sys::SwapchainImageReleaseInfo {
            ty: sys::SwapchainImageReleaseInfo::TYPE,
            next: ptr::null(),
        };
        cvt(unsafe { (self.fp().release_swapchain_image)(swapchain, &info) })
    }

    fn wait_frame(&self, session: sys::Session) -> XrResult<FrameState> {
        let info = sys::FrameWaitInfo {
            ty: sys::FrameWaitInfo::TYPE,
            next: ptr::null(),
        };
        let mut state = sys::FrameState {
            ty: sys::FrameState::TYPE,
            next: ptr::null_mut(),
            predicted_display_time: sys::Time::from_nanos(0),
            predicted_display_period: sys::Duration::from_nanos(0),
            should_render: sys::FALSE,
        };
        cvt(unsafe { (self.fp().wait_frame)(session, &info, &mut state) })?;
        Ok(FrameState {
            predicted_display_time: state.predicted_display_time,
            predicted_display_period: state.predicted_display_period,
            should_render: state.should_render.into(),
        })
    }

    fn begin_frame(&self, session: sys::Session) -> XrResult<()> {
        let info = sys::FrameBeginInfo {
            ty: sys::FrameBeginInfo::TYPE,
            next: ptr::null(),
        };
        cvt(unsafe { (self.fp().begin_frame)(session, &info) })
    }

    fn end_frame(
        &self,
        session: sys::Session,
        display_time: sys::Time,
        blend_mode: sys::EnvironmentBlendMode,
        layers: &[CompositionLayer],
    ) -> XrResult<()> {
        // Storage is built in stages and never touched again, so the
        // pointers chained between stages stay valid until the call returns.
        let depth: Vec<Vec<Option<sys::CompositionLayerDepthInfoKHR>>> = layers
            .iter()
            .map(|layer| match layer {
                CompositionLayer::Projection(p) => p
                    .views
                    .iter()
                    .map(|v| v.depth.as_ref().map(depth_info))
                    .collect(),
                CompositionLayer::Passthrough { .. } => Vec::new(),
            })
            .collect();
        let views: Vec<Vec<sys::CompositionLayerProjectionView>> = layers
            .iter()
            .zip(&depth)
            .map(|(layer, depth)| match layer {
                CompositionLayer::Projection(p) => p
                    .views
                    .iter()
                    .zip(depth)
                    .map(|(v, d)| projection_view(v, d.as_ref()))
                    .collect(),
                CompositionLayer::Passthrough { .. } => Vec::new(),
            })
            .collect();
        let raw: Vec<RawLayer> = layers
            .iter()
            .zip(&views)
            .map(|(layer, views)| match layer {
                CompositionLayer::Projection(p) => {
                    RawLayer::Projection(sys::CompositionLayerProjection {
                        ty: sys::CompositionLayerProjection::TYPE,
                        next: ptr::null(),
                        layer_flags: p.flags,
                        space: p.space,
                        view_count: views.len() as u32,
                        views: views.as_ptr(),
                    })
                }
                CompositionLayer::Passthrough {
                    flags,
                    space,
                    layer,
                } => RawLayer::Passthrough(sys::CompositionLayerPassthroughFB {
                    ty: sys::CompositionLayerPassthroughFB::TYPE,
                    next: ptr::null(),
                    flags: *flags,
                    space: *space,
                    layer_handle: sys::PassthroughLayerFB::from_raw(*layer),
                }),
            })
            .collect();
        let headers: Vec<*const sys::CompositionLayerBaseHeader> =
            raw.iter().map(RawLayer::header).collect();

        let info = sys::FrameEndInfo {
            ty: sys::FrameEndInfo::TYPE,
            next: ptr::null(),
            display_time,
            environment_blend_mode: blend_mode,
            layer_count: headers.len() as u32,
            layers: headers.as_ptr(),
        };
        cvt(unsafe { (self.fp().end_frame)(session, &info) })
    }

    fn create_action_set(
        &self,
        name: &str,
        localized_name: &str,
        priority: u32,
    ) -> XrResult<sys::ActionSet> {
        let info = sys::ActionSetCreateInfo {
            ty: sys::ActionSetCreateInfo::TYPE,
            next: ptr::null(),
            action_set_name: place_name(name, sys::Result::ERROR_PATH_FORMAT_INVALID)?,
            localized_action_set_name: place_name(
                localized_name,
                sys::Result::ERROR_LOCALIZED_NAME_INVALID,
            )?,
            priority,
        };
        let mut set = sys::ActionSet::NULL;
        cvt(unsafe { (self.fp().create_action_set)(self.instance.as_raw(), &info, &mut set) })?;
        Ok(set)
    }

    fn destroy_action_set(&self, action_set: sys::ActionSet) -> XrResult<()> {
        cvt(unsafe { (self.fp().destroy_action_set)(action_set) })
    }

    fn create_action(
        &self,
        action_set: sys::ActionSet,
        name: &str,
        localized_name: &str,
        kind: ActionKind,
        subaction_paths: &[sys::Path],
    ) -> XrResult<sys::Action> {
        let info = sys::ActionCreateInfo {
            ty: sys::ActionCreateInfo::TYPE,
            next: ptr::null(),
            action_name: place_name(name, sys::Result::ERROR_PATH_FORMAT_INVALID)?,
            action_type: kind.to_sys(),
            count_subaction_paths: subaction_paths.len() as u32,
            subaction_paths: subaction_paths.as_ptr(),
            localized_action_name: place_name(
                localized_name,
                sys::Result::ERROR_LOCALIZED_NAME_INVALID,
            )?,
        };
        let mut action = sys::Action::NULL;
        cvt(unsafe { (self.fp().create_action)(action_set, &info, &mut action) })?;
        Ok(action)
    }

    fn suggest_interaction_profile_bindings(
        &self,
        interaction_profile: sys::Path,
        bindings: &[SuggestedBinding],
    ) -> XrResult<()> {
        let raw: Vec<sys::ActionSuggestedBinding> = bindings
            .iter()
            .map(|b| sys::ActionSuggestedBinding {
                action: b.action,
                binding: b.binding,
            })
            .collect();
        let info = sys::InteractionProfileSuggestedBinding {
            ty: sys::InteractionProfileSuggestedBinding::TYPE,
            next: ptr::null(),
            interaction_profile,
            count_suggested_bindings: raw.len() as u32,
            suggested_bindings: raw.as_ptr(),
        };
        cvt(unsafe {
            (self.fp().suggest_interaction_profile_bindings)(self.instance.as_raw(), &info)
        })
    }

    fn attach_action_sets(
        &self,
        session: sys::Session,
        action_sets: &[sys::ActionSet],
    ) -> XrResult<()> {
        let info = sys::SessionActionSetsAttachInfo {
            ty: sys::SessionActionSetsAttachInfo::TYPE,
            next: ptr::null(),
            count_action_sets: action_sets.len() as u32,
            action_sets: action_sets.as_ptr(),
        };
        cvt(unsafe { (self.fp().attach_session_action_sets)(session, &info) })
    }

    fn sync_actions(
        &self,
        session: sys::Session,
        active: &[sys::ActiveActionSet],
    ) -> XrResult<()> {
        let info = sys::ActionsSyncInfo {
            ty: sys::ActionsSyncInfo::TYPE,
            next: ptr::null(),
            count_active_action_sets: active.len() as u32,
            active_action_sets: active.as_ptr(),
        };
        cvt(unsafe { (self.fp().sync_actions)(session, &info) })
    }

    fn action_state(
        &self,
        session: sys::Session,
        action: sys::Action,
        kind: ActionKind,
        subaction_path: sys::Path,
    ) -> XrResult<ActionState> {
        let info = Self::state_info(action, subaction_path);
        let never = sys::Time::from_nanos(0);
        match kind {
            ActionKind::Boolean => {
                let mut state = sys::ActionStateBoolean {
                    ty: sys::ActionStateBoolean::TYPE,
                    next: ptr::null_mut(),
                    current_state: sys::FALSE,
                    changed_since_last_sync: sys::FALSE,
                    last_change_time: never,
                    is_active: sys::FALSE,
                };
                cvt(unsafe { (self.fp().get_action_state_boolean)(session, &info, &mut state) })?;
                Ok(ActionState::Boolean(InputSample {
                    current: state.current_state.into(),
                    changed_since_last_sync: state.changed_since_last_sync.into(),
                    last_change_time: state.last_change_time,
                    is_active: state.is_active.into(),
                }))
            }
            ActionKind::Float => {
                let mut state = sys::ActionStateFloat {
                    ty: sys::ActionStateFloat::TYPE,
                    next: ptr::null_mut(),
                    current_state: 0.0,
                    changed_since_last_sync: sys::FALSE,
                    last_change_time: never,
                    is_active: sys::FALSE,
                };
                cvt(unsafe { (self.fp().get_action_state_float)(session, &info, &mut state) })?;
                Ok(ActionState::Float(InputSample {
                    current: state.current_state,
                    changed_since_last_sync: state.changed_since_last_sync.into(),
                    last_change_time: state.last_change_time,
                    is_active: state.is_active.into(),
                }))
            }
            ActionKind::Vector2f => {
                let mut state = sys::ActionStateVector2f {
                    ty: sys::ActionStateVector2f::TYPE,
                    next: ptr::null_mut(),
                    current_state: sys::Vector2f { x: 0.0, y: 0.0 },
                    changed_since_last_sync: sys::FALSE,
                    last_change_time: never,
                    is_active: sys::FALSE,
                };
                cvt(unsafe {
                    (self.fp().get_action_state_vector2f)(session, &info, &mut state)
                })?;
                Ok(ActionState::Vector2f(InputSample {
                    current: Vec2::new(state.current_state.x, state.current_state.y),
                    changed_since_last_sync: state.changed_since_last_sync.into(),
                    last_change_time: state.last_change_time,
                    is_active: state.is_active.into(),
                }))
            }
            ActionKind::Pose => {
                let mut state = sys::ActionStatePose {
                    ty: sys::ActionStatePose::TYPE,
                    next: ptr::null_mut(),
                    is_active: sys::FALSE,
                };
                cvt(unsafe { (self.fp().get_action_state_pose)(session, &info, &mut state) })?;
                Ok(ActionState::Pose {
                    is_active: state.is_active.into(),
                })
            }
            ActionKind::Haptic => Err(sys::Result::ERROR_ACTION_TYPE_MISMATCH),
        }
    }

    fn create_action_space(
        &self,
        session: sys::Session,
        action: sys::Action,
        subaction_path: sys::Path,
        pose: sys::Posef,
    ) -> XrResult<sys::Space> {
        let info = sys::ActionSpaceCreateInfo {
            ty: sys::ActionSpaceCreateInfo::TYPE,
            next: ptr::null(),
            action,
            subaction_path,
            pose_in_action_space: pose,
        };
        let mut space = sys::Space::NULL;
        cvt(unsafe { (self.fp().create_action_space)(session, &info, &mut space) })?;
        Ok(space)
    }

    fn apply_haptic_feedback(
        &self,
        session: sys::Session,
        action: sys::Action,
        subaction_path: sys::Path,
        vibration: &HapticVibration,
    ) -> XrResult<()> {
        let info = sys::HapticActionInfo {
            ty: sys::HapticActionInfo::TYPE,
            next: ptr::null(),
            action,
            subaction_path,
        };
        let vibration = sys::HapticVibration {
            ty: sys::HapticVibration::TYPE,
            next: ptr::null(),
            duration: vibration.duration,
            frequency: vibration.frequency,
            amplitude: vibration.amplitude,
        };
        cvt(unsafe {
            (self.fp().apply_haptic_feedback)(
                session,
                &info,
                &vibration as *const _ as *const sys::HapticBaseHeader,
            )
        })
    }

    fn current_interaction_profile(
        &self,
        session: sys::Session,
        top_level_user_path: sys::Path,
    ) -> XrResult<sys::Path> {
        let mut state = sys::InteractionProfileState {
            ty: sys::InteractionProfileState::TYPE,
            next: ptr::null_mut(),
            interaction_profile: sys::Path::NULL,
        };
        cvt(unsafe {
            (self.fp().get_current_interaction_profile)(session, top_level_user_path, &mut state)
        })?;
        Ok(state.interaction_profile)
    }

    fn enumerate_vive_tracker_paths(&self) -> XrResult<Vec<ViveTrackerPaths>> {
        let ext = self
            .instance
            .exts()
            .htcx_vive_tracker_interaction
            .as_ref()
            .ok_or(sys::Result::ERROR_FUNCTION_UNSUPPORTED)?;
        let fp = ext.enumerate_vive_tracker_paths;
        let instance = self.instance.as_raw();
        let blank = sys::ViveTrackerPathsHTCX {
            ty: sys::ViveTrackerPathsHTCX::TYPE,
            next: ptr::null_mut(),
            persistent_path: sys::Path::NULL,
            role_path: sys::Path::NULL,
        };
        let paths = enumerate(blank, |cap, count, out| unsafe { fp(instance, cap, count, out) })?;
        Ok(paths
            .into_iter()
            .map(|p| ViveTrackerPaths {
                persistent: p.persistent_path,
                role: p.role_path,
            })
            .collect())
    }
}

impl Drop for OpenXrRuntime {
    fn drop(&mut self) {
        if self.vulkan().take().is_some() {
            log::debug!("Vulkan device released");
        }
    }
}
