//! Session lifecycle, reference spaces, swapchain negotiation and the
//! per-frame submission protocol.
//!
//! Lifecycle state is only ever changed by [`Session::set_state`], fed from
//! runtime events; the session never advances itself.

use std::fmt;
use std::sync::{Arc, Mutex};

use openxr::sys;
use tracing::{debug, error, info, warn};

use crate::action::lock;
use crate::config::SessionConfig;
use crate::error::{call_order, check, ProviderError, ProviderResult};
use crate::extensions::{requires_session, ExtensionRegistry};
use crate::handle::Owned;
use crate::runtime::{
    CompositionLayer, DepthInfo, FrameState, ProjectionLayer, ProjectionView, SpaceLocation,
    SubImage, SwapchainCreateInfo, ViewConfigView, VulkanBinding, XrRuntime,
};
use crate::types::Pose;

pub const FORMAT_UNDEFINED: i64 = 0;

pub const VK_FORMAT_D16_UNORM: i64 = 124;
pub const VK_FORMAT_X8_D24_UNORM_PACK32: i64 = 125;
pub const VK_FORMAT_D32_SFLOAT: i64 = 126;
pub const VK_FORMAT_D16_UNORM_S8_UINT: i64 = 128;
pub const VK_FORMAT_D24_UNORM_S8_UINT: i64 = 129;
pub const VK_FORMAT_D32_SFLOAT_S8_UINT: i64 = 130;

const DEPTH_NEAR_Z: f32 = 0.1;
const DEPTH_FAR_Z: f32 = f32::MAX;

pub fn is_depth_format(format: i64) -> bool {
    matches!(
        format,
        VK_FORMAT_D16_UNORM
            | VK_FORMAT_X8_D24_UNORM_PACK32
            | VK_FORMAT_D32_SFLOAT
            | VK_FORMAT_D16_UNORM_S8_UINT
            | VK_FORMAT_D24_UNORM_S8_UINT
            | VK_FORMAT_D32_SFLOAT_S8_UINT
    )
}

/// First runtime format of the wanted depth-ness that the caller accepts.
pub fn select_texture_format(runtime_formats: &[i64], requested: &[i64], depth: bool) -> i64 {
    runtime_formats
        .iter()
        .copied()
        .filter(|format| is_depth_format(*format) == depth)
        .find(|format| requested.is_empty() || requested.contains(format))
        .unwrap_or(FORMAT_UNDEFINED)
}

/// Invoked with `(swapchain index, image index)`.
pub type RenderCallback = Box<dyn FnMut(usize, u32) + Send>;

/// The views of the frame being rendered, published before the first render
/// callback runs. Clones share the same frame, so a callback can capture one
/// from [`Session::frame_views`] and read this frame's pose and fov.
#[derive(Clone, Default)]
pub struct FrameViews {
    inner: Arc<Mutex<FrameViewsInner>>,
}

#[derive(Default)]
struct FrameViewsInner {
    views: Vec<ProjectionView>,
    // indexed by swapchain
    depth_images: Vec<Option<u32>>,
}

impl FrameViews {
    pub fn views(&self) -> Vec<ProjectionView> {
        lock(&self.inner).views.clone()
    }

    pub fn view(&self, index: usize) -> Option<ProjectionView> {
        lock(&self.inner).views.get(index).copied()
    }

    /// Depth image acquired for `swapchain` this frame. The runtime cycles
    /// depth images on their own, so this can differ from the color index.
    pub fn depth_image(&self, swapchain: usize) -> Option<u32> {
        lock(&self.inner).depth_images.get(swapchain).copied().flatten()
    }

    fn publish(&self, views: Vec<ProjectionView>, swapchains: usize) {
        let mut inner = lock(&self.inner);
        inner.views = views;
        inner.depth_images = vec![None; swapchains];
    }

    fn set_depth_image(&self, swapchain: usize, image: u32) {
        if let Some(slot) = lock(&self.inner).depth_images.get_mut(swapchain) {
            *slot = Some(image);
        }
    }

    fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.views.clear();
        inner.depth_images.clear();
    }
}

impl fmt::Debug for FrameViews {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("FrameViews")
            .field("views", &inner.views)
            .field("depth_images", &inner.depth_images)
            .finish()
    }
}

#[derive(Default)]
struct RenderCallbacks {
    acquired: Vec<RenderCallback>,
    ready: Vec<RenderCallback>,
    released: Vec<RenderCallback>,
}

pub struct Swapchain {
    color: Owned<sys::Swapchain>,
    depth: Owned<sys::Swapchain>,
    width: u32,
    height: u32,
    sample_count: u32,
    array_size: u32,
    color_images: Vec<u64>,
    depth_images: Vec<u64>,
}

impl Swapchain {
    pub fn color(&self) -> sys::Swapchain {
        self.color.raw()
    }

    pub fn depth(&self) -> sys::Swapchain {
        self.depth.raw()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn array_size(&self) -> u32 {
        self.array_size
    }

    pub fn color_images(&self) -> &[u64] {
        &self.color_images
    }

    pub fn depth_images(&self) -> &[u64] {
        &self.depth_images
    }

    fn full_extent(&self) -> sys::Extent2Di {
        sys::Extent2Di {
            width: self.width as i32,
            height: self.height as i32,
        }
    }
}

impl fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Swapchain")
            .field("color", &self.color)
            .field("depth", &self.depth)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("images", &self.color_images.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameOptions {
    pub flags: sys::CompositionLayerFlags,
    pub blend_mode: sys::EnvironmentBlendMode,
    pub rect_offset: sys::Offset2Di,
    /// `None` covers the whole image.
    pub rect_extent: Option<sys::Extent2Di>,
    /// Fixed array layer for every view. `None` gives each view its own
    /// layer when views outnumber swapchains, and layer 0 otherwise.
    pub array_index: Option<u32>,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            flags: sys::CompositionLayerFlags::EMPTY,
            blend_mode: sys::EnvironmentBlendMode::OPAQUE,
            rect_offset: sys::Offset2Di { x: 0, y: 0 },
            rect_extent: None,
            array_index: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameReport {
    pub frame_state: FrameState,
    /// Layers handed to end-frame, including caller-supplied ones.
    pub layer_count: usize,
    pub projection_submitted: bool,
    /// Failure that cut the swapchain loop short; the frame was still ended.
    pub render_error: Option<ProviderError>,
}

struct SessionHandles {
    // field order is release order
    app_space: Owned<sys::Space>,
    reference_space: Owned<sys::Space>,
    session: Owned<sys::Session>,
}

pub struct Session {
    swapchains: Vec<Swapchain>,
    handles: Option<SessionHandles>,
    runtime: Arc<dyn XrRuntime>,
    system: sys::SystemId,
    enabled_extensions: Vec<String>,
    registry: Arc<Mutex<ExtensionRegistry>>,
    view_configuration: sys::ViewConfigurationType,
    config_views: Vec<ViewConfigView>,
    color_format: i64,
    depth_format: i64,
    depth_enabled: bool,
    state: sys::SessionState,
    running: bool,
    callbacks: RenderCallbacks,
    frame_views: FrameViews,
}

impl Session {
    pub fn new(
        runtime: Arc<dyn XrRuntime>,
        system: sys::SystemId,
        enabled_extensions: Vec<String>,
        registry: Arc<Mutex<ExtensionRegistry>>,
    ) -> Self {
        Self {
            swapchains: Vec::new(),
            handles: None,
            runtime,
            system,
            enabled_extensions,
            registry,
            view_configuration: sys::ViewConfigurationType::PRIMARY_STEREO,
            config_views: Vec::new(),
            color_format: FORMAT_UNDEFINED,
            depth_format: FORMAT_UNDEFINED,
            depth_enabled: false,
            state: sys::SessionState::UNKNOWN,
            running: false,
            callbacks: RenderCallbacks::default(),
            frame_views: FrameViews::default(),
        }
    }

    /// Creates the runtime session together with its reference and app spaces.
    ///
    /// Either all three exist afterwards or none do. Session-level extension
    /// objects are registered once the spaces are in place.
    pub fn init(
        &mut self,
        graphics: &VulkanBinding,
        reference_space_type: sys::ReferenceSpaceType,
        reference_pose: Pose,
    ) -> ProviderResult<()> {
        if self.handles.is_some() {
            return call_order("session already initialized");
        }

        let session = check(
            Owned::create(&self.runtime, |rt| rt.create_session(self.system, graphics)),
            "create session",
        )?;
        let raw = session.raw();
        let reference_space = check(
            Owned::create(&self.runtime, |rt| {
                rt.create_reference_space(raw, reference_space_type, reference_pose.to_sys())
            }),
            "create reference space",
        )?;
        let app_space = check(
            Owned::create(&self.runtime, |rt| {
                rt.create_reference_space(raw, reference_space_type, reference_pose.to_sys())
            }),
            "create app space",
        )?;

        self.handles = Some(SessionHandles {
            app_space,
            reference_space,
            session,
        });
        self.register_session_extensions(raw);
        info!(session = ?raw, space = ?reference_space_type, "session created");
        Ok(())
    }

    fn register_session_extensions(&self, session: sys::Session) {
        let mut registry = lock(&self.registry);
        for name in &self.enabled_extensions {
            if requires_session(name) {
                registry.add_extension(name, Some(session));
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.handles.is_some()
    }

    fn handles(&self) -> ProviderResult<&SessionHandles> {
        match &self.handles {
            Some(handles) => Ok(handles),
            None => call_order("session not initialized"),
        }
    }

    pub fn handle(&self) -> ProviderResult<sys::Session> {
        Ok(self.handles()?.session.raw())
    }

    pub fn reference_space(&self) -> ProviderResult<sys::Space> {
        Ok(self.handles()?.reference_space.raw())
    }

    pub fn app_space(&self) -> ProviderResult<sys::Space> {
        Ok(self.handles()?.app_space.raw())
    }

    pub fn begin(&mut self, view_configuration: sys::ViewConfigurationType) -> ProviderResult<()> {
        let session = self.handle()?;
        check(
            self.runtime.begin_session(session, view_configuration),
            "begin session",
        )?;
        self.view_configuration = view_configuration;
        self.running = true;
        info!(view_configuration = ?view_configuration, "session begun");
        Ok(())
    }

    pub fn end(&mut self) -> ProviderResult<()> {
        let session = self.handle()?;
        check(self.runtime.end_session(session), "end session")?;
        self.running = false;
        info!("session ended");
        Ok(())
    }

    pub fn request_exit(&self) -> ProviderResult<()> {
        let session = self.handle()?;
        check(
            self.runtime.request_exit_session(session),
            "request exit session",
        )?;
        debug!("session exit requested");
        Ok(())
    }

    /// Applies a state reported by the runtime and returns the previous one.
    pub fn set_state(&mut self, state: sys::SessionState) -> sys::SessionState {
        std::mem::replace(&mut self.state, state)
    }

    pub fn state(&self) -> sys::SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn should_begin(&self) -> bool {
        self.state == sys::SessionState::READY
    }

    pub fn should_end(&self) -> bool {
        self.state == sys::SessionState::STOPPING
    }

    pub fn is_exiting(&self) -> bool {
        matches!(
            self.state,
            sys::SessionState::EXITING | sys::SessionState::LOSS_PENDING
        )
    }

    pub fn supported_reference_space_types(&self) -> ProviderResult<Vec<sys::ReferenceSpaceType>> {
        let session = self.handle()?;
        check(
            self.runtime.enumerate_reference_spaces(session),
            "enumerate reference spaces",
        )
    }

    pub fn create_reference_space(
        &self,
        space_type: sys::ReferenceSpaceType,
        pose: Pose,
    ) -> ProviderResult<Owned<sys::Space>> {
        let session = self.handle()?;
        check(
            Owned::create(&self.runtime, |rt| {
                rt.create_reference_space(session, space_type, pose.to_sys())
            }),
            "create reference space",
        )
    }

    pub fn locate_space(
        &self,
        space: sys::Space,
        base: sys::Space,
        time: sys::Time,
    ) -> ProviderResult<SpaceLocation> {
        check(self.runtime.locate_space(space, base, time), "locate space")
    }

    /// Reference space expressed in the app space.
    pub fn locate_reference_space(&self, time: sys::Time) -> ProviderResult<SpaceLocation> {
        let handles = self.handles()?;
        self.locate_space(handles.reference_space.raw(), handles.app_space.raw(), time)
    }

    /// App space expressed in the reference space.
    pub fn locate_app_space(&self, time: sys::Time) -> ProviderResult<SpaceLocation> {
        let handles = self.handles()?;
        self.locate_space(handles.app_space.raw(), handles.reference_space.raw(), time)
    }

    pub fn update_configuration_views(
        &mut self,
        view_configuration: sys::ViewConfigurationType,
    ) -> ProviderResult<&[ViewConfigView]> {
        self.config_views = check(
            self.runtime
                .enumerate_view_configuration_views(self.system, view_configuration),
            "enumerate view configuration views",
        )?;
        Ok(&self.config_views)
    }

    pub fn config_views(&self) -> &[ViewConfigView] {
        &self.config_views
    }

    pub fn view_configuration(&self) -> sys::ViewConfigurationType {
        self.view_configuration
    }

    pub fn set_depth_enabled(&mut self, enabled: bool) {
        self.depth_enabled = enabled;
    }

    pub fn depth_enabled(&self) -> bool {
        self.depth_enabled
    }

    pub fn color_format(&self) -> i64 {
        self.color_format
    }

    pub fn depth_format(&self) -> i64 {
        self.depth_format
    }

    pub fn swapchains(&self) -> &[Swapchain] {
        &self.swapchains
    }

    /// One color and one depth swapchain per view. Nothing is kept unless
    /// every swapchain was created.
    pub fn create_swapchains(&mut self, config: &SessionConfig) -> ProviderResult<()> {
        let session = self.handle()?;
        if !self.swapchains.is_empty() {
            return call_order("swapchains already created");
        }

        let formats = check(
            self.runtime.enumerate_swapchain_formats(session),
            "enumerate swapchain formats",
        )?;
        let color_format = select_texture_format(&formats, &config.color_formats, false);
        let depth_format = select_texture_format(&formats, &config.depth_formats, true);
        if color_format == FORMAT_UNDEFINED || depth_format == FORMAT_UNDEFINED {
            error!(color_format, depth_format, "no usable swapchain format");
            return Err(ProviderError::runtime_failure());
        }

        let view_configuration = config.view_configuration.to_sys();
        let views = self.update_configuration_views(view_configuration)?.to_vec();
        if views.is_empty() {
            error!(view_configuration = ?view_configuration, "runtime reported no views");
            return Err(ProviderError::runtime_failure());
        }
        let count = match config.swapchain_count {
            0 => views.len(),
            requested => (requested as usize).min(views.len()),
        };

        let mut built = Vec::with_capacity(count);
        for view in views.iter().take(count) {
            built.push(self.create_swapchain(session, view, config, color_format, depth_format)?);
        }

        for (index, swapchain) in built.iter().enumerate() {
            debug!(
                index,
                width = swapchain.width,
                height = swapchain.height,
                images = swapchain.color_images.len(),
                "swapchain ready"
            );
        }
        info!(count, color_format, depth_format, "swapchains created");
        self.view_configuration = view_configuration;
        self.color_format = color_format;
        self.depth_format = depth_format;
        self.swapchains = built;
        Ok(())
    }

    fn create_swapchain(
        &self,
        session: sys::Session,
        view: &ViewConfigView,
        config: &SessionConfig,
        color_format: i64,
        depth_format: i64,
    ) -> ProviderResult<Swapchain> {
        let width = or_recommended(config.width, view.recommended_width);
        let height = or_recommended(config.height, view.recommended_height);
        let sample_count = or_recommended(config.sample_count, view.recommended_sample_count);
        let array_size = config.array_size.max(1);
        let info = |usage, format| SwapchainCreateInfo {
            usage,
            format,
            sample_count,
            width,
            height,
            face_count: config.face_count.max(1),
            array_size,
            mip_count: config.mip_count.max(1),
        };

        let color = check(
            Owned::create(&self.runtime, |rt| {
                rt.create_swapchain(
                    session,
                    &info(
                        sys::SwapchainUsageFlags::COLOR_ATTACHMENT
                            | sys::SwapchainUsageFlags::SAMPLED,
                        color_format,
                    ),
                )
            }),
            "create color swapchain",
        )?;
        let depth = check(
            Owned::create(&self.runtime, |rt| {
                rt.create_swapchain(
                    session,
                    &info(
                        sys::SwapchainUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                        depth_format,
                    ),
                )
            }),
            "create depth swapchain",
        )?;
        let color_images = check(
            self.runtime.enumerate_swapchain_images(color.raw()),
            "enumerate color swapchain images",
        )?;
        let depth_images = check(
            self.runtime.enumerate_swapchain_images(depth.raw()),
            "enumerate depth swapchain images",
        )?;

        Ok(Swapchain {
            color,
            depth,
            width,
            height,
            sample_count,
            array_size,
            color_images,
            depth_images,
        })
    }

    pub fn on_image_acquired(&mut self, callback: impl FnMut(usize, u32) + Send + 'static) {
        self.callbacks.acquired.push(Box::new(callback));
    }

    pub fn on_image_ready(&mut self, callback: impl FnMut(usize, u32) + Send + 'static) {
        self.callbacks.ready.push(Box::new(callback));
    }

    pub fn on_image_released(&mut self, callback: impl FnMut(usize, u32) + Send + 'static) {
        self.callbacks.released.push(Box::new(callback));
    }

    pub fn frame_views(&self) -> FrameViews {
        self.frame_views.clone()
    }

    /// Views are located and published through [`Session::frame_views`]
    /// before any image is acquired; without a valid orientation nothing is
    /// acquired. A failure in the swapchain loop ends the frame without the
    /// projection layer and lands in [`FrameReport::render_error`].
    pub fn render_frame_with_layers(
        &mut self,
        extra_layers: &[CompositionLayer],
        options: &FrameOptions,
    ) -> ProviderResult<FrameReport> {
        let session = self.handle()?;
        let frame_state = check(self.runtime.wait_frame(session), "wait frame")?;
        check(self.runtime.begin_frame(session), "begin frame")?;

        let mut layers = extra_layers.to_vec();
        let mut projection_submitted = false;
        let mut render_error = None;
        if frame_state.should_render {
            self.frame_views.clear();
            let rendered = self
                .projection_layer(&frame_state, options)
                .and_then(|layer| match layer {
                    Some(layer) => {
                        self.frame_views
                            .publish(layer.views.clone(), self.swapchains.len());
                        run_swapchain_protocol(
                            self.runtime.as_ref(),
                            &self.swapchains,
                            &mut self.callbacks,
                            &self.frame_views,
                        )
                        .map(|()| Some(layer))
                    }
                    None => Ok(None),
                });
            match rendered {
                Ok(Some(layer)) => {
                    layers.push(CompositionLayer::Projection(layer));
                    projection_submitted = true;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("frame rendered without projection layer: {err}");
                    render_error = Some(err);
                }
            }
        }

        check(
            self.runtime.end_frame(
                session,
                frame_state.predicted_display_time,
                options.blend_mode,
                &layers,
            ),
            "end frame",
        )?;
        Ok(FrameReport {
            frame_state,
            layer_count: layers.len(),
            projection_submitted,
            render_error,
        })
    }

    /// Frame pacing without any image: wait, begin and an empty end.
    pub fn render_headless_frame(
        &self,
        blend_mode: sys::EnvironmentBlendMode,
    ) -> ProviderResult<FrameReport> {
        let session = self.handle()?;
        let frame_state = check(self.runtime.wait_frame(session), "wait frame")?;
        check(self.runtime.begin_frame(session), "begin frame")?;
        check(
            self.runtime
                .end_frame(session, frame_state.predicted_display_time, blend_mode, &[]),
            "end frame",
        )?;
        Ok(FrameReport {
            frame_state,
            layer_count: 0,
            projection_submitted: false,
            render_error: None,
        })
    }

    fn projection_layer(
        &self,
        frame_state: &FrameState,
        options: &FrameOptions,
    ) -> ProviderResult<Option<ProjectionLayer>> {
        let handles = self.handles()?;
        let Some(last) = self.swapchains.len().checked_sub(1) else {
            return Ok(None);
        };
        let space = handles.app_space.raw();
        let (view_flags, located) = check(
            self.runtime.locate_views(
                handles.session.raw(),
                self.view_configuration,
                frame_state.predicted_display_time,
                space,
            ),
            "locate views",
        )?;
        if !view_flags.contains(sys::ViewStateFlags::ORIENTATION_VALID) {
            debug!("view orientation not valid, skipping projection layer");
            return Ok(None);
        }

        let shared = self.swapchains.len() < located.len();
        let views = located
            .iter()
            .enumerate()
            .map(|(index, view)| {
                let swapchain = &self.swapchains[index.min(last)];
                let array_index = match options.array_index {
                    Some(array_index) => array_index,
                    None if shared => index as u32,
                    None => 0,
                };
                let rect = sys::Rect2Di {
                    offset: options.rect_offset,
                    extent: options.rect_extent.unwrap_or_else(|| swapchain.full_extent()),
                };
                let depth = self.depth_enabled.then(|| DepthInfo {
                    sub_image: SubImage {
                        swapchain: swapchain.depth.raw(),
                        rect,
                        array_index,
                    },
                    min_depth: 0.0,
                    max_depth: 1.0,
                    near_z: DEPTH_NEAR_Z,
                    far_z: DEPTH_FAR_Z,
                });
                ProjectionView {
                    pose: view.pose,
                    fov: view.fov,
                    sub_image: SubImage {
                        swapchain: swapchain.color.raw(),
                        rect,
                        array_index,
                    },
                    depth,
                }
            })
            .collect();

        Ok(Some(ProjectionLayer {
            flags: options.flags,
            space,
            views,
        }))
    }
}

fn or_recommended(requested: u32, recommended: u32) -> u32 {
    if requested == 0 {
        recommended
    } else {
        requested
    }
}

// depth images cycle in lockstep with color
fn run_swapchain_protocol(
    runtime: &dyn XrRuntime,
    swapchains: &[Swapchain],
    callbacks: &mut RenderCallbacks,
    frame_views: &FrameViews,
) -> ProviderResult<()> {
    for (index, swapchain) in swapchains.iter().enumerate() {
        let image = check(
            runtime.acquire_swapchain_image(swapchain.color.raw()),
            "acquire swapchain image",
        )?;
        let depth_image = check(
            runtime.acquire_swapchain_image(swapchain.depth.raw()),
            "acquire depth swapchain image",
        )?;
        frame_views.set_depth_image(index, depth_image);
        for callback in &mut callbacks.acquired {
            callback(index, image);
        }

        check(
            runtime.wait_swapchain_image(swapchain.color.raw(), sys::Duration::INFINITE),
            "wait swapchain image",
        )?;
        check(
            runtime.wait_swapchain_image(swapchain.depth.raw(), sys::Duration::INFINITE),
            "wait depth swapchain image",
        )?;
        for callback in &mut callbacks.ready {
            callback(index, image);
        }

        check(
            runtime.release_swapchain_image(swapchain.color.raw()),
            "release swapchain image",
        )?;
        check(
            runtime.release_swapchain_image(swapchain.depth.raw()),
            "release depth swapchain image",
        )?;
        for callback in &mut callbacks.released {
            callback(index, image);
        }
    }
    Ok(())
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handles) = &self.handles {
            let removed =
                lock(&self.registry).remove_session_extensions(handles.session.raw());
            debug!(removed, "session extension objects released");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("initialized", &self.is_initialized())
            .field("state", &self.state)
            .field("running", &self.running)
            .field("swapchains", &self.swapchains)
            .field("color_format", &self.color_format)
            .field("depth_format", &self.depth_format)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::{ExtensionRegistry, EXT_HAND_TRACKING};
    use crate::sim::{SimConfig, SimRuntime, VK_FORMAT_B8G8R8A8_SRGB, VK_FORMAT_R8G8B8A8_SRGB};

    fn new_session(sim: &SimRuntime) -> (Session, VulkanBinding) {
        let runtime: Arc<dyn XrRuntime> = Arc::new(sim.clone());
        let system = runtime.system(sys::FormFactor::HEAD_MOUNTED_DISPLAY).unwrap();
        let binding = runtime.negotiate_graphics(system).unwrap();
        let session = Session::new(
            runtime,
            system,
            vec![EXT_HAND_TRACKING.to_string()],
            Arc::new(Mutex::new(ExtensionRegistry::new())),
        );
        (session, binding)
    }

    fn running_session(sim: &SimRuntime) -> Session {
        let (mut session, binding) = new_session(sim);
        session
            .init(&binding, sys::ReferenceSpaceType::STAGE, Pose::IDENTITY)
            .unwrap();
        session
            .begin(sys::ViewConfigurationType::PRIMARY_STEREO)
            .unwrap();
        session
    }

    #[test]
    fn test_select_texture_format_is_pure() {
        let runtime = [
            VK_FORMAT_D32_SFLOAT,
            VK_FORMAT_R8G8B8A8_SRGB,
            VK_FORMAT_B8G8R8A8_SRGB,
            VK_FORMAT_D24_UNORM_S8_UINT,
        ];
        assert_eq!(
            select_texture_format(&runtime, &[], false),
            VK_FORMAT_R8G8B8A8_SRGB
        );
        assert_eq!(select_texture_format(&runtime, &[], true), VK_FORMAT_D32_SFLOAT);
        // runtime order wins over request order
        let requested = [VK_FORMAT_B8G8R8A8_SRGB, VK_FORMAT_R8G8B8A8_SRGB];
        for _ in 0..3 {
            assert_eq!(
                select_texture_format(&runtime, &requested, false),
                VK_FORMAT_R8G8B8A8_SRGB
            );
        }
        assert_eq!(
            select_texture_format(&runtime, &[VK_FORMAT_D16_UNORM], true),
            FORMAT_UNDEFINED
        );
    }

    #[test]
    fn test_depth_formats() {
        assert!(is_depth_format(VK_FORMAT_D16_UNORM));
        assert!(is_depth_format(VK_FORMAT_D32_SFLOAT_S8_UINT));
        assert!(!is_depth_format(VK_FORMAT_R8G8B8A8_SRGB));
        // stencil-only
        assert!(!is_depth_format(127));
    }

    #[test]
    fn test_calls_before_init_are_call_order() {
        let sim = SimRuntime::default();
        let (mut session, _) = new_session(&sim);
        let err = session
            .begin(sys::ViewConfigurationType::PRIMARY_STEREO)
            .unwrap_err();
        assert_eq!(err.code(), sys::Result::ERROR_CALL_ORDER_INVALID);
        assert!(session.reference_space().is_err());
        assert!(session.end().is_err());
        assert!(session.request_exit().is_err());
        assert_eq!(sim.call_count("begin_session"), 0);
    }

    #[test]
    fn test_init_rolls_back_when_app_space_fails() {
        let sim = SimRuntime::default();
        let (mut session, binding) = new_session(&sim);
        sim.fail_on("create_reference_space", 2, sys::Result::ERROR_RUNTIME_FAILURE);
        let err = session
            .init(&binding, sys::ReferenceSpaceType::STAGE, Pose::IDENTITY)
            .unwrap_err();
        assert_eq!(err.code(), sys::Result::ERROR_RUNTIME_FAILURE);
        assert!(!session.is_initialized());
        assert_eq!(sim.live_spaces(), 0);
        assert!(!sim.has_session());
        assert!(lock(&session.registry).is_empty());
    }

    #[test]
    fn test_init_twice_is_call_order() {
        let sim = SimRuntime::default();
        let (mut session, binding) = new_session(&sim);
        session
            .init(&binding, sys::ReferenceSpaceType::LOCAL, Pose::IDENTITY)
            .unwrap();
        let err = session
            .init(&binding, sys::ReferenceSpaceType::LOCAL, Pose::IDENTITY)
            .unwrap_err();
        assert_eq!(err, ProviderError::CallOrder("session already initialized"));
        assert_eq!(sim.call_count("create_session"), 1);
        assert_ne!(session.reference_space().unwrap(), session.app_space().unwrap());
    }

    #[test]
    fn test_swapchain_failure_keeps_nothing() {
        let sim = SimRuntime::default();
        let mut session = running_session(&sim);
        // second view's color swapchain
        sim.fail_on("create_swapchain", 3, sys::Result::ERROR_OUT_OF_MEMORY);
        let err = session
            .create_swapchains(&SessionConfig::default())
            .unwrap_err();
        assert_eq!(err.code(), sys::Result::ERROR_OUT_OF_MEMORY);
        assert!(session.swapchains().is_empty());
        assert_eq!(sim.live_swapchains(), 0);
        assert_eq!(session.color_format(), FORMAT_UNDEFINED);
    }

    #[test]
    fn test_single_swapchain_override() {
        let sim = SimRuntime::default();
        let mut session = running_session(&sim);
        let config = SessionConfig {
            swapchain_count: 1,
            width: 512,
            ..SessionConfig::default()
        };
        session.create_swapchains(&config).unwrap();
        assert_eq!(session.swapchains().len(), 1);
        let swapchain = &session.swapchains()[0];
        assert_eq!(swapchain.width(), 512);
        assert_eq!(swapchain.height(), sim.config().view.recommended_height);
        assert_eq!(swapchain.color_images().len(), 3);
        assert_eq!(swapchain.depth_images().len(), 3);
    }

    #[test]
    fn test_render_callbacks_run_in_order() {
        let sim = SimRuntime::default();
        let mut session = running_session(&sim);
        session.create_swapchains(&SessionConfig::default()).unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        for (stage, name) in [(0, "acquired"), (1, "ready"), (2, "released")] {
            let log = Arc::clone(&log);
            let callback = move |swapchain: usize, image: u32| {
                lock(&log).push((name, swapchain, image));
            };
            match stage {
                0 => session.on_image_acquired(callback),
                1 => session.on_image_ready(callback),
                _ => session.on_image_released(callback),
            }
        }

        let report = session
            .render_frame_with_layers(&[], &FrameOptions::default())
            .unwrap();
        assert!(report.projection_submitted);
        assert_eq!(report.layer_count, 1);
        assert_eq!(
            *lock(&log),
            vec![
                ("acquired", 0, 0),
                ("ready", 0, 0),
                ("released", 0, 0),
                ("acquired", 1, 0),
                ("ready", 1, 0),
                ("released", 1, 0),
            ]
        );
    }

    #[test]
    fn test_render_failure_still_ends_frame() {
        let sim = SimRuntime::default();
        let mut session = running_session(&sim);
        session.create_swapchains(&SessionConfig::default()).unwrap();
        sim.fail_next("wait_swapchain_image", sys::Result::ERROR_RUNTIME_FAILURE);

        let report = session
            .render_frame_with_layers(&[], &FrameOptions::default())
            .unwrap();
        assert!(!report.projection_submitted);
        assert_eq!(
            report.render_error.map(|e| e.code()),
            Some(sys::Result::ERROR_RUNTIME_FAILURE)
        );
        let frames = sim.submitted_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].layers.len(), 0);
    }

    #[test]
    fn test_invalid_orientation_skips_projection() {
        let sim = SimRuntime::default();
        let mut session = running_session(&sim);
        session.create_swapchains(&SessionConfig::default()).unwrap();
        sim.set_orientation_valid(false);
        let acquired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&acquired);
        session.on_image_acquired(move |_, _| *lock(&counter) += 1);

        let report = session
            .render_frame_with_layers(&[], &FrameOptions::default())
            .unwrap();
        assert!(!report.projection_submitted);
        assert!(report.render_error.is_none());
        assert_eq!(sim.submitted_frames()[0].projection_layers(), 0);
        assert_eq!(sim.call_count("acquire_swapchain_image"), 0);
        assert_eq!(*lock(&acquired), 0);
        assert!(session.frame_views().views().is_empty());
    }

    #[test]
    fn test_views_located_before_ready_callbacks() {
        let sim = SimRuntime::default();
        let mut session = running_session(&sim);
        session.create_swapchains(&SessionConfig::default()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let frame_views = session.frame_views();
        let (log, runtime) = (Arc::clone(&seen), sim.clone());
        session.on_image_ready(move |swapchain, _| {
            let view = frame_views.view(swapchain).map(|v| v.pose.position.x);
            lock(&log).push((runtime.call_count("locate_views"), view));
        });

        session
            .render_frame_with_layers(&[], &FrameOptions::default())
            .unwrap();
        assert_eq!(
            *lock(&seen),
            vec![(1, Some(-0.032)), (1, Some(0.032))]
        );

        let calls = sim.calls();
        let located = calls.iter().position(|c| *c == "locate_views").unwrap();
        let first_acquire = calls
            .iter()
            .position(|c| *c == "acquire_swapchain_image")
            .unwrap();
        assert!(located < first_acquire);

        let frames = sim.submitted_frames();
        let CompositionLayer::Projection(layer) = &frames[0].layers[0] else {
            panic!("expected projection layer");
        };
        let published = session.frame_views().views();
        assert_eq!(published.len(), layer.views.len());
        for (drawn, submitted) in published.iter().zip(&layer.views) {
            assert_eq!(drawn.pose.position.x, submitted.pose.position.x);
            assert_eq!(drawn.fov.angle_left, submitted.fov.angle_left);
            assert_eq!(drawn.sub_image.swapchain, submitted.sub_image.swapchain);
        }
    }

    #[test]
    fn test_depth_index_tracked_when_counts_differ() {
        let sim = SimRuntime::new(SimConfig {
            depth_image_count: Some(2),
            ..SimConfig::default()
        });
        let mut session = running_session(&sim);
        session.create_swapchains(&SessionConfig::default()).unwrap();
        assert_eq!(session.swapchains()[0].color_images().len(), 3);
        assert_eq!(session.swapchains()[0].depth_images().len(), 2);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let frame_views = session.frame_views();
        let log = Arc::clone(&seen);
        session.on_image_ready(move |swapchain, image| {
            if swapchain == 0 {
                lock(&log).push((image, frame_views.depth_image(swapchain)));
            }
        });

        for _ in 0..3 {
            session
                .render_frame_with_layers(&[], &FrameOptions::default())
                .unwrap();
        }
        assert_eq!(
            *lock(&seen),
            vec![(0, Some(0)), (1, Some(1)), (2, Some(0))]
        );
    }

    #[test]
    fn test_depth_info_chained_when_enabled() {
        let sim = SimRuntime::default();
        let mut session = running_session(&sim);
        session.set_depth_enabled(true);
        session.create_swapchains(&SessionConfig::default()).unwrap();
        session
            .render_frame_with_layers(&[], &FrameOptions::default())
            .unwrap();
        let frames = sim.submitted_frames();
        let CompositionLayer::Projection(layer) = &frames[0].layers[0] else {
            panic!("expected projection layer");
        };
        assert_eq!(layer.views.len(), 2);
        let depth = layer.views[1].depth.unwrap();
        assert_eq!(depth.sub_image.swapchain, session.swapchains()[1].depth());
        assert_eq!(depth.near_z, 0.1);
        assert_eq!(depth.far_z, f32::MAX);
    }

    #[test]
    fn test_headless_frame_submits_nothing() {
        let sim = SimRuntime::default();
        let session = running_session(&sim);
        let report = session
            .render_headless_frame(sys::EnvironmentBlendMode::OPAQUE)
            .unwrap();
        assert_eq!(report.layer_count, 0);
        assert_eq!(sim.call_count("acquire_swapchain_image"), 0);
        assert_eq!(sim.submitted_frames().len(), 1);
    }

    #[test]
    fn test_state_helpers() {
        let sim = SimRuntime::default();
        let (mut session, _) = new_session(&sim);
        assert_eq!(session.state(), sys::SessionState::UNKNOWN);
        assert_eq!(
            session.set_state(sys::SessionState::READY),
            sys::SessionState::UNKNOWN
        );
        assert!(session.should_begin());
        session.set_state(sys::SessionState::STOPPING);
        assert!(session.should_end());
        session.set_state(sys::SessionState::LOSS_PENDING);
        assert!(session.is_exiting());
    }
}
