//! OpenXR loader backend for `xr-provider`, rendering through Vulkan.

use std::ptr;

use openxr as xr;
use thiserror::Error;
use xr::sys;
use xr_provider::runtime::{
    ApiLayerProperties, ExtensionProperties, XrLoader, XrResult, XrRuntime,
};
use xr_provider::AppInstanceInfo;

mod runtime;
mod vulkan;

pub use runtime::OpenXrRuntime;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("OpenXR loader unavailable: {0}")]
    Load(String),
}

#[derive(Clone)]
pub struct OpenXrLoader {
    entry: xr::Entry,
}

impl OpenXrLoader {
    pub fn new() -> Result<Self, BackendError> {
        let entry = unsafe { xr::Entry::load() }.map_err(|e| BackendError::Load(format!("{e:?}")))?;
        log::info!("OpenXR loader ready");
        Ok(Self { entry })
    }
}

fn extension_set(names: &[String]) -> xr::ExtensionSet {
    let mut exts = xr::ExtensionSet::default();
    for name in names {
        match name.as_str() {
            "XR_KHR_vulkan_enable" => exts.khr_vulkan_enable = true,
            "XR_KHR_vulkan_enable2" => exts.khr_vulkan_enable2 = true,
            "XR_KHR_composition_layer_depth" => exts.khr_composition_layer_depth = true,
            "XR_KHR_visibility_mask" => exts.khr_visibility_mask = true,
            "XR_EXT_hand_tracking" => exts.ext_hand_tracking = true,
            "XR_EXT_eye_gaze_interaction" => exts.ext_eye_gaze_interaction = true,
            "XR_FB_passthrough" => exts.fb_passthrough = true,
            "XR_FB_display_refresh_rate" => exts.fb_display_refresh_rate = true,
            "XR_HTCX_vive_tracker_interaction" => exts.htcx_vive_tracker_interaction = true,
            other => exts.other.push(other.as_bytes().to_vec()),
        }
    }
    exts
}

impl XrLoader for OpenXrLoader {
    fn enumerate_extensions(&self) -> XrResult<Vec<ExtensionProperties>> {
        let fp = self.entry.fp().enumerate_instance_extension_properties;
        let mut count = 0;
        let result = unsafe { fp(ptr::null(), 0, &mut count, ptr::null_mut()) };
        if result.into_raw() < 0 {
            return Err(result);
        }
        let blank = sys::ExtensionProperties {
            ty: sys::ExtensionProperties::TYPE,
            next: ptr::null_mut(),
            extension_name: [0; sys::MAX_EXTENSION_NAME_SIZE],
            extension_version: 0,
        };
        let mut props = vec![blank; count as usize];
        let result = unsafe { fp(ptr::null(), count, &mut count, props.as_mut_ptr()) };
        if result.into_raw() < 0 {
            return Err(result);
        }
        props.truncate(count as usize);
        Ok(props
            .iter()
            .map(|p| ExtensionProperties {
                name: runtime::fixed_str(&p.extension_name),
                version: p.extension_version,
            })
            .collect())
    }

    fn enumerate_api_layers(&self) -> XrResult<Vec<ApiLayerProperties>> {
        let layers = self.entry.enumerate_layers()?;
        Ok(layers
            .into_iter()
            .map(|l| ApiLayerProperties {
                name: l.layer_name,
                spec_version: l.spec_version,
                layer_version: l.layer_version,
                description: l.description,
            })
            .collect())
    }

    fn create_instance(
        &self,
        app: &AppInstanceInfo,
        extensions: &[String],
        api_layers: &[String],
    ) -> XrResult<Box<dyn XrRuntime>> {
        let (major, minor, patch) = app.api_version;
        let app_info = xr::ApplicationInfo {
            application_name: &app.app_name,
            application_version: app.app_version,
            engine_name: &app.engine_name,
            engine_version: app.engine_version,
            api_version: xr::Version::new(major, minor, patch),
        };
        let layers: Vec<&str> = api_layers.iter().map(String::as_str).collect();
        let instance = self
            .entry
            .create_instance(&app_info, &extension_set(extensions), &layers)
            .map_err(|e| {
                log::error!("OpenXR instance create failed: {e}");
                e
            })?;
        log::info!(
            "OpenXR instance created ({} extensions, {} layers)",
            extensions.len(),
            api_layers.len()
        );
        Ok(Box::new(OpenXrRuntime::new(instance)))
    }
}
