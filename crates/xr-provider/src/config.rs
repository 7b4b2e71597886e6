use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::extensions::{
    EXT_EYE_GAZE_INTERACTION, EXT_HAND_TRACKING, FB_DISPLAY_REFRESH_RATE, FB_PASSTHROUGH,
    HTCX_VIVE_TRACKER_INTERACTION, KHR_COMPOSITION_LAYER_DEPTH, KHR_VISIBILITY_MASK,
};
use crate::types::{BlendMode, Pose, ReferenceSpaceKind, ViewConfiguration};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppInstanceInfo {
    pub app_name: String,
    pub app_version: u32,
    pub engine_name: String,
    pub engine_version: u32,
    /// `major.minor.patch` of the API the application targets.
    pub api_version: (u16, u16, u32),
    pub extensions: Vec<String>,
    pub api_layers: Vec<String>,
}

impl Default for AppInstanceInfo {
    fn default() -> Self {
        Self {
            app_name: "xr-provider".to_string(),
            app_version: 1,
            engine_name: "xr-provider".to_string(),
            engine_version: 1,
            api_version: (1, 0, 0),
            extensions: [
                KHR_COMPOSITION_LAYER_DEPTH,
                KHR_VISIBILITY_MASK,
                EXT_HAND_TRACKING,
                EXT_EYE_GAZE_INTERACTION,
                FB_PASSTHROUGH,
                FB_DISPLAY_REFRESH_RATE,
                HTCX_VIVE_TRACKER_INTERACTION,
            ]
            .iter()
            .map(|name| name.to_string())
            .collect(),
            api_layers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub reference_space: ReferenceSpaceKind,
    #[serde(skip)]
    pub reference_pose: Pose,
    pub view_configuration: ViewConfiguration,
    pub blend_mode: BlendMode,
    /// Preferred color formats; empty means take the runtime's order.
    pub color_formats: Vec<i64>,
    pub depth_formats: Vec<i64>,
    /// Zero means one swapchain per view.
    pub swapchain_count: u32,
    /// Zero means the runtime's recommendation.
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    pub array_size: u32,
    pub face_count: u32,
    pub mip_count: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reference_space: ReferenceSpaceKind::Stage,
            reference_pose: Pose::IDENTITY,
            view_configuration: ViewConfiguration::PrimaryStereo,
            blend_mode: BlendMode::Opaque,
            color_formats: Vec::new(),
            depth_formats: Vec::new(),
            swapchain_count: 0,
            width: 0,
            height: 0,
            sample_count: 0,
            array_size: 1,
            face_count: 1,
            mip_count: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub instance: AppInstanceInfo,
    pub session: SessionConfig,
}

impl ProviderConfig {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(std::io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_request_session_extensions() {
        let info = AppInstanceInfo::default();
        assert!(info.extensions.iter().any(|e| e == EXT_HAND_TRACKING));
        assert!(info.api_layers.is_empty());
        assert_eq!(info.api_version, (1, 0, 0));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ProviderConfig::from_json(
            r#"{
                "instance": { "app_name": "demo" },
                "session": { "reference_space": "Local", "swapchain_count": 1 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.instance.app_name, "demo");
        assert_eq!(config.instance.engine_name, "xr-provider");
        assert_eq!(config.session.reference_space, ReferenceSpaceKind::Local);
        assert_eq!(config.session.swapchain_count, 1);
        assert_eq!(config.session.array_size, 1);
        assert_eq!(config.session.reference_pose, Pose::IDENTITY);
    }
}
