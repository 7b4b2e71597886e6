//! Name-keyed registry of extension objects.
//!
//! At most one object lives per extension name. Session-level extensions
//! bind to the session that enabled them; instance-level ones bind to nothing.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use openxr::sys;
use tracing::{debug, warn};

pub mod vive_tracker;

pub use vive_tracker::ViveTrackerInteraction;

pub const KHR_VULKAN_ENABLE: &str = "XR_KHR_vulkan_enable";
pub const KHR_VULKAN_ENABLE2: &str = "XR_KHR_vulkan_enable2";
pub const KHR_COMPOSITION_LAYER_DEPTH: &str = "XR_KHR_composition_layer_depth";
pub const KHR_VISIBILITY_MASK: &str = "XR_KHR_visibility_mask";
pub const EXT_HAND_TRACKING: &str = "XR_EXT_hand_tracking";
pub const EXT_EYE_GAZE_INTERACTION: &str = "XR_EXT_eye_gaze_interaction";
pub const FB_PASSTHROUGH: &str = "XR_FB_passthrough";
pub const FB_DISPLAY_REFRESH_RATE: &str = "XR_FB_display_refresh_rate";
pub const HTCX_VIVE_TRACKER_INTERACTION: &str = "XR_HTCX_vive_tracker_interaction";

/// Graphics bindings this build cannot drive.
pub const UNSUPPORTED_GRAPHICS_EXTENSIONS: [&str; 5] = [
    "XR_KHR_opengl_enable",
    "XR_KHR_opengl_es_enable",
    "XR_KHR_D3D11_enable",
    "XR_KHR_D3D12_enable",
    "XR_MNDX_egl_enable",
];

/// Extensions whose objects are created once a session exists.
pub const SESSION_EXTENSIONS: [&str; 5] = [
    KHR_VISIBILITY_MASK,
    EXT_HAND_TRACKING,
    FB_PASSTHROUGH,
    FB_DISPLAY_REFRESH_RATE,
    HTCX_VIVE_TRACKER_INTERACTION,
];

/// Extensions whose objects are created with the instance.
pub const INSTANCE_EXTENSIONS: [&str; 1] = [EXT_EYE_GAZE_INTERACTION];

pub fn requires_session(name: &str) -> bool {
    SESSION_EXTENSIONS.contains(&name)
}

pub trait AsAnyArc {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAnyArc for T {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

pub trait Extension: AsAnyArc + Send + Sync {
    fn name(&self) -> &'static str;

    /// Session the extension is bound to, if any.
    fn session(&self) -> Option<sys::Session> {
        None
    }
}

impl PartialEq for dyn Extension {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

macro_rules! session_extension {
    ($ty:ident, $name:expr) => {
        #[derive(Debug)]
        pub struct $ty {
            session: sys::Session,
        }

        impl $ty {
            pub fn new(session: sys::Session) -> Self {
                Self { session }
            }
        }

        impl Extension for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            fn session(&self) -> Option<sys::Session> {
                Some(self.session)
            }
        }
    };
}

session_extension!(VisibilityMask, KHR_VISIBILITY_MASK);
session_extension!(HandTracking, EXT_HAND_TRACKING);
session_extension!(Passthrough, FB_PASSTHROUGH);
session_extension!(DisplayRefreshRate, FB_DISPLAY_REFRESH_RATE);

#[derive(Debug, Default)]
pub struct EyeGaze;

impl Extension for EyeGaze {
    fn name(&self) -> &'static str {
        EXT_EYE_GAZE_INTERACTION
    }
}

#[derive(Default)]
pub struct ExtensionRegistry {
    entries: HashMap<&'static str, Arc<dyn Extension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live object for `name`, creating it on first use.
    ///
    /// `None` when the name is not recognized, or names a session-level
    /// extension and no session was given.
    pub fn add_extension(
        &mut self,
        name: &str,
        session: Option<sys::Session>,
    ) -> Option<Arc<dyn Extension>> {
        if let Some(existing) = self.entries.get(name) {
            match (existing.session(), session) {
                (Some(bound), Some(session)) if bound != session => {
                    debug!("rebinding {name} from {bound:?} to {session:?}");
                }
                _ => return Some(Arc::clone(existing)),
            }
        }

        let created: Arc<dyn Extension> = match (name, session) {
            (KHR_VISIBILITY_MASK, Some(session)) => Arc::new(VisibilityMask::new(session)),
            (EXT_HAND_TRACKING, Some(session)) => Arc::new(HandTracking::new(session)),
            (FB_PASSTHROUGH, Some(session)) => Arc::new(Passthrough::new(session)),
            (FB_DISPLAY_REFRESH_RATE, Some(session)) => Arc::new(DisplayRefreshRate::new(session)),
            (HTCX_VIVE_TRACKER_INTERACTION, Some(session)) => {
                Arc::new(ViveTrackerInteraction::new(session))
            }
            (EXT_EYE_GAZE_INTERACTION, _) => Arc::new(EyeGaze),
            (name, None) if requires_session(name) => {
                warn!("extension {name} needs a session before it can be created");
                return None;
            }
            (name, _) => {
                debug!("no extension object for {name}");
                return None;
            }
        };

        debug!("extension object created: {}", created.name());
        self.entries.insert(created.name(), Arc::clone(&created));
        Some(created)
    }

    /// Drops every object bound to `session`; instance-level ones stay.
    pub fn remove_session_extensions(&mut self, session: sys::Session) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, extension| extension.session() != Some(session));
        before - self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Extension>> {
        self.entries.get(name).cloned()
    }

    /// Typed lookup, e.g. `registry.get_as::<HandTracking>(EXT_HAND_TRACKING)`.
    pub fn get_as<T: Extension + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name)?.into_any().downcast::<T>().ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openxr::sys::Handle;

    fn session() -> sys::Session {
        sys::Session::from_raw(7)
    }

    #[test]
    fn test_duplicate_add_returns_same_object() {
        let mut registry = ExtensionRegistry::new();
        let first = registry
            .add_extension(EXT_HAND_TRACKING, Some(session()))
            .unwrap();
        let second = registry
            .add_extension(EXT_HAND_TRACKING, Some(session()))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_session_extension_needs_session() {
        let mut registry = ExtensionRegistry::new();
        assert!(registry.add_extension(FB_PASSTHROUGH, None).is_none());
        assert!(registry.is_empty());
        assert!(registry.add_extension(EXT_EYE_GAZE_INTERACTION, None).is_some());
    }

    #[test]
    fn test_unknown_names_are_ignored() {
        let mut registry = ExtensionRegistry::new();
        assert!(registry
            .add_extension("XR_VENDOR_made_up", Some(session()))
            .is_none());
        assert!(!registry.contains("XR_VENDOR_made_up"));
    }

    #[test]
    fn test_typed_lookup() {
        let mut registry = ExtensionRegistry::new();
        registry.add_extension(FB_DISPLAY_REFRESH_RATE, Some(session()));
        let rate = registry
            .get_as::<DisplayRefreshRate>(FB_DISPLAY_REFRESH_RATE)
            .unwrap();
        assert_eq!(rate.session(), Some(session()));
        assert!(registry
            .get_as::<HandTracking>(FB_DISPLAY_REFRESH_RATE)
            .is_none());
    }

    #[test]
    fn test_session_teardown_keeps_instance_extensions() {
        let mut registry = ExtensionRegistry::new();
        registry.add_extension(EXT_HAND_TRACKING, Some(session()));
        registry.add_extension(FB_PASSTHROUGH, Some(session()));
        registry.add_extension(EXT_EYE_GAZE_INTERACTION, None);
        assert_eq!(registry.remove_session_extensions(sys::Session::from_raw(8)), 0);
        assert_eq!(registry.remove_session_extensions(session()), 2);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec![EXT_EYE_GAZE_INTERACTION]);
    }

    #[test]
    fn test_new_session_rebinds_stale_object() {
        let mut registry = ExtensionRegistry::new();
        let old = registry
            .add_extension(EXT_HAND_TRACKING, Some(session()))
            .unwrap();
        let next = sys::Session::from_raw(9);
        let fresh = registry.add_extension(EXT_HAND_TRACKING, Some(next)).unwrap();
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(fresh.session(), Some(next));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_equality_is_by_name() {
        let a: Arc<dyn Extension> = Arc::new(HandTracking::new(sys::Session::from_raw(1)));
        let b: Arc<dyn Extension> = Arc::new(HandTracking::new(sys::Session::from_raw(2)));
        let c: Arc<dyn Extension> = Arc::new(EyeGaze);
        assert!(*a == *b);
        assert!(*a != *c);
    }
}
