//! `XR_HTCX_vive_tracker_interaction`: role-addressed tracker poses.

use std::sync::Arc;

use openxr::sys;
use tracing::debug;

use super::{Extension, HTCX_VIVE_TRACKER_INTERACTION};
use crate::action::{Action, ActionSet};
use crate::controllers::TrackerRole;
use crate::error::{check, ProviderResult};
use crate::input::Input;
use crate::types::{ActionKind, Pose};

pub const TRACKER_POSE_ACTION: &str = "tracker_pose";

#[derive(Debug)]
pub struct ViveTrackerInteraction {
    session: sys::Session,
}

/// A tracker the runtime reports as connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedTracker {
    pub persistent_path: String,
    /// Empty when no role is assigned.
    pub role_path: String,
}

impl ConnectedTracker {
    pub fn role(&self) -> Option<TrackerRole> {
        TrackerRole::from_user_path(&self.role_path)
    }
}

impl ViveTrackerInteraction {
    pub fn new(session: sys::Session) -> Self {
        Self { session }
    }

    /// Every role path a tracker can be assigned, connected or not.
    pub fn all_role_paths() -> Vec<String> {
        TrackerRole::ALL.iter().map(|role| role.user_path()).collect()
    }

    /// Creates one pose action with a sub-action slot per tracker role, and an
    /// identity action space for each slot.
    pub fn setup_all_tracker_roles(
        &self,
        input: &Input,
        set: &ActionSet,
    ) -> ProviderResult<Arc<Action>> {
        let roles = Self::all_role_paths();
        let role_refs: Vec<&str> = roles.iter().map(String::as_str).collect();
        let action = input.create_action(
            set,
            ActionKind::Pose,
            TRACKER_POSE_ACTION,
            "Tracker Pose",
            &role_refs,
            None,
        )?;
        input.create_action_spaces(&action, Pose::IDENTITY)?;
        debug!(roles = roles.len(), "tracker role spaces created");
        Ok(action)
    }

    pub fn connected_trackers(&self, input: &Input) -> ProviderResult<Vec<ConnectedTracker>> {
        let runtime = input.runtime();
        let paths = check(
            runtime.enumerate_vive_tracker_paths(),
            "enumerate vive tracker paths",
        )?;
        paths
            .into_iter()
            .map(|tracker| {
                let role_path = if tracker.role == sys::Path::NULL {
                    String::new()
                } else {
                    input.path_to_string(tracker.role)?
                };
                Ok(ConnectedTracker {
                    persistent_path: input.path_to_string(tracker.persistent)?,
                    role_path,
                })
            })
            .collect()
    }
}

impl Extension for ViveTrackerInteraction {
    fn name(&self) -> &'static str {
        HTCX_VIVE_TRACKER_INTERACTION
    }

    fn session(&self) -> Option<sys::Session> {
        Some(self.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_role_paths_cover_every_role() {
        let paths = ViveTrackerInteraction::all_role_paths();
        assert_eq!(paths.len(), TrackerRole::ALL.len());
        assert!(paths.contains(&"/user/vive_tracker_htcx/role/waist".to_string()));
        for path in &paths {
            assert!(TrackerRole::from_user_path(path).is_some());
        }
    }

    #[test]
    fn test_unassigned_tracker_has_no_role() {
        let tracker = ConnectedTracker {
            persistent_path: "/devices/htc/vive_trackerLHR-1".to_string(),
            role_path: String::new(),
        };
        assert_eq!(tracker.role(), None);
    }
}
