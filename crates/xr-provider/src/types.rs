use glam::{Quat, Vec2, Vec3};
use openxr::sys;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const BOTH: [Hand; 2] = [Hand::Left, Hand::Right];

    pub fn user_path(self) -> &'static str {
        match self {
            Hand::Left => "/user/hand/left",
            Hand::Right => "/user/hand/right",
        }
    }
}

/// Runtime type tag an action is created with. Never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Boolean,
    Float,
    Vector2f,
    Pose,
    Haptic,
}

impl ActionKind {
    pub fn to_sys(self) -> sys::ActionType {
        match self {
            ActionKind::Boolean => sys::ActionType::BOOLEAN_INPUT,
            ActionKind::Float => sys::ActionType::FLOAT_INPUT,
            ActionKind::Vector2f => sys::ActionType::VECTOR2F_INPUT,
            ActionKind::Pose => sys::ActionType::POSE_INPUT,
            ActionKind::Haptic => sys::ActionType::VIBRATION_OUTPUT,
        }
    }

    /// Output actions have no state to query.
    pub fn is_input(self) -> bool {
        !matches!(self, ActionKind::Haptic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSample<T> {
    pub current: T,
    pub changed_since_last_sync: bool,
    pub last_change_time: sys::Time,
    pub is_active: bool,
}

impl<T: Default> Default for InputSample<T> {
    fn default() -> Self {
        Self {
            current: T::default(),
            changed_since_last_sync: false,
            last_change_time: sys::Time::from_nanos(0),
            is_active: false,
        }
    }
}

/// Last-synced hardware state of one sub-action path. The variant always
/// matches the owning action's [`ActionKind`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionState {
    Boolean(InputSample<bool>),
    Float(InputSample<f32>),
    Vector2f(InputSample<Vec2>),
    Pose { is_active: bool },
    Haptic,
}

impl ActionState {
    pub fn empty(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Boolean => ActionState::Boolean(InputSample::default()),
            ActionKind::Float => ActionState::Float(InputSample::default()),
            ActionKind::Vector2f => ActionState::Vector2f(InputSample::default()),
            ActionKind::Pose => ActionState::Pose { is_active: false },
            ActionKind::Haptic => ActionState::Haptic,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            ActionState::Boolean(_) => ActionKind::Boolean,
            ActionState::Float(_) => ActionKind::Float,
            ActionState::Vector2f(_) => ActionKind::Vector2f,
            ActionState::Pose { .. } => ActionKind::Pose,
            ActionState::Haptic => ActionKind::Haptic,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            ActionState::Boolean(s) => s.is_active,
            ActionState::Float(s) => s.is_active,
            ActionState::Vector2f(s) => s.is_active,
            ActionState::Pose { is_active } => *is_active,
            ActionState::Haptic => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ActionState::Boolean(s) => Some(s.current),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            ActionState::Float(s) => Some(s.current),
            _ => None,
        }
    }

    pub fn as_vector2f(&self) -> Option<Vec2> {
        match self {
            ActionState::Vector2f(s) => Some(s.current),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    pub fn to_sys(self) -> sys::Posef {
        sys::Posef {
            orientation: sys::Quaternionf {
                x: self.orientation.x,
                y: self.orientation.y,
                z: self.orientation.z,
                w: self.orientation.w,
            },
            position: sys::Vector3f {
                x: self.position.x,
                y: self.position.y,
                z: self.position.z,
            },
        }
    }

    pub fn from_sys(pose: sys::Posef) -> Self {
        Self {
            position: Vec3::new(pose.position.x, pose.position.y, pose.position.z),
            orientation: Quat::from_xyzw(
                pose.orientation.x,
                pose.orientation.y,
                pose.orientation.z,
                pose.orientation.w,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceSpaceKind {
    View,
    Local,
    Stage,
}

impl ReferenceSpaceKind {
    pub fn to_sys(self) -> sys::ReferenceSpaceType {
        match self {
            ReferenceSpaceKind::View => sys::ReferenceSpaceType::VIEW,
            ReferenceSpaceKind::Local => sys::ReferenceSpaceType::LOCAL,
            ReferenceSpaceKind::Stage => sys::ReferenceSpaceType::STAGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewConfiguration {
    PrimaryMono,
    PrimaryStereo,
}

impl ViewConfiguration {
    pub fn to_sys(self) -> sys::ViewConfigurationType {
        match self {
            ViewConfiguration::PrimaryMono => sys::ViewConfigurationType::PRIMARY_MONO,
            ViewConfiguration::PrimaryStereo => sys::ViewConfigurationType::PRIMARY_STEREO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    Opaque,
    Additive,
    AlphaBlend,
}

impl BlendMode {
    pub fn to_sys(self) -> sys::EnvironmentBlendMode {
        match self {
            BlendMode::Opaque => sys::EnvironmentBlendMode::OPAQUE,
            BlendMode::Additive => sys::EnvironmentBlendMode::ADDITIVE,
            BlendMode::AlphaBlend => sys::EnvironmentBlendMode::ALPHA_BLEND,
        }
    }
}
