#![forbid(unsafe_code)]

//! Session, frame and input management over an XR runtime.
//!
//! The runtime is reached only through [`XrLoader`] and [`XrRuntime`]; the
//! in-process [`sim`] runtime implements both for headless runs.

pub mod action;
pub mod config;
pub mod controllers;
pub mod error;
pub mod extensions;
pub mod handle;
pub mod input;
pub mod provider;
pub mod runtime;
pub mod session;
pub mod sim;
pub mod types;

pub use action::{Action, ActionCallback, ActionSet};
pub use config::{AppInstanceInfo, ProviderConfig, SessionConfig};
pub use controllers::{
    BaseController, Component, Controller, ProfileController, Qualifier, TrackerRole, ViveTracker,
};
pub use error::{ProviderError, ProviderResult};
pub use extensions::{Extension, ExtensionRegistry};
pub use handle::Owned;
pub use input::Input;
pub use provider::Provider;
pub use runtime::{CompositionLayer, RuntimeEvent, XrLoader, XrResult, XrRuntime};
pub use session::{FrameOptions, FrameReport, FrameViews, Session, Swapchain};
pub use types::{
    ActionKind, ActionState, BlendMode, Hand, Pose, ReferenceSpaceKind, ViewConfiguration,
};

pub use openxr::sys;
