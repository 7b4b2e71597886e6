//! Drives one provider session: init, bindings, frame loop, orderly exit.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use xr_provider::sim::SimLoader;
use xr_provider::{
    sys, Action, ActionKind, BaseController, Component, FrameOptions, Hand, Input, Pose, Provider,
    ProviderConfig, Qualifier, ReferenceSpaceKind, XrLoader,
};
use xr_provider_openxr::OpenXrLoader;

const IDLE_POLL: Duration = Duration::from_millis(10);
const HAPTIC_PULSE: Duration = Duration::from_millis(20);
const HAND_PATHS: [&str; 2] = ["/user/hand/left", "/user/hand/right"];

#[derive(Parser, Debug)]
#[command(name = "xr-provider")]
#[command(about = "Run an XR session against the system runtime or the in-process one")]
struct Args {
    /// Use the in-process runtime instead of the OpenXR loader
    #[arg(long)]
    simulated: bool,

    /// JSON file with instance and session settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter; falls back to RUST_LOG, then "info"
    #[arg(long, env = "XR_PROVIDER_LOG")]
    log_level: Option<String>,

    /// Frames to render before requesting exit
    #[arg(long, default_value_t = 300)]
    frames: u64,

    /// Overrides the configured reference space
    #[arg(long, value_enum)]
    space: Option<SpaceArg>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SpaceArg {
    View,
    Local,
    Stage,
}

impl From<SpaceArg> for ReferenceSpaceKind {
    fn from(space: SpaceArg) -> Self {
        match space {
            SpaceArg::View => ReferenceSpaceKind::View,
            SpaceArg::Local => ReferenceSpaceKind::Local,
            SpaceArg::Stage => ReferenceSpaceKind::Stage,
        }
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Actions the loop samples each frame.
struct DemoActions {
    trigger: Arc<Action>,
    grip: Arc<Action>,
    haptic: Arc<Action>,
}

fn setup_input(input: &Input) -> Result<DemoActions> {
    let set = input.create_action_set("main", "Main", 0)?;
    let trigger = input.create_action(
        &set,
        ActionKind::Float,
        "trigger",
        "Trigger",
        &HAND_PATHS,
        None,
    )?;
    let grip = input.create_action(&set, ActionKind::Pose, "grip", "Grip", &HAND_PATHS, None)?;
    let haptic = input.create_action(
        &set,
        ActionKind::Haptic,
        "haptic",
        "Haptic",
        &HAND_PATHS,
        None,
    )?;

    let mut controller = BaseController::default();
    for hand in Hand::BOTH {
        input.add_binding(&mut controller, &trigger, hand, Component::Trigger, Qualifier::Value)?;
        input.add_binding(&mut controller, &grip, hand, Component::GripPose, Qualifier::None)?;
        input.add_binding(&mut controller, &haptic, hand, Component::Haptic, Qualifier::Haptic)?;
    }
    input.suggest_bindings(&controller)?;

    input.attach_action_sets_to_session(&[Arc::clone(&set)])?;
    input.add_actionset_for_sync(&set, None)?;
    input.create_action_spaces(&grip, Pose::IDENTITY)?;
    Ok(DemoActions {
        trigger,
        grip,
        haptic,
    })
}

fn load_config(args: &Args) -> Result<ProviderConfig> {
    let mut config = match &args.config {
        Some(path) => ProviderConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => ProviderConfig::default(),
    };
    if let Some(space) = args.space {
        config.session.reference_space = space.into();
    }
    Ok(config)
}

fn run(args: &Args, config: &ProviderConfig) -> Result<()> {
    let loader: Box<dyn XrLoader> = if args.simulated {
        Box::new(SimLoader::default())
    } else {
        Box::new(OpenXrLoader::new()?)
    };

    let mut provider = Provider::new();
    provider.init(loader.as_ref(), &config.instance)?;
    let runtime = provider.runtime_properties()?;
    info!(
        "runtime {} {} on {}",
        runtime.runtime_name,
        runtime.runtime_version,
        provider.system_properties()?.system_name
    );

    provider.create_session(&config.session)?;
    let actions = setup_input(provider.input()?)?;
    let options = FrameOptions {
        blend_mode: config.session.blend_mode.to_sys(),
        ..FrameOptions::default()
    };

    let mut rendered = 0u64;
    let mut exit_requested = false;
    loop {
        provider.poll_events()?;
        let session = provider.session_mut()?;
        if session.is_exiting() {
            break;
        }
        if session.should_begin() {
            session.begin(config.session.view_configuration.to_sys())?;
            if session.swapchains().is_empty() {
                session.create_swapchains(&config.session)?;
            }
            info!(
                swapchains = session.swapchains().len(),
                color = session.color_format(),
                depth = session.depth_format(),
                "session running"
            );
        }
        if session.should_end() {
            session.end()?;
            continue;
        }
        if !session.is_running() {
            thread::sleep(IDLE_POLL);
            continue;
        }

        let input = Arc::clone(provider.input()?);
        input.dispatch()?;
        let report = provider
            .session_mut()?
            .render_frame_with_layers(&[], &options)?;
        if let Some(err) = report.render_error {
            warn!("frame {rendered} skipped its projection layer: {err}");
        }
        rendered += 1;

        if rendered % 90 == 0 {
            input.collect()?;
            let time = report.frame_state.predicted_display_time;
            for (index, hand) in HAND_PATHS.iter().enumerate() {
                let trigger = actions.trigger.state(index).and_then(|s| s.as_float());
                let grip = input.get_action_pose(&actions.grip, index, time).ok();
                debug!(hand, ?trigger, grip = ?grip.map(|g| g.pose.position), "input sample");
                if trigger.is_some_and(|v| v > 0.5) {
                    input.generate_haptic(
                        &actions.haptic,
                        sys::Duration::from_nanos(HAPTIC_PULSE.as_nanos() as i64),
                        0.5,
                        0.0,
                        Some(index),
                    )?;
                }
            }
        }

        if rendered >= args.frames && !exit_requested {
            info!("{rendered} frames rendered, requesting exit");
            provider.session()?.request_exit()?;
            exit_requested = true;
        }
    }

    provider.input()?.collect()?;
    provider.destroy_session();
    info!("{rendered} frames rendered");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    let config = load_config(&args)?;
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    run(&args, &config)
}
