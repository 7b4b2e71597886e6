//! Top-level facade: one instance, at most one session and its input manager.

use std::fmt;
use std::sync::{Arc, Mutex};

use openxr::sys;
use tracing::{debug, info, warn};

use crate::action::lock;
use crate::config::{AppInstanceInfo, SessionConfig};
use crate::error::{call_order, check, ProviderError, ProviderResult};
use crate::extensions::{
    Extension, ExtensionRegistry, INSTANCE_EXTENSIONS, KHR_COMPOSITION_LAYER_DEPTH,
    KHR_VULKAN_ENABLE, KHR_VULKAN_ENABLE2, UNSUPPORTED_GRAPHICS_EXTENSIONS,
};
use crate::input::Input;
use crate::runtime::{
    ApiLayerProperties, ExtensionProperties, RuntimeEvent, RuntimeProperties, SystemProperties,
    XrLoader, XrRuntime,
};
use crate::session::Session;

/// Picks the Vulkan binding extension, preferring `XR_KHR_vulkan_enable2`.
pub fn select_vulkan_extension(supported: &[ExtensionProperties]) -> ProviderResult<&'static str> {
    for candidate in [KHR_VULKAN_ENABLE2, KHR_VULKAN_ENABLE] {
        if supported.iter().any(|ext| ext.name == candidate) {
            return Ok(candidate);
        }
    }
    warn!("runtime offers no Vulkan binding extension");
    Err(ProviderError::Runtime(sys::Result::ERROR_EXTENSION_NOT_PRESENT))
}

/// Drops requested extensions the runtime lacks and graphics bindings this build cannot drive.
pub fn filter_out_unsupported_extensions(
    requested: &[String],
    supported: &[ExtensionProperties],
) -> Vec<String> {
    let mut enabled: Vec<String> = Vec::with_capacity(requested.len());
    for name in requested {
        if UNSUPPORTED_GRAPHICS_EXTENSIONS.contains(&name.as_str()) {
            warn!("extension {name} needs a graphics API this build does not drive, skipping");
        } else if !supported.iter().any(|ext| &ext.name == name) {
            warn!("extension {name} not supported by runtime, skipping");
        } else if !enabled.contains(name) {
            enabled.push(name.clone());
        }
    }
    enabled
}

pub fn filter_out_unsupported_api_layers(
    requested: &[String],
    supported: &[ApiLayerProperties],
) -> Vec<String> {
    let mut enabled: Vec<String> = Vec::with_capacity(requested.len());
    for name in requested {
        if !supported.iter().any(|layer| &layer.name == name) {
            warn!("api layer {name} not available, skipping");
        } else if !enabled.contains(name) {
            enabled.push(name.clone());
        }
    }
    enabled
}

struct InstanceContext {
    runtime: Arc<dyn XrRuntime>,
    system: sys::SystemId,
    enabled_extensions: Vec<String>,
    enabled_api_layers: Vec<String>,
    graphics_extension: &'static str,
    runtime_properties: RuntimeProperties,
    system_properties: SystemProperties,
    registry: Arc<Mutex<ExtensionRegistry>>,
}

pub struct Provider {
    // field order is release order
    input: Option<Arc<Input>>,
    session: Option<Session>,
    instance: Option<InstanceContext>,
}

impl Default for Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider {
    pub fn new() -> Self {
        Self {
            input: None,
            session: None,
            instance: None,
        }
    }

    /// Creates the instance and resolves the head-mounted system.
    pub fn init(&mut self, loader: &dyn XrLoader, info: &AppInstanceInfo) -> ProviderResult<()> {
        if self.instance.is_some() {
            return call_order("provider already initialized");
        }

        let supported = check(loader.enumerate_extensions(), "enumerate instance extensions")?;
        for ext in &supported {
            debug!("runtime extension: {} v{}", ext.name, ext.version);
        }
        let graphics_extension = select_vulkan_extension(&supported)?;
        let mut extensions = filter_out_unsupported_extensions(&info.extensions, &supported);
        if !extensions.iter().any(|name| name == graphics_extension) {
            extensions.insert(0, graphics_extension.to_string());
        }

        let layers = check(loader.enumerate_api_layers(), "enumerate api layers")?;
        for layer in &layers {
            debug!("api layer: {} ({})", layer.name, layer.description);
        }
        let api_layers = filter_out_unsupported_api_layers(&info.api_layers, &layers);

        let runtime: Arc<dyn XrRuntime> = Arc::from(check(
            loader.create_instance(info, &extensions, &api_layers),
            "create instance",
        )?);
        for name in &extensions {
            debug!("enabled extension: {name}");
        }
        for name in &api_layers {
            debug!("enabled api layer: {name}");
        }

        let runtime_properties = check(runtime.instance_properties(), "get instance properties")?;
        info!(
            "runtime: {} {}",
            runtime_properties.runtime_name, runtime_properties.runtime_version
        );
        let system = check(
            runtime.system(sys::FormFactor::HEAD_MOUNTED_DISPLAY),
            "get system",
        )?;
        let system_properties = check(runtime.system_properties(system), "get system properties")?;
        info!(
            system = system.into_raw(),
            vendor = system_properties.vendor_id,
            "system: {}",
            system_properties.system_name
        );

        let mut registry = ExtensionRegistry::new();
        for name in &extensions {
            if INSTANCE_EXTENSIONS.contains(&name.as_str()) {
                registry.add_extension(name, None);
            }
        }

        self.instance = Some(InstanceContext {
            runtime,
            system,
            enabled_extensions: extensions,
            enabled_api_layers: api_layers,
            graphics_extension,
            runtime_properties,
            system_properties,
            registry: Arc::new(Mutex::new(registry)),
        });
        Ok(())
    }

    fn instance(&self) -> ProviderResult<&InstanceContext> {
        match &self.instance {
            Some(instance) => Ok(instance),
            None => call_order("provider not initialized"),
        }
    }

    pub fn check_if_init_called(&self) -> ProviderResult<()> {
        self.instance().map(|_| ())
    }

    pub fn runtime(&self) -> ProviderResult<Arc<dyn XrRuntime>> {
        Ok(Arc::clone(&self.instance()?.runtime))
    }

    pub fn system_id(&self) -> ProviderResult<sys::SystemId> {
        Ok(self.instance()?.system)
    }

    pub fn runtime_properties(&self) -> ProviderResult<&RuntimeProperties> {
        Ok(&self.instance()?.runtime_properties)
    }

    pub fn system_properties(&self) -> ProviderResult<&SystemProperties> {
        Ok(&self.instance()?.system_properties)
    }

    pub fn graphics_extension(&self) -> ProviderResult<&'static str> {
        Ok(self.instance()?.graphics_extension)
    }

    pub fn enabled_extensions(&self) -> &[String] {
        self.instance
            .as_ref()
            .map(|i| i.enabled_extensions.as_slice())
            .unwrap_or(&[])
    }

    pub fn enabled_api_layers(&self) -> &[String] {
        self.instance
            .as_ref()
            .map(|i| i.enabled_api_layers.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_extension_enabled(&self, name: &str) -> bool {
        self.enabled_extensions().iter().any(|e| e == name)
    }

    pub fn is_api_layer_enabled(&self, name: &str) -> bool {
        self.enabled_api_layers().iter().any(|l| l == name)
    }

    pub fn supported_view_configurations(&self) -> ProviderResult<Vec<sys::ViewConfigurationType>> {
        let instance = self.instance()?;
        check(
            instance.runtime.enumerate_view_configurations(instance.system),
            "enumerate view configurations",
        )
    }

    /// Returns the live extension object for `name`, creating it if needed.
    /// Session-level extensions bind to the current session.
    pub fn add_extension(&self, name: &str) -> ProviderResult<Option<Arc<dyn Extension>>> {
        let instance = self.instance()?;
        let session = self.session.as_ref().and_then(|s| s.handle().ok());
        Ok(lock(&instance.registry).add_extension(name, session))
    }

    pub fn extension(&self, name: &str) -> Option<Arc<dyn Extension>> {
        let instance = self.instance.as_ref()?;
        lock(&instance.registry).get(name)
    }

    /// Typed lookup of a live extension object.
    pub fn extension_as<T: Extension + 'static>(&self, name: &str) -> Option<Arc<T>> {
        let instance = self.instance.as_ref()?;
        lock(&instance.registry).get_as::<T>(name)
    }

    pub fn extension_count(&self) -> usize {
        self.instance
            .as_ref()
            .map(|i| lock(&i.registry).len())
            .unwrap_or(0)
    }

    /// Negotiates the graphics device, then creates the session, its spaces
    /// and the input manager bound to it.
    pub fn create_session(&mut self, config: &SessionConfig) -> ProviderResult<()> {
        let instance = self.instance()?;
        if self.session.is_some() {
            return call_order("session already created");
        }

        let graphics = check(
            instance.runtime.negotiate_graphics(instance.system),
            "negotiate graphics device",
        )?;
        debug!(
            queue_family = graphics.queue_family_index,
            queue = graphics.queue_index,
            "graphics device ready"
        );
        let mut session = Session::new(
            Arc::clone(&instance.runtime),
            instance.system,
            instance.enabled_extensions.clone(),
            Arc::clone(&instance.registry),
        );
        session.set_depth_enabled(self.is_extension_enabled(KHR_COMPOSITION_LAYER_DEPTH));
        session.init(
            &graphics,
            config.reference_space.to_sys(),
            config.reference_pose,
        )?;

        let input = Input::new(
            Arc::clone(&instance.runtime),
            session.handle()?,
            session.reference_space()?,
            session.app_space()?,
        );
        self.session = Some(session);
        self.input = Some(Arc::new(input));
        Ok(())
    }

    /// Drops the input manager and the session, in that order.
    pub fn destroy_session(&mut self) {
        if let Some(input) = self.input.take() {
            if let Err(err) = input.collect() {
                warn!("pending input sweep failed during teardown: {err}");
            }
        }
        self.session = None;
    }

    pub fn session(&self) -> ProviderResult<&Session> {
        match &self.session {
            Some(session) => Ok(session),
            None => call_order("no session"),
        }
    }

    pub fn session_mut(&mut self) -> ProviderResult<&mut Session> {
        match &mut self.session {
            Some(session) => Ok(session),
            None => call_order("no session"),
        }
    }

    pub fn input(&self) -> ProviderResult<&Arc<Input>> {
        match &self.input {
            Some(input) => Ok(input),
            None => call_order("no input manager"),
        }
    }

    /// Drains the runtime event queue, applying state changes for the owned session.
    pub fn poll_events(&mut self) -> ProviderResult<Vec<RuntimeEvent>> {
        let runtime = self.runtime()?;
        let mut events = Vec::new();
        while let Some(event) = check(runtime.poll_event(), "poll event")? {
            match event {
                RuntimeEvent::SessionStateChanged { session, state, .. } => {
                    match self.session.as_mut() {
                        Some(owned) if owned.handle().ok() == Some(session) => {
                            let old = owned.set_state(state);
                            info!("session state {old:?} -> {state:?}");
                        }
                        _ => debug!(session = ?session, "state change for unknown session"),
                    }
                }
                RuntimeEvent::EventsLost { count } => warn!("{count} runtime events lost"),
                RuntimeEvent::InstanceLossPending { loss_time } => {
                    warn!("instance loss pending at {}", loss_time.as_nanos())
                }
                RuntimeEvent::InteractionProfileChanged { .. } => {
                    debug!("interaction profile changed")
                }
                RuntimeEvent::ReferenceSpaceChangePending {
                    reference_space_type,
                    ..
                } => debug!(space = ?reference_space_type, "reference space change pending"),
                RuntimeEvent::Other(ty) => debug!(ty = ?ty, "unhandled runtime event"),
            }
            events.push(event);
        }
        Ok(events)
    }
}

impl Drop for Provider {
    fn drop(&mut self) {
        self.destroy_session();
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("initialized", &self.instance.is_some())
            .field("extensions", &self.enabled_extensions())
            .field("session", &self.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::{HandTracking, EXT_EYE_GAZE_INTERACTION, EXT_HAND_TRACKING};
    use crate::sim::{SimConfig, SimLoader, SimRuntime};

    fn names(list: &[&str]) -> Vec<ExtensionProperties> {
        list.iter()
            .map(|name| ExtensionProperties {
                name: name.to_string(),
                version: 1,
            })
            .collect()
    }

    #[test]
    fn test_vulkan_extension_preference() {
        assert_eq!(
            select_vulkan_extension(&names(&[KHR_VULKAN_ENABLE, KHR_VULKAN_ENABLE2])).unwrap(),
            KHR_VULKAN_ENABLE2
        );
        assert_eq!(
            select_vulkan_extension(&names(&[KHR_VULKAN_ENABLE])).unwrap(),
            KHR_VULKAN_ENABLE
        );
        assert_eq!(
            select_vulkan_extension(&names(&["XR_KHR_opengl_enable"]))
                .unwrap_err()
                .code(),
            sys::Result::ERROR_EXTENSION_NOT_PRESENT
        );
    }

    #[test]
    fn test_filter_drops_unknown_and_foreign_graphics() {
        let supported = names(&[EXT_HAND_TRACKING, "XR_KHR_D3D11_enable"]);
        let requested = vec![
            EXT_HAND_TRACKING.to_string(),
            "XR_KHR_D3D11_enable".to_string(),
            "XR_VENDOR_missing".to_string(),
            EXT_HAND_TRACKING.to_string(),
        ];
        assert_eq!(
            filter_out_unsupported_extensions(&requested, &supported),
            vec![EXT_HAND_TRACKING.to_string()]
        );
    }

    #[test]
    fn test_filter_api_layers() {
        let supported = vec![ApiLayerProperties {
            name: "XR_APILAYER_LUNARG_core_validation".to_string(),
            spec_version: sys::Version::new(1, 0, 0),
            layer_version: 1,
            description: String::new(),
        }];
        let requested = vec![
            "XR_APILAYER_LUNARG_core_validation".to_string(),
            "XR_APILAYER_missing".to_string(),
        ];
        assert_eq!(
            filter_out_unsupported_api_layers(&requested, &supported),
            vec!["XR_APILAYER_LUNARG_core_validation".to_string()]
        );
    }

    #[test]
    fn test_uninitialized_provider_is_call_order() {
        let mut provider = Provider::new();
        assert_eq!(
            provider.check_if_init_called().unwrap_err().code(),
            sys::Result::ERROR_CALL_ORDER_INVALID
        );
        assert!(provider.create_session(&SessionConfig::default()).is_err());
        assert!(provider.session().is_err());
        assert!(provider.input().is_err());
        assert!(!provider.is_extension_enabled(EXT_HAND_TRACKING));
    }

    #[test]
    fn test_init_enables_graphics_and_instance_extensions() {
        let loader = SimLoader::default();
        let mut provider = Provider::new();
        provider.init(&loader, &AppInstanceInfo::default()).unwrap();
        assert_eq!(provider.graphics_extension().unwrap(), KHR_VULKAN_ENABLE2);
        assert!(provider.is_extension_enabled(KHR_VULKAN_ENABLE2));
        assert!(provider.extension(EXT_EYE_GAZE_INTERACTION).is_some());
        assert!(provider.extension(EXT_HAND_TRACKING).is_none());
        assert_eq!(
            provider.init(&loader, &AppInstanceInfo::default()).unwrap_err(),
            ProviderError::CallOrder("provider already initialized")
        );
    }

    #[test]
    fn test_init_without_vulkan_fails() {
        let config = SimConfig {
            extensions: vec![EXT_HAND_TRACKING.to_string()],
            ..SimConfig::default()
        };
        let loader = SimLoader::new(SimRuntime::new(config));
        let mut provider = Provider::new();
        let err = provider.init(&loader, &AppInstanceInfo::default()).unwrap_err();
        assert_eq!(err.code(), sys::Result::ERROR_EXTENSION_NOT_PRESENT);
        assert_eq!(loader.runtime().call_count("create_instance"), 0);
    }

    #[test]
    fn test_poll_events_tracks_session_state() {
        let loader = SimLoader::default();
        let mut provider = Provider::new();
        provider.init(&loader, &AppInstanceInfo::default()).unwrap();
        provider.create_session(&SessionConfig::default()).unwrap();
        let events = provider.poll_events().unwrap();
        assert_eq!(events.len(), 2);
        assert!(provider.session().unwrap().should_begin());

        loader.runtime().push_event(RuntimeEvent::EventsLost { count: 3 });
        assert_eq!(provider.poll_events().unwrap().len(), 1);
    }

    #[test]
    fn test_recreated_session_gets_fresh_extensions() {
        let loader = SimLoader::default();
        let mut provider = Provider::new();
        provider.init(&loader, &AppInstanceInfo::default()).unwrap();

        provider.create_session(&SessionConfig::default()).unwrap();
        let first = provider.session().unwrap().handle().unwrap();
        provider.destroy_session();
        assert!(provider.extension(EXT_HAND_TRACKING).is_none());
        assert!(provider.extension(EXT_EYE_GAZE_INTERACTION).is_some());

        provider.create_session(&SessionConfig::default()).unwrap();
        let second = provider.session().unwrap().handle().unwrap();
        assert_ne!(first, second);
        let hands = provider
            .extension_as::<HandTracking>(EXT_HAND_TRACKING)
            .unwrap();
        assert_eq!(hands.session(), Some(second));
    }

    #[test]
    fn test_drop_releases_session_resources() {
        let loader = SimLoader::default();
        let sim = loader.runtime();
        {
            let mut provider = Provider::new();
            provider.init(&loader, &AppInstanceInfo::default()).unwrap();
            provider.create_session(&SessionConfig::default()).unwrap();
            assert_eq!(sim.live_spaces(), 2);
        }
        assert_eq!(sim.live_spaces(), 0);
        assert!(!sim.has_session());
    }
}
