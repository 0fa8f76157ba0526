//! Shared wiring for command handlers.
//!
//! Builds the core subsystems in their required order (catalogue,
//! registry, discovery, engine, executor) from the loaded settings. The
//! registry and catalogue are plain values handed to every subsystem --
//! no globals.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use shelly_api::TransportConfig;
use shelly_config::Settings;
use shelly_core::catalog::{CapabilityScanner, DeviceTypes};
use shelly_core::groups::GroupExecutor;
use shelly_core::{
    CapabilityCatalog, Device, DeviceRegistry, DiscoveryService, GroupManager, MacAddr,
    ParameterEngine,
};

use crate::error::CliError;

pub struct AppContext {
    pub settings: Settings,
    pub catalog: Arc<CapabilityCatalog>,
    pub registry: Arc<DeviceRegistry>,
    pub engine: Arc<ParameterEngine>,
    pub groups: Arc<GroupManager>,
    pub device_types: DeviceTypes,
    transport: TransportConfig,
}

impl AppContext {
    pub fn init(config_file: Option<&Path>) -> Result<Self, CliError> {
        let settings = Settings::load(config_file)?;
        let transport = TransportConfig {
            timeout: Duration::from_secs(settings.transport.timeout_secs),
            ..TransportConfig::default()
        };

        let catalog = Arc::new(CapabilityCatalog::load(
            settings.capabilities_dir(),
            settings.parameter_mappings_file(),
        )?);
        let device_types = DeviceTypes::load_or_create(&settings.device_types_file())?;

        let registry = Arc::new(DeviceRegistry::new(settings.devices_dir())?);
        registry.load_all()?;

        let engine = Arc::new(ParameterEngine::new(
            &transport,
            Arc::clone(&catalog),
            Arc::clone(&registry),
            Duration::from_secs(settings.executor.reboot_grace_secs),
        )?);

        let groups = Arc::new(GroupManager::new(settings.groups_dir())?);

        Ok(Self {
            settings,
            catalog,
            registry,
            engine,
            groups,
            device_types,
            transport,
        })
    }

    pub fn discovery(&self) -> Result<DiscoveryService, CliError> {
        Ok(DiscoveryService::new(
            Arc::clone(&self.registry),
            self.device_types.clone(),
            self.settings.discovery.clone(),
            &self.transport,
        )?)
    }

    pub fn executor(&self) -> GroupExecutor {
        GroupExecutor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.engine),
            Arc::clone(&self.groups),
            self.settings.executor.concurrency,
            self.settings.executor.destructive_verbs.iter().cloned(),
        )
    }

    pub fn scanner(&self) -> Result<CapabilityScanner, CliError> {
        Ok(CapabilityScanner::new(&self.transport)?)
    }

    /// Resolve a user-supplied device identifier to a registry record.
    pub fn resolve_device(&self, id: &str) -> Result<Arc<Device>, CliError> {
        let mac = MacAddr::new(id);
        self.registry
            .get(&mac)
            .ok_or(CliError::UnknownDevice { id: id.to_string() })
    }
}
