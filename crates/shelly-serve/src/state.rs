use std::sync::Arc;

use shelly_core::groups::GroupExecutor;
use shelly_core::{CapabilityCatalog, DeviceRegistry, DiscoveryService, GroupManager, ParameterEngine};

/// Shared handles for all route handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CapabilityCatalog>,
    pub registry: Arc<DeviceRegistry>,
    pub engine: Arc<ParameterEngine>,
    pub groups: Arc<GroupManager>,
    pub executor: Arc<GroupExecutor>,
    pub discovery: Arc<DiscoveryService>,
}
