//! Device fleet control plane for Shelly smart devices.
//!
//! This crate is the core behind the `shellyctl` CLI and the HTTP service.
//! It owns:
//!
//! - **Discovery** ([`discovery`]) -- finds devices via mDNS and/or active
//!   HTTP probing of IP ranges, classifies the hardware generation, and
//!   feeds the registry.
//! - **Capability catalogue** ([`catalog`]) -- per-model definitions of
//!   which APIs and parameters a device supports, cached as YAML and
//!   rebuildable by probing a live device.
//! - **Device registry** ([`registry`]) -- the durable set of known
//!   devices, keyed by MAC, persisted one file per device.
//! - **Parameter/operation engine** ([`engine`]) -- translates a logical
//!   parameter or control verb into the concrete wire call for the
//!   device's generation, with JSON-path navigation and type coercion.
//! - **Group executor** ([`groups`]) -- resolves a named group (or the
//!   implicit `all-devices` set) and fans a request out concurrently with
//!   per-device success/failure accounting.
//!
//! The registry and catalogue are the only process-wide mutable state and
//! are explicit values handed to every subsystem. Initialization order:
//! catalogue, registry, discovery, engine, executor.
//!
//! Front-ends stay thin: this crate returns domain objects and never
//! parses flags or renders output.

pub mod catalog;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod groups;
pub mod model;
pub mod registry;

pub use catalog::{CapabilityCatalog, CapabilityDefinition, ParameterDescriptor, ParameterMapping};
pub use discovery::DiscoveryService;
pub use engine::{OperateOptions, ParameterEngine, SetOptions};
pub use error::CoreError;
pub use groups::{Group, GroupExecutor, GroupManager, GroupRequest, ALL_DEVICES};
pub use model::{
    Device, DeviceGeneration, DiscoveryMethod, ErrorKind, GroupResult, MacAddr, OperationResult,
};
pub use registry::DeviceRegistry;
