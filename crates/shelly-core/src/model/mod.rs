// ── Domain model ──

mod device;
mod result;

pub use device::{Device, DeviceGeneration, DiscoveryMethod, MacAddr};
pub use result::{ErrorKind, GroupResult, OperationResult, Warning};
