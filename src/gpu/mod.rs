mod gib;
mod pool;

pub use gib::Gib;
pub use pool::{DEFAULT_REQUIRED_MEMORY_GIB, DeviceState, GpuPool, Lease, LeaseId};
