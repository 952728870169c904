//! Sampling and broadcast services
//!
//! The device handle, the loop that samples it, the broadcaster that fans
//! snapshots out, and the controller that wires them together.

pub mod broadcaster;
pub mod device_handle;
pub mod lifecycle;
pub mod sampler;

pub use broadcaster::{Broadcaster, SubscriberId, Subscription};
pub use device_handle::{DeviceHandle, HandleState};
pub use lifecycle::{LifecycleController, Mode};
pub use sampler::{SamplerConfig, SamplingLoop};
