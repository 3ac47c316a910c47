//! The driver boundary: a narrow io-control device abstraction, the event
//! handles the driver signals, the concrete Linux device and the mocked
//! device used by every core test.

mod device;
mod event;
#[cfg(unix)]
mod linux;
mod mocked_device;

pub use device::{Device, RingMemory};
pub use event::{EventHandles, ProbeEvent};
#[cfg(unix)]
pub use linux::LinuxDevice;
pub use mocked_device::{FakeRingBuffer, IoctlExpectation, MockedDevice, MockedDeviceCommands};
