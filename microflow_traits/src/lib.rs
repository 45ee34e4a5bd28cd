//! Seams between the simulated devices and the outside world: time,
//! randomness, event logging, and the device capability itself.
pub mod clock;
pub mod device;
pub mod events;
pub mod random;

pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use device::{Device, DeviceState};
pub use events::{EventLevel, EventLog, LoggedEvent, MemoryLog, NullLog, SharedLog};
pub use random::{FixedRandom, RandomSource, ScriptedRandom};
