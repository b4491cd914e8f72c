#![cfg_attr(not(test), no_std)]

pub mod channel;
pub mod codec;
pub mod controller;
pub mod error;
pub mod hal;
pub mod telemetry;

pub use codec::{Classification, Command, ReverseFrameStatus};
pub use controller::{Controller, ControllerConfig, WireSpeed};
pub use error::Error;
pub use hal::{DshotHal, HalError, SmConfig};
pub use telemetry::{TelemetryKind, TelemetryObserver};
