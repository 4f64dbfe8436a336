//! Talk to a LEGO Mindstorms NXT brick over a serial byte stream.
//!
//! The crate layers four pieces: telegram framing over a [`Transport`],
//! the full command catalog on [`Connection`], stateful device handles
//! ([`Brick`], [`Motor`], [`MotorPair`], [`Sensor`]), and a polling engine
//! that turns consecutive readings into edge notifications.

pub mod brick;
mod codec;
pub mod connection;
pub mod constants;
pub mod error;
pub mod motor;
mod poll;
mod protocol;
pub mod sensor;
pub mod telegram;
pub mod types;

pub use brick::Brick;
pub use connection::{Connection, SharedConnection, Transport};
pub use error::NxtError;
pub use motor::{Motor, MotorPair};
pub use sensor::{Sensor, SensorEvent, SensorKind};
pub use telegram::StatusCode;
pub use types::{
    DeviceInfo, FileInfo, FirmwareVersion, InputValues, ModuleId, ModuleInfo, OutputMode,
    OutputPort, OutputState, RegulationMode, RunState, SensorMode, SensorPort, SensorType,
};
