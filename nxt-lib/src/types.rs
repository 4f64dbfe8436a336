//! Wire-level enums and the typed records parsed out of replies.
//!
//! Multi-field replies arrive as fixed little-endian layouts; each gets a
//! zerocopy raw view plus a plain owned record for callers.

use std::fmt;

use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use zerocopy::byteorder::little_endian::{I16, I32, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::codec;

/// Motor ports on the brick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoPrimitive, TryFromPrimitive)]
#[derive(Serialize, Deserialize)]
#[repr(u8)]
pub enum OutputPort {
    A = 0,
    B = 1,
    C = 2,
}

/// Sensor ports on the brick. Numbered 1–4 on the case, 0–3 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[derive(Serialize, Deserialize)]
#[repr(u8)]
pub enum SensorPort {
    S1 = 0,
    S2 = 1,
    S3 = 2,
    S4 = 3,
}

impl fmt::Display for SensorPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self) + 1)
    }
}

/// Sensor types understood by the brick firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[derive(Serialize, Deserialize)]
#[repr(u8)]
pub enum SensorType {
    NoSensor = 0x00,
    Switch = 0x01,
    Temperature = 0x02,
    Reflection = 0x03,
    Angle = 0x04,
    LightActive = 0x05,
    LightInactive = 0x06,
    SoundDb = 0x07,
    SoundDba = 0x08,
    Custom = 0x09,
    LowSpeed = 0x0A,
    LowSpeed9V = 0x0B,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Sensor modes: how the firmware derives the scaled value. The mode lives in
/// the upper three bits of the mode byte; the lower five hold the slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[derive(Serialize, Deserialize)]
#[repr(u8)]
pub enum SensorMode {
    Raw = 0x00,
    Boolean = 0x20,
    TransitionCount = 0x40,
    PeriodCounter = 0x60,
    PctFullScale = 0x80,
    Celsius = 0xA0,
    Fahrenheit = 0xC0,
    AngleSteps = 0xE0,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Mask selecting the mode bits of the mode byte.
pub const SENSOR_MODE_MASK: u8 = 0xE0;

/// Output mode flag byte of a set-output-state command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMode(u8);

impl OutputMode {
    /// Coast: no flags set.
    pub const IDLE: Self = Self(0);
    pub const MOTOR_ON: Self = Self(0x01);
    pub const BRAKE: Self = Self(0x02);
    pub const REGULATED: Self = Self(0x04);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for OutputMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Regulation applied by the firmware while a motor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[derive(Serialize, Deserialize)]
#[repr(u8)]
pub enum RegulationMode {
    #[num_enum(default)]
    Idle = 0x00,
    MotorSpeed = 0x01,
    MotorSync = 0x02,
}

/// Motor run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[derive(Serialize, Deserialize)]
#[repr(u8)]
pub enum RunState {
    #[num_enum(default)]
    Idle = 0x00,
    RampUp = 0x10,
    Running = 0x20,
    RampDown = 0x40,
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct OutputStateRaw {
    pub port: u8,
    pub power: i8,
    pub mode: u8,
    pub regulation: u8,
    pub turn_ratio: i8,
    pub run_state: u8,
    pub tacho_limit: U32,
    pub tacho_count: I32,
    pub block_tacho_count: I32,
    pub rotation_count: I32,
}

/// Everything the brick reports about one motor port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputState {
    pub power: i8,
    pub mode: OutputMode,
    pub regulation: RegulationMode,
    pub turn_ratio: i8,
    pub run_state: RunState,
    /// Commanded rotation limit in tacho counts; 0 means run forever.
    pub tacho_limit: u32,
    /// Counts since the last motor-position reset.
    pub tacho_count: i32,
    /// Counts relative to the last programmed movement.
    pub block_tacho_count: i32,
    /// Program-lifetime odometer.
    pub rotation_count: i32,
}

impl From<&OutputStateRaw> for OutputState {
    fn from(raw: &OutputStateRaw) -> Self {
        OutputState {
            power: raw.power,
            mode: OutputMode::from_bits(raw.mode),
            regulation: RegulationMode::from_primitive(raw.regulation),
            turn_ratio: raw.turn_ratio,
            run_state: RunState::from_primitive(raw.run_state),
            tacho_limit: raw.tacho_limit.get(),
            tacho_count: raw.tacho_count.get(),
            block_tacho_count: raw.block_tacho_count.get(),
            rotation_count: raw.rotation_count.get(),
        }
    }
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct InputValuesRaw {
    pub port: u8,
    pub valid: u8,
    pub calibrated: u8,
    pub sensor_type: u8,
    pub sensor_mode: u8,
    pub raw: U16,
    pub normalized: U16,
    pub scaled: I16,
    pub calibrated_value: I16,
}

/// One reading of an analog sensor port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputValues {
    /// False while the firmware is still settling after a mode change.
    pub valid: bool,
    pub calibrated: bool,
    pub sensor_type: SensorType,
    pub mode: SensorMode,
    /// Raw 10-bit ADC value.
    pub raw: u16,
    pub normalized: u16,
    /// Mode-dependent value; this is what the derived readings use.
    pub scaled: i16,
    pub calibrated_value: i16,
}

impl From<&InputValuesRaw> for InputValues {
    fn from(raw: &InputValuesRaw) -> Self {
        InputValues {
            valid: raw.valid != 0,
            calibrated: raw.calibrated != 0,
            sensor_type: SensorType::from_primitive(raw.sensor_type),
            mode: SensorMode::from_primitive(raw.sensor_mode & SENSOR_MODE_MASK),
            raw: raw.raw.get(),
            normalized: raw.normalized.get(),
            scaled: raw.scaled.get(),
            calibrated_value: raw.calibrated_value.get(),
        }
    }
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct DeviceInfoRaw {
    pub name: [u8; 15],
    pub bt_address: [u8; 7],
    pub signal_strength: U32,
    pub free_user_flash: U32,
}

/// Identity block of the brick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub bt_address: [u8; 6],
    pub signal_strength: u32,
    pub free_user_flash: u32,
}

impl From<&DeviceInfoRaw> for DeviceInfo {
    fn from(raw: &DeviceInfoRaw) -> Self {
        let [a, b, c, d, e, f, _] = raw.bt_address;
        DeviceInfo {
            name: codec::parse_name(&raw.name),
            bt_address: [a, b, c, d, e, f],
            signal_strength: raw.signal_strength.get(),
            free_user_flash: raw.free_user_flash.get(),
        }
    }
}

impl DeviceInfo {
    pub fn bt_address_string(&self) -> String {
        let a = &self.bt_address;
        format!(
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )
    }
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct FirmwareVersionRaw {
    pub protocol_minor: u8,
    pub protocol_major: u8,
    pub firmware_minor: u8,
    pub firmware_major: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub protocol_major: u8,
    pub protocol_minor: u8,
    pub firmware_major: u8,
    pub firmware_minor: u8,
}

impl From<&FirmwareVersionRaw> for FirmwareVersion {
    fn from(raw: &FirmwareVersionRaw) -> Self {
        FirmwareVersion {
            protocol_major: raw.protocol_major,
            protocol_minor: raw.protocol_minor,
            firmware_major: raw.firmware_major,
            firmware_minor: raw.firmware_minor,
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "firmware {}.{:02}, protocol {}.{}",
            self.firmware_major, self.firmware_minor, self.protocol_major, self.protocol_minor
        )
    }
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct FileInfoRaw {
    pub handle: u8,
    pub name: [u8; 20],
    pub size: U32,
}

/// One entry of a flash-filesystem listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Handle to pass to `find_next` or `close`.
    pub handle: u8,
    pub name: String,
    pub size: u32,
}

impl From<&FileInfoRaw> for FileInfo {
    fn from(raw: &FileInfoRaw) -> Self {
        FileInfo {
            handle: raw.handle,
            name: codec::parse_name(&raw.name),
            size: raw.size.get(),
        }
    }
}

/// Identifier of a firmware module, packed from its PP/TT/CC/FF bytes.
///
/// The packing puts PP in the most significant byte, matching what the
/// firmware actually answers; the reference documentation describes the
/// field order differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub u32);

impl ModuleId {
    pub const fn from_parts(pp: u8, tt: u8, cc: u8, ff: u8) -> Self {
        Self(u32::from_be_bytes([pp, tt, cc, ff]))
    }

    pub const fn parts(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct ModuleInfoRaw {
    pub handle: u8,
    pub name: [u8; 20],
    pub module_id: U32,
    pub module_size: U32,
    pub io_map_size: U16,
}

/// One entry of a firmware module listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub handle: u8,
    pub name: String,
    pub module_id: ModuleId,
    pub module_size: u32,
    pub io_map_size: u16,
}

impl From<&ModuleInfoRaw> for ModuleInfo {
    fn from(raw: &ModuleInfoRaw) -> Self {
        ModuleInfo {
            handle: raw.handle,
            name: codec::parse_name(&raw.name),
            module_id: ModuleId(raw.module_id.get()),
            module_size: raw.module_size.get(),
            io_map_size: raw.io_map_size.get(),
        }
    }
}
