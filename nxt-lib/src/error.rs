use std::io;
use thiserror::Error;

use crate::telegram::StatusCode;

/// The primary error type for the `nxt-lib` library.
#[derive(Error, Debug)]
pub enum NxtError {
    #[error("connection is not open")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("timeout during serial exchange: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("truncated reply: got {len} bytes, need at least 3")]
    TruncatedReply { len: usize },

    #[error("reply marker mismatch: expected 0x02, got {found:#04x}")]
    ReplyMarker { found: u8 },

    #[error("reply opcode mismatch: sent {sent:#04x}, device echoed {echoed:#04x}")]
    OpcodeEcho { sent: u8, echoed: u8 },

    #[error("command {opcode:#04x} failed: {status}")]
    CommandFailed { opcode: u8, status: StatusCode },

    #[error("invalid reply: {0}")]
    InvalidReply(String),

    #[error("name {name:?} is longer than {max} characters or not ASCII")]
    InvalidName { name: String, max: usize },

    #[error("mailbox message is {len} bytes, limit is {max}")]
    MessageTooLong { len: usize, max: usize },

    #[error("low-speed payload is {len} bytes, limit is {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("{what} {value} out of range {min}..={max}")]
    OutOfRange {
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("port echo mismatch: requested {requested}, device answered for {answered}")]
    PortEchoMismatch { requested: u8, answered: u8 },

    #[error("handle echo mismatch: requested {requested}, device answered {answered}")]
    HandleEchoMismatch { requested: u8, answered: u8 },

    #[error("module echo mismatch: requested {requested:#010x}, device answered {answered:#010x}")]
    ModuleEchoMismatch { requested: u32, answered: u32 },

    #[error("command is only valid over USB, which this crate does not implement")]
    UsbOnly,
}

impl NxtError {
    /// Status carried by a failed command, if this is a device-reported fault.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            NxtError::CommandFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}
