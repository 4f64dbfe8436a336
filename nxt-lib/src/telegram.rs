//! Telegram framing: the byte layout every command and reply shares.
//!
//! A telegram is `[type, opcode, payload...]`, sent over the transport behind
//! a 2-byte little-endian length prefix. The type byte selects the opcode
//! space (direct commands live at 0x00–0x13, system commands at 0x80 and
//! above) and carries the 0x80 "no reply" flag. Replies always start with
//! `[0x02, echoed opcode, status]`.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::codec;
use crate::constants::{
    DIRECT_TELEGRAM, NO_REPLY_FLAG, REPLY_TELEGRAM, STATUS_SUCCESS, SYSTEM_TELEGRAM,
};
use crate::error::NxtError;

/// Direct command opcodes (real-time control space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum DirectOpcode {
    StartProgram = 0x00,
    StopProgram = 0x01,
    PlaySoundFile = 0x02,
    PlayTone = 0x03,
    SetOutputState = 0x04,
    SetInputMode = 0x05,
    GetOutputState = 0x06,
    GetInputValues = 0x07,
    ResetInputScaledValue = 0x08,
    MessageWrite = 0x09,
    ResetMotorPosition = 0x0A,
    GetBatteryLevel = 0x0B,
    StopSoundPlayback = 0x0C,
    KeepAlive = 0x0D,
    LsGetStatus = 0x0E,
    LsWrite = 0x0F,
    LsRead = 0x10,
    GetCurrentProgramName = 0x11,
    MessageRead = 0x13,
}

/// System command opcodes (device management space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum SystemOpcode {
    OpenRead = 0x80,
    OpenWrite = 0x81,
    Read = 0x82,
    Write = 0x83,
    Close = 0x84,
    Delete = 0x85,
    FindFirst = 0x86,
    FindNext = 0x87,
    GetFirmwareVersion = 0x88,
    OpenWriteLinear = 0x89,
    OpenWriteData = 0x8B,
    OpenAppendData = 0x8C,
    RequestFirstModule = 0x90,
    RequestNextModule = 0x91,
    CloseModuleHandle = 0x92,
    ReadIoMap = 0x94,
    WriteIoMap = 0x95,
    Boot = 0x97,
    SetBrickName = 0x98,
    GetDeviceInfo = 0x9B,
    DeleteUserFlash = 0xA0,
    BluetoothFactoryReset = 0xA4,
}

/// Status byte reported by the brick in every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[derive(serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum StatusCode {
    Success = 0x00,
    PendingCommunication = 0x20,
    MailboxEmpty = 0x40,
    NoMoreHandles = 0x81,
    NoSpace = 0x82,
    NoMoreFiles = 0x83,
    EndOfFileExpected = 0x84,
    EndOfFile = 0x85,
    NotLinearFile = 0x86,
    FileNotFound = 0x87,
    HandleAlreadyClosed = 0x88,
    NoLinearSpace = 0x89,
    UndefinedError = 0x8A,
    FileBusy = 0x8B,
    NoWriteBuffers = 0x8C,
    AppendNotPossible = 0x8D,
    FileFull = 0x8E,
    FileExists = 0x8F,
    ModuleNotFound = 0x90,
    OutOfBoundary = 0x91,
    IllegalFileName = 0x92,
    IllegalHandle = 0x93,
    RequestFailed = 0xBD,
    UnknownCommand = 0xBE,
    InsanePacket = 0xBF,
    OutOfRangeData = 0xC0,
    CommunicationBusError = 0xDD,
    BufferFull = 0xDE,
    InvalidChannel = 0xDF,
    ChannelBusy = 0xE0,
    NoActiveProgram = 0xEC,
    IllegalSize = 0xED,
    IllegalMailboxQueue = 0xEE,
    InvalidFieldAccess = 0xEF,
    BadInputOutput = 0xF0,
    InsufficientMemory = 0xFB,
    BadArguments = 0xFF,

    #[num_enum(catch_all)]
    Unknown(u8) = 0x01,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:#04x})", self, u8::from(*self))
    }
}

/// An outbound command telegram under construction.
#[derive(Debug, Clone)]
pub(crate) struct Telegram {
    buf: BytesMut,
}

impl Telegram {
    pub fn direct(opcode: DirectOpcode, want_reply: bool) -> Self {
        Self::with_type(DIRECT_TELEGRAM, opcode.into(), want_reply)
    }

    pub fn system(opcode: SystemOpcode, want_reply: bool) -> Self {
        Self::with_type(SYSTEM_TELEGRAM, opcode.into(), want_reply)
    }

    fn with_type(telegram_type: u8, opcode: u8, want_reply: bool) -> Self {
        let mut buf = BytesMut::with_capacity(32);
        let flag = if want_reply { 0 } else { NO_REPLY_FLAG };
        buf.put_u8(telegram_type | flag);
        buf.put_u8(opcode);
        Self { buf }
    }

    pub fn opcode(&self) -> u8 {
        self.buf[1]
    }

    pub fn expects_reply(&self) -> bool {
        self.buf[0] & NO_REPLY_FLAG == 0
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.put_u8(value as u8);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn put_bytes(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Append an ASCII name in a null-padded field of `width` bytes.
    pub fn put_name(&mut self, name: &str, width: usize) {
        codec::put_name(&mut self.buf, name, width);
    }

    /// Length-prefix the telegram for the wire. The prefix counts the inner
    /// telegram only, not itself.
    pub fn frame(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(2 + self.buf.len());
        out.put_u16_le(self.buf.len() as u16);
        out.put_slice(&self.buf);
        out.freeze()
    }
}

/// A validated reply telegram.
///
/// `parse` checks the framing in order: reply marker, opcode echo. The status
/// byte is left to the caller because a handful of commands treat specific
/// non-success statuses as benign results.
#[derive(Debug, Clone)]
pub(crate) struct Reply {
    bytes: Bytes,
}

impl Reply {
    pub fn parse(bytes: Bytes, sent_opcode: u8) -> Result<Self, NxtError> {
        if bytes.len() < 3 {
            return Err(NxtError::TruncatedReply { len: bytes.len() });
        }
        if bytes[0] != REPLY_TELEGRAM {
            return Err(NxtError::ReplyMarker { found: bytes[0] });
        }
        if bytes[1] != sent_opcode {
            return Err(NxtError::OpcodeEcho {
                sent: sent_opcode,
                echoed: bytes[1],
            });
        }
        Ok(Self { bytes })
    }

    pub fn opcode(&self) -> u8 {
        self.bytes[1]
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_primitive(self.bytes[2])
    }

    pub fn ensure_success(&self) -> Result<(), NxtError> {
        if self.bytes[2] != STATUS_SUCCESS {
            return Err(NxtError::CommandFailed {
                opcode: self.opcode(),
                status: self.status(),
            });
        }
        Ok(())
    }

    /// Reply bytes after the three-byte header.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[3..]
    }

    /// Fail with a protocol fault unless the payload holds at least `n` bytes.
    pub fn require(&self, n: usize) -> Result<&[u8], NxtError> {
        let payload = self.payload();
        if payload.len() < n {
            return Err(NxtError::InvalidReply(format!(
                "payload of {:#04x} is {} bytes, expected at least {}",
                self.opcode(),
                payload.len(),
                n
            )));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_telegram_layout() {
        let mut t = Telegram::direct(DirectOpcode::PlayTone, true);
        t.put_u16(440);
        t.put_u16(500);
        let frame = t.frame();
        assert_eq!(frame.as_ref(), &[0x06, 0x00, 0x00, 0x03, 0xB8, 0x01, 0xF4, 0x01]);
        assert!(t.expects_reply());
    }

    #[test]
    fn no_reply_flag_sets_high_bit() {
        let t = Telegram::direct(DirectOpcode::StopSoundPlayback, false);
        assert_eq!(t.frame().as_ref(), &[0x02, 0x00, 0x80, 0x0C]);
        assert!(!t.expects_reply());

        let t = Telegram::system(SystemOpcode::DeleteUserFlash, false);
        assert_eq!(t.frame().as_ref(), &[0x02, 0x00, 0x81, 0xA0]);
    }

    #[test]
    fn system_telegram_uses_upper_opcode_space() {
        let mut t = Telegram::system(SystemOpcode::OpenRead, true);
        t.put_name("demo.rxe", 20);
        let frame = t.frame();
        assert_eq!(frame[0], 22);
        assert_eq!(frame[1], 0);
        assert_eq!(frame[2], 0x01);
        assert_eq!(frame[3], 0x80);
    }

    #[test]
    fn reply_marker_checked_before_anything_else() {
        let err = Reply::parse(Bytes::from_static(&[0x01, 0x0B, 0x00]), 0x0B).unwrap_err();
        assert!(matches!(err, NxtError::ReplyMarker { found: 0x01 }));
    }

    #[test]
    fn reply_opcode_echo_checked_second() {
        let err = Reply::parse(Bytes::from_static(&[0x02, 0x0C, 0x00]), 0x0B).unwrap_err();
        assert!(matches!(
            err,
            NxtError::OpcodeEcho {
                sent: 0x0B,
                echoed: 0x0C
            }
        ));
    }

    #[test]
    fn reply_status_carries_opcode_and_code() {
        let reply = Reply::parse(Bytes::from_static(&[0x02, 0x86, 0x87]), 0x86).unwrap();
        assert_eq!(reply.status(), StatusCode::FileNotFound);
        let err = reply.ensure_success().unwrap_err();
        match err {
            NxtError::CommandFailed { opcode, status } => {
                assert_eq!(opcode, 0x86);
                assert_eq!(status, StatusCode::FileNotFound);
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn truncated_reply_is_rejected() {
        let err = Reply::parse(Bytes::from_static(&[0x02, 0x0B]), 0x0B).unwrap_err();
        assert!(matches!(err, NxtError::TruncatedReply { len: 2 }));
    }

    #[test]
    fn unknown_status_is_preserved() {
        assert_eq!(StatusCode::from_primitive(0x42), StatusCode::Unknown(0x42));
        assert_eq!(u8::from(StatusCode::Unknown(0x42)), 0x42);
    }
}
