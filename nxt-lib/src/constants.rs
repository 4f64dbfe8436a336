// Protocol constants for the NXT brick

use std::time::Duration;

/// Telegram type byte for a direct command that expects a reply.
pub const DIRECT_TELEGRAM: u8 = 0x00;

/// Telegram type byte for a system command that expects a reply.
pub const SYSTEM_TELEGRAM: u8 = 0x01;

/// Telegram type byte of every reply sent by the brick.
pub const REPLY_TELEGRAM: u8 = 0x02;

/// Set in the telegram type byte when the brick must not send a reply.
pub const NO_REPLY_FLAG: u8 = 0x80;

/// Status byte value for a successful command.
pub const STATUS_SUCCESS: u8 = 0x00;

/// Size of the length prefix in front of every telegram (2 bytes, little-endian).
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Maximum length of a file name on the brick's flash filesystem,
/// not counting the null terminator.
pub const MAX_FILE_NAME: usize = 19;

/// On-wire width of a file name field (name plus null padding).
pub const FILE_NAME_FIELD: usize = 20;

/// Maximum length of the brick's own name.
pub const MAX_BRICK_NAME: usize = 15;

/// On-wire width of the brick name field.
pub const BRICK_NAME_FIELD: usize = 16;

/// Maximum length of a mailbox message, not counting the null terminator.
pub const MAX_MESSAGE: usize = 59;

/// Maximum payload of a single low-speed (I²C) write or read.
pub const LS_MAX_PAYLOAD: usize = 16;

/// Deadline applied to every transport read/write and to the low-speed
/// status-poll loop as a whole.
pub const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay between low-speed status polls while waiting for a digital sensor.
pub const LS_POLL_DELAY: Duration = Duration::from_millis(10);

/// Interval of the background keep-alive ping. The brick reports its own
/// sleep timeout and the nominal target is half of that value; the interval
/// is fixed at 60 seconds, matching the observed behavior of the protocol
/// this crate implements.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Default cadence of the background poll task started by `Brick::connect`.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
