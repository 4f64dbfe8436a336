//! The serial link to the brick.
//!
//! [`Transport`] is the byte-stream capability the operating system side has
//! to provide (a Bluetooth virtual COM port in practice); [`Connection`] owns
//! one and layers the length-prefixed telegram exchange on top. A connection
//! is shared as `Arc<tokio::sync::Mutex<Connection<T>>>` — holding the lock
//! for the duration of an exchange is what keeps request/reply pairs from
//! interleaving on the wire.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::trace;

use crate::constants::EXCHANGE_TIMEOUT;
use crate::error::NxtError;
use crate::telegram::{Reply, Telegram};

/// Raw byte transport to the brick.
///
/// `open`/`close` manage the underlying port; reads and writes are async and
/// move exactly the requested number of bytes. The connection applies the
/// exchange deadline, so implementations do not need their own timeouts.
pub trait Transport: Send + 'static {
    fn open(&mut self) -> Result<(), NxtError>;
    fn close(&mut self) -> Result<(), NxtError>;
    fn is_open(&self) -> bool;
    fn write_all(&mut self, buf: &[u8]) -> impl Future<Output = Result<(), NxtError>> + Send;
    fn read_exact(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<(), NxtError>> + Send;
}

/// A connection shared between devices, tasks and callers.
pub type SharedConnection<T> = Arc<Mutex<Connection<T>>>;

/// One logical link to a brick.
pub struct Connection<T: Transport> {
    transport: T,
    reply_required: bool,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            reply_required: true,
        }
    }

    pub fn into_shared(self) -> SharedConnection<T> {
        Arc::new(Mutex::new(self))
    }

    /// Open the transport. A no-op when already open.
    pub fn open(&mut self) -> Result<(), NxtError> {
        if self.transport.is_open() {
            return Ok(());
        }
        self.transport.open()
    }

    pub fn close(&mut self) -> Result<(), NxtError> {
        if !self.transport.is_open() {
            return Ok(());
        }
        self.transport.close()
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Whether fire-and-forget commands still ask the brick for a status
    /// reply. Defaults to `true`; turning it off trades error visibility for
    /// round trips.
    pub fn set_reply_required(&mut self, required: bool) {
        self.reply_required = required;
    }

    pub fn reply_required(&self) -> bool {
        self.reply_required
    }

    async fn write_frame(&mut self, telegram: &Telegram) -> Result<(), NxtError> {
        if !self.transport.is_open() {
            return Err(NxtError::NotConnected);
        }
        let frame = telegram.frame();
        timeout(EXCHANGE_TIMEOUT, self.transport.write_all(&frame)).await??;
        trace!(opcode = telegram.opcode(), len = frame.len(), "sent telegram");
        Ok(())
    }

    async fn read_reply(&mut self, sent_opcode: u8) -> Result<Reply, NxtError> {
        let mut prefix = [0u8; 2];
        timeout(EXCHANGE_TIMEOUT, self.transport.read_exact(&mut prefix)).await??;
        let len = u16::from_le_bytes(prefix) as usize;
        let mut body = vec![0u8; len];
        timeout(EXCHANGE_TIMEOUT, self.transport.read_exact(&mut body)).await??;
        trace!(len, "received reply");
        Reply::parse(Bytes::from(body), sent_opcode)
    }

    /// Send a telegram that expects a reply, read the reply, and fail on any
    /// non-success status.
    pub(crate) async fn exchange(&mut self, telegram: Telegram) -> Result<Reply, NxtError> {
        let reply = self.exchange_lenient(telegram).await?;
        reply.ensure_success()?;
        Ok(reply)
    }

    /// Send a telegram that expects a reply and hand back the validated reply
    /// with its status untouched, for commands where some statuses are benign.
    pub(crate) async fn exchange_lenient(&mut self, telegram: Telegram) -> Result<Reply, NxtError> {
        debug_assert!(telegram.expects_reply());
        self.write_frame(&telegram).await?;
        self.read_reply(telegram.opcode()).await
    }

    /// Send a no-reply telegram: exactly one write, no read.
    pub(crate) async fn send(&mut self, telegram: Telegram) -> Result<(), NxtError> {
        debug_assert!(!telegram.expects_reply());
        self.write_frame(&telegram).await
    }

    /// Dispatch a command with no interesting reply payload, honoring the
    /// reply-required policy the telegram was built with.
    pub(crate) async fn run_command(&mut self, telegram: Telegram) -> Result<(), NxtError> {
        if telegram.expects_reply() {
            self.exchange(telegram).await?;
            Ok(())
        } else {
            self.send(telegram).await
        }
    }
}
