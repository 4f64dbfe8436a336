//! Serial-port transport for the library: a Bluetooth virtual COM port
//! (`/dev/rfcomm0`, `COM3`, ...) exposed through tokio-serial.

use std::future::Future;
use std::io;

use nxt_lib::{NxtError, Transport};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

pub struct SerialTransport {
    path: String,
    baud: u32,
    stream: Option<SerialStream>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>, baud: u32) -> Self {
        Self {
            path: path.into(),
            baud,
            stream: None,
        }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<(), NxtError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = tokio_serial::new(&self.path, self.baud)
            .open_native_async()
            .map_err(|e| NxtError::Io(io::Error::other(e)))?;
        info!("opened serial port {}", self.path);
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> Result<(), NxtError> {
        self.stream = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn write_all(&mut self, buf: &[u8]) -> impl Future<Output = Result<(), NxtError>> + Send {
        async move {
            let stream = self.stream.as_mut().ok_or(NxtError::NotConnected)?;
            stream.write_all(buf).await?;
            stream.flush().await?;
            Ok(())
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<(), NxtError>> + Send {
        async move {
            let stream = self.stream.as_mut().ok_or(NxtError::NotConnected)?;
            stream.read_exact(buf).await?;
            Ok(())
        }
    }
}
