//! Shared test utilities: a scripted transport double and reply builders.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use nxt_lib::connection::Transport;
use nxt_lib::error::NxtError;

/// Transport double: records every write call verbatim and serves reads from
/// a scripted byte queue.
pub struct MockTransport {
    open: Arc<AtomicBool>,
    reads: Arc<Mutex<VecDeque<u8>>>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    stall_reads: bool,
}

/// Cloneable handle for scripting replies and inspecting writes after the
/// transport has been moved into a connection.
#[derive(Clone)]
pub struct MockHandle {
    open: Arc<AtomicBool>,
    reads: Arc<Mutex<VecDeque<u8>>>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockTransport {
    pub fn new() -> (Self, MockHandle) {
        let open = Arc::new(AtomicBool::new(false));
        let reads = Arc::new(Mutex::new(VecDeque::new()));
        let writes = Arc::new(Mutex::new(Vec::new()));
        let handle = MockHandle {
            open: Arc::clone(&open),
            reads: Arc::clone(&reads),
            writes: Arc::clone(&writes),
        };
        (
            Self {
                open,
                reads,
                writes,
                stall_reads: false,
            },
            handle,
        )
    }

    /// A transport whose reads never complete, for exercising the deadline.
    #[allow(dead_code)]
    pub fn stalled() -> (Self, MockHandle) {
        let (mut transport, handle) = Self::new();
        transport.stall_reads = true;
        (transport, handle)
    }
}

impl MockHandle {
    /// Queue a framed reply: 2-byte little-endian length prefix plus body.
    pub fn queue_reply(&self, body: &[u8]) {
        let mut reads = self.reads.lock().unwrap();
        reads.extend((body.len() as u16).to_le_bytes());
        reads.extend(body.iter().copied());
    }

    /// Queue raw bytes with no framing, for malformed-stream tests.
    #[allow(dead_code)]
    pub fn queue_raw(&self, bytes: &[u8]) {
        self.reads.lock().unwrap().extend(bytes.iter().copied());
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    #[allow(dead_code)]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<(), NxtError> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) -> Result<(), NxtError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn write_all(&mut self, buf: &[u8]) -> impl Future<Output = Result<(), NxtError>> + Send {
        let result = if self.open.load(Ordering::SeqCst) {
            self.writes.lock().unwrap().push(buf.to_vec());
            Ok(())
        } else {
            Err(NxtError::NotConnected)
        };
        async move { result }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<(), NxtError>> + Send {
        let stall = self.stall_reads;
        let data: Result<Vec<u8>, NxtError> = {
            let mut reads = self.reads.lock().unwrap();
            if reads.len() < buf.len() && !stall {
                Err(NxtError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "script exhausted",
                )))
            } else {
                Ok(reads.drain(..buf.len().min(reads.len())).collect())
            }
        };
        async move {
            if stall {
                std::future::pending::<()>().await;
            }
            let data = data?;
            buf.copy_from_slice(&data);
            Ok(())
        }
    }
}

/// Build a reply body: marker, opcode echo, status, payload.
pub fn reply(opcode: u8, status: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0x02, opcode, status];
    body.extend_from_slice(payload);
    body
}

/// Initialize tracing output for tests run with `--nocapture`.
#[allow(dead_code)]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
