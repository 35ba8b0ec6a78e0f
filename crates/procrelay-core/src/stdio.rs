use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Unpin + Sync + Send>>>;

#[derive(Clone, derive_more::From)]
pub enum RelayStdio {
    Out(RelayStdOut),
    Err(RelayStdErr),
}

impl RelayStdio {
    pub fn inner(&self) -> SharedWriter {
        match self {
            RelayStdio::Out(out) => out.inner(),
            RelayStdio::Err(err) => err.inner(),
        }
    }

    /// Write one chunk and flush it straight through
    pub async fn write_chunk(&self, chunk: &[u8]) -> std::io::Result<()> {
        let inner = self.inner();
        let mut lock = inner.lock().await;
        lock.write_all(chunk).await?;
        lock.flush().await
    }
}

/// Destination for relayed child stdout, the parent's stdout unless a test swaps it
pub struct RelayStdOut(SharedWriter);

impl Clone for RelayStdOut {
    fn clone(&self) -> Self {
        RelayStdOut(self.0.clone())
    }
}

impl Default for RelayStdOut {
    fn default() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }
}

impl RelayStdOut {
    pub fn new(t: Box<dyn AsyncWrite + Unpin + Sync + Send>) -> RelayStdOut {
        RelayStdOut(Arc::new(Mutex::new(t)))
    }

    pub fn inner(&self) -> SharedWriter {
        self.0.clone()
    }

    pub async fn print(&self, message: &str) {
        let mut lock = self.0.lock().await;
        let _ = lock.write_all(message.as_bytes()).await;
        let _ = lock.flush().await;
    }
}

/// Destination for relayed child stderr and relay errors
pub struct RelayStdErr(SharedWriter);

impl Clone for RelayStdErr {
    fn clone(&self) -> Self {
        RelayStdErr(self.0.clone())
    }
}

impl Default for RelayStdErr {
    fn default() -> Self {
        Self::new(Box::new(tokio::io::stderr()))
    }
}

impl RelayStdErr {
    pub fn new(t: Box<dyn AsyncWrite + Unpin + Sync + Send>) -> RelayStdErr {
        RelayStdErr(Arc::new(Mutex::new(t)))
    }

    pub fn inner(&self) -> SharedWriter {
        self.0.clone()
    }

    pub async fn print(&self, message: &str) {
        let mut lock = self.0.lock().await;
        let _ = lock.write_all(message.as_bytes()).await;
        let _ = lock.flush().await;
    }
}

/// In-memory sink for capturing relayed output, shared between the writer and the reader
#[cfg(any(test, feature = "test-util"))]
#[derive(Clone, Default)]
pub struct CaptureBuffer {
    inner: Arc<std::sync::Mutex<Vec<u8>>>,
    writes: Arc<std::sync::Mutex<usize>>,
}

#[cfg(any(test, feature = "test-util"))]
impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let bytes = self.inner.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Number of non-empty writes received
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or_default()
    }

    pub fn stdout(&self) -> RelayStdOut {
        RelayStdOut::new(Box::new(self.clone()))
    }

    pub fn stderr(&self) -> RelayStdErr {
        RelayStdErr::new(Box::new(self.clone()))
    }
}

#[cfg(any(test, feature = "test-util"))]
impl AsyncWrite for CaptureBuffer {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        if let Ok(mut inner) = self.inner.lock() {
            inner.extend_from_slice(buf);
        }
        if !buf.is_empty() {
            if let Ok(mut writes) = self.writes.lock() {
                *writes += 1;
            }
        }
        std::task::Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}
