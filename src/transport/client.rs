use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time;

use super::codec;
use super::protocol::{EnterReply, EntryAck, Message};
use crate::error::{Result, RingError};

const INITIAL_BACKOFF_MS: u64 = 150;
const MAX_BACKOFF_MS: u64 = 1200;

/// Connection-per-request client.
///
/// Every call opens a fresh TCP connection, writes one frame and, for `enter`,
/// reads one reply frame. Each attempt is bounded by `call_timeout`; failed
/// deliveries are retried with exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct LinkClient {
    call_timeout: Duration,
    attempts: usize,
}

impl LinkClient {
    pub fn new(call_timeout: Duration, attempts: usize) -> Self {
        Self {
            call_timeout,
            attempts: attempts.max(1),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// One-way delivery. Retries any transport failure; receivers de-duplicate
    /// by operation id or apply the message idempotently.
    pub async fn send(&self, addr: SocketAddr, message: &Message) -> Result<()> {
        let frame = codec::encode(message)?;
        let mut delay_ms = INITIAL_BACKOFF_MS;
        let mut attempt = 1;

        loop {
            match self.send_once(addr, &frame).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.attempts && is_transient(&e) => {
                    tracing::warn!(
                        "Delivery of '{}' to {} failed (attempt {}/{}): {}",
                        message.command(),
                        addr,
                        attempt,
                        self.attempts,
                        e
                    );
                    backoff(&mut delay_ms).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Request/reply exchange used by `enter`.
    ///
    /// Only retried while the connection cannot be established. A request
    /// the peer may have read is never re-sent.
    pub async fn request(&self, addr: SocketAddr, message: &Message) -> Result<EnterReply> {
        let (reply, _connection) = self.exchange(addr, message).await?;
        Ok(reply)
    }

    /// Like [`request`](Self::request), but keeps the connection open so an
    /// `Admitted` reply can be confirmed. Dropping the [`PendingAck`] without
    /// acknowledging tells the admitting node the admission was not taken.
    pub async fn exchange(
        &self,
        addr: SocketAddr,
        message: &Message,
    ) -> Result<(EnterReply, PendingAck)> {
        let frame = codec::encode(message)?;
        let mut delay_ms = INITIAL_BACKOFF_MS;
        let mut attempt = 1;

        loop {
            match self.request_once(addr, &frame).await {
                Ok((reply, stream)) => {
                    let pending = PendingAck {
                        stream,
                        addr,
                        deadline: self.call_timeout,
                    };
                    return Ok((reply, pending));
                }
                Err(e) if attempt < self.attempts && e.is_undelivered() => {
                    tracing::warn!(
                        "Request '{}' to {} failed (attempt {}/{}): {}",
                        message.command(),
                        addr,
                        attempt,
                        self.attempts,
                        e
                    );
                    backoff(&mut delay_ms).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, addr: SocketAddr, frame: &[u8]) -> Result<()> {
        let mut stream = self.connect(addr).await?;
        self.within_deadline(addr, async {
            stream.write_all(frame).await?;
            stream.flush().await?;
            stream.shutdown().await?;
            Ok::<(), RingError>(())
        })
        .await
    }

    async fn request_once(&self, addr: SocketAddr, frame: &[u8]) -> Result<(EnterReply, TcpStream)> {
        let mut stream = self.connect(addr).await?;
        let reply = self
            .within_deadline(addr, async {
                stream.write_all(frame).await?;
                stream.flush().await?;
                codec::read_frame(&mut stream).await
            })
            .await?;
        Ok((reply, stream))
    }

    async fn connect(&self, addr: SocketAddr) -> Result<TcpStream> {
        match time::timeout(self.call_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(RingError::Unreachable {
                addr: addr.to_string(),
                source,
            }),
            Err(_) => Err(RingError::Unreachable {
                addr: addr.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
            }),
        }
    }

    async fn within_deadline<T, F>(&self, addr: SocketAddr, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RingError::Timeout {
                addr: addr.to_string(),
                timeout: self.call_timeout,
            }),
        }
    }
}

/// Open `enter` connection whose reply may still need an [`EntryAck`].
#[derive(Debug)]
pub struct PendingAck {
    stream: TcpStream,
    addr: SocketAddr,
    deadline: Duration,
}

impl PendingAck {
    pub async fn acknowledge(mut self, ack: &EntryAck) -> Result<()> {
        match time::timeout(self.deadline, codec::write_frame(&mut self.stream, ack)).await {
            Ok(result) => result,
            Err(_) => Err(RingError::Timeout {
                addr: self.addr.to_string(),
                timeout: self.deadline,
            }),
        }
    }
}

fn is_transient(error: &RingError) -> bool {
    matches!(
        error,
        RingError::Unreachable { .. } | RingError::Timeout { .. } | RingError::Io(_)
    )
}

async fn backoff(delay_ms: &mut u64) {
    let jitter = rand::random::<u64>() % 50;
    time::sleep(Duration::from_millis(*delay_ms + jitter)).await;
    *delay_ms = (*delay_ms * 2).min(MAX_BACKOFF_MS);
}
