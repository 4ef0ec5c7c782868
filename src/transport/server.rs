use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time;

use super::codec;
use super::protocol::{EnterReply, EntryAck, Message};
use crate::error::{Result, RingError};

/// Receives every inbound message of a node.
pub trait MessageHandler: Send + Sync + 'static {
    /// `responder` must be used for messages that expect a reply and may be
    /// dropped otherwise.
    fn handle(&self, message: Message, responder: Responder)
    -> impl Future<Output = Result<()>> + Send;
}

/// Write half of an inbound connection, used to answer `enter`.
pub struct Responder {
    stream: TcpStream,
    peer: SocketAddr,
    deadline: Duration,
}

impl Responder {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub async fn reply(mut self, reply: &EnterReply) -> Result<()> {
        let (peer, deadline) = (self.peer, self.deadline);
        bounded(peer, deadline, codec::write_frame(&mut self.stream, reply)).await
    }

    /// Sends `reply` and waits for the caller's [`EntryAck`].
    ///
    /// A caller that hangs up before acknowledging surfaces as an I/O error;
    /// one that stays connected but silent surfaces as `Timeout`.
    pub async fn reply_and_confirm(mut self, reply: &EnterReply) -> Result<EntryAck> {
        let (peer, deadline) = (self.peer, self.deadline);
        bounded(peer, deadline, codec::write_frame(&mut self.stream, reply)).await?;
        bounded(peer, deadline, codec::read_frame(&mut self.stream)).await
    }
}

async fn bounded<T, F>(peer: SocketAddr, deadline: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(RingError::Timeout {
            addr: peer.to_string(),
            timeout: deadline,
        }),
    }
}

/// Accept loop. One task per inbound connection; a failing connection is
/// logged and never stops the loop.
pub async fn serve<H: MessageHandler>(listener: TcpListener, handler: Arc<H>, deadline: Duration) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let handler = handler.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer, handler, deadline).await {
                        tracing::error!("Error handling connection from {}: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                tracing::error!("Failed to accept connection: {}", e);
                time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn handle_connection<H: MessageHandler>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
    deadline: Duration,
) -> Result<()> {
    let message: Message = bounded(peer, deadline, codec::read_frame(&mut stream)).await?;

    tracing::debug!("Received '{}' from {}", message.command(), peer);

    let responder = Responder {
        stream,
        peer,
        deadline,
    };
    handler.handle(message, responder).await
}
