//! TCP transport: newline-delimited JSON, one reader and one writer task per connection.

use crate::codec::ClientLineCodec;
use crate::config::ServerConfig;
use crate::connection::{ConnectionManager, OUTBOUND_QUEUE_CAPACITY};
use crate::dispatcher::MessageDispatcher;
use crate::id_generator::IdentifierGenerator;
use crate::session_manager::SessionManager;
use crate::text::TextProvider;
use futures::StreamExt;
use log::{debug, error, info, warn};
use shared::ServerMessage;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio_util::codec::FramedRead;

/// Listening server with all shared state wired up.
pub struct Server {
    listener: TcpListener,
    dispatcher: Arc<MessageDispatcher>,
}

impl Server {
    pub async fn bind(config: &ServerConfig, texts: Arc<dyn TextProvider>) -> io::Result<Self> {
        let listener = TcpListener::bind(&config.address).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let connections = Arc::new(ConnectionManager::new(IdentifierGenerator::new()));
        let sessions = Arc::new(SessionManager::new(
            config.session,
            IdentifierGenerator::new(),
            connections.clone(),
            texts,
        ));
        let dispatcher = Arc::new(MessageDispatcher::new(sessions, connections));

        Ok(Self {
            listener,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn dispatcher(&self) -> Arc<MessageDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Accepts connections until the listener fails.
    pub async fn run(self) -> io::Result<()> {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    return Err(e);
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Could not disable Nagle for {}: {}", addr, e);
            }

            let dispatcher = Arc::clone(&self.dispatcher);
            tokio::spawn(handle_connection(stream, addr, dispatcher));
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    dispatcher: Arc<MessageDispatcher>,
) {
    let (reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let registration = dispatcher.connections().register(addr, tx);
    let id = registration.id;

    let writer_handle = tokio::spawn(write_messages(writer, rx, id));
    read_messages(reader, &dispatcher, id, &registration.shutdown).await;

    dispatcher.handle_disconnect(id).await;
    // The queue closed when the connection was unregistered; wait for the flush.
    if let Err(e) = writer_handle.await {
        error!("Writer of client {} panicked: {}", id, e);
    }
    debug!("Connection {} from {} closed", id, addr);
}

/// Dispatches lines in arrival order until EOF, a read error or a shutdown
/// signal. Lines that cannot be framed are logged and skipped.
async fn read_messages(
    reader: OwnedReadHalf,
    dispatcher: &MessageDispatcher,
    id: u32,
    shutdown: &Notify,
) {
    let mut lines = FramedRead::new(reader, ClientLineCodec::new());
    loop {
        tokio::select! {
            line = lines.next() => match line {
                Some(Ok(Ok(line))) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    // Errors are already logged and answered by the dispatcher.
                    let _ = dispatcher.dispatch_line(id, &line).await;
                }
                Some(Ok(Err(e))) => warn!("Client {}: {}", id, e),
                None => break,
                Some(Err(e)) => {
                    warn!("Failed to read from client {}: {}", id, e);
                    break;
                }
            },
            _ = shutdown.notified() => {
                debug!("Client {} disconnected by the server", id);
                break;
            }
        }
    }
}

async fn write_messages(
    writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<ServerMessage>,
    id: u32,
) {
    let mut writer = BufWriter::new(writer);
    while let Some(message) = rx.recv().await {
        let mut line = match shared::encode(&message) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode {} for client {}: {}", message.message_type(), id, e);
                continue;
            }
        };
        line.push('\n');

        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            warn!("Failed to send to client {}: {}", id, e);
            return;
        }
    }
    let _ = writer.flush().await;
    let _ = writer.shutdown().await;
}
