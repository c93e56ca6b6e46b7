pub mod receive;

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::codec;
use crate::config::ChatConfig;
use crate::error::ChatError;

/// Events surfaced to the owner of a connection, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// One received plain text message
    Message(String),

    /// A file arrived and was written under the download directory
    FileReceived {
        name: String,
        path: PathBuf,
        size: u64,
    },

    /// Transport-level report: peer disconnect, read/write fault,
    /// malformed file header
    Status(String),
}

/// Receiving end of a connection's event stream
pub type EventReceiver = mpsc::UnboundedReceiver<ChatEvent>;

/// Observable connection lifecycle. The connecting/listening phases
/// exist only inside the constructors; a dropped connection goes to
/// `Closed` and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    Closed,
}

/// Bound server socket waiting for its single peer.
pub struct ChatListener {
    listener: TcpListener,
}

impl ChatListener {
    /// Bind the listening socket. Port 0 asks the OS for an ephemeral
    /// port, readable via [`local_addr`](Self::local_addr).
    pub async fn bind(port: u16) -> Result<Self, ChatError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| ChatError::Bind { port, source })?;
        debug!(port, "listener bound");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ChatError> {
        self.listener.local_addr().map_err(ChatError::Transport)
    }

    /// Accept exactly one inbound peer and move to the active state.
    /// Consumes the listener: one session per listener.
    pub async fn accept(self, config: &ChatConfig) -> Result<(ChatConnection, EventReceiver), ChatError> {
        let (stream, peer) = self.listener.accept().await.map_err(ChatError::Accept)?;
        info!(%peer, "peer connected");
        Ok(ChatConnection::from_stream(stream, config))
    }
}

/// One live peer-to-peer chat connection. Symmetric: both the listening
/// and the dialing side end up with the same type, each holding the
/// display name last announced by its peer.
pub struct ChatConnection {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    remote_name: Arc<RwLock<Option<String>>>,
    shutdown: watch::Sender<bool>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
    receive_finished: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl ChatConnection {
    /// Listener role: bind the configured port, accept one peer.
    pub async fn listen(config: &ChatConfig) -> Result<(Self, EventReceiver), ChatError> {
        ChatListener::bind(config.port).await?.accept(config).await
    }

    /// Dialer role: connect out to a listening peer.
    pub async fn connect(host: &str, config: &ChatConfig) -> Result<(Self, EventReceiver), ChatError> {
        let addr = format!("{}:{}", host, config.port);
        let stream = TcpStream::connect(&addr).await.map_err(|source| ChatError::Connect {
            addr: addr.clone(),
            source,
        })?;
        info!(%addr, "connected to peer");
        Ok(Self::from_stream(stream, config))
    }

    fn from_stream(stream: TcpStream, config: &ChatConfig) -> (Self, EventReceiver) {
        let (reader, writer) = stream.into_split();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let remote_name = Arc::new(RwLock::new(None));
        let receive_finished = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(receive::receive_loop(receive::ReceiveContext {
            reader,
            buffer_size: config.read_buffer_size,
            download_dir: config.download_dir.clone(),
            remote_name: Arc::clone(&remote_name),
            events: event_tx,
            shutdown: shutdown_rx,
            finished: Arc::clone(&receive_finished),
        }));

        let connection = Self {
            writer: Arc::new(Mutex::new(writer)),
            remote_name,
            shutdown,
            receive_task: Mutex::new(Some(task)),
            receive_finished,
            closed: AtomicBool::new(false),
        };
        (connection, event_rx)
    }

    /// Current lifecycle state. A connection whose receive loop has
    /// ended (peer drop, transport fault) reports `Closed` even before
    /// [`close`](Self::close) is called.
    pub fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::SeqCst) || self.receive_finished.load(Ordering::SeqCst) {
            ConnectionState::Closed
        } else {
            ConnectionState::Active
        }
    }

    /// Send one text message: UTF-8 bytes in a single write, no framing
    /// beyond what the text itself carries. Relies on one send landing
    /// in one peer read, which holds for messages up to the read buffer
    /// size.
    pub async fn send(&self, text: &str) -> Result<(), ChatError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChatError::Closed);
        }
        let mut writer = self.writer.lock().await;
        writer
            .write_all(text.as_bytes())
            .await
            .map_err(ChatError::Transport)
    }

    /// Announce the local display name to the peer. Consumed on the
    /// other side; never surfaced as a chat line.
    pub async fn announce_name(&self, name: &str) -> Result<(), ChatError> {
        self.send(&codec::encode_announcement(name)).await
    }

    /// Send a whole file: a `FILE|name|len|` header block, then the raw
    /// bytes. Header and payload go out under the one writer lock so a
    /// concurrent text send can never land between them.
    pub async fn send_file(&self, path: impl AsRef<Path>) -> Result<(), ChatError> {
        let path = path.as_ref();
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChatError::Closed);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ChatError::FileNotFound(path.to_path_buf()))?;
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ChatError::FileNotFound(path.to_path_buf())
            } else {
                ChatError::Transport(e)
            }
        })?;

        let header = codec::encode_file_header(&name, bytes.len() as u64);
        let mut writer = self.writer.lock().await;
        writer
            .write_all(header.as_bytes())
            .await
            .map_err(ChatError::Transport)?;
        writer.write_all(&bytes).await.map_err(ChatError::Transport)?;
        info!(file = %name, size = bytes.len(), "file sent");
        Ok(())
    }

    /// Display name most recently announced by the peer.
    pub async fn remote_name(&self) -> Option<String> {
        self.remote_name.read().await.clone()
    }

    /// Tear the connection down: stop the receive loop, wait for it to
    /// finish, then shut the socket down. Idempotent, and safe to call
    /// from the task consuming events. Once this returns, no further
    /// events are emitted and sends fail with [`ChatError::Closed`].
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.shutdown.send(true);

        // The task slot doubles as the teardown lock: a concurrent
        // close blocks here until the first one has joined the loop.
        let mut task = self.receive_task.lock().await;
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                debug!("receive loop join failed: {e}");
            }
        }
        drop(task);

        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        debug!("connection closed");
    }
}
