//! Wyoming event server over TCP, Unix sockets, or stdio.

use crate::error::{Result, WhisperdError};
use crate::wyoming::event::{Event, read_event, write_event};
use crate::wyoming::messages::{ErrorMessage, Message};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::watch;

/// Per-connection event handler.
///
/// One handler is created for every accepted connection, so it may keep
/// session state in `&mut self`.
#[async_trait::async_trait]
pub trait EventHandler: Send {
    /// Handle one event and return the events to send back, in order.
    ///
    /// An `Err` is reported to the peer as an `error` event and the
    /// connection stays open.
    async fn handle_event(&mut self, event: Event) -> Result<Vec<Event>>;
}

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerUri {
    /// `tcp://host:port`
    Tcp(String),
    /// `unix:///path/to/socket`
    Unix(PathBuf),
    /// `stdio://`, a single session on stdin/stdout
    Stdio,
}

impl FromStr for ServerUri {
    type Err = WhisperdError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |message: &str| WhisperdError::ConfigInvalidValue {
            key: "uri".to_string(),
            message: format!("{message}: '{s}'"),
        };

        if let Some(address) = s.strip_prefix("tcp://") {
            if address.is_empty() || !address.contains(':') {
                return Err(invalid("expected tcp://host:port"));
            }
            Ok(Self::Tcp(address.to_string()))
        } else if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(invalid("expected unix://path"));
            }
            Ok(Self::Unix(PathBuf::from(path)))
        } else if s == "stdio://" {
            Ok(Self::Stdio)
        } else {
            Err(invalid("unsupported URI scheme (use tcp://, unix://, or stdio://)"))
        }
    }
}

impl fmt::Display for ServerUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(address) => write!(f, "tcp://{address}"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Stdio => write!(f, "stdio://"),
        }
    }
}

enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener, PathBuf),
    Stdio,
}

/// A bound Wyoming server.
pub struct EventServer {
    listener: Listener,
    shutdown: watch::Sender<bool>,
}

impl EventServer {
    /// Bind the listener for `uri`.
    ///
    /// A stale Unix socket file at the target path is removed first.
    pub async fn bind(uri: &ServerUri) -> Result<Self> {
        let listener = match uri {
            ServerUri::Tcp(address) => {
                let listener =
                    TcpListener::bind(address)
                        .await
                        .map_err(|e| WhisperdError::Connection {
                            message: format!("Failed to bind {}: {}", uri, e),
                        })?;
                Listener::Tcp(listener)
            }
            ServerUri::Unix(path) => {
                if path.exists() {
                    std::fs::remove_file(path).map_err(|e| WhisperdError::Connection {
                        message: format!("Failed to remove existing socket: {}", e),
                    })?;
                }
                let listener = UnixListener::bind(path).map_err(|e| WhisperdError::Connection {
                    message: format!("Failed to bind {}: {}", uri, e),
                })?;
                Listener::Unix(listener, path.clone())
            }
            ServerUri::Stdio => Listener::Stdio,
        };

        let (shutdown, _) = watch::channel(false);
        Ok(Self { listener, shutdown })
    }

    /// Bound TCP address, if listening on TCP.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            Listener::Tcp(listener) => listener.local_addr().ok(),
            _ => None,
        }
    }

    /// Bound socket path, if listening on a Unix socket.
    pub fn socket_path(&self) -> Option<&Path> {
        match &self.listener {
            Listener::Unix(_, path) => Some(path),
            _ => None,
        }
    }

    /// Accept connections until [`stop`](Self::stop) is called.
    ///
    /// Every connection gets a fresh handler from `factory` and runs in its
    /// own task. In stdio mode a single session runs on stdin/stdout and
    /// this returns when stdin closes.
    pub async fn serve<F, H>(&self, factory: F) -> Result<()>
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: EventHandler + 'static,
    {
        let factory = Arc::new(factory);
        let mut shutdown = self.shutdown.subscribe();

        match &self.listener {
            Listener::Tcp(listener) => loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let (stream, peer) = accepted.map_err(|e| WhisperdError::Connection {
                            message: format!("Failed to accept connection: {}", e),
                        })?;
                        let (reader, writer) = stream.into_split();
                        spawn_connection(reader, writer, factory(), peer.to_string());
                    }
                    _ = stopped(&mut shutdown) => break,
                }
            },
            Listener::Unix(listener, path) => {
                let mut next_id: u64 = 0;
                loop {
                    tokio::select! {
                        accepted = listener.accept() => {
                            let (stream, _) = accepted.map_err(|e| WhisperdError::Connection {
                                message: format!("Failed to accept connection: {}", e),
                            })?;
                            next_id += 1;
                            let (reader, writer) = stream.into_split();
                            let peer = format!("{}#{}", path.display(), next_id);
                            spawn_connection(reader, writer, factory(), peer);
                        }
                        _ = stopped(&mut shutdown) => break,
                    }
                }
            }
            Listener::Stdio => {
                tokio::select! {
                    _ = handle_connection(
                        tokio::io::stdin(),
                        tokio::io::stdout(),
                        factory(),
                        "stdio".to_string(),
                    ) => {}
                    _ = stopped(&mut shutdown) => {}
                }
            }
        }

        Ok(())
    }

    /// Stop accepting connections and remove the Unix socket file.
    pub fn stop(&self) -> Result<()> {
        self.shutdown.send_replace(true);

        if let Listener::Unix(_, path) = &self.listener
            && path.exists()
        {
            std::fs::remove_file(path).map_err(|e| WhisperdError::Connection {
                message: format!("Failed to remove socket file: {}", e),
            })?;
        }

        Ok(())
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // Fails only once the server itself is gone
    if shutdown.wait_for(|&stopped| stopped).await.is_err() {
        tracing::debug!("Server dropped without stop");
    }
}

fn spawn_connection<R, W, H>(reader: R, writer: W, handler: H, peer: String)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    H: EventHandler + 'static,
{
    tokio::spawn(handle_connection(reader, writer, handler, peer));
}

/// Run one client session until the peer disconnects or sends a malformed frame.
pub async fn handle_connection<R, W, H>(reader: R, mut writer: W, mut handler: H, peer: String)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    H: EventHandler,
{
    tracing::info!(%peer, "Client connected");
    let mut reader = BufReader::new(reader);

    loop {
        let event = match read_event(&mut reader).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "Closing connection after bad frame");
                if let Err(e) = send_error(&mut writer, &e).await {
                    tracing::debug!(%peer, error = %e, "Could not report frame error");
                }
                break;
            }
        };

        tracing::debug!(%peer, event_type = %event.event_type, "Received event");

        let replies = match handler.handle_event(event).await {
            Ok(replies) => replies,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "Event failed");
                if let Err(e) = send_error(&mut writer, &e).await {
                    tracing::debug!(%peer, error = %e, "Could not report event error");
                    break;
                }
                continue;
            }
        };

        let mut write_failed = false;
        for reply in &replies {
            if let Err(e) = write_event(&mut writer, reply).await {
                tracing::debug!(%peer, error = %e, "Client went away");
                write_failed = true;
                break;
            }
        }
        if write_failed {
            break;
        }
    }

    tracing::info!(%peer, "Client disconnected");
}

async fn send_error<W>(writer: &mut W, error: &WhisperdError) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let event = Message::Error(ErrorMessage::from(error)).into_event()?;
    write_event(writer, &event).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::net::UnixStream;

    /// Echoes the event type back as a transcript; fails on "boom".
    struct EchoHandler;

    #[async_trait::async_trait]
    impl EventHandler for EchoHandler {
        async fn handle_event(&mut self, event: Event) -> Result<Vec<Event>> {
            if event.event_type == "boom" {
                return Err(WhisperdError::Other("boom failed".to_string()));
            }
            let reply = Message::Transcript(crate::wyoming::messages::Transcript {
                text: event.event_type,
            })
            .into_event()?;
            Ok(vec![reply])
        }
    }

    #[test]
    fn test_parses_supported_uris() {
        assert_eq!(
            "tcp://0.0.0.0:10300".parse::<ServerUri>().unwrap(),
            ServerUri::Tcp("0.0.0.0:10300".to_string())
        );
        assert_eq!(
            "unix:///run/whisperd.sock".parse::<ServerUri>().unwrap(),
            ServerUri::Unix(PathBuf::from("/run/whisperd.sock"))
        );
        assert_eq!("stdio://".parse::<ServerUri>().unwrap(), ServerUri::Stdio);
    }

    #[test]
    fn test_rejects_unknown_schemes() {
        for uri in ["http://localhost:10300", "tcp://", "tcp://localhost", "unix://", ""] {
            let result = uri.parse::<ServerUri>();
            assert!(
                matches!(result, Err(WhisperdError::ConfigInvalidValue { .. })),
                "{uri:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_display_matches_parsed_form() {
        for uri in ["tcp://127.0.0.1:10300", "unix:///tmp/w.sock", "stdio://"] {
            assert_eq!(uri.parse::<ServerUri>().unwrap().to_string(), uri);
        }
    }

    #[tokio::test]
    async fn test_handler_errors_become_error_events_and_session_continues() {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let task = tokio::spawn(handle_connection(
            server_read,
            server_write,
            EchoHandler,
            "test".to_string(),
        ));

        let (client_read, mut client_write) = tokio::io::split(client);
        let mut client_read = BufReader::new(client_read);

        write_event(&mut client_write, &Event::new("boom")).await.unwrap();
        let error = read_event(&mut client_read).await.unwrap().unwrap();
        assert_eq!(error.event_type, "error");
        assert_eq!(error.data["text"], "boom failed");
        assert_eq!(error.data["code"], "other");

        write_event(&mut client_write, &Event::new("describe")).await.unwrap();
        let reply = read_event(&mut client_read).await.unwrap().unwrap();
        assert_eq!(reply.event_type, "transcript");
        assert_eq!(reply.data["text"], "describe");

        drop(client_write);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_frame_closes_connection() {
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let task = tokio::spawn(handle_connection(
            server_read,
            server_write,
            EchoHandler,
            "test".to_string(),
        ));

        let (client_read, mut client_write) = tokio::io::split(client);
        let mut client_read = BufReader::new(client_read);

        use tokio::io::AsyncWriteExt;
        client_write.write_all(b"this is not json\n").await.unwrap();

        let error = read_event(&mut client_read).await.unwrap().unwrap();
        assert_eq!(error.event_type, "error");
        assert_eq!(error.data["code"], "event_protocol");

        task.await.unwrap();
        assert!(read_event(&mut client_read).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unix_server_serves_connections_and_stops() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("whisperd.sock");
        let uri = ServerUri::Unix(socket.clone());

        let server = Arc::new(EventServer::bind(&uri).await.unwrap());
        assert_eq!(server.socket_path(), Some(socket.as_path()));
        assert!(server.local_addr().is_none());

        let serving = Arc::clone(&server);
        let serve_task = tokio::spawn(async move { serving.serve(|| EchoHandler).await });

        for _ in 0..2 {
            let stream = UnixStream::connect(&socket).await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut read = BufReader::new(read);
            write_event(&mut write, &Event::new("audio-stop")).await.unwrap();
            let reply = read_event(&mut read).await.unwrap().unwrap();
            assert_eq!(reply.data["text"], "audio-stop");
        }

        server.stop().unwrap();
        serve_task.await.unwrap().unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn test_tcp_server_reports_bound_address() {
        let uri: ServerUri = "tcp://127.0.0.1:0".parse().unwrap();
        let server = Arc::new(EventServer::bind(&uri).await.unwrap());
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let serving = Arc::clone(&server);
        let serve_task = tokio::spawn(async move { serving.serve(|| EchoHandler).await });

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut read = BufReader::new(read);
        write_event(&mut write, &Event::new("transcribe")).await.unwrap();
        let reply = read_event(&mut read).await.unwrap().unwrap();
        assert_eq!(reply.data["text"], "transcribe");

        server.stop().unwrap();
        serve_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_binding_replaces_stale_socket_file() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("stale.sock");
        std::fs::write(&socket, b"").unwrap();

        let server = EventServer::bind(&ServerUri::Unix(socket.clone()))
            .await
            .unwrap();
        server.stop().unwrap();
        assert!(!socket.exists());
    }
}
