//! Unix socket listener that feeds JSON-line commands to a [`CommandHandler`].

use crate::defaults::{APP_DIR, SOCKET_NAME};
use crate::error::{Result, VoiceError};
use crate::ipc::protocol::{Command, Response};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

/// Answers one decoded command.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: Command) -> Response;
}

/// A bound control socket. The socket file is removed when the server
/// is dropped.
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl IpcServer {
    /// Bind `socket_path`, replacing a stale socket left by a crashed
    /// daemon. Fails if another daemon still answers on it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(socket_path: PathBuf) -> Result<Self> {
        if socket_path.exists() {
            if std::os::unix::net::UnixStream::connect(&socket_path).is_ok() {
                return Err(VoiceError::IpcSocket {
                    message: format!(
                        "Another daemon is already listening on {}",
                        socket_path.display()
                    ),
                });
            }
            debug!(path = %socket_path.display(), "removing stale socket");
            std::fs::remove_file(&socket_path).map_err(|e| VoiceError::IpcSocket {
                message: format!("Failed to remove stale socket: {}", e),
            })?;
        }

        let listener = UnixListener::bind(&socket_path).map_err(|e| VoiceError::IpcSocket {
            message: format!("Failed to bind to socket: {}", e),
        })?;
        Ok(Self {
            listener,
            socket_path,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// `$XDG_RUNTIME_DIR/<socket>` when set, else a per-user path in `/tmp`.
    pub fn default_socket_path() -> PathBuf {
        match std::env::var_os("XDG_RUNTIME_DIR") {
            Some(dir) => PathBuf::from(dir).join(SOCKET_NAME),
            None => {
                let uid = unsafe { libc::getuid() };
                PathBuf::from(format!("/tmp/{}-{}.sock", APP_DIR, uid))
            }
        }
    }

    /// Accept clients until `shutdown` completes, then unlink the socket.
    ///
    /// Each client is served on its own task. Connections already open
    /// when `shutdown` fires are left to finish on their own.
    pub async fn serve<H, F>(self, handler: H, shutdown: F) -> Result<()>
    where
        H: CommandHandler + 'static,
        F: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!(path = %self.socket_path.display(), "IPC server stopping");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, _) = accepted.map_err(|e| VoiceError::IpcConnection {
                        message: format!("Failed to accept connection: {}", e),
                    })?;
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Err(e) = serve_client(stream, handler.as_ref()).await {
                            warn!("IPC client failed: {}", e);
                        }
                    });
                }
            }
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.socket_path.display(), "Failed to remove socket: {}", e);
            }
        }
    }
}

/// Answer every command line the client sends until it hangs up.
async fn serve_client<H>(stream: UnixStream, handler: &H) -> Result<()>
where
    H: CommandHandler + ?Sized,
{
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| VoiceError::IpcConnection {
            message: format!("Failed to read from client: {}", e),
        })?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match Command::from_json(line) {
            Ok(command) => {
                debug!(?command, "IPC command");
                handler.handle(command).await
            }
            Err(e) => Response::from(VoiceError::IpcProtocol {
                message: format!("Failed to parse command: {}", e),
            }),
        };

        let mut reply = response.to_json().map_err(|e| VoiceError::IpcProtocol {
            message: format!("Failed to serialize response: {}", e),
        })?;
        reply.push('\n');
        writer
            .write_all(reply.as_bytes())
            .await
            .map_err(|e| VoiceError::IpcConnection {
                message: format!("Failed to write to client: {}", e),
            })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::sync::Notify;

    struct EchoLevels;

    #[async_trait::async_trait]
    impl CommandHandler for EchoLevels {
        async fn handle(&self, command: Command) -> Response {
            match command {
                Command::Commands => Response::Commands {
                    commands: vec!["Repeat".to_string(), "Pause".to_string()],
                },
                Command::SetVolume { volume } => Response::Level { value: volume },
                Command::SetRate { rate } => Response::Level { value: rate },
                _ => Response::Ok,
            }
        }
    }

    fn serve_forever(socket_path: PathBuf) -> tokio::task::JoinHandle<Result<()>> {
        let server = IpcServer::bind(socket_path).unwrap();
        tokio::spawn(server.serve(EchoLevels, std::future::pending()))
    }

    /// Send `lines`, close our half, and collect every reply line.
    async fn exchange(socket_path: &Path, lines: &[u8]) -> Vec<String> {
        let mut stream = UnixStream::connect(socket_path).await.unwrap();
        stream.write_all(lines).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        raw.lines().map(str::to_string).collect()
    }

    fn line(command: &Command) -> String {
        format!("{}\n", command.to_json().unwrap())
    }

    #[test]
    fn default_socket_path_is_per_user() {
        let path = IpcServer::default_socket_path();
        if std::env::var_os("XDG_RUNTIME_DIR").is_some() {
            assert!(path.ends_with(SOCKET_NAME), "{:?}", path);
        } else {
            let uid = unsafe { libc::getuid() };
            assert_eq!(path, PathBuf::from(format!("/tmp/{}-{}.sock", APP_DIR, uid)));
        }
    }

    #[tokio::test]
    async fn bind_creates_socket_and_drop_removes_it() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("voice.sock");

        let server = IpcServer::bind(socket_path.clone()).unwrap();
        assert!(socket_path.exists());
        assert_eq!(server.socket_path(), socket_path.as_path());

        drop(server);
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn live_socket_is_not_taken_over() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("voice.sock");
        let _running = IpcServer::bind(socket_path.clone()).unwrap();

        match IpcServer::bind(socket_path.clone()) {
            Err(VoiceError::IpcSocket { message }) => {
                assert!(message.contains("already listening"), "{message}")
            }
            other => panic!("Expected IpcSocket error, got {:?}", other.map(|_| ())),
        }
        assert!(socket_path.exists());
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("voice.sock");
        drop(std::os::unix::net::UnixListener::bind(&socket_path).unwrap());
        assert!(socket_path.exists());

        let _server_task = serve_forever(socket_path.clone());
        let replies = exchange(&socket_path, line(&Command::Start).as_bytes()).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(Response::from_json(&replies[0]).unwrap(), Response::Ok);
    }

    #[tokio::test]
    async fn one_connection_carries_several_commands() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("voice.sock");
        let _server_task = serve_forever(socket_path.clone());

        let request = [
            line(&Command::Commands),
            "\n".to_string(),
            line(&Command::SetRate { rate: 1.25 }),
        ]
        .concat();
        let replies: Vec<Response> = exchange(&socket_path, request.as_bytes())
            .await
            .iter()
            .map(|r| Response::from_json(r).unwrap())
            .collect();

        assert_eq!(
            replies,
            vec![
                Response::Commands {
                    commands: vec!["Repeat".to_string(), "Pause".to_string()]
                },
                Response::Level { value: 1.25 },
            ]
        );
    }

    #[tokio::test]
    async fn concurrent_clients_are_served() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("voice.sock");
        let _server_task = serve_forever(socket_path.clone());

        let clients: Vec<_> = (0..5)
            .map(|i| {
                let socket_path = socket_path.clone();
                tokio::spawn(async move {
                    let volume = i as f32 / 10.0;
                    let replies =
                        exchange(&socket_path, line(&Command::SetVolume { volume }).as_bytes())
                            .await;
                    (volume, Response::from_json(&replies[0]).unwrap())
                })
            })
            .collect();

        for client in clients {
            let (volume, response) = client.await.unwrap();
            assert_eq!(response, Response::Level { value: volume });
        }
    }

    #[tokio::test]
    async fn malformed_line_gets_error_and_connection_survives() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("voice.sock");
        let _server_task = serve_forever(socket_path.clone());

        let request = format!("not valid json\n{}", line(&Command::Start));
        let replies = exchange(&socket_path, request.as_bytes()).await;
        assert_eq!(replies.len(), 2);
        match Response::from_json(&replies[0]).unwrap() {
            Response::Error { code, message } => {
                assert_eq!(code, ErrorCode::Internal);
                assert!(message.contains("Failed to parse command"), "{message}");
            }
            other => panic!("Expected Error response, got {:?}", other),
        }
        assert_eq!(Response::from_json(&replies[1]).unwrap(), Response::Ok);
    }

    #[tokio::test]
    async fn notify_stops_accept_loop_and_unlinks_socket() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("voice.sock");
        let stop = Arc::new(Notify::new());

        let server = IpcServer::bind(socket_path.clone()).unwrap();
        let signal = Arc::clone(&stop);
        let server_task =
            tokio::spawn(server.serve(EchoLevels, async move { signal.notified().await }));

        // Served before the stop signal.
        let replies = exchange(&socket_path, line(&Command::Start).as_bytes()).await;
        assert_eq!(Response::from_json(&replies[0]).unwrap(), Response::Ok);

        stop.notify_one();
        tokio::time::timeout(std::time::Duration::from_secs(2), server_task)
            .await
            .expect("server stopped")
            .unwrap()
            .unwrap();
        assert!(!socket_path.exists());
        assert!(UnixStream::connect(&socket_path).await.is_err());
    }
}
