//! IPC client for sending commands to the daemon.

use crate::error::{Result, VoiceError};
use crate::ipc::protocol::{Command, Response};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Send a command to the daemon via Unix socket.
///
/// # Errors
/// Returns `VoiceError::IpcConnection` if connection fails
/// Returns `VoiceError::IpcProtocol` if serialization/deserialization fails
pub async fn send_command(socket_path: &Path, command: Command) -> Result<Response> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| connection_error("Failed to connect to daemon", e))?;
    let (reader, mut writer) = stream.into_split();

    let mut request = command.to_json().map_err(|e| VoiceError::IpcProtocol {
        message: format!("Failed to serialize command: {}", e),
    })?;
    request.push('\n');
    writer
        .write_all(request.as_bytes())
        .await
        .map_err(|e| connection_error("Failed to write command", e))?;
    writer
        .flush()
        .await
        .map_err(|e| connection_error("Failed to flush writer", e))?;

    let mut response_line = String::new();
    BufReader::new(reader)
        .read_line(&mut response_line)
        .await
        .map_err(|e| connection_error("Failed to read response", e))?;
    if response_line.trim().is_empty() {
        return Err(VoiceError::IpcConnection {
            message: "Daemon closed the connection without responding".to_string(),
        });
    }

    Response::from_json(response_line.trim()).map_err(|e| VoiceError::IpcProtocol {
        message: format!("Failed to deserialize response: {}", e),
    })
}

fn connection_error(context: &str, e: std::io::Error) -> VoiceError {
    VoiceError::IpcConnection {
        message: format!("{}: {}", context, e),
    }
}
