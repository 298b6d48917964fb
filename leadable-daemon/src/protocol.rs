//! Newline-delimited JSON control protocol over the daemon's Unix socket.
//!
//! Each request is one JSON object tagged by `cmd`; each response is one
//! `{ok, data, error}` object. The client side is blocking so the CLI can
//! use it without a runtime.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use leadable_core::{SyncName, SyncSpec};

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;
use crate::task::SyncSnapshot;

const STATUS_ATTEMPTS: u32 = 5;
const STATUS_RETRY_DELAY: Duration = Duration::from_millis(100);

fn default_autostart() -> bool {
    true
}

/// JSON newline-delimited request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DaemonRequest {
    Status,
    List,
    Create {
        spec: SyncSpec,
        #[serde(default = "default_autostart")]
        autostart: bool,
    },
    Start {
        name: SyncName,
    },
    Stop {
        name: SyncName,
    },
    Delete {
        name: SyncName,
    },
    /// `frequency` is a preset label or a bare number of minutes.
    SetFrequency {
        name: SyncName,
        frequency: String,
    },
    /// Stop every sync and exit the daemon.
    Shutdown,
}

impl DaemonRequest {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, DaemonRequest::Shutdown)
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let mut payload = serde_json::to_vec(request)?;
    payload.push(b'\n');
    stream
        .write_all(&payload)
        .and_then(|()| stream.flush())
        .map_err(|e| io_err(&socket, e))?;

    let mut line = String::new();
    let read = BufReader::new(stream)
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    Ok(serde_json::from_str(line.trim_end())?)
}

/// Daemon status, retrying briefly while a freshly spawned daemon binds.
pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..STATUS_ATTEMPTS {
        match send_request(home, &DaemonRequest::Status) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt + 1 < STATUS_ATTEMPTS {
                    sleep(STATUS_RETRY_DELAY);
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_shutdown(home: &Path) -> Result<(), DaemonError> {
    call(home, &DaemonRequest::Shutdown).map(|_| ())
}

pub fn request_list(home: &Path) -> Result<Vec<SyncSnapshot>, DaemonError> {
    decode(call(home, &DaemonRequest::List)?)
}

pub fn request_create(
    home: &Path,
    spec: SyncSpec,
    autostart: bool,
) -> Result<SyncSnapshot, DaemonError> {
    decode(call(home, &DaemonRequest::Create { spec, autostart })?)
}

pub fn request_start(home: &Path, name: SyncName) -> Result<SyncSnapshot, DaemonError> {
    decode(call(home, &DaemonRequest::Start { name })?)
}

pub fn request_stop(home: &Path, name: SyncName) -> Result<SyncSnapshot, DaemonError> {
    decode(call(home, &DaemonRequest::Stop { name })?)
}

pub fn request_delete(home: &Path, name: SyncName) -> Result<(), DaemonError> {
    call(home, &DaemonRequest::Delete { name }).map(|_| ())
}

pub fn request_set_frequency(
    home: &Path,
    name: SyncName,
    frequency: impl Into<String>,
) -> Result<SyncSnapshot, DaemonError> {
    decode(call(
        home,
        &DaemonRequest::SetFrequency {
            name,
            frequency: frequency.into(),
        },
    )?)
}

fn call(home: &Path, request: &DaemonRequest) -> Result<Value, DaemonError> {
    response_into_data(send_request(home, request)?)
}

fn decode<T: serde::de::DeserializeOwned>(data: Value) -> Result<T, DaemonError> {
    Ok(serde_json::from_value(data)?)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}
