use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use leadable_core::config::{self, leadable_root};
use leadable_core::{AppConfig, Frequency};
use leadable_sync::{build_client, GoogleSheetStore, GraphRecordSource};

use crate::error::{io_err, DaemonError, EngineError};
use crate::paths::socket_path;
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::registry::SyncRegistry;
use crate::status::StatusSink;
use crate::task::EngineTiming;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime against the live Graph and Sheets APIs.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    let config = config::load_at(&home)?;
    let registry = Arc::new(build_registry(&config)?);
    serve(home, registry).await
}

/// Wire the HTTP-backed collaborators from `config`.
pub fn build_registry(config: &AppConfig) -> Result<SyncRegistry, DaemonError> {
    let client = build_client(config.request_timeout())
        .map_err(|e| DaemonError::HttpClient(e.to_string()))?;
    Ok(SyncRegistry::new(
        Arc::new(GraphRecordSource::from_config(client.clone(), config)),
        Arc::new(GoogleSheetStore::from_config(client, config)),
        StatusSink::default(),
        EngineTiming::from(config),
    ))
}

/// Serve the control socket until a shutdown request or ctrl-c, then stop
/// every sync in `registry`.
pub async fn serve(home: PathBuf, registry: Arc<SyncRegistry>) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let started_at_unix = unix_seconds_now();
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let registry = registry.clone();
        let home = home.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                registry,
                shutdown.clone(),
                shutdown_rx,
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    tracing::info!(socket = %socket_path(&home).display(), "daemon listening");
    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);

    registry.stop_all().await;
    tracing::info!("all syncs stopped; daemon exiting");

    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn socket_server_task(
    home: PathBuf,
    registry: Arc<SyncRegistry>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let registry = registry.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) =
                        handle_socket_client(stream, registry, shutdown_tx, started_at_unix).await
                    {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    registry: Arc<SyncRegistry>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request: {err}")),
                )
                .await?;
                continue;
            }
        };

        let shutdown = request.is_shutdown();
        let response = dispatch(&registry, request, started_at_unix).await;
        write_response(&mut writer, &response).await?;
        if shutdown {
            let _ = shutdown_tx.send(());
            break;
        }
    }

    Ok(())
}

/// Apply one control request to the registry.
pub async fn dispatch(
    registry: &SyncRegistry,
    request: DaemonRequest,
    started_at_unix: u64,
) -> DaemonResponse {
    let result: Result<Value, EngineError> = match request {
        DaemonRequest::Status => Ok(json!({
            "running": true,
            "pid": std::process::id(),
            "started_at_unix": started_at_unix,
            "syncs": registry.list().await.len(),
            "active": registry.running_count().await,
        })),
        DaemonRequest::List => Ok(json!(registry.list().await)),
        DaemonRequest::Create { spec, autostart } => match registry.create(spec).await {
            Ok(created) if autostart => registry.start(&created.name).await.map(|s| json!(s)),
            Ok(created) => Ok(json!(created)),
            Err(err) => Err(err),
        },
        DaemonRequest::Start { name } => registry.start(&name).await.map(|s| json!(s)),
        DaemonRequest::Stop { name } => registry.stop(&name).await.map(|s| json!(s)),
        DaemonRequest::Delete { name } => registry
            .delete(&name)
            .await
            .map(|()| json!({ "deleted": name })),
        DaemonRequest::SetFrequency { name, frequency } => {
            match Frequency::from_label(&frequency) {
                Ok(frequency) => registry
                    .set_frequency(&name, frequency)
                    .await
                    .map(|s| json!(s)),
                Err(err) => Err(err.into()),
            }
        }
        DaemonRequest::Shutdown => Ok(json!({ "stopping": true })),
    };

    match result {
        Ok(data) => DaemonResponse::ok(data),
        Err(err) => {
            tracing::debug!(error = %err, "request rejected");
            DaemonResponse::error(err.to_string())
        }
    }
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = leadable_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    writer
        .write_all(&payload)
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
