use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock, Semaphore};

use forecourt_core::config;
use forecourt_core::types::AgentConfig;
use forecourt_sync::{process_path, ApiClient, TransferLog};

use crate::error::{io_err, DaemonError};
use crate::paths::{db_path, forecourt_root, logs_dir, socket_path, AGENT_LOG};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Immutable view of the running configuration plus the HTTP client built
/// from it. `reload` replaces the whole snapshot; a task keeps whatever it
/// cloned until it next asks.
#[derive(Clone)]
struct Snapshot {
    config: Arc<AgentConfig>,
    client: ApiClient,
}

type SharedSnapshot = Arc<RwLock<Snapshot>>;

/// Everything a socket client handler needs, cloned per connection.
#[derive(Clone)]
struct ServerContext {
    home: PathBuf,
    shared: SharedSnapshot,
    log: TransferLog,
    job_tx: mpsc::Sender<PathBuf>,
    rewatch_tx: mpsc::Sender<PathBuf>,
    shutdown_tx: broadcast::Sender<()>,
    heartbeat_at: Arc<RwLock<u64>>,
    started_at_unix: u64,
}

/// Start the agent runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    let _log_guard = init_tracing(home);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the agent runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let loaded = config::load_at(&home)?;
    if !loaded.watch_dir.is_dir() {
        return Err(DaemonError::WatchDirMissing {
            path: loaded.watch_dir,
        });
    }
    let client = ApiClient::from_config(&loaded)?;
    let shared: SharedSnapshot = Arc::new(RwLock::new(Snapshot {
        config: Arc::new(loaded),
        client,
    }));

    let log = TransferLog::open(db_path(&home)).await?;
    let heartbeat_at: Arc<RwLock<u64>> = Arc::new(RwLock::new(0));
    let started_at_unix = unix_seconds_now();

    let (job_tx, job_rx) = mpsc::channel::<PathBuf>(64);
    let (rewatch_tx, rewatch_rx) = mpsc::channel::<PathBuf>(4);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        let job_tx = job_tx.clone();
        tokio::spawn(async move {
            let result = watcher_task(shared, job_tx, rewatch_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let dispatcher_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        let log = log.clone();
        tokio::spawn(async move {
            let result = dispatcher_task(shared, log, job_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let heartbeat_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        let heartbeat_at = heartbeat_at.clone();
        tokio::spawn(async move {
            let result = heartbeat_task(shared, heartbeat_at, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let context = ServerContext {
            home: home.clone(),
            shared: shared.clone(),
            log: log.clone(),
            job_tx: job_tx.clone(),
            rewatch_tx: rewatch_tx.clone(),
            shutdown_tx: shutdown_tx.clone(),
            heartbeat_at: heartbeat_at.clone(),
            started_at_unix,
        };
        tokio::spawn(async move {
            let result = socket_server_task(context, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down agent");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, dispatcher_result, heartbeat_result, socket_result, signal_result) = tokio::join!(
        watcher_handle,
        dispatcher_handle,
        heartbeat_handle,
        socket_handle,
        signal_handle
    );

    handle_join("watcher", watcher_result)?;
    handle_join("dispatcher", dispatcher_result)?;
    handle_join("heartbeat", heartbeat_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn watcher_task(
    shared: SharedSnapshot,
    job_tx: mpsc::Sender<PathBuf>,
    mut rewatch_rx: mpsc::Receiver<PathBuf>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;

    let configured = { shared.read().await.config.watch_dir.clone() };
    let mut watched = resolve_watch_dir(&configured)?;
    watcher.watch(&watched, RecursiveMode::NonRecursive)?;
    tracing::info!(path = %watched.display(), "watching export folder");

    // Watch first, then sweep: a file landing between the two is caught
    // either by the sweep or by its own event, never missed by both.
    enqueue_backlog(&watched, &job_tx).await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_dir = rewatch_rx.recv() => {
                let Some(new_dir) = maybe_dir else { break };
                if let Err(err) = watcher.unwatch(&watched) {
                    tracing::debug!(error = %err, "unwatch of previous folder failed");
                }
                watched = resolve_watch_dir(&new_dir)?;
                watcher.watch(&watched, RecursiveMode::NonRecursive)?;
                tracing::info!(path = %watched.display(), "watching export folder");
                enqueue_backlog(&watched, &job_tx).await;
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                for path in event.paths {
                    if path.is_dir() {
                        continue;
                    }
                    if job_tx.send(path).await.is_err() {
                        return Err(DaemonError::ChannelClosed("job queue"));
                    }
                }
            }
        }
    }

    Ok(())
}

async fn dispatcher_task(
    shared: SharedSnapshot,
    log: TransferLog,
    mut job_rx: mpsc::Receiver<PathBuf>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut limit = { shared.read().await.config.upload_concurrency.max(1) };
    let mut semaphore = Arc::new(Semaphore::new(limit));
    let mut workers: Vec<tokio::task::JoinHandle<()>> = Vec::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_path = job_rx.recv() => {
                let Some(path) = maybe_path else { break };
                workers.retain(|worker| !worker.is_finished());

                let snapshot = { shared.read().await.clone() };
                let want = snapshot.config.upload_concurrency.max(1);
                if want != limit {
                    // Workers holding permits of the old semaphore finish
                    // under the old bound; only new work sees the new one.
                    limit = want;
                    semaphore = Arc::new(Semaphore::new(limit));
                }

                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Err(DaemonError::ChannelClosed("upload permits")),
                };
                let log = log.clone();
                workers.push(tokio::spawn(async move {
                    let _permit = permit;
                    match process_path(&path, &snapshot.config, &log, &snapshot.client).await {
                        Ok(outcome) => {
                            tracing::debug!(path = %path.display(), outcome = ?outcome, "pipeline finished");
                        }
                        Err(err) => {
                            tracing::error!(path = %path.display(), error = %err, "pipeline error");
                        }
                    }
                }));
            }
        }
    }

    // Let in-flight uploads finish before the runtime tears down.
    for worker in workers {
        let _ = worker.await;
    }
    Ok(())
}

async fn heartbeat_task(
    shared: SharedSnapshot,
    heartbeat_at: Arc<RwLock<u64>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        let (client, interval) = {
            let snapshot = shared.read().await;
            (snapshot.client.clone(), snapshot.config.heartbeat_interval())
        };

        match client.verify().await {
            Ok(()) => {
                *heartbeat_at.write().await = unix_seconds_now();
                tracing::debug!("heartbeat acknowledged");
            }
            Err(err) => {
                tracing::warn!(error = %err, "heartbeat failed");
            }
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    Ok(())
}

async fn socket_server_task(
    context: ServerContext,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&context.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let context = context.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, context).await {
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
    context: ServerContext,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("agent socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Result<DaemonRequest, _> = serde_json::from_str(&line);
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let cmd = request.cmd.clone();
        let response = match cmd.as_str() {
            "status" => {
                match build_status_payload(
                    &context.home,
                    &context.shared,
                    &context.log,
                    &context.heartbeat_at,
                    context.started_at_unix,
                )
                .await
                {
                    Ok(payload) => DaemonResponse::ok(payload),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            "scan" => {
                let dir = { context.shared.read().await.config.watch_dir.clone() };
                let enqueued = enqueue_backlog(&dir, &context.job_tx).await;
                DaemonResponse::ok(json!({ "enqueued": enqueued }))
            }
            "reload" => {
                match reload_config(&context.home, &context.shared, &context.rewatch_tx).await {
                    Ok(payload) => DaemonResponse::ok(payload),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            "stop" => {
                let _ = context.shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(
    home: &Path,
    shared: &SharedSnapshot,
    log: &TransferLog,
    heartbeat_at: &Arc<RwLock<u64>>,
    started_at_unix: u64,
) -> Result<Value, DaemonError> {
    let config = { shared.read().await.config.clone() };
    let counts = log.status_counts().await?;
    let last_sent = log.last_sent().await?;
    let last_heartbeat_at_unix = { *heartbeat_at.read().await };

    Ok(json!({
        "running": true,
        "started_at_unix": started_at_unix,
        "last_heartbeat_at_unix": last_heartbeat_at_unix,
        "station_id": config.station.id,
        "watch_dir": config.watch_dir.display().to_string(),
        "base_url": config.api.base_url,
        "heartbeat_interval_secs": config.heartbeat_interval_secs,
        "upload_concurrency": config.upload_concurrency,
        "counts": counts,
        "last_sent": last_sent,
        "socket": socket_path(home).display().to_string(),
    }))
}

async fn reload_config(
    home: &Path,
    shared: &SharedSnapshot,
    rewatch_tx: &mpsc::Sender<PathBuf>,
) -> Result<Value, DaemonError> {
    let home_for_load = home.to_path_buf();
    let loaded = tokio::task::spawn_blocking(move || config::load_at(&home_for_load))
        .await
        .map_err(|err| DaemonError::Protocol(format!("config reload join error: {err}")))??;

    if !loaded.watch_dir.is_dir() {
        return Err(DaemonError::WatchDirMissing {
            path: loaded.watch_dir,
        });
    }

    let config = Arc::new(loaded);
    let client = ApiClient::from_config(&config)?;

    let previous_dir = {
        let mut guard = shared.write().await;
        let previous = guard.config.watch_dir.clone();
        *guard = Snapshot {
            config: config.clone(),
            client,
        };
        previous
    };

    let watch_changed = previous_dir != config.watch_dir;
    if watch_changed {
        rewatch_tx
            .send(config.watch_dir.clone())
            .await
            .map_err(|_| DaemonError::ChannelClosed("rewatch queue"))?;
    }

    tracing::info!(
        watch_dir = %config.watch_dir.display(),
        watch_changed,
        "configuration reloaded",
    );
    Ok(json!({
        "reloaded": true,
        "watch_dir": config.watch_dir.display().to_string(),
        "watch_changed": watch_changed,
    }))
}

/// List `dir` and feed every top-level file into the job queue.
///
/// Returns the number enqueued. Listing failures are logged, never raised;
/// a missing or unreadable folder must not take the agent down mid-run.
async fn enqueue_backlog(dir: &Path, job_tx: &mpsc::Sender<PathBuf>) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(path = %dir.display(), error = %err, "backlog sweep failed");
            return 0;
        }
    };

    let mut enqueued = 0usize;
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let is_file = entry
                    .file_type()
                    .await
                    .map(|ty| ty.is_file())
                    .unwrap_or(false);
                if is_file && job_tx.send(entry.path()).await.is_ok() {
                    enqueued += 1;
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(path = %dir.display(), error = %err, "backlog sweep read error");
                break;
            }
        }
    }

    tracing::info!(path = %dir.display(), enqueued, "backlog sweep finished");
    enqueued
}

fn resolve_watch_dir(dir: &Path) -> Result<PathBuf, DaemonError> {
    if !dir.is_dir() {
        return Err(DaemonError::WatchDirMissing {
            path: dir.to_path_buf(),
        });
    }
    // Canonicalize so FSEvents paths (real paths, e.g. /private/var/... on
    // macOS) line up with what the pipeline is handed.
    Ok(fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf()))
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "agent socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale agent socket before bind",
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
    let root = forecourt_root(home);
    if !root.exists() {
        fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    let logs = logs_dir(home);
    if !logs.exists() {
        fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("agent socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("agent socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("agent socket flush", e))?;
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

fn init_tracing(home: &Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let logs = logs_dir(home);
    let mut guard = None;
    let file_layer = match fs::create_dir_all(&logs) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&logs, AGENT_LOG);
            let (writer, appender_guard) = tracing_appender::non_blocking(appender);
            guard = Some(appender_guard);
            Some(fmt::layer().with_writer(writer).with_ansi(false))
        }
        Err(err) => {
            eprintln!("warning: no log directory at {}: {err}", logs.display());
            None
        }
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(fmt::layer().with_target(false))
        .try_init();

    guard
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
