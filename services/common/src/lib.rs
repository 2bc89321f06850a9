use std::{
    env,
    fs,
    io,
    net::SocketAddr,
    panic,
    path::{Path, PathBuf},
    str::FromStr,
    thread,
    time::{Duration, SystemTime},
};
use tokio::net::TcpListener;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

pub struct TracingGuards {
    _file_guard: Option<WorkerGuard>,
}

/// Installs the global subscriber: stdout always, plus a daily file under
/// `$LOG_DIR/<service>` when that directory is writable.
pub fn init_tracing(service_name: &str) -> TracingGuards {
    // RUST_LOG wins over the default level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_root = log_root(service_name);
    let (file_layer, file_guard) = match daily_writer(&log_root, service_name) {
        Some((writer, guard)) => (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        ),
        None => (None, None),
    };
    let file_logging = file_layer.is_some();

    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_writer(io::stdout))
        .with(file_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);

    if file_logging {
        spawn_log_cleanup(
            log_root,
            env_or("LOG_RETENTION_DAYS", 14u64),
            env_or("LOG_CLEANUP_INTERVAL_MINUTES", 360u64),
        );
    } else {
        tracing::warn!(log_root = %log_root.display(), "file logging disabled");
    }

    TracingGuards {
        _file_guard: file_guard,
    }
}

fn log_root(service_name: &str) -> PathBuf {
    env_opt("LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/var/log/nbview"))
        .join(service_name)
}

/// Non-blocking daily appender in `root`, or `None` if it cannot be created.
fn daily_writer(root: &Path, service_name: &str) -> Option<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(root).ok()?;
    // The appender panics instead of failing when the first file cannot be opened.
    let appender = panic::catch_unwind(|| {
        tracing_appender::rolling::daily(root, format!("{service_name}.log"))
    })
    .ok()?;
    Some(tracing_appender::non_blocking(appender))
}

pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    // Parse typed environment values with a fallback.
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

/// Non-empty string value of `key`, trimmed.
pub fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Comma separated list, lowercased, empty items dropped.
pub fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env_opt(key) {
        Some(value) => value
            .split(',')
            .map(|item| item.trim().to_ascii_lowercase())
            .filter(|item| !item.is_empty())
            .collect(),
        None => default.iter().map(|item| item.to_string()).collect(),
    }
}

fn spawn_log_cleanup(log_root: PathBuf, retention_days: u64, cleanup_interval_minutes: u64) {
    if retention_days == 0 || cleanup_interval_minutes == 0 {
        return;
    }

    let retention = Duration::from_secs(retention_days * 24 * 60 * 60);
    let interval = Duration::from_secs(cleanup_interval_minutes * 60);

    thread::spawn(move || loop {
        let cutoff = SystemTime::now().checked_sub(retention);
        if let Some(cutoff) = cutoff {
            let removed = cleanup_old_logs(&log_root, cutoff);
            if removed > 0 {
                tracing::info!(removed, "expired log files removed");
            }
        }
        thread::sleep(interval);
    });
}

fn cleanup_old_logs(root: &Path, cutoff: SystemTime) -> usize {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            removed += cleanup_old_logs(&path, cutoff);
            continue;
        }
        let modified = match fs::metadata(&path).and_then(|metadata| metadata.modified()) {
            Ok(modified) => modified,
            Err(_) => continue,
        };
        if modified < cutoff && fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    removed
}

pub async fn bind_listener(port: u16) -> io::Result<TcpListener> {
    // Bind on all interfaces for container compatibility.
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr).await
}

pub async fn shutdown_signal() {
    // Handle ctrl-c and SIGTERM to allow graceful shutdown.
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "sigterm handler unavailable");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
    tracing::info!("shutdown signal received");
}
