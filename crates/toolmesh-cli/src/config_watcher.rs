//! Config hot-reload watcher.
//!
//! Watches the MCP server configuration file and hands the new text to a
//! callback after a debounce window. Text that does not parse is logged and
//! never delivered, so a half-saved edit cannot reach the reconciler.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use toolmesh_core::{ToolMeshError, ToolMeshResult};
use toolmesh_mcp::parse_config;

/// Watches a config file on disk and calls back on every (debounced) change.
///
/// Dropping the watcher stops the background thread.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `config_path`.
    ///
    /// The parent directory is watched rather than the file itself so that
    /// editors that save by rename are still picked up.
    pub fn start<F>(config_path: PathBuf, debounce_ms: u64, on_reload: F) -> ToolMeshResult<Self>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let file_name = config_path
            .file_name()
            .map(ToOwned::to_owned)
            .ok_or_else(|| watch_error(&config_path, "path has no file name"))?;
        let dir = match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = std_mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    && event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                if relevant {
                    let _ = tx.send(());
                }
            }
        })
        .map_err(|e| watch_error(&config_path, &format!("failed to create file watcher: {e}")))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| watch_error(&config_path, &format!("failed to watch directory: {e}")))?;

        let path = config_path.clone();
        std::thread::spawn(move || {
            let mut last_reload = std::time::Instant::now();
            let debounce = std::time::Duration::from_millis(debounce_ms);

            while rx.recv().is_ok() {
                // Coalesce a burst of writes into one reload.
                while rx.try_recv().is_ok() {}

                let since = last_reload.elapsed();
                if since < debounce {
                    std::thread::sleep(debounce - since);
                }
                last_reload = std::time::Instant::now();

                match load_config(&path) {
                    Ok(text) => on_reload(text),
                    Err(e) => tracing::warn!(error = %e, "Failed to reload MCP config"),
                }
            }

            tracing::debug!("Config watcher thread exiting");
        });

        tracing::info!(path = %config_path.display(), "Config hot-reload watcher started");

        Ok(Self { _watcher: watcher })
    }
}

fn watch_error(path: &Path, reason: &str) -> ToolMeshError {
    ToolMeshError::Io(std::io::Error::other(format!(
        "Cannot watch '{}': {reason}",
        path.display()
    )))
}

/// Reads the config file as text.
pub fn read_config(path: &Path) -> ToolMeshResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        ToolMeshError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read config '{}': {e}", path.display()),
        ))
    })
}

/// Reads the config file and checks that it parses.
pub fn load_config(path: &Path) -> ToolMeshResult<String> {
    let text = read_config(path)?;
    parse_config(&text).map_err(|e| {
        ToolMeshError::ConfigParse(format!("Failed to parse config '{}': {e}", path.display()))
    })?;
    Ok(text)
}
