use log::{error, warn};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, TryRecvError, channel};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{AppConfig, ConfigError, load_config_from_path};

/// Reloads the config file when it is rewritten on disk
pub struct ConfigWatcher {
    rx: Receiver<Result<Event, notify::Error>>,
    _watcher: RecommendedWatcher, // keep watcher alive while watching
    config_path: PathBuf,
    last_event_time: Instant,
}

impl ConfigWatcher {
    /// Initialize a new config watcher for the given path
    pub fn new(config_path: impl AsRef<Path>) -> Result<Self, notify::Error> {
        let (tx, rx) = channel();

        // Atomic saves replace the file, so watch the directory holding it
        let watch_dir = config_path
            .as_ref()
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut watcher = RecommendedWatcher::new(tx, Config::default())?;
        watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            rx,
            _watcher: watcher,
            config_path: config_path.as_ref().to_path_buf(),
            last_event_time: Instant::now(),
        })
    }

    /// Drain pending events and reload the file if it was written.
    ///
    /// `None` when nothing changed; otherwise the freshly loaded and
    /// validated config, or why it failed to load.
    pub fn check_for_changes(&mut self) -> Option<Result<AppConfig, ConfigError>> {
        let mut should_reload = false;

        loop {
            match self.rx.try_recv() {
                Ok(Ok(event)) => {
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == self.config_path.file_name());

                    if touches_config
                        && matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    {
                        should_reload = true;
                        self.last_event_time = Instant::now();
                    }
                }
                Ok(Err(e)) => {
                    warn!("Error watching config file: {e}");
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    error!("Config watcher channel disconnected");
                    return None;
                }
            }
        }

        if !should_reload {
            return None;
        }

        // Debounce editors that write the file several times
        let debounce_time = Duration::from_millis(250);
        let time_since_last_event = self.last_event_time.elapsed();
        if time_since_last_event < debounce_time {
            thread::sleep(debounce_time - time_since_last_event);
        }

        Some(load_config_from_path(Some(&self.config_path)))
    }

    /// Get the path of the config file being watched
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
