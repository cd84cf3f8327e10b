//! # App Registry
//!
//! Caches one [`App`] per application id. The first
//! [`get_or_create`](AppRegistry::get_or_create) for an id constructs the
//! App; every later call returns that same App.
//!
//! What happens when a later call passes a different configuration is set by
//! [`RegistryPolicy`].

use crate::error::{RegistryError, Result};
use core_auth::App;
use core_runtime::config::{AppConfig, ConfigSettings};
use core_runtime::events::{CoreEvent, EventBus, Receiver};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How a cache hit with a differing configuration is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistryPolicy {
    /// Return the cached App unchanged and log a warning.
    #[default]
    ReuseExisting,
    /// Fail with [`RegistryError::ConfigConflict`].
    RejectConflicting,
}

struct Entry {
    app: App,
    settings: ConfigSettings,
    root_directory: PathBuf,
}

pub struct AppRegistry {
    apps: Mutex<HashMap<String, Entry>>,
    policy: RegistryPolicy,
    event_bus: EventBus,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::with_policy(RegistryPolicy::default())
    }

    pub fn with_policy(policy: RegistryPolicy) -> Self {
        Self {
            apps: Mutex::new(HashMap::new()),
            policy,
            event_bus: EventBus::default(),
        }
    }

    pub fn policy(&self) -> RegistryPolicy {
        self.policy
    }

    fn apps(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.apps.lock()
    }

    /// Returns the App for `app_id`, constructing and caching it on first use.
    ///
    /// Construction failures cache nothing.
    pub fn get_or_create(
        &self,
        app_id: &str,
        config: AppConfig,
        root_directory: impl Into<PathBuf>,
    ) -> Result<App> {
        let root_directory = root_directory.into();
        let mut apps = self.apps();

        if let Some(entry) = apps.get(app_id) {
            let settings = config.settings();
            if entry.settings == settings && entry.root_directory == root_directory {
                debug!(app_id, "Returning cached app");
                return Ok(entry.app.clone());
            }

            return match self.policy {
                RegistryPolicy::ReuseExisting => {
                    warn!(
                        app_id,
                        cached = ?entry.settings,
                        requested = ?settings,
                        "Ignoring differing config for cached app"
                    );
                    Ok(entry.app.clone())
                }
                RegistryPolicy::RejectConflicting => Err(RegistryError::ConfigConflict {
                    app_id: app_id.to_string(),
                    message: conflict_message(entry, &settings, &root_directory),
                }),
            };
        }

        let app = App::with_event_bus(
            app_id,
            config,
            root_directory.clone(),
            self.event_bus.clone(),
        )?;

        apps.insert(
            app_id.to_string(),
            Entry {
                app: app.clone(),
                settings: app.config().settings(),
                root_directory,
            },
        );
        info!(app_id, apps = apps.len(), "Registered app");

        Ok(app)
    }

    pub fn get(&self, app_id: &str) -> Option<App> {
        self.apps().get(app_id).map(|entry| entry.app.clone())
    }

    pub fn app_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.apps().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.apps().len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps().is_empty()
    }

    /// Events from every App this registry created.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// Drops every cached App. Handles held elsewhere keep their App alive;
    /// the next `get_or_create` for an id builds a fresh one.
    pub fn shutdown(&self) {
        let dropped = std::mem::take(&mut *self.apps());
        info!(apps = dropped.len(), "Registry shut down");
    }
}

impl Default for AppRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn conflict_message(entry: &Entry, settings: &ConfigSettings, root_directory: &Path) -> String {
    if entry.root_directory != root_directory {
        format!(
            "cached with root directory '{}', requested '{}'",
            entry.root_directory.display(),
            root_directory.display()
        )
    } else {
        format!("cached with {:?}, requested {:?}", entry.settings, settings)
    }
}
