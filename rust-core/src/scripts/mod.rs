//! Chat scripts and the runner that feeds them.
//!
//! Each script owns its settings (and optionally the file they live in) and
//! reacts to the commands it recognises; everything else is ignored.

pub mod donate;
pub mod give;
pub mod raffle;
pub mod top;

use crate::command::ChatCommand;
use crate::error::SettingsError;
use crate::host::Host;
use crate::settings::{SettingsCell, SettingsStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

pub use donate::DonateScript;
pub use give::GiveScript;
pub use raffle::RaffleScript;
pub use top::TopScript;

/// Host-facing plugin surface: execute on every chat line, tick periodically,
/// reload/save when the host UI saves settings.
pub trait Script {
    fn name(&self) -> &'static str;

    fn execute(&mut self, cmd: &ChatCommand, host: &mut dyn Host);

    fn tick(&mut self, _host: &mut dyn Host) {}

    /// Replace settings from the JSON the host UI sends. Old settings stay on error.
    fn reload_settings(&mut self, json: &str, host: &mut dyn Host) -> Result<(), SettingsError>;

    /// Persist current settings. Failures are logged, never raised.
    fn save_settings(&mut self, host: &mut dyn Host);
}

/// Settings value plus its optional backing file.
pub(crate) struct Persisted<T> {
    pub(crate) cell: SettingsCell<T>,
    store: Option<SettingsStore>,
}

impl<T: Serialize + DeserializeOwned + Default> Persisted<T> {
    pub(crate) fn in_memory(settings: T) -> Self {
        Self {
            cell: SettingsCell::new(settings),
            store: None,
        }
    }

    pub(crate) fn from_dir<P: AsRef<Path>>(dir: P) -> Self {
        let store = SettingsStore::in_dir(dir);
        Self {
            cell: SettingsCell::new(store.load_or_default()),
            store: Some(store),
        }
    }

    pub(crate) fn save(&self, script: &str) {
        let Some(store) = &self.store else {
            return;
        };
        let current = self.cell.get();
        if let Err(err) = store.save(&*current) {
            tracing::error!(script, error = %err, "failed to save settings");
        }
    }
}

/// Fans every command and tick out to all loaded scripts, in load order.
#[derive(Default)]
pub struct ScriptRunner {
    scripts: Vec<Box<dyn Script>>,
}

impl ScriptRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, script: Box<dyn Script>) {
        tracing::info!(script = script.name(), "script loaded");
        self.scripts.push(script);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.scripts.iter().map(|s| s.name()).collect()
    }

    pub fn execute(&mut self, cmd: &ChatCommand, host: &mut dyn Host) {
        for script in &mut self.scripts {
            script.execute(cmd, host);
        }
    }

    pub fn tick(&mut self, host: &mut dyn Host) {
        for script in &mut self.scripts {
            script.tick(host);
        }
    }

    /// Route a settings reload to the named script (case-insensitive).
    /// Returns false if no script has that name.
    pub fn reload_settings(&mut self, name: &str, json: &str, host: &mut dyn Host) -> bool {
        let Some(script) = self
            .scripts
            .iter_mut()
            .find(|s| s.name().eq_ignore_ascii_case(name))
        else {
            return false;
        };
        if let Err(err) = script.reload_settings(json, host) {
            tracing::warn!(script = script.name(), error = %err, "settings reload rejected");
        }
        true
    }

    pub fn save_all(&mut self, host: &mut dyn Host) {
        for script in &mut self.scripts {
            script.save_settings(host);
        }
    }
}
