// !top: leaderboard of the largest balances.

use super::{Persisted, Script};
use crate::command::ChatCommand;
use crate::error::SettingsError;
use crate::host::Host;
use crate::routing::{format_positional, render, MessageDispatcher, Placeholders};
use crate::settings::TopSettings;
use std::path::Path;

/// Rank rows by balance, highest first; equal balances by name.
pub fn rank(mut rows: Vec<(String, i64)>) -> Vec<(String, i64)> {
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows
}

/// One line per ranked row using `entry_format` (`{0}` position, `{1}` name, `{2}` points).
pub fn leaderboard_lines(entry_format: &str, rows: &[(String, i64)]) -> Vec<String> {
    rows.iter()
        .enumerate()
        .map(|(i, (name, points))| format_positional(entry_format, &[&(i + 1), name, points]))
        .collect()
}

pub struct TopScript {
    settings: Persisted<TopSettings>,
}

impl TopScript {
    pub fn new(settings: TopSettings) -> Self {
        Self {
            settings: Persisted::in_memory(settings),
        }
    }

    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            settings: Persisted::from_dir(dir),
        }
    }

    /// The message sent, if the command was handled.
    pub fn handle<H: Host + ?Sized>(&self, cmd: &ChatCommand, host: &mut H) -> Option<String> {
        let s = self.settings.cell.get();
        if !cmd.is_command(&s.command) {
            return None;
        }
        if s.only_live && !host.is_live() {
            return None;
        }

        let rows = rank(host.top_currency(s.top_size));
        let message = if rows.is_empty() {
            let currency = host.currency_name();
            let vars = Placeholders {
                user: &cmd.user_name,
                currency: &currency,
                ..Placeholders::default()
            };
            render(&s.empty_response, &[&currency], &vars)
        } else {
            leaderboard_lines(&s.entry_format, &rows[..rows.len().min(s.top_size)]).join("\n")
        };

        MessageDispatcher::new(s.usage).reply(host, &cmd.participant(), &message);
        Some(message)
    }
}

impl Script for TopScript {
    fn name(&self) -> &'static str {
        "Top10"
    }

    fn execute(&mut self, cmd: &ChatCommand, host: &mut dyn Host) {
        self.handle(cmd, host);
    }

    fn reload_settings(&mut self, json: &str, _host: &mut dyn Host) -> Result<(), SettingsError> {
        self.settings.cell.reload(json)
    }

    fn save_settings(&mut self, _host: &mut dyn Host) {
        self.settings.save(self.name());
    }
}
