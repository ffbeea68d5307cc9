// Chat front-end for the raffle engine: start / join / pick commands plus the
// timed auto-pick driven from `tick`.

use super::{Persisted, Script};
use crate::command::ChatCommand;
use crate::error::SettingsError;
use crate::host::Host;
use crate::raffle::{PickOutcome, RaffleEngine};
use crate::routing::{render, MessageDispatcher, Placeholders};
use crate::settings::RaffleSettings;
use std::path::Path;

pub struct RaffleScript {
    settings: Persisted<RaffleSettings>,
    engine: RaffleEngine,
}

impl RaffleScript {
    pub fn new(settings: RaffleSettings) -> Self {
        Self::with_engine(settings, RaffleEngine::new())
    }

    pub fn with_engine(settings: RaffleSettings, engine: RaffleEngine) -> Self {
        Self {
            settings: Persisted::in_memory(settings),
            engine,
        }
    }

    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            settings: Persisted::from_dir(dir),
            engine: RaffleEngine::new(),
        }
    }

    pub fn engine(&self) -> &RaffleEngine {
        &self.engine
    }

    fn pick_on_command<H: Host + ?Sized>(&self, cmd: &ChatCommand, host: &mut H) -> Option<PickOutcome> {
        let s = self.settings.cell.get();
        let requester = cmd.participant();
        if !host.has_permission(&cmd.user, &s.permission, &s.permission_info) {
            let currency = host.currency_name();
            let vars = Placeholders {
                user: &cmd.user_name,
                currency: &currency,
                target: "",
                permission: &s.permission,
                permission_info: &s.permission_info,
            };
            let msg = render(
                &s.permission_response,
                &[&cmd.user_name, &s.permission, &s.permission_info],
                &vars,
            );
            MessageDispatcher::new(s.usage).reply(host, &requester, &msg);
            return None;
        }
        self.engine.pick_winner(&requester, &s, host)
    }

    /// Auto-pick once the join window has run its configured length.
    pub fn check_timer<H: Host + ?Sized>(&self, host: &mut H) -> Option<PickOutcome> {
        let s = self.settings.cell.get();
        if s.join_duration_secs == 0 {
            return None;
        }
        let open_for = self.engine.open_for_ms(host.now_ms())?;
        if open_for < s.join_duration_secs.saturating_mul(1_000) {
            return None;
        }
        let started_by = self.engine.session()?.started_by().clone();
        tracing::debug!(open_for_ms = open_for, "raffle window elapsed");
        self.engine.pick_winner(&started_by, &s, host)
    }
}

impl Script for RaffleScript {
    fn name(&self) -> &'static str {
        "Raffle"
    }

    fn execute(&mut self, cmd: &ChatCommand, host: &mut dyn Host) {
        let s = self.settings.cell.get();
        if cmd.is_command(&s.command) {
            self.engine.start(&cmd.participant(), cmd.param(1), &s, host);
        } else if cmd.is_command(&s.join_command) {
            self.engine.join(&cmd.participant(), &s, host);
        } else if cmd.is_command(&s.pick_command) {
            self.pick_on_command(cmd, host);
        }
    }

    fn tick(&mut self, host: &mut dyn Host) {
        self.check_timer(host);
    }

    fn reload_settings(&mut self, json: &str, _host: &mut dyn Host) -> Result<(), SettingsError> {
        self.settings.cell.reload(json)
    }

    fn save_settings(&mut self, _host: &mut dyn Host) {
        self.settings.save(self.name());
    }
}
