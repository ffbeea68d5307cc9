// !donate <amount>: spend points toward a real-currency donation goal.
// The running total lives in the settings file and is pushed to overlays as
// EVENT_DONATION after every change.

use super::{Persisted, Script};
use crate::command::ChatCommand;
use crate::error::{parse_amount, SettingsError};
use crate::host::Host;
use crate::math::progress_percent;
use crate::routing::{render, MessageDispatcher, Placeholders};
use crate::settings::DonateSettings;
use crate::EVENT_DONATION;
use serde::Serialize;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DonateOutcome {
    Ignored,
    InvalidAmount,
    InsufficientFunds { cost: i64, balance: i64 },
    Donated { amount: i64, cost: i64, total: i64 },
}

/// Overlay payload for EVENT_DONATION.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DonationProgress {
    pub progress: u8,
    pub goal: i64,
    pub value: i64,
    /// False only for a fresh donation; the overlay plays `DonateSound` then.
    pub quiet: bool,
}

impl DonationProgress {
    pub fn of(settings: &DonateSettings, quiet: bool) -> Self {
        Self {
            progress: progress_percent(settings.donate_value, settings.donate_goal),
            goal: settings.donate_goal,
            value: settings.donate_value,
            quiet,
        }
    }
}

pub struct DonateScript {
    settings: Persisted<DonateSettings>,
}

impl DonateScript {
    pub fn new(settings: DonateSettings) -> Self {
        Self {
            settings: Persisted::in_memory(settings),
        }
    }

    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            settings: Persisted::from_dir(dir),
        }
    }

    pub fn settings(&self) -> std::sync::Arc<DonateSettings> {
        self.settings.cell.get()
    }

    pub fn broadcast_progress<H: Host + ?Sized>(&self, host: &mut H, quiet: bool) {
        let progress = DonationProgress::of(&self.settings.cell.get(), quiet);
        match serde_json::to_string(&progress) {
            Ok(payload) => host.broadcast_ws_event(EVENT_DONATION, &payload),
            Err(err) => tracing::error!(error = %err, "failed to encode donation progress"),
        }
    }

    pub fn handle<H: Host + ?Sized>(&self, cmd: &ChatCommand, host: &mut H) -> DonateOutcome {
        let s = self.settings.cell.get();
        if !cmd.is_command(&s.command) {
            return DonateOutcome::Ignored;
        }
        if s.only_live && !host.is_live() {
            return DonateOutcome::Ignored;
        }

        let sender = cmd.participant();
        let points_currency = host.currency_name();
        let dispatcher = MessageDispatcher::new(s.usage);
        let vars = Placeholders {
            user: &cmd.user_name,
            currency: &points_currency,
            target: "",
            permission: "",
            permission_info: "",
        };

        let amount = match parse_amount(cmd.param(1)) {
            Ok(amount) => amount,
            Err(_) => {
                let msg = render(&s.invalid_amount_response, &[&cmd.user_name, &s.command], &vars);
                dispatcher.reply(host, &sender, &msg);
                return DonateOutcome::InvalidAmount;
            }
        };

        let cost = amount.saturating_mul(s.conversion_rate.max(0));
        let balance = host.get_points(&cmd.user);
        if balance < cost {
            let msg = render(
                &s.fail_response,
                &[&cmd.user_name, &points_currency, &amount, &s.currency_name],
                &vars,
            );
            dispatcher.reply(host, &sender, &msg);
            return DonateOutcome::InsufficientFunds { cost, balance };
        }

        if !host.remove_points(&cmd.user, &cmd.user_name, cost) {
            tracing::warn!(user = %cmd.user, cost, "ledger refused donation debit");
            let msg = render(
                &s.fail_response,
                &[&cmd.user_name, &points_currency, &amount, &s.currency_name],
                &vars,
            );
            dispatcher.reply(host, &sender, &msg);
            return DonateOutcome::InsufficientFunds { cost, balance };
        }

        let msg = render(&s.success_response, &[&cmd.user_name, &amount, &s.currency_name], &vars);
        dispatcher.reply(host, &sender, &msg);

        let mut next = (*s).clone();
        next.donate_value = next.donate_value.saturating_add(amount);
        let total = next.donate_value;
        self.settings.cell.replace(next);
        tracing::info!(user = %cmd.user, amount, cost, total, "donation recorded");

        self.settings.save("Donate");
        self.broadcast_progress(host, false);
        DonateOutcome::Donated { amount, cost, total }
    }
}

impl Script for DonateScript {
    fn name(&self) -> &'static str {
        "Donate"
    }

    fn execute(&mut self, cmd: &ChatCommand, host: &mut dyn Host) {
        self.handle(cmd, host);
    }

    fn reload_settings(&mut self, json: &str, host: &mut dyn Host) -> Result<(), SettingsError> {
        self.settings.cell.reload(json)?;
        self.broadcast_progress(host, true);
        Ok(())
    }

    fn save_settings(&mut self, host: &mut dyn Host) {
        self.settings.save(self.name());
        self.broadcast_progress(host, true);
    }
}
