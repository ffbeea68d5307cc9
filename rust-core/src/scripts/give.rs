// !give <user> <amount>: move points to another viewer, sender pays a fee on top.

use super::{Persisted, Script};
use crate::command::ChatCommand;
use crate::error::{parse_amount, SettingsError};
use crate::host::Host;
use crate::routing::{render, MessageDispatcher, Placeholders};
use crate::settings::GiveSettings;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GiveOutcome {
    Ignored,
    InvalidAmount,
    SelfTarget,
    InsufficientFunds { needed: i64, balance: i64 },
    InactiveTarget,
    Transferred { amount: i64, fee: i64 },
}

pub struct GiveScript {
    settings: Persisted<GiveSettings>,
}

impl GiveScript {
    pub fn new(settings: GiveSettings) -> Self {
        Self {
            settings: Persisted::in_memory(settings),
        }
    }

    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            settings: Persisted::from_dir(dir),
        }
    }

    pub fn settings(&self) -> std::sync::Arc<GiveSettings> {
        self.settings.cell.get()
    }

    pub fn handle<H: Host + ?Sized>(&self, cmd: &ChatCommand, host: &mut H) -> GiveOutcome {
        let s = self.settings.cell.get();
        if !cmd.is_command(&s.command) {
            return GiveOutcome::Ignored;
        }
        if s.only_live && !host.is_live() {
            return GiveOutcome::Ignored;
        }

        let sender = cmd.participant();
        let target = cmd.param(1);
        let currency = host.currency_name();
        let dispatcher = MessageDispatcher::new(s.usage);
        let vars = Placeholders {
            user: &cmd.user_name,
            currency: &currency,
            target,
            permission: "",
            permission_info: "",
        };

        let amount = match parse_amount(cmd.param(2)) {
            Ok(amount) if !target.is_empty() => amount,
            _ => {
                let msg = render(&s.invalid_amount_response, &[&cmd.user_name, &s.command], &vars);
                dispatcher.reply(host, &sender, &msg);
                return GiveOutcome::InvalidAmount;
            }
        };

        let target_id = target.to_lowercase();
        if target_id == cmd.user {
            let msg = render(&s.invalid_target_response, &[&cmd.user_name, &currency], &vars);
            dispatcher.reply(host, &sender, &msg);
            return GiveOutcome::SelfTarget;
        }

        let fee = s.fee.fee_on(amount);
        let needed = amount.saturating_add(fee);
        let balance = host.get_points(&cmd.user);
        if balance < needed {
            let msg = render(&s.fail_response, &[&cmd.user_name, &currency, &amount, &fee], &vars);
            dispatcher.reply(host, &sender, &msg);
            return GiveOutcome::InsufficientFunds { needed, balance };
        }

        if !host.add_points(&target_id, target, amount) {
            let msg = render(&s.inactive_response, &[&target], &vars);
            dispatcher.reply(host, &sender, &msg);
            return GiveOutcome::InactiveTarget;
        }

        if !host.remove_points(&cmd.user, &cmd.user_name, needed) {
            // the balance moved since the check; take the credit back
            if !host.remove_points(&target_id, target, amount) {
                tracing::error!(user = %target_id, amount, "could not reverse give credit");
            }
            let balance = host.get_points(&cmd.user);
            tracing::warn!(user = %cmd.user, needed, balance, "ledger refused give debit");
            let msg = render(&s.fail_response, &[&cmd.user_name, &currency, &amount, &fee], &vars);
            dispatcher.reply(host, &sender, &msg);
            return GiveOutcome::InsufficientFunds { needed, balance };
        }
        tracing::info!(from = %cmd.user, to = %target_id, amount, fee, "points transferred");

        let msg = render(
            &s.success_response,
            &[&cmd.user_name, &amount, &currency, &target, &fee],
            &vars,
        );
        dispatcher.reply(host, &sender, &msg);
        GiveOutcome::Transferred { amount, fee }
    }
}

impl Script for GiveScript {
    fn name(&self) -> &'static str {
        "Give"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Platform;
    use crate::host::testing::HookedHost;
    use crate::host::{CurrencyLedger, MemoryHost};

    fn setup() -> (GiveScript, MemoryHost) {
        let mut host = MemoryHost::new("coins");
        host.register("Alice", 1_000);
        host.register("Bob", 0);
        (GiveScript::new(GiveSettings::default()), host)
    }

    fn give(line: &str) -> ChatCommand {
        ChatCommand::parse("Alice", line, Platform::Stream, false)
    }

    #[test]
    fn transfer_charges_fee_to_sender() {
        let (script, mut host) = setup();
        let out = script.handle(&give("!give Bob 100"), &mut host);
        assert_eq!(out, GiveOutcome::Transferred { amount: 100, fee: 2 });
        assert_eq!(host.get_points("bob"), 100);
        assert_eq!(host.get_points("alice"), 898);
        assert_eq!(host.outbox()[0].text, "Alice has transferred 100 coins to Bob");
    }

    #[test]
    fn insufficient_funds_counts_the_fee() {
        let (script, mut host) = setup();
        // 1000 + ceil(20) > 1000
        let out = script.handle(&give("!give Bob 1000"), &mut host);
        assert_eq!(out, GiveOutcome::InsufficientFunds { needed: 1_020, balance: 1_000 });
        assert_eq!(host.get_points("alice"), 1_000);
        assert_eq!(host.get_points("bob"), 0);
        assert_eq!(
            host.outbox()[0].text,
            "Alice does not have enough coins to transfer 1000 (20 fee)"
        );
    }

    #[test]
    fn malformed_amounts_are_rejected_without_mutation() {
        let (script, mut host) = setup();
        for line in ["!give Bob", "!give Bob ten", "!give Bob -5", "!give Bob 0", "!give"] {
            assert_eq!(script.handle(&give(line), &mut host), GiveOutcome::InvalidAmount, "{}", line);
        }
        assert_eq!(host.get_points("alice"), 1_000);
        assert_eq!(host.outbox()[0].text, "Alice, usage: !give <user> <amount>");
    }

    #[test]
    fn unknown_target_is_inactive() {
        let (script, mut host) = setup();
        let out = script.handle(&give("!give Carol 10"), &mut host);
        assert_eq!(out, GiveOutcome::InactiveTarget);
        assert_eq!(host.get_points("alice"), 1_000);
        assert_eq!(host.outbox()[0].text, "Carol is not currently active.");
    }

    #[test]
    fn cannot_give_to_self() {
        let (script, mut host) = setup();
        let out = script.handle(&give("!give ALICE 10"), &mut host);
        assert_eq!(out, GiveOutcome::SelfTarget);
        assert_eq!(host.get_points("alice"), 1_000);
        assert_eq!(host.outbox()[0].text, "Alice, you cannot give coins to yourself.");
    }

    #[test]
    fn other_commands_and_offline_are_ignored() {
        let (_, mut host) = setup();
        let script = GiveScript::new(GiveSettings {
            only_live: true,
            ..GiveSettings::default()
        });
        assert_eq!(script.handle(&give("!donate 5"), &mut host), GiveOutcome::Ignored);
        host.set_live(false);
        assert_eq!(script.handle(&give("!give Bob 5"), &mut host), GiveOutcome::Ignored);
        assert!(host.outbox().is_empty());
    }

    #[test]
    fn reload_changes_fee() {
        let (mut script, mut host) = setup();
        script.reload_settings(r#"{"Fee":10}"#, &mut host).unwrap();
        let out = script.handle(&give("!give Bob 100"), &mut host);
        assert_eq!(out, GiveOutcome::Transferred { amount: 100, fee: 10 });
        assert_eq!(host.get_points("alice"), 890);
    }

    #[test]
    fn whisper_requests_are_answered_by_whisper_when_routed() {
        let (_, mut host) = setup();
        let script = GiveScript::new(GiveSettings {
            usage: crate::routing::RoutingMode::All,
            ..GiveSettings::default()
        });
        let cmd = ChatCommand::parse("Alice", "!give Bob 1", Platform::Stream, true);
        script.handle(&cmd, &mut host);
        assert_eq!(host.outbox()[0].to.as_deref(), Some("alice"));
        assert_eq!(host.get_points("bob"), 1);
    }

    #[test]
    fn refused_debit_reverses_the_credit() {
        let (script, host) = setup();
        let mut host = HookedHost::new(host);
        host.refuse_debits_from.push("alice".to_string());
        let out = script.handle(&give("!give Bob 100"), &mut host);
        assert_eq!(out, GiveOutcome::InsufficientFunds { needed: 102, balance: 1_000 });
        assert_eq!(host.get_points("alice"), 1_000);
        assert_eq!(host.get_points("bob"), 0);
        assert_eq!(host.inner.outbox().len(), 1);
        assert_eq!(
            host.inner.outbox()[0].text,
            "Alice does not have enough coins to transfer 100 (2 fee)"
        );
    }

    #[test]
    fn fractional_fee_from_settings() {
        let (mut script, mut host) = setup();
        script
            .reload_settings(r#"{"Command":"!send","Fee":2.5}"#, &mut host)
            .unwrap();
        let out = script.handle(&give("!send Bob 100"), &mut host);
        assert_eq!(out, GiveOutcome::Transferred { amount: 100, fee: 3 });
        assert_eq!(host.get_points("alice"), 897);
    }
}
