// Capabilities the streaming-bot host lends to the scripts.
// The scripts never own balances, chat connections or permission data; they
// only call through these traits. `MemoryHost` is the in-process reference
// host used by the binary and the tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Points ledger owned by the host.
pub trait CurrencyLedger {
    /// Credit points. Returns false when the user is unknown/inactive.
    fn add_points(&mut self, user: &str, user_name: &str, amount: i64) -> bool;
    /// Debit points. Returns false when the user cannot cover it.
    fn remove_points(&mut self, user: &str, user_name: &str, amount: i64) -> bool;
    fn get_points(&self, user: &str) -> i64;
    fn currency_name(&self) -> String;
    /// Up to `count` (display name, points) pairs with the largest balances. Order unspecified.
    fn top_currency(&self, count: usize) -> Vec<(String, i64)>;
}

/// Raw chat channels.
pub trait MessageSink {
    fn send_stream_message(&mut self, message: &str);
    fn send_stream_whisper(&mut self, user: &str, message: &str);
    fn send_discord_message(&mut self, message: &str);
    fn send_discord_dm(&mut self, user: &str, message: &str);
}

pub trait PermissionCheck {
    fn has_permission(&self, user: &str, permission: &str, info: &str) -> bool;
}

pub trait StreamStatus {
    fn is_live(&self) -> bool;
}

/// Websocket fan-out to browser overlays.
pub trait EventBroadcaster {
    fn broadcast_ws_event(&mut self, event: &str, payload: &str);
}

/// Injected time source, milliseconds since the unix epoch.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Everything a script may call.
pub trait Host:
    CurrencyLedger + MessageSink + PermissionCheck + StreamStatus + EventBroadcaster + Clock
{
}

impl<T> Host for T where
    T: CurrencyLedger + MessageSink + PermissionCheck + StreamStatus + EventBroadcaster + Clock
{
}

/// Which raw channel a message went out on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    StreamChat,
    StreamWhisper,
    DiscordChat,
    DiscordWhisper,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: Channel,
    /// Recipient for whispers/DMs.
    pub to: Option<String>,
    pub text: String,
}

#[derive(Clone, Debug)]
struct Account {
    user_name: String,
    points: i64,
}

/// Permission level every user holds.
pub const PERMISSION_EVERYONE: &str = "Everyone";

pub type EventListener = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// In-memory host: ledger, outbox, permission table, live flag and a settable clock.
pub struct MemoryHost {
    currency: String,
    accounts: HashMap<String, Account>,
    grants: HashMap<String, HashSet<String>>,
    live: bool,
    now_ms: u64,
    outbox: Vec<SentMessage>,
    events: Vec<(String, String)>,
    listener: Option<EventListener>,
}

impl MemoryHost {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            accounts: HashMap::new(),
            grants: HashMap::new(),
            live: true,
            now_ms: 0,
            outbox: Vec::new(),
            events: Vec::new(),
            listener: None,
        }
    }

    /// Make a viewer known to the ledger. Existing balances are kept.
    pub fn register(&mut self, user_name: &str, points: i64) {
        self.accounts
            .entry(user_name.to_lowercase())
            .or_insert_with(|| Account {
                user_name: user_name.to_string(),
                points,
            });
    }

    pub fn is_registered(&self, user: &str) -> bool {
        self.accounts.contains_key(&user.to_lowercase())
    }

    pub fn grant(&mut self, user: &str, permission: &str) {
        self.grants
            .entry(user.to_lowercase())
            .or_default()
            .insert(permission.to_lowercase());
    }

    pub fn set_live(&mut self, live: bool) {
        self.live = live;
    }

    pub fn set_now_ms(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    pub fn advance_ms(&mut self, delta: u64) {
        self.now_ms = self.now_ms.saturating_add(delta);
    }

    pub fn set_event_listener(&mut self, listener: EventListener) {
        self.listener = Some(listener);
    }

    pub fn outbox(&self) -> &[SentMessage] {
        &self.outbox
    }

    /// Take everything sent since the last drain.
    pub fn drain_outbox(&mut self) -> Vec<SentMessage> {
        std::mem::take(&mut self.outbox)
    }

    pub fn events(&self) -> &[(String, String)] {
        &self.events
    }

    fn push(&mut self, channel: Channel, to: Option<&str>, message: &str) {
        self.outbox.push(SentMessage {
            channel,
            to: to.map(str::to_string),
            text: message.to_string(),
        });
    }
}

impl CurrencyLedger for MemoryHost {
    fn add_points(&mut self, user: &str, _user_name: &str, amount: i64) -> bool {
        match self.accounts.get_mut(&user.to_lowercase()) {
            Some(acct) => {
                acct.points = acct.points.saturating_add(amount);
                true
            }
            None => false,
        }
    }

    fn remove_points(&mut self, user: &str, _user_name: &str, amount: i64) -> bool {
        match self.accounts.get_mut(&user.to_lowercase()) {
            Some(acct) if acct.points >= amount => {
                acct.points -= amount;
                true
            }
            _ => false,
        }
    }

    fn get_points(&self, user: &str) -> i64 {
        self.accounts
            .get(&user.to_lowercase())
            .map(|a| a.points)
            .unwrap_or(0)
    }

    fn currency_name(&self) -> String {
        self.currency.clone()
    }

    fn top_currency(&self, count: usize) -> Vec<(String, i64)> {
        let mut all: Vec<(String, i64)> = self
            .accounts
            .values()
            .map(|a| (a.user_name.clone(), a.points))
            .collect();
        all.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        all.truncate(count);
        all
    }
}

impl MessageSink for MemoryHost {
    fn send_stream_message(&mut self, message: &str) {
        self.push(Channel::StreamChat, None, message);
    }

    fn send_stream_whisper(&mut self, user: &str, message: &str) {
        self.push(Channel::StreamWhisper, Some(user), message);
    }

    fn send_discord_message(&mut self, message: &str) {
        self.push(Channel::DiscordChat, None, message);
    }

    fn send_discord_dm(&mut self, user: &str, message: &str) {
        self.push(Channel::DiscordWhisper, Some(user), message);
    }
}

impl PermissionCheck for MemoryHost {
    fn has_permission(&self, user: &str, permission: &str, _info: &str) -> bool {
        if permission.eq_ignore_ascii_case(PERMISSION_EVERYONE) {
            return true;
        }
        self.grants
            .get(&user.to_lowercase())
            .map(|set| set.contains(&permission.to_lowercase()))
            .unwrap_or(false)
    }
}

impl StreamStatus for MemoryHost {
    fn is_live(&self) -> bool {
        self.live
    }
}

impl EventBroadcaster for MemoryHost {
    fn broadcast_ws_event(&mut self, event: &str, payload: &str) {
        self.events.push((event.to_string(), payload.to_string()));
        if let Some(listener) = &self.listener {
            listener(event, payload);
        }
    }
}

impl Clock for MemoryHost {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_user_cannot_receive_points() {
        let mut host = MemoryHost::new("coins");
        assert!(!host.add_points("ghost", "Ghost", 10));
        host.register("Ghost", 0);
        assert!(host.add_points("ghost", "Ghost", 10));
        assert_eq!(host.get_points("GHOST"), 10);
    }

    #[test]
    fn remove_points_refuses_overdraft() {
        let mut host = MemoryHost::new("coins");
        host.register("a", 5);
        assert!(!host.remove_points("a", "a", 6));
        assert!(host.remove_points("a", "a", 5));
        assert_eq!(host.get_points("a"), 0);
    }

    #[test]
    fn top_currency_is_truncated_by_balance() {
        let mut host = MemoryHost::new("coins");
        host.register("a", 1);
        host.register("b", 30);
        host.register("c", 20);
        let top = host.top_currency(2);
        assert_eq!(top, vec![("b".to_string(), 30), ("c".to_string(), 20)]);
    }

    #[test]
    fn everyone_permission_is_implicit() {
        let mut host = MemoryHost::new("coins");
        assert!(host.has_permission("x", "Everyone", ""));
        assert!(!host.has_permission("x", "Moderator", ""));
        host.grant("X", "moderator");
        assert!(host.has_permission("x", "Moderator", ""));
    }
}
