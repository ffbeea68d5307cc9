// Response routing and template rendering.
//
// A response goes to at most one raw channel: the one matching where the
// command came from (stream/discord, chat/whisper), and only if the script's
// routing mode includes that channel.

use crate::command::Participant;
use crate::host::MessageSink;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Which chat surfaces a script answers on. Serialized with the host UI labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RoutingMode {
    #[default]
    #[serde(rename = "Stream Chat")]
    StreamChat,
    #[serde(rename = "Stream Whisper")]
    StreamWhisper,
    #[serde(rename = "Discord Chat")]
    DiscordChat,
    #[serde(rename = "Discord Whisper")]
    DiscordWhisper,
    #[serde(rename = "Chat Both")]
    ChatBoth,
    #[serde(rename = "Whisper Both")]
    WhisperBoth,
    #[serde(rename = "Stream Both")]
    StreamBoth,
    #[serde(rename = "Discord Both")]
    DiscordBoth,
    #[serde(rename = "All")]
    All,
}

impl RoutingMode {
    fn allows_stream_chat(self) -> bool {
        matches!(self, Self::StreamChat | Self::ChatBoth | Self::All | Self::StreamBoth)
    }

    fn allows_stream_whisper(self) -> bool {
        matches!(self, Self::StreamWhisper | Self::WhisperBoth | Self::All | Self::StreamBoth)
    }

    fn allows_discord_chat(self) -> bool {
        matches!(self, Self::DiscordChat | Self::ChatBoth | Self::All | Self::DiscordBoth)
    }

    fn allows_discord_whisper(self) -> bool {
        matches!(self, Self::DiscordWhisper | Self::WhisperBoth | Self::All | Self::DiscordBoth)
    }
}

/// Routes a rendered message to the channel the request came from.
/// Returns false when the routing mode filtered it out.
pub fn deliver<S: MessageSink + ?Sized>(
    sink: &mut S,
    user: &str,
    message: &str,
    mode: RoutingMode,
    is_whisper: bool,
    is_discord: bool,
) -> bool {
    match (is_discord, is_whisper) {
        (false, false) if mode.allows_stream_chat() => sink.send_stream_message(message),
        (false, true) if mode.allows_stream_whisper() => sink.send_stream_whisper(user, message),
        (true, false) if mode.allows_discord_chat() => sink.send_discord_message(message),
        (true, true) if mode.allows_discord_whisper() => sink.send_discord_dm(user, message),
        _ => {
            tracing::trace!(?mode, is_discord, is_whisper, "response filtered by routing mode");
            return false;
        }
    }
    true
}

/// A script's routing mode bound to the sink calls.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageDispatcher {
    pub mode: RoutingMode,
}

impl MessageDispatcher {
    pub fn new(mode: RoutingMode) -> Self {
        Self { mode }
    }

    /// Answer `to` on whatever surface they used.
    pub fn reply<S: MessageSink + ?Sized>(&self, sink: &mut S, to: &Participant, message: &str) -> bool {
        deliver(
            sink,
            &to.user,
            message,
            self.mode,
            to.is_whisper,
            to.is_from_discord(),
        )
    }
}

/// Values for the `$name` placeholders the host UI documents.
#[derive(Clone, Debug, Default)]
pub struct Placeholders<'a> {
    pub user: &'a str,
    pub currency: &'a str,
    pub target: &'a str,
    pub permission: &'a str,
    pub permission_info: &'a str,
}

impl<'a> Placeholders<'a> {
    /// Match a placeholder name at the start of `s` (the text after a `$`).
    /// Longer names are tried first so `$permissioninfo` is not read as `$permission`.
    fn lookup(&self, s: &str) -> Option<(&'a str, usize)> {
        [
            ("permissioninfo", self.permission_info),
            ("currencyname", self.currency),
            ("permission", self.permission),
            ("target", self.target),
            ("user", self.user),
        ]
        .into_iter()
        .find(|(name, _)| s.starts_with(*name))
        .map(|(name, value)| (value, name.len()))
    }
}

/// Replace `{0}`, `{1}`, ... with the matching argument.
/// Unknown indices are left as-is so a mistyped template still reads.
pub fn format_positional(template: &str, args: &[&dyn Display]) -> String {
    expand(template, args, None)
}

/// `{N}` and `$placeholder` substitution in one pass over the template.
/// Substituted values are never scanned again, so a user name containing
/// `$currencyname` or `{1}` comes out verbatim.
pub fn render(template: &str, args: &[&dyn Display], vars: &Placeholders<'_>) -> String {
    expand(template, args, Some(vars))
}

fn expand(template: &str, args: &[&dyn Display], vars: Option<&Placeholders<'_>>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(at) = rest.find(|c: char| c == '{' || (c == '$' && vars.is_some())) {
        out.push_str(&rest[..at]);
        let marker = &rest[at..at + 1];
        let after = &rest[at + 1..];
        if marker == "{" {
            let idx = after
                .find('}')
                .and_then(|close| after[..close].parse::<usize>().ok().map(|i| (i, close)));
            match idx {
                Some((i, close)) if i < args.len() => {
                    out.push_str(&args[i].to_string());
                    rest = &after[close + 1..];
                    continue;
                }
                _ => {}
            }
        } else if let Some((value, len)) = vars.and_then(|v| v.lookup(after)) {
            out.push_str(value);
            rest = &after[len..];
            continue;
        }
        out.push_str(marker);
        rest = after;
    }
    out.push_str(rest);
    out
}

impl Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Channel, MemoryHost};

    const MODES: [RoutingMode; 9] = [
        RoutingMode::StreamChat,
        RoutingMode::StreamWhisper,
        RoutingMode::DiscordChat,
        RoutingMode::DiscordWhisper,
        RoutingMode::ChatBoth,
        RoutingMode::WhisperBoth,
        RoutingMode::StreamBoth,
        RoutingMode::DiscordBoth,
        RoutingMode::All,
    ];

    fn routed(mode: RoutingMode, is_whisper: bool, is_discord: bool) -> Option<Channel> {
        let mut host = MemoryHost::new("coins");
        deliver(&mut host, "u", "hi", mode, is_whisper, is_discord);
        let out = host.drain_outbox();
        assert!(out.len() <= 1);
        out.first().map(|m| m.channel)
    }

    #[test]
    fn each_request_surface_maps_to_its_own_channel() {
        assert_eq!(routed(RoutingMode::All, false, false), Some(Channel::StreamChat));
        assert_eq!(routed(RoutingMode::All, true, false), Some(Channel::StreamWhisper));
        assert_eq!(routed(RoutingMode::All, false, true), Some(Channel::DiscordChat));
        assert_eq!(routed(RoutingMode::All, true, true), Some(Channel::DiscordWhisper));
    }

    #[test]
    fn routing_matrix_matches_host_labels() {
        let stream_chat = ["Stream Chat", "Chat Both", "All", "Stream Both"];
        let stream_whisper = ["Stream Whisper", "Whisper Both", "All", "Stream Both"];
        let discord_chat = ["Discord Chat", "Chat Both", "All", "Discord Both"];
        let discord_whisper = ["Discord Whisper", "Whisper Both", "All", "Discord Both"];
        for mode in MODES {
            let label = mode.to_string();
            assert_eq!(routed(mode, false, false).is_some(), stream_chat.contains(&label.as_str()), "{}", label);
            assert_eq!(routed(mode, true, false).is_some(), stream_whisper.contains(&label.as_str()), "{}", label);
            assert_eq!(routed(mode, false, true).is_some(), discord_chat.contains(&label.as_str()), "{}", label);
            assert_eq!(routed(mode, true, true).is_some(), discord_whisper.contains(&label.as_str()), "{}", label);
        }
    }

    #[test]
    fn whispers_are_addressed_to_the_requester() {
        let mut host = MemoryHost::new("coins");
        deliver(&mut host, "alice", "psst", RoutingMode::WhisperBoth, true, false);
        assert_eq!(host.outbox()[0].to.as_deref(), Some("alice"));
    }

    #[test]
    fn routing_mode_uses_ui_labels_in_json() {
        let mode: RoutingMode = serde_json::from_str("\"Discord Both\"").unwrap();
        assert_eq!(mode, RoutingMode::DiscordBoth);
        assert_eq!(serde_json::to_string(&RoutingMode::ChatBoth).unwrap(), "\"Chat Both\"");
    }

    #[test]
    fn positional_templates() {
        assert_eq!(
            format_positional("{0} won {1} {3} and now has {2} {3}", &[&"ann", &100, &250, &"coins"]),
            "ann won 100 coins and now has 250 coins"
        );
        assert_eq!(format_positional("{5} {x} {", &[&1]), "{5} {x} {");
    }

    #[test]
    fn dollar_placeholders() {
        let vars = Placeholders {
            user: "ann",
            currency: "coins",
            target: "bob",
            permission: "Moderator",
            permission_info: "lvl",
        };
        assert_eq!(
            render("$user -> $target ($currencyname) needs $permission/$permissioninfo", &[], &vars),
            "ann -> bob (coins) needs Moderator/lvl"
        );
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let vars = Placeholders {
            user: "$currencyname",
            currency: "coins",
            target: "$permission",
            permission: "Moderator",
            permission_info: "",
        };
        assert_eq!(
            render("{0} gave {1} $currencyname to {2}", &[&"$permission", &5, &"{1}"], &vars),
            "$permission gave 5 coins to {1}"
        );
        assert_eq!(render("$user -> $target", &[], &vars), "$currencyname -> $permission");
        assert_eq!(render("costs $5 {9}", &[], &vars), "costs $5 {9}");
    }
}
