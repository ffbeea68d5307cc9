// Parsed chat command as the host hands it to the scripts.

use serde::{Deserialize, Serialize};

/// Chat surface a command arrived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Stream,
    Discord,
}

/// One chat line, split into positional params.
/// Param 0 is the command keyword, params 1.. are its arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCommand {
    /// Stable user id (lowercase login).
    pub user: String,
    /// Display name used in responses.
    pub user_name: String,
    pub params: Vec<String>,
    pub platform: Platform,
    pub is_whisper: bool,
    /// False for raw/system events the host also pushes through `execute`.
    pub is_chat_message: bool,
}

impl ChatCommand {
    /// Split a raw chat message on whitespace.
    pub fn parse(user_name: &str, message: &str, platform: Platform, is_whisper: bool) -> Self {
        Self {
            user: user_name.to_lowercase(),
            user_name: user_name.to_string(),
            params: message.split_whitespace().map(str::to_string).collect(),
            platform,
            is_whisper,
            is_chat_message: true,
        }
    }

    /// Positional param, empty string when absent (host semantics).
    pub fn param(&self, idx: usize) -> &str {
        self.params.get(idx).map(String::as_str).unwrap_or("")
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn is_from_discord(&self) -> bool {
        self.platform == Platform::Discord
    }

    /// Case-insensitive keyword match against param 0.
    pub fn is_command(&self, keyword: &str) -> bool {
        self.is_chat_message && !keyword.is_empty() && self.param(0).eq_ignore_ascii_case(keyword)
    }

    /// Reply context for this sender.
    pub fn participant(&self) -> Participant {
        Participant {
            user: self.user.clone(),
            user_name: self.user_name.clone(),
            platform: self.platform,
            is_whisper: self.is_whisper,
        }
    }
}

/// A user plus the channel context needed to answer them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user: String,
    pub user_name: String,
    pub platform: Platform,
    pub is_whisper: bool,
}

impl Participant {
    pub fn is_from_discord(&self) -> bool {
        self.platform == Platform::Discord
    }
}
