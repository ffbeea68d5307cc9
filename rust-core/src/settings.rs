// Per-script settings, persisted as the host UI writes them:
// `settings.json` (PascalCase keys, optional UTF-8 BOM) plus a `settings.js`
// companion (`var settings = {...};`) that browser overlays can include.

use crate::error::SettingsError;
use crate::math::FeeRate;
use crate::routing::RoutingMode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GiveSettings {
    pub only_live: bool,
    pub command: String,
    pub usage: RoutingMode,
    /// Transfer fee, percent of the amount. Decimals allowed.
    pub fee: FeeRate,
    pub success_response: String,
    pub fail_response: String,
    pub inactive_response: String,
    pub invalid_amount_response: String,
    pub invalid_target_response: String,
}

impl Default for GiveSettings {
    fn default() -> Self {
        Self {
            only_live: false,
            command: "!give".to_string(),
            usage: RoutingMode::StreamChat,
            fee: FeeRate::from_percent(2),
            success_response: "{0} has transferred {1} {2} to {3}".to_string(),
            fail_response: "{0} does not have enough {1} to transfer {2} ({3} fee)".to_string(),
            inactive_response: "{0} is not currently active.".to_string(),
            invalid_amount_response: "{0}, usage: {1} <user> <amount>".to_string(),
            invalid_target_response: "{0}, you cannot give $currencyname to yourself.".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DonateSettings {
    pub only_live: bool,
    pub command: String,
    pub usage: RoutingMode,
    pub success_response: String,
    pub fail_response: String,
    pub invalid_amount_response: String,
    pub donate_goal: i64,
    /// Running total, in real currency units. Persisted after every donation.
    pub donate_value: i64,
    pub donate_sound: String,
    /// Real-world currency label shown in responses.
    pub currency_name: String,
    /// Points charged per real currency unit.
    pub conversion_rate: i64,
}

impl Default for DonateSettings {
    fn default() -> Self {
        Self {
            only_live: false,
            command: "!donate".to_string(),
            usage: RoutingMode::StreamChat,
            success_response: "{0} has donated {1} {2}!".to_string(),
            fail_response: "{0} does not have enough {1} to donate {2} {3}".to_string(),
            invalid_amount_response: "{0}, usage: {1} <amount>".to_string(),
            donate_goal: 100,
            donate_value: 0,
            donate_sound: String::new(),
            currency_name: "USD".to_string(),
            conversion_rate: 1,
        }
    }
}

pub const DEFAULT_TOP_SIZE: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TopSettings {
    pub only_live: bool,
    pub command: String,
    pub usage: RoutingMode,
    /// The host UI stores this as a string.
    #[serde(deserialize_with = "count_from_str_or_number")]
    pub top_size: usize,
    pub entry_format: String,
    pub empty_response: String,
}

impl Default for TopSettings {
    fn default() -> Self {
        Self {
            only_live: false,
            command: "!top".to_string(),
            usage: RoutingMode::StreamChat,
            top_size: DEFAULT_TOP_SIZE,
            entry_format: "{0}. {1} - {2}".to_string(),
            empty_response: "Nobody has any {0} yet.".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RaffleSettings {
    pub only_live: bool,
    pub command: String,
    pub join_command: String,
    pub pick_command: String,
    pub usage: RoutingMode,
    pub permission: String,
    pub permission_info: String,
    pub permission_response: String,
    pub start_response: String,
    pub join_response: String,
    pub win_response: String,
    pub no_join_response: String,
    /// Sent instead of the win message when the ledger refuses the payout.
    pub payout_fail_response: String,
    pub invalid_amount_response: String,
    /// Auto-pick after this many seconds; 0 leaves the window open until `PickCommand`.
    pub join_duration_secs: u64,
}

impl Default for RaffleSettings {
    fn default() -> Self {
        Self {
            only_live: true,
            command: "!raffle".to_string(),
            join_command: "!join".to_string(),
            pick_command: "!pick".to_string(),
            usage: RoutingMode::StreamChat,
            permission: "Moderator".to_string(),
            permission_info: String::new(),
            permission_response: "{0} -> only {1} can do that.".to_string(),
            start_response: "A raffle for {0} {1} has started! Type {2} to join.".to_string(),
            join_response: "$user joined the raffle.".to_string(),
            win_response: "{0} won {1} {3} and now has {2} {3}".to_string(),
            no_join_response: "Nobody joined the raffle.".to_string(),
            payout_fail_response: "{0} won the raffle, but {1} {2} could not be paid out.".to_string(),
            invalid_amount_response: "{0}, usage: {1} <amount>".to_string(),
            join_duration_secs: 60,
        }
    }
}

fn count_from_str_or_number<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Text(String),
    }

    let parsed = match Raw::deserialize(deserializer)? {
        Raw::Num(n) => usize::try_from(n).ok(),
        Raw::Text(s) => s.trim().parse::<usize>().ok(),
    };
    Ok(parsed.filter(|n| *n > 0).unwrap_or(DEFAULT_TOP_SIZE))
}

/// Parse settings JSON as the host sends it (may carry a UTF-8 BOM).
pub fn parse_settings<T: DeserializeOwned>(data: &str) -> Result<T, SettingsError> {
    let data = data.strip_prefix('\u{feff}').unwrap_or(data);
    Ok(serde_json::from_str(data)?)
}

/// One script's settings file.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Store for `<script_dir>/settings.json`.
    pub fn in_dir<P: AsRef<Path>>(script_dir: P) -> Self {
        Self {
            path: script_dir.as_ref().join(SETTINGS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn js_path(&self) -> PathBuf {
        self.path.with_extension("js")
    }

    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<T>, SettingsError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&self.path).map_err(|e| self.io_err(e))?;
        parse_settings(&data).map(Some)
    }

    /// Load, falling back to defaults on a missing or unreadable file.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self) -> T {
        match self.load() {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                tracing::debug!(path = %self.path.display(), "no settings file, using defaults");
                T::default()
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "bad settings file, using defaults");
                T::default()
            }
        }
    }

    /// Write `settings.json` atomically, then the `settings.js` companion.
    pub fn save<T: Serialize>(&self, settings: &T) -> Result<(), SettingsError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_string(settings)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json.as_bytes()).map_err(|e| self.io_err(e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| self.io_err(e))?;
        fs::write(self.js_path(), format!("var settings = {};", json)).map_err(|e| self.io_err(e))?;
        Ok(())
    }

    fn io_err(&self, source: std::io::Error) -> SettingsError {
        SettingsError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// Current settings value. Readers get an immutable snapshot; reload swaps it.
pub struct SettingsCell<T> {
    current: RwLock<Arc<T>>,
}

impl<T: DeserializeOwned> SettingsCell<T> {
    pub fn new(settings: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(settings)),
        }
    }

    pub fn get(&self) -> Arc<T> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, settings: T) {
        let next = Arc::new(settings);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Swap in settings parsed from `json`. On error the old value stays.
    pub fn reload(&self, json: &str) -> Result<(), SettingsError> {
        let next = parse_settings::<T>(json)?;
        self.replace(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "chatpoints-settings-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn defaults_match_host_field_names() {
        let json = serde_json::to_value(GiveSettings::default()).unwrap();
        assert_eq!(json["Command"], "!give");
        assert_eq!(json["Fee"], 2);
        assert_eq!(json["OnlyLive"], false);
        assert_eq!(json["Usage"], "Stream Chat");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let s: RaffleSettings = parse_settings(r#"{"Command":"!giveaway","OnlyLive":false}"#).unwrap();
        assert_eq!(s.command, "!giveaway");
        assert!(!s.only_live);
        assert_eq!(s.join_command, "!join");
    }

    #[test]
    fn bom_is_ignored() {
        let s: GiveSettings = parse_settings("\u{feff}{\"Fee\":5}").unwrap();
        assert_eq!(s.fee, FeeRate::from_percent(5));
    }

    #[test]
    fn fractional_fee_keeps_the_rest_of_the_file() {
        let s: GiveSettings = parse_settings(r#"{"Command":"!send","Fee":2.5}"#).unwrap();
        assert_eq!(s.command, "!send");
        assert_eq!(s.fee, FeeRate::from_f64(2.5).unwrap());
        assert_eq!(s.fee.fee_on(100), 3);

        let dir = temp_dir("fractional-fee");
        fs::create_dir_all(&dir).unwrap();
        let store = SettingsStore::in_dir(&dir);
        fs::write(store.path(), r#"{"Command":"!send","Fee":2.5,"OnlyLive":true}"#).unwrap();
        let loaded: GiveSettings = store.load_or_default();
        assert_eq!(loaded.command, "!send");
        assert!(loaded.only_live);
        store.save(&loaded).unwrap();
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains(r#""Fee":2.5"#), "{}", raw);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn top_size_accepts_string_or_number() {
        let s: TopSettings = parse_settings(r#"{"TopSize":"10"}"#).unwrap();
        assert_eq!(s.top_size, 10);
        let s: TopSettings = parse_settings(r#"{"TopSize":3}"#).unwrap();
        assert_eq!(s.top_size, 3);
        let s: TopSettings = parse_settings(r#"{"TopSize":"lots"}"#).unwrap();
        assert_eq!(s.top_size, DEFAULT_TOP_SIZE);
        let s: TopSettings = parse_settings(r#"{"TopSize":0}"#).unwrap();
        assert_eq!(s.top_size, DEFAULT_TOP_SIZE);
    }

    #[test]
    fn store_round_trips_and_writes_js_companion() {
        let dir = temp_dir("roundtrip");
        let store = SettingsStore::in_dir(&dir);
        assert!(store.load::<DonateSettings>().unwrap().is_none());

        let mut s = DonateSettings::default();
        s.donate_value = 42;
        store.save(&s).unwrap();

        let loaded: DonateSettings = store.load_or_default();
        assert_eq!(loaded.donate_value, 42);
        let js = fs::read_to_string(store.js_path()).unwrap();
        assert!(js.starts_with("var settings = {"));
        assert!(js.ends_with("};"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = temp_dir("corrupt");
        fs::create_dir_all(&dir).unwrap();
        let store = SettingsStore::in_dir(&dir);
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load::<GiveSettings>().is_err());
        assert_eq!(store.load_or_default::<GiveSettings>(), GiveSettings::default());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn cell_reload_keeps_old_value_on_error() {
        let cell = SettingsCell::new(GiveSettings::default());
        let before = cell.get();
        assert!(cell.reload("nope").is_err());
        assert_eq!(cell.get().fee, FeeRate::from_percent(2));
        cell.reload(r#"{"Fee":7}"#).unwrap();
        assert_eq!(cell.get().fee, FeeRate::from_percent(7));
        // snapshots taken earlier are unaffected
        assert_eq!(before.fee, FeeRate::from_percent(2));
    }
}
