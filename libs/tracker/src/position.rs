use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

pub type UserId = u64;
pub type ChannelId = u64;

/// Legacy prefix for settings fields that used to share the positions hash.
pub const LEGACY_SETTINGS_PREFIX: &str = "USER_SETTINGS.";

/// Rounds a monetary value to cents, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Trims and uppercases a ticker (`ac.to` -> `AC.TO`).
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// One user's subscription to a ticker.
///
/// Persisted as a JSON blob with exactly these four fields, keyed by the
/// uppercase symbol. Keep the field names stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPosition {
    pub symbol: String,
    pub channel: ChannelId,
    #[serde(with = "rust_decimal::serde::float")]
    pub book_cost: Decimal,
    pub start_date: NaiveDate,
}

impl TrackedPosition {
    pub fn new(
        symbol: &str,
        channel: ChannelId,
        book_cost: Decimal,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            channel,
            book_cost,
            start_date,
        }
    }

    /// The form written to the store: normalised symbol, book cost in cents.
    pub fn normalized(mut self) -> Self {
        self.symbol = normalize_symbol(&self.symbol);
        self.book_cost = round_money(self.book_cost);
        self
    }
}

/// Per-user flags kept next to the positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSettings {
    pub muted: bool,
    pub feedback_blacklisted: bool,
    pub default_channel: Option<ChannelId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Setting {
    Muted,
    FeedbackBlacklisted,
    DefaultChannel,
}

impl Setting {
    pub const ALL: [Setting; 3] = [
        Setting::Muted,
        Setting::FeedbackBlacklisted,
        Setting::DefaultChannel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Setting::Muted => "MUTED",
            Setting::FeedbackBlacklisted => "FEEDBACK_BLACKLISTED",
            Setting::DefaultChannel => "DEFAULT_CHANNEL",
        }
    }
}

/// Encodes a flag the way the settings hash stores it.
pub fn encode_flag(on: bool) -> String {
    let flag = if on { "1" } else { "0" };
    flag.to_string()
}

pub fn decode_flag(raw: Option<&str>) -> bool {
    matches!(raw.map(str::trim), Some("1") | Some("true"))
}

impl UserSettings {
    /// Builds settings from raw `(name, value)` pairs; unknown names are ignored.
    pub fn from_raw<'a>(pairs: impl IntoIterator<Item = (Setting, Option<&'a str>)>) -> Self {
        let mut settings = UserSettings::default();
        for (setting, value) in pairs {
            match setting {
                Setting::Muted => settings.muted = decode_flag(value),
                Setting::FeedbackBlacklisted => settings.feedback_blacklisted = decode_flag(value),
                Setting::DefaultChannel => {
                    settings.default_channel = value.and_then(|v| v.trim().parse().ok())
                }
            }
        }
        settings
    }
}
