use std::{env::var, time::Duration};

use anyhow::{Context, Result};

pub const DEFAULT_WEEKLY_CRON: &str = "0 30 16 * * Fri";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug)]
pub struct Config {
    pub discord_token: String,
    pub version: String,
    /// Where user DMs are relayed and admin commands are accepted.
    pub feedback_channel: Option<u64>,
    pub admin_id: Option<u64>,
    /// Cron expression, evaluated in America/New_York.
    pub weekly_cron: String,
    pub fetch_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let discord_token = lookup("DISCORD_TOKEN").context("DISCORD_TOKEN not set")?;

        let feedback_channel = lookup("FEEDBACK_CHANNEL_ID")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("FEEDBACK_CHANNEL_ID must be a channel id")?;
        let admin_id = lookup("ADMIN_ID")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("ADMIN_ID must be a user id")?;
        let timeout_secs = lookup("FETCH_TIMEOUT_SECS")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("FETCH_TIMEOUT_SECS must be a number")?
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);

        Ok(Self {
            discord_token,
            version: lookup("APP_VERSION").unwrap_or_else(|| "Unknown".to_string()),
            feedback_channel,
            admin_id,
            weekly_cron: lookup("WEEKLY_CRON").unwrap_or_else(|| DEFAULT_WEEKLY_CRON.to_string()),
            fetch_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
