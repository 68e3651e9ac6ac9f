use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use fred::prelude::{
    Builder, Client, ClientLike, Config, EventInterface, HashesInterface, SetsInterface,
    TcpConfig,
};
use tracing::{debug, error};

use crate::error::StoreError;
use crate::position::{
    LEGACY_SETTINGS_PREFIX, Setting, TrackedPosition, UserId, UserSettings, normalize_symbol,
};

/// Typed access to tracked positions and per-user settings.
///
/// Positions and settings are separate namespaces even when the backend
/// keeps them side by side.
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn get_tracked_position(
        &self,
        user: UserId,
        symbol: &str,
    ) -> Result<Option<TrackedPosition>, StoreError>;

    /// Upsert, last write wins.
    /// Returns true if the symbol was not tracked before.
    async fn put_tracked_position(
        &self,
        user: UserId,
        position: TrackedPosition,
    ) -> Result<bool, StoreError>;

    /// Returns true if a record existed and was removed.
    async fn delete_tracked_position(&self, user: UserId, symbol: &str)
    -> Result<bool, StoreError>;

    /// Tracked symbols in store order. Never contains settings keys.
    async fn list_symbols(&self, user: UserId) -> Result<Vec<String>, StoreError>;

    async fn list_users(&self) -> Result<Vec<UserId>, StoreError>;

    async fn get_setting(&self, user: UserId, setting: Setting)
    -> Result<Option<String>, StoreError>;

    async fn put_setting(
        &self,
        user: UserId,
        setting: Setting,
        value: String,
    ) -> Result<(), StoreError>;

    async fn user_settings(&self, user: UserId) -> Result<UserSettings, StoreError> {
        let mut raw = Vec::with_capacity(Setting::ALL.len());
        for setting in Setting::ALL {
            raw.push((setting, self.get_setting(user, setting).await?));
        }
        Ok(UserSettings::from_raw(
            raw.iter().map(|(s, v)| (*s, v.as_deref())),
        ))
    }
}

/// Redis layout:
///
/// - `{prefix}:positions:{user}` hash, symbol -> JSON blob
/// - `{prefix}:settings:{user}` hash, setting name -> value
/// - `{prefix}:users` set of known user ids
#[derive(Clone)]
pub struct RedisPositionStore {
    client: Client,
    key_prefix: String,
}

impl RedisPositionStore {
    pub async fn new(redis_url: &str, key: impl Into<String>) -> Result<Self, StoreError> {
        let config = Config::from_url(redis_url)?;

        let client = Builder::from_config(config)
            .with_connection_config(|config| {
                config.connection_timeout = Duration::from_secs(5);
                config.tcp = TcpConfig {
                    nodelay: Some(true),
                    ..Default::default()
                };
            })
            .build()?;

        client.on_error(|(error, server)| async move {
            error!(?server, ?error, "redis connection error");
            Ok(())
        });

        client.connect();
        client.wait_for_connect().await?;

        Ok(Self {
            client,
            key_prefix: key.into(),
        })
    }

    /// Create a new store from environment variables.
    /// Expects REDIS_URL and REDIS_KEY_PREFIX to be set.
    pub async fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;
        use std::env;

        let redis_url = env::var("REDIS_URL").context("REDIS_URL environment variable not set")?;
        let key_prefix = env::var("REDIS_KEY_PREFIX")
            .context("REDIS_KEY_PREFIX environment variable not set")?;

        Ok(Self::new(&redis_url, key_prefix).await?)
    }

    fn positions_key(&self, user: UserId) -> String {
        format!("{}:positions:{}", self.key_prefix, user)
    }

    fn settings_key(&self, user: UserId) -> String {
        format!("{}:settings:{}", self.key_prefix, user)
    }

    fn users_key(&self) -> String {
        format!("{}:users", self.key_prefix)
    }

    async fn remember_user(&self, user: UserId) -> Result<(), StoreError> {
        let _: i64 = self.client.sadd(self.users_key(), user.to_string()).await?;
        Ok(())
    }
}

#[async_trait]
impl PositionStore for RedisPositionStore {
    async fn get_tracked_position(
        &self,
        user: UserId,
        symbol: &str,
    ) -> Result<Option<TrackedPosition>, StoreError> {
        let key = self.positions_key(user);
        let raw: Option<String> = self.client.hget(key.as_str(), normalize_symbol(symbol)).await?;

        raw.map(|blob| decode_position(&key, &blob)).transpose()
    }

    async fn put_tracked_position(
        &self,
        user: UserId,
        position: TrackedPosition,
    ) -> Result<bool, StoreError> {
        let key = self.positions_key(user);
        let position = position.normalized();
        let blob = serde_json::to_string(&position).map_err(|source| StoreError::Corrupt {
            key: key.clone(),
            source,
        })?;

        let added: i64 = self.client.hset(key.as_str(), (position.symbol.clone(), blob)).await?;
        self.remember_user(user).await?;

        debug!(user_id = user, symbol = %position.symbol, added = added == 1, "stored position");
        Ok(added == 1)
    }

    async fn delete_tracked_position(
        &self,
        user: UserId,
        symbol: &str,
    ) -> Result<bool, StoreError> {
        let removed: i64 = self
            .client
            .hdel(self.positions_key(user), normalize_symbol(symbol))
            .await?;

        Ok(removed == 1)
    }

    async fn list_symbols(&self, user: UserId) -> Result<Vec<String>, StoreError> {
        let fields: Vec<String> = self.client.hkeys(self.positions_key(user)).await?;
        Ok(filter_symbols(fields))
    }

    async fn list_users(&self) -> Result<Vec<UserId>, StoreError> {
        let members: Vec<String> = self.client.smembers(self.users_key()).await?;
        Ok(parse_user_ids(members))
    }

    async fn get_setting(
        &self,
        user: UserId,
        setting: Setting,
    ) -> Result<Option<String>, StoreError> {
        let value: Option<String> = self
            .client
            .hget(self.settings_key(user), setting.as_str())
            .await?;
        Ok(value)
    }

    async fn put_setting(
        &self,
        user: UserId,
        setting: Setting,
        value: String,
    ) -> Result<(), StoreError> {
        let _: i64 = self
            .client
            .hset(self.settings_key(user), (setting.as_str(), value))
            .await?;
        self.remember_user(user).await
    }

    async fn user_settings(&self, user: UserId) -> Result<UserSettings, StoreError> {
        let raw: HashMap<String, String> = self.client.hgetall(self.settings_key(user)).await?;
        Ok(UserSettings::from_raw(Setting::ALL.into_iter().map(|s| {
            (s, raw.get(s.as_str()).map(String::as_str))
        })))
    }
}

fn decode_position(key: &str, blob: &str) -> Result<TrackedPosition, StoreError> {
    serde_json::from_str(blob).map_err(|source| StoreError::Corrupt {
        key: key.to_string(),
        source,
    })
}

/// Drops settings fields left over from the co-located legacy layout.
fn filter_symbols(fields: Vec<String>) -> Vec<String> {
    fields
        .into_iter()
        .filter(|f| !f.starts_with(LEGACY_SETTINGS_PREFIX))
        .collect()
}

fn parse_user_ids(members: Vec<String>) -> Vec<UserId> {
    let mut users: Vec<UserId> = members
        .iter()
        .filter_map(|m| m.trim().parse().ok())
        .collect();
    users.sort_unstable();
    users
}
