use serde::Deserialize;

use peertag_core::net::protocol::WireFormat;
use peertag_core::room::RoomConfig;
use peertag_core::session::{SessionConfig, SyncConfig};

/// Top-level simulation configuration, loaded from `peertag.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub room: RoomConfig,
    pub sync: SyncConfig,
    pub run: RunConfig,
    pub bots: BotConfig,
}

/// How many peers to run and for how long.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub peers: usize,
    pub duration_secs: u64,
    pub seed: u64,
    /// Delay between successive peers joining the host.
    pub join_stagger_ms: u64,
    /// Inbox capacity per peer; frames beyond it are dropped.
    pub channel_capacity: usize,
    /// When false peers join and idle; only the sync layer runs.
    pub bots_enabled: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            peers: 4,
            duration_secs: 30,
            seed: 42,
            join_stagger_ms: 250,
            channel_capacity: 256,
            bots_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Distance at which a runner counts as caught by the tagger.
    pub tag_radius: f32,
    pub pickup_radius: f32,
    /// How long a peer that just handed off tagger ignores contact.
    pub tag_cooldown_ms: u64,
    /// How often a runner picks a new wander heading.
    pub wander_ms: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            tag_radius: 24.0,
            pickup_radius: 20.0,
            tag_cooldown_ms: 1_500,
            wander_ms: 800,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl std::error::Error for ConfigError {}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError {
        field,
        reason: reason.into(),
    }
}

impl SimConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            room: self.room.clone(),
            sync: self.sync.clone(),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Check values the sync loop cannot run with. Suspicious but usable
    /// values are only logged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.peers == 0 {
            return Err(invalid("run.peers", "must be > 0"));
        }
        if self.run.peers > self.room.max_participants {
            return Err(invalid(
                "run.peers",
                format!("exceeds room.max_participants ({})", self.room.max_participants),
            ));
        }
        if self.run.channel_capacity == 0 {
            return Err(invalid("run.channel_capacity", "must be > 0"));
        }
        if self.sync.tick_hz == 0 || self.sync.tick_hz > 1000 {
            return Err(invalid("sync.tick_hz", "must be in 1..=1000"));
        }
        if self.sync.broadcast_hz == 0 || self.sync.broadcast_hz > 1000 {
            return Err(invalid("sync.broadcast_hz", "must be in 1..=1000"));
        }
        for (field, rect) in [
            ("room.world", &self.room.world),
            ("room.spawn_area", &self.room.spawn_area),
            ("room.teleport_area", &self.room.teleport_area),
        ] {
            if !rect.is_valid() {
                return Err(invalid(field, "min must not exceed max"));
            }
        }
        if self.room.powerup_spawn_interval_ms == 0 {
            return Err(invalid("room.powerup_spawn_interval_ms", "must be > 0"));
        }
        if self.room.round_duration_secs == 0 {
            return Err(invalid("room.round_duration_secs", "must be > 0"));
        }

        if self.sync.broadcast_hz > self.sync.tick_hz {
            tracing::warn!(
                broadcast_hz = self.sync.broadcast_hz,
                tick_hz = self.sync.tick_hz,
                "broadcast_hz above tick_hz; positions go out at most once per tick"
            );
        }
        if self.room.powerup_ttl_ms < self.room.powerup_spawn_interval_ms {
            tracing::warn!("powerup_ttl_ms shorter than spawn interval; the field will often be empty");
        }
        if self.bots.tag_radius <= 0.0 {
            tracing::warn!("bots.tag_radius <= 0; bots will never tag");
        }
        Ok(())
    }

    /// Load config from `$PEERTAG_CONFIG` or `peertag.toml` if present,
    /// then apply env var overrides.
    pub fn load() -> Self {
        let path = std::env::var("PEERTAG_CONFIG").unwrap_or_else(|_| "peertag.toml".to_string());
        let mut config = match std::fs::read_to_string(&path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from {path}");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse {path}: {e}, using defaults");
                    Self::default()
                },
            },
            Err(_) => {
                tracing::info!("No {path} found, using defaults");
                Self::default()
            },
        };

        if let Ok(val) = std::env::var("PEERTAG_PEERS")
            && let Ok(n) = val.parse::<usize>()
        {
            config.run.peers = n;
        }
        if let Ok(val) = std::env::var("PEERTAG_DURATION_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.run.duration_secs = n;
        }
        if let Ok(val) = std::env::var("PEERTAG_SEED")
            && let Ok(n) = val.parse::<u64>()
        {
            config.run.seed = n;
        }
        if let Ok(val) = std::env::var("PEERTAG_TICK_HZ")
            && let Ok(n) = val.parse::<u32>()
        {
            config.sync.tick_hz = n;
        }
        if let Ok(val) = std::env::var("PEERTAG_BROADCAST_HZ")
            && let Ok(n) = val.parse::<u32>()
        {
            config.sync.broadcast_hz = n;
        }
        if let Ok(val) = std::env::var("PEERTAG_WIRE_FORMAT") {
            match val.as_str() {
                "json" => config.sync.wire_format = WireFormat::Json,
                "messagepack" => config.sync.wire_format = WireFormat::MessagePack,
                other => tracing::warn!("Unknown PEERTAG_WIRE_FORMAT {other:?}, keeping {:?}", config.sync.wire_format),
            }
        }

        config
    }
}
