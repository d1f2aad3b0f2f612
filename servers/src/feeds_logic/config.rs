use clap::Parser;
use lib_streams::configs::StreamSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "server_feeds.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Venue stream relay: market, user, sports and price/comment channels", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "FEEDS_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "FEEDS_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "FEEDS_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "FEEDS_MARKET_URL", help = "Market channel WebSocket URL.")]
    pub market_url: Option<String>,

    #[clap(long, env = "FEEDS_USER_URL", help = "User channel WebSocket URL.")]
    pub user_url: Option<String>,

    #[clap(long, env = "FEEDS_SPORTS_URL", help = "Sports channel WebSocket URL.")]
    pub sports_url: Option<String>,

    #[clap(long, env = "FEEDS_FEED_URL", help = "Third-party price/comment feed WebSocket URL.")]
    pub feed_url: Option<String>,

    #[clap(long, env = "FEEDS_FEED_STREAM", help = "Stream name to subscribe on the feed (prices, comments).")]
    pub feed_stream: Option<String>,

    #[clap(long, env = "FEEDS_ASSET_IDS", value_delimiter = ',', help = "Comma separated asset ids for the market channel.")]
    pub asset_ids: Option<Vec<String>>,

    #[clap(long, env = "FEEDS_USER_MARKETS", value_delimiter = ',', help = "Comma separated market ids for the user channel.")]
    pub user_markets: Option<Vec<String>>,

    #[clap(long, env = "FEEDS_GAME_IDS", value_delimiter = ',', help = "Comma separated game ids for the sports channel.")]
    pub game_ids: Option<Vec<String>>,

    #[clap(long, env = "FEEDS_FEED_SYMBOLS", value_delimiter = ',', help = "Comma separated symbols for the feed channel.")]
    pub feed_symbols: Option<Vec<String>>,

    #[clap(long, env = "FEEDS_ENABLE_SPORTS", help = "Run the sports channel (true/false).")]
    pub enable_sports: Option<bool>,

    #[clap(long, env = "FEEDS_ENABLE_FEED", help = "Run the price/comment feed channel (true/false).")]
    pub enable_feed: Option<bool>,

    #[clap(long, env = "FEEDS_RECONNECT_DELAY_MS", help = "Fixed delay in milliseconds between reconnect attempts.")]
    pub reconnect_delay_ms: Option<u64>,

    #[clap(long, env = "FEEDS_HEARTBEAT_INTERVAL_SECONDS", help = "Seconds between liveness probes.")]
    pub heartbeat_interval_seconds: Option<u64>,

    #[clap(long, env = "FEEDS_HANDSHAKE_TIMEOUT_SECONDS", help = "Seconds allowed for DNS, TCP, TLS and WebSocket handshake.")]
    pub handshake_timeout_seconds: Option<u64>,

    #[clap(long, env = "FEEDS_LOG_DROPPED", help = "Log dropped frames at warn level (true/false).")]
    pub log_dropped: Option<bool>,

    #[clap(long, env = "FEEDS_STATS_INTERVAL_SECONDS", help = "Seconds between channel statistics reports.")]
    pub stats_interval_seconds: Option<u64>,

    // Secret; read from the environment or the config file only.
    #[clap(skip)]
    #[serde(skip_serializing)]
    pub price_key: Option<String>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            market_url: other.market_url.or(self.market_url),
            user_url: other.user_url.or(self.user_url),
            sports_url: other.sports_url.or(self.sports_url),
            feed_url: other.feed_url.or(self.feed_url),
            feed_stream: other.feed_stream.or(self.feed_stream),
            asset_ids: other.asset_ids.or(self.asset_ids),
            user_markets: other.user_markets.or(self.user_markets),
            game_ids: other.game_ids.or(self.game_ids),
            feed_symbols: other.feed_symbols.or(self.feed_symbols),
            enable_sports: other.enable_sports.or(self.enable_sports),
            enable_feed: other.enable_feed.or(self.enable_feed),
            reconnect_delay_ms: other.reconnect_delay_ms.or(self.reconnect_delay_ms),
            heartbeat_interval_seconds: other.heartbeat_interval_seconds.or(self.heartbeat_interval_seconds),
            handshake_timeout_seconds: other.handshake_timeout_seconds.or(self.handshake_timeout_seconds),
            log_dropped: other.log_dropped.or(self.log_dropped),
            stats_interval_seconds: other.stats_interval_seconds.or(self.stats_interval_seconds),
            price_key: other.price_key.or(self.price_key),
        }
    }

    pub fn defaults() -> Config {
        let settings = StreamSettings::default();
        Config {
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            market_url: Some(settings.market_url),
            user_url: Some(settings.user_url),
            sports_url: Some(settings.sports_url),
            feed_url: Some(settings.feed_url),
            feed_stream: Some("prices".to_string()),
            asset_ids: Some(Vec::new()),
            user_markets: Some(Vec::new()),
            game_ids: Some(Vec::new()),
            feed_symbols: Some(Vec::new()),
            enable_sports: Some(false),
            enable_feed: Some(false),
            reconnect_delay_ms: Some(settings.reconnect_delay_ms),
            heartbeat_interval_seconds: Some(settings.heartbeat_interval_secs),
            handshake_timeout_seconds: Some(settings.handshake_timeout_secs),
            log_dropped: Some(settings.log_dropped),
            stats_interval_seconds: Some(60),
            ..Default::default()
        }
    }

    /// Engine settings derived from the merged configuration.
    pub fn stream_settings(&self) -> StreamSettings {
        let defaults = StreamSettings::default();
        StreamSettings {
            market_url: self.market_url.clone().unwrap_or(defaults.market_url),
            user_url: self.user_url.clone().unwrap_or(defaults.user_url),
            sports_url: self.sports_url.clone().unwrap_or(defaults.sports_url),
            feed_url: self.feed_url.clone().unwrap_or(defaults.feed_url),
            reconnect_delay_ms: self.reconnect_delay_ms.unwrap_or(defaults.reconnect_delay_ms),
            heartbeat_interval_secs: self.heartbeat_interval_seconds.unwrap_or(defaults.heartbeat_interval_secs),
            handshake_timeout_secs: self.handshake_timeout_seconds.unwrap_or(defaults.handshake_timeout_secs),
            log_dropped: self.log_dropped.unwrap_or(defaults.log_dropped),
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> String {
        self.log_level.clone().unwrap_or_else(|| "info".to_string())
    }
}

pub fn load_config() -> Config {
    let cli = Config::parse();
    let mut config = resolve(cli);
    if config.price_key.is_none() {
        config.price_key = std::env::var("FEEDS_PRICE_KEY").ok().filter(|k| !k.trim().is_empty());
    }
    config
}

/// defaults <- config file <- CLI/environment.
pub fn resolve(cli: Config) -> Config {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }
    current_config.merge(cli)
}

fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<Config>(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}
