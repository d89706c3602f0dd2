use anyhow::anyhow;
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    io::{Read, Write},
    path::PathBuf,
};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

use crate::infra::db::{JournalMode, SqliteCache, SqliteMode, SynchronousMode, TempStore};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a settings TOML file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level to run the service with (default: info)
    #[arg(short, long)]
    pub level: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    pub db_settings: DBSettings,
    pub api_settings: APISettings,
    pub bot_settings: BotSettings,
    pub connector_settings: ConnectorSettings,
    pub scheduler_settings: SchedulerSettings,
    pub competition_settings: CompetitionSettings,
}

impl Settings {
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("./config/local.toml")
    }

    pub fn config_directory() -> PathBuf {
        PathBuf::from("./config")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DBSettings {
    pub data_folder: String,
    pub read_max_connections: u32,
    pub read_min_connections: u32,
    pub write_max_connections: u32,
    pub write_min_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub sqlite: SqliteSettings,
}

impl Default for DBSettings {
    fn default() -> Self {
        DBSettings {
            data_folder: String::from("./data"),
            read_max_connections: 8,
            read_min_connections: 1,
            write_max_connections: 4,
            write_min_connections: 1,
            idle_timeout_secs: 600,
            acquire_timeout_secs: 15,
            sqlite: SqliteSettings::default(),
        }
    }
}

/// Pragmas applied to every sqlite connection
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteSettings {
    pub mode: SqliteMode,
    pub cache: SqliteCache,
    pub busy_timeout_ms: u32,
    pub journal_mode: JournalMode,
    pub synchronous: SynchronousMode,
    pub cache_size: i32,
    pub temp_store: TempStore,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wal_autocheckpoint: Option<u32>,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            mode: SqliteMode::ReadWriteCreate,
            cache: SqliteCache::Private,
            busy_timeout_ms: 5000,
            journal_mode: JournalMode::Wal,
            synchronous: SynchronousMode::Normal,
            cache_size: 100_000,
            temp_store: TempStore::Memory,
            wal_autocheckpoint: Some(1000),
        }
    }
}

impl SqliteSettings {
    /// Shared in-memory database, nothing touches disk
    pub fn in_memory() -> Self {
        Self {
            mode: SqliteMode::Memory,
            cache: SqliteCache::Shared,
            busy_timeout_ms: 1000,
            journal_mode: JournalMode::Memory,
            synchronous: SynchronousMode::Off,
            cache_size: 10_000,
            temp_store: TempStore::Memory,
            wal_autocheckpoint: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct APISettings {
    pub domain: String,
    pub port: String,
    pub origins: Vec<String>,
}

impl Default for APISettings {
    fn default() -> Self {
        APISettings {
            domain: String::from("127.0.0.1"),
            port: String::from("3978"),
            origins: vec![String::from("http://localhost:3978")],
        }
    }
}

/// Identity the bot posts cards under
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    pub id: String,
    pub name: String,
}

impl Default for BotSettings {
    fn default() -> Self {
        BotSettings {
            id: String::from("28:luckydraw"),
            name: String::from("Lucky Draw"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorSettings {
    /// When false, outgoing cards are only logged
    pub enabled: bool,
    /// Sent as `Authorization: Bearer <token>` on every connector call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        ConnectorSettings {
            enabled: false,
            bearer_token: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerMode {
    /// In-process timers, lost on restart until open competitions are rescheduled
    Local,
    /// External timer service that calls back over HTTP
    Remote,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub mode: SchedulerMode,
    /// Endpoint of the external timer service, only used in remote mode
    pub timer_url: String,
    /// Publicly reachable base url of this service, draw callbacks are sent here
    pub callback_base_url: String,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            mode: SchedulerMode::Local,
            timer_url: String::from("http://127.0.0.1:7071/api/timers"),
            callback_base_url: String::from("http://127.0.0.1:3978"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitionSettings {
    /// Draw delay when the command has no time field
    pub default_draw_delay_secs: u64,
    /// How far in the past a planned draw time may be and still be accepted
    pub past_tolerance_secs: u64,
    /// Attempts for one optimistic read-modify-write before giving up with a conflict
    pub max_mutate_attempts: u32,
}

impl Default for CompetitionSettings {
    fn default() -> Self {
        CompetitionSettings {
            default_draw_delay_secs: 60,
            past_tolerance_secs: 60,
            max_mutate_attempts: 10,
        }
    }
}

/// Configured durations are capped at a year
const MAX_CONFIGURED_SECS: u64 = 366 * 24 * 60 * 60;

impl CompetitionSettings {
    pub fn default_draw_delay(&self) -> Duration {
        capped_seconds(self.default_draw_delay_secs)
    }

    pub fn past_tolerance(&self) -> Duration {
        capped_seconds(self.past_tolerance_secs)
    }
}

fn capped_seconds(secs: u64) -> Duration {
    let secs = i64::try_from(secs.min(MAX_CONFIGURED_SECS)).unwrap_or(i64::MAX);
    Duration::seconds(secs)
}

pub fn get_settings() -> Result<Settings, anyhow::Error> {
    get_settings_with_cli(Cli::parse())
}

pub fn get_settings_with_cli(cli: Cli) -> Result<Settings, anyhow::Error> {
    let mut settings = match cli.config {
        Some(config_path) => {
            let path = PathBuf::from(config_path);
            let absolute_path = if path.is_absolute() {
                path
            } else {
                env::current_dir()?.join(path)
            };
            let mut file = File::open(&absolute_path)
                .map_err(|e| anyhow!("Failed to find file {:?}: {}", absolute_path, e))?;
            read_settings(&mut file)?
        }
        None => match File::open(Settings::default_config_path()) {
            Ok(mut file) => read_settings(&mut file)?,
            Err(_) => write_default_settings()?,
        },
    };

    if let Some(level) = cli.level {
        settings.level = Some(level);
    }

    Ok(settings)
}

fn read_settings(file: &mut File) -> Result<Settings, anyhow::Error> {
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| anyhow!("Failed to read config: {}", e))?;
    toml::from_str(&content).map_err(|e| anyhow!("Failed to map config to settings: {}", e))
}

fn write_default_settings() -> Result<Settings, anyhow::Error> {
    let settings = Settings::default();

    fs::create_dir_all(Settings::config_directory())
        .map_err(|e| anyhow!("Failed to create config directory: {}", e))?;

    let toml_content = toml::to_string(&settings)
        .map_err(|e| anyhow!("Failed to serialize default settings: {}", e))?;
    let mut file = File::create(Settings::default_config_path())
        .map_err(|e| anyhow!("Failed to create config file: {}", e))?;
    file.write_all(toml_content.as_bytes())
        .map_err(|e| anyhow!("Failed to write default config: {}", e))?;

    Ok(settings)
}

pub fn setup_logger(
    level: Option<String>,
    filter_targets: Vec<String>,
) -> Result<(), fern::InitError> {
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let timestamp = OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default();
            out.finish(format_args!(
                "[{} {}] {}: {}",
                timestamp,
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .level(get_log_level(level))
        .filter(move |metadata| {
            !filter_targets
                .iter()
                .any(|filter| metadata.target().starts_with(filter))
        })
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

/// Explicit level first, then `RUST_LOG`, then info
pub fn get_log_level(level: Option<String>) -> LevelFilter {
    let level = level
        .or_else(|| env::var("RUST_LOG").ok())
        .unwrap_or_default();
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}
