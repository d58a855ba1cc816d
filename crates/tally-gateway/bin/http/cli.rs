use clap::{Parser, ValueEnum};
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::time::Duration;
use tally_core::settings::{
    DEFAULT_CACHE_TIMEOUT, DEFAULT_FLUSH_THRESHOLD, DEFAULT_GRACE, DEFAULT_WINDOW,
};
use tally_core::generator::DEFAULT_CODE_LENGTH;
use tally_core::{RandomCodeGenerator, VisitSettings};
use tally_redirector::VisitDispatch;
use tally_telemetry::LogFormat;

pub const LISTEN_ADDR_ENV: &str = "TALLY_GATEWAY_LISTEN_ADDR";
pub const PUBLIC_BASE_URL_ENV: &str = "TALLY_GATEWAY_PUBLIC_BASE_URL";
pub const STORAGE_BACKEND_ENV: &str = "TALLY_GATEWAY_STORAGE_BACKEND";
pub const MYSQL_DSN_ENV: &str = "TALLY_GATEWAY_MYSQL_DSN";
pub const CACHE_BACKEND_ENV: &str = "TALLY_GATEWAY_CACHE_BACKEND";
pub const REDIS_URL_ENV: &str = "TALLY_GATEWAY_REDIS_URL";
pub const FLUSH_THRESHOLD_ENV: &str = "TALLY_GATEWAY_FLUSH_THRESHOLD";
pub const WINDOW_SECS_ENV: &str = "TALLY_GATEWAY_WINDOW_SECS";
pub const GRACE_SECS_ENV: &str = "TALLY_GATEWAY_GRACE_SECS";
pub const CACHE_TIMEOUT_MS_ENV: &str = "TALLY_GATEWAY_CACHE_TIMEOUT_MS";
pub const FLUSH_TICK_SECS_ENV: &str = "TALLY_GATEWAY_FLUSH_TICK_SECS";
pub const VISIT_WAIT_MS_ENV: &str = "TALLY_GATEWAY_VISIT_WAIT_MS";
pub const LOG_FORMAT_ENV: &str = "TALLY_GATEWAY_LOG_FORMAT";
pub const CODE_LENGTH_ENV: &str = "TALLY_GATEWAY_CODE_LENGTH";

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "redis")]
    Redis,
}

impl Display for CacheBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackendArg::InMemory => write!(f, "in-memory"),
            CacheBackendArg::Redis => write!(f, "redis"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "tally-gateway")]
pub struct CLI {
    #[arg(long, env = LISTEN_ADDR_ENV, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: SocketAddr,

    /// Base URL that short links are reported under.
    #[arg(long, env = PUBLIC_BASE_URL_ENV, default_value = DEFAULT_PUBLIC_BASE_URL)]
    pub public_base_url: String,

    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = MYSQL_DSN_ENV, required_if_eq("storage", "mysql"))]
    pub mysql_dsn: Option<String>,

    #[arg(
        long,
        env = CACHE_BACKEND_ENV,
        value_enum,
        default_value_t = CacheBackendArg::InMemory
    )]
    pub cache: CacheBackendArg,

    #[arg(long, env = REDIS_URL_ENV, required_if_eq("cache", "redis"))]
    pub redis_url: Option<String>,

    #[arg(long, env = FLUSH_THRESHOLD_ENV, default_value_t = DEFAULT_FLUSH_THRESHOLD)]
    pub flush_threshold: u64,

    #[arg(long, env = WINDOW_SECS_ENV, default_value_t = DEFAULT_WINDOW.as_secs())]
    pub window_secs: u64,

    #[arg(long, env = GRACE_SECS_ENV, default_value_t = DEFAULT_GRACE.as_secs())]
    pub grace_secs: u64,

    #[arg(
        long,
        env = CACHE_TIMEOUT_MS_ENV,
        default_value_t = DEFAULT_CACHE_TIMEOUT.as_millis() as u64
    )]
    pub cache_timeout_ms: u64,

    /// How often due catch-up flushes are run.
    #[arg(long, env = FLUSH_TICK_SECS_ENV, default_value_t = 30)]
    pub flush_tick_secs: u64,

    /// How long a redirect waits for its visit to be recorded; 0 returns
    /// immediately.
    #[arg(long, env = VISIT_WAIT_MS_ENV, default_value_t = 0)]
    pub visit_wait_ms: u64,

    /// Length of codes generated for links created without one.
    #[arg(long, env = CODE_LENGTH_ENV, default_value_t = DEFAULT_CODE_LENGTH)]
    pub code_length: usize,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl CLI {
    pub fn visit_settings(&self) -> VisitSettings {
        VisitSettings::builder()
            .flush_threshold(self.flush_threshold)
            .window(Duration::from_secs(self.window_secs))
            .grace(Duration::from_secs(self.grace_secs))
            .cache_timeout(Duration::from_millis(self.cache_timeout_ms))
            .build()
    }

    pub fn visit_dispatch(&self) -> VisitDispatch {
        match self.visit_wait_ms {
            0 => VisitDispatch::Detached,
            ms => VisitDispatch::WaitUpTo(Duration::from_millis(ms)),
        }
    }

    pub fn code_generator(&self) -> RandomCodeGenerator {
        RandomCodeGenerator::new(self.code_length)
    }

    pub fn flush_tick(&self) -> Duration {
        Duration::from_secs(self.flush_tick_secs.max(1))
    }
}
