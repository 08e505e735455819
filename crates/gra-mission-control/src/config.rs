use anyhow::{bail, Context};
use clap::{ArgAction, Parser};
use gra_core::palette::Palette;
use gra_core::plans::default_finished_states;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "gra-mission-control",
    about = "Operator dashboard for planning and execution graphs"
)]
pub struct Args {
    /// Base URL of the backend REST API.
    #[arg(long, env = "GRA_BACKEND_API_URL", default_value = "http://localhost:8000")]
    pub backend_url: String,
    /// Push websocket URL; derived from the backend URL when omitted.
    #[arg(long, env = "GRA_PUSH_URL")]
    pub push_url: Option<String>,
    #[arg(long, env = "GRA_SUMMARY_POLL_SECS", default_value_t = 30)]
    pub summary_poll_secs: u64,
    #[arg(long, env = "GRA_DETAIL_POLL_SECS", default_value_t = 5)]
    pub detail_poll_secs: u64,
    #[arg(long, env = "GRA_AUTO_REFRESH", default_value = "true", action = ArgAction::Set, value_parser = parse_bool_arg)]
    pub auto_refresh: bool,
    #[arg(long, env = "GRA_REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,
    #[arg(long, env = "GRA_PUSH_ENABLED", default_value = "true", action = ArgAction::Set, value_parser = parse_bool_arg)]
    pub push_enabled: bool,
    /// Supervisor states that mark a plan as finished (comma separated).
    #[arg(long, env = "GRA_FINISHED_STATES", value_delimiter = ',')]
    pub finished_states: Vec<String>,
    /// Plan to select on startup.
    #[arg(long, env = "GRA_PLAN")]
    pub plan: Option<String>,
    #[arg(long, env = "GRA_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: Url,
    pub push_url: Url,
    pub summary_interval: Duration,
    pub detail_interval: Duration,
    pub auto_refresh: bool,
    pub request_timeout: Duration,
    pub push_enabled: bool,
    pub finished_states: Vec<String>,
    pub initial_plan: Option<String>,
    pub palette: Palette,
    pub log_stdout: bool,
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn from_args(args: Args) -> anyhow::Result<Self> {
        let backend_url = Url::parse(args.backend_url.trim())
            .with_context(|| format!("invalid backend url: {}", args.backend_url))?;
        if !matches!(backend_url.scheme(), "http" | "https") {
            bail!("backend url must be http or https: {backend_url}");
        }
        let push_url = match args.push_url.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                Url::parse(raw).with_context(|| format!("invalid push url: {raw}"))?
            }
            _ => derive_push_url(&backend_url)?,
        };
        let finished_states: Vec<String> = args
            .finished_states
            .into_iter()
            .map(|state| state.trim().to_string())
            .filter(|state| !state.is_empty())
            .collect();
        Ok(Self {
            backend_url,
            push_url,
            summary_interval: Duration::from_secs(args.summary_poll_secs.max(1)),
            detail_interval: Duration::from_secs(args.detail_poll_secs.max(1)),
            auto_refresh: args.auto_refresh,
            request_timeout: Duration::from_secs(args.request_timeout_secs.max(1)),
            push_enabled: args.push_enabled,
            finished_states: if finished_states.is_empty() {
                default_finished_states()
            } else {
                finished_states
            },
            initial_plan: args.plan.filter(|plan| !plan.trim().is_empty()),
            palette: Palette::default(),
            log_stdout: resolve_log_stdout(),
            log_file: args.log_file,
        })
    }
}

/// `http(s)://host/prefix` becomes `ws(s)://host/prefix/ws/status`.
pub fn derive_push_url(base: &Url) -> anyhow::Result<Url> {
    let scheme = match base.scheme() {
        "https" => "wss",
        _ => "ws",
    };
    let mut url = base.clone();
    if url.set_scheme(scheme).is_err() {
        bail!("cannot derive push url from {base}");
    }
    let path = format!("{}/ws/status", base.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    Ok(url)
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_bool_arg(value: &str) -> Result<bool, String> {
    parse_bool_flag(value).ok_or_else(|| format!("expected a boolean, got {value:?}"))
}

fn resolve_log_stdout() -> bool {
    std::env::var("GRA_LOG_STDOUT")
        .ok()
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// The dashboard owns the terminal, so logs are discarded unless a file or
/// stdout is requested.
pub fn init_logging(config: &Config) {
    if let Some(path) = &config.log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(env_filter())
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
                return;
            }
            Err(err) => eprintln!("log_file_error: {}: {err}", path.display()),
        }
    }
    if config.log_stdout {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(io::sink)
            .try_init();
    }
}
