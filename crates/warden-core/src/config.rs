use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::MemberId, errors::Error, Result};

const DEFAULT_DATA_DIR: &str = "users";
const DEFAULT_HTTP_PORT: u16 = 3000;

/// Files owned by one account under `<data_dir>/<account>/`.
#[derive(Clone, Debug)]
pub struct AccountPaths {
    pub dir: PathBuf,
    pub credentials: PathBuf,
    pub admin: PathBuf,
    pub log: PathBuf,
}

impl AccountPaths {
    pub fn new(data_dir: &Path, account: &str) -> Result<Self> {
        let account = account.trim();
        if account.is_empty() {
            return Err(Error::Config("account id is required".to_string()));
        }
        if account == "." || account == ".." || account.contains(['/', '\\']) {
            return Err(Error::Config(format!(
                "account id must be a plain directory name: {account}"
            )));
        }

        let dir = data_dir.join(account);
        Ok(Self {
            credentials: dir.join("appstate.json"),
            admin: dir.join("admin.txt"),
            log: dir.join("logs.txt"),
            dir,
        })
    }
}

/// Fixed delays and periods used by the lifecycle manager and its timers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timers {
    /// Wait before the next connect attempt after an auth failure.
    pub retry_delay: Duration,
    /// Wait before calling `listen()` again after the event stream broke.
    pub relisten_delay: Duration,
    pub heartbeat_interval: Duration,
    /// How long the typing indicator stays on during a heartbeat.
    pub heartbeat_hold: Duration,
    pub persist_interval: Duration,
}

impl Default for Timers {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(10),
            relisten_delay: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(5 * 60),
            heartbeat_hold: Duration::from_millis(1500),
            persist_interval: Duration::from_secs(10 * 60),
        }
    }
}

impl Timers {
    fn from_env() -> Self {
        let d = Self::default();
        Self {
            retry_delay: env_millis("WARDEN_RETRY_DELAY_MS").unwrap_or(d.retry_delay),
            relisten_delay: env_millis("WARDEN_RELISTEN_DELAY_MS").unwrap_or(d.relisten_delay),
            heartbeat_interval: env_millis("WARDEN_HEARTBEAT_INTERVAL_MS")
                .unwrap_or(d.heartbeat_interval),
            heartbeat_hold: env_millis("WARDEN_HEARTBEAT_HOLD_MS").unwrap_or(d.heartbeat_hold),
            persist_interval: env_millis("WARDEN_PERSIST_INTERVAL_MS")
                .unwrap_or(d.persist_interval),
        }
    }
}

/// Values supplied on the command line; they win over the environment.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub port: Option<u16>,
}

/// Typed runtime configuration for one account.
#[derive(Clone, Debug)]
pub struct Config {
    pub account: String,
    pub paths: AccountPaths,
    pub admin_id: MemberId,
    pub http_port: u16,
    pub timers: Timers,
}

impl Config {
    /// Resolve the account directory without touching its contents.
    ///
    /// Split from [`Config::load`] so logging can be pointed at `logs.txt`
    /// before the admin/credential files are validated.
    pub fn resolve_paths(account: &str, overrides: &Overrides) -> Result<AccountPaths> {
        load_dotenv_if_present(Path::new(".env"));

        let data_dir = overrides
            .data_dir
            .clone()
            .or_else(|| env_path("WARDEN_DATA_DIR"))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        AccountPaths::new(&data_dir, account)
    }

    pub fn load(account: &str, overrides: Overrides) -> Result<Self> {
        let paths = Self::resolve_paths(account, &overrides)?;
        let admin_id = read_admin_id(&paths.admin)?;

        let http_port = match overrides.port {
            Some(p) => p,
            None => match env_str("PORT") {
                Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                    Error::Config(format!("PORT must be a port number, got {raw:?}"))
                })?,
                None => DEFAULT_HTTP_PORT,
            },
        };

        Ok(Self {
            account: account.trim().to_string(),
            paths,
            admin_id,
            http_port,
            timers: Timers::from_env(),
        })
    }
}

/// Read the administrator identity; a missing or blank file is fatal.
pub fn read_admin_id(path: &Path) -> Result<MemberId> {
    let raw = fs::read_to_string(path).map_err(|e| Error::InvalidFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let id = raw.trim();
    if id.is_empty() {
        return Err(Error::InvalidFile {
            path: path.to_path_buf(),
            reason: "administrator id missing".to_string(),
        });
    }
    Ok(MemberId(id.to_string()))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_millis(key: &str) -> Option<Duration> {
    env_str(key)
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Apply `WARDEN_*` and `PORT` entries from a `.env` file. Variables already
/// set in the environment win; unrelated keys are left alone.
fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    for (key, value) in parse_dotenv(&contents) {
        let ours = key == "PORT" || key.starts_with("WARDEN_");
        if ours && env::var_os(&key).is_none() {
            env::set_var(key, value);
        }
    }
}

/// `KEY=VALUE` lines, optionally prefixed with `export` and quoted.
fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim();
            let unquoted = ['"', '\'']
                .iter()
                .find_map(|q| value.strip_prefix(*q)?.strip_suffix(*q))
                .unwrap_or(value);
            Some((key.to_string(), unquoted.to_string()))
        })
        .collect()
}
