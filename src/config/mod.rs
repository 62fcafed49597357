use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    net::SocketAddr,
    path::PathBuf,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use directories::BaseDirs;

/// Raw key/value configuration: defaults, then `.runnerrc`, then environment.
#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        let config_path = env::var("RUNNER_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());
        Self::load_from(config_path, env::vars())
    }

    /// Build a config from an explicit rc file and environment snapshot.
    pub fn load_from<I>(config_path: PathBuf, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut map = default_map();

        // Read .runnerrc if exists
        if config_path.exists() {
            if let Ok(file) = fs::File::open(&config_path) {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(|l| l.ok()) {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once('=') {
                        map.insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
            }
        }

        // Overlay environment variables (take precedence)
        for (k, v) in vars {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false)
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .with_context(|| format!("{key} must be a whole number, got {v:?}"))
            })
            .transpose()
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }
}

/// How execution outcomes map onto HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StatusMode {
    /// 200 on success, 5xx on any failure.
    #[default]
    Strict,
    /// Always 200; callers tell outcomes apart by body text.
    Compat,
}

/// Typed settings handed to the executor and router at construction.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub script_path: PathBuf,
    pub bind_addr: SocketAddr,
    pub timeout: Option<Duration>,
    pub status_mode: StatusMode,
    pub include_output_on_failure: bool,
}

impl RunnerSettings {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let script_path = cfg
            .get_path("RUNNER_SCRIPT_PATH")
            .ok_or_else(|| anyhow!("RUNNER_SCRIPT_PATH is not set"))?;
        let bind = cfg
            .get("RUNNER_BIND_ADDR")
            .ok_or_else(|| anyhow!("RUNNER_BIND_ADDR is not set"))?;
        let bind_addr = bind
            .parse::<SocketAddr>()
            .with_context(|| format!("RUNNER_BIND_ADDR is not a socket address: {bind:?}"))?;
        let timeout = cfg
            .get_u64("RUNNER_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let status_mode = match cfg.get("RUNNER_STATUS_MODE") {
            Some(v) => StatusMode::from_str(v.trim(), true)
                .map_err(|e| anyhow!("RUNNER_STATUS_MODE: {e}"))?,
            None => StatusMode::default(),
        };

        Ok(Self {
            script_path,
            bind_addr,
            timeout,
            status_mode,
            include_output_on_failure: cfg.get_bool("RUNNER_INCLUDE_OUTPUT_ON_FAILURE"),
        })
    }
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "RUNNER_SCRIPT_PATH",
        "RUNNER_BIND_ADDR",
        "RUNNER_TIMEOUT_SECS",
        "RUNNER_STATUS_MODE",
        "RUNNER_INCLUDE_OUTPUT_ON_FAILURE",
    ];

    KEYS.contains(&k)
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("script_runner").join(".runnerrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert("RUNNER_SCRIPT_PATH".into(), "./eureka.sh".into());
    m.insert("RUNNER_BIND_ADDR".into(), "0.0.0.0:8080".into());
    m.insert("RUNNER_TIMEOUT_SECS".into(), "0".into());
    m.insert("RUNNER_STATUS_MODE".into(), "strict".into());
    m.insert("RUNNER_INCLUDE_OUTPUT_ON_FAILURE".into(), "false".into());
    m
}
