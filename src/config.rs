use dirs::config_dir;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::{AppError, AppResult};

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Settings {
    /// "production" or "test"/"dev". Test environments log inbound bodies.
    pub environment: String,
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub http: HttpConfig,
    pub session: SessionConfig,
    pub codex_env: CodexEnvConfig,
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: "production".to_string(),
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            http: HttpConfig::default(),
            session: SessionConfig::default(),
            codex_env: CodexEnvConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    pub fn is_test_environment(&self) -> bool {
        matches!(
            self.environment.to_lowercase().as_str(),
            "test" | "dev" | "development"
        )
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
        }
    }
}

/// Base URLs of the two upstream APIs. Paths are appended by the handlers.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct UpstreamConfig {
    pub anthropic_base_url: String,
    pub openai_base_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            openai_base_url: "https://api.openai.com".to_string(),
        }
    }
}

/// Outbound connection pool settings
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-read timeout while a response is being received
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Upper bound on concurrently checked-out upstream connections
    pub max_connections: usize,
    pub max_idle_per_host: usize,
    pub idle_timeout_secs: u64,
    /// How long a request may wait for a free pool slot
    pub pool_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            connect_timeout_secs: 10,
            max_connections: 200,
            max_idle_per_host: 100,
            idle_timeout_secs: 30,
            pool_timeout_secs: 30,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SessionConfig {
    pub claude_window_secs: i64,
    pub codex_window_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            claude_window_secs: 12 * 3600,
            codex_window_secs: 24 * 3600,
        }
    }
}

/// Static facts reported in the synthesized environment-context message.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CodexEnvConfig {
    pub cwd: String,
    pub approval_policy: String,
    pub sandbox_mode: String,
    pub network_access: String,
    pub shell: String,
}

impl Default for CodexEnvConfig {
    fn default() -> Self {
        Self {
            cwd: "/home/user".to_string(),
            approval_policy: "on-request".to_string(),
            sandbox_mode: "read-only".to_string(),
            network_access: "restricted".to_string(),
            shell: "bash".to_string(),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "json" or "text"
    pub format: String,
    /// Number of records kept in memory for `/api/logs`
    pub buffer_size: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            buffer_size: 1000,
        }
    }
}

fn settings_path() -> PathBuf {
    let mut p = config_dir().unwrap_or_else(|| PathBuf::from("."));
    p.push("ccx-gateway");
    p.push("settings.toml");
    p
}

/// Load settings from `path` (or the per-user default location), then apply
/// environment overrides. A missing file yields defaults; a malformed one is
/// an error.
pub fn load(path: Option<&Path>) -> AppResult<Settings> {
    let p = path.map(Path::to_path_buf).unwrap_or_else(settings_path);
    let mut cfg = if p.exists() {
        let s = fs::read_to_string(&p)?;
        toml::from_str(&s)?
    } else if path.is_some() {
        return Err(AppError::Config(format!(
            "Config file {:?} does not exist",
            p
        )));
    } else {
        Settings::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

/// Apply overrides from a key lookup. Split out so it can be fed a map in tests.
pub fn apply_env_overrides<F>(cfg: &mut Settings, lookup: F) -> AppResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(v) = get("CCX_ENVIRONMENT") {
        cfg.environment = v;
    }
    if let Some(v) = get("CCX_HOST") {
        cfg.server.host = v;
    }
    if let Some(v) = get("CCX_PORT") {
        cfg.server.port = v
            .parse()
            .map_err(|_| AppError::Config(format!("CCX_PORT is not a valid port: {}", v)))?;
    }
    if let Some(v) = get("ANTHROPIC_BASE_URL") {
        cfg.upstream.anthropic_base_url = v;
    }
    if let Some(v) = get("OPENAI_BASE_URL") {
        cfg.upstream.openai_base_url = v;
    }
    if let Some(v) = get("CODEX_ENV_CWD") {
        cfg.codex_env.cwd = v;
    }
    if let Some(v) = get("CODEX_ENV_APPROVAL_POLICY") {
        cfg.codex_env.approval_policy = v;
    }
    if let Some(v) = get("CODEX_ENV_SANDBOX_MODE") {
        cfg.codex_env.sandbox_mode = v;
    }
    if let Some(v) = get("CODEX_ENV_NETWORK_ACCESS") {
        cfg.codex_env.network_access = v;
    }
    if let Some(v) = get("CODEX_ENV_SHELL") {
        cfg.codex_env.shell = v;
    }
    if let Some(v) = get("CCX_LOG_LEVEL") {
        cfg.logging.level = v;
    }

    if cfg.session.claude_window_secs <= 0 || cfg.session.codex_window_secs <= 0 {
        return Err(AppError::Config(
            "session windows must be positive".to_string(),
        ));
    }
    if cfg.http.max_connections == 0 {
        return Err(AppError::Config(
            "http.max_connections must be at least 1".to_string(),
        ));
    }

    Ok(())
}
