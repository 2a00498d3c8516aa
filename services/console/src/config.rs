use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

// Console configuration sourced from environment variables, optionally
// overridden by the YAML file named in CONSOLE_CONFIG.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub run_mode: RunMode,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub root: RootConfig,
    pub jwt: JwtConfig,
    pub policy: PolicyConfig,
    pub auth: AuthConfig,
    pub permission_seed: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Release,
    /// Unauthenticated requests run as the root user. Local development only.
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

#[derive(Clone)]
pub struct RootConfig {
    pub user_name: String,
    pub password: String,
    pub real_name: String,
}

impl std::fmt::Debug for RootConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootConfig")
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .field("real_name", &self.real_name)
            .finish()
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    pub signing_key: String,
    pub expired: Duration,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("signing_key", &"<redacted>")
            .field("expired", &self.expired)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Check every non-public request against the fact base.
    pub enforce: bool,
    /// Run the periodic bulk reload.
    pub auto_load: bool,
    pub reload_interval: Duration,
    /// Fail the request when a post-commit policy sync fails.
    pub strict_sync: bool,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Prefixes that skip enforcement; a token, if present, is still resolved.
    pub public_prefixes: Vec<String>,
    /// Prefixes that may be called without any token.
    pub anonymous_prefixes: Vec<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 10088)),
            metrics_bind: SocketAddr::from(([0, 0, 0, 0], 9090)),
            run_mode: RunMode::Release,
            storage: StorageBackend::Memory,
            postgres: None,
            root: RootConfig {
                user_name: "root".to_string(),
                password: "abc-123".to_string(),
                real_name: "Superuser".to_string(),
            },
            jwt: JwtConfig {
                signing_key: "console".to_string(),
                expired: Duration::from_secs(7200),
            },
            policy: PolicyConfig {
                enforce: true,
                auto_load: false,
                reload_interval: Duration::from_secs(60),
                strict_sync: false,
            },
            auth: AuthConfig {
                public_prefixes: vec!["/api/v1/pub".to_string()],
                anonymous_prefixes: vec!["/api/v1/pub/login".to_string()],
            },
            permission_seed: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PostgresOverride {
    url: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RootOverride {
    user_name: Option<String>,
    password: Option<String>,
    real_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct JwtOverride {
    signing_key: Option<String>,
    expired_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyOverride {
    enforce: Option<bool>,
    auto_load: Option<bool>,
    reload_interval_secs: Option<u64>,
    strict_sync: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthOverride {
    public_prefixes: Option<Vec<String>>,
    anonymous_prefixes: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ConsoleConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    run_mode: Option<String>,
    storage: Option<String>,
    postgres: Option<PostgresOverride>,
    root: Option<RootOverride>,
    jwt: Option<JwtOverride>,
    policy: Option<PolicyOverride>,
    auth: Option<AuthOverride>,
    permission_seed: Option<String>,
}

fn parse_run_mode(value: &str) -> Result<RunMode> {
    match value.to_ascii_lowercase().as_str() {
        "release" => Ok(RunMode::Release),
        "debug" => Ok(RunMode::Debug),
        other => bail!("unknown run mode: {other}"),
    }
}

fn parse_storage(value: &str) -> Result<StorageBackend> {
    match value.to_ascii_lowercase().as_str() {
        "memory" => Ok(StorageBackend::Memory),
        "postgres" => Ok(StorageBackend::Postgres),
        other => bail!("unknown storage backend: {other}"),
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("invalid boolean: {other}"),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

impl ConsoleConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(value) = env_var("CONSOLE_BIND") {
            config.bind_addr = value.parse().with_context(|| "parse CONSOLE_BIND")?;
        }
        if let Some(value) = env_var("CONSOLE_METRICS_BIND") {
            config.metrics_bind = value
                .parse()
                .with_context(|| "parse CONSOLE_METRICS_BIND")?;
        }
        if let Some(value) = env_var("CONSOLE_RUN_MODE") {
            config.run_mode = parse_run_mode(&value).with_context(|| "parse CONSOLE_RUN_MODE")?;
        }
        if let Some(value) = env_var("CONSOLE_STORAGE") {
            config.storage = parse_storage(&value).with_context(|| "parse CONSOLE_STORAGE")?;
        }
        if let Some(url) = env_var("CONSOLE_DATABASE_URL") {
            let max_connections = match env_var("CONSOLE_PG_MAX_CONNECTIONS") {
                Some(value) => value
                    .parse()
                    .with_context(|| "parse CONSOLE_PG_MAX_CONNECTIONS")?,
                None => 10,
            };
            let acquire_timeout_ms = match env_var("CONSOLE_PG_ACQUIRE_TIMEOUT_MS") {
                Some(value) => value
                    .parse()
                    .with_context(|| "parse CONSOLE_PG_ACQUIRE_TIMEOUT_MS")?,
                None => 5000,
            };
            config.postgres = Some(PostgresConfig {
                url,
                max_connections,
                acquire_timeout_ms,
            });
        }
        if let Some(value) = env_var("CONSOLE_ROOT_USER") {
            config.root.user_name = value;
        }
        if let Some(value) = env_var("CONSOLE_ROOT_PASSWORD") {
            config.root.password = value;
        }
        if let Some(value) = env_var("CONSOLE_ROOT_REAL_NAME") {
            config.root.real_name = value;
        }
        if let Some(value) = env_var("CONSOLE_JWT_SIGNING_KEY") {
            config.jwt.signing_key = value;
        }
        if let Some(value) = env_var("CONSOLE_JWT_EXPIRED") {
            let secs: u64 = value.parse().with_context(|| "parse CONSOLE_JWT_EXPIRED")?;
            config.jwt.expired = Duration::from_secs(secs);
        }
        if let Some(value) = env_var("CONSOLE_POLICY_ENFORCE") {
            config.policy.enforce =
                parse_bool(&value).with_context(|| "parse CONSOLE_POLICY_ENFORCE")?;
        }
        if let Some(value) = env_var("CONSOLE_POLICY_AUTO_LOAD") {
            config.policy.auto_load =
                parse_bool(&value).with_context(|| "parse CONSOLE_POLICY_AUTO_LOAD")?;
        }
        if let Some(value) = env_var("CONSOLE_POLICY_RELOAD_SECS") {
            let secs: u64 = value
                .parse()
                .with_context(|| "parse CONSOLE_POLICY_RELOAD_SECS")?;
            config.policy.reload_interval = Duration::from_secs(secs);
        }
        if let Some(value) = env_var("CONSOLE_POLICY_STRICT_SYNC") {
            config.policy.strict_sync =
                parse_bool(&value).with_context(|| "parse CONSOLE_POLICY_STRICT_SYNC")?;
        }
        if let Some(value) = env_var("CONSOLE_PUBLIC_PREFIXES") {
            config.auth.public_prefixes = parse_list(&value);
        }
        if let Some(value) = env_var("CONSOLE_ANONYMOUS_PREFIXES") {
            config.auth.anonymous_prefixes = parse_list(&value);
        }
        if let Some(value) = env_var("CONSOLE_PERMISSION_SEED") {
            config.permission_seed = Some(PathBuf::from(value));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Some(path) = env_var("CONSOLE_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read CONSOLE_CONFIG: {path}"))?;
            let override_cfg: ConsoleConfigOverride = serde_yaml::from_str(&contents)
                .with_context(|| "parse console config yaml")?;
            config.apply_override(override_cfg)?;
            config.validate()?;
        }
        Ok(config)
    }

    fn apply_override(&mut self, cfg: ConsoleConfigOverride) -> Result<()> {
        if let Some(value) = cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = cfg.run_mode {
            self.run_mode = parse_run_mode(&value)?;
        }
        if let Some(value) = cfg.storage {
            self.storage = parse_storage(&value)?;
        }
        if let Some(pg) = cfg.postgres {
            let current = self.postgres.take();
            let url = match (pg.url, current.as_ref()) {
                (Some(url), _) => url,
                (None, Some(existing)) => existing.url.clone(),
                (None, None) => bail!("postgres.url is required"),
            };
            self.postgres = Some(PostgresConfig {
                url,
                max_connections: pg
                    .max_connections
                    .or(current.as_ref().map(|c| c.max_connections))
                    .unwrap_or(10),
                acquire_timeout_ms: pg
                    .acquire_timeout_ms
                    .or(current.as_ref().map(|c| c.acquire_timeout_ms))
                    .unwrap_or(5000),
            });
        }
        if let Some(root) = cfg.root {
            if let Some(value) = root.user_name {
                self.root.user_name = value;
            }
            if let Some(value) = root.password {
                self.root.password = value;
            }
            if let Some(value) = root.real_name {
                self.root.real_name = value;
            }
        }
        if let Some(jwt) = cfg.jwt {
            if let Some(value) = jwt.signing_key {
                self.jwt.signing_key = value;
            }
            if let Some(secs) = jwt.expired_secs {
                self.jwt.expired = Duration::from_secs(secs);
            }
        }
        if let Some(policy) = cfg.policy {
            if let Some(value) = policy.enforce {
                self.policy.enforce = value;
            }
            if let Some(value) = policy.auto_load {
                self.policy.auto_load = value;
            }
            if let Some(secs) = policy.reload_interval_secs {
                self.policy.reload_interval = Duration::from_secs(secs);
            }
            if let Some(value) = policy.strict_sync {
                self.policy.strict_sync = value;
            }
        }
        if let Some(auth) = cfg.auth {
            if let Some(value) = auth.public_prefixes {
                self.auth.public_prefixes = value;
            }
            if let Some(value) = auth.anonymous_prefixes {
                self.auth.anonymous_prefixes = value;
            }
        }
        if let Some(value) = cfg.permission_seed {
            self.permission_seed = Some(PathBuf::from(value));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.root.user_name.is_empty() {
            bail!("root user name must not be empty");
        }
        if self.jwt.signing_key.is_empty() {
            bail!("jwt signing key must not be empty");
        }
        if self.policy.auto_load && self.policy.reload_interval.is_zero() {
            bail!("policy reload interval must be positive");
        }
        Ok(())
    }
}
