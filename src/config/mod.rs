//! Typed configuration, loaded from TOML with built-in defaults on any
//! failure — a misconfigured file is a warning, not a startup failure.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use serde::Deserialize;

static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Returns a cheap clone of the current process-wide configuration.
pub fn get_config() -> Arc<Config> {
    CONFIG.load_full()
}

/// Installs a new configuration as the process-wide default, used once at
/// startup after the config file has been parsed (or defaulted).
pub fn set_config(config: Config) {
    CONFIG.store(Arc::new(config));
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(rename = "maxClients")]
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            port: 8080,
            max_clients: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub size: usize,
}

impl Default for BufferConfig {
    fn default() -> BufferConfig {
        BufferConfig { size: 1000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThreadConfig {
    pub pool: PoolSizeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolSizeConfig {
    pub size: usize,
}

impl Default for PoolSizeConfig {
    fn default() -> PoolSizeConfig {
        PoolSizeConfig { size: 10 }
    }
}

impl Default for ThreadConfig {
    fn default() -> ThreadConfig {
        ThreadConfig {
            pool: PoolSizeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub directory: String,
    #[serde(rename = "type")]
    pub backend: String,
}

impl Default for StorageConfig {
    fn default() -> StorageConfig {
        StorageConfig {
            directory: "./logs".to_string(),
            backend: "file".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogFileConfig {
    pub format: String,
}

impl Default for LogFileConfig {
    fn default() -> LogFileConfig {
        LogFileConfig {
            format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub port: u16,
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> MetricsConfig {
        MetricsConfig {
            port: 9090,
            enabled: true,
        }
    }
}

/// Root configuration document, `#[serde(default)]` at every level so a
/// partial TOML file only overrides the keys it actually names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub buffer: BufferConfig,
    pub thread: ThreadConfig,
    pub storage: StorageConfig,
    pub log: LogFileConfig,
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            server: ServerConfig::default(),
            buffer: BufferConfig::default(),
            thread: ThreadConfig::default(),
            storage: StorageConfig::default(),
            log: LogFileConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Parses `path` as TOML, falling back to [`Config::default`] (logged as
    /// a warning) on any read or parse error. The server always starts.
    pub fn load(path: impl AsRef<Path>) -> Config {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "failed to parse config, using defaults");
                    Config::default()
                }
            },
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "failed to read config, using defaults");
                Config::default()
            }
        }
    }

    pub fn processor_workers(&self) -> usize {
        self.thread.pool.size.max(1)
    }
}
