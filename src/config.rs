//! Configuration for all pjc-mc components
//!
//! Loaded from a TOML file with one table per component:
//!
//! ```toml
//! [supervisor]
//! program = "/opt/pjc-mc/bin/pjc-mc.py"
//! stop_timeout = "10s"
//!
//! [launcher]
//! host = "pjc-mc.local"
//! max_attempts = 120
//!
//! [package]
//! deploy_target = "pi@pjc-mc.local:/tmp/"
//! ```
//!
//! Every field has a default matching the stock installation, so an absent
//! file or an empty table is valid.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "PJC_MC_CONFIG";

/// System-wide config location
pub const SYSTEM_CONFIG_PATH: &str = "/etc/pjc-mc/pjc-mc.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub supervisor: SupervisorConfig,
    pub launcher: LauncherConfig,
    pub package: PackageConfig,
}

impl Config {
    /// Load configuration, trying in order: the explicit path, `$PJC_MC_CONFIG`,
    /// the system config, the user config. Falls back to defaults.
    ///
    /// An explicit path must exist. Other candidates are skipped when missing.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        for path in Self::candidates() {
            if path.is_file() {
                log::debug!("Loading config from {}", path.display());
                return Self::from_file(&path);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Candidate config paths in lookup order
    pub fn candidates() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(p) = std::env::var_os(CONFIG_ENV) {
            paths.push(PathBuf::from(p));
        }
        paths.push(PathBuf::from(SYSTEM_CONFIG_PATH));
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("pjc-mc/pjc-mc.toml"));
        }
        paths
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Service supervisor settings (the init script's fixed paths)
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Name used in messages and log markers
    pub name: String,
    /// Interpreter the program is run with (None = exec program directly)
    pub interpreter: Option<PathBuf>,
    /// Daemon program; also the token searched for by `status`
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
    /// Search-path variable set for the daemon (e.g. PYTHONPATH)
    pub search_path_var: String,
    pub search_path: Option<String>,
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    /// Optional KEY=VALUE override file, read at start if present
    pub env_file: Option<PathBuf>,
    /// Delay between spawn and the liveness probe
    #[serde(with = "duration")]
    pub start_grace: Duration,
    /// How long stop waits for exit before SIGKILL (0 = signal and forget)
    #[serde(with = "duration")]
    pub stop_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            name: "pjc-mc".to_string(),
            interpreter: Some(PathBuf::from("/usr/bin/python")),
            program: PathBuf::from("/opt/pjc-mc/bin/pjc-mc.py"),
            args: Vec::new(),
            working_directory: Some(PathBuf::from("/opt/pjc-mc")),
            search_path_var: "PYTHONPATH".to_string(),
            search_path: Some("/opt/pjc-mc/lib".to_string()),
            pid_file: PathBuf::from("/var/run/pjc-mc.pid"),
            log_file: PathBuf::from("/var/log/pjc-mc.log"),
            env_file: Some(PathBuf::from("/etc/default/pjc-mc")),
            start_grace: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(10),
        }
    }
}

/// Display launcher settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LauncherConfig {
    /// Host probed for reachability
    pub host: String,
    pub port: u16,
    /// Path component of the default URL
    pub path: String,
    /// Full URL; overrides host/port/path when set
    pub url: Option<String>,
    /// Browser command line; `{url}` is substituted
    pub browser: String,
    /// Per-probe timeout passed to ping
    #[serde(with = "duration")]
    pub probe_timeout: Duration,
    #[serde(with = "duration")]
    pub interval: Duration,
    /// Interval multiplier after each failed probe (1.0 = fixed interval)
    pub backoff_factor: f64,
    #[serde(with = "duration")]
    pub max_interval: Duration,
    /// Give up after this many failed probes (None = never)
    pub max_attempts: Option<u32>,
    /// Give up after this much time (None = never)
    #[serde(with = "duration::option")]
    pub timeout: Option<Duration>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            host: "pjc-mc.local".to_string(),
            port: 8080,
            path: "tv".to_string(),
            url: None,
            browser: "chromium-browser --kiosk --incognito --noerrdialogs {url}".to_string(),
            probe_timeout: Duration::from_secs(1),
            interval: Duration::from_secs(1),
            backoff_factor: 1.0,
            max_interval: Duration::from_secs(30),
            max_attempts: None,
            timeout: None,
        }
    }
}

impl LauncherConfig {
    /// URL the browser is pointed at
    pub fn url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "http://{}:{}/{}",
                self.host,
                self.port,
                self.path.trim_start_matches('/')
            ),
        }
    }
}

/// A directory copied with an allow-list of file name patterns
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSet {
    /// Source directory, relative to the project root
    pub source: PathBuf,
    /// Destination, relative to the staging tree
    pub destination: PathBuf,
    /// Glob patterns matched against file names (e.g. "*.js")
    pub include: Vec<String>,
}

/// A single file copied to a fixed location
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileCopy {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Permission bits for the copy (e.g. 0o755)
    pub mode: Option<u32>,
}

/// Cargo output for the Pi target; the stock package is `Architecture: armhf`
pub const CROSS_RELEASE_DIR: &str = "target/armv7-unknown-linux-gnueabihf/release";

/// Package builder settings (the Makefile's variables)
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageConfig {
    /// Project root; other relative source paths are resolved against it
    pub root: PathBuf,
    /// Staging trees are created under this directory
    pub build_dir: PathBuf,
    /// Built archives land here
    pub output_dir: PathBuf,
    /// Directory holding `control` and maintainer scripts
    pub control_dir: PathBuf,
    pub file_sets: Vec<FileSet>,
    pub files: Vec<FileCopy>,
    /// Version file location inside the staging tree
    pub version_file: PathBuf,
    /// scp destination for deploy
    pub deploy_target: String,
}

impl Default for PackageConfig {
    fn default() -> Self {
        const WEB_ASSETS: &[&str] = &[
            "*.html", "*.js", "*.css", "*.png", "*.jpg", "*.gif", "*.svg", "*.ico", "*.woff",
            "*.woff2", "*.ttf",
        ];

        Self {
            root: PathBuf::from("."),
            build_dir: PathBuf::from("build"),
            output_dir: PathBuf::from("dist"),
            control_dir: PathBuf::from("packaging/DEBIAN"),
            file_sets: vec![
                FileSet {
                    source: PathBuf::from("src/bin"),
                    destination: PathBuf::from("opt/pjc-mc/bin"),
                    include: vec!["*.py".to_string()],
                },
                FileSet {
                    source: PathBuf::from("src/lib"),
                    destination: PathBuf::from("opt/pjc-mc/lib"),
                    include: vec!["*.py".to_string()],
                },
                FileSet {
                    source: PathBuf::from("src/lib/pjc/web"),
                    destination: PathBuf::from("opt/pjc-mc/lib/pjc/web"),
                    include: WEB_ASSETS.iter().map(|s| s.to_string()).collect(),
                },
                FileSet {
                    source: PathBuf::from("src/data"),
                    destination: PathBuf::from("opt/pjc-mc/data"),
                    include: vec!["*.csv".to_string(), "*.json".to_string()],
                },
            ],
            files: vec![
                FileCopy {
                    source: PathBuf::from("packaging/init.d/pjc-mc"),
                    destination: PathBuf::from("etc/init.d/pjc-mc"),
                    mode: Some(0o755),
                },
                FileCopy {
                    source: Path::new(CROSS_RELEASE_DIR).join("pjc-mc"),
                    destination: PathBuf::from("usr/bin/pjc-mc"),
                    mode: Some(0o755),
                },
                FileCopy {
                    source: Path::new(CROSS_RELEASE_DIR).join("pjc-mc-kiosk"),
                    destination: PathBuf::from("usr/bin/pjc-mc-kiosk"),
                    mode: Some(0o755),
                },
                FileCopy {
                    source: PathBuf::from("packaging/pjc-mc.toml"),
                    destination: PathBuf::from("etc/pjc-mc/pjc-mc.toml"),
                    mode: Some(0o644),
                },
            ],
            version_file: PathBuf::from("opt/pjc-mc/VERSION"),
            deploy_target: "pi@pjc-mc.local:/tmp/".to_string(),
        }
    }
}

impl PackageConfig {
    /// Resolve a path against the project root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Parse a duration (e.g., "500ms", "1s", "2min", "1h", bare number = seconds)
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();

    if let Some(n) = s.strip_suffix("ms") {
        n.trim().parse().ok().map(Duration::from_millis)
    } else if let Some(n) = s.strip_suffix("min") {
        n.trim().parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else if let Some(n) = s.strip_suffix('s') {
        n.trim().parse().ok().map(Duration::from_secs)
    } else if let Some(n) = s.strip_suffix('h') {
        n.trim().parse::<u64>().ok()?.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse().ok().map(Duration::from_secs)
    }
}

/// Serde adapters for human-readable durations
mod duration {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    fn convert<E: serde::de::Error>(raw: Raw) -> Result<Duration, E> {
        match raw {
            Raw::Secs(n) => Ok(Duration::from_secs(n)),
            Raw::Text(s) => super::parse_duration(&s)
                .ok_or_else(|| E::custom(format!("invalid duration: {s:?}"))),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        convert(Raw::deserialize(d)?)
    }

    pub mod option {
        use super::Raw;
        use serde::{Deserialize, Deserializer};
        use std::time::Duration;

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Option::<Raw>::deserialize(d)?.map(super::convert).transpose()
        }
    }
}
