//! Application configuration management.
//!
//! Settings are layered with `figment`, later layers winning:
//!
//! 1. Built-in defaults
//! 2. Platform config file (`config.toml` in the project config directory)
//! 3. An explicit `--config` TOML file
//! 4. `DUPETREE_*` environment variables
//! 5. CLI flags, applied by [`Config::apply_scan_args`]
//!
//! [`Config::validate`] rejects unknown algorithm names before a scan starts.

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::ScanArgs;
use crate::duplicates::FinderConfig;
use crate::scanner::{default_ignored_names, CryptoDigest, FastChecksum, HasherConfig, WalkerConfig};

/// Prefix of environment variables read by [`Config::load`].
pub const ENV_PREFIX: &str = "DUPETREE_";

/// Errors produced while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A hash algorithm name is not supported.
    #[error("Unsupported {kind} algorithm: '{name}'")]
    UnsupportedAlgorithm {
        /// Which setting carried the name
        kind: &'static str,
        /// The rejected name
        name: String,
    },

    /// A numeric setting is out of range.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Setting name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// A layer could not be parsed.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of I/O threads for hashing and tree construction.
    pub io_threads: usize,
    /// Names skipped everywhere (OS metadata artifacts).
    pub ignored_names: Vec<String>,
    /// Gitignore-style ignore patterns.
    pub ignore_patterns: Vec<String>,
    /// Exclude files that are not writable.
    pub require_writable: bool,
    /// Follow symbolic links during the walk.
    pub follow_symlinks: bool,
    /// Fast checksum name (`xxh64`, `xxh32`).
    pub fast_checksum: String,
    /// Digest name (`sha256`, `sha512`).
    pub digest: String,
    /// Files up to this size are read in full by the prefix passes.
    pub tiny_file_limit: u64,
    /// Prefix length for medium files.
    pub medium_prefix: u64,
    /// Files from this size on use the large prefix.
    pub large_file_threshold: u64,
    /// Prefix length for large files.
    pub large_prefix: u64,
    /// Full reads at or above this size use a memory map.
    pub mmap_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        let hasher = HasherConfig::default();
        Self {
            io_threads: 4,
            ignored_names: default_ignored_names(),
            ignore_patterns: Vec::new(),
            require_writable: true,
            follow_symlinks: false,
            fast_checksum: hasher.fast_checksum.name().to_string(),
            digest: hasher.digest.name().to_string(),
            tiny_file_limit: hasher.tiny_file_limit,
            medium_prefix: hasher.medium_prefix,
            large_file_threshold: hasher.large_file_threshold,
            large_prefix: hasher.large_prefix,
            mmap_threshold: hasher.mmap_threshold,
        }
    }
}

impl Config {
    /// Load every layer except the CLI flags.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if a file or variable cannot be parsed.
    /// Missing files are skipped.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = Self::config_path() {
            log::trace!("Platform config file: {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        if let Some(path) = explicit {
            if !path.exists() {
                log::warn!("Config file {} does not exist", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Load defaults overlaid with a single TOML file, without the platform
    /// file or environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the file cannot be parsed.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::extract(
            Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(path.as_ref())),
        )
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Default platform-specific configuration path.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "dupetree", "dupetree")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Overlay the flags of a `scan` invocation.
    pub fn apply_scan_args(&mut self, args: &ScanArgs) {
        if let Some(threads) = args.io_threads {
            self.io_threads = threads;
        }
        self.ignore_patterns.extend(args.ignore_patterns.iter().cloned());
        if args.follow_symlinks {
            self.follow_symlinks = true;
        }
        if args.allow_readonly {
            self.require_writable = false;
        }
        if let Some(name) = &args.fast_checksum {
            self.fast_checksum.clone_from(name);
        }
        if let Some(name) = &args.digest {
            self.digest.clone_from(name);
        }
        if let Some(threshold) = args.mmap_threshold {
            self.mmap_threshold = threshold;
        }
    }

    /// Check every setting and resolve algorithm names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedAlgorithm`] for unknown algorithm
    /// names and [`ConfigError::InvalidValue`] for out-of-range numbers.
    pub fn validate(&self) -> Result<(FastChecksum, CryptoDigest), ConfigError> {
        let fast = FastChecksum::from_name(&self.fast_checksum).ok_or_else(|| {
            ConfigError::UnsupportedAlgorithm {
                kind: "checksum",
                name: self.fast_checksum.clone(),
            }
        })?;
        let digest =
            CryptoDigest::from_name(&self.digest).ok_or_else(|| ConfigError::UnsupportedAlgorithm {
                kind: "digest",
                name: self.digest.clone(),
            })?;

        if self.io_threads == 0 {
            return Err(ConfigError::InvalidValue {
                field: "io_threads",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.medium_prefix == 0 || self.large_prefix == 0 {
            return Err(ConfigError::InvalidValue {
                field: "prefix",
                reason: "prefix lengths must be positive".to_string(),
            });
        }
        if self.large_file_threshold <= self.tiny_file_limit {
            return Err(ConfigError::InvalidValue {
                field: "large_file_threshold",
                reason: format!(
                    "must exceed tiny_file_limit ({} <= {})",
                    self.large_file_threshold, self.tiny_file_limit
                ),
            });
        }
        Ok((fast, digest))
    }

    /// Walker settings. The root filter is filled in by the finder.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig::default()
            .with_follow_symlinks(self.follow_symlinks)
            .with_ignored_names(self.ignored_names.clone())
            .with_ignore_patterns(self.ignore_patterns.clone())
            .with_require_writable(self.require_writable)
    }

    /// Hasher settings.
    ///
    /// # Errors
    ///
    /// Returns the [`Config::validate`] errors.
    pub fn hasher_config(&self) -> Result<HasherConfig, ConfigError> {
        let (fast, digest) = self.validate()?;
        Ok(HasherConfig::default()
            .with_fast_checksum(fast)
            .with_digest(digest)
            .with_tiers(
                self.tiny_file_limit,
                self.medium_prefix,
                self.large_file_threshold,
                self.large_prefix,
            )
            .with_mmap_threshold(self.mmap_threshold))
    }

    /// Finder settings; sink, statistics and shutdown flag are left at
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Returns the [`Config::validate`] errors.
    pub fn finder_config(&self) -> Result<FinderConfig, ConfigError> {
        Ok(FinderConfig::default()
            .with_io_threads(self.io_threads)
            .with_walker_config(self.walker_config())
            .with_hasher_config(self.hasher_config()?))
    }
}
