// SPDX-License-Identifier: MIT

//! Immutable process configuration, loaded once at startup.
//!
//! Mirrors the "global mutable configuration -> single immutable
//! configuration record" redesign guidance: every component receives an
//! `Arc<Config>` (or a cheap clone) at construction time and never mutates
//! it at runtime.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Process-wide configuration (spec section "External Interfaces: Config keys").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Global worker pool size.
    pub max_workers: u32,
    /// Maximum number of tenants with a concurrently RUNNING job.
    pub max_active_users: u32,
    /// Tile edge length in pixels.
    pub tile_size: u32,
    /// Overlap margin added to interior tiles on all sides, in pixels.
    pub tile_overlap: u32,
    /// Maximum number of jobs a single workflow may contain.
    pub max_jobs_per_workflow: u32,
    /// Whether SEGMENT_CELLS uses the real model vs. the deterministic fallback.
    pub enable_instantseg: bool,
    /// Directory uploaded input files are read from.
    pub uploads_dir: PathBuf,
    /// Directory job artifacts are written under (one subdirectory per job id).
    pub results_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_workers: 2,
            max_active_users: 3,
            tile_size: 1024,
            tile_overlap: 64,
            max_jobs_per_workflow: 10,
            enable_instantseg: false,
            uploads_dir: PathBuf::from("uploads"),
            results_dir: PathBuf::from("uploads/results"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// [`Config::default`] for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let cfg = Self {
            max_workers: env_u32("MAX_WORKERS", defaults.max_workers)?,
            max_active_users: env_u32("MAX_ACTIVE_USERS", defaults.max_active_users)?,
            tile_size: env_u32("TILE_SIZE", defaults.tile_size)?,
            tile_overlap: env_u32("TILE_OVERLAP", defaults.tile_overlap)?,
            max_jobs_per_workflow: env_u32("MAX_JOBS_PER_WORKFLOW", defaults.max_jobs_per_workflow)?,
            enable_instantseg: env_bool("ENABLE_INSTANTSEG", defaults.enable_instantseg)?,
            uploads_dir: env_path("UPLOADS_DIR", &defaults.uploads_dir),
            results_dir: env_path("RESULTS_DIR", &defaults.results_dir),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers < 1 {
            return Err(ConfigError::Invalid { key: "MAX_WORKERS", reason: "must be >= 1".into() });
        }
        if self.max_active_users < 1 {
            return Err(ConfigError::Invalid {
                key: "MAX_ACTIVE_USERS",
                reason: "must be >= 1".into(),
            });
        }
        if self.tile_size < 1 {
            return Err(ConfigError::Invalid { key: "TILE_SIZE", reason: "must be >= 1".into() });
        }
        if self.max_jobs_per_workflow < 1 {
            return Err(ConfigError::Invalid {
                key: "MAX_JOBS_PER_WORKFLOW",
                reason: "must be >= 1".into(),
            });
        }
        Ok(())
    }
}

fn env_u32(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::Invalid {
            key,
            reason: format!("{:?} is not a valid non-negative integer", v),
        }),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Ok(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, reason: format!("{:?} is not a valid bool", v) }),
        },
        Err(_) => Ok(default),
    }
}

fn env_path(key: &'static str, default: &PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| default.clone())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
