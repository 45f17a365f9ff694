use cadence_core::pipeline::WorkerConfig;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub worker: WorkerSettings,
}

/// Worker tuning as read from the config file or environment.
#[derive(Deserialize, Debug)]
pub struct WorkerSettings {
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_max_organizations")]
    pub max_organizations: i64,
    #[serde(default = "default_enable_post_processing")]
    pub enable_post_processing: bool,
    #[serde(default)]
    pub require_full_success: bool,
}

fn default_database_path() -> String {
    "cadence.db".to_string()
}

fn default_max_concurrent_jobs() -> usize {
    5
}

fn default_max_organizations() -> i64 {
    50
}

fn default_enable_post_processing() -> bool {
    true
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_organizations: default_max_organizations(),
            enable_post_processing: default_enable_post_processing(),
            require_full_success: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            worker: WorkerSettings::default(),
        }
    }
}

impl Config {
    pub fn new() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("cadence.toml"))
            .merge(Env::prefixed("CADENCE_"))
            .extract()
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            max_concurrent_jobs: self.worker.max_concurrent_jobs,
            max_organizations: self.worker.max_organizations,
            enable_post_processing: self.worker.enable_post_processing,
            require_full_success: self.worker.require_full_success,
        }
    }
}
