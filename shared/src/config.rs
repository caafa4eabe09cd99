//! Configuration helpers shared across the pipeline crate and the HTTP server.
//!
//! The configuration layer centralises access to environment variables so
//! that the queue, validator, and tool adapter agree on a single set of
//! defaults when running locally or in production.

use std::time::Duration;

use serde::Deserialize;

fn default_uploads_dir() -> String {
    "/tmp/pdf-uploads".into()
}

fn default_downloads_dir() -> String {
    "/tmp/pdf-downloads".into()
}

fn default_concurrency() -> usize {
    2
}

fn default_max_per_user() -> usize {
    1
}

fn default_job_timeout_ms() -> u64 {
    5 * 60 * 1000
}

fn default_job_ttl_ms() -> u64 {
    60 * 60 * 1000
}

fn default_output_ttl_ms() -> u64 {
    60 * 60 * 1000
}

fn default_upload_max_file_size() -> u64 {
    1024 * 1024 * 1024 // 1 GiB, PDF default
}

fn default_upload_max_file_size_office() -> u64 {
    500 * 1024 * 1024 // 500 MiB, office default
}

fn default_upload_max_files() -> usize {
    50
}

fn default_rate_limit_window_ms() -> u64 {
    1000
}

fn default_rate_limit_max() -> u32 {
    100
}

fn default_shutdown_grace_ms() -> u64 {
    10 * 1000
}

fn default_pdf_provider() -> String {
    "local".into()
}

/// Top-level configuration object constructed from the process environment.
/// Every field has a spec-mandated default so the service starts with no
/// configuration at all.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: String,

    #[serde(default = "default_concurrency")]
    pub queue_concurrency: usize,
    #[serde(default = "default_max_per_user")]
    pub queue_max_per_user: usize,
    /// Defaults to `queue_concurrency` when absent; set explicitly by callers
    /// who want more workers than running-job permits (e.g. to keep pickup
    /// latency low under a low concurrency cap).
    pub worker_count: Option<usize>,

    #[serde(default = "default_job_timeout_ms")]
    pub job_timeout_ms: u64,
    #[serde(default = "default_job_ttl_ms")]
    pub job_ttl_ms: u64,
    #[serde(default = "default_output_ttl_ms")]
    pub output_ttl_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    #[serde(default = "default_upload_max_file_size")]
    pub upload_max_file_size: u64,
    #[serde(default = "default_upload_max_file_size_office")]
    pub upload_max_file_size_office: u64,
    #[serde(default = "default_upload_max_files")]
    pub upload_max_files: usize,

    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: u32,

    #[serde(default)]
    pub chromium_path: Option<String>,
    #[serde(default = "default_pdf_provider")]
    pub pdf_provider: String,
    #[serde(default)]
    pub pdf_api_key: String,
}

impl Settings {
    /// Loads settings from the process environment, falling back to defaults
    /// where individual values are not provided.
    pub fn new() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default())
            .build()?
            .try_deserialize()
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_millis(self.job_ttl_ms)
    }

    pub fn output_ttl(&self) -> Duration {
        Duration::from_millis(self.output_ttl_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count.unwrap_or(self.queue_concurrency).max(1)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            uploads_dir: default_uploads_dir(),
            downloads_dir: default_downloads_dir(),
            queue_concurrency: default_concurrency(),
            queue_max_per_user: default_max_per_user(),
            worker_count: None,
            job_timeout_ms: default_job_timeout_ms(),
            job_ttl_ms: default_job_ttl_ms(),
            output_ttl_ms: default_output_ttl_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            upload_max_file_size: default_upload_max_file_size(),
            upload_max_file_size_office: default_upload_max_file_size_office(),
            upload_max_files: default_upload_max_files(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            rate_limit_max: default_rate_limit_max(),
            chromium_path: None,
            pdf_provider: default_pdf_provider(),
            pdf_api_key: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let s = Settings::default();
        assert_eq!(s.queue_concurrency, 2);
        assert_eq!(s.queue_max_per_user, 1);
        assert_eq!(s.job_timeout(), Duration::from_secs(300));
        assert_eq!(s.job_ttl(), Duration::from_secs(3600));
        assert_eq!(s.output_ttl(), Duration::from_secs(3600));
        assert_eq!(s.upload_max_files, 50);
    }

    #[test]
    fn worker_count_defaults_to_concurrency() {
        let s = Settings::default();
        assert_eq!(s.worker_count(), s.queue_concurrency);
    }
}
