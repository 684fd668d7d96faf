use std::env;
use std::time::Duration;

/// Upper bound on collaborator calls between a commit's age check and its row write.
const COMMIT_CALL_BUDGET: u32 = 5;

/// Runtime configuration for the publishing service.
///
/// Built once at startup and handed to every component by value; nothing reads
/// the environment after this point.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Maximum accepted document size in bytes (default: 50 MB)
    pub max_file_size: usize,

    /// Object-store bucket holding the reports (default: "reports")
    pub bucket: String,

    /// Key prefix under which every report blob lives (default: "uploads")
    pub upload_prefix: String,

    /// Lifetime of signed read URLs handed to viewers (default: 1 hour)
    pub signed_url_ttl: Duration,

    /// Lifetime of signed write URLs for direct uploads (default: 2 hours)
    pub signed_upload_ttl: Duration,

    /// Origin used to build the public `/r/{slug}` links encoded in QR codes
    pub public_base_url: String,

    /// Upper bound for every single blob or record call (default: 30 seconds)
    pub operation_timeout: Duration,

    /// How many fresh slugs to try before giving up on a publish (default: 5)
    pub slug_max_attempts: u32,

    /// Delete the superseded blob once a replace has been committed (default: true)
    pub delete_replaced_blobs: bool,

    /// Interval between orphan sweeps in worker mode (default: 1 hour)
    pub orphan_sweep_interval: Duration,

    /// Unreferenced blobs younger than this are left alone by the sweep (default: 1 hour)
    pub orphan_grace: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024, // 50 MB
            bucket: "reports".to_string(),
            upload_prefix: "uploads".to_string(),
            signed_url_ttl: Duration::from_secs(60 * 60),
            signed_upload_ttl: Duration::from_secs(2 * 60 * 60),
            public_base_url: "http://localhost:3000".to_string(),
            operation_timeout: Duration::from_secs(30),
            slug_max_attempts: 5,
            delete_replaced_blobs: true,
            orphan_sweep_interval: Duration::from_secs(60 * 60),
            orphan_grace: Duration::from_secs(60 * 60),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            bucket: env::var("MINIO_BUCKET").unwrap_or(default.bucket),

            upload_prefix: env::var("UPLOAD_PREFIX")
                .ok()
                .map(|v| v.trim_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default.upload_prefix),

            signed_url_ttl: secs_var("SIGNED_URL_TTL_SECS").unwrap_or(default.signed_url_ttl),

            signed_upload_ttl: secs_var("SIGNED_UPLOAD_TTL_SECS")
                .unwrap_or(default.signed_upload_ttl),

            public_base_url: env::var("PUBLIC_BASE_URL").unwrap_or(default.public_base_url),

            operation_timeout: secs_var("OPERATION_TIMEOUT_SECS")
                .unwrap_or(default.operation_timeout),

            slug_max_attempts: env::var("SLUG_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u32| *v > 0)
                .unwrap_or(default.slug_max_attempts),

            delete_replaced_blobs: env::var("DELETE_REPLACED_BLOBS")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.delete_replaced_blobs),

            orphan_sweep_interval: secs_var("ORPHAN_SWEEP_INTERVAL_SECS")
                .unwrap_or(default.orphan_sweep_interval),

            orphan_grace: secs_var("ORPHAN_GRACE_SECS").unwrap_or(default.orphan_grace),
        }
    }

    /// How old a directly uploaded blob may be when its record is committed.
    ///
    /// The sweep only reclaims unreferenced blobs older than `orphan_grace`. A
    /// commit checks the blob's age first and then spends at most a few bounded
    /// calls before its row lands, so keeping the accepted age below the grace
    /// by that margin means the sweep can never delete a blob a commit is about
    /// to reference.
    pub fn commit_window(&self) -> Duration {
        self.orphan_grace
            .saturating_sub(self.operation_timeout * COMMIT_CALL_BUDGET)
    }

    /// Create config for development (short-lived links, no cleanup of replaced blobs)
    pub fn development() -> Self {
        Self {
            signed_url_ttl: Duration::from_secs(5 * 60),
            operation_timeout: Duration::from_secs(10),
            delete_replaced_blobs: false,
            orphan_sweep_interval: Duration::from_secs(5 * 60),
            ..Self::default()
        }
    }
}

fn secs_var(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.max_file_size, 50 * 1024 * 1024);
        assert_eq!(config.upload_prefix, "uploads");
        assert_eq!(config.signed_url_ttl, Duration::from_secs(3600));
        assert_eq!(config.slug_max_attempts, 5);
        assert!(config.delete_replaced_blobs);
    }

    #[test]
    fn test_development_config() {
        let config = AppConfig::development();
        assert!(!config.delete_replaced_blobs);
        assert_eq!(config.signed_url_ttl, Duration::from_secs(300));
        assert_eq!(config.bucket, "reports");
    }

    #[test]
    fn test_commit_window_stays_inside_grace() {
        let config = AppConfig::default();
        assert_eq!(config.commit_window(), Duration::from_secs(3600 - 150));

        let tight = AppConfig {
            orphan_grace: Duration::from_secs(60),
            operation_timeout: Duration::from_secs(30),
            ..AppConfig::default()
        };
        assert_eq!(tight.commit_window(), Duration::ZERO);
    }
}
