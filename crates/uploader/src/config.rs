//! Resolved upload configuration.
//!
//! Loader precedence is file → environment overlay → command flags →
//! interactive prompts; the last two live in the CLI front end. The engine
//! only ever sees the resolved record.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::UploadError;

/// Default region when neither file, env nor flags set one.
pub const DEFAULT_REGION: &str = "ap-northeast-2";

/// Smallest part size the protocol accepts (except for the final part).
pub const MIN_PART_SIZE_MB: u64 = 5;

const MIB: u64 = 1024 * 1024;

/// Resolved settings for one upload session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(rename = "partSizeMB", default = "default_part_size_mb")]
    pub part_size_mb: u64,
    #[serde(rename = "maxConcurrency", default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Upload id for resume-by-id flows.
    #[serde(rename = "uploadId", default)]
    pub upload_id: Option<String>,
    /// Gzip the file to a temp path before uploading.
    #[serde(default)]
    pub compress: bool,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_part_size_mb() -> u64 {
    8
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            key: String::new(),
            region: default_region(),
            part_size_mb: default_part_size_mb(),
            max_concurrency: default_max_concurrency(),
            upload_id: None,
            compress: false,
        }
    }
}

impl Config {
    /// Loads a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, UploadError> {
        let content = std::fs::read_to_string(path).map_err(|source| UploadError::FileIo {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content)
            .map_err(|e| UploadError::ConfigInvalid(format!("{}: {e}", path.display())))
    }

    /// Applies the recognized environment variables on top of the record.
    pub fn apply_env_overlay(&mut self) {
        self.apply_env_from(|k| std::env::var(k).ok());
    }

    /// Env overlay with an injectable lookup (tests).
    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("S3_BUCKET_NAME") {
            if !v.trim().is_empty() {
                self.bucket = v.trim().to_string();
            }
        }
        if let Some(v) = lookup("AWS_REGION") {
            if !v.trim().is_empty() {
                self.region = v.trim().to_string();
            }
        }
        if let Some(v) = lookup("CHUNK_SIZE") {
            if let Ok(bytes) = v.trim().parse::<u64>() {
                // Bytes, rounded up to a whole MiB, floored at the minimum.
                let mb = bytes.div_ceil(MIB).max(MIN_PART_SIZE_MB);
                self.part_size_mb = mb;
            }
        }
    }

    /// Part size in bytes.
    pub fn part_size_bytes(&self) -> u64 {
        self.part_size_mb * MIB
    }

    /// Rejects records the engine cannot run with.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.bucket.trim().is_empty() {
            return Err(UploadError::ConfigInvalid("bucket is required".into()));
        }
        if self.part_size_mb < MIN_PART_SIZE_MB {
            return Err(UploadError::ConfigInvalid(format!(
                "part size must be at least {MIN_PART_SIZE_MB} MiB"
            )));
        }
        if self.max_concurrency < 1 {
            return Err(UploadError::ConfigInvalid(
                "max concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.region, DEFAULT_REGION);
        assert_eq!(c.part_size_mb, 8);
        assert_eq!(c.max_concurrency, 4);
        assert!(!c.compress);
    }

    #[test]
    fn from_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("favus.toml");
        std::fs::write(
            &path,
            r#"
bucket = "my-bucket"
key = "uploads/file.bin"
region = "us-east-1"
partSizeMB = 16
maxConcurrency = 8
"#,
        )
        .unwrap();
        let c = Config::from_file(&path).unwrap();
        assert_eq!(c.bucket, "my-bucket");
        assert_eq!(c.key, "uploads/file.bin");
        assert_eq!(c.region, "us-east-1");
        assert_eq!(c.part_size_mb, 16);
        assert_eq!(c.max_concurrency, 8);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("favus.toml");
        std::fs::write(&path, "bucket = \"b\"\n").unwrap();
        let c = Config::from_file(&path).unwrap();
        assert_eq!(c.bucket, "b");
        assert_eq!(c.part_size_mb, 8);
    }

    #[test]
    fn bad_toml_is_config_invalid() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("favus.toml");
        std::fs::write(&path, "bucket = [not toml").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(UploadError::ConfigInvalid(_))
        ));
    }

    fn env_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn env_overlay_overrides_bucket_and_region() {
        let env = env_map(&[("S3_BUCKET_NAME", "env-bucket"), ("AWS_REGION", "eu-west-1")]);
        let mut c = Config {
            bucket: "file-bucket".into(),
            ..Config::default()
        };
        c.apply_env_from(|k| env.get(k).cloned());
        assert_eq!(c.bucket, "env-bucket");
        assert_eq!(c.region, "eu-west-1");
    }

    #[test]
    fn chunk_size_rounds_up_and_floors() {
        // 6 MiB + 1 byte rounds up to 7 MiB.
        let env = env_map(&[("CHUNK_SIZE", "6291457")]);
        let mut c = Config::default();
        c.apply_env_from(|k| env.get(k).cloned());
        assert_eq!(c.part_size_mb, 7);

        // 1 byte floors at the 5 MiB minimum.
        let env = env_map(&[("CHUNK_SIZE", "1")]);
        let mut c = Config::default();
        c.apply_env_from(|k| env.get(k).cloned());
        assert_eq!(c.part_size_mb, 5);
    }

    #[test]
    fn bad_chunk_size_is_ignored() {
        let env = env_map(&[("CHUNK_SIZE", "not-a-number")]);
        let mut c = Config::default();
        c.apply_env_from(|k| env.get(k).cloned());
        assert_eq!(c.part_size_mb, 8);
    }

    #[test]
    fn validate_rejects_missing_bucket() {
        let c = Config::default();
        assert!(matches!(
            c.validate(),
            Err(UploadError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn validate_rejects_small_parts_and_zero_concurrency() {
        let c = Config {
            bucket: "b".into(),
            part_size_mb: 4,
            ..Config::default()
        };
        assert!(c.validate().is_err());

        let c = Config {
            bucket: "b".into(),
            max_concurrency: 0,
            ..Config::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn part_size_bytes_conversion() {
        let c = Config {
            part_size_mb: 5,
            ..Config::default()
        };
        assert_eq!(c.part_size_bytes(), 5 * 1024 * 1024);
    }
}
