//! Trait abstraction for loading source images to enable testing

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;

/// Loads the raw bytes of the configured source image
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch the image at `location` (a file path or an http(s) URL)
    async fn fetch(&self, location: &str) -> Result<Vec<u8>>;
}

/// Whether `location` names a remote image
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Reads local files relative to the data directory and downloads URLs
#[derive(Debug, Clone)]
pub struct FileOrHttpSource {
    client: reqwest::Client,
    base_dir: PathBuf,
}

impl FileOrHttpSource {
    /// # Arguments
    ///
    /// * `base_dir` - Directory relative file paths resolve against
    /// * `timeout` - Upper bound for one HTTP download
    pub fn new<P: Into<PathBuf>>(base_dir: P, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_dir: base_dir.into(),
        })
    }
}

#[async_trait]
impl ImageSource for FileOrHttpSource {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        if is_remote(location) {
            debug!("Downloading source image from {}", location);
            let response = self.client.get(location).send().await?.error_for_status()?;
            return Ok(response.bytes().await?.to_vec());
        }

        let path = self.base_dir.join(location);
        debug!("Reading source image from {}", path.display());
        Ok(tokio::fs::read(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use tempfile::tempdir;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("http://example.org/a.bmp"));
        assert!(is_remote("https://example.org/a.bmp"));
        assert!(!is_remote("images/screen.bmp"));
        assert!(!is_remote("/srv/images/http.bmp"));
    }

    #[tokio::test]
    async fn test_reads_relative_file() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("images/screen.bmp"), b"BMdata").unwrap();

        let source = FileOrHttpSource::new(dir.path(), Duration::from_secs(1)).unwrap();
        assert_eq!(source.fetch("images/screen.bmp").await.unwrap(), b"BMdata");
    }

    #[tokio::test]
    async fn test_reads_absolute_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abs.bmp");
        std::fs::write(&path, b"abs").unwrap();

        let source = FileOrHttpSource::new("/nonexistent", Duration::from_secs(1)).unwrap();
        assert_eq!(source.fetch(path.to_str().unwrap()).await.unwrap(), b"abs");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempdir().unwrap();
        let source = FileOrHttpSource::new(dir.path(), Duration::from_secs(1)).unwrap();
        assert!(matches!(source.fetch("missing.bmp").await, Err(ServerError::Io(_))));
    }
}
