use crate::core::Storage;
use crate::utils::error::Result;
use std::path::PathBuf;

/// Files under a base directory, created on first write.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

impl Storage for LocalStorage {
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.base_path.join(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(full_path, data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().join("nested"));

        storage.write_file("2025/report.html", b"<p>ok</p>").await.unwrap();

        let data = std::fs::read(temp_dir.path().join("nested/2025/report.html")).unwrap();
        assert_eq!(data, b"<p>ok</p>");
    }

    #[tokio::test]
    async fn test_write_under_a_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("taken"), b"").unwrap();
        let storage = LocalStorage::new(temp_dir.path().join("taken"));

        let err = storage.write_file("report.html", b"x").await.unwrap_err();
        assert!(matches!(err, crate::utils::error::EtlError::IoError(_)));
    }

    #[test]
    fn test_write_overwrites_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        tokio_test::block_on(async {
            tokio_test::assert_ok!(storage.write_file("report.html", b"old").await);
            tokio_test::assert_ok!(storage.write_file("report.html", b"new").await);
        });

        let data = std::fs::read(temp_dir.path().join("report.html")).unwrap();
        assert_eq!(data, b"new");
    }
}
