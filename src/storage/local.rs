use super::{FileMeta, Storage};
use crate::error::TransferError;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 以本地目录为根的“远程”存储，路径语义与 SFTP 一致（不自动创建父目录）
pub struct LocalStorage {
    base_path: PathBuf,
    name: String,
}

impl LocalStorage {
    pub fn new(path: &Path) -> Result<Self> {
        if !path.exists() {
            std::fs::create_dir_all(path)?;
        }
        let name = format!("local:{}", path.display());
        Ok(Self {
            base_path: path.to_path_buf(),
            name,
        })
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        match fs::metadata(self.resolve_path(path)).await {
            Ok(metadata) => Ok(Some(FileMeta {
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                is_dir: metadata.is_dir(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.resolve_path(path)).await?;
        Ok(())
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<u64> {
        let full_path = self.resolve_path(remote);

        let parent_missing = full_path
            .parent()
            .map(|p| !p.is_dir())
            .unwrap_or(false);
        if parent_missing {
            return Err(TransferError::RemoteDirectoryMissing(remote.to_string()).into());
        }

        let bytes = fs::copy(local, &full_path).await?;
        Ok(bytes)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
