use super::{FileMeta, Storage};
use crate::config::TransferConfig;
use crate::error::TransferError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use opendal::{ErrorKind, Operator};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// SFTP 远程存储；连接在 Operator 释放时关闭
pub struct SftpStorage {
    operator: Operator,
    name: String,
    chunk_size: usize,
}

impl SftpStorage {
    pub async fn connect(
        server: &str,
        port: u16,
        user: &str,
        key: &Path,
        config: &TransferConfig,
    ) -> Result<Self> {
        use opendal::services::Sftp;

        let key = key
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid key path: {}", key.display()))?;

        let builder = Sftp::default()
            .endpoint(&format!("ssh://{}:{}", server, port))
            .user(user)
            .key(key)
            .known_hosts_strategy(&config.known_hosts_strategy)
            .root(&config.remote_root);

        let operator = Operator::new(builder)?.finish();
        let name = format!("sftp://{}@{}:{}{}", user, server, port, config.remote_root);

        // 首次访问时才真正建立连接，这里主动探测以便尽早报告认证失败
        operator
            .stat("/")
            .await
            .with_context(|| format!("SFTP 连接失败: {}", name))?;

        Ok(Self {
            operator,
            name,
            chunk_size: config.chunk_size_bytes(),
        })
    }

    fn dir_path(path: &str) -> String {
        format!("{}/", path.trim_end_matches('/'))
    }
}

#[async_trait]
impl Storage for SftpStorage {
    async fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        match self.operator.stat(path).await {
            Ok(meta) => Ok(Some(FileMeta {
                size: meta.content_length(),
                is_dir: meta.is_dir(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        match self.operator.stat(&Self::dir_path(path)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(self.stat(path).await?.is_some()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.operator.create_dir(&Self::dir_path(path)).await?;
        Ok(())
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<u64> {
        let mut file = tokio::fs::File::open(local)
            .await
            .with_context(|| format!("无法打开本地文件: {}", local.display()))?;

        let mut writer = match self.operator.writer(remote).await {
            Ok(w) => w,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TransferError::RemoteDirectoryMissing(remote.to_string()).into());
            }
            Err(e) => return Err(e.into()),
        };

        let mut total = 0u64;
        let mut buffer = vec![0u8; self.chunk_size];
        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            writer.write(bytes::Bytes::copy_from_slice(&buffer[..n])).await?;
            total += n as u64;
        }

        match writer.close().await {
            Ok(_) => Ok(total),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(TransferError::RemoteDirectoryMissing(remote.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
