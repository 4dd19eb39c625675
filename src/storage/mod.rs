pub mod local;
pub mod sftp;

use crate::config::TransferConfig;
use crate::core::paths::TaskContext;
use crate::core::spec::RemoteTarget;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use local::LocalStorage;
pub use sftp::SftpStorage;

/// 远程文件元数据
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub size: u64,
    pub is_dir: bool,
}

/// 远程存储接口（一次连接会话）
#[async_trait]
pub trait Storage: Send + Sync {
    /// 获取元数据，不存在时返回 None
    async fn stat(&self, path: &str) -> Result<Option<FileMeta>>;

    /// 检查路径是否存在
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.stat(path).await?.is_some())
    }

    /// 创建目录（含父目录）
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// 上传本地文件；父目录不存在时返回 `TransferError::RemoteDirectoryMissing`
    async fn put(&self, local: &Path, remote: &str) -> Result<u64>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 建立远程会话
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &RemoteTarget, ctx: &TaskContext) -> Result<Box<dyn Storage>>;
}

/// 基于 SFTP 的默认连接器
#[derive(Debug, Clone, Default)]
pub struct SftpConnector {
    pub config: TransferConfig,
}

impl SftpConnector {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    /// 密钥路径：任务参数（支持 `>>key<<` 引用）> 配置文件 > ~/.ssh/id_rsa
    pub fn key_path(&self, target: &RemoteTarget, ctx: &TaskContext) -> Result<PathBuf> {
        let raw = match (&target.key_file, &self.config.key_file) {
            (Some(key), _) => ctx.resolve_env(key)?,
            (None, Some(key)) => key.clone(),
            (None, None) => "~/.ssh/id_rsa".to_string(),
        };
        Ok(ctx.resolve_path(&raw, true))
    }
}

#[async_trait]
impl Connector for SftpConnector {
    async fn connect(&self, target: &RemoteTarget, ctx: &TaskContext) -> Result<Box<dyn Storage>> {
        let key = self.key_path(target, ctx)?;
        let port = target.port.unwrap_or(self.config.remote_port);
        tracing::info!(
            "连接远程主机: {}@{}:{} (key={})",
            target.user,
            target.server,
            port,
            key.display()
        );

        let storage = SftpStorage::connect(&target.server, port, &target.user, &key, &self.config).await?;
        Ok(Box::new(storage))
    }
}

/// 将任意本地目录当作远程端的连接器
#[derive(Debug, Clone)]
pub struct LocalConnector {
    pub root: PathBuf,
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, _target: &RemoteTarget, _ctx: &TaskContext) -> Result<Box<dyn Storage>> {
        Ok(Box::new(LocalStorage::new(&self.root)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(key: Option<&str>) -> RemoteTarget {
        RemoteTarget {
            server: "login01".into(),
            user: "calc".into(),
            key_file: key.map(str::to_string),
            port: None,
        }
    }

    #[test]
    fn test_key_path_from_env_reference() {
        let connector = SftpConnector::default();
        let ctx = TaskContext::new("/work").with_env("ssh_key", "/keys/id_calc");

        let key = connector
            .key_path(&target(Some(">>ssh_key<<")), &ctx)
            .unwrap();
        assert_eq!(key, PathBuf::from("/keys/id_calc"));
    }

    #[test]
    fn test_key_path_missing_env_fails() {
        let connector = SftpConnector::default();
        let ctx = TaskContext::new("/work");
        assert!(connector
            .key_path(&target(Some(">>ssh_key<<")), &ctx)
            .is_err());
    }

    #[test]
    fn test_key_path_config_fallback() {
        let connector = SftpConnector::new(TransferConfig {
            key_file: Some("/etc/keys/cluster".into()),
            ..TransferConfig::default()
        });
        let key = connector
            .key_path(&target(None), &TaskContext::new("/work"))
            .unwrap();
        assert_eq!(key, PathBuf::from("/etc/keys/cluster"));
    }
}
