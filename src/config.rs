//! 应用配置模块

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// 传输配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    /// 远程 SSH 端口
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,
    /// known_hosts 校验策略: "strict", "accept", "add"
    #[serde(default = "default_known_hosts_strategy")]
    pub known_hosts_strategy: String,
    /// 默认密钥路径（任务未指定时使用）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
    /// 远程根目录，相对远程路径以此为基准
    #[serde(default = "default_remote_root")]
    pub remote_root: String,
    /// 上传分块大小（MB）
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,
}

fn default_remote_port() -> u16 {
    12346
}

fn default_known_hosts_strategy() -> String {
    "strict".to_string()
}

fn default_remote_root() -> String {
    "/".to_string()
}

fn default_chunk_size_mb() -> u64 {
    4
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            remote_port: default_remote_port(),
            known_hosts_strategy: default_known_hosts_strategy(),
            key_file: None,
            remote_root: default_remote_root(),
            chunk_size_mb: default_chunk_size_mb(),
        }
    }
}

impl TransferConfig {
    /// 从配置文件加载传输配置
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "transfer").unwrap_or_default()
    }

    /// 保存传输配置
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        save_section(config_dir, "transfer", self)
    }

    pub fn chunk_size_bytes(&self) -> usize {
        (self.chunk_size_mb.clamp(1, 256) * 1024 * 1024) as usize
    }
}

/// 任务环境（`>>key<<` 引用的取值）
pub fn load_task_env(config_dir: &Path) -> BTreeMap<String, String> {
    load_section(config_dir, "env").unwrap_or_default()
}

/// 读取 config.json 中的某个小节，缺失或格式错误时返回 None
pub(crate) fn load_section<T: DeserializeOwned>(config_dir: &Path, key: &str) -> Option<T> {
    let content = fs::read_to_string(config_dir.join("config.json")).ok()?;
    let config = serde_json::from_str::<serde_json::Value>(&content).ok()?;
    let section = config.get(key)?;
    match serde_json::from_value::<T>(section.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("配置小节 {} 无效，使用默认值: {}", key, e);
            None
        }
    }
}

/// 写入 config.json 中的某个小节，保留其他小节
pub(crate) fn save_section<T: Serialize>(config_dir: &Path, key: &str, value: &T) -> io::Result<()> {
    fs::create_dir_all(config_dir)?;
    let config_file = config_dir.join("config.json");

    // 读取现有配置
    let mut config: serde_json::Value = if config_file.exists() {
        let content = fs::read_to_string(&config_file)?;
        serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
    } else {
        serde_json::json!({})
    };

    config[key] = serde_json::to_value(value).map_err(io::Error::other)?;

    let content = serde_json::to_string_pretty(&config).map_err(io::Error::other)?;
    fs::write(&config_file, content)
}
