//! 传输任务描述 - 可序列化的任务参数与类型化条目

use crate::error::TransferError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// 传输模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferMode {
    Move,
    Copy,
    /// 复制内容并保留权限与时间戳
    CopyPreservingMetadata,
    CopyTree,
    /// 仅复制字节，目标必须是文件路径
    CopyRawBytes,
    RemotePut,
}

impl TransferMode {
    pub fn is_remote(self) -> bool {
        matches!(self, TransferMode::RemotePut)
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMode::Move => write!(f, "move"),
            TransferMode::Copy => write!(f, "copy"),
            TransferMode::CopyPreservingMetadata => write!(f, "copy2"),
            TransferMode::CopyTree => write!(f, "copytree"),
            TransferMode::CopyRawBytes => write!(f, "copyfile"),
            TransferMode::RemotePut => write!(f, "rtransfer"),
        }
    }
}

impl FromStr for TransferMode {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "move" | "mv" => Ok(TransferMode::Move),
            "copy" | "cp" => Ok(TransferMode::Copy),
            "copy2" | "copy-preserving-metadata" => Ok(TransferMode::CopyPreservingMetadata),
            "copytree" | "copy-tree" => Ok(TransferMode::CopyTree),
            "copyfile" | "copy-raw-bytes" => Ok(TransferMode::CopyRawBytes),
            "rtransfer" | "remote-put" => Ok(TransferMode::RemotePut),
            _ => Err(TransferError::InvalidMode(s.to_string())),
        }
    }
}

/// 序列化形式的条目（字符串或 src/dest 映射）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawEntry {
    Path(String),
    Mapped {
        src: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dest: Option<String>,
    },
}

/// 传输条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawEntry", into = "RawEntry")]
pub enum FileEntry {
    /// 当前工作目录下的全部文件
    All,
    Path(String),
    Mapped { src: String, dest: Option<String> },
}

impl From<RawEntry> for FileEntry {
    fn from(raw: RawEntry) -> Self {
        match raw {
            RawEntry::Path(p) if p == "all" => FileEntry::All,
            RawEntry::Path(p) => FileEntry::Path(p),
            RawEntry::Mapped { src, dest } => FileEntry::Mapped { src, dest },
        }
    }
}

impl From<FileEntry> for RawEntry {
    fn from(entry: FileEntry) -> Self {
        match entry {
            FileEntry::All => RawEntry::Path("all".to_string()),
            FileEntry::Path(p) => RawEntry::Path(p),
            FileEntry::Mapped { src, dest } => RawEntry::Mapped { src, dest },
        }
    }
}

impl FileEntry {
    /// 条目自身携带的目标路径
    pub fn own_dest(&self) -> Option<&str> {
        match self {
            FileEntry::Mapped { dest, .. } => dest.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileEntry::All => write!(f, "all"),
            FileEntry::Path(p) => write!(f, "{}", p),
            FileEntry::Mapped { src, dest: Some(d) } => write!(f, "{} -> {}", src, d),
            FileEntry::Mapped { src, dest: None } => write!(f, "{}", src),
        }
    }
}

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 首次失败之后允许的额外尝试次数（整个任务共享）
    pub max_retry: u32,
    pub delay: Duration,
}

/// 远程目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub server: String,
    pub user: String,
    /// 未解析的密钥路径（可能是 `>>key<<` 引用）
    pub key_file: Option<String>,
    pub port: Option<u16>,
}

/// 任务参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferSpec {
    pub mode: String,
    pub files: Vec<FileEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(default = "default_shell_interpret", alias = "shellInterpret")]
    pub shell_interpret: bool,
    #[serde(default, alias = "ignoreErrors")]
    pub ignore_errors: bool,
    #[serde(default, alias = "maxRetry")]
    pub max_retry: u32,
    #[serde(default = "default_retry_delay", alias = "retryDelaySeconds")]
    pub retry_delay: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, alias = "keyFilePath", skip_serializing_if = "Option::is_none")]
    pub key_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

fn default_shell_interpret() -> bool {
    true
}

fn default_retry_delay() -> u64 {
    10
}

impl TransferSpec {
    /// 最小参数构造，其余字段取默认值
    pub fn new(mode: &str, files: Vec<FileEntry>, dest: Option<&str>) -> Self {
        Self {
            mode: mode.to_string(),
            files,
            dest: dest.map(str::to_string),
            shell_interpret: default_shell_interpret(),
            ignore_errors: false,
            max_retry: 0,
            retry_delay: default_retry_delay(),
            server: None,
            user: None,
            key_filename: None,
            port: None,
        }
    }

    /// 从 JSON 或 YAML 文件加载（按扩展名判断）
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read task file {}", path.display()))?;

        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);

        let spec = if is_yaml {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML task file {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON task file {}", path.display()))?
        };

        Ok(spec)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retry: self.max_retry,
            delay: Duration::from_secs(self.retry_delay),
        }
    }

    /// 远程模式所需的连接参数
    pub fn remote_target(&self) -> Result<RemoteTarget, TransferError> {
        let server = self
            .server
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or(TransferError::MissingRemoteField("server"))?;
        let user = self
            .user
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or(TransferError::MissingRemoteField("user"))?;

        Ok(RemoteTarget {
            server,
            user,
            key_file: self.key_filename.clone(),
            port: self.port,
        })
    }

    /// 用于错误信息的文件列表文本
    pub fn files_display(&self) -> String {
        let items: Vec<String> = self.files.iter().map(|f| f.to_string()).collect();
        format!("[{}]", items.join(", "))
    }
}
