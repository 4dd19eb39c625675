use std::path::{Path, PathBuf};

pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::TransferConfig;
pub use core::{FileEntry, FileTransferTask, TaskContext, TransferMode, TransferReport, TransferSpec};
pub use error::TransferError;

/// 解析配置目录：命令行指定 > config.json 中的 data_path > 默认目录
pub fn config_dir(explicit: Option<&Path>) -> std::io::Result<PathBuf> {
    if let Some(dir) = explicit {
        std::fs::create_dir_all(dir)?;
        return Ok(dir.to_path_buf());
    }

    let default_config_dir = dirs::config_dir()
        .map(|p| p.join("filetransfer"))
        .unwrap_or_else(|| PathBuf::from(".filetransfer"));

    std::fs::create_dir_all(&default_config_dir)?;

    let config_dir = std::fs::read_to_string(default_config_dir.join("config.json"))
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .and_then(|config| config.get("data_path")?.as_str().map(PathBuf::from))
        .filter(|p| p.is_dir())
        .inspect(|p| tracing::debug!("使用自定义数据路径: {:?}", p))
        .unwrap_or(default_config_dir);

    Ok(config_dir)
}
