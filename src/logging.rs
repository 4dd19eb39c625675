//! 日志模块 - 文件日志（按大小轮转）与 subscriber 初始化

use crate::config::{load_section, save_section};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

const LOG_FILE: &str = "transfer.log";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否启用日志记录
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最大日志文件大小（MB，1-100）
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
        }
    }
}

impl LogConfig {
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "log").unwrap_or_default()
    }

    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        save_section(config_dir, "log", self)
    }

    pub fn max_size_bytes(&self) -> u64 {
        u64::from(self.max_size_mb.clamp(1, 100)) * 1024 * 1024
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

pub fn log_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("logs")
}

/// 带大小限制的日志写入器，超限时当前文件改名为 `.log.old`
#[derive(Clone)]
pub struct SizeRotatingWriter {
    file_path: PathBuf,
    max_size: u64,
    writer: Arc<Mutex<Option<BufWriter<File>>>>,
}

impl SizeRotatingWriter {
    pub fn new(log_dir: &Path, max_size: u64) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;
        let file_path = log_dir.join(LOG_FILE);

        if file_size(&file_path) > max_size {
            rotate(&file_path)?;
        }
        let writer = open_append(&file_path)?;

        Ok(Self {
            file_path,
            max_size,
            writer: Arc::new(Mutex::new(Some(writer))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn lock(&self) -> MutexGuard<'_, Option<BufWriter<File>>> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn rotate_if_needed(&self, guard: &mut Option<BufWriter<File>>) -> io::Result<()> {
        if file_size(&self.file_path) <= self.max_size {
            return Ok(());
        }
        if let Some(mut w) = guard.take() {
            w.flush()?;
        }
        rotate(&self.file_path)?;
        *guard = Some(open_append(&self.file_path)?);
        Ok(())
    }
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn open_append(path: &Path) -> io::Result<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

fn rotate(path: &Path) -> io::Result<()> {
    let backup = path.with_extension("log.old");
    if backup.exists() {
        fs::remove_file(&backup)?;
    }
    fs::rename(path, backup)
}

/// 单条日志写入句柄
pub struct LogWriter {
    inner: SizeRotatingWriter,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let written = match guard.as_mut() {
            Some(writer) => {
                let n = writer.write(buf)?;
                writer.flush()?;
                n
            }
            None => return Err(io::Error::other("log writer not available")),
        };
        // 轮转失败不影响本次写入
        let _ = self.inner.rotate_if_needed(&mut guard);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.lock().as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SizeRotatingWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter { inner: self.clone() }
    }
}

/// 初始化全局 subscriber；重复调用无效果
pub fn init(config_dir: &Path) {
    let config = LogConfig::load(config_dir);

    if !config.enabled {
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return;
    }

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(config.tracing_level().into())
        .from_env_lossy();

    let file_layer = match SizeRotatingWriter::new(&log_dir(config_dir), config.max_size_bytes()) {
        Ok(writer) => Some(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        ),
        Err(e) => {
            eprintln!("无法创建日志文件: {}", e);
            None
        }
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    // debug 构建同时输出到 stderr
    #[cfg(debug_assertions)]
    let subscriber = subscriber.with(
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false),
    );

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_roundtrip_and_clamp() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(LogConfig::load(tmp.path()), LogConfig::default());

        let config = LogConfig {
            max_size_mb: 500,
            level: "DEBUG".to_string(),
            ..LogConfig::default()
        };
        config.save(tmp.path()).unwrap();

        let loaded = LogConfig::load(tmp.path());
        assert_eq!(loaded.max_size_mb, 500);
        assert_eq!(loaded.max_size_bytes(), 100 * 1024 * 1024);
        assert_eq!(loaded.tracing_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_writer_rotates_when_over_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = SizeRotatingWriter::new(tmp.path(), 16).unwrap();

        let mut w = writer.make_writer();
        w.write_all(b"0123456789abcdefXYZ\n").unwrap();
        let mut w = writer.make_writer();
        w.write_all(b"next\n").unwrap();

        let old = fs::read_to_string(tmp.path().join("transfer.log.old")).unwrap();
        assert!(old.starts_with("0123456789"));
        assert_eq!(fs::read_to_string(writer.path()).unwrap(), "next\n");
    }
}
