use crate::config::{load_task_env, TransferConfig};
use crate::core::{FileTransferTask, TaskContext, TransferReport, TransferSpec};
use crate::storage::{Connector, SftpConnector};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// `run` 子命令参数
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub task_file: PathBuf,
    /// 工作目录，默认为进程当前目录
    pub cwd: Option<PathBuf>,
    /// 命令行 `--env`，覆盖配置文件中的同名键
    pub env: Vec<(String, String)>,
}

/// 解析 `KEY=VALUE`
pub fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{}`", raw)),
    }
}

pub fn build_context(config_dir: &Path, options: &RunOptions) -> Result<TaskContext> {
    let mut ctx = match &options.cwd {
        Some(dir) => TaskContext::new(
            dir.canonicalize()
                .with_context(|| format!("工作目录不存在: {}", dir.display()))?,
        ),
        None => TaskContext::current().context("无法获取当前目录")?,
    };

    ctx.env = load_task_env(config_dir);
    for (key, value) in &options.env {
        ctx.env.insert(key.clone(), value.clone());
    }
    Ok(ctx)
}

/// 读取任务文件并通过 SFTP 连接器执行
pub async fn run_task(config_dir: &Path, options: &RunOptions) -> Result<TransferReport> {
    let connector = SftpConnector::new(TransferConfig::load(config_dir));
    run_task_with(config_dir, options, &connector).await
}

pub async fn run_task_with(
    config_dir: &Path,
    options: &RunOptions,
    connector: &dyn Connector,
) -> Result<TransferReport> {
    let spec = TransferSpec::from_file(&options.task_file)?;
    let task = FileTransferTask::from_spec(&spec)?;
    let ctx = build_context(config_dir, options)?;

    tracing::info!(
        "任务文件: {} (工作目录 {})",
        options.task_file.display(),
        ctx.working_dir.display()
    );

    Ok(task.run(&ctx, connector).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransferError;
    use crate::storage::LocalConnector;
    use std::fs;

    #[test]
    fn test_parse_env_pair() {
        assert_eq!(
            parse_env_pair("scratch=/tmp/a=b").unwrap(),
            ("scratch".to_string(), "/tmp/a=b".to_string())
        );
        assert!(parse_env_pair("novalue").is_err());
        assert!(parse_env_pair("=x").is_err());
    }

    #[test]
    fn test_cli_env_overrides_config() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("config.json"),
            r#"{"env": {"scratch": "/a", "keys": "/k"}}"#,
        )
        .unwrap();
        let options = RunOptions {
            cwd: Some(tmp.path().to_path_buf()),
            env: vec![("scratch".into(), "/b".into())],
            ..RunOptions::default()
        };

        let ctx = build_context(tmp.path(), &options).unwrap();

        assert_eq!(ctx.resolve_env(">>scratch<<").unwrap(), "/b");
        assert_eq!(ctx.resolve_env(">>keys<<").unwrap(), "/k");
    }

    #[tokio::test]
    async fn test_run_yaml_task_file() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("work");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("OUTCAR"), "done").unwrap();
        let task_file = tmp.path().join("task.yaml");
        fs::write(
            &task_file,
            format!(
                "mode: cp\nfiles:\n  - OUTCAR\ndest: {}\n",
                tmp.path().join("OUTCAR.copy").display()
            ),
        )
        .unwrap();
        let options = RunOptions {
            task_file,
            cwd: Some(work),
            env: Vec::new(),
        };
        let connector = LocalConnector {
            root: tmp.path().join("remote"),
        };

        let report = run_task_with(tmp.path(), &options, &connector)
            .await
            .unwrap();

        assert_eq!(report.entries_completed, 1);
        assert_eq!(
            fs::read_to_string(tmp.path().join("OUTCAR.copy")).unwrap(),
            "done"
        );
    }

    #[tokio::test]
    async fn test_run_invalid_mode_reports_typed_error() {
        let tmp = tempfile::tempdir().unwrap();
        let task_file = tmp.path().join("task.json");
        fs::write(&task_file, r#"{"mode": "link", "files": ["a"], "dest": "/x"}"#).unwrap();
        let options = RunOptions {
            task_file,
            cwd: Some(tmp.path().to_path_buf()),
            env: Vec::new(),
        };

        let err = run_task(tmp.path(), &options).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TransferError>(),
            Some(TransferError::InvalidMode(_))
        ));
    }
}
