use super::local;
use super::paths::TaskContext;
use super::remote;
use super::spec::{FileEntry, RemoteTarget, RetryPolicy, TransferMode, TransferSpec};
use crate::error::TransferError;
use crate::storage::{Connector, Storage};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// 传输报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReport {
    pub task_id: String,
    pub mode: TransferMode,
    pub start_time: i64,
    pub end_time: i64,
    pub entries_total: u32,
    pub entries_completed: u32,
    /// 因 ignore_errors 被跳过的条目数
    pub entries_failed: u32,
    pub files_transferred: u32,
    pub retries_used: u32,
    pub errors: Vec<String>,
}

/// 文件传输任务（参数已校验）
#[derive(Debug, Clone)]
pub struct FileTransferTask {
    mode: TransferMode,
    entries: Vec<FileEntry>,
    dest: Option<String>,
    shell_interpret: bool,
    ignore_errors: bool,
    retry: RetryPolicy,
    remote: Option<RemoteTarget>,
    files_display: String,
}

impl FileTransferTask {
    /// 校验任务参数；模式无效时立即失败，不触碰文件系统
    pub fn from_spec(spec: &TransferSpec) -> Result<Self, TransferError> {
        let mode: TransferMode = spec.mode.parse()?;

        if spec.files.is_empty() {
            return Err(TransferError::InvalidSpec("files must not be empty".to_string()));
        }

        if spec.dest.is_none() {
            if let Some(entry) = spec.files.iter().find(|f| f.own_dest().is_none()) {
                return Err(TransferError::MissingDest(entry.to_string()));
            }
        }

        let remote = if mode.is_remote() {
            Some(spec.remote_target()?)
        } else {
            None
        };

        Ok(Self {
            mode,
            entries: spec.files.clone(),
            dest: spec.dest.clone(),
            shell_interpret: spec.shell_interpret,
            ignore_errors: spec.ignore_errors,
            retry: spec.retry_policy(),
            remote,
            files_display: spec.files_display(),
        })
    }

    /// 依次处理所有条目
    ///
    /// 失败的条目在剩余重试额度内单独重试（额度由整个任务共享），
    /// 远程模式下每次重试前关闭旧连接再重新建立。
    pub async fn run(
        &self,
        ctx: &TaskContext,
        connector: &dyn Connector,
    ) -> Result<TransferReport, TransferError> {
        let mut report = TransferReport {
            task_id: uuid::Uuid::new_v4().to_string(),
            mode: self.mode,
            start_time: chrono::Utc::now().timestamp(),
            end_time: 0,
            entries_total: self.entries.len() as u32,
            entries_completed: 0,
            entries_failed: 0,
            files_transferred: 0,
            retries_used: 0,
            errors: Vec::new(),
        };

        info!(
            "开始传输任务: {} ({}), {} 个条目 -> {}",
            self.mode,
            report.task_id,
            self.entries.len(),
            self.dest_display()
        );

        let mut retries_left = self.retry.max_retry;
        let mut session: Option<Box<dyn Storage>> = None;

        for entry in &self.entries {
            loop {
                match self.run_entry(entry, ctx, connector, &mut session).await {
                    Ok(files) => {
                        debug!("条目完成: {} ({} 个文件)", entry, files);
                        report.entries_completed += 1;
                        report.files_transferred += files as u32;
                        break;
                    }
                    Err(e) => {
                        let failure = TransferError::TransferFailure {
                            mode: self.mode.to_string(),
                            entry: entry.to_string(),
                            source: e,
                        };
                        warn!("传输失败: {}", failure);

                        if let Some(storage) = session.take() {
                            debug!("关闭远程连接: {}", storage.name());
                        }

                        if retries_left > 0 {
                            retries_left -= 1;
                            report.retries_used += 1;
                            warn!(
                                "{}s 后重试 ({}/{}): {}",
                                self.retry.delay.as_secs(),
                                report.retries_used,
                                self.retry.max_retry,
                                entry
                            );
                            tokio::time::sleep(self.retry.delay).await;
                            continue;
                        }

                        if !self.ignore_errors {
                            error!(
                                "传输任务失败 (已重试{}次): {}",
                                report.retries_used, failure
                            );
                            return Err(TransferError::ExhaustedRetries {
                                mode: self.mode.to_string(),
                                files: self.files_display.clone(),
                                dest: self.dest_display(),
                                source: Box::new(failure),
                            });
                        }

                        warn!("忽略错误，继续下一个条目: {}", entry);
                        report.entries_failed += 1;
                        report.errors.push(failure.to_string());
                        break;
                    }
                }
            }
        }

        if let Some(storage) = session.take() {
            debug!("关闭远程连接: {}", storage.name());
        }

        report.end_time = chrono::Utc::now().timestamp();
        info!(
            "传输任务完成: {} ({}), 成功 {} / 跳过 {}, 文件 {}, 重试 {}",
            self.mode,
            report.task_id,
            report.entries_completed,
            report.entries_failed,
            report.files_transferred,
            report.retries_used
        );

        Ok(report)
    }

    async fn run_entry(
        &self,
        entry: &FileEntry,
        ctx: &TaskContext,
        connector: &dyn Connector,
        session: &mut Option<Box<dyn Storage>>,
    ) -> Result<usize> {
        let Some(target) = &self.remote else {
            return self.run_local(entry, ctx).await;
        };

        if session.is_none() {
            let storage = connector.connect(target, ctx).await?;
            info!("已连接: {}", storage.name());
            *session = Some(storage);
        }
        let storage = session.as_deref().context("远程会话未建立")?;

        remote::put_entry(
            storage,
            entry,
            self.dest.as_deref(),
            ctx,
            self.shell_interpret,
        )
        .await
    }

    async fn run_local(&self, entry: &FileEntry, ctx: &TaskContext) -> Result<usize> {
        let mode = self.mode;

        match entry {
            FileEntry::All => {
                let dest = self.resolve_dest(entry, ctx)?;
                let target_dir = dest.join(ctx.basename());
                let working_dir = ctx.working_dir.clone();

                let count = tokio::task::spawn_blocking(move || -> std::io::Result<usize> {
                    if mode == TransferMode::CopyTree {
                        local::copy_tree(&working_dir, &target_dir)?;
                        return Ok(1);
                    }

                    std::fs::create_dir_all(&target_dir)?;
                    let files = local::list_regular_files(&working_dir, false)?;
                    for file in &files {
                        let name = file.file_name().unwrap_or_default();
                        local::apply(mode, file, &target_dir.join(name))?;
                    }
                    Ok(files.len())
                })
                .await??;

                Ok(count)
            }
            FileEntry::Path(src) | FileEntry::Mapped { src, .. } => {
                let src = ctx.resolve_path(src, self.shell_interpret);
                let dest = self.resolve_dest(entry, ctx)?;

                let target =
                    tokio::task::spawn_blocking(move || local::apply(mode, &src, &dest)).await??;
                debug!("{}: {} -> {}", mode, entry, target.display());

                Ok(1)
            }
        }
    }

    /// 条目自身的 dest 优先，否则使用任务级 dest
    fn resolve_dest(&self, entry: &FileEntry, ctx: &TaskContext) -> Result<PathBuf> {
        let raw = entry
            .own_dest()
            .or(self.dest.as_deref())
            .ok_or_else(|| TransferError::MissingDest(entry.to_string()))?;
        Ok(ctx.resolve_path(raw, self.shell_interpret))
    }

    fn dest_display(&self) -> String {
        match &self.dest {
            Some(dest) => dest.clone(),
            None => "<per-entry>".to_string(),
        }
    }
}
