//! 传输任务错误类型

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Invalid transfer mode: {0}")]
    InvalidMode(String),

    #[error("No destination given and entry `{0}` does not carry its own")]
    MissingDest(String),

    #[error("Remote transfer requires `{0}`")]
    MissingRemoteField(&'static str),

    #[error("Environment key `{0}` not found in task context")]
    MissingEnv(String),

    #[error("Invalid task spec: {0}")]
    InvalidSpec(String),

    /// 单个条目传输失败，受重试策略约束
    #[error("{mode} failed for {entry}: {source:#}")]
    TransferFailure {
        mode: String,
        entry: String,
        #[source]
        source: anyhow::Error,
    },

    /// 远程目录不存在（put 时由存储层报告）
    #[error("Remote directory missing for {0}")]
    RemoteDirectoryMissing(String),

    #[error("There was an error performing operation {mode} from {files} to {dest}")]
    ExhaustedRetries {
        mode: String,
        files: String,
        dest: String,
        #[source]
        source: Box<TransferError>,
    },
}

impl TransferError {
    /// 判断 anyhow 错误链中是否为“远程目录不存在”
    pub fn is_remote_dir_missing(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<TransferError>(),
            Some(TransferError::RemoteDirectoryMissing(_))
        )
    }
}
