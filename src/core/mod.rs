pub mod engine;
pub mod local;
pub mod paths;
pub mod remote;
pub mod spec;

pub use engine::{FileTransferTask, TransferReport};
pub use paths::TaskContext;
pub use spec::{FileEntry, RemoteTarget, RetryPolicy, TransferMode, TransferSpec};
