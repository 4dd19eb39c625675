//! 远程上传 - 基于 Storage 接口的条目处理

use super::local::list_regular_files;
use super::paths::{join_remote, TaskContext};
use super::spec::FileEntry;
use crate::error::TransferError;
use crate::storage::Storage;
use anyhow::{bail, Result};
use std::path::Path;
use tracing::debug;

/// 上传一个条目，返回传输的文件数
pub async fn put_entry(
    storage: &dyn Storage,
    entry: &FileEntry,
    dest: Option<&str>,
    ctx: &TaskContext,
    shell_interpret: bool,
) -> Result<usize> {
    let src = match entry {
        FileEntry::All => {
            let dest = dest.ok_or_else(|| TransferError::MissingDest(entry.to_string()))?;
            return put_working_dir(storage, dest, ctx).await;
        }
        FileEntry::Path(src) | FileEntry::Mapped { src, .. } => src,
    };

    let remote_dir = entry
        .own_dest()
        .or(dest)
        .ok_or_else(|| TransferError::MissingDest(entry.to_string()))?;
    let local = ctx.resolve_path(src, shell_interpret);
    if !local.exists() {
        bail!("本地路径不存在: {}", local.display());
    }

    ensure_dir(storage, remote_dir).await?;

    if local.is_dir() {
        // 只上传目录下一层的普通文件
        let files = list_regular_files(&local, true)?;
        for file in &files {
            put_named(storage, file, remote_dir).await?;
        }
        Ok(files.len())
    } else {
        put_named(storage, &local, remote_dir).await?;
        Ok(1)
    }
}

/// "all"：工作目录下的文件上传到 `dest/<工作目录名>/`
async fn put_working_dir(storage: &dyn Storage, dest: &str, ctx: &TaskContext) -> Result<usize> {
    let remote_dir = join_remote(dest, &ctx.basename());
    let files = list_regular_files(&ctx.working_dir, false)?;
    let mut created = false;

    for file in &files {
        let remote = join_remote(&remote_dir, &file_name(file)?);
        match storage.put(file, &remote).await {
            Ok(_) => {}
            Err(e) if !created && TransferError::is_remote_dir_missing(&e) => {
                debug!("远程目录不存在，创建: {}", remote_dir);
                storage.create_dir(&remote_dir).await?;
                created = true;
                storage.put(file, &remote).await?;
            }
            Err(e) => return Err(e),
        }
        debug!("上传: {} -> {}", file.display(), remote);
    }

    Ok(files.len())
}

async fn ensure_dir(storage: &dyn Storage, dir: &str) -> Result<()> {
    if !storage.exists(dir).await? {
        debug!("创建远程目录: {} ({})", dir, storage.name());
        storage.create_dir(dir).await?;
    }
    Ok(())
}

async fn put_named(storage: &dyn Storage, local: &Path, remote_dir: &str) -> Result<u64> {
    let remote = join_remote(remote_dir, &file_name(local)?);
    let bytes = storage.put(local, &remote).await?;
    debug!("上传: {} -> {} ({} 字节)", local.display(), remote, bytes);
    Ok(bytes)
}

fn file_name(path: &Path) -> Result<String> {
    match path.file_name() {
        Some(name) => Ok(name.to_string_lossy().into_owned()),
        None => bail!("路径没有文件名: {}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;
    use std::fs;

    fn setup() -> (tempfile::TempDir, TaskContext, LocalStorage) {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("relax");
        fs::create_dir_all(work.join("sub")).unwrap();
        fs::write(work.join("INCAR"), "ISIF = 3").unwrap();
        fs::write(work.join("POSCAR"), "Si").unwrap();
        fs::write(work.join(".lock"), "").unwrap();
        fs::write(work.join("sub/WAVECAR"), "w").unwrap();
        let storage = LocalStorage::new(&tmp.path().join("remote")).unwrap();
        (tmp, TaskContext::new(work), storage)
    }

    #[tokio::test]
    async fn test_put_all_creates_basename_dir() {
        let (tmp, ctx, storage) = setup();

        let count = put_entry(&storage, &FileEntry::All, Some("/store"), &ctx, true)
            .await
            .unwrap();

        assert_eq!(count, 2);
        let remote = tmp.path().join("remote/store/relax");
        assert_eq!(fs::read_to_string(remote.join("INCAR")).unwrap(), "ISIF = 3");
        assert!(remote.join("POSCAR").exists());
        assert!(!remote.join(".lock").exists());
        assert!(!remote.join("sub").exists());
    }

    #[tokio::test]
    async fn test_put_directory_is_not_recursive() {
        let (tmp, ctx, storage) = setup();

        let count = put_entry(
            &storage,
            &FileEntry::Path(".".into()),
            Some("/store/flat"),
            &ctx,
            true,
        )
        .await
        .unwrap();

        assert_eq!(count, 3);
        let remote = tmp.path().join("remote/store/flat");
        assert!(remote.join("INCAR").exists());
        assert!(remote.join(".lock").exists());
        assert!(!remote.join("WAVECAR").exists());
        assert!(!remote.join("sub").exists());
    }

    #[tokio::test]
    async fn test_put_file_uses_mapped_dest() {
        let (tmp, ctx, storage) = setup();
        let entry = FileEntry::Mapped {
            src: "POSCAR".into(),
            dest: Some("/store/structures".into()),
        };

        put_entry(&storage, &entry, Some("/ignored"), &ctx, true)
            .await
            .unwrap();

        assert!(tmp.path().join("remote/store/structures/POSCAR").exists());
        assert!(!tmp.path().join("remote/ignored").exists());
    }

    #[tokio::test]
    async fn test_put_missing_source() {
        let (tmp, ctx, storage) = setup();

        let result = put_entry(
            &storage,
            &FileEntry::Path("CHGCAR".into()),
            Some("/store"),
            &ctx,
            true,
        )
        .await;

        assert!(result.is_err());
        assert!(!tmp.path().join("remote/store").exists());
    }
}
