//! 本地文件操作 - 每种本地模式对应一个函数
//!
//! 语义与常见的 shell 工具一致：目标为已存在的目录时放入该目录下，
//! 否则视为完整目标路径。所有函数返回最终写入的路径。

use super::paths::normalize;
use super::spec::TransferMode;
use filetime::FileTime;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// 按模式执行本地操作
pub fn apply(mode: TransferMode, src: &Path, dest: &Path) -> io::Result<PathBuf> {
    match mode {
        TransferMode::Move => move_path(src, dest),
        TransferMode::Copy => copy(src, dest),
        TransferMode::CopyPreservingMetadata => copy_with_metadata(src, dest),
        TransferMode::CopyTree => copy_tree(src, dest),
        TransferMode::CopyRawBytes => copy_raw(src, dest),
        TransferMode::RemotePut => Err(io::Error::new(
            ErrorKind::Unsupported,
            "remote put is not a local operation",
        )),
    }
}

/// 目标为目录时，返回 `dest/<src 文件名>`
fn target_in(src: &Path, dest: &Path) -> io::Result<PathBuf> {
    if dest.is_dir() {
        let name = src.file_name().ok_or_else(|| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("source has no file name: {}", src.display()),
            )
        })?;
        Ok(dest.join(name))
    } else {
        Ok(dest.to_path_buf())
    }
}

fn reject_dir_source(src: &Path) -> io::Result<()> {
    if src.is_dir() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("source is a directory: {}", src.display()),
        ));
    }
    Ok(())
}

/// 目标已存在且与源为同一文件时报错（否则复制会把源文件截断为空）
fn reject_same_file(src: &Path, target: &Path) -> io::Result<()> {
    if target.exists() && fs::canonicalize(src)? == fs::canonicalize(target)? {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!(
                "source and destination are the same file: {}",
                src.display()
            ),
        ));
    }
    Ok(())
}

/// 不存在的路径按其父目录的真实路径求绝对形式
fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.exists() {
        return fs::canonicalize(path);
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            Ok(absolute(parent)?.join(name))
        }
        _ => Ok(normalize(&std::env::current_dir()?.join(path))),
    }
}

/// 复制内容和权限位
pub fn copy(src: &Path, dest: &Path) -> io::Result<PathBuf> {
    reject_dir_source(src)?;
    let target = target_in(src, dest)?;
    reject_same_file(src, &target)?;
    fs::copy(src, &target)?;
    debug!("复制: {} -> {}", src.display(), target.display());
    Ok(target)
}

/// 复制内容、权限位以及访问/修改时间
pub fn copy_with_metadata(src: &Path, dest: &Path) -> io::Result<PathBuf> {
    let target = copy(src, dest)?;
    copy_times(src, &target)?;
    Ok(target)
}

fn copy_times(src: &Path, target: &Path) -> io::Result<()> {
    let metadata = fs::metadata(src)?;
    filetime::set_file_times(
        target,
        FileTime::from_last_access_time(&metadata),
        FileTime::from_last_modification_time(&metadata),
    )
}

/// 仅复制字节；目标必须是文件路径，失败时删除写了一半的文件
pub fn copy_raw(src: &Path, dest: &Path) -> io::Result<PathBuf> {
    if dest.is_dir() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("destination is a directory: {}", dest.display()),
        ));
    }
    reject_dir_source(src)?;
    reject_same_file(src, dest)?;

    let mut reader = fs::File::open(src)?;
    let mut writer = fs::File::create(dest)?;

    let guard = scopeguard::guard(dest.to_path_buf(), |partial| {
        let _ = fs::remove_file(partial);
    });
    io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    let target = scopeguard::ScopeGuard::into_inner(guard);

    debug!("字节复制: {} -> {}", src.display(), target.display());
    Ok(target)
}

/// 递归复制目录；目标不能已存在
pub fn copy_tree(src: &Path, dest: &Path) -> io::Result<PathBuf> {
    if !src.is_dir() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("source is not a directory: {}", src.display()),
        ));
    }
    if dest.exists() {
        return Err(io::Error::new(
            ErrorKind::AlreadyExists,
            format!("destination already exists: {}", dest.display()),
        ));
    }
    // 目标位于源目录内时，遍历会进入新建的目标目录并无限嵌套
    if absolute(dest)?.starts_with(fs::canonicalize(src)?) {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!(
                "cannot copy {} into itself ({})",
                src.display(),
                dest.display()
            ),
        ));
    }

    let mut files = 0usize;
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(ErrorKind::Other, e))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copy_times(entry.path(), &target)?;
            files += 1;
        }
    }

    debug!(
        "目录复制: {} -> {} ({} 个文件)",
        src.display(),
        dest.display(),
        files
    );
    Ok(dest.to_path_buf())
}

/// 移动文件或目录；跨设备时退化为复制后删除
pub fn move_path(src: &Path, dest: &Path) -> io::Result<PathBuf> {
    let target = target_in(src, dest)?;
    if dest.is_dir() && target.exists() {
        return Err(io::Error::new(
            ErrorKind::AlreadyExists,
            format!("destination path already exists: {}", target.display()),
        ));
    }

    match fs::rename(src, &target) {
        Ok(()) => {}
        Err(rename_err) => {
            if !src.exists() {
                return Err(rename_err);
            }
            debug!("重命名失败，改为复制后删除: {}", rename_err);
            if src.is_dir() {
                copy_tree(src, &target)?;
                fs::remove_dir_all(src)?;
            } else {
                copy_with_metadata(src, &target)?;
                fs::remove_file(src)?;
            }
        }
    }

    debug!("移动: {} -> {}", src.display(), target.display());
    Ok(target)
}

/// 列出目录下的普通文件（非递归，按名称排序）
pub fn list_regular_files(dir: &Path, include_hidden: bool) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !include_hidden && entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if entry.path().is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
