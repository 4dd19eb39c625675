//! 路径解析 - shell 风格展开与任务环境引用

use crate::error::TransferError;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

/// 任务执行上下文
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    /// 任务工作目录（"all" 与相对路径以此为基准）
    pub working_dir: PathBuf,
    /// `>>key<<` 引用的取值表
    pub env: BTreeMap<String, String>,
}

impl TaskContext {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
        }
    }

    /// 以进程当前目录为工作目录
    pub fn current() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// 工作目录的最后一级名称
    pub fn basename(&self) -> String {
        self.working_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// 解析 `>>key<<` 引用，其他值原样返回
    pub fn resolve_env(&self, value: &str) -> Result<String, TransferError> {
        match value
            .strip_prefix(">>")
            .and_then(|v| v.strip_suffix("<<"))
        {
            Some(key) => self
                .env
                .get(key)
                .cloned()
                .ok_or_else(|| TransferError::MissingEnv(key.to_string())),
            None => Ok(value.to_string()),
        }
    }

    /// 将条目路径解析为本地绝对路径
    pub fn resolve_path(&self, raw: &str, shell_interpret: bool) -> PathBuf {
        let path = if shell_interpret {
            PathBuf::from(expand_shell(raw))
        } else {
            PathBuf::from(raw)
        };

        if path.is_absolute() {
            normalize(&path)
        } else {
            normalize(&self.working_dir.join(path))
        }
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
            .expect("static regex")
    })
}

/// 展开 `~`、`~/...` 与 `$VAR` / `${VAR}`；未定义的变量保持原样
pub fn expand_shell(raw: &str) -> String {
    let expanded = env_var_pattern().replace_all(raw, |caps: &Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
    });

    expand_home(&expanded)
}

fn expand_home(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return path.to_string(),
    };

    match dirs::home_dir() {
        Some(home) => format!("{}{}", home.to_string_lossy().trim_end_matches('/'), rest),
        None => path.to_string(),
    }
}

/// 词法规范化（去除 `.` 与 `..`），不访问文件系统
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// 拼接远程路径（始终使用 `/`）
pub fn join_remote(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_env_reference() {
        let ctx = TaskContext::new("/work").with_env("ssh_key", "/keys/id_calc");

        assert_eq!(ctx.resolve_env(">>ssh_key<<").unwrap(), "/keys/id_calc");
        assert_eq!(ctx.resolve_env("/plain/path").unwrap(), "/plain/path");
        assert!(matches!(
            ctx.resolve_env(">>missing<<"),
            Err(TransferError::MissingEnv(k)) if k == "missing"
        ));
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("FILETRANSFER_TEST_SCRATCH", "/scratch/run1");

        assert_eq!(
            expand_shell("$FILETRANSFER_TEST_SCRATCH/OUTCAR"),
            "/scratch/run1/OUTCAR"
        );
        assert_eq!(
            expand_shell("${FILETRANSFER_TEST_SCRATCH}_old"),
            "/scratch/run1_old"
        );
        assert_eq!(
            expand_shell("$FILETRANSFER_TEST_UNSET_VAR/x"),
            "$FILETRANSFER_TEST_UNSET_VAR/x"
        );
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            let expanded = expand_shell("~/calc");
            assert_eq!(PathBuf::from(expanded), home.join("calc"));
        }
        assert_eq!(expand_shell("~user/calc"), "~user/calc");
    }

    #[test]
    fn test_resolve_path_relative_to_working_dir() {
        let ctx = TaskContext::new("/work/relax");

        assert_eq!(
            ctx.resolve_path("../static/CHGCAR", true),
            PathBuf::from("/work/static/CHGCAR")
        );
        assert_eq!(
            ctx.resolve_path("/abs/./POSCAR", false),
            PathBuf::from("/abs/POSCAR")
        );
    }

    #[test]
    fn test_shell_interpret_disabled() {
        let ctx = TaskContext::new("/work");
        assert_eq!(
            ctx.resolve_path("$HOME/x", false),
            PathBuf::from("/work/$HOME/x")
        );
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/data/", "a.txt"), "/data/a.txt");
        assert_eq!(join_remote("", "a.txt"), "a.txt");
        assert_eq!(join_remote("/data", "/sub"), "/data/sub");
    }

    #[test]
    fn test_basename() {
        assert_eq!(TaskContext::new("/work/relax").basename(), "relax");
    }
}
