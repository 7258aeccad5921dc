//! Filesystem helpers shared by the installer and the bundle integrator.
//!
//! All functions here are blocking; async callers run them through
//! `tokio::task::spawn_blocking`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use walkdir::WalkDir;

static BACKUP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Remove `path` whether it is a file, a symlink or a directory tree.
/// A missing path is not an error.
///
/// # Errors
///
/// Returns any I/O error other than the path being absent.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let meta = match path.symlink_metadata() {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Put `staged` in place of `target`.
///
/// An existing `target` is first renamed aside, then `staged` is renamed
/// into place, then the old copy is deleted. If the second rename fails the
/// old copy is moved back. Both paths must be on the same filesystem.
///
/// # Errors
///
/// Returns the I/O error of whichever rename failed.
pub fn replace_dir(staged: &Path, target: &Path) -> io::Result<()> {
    let backup = if target.exists() {
        let backup = backup_path(target);
        std::fs::rename(target, &backup)?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = std::fs::rename(staged, target) {
        if let Some(backup) = &backup {
            let _ = std::fs::rename(backup, target);
        }
        return Err(e);
    }

    if let Some(backup) = backup
        && let Err(e) = remove_path(&backup)
    {
        tracing::warn!(path = %backup.display(), error = %e, "failed to remove old dependency directory");
    }
    Ok(())
}

fn backup_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = BACKUP_COUNTER.fetch_add(1, Ordering::Relaxed);
    target.with_file_name(format!("{name}-old-{}-{n}", std::process::id()))
}

/// Recursively copy `src` into `dst`, creating `dst`.
///
/// Entries are visited in sorted order. Symlinks are recreated rather than
/// followed; an absolute link pointing inside `src` is rewritten as a
/// relative link so the copy stays self-contained.
///
/// # Errors
///
/// Returns the first I/O error encountered.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut copied = 0u64;
    std::fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src).sort_by_file_name().min_depth(1) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())?;
            let link = match link.strip_prefix(src) {
                Ok(inside) if link.is_absolute() => {
                    let link_dir = target.parent().unwrap_or(dst);
                    relative_path(link_dir, &dst.join(inside))
                }
                _ => link,
            };
            symlink(&link, &target)?;
        } else if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(unix)]
fn symlink(link: &Path, at: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, at)
}

#[cfg(windows)]
fn symlink(link: &Path, at: &Path) -> io::Result<()> {
    let resolved = at.parent().map_or_else(|| link.to_path_buf(), |p| p.join(link));
    if resolved.is_dir() {
        std::os::windows::fs::symlink_dir(link, at)
    } else {
        std::os::windows::fs::symlink_file(link, at)
    }
}

/// Relative path from `from_dir` to `to_path`; both must be absolute.
///
/// `relative_path("/a/b/c", "/a/b/d/e")` is `../d/e`.
fn relative_path(from_dir: &Path, to_path: &Path) -> PathBuf {
    let from: Vec<_> = from_dir.components().collect();
    let to: Vec<_> = to_path.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut result = PathBuf::new();
    for _ in common..from.len() {
        result.push("..");
    }
    for part in &to[common..] {
        result.push(part);
    }
    result
}
