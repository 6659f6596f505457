//! Filesystem helpers for world directories.

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Component, Path, PathBuf};

/// File whose presence marks a directory as a world.
pub const WORLD_MARKER: &str = "level.dat";

/// Per-instance files never carried over into a copy.
pub const COPY_IGNORED: [&str; 2] = ["uid.dat", "session.lock"];

/// Recursively copy `src` into `dst`, skipping top-level and nested files
/// named in `ignore`. `dst` is created if missing.
pub fn copy_dir(src: &Path, dst: &Path, ignore: &[&str]) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if ignore.iter().any(|i| name.as_os_str() == *i) {
            continue;
        }
        let target = dst.join(&name);
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target, ignore)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

/// `relative` joined onto `root`, or `None` unless every component of
/// `relative` is a plain directory name (no root, prefix, `.` or `..`).
pub fn contained_path(root: &Path, relative: &str) -> Option<PathBuf> {
    let path = Path::new(relative);
    let plain = path.components().all(|c| matches!(c, Component::Normal(_)));
    if relative.is_empty() || !plain {
        return None;
    }
    Some(root.join(path))
}

pub fn remove_dir(path: &Path) -> io::Result<()> {
    std::fs::remove_dir_all(path)
}

pub fn has_marker(dir: &Path) -> bool {
    dir.join(WORLD_MARKER).is_file()
}

/// Existing entry of `container` whose name equals `name` ignoring case.
pub fn find_dir_ignore_case(container: &Path, name: &str) -> Option<PathBuf> {
    let exact = container.join(name);
    if exact.is_dir() {
        return Some(exact);
    }
    std::fs::read_dir(container)
        .ok()?
        .filter_map(Result::ok)
        .find(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
                && e.path().is_dir()
        })
        .map(|e| e.path())
}

/// Creation time of a directory in epoch millis. Falls back to the
/// modification time on filesystems without birth times.
pub fn directory_created_millis(dir: &Path) -> Option<i64> {
    let meta = std::fs::metadata(dir).ok()?;
    let time = meta.created().or_else(|_| meta.modified()).ok()?;
    Some(DateTime::<Utc>::from(time).timestamp_millis())
}
