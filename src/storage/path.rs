//! Helpers for `/`-separated storage paths

use crate::error::{Result, StorageError};

/// Lexically normalize an absolute path
///
/// Collapses repeated separators, drops `.` segments and resolves `..`.
/// A `..` that would climb above `/` is rejected.
pub fn normalize(path: &str) -> Result<String> {
    if !path.starts_with('/') {
        return Err(StorageError::InvalidPath(format!(
            "path must be absolute: {:?}",
            path
        )));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(StorageError::InvalidPath(format!(
                        "path escapes root: {:?}",
                        path
                    )));
                }
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}", segments.join("/")))
    }
}

/// Whether `path` is already in normalized form
pub fn is_normalized(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    path.starts_with('/')
        && path[1..]
            .split('/')
            .all(|s| !s.is_empty() && s != "." && s != "..")
}

/// Path of `path` relative to `mount_point`, if the mount owns it
///
/// Matching happens at segment boundaries: `/home` owns `/home/x` but not
/// `/homework`. The result is always absolute (`/` for the mount root).
pub fn strip_mount(path: &str, mount_point: &str) -> Option<String> {
    if mount_point == "/" {
        return Some(path.to_string());
    }
    let rest = path.strip_prefix(mount_point)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}

/// Inverse of [`strip_mount`]
pub fn join_mount(mount_point: &str, relative: &str) -> String {
    if mount_point == "/" {
        relative.to_string()
    } else if relative == "/" {
        mount_point.to_string()
    } else {
        format!("{}{}", mount_point, relative)
    }
}

/// Iterate `path` and its ancestors, longest first, ending with `/`
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let mut next = Some(path);
    std::iter::from_fn(move || {
        let current = next?;
        next = if current == "/" {
            None
        } else {
            parent(current)
        };
        Some(current)
    })
}

/// Parent of a normalized path, `None` for `/`
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a normalized path
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
