use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A filesystem operation that failed, with the path it was acting on.
#[derive(Debug, thiserror::Error)]
#[error("failed to {op} {}: {source}", path.display())]
pub struct FsError {
    pub op: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl FsError {
    pub fn new(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

fn at<'a>(op: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> FsError + 'a {
    move |source| FsError::new(op, path, source)
}

/// Check if a path is a symlink or junction point
pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

fn exists_or_link(path: &Path) -> bool {
    path.exists() || is_symlink(path)
}

/// Sibling path `.<name>.<suffix>` next to `dest`, on the same volume so a
/// rename between them is atomic.
fn sibling(dest: &Path, suffix: &str) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());
    dest.with_file_name(format!(".{}.{}", name, suffix))
}

pub fn staging_path(dest: &Path) -> PathBuf {
    sibling(dest, "staging")
}

fn aside_path(dest: &Path) -> PathBuf {
    sibling(dest, "old")
}

/// True if `path` is missing or an empty directory.
pub fn is_empty_dir(path: &Path) -> bool {
    match fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

pub fn remove_dir_if_exists(path: &Path) -> Result<(), FsError> {
    if is_symlink(path) {
        return remove_link(path);
    }
    if path.exists() {
        fs::remove_dir_all(path).map_err(at("remove directory", path))?;
    }
    Ok(())
}

fn remove_link(path: &Path) -> Result<(), FsError> {
    // Directory links (junctions) need remove_dir on Windows.
    fs::remove_file(path)
        .or_else(|_| fs::remove_dir(path))
        .map_err(at("remove link", path))
}

/// Links to directories are not followed, so a link back up the tree
/// cannot recurse forever.
fn is_linked_dir(file_type: fs::FileType, path: &Path) -> bool {
    file_type.is_symlink() && path.is_dir()
}

/// Recursively copy a directory, returning the number of files copied.
/// Linked files are copied by content and linked directories are skipped.
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<u64, FsError> {
    fs::create_dir_all(dest).map_err(at("create directory", dest))?;

    let entries = fs::read_dir(src).map_err(at("read directory", src))?;
    let mut copied = 0;

    for entry in entries {
        let entry = entry.map_err(at("read directory entry in", src))?;
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(at("read file type of", &src_path))?;

        if file_type.is_dir() {
            copied += copy_dir_recursive(&src_path, &dest_path)?;
        } else if is_linked_dir(file_type, &src_path) {
            log::warn!("Skipping linked directory {}", src_path.display());
        } else {
            fs::copy(&src_path, &dest_path).map_err(at("copy file", &src_path))?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Verify that every entry under `src` exists under `dest` with the same size.
pub fn verify_copy(src: &Path, dest: &Path) -> Result<(), FsError> {
    let entries = fs::read_dir(src).map_err(at("read directory", src))?;

    for entry in entries {
        let entry = entry.map_err(at("read directory entry in", src))?;
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(at("read file type of", &src_path))?;
        if is_linked_dir(file_type, &src_path) {
            continue;
        }

        if !dest_path.exists() {
            return Err(FsError::new(
                "verify",
                &dest_path,
                io::Error::new(io::ErrorKind::NotFound, "copied entry is missing"),
            ));
        }

        if file_type.is_dir() {
            verify_copy(&src_path, &dest_path)?;
        } else {
            let src_len = fs::metadata(&src_path)
                .map_err(at("read metadata of", &src_path))?
                .len();
            let dest_len = fs::metadata(&dest_path)
                .map_err(at("read metadata of", &dest_path))?
                .len();
            if src_len != dest_len {
                return Err(FsError::new(
                    "verify",
                    &dest_path,
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("size mismatch ({} != {} bytes)", dest_len, src_len),
                    ),
                ));
            }
        }
    }

    Ok(())
}

/// Build a staged copy of `src` next to `dest`.
///
/// With `src` absent (or missing on disk) the staged directory is empty,
/// which is how the client's default state is represented.
pub fn stage_snapshot(src: Option<&Path>, dest: &Path) -> Result<PathBuf, FsError> {
    let staging = staging_path(dest);
    remove_dir_if_exists(&staging)?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(at("create directory", parent))?;
    }
    fs::create_dir_all(&staging).map_err(at("create staging directory", &staging))?;

    match src {
        Some(src) if src.exists() => {
            let count = copy_dir_recursive(src, &staging)?;
            log::debug!(
                "Staged {} files: {} -> {}",
                count,
                src.display(),
                staging.display()
            );
            verify_copy(src, &staging)?;
        }
        Some(src) => log::debug!("Nothing to stage, {} does not exist", src.display()),
        None => log::debug!("Staged empty directory at {}", staging.display()),
    }

    Ok(staging)
}

/// Replace `dest` with the staged directory using renames only.
///
/// The previous `dest` is moved aside first and restored if the swap fails.
pub fn replace_dir(staged: &Path, dest: &Path) -> Result<(), FsError> {
    let aside = aside_path(dest);
    remove_dir_if_exists(&aside)?;

    let had_previous = exists_or_link(dest);
    if had_previous {
        fs::rename(dest, &aside).map_err(at("move aside", dest))?;
    }

    if let Err(e) = fs::rename(staged, dest) {
        if had_previous {
            if let Err(restore) = fs::rename(&aside, dest) {
                log::error!(
                    "Failed to restore {} from {}: {}",
                    dest.display(),
                    aside.display(),
                    restore
                );
            }
        }
        return Err(FsError::new("swap in", dest, e));
    }

    if had_previous {
        if let Err(e) = remove_dir_if_exists(&aside) {
            log::warn!("Left previous snapshot behind: {}", e);
        }
    }

    log::debug!("Swapped {} into {}", staged.display(), dest.display());
    Ok(())
}

/// Copy `src` over `dest` through a verified staging directory.
pub fn snapshot_into(src: Option<&Path>, dest: &Path) -> Result<(), FsError> {
    let staging = stage_snapshot(src, dest).map_err(|e| {
        let _ = remove_dir_if_exists(&staging_path(dest));
        e
    })?;
    replace_dir(&staging, dest).map_err(|e| {
        let _ = remove_dir_if_exists(&staging);
        e
    })
}

/// Clean up after an interrupted snapshot of `dest`.
///
/// Drops any staging directory. If `dest` itself is missing but the moved
/// aside copy survived, the aside copy is put back.
pub fn recover_snapshot(dest: &Path) -> Result<(), FsError> {
    remove_dir_if_exists(&staging_path(dest))?;

    let aside = aside_path(dest);
    if exists_or_link(&aside) {
        if exists_or_link(dest) {
            remove_dir_if_exists(&aside)?;
        } else {
            log::warn!(
                "Restoring {} from interrupted swap at {}",
                dest.display(),
                aside.display()
            );
            fs::rename(&aside, dest).map_err(at("restore", dest))?;
        }
    }
    Ok(())
}
