//! Recursive tree mirroring across filesystems.
//!
//! [`mirror`] replicates a directory subtree from an origin location onto a
//! target location, possibly on a different filesystem instance. When both
//! handles share an instance it delegates to that filesystem's own
//! [`Filesystem::mirror`] primitive; otherwise it walks the origin tree and
//! copies entry by entry.
//!
//! The operation is non-transactional: directory creation is best-effort
//! (a failure is logged and the walk continues), file copy failures abort
//! the remaining walk.

use futures_util::future::{BoxFuture, FutureExt};
use std::sync::Arc;

use crate::capability::Capability;
use crate::error::Result;
use crate::fs::{path, Filesystem};

/// Per-call mirror configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct MirrorOptions {
    /// Remove target entries absent from the origin.
    pub delete: bool,
    /// Overwrite policy for existing target files: `Some(true)` always,
    /// `Some(false)` never, `None` only when the origin is strictly newer.
    pub overwrite: Option<bool>,
}

impl MirrorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove target entries absent from the origin.
    pub fn delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    /// Set the overwrite policy.
    pub fn overwrite(mut self, overwrite: Option<bool>) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Copy a single file from `origin_path` to `target_path`.
///
/// Skips (successfully) when the target exists and the policy says to keep
/// it: `overwrite` is `Some(false)`, or it is `None` and the origin's
/// modification time is not strictly newer than the target's. Otherwise the
/// origin is opened as a stream and transferred; the handle is dropped on
/// every exit path.
pub async fn copy_file(
    origin_fs: &dyn Filesystem,
    origin_path: &str,
    target_fs: &dyn Filesystem,
    target_path: &str,
    overwrite: Option<bool>,
) -> Result<()> {
    if target_fs.has(target_path).await? {
        let keep = match overwrite {
            Some(false) => true,
            Some(true) => false,
            None => {
                origin_fs.timestamp(origin_path).await? <= target_fs.timestamp(target_path).await?
            }
        };
        if keep {
            return Ok(());
        }
    }

    let stream = origin_fs.read_stream(origin_path).await?;
    target_fs.write_stream(target_path, stream).await
}

/// Mirror the subtree at `origin_path` onto `target_path`.
///
/// Same-instance pairs delegate to the filesystem's own mirror primitive;
/// cross-instance pairs take the general walk.
pub async fn mirror(
    origin_fs: &Arc<dyn Filesystem>,
    origin_path: &str,
    target_fs: &Arc<dyn Filesystem>,
    target_path: &str,
    options: MirrorOptions,
) -> Result<()> {
    if Arc::ptr_eq(origin_fs, target_fs) {
        return origin_fs.mirror(origin_path, target_path, options).await;
    }

    mirror_trees(
        origin_fs.as_ref(),
        origin_path,
        target_fs.as_ref(),
        target_path,
        options,
    )
    .await
}

/// The general cross-filesystem mirror walk. Backend `mirror`
/// implementations call this with themselves on both sides.
pub(crate) async fn mirror_trees(
    origin_fs: &dyn Filesystem,
    origin_path: &str,
    target_fs: &dyn Filesystem,
    target_path: &str,
    options: MirrorOptions,
) -> Result<()> {
    let origin_root = path::normalize(origin_path);
    let target_root = path::normalize(target_path);

    if options.delete {
        let origin_dirs = origin_fs.profile()?.supports(Capability::Directories);
        delete_absent(
            origin_fs,
            &origin_root,
            target_fs,
            &target_root,
            target_root.clone(),
            origin_dirs,
        )
        .await?;
    }

    if origin_fs.has(&origin_root).await? {
        target_fs.create_dir(&target_root).await?;
    }

    copy_tree(
        origin_fs,
        &origin_root,
        target_fs,
        &target_root,
        origin_root.clone(),
        options.overwrite,
    )
    .await
}

/// Depth-first, children-before-parents sweep of the target tree, deleting
/// entries whose corresponding origin path no longer exists.
///
/// Directory-shaped entries are only deletion candidates when the origin
/// supports true directories; emulated backends cannot answer `has` for a
/// directory, so deleting on their behalf would produce false positives.
fn delete_absent<'a>(
    origin_fs: &'a dyn Filesystem,
    origin_root: &'a str,
    target_fs: &'a dyn Filesystem,
    target_root: &'a str,
    dir: String,
    origin_dirs: bool,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let entries = match target_fs.list_dir(&dir, false).await {
            Ok(entries) => entries,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };

        for entry in entries {
            let origin_path = path::rebase(&entry.path, target_root, origin_root);

            if entry.kind.is_dir() {
                delete_absent(
                    origin_fs,
                    origin_root,
                    target_fs,
                    target_root,
                    entry.path.clone(),
                    origin_dirs,
                )
                .await?;

                if !origin_dirs {
                    continue;
                }
                if origin_fs.has(&origin_path).await? {
                    continue;
                }
                match target_fs.delete_dir(&entry.path).await {
                    Ok(_) => {}
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(err),
                }
            } else {
                if origin_fs.has(&origin_path).await? {
                    continue;
                }
                match target_fs.delete(&entry.path).await {
                    Ok(_) => {}
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(err),
                }
            }
        }

        Ok(())
    }
    .boxed()
}

/// Parents-before-children sweep of the origin tree: directories are
/// created on the target (best-effort), files are copied with the
/// configured overwrite policy.
fn copy_tree<'a>(
    origin_fs: &'a dyn Filesystem,
    origin_root: &'a str,
    target_fs: &'a dyn Filesystem,
    target_root: &'a str,
    dir: String,
    overwrite: Option<bool>,
) -> BoxFuture<'a, Result<()>> {
    async move {
        let entries = match origin_fs.list_dir(&dir, false).await {
            Ok(entries) => entries,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };

        for entry in entries {
            let target_path = path::rebase(&entry.path, origin_root, target_root);

            if entry.kind.is_dir() {
                if let Err(err) = target_fs.create_dir(&target_path).await {
                    tracing::warn!(
                        path = %target_path,
                        error = %err,
                        "directory creation failed, continuing mirror"
                    );
                }
                copy_tree(
                    origin_fs,
                    origin_root,
                    target_fs,
                    target_root,
                    entry.path.clone(),
                    overwrite,
                )
                .await?;
            } else {
                copy_file(origin_fs, &entry.path, target_fs, &target_path, overwrite).await?;
            }
        }

        Ok(())
    }
    .boxed()
}
