//! Mirror integration tests: idempotence, delete semantics, overwrite
//! policies, capability-gated directory deletion.

mod common;

use common::InstrumentedFs;
use pretty_assertions::assert_eq;
use std::sync::Arc;

use mountkit::{copy_file, mirror, Filesystem, LocalFs, MemoryFs, MirrorOptions};

fn arc_memory() -> Arc<dyn Filesystem> {
    Arc::new(MemoryFs::new())
}

#[tokio::test]
async fn test_mirror_copies_tree() {
    let origin = arc_memory();
    let target = arc_memory();

    origin.write("src/a.txt", b"one").await.unwrap();
    origin.write("src/sub/b.txt", b"two").await.unwrap();

    mirror(&origin, "src", &target, "dst", MirrorOptions::new())
        .await
        .unwrap();

    assert_eq!(target.read("dst/a.txt").await.unwrap(), b"one");
    assert_eq!(target.read("dst/sub/b.txt").await.unwrap(), b"two");
    assert!(target.has("dst/sub").await.unwrap());
}

#[tokio::test]
async fn test_mirror_idempotence() {
    let origin = arc_memory();
    let inner = arc_memory();
    let counted = Arc::new(InstrumentedFs::new(Arc::clone(&inner)));
    let target: Arc<dyn Filesystem> = counted.clone();

    origin.write("src/a.txt", b"one").await.unwrap();
    origin.write("src/sub/b.txt", b"two").await.unwrap();

    mirror(&origin, "src", &target, "dst", MirrorOptions::new())
        .await
        .unwrap();
    let writes_after_first = counted.write_count();
    assert_eq!(writes_after_first, 2);

    // Second run: timestamps are unchanged and not newer, nothing is
    // re-copied.
    mirror(&origin, "src", &target, "dst", MirrorOptions::new())
        .await
        .unwrap();
    assert_eq!(counted.write_count(), writes_after_first);
}

#[tokio::test]
async fn test_mirror_delete_semantics() {
    let origin = arc_memory();
    let target = arc_memory();

    origin.write("src/a.txt", b"keep").await.unwrap();
    target.write("dst/a.txt", b"keep").await.unwrap();
    target.write("dst/b.txt", b"stray").await.unwrap();

    mirror(
        &origin,
        "src",
        &target,
        "dst",
        MirrorOptions::new().delete(true),
    )
    .await
    .unwrap();

    assert!(target.has("dst/a.txt").await.unwrap());
    assert!(!target.has("dst/b.txt").await.unwrap());
}

#[tokio::test]
async fn test_mirror_delete_removes_stray_directories() {
    let origin = arc_memory();
    let target = arc_memory();

    origin.write("src/a.txt", b"keep").await.unwrap();
    target.write("dst/stale/deep/c.txt", b"gone").await.unwrap();

    mirror(
        &origin,
        "src",
        &target,
        "dst",
        MirrorOptions::new().delete(true),
    )
    .await
    .unwrap();

    assert!(!target.has("dst/stale").await.unwrap());
    assert!(target.has("dst/a.txt").await.unwrap());
}

#[tokio::test]
async fn test_mirror_delete_skips_directories_for_emulated_origin() {
    let inner = arc_memory();
    let origin: Arc<dyn Filesystem> = Arc::new(InstrumentedFs::emulated(inner));
    let target = arc_memory();

    origin.write("src/a.txt", b"keep").await.unwrap();
    target.create_dir("dst/ghost").await.unwrap();
    target.write("dst/stray.txt", b"gone").await.unwrap();

    mirror(
        &origin,
        "src",
        &target,
        "dst",
        MirrorOptions::new().delete(true),
    )
    .await
    .unwrap();

    // The origin cannot answer for directories, so the directory-shaped
    // entry survives; the stray file is still deleted.
    assert!(target.has("dst/ghost").await.unwrap());
    assert!(!target.has("dst/stray.txt").await.unwrap());
}

#[tokio::test]
async fn test_copy_skip_policies() {
    let origin = arc_memory();
    let target = arc_memory();

    origin.write("src.txt", b"new contents").await.unwrap();
    target.write("dst.txt", b"original").await.unwrap();

    // Never overwrite: target untouched.
    copy_file(
        origin.as_ref(),
        "src.txt",
        target.as_ref(),
        "dst.txt",
        Some(false),
    )
    .await
    .unwrap();
    assert_eq!(target.read("dst.txt").await.unwrap(), b"original");

    // Only-if-newer: the target was written after the origin, so the copy
    // is skipped.
    copy_file(
        origin.as_ref(),
        "src.txt",
        target.as_ref(),
        "dst.txt",
        None,
    )
    .await
    .unwrap();
    assert_eq!(target.read("dst.txt").await.unwrap(), b"original");

    // Always overwrite: target replaced.
    copy_file(
        origin.as_ref(),
        "src.txt",
        target.as_ref(),
        "dst.txt",
        Some(true),
    )
    .await
    .unwrap();
    assert_eq!(target.read("dst.txt").await.unwrap(), b"new contents");
}

#[tokio::test]
async fn test_copy_only_if_newer_copies_newer_origin() {
    let origin = arc_memory();
    let target = arc_memory();

    target.write("dst.txt", b"old").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    origin.write("src.txt", b"newer").await.unwrap();

    copy_file(
        origin.as_ref(),
        "src.txt",
        target.as_ref(),
        "dst.txt",
        None,
    )
    .await
    .unwrap();
    assert_eq!(target.read("dst.txt").await.unwrap(), b"newer");
}

#[tokio::test]
async fn test_same_instance_mirror_fast_path() {
    let fs = arc_memory();
    fs.write("src/a.txt", b"one").await.unwrap();

    mirror(&fs, "src", &fs, "dst", MirrorOptions::new())
        .await
        .unwrap();
    assert_eq!(fs.read("dst/a.txt").await.unwrap(), b"one");
}

#[tokio::test]
async fn test_mirror_memory_to_disk() {
    let origin = arc_memory();
    origin.write("tree/one.txt", b"1").await.unwrap();
    origin.write("tree/sub/two.txt", b"2").await.unwrap();

    let dir = tempfile::TempDir::new().unwrap();
    let target: Arc<dyn Filesystem> = Arc::new(LocalFs::new(dir.path()).await.unwrap());

    mirror(&origin, "tree", &target, "copy", MirrorOptions::new())
        .await
        .unwrap();

    assert_eq!(
        std::fs::read(dir.path().join("copy/sub/two.txt")).unwrap(),
        b"2"
    );
}
