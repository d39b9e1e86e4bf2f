//! Integration tests for the compaction pass.

use capsulefs::{Capsule, CapsulePath, Node};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{Read, Write};
use std::path::Path;

fn path(s: &str) -> CapsulePath {
    CapsulePath::parse(s).unwrap()
}

fn write_content(capsule: &Capsule, at: &str, content: &[u8]) {
    let node = capsule.open_node(&path(at)).unwrap().unwrap();
    let mut writer = node.as_file().unwrap().write_channel().unwrap();
    writer.write_all(content).unwrap();
    writer.close().unwrap();
}

fn read_content(capsule: &Capsule, at: &str) -> Vec<u8> {
    let node = capsule.open_node(&path(at)).unwrap().unwrap();
    let mut out = Vec::new();
    node.as_file()
        .unwrap()
        .read_channel()
        .unwrap()
        .read_to_end(&mut out)
        .unwrap();
    out
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

#[test]
fn test_compaction_preserves_paths_and_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let capsule = Capsule::create(dir.path().join("store.capsule")).unwrap();

    capsule.create_directory(&path("a")).unwrap();
    capsule.create_directory(&path("a/b")).unwrap();
    capsule.create_file(&path("a/b/deep.bin")).unwrap();
    capsule.create_file(&path("top.txt")).unwrap();
    write_content(&capsule, "a/b/deep.bin", &[0xAB; 4096]);
    write_content(&capsule, "top.txt", b"short");

    let capsule = capsule.compact().unwrap();

    assert_eq!(read_content(&capsule, "a/b/deep.bin"), vec![0xAB; 4096]);
    assert_eq!(read_content(&capsule, "top.txt"), b"short");
    assert!(matches!(
        capsule.open_node(&path("a/b")).unwrap(),
        Some(Node::Directory(_))
    ));
}

#[test]
fn test_compaction_reclaims_deleted_space() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store.capsule");
    let capsule = Capsule::create(&store).unwrap();

    capsule.create_file(&path("keep.bin")).unwrap();
    write_content(&capsule, "keep.bin", &[1; 1024]);
    let doomed = capsule.create_file(&path("doomed.bin")).unwrap();
    write_content(&capsule, "doomed.bin", &[2; 64 * 1024]);

    doomed.delete().unwrap();
    let before = file_size(&store);

    let capsule = capsule.compact().unwrap();

    assert!(file_size(&store) < before);
    assert_eq!(read_content(&capsule, "keep.bin"), vec![1; 1024]);
    assert!(capsule.open_node(&path("doomed.bin")).unwrap().is_none());
}

#[test]
fn test_compaction_reclaims_overwritten_content() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store.capsule");
    let capsule = Capsule::create(&store).unwrap();

    capsule.create_file(&path("churn.bin")).unwrap();
    for round in 0u8..8 {
        write_content(&capsule, "churn.bin", &vec![round; 32 * 1024]);
    }
    let before = file_size(&store);

    let capsule = capsule.compact().unwrap();

    assert!(file_size(&store) < before);
    assert_eq!(read_content(&capsule, "churn.bin"), vec![7; 32 * 1024]);
}

#[test]
fn test_compaction_drops_childless_directories() {
    let dir = tempfile::tempdir().unwrap();
    let capsule = Capsule::create(dir.path().join("store.capsule")).unwrap();

    capsule.create_directory(&path("empty")).unwrap();
    capsule.create_directory(&path("only-empties")).unwrap();
    capsule.create_directory(&path("only-empties/inner")).unwrap();
    capsule.create_directory(&path("useful")).unwrap();
    capsule.create_file(&path("useful/f.txt")).unwrap();
    write_content(&capsule, "useful/f.txt", b"x");

    let capsule = capsule.compact().unwrap();

    assert!(capsule.open_node(&path("empty")).unwrap().is_none());
    // directories whose whole subtree is empty cascade away
    assert!(capsule.open_node(&path("only-empties")).unwrap().is_none());
    assert!(capsule.open_node(&path("only-empties/inner")).unwrap().is_none());
    assert!(capsule.open_node(&path("useful")).unwrap().is_some());
}

#[test]
fn test_compaction_keeps_empty_files() {
    let dir = tempfile::tempdir().unwrap();
    let capsule = Capsule::create(dir.path().join("store.capsule")).unwrap();

    capsule.create_directory(&path("d")).unwrap();
    capsule.create_file(&path("d/zero.len")).unwrap();

    let capsule = capsule.compact().unwrap();

    let node = capsule.open_node(&path("d/zero.len")).unwrap().unwrap();
    assert_eq!(node.as_file().unwrap().size().unwrap(), 0);
}

#[test]
fn test_compaction_invalidates_old_handles() {
    let dir = tempfile::tempdir().unwrap();
    let capsule = Capsule::create(dir.path().join("store.capsule")).unwrap();
    let file = capsule.create_file(&path("f.txt")).unwrap();
    write_content(&capsule, "f.txt", b"data");

    let capsule = capsule.compact().unwrap();

    assert!(file.read_channel().is_err());
    // the same path is reachable again through the new instance
    assert_eq!(read_content(&capsule, "f.txt"), b"data");
}

#[test]
fn test_reopen_after_compaction_matches_pre_compaction_tree() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store.capsule");

    let capsule = Capsule::create(&store).unwrap();
    capsule.create_directory(&path("a")).unwrap();
    capsule.create_file(&path("a/one.txt")).unwrap();
    capsule.create_file(&path("a/two.txt")).unwrap();
    write_content(&capsule, "a/one.txt", b"one");
    write_content(&capsule, "a/two.txt", b"two");
    capsule
        .open_node(&path("a/two.txt"))
        .unwrap()
        .unwrap()
        .delete()
        .unwrap();
    capsule.compact().unwrap().close().unwrap();

    let reopened = Capsule::open(&store).unwrap();
    assert_eq!(read_content(&reopened, "a/one.txt"), b"one");
    assert!(reopened.open_node(&path("a/two.txt")).unwrap().is_none());

    let a = reopened
        .open_node(&path("a"))
        .unwrap()
        .unwrap()
        .into_directory()
        .unwrap();
    let names: Vec<String> = a.children().unwrap().iter().map(Node::name).collect();
    assert_eq!(names, vec!["one.txt"]);
}

#[test]
fn test_store_delete_compact_store_read_cycle() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("store.capsule");
    let capsule = Capsule::create(&store).unwrap();

    let mut contents = Vec::new();
    capsule.create_directory(&path("docs")).unwrap();
    for i in 0..16 {
        let mut content = vec![0u8; rng.gen_range(256..4096)];
        rng.fill(content.as_mut_slice());

        let at = format!("docs/file-{i}.bin");
        capsule.create_file(&path(&at)).unwrap();
        write_content(&capsule, &at, &content);
        contents.push(content);
    }
    // delete most of them
    for i in 0..12 {
        capsule
            .open_node(&path(&format!("docs/file-{i}.bin")))
            .unwrap()
            .unwrap()
            .delete()
            .unwrap();
    }

    let before = file_size(&store);
    let capsule = capsule.compact().unwrap();
    assert!(file_size(&store) < before);

    // a second generation of writes lands in the compacted capsule
    capsule.create_directory(&path("second-write")).unwrap();
    for i in 0..4 {
        let at = format!("second-write/file-{i}.bin");
        capsule.create_file(&path(&at)).unwrap();
        write_content(&capsule, &at, &vec![0xF0 + i as u8; 512]);
    }
    capsule.close().unwrap();

    let reopened = Capsule::open(&store).unwrap();
    for i in 0..12 {
        assert!(reopened
            .open_node(&path(&format!("docs/file-{i}.bin")))
            .unwrap()
            .is_none());
    }
    for i in 12..16 {
        assert_eq!(
            read_content(&reopened, &format!("docs/file-{i}.bin")),
            contents[i]
        );
    }
    for i in 0..4 {
        assert_eq!(
            read_content(&reopened, &format!("second-write/file-{i}.bin")),
            vec![0xF0 + i as u8; 512]
        );
    }
}
