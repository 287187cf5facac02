use std::{fs, io::Write, path::Path, path::PathBuf};

use jolly::archive::{expand_all, expand_archive};
use uuid::Uuid;
use zip::{ZipWriter, write::SimpleFileOptions};

fn temp_root() -> PathBuf {
    let root = std::env::temp_dir().join(format!("jolly-archive-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).expect("create temp root");
    root
}

fn make_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = fs::File::create(path).expect("create zip");
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(name.trim_end_matches('/'), options).expect("add directory");
        } else {
            writer.start_file(*name, options).expect("start entry");
            writer.write_all(content.as_bytes()).expect("write entry");
        }
    }
    writer.finish().expect("finish zip");
}

#[test]
fn extracts_archive_into_named_subdirectory() {
    let root = temp_root();
    make_zip(
        &root.join("proj.zip"),
        &[("proj/", ""), ("proj/main.c", "int main() { return 0; }\n")],
    );

    expand_all(&root).expect("expand");

    let extracted = root.join("proj").join("main.c");
    let content = fs::read_to_string(&extracted).expect("read extracted file");
    assert!(content.contains("int main"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn second_extraction_is_a_noop() {
    let root = temp_root();
    make_zip(&root.join("proj.zip"), &[("proj/", ""), ("proj/main.c", "v1\n")]);

    expand_all(&root).expect("first expand");
    fs::write(root.join("proj").join("graded.txt"), "kept").expect("write sentinel");

    expand_all(&root).expect("second expand");
    assert!(root.join("proj").join("graded.txt").is_file());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn flat_archive_is_retried_into_the_expected_directory() {
    let root = temp_root();
    make_zip(&root.join("flat.zip"), &[("notes.txt", "flat layout\n")]);

    expand_archive(&root.join("flat.zip"), &root).expect("expand");

    let retried = root.join("flat").join("notes.txt");
    let content = fs::read_to_string(&retried).expect("read retried file");
    assert!(content.contains("flat layout"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn file_squatting_on_the_target_name_is_moved_aside() {
    let root = temp_root();
    fs::write(root.join("proj"), "I am in the way").expect("write squatter");
    make_zip(&root.join("proj.zip"), &[("inner.txt", "payload\n")]);

    expand_archive(&root.join("proj.zip"), &root).expect("expand");

    assert!(root.join("proj").is_dir());
    assert!(root.join("proj").join("inner.txt").is_file());
    assert!(root.join("proj-renamed").is_file());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn entries_escaping_the_target_are_rejected() {
    let root = temp_root();
    let inner = root.join("inner");
    fs::create_dir_all(&inner).expect("create inner");
    make_zip(&inner.join("evil.zip"), &[("../escaped.txt", "nope")]);

    assert!(expand_archive(&inner.join("evil.zip"), &inner).is_err());
    assert!(!root.join("escaped.txt").exists());

    let _ = fs::remove_dir_all(root);
}
