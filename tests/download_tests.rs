use std::{fs, path::PathBuf};

use jolly::download::{mkdir_if_needed, needs_download, write_user_details};
use uuid::Uuid;

fn temp_root() -> PathBuf {
    let root = std::env::temp_dir().join(format!("jolly-download-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).expect("create temp root");
    root
}

#[test]
fn present_files_are_not_downloaded_again() {
    let root = temp_root();
    assert!(needs_download(&root, "hw1.zip"));

    // presence is keyed on the filename alone; content is never compared
    fs::write(root.join("hw1.zip"), "stale bytes").expect("write file");
    assert!(!needs_download(&root, "hw1.zip"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn identity_markers_use_the_sanitized_name() {
    let root = temp_root();
    write_user_details(&root, "adal", "Ada Lovelace").expect("write details");

    assert!(root.join("jolly_netid_adal.txt").is_file());
    assert!(root.join("jolly_name_Ada_Lovelace.txt").is_file());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn mkdir_is_idempotent() {
    let root = temp_root();
    let target = root.join("ass1").join("adal");

    mkdir_if_needed(&target).expect("first mkdir");
    mkdir_if_needed(&target).expect("second mkdir");
    assert!(target.is_dir());

    let _ = fs::remove_dir_all(root);
}
