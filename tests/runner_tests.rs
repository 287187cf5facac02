use std::{fs, path::Path, path::PathBuf, time::Duration};

use jolly::{
    constants::{DOWNLOADED_MARKER, TEST_LOG, TOEMAIL_FILE},
    runner::{Runner, matches_prefix, parse_prefixes},
};
use uuid::Uuid;

fn temp_root() -> PathBuf {
    let root = std::env::temp_dir().join(format!("jolly-runner-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).expect("create temp root");
    root
}

fn make_student(assignment_dir: &Path, netid: &str, downloaded: bool) -> PathBuf {
    let dir = assignment_dir.join(netid);
    fs::create_dir_all(&dir).expect("create student dir");
    if downloaded {
        fs::write(dir.join(DOWNLOADED_MARKER), "").expect("write marker");
    }
    dir
}

#[cfg(unix)]
fn write_script(path: &Path, body: &str, executable: bool) {
    use std::os::unix::fs::PermissionsExt;
    fs::write(path, body).expect("write script");
    let mode = if executable { 0o755 } else { 0o644 };
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).expect("set permissions");
}

fn runner_for(assignment_dir: &Path, test_dir: &Path, netids: &[&str]) -> Runner {
    Runner::builder()
        .netids(netids.iter().map(|n| n.to_string()).collect())
        .assignment_dir(assignment_dir.to_path_buf())
        .test_dir(test_dir.to_path_buf())
        .timeout(Duration::from_secs(5))
        .build()
}

#[tokio::test]
#[cfg(unix)]
async fn only_marked_students_are_tested() {
    let root = temp_root();
    let assignment_dir = root.join("ass1");
    let alice = make_student(&assignment_dir, "alice", true);
    let bob = make_student(&assignment_dir, "bob", false);
    let test_dir = root.join("tests");
    fs::create_dir_all(&test_dir).expect("create test dir");
    write_script(&test_dir.join("test_hello"), "#!/bin/sh\necho hello from test\n", true);

    let runner = runner_for(&assignment_dir, &test_dir, &["alice", "bob"]);
    runner.run_all().await.expect("run tests");

    let log = fs::read_to_string(alice.join(TEST_LOG)).expect("read alice log");
    assert!(log.contains("Starting tests:"));
    assert!(log.contains("hello from test"));
    assert!(log.contains("Finished tests:"));
    assert!(alice.join(TOEMAIL_FILE).is_file());

    assert!(!bob.join(TEST_LOG).exists());
    assert!(!bob.join(TOEMAIL_FILE).exists());

    let _ = fs::remove_dir_all(root);
}

#[tokio::test]
#[cfg(unix)]
async fn rerun_truncates_previous_log() {
    let root = temp_root();
    let assignment_dir = root.join("ass1");
    let alice = make_student(&assignment_dir, "alice", true);
    let test_dir = root.join("tests");
    fs::create_dir_all(&test_dir).expect("create test dir");
    write_script(&test_dir.join("test_hello"), "#!/bin/sh\necho once\n", true);

    let runner = runner_for(&assignment_dir, &test_dir, &["alice"]);
    runner.run_all().await.expect("first pass");
    runner.run_all().await.expect("second pass");

    let log = fs::read_to_string(alice.join(TEST_LOG)).expect("read log");
    assert_eq!(log.matches("Starting tests:").count(), 1);
    assert_eq!(log.matches("once").count(), 1);

    let _ = fs::remove_dir_all(root);
}

#[tokio::test]
#[cfg(unix)]
async fn nonzero_exit_does_not_stop_remaining_tests() {
    let root = temp_root();
    let assignment_dir = root.join("ass1");
    let alice = make_student(&assignment_dir, "alice", true);
    let test_dir = root.join("tests");
    fs::create_dir_all(&test_dir).expect("create test dir");
    write_script(&test_dir.join("test_a"), "#!/bin/sh\necho output from a\nexit 2\n", true);
    write_script(&test_dir.join("test_b"), "#!/bin/sh\necho output from b\n", true);

    let runner = runner_for(&assignment_dir, &test_dir, &["alice"]);
    runner.run_all().await.expect("run tests");

    let log = fs::read_to_string(alice.join(TEST_LOG)).expect("read log");
    let pos_a = log.find("output from a").expect("test_a output logged");
    let pos_b = log.find("output from b").expect("test_b output logged");
    assert!(pos_a < pos_b);

    let _ = fs::remove_dir_all(root);
}

#[tokio::test]
#[cfg(unix)]
async fn timeout_is_logged_and_isolated() {
    let root = temp_root();
    let assignment_dir = root.join("ass1");
    let alice = make_student(&assignment_dir, "alice", true);
    let test_dir = root.join("tests");
    fs::create_dir_all(&test_dir).expect("create test dir");
    write_script(&test_dir.join("test_a_hangs"), "#!/bin/sh\nsleep 30\n", true);
    write_script(&test_dir.join("test_b_quick"), "#!/bin/sh\necho quick ran\n", true);

    let runner = Runner::builder()
        .netids(vec!["alice".to_string()])
        .assignment_dir(assignment_dir.clone())
        .test_dir(test_dir.clone())
        .timeout(Duration::from_secs(1))
        .build();
    runner.run_all().await.expect("run tests");

    let log = fs::read_to_string(alice.join(TEST_LOG)).expect("read log");
    assert!(log.contains("ALERT: Ran out of time"));
    assert!(log.contains("quick ran"));

    let _ = fs::remove_dir_all(root);
}

#[tokio::test]
#[cfg(unix)]
async fn non_executable_test_files_are_skipped() {
    let root = temp_root();
    let assignment_dir = root.join("ass1");
    let alice = make_student(&assignment_dir, "alice", true);
    let test_dir = root.join("tests");
    fs::create_dir_all(&test_dir).expect("create test dir");
    write_script(&test_dir.join("test_runs"), "#!/bin/sh\necho exec ran\n", true);
    write_script(&test_dir.join("test_skipped"), "#!/bin/sh\necho noexec ran\n", false);

    let runner = runner_for(&assignment_dir, &test_dir, &["alice"]);
    runner.run_all().await.expect("run tests");

    let log = fs::read_to_string(alice.join(TEST_LOG)).expect("read log");
    assert!(log.contains("exec ran"));
    assert!(!log.contains("noexec ran"));

    let _ = fs::remove_dir_all(root);
}

#[tokio::test]
#[cfg(unix)]
async fn discovery_filters_by_prefix_in_stable_order() {
    let root = temp_root();
    let assignment_dir = root.join("ass1");
    make_student(&assignment_dir, "alice", true);
    let test_dir = root.join("tests");
    fs::create_dir_all(&test_dir).expect("create test dir");
    write_script(&test_dir.join("test_zeta"), "#!/bin/sh\n", true);
    write_script(&test_dir.join("test_alpha"), "#!/bin/sh\n", true);
    write_script(&test_dir.join("check_style"), "#!/bin/sh\n", true);
    write_script(&test_dir.join("README"), "not a test\n", false);

    let runner = Runner::builder()
        .netids(vec!["alice".to_string()])
        .assignment_dir(assignment_dir.clone())
        .test_dir(test_dir.clone())
        .prefixes(parse_prefixes("test_,check_"))
        .build();

    let found = runner.discover_tests().expect("discover");
    assert_eq!(found, vec!["check_style", "test_alpha", "test_zeta"]);

    let _ = fs::remove_dir_all(root);
}

#[tokio::test]
async fn empty_student_set_aborts() {
    let root = temp_root();
    let test_dir = root.join("tests");
    fs::create_dir_all(&test_dir).expect("create test dir");

    let runner = runner_for(&root.join("ass1"), &test_dir, &[]);
    assert!(runner.run_all().await.is_err());

    let _ = fs::remove_dir_all(root);
}

#[tokio::test]
async fn missing_test_directory_aborts() {
    let root = temp_root();
    let assignment_dir = root.join("ass1");
    make_student(&assignment_dir, "alice", true);

    let runner = runner_for(&assignment_dir, &root.join("no-such-dir"), &["alice"]);
    assert!(runner.run_all().await.is_err());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn prefix_parsing_defaults_and_splits() {
    assert_eq!(parse_prefixes(""), vec!["test_".to_string()]);
    assert_eq!(parse_prefixes(" , "), vec!["test_".to_string()]);
    assert_eq!(
        parse_prefixes("test_cpplint,test_cppcheck"),
        vec!["test_cpplint".to_string(), "test_cppcheck".to_string()]
    );

    let prefixes = parse_prefixes("test_,check_");
    assert!(matches_prefix("test_io", &prefixes));
    assert!(matches_prefix("check_style", &prefixes));
    assert!(!matches_prefix("README", &prefixes));
}
