use std::{fs, path::PathBuf};

use jolly::{
    config::{ConfigHandle, ConfigOverlay, ConfigState},
    constants::{EMAILED_FILE, TOEMAIL_FILE},
    mailer::{
        build_transport, compose_body, compose_message, identity_from_markers, read_log_body,
        send_feedback,
    },
};
use uuid::Uuid;

fn temp_root() -> PathBuf {
    let root = std::env::temp_dir().join(format!("jolly-mailer-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).expect("create temp root");
    root
}

fn test_cfg() -> ConfigHandle {
    let overlay = ConfigOverlay::from_toml(
        PathBuf::from("test.toml"),
        r#"
            email_domain = "example.edu"
            smtp_server = "localhost"
            from_user = "grader"
            intro_message = "Automated feedback is below."
            mail_delay_secs = 0
        "#,
    )
    .expect("parse overlay");
    ConfigHandle::from_state(ConfigState::from_overlay(overlay).expect("build config"))
}

fn marked_student_dir(root: &PathBuf, netid: &str, name: &str) -> PathBuf {
    let dir = root.join(netid);
    fs::create_dir_all(&dir).expect("create student dir");
    fs::write(dir.join(format!("jolly_netid_{netid}.txt")), "").expect("netid marker");
    fs::write(dir.join(format!("jolly_name_{name}.txt")), "").expect("name marker");
    dir
}

#[test]
fn identity_round_trips_through_the_markers() {
    let root = temp_root();
    let dir = marked_student_dir(&root, "adal", "Ada_Lovelace");

    let identity = identity_from_markers(&dir).expect("read identity");
    assert_eq!(identity.netid, "adal");
    assert_eq!(identity.name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(identity.greeting_name(), Some("Ada"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn missing_netid_marker_is_an_error() {
    let root = temp_root();
    let dir = root.join("unmarked");
    fs::create_dir_all(&dir).expect("create dir");

    assert!(identity_from_markers(&dir).is_err());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn small_logs_are_sent_whole() {
    let root = temp_root();
    let log = root.join("log.txt");
    fs::write(&log, "line one\nline two\n").expect("write log");

    let (body, truncated) = read_log_body(&log, 500_000).expect("read body");
    assert!(!truncated);
    assert_eq!(body, "line one\nline two\n");

    let _ = fs::remove_dir_all(root);
}

#[test]
fn oversized_logs_are_truncated_with_a_notice() {
    let root = temp_root();
    let log = root.join("log.txt");
    fs::write(&log, "first\nsecond\nthird\n").expect("write log");

    let (body, truncated) = read_log_body(&log, 1).expect("read body");
    assert!(truncated);
    assert!(body.contains("first"));
    assert!(body.contains("truncated"));

    let _ = fs::remove_dir_all(root);
}

#[test]
fn missing_log_is_an_error() {
    let root = temp_root();
    assert!(read_log_body(&root.join("absent.txt"), 500_000).is_err());
    let _ = fs::remove_dir_all(root);
}

#[test]
fn body_carries_greeting_intro_and_log() {
    let body = compose_body(
        "Intro text.",
        Some("Ada"),
        "grader@example.edu",
        "adal@example.edu",
        "all tests passed\n",
    );
    assert!(body.contains("Hi Ada,"));
    assert!(body.contains("Intro text."));
    assert!(body.contains("Sent from grader@example.edu to adal@example.edu"));
    assert!(body.contains("all tests passed"));

    let anonymous = compose_body("Intro.", None, "a@b.edu", "c@b.edu", "log");
    assert!(anonymous.contains("Hi,"));
}

#[test]
fn message_has_plain_and_html_alternatives() {
    let message = compose_message(
        "grader <grader@example.edu>".parse().expect("from"),
        "Ada Lovelace <adal@example.edu>".parse().expect("to"),
        "CSS 132 - ass1 - feedback",
        "the log body",
        None,
    )
    .expect("compose");

    let rendered = String::from_utf8_lossy(&message.formatted()).into_owned();
    assert!(rendered.contains("multipart/alternative"));
    assert!(rendered.contains("text/plain"));
    assert!(rendered.contains("text/html"));
    assert!(rendered.contains("CSS 132 - ass1 - feedback"));
}

#[test]
fn attachments_ride_along_as_a_mixed_part() {
    let message = compose_message(
        "grader <grader@example.edu>".parse().expect("from"),
        "<adal@example.edu>".parse().expect("to"),
        "feedback",
        "body",
        Some(("rubric.pdf".to_string(), vec![1, 2, 3, 4])),
    )
    .expect("compose");

    let rendered = String::from_utf8_lossy(&message.formatted()).into_owned();
    assert!(rendered.contains("multipart/mixed"));
    assert!(rendered.contains("application/pdf"));
    assert!(rendered.contains("rubric.pdf"));
}

#[test]
fn guard_file_suppresses_a_second_send() {
    let root = temp_root();
    let cfg = test_cfg();
    let dir = marked_student_dir(&root, "adal", "Ada_Lovelace");
    fs::write(dir.join(TOEMAIL_FILE), "results\n").expect("write log");
    fs::write(dir.join(EMAILED_FILE), "already sent").expect("write guard");

    let transport = build_transport(&cfg, None).expect("build transport");
    let sent = send_feedback(&dir, "subject", None, None, &transport, &cfg).expect("send");
    assert!(!sent);
    // the guard is left untouched
    let guard = fs::read_to_string(dir.join(EMAILED_FILE)).expect("read guard");
    assert_eq!(guard, "already sent");

    let _ = fs::remove_dir_all(root);
}

#[test]
fn failed_transmission_still_writes_the_guard_copy() {
    let root = temp_root();
    let cfg = test_cfg();
    let dir = marked_student_dir(&root, "adal", "Ada_Lovelace");
    fs::write(dir.join(TOEMAIL_FILE), "results\n").expect("write log");

    // nothing listens on localhost:587, so the send is reported as failed
    let transport = build_transport(&cfg, None).expect("build transport");
    let sent = send_feedback(&dir, "the subject", None, None, &transport, &cfg).expect("send");
    assert!(!sent);

    let guard = fs::read_to_string(dir.join(EMAILED_FILE)).expect("read guard copy");
    assert!(guard.contains("Subject: the subject"));
    assert!(guard.contains("To:"));
    assert!(guard.contains("results"));

    let _ = fs::remove_dir_all(root);
}
