use std::{path::PathBuf, time::Duration};

use jolly::config::{ConfigError, ConfigOverlay, ConfigState};

fn overlay_from(text: &str) -> ConfigOverlay {
    ConfigOverlay::from_toml(PathBuf::from("jolly.toml"), text).expect("parse overlay")
}

#[test]
fn defaults_cover_every_field() {
    let cfg = ConfigState::from_overlay(ConfigOverlay::default()).expect("build config");

    assert!(cfg.canvas_api().ends_with("/api/v1/"));
    assert_eq!(cfg.test_timeout(), Duration::from_secs(10));
    assert_eq!(cfg.mail_delay(), Duration::from_secs(15));
    assert_eq!(cfg.max_email_bytes(), 500_000);
    assert_eq!(cfg.test_log(), "jolly_testlog.txt");
    assert_eq!(cfg.email_file(), "jolly_toemail.txt");
    assert_eq!(cfg.email_sent_file(), "jolly_emailed.txt");
    assert!(!cfg.email_subject().is_empty());
    assert!(!cfg.intro_message().is_empty());
}

#[test]
fn overrides_win_over_defaults() {
    let cfg = ConfigState::from_overlay(overlay_from(
        r#"
            canvas_api = "https://canvas.example.edu/api/v1"
            canvas_token = "secret-token"
            email_domain = "example.edu"
            smtp_server = "smtp.example.edu"
            from_user = "grader"
            test_timeout_secs = 90
            mail_delay_secs = 1
            max_email_bytes = 1024
        "#,
    ))
    .expect("build config");

    // a missing trailing slash is repaired
    assert_eq!(cfg.canvas_api(), "https://canvas.example.edu/api/v1/");
    assert_eq!(cfg.canvas_token(), Some("secret-token"));
    assert_eq!(cfg.email_domain(), "example.edu");
    assert_eq!(cfg.smtp_server(), "smtp.example.edu");
    assert_eq!(cfg.from_user().as_deref(), Some("grader"));
    assert_eq!(cfg.test_timeout(), Duration::from_secs(90));
    assert_eq!(cfg.mail_delay(), Duration::from_secs(1));
    assert_eq!(cfg.max_email_bytes(), 1024);
}

#[test]
fn blank_tokens_count_as_absent() {
    let cfg = ConfigState::from_overlay(overlay_from(r#"canvas_token = "   ""#))
        .expect("build config");
    assert_eq!(cfg.canvas_token(), None);
}

#[test]
fn unknown_keys_are_rejected() {
    let result = ConfigOverlay::from_toml(
        PathBuf::from("jolly.toml"),
        r#"canvas_tokn = "typo""#,
    );
    assert!(matches!(result, Err(ConfigError::Unparseable { .. })));
}

#[test]
fn invalid_toml_is_reported_with_the_path() {
    let result = ConfigOverlay::from_toml(PathBuf::from("broken.toml"), "this is not = toml =");
    let err = result.expect_err("should fail");
    assert!(err.to_string().contains("broken.toml"));
}
