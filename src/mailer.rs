#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    io::{BufRead, BufReader},
    path::Path,
    sync::OnceLock,
};

use anyhow::{Context, Result, anyhow};
use lettre::{
    Message, SmtpTransport, Transport,
    message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use regex::Regex;
use tracing::{info, warn};

use crate::{
    config::ConfigHandle,
    constants::{EMAIL_TRUNCATE_LINES, NAME_MARKER_PREFIX, NETID_MARKER_PREFIX},
    util::scan_dir,
};

/// Notice appended in place of the tail of an oversized log.
const TRUNCATION_NOTICE: &str = "\n\n The log file is too large. It has been truncated! \n";

/// Who a student directory belongs to, recovered from the identity marker
/// files the download stage wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Student netid, from `jolly_netid_<netid>.txt`.
    pub netid: String,
    /// Display name with underscores restored to spaces, from
    /// `jolly_name_<name>.txt`. Absent when no name marker exists.
    pub name:  Option<String>,
}

impl Identity {
    /// The name used in the greeting: the first word of the display name.
    pub fn greeting_name(&self) -> Option<&str> {
        self.name.as_deref().and_then(|name| name.split_whitespace().next())
    }
}

/// Returns the compiled netid marker regex, built on first use.
fn netid_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!("^{NETID_MARKER_PREFIX}(.+)\\.txt$")).expect("netid marker pattern")
    })
}

/// Returns the compiled name marker regex, built on first use.
fn name_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!("^{NAME_MARKER_PREFIX}(.+)\\.txt$")).expect("name marker pattern")
    })
}

/// Reads the student's identity back out of the marker files in their
/// directory. Fails when no netid marker is present.
pub fn identity_from_markers(dir: &Path) -> Result<Identity> {
    let entries = scan_dir(dir, |_| true)?;

    let netid = entries
        .iter()
        .find_map(|entry| netid_marker_regex().captures(entry))
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| {
            anyhow!("No {NETID_MARKER_PREFIX}*.txt marker in {}", dir.display())
        })?;
    let name = entries
        .iter()
        .find_map(|entry| name_marker_regex().captures(entry))
        .map(|caps| caps[1].replace('_', " "));

    Ok(Identity { netid, name })
}

/// Reads the log to send, truncating to the first
/// [`EMAIL_TRUNCATE_LINES`] lines when the file exceeds `max_bytes`.
/// Returns the body text and whether it was truncated.
pub fn read_log_body(path: &Path, max_bytes: u64) -> Result<(String, bool)> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("The file to send {} could not be found. Did you run any tests?", path.display()))?
        .len();

    if size < max_bytes {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        return Ok((body, false));
    }

    let file = std::fs::File::open(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    let mut body: String = BufReader::new(file)
        .lines()
        .take(EMAIL_TRUNCATE_LINES)
        .collect::<Result<Vec<String>, _>>()
        .with_context(|| format!("Could not read {}", path.display()))?
        .join("\n");
    body.push_str(TRUNCATION_NOTICE);
    Ok((body, true))
}

/// Assembles the text body: greeting, configured introduction, a separator
/// recording sender/recipient/time, then the log itself.
pub fn compose_body(
    intro_message: &str,
    greeting_name: Option<&str>,
    from: &str,
    to: &str,
    log_text: &str,
) -> String {
    let greeting = match greeting_name {
        Some(name) => format!("Hi {name},"),
        None => "Hi,".to_string(),
    };
    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    format!(
        "\n{greeting}\n{intro_message}\n* Start: Sent from {from} to {to} on \
         {stamp}\n==================================================\n{log_text}"
    )
}

/// Builds the outgoing message: multipart/alternative with a plain part
/// and the same text wrapped in `<div><pre>` as HTML, plus an optional
/// binary attachment.
pub fn compose_message(
    from: Mailbox,
    to: Mailbox,
    subject: &str,
    body: &str,
    attachment: Option<(String, Vec<u8>)>,
) -> Result<Message> {
    let alternative = MultiPart::alternative()
        .singlepart(SinglePart::plain(body.to_string()))
        .singlepart(SinglePart::html(format!("<div><pre>\n{body}\n</pre></div>\n")));

    let builder = Message::builder().from(from).to(to).subject(subject);
    let message = match attachment {
        Some((filename, bytes)) => {
            let content_type =
                ContentType::parse("application/pdf").context("attachment content type")?;
            builder.multipart(
                MultiPart::mixed()
                    .multipart(alternative)
                    .singlepart(Attachment::new(filename).body(bytes, content_type)),
            )
        }
        None => builder.multipart(alternative),
    };
    message.context("Could not assemble the email message")
}

/// Builds the SMTP transport: STARTTLS to the configured relay on the
/// submission port, with LOGIN credentials when a password was supplied.
pub fn build_transport(cfg: &ConfigHandle, password: Option<&str>) -> Result<SmtpTransport> {
    let relay = SmtpTransport::starttls_relay(cfg.smtp_server())
        .with_context(|| format!("The smtpserver {} could not be resolved", cfg.smtp_server()))?;
    let transport = match password {
        Some(password) => {
            let user = cfg
                .from_user()
                .context("No login user configured for SMTP authentication")?;
            relay.credentials(Credentials::new(user, password.to_string())).build()
        }
        None => relay.build(),
    };
    Ok(transport)
}

/// Sends one student their feedback log. Returns whether a message was
/// actually transmitted; a student already covered by the guard file, or
/// one whose directory cannot produce a valid message, yields `Ok(false)`
/// with a diagnostic rather than an error.
pub fn send_feedback(
    student_dir: &Path,
    subject: &str,
    file_to_send: Option<&str>,
    file_to_attach: Option<&Path>,
    transport: &SmtpTransport,
    cfg: &ConfigHandle,
) -> Result<bool> {
    let guard_path = student_dir.join(cfg.email_sent_file());
    let identity = identity_from_markers(student_dir)?;
    let to_email = format!("{}@{}", identity.netid, cfg.email_domain());
    if guard_path.is_file() {
        info!("Skipping, already sent email to {to_email}");
        return Ok(false);
    }

    let login = cfg
        .from_user()
        .context("Could not determine the From address; set `from_user` in jolly.toml")?;
    let from_email = format!("{}@{}", login, cfg.email_domain());
    let from: Mailbox = format!("{login} <{from_email}>")
        .parse()
        .map_err(|err| anyhow!("Check email address from:{from_email}: {err}"))?;
    let to: Mailbox = match &identity.name {
        Some(name) => format!("{name} <{to_email}>"),
        None => format!("<{to_email}>"),
    }
    .parse()
    .map_err(|err| anyhow!("Check email address to:{to_email}: {err}"))?;

    let log_path = match file_to_send {
        Some(name) => {
            let candidate = crate::util::expand_path(name);
            if candidate.is_absolute() && candidate.is_file() {
                candidate
            } else {
                student_dir.join(name)
            }
        }
        None => student_dir.join(cfg.email_file()),
    };
    let (log_text, truncated) = read_log_body(&log_path, cfg.max_email_bytes())?;
    if truncated {
        warn!("Log {} was truncated before mailing", log_path.display());
    }

    let body = compose_body(
        cfg.intro_message(),
        identity.greeting_name(),
        &from_email,
        &to_email,
        &log_text,
    );

    let attachment = match file_to_attach {
        Some(path) => match std::fs::read(path) {
            Ok(bytes) => {
                let filename = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "attachment".to_string());
                Some((filename, bytes))
            }
            Err(err) => {
                warn!("Email attachment {} is not found: {err}", path.display());
                None
            }
        },
        None => None,
    };

    let message = compose_message(from.clone(), to.clone(), subject, &body, attachment)?;

    // The saved copy is written before transmission and doubles as the
    // guard file, so a failed send is never retried automatically.
    let saved = format!("From: {from}\nTo: {to}\nSubject: {subject}\n\n{body}");
    std::fs::write(&guard_path, saved)
        .with_context(|| format!("Could not write {}", guard_path.display()))?;

    info!("Sending mail to {to}");
    match transport.send(&message) {
        Ok(_) => Ok(true),
        Err(err) => {
            warn!("Could not send email: {err}");
            warn!("Did you use --pfile with '-' for interactive or with a file name?");
            Ok(false)
        }
    }
}
