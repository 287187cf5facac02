#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    canvas::{Assignment, CanvasClient, User},
    config::ConfigHandle,
    constants::{DOWNLOADED_MARKER, NAME_MARKER_PREFIX, NETID_MARKER_PREFIX},
    util::sanitize,
};

/// Creates `target` if it does not already exist. A failure here is
/// reported and aborts the download stage for the affected directory.
pub fn mkdir_if_needed(target: &Path) -> Result<()> {
    if target.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(target)
        .with_context(|| format!("Failed to make directory {}, check permissions", target.display()))
}

/// Creates an empty marker file unless it already exists.
fn write_marker(path: &Path) -> Result<()> {
    if path.is_file() {
        return Ok(());
    }
    std::fs::write(path, "").with_context(|| format!("Failed to create file {}", path.display()))
}

/// Writes the identity markers for a student directory:
/// `jolly_netid_<netid>.txt` and `jolly_name_<sanitized name>.txt`. The
/// mailer later reads the student's address and greeting back out of these.
pub fn write_user_details(dir: &Path, netid: &str, name: &str) -> Result<()> {
    write_marker(&dir.join(format!("{NETID_MARKER_PREFIX}{netid}.txt")))?;
    write_marker(&dir.join(format!("{NAME_MARKER_PREFIX}{}.txt", sanitize(name))))
}

/// Whether an attachment still needs to be fetched. Presence is keyed on
/// filename only; content is never compared, so a resubmission under the
/// same name is skipped.
pub fn needs_download(dir: &Path, filename: &str) -> bool {
    !dir.join(filename).is_file()
}

/// Appends one line to the student's rolling log, creating it if needed.
fn log_line(log_path: &Path, line: &str) -> Result<()> {
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Could not open log {}", log_path.display()))?;
    writeln!(log, "{line}").with_context(|| format!("Could not write to {}", log_path.display()))
}

/// Downloads one student's attachments into their directory. Returns true
/// when the student had a submission (whether or not anything new was
/// fetched). Writes the downloaded marker after each fetched attachment.
async fn fetch_user_files(
    client: &CanvasClient,
    assignment: &Assignment,
    user: &User,
    user_dir: &Path,
    log_name: &str,
) -> Result<bool> {
    let Some(submission) = assignment.submissions.get(&user.netid) else {
        return Ok(false);
    };
    mkdir_if_needed(user_dir)?;
    let log_path = user_dir.join(log_name);

    for attachment in &submission.attachments {
        if !needs_download(user_dir, &attachment.filename) {
            info!(
                "For ({}) {}, already downloaded {}",
                user.netid, user.name, attachment.filename
            );
            continue;
        }
        info!("For ({}) {}, downloading {}", user.netid, user.name, attachment.filename);

        let bytes = client.download_bytes(&attachment.url).await?;
        let final_path = user_dir.join(&attachment.filename);
        persist_bytes(&bytes, user_dir, &final_path)?;

        write_marker(&user_dir.join(DOWNLOADED_MARKER))?;
        log_line(&log_path, &format!("Downloaded {}", attachment.filename))?;
    }
    Ok(true)
}

/// Writes `bytes` to a temporary file in `dir`, then moves it into place.
/// A crash mid-download never leaves a half-written attachment behind.
fn persist_bytes(bytes: &[u8], dir: &Path, final_path: &Path) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Could not create a temporary file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("Could not write download for {}", final_path.display()))?;
    tmp.persist(final_path)
        .with_context(|| format!("Failed to create {}", final_path.display()))?;
    Ok(())
}

/// Downloads every selected user's submission for `assignment` into
/// `<sanitized assignment name>/<netid>/`. Users without submissions are
/// reported; with `create_empty` their directories are created and marked
/// anyway. Returns whether the assignment directory could be created.
pub async fn download(
    client: &CanvasClient,
    assignment: &Assignment,
    users: &[User],
    create_empty: bool,
    cfg: &ConfigHandle,
) -> Result<bool> {
    let target_dir = assignment_dir(&assignment.name);
    if let Err(err) = mkdir_if_needed(&target_dir) {
        warn!("{err:#}");
        return Ok(false);
    }
    info!("Created assignment directory {}", target_dir.display());

    let mut nothing_for: Vec<&User> = Vec::new();
    for user in users {
        let user_dir = target_dir.join(&user.netid);
        let had_submission =
            match fetch_user_files(client, assignment, user, &user_dir, cfg.test_log()).await {
                Ok(had) => had,
                Err(err) => {
                    warn!("Could not download files for ({}) {}: {err:#}", user.netid, user.name);
                    false
                }
            };

        if had_submission {
            write_user_details(&user_dir, &user.netid, &user.name)?;
        } else if create_empty {
            if mkdir_if_needed(&user_dir).is_err() {
                continue;
            }
            write_user_details(&user_dir, &user.netid, &user.name)?;
            std::fs::write(user_dir.join(cfg.test_log()), "")
                .with_context(|| format!("Failed to create log in {}", user_dir.display()))?;
            nothing_for.push(user);
        } else {
            nothing_for.push(user);
        }
    }

    for user in nothing_for {
        info!("No files to download for ({}) {}", user.netid, user.name);
    }
    Ok(true)
}

/// Absolute path of the sanitized assignment directory under the current
/// working directory.
pub fn assignment_dir(assignment_name: &str) -> PathBuf {
    crate::util::expand_path(&sanitize(assignment_name))
}
