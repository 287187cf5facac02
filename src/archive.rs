#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fs::File, io, path::Path};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};
use zip::ZipArchive;

use crate::util::scan_dir;

/// Suffix appended when a plain file occupies the name an archive should
/// expand into.
const RENAMED_SUFFIX: &str = "-renamed";

/// Expands every zip archive in each listed student directory under
/// `assignment_dir`. Missing student directories are skipped silently; a
/// missing assignment directory aborts the stage.
pub fn expand_assignment(assignment_dir: &Path, netids: &[String]) -> Result<()> {
    if !assignment_dir.is_dir() {
        bail!(
            "Could not find directory {} for downloaded files",
            assignment_dir.display()
        );
    }
    for netid in netids {
        let user_dir = assignment_dir.join(netid);
        if user_dir.is_dir() {
            expand_all(&user_dir)?;
        }
    }
    Ok(())
}

/// Finds every `*.zip` directly inside `dir` and expands each one. Archives
/// whose target subdirectory already exists are skipped, so repeated runs
/// are no-ops.
pub fn expand_all(dir: &Path) -> Result<()> {
    let zips = scan_dir(dir, |name| {
        name.ends_with(".zip") && dir.join(name).is_file()
    })?;
    for name in zips {
        expand_archive(&dir.join(&name), dir)?;
    }
    Ok(())
}

/// Expands one archive into `target_dir`, expecting the archive to produce
/// a `<stem>/` subdirectory. When extraction produces anything else, the
/// expected directory is created (renaming any plain file squatting on the
/// name) and the archive re-extracted directly into it.
pub fn expand_archive(zip_path: &Path, target_dir: &Path) -> Result<()> {
    let stem = zip_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .with_context(|| format!("Archive {} has no usable name", zip_path.display()))?;
    let expected_dir = target_dir.join(stem);
    if expected_dir.is_dir() {
        info!("--> Skipping {}, subdirectory exists", zip_path.display());
        return Ok(());
    }

    info!("--> Unzipping {} to {}", zip_path.display(), target_dir.display());
    extract_into(zip_path, target_dir)?;

    if expected_dir.is_dir() {
        return Ok(());
    }
    warn!(
        "Unzipped {}, but could not find directory {} for the files",
        zip_path.display(),
        expected_dir.display()
    );
    if expected_dir.is_file() {
        let renamed = target_dir.join(format!("{stem}{RENAMED_SUFFIX}"));
        std::fs::rename(&expected_dir, &renamed)
            .with_context(|| format!("Could not move {} aside", expected_dir.display()))?;
    }
    std::fs::create_dir(&expected_dir)
        .with_context(|| format!("Could not create {}", expected_dir.display()))?;
    warn!("Creating new directory {} to extract the zip file", expected_dir.display());
    extract_into(zip_path, &expected_dir)
}

/// Extracts every entry of `zip_path` under `dest`. Entry names that could
/// escape `dest` are rejected.
fn extract_into(zip_path: &Path, dest: &Path) -> Result<()> {
    let file =
        File::open(zip_path).with_context(|| format!("Could not open {}", zip_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("{} is not a valid zip archive", zip_path.display()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("Could not read entry {index} of {}", zip_path.display()))?;
        let raw_name = entry.name().to_string();

        if raw_name.contains("..") || raw_name.starts_with('/') || raw_name.contains('\\') {
            bail!("Invalid file path in zip: {raw_name}");
        }

        let out_path = dest.join(&raw_name);
        if raw_name.ends_with('/') {
            std::fs::create_dir_all(&out_path)
                .with_context(|| format!("Could not create {}", out_path.display()))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        let mut out = File::create(&out_path)
            .with_context(|| format!("Could not create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Could not extract {}", out_path.display()))?;
    }
    Ok(())
}
