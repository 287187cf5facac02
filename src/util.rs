#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result};
use regex::Regex;
use which::which;

/// Characters outside this class are collapsed when sanitizing names for
/// use as directory entries.
const SANITIZE_PATTERN: &str = r"[^0-9a-zA-Z_-]+";

/// Pattern a directory entry must match to be treated as a student netid.
const NETID_PATTERN: &str = r"^[a-z]+[a-z0-9]+$";

/// Returns the compiled sanitize regex, built on first use.
fn sanitize_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SANITIZE_PATTERN).expect("sanitize pattern is valid"))
}

/// Returns the compiled netid regex, built on first use.
fn netid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NETID_PATTERN).expect("netid pattern is valid"))
}

/// Replaces every run of characters that are not alphanumeric, underscore,
/// or dash with a single underscore. Assignment names and student display
/// names pass through this before becoming directory entries.
pub fn sanitize(text: &str) -> String {
    sanitize_regex().replace_all(text, "_").into_owned()
}

/// Returns true if `name` looks like a student netid.
pub fn is_netid(name: &str) -> bool {
    netid_regex().is_match(name)
}

/// Lists entry names in `dir` that satisfy `keep`, sorted for stable
/// iteration order. The predicate receives the bare file name.
pub fn scan_dir(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Could not read directory {}", dir.display()))?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| keep(name))
        .collect();
    names.sort();
    Ok(names)
}

/// Returns the netid-shaped subdirectories of an assignment directory,
/// sorted. This is how the student set is resolved when no netids are given
/// on the command line.
pub fn netids_in(assignment_dir: &Path) -> Result<Vec<String>> {
    scan_dir(assignment_dir, |name| {
        is_netid(name) && assignment_dir.join(name).is_dir()
    })
}

/// Returns the directory holding the `jolly` binary and its bundled helper
/// files. Test scripts receive this path so they can locate shared helpers.
/// Falls back to the running executable's directory, then to `.`.
pub fn jolly_home() -> PathBuf {
    let binary = which("jolly").or_else(|_| std::env::current_exe());
    match binary {
        Ok(path) => path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".")),
        Err(_) => PathBuf::from("."),
    }
}

/// Expands a leading `~` and returns an absolute path.
pub fn expand_path(raw: &str) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = PathBuf::from(expanded.as_ref());
    std::path::absolute(&path).unwrap_or(path)
}

/// Returns true when the file at `path` has any execute bit set. Test
/// scripts without one are skipped with a diagnostic rather than run.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// On non-unix targets every regular file is considered executable.
#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}
