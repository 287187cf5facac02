#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    ffi::OsString,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use colored::Colorize;
use tracing::{info, warn};
use typed_builder::TypedBuilder;

use crate::{
    constants::{DEFAULT_TEST_PREFIX, DOWNLOADED_MARKER, JOLLYDIR_FLAG, TEST_LOG, TOEMAIL_FILE},
    process::{RunOutcome, run_logged},
    util::{is_executable, scan_dir},
};

/// Splits a comma-separated prefix list into its parts. An empty or
/// all-whitespace list falls back to the conventional `test_` prefix.
pub fn parse_prefixes(list: &str) -> Vec<String> {
    let prefixes: Vec<String> = list
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();
    if prefixes.is_empty() {
        vec![DEFAULT_TEST_PREFIX.to_string()]
    } else {
        prefixes
    }
}

/// Whether a directory entry counts as a test script: its name starts with
/// any of the given prefixes.
pub fn matches_prefix(name: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| name.starts_with(prefix))
}

/// Runs every discovered test script against every eligible student
/// directory, one student and one script at a time, collecting output into
/// a per-student log.
#[derive(Debug, TypedBuilder)]
pub struct Runner {
    /// Students to test; each must have a directory under
    /// `assignment_dir`.
    netids:         Vec<String>,
    /// Root directory holding one subdirectory per student.
    assignment_dir: PathBuf,
    /// Directory of candidate test scripts.
    test_dir:       PathBuf,
    /// Filename prefixes marking runnable scripts.
    #[builder(default = vec![DEFAULT_TEST_PREFIX.to_string()])]
    prefixes:       Vec<String>,
    /// Deadline for each individual script invocation.
    #[builder(default = Duration::from_secs(10))]
    timeout:        Duration,
    /// Name of the per-student rolling log.
    #[builder(default = TEST_LOG.to_string())]
    log_name:       String,
    /// Directory passed to each script via `--jollydir`, so scripts can
    /// locate shared helper files.
    #[builder(default = crate::util::jolly_home())]
    helper_dir:     PathBuf,
}

impl Runner {
    /// Lists the runnable test scripts, in the stable order they will be
    /// executed. Aborts when the test directory is missing or unreadable.
    pub fn discover_tests(&self) -> Result<Vec<String>> {
        if !self.test_dir.is_dir() {
            bail!("The test directory {} is not valid", self.test_dir.display());
        }
        scan_dir(&self.test_dir, |name| {
            matches_prefix(name, &self.prefixes) && self.test_dir.join(name).is_file()
        })
    }

    /// Runs the full pass: every discovered script against every eligible
    /// student. Individual script failures and timeouts are recorded and
    /// skipped over; only an empty student set or an unusable test
    /// directory abort the pass.
    pub async fn run_all(&self) -> Result<()> {
        if self.netids.is_empty() {
            bail!("No student directories to test");
        }
        let tests = self.discover_tests()?;
        info!("Test files found are: {:?}", tests);

        for netid in &self.netids {
            let student_dir = self.assignment_dir.join(netid);
            if !student_dir.join(DOWNLOADED_MARKER).is_file() {
                continue;
            }
            self.run_student(netid, &student_dir, &tests).await?;
        }
        Ok(())
    }

    /// Runs every test script for one student: truncates the log, stamps
    /// the start and finish times, and copies the finished log to the
    /// to-email file.
    async fn run_student(&self, netid: &str, student_dir: &Path, tests: &[String]) -> Result<()> {
        info!("Looking at {netid}");
        let log_path = student_dir.join(&self.log_name);

        // Truncate: each pass starts the log over.
        std::fs::write(&log_path, "")
            .with_context(|| format!("Could not reset log {}", log_path.display()))?;
        append_line(&log_path, &format!("Starting tests: {}\n", timestamp()))?;

        for test in tests {
            let test_path = self.test_dir.join(test);
            if !is_executable(&test_path) {
                warn!("testfile is not executable {}", test_path.display());
                continue;
            }
            self.run_one(&test_path, student_dir, &log_path).await?;
            // The script may have changed its own working directory; each
            // invocation gets the student directory anew, so nothing
            // carries over.
        }

        append_line(&log_path, &format!("Finished tests: {}\n\n\n", timestamp()))?;
        let toemail = student_dir.join(TOEMAIL_FILE);
        std::fs::copy(&log_path, &toemail)
            .with_context(|| format!("Could not copy log to {}", toemail.display()))?;
        Ok(())
    }

    /// Invokes one test script with the student directory as its working
    /// directory, output appended to the log, bounded by the configured
    /// timeout. Timeouts and non-zero exits are reported and never abort
    /// the pass.
    async fn run_one(&self, test_path: &Path, student_dir: &Path, log_path: &Path) -> Result<()> {
        let log = OpenOptions::new()
            .append(true)
            .open(log_path)
            .with_context(|| format!("Could not open log {}", log_path.display()))?;

        let args = [
            OsString::from(JOLLYDIR_FLAG),
            self.helper_dir.as_os_str().to_os_string(),
        ];

        match run_logged(test_path, &args, student_dir, &log, self.timeout).await {
            Ok(RunOutcome::Completed(status)) if status.success() => {
                println!("\t{} {}", "[Success]".green(), test_path.display());
            }
            Ok(RunOutcome::Completed(status)) => {
                let code = status.code().unwrap_or(-1);
                println!(
                    "\t{} {}",
                    format!("[Success with return code {code}]").yellow(),
                    test_path.display()
                );
                warn!("Subprocess returned {code} for command {}", test_path.display());
            }
            Ok(RunOutcome::TimedOut) => {
                let alert = format!(
                    "ALERT: Ran out of time when running {}\nALERT: Possible cause waiting for \
                     keyboard input\nALERT: Possible cause infinite loop\n",
                    test_path.display()
                );
                append_line(log_path, &alert)?;
                warn!(
                    "Timeout ({}s) expired for {}",
                    self.timeout.as_secs(),
                    test_path.display()
                );
            }
            Err(err) => {
                println!("\t{} {}", "[Failed]".red(), test_path.display());
                warn!("Did not get to run the command {}: {err:#}", test_path.display());
            }
        }
        Ok(())
    }
}

/// Appends `text` to the log file.
fn append_line(log_path: &Path, text: &str) -> Result<()> {
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Could not open log {}", log_path.display()))?;
    log.write_all(text.as_bytes())
        .with_context(|| format!("Could not write to {}", log_path.display()))
}

/// Local wall-clock timestamp used for the start/finish log lines.
fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}
