#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Marker file whose presence means at least one attachment was downloaded
/// into a student directory. Only marked directories are eligible for
/// testing and emailing.
pub const DOWNLOADED_MARKER: &str = "jolly_downloaded.txt";

/// Prefix of the identity marker encoding a student's netid, as in
/// `jolly_netid_<netid>.txt`.
pub const NETID_MARKER_PREFIX: &str = "jolly_netid_";

/// Prefix of the identity marker encoding a student's display name, as in
/// `jolly_name_<sanitized name>.txt`.
pub const NAME_MARKER_PREFIX: &str = "jolly_name_";

/// Rolling per-student test log, truncated at the start of every test pass.
pub const TEST_LOG: &str = "jolly_testlog.txt";

/// Finished copy of the test log that the mailer sends out.
pub const TOEMAIL_FILE: &str = "jolly_toemail.txt";

/// Saved copy of the composed email. Doubles as the "already sent" guard so
/// reruns never email the same student twice.
pub const EMAILED_FILE: &str = "jolly_emailed.txt";

/// Default filename prefix that marks a file in the test directory as a
/// runnable test script.
pub const DEFAULT_TEST_PREFIX: &str = "test_";

/// Directory of bundled test scripts, looked up next to the installed
/// binary when `--tprefix` is given without `--tdir`.
pub const DEFAULT_TESTS_DIR: &str = "defaulttests";

/// Page size requested from paginated Canvas collections.
pub const PER_PAGE: usize = 100;

/// Logs larger than this many bytes are truncated before mailing.
pub const MAX_EMAIL_BYTES: u64 = 500_000;

/// Number of leading log lines kept when the log exceeds
/// [`MAX_EMAIL_BYTES`].
pub const EMAIL_TRUNCATE_LINES: usize = 1000;

/// Argument passed to every test script so it can locate shared helper
/// files installed alongside the `jolly` binary.
pub const JOLLYDIR_FLAG: &str = "--jollydir";
