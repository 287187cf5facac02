#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # jolly
//!
//! Command-line driver: download assignment submissions from Canvas, run
//! automated tests against them, and email the results back to students.
//!
//! ```text
//! # download list of courses/assignments
//! jolly --download
//! jolly css132 --download
//! # download all submissions for an assignment
//! jolly css132 ass1 --download
//! # unzip all downloaded submissions
//! jolly css132 ass1 --unzip
//! # run all tests in the given test directory that start with test_
//! jolly css132 ass1 --tdir sometestdir
//! # email the jolly_toemail.txt files to all students
//! jolly css132 ass1 --email --pfile -
//! ```

use std::path::PathBuf;

use anyhow::{Result, bail};
use bpaf::*;
use dotenvy::dotenv;
use jolly::{
    config::{self, TOKEN_HELP},
    constants::DEFAULT_TESTS_DIR,
    driver::{Jolly, RunFlags},
    util,
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Parsed command line: positionals selecting the work, flags selecting
/// the stages.
#[derive(Debug, Clone)]
struct Opts {
    /// Download files from Canvas.
    download:    bool,
    /// Create empty directories even when a student has no submission.
    createempty: bool,
    /// Unzip any zip files submitted.
    unzip:       bool,
    /// Directory for test scripts.
    tdir:        Option<PathBuf>,
    /// Comma-separated test filename prefixes.
    tprefix:     Option<String>,
    /// Email the feedback log to each student.
    email:       bool,
    /// Customized email subject.
    esubject:    Option<String>,
    /// File to send instead of the default to-email copy.
    efile:       Option<String>,
    /// File to attach to every email.
    eattach:     Option<PathBuf>,
    /// Password source: `-` for interactive, else a file name.
    pfile:       Option<String>,
    /// Short course name.
    course:      Option<String>,
    /// Short assignment name.
    assignment:  Option<String>,
    /// Comma-separated netids; empty means every student.
    netids:      Option<String>,
}

/// Parse the command line arguments and return an `Opts` struct
fn options() -> Opts {
    let download = long("download")
        .help("Download files from Canvas")
        .switch();
    let createempty = long("createempty")
        .help("Create empty directories even if there is no student assignment to download")
        .switch();
    let unzip = long("unzip").help("Unzip any zip files submitted").switch();
    let tdir = long("tdir")
        .help("Directory for test scripts, test files must be named test_xxx")
        .argument::<PathBuf>("DIR")
        .optional();
    let tprefix = long("tprefix")
        .help("(advanced) run tests matching the given prefix separated by commas, default is 'test_'")
        .argument::<String>("PREFIXES")
        .optional();
    let email = long("email")
        .help("Email the contents of jolly_toemail.txt to each student")
        .switch();
    let esubject = long("esubject")
        .help("Customized email subject in quotes")
        .argument::<String>("SUBJECT")
        .optional();
    let efile = long("efile")
        .help("The file to send instead of jolly_toemail.txt")
        .argument::<String>("FILE")
        .optional();
    let eattach = long("eattach")
        .help("The file to attach in addition to sending jolly_toemail.txt")
        .argument::<PathBuf>("FILE")
        .optional();
    let pfile = long("pfile")
        .help("'-' for interactive, or the file with password to authenticate for SMTP/emails")
        .argument::<String>("SOURCE")
        .optional();
    let course = positional::<String>("COURSE")
        .help("Short course name, if course not found list all courses")
        .optional();
    let assignment = positional::<String>("ASSIGNMENT")
        .help("Short assignment name, if course given list all assignments")
        .optional();
    let netids = positional::<String>("NETIDS")
        .help("Netids of students separated by commas or leave empty for all students")
        .optional();

    construct!(Opts {
        download,
        createempty,
        unzip,
        tdir,
        tprefix,
        email,
        esubject,
        efile,
        eattach,
        pfile,
        course,
        assignment,
        netids
    })
    .to_options()
    .descr("Download assignment submissions from Canvas, run automated tests and email the results back to students")
    .run()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer = LevelFilter::from_level(Level::INFO);
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let opts = options();

    let cfg = config::ensure_initialized()?;
    if cfg.canvas_token().is_none() {
        bail!("{TOKEN_HELP}");
    }

    // --tprefix without --tdir falls back to the bundled tests installed
    // next to the binary.
    let test_dir = match (&opts.tdir, &opts.tprefix) {
        (None, Some(_)) => Some(util::jolly_home().join(DEFAULT_TESTS_DIR)),
        (dir, _) => dir.clone(),
    };

    let flags = RunFlags {
        download:        opts.download,
        create_empty:    opts.createempty,
        unzip:           opts.unzip,
        test_dir,
        test_prefixes:   opts.tprefix.clone(),
        email:           opts.email,
        email_subject:   opts.esubject.clone(),
        email_file:      opts.efile.clone(),
        email_attach:    opts.eattach.clone(),
        password_source: opts.pfile.clone(),
    };

    let mut driver = Jolly::new(opts.course, opts.assignment, opts.netids, cfg)?;
    driver.run(flags).await
}
