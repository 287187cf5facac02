#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    io::{BufRead, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::{
    archive,
    canvas::{Catalog, CanvasClient, User},
    config::ConfigHandle,
    download,
    mailer,
    runner::{Runner, parse_prefixes},
    util,
};

/// Which stages to run and their parameters, straight from the command
/// line. Every stage is independently skippable.
#[derive(Debug, Default, Clone)]
pub struct RunFlags {
    /// Fetch course/assignment/submission metadata and download files.
    pub download:        bool,
    /// Create and mark empty directories for students without submissions.
    pub create_empty:    bool,
    /// Expand zip archives inside each student directory.
    pub unzip:           bool,
    /// Directory of test scripts to run, when testing.
    pub test_dir:        Option<PathBuf>,
    /// Comma-separated test filename prefixes.
    pub test_prefixes:   Option<String>,
    /// Email each student their feedback log.
    pub email:           bool,
    /// Override for the email subject line.
    pub email_subject:   Option<String>,
    /// Override for the file to send instead of the to-email copy.
    pub email_file:      Option<String>,
    /// Extra file to attach to every email.
    pub email_attach:    Option<PathBuf>,
    /// Where the SMTP password comes from: `-` for an interactive prompt,
    /// anything else is a file whose first line is the password.
    pub password_source: Option<String>,
}

/// Sequences the pipeline: resolve course and assignment on Canvas,
/// download submissions, expand archives, run tests, email feedback.
pub struct Jolly {
    /// User-supplied course name, possibly a fragment of the SIS id.
    course_name:     Option<String>,
    /// User-supplied assignment name.
    assignment_name: Option<String>,
    /// Requested netids; empty means every student.
    netids:          Vec<String>,
    /// Shared configuration.
    cfg:             ConfigHandle,
    /// Canvas API client.
    client:          CanvasClient,
    /// Current courses, fetched once per process.
    catalog:         Catalog,
}

/// Everything the download stage needs once Canvas metadata is resolved.
struct Resolved {
    /// Catalog key of the resolved course.
    course_key:      String,
    /// Selected students.
    users:           Vec<User>,
}

impl Jolly {
    /// Creates a driver. Fails when no Canvas token is configured.
    pub fn new(
        course_name: Option<String>,
        assignment_name: Option<String>,
        netids: Option<String>,
        cfg: ConfigHandle,
    ) -> Result<Self> {
        let client = CanvasClient::new(&cfg)?;
        let netids = netids
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            course_name,
            assignment_name,
            netids,
            cfg,
            client,
            catalog: Catalog::default(),
        })
    }

    /// Fetches the course catalog once per process.
    async fn setup(&mut self) -> Result<()> {
        if self.catalog.is_empty() {
            self.catalog = self.client.list_courses().await?;
        }
        Ok(())
    }

    /// Resolves the user-supplied course name against the catalog,
    /// printing the catalog when resolution fails.
    fn resolve_course(&self) -> Result<String> {
        let Some(name) = self.course_name.as_deref() else {
            let courses = self.catalog.list();
            eprintln!("\nSpecify a course name");
            eprintln!("try: jolly COURSENAME --download");
            if let Some(first) = courses.first() {
                eprintln!("try: jolly {first} --download");
            }
            bail!("No course name given");
        };
        match self.catalog.resolve(name) {
            Some(key) => Ok(key),
            None => {
                self.catalog.list();
                bail!("Could not find course {name}");
            }
        }
    }

    /// Resolves course, assignment, roster, and submissions, and selects
    /// the requested users (or everyone when no netids were given).
    async fn resolve_canvas(&mut self) -> Result<Resolved> {
        self.setup().await?;
        let course_key = self.resolve_course()?;
        let course = self
            .catalog
            .course_mut(&course_key)
            .context("Course disappeared from the catalog")?;
        course.fetch_assignments(&self.client).await?;

        let Some(assignment_name) = self.assignment_name.clone() else {
            let assignments = course.list_assignments();
            eprintln!("\nSpecify an assignment");
            eprintln!("try: jolly {course_key} ASSIGNMENT --download");
            if let Some(first) = assignments.first() {
                eprintln!("try: jolly {course_key} '{first}' --download");
            }
            bail!("No assignment name given");
        };
        if course.assignment(&assignment_name).is_none() {
            course.list_assignments();
            bail!("Could not find assignment {assignment_name}");
        }

        course.fetch_users(&self.client).await?;
        course.fetch_submissions(&self.client, &assignment_name).await?;

        let users = if self.netids.is_empty() {
            self.netids = course.netids();
            course.users.values().cloned().collect()
        } else {
            let mut found = Vec::new();
            let mut kept_netids = Vec::new();
            for netid in &self.netids {
                match course.user_by_netid(netid) {
                    Some(user) => {
                        found.push(user.clone());
                        kept_netids.push(netid.clone());
                    }
                    None => warn!("Could not find user {netid}"),
                }
            }
            if found.is_empty() {
                course.list_users();
                bail!("None of the requested netids are in {course_key}");
            }
            self.netids = kept_netids;
            found
        };

        Ok(Resolved { course_key, users })
    }

    /// The download stage: resolve Canvas metadata, then fetch every
    /// selected student's attachments.
    async fn download(&mut self, create_empty: bool) -> Result<bool> {
        let resolved = self.resolve_canvas().await?;
        self.course_name = Some(resolved.course_key.clone());
        let assignment_name = self
            .assignment_name
            .clone()
            .context("No assignment name after resolution")?;
        let course = self
            .catalog
            .course(&resolved.course_key)
            .context("Course disappeared from the catalog")?;
        let assignment = course
            .assignment(&assignment_name)
            .context("Assignment disappeared after resolution")?;
        download::download(&self.client, assignment, &resolved.users, create_empty, &self.cfg)
            .await
    }

    /// Runs the whole requested pipeline in order: download, unzip, test,
    /// email.
    pub async fn run(&mut self, flags: RunFlags) -> Result<()> {
        if self.course_name.is_none() && !flags.download {
            eprintln!("ERR: Use 'jolly --download' to get a list of courses");
            return Ok(());
        }
        if flags.download && !self.download(flags.create_empty).await? {
            return Ok(());
        }
        let Some(assignment_name) = self.assignment_name.clone() else {
            eprintln!("ERR: Cannot download, unzip or email if no assignment name is given");
            eprintln!("ERR: Specify --download to get a list of assignments");
            return Ok(());
        };
        if !flags.download && flags.test_dir.is_none() && !flags.unzip && !flags.email {
            eprintln!("ERR: Not downloading, testing or emailing, so what are we doing?");
            eprintln!("ERR: Specify --download, then --unzip then --tdir and finally --email");
            return Ok(());
        }

        let assignment_dir = download::assignment_dir(&assignment_name);
        if !assignment_dir.is_dir() {
            eprintln!(
                "ERR: Assignment directory {} not found, did you download it?",
                assignment_dir.display()
            );
            return Ok(());
        }
        let netids = if self.netids.is_empty() {
            util::netids_in(&assignment_dir)?
        } else {
            self.netids.clone()
        };

        if flags.unzip {
            archive::expand_assignment(&assignment_dir, &netids)?;
        }
        if let Some(test_dir) = &flags.test_dir {
            self.run_tests(&assignment_dir, &netids, test_dir, flags.test_prefixes.as_deref())
                .await?;
        }
        if flags.email {
            let subject = flags.email_subject.clone().unwrap_or_else(|| {
                format!(
                    "{} - {} - {}",
                    self.course_name.as_deref().unwrap_or_default(),
                    assignment_name,
                    self.cfg.email_subject()
                )
            });
            self.send_emails(&assignment_dir, &netids, &subject, &flags).await?;
        }
        Ok(())
    }

    /// The test stage: filter the requested students down to those with a
    /// directory, then hand off to the orchestrator.
    async fn run_tests(
        &self,
        assignment_dir: &Path,
        netids: &[String],
        test_dir: &Path,
        prefixes: Option<&str>,
    ) -> Result<()> {
        if !test_dir.is_dir() {
            bail!("The test directory {} is not valid", test_dir.display());
        }
        let all_netids = util::netids_in(assignment_dir)?;
        let mut filtered = Vec::new();
        for netid in netids {
            if all_netids.contains(netid) {
                filtered.push(netid.clone());
            } else {
                warn!("Cannot find directory for {netid}");
            }
        }
        if filtered.is_empty() {
            bail!("No student directories to test under {}", assignment_dir.display());
        }

        let runner = Runner::builder()
            .netids(filtered)
            .assignment_dir(assignment_dir.to_path_buf())
            .test_dir(util::expand_path(test_dir.to_string_lossy().as_ref()))
            .prefixes(parse_prefixes(prefixes.unwrap_or_default()))
            .timeout(self.cfg.test_timeout())
            .log_name(self.cfg.test_log().to_string())
            .build();
        runner.run_all().await
    }

    /// The email stage: resolve the password once, then send each
    /// student's feedback with the configured delay between sends.
    async fn send_emails(
        &self,
        assignment_dir: &Path,
        netids: &[String],
        subject: &str,
        flags: &RunFlags,
    ) -> Result<()> {
        let password = resolve_password(flags.password_source.as_deref())?;
        let transport = mailer::build_transport(&self.cfg, password.as_deref())?;

        for netid in netids {
            let student_dir = assignment_dir.join(netid);
            if !student_dir.is_dir() {
                warn!("Cannot find directory for {netid}");
                continue;
            }
            let sent = mailer::send_feedback(
                &student_dir,
                subject,
                flags.email_file.as_deref(),
                flags.email_attach.as_deref(),
                &transport,
                &self.cfg,
            );
            match sent {
                Ok(true) => {
                    let delay = self.cfg.mail_delay();
                    info!(
                        ".... delay of {} seconds not to overwhelm the mail server....",
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(false) => {}
                Err(err) => warn!("Could not email {netid}: {err:#}"),
            }
        }
        Ok(())
    }
}

/// Resolves the SMTP password from its configured source: `-` prompts on
/// the terminal, any other value is a file whose first line is the
/// password, and when no source is given the `SMTP_PASSWORD` environment
/// variable is consulted.
pub fn resolve_password(source: Option<&str>) -> Result<Option<String>> {
    match source {
        None => Ok(std::env::var("SMTP_PASSWORD").ok().filter(|pass| !pass.is_empty())),
        Some("-") => {
            eprint!("Enter password: ");
            std::io::stderr().flush().ok();
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("Could not read the password from the terminal")?;
            Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
        }
        Some(path) => {
            let auth_file = util::expand_path(path);
            if !auth_file.is_file() {
                bail!("password file {} could not be found", auth_file.display());
            }
            let text = std::fs::read_to_string(&auth_file)
                .with_context(|| format!("Could not read {}", auth_file.display()))?;
            Ok(text.lines().next().map(|line| line.trim_end().to_string()))
        }
    }
}
