#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Days, NaiveDate, Utc};
use itertools::Itertools;
use regex::Regex;
use serde::Deserialize;
use tabled::{Table, Tabled};

use crate::{config::ConfigHandle, constants::PER_PAGE};

/// A course as returned by the Canvas courses endpoint.
#[derive(Debug, Deserialize)]
struct RawCourse {
    /// Canvas numeric course id.
    id:            i64,
    /// Long display name.
    name:          Option<String>,
    /// Short SIS identifier, e.g. `2026-spring-CSS-132-A`. Absent for
    /// courses the token can see but cannot administer.
    sis_course_id: Option<String>,
    /// Creation timestamp; null for some legacy courses.
    created_at:    Option<DateTime<Utc>>,
    /// End timestamp; null for open-ended courses.
    end_at:        Option<DateTime<Utc>>,
}

/// A user as returned by the Canvas course users endpoint.
#[derive(Debug, Deserialize)]
struct RawUser {
    /// Canvas numeric user id.
    id:       i64,
    /// Display name.
    name:     String,
    /// Login id, the per-course unique netid. Absent for users whose
    /// profile the token cannot read.
    login_id: Option<String>,
}

/// An assignment as returned by the Canvas assignments endpoint.
#[derive(Debug, Deserialize)]
struct RawAssignment {
    /// Canvas numeric assignment id.
    id:                       i64,
    /// Assignment display name.
    name:                     String,
    /// Bulk submissions download URL, when the assignment has one.
    submissions_download_url: Option<String>,
}

/// A submission as returned by the Canvas submissions endpoint.
#[derive(Debug, Deserialize)]
struct RawSubmission {
    /// Canvas numeric submission id.
    id:            i64,
    /// Owning assignment id.
    assignment_id: i64,
    /// Submitting user's Canvas id.
    user_id:       i64,
    /// Uploaded files; absent when the student submitted nothing.
    attachments:   Option<Vec<Attachment>>,
}

/// One file uploaded as part of a submission.
#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    /// File name as uploaded by the student.
    pub filename: String,
    /// Pre-signed download URL.
    pub url:      String,
}

/// A student in a course. Immutable once fetched.
#[derive(Debug, Clone)]
pub struct User {
    /// Display name.
    pub name:  String,
    /// Canvas numeric user id.
    pub id:    i64,
    /// Per-course unique login id; directory and lookup key.
    pub netid: String,
}

/// One student's submission for one assignment.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Canvas numeric submission id.
    pub id:            i64,
    /// Owning assignment id.
    pub assignment_id: i64,
    /// Submitting user's Canvas id.
    pub user_id:       i64,
    /// Submitting user's netid.
    pub netid:         String,
    /// Uploaded files, in submission order.
    pub attachments:   Vec<Attachment>,
}

/// An assignment with its lazily fetched submissions.
#[derive(Debug, Clone)]
pub struct Assignment {
    /// Canvas numeric assignment id.
    pub id:           i64,
    /// Assignment display name.
    pub name:         String,
    /// Bulk submissions download URL, when present.
    pub download_url: Option<String>,
    /// Submissions keyed by netid. Populated at most once per process run.
    pub submissions:  BTreeMap<String, Submission>,
}

/// Row shape for the assignment listing table.
#[derive(Tabled)]
struct AssignmentRow {
    /// Assignment display name.
    #[tabled(rename = "Assignment")]
    name: String,
}

/// Row shape for the user listing table.
#[derive(Tabled)]
struct UserRow {
    /// Student netid.
    #[tabled(rename = "netid")]
    netid: String,
    /// Student display name.
    #[tabled(rename = "Name")]
    name:  String,
}

/// Row shape for the course listing table.
#[derive(Tabled)]
struct CourseRow {
    /// Short SIS identifier used on the command line.
    #[tabled(rename = "Course")]
    sis_id: String,
    /// Long display name.
    #[tabled(rename = "Full name")]
    name:   String,
}

/// A course with its lazily fetched assignments and roster.
#[derive(Debug, Clone)]
pub struct Course {
    /// Canvas numeric course id.
    pub id:          i64,
    /// Long display name.
    pub name:        String,
    /// Short SIS identifier used on the command line.
    pub sis_id:      String,
    /// Assignments keyed by name. Populated at most once per process run.
    pub assignments: BTreeMap<String, Assignment>,
    /// Roster keyed by Canvas user id. Populated at most once per process
    /// run.
    pub users:       BTreeMap<i64, User>,
    /// netid → Canvas user id index, maintained alongside `users`.
    netid_index:     BTreeMap<String, i64>,
}

impl Course {
    /// Creates a course with empty assignment and roster maps.
    pub fn new(id: i64, name: impl Into<String>, sis_id: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            sis_id: sis_id.into(),
            assignments: BTreeMap::new(),
            users: BTreeMap::new(),
            netid_index: BTreeMap::new(),
        }
    }

    /// Adds a student to the roster, maintaining the netid index.
    pub fn add_user(&mut self, user: User) {
        self.netid_index.insert(user.netid.clone(), user.id);
        self.users.insert(user.id, user);
    }

    /// Looks up a student by netid.
    pub fn user_by_netid(&self, netid: &str) -> Option<&User> {
        self.netid_index.get(netid).and_then(|id| self.users.get(id))
    }

    /// Returns every known netid, sorted.
    pub fn netids(&self) -> Vec<String> {
        self.netid_index.keys().cloned().collect()
    }

    /// Returns the named assignment, if it has been fetched.
    pub fn assignment(&self, name: &str) -> Option<&Assignment> {
        self.assignments.get(name)
    }

    /// Fetches the assignment list for this course. A second call is a
    /// no-op; the map is populated at most once per process run.
    pub async fn fetch_assignments(&mut self, client: &CanvasClient) -> Result<()> {
        if !self.assignments.is_empty() {
            return Ok(());
        }
        tracing::info!("Getting the list of assignments for {}", self.name);

        let raw: Vec<RawAssignment> = client
            .get_paged(&format!("courses/{}/assignments", self.id))
            .await
            .with_context(|| format!("Could not get assignments for {}", self.name))?;

        for assignment in raw {
            self.assignments.insert(
                assignment.name.clone(),
                Assignment {
                    id:           assignment.id,
                    name:         assignment.name,
                    download_url: assignment.submissions_download_url,
                    submissions:  BTreeMap::new(),
                },
            );
        }
        Ok(())
    }

    /// Fetches the roster for this course. A second call is a no-op.
    pub async fn fetch_users(&mut self, client: &CanvasClient) -> Result<()> {
        if !self.users.is_empty() {
            return Ok(());
        }
        tracing::info!("Getting users for {}", self.name);

        let raw: Vec<RawUser> = client
            .get_paged(&format!("courses/{}/users", self.id))
            .await
            .with_context(|| format!("Could not get users for {}", self.name))?;

        for user in raw {
            let Some(netid) = user.login_id else {
                tracing::warn!("Skipping user {} ({}) without a login id", user.name, user.id);
                continue;
            };
            self.add_user(User {
                name: user.name,
                id: user.id,
                netid,
            });
        }
        Ok(())
    }

    /// Fetches the submissions for the named assignment. A second call for
    /// the same assignment is a no-op.
    pub async fn fetch_submissions(&mut self, client: &CanvasClient, name: &str) -> Result<()> {
        let course_id = self.id;
        // Split borrows: the roster is read while the assignment is
        // mutated.
        let Course {
            assignments, users, ..
        } = self;
        let assignment = assignments
            .get_mut(name)
            .ok_or_else(|| anyhow!("No assignment named {name} in the fetched list"))?;
        if !assignment.submissions.is_empty() {
            return Ok(());
        }
        tracing::info!("Getting the list of submissions for {}", assignment.name);

        let raw: Vec<RawSubmission> = client
            .get_paged(&format!(
                "courses/{}/assignments/{}/submissions",
                course_id, assignment.id
            ))
            .await
            .with_context(|| format!("Could not get submissions for {}", assignment.name))?;

        for submission in raw {
            let Some(attachments) = submission.attachments else {
                continue;
            };
            let Some(user) = users.get(&submission.user_id) else {
                tracing::warn!(
                    "Submission {} belongs to unknown user {}",
                    submission.id,
                    submission.user_id
                );
                continue;
            };
            assignment.submissions.insert(
                user.netid.clone(),
                Submission {
                    id: submission.id,
                    assignment_id: submission.assignment_id,
                    user_id: submission.user_id,
                    netid: user.netid.clone(),
                    attachments,
                },
            );
        }
        Ok(())
    }

    /// Prints the assignment names, sorted, and returns them.
    pub fn list_assignments(&self) -> Vec<String> {
        let names: Vec<String> = self.assignments.keys().cloned().collect();
        let rows: Vec<AssignmentRow> = names.iter().map(|name| AssignmentRow { name: name.clone() }).collect();
        println!("{}", Table::new(rows));
        names
    }

    /// Prints the roster as a netid → name table.
    pub fn list_users(&self) {
        let rows: Vec<UserRow> = self
            .users
            .values()
            .map(|user| {
                (user.netid.clone(), user.name.clone())
            })
            .sorted()
            .map(|(netid, name)| UserRow { netid, name })
            .collect();
        println!("{}", Table::new(rows));
    }
}

/// The set of current courses visible to the configured token, keyed by
/// SIS id. Cached for process lifetime; never persisted.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    /// Current courses keyed by SIS id.
    courses: BTreeMap<String, Course>,
}

impl Catalog {
    /// True when no courses were fetched.
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    /// Adds a course, keyed by its SIS id.
    pub fn insert(&mut self, course: Course) {
        self.courses.insert(course.sis_id.clone(), course);
    }

    /// Returns the named course.
    pub fn course(&self, sis_id: &str) -> Option<&Course> {
        self.courses.get(sis_id)
    }

    /// Returns the named course for mutation (lazy fetches).
    pub fn course_mut(&mut self, sis_id: &str) -> Option<&mut Course> {
        self.courses.get_mut(sis_id)
    }

    /// Resolves a user-supplied course name to a catalog key: an exact SIS
    /// id match wins, otherwise the name is used as an infix pattern and
    /// must match exactly one course.
    pub fn resolve(&self, name: &str) -> Option<String> {
        if self.courses.contains_key(name) {
            return Some(name.to_string());
        }
        let pattern = Regex::new(&format!(".*{name}.*")).ok()?;
        let matches: Vec<&String> = self
            .courses
            .keys()
            .filter(|key| pattern.is_match(key))
            .collect();
        match matches.as_slice() {
            [single] => Some((*single).clone()),
            _ => None,
        }
    }

    /// Prints the catalog as a short-name → full-name table and returns the
    /// sorted short names.
    pub fn list(&self) -> Vec<String> {
        let rows: Vec<CourseRow> = self
            .courses
            .values()
            .map(|course| CourseRow {
                sis_id: course.sis_id.clone(),
                name:   course.name.clone(),
            })
            .collect();
        println!("{}", Table::new(rows));
        self.courses.keys().cloned().collect()
    }
}

/// Returns whether a course counts as current: its end date has not passed
/// and its start date is not more than a year old. Courses with no dates
/// are always current.
pub fn course_is_current(
    created: Option<NaiveDate>,
    ended: Option<NaiveDate>,
    today: NaiveDate,
) -> bool {
    if let Some(created) = created
        && created.checked_add_days(Days::new(365)).is_some_and(|cutoff| cutoff < today)
    {
        return false;
    }
    if let Some(ended) = ended
        && today > ended
    {
        return false;
    }
    true
}

/// Thin client over the Canvas REST API: bearer-token auth and paginated
/// collection fetches on the shared HTTP client.
#[derive(Debug, Clone)]
pub struct CanvasClient {
    /// Shared HTTP client.
    http:  reqwest::Client,
    /// Base URL ending in `/api/v1/`.
    base:  String,
    /// Bearer token.
    token: String,
}

impl CanvasClient {
    /// Builds a client from the configuration. Fails when no token is
    /// configured.
    pub fn new(cfg: &ConfigHandle) -> Result<Self> {
        let token = cfg
            .canvas_token()
            .ok_or_else(|| anyhow!(crate::config::TOKEN_HELP))?
            .to_string();
        Ok(Self {
            http: cfg.http_client(),
            base: cfg.canvas_api(),
            token,
        })
    }

    /// Fetches one page of a collection.
    async fn get_page<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        page: usize,
    ) -> Result<Vec<T>> {
        let url = format!("{}{}?per_page={}&page={}", self.base, path, PER_PAGE, page);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("Request to {url} was rejected"))?;

        response
            .json::<Vec<T>>()
            .await
            .with_context(|| format!("Could not parse the response from {url}"))
    }

    /// Fetches every page of a collection, following pages until a short
    /// one.
    pub(crate) async fn get_paged<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Vec<T>> {
        let mut collected = Vec::new();
        let mut page = 1;
        loop {
            let batch: Vec<T> = self.get_page(path, page).await?;
            let last = batch.len() < PER_PAGE;
            collected.extend(batch);
            if last {
                return Ok(collected);
            }
            page += 1;
        }
    }

    /// Downloads a pre-signed attachment URL into memory. Attachment URLs
    /// carry their own verifier token, so no bearer auth is attached.
    pub async fn download_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("Could not download {url}"))?
            .error_for_status()
            .with_context(|| format!("Download of {url} was rejected"))?;
        Ok(response.bytes().await.context("Could not read attachment body")?.to_vec())
    }

    /// Fetches the current courses visible to the token: end date not
    /// passed, start date within a year, SIS id present.
    pub async fn list_courses(&self) -> Result<Catalog> {
        let raw: Vec<RawCourse> = self
            .get_paged("courses")
            .await
            .context("Could not get the list of courses")?;
        if raw.is_empty() {
            bail!("Could not get the list of courses");
        }

        let today = Utc::now().date_naive();
        let mut catalog = Catalog::default();
        for course in raw {
            let Some(sis_id) = course.sis_course_id.clone() else {
                continue;
            };
            if sis_id.is_empty() {
                continue;
            }
            let created = course.created_at.map(|stamp| stamp.date_naive());
            let ended = course.end_at.map(|stamp| stamp.date_naive());
            if !course_is_current(created, ended, today) {
                continue;
            }
            let name = course.name.unwrap_or_else(|| sis_id.clone());
            catalog.insert(Course::new(course.id, name, sis_id));
        }
        Ok(catalog)
    }
}
