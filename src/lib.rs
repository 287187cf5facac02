//! # jolly
//!
//! Downloads student assignment submissions from Canvas, runs a directory
//! of instructor-supplied test scripts against each submission, and emails
//! the captured results back to students.
//!
//! The pipeline is strictly sequential: one student, one test script at a
//! time. Each stage (download, unzip, test, email) is independently
//! skippable from the command line.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Zip archive discovery and extraction inside student directories
pub mod archive;
/// Canvas REST models and client
pub mod canvas;
/// Layered configuration and the shared config handle
pub mod config;
/// A module defining a bunch of constant values to be used throughout
pub mod constants;
/// Attachment download and student directory bookkeeping
pub mod download;
/// CLI sequencing of the pipeline stages
pub mod driver;
/// Feedback email composition and SMTP transmission
pub mod mailer;
/// Bounded subprocess execution
pub mod process;
/// The test orchestrator
pub mod runner;
/// Utility functions for convenience
pub mod util;
