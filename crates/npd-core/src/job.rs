//! Per-package diagnostics.
//!
//! Every package build owns one [`Job`]. Failures are recorded on the job as
//! messages instead of aborting the wider build, and the collected
//! [`Diagnostics`] decide the final outcome.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::error::DepsError;

/// One diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Human-readable text.
    pub message: String,
}

/// A unit of work with its own diagnostics, e.g. "building package foo".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// What the job was doing.
    pub job_title: String,
    /// Messages recorded while it ran.
    pub messages: Vec<Message>,
}

impl Job {
    /// A job with the given title and no messages.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            job_title: title.into(),
            messages: Vec::new(),
        }
    }

    /// The job covering the build of package `name`.
    pub fn for_package(name: &str) -> Self {
        Self::new(format!("building package {name}"))
    }

    /// Record a message.
    pub fn error(&mut self, message: impl Into<String>) {
        self.messages.push(Message {
            message: message.into(),
        });
    }

    /// Record a failure.
    pub fn report(&mut self, err: &DepsError) {
        self.error(err.to_string());
    }

    /// Whether anything went wrong.
    pub fn has_messages(&self) -> bool {
        !self.messages.is_empty()
    }
}

/// Jobs collected over a whole build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// All jobs, in the order their packages were given.
    pub jobs: Vec<Job>,
}

impl Diagnostics {
    /// Whether any job recorded a message.
    pub fn has_messages(&self) -> bool {
        self.jobs.iter().any(Job::has_messages)
    }

    /// Number of jobs with at least one message.
    pub fn failure_count(&self) -> usize {
        self.jobs.iter().filter(|j| j.has_messages()).count()
    }

    /// Look up a job by title.
    pub fn find_job(&self, title: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.job_title == title)
    }

    /// Plain-text rendering of every job that has messages.
    pub fn format_messages(&self) -> String {
        let mut out = String::new();
        for job in self.jobs.iter().filter(|j| j.has_messages()) {
            let _ = writeln!(out, "While {}:", job.job_title);
            for m in &job.messages {
                let _ = writeln!(out, "error: {}", m.message);
            }
        }
        out
    }

    /// JSON rendering of the jobs that have messages.
    ///
    /// # Errors
    ///
    /// Returns a serialization error (not expected for these types).
    pub fn to_json(&self) -> serde_json::Result<String> {
        let failed: Vec<&Job> = self.jobs.iter().filter(|j| j.has_messages()).collect();
        serde_json::to_string_pretty(&failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing() -> Diagnostics {
        let mut job = Job::for_package("test-package");
        job.report(&DepsError::VersionUnresolvable {
            name: "mime".into(),
            version: "0.1.2".into(),
        });
        Diagnostics {
            jobs: vec![Job::for_package("other"), job],
        }
    }

    #[test]
    fn finds_failing_job_by_title() {
        let diags = failing();
        assert!(diags.has_messages());
        assert_eq!(diags.failure_count(), 1);
        let job = diags.find_job("building package test-package").unwrap();
        assert!(job.messages[0].message.contains("mime version 0.1.2 is not available"));
        assert!(!diags.find_job("building package other").unwrap().has_messages());
    }

    #[test]
    fn text_output_lists_only_failures() {
        assert_eq!(
            failing().format_messages(),
            "While building package test-package:\nerror: mime version 0.1.2 is not available in the npm registry\n"
        );
    }

    #[test]
    fn json_uses_camel_case_titles() {
        let json: serde_json::Value = serde_json::from_str(&failing().to_json().unwrap()).unwrap();
        assert_eq!(json[0]["jobTitle"], "building package test-package");
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert!(json[0]["messages"][0]["message"].is_string());
    }

    #[test]
    fn clean_build_has_no_messages() {
        let diags = Diagnostics {
            jobs: vec![Job::for_package("a")],
        };
        assert!(!diags.has_messages());
        assert_eq!(diags.format_messages(), "");
    }
}
