use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enhancement::prompts::build_prompt;
use crate::errors::{AppError, ErrorKind};

/// Sampling temperature for every completion call. Low, to keep rewrites consistent.
pub const TEMPERATURE: f32 = 0.3;

pub const TEXT_MIME_TYPE: &str = "text/plain";

/// Optional targeting supplied with the upload. Blank strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobTarget {
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

impl JobTarget {
    pub fn new(job_title: Option<String>, company: Option<String>) -> Self {
        Self {
            job_title: normalize(job_title),
            company: normalize(company),
        }
    }

    /// Re-applies blank-stripping; used on values that came through serde.
    pub fn normalized(self) -> Self {
        Self::new(self.job_title, self.company)
    }

    pub fn job_title(&self) -> Option<&str> {
        self.job_title.as_deref()
    }

    pub fn company(&self) -> Option<&str> {
        self.company.as_deref()
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Everything the completion client needs for one call. Immutable once built.
#[derive(Debug, Clone)]
pub struct EnhancementRequest {
    resume_text: String,
    target: JobTarget,
    prompt: String,
    temperature: f32,
    max_output_tokens: u32,
    timeout: Duration,
}

impl EnhancementRequest {
    pub fn build(
        resume_text: String,
        target: JobTarget,
        max_output_tokens: u32,
        timeout: Duration,
    ) -> Self {
        let prompt = build_prompt(&resume_text, target.job_title(), target.company());
        Self {
            resume_text,
            target,
            prompt,
            temperature: TEMPERATURE,
            max_output_tokens,
            timeout,
        }
    }

    pub fn resume_text(&self) -> &str {
        &self.resume_text
    }

    pub fn target(&self) -> &JobTarget {
        &self.target
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Outcome of one pipeline run. Exactly one of text or error is present.
#[derive(Debug, Clone, PartialEq)]
pub enum EnhancementResult {
    Succeeded { text: String },
    Failed { kind: ErrorKind, message: String },
}

impl EnhancementResult {
    pub fn is_success(&self) -> bool {
        matches!(self, EnhancementResult::Succeeded { .. })
    }

    pub fn failed(error: &AppError) -> Self {
        EnhancementResult::Failed {
            kind: error.kind(),
            message: error.user_message(),
        }
    }
}

/// The improved resume offered as a plain-text file.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadArtifact {
    pub file_name: String,
    pub mime_type: &'static str,
    pub content: String,
}

impl DownloadArtifact {
    /// `improved_resume_<job title>.txt`, or `improved_resume_general.txt`
    /// when no title was given. Content is the model output, untouched.
    pub fn for_job_title(job_title: Option<&str>, content: String) -> Self {
        let label = job_title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(sanitize_file_label)
            .unwrap_or_else(|| "general".to_string());

        Self {
            file_name: format!("improved_resume_{label}.txt"),
            mime_type: TEXT_MIME_TYPE,
            content,
        }
    }

    /// ASCII-only file name for the `Content-Disposition` header.
    pub fn header_file_name(&self) -> String {
        self.file_name
            .chars()
            .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '_' })
            .collect()
    }
}

// Path separators and quotes would break the header or the user's filesystem.
fn sanitize_file_label(label: &str) -> String {
    label
        .chars()
        .map(|c| match c {
            '/' | '\\' | '"' | ':' | '*' | '?' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
