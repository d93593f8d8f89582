//! Prompt Builder — the single instruction sent to the completion endpoint.

/// Substituted when the user gave no target job title.
pub const GENERAL_POSITION: &str = "a general position";

const PROMPT_INTRO: &str = "You are an expert resume writer. Improve the following resume for";

const REWRITE_RULES: &str = "\
Rules:
1. Preserve ALL original information. Do not remove, invent, or alter experience, dates, employers, or credentials.
2. Improve wording, clarity, and professionalism. Prefer strong action verbs and concise phrasing.
3. Optimize for applicant tracking systems (ATS): standard section headings, relevant keywords, no tables or graphics.
4. Keep the original structure and formatting, including sections and bullet points.
5. Return ONLY the improved resume text. No introduction, explanation, notes, or commentary.";

/// Builds the rewrite instruction for `resume_text`.
///
/// Pure: the same inputs always give the same prompt. The company clause is
/// only present when a company is given; a missing job title becomes
/// [`GENERAL_POSITION`]. Callers pass already-trimmed, non-blank options.
pub fn build_prompt(resume_text: &str, job_title: Option<&str>, company: Option<&str>) -> String {
    let job_target = job_title.unwrap_or(GENERAL_POSITION);
    let company_clause = company
        .map(|c| format!(" at {c}"))
        .unwrap_or_default();

    format!("{PROMPT_INTRO} {job_target}{company_clause}.\n\n{REWRITE_RULES}\n\nRESUME:\n{resume_text}")
}
