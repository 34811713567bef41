//! Plain-text interview report.

use crate::session::record::SessionRecord;
use std::path::{Path, PathBuf};

/// Renders the candidate report: header, overall weighted score and one
/// block per question in order.
pub fn render_report(record: &SessionRecord) -> String {
    let mut lines = vec![
        format!("Interview Report: {}", record.interview_name),
        format!("Candidate: {}", record.user_email),
        format!("Role: {}", record.role),
        format!("Date: {}", record.date),
    ];
    if !record.recording.is_empty() {
        lines.push(format!("Recording: {}", record.recording));
    }
    lines.push(format!("Overall Score: {:.2}", record.weighted_score()));
    lines.push(String::new());
    lines.push("Question Breakdown".to_string());

    for question in record.ordered_questions() {
        let status = question
            .status
            .map_or_else(|| "not asked".to_string(), |s| s.to_string());
        let response = if question.user_answer.is_empty() {
            "(none)"
        } else {
            question.user_answer.as_str()
        };
        lines.push(String::new());
        lines.push(format!("[{}] {}", question.order, question.question));
        lines.push(format!("  Status:    {status}"));
        lines.push(format!("  Response:  {response}"));
        lines.push(format!(
            "  Score:     {:.2} (weight {:.2})",
            question.score, question.weight
        ));
        if !question.rationale.is_empty() {
            lines.push(format!("  Rationale: {}", question.rationale));
        }
        if !question.next_action.is_empty() {
            lines.push(format!("  Next:      {}", question.next_action));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// `session.json` → `session.report.txt`.
pub fn report_path(session_file: &Path) -> PathBuf {
    session_file.with_extension("report.txt")
}
