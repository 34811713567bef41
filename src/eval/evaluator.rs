use crate::error::{Result, VivaError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// `next_action` used when the evaluator output could not be parsed.
pub const MANUAL_REVIEW: &str = "Fallback to manual review.";

/// Grading of a single answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// 0.0 to 1.0; `None` when no score could be obtained.
    pub score: Option<f64>,
    pub rationale: String,
    pub next_action: String,
    #[serde(rename = "followup_question", default, skip_serializing_if = "Option::is_none")]
    pub followup: Option<String>,
}

impl Evaluation {
    /// Placeholder used when evaluation fails outright.
    pub fn manual_review(reason: impl Into<String>) -> Self {
        Self {
            score: None,
            rationale: reason.into(),
            next_action: MANUAL_REVIEW.to_string(),
            followup: None,
        }
    }
}

/// Grades an answer against its question.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, role: &str, question: &str, answer: &str) -> Result<Evaluation>;

    /// Model or program name; becomes part of the score file name.
    fn name(&self) -> &str;
}

#[derive(Deserialize)]
struct RawEvaluation {
    score: Option<f64>,
    rationale: Option<String>,
    next_action: Option<String>,
    followup_question: Option<String>,
}

/// Parses evaluator output, tolerating a surrounding Markdown code fence.
///
/// Malformed JSON never fails: it yields a manual-review evaluation whose
/// rationale carries the parse error.
pub fn parse_evaluation(response: &str) -> Evaluation {
    let body = strip_code_fence(response.trim());
    match serde_json::from_str::<RawEvaluation>(body) {
        Ok(raw) => Evaluation {
            score: raw.score.map(|s| s.clamp(0.0, 1.0)),
            rationale: raw.rationale.unwrap_or_default(),
            next_action: raw.next_action.unwrap_or_default(),
            followup: raw.followup_question.filter(|q| !q.trim().is_empty()),
        },
        Err(e) => Evaluation::manual_review(format!("Failed to parse JSON: {e}")),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
    else {
        return text;
    };
    rest.trim().strip_suffix("```").unwrap_or(rest).trim()
}

/// Builds the grading prompt for one question.
pub fn render_prompt(role: &str, question: &str, answer: &str) -> String {
    format!(
        "You are a senior engineer interviewing a candidate for the role of {role}. \
You are given a question asked by the interviewer and the candidate's answer, \
transcribed from a voice recording.

Analyze the answer for relevance, correctness and completeness, then score it \
between 0 and 1:
- 1.0: perfectly relevant, technically sound and complete.
- 0.5 to 0.9: partially relevant or incomplete, but shows understanding.
- below 0.5: mostly irrelevant, incorrect or off-topic.
An off-topic or empty answer scores 0.

Respond only with a JSON object with these keys:
- \"score\": a number between 0 and 1
- \"rationale\": a 1 to 3 sentence explanation of the score
- \"next_action\": either \"Ask a follow-up question to clarify or redirect.\" \
or \"Accept the answer and proceed to the next question.\"
- \"followup_question\": a follow-up question based on the answer

Do not include any other text or formatting.

Question: {question}

Transcribed Answer: {answer}
"
    )
}

/// Mock evaluator with canned scores per question.
#[derive(Debug, Default)]
pub struct MockEvaluator {
    scores: HashMap<String, f64>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score for `question`; others score 0.5.
    pub fn with_score(mut self, question: &str, score: f64) -> Self {
        self.scores.insert(question.to_string(), score);
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Evaluator for MockEvaluator {
    async fn evaluate(&self, _role: &str, question: &str, answer: &str) -> Result<Evaluation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(VivaError::Evaluation {
                message: "mock evaluation failure".to_string(),
            });
        }
        let score = if answer.trim().is_empty() {
            0.0
        } else {
            self.scores.get(question).copied().unwrap_or(0.5)
        };
        Ok(Evaluation {
            score: Some(score),
            rationale: format!("mock rationale for {answer:?}"),
            next_action: "Accept the answer and proceed to the next question.".to_string(),
            followup: None,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
