//! Interview input files and the persisted session record.

use crate::defaults;
use crate::error::{Result, VivaError};
use crate::session::state::{TaskStatus, TurnState};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_weight() -> f32 {
    defaults::QUESTION_WEIGHT
}

/// Interview definition as authored: a name, a role and its questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewFile {
    pub interview_name: String,
    pub role: String,
    pub questions: Vec<QuestionSpec>,
}

/// One authored question. `timeout` is the answer window in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub id: String,
    pub question: String,
    pub timeout: f64,
    pub order: u32,
    #[serde(default)]
    pub wav_file: Option<PathBuf>,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

impl InterviewFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| VivaError::Persistence {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| VivaError::Persistence {
            path: path.display().to_string(),
            message: format!("Invalid interview file: {e}"),
        })
    }
}

/// Question as stored in a session file, with the candidate's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: String,
    pub question: String,
    pub timeout: f64,
    pub order: u32,
    #[serde(default)]
    pub wav_file: Option<PathBuf>,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default)]
    pub user_answer: String,
    /// Final turn state; absent for questions that were never asked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TurnState>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub next_action: String,
}

impl QuestionRecord {
    pub fn new(id: &str, question: &str, timeout: f64, order: u32) -> Self {
        Self {
            id: id.to_string(),
            question: question.to_string(),
            timeout,
            order,
            wav_file: None,
            weight: defaults::QUESTION_WEIGHT,
            user_answer: String::new(),
            status: None,
            score: 0.0,
            rationale: String::new(),
            next_action: String::new(),
        }
    }
}

impl From<&QuestionSpec> for QuestionRecord {
    fn from(spec: &QuestionSpec) -> Self {
        Self {
            wav_file: spec.wav_file.clone(),
            weight: spec.weight,
            ..Self::new(&spec.id, &spec.question, spec.timeout, spec.order)
        }
    }
}

/// Everything persisted about one candidate's run through an interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub interview_name: String,
    pub role: String,
    /// UTC date, `YYYY-MM-DD`.
    pub date: String,
    pub user_email: String,
    #[serde(default)]
    pub recording: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_timeout_secs: Option<u64>,
    pub questions: Vec<QuestionRecord>,
}

impl SessionRecord {
    /// Fresh record for `user_email` taking `interview`.
    pub fn new(interview: &InterviewFile, user_email: &str, now: DateTime<Utc>) -> Self {
        Self {
            interview_name: interview.interview_name.clone(),
            role: interview.role.clone(),
            date: now.format("%Y-%m-%d").to_string(),
            user_email: user_email.to_string(),
            recording: String::new(),
            started_at: None,
            session_timeout_secs: None,
            questions: interview.questions.iter().map(Into::into).collect(),
        }
    }

    /// Copies final states and answers from the turn table.
    pub fn apply_statuses(&mut self, statuses: &[TaskStatus]) {
        for status in statuses {
            if let Some(question) = self.questions.iter_mut().find(|q| q.id == status.id) {
                question.status = Some(status.state);
                question.user_answer = status.answer.clone().unwrap_or_default();
            }
        }
    }

    /// Sum of score times weight.
    pub fn weighted_score(&self) -> f64 {
        self.questions
            .iter()
            .map(|q| q.score * f64::from(q.weight))
            .sum()
    }

    /// Questions sorted by `order`.
    pub fn ordered_questions(&self) -> Vec<&QuestionRecord> {
        let mut questions: Vec<_> = self.questions.iter().collect();
        questions.sort_by_key(|q| q.order);
        questions
    }
}

/// `<sessions_dir>/<interview>/<email>/<role>_<YYYYmmddHHMMSS>.json`.
///
/// Each component goes through [`path_segment`], so none of them can leave
/// `sessions_dir`.
pub fn session_path(
    sessions_dir: &Path,
    record: &SessionRecord,
    now: DateTime<Local>,
) -> PathBuf {
    let role = path_segment(&record.role);
    sessions_dir
        .join(path_segment(&record.interview_name))
        .join(path_segment(&record.user_email))
        .join(format!("{role}_{}.json", now.format("%Y%m%d%H%M%S")))
}

/// Makes `raw` a single directory entry: whitespace and separators become
/// underscores, and names made only of dots are replaced.
fn path_segment(raw: &str) -> String {
    let segment: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    if segment.chars().all(|c| c == '.') {
        "_".repeat(segment.len().max(1))
    } else {
        segment
    }
}

/// Where session records are kept.
pub trait SessionStore: Send + Sync {
    fn persist(&self, path: &Path, record: &SessionRecord) -> Result<()>;

    fn load(&self, path: &Path) -> Result<SessionRecord>;
}

/// Pretty-printed JSON files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSessionStore;

impl SessionStore for JsonSessionStore {
    fn persist(&self, path: &Path, record: &SessionRecord) -> Result<()> {
        let persistence = |message: String| VivaError::Persistence {
            path: path.display().to_string(),
            message,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| persistence(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(path, json).map_err(|e| persistence(e.to_string()))
    }

    fn load(&self, path: &Path) -> Result<SessionRecord> {
        let content = std::fs::read_to_string(path).map_err(|e| VivaError::Persistence {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| VivaError::Persistence {
            path: path.display().to_string(),
            message: format!("Invalid session file: {e}"),
        })
    }
}
