//! Ordered question queue.

use crate::defaults;
use crate::error::{Result, VivaError};
use crate::session::record::QuestionRecord;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

/// One question to ask. Immutable once queued.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub prompt: String,
    /// Answer window, measured from the end of playback.
    pub timeout: Duration,
    pub order: u32,
    /// Pre-rendered question audio, if the interview ships one.
    pub wav_file: Option<PathBuf>,
    pub weight: f32,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        timeout: Duration,
        order: u32,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            timeout,
            order,
            wav_file: None,
            weight: defaults::QUESTION_WEIGHT,
        }
    }

    pub fn with_wav_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.wav_file = Some(path.into());
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    fn validate(&self) -> Result<()> {
        let invalid = |message: &str| VivaError::InvalidQuestion {
            id: self.id.clone(),
            message: message.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.prompt.trim().is_empty() {
            return Err(invalid("question text must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout must be positive"));
        }
        Ok(())
    }
}

/// Questions in ascending `order`, handed out once each.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    /// Validates and sorts `tasks`. Equal orders keep their input order.
    ///
    /// # Errors
    /// `InvalidQuestion` for an empty id, empty prompt or non-positive timeout;
    /// `DuplicateQuestion` when two tasks share an id.
    pub fn new(mut tasks: Vec<Task>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(tasks.len());
        for task in &tasks {
            task.validate()?;
            if !seen.insert(task.id.as_str()) {
                return Err(VivaError::DuplicateQuestion {
                    id: task.id.clone(),
                });
            }
        }
        tasks.sort_by_key(|task| task.order);
        Ok(Self {
            tasks: tasks.into(),
        })
    }

    /// Builds the queue from persisted question records.
    pub fn from_questions(questions: &[QuestionRecord]) -> Result<Self> {
        let tasks = questions
            .iter()
            .map(|question| {
                let timeout = Duration::try_from_secs_f64(question.timeout).map_err(|_| {
                    VivaError::InvalidQuestion {
                        id: question.id.clone(),
                        message: format!("timeout {} is not a valid duration", question.timeout),
                    }
                })?;
                let mut task = Task::new(&question.id, &question.question, timeout, question.order)
                    .with_weight(question.weight);
                if let Some(path) = &question.wav_file {
                    task = task.with_wav_file(path);
                }
                Ok(task)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(tasks)
    }

    /// Pops the lowest remaining order.
    pub fn next(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, order: u32) -> Task {
        Task::new(id, format!("Question {id}"), Duration::from_secs(5), order)
    }

    #[test]
    fn test_next_returns_ascending_order() {
        let mut queue = TaskQueue::new(vec![task("c", 3), task("a", 1), task("b", 2)]).unwrap();
        let ids: Vec<_> = std::iter::from_fn(|| queue.next()).map(|t| t.id).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert!(queue.is_empty());
        assert!(queue.next().is_none());
    }

    #[test]
    fn test_equal_orders_keep_input_order() {
        let mut queue = TaskQueue::new(vec![task("x", 1), task("y", 0), task("z", 1)]).unwrap();
        assert_eq!(queue.next().unwrap().id, "y");
        assert_eq!(queue.next().unwrap().id, "x");
        assert_eq!(queue.next().unwrap().id, "z");
    }

    #[test]
    fn test_remaining_counts_down() {
        let mut queue = TaskQueue::new(vec![task("a", 0), task("b", 1)]).unwrap();
        assert_eq!(queue.remaining(), 2);
        queue.next();
        assert_eq!(queue.remaining(), 1);
    }

    #[test]
    fn test_empty_queue_is_valid() {
        let queue = TaskQueue::new(Vec::new()).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let bad = Task::new("q1", "Hello?", Duration::ZERO, 0);
        let err = TaskQueue::new(vec![bad]).unwrap_err();
        assert!(matches!(err, VivaError::InvalidQuestion { ref id, .. } if id == "q1"));
    }

    #[test]
    fn test_rejects_blank_prompt_and_id() {
        assert!(TaskQueue::new(vec![Task::new("q1", "  ", Duration::from_secs(1), 0)]).is_err());
        assert!(TaskQueue::new(vec![Task::new("", "Hi", Duration::from_secs(1), 0)]).is_err());
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = TaskQueue::new(vec![task("a", 0), task("a", 1)]).unwrap_err();
        assert!(matches!(err, VivaError::DuplicateQuestion { ref id } if id == "a"));
    }

    #[test]
    fn test_from_questions_converts_fields() {
        let mut record = QuestionRecord::new("q7", "Describe a deadlock.", 12.5, 4);
        record.wav_file = Some("audio/q7.wav".into());
        record.weight = 2.0;

        let mut queue = TaskQueue::from_questions(&[record]).unwrap();
        let task = queue.next().unwrap();
        assert_eq!(task.id, "q7");
        assert_eq!(task.timeout, Duration::from_millis(12_500));
        assert_eq!(task.order, 4);
        assert_eq!(task.weight, 2.0);
        assert_eq!(task.wav_file, Some(PathBuf::from("audio/q7.wav")));
    }

    #[test]
    fn test_from_questions_rejects_negative_timeout() {
        let record = QuestionRecord::new("q1", "Hello?", -1.0, 0);
        assert!(TaskQueue::from_questions(&[record]).is_err());
    }
}
