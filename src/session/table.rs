//! Turn table: per-task status plus the active task pointer.
//!
//! The table is only ever touched through [`SharedTable`], whose mutex is the
//! turn-exclusion lock. Actors hold it around a single read-modify-write and
//! release it before any long wait (synthesis, playback, capture).

use crate::error::{Result, VivaError};
use crate::session::state::{TaskStatus, TurnEvent, TurnState};
use crate::session::task::Task;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Turn table shared between orchestrator and actors.
pub type SharedTable = Arc<Mutex<TurnTable>>;

#[derive(Debug, Default)]
pub struct TurnTable {
    statuses: BTreeMap<String, TaskStatus>,
    active: Option<String>,
}

impl TurnTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedTable {
        Arc::new(Mutex::new(self))
    }

    /// Registers a freshly dequeued task in `WaitingForAgent`.
    pub fn insert(&mut self, task: &Task) {
        self.statuses.insert(task.id.clone(), TaskStatus::new(task));
    }

    /// Claims the active pointer for `id`.
    ///
    /// # Errors
    /// `UnknownTask` if `id` was never inserted; `TurnBusy` if another task
    /// currently holds the pointer.
    pub fn activate(&mut self, id: &str) -> Result<()> {
        if !self.statuses.contains_key(id) {
            return Err(VivaError::UnknownTask { id: id.to_string() });
        }
        match &self.active {
            Some(active) if active != id => Err(VivaError::TurnBusy {
                requested: id.to_string(),
                active: active.clone(),
            }),
            _ => {
                self.active = Some(id.to_string());
                Ok(())
            }
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.as_deref() == Some(id)
    }

    pub fn state(&self, id: &str) -> Option<TurnState> {
        self.statuses.get(id).map(|status| status.state)
    }

    pub fn status(&self, id: &str) -> Option<&TaskStatus> {
        self.statuses.get(id)
    }

    /// Applies `event` to `id`. Reaching a terminal state clears the pointer.
    pub fn apply(&mut self, id: &str, event: TurnEvent) -> Result<TurnState> {
        let status = self
            .statuses
            .get_mut(id)
            .ok_or_else(|| VivaError::UnknownTask { id: id.to_string() })?;
        let state = status.apply(event)?;
        if state.is_terminal() && self.active.as_deref() == Some(id) {
            self.active = None;
        }
        Ok(state)
    }

    /// Stores the answer and completes the task.
    pub fn record_answer(&mut self, id: &str, answer: String) -> Result<()> {
        self.apply(id, TurnEvent::AnswerRecorded)?;
        if let Some(status) = self.statuses.get_mut(id) {
            status.answer = Some(answer);
        }
        Ok(())
    }

    /// Whether `id` is registered and not finished yet.
    pub fn is_open(&self, id: &str) -> bool {
        matches!(self.state(id), Some(state) if !state.is_terminal())
    }

    pub fn all_terminal(&self) -> bool {
        self.statuses
            .values()
            .all(|status| status.state.is_terminal())
    }

    /// Statuses sorted by question order.
    pub fn ordered(&self) -> Vec<TaskStatus> {
        let mut statuses: Vec<_> = self.statuses.values().cloned().collect();
        statuses.sort_by_key(|status| status.order);
        statuses
    }

    /// Tasks past `WaitingForAgent` that have not yet finished.
    pub fn in_flight(&self) -> usize {
        self.statuses
            .values()
            .filter(|s| s.state != TurnState::WaitingForAgent && !s.state.is_terminal())
            .count()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}
