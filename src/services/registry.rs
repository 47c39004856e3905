use std::collections::HashMap;

use crate::models::job::{JobHandle, JobState};

/// Submitted jobs keyed by label, in insertion order.
#[derive(Debug, Default)]
pub struct JobRegistry {
    handles: Vec<JobHandle>,
    index: HashMap<String, usize>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handle: JobHandle) -> Result<(), RegistryError> {
        let label = handle.label().to_string();
        if self.index.contains_key(&label) {
            return Err(RegistryError::DuplicateLabel(label));
        }
        self.index.insert(label, self.handles.len());
        self.handles.push(handle);
        Ok(())
    }

    /// Advance a job's state. Repeating the current state is a no-op;
    /// any move backwards or out of a terminal state is rejected and the
    /// stored state is left untouched.
    pub fn update_state(&mut self, label: &str, new_state: JobState) -> Result<(), RegistryError> {
        let handle = self.get_mut(label)?;
        if !handle.state.can_advance_to(new_state) {
            return Err(RegistryError::IllegalTransition {
                label: label.to_string(),
                from: handle.state,
                to: new_state,
            });
        }
        handle.set_state(new_state);
        Ok(())
    }

    pub fn set_note(&mut self, label: &str, note: impl Into<String>) -> Result<(), RegistryError> {
        self.get_mut(label)?.note = Some(note.into());
        Ok(())
    }

    /// True when every stored job is terminal (vacuously true when empty).
    pub fn all_terminal(&self) -> bool {
        self.handles.iter().all(|h| h.state.is_terminal())
    }

    /// Labels of non-terminal jobs, in insertion order.
    pub fn unfinished(&self) -> Vec<String> {
        self.handles
            .iter()
            .filter(|h| !h.state.is_terminal())
            .map(|h| h.label().to_string())
            .collect()
    }

    pub fn get(&self, label: &str) -> Option<&JobHandle> {
        self.index.get(label).map(|&i| &self.handles[i])
    }

    pub fn handles(&self) -> &[JobHandle] {
        &self.handles
    }

    pub fn with_state(&self, state: JobState) -> impl Iterator<Item = &JobHandle> {
        self.handles.iter().filter(move |h| h.state == state)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    fn get_mut(&mut self, label: &str) -> Result<&mut JobHandle, RegistryError> {
        let i = *self
            .index
            .get(label)
            .ok_or_else(|| RegistryError::UnknownLabel(label.to_string()))?;
        Ok(&mut self.handles[i])
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Job label '{0}' is already registered")]
    DuplicateLabel(String),

    #[error("No job registered under '{0}'")]
    UnknownLabel(String),

    #[error("Job '{label}' cannot move from {from} to {to}")]
    IllegalTransition {
        label: String,
        from: JobState,
        to: JobState,
    },
}
