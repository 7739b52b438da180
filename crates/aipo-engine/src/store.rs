//! Generation records backing `get_status`, `get_artifacts` and `package`.

use aipo_utils::types::{GenerationId, StoryGenerationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::state::{GenerationState, StateTransition};
use crate::types::CodeGenerationResult;

/// Everything known about one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation_id: GenerationId,
    pub story_generation_id: StoryGenerationId,
    pub story_index: usize,
    pub state: GenerationState,
    pub history: Vec<StateTransition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CodeGenerationResult>,
    pub created_at: DateTime<Utc>,
}

impl GenerationRecord {
    #[must_use]
    pub fn new(
        generation_id: GenerationId,
        story_generation_id: StoryGenerationId,
        story_index: usize,
    ) -> Self {
        Self {
            generation_id,
            story_generation_id,
            story_index,
            state: GenerationState::NotStarted,
            history: Vec::new(),
            error: None,
            result: None,
            created_at: Utc::now(),
        }
    }

    /// Time of the last transition, or creation.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.history.last().map_or(self.created_at, |t| t.at)
    }
}

/// Per-run bookkeeping. Implementations must tolerate concurrent runs.
pub trait GenerationStore: Send + Sync {
    fn create(&self, record: GenerationRecord);

    fn record_transition(&self, id: GenerationId, transition: StateTransition);

    fn record_error(&self, id: GenerationId, error: String);

    fn complete(&self, id: GenerationId, result: CodeGenerationResult);

    fn get(&self, id: GenerationId) -> Option<GenerationRecord>;

    /// Every record, oldest first.
    fn list(&self) -> Vec<GenerationRecord>;
}

#[derive(Debug, Default)]
pub struct InMemoryGenerationStore {
    records: RwLock<HashMap<GenerationId, GenerationRecord>>,
}

impl InMemoryGenerationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, id: GenerationId, f: impl FnOnce(&mut GenerationRecord)) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = records.get_mut(&id) {
            f(record);
        }
    }
}

impl GenerationStore for InMemoryGenerationStore {
    fn create(&self, record: GenerationRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.generation_id, record);
    }

    fn record_transition(&self, id: GenerationId, transition: StateTransition) {
        self.update(id, |record| {
            record.state = transition.to;
            record.history.push(transition);
        });
    }

    fn record_error(&self, id: GenerationId, error: String) {
        self.update(id, |record| record.error = Some(error));
    }

    fn complete(&self, id: GenerationId, result: CodeGenerationResult) {
        self.update(id, |record| record.result = Some(result));
    }

    fn get(&self, id: GenerationId) -> Option<GenerationRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn list(&self) -> Vec<GenerationRecord> {
        let mut records: Vec<GenerationRecord> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_transitions_update_state_and_history() {
        let store = InMemoryGenerationStore::new();
        let id = Uuid::new_v4();
        store.create(GenerationRecord::new(id, Uuid::new_v4(), 0));

        let at = Utc::now();
        store.record_transition(
            id,
            StateTransition {
                from: GenerationState::NotStarted,
                to: GenerationState::ValidatingDependencies,
                at,
            },
        );
        store.record_error(id, "boom".to_string());

        let record = store.get(id).unwrap();
        assert_eq!(record.state, GenerationState::ValidatingDependencies);
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.updated_at(), at);
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_unknown_ids_are_ignored() {
        let store = InMemoryGenerationStore::new();
        store.record_error(Uuid::new_v4(), "ignored".to_string());
        assert!(store.get(Uuid::new_v4()).is_none());
        assert!(store.list().is_empty());
    }
}
