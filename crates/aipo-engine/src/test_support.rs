//! In-memory collaborators for tests.

use aipo_llm::{LlmBackend, LlmError, LlmInvocation, LlmResult, ProviderHealth};
use aipo_utils::types::{ApprovalStatus, PlanningId, RequirementsAnalysisId, StoryGenerationId};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;
use uuid::Uuid;

use crate::ports::{Instruction, InstructionSource, PipelineStore};
use crate::types::{ComprehensiveContext, UserStory};

/// Backend that replays scripted responses in order.
pub struct ScriptedBackend {
    name: String,
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    hang: bool,
    calls: AtomicUsize,
    invocations: Mutex<Vec<LlmInvocation>>,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            hang: false,
            calls: AtomicUsize::new(0),
            invocations: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn respond(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    #[must_use]
    pub fn fail(self, error: LlmError) -> Self {
        self.push(Err(error))
    }

    /// Never answer; the call stays pending until dropped.
    #[must_use]
    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    fn push(self, entry: Result<String, LlmError>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(entry);
        self
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn invocations(&self) -> Vec<LlmInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn last_invocation(&self) -> Option<LlmInvocation> {
        self.invocations().pop()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let model = if inv.model.is_empty() {
            "scripted-default".to_string()
        } else {
            inv.model.clone()
        };
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(inv);

        if self.hang {
            std::future::pending::<()>().await;
        }

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Transport("script exhausted".to_string())));
        next.map(|text| LlmResult::new(text, self.name.clone(), model).with_tokens(100, 200))
    }

    async fn health_check(&self) -> ProviderHealth {
        ProviderHealth::healthy(self.name.clone(), Duration::from_millis(1))
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        Ok(vec!["scripted-default".to_string()])
    }
}

/// Identifiers of a chain built by [`InMemoryPipelineStore::approved_chain`].
#[derive(Debug, Clone, Copy)]
pub struct ChainIds {
    pub story_generation_id: StoryGenerationId,
    pub planning_id: PlanningId,
    pub requirements_analysis_id: RequirementsAnalysisId,
}

#[derive(Debug, Default)]
struct PipelineData {
    stories: HashMap<StoryGenerationId, Vec<UserStory>>,
    story_planning: HashMap<StoryGenerationId, PlanningId>,
    planning_status: HashMap<PlanningId, ApprovalStatus>,
    planning_requirements: HashMap<PlanningId, RequirementsAnalysisId>,
    requirements_status: HashMap<RequirementsAnalysisId, ApprovalStatus>,
    technical: HashMap<PlanningId, String>,
    business: HashMap<RequirementsAnalysisId, String>,
}

#[derive(Debug, Default)]
pub struct InMemoryPipelineStore {
    data: RwLock<PipelineData>,
}

impl InMemoryPipelineStore {
    /// Approved requirements, plan and stories, linked together.
    #[must_use]
    pub fn approved_chain(stories: Vec<UserStory>) -> (Self, ChainIds) {
        let ids = ChainIds {
            story_generation_id: Uuid::new_v4(),
            planning_id: Uuid::new_v4(),
            requirements_analysis_id: Uuid::new_v4(),
        };
        let store = Self::default();
        {
            let mut data = store.write();
            data.stories.insert(ids.story_generation_id, stories);
            data.story_planning
                .insert(ids.story_generation_id, ids.planning_id);
            data.planning_status
                .insert(ids.planning_id, ApprovalStatus::Approved);
            data.planning_requirements
                .insert(ids.planning_id, ids.requirements_analysis_id);
            data.requirements_status
                .insert(ids.requirements_analysis_id, ApprovalStatus::Approved);
        }
        (store, ids)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, PipelineData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, PipelineData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_planning_status(&self, id: PlanningId, status: ApprovalStatus) {
        self.write().planning_status.insert(id, status);
    }

    pub fn set_requirements_status(&self, id: RequirementsAnalysisId, status: ApprovalStatus) {
        self.write().requirements_status.insert(id, status);
    }

    pub fn set_technical_context(&self, id: PlanningId, text: impl Into<String>) {
        self.write().technical.insert(id, text.into());
    }

    pub fn set_business_context(&self, id: RequirementsAnalysisId, text: impl Into<String>) {
        self.write().business.insert(id, text.into());
    }
}

#[async_trait]
impl PipelineStore for InMemoryPipelineStore {
    async fn get_approved_stories(&self, id: StoryGenerationId) -> Result<Option<Vec<UserStory>>> {
        Ok(self.read().stories.get(&id).cloned())
    }

    async fn get_planning_id(&self, id: StoryGenerationId) -> Result<Option<PlanningId>> {
        Ok(self.read().story_planning.get(&id).copied())
    }

    async fn get_planning_status(&self, id: PlanningId) -> Result<Option<ApprovalStatus>> {
        Ok(self.read().planning_status.get(&id).copied())
    }

    async fn get_requirements_analysis_id(&self, id: PlanningId) -> Result<Option<RequirementsAnalysisId>> {
        Ok(self.read().planning_requirements.get(&id).copied())
    }

    async fn get_requirements_status(&self, id: RequirementsAnalysisId) -> Result<Option<ApprovalStatus>> {
        Ok(self.read().requirements_status.get(&id).copied())
    }

    async fn get_technical_context(&self, id: PlanningId) -> Result<Option<String>> {
        Ok(self.read().technical.get(&id).cloned())
    }

    async fn get_business_context(&self, id: RequirementsAnalysisId) -> Result<Option<String>> {
        Ok(self.read().business.get(&id).cloned())
    }
}

/// Instruction source backed by a fixed map.
#[derive(Debug, Clone, Default)]
pub struct StaticInstructions {
    instructions: HashMap<String, Instruction>,
}

impl StaticInstructions {
    #[must_use]
    pub fn with(mut self, service_name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let is_valid = !content.trim().is_empty();
        self.instructions
            .insert(service_name.into(), Instruction { content, is_valid });
        self
    }
}

#[async_trait]
impl InstructionSource for StaticInstructions {
    async fn get_instruction(&self, service_name: &str) -> Result<Instruction> {
        self.instructions
            .get(service_name)
            .cloned()
            .ok_or_else(|| anyhow!("no instruction named {service_name}"))
    }
}

/// A small context for generator tests.
#[must_use]
pub fn sample_context() -> ComprehensiveContext {
    let target = UserStory::new("Apply discount codes", "As a shopper I want to apply a code")
        .with_criteria(["Valid codes reduce the total", "Expired codes are rejected"]);
    let related = vec![UserStory::new("View cart", "As a shopper I want to see my cart")];
    ComprehensiveContext {
        story_generation_id: Uuid::new_v4(),
        planning_id: Uuid::new_v4(),
        story_index: 0,
        target_story: target,
        related_stories: related,
        technical_context: "Technology Stack: .NET 9".to_string(),
        business_context: "Increase conversion.".to_string(),
        estimated_tokens: 64,
    }
}
