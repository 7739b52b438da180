//! Context assembly
//!
//! Builds the [`ComprehensiveContext`] handed to both generation steps: the
//! target story, its sibling stories, the plan's technical notes and the
//! requirements' business notes, each trimmed to a configured size.
//! Trimming keeps the head of every list and string, so the same inputs
//! always produce the same bundle.

use aipo_config::ContextConfig;
use aipo_utils::error::GenerationError;
use aipo_utils::types::StoryGenerationId;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ports::PipelineStore;
use crate::types::{ComprehensiveContext, UserStory};

const TRUNCATION_MARKER: &str = "...[truncated]";

/// Cap for one-line story fields (title, priority).
const MAX_HEADING_CHARS: usize = 200;

/// Size limits applied while assembling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextLimits {
    pub max_related_stories: usize,
    /// Per story: bounds the description, and separately the acceptance criteria.
    pub max_story_chars: usize,
    pub max_technical_chars: usize,
    pub max_business_chars: usize,
    pub technology_stack: String,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self::from(&ContextConfig::default())
    }
}

impl From<&ContextConfig> for ContextLimits {
    fn from(config: &ContextConfig) -> Self {
        Self {
            max_related_stories: config.max_related_stories(),
            max_story_chars: config.max_story_chars(),
            max_technical_chars: config.max_technical_chars(),
            max_business_chars: config.max_business_chars(),
            technology_stack: config.technology_stack().to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ContextAssembler {
    store: Arc<dyn PipelineStore>,
    limits: ContextLimits,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn PipelineStore>, limits: ContextLimits) -> Self {
        Self { store, limits }
    }

    #[must_use]
    pub fn limits(&self) -> &ContextLimits {
        &self.limits
    }

    /// Assemble the context for the story at `story_index`.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::ContextAssembly` when the stories or plan
    /// cannot be loaded or `story_index` is out of range.
    pub async fn assemble(
        &self,
        story_generation_id: StoryGenerationId,
        story_index: usize,
    ) -> Result<ComprehensiveContext, GenerationError> {
        let stories = self
            .store
            .get_approved_stories(story_generation_id)
            .await
            .map_err(|e| assembly_error(format!("failed to load stories: {e}")))?
            .ok_or_else(|| {
                assembly_error(format!(
                    "story generation {story_generation_id} has no approved stories"
                ))
            })?;

        let Some(target) = stories.get(story_index) else {
            return Err(assembly_error(format!(
                "story index {story_index} is out of range for {} stories",
                stories.len()
            )));
        };
        let target_story = self.trim_story(target);

        let mut related = related_stories(&stories, story_index);
        if related.len() > self.limits.max_related_stories {
            warn!(
                available = related.len(),
                kept = self.limits.max_related_stories,
                "Truncating related stories"
            );
            related.truncate(self.limits.max_related_stories);
        }
        let related_stories: Vec<UserStory> = related.iter().map(|s| self.trim_story(s)).collect();

        let planning_id = self
            .store
            .get_planning_id(story_generation_id)
            .await
            .map_err(|e| assembly_error(format!("failed to resolve project plan: {e}")))?
            .ok_or_else(|| {
                assembly_error(format!(
                    "no project plan is linked to story generation {story_generation_id}"
                ))
            })?;

        let technical = self
            .store
            .get_technical_context(planning_id)
            .await
            .map_err(|e| assembly_error(format!("failed to load technical context: {e}")))?
            .unwrap_or_default();
        let technical_context = with_technology_stack(
            &truncate_text(&technical, self.limits.max_technical_chars),
            &self.limits.technology_stack,
        );

        let business = match self
            .store
            .get_requirements_analysis_id(planning_id)
            .await
            .map_err(|e| assembly_error(format!("failed to resolve requirements: {e}")))?
        {
            Some(requirements_id) => self
                .store
                .get_business_context(requirements_id)
                .await
                .map_err(|e| assembly_error(format!("failed to load business context: {e}")))?
                .unwrap_or_default(),
            None => String::new(),
        };
        let business_context = truncate_text(&business, self.limits.max_business_chars);

        let mut context = ComprehensiveContext {
            story_generation_id,
            planning_id,
            story_index,
            target_story,
            related_stories,
            technical_context,
            business_context,
            estimated_tokens: 0,
        };
        context.estimated_tokens = estimate_tokens(&render_context(&context));

        debug!(
            story_generation_id = %story_generation_id,
            story_index = story_index,
            related = context.related_stories.len(),
            estimated_tokens = context.estimated_tokens,
            "Context assembled"
        );
        Ok(context)
    }

    /// Every text field of the story is bounded by `max_story_chars`; the
    /// title and priority also by [`MAX_HEADING_CHARS`].
    fn trim_story(&self, story: &UserStory) -> UserStory {
        let budget = self.limits.max_story_chars;
        let heading = MAX_HEADING_CHARS.min(budget);
        UserStory {
            title: truncate_text(&story.title, heading),
            description: truncate_text(&story.description, budget),
            acceptance_criteria: trim_criteria(&story.acceptance_criteria, budget),
            priority: story.priority.as_deref().map(|p| truncate_text(p, heading)),
            story_points: story.story_points,
        }
    }
}

/// Keep criteria head-first until `budget` characters are spent.
///
/// The criterion that crosses the budget is cut; the rest are replaced by a
/// single count line. Each criterion costs at least one character, so the
/// number kept is bounded too.
fn trim_criteria(criteria: &[String], budget: usize) -> Vec<String> {
    let mut remaining = budget;
    let mut kept = Vec::new();
    for criterion in criteria {
        if remaining == 0 {
            let omitted = criteria.len() - kept.len();
            kept.push(format!("...[{omitted} more criteria omitted]"));
            break;
        }
        kept.push(truncate_text(criterion, remaining));
        remaining = remaining.saturating_sub(criterion.chars().count().max(1));
    }
    kept
}

fn assembly_error(reason: String) -> GenerationError {
    GenerationError::ContextAssembly { reason }
}

/// Every story except the one at `target_index`, in original order.
#[must_use]
pub fn related_stories(stories: &[UserStory], target_index: usize) -> Vec<UserStory> {
    stories
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != target_index)
        .map(|(_, story)| story.clone())
        .collect()
}

/// Keep the first `max_chars` characters, marking the cut.
#[must_use]
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{TRUNCATION_MARKER}", &text[..idx]),
        None => text.to_string(),
    }
}

fn with_technology_stack(technical: &str, stack: &str) -> String {
    let technical = technical.trim_end();
    if technical.is_empty() {
        format!("Technology Stack: {stack}")
    } else {
        format!("{technical}\n\nTechnology Stack: {stack}")
    }
}

/// Rough token count: four characters per token, rounded up.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Markdown rendering used in prompts and by `aipo context`.
#[must_use]
pub fn render_context(context: &ComprehensiveContext) -> String {
    let mut out = String::new();
    out.push_str("## Target Story\n\n");
    out.push_str(&render_story(&context.target_story));

    if !context.related_stories.is_empty() {
        out.push_str("\n## Related Stories\n\n");
        for story in &context.related_stories {
            out.push_str(&render_story(story));
            out.push('\n');
        }
    }

    out.push_str("\n## Technical Context\n\n");
    out.push_str(&context.technical_context);
    out.push('\n');

    if !context.business_context.is_empty() {
        out.push_str("\n## Business Context\n\n");
        out.push_str(&context.business_context);
        out.push('\n');
    }
    out
}

fn render_story(story: &UserStory) -> String {
    let mut out = format!("### {}\n", story.title);
    if let Some(priority) = &story.priority {
        out.push_str(&format!("Priority: {priority}\n"));
    }
    if let Some(points) = story.story_points {
        out.push_str(&format!("Story points: {points}\n"));
    }
    if !story.description.is_empty() {
        out.push('\n');
        out.push_str(&story.description);
        out.push('\n');
    }
    if !story.acceptance_criteria.is_empty() {
        out.push_str("\nAcceptance criteria:\n");
        for criterion in &story.acceptance_criteria {
            out.push_str(&format!("- {criterion}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryPipelineStore;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn stories(n: usize) -> Vec<UserStory> {
        (0..n)
            .map(|i| UserStory::new(format!("Story {i}"), format!("Description {i}")))
            .collect()
    }

    fn assembler(store: InMemoryPipelineStore, limits: ContextLimits) -> ContextAssembler {
        ContextAssembler::new(Arc::new(store), limits)
    }

    #[test]
    fn test_related_stories_excludes_target_in_order() {
        let all = stories(5);
        let related = related_stories(&all, 1);
        let titles: Vec<_> = related.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Story 0", "Story 2", "Story 3", "Story 4"]);
    }

    proptest! {
        #[test]
        fn prop_related_stories_exclude_only_the_target(
            (n, target) in (2usize..40).prop_flat_map(|n| (Just(n), 0..n))
        ) {
            let all = stories(n);
            let related = related_stories(&all, target);
            prop_assert_eq!(related.len(), n - 1);
            let expected: Vec<&UserStory> = all
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != target)
                .map(|(_, s)| s)
                .collect();
            prop_assert!(related.iter().zip(expected).all(|(a, b)| a == b));
        }
    }

    #[test]
    fn test_truncate_text_marks_cut() {
        assert_eq!(truncate_text("abcdef", 10), "abcdef");
        assert_eq!(truncate_text("abcdef", 3), "abc...[truncated]");
        assert_eq!(truncate_text("ääää", 2), "ää...[truncated]");
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[tokio::test]
    async fn test_assemble_appends_technology_stack() {
        let (store, ids) = InMemoryPipelineStore::approved_chain(stories(5));
        store.set_technical_context(ids.planning_id, "Layered architecture with EF Core.");
        store.set_business_context(ids.requirements_analysis_id, "Reduce checkout time.");

        let context = assembler(store, ContextLimits::default())
            .assemble(ids.story_generation_id, 1)
            .await
            .unwrap();

        assert_eq!(context.target_story.title, "Story 1");
        assert_eq!(context.related_stories.len(), 4);
        assert_eq!(
            context.technical_context,
            "Layered architecture with EF Core.\n\nTechnology Stack: .NET 9"
        );
        assert_eq!(context.business_context, "Reduce checkout time.");
        assert!(context.estimated_tokens > 0);
    }

    #[tokio::test]
    async fn test_assemble_applies_limits_head_first() {
        let (store, ids) = InMemoryPipelineStore::approved_chain(stories(6));
        store.set_technical_context(ids.planning_id, "x".repeat(50));
        let limits = ContextLimits {
            max_related_stories: 2,
            max_story_chars: 5,
            max_technical_chars: 10,
            max_business_chars: 10,
            technology_stack: "Rust".to_string(),
        };

        let context = assembler(store, limits)
            .assemble(ids.story_generation_id, 0)
            .await
            .unwrap();

        let titles: Vec<_> = context.related_stories.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Story 1", "Story 2"]);
        assert_eq!(context.related_stories[0].description, "Descr...[truncated]");
        assert!(context.technical_context.starts_with("xxxxxxxxxx...[truncated]"));
        assert!(context.technical_context.ends_with("Technology Stack: Rust"));
    }

    #[test]
    fn test_trim_criteria_spends_budget_head_first() {
        let criteria: Vec<String> = ["abcd", "efgh", "ijkl", "mnop"].map(String::from).to_vec();
        assert_eq!(
            trim_criteria(&criteria, 6),
            vec!["abcd", "ef...[truncated]", "...[2 more criteria omitted]"]
        );
        assert_eq!(trim_criteria(&criteria, 100), criteria);

        let empties = vec![String::new(); 10];
        assert_eq!(trim_criteria(&empties, 3).len(), 4);
    }

    #[tokio::test]
    async fn test_oversized_titles_and_criteria_stay_within_limits() {
        let huge = |c: char| c.to_string().repeat(200_000);
        let oversized: Vec<UserStory> = (0..3)
            .map(|_| {
                let mut story = UserStory::new(huge('T'), huge('D')).with_criteria([huge('C')]);
                story.priority = Some(huge('P'));
                story
            })
            .collect();
        let (store, ids) = InMemoryPipelineStore::approved_chain(oversized);
        let limits = ContextLimits::default();

        let context = assembler(store, limits.clone())
            .assemble(ids.story_generation_id, 0)
            .await
            .unwrap();

        let marker = TRUNCATION_MARKER.len();
        assert!(context.target_story.title.chars().count() <= MAX_HEADING_CHARS + marker);
        let criteria_chars: usize = context
            .target_story
            .acceptance_criteria
            .iter()
            .map(|c| c.chars().count())
            .sum();
        assert!(criteria_chars <= limits.max_story_chars + marker);

        let per_story = MAX_HEADING_CHARS * 2 + limits.max_story_chars * 2 + 4 * marker + 64;
        let ceiling = (3 * per_story
            + limits.max_technical_chars
            + limits.max_business_chars
            + limits.technology_stack.len()
            + 256)
            .div_ceil(4);
        assert!(
            context.estimated_tokens <= ceiling,
            "estimated_tokens {} exceeds {ceiling}",
            context.estimated_tokens
        );
    }

    #[tokio::test]
    async fn test_assemble_is_deterministic() {
        let (store, ids) = InMemoryPipelineStore::approved_chain(stories(4));
        let assembler = assembler(store, ContextLimits::default());
        let first = assembler.assemble(ids.story_generation_id, 2).await.unwrap();
        let second = assembler.assemble(ids.story_generation_id, 2).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_out_of_range_index_is_an_error() {
        let (store, ids) = InMemoryPipelineStore::approved_chain(stories(2));
        let err = assembler(store, ContextLimits::default())
            .assemble(ids.story_generation_id, 2)
            .await
            .unwrap_err();
        assert_eq!(err.component(), "context-assembler");
        assert!(err.to_string().contains("out of range"));
    }

    #[tokio::test]
    async fn test_unknown_generation_is_an_error() {
        let err = assembler(InMemoryPipelineStore::default(), ContextLimits::default())
            .assemble(Uuid::new_v4(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::ContextAssembly { .. }));
    }
}
