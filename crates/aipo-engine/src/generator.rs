//! Test-first generation steps
//!
//! [`TestGenerator`] runs first and receives no prior artifacts.
//! [`ImplementationGenerator`] takes the test artifacts as a required
//! argument, so implementation code is always written against the tests.
//! Each step resolves a provider, sends exactly one request and parses the
//! response into artifacts. Retries belong to the HTTP layer, not here.

use aipo_llm::{LlmFallbackInfo, LlmInvocation, Message, ProviderRegistry};
use aipo_utils::error::GenerationError;
use aipo_utils::types::{GenerationId, GenerationStep};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::context::render_context;
use crate::parse::parse_code_blocks;
use crate::types::{ArtifactType, CodeArtifact, ComprehensiveContext, GenerationWarning};

/// Artifacts from one step plus how they were produced.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub artifacts: Vec<CodeArtifact>,
    pub provider: String,
    pub model_used: String,
    pub fallback: Option<LlmFallbackInfo>,
    pub warnings: Vec<GenerationWarning>,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
}

impl GenerationOutput {
    /// True when the response had no code blocks.
    #[must_use]
    pub fn degraded(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, GenerationWarning::MalformedResponse { .. }))
    }
}

/// Settings shared by both steps.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub timeout: Duration,
    pub default_file_name: String,
}

struct StepRequest<'a> {
    generation_id: GenerationId,
    step: GenerationStep,
    selected_model: &'a str,
    system: &'a str,
    prompt: String,
    forced_type: Option<ArtifactType>,
}

async fn run_step(
    registry: &ProviderRegistry,
    settings: &GeneratorSettings,
    request: StepRequest<'_>,
) -> Result<GenerationOutput, GenerationError> {
    let selection = registry.resolve(request.selected_model).ok_or_else(|| {
        GenerationError::ProviderUnavailable {
            requested: request.selected_model.to_string(),
            reason: if registry.is_empty() {
                "no providers are registered".to_string()
            } else {
                format!(
                    "not registered and no fallback is available (registered: {})",
                    registry.names().join(", ")
                )
            },
        }
    })?;

    let mut warnings = Vec::new();
    if let Some(info) = &selection.fallback {
        warn!(
            step = request.step.as_str(),
            requested = %info.requested_provider,
            fallback = %info.fallback_provider,
            "Using fallback provider"
        );
        warnings.push(GenerationWarning::ProviderFallback { info: info.clone() });
    }

    let invocation = LlmInvocation::new(
        request.generation_id.to_string(),
        request.step.as_str(),
        selection.model_override.clone().unwrap_or_default(),
        settings.timeout,
        vec![Message::system(request.system), Message::user(request.prompt)],
    );
    debug!(
        step = request.step.as_str(),
        provider = %selection.provider,
        prompt_chars = invocation.prompt_chars(),
        "Sending generation request"
    );

    let response = selection.backend.invoke(invocation).await.map_err(|source| {
        GenerationError::GenerationFailure {
            step: request.step,
            provider: selection.provider.clone(),
            source,
        }
    })?;

    let parsed = parse_code_blocks(
        &response.raw_response,
        &settings.default_file_name,
        request.forced_type,
    );
    if parsed.degraded {
        warn!(
            step = request.step.as_str(),
            file_name = %settings.default_file_name,
            "Response contained no code blocks, keeping it as a single artifact"
        );
        warnings.push(GenerationWarning::MalformedResponse {
            step: request.step,
            file_name: settings.default_file_name.clone(),
        });
    }
    info!(
        step = request.step.as_str(),
        provider = %response.provider,
        artifacts = parsed.artifacts.len(),
        "Generation step produced artifacts"
    );

    Ok(GenerationOutput {
        artifacts: parsed.artifacts,
        provider: selection.provider,
        model_used: response.model_used,
        fallback: selection.fallback,
        warnings,
        tokens_input: response.tokens_input,
        tokens_output: response.tokens_output,
    })
}

#[derive(Clone)]
pub struct TestGenerator {
    registry: Arc<ProviderRegistry>,
    settings: GeneratorSettings,
}

impl TestGenerator {
    pub fn new(registry: Arc<ProviderRegistry>, settings: GeneratorSettings) -> Self {
        Self { registry, settings }
    }

    /// Generate test files for the target story. Every artifact is typed `Test`.
    ///
    /// # Errors
    ///
    /// `ProviderUnavailable` when nothing resolves for `selected_model`,
    /// `GenerationFailure` when the AI call fails.
    pub async fn generate(
        &self,
        generation_id: GenerationId,
        instruction: &str,
        context: &ComprehensiveContext,
        selected_model: &str,
    ) -> Result<GenerationOutput, GenerationError> {
        run_step(
            &self.registry,
            &self.settings,
            StepRequest {
                generation_id,
                step: GenerationStep::Tests,
                selected_model,
                system: instruction,
                prompt: test_prompt(context),
                forced_type: Some(ArtifactType::Test),
            },
        )
        .await
    }
}

#[derive(Clone)]
pub struct ImplementationGenerator {
    registry: Arc<ProviderRegistry>,
    settings: GeneratorSettings,
}

impl ImplementationGenerator {
    pub fn new(registry: Arc<ProviderRegistry>, settings: GeneratorSettings) -> Self {
        Self { registry, settings }
    }

    /// Generate implementation files that satisfy `test_artifacts`.
    ///
    /// `test_artifacts` may be empty but must come from the test step.
    ///
    /// # Errors
    ///
    /// As [`TestGenerator::generate`].
    pub async fn generate(
        &self,
        generation_id: GenerationId,
        instruction: &str,
        context: &ComprehensiveContext,
        test_artifacts: &[CodeArtifact],
        selected_model: &str,
    ) -> Result<GenerationOutput, GenerationError> {
        run_step(
            &self.registry,
            &self.settings,
            StepRequest {
                generation_id,
                step: GenerationStep::Implementation,
                selected_model,
                system: instruction,
                prompt: implementation_prompt(context, test_artifacts),
                forced_type: None,
            },
        )
        .await
    }
}

fn test_prompt(context: &ComprehensiveContext) -> String {
    format!(
        "{}\n## Task\n\n\
         Write the unit tests for the target story before any implementation exists. \
         Cover every acceptance criterion. Return each file in its own fenced code block \
         whose info string names the file, for example ```csharp:UserServiceTests.cs.\n",
        render_context(context)
    )
}

fn implementation_prompt(context: &ComprehensiveContext, test_artifacts: &[CodeArtifact]) -> String {
    let mut prompt = render_context(context);
    prompt.push_str("\n## Tests To Satisfy\n\n");
    if test_artifacts.is_empty() {
        prompt.push_str("No tests were produced for this story.\n");
    }
    for artifact in test_artifacts {
        prompt.push_str(&format!("### {}\n\n```\n{}", artifact.file_name, artifact.content));
        if !artifact.content.ends_with('\n') {
            prompt.push('\n');
        }
        prompt.push_str("```\n\n");
    }
    prompt.push_str(
        "## Task\n\n\
         Write the implementation that makes the tests above pass. Return each file in its own \
         fenced code block whose info string names the file, for example ```csharp:UserService.cs.\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedBackend, sample_context};
    use aipo_llm::{LlmBackend, LlmError};

    fn settings(default_file_name: &str) -> GeneratorSettings {
        GeneratorSettings {
            timeout: Duration::from_secs(5),
            default_file_name: default_file_name.to_string(),
        }
    }

    fn registry(backends: &[Arc<ScriptedBackend>]) -> Arc<ProviderRegistry> {
        Arc::new(ProviderRegistry::new(
            backends
                .iter()
                .map(|b| Arc::clone(b) as Arc<dyn LlmBackend>)
                .collect(),
            vec!["nanogpt".to_string(), "openrouter".to_string()],
        ))
    }

    #[tokio::test]
    async fn test_generator_forces_test_type() {
        let backend = Arc::new(ScriptedBackend::new("nanogpt").respond(
            "```csharp:CartCalculator.cs\npublic class CartCalculatorTests {}\n```",
        ));
        let generator = TestGenerator::new(registry(&[backend.clone()]), settings("GeneratedTests.cs"));

        let output = generator
            .generate(GenerationId::new_v4(), "Write tests", &sample_context(), "nanogpt")
            .await
            .unwrap();

        assert_eq!(output.artifacts.len(), 1);
        assert_eq!(output.artifacts[0].file_type, ArtifactType::Test);
        assert_eq!(output.provider, "nanogpt");
        assert!(output.fallback.is_none());
        assert_eq!(backend.call_count(), 1);
        let invocation = backend.last_invocation().unwrap();
        assert_eq!(invocation.step, "tests");
        assert_eq!(invocation.messages[0].content, "Write tests");
    }

    #[tokio::test]
    async fn test_no_code_blocks_degrade_to_default_artifact() {
        let raw = "Sorry, here is a description instead of code.";
        let backend = Arc::new(ScriptedBackend::new("nanogpt").respond(raw));
        let generator =
            ImplementationGenerator::new(registry(&[backend]), settings("GeneratedImplementation.cs"));

        let output = generator
            .generate(GenerationId::new_v4(), "Implement", &sample_context(), &[], "nanogpt")
            .await
            .unwrap();

        assert_eq!(output.artifacts.len(), 1);
        assert_eq!(output.artifacts[0].file_name, "GeneratedImplementation.cs");
        assert_eq!(output.artifacts[0].content, raw);
        assert!(output.degraded());
    }

    #[tokio::test]
    async fn test_implementation_prompt_includes_tests() {
        let backend = Arc::new(ScriptedBackend::new("nanogpt").respond("```csharp:Cart.cs\nclass Cart {}\n```"));
        let generator =
            ImplementationGenerator::new(registry(&[backend.clone()]), settings("GeneratedImplementation.cs"));
        let tests = vec![CodeArtifact::new(
            "CartTests.cs",
            "public class CartTests { }",
            ArtifactType::Test,
        )];

        generator
            .generate(GenerationId::new_v4(), "Implement", &sample_context(), &tests, "nanogpt")
            .await
            .unwrap();

        let prompt = &backend.last_invocation().unwrap().messages[1].content;
        assert!(prompt.contains("## Tests To Satisfy"));
        assert!(prompt.contains("### CartTests.cs"));
        assert!(prompt.contains("public class CartTests { }\n```"));
    }

    #[tokio::test]
    async fn test_fallback_is_surfaced() {
        let backend = Arc::new(ScriptedBackend::new("openrouter").respond("```cs\nclass A {}\n```"));
        let generator = TestGenerator::new(registry(&[backend]), settings("GeneratedTests.cs"));

        let output = generator
            .generate(GenerationId::new_v4(), "Write tests", &sample_context(), "nanogpt:some-model")
            .await
            .unwrap();

        assert_eq!(output.provider, "openrouter");
        let info = output.fallback.unwrap();
        assert_eq!(info.requested_provider, "nanogpt");
        assert!(matches!(
            output.warnings[0],
            GenerationWarning::ProviderFallback { .. }
        ));
    }

    #[tokio::test]
    async fn test_model_override_is_forwarded() {
        let backend = Arc::new(ScriptedBackend::new("nanogpt").respond("```cs\nclass A {}\n```"));
        let generator = TestGenerator::new(registry(&[backend.clone()]), settings("GeneratedTests.cs"));

        generator
            .generate(GenerationId::new_v4(), "Write tests", &sample_context(), "nanogpt:zai/glm-4.6")
            .await
            .unwrap();
        assert_eq!(backend.last_invocation().unwrap().model, "zai/glm-4.6");
    }

    #[tokio::test]
    async fn test_no_provider_is_unavailable() {
        let generator = TestGenerator::new(registry(&[]), settings("GeneratedTests.cs"));
        let err = generator
            .generate(GenerationId::new_v4(), "Write tests", &sample_context(), "nanogpt")
            .await
            .unwrap_err();
        assert_eq!(err.component(), "provider-registry");
    }

    #[tokio::test]
    async fn test_failed_call_is_generation_failure_without_retry() {
        let backend = Arc::new(
            ScriptedBackend::new("nanogpt").fail(LlmError::ProviderOutage("503".to_string())),
        );
        let generator =
            ImplementationGenerator::new(registry(&[backend.clone()]), settings("GeneratedImplementation.cs"));

        let err = generator
            .generate(GenerationId::new_v4(), "Implement", &sample_context(), &[], "nanogpt")
            .await
            .unwrap_err();

        assert_eq!(err.component(), "implementation-generator");
        assert!(matches!(
            err,
            GenerationError::GenerationFailure {
                source: LlmError::ProviderOutage(_),
                ..
            }
        ));
        assert_eq!(backend.call_count(), 1);
    }
}
