//! Model-backed code author

use crate::client::{Completion, LlmClient};
use crate::extract::extract_code;
use crate::prompts;
use analyst_core::{AuthorInput, Capability, CapabilityError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const NAME: &str = "code-author";

pub struct LlmCodeAuthor {
    client: Arc<dyn LlmClient>,
}

impl LlmCodeAuthor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Capability<AuthorInput, String> for LlmCodeAuthor {
    fn name(&self) -> &str {
        NAME
    }

    async fn invoke(&self, input: AuthorInput) -> Result<String, CapabilityError> {
        let prompt = match &input.prior {
            None => prompts::author(&input.plan),
            Some(prior) => {
                debug!(revision = prior.program.revision, "authoring in debug mode");
                prompts::debug(&input.plan, prior)
            }
        };

        let reply = self
            .client
            .complete(Completion::text(prompt).with_max_tokens(4096))
            .await
            .map_err(|e| e.into_capability(NAME))?;

        let source = extract_code(&reply);
        if source.is_empty() {
            return Err(CapabilityError::malformed(NAME, "reply contained no program"));
        }
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockLlmClient;
    use analyst_core::{AnalysisPlan, GeneratedProgram, OutputShape, PriorAttempt, StrategyKind};

    fn plan() -> Arc<AnalysisPlan> {
        Arc::new(AnalysisPlan {
            question: "What is 2 + 2?".into(),
            strategy: StrategyKind::Neither,
            steps: Vec::new(),
            output: OutputShape::Any,
            limited_context: false,
            context_notes: Vec::new(),
            insufficient_data: false,
            requires_network: false,
            web_references: Vec::new(),
        })
    }

    #[tokio::test]
    async fn first_attempt_uses_the_authoring_prompt() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .withf(|req| req.prompt_text().contains("expert Python programmer"))
            .returning(|_| Ok("```python\nprint(4)\n```".into()));

        let source = LlmCodeAuthor::new(Arc::new(client))
            .invoke(AuthorInput { plan: plan(), prior: None })
            .await
            .unwrap();
        assert_eq!(source, "print(4)");
    }

    #[tokio::test]
    async fn revisions_use_the_debug_prompt() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .withf(|req| {
                let text = req.prompt_text();
                text.contains("expert Python debugger") && text.contains("print(2 + '2')")
            })
            .returning(|_| Ok("```python\nprint(2 + 2)\n```".into()));

        let prior = PriorAttempt {
            program: GeneratedProgram::new("print(2 + '2')", 1),
            outcome: None,
            failure: "program failed: TypeError".into(),
        };
        let source = LlmCodeAuthor::new(Arc::new(client))
            .invoke(AuthorInput { plan: plan(), prior: Some(prior) })
            .await
            .unwrap();
        assert_eq!(source, "print(2 + 2)");
    }

    #[tokio::test]
    async fn empty_fence_is_malformed() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .returning(|_| Ok("```python\n```".into()));

        let err = LlmCodeAuthor::new(Arc::new(client))
            .invoke(AuthorInput { plan: plan(), prior: None })
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Malformed { .. }));
    }
}
