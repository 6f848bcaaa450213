//! Model-backed strategist

use crate::client::{Completion, LlmClient};
use crate::extract::parse_reply;
use crate::prompts;
use analyst_core::{Capability, CapabilityError, StrategyDecision, StrategyInput, StrategyKind};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const NAME: &str = "strategist";

#[derive(Debug, Deserialize)]
struct Decision {
    scout: bool,
    vision: bool,
    #[serde(default)]
    rationale: String,
}

pub struct LlmStrategist {
    client: Arc<dyn LlmClient>,
}

impl LlmStrategist {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Capability<StrategyInput, StrategyDecision> for LlmStrategist {
    fn name(&self) -> &str {
        NAME
    }

    async fn invoke(&self, input: StrategyInput) -> Result<StrategyDecision, CapabilityError> {
        let request = Completion::text(prompts::strategist(&input.question, &input.previews))
            .with_max_tokens(1024);
        let reply = self
            .client
            .complete(request)
            .await
            .map_err(|e| e.into_capability(NAME))?;

        let decision: Decision =
            parse_reply(&reply).map_err(|reason| CapabilityError::malformed(NAME, reason))?;
        Ok(StrategyDecision::new(
            StrategyKind::from_flags(decision.scout, decision.vision),
            decision.rationale,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockLlmClient;
    use analyst_core::ArtifactManifest;

    fn input() -> StrategyInput {
        StrategyInput {
            question: Arc::from("What is in the chart?"),
            manifest: Arc::new(ArtifactManifest::default()),
            previews: Arc::from("chart.png: Binary file, Size: 8 bytes"),
        }
    }

    #[tokio::test]
    async fn flags_become_strategy() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .withf(|req| req.prompt_text().contains("What is in the chart?"))
            .returning(|_| {
                Ok(r#"{"scout": false, "vision": true, "rationale": "only an image"}"#.into())
            });

        let decision = LlmStrategist::new(Arc::new(client)).invoke(input()).await.unwrap();
        assert_eq!(decision.kind, StrategyKind::VisionOnly);
        assert_eq!(decision.rationale, "only an image");
    }

    #[tokio::test]
    async fn prose_reply_is_malformed() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .returning(|_| Ok("I think you should scout.".into()));

        let err = LlmStrategist::new(Arc::new(client)).invoke(input()).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Malformed { .. }));
    }
}
