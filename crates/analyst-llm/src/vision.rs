//! Model-backed vision extractor

use crate::client::{Completion, LlmClient};
use crate::extract::parse_reply;
use crate::prompts;
use analyst_core::{AcquisitionInput, Capability, CapabilityError, VisionFindings};
use async_trait::async_trait;
use std::sync::Arc;

const NAME: &str = "vision";

pub struct LlmVisionExtractor {
    client: Arc<dyn LlmClient>,
}

impl LlmVisionExtractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Capability<AcquisitionInput, VisionFindings> for LlmVisionExtractor {
    fn name(&self) -> &str {
        NAME
    }

    async fn invoke(&self, input: AcquisitionInput) -> Result<VisionFindings, CapabilityError> {
        let artifact = &input.artifact;
        if !artifact.kind().is_image() {
            return Err(CapabilityError::unavailable(
                NAME,
                format!("{} is not an image", artifact.name()),
            ));
        }

        let request = Completion::text(prompts::vision(&input.question, artifact))
            .with_image(artifact.kind().media_type(artifact.name()), artifact.bytes().to_vec())
            .with_max_tokens(4096);
        let reply = self
            .client
            .complete(request)
            .await
            .map_err(|e| e.into_capability(NAME))?;

        let findings: VisionFindings =
            parse_reply(&reply).map_err(|reason| CapabilityError::malformed(NAME, reason))?;
        if findings.is_empty() {
            return Err(CapabilityError::malformed(NAME, "nothing was extracted"));
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ContentPart, MockLlmClient};
    use analyst_core::{Artifact, ArtifactKind};

    fn input(kind: ArtifactKind) -> AcquisitionInput {
        AcquisitionInput {
            question: Arc::from("Which month peaked?"),
            artifact: Arc::new(Artifact::new("chart.png", kind, vec![0x89, b'P', b'N', b'G']).unwrap()),
        }
    }

    #[tokio::test]
    async fn image_is_attached_and_tables_parsed() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .withf(|req| {
                req.parts.iter().any(|p| {
                    matches!(p, ContentPart::Image { media_type, .. } if media_type == "image/png")
                })
            })
            .returning(|_| {
                Ok(r#"{"tables": [{"header": ["month", "visits"], "rows": [["jan", "10"]]}], "insights": ["peak in jan"]}"#.into())
            });

        let findings = LlmVisionExtractor::new(Arc::new(client))
            .invoke(input(ArtifactKind::Image))
            .await
            .unwrap();
        assert_eq!(findings.tables[0].header, ["month", "visits"]);
        assert_eq!(findings.insights, ["peak in jan"]);
    }

    #[tokio::test]
    async fn empty_extraction_is_malformed() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .returning(|_| Ok(r#"{"tables": [], "insights": []}"#.into()));

        let err = LlmVisionExtractor::new(Arc::new(client))
            .invoke(input(ArtifactKind::Image))
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Malformed { .. }));
    }

    #[tokio::test]
    async fn non_images_are_refused_without_a_call() {
        let client = MockLlmClient::new();
        let err = LlmVisionExtractor::new(Arc::new(client))
            .invoke(input(ArtifactKind::Tabular))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
