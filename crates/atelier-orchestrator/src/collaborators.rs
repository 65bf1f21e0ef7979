//! Rendering and publishing collaborator boundaries
//!
//! The core does not specify layout or network publishing. It hands the
//! finalized brief to a [`Renderer`] and the artifact to a
//! [`Publisher`]; the shipped implementations write the structured deck
//! to disk and issue a local receipt. Production deployments swap these
//! for real PDF rendering and a platform client.

use async_trait::async_trait;
use atelier_core::{
    ArtifactHandle, AtelierError, ContentBrief, DesignSpec, PostCopy, PublishReceipt, Result,
    VisualPlan,
};
use chrono::Utc;
use std::path::PathBuf;
use uuid::Uuid;

/// Turns a finalized brief into an opaque artifact
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        brief: &ContentBrief,
        design: &DesignSpec,
        visuals: &VisualPlan,
    ) -> Result<ArtifactHandle>;
}

/// Publishes an artifact with its post copy
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, artifact: &ArtifactHandle, post: &PostCopy) -> Result<PublishReceipt>;
}

/// Writes the structured deck (brief + design + visual plan) as JSON
/// into the output directory
pub struct JsonDeckRenderer {
    output_dir: PathBuf,
}

impl JsonDeckRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl Renderer for JsonDeckRenderer {
    async fn render(
        &self,
        brief: &ContentBrief,
        design: &DesignSpec,
        visuals: &VisualPlan,
    ) -> Result<ArtifactHandle> {
        std::fs::create_dir_all(&self.output_dir)?;

        let slug = slugify(&brief.brief_title, 35);
        let stamp = &Uuid::new_v4().to_string()[..8];
        let path = self.output_dir.join(format!("{}_{}.json", slug, stamp));

        let deck = serde_json::json!({
            "brief": brief,
            "design": design,
            "visuals": visuals,
        });
        std::fs::write(&path, serde_json::to_string_pretty(&deck)?)
            .map_err(|e| AtelierError::Render(format!("failed to write deck: {}", e)))?;

        tracing::info!(path = %path.display(), pages = brief.pages.len(), "deck rendered");
        Ok(ArtifactHandle { path })
    }
}

/// Local stand-in for the external publishing service: issues a receipt
/// pointing at the artifact on disk
pub struct LocalPublisher;

#[async_trait]
impl Publisher for LocalPublisher {
    async fn publish(&self, artifact: &ArtifactHandle, post: &PostCopy) -> Result<PublishReceipt> {
        if !artifact.path.exists() {
            return Err(AtelierError::Publish(format!(
                "artifact {} does not exist",
                artifact.path.display()
            )));
        }
        if post.post_text.trim().is_empty() {
            return Err(AtelierError::Publish("post text is empty".to_string()));
        }

        let post_ref = format!("local-{}", &Uuid::new_v4().to_string()[..8]);
        let receipt = PublishReceipt {
            post_ref: post_ref.clone(),
            url: format!("file://{}", artifact.path.display()),
            published_at: Utc::now(),
        };
        tracing::info!(post_ref = %post_ref, "artifact published");
        Ok(receipt)
    }
}

/// Filesystem-safe slug from a title
fn slugify(title: &str, max_len: usize) -> String {
    let cleaned: String = title
        .chars()
        .take(max_len)
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "brief".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::BriefPage;

    fn brief() -> ContentBrief {
        ContentBrief {
            brief_title: "The Agent Economy: What Changes?".to_string(),
            pages: vec![BriefPage {
                page_type: "cover".to_string(),
                title: "The Agent Economy".to_string(),
                point: "Agents change the unit economics of work".to_string(),
                insight: "One operator now ships what a team shipped".to_string(),
                key_stat: "10x".to_string(),
                quote: "The toolchain became the team".to_string(),
            }],
        }
    }

    fn design() -> DesignSpec {
        DesignSpec {
            design_name: "Quiet Authority".to_string(),
            theme: "editorial minimal".to_string(),
            primary_color: "#1a1a2e".to_string(),
            accent_color: "#c9a227".to_string(),
            mood_alignment: "calm over neutral news cycle".to_string(),
            image_brief: "muted architectural abstracts".to_string(),
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("The Agent: Economy?", 50), "The_Agent_Economy");
        assert_eq!(slugify("***", 50), "brief");
        assert!(slugify(&"long ".repeat(30), 35).len() <= 35);
    }

    #[tokio::test]
    async fn test_render_writes_deck() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = JsonDeckRenderer::new(dir.path());

        let artifact = renderer
            .render(&brief(), &design(), &VisualPlan { pages: vec![] })
            .await
            .unwrap();
        assert!(artifact.path.exists());

        let content = std::fs::read_to_string(&artifact.path).unwrap();
        let deck: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(deck["design"]["design_name"], "Quiet Authority");
    }

    #[tokio::test]
    async fn test_publish_requires_artifact_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = JsonDeckRenderer::new(dir.path());
        let artifact = renderer
            .render(&brief(), &design(), &VisualPlan { pages: vec![] })
            .await
            .unwrap();

        let post = PostCopy {
            post_text: "A new brief is out.".to_string(),
            document_title: "The Agent Economy".to_string(),
            hashtags: vec![],
        };
        let receipt = LocalPublisher.publish(&artifact, &post).await.unwrap();
        assert!(receipt.post_ref.starts_with("local-"));

        let missing = ArtifactHandle {
            path: dir.path().join("missing.json"),
        };
        assert!(LocalPublisher.publish(&missing, &post).await.is_err());

        let empty_post = PostCopy {
            post_text: "  ".to_string(),
            document_title: String::new(),
            hashtags: vec![],
        };
        assert!(LocalPublisher.publish(&artifact, &empty_post).await.is_err());
    }
}
