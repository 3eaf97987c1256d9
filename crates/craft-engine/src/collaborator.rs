//! External generation collaborators
//!
//! The describe and fuse services are black boxes behind two traits. Their
//! wire formats belong to the implementations; this module only fixes the
//! instructions sent and how a multi-part reply is read back.

use crate::error::GenerationError;
use async_trait::async_trait;
use craft_element::{Element, ImagePayload};
use craft_store::Credential;
use regex::Regex;
use serde::Deserialize;
use std::fmt::Debug;
use std::sync::OnceLock;

/// Instruction sent with every describe call
pub const DESCRIBE_INSTRUCTION: &str = "Generate a short, 2-3 word title and a brief, \
one-sentence description for this image. Return the response as a JSON object with \
\"title\" and \"description\" keys.";

/// Fixed fusion guidance; [`fusion_prompt`] appends the two concepts
pub const FUSION_INSTRUCTION: &str = "Create a completely NEW, original image that naturally \
combines the essence of both concepts below. Do not overlay, superimpose, collage or place \
the two images side by side. Create a single, unified scene where both concepts coexist, \
blending styles and colours so the result looks like a coherent photograph or artwork. \
After creating the image, provide a JSON response with \"title\" and \"description\" for \
the new creation.";

const DEFAULT_TITLE: &str = "Untitled";
const DEFAULT_DESCRIPTION: &str = "No description.";

/// Full fusion prompt for a pair of elements
#[must_use]
pub fn fusion_prompt(first: &Element, second: &Element) -> String {
    format!(
        "{FUSION_INSTRUCTION}\n\nConcept 1 (\"{}\"): {}\nConcept 2 (\"{}\"): {}",
        first.title, first.description, second.title, second.description
    )
}

/// Title and description produced for an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    pub title: String,
    pub description: String,
}

impl Labels {
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    /// Read labels from a describe reply (bare JSON or a fenced json block)
    ///
    /// # Errors
    /// Returns [`GenerationError::MalformedResponse`] if no JSON object with
    /// a non-empty `title` is found
    pub fn parse(text: &str) -> Result<Self, GenerationError> {
        let fields = extract_label_fields(text).ok_or_else(|| {
            GenerationError::MalformedResponse("no JSON object in description".to_string())
        })?;
        let title = fields
            .title
            .ok_or_else(|| GenerationError::MalformedResponse("missing title".to_string()))?;
        Ok(Self::new(title, fields.description.unwrap_or_default()))
    }
}

/// One part of a fusion reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FusionPart {
    Text(String),
    Image(ImagePayload),
}

/// Result of fusing two elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusionOutput {
    pub labels: Labels,
    pub image: ImagePayload,
}

impl FusionOutput {
    /// Assemble an output from reply parts
    ///
    /// Text parts may carry `title`/`description` JSON; missing labels
    /// default to "Untitled" / "No description.". The last image part wins.
    ///
    /// # Errors
    /// Returns [`GenerationError::NoImage`] if no part carries an image
    pub fn from_parts(parts: impl IntoIterator<Item = FusionPart>) -> Result<Self, GenerationError> {
        let mut title = DEFAULT_TITLE.to_string();
        let mut description = DEFAULT_DESCRIPTION.to_string();
        let mut image = None;

        for part in parts {
            match part {
                FusionPart::Text(text) => {
                    if let Some(fields) = extract_label_fields(&text) {
                        if let Some(t) = fields.title {
                            title = t;
                        }
                        if let Some(d) = fields.description {
                            description = d;
                        }
                    }
                }
                FusionPart::Image(payload) => image = Some(payload),
            }
        }

        let image = image.filter(|i| !i.is_empty()).ok_or(GenerationError::NoImage)?;
        Ok(Self {
            labels: Labels::new(title, description),
            image,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct LabelFields {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

fn fenced_json() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```json\s*\n([\s\S]*?)\n\s*```").ok())
        .as_ref()
}

/// Pull `title`/`description` out of free text; empty strings count as absent
fn extract_label_fields(text: &str) -> Option<LabelFields> {
    let parsed = fenced_json()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .and_then(|m| serde_json::from_str::<LabelFields>(m.as_str()).ok())
        .or_else(|| {
            let trimmed = text.trim();
            (trimmed.starts_with('{') && trimmed.ends_with('}'))
                .then(|| serde_json::from_str::<LabelFields>(trimmed).ok())
                .flatten()
        });

    if parsed.is_none() {
        tracing::debug!(len = text.len(), "no label JSON in collaborator text");
    }
    parsed.map(|f| LabelFields {
        title: f.title.filter(|s| !s.trim().is_empty()),
        description: f.description.filter(|s| !s.trim().is_empty()),
    })
}

/// Produces a title and description for an image
#[async_trait]
pub trait ImageDescriber: Send + Sync + Debug {
    /// Describe `image`
    async fn describe(
        &self,
        credential: &Credential,
        image: &ImagePayload,
    ) -> Result<Labels, GenerationError>;
}

/// Produces a new image (and labels) from two elements
#[async_trait]
pub trait ImageFuser: Send + Sync + Debug {
    /// Fuse `first` and `second` following `prompt`
    async fn fuse(
        &self,
        credential: &Credential,
        first: &Element,
        second: &Element,
        prompt: &str,
    ) -> Result<FusionOutput, GenerationError>;
}
