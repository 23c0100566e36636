//! The delta wire unit and its typed payloads.
//!
//! A delta is `{"type": "<tag>", "content": <payload>}`. Decoding happens in
//! two steps: the envelope always parses (so unknown tags survive), then the
//! payload is decoded against the tag's expected shape on demand.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::state::{ActivityItem, ActivityStatus, ActivityType, SourceItem};

// ============================================================================
// Envelope
// ============================================================================

/// One atomic event in the inbound stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Wire tag, e.g. `text-delta` or `progress-init`.
    #[serde(rename = "type")]
    pub tag: String,

    /// Tag-specific payload. Absent content decodes as `null`.
    #[serde(default)]
    pub content: Value,
}

impl Delta {
    pub fn new(tag: impl Into<String>, content: impl Into<Value>) -> Self {
        Self {
            tag: tag.into(),
            content: content.into(),
        }
    }

    /// A delta whose payload is irrelevant (`clear`, `finish`, `complete`).
    pub fn bare(tag: impl Into<String>) -> Self {
        Self::new(tag, Value::Null)
    }

    /// Parse a single JSON line.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// The built-in tag, if this is one.
    pub fn known_tag(&self) -> Option<DeltaTag> {
        DeltaTag::parse(&self.tag)
    }

    /// The payload as a string, for tags whose content is plain text.
    pub fn text(&self) -> Result<&str, PayloadError> {
        self.content.as_str().ok_or_else(|| PayloadError::WrongShape {
            tag: self.tag.clone(),
            expected: "string",
        })
    }
}

// ============================================================================
// Tags
// ============================================================================

/// Which reducer owns a built-in tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// Kind-independent artifact tags (`id`, `title`, `kind`, `clear`, `finish`).
    Artifact,
    /// Kind-specific content tags, folded by the active kind plugin.
    Content,
    /// Deep-research progress tags.
    Research,
}

/// Built-in wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaTag {
    // -- Artifact (kind-independent) --
    Id,
    Title,
    Kind,
    Clear,
    Finish,

    // -- Content (per kind) --
    TextDelta,
    CodeDelta,
    SheetDelta,
    ImageDelta,
    HtmlDelta,
    Html,

    // -- Research --
    ProgressInit,
    DepthDelta,
    ActivityDelta,
    Activity,
    SourceDelta,
    Warning,
    Complete,
    Error,
}

impl DeltaTag {
    pub const ALL: [DeltaTag; 19] = [
        Self::Id,
        Self::Title,
        Self::Kind,
        Self::Clear,
        Self::Finish,
        Self::TextDelta,
        Self::CodeDelta,
        Self::SheetDelta,
        Self::ImageDelta,
        Self::HtmlDelta,
        Self::Html,
        Self::ProgressInit,
        Self::DepthDelta,
        Self::ActivityDelta,
        Self::Activity,
        Self::SourceDelta,
        Self::Warning,
        Self::Complete,
        Self::Error,
    ];

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::Kind => "kind",
            Self::Clear => "clear",
            Self::Finish => "finish",
            Self::TextDelta => "text-delta",
            Self::CodeDelta => "code-delta",
            Self::SheetDelta => "sheet-delta",
            Self::ImageDelta => "image-delta",
            Self::HtmlDelta => "html-delta",
            Self::Html => "html",
            Self::ProgressInit => "progress-init",
            Self::DepthDelta => "depth-delta",
            Self::ActivityDelta => "activity-delta",
            Self::Activity => "activity",
            Self::SourceDelta => "source-delta",
            Self::Warning => "warning",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn domain(self) -> Domain {
        match self {
            Self::Id | Self::Title | Self::Kind | Self::Clear | Self::Finish => Domain::Artifact,
            Self::TextDelta
            | Self::CodeDelta
            | Self::SheetDelta
            | Self::ImageDelta
            | Self::HtmlDelta
            | Self::Html => Domain::Content,
            Self::ProgressInit
            | Self::DepthDelta
            | Self::ActivityDelta
            | Self::Activity
            | Self::SourceDelta
            | Self::Warning
            | Self::Complete
            | Self::Error => Domain::Research,
        }
    }
}

impl std::fmt::Display for DeltaTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payload errors
// ============================================================================

/// A recognized tag carried a payload of the wrong shape.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Payload is not the expected JSON type.
    #[error("{tag}: expected {expected} payload")]
    WrongShape { tag: String, expected: &'static str },

    /// Payload object is missing fields or has mistyped ones.
    #[error("{tag}: {source}")]
    Decode {
        tag: String,
        #[source]
        source: serde_json::Error,
    },

    /// The tag belongs to a different reducer.
    #[error("{tag} is not a {expected:?} tag")]
    WrongDomain { tag: String, expected: Domain },
}

fn decode<T: for<'de> Deserialize<'de>>(
    tag: DeltaTag,
    content: &Value,
) -> Result<T, PayloadError> {
    T::deserialize(content).map_err(|source| PayloadError::Decode {
        tag: tag.as_str().to_string(),
        source,
    })
}

fn text(tag: DeltaTag, content: &Value) -> Result<String, PayloadError> {
    content
        .as_str()
        .map(str::to_string)
        .ok_or(PayloadError::WrongShape {
            tag: tag.as_str().to_string(),
            expected: "string",
        })
}

/// Accepts either a bare string or `{ "message": "..." }`.
fn message(content: &Value) -> Option<String> {
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

// ============================================================================
// Artifact payloads
// ============================================================================

/// Kind-independent artifact events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactDelta {
    Id(String),
    Title(String),
    Kind(String),
    Clear,
    Finish,
}

impl ArtifactDelta {
    pub fn decode(tag: DeltaTag, content: &Value) -> Result<Self, PayloadError> {
        match tag {
            DeltaTag::Id => text(tag, content).map(Self::Id),
            DeltaTag::Title => text(tag, content).map(Self::Title),
            DeltaTag::Kind => text(tag, content).map(Self::Kind),
            DeltaTag::Clear => Ok(Self::Clear),
            DeltaTag::Finish => Ok(Self::Finish),
            other => Err(PayloadError::WrongDomain {
                tag: other.as_str().to_string(),
                expected: Domain::Artifact,
            }),
        }
    }
}

// ============================================================================
// Research payloads
// ============================================================================

/// An activity entry plus optional step counters riding along with it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityUpdate {
    pub item: ActivityItem,
    pub completed_steps: Option<u32>,
    pub total_steps: Option<u32>,
}

/// Deep-research progress events.
#[derive(Debug, Clone, PartialEq)]
pub enum ResearchDelta {
    ProgressInit { max_depth: u32, total_steps: u32 },
    Depth { current: u32, max: u32 },
    Activity(ActivityUpdate),
    Source(SourceItem),
    Warning(String),
    Complete,
    Error(Option<String>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressInitWire {
    max_depth: u32,
    total_steps: u32,
}

#[derive(Deserialize)]
struct DepthWire {
    current: u32,
    max: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityWire {
    #[serde(rename = "type", default)]
    activity_type: ActivityType,
    #[serde(default)]
    status: ActivityStatus,
    message: String,
    timestamp: i64,
    #[serde(default)]
    depth: Option<u32>,
    #[serde(default)]
    completed_steps: Option<u32>,
    #[serde(default)]
    total_steps: Option<u32>,
}

impl ResearchDelta {
    pub fn decode(tag: DeltaTag, content: &Value) -> Result<Self, PayloadError> {
        match tag {
            DeltaTag::ProgressInit => {
                let wire: ProgressInitWire = decode(tag, content)?;
                Ok(Self::ProgressInit {
                    max_depth: wire.max_depth,
                    total_steps: wire.total_steps,
                })
            }
            DeltaTag::DepthDelta => {
                let wire: DepthWire = decode(tag, content)?;
                Ok(Self::Depth {
                    current: wire.current,
                    max: wire.max,
                })
            }
            // Two spellings, one event.
            DeltaTag::ActivityDelta | DeltaTag::Activity => {
                let wire: ActivityWire = decode(tag, content)?;
                Ok(Self::Activity(ActivityUpdate {
                    item: ActivityItem {
                        activity_type: wire.activity_type,
                        status: wire.status,
                        message: wire.message,
                        timestamp: wire.timestamp,
                        depth: wire.depth,
                    },
                    completed_steps: wire.completed_steps,
                    total_steps: wire.total_steps,
                }))
            }
            DeltaTag::SourceDelta => decode(tag, content).map(Self::Source),
            DeltaTag::Warning => message(content)
                .map(Self::Warning)
                .ok_or(PayloadError::WrongShape {
                    tag: tag.as_str().to_string(),
                    expected: "string or {message}",
                }),
            DeltaTag::Complete => Ok(Self::Complete),
            DeltaTag::Error => Ok(Self::Error(message(content))),
            other => Err(PayloadError::WrongDomain {
                tag: other.as_str().to_string(),
                expected: Domain::Research,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_parsing() {
        let delta = Delta::parse(r#"{"type":"text-delta","content":"Hello"}"#).unwrap();
        assert_eq!(delta.tag, "text-delta");
        assert_eq!(delta.known_tag(), Some(DeltaTag::TextDelta));
        assert_eq!(delta.text().unwrap(), "Hello");

        // Missing content is null, not an error.
        let delta = Delta::parse(r#"{"type":"finish"}"#).unwrap();
        assert_eq!(delta.content, Value::Null);

        // Unknown tags still parse.
        let delta = Delta::parse(r#"{"type":"x-telemetry","content":{"a":1}}"#).unwrap();
        assert_eq!(delta.known_tag(), None);
    }

    #[test]
    fn test_tag_roundtrip_and_domains() {
        for tag in DeltaTag::ALL {
            assert_eq!(DeltaTag::parse(tag.as_str()), Some(tag));
        }
        assert_eq!(DeltaTag::Kind.domain(), Domain::Artifact);
        assert_eq!(DeltaTag::Html.domain(), Domain::Content);
        assert_eq!(DeltaTag::Activity.domain(), Domain::Research);
        assert_eq!(DeltaTag::parse("text"), None);
    }

    #[test]
    fn test_artifact_decode() {
        assert_eq!(
            ArtifactDelta::decode(DeltaTag::Kind, &json!("code")).unwrap(),
            ArtifactDelta::Kind("code".into())
        );
        assert!(matches!(
            ArtifactDelta::decode(DeltaTag::Title, &json!(42)),
            Err(PayloadError::WrongShape { .. })
        ));
        assert!(matches!(
            ArtifactDelta::decode(DeltaTag::TextDelta, &json!("x")),
            Err(PayloadError::WrongDomain { .. })
        ));
    }

    #[test]
    fn test_activity_spellings_decode_identically() {
        let payload = json!({
            "type": "search",
            "status": "complete",
            "message": "Searching the web",
            "timestamp": 1738764000000_i64,
            "depth": 2,
            "completedSteps": 3,
            "totalSteps": 10
        });
        let a = ResearchDelta::decode(DeltaTag::ActivityDelta, &payload).unwrap();
        let b = ResearchDelta::decode(DeltaTag::Activity, &payload).unwrap();
        assert_eq!(a, b);

        let ResearchDelta::Activity(update) = a else {
            panic!("Expected Activity");
        };
        assert_eq!(update.item.activity_type, ActivityType::Search);
        assert_eq!(update.item.status, ActivityStatus::Complete);
        assert_eq!(update.item.depth, Some(2));
        assert_eq!(update.completed_steps, Some(3));
        assert_eq!(update.total_steps, Some(10));
    }

    #[test]
    fn test_activity_unknown_type_is_other() {
        let payload = json!({"type": "brainstorm", "message": "hm", "timestamp": 1});
        let ResearchDelta::Activity(update) =
            ResearchDelta::decode(DeltaTag::Activity, &payload).unwrap()
        else {
            panic!("Expected Activity");
        };
        assert_eq!(update.item.activity_type, ActivityType::Other);
        assert_eq!(update.item.status, ActivityStatus::Pending);
    }

    #[test]
    fn test_malformed_research_payloads() {
        // timestamp missing
        let no_timestamp = json!({"message": "x"});
        let err = ResearchDelta::decode(DeltaTag::Activity, &no_timestamp).unwrap_err();
        assert!(err.to_string().starts_with("activity:"));

        let malformed = [
            (DeltaTag::ProgressInit, json!({"maxDepth": 3})),
            (DeltaTag::DepthDelta, json!({"current": -1, "max": 2})),
            (DeltaTag::SourceDelta, json!({"title": "no url"})),
            (DeltaTag::Warning, json!(7)),
        ];
        for (tag, content) in malformed {
            assert!(ResearchDelta::decode(tag, &content).is_err(), "{tag:?}");
        }
    }

    #[test]
    fn test_error_and_warning_messages() {
        assert_eq!(
            ResearchDelta::decode(DeltaTag::Error, &json!({"message": "rate limited"})).unwrap(),
            ResearchDelta::Error(Some("rate limited".into()))
        );
        assert_eq!(
            ResearchDelta::decode(DeltaTag::Error, &Value::Null).unwrap(),
            ResearchDelta::Error(None)
        );
        assert_eq!(
            ResearchDelta::decode(DeltaTag::Warning, &json!("slow source")).unwrap(),
            ResearchDelta::Warning("slow source".into())
        );
    }
}
