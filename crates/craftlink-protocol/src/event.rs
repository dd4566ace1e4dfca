//! Outbound events and the batch that carries them to `POST /events`.
//!
//! Field names follow the remote service's wire format, including its
//! quirks: multi-image payloads use the singular key `"image"` for an array,
//! and an image descriptor is emitted as `{}` rather than `null` when empty.

use crate::error::{BatchValidationError, LinkResult};
use crate::geometry::CellPos;
use crate::ids::{SessionId, VoxelTypeId};
use crate::snapshot::GameStateSnapshot;
use crate::voxel::VoxelTypeDescriptor;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Upper bound on images attached to one event.
pub const MAX_EVENT_IMAGES: usize = 4;

/// Reference to an image. Any subset of the fields may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(default, skip_serializing_if = "is_blank")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub base64: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub file_path: Option<String>,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

impl ImageRef {
    pub fn from_file_name(file_name: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        is_blank(&self.file_name)
            && is_blank(&self.base64)
            && is_blank(&self.url)
            && is_blank(&self.file_path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Speech,
    Build,
    VoxelTypeCreated,
    VoxelTypeChanged,
    ContinuePlan,
    Perception,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Speech => "speech",
            Self::Build => "build",
            Self::VoxelTypeCreated => "voxel_type_created",
            Self::VoxelTypeChanged => "voxel_type_changed",
            Self::ContinuePlan => "continue_plan",
            Self::Perception => "perception",
        }
    }

    /// Event types that force a flush as soon as they enter a batch.
    pub fn is_immediate(self) -> bool {
        matches!(self, Self::Speech | Self::ContinuePlan | Self::Perception)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechPayload {
    pub text: String,
    #[serde(default)]
    pub image: ImageRef,
}

impl SpeechPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: ImageRef::default(),
        }
    }

    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.image = image;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildActionKind {
    Place,
    Remove,
}

/// One voxel placement or removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildAction {
    pub action: BuildActionKind,
    pub position: CellPos,
    pub voxel_id: VoxelTypeId,
    pub voxel_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPayload {
    pub actions: Vec<BuildAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelTypeCreatedPayload {
    pub voxel_type: VoxelTypeDescriptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoxelTypeChange {
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelTypeChangedPayload {
    pub change: VoxelTypeChange,
    pub voxel_type: VoxelTypeDescriptor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuePlanPayload {
    pub summary: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(rename = "image", default)]
    pub images: Vec<ImageRef>,
}

impl ContinuePlanPayload {
    pub fn new(summary: impl Into<String>, next_steps: Vec<String>, images: Vec<ImageRef>) -> Self {
        Self {
            summary: summary.into(),
            next_steps,
            images: cap_images(images),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerceptionPayload {
    #[serde(rename = "image", default)]
    pub images: Vec<ImageRef>,
}

impl PerceptionPayload {
    pub fn new(images: Vec<ImageRef>) -> Self {
        Self {
            images: cap_images(images),
        }
    }
}

fn cap_images(mut images: Vec<ImageRef>) -> Vec<ImageRef> {
    images.retain(|image| !image.is_empty());
    images.truncate(MAX_EVENT_IMAGES);
    images
}

/// Payload variants. The enclosing [`Event`]'s `type` selects the variant
/// on the wire, so the payload itself is serialized untagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Speech(SpeechPayload),
    Build(BuildPayload),
    VoxelTypeCreated(VoxelTypeCreatedPayload),
    VoxelTypeChanged(VoxelTypeChangedPayload),
    ContinuePlan(ContinuePlanPayload),
    Perception(PerceptionPayload),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Speech(_) => EventType::Speech,
            Self::Build(_) => EventType::Build,
            Self::VoxelTypeCreated(_) => EventType::VoxelTypeCreated,
            Self::VoxelTypeChanged(_) => EventType::VoxelTypeChanged,
            Self::ContinuePlan(_) => EventType::ContinuePlan,
            Self::Perception(_) => EventType::Perception,
        }
    }

    fn from_value(event_type: EventType, value: Value) -> serde_json::Result<Self> {
        Ok(match event_type {
            EventType::Speech => Self::Speech(serde_json::from_value(value)?),
            EventType::Build => Self::Build(serde_json::from_value(value)?),
            EventType::VoxelTypeCreated => Self::VoxelTypeCreated(serde_json::from_value(value)?),
            EventType::VoxelTypeChanged => Self::VoxelTypeChanged(serde_json::from_value(value)?),
            EventType::ContinuePlan => Self::ContinuePlan(serde_json::from_value(value)?),
            EventType::Perception => Self::Perception(serde_json::from_value(value)?),
        })
    }
}

macro_rules! payload_from {
    ($($variant:ident($payload:ty)),* $(,)?) => {
        $(
            impl From<$payload> for EventPayload {
                fn from(payload: $payload) -> Self {
                    Self::$variant(payload)
                }
            }
        )*
    };
}

payload_from!(
    Speech(SpeechPayload),
    Build(BuildPayload),
    VoxelTypeCreated(VoxelTypeCreatedPayload),
    VoxelTypeChanged(VoxelTypeChangedPayload),
    ContinuePlan(ContinuePlanPayload),
    Perception(PerceptionPayload),
);

/// A single captured event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// `hhmmss` on the session clock.
    pub timestamp: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Option<EventPayload>,
}

impl Event {
    pub fn new(timestamp: impl Into<String>, payload: impl Into<EventPayload>) -> Self {
        let payload = payload.into();
        Self {
            timestamp: timestamp.into(),
            event_type: payload.event_type(),
            payload: Some(payload),
        }
    }

    pub fn is_immediate(&self) -> bool {
        self.event_type.is_immediate()
    }

    fn validate(&self, index: usize) -> Result<(), BatchValidationError> {
        if self.timestamp.trim().is_empty() {
            return Err(BatchValidationError::MissingTimestamp { index });
        }
        let payload = self
            .payload
            .as_ref()
            .ok_or(BatchValidationError::MissingPayload { index })?;
        let actual = payload.event_type();
        if actual != self.event_type {
            return Err(BatchValidationError::PayloadMismatch {
                index,
                declared: self.event_type.as_str(),
                actual: actual.as_str(),
            });
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct WireEvent {
            #[serde(default)]
            timestamp: String,
            #[serde(rename = "type")]
            event_type: EventType,
            #[serde(default)]
            payload: Option<Value>,
        }

        let wire = WireEvent::deserialize(deserializer)?;
        let payload = match wire.payload {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                EventPayload::from_value(wire.event_type, value).map_err(D::Error::custom)?,
            ),
        };
        Ok(Self {
            timestamp: wire.timestamp,
            event_type: wire.event_type,
            payload,
        })
    }
}

/// Events plus an optional snapshot, sent together in one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    pub session_id: SessionId,
    pub events: Vec<Event>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_state: Option<GameStateSnapshot>,
}

impl EventBatch {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            events: Vec::new(),
            game_state: None,
        }
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn has_immediate_event(&self) -> bool {
        self.events.iter().any(Event::is_immediate)
    }

    pub fn contains_type(&self, event_type: EventType) -> bool {
        self.events.iter().any(|e| e.event_type == event_type)
    }

    /// Check the batch is fit to send: session id present, at least one
    /// event, every event stamped and carrying the payload its type names.
    pub fn validate(&self) -> Result<(), BatchValidationError> {
        if self.session_id.is_empty() {
            return Err(BatchValidationError::EmptySessionId);
        }
        if self.events.is_empty() {
            return Err(BatchValidationError::NoEvents);
        }
        self.events
            .iter()
            .enumerate()
            .try_for_each(|(index, event)| event.validate(index))
    }

    /// Canonical JSON body for `POST /events`.
    pub fn to_json(&self) -> LinkResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
