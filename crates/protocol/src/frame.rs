use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Errors produced while parsing an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no string `type` or `action` field")]
    MissingDiscriminator,
}

/// The field that names what a frame is.
///
/// Server events carry `type`, client actions carry `action`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discriminator {
    Type(String),
    Action(String),
}

impl Discriminator {
    /// The discriminator value regardless of which field carried it.
    pub fn as_str(&self) -> &str {
        match self {
            Discriminator::Type(s) | Discriminator::Action(s) => s,
        }
    }
}

/// A UTF-8 JSON object exchanged on a streaming channel.
///
/// The whole object is kept so consumers can read any field; only the
/// discriminator is validated up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub struct Frame {
    discriminator: Discriminator,
    fields: Map<String, Value>,
}

impl Frame {
    /// Parses a text frame. `type` wins when both discriminators are present.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        Self::try_from(value)
    }

    /// Builds a server-style event frame (`{"type": kind}`).
    pub fn event(kind: impl Into<String>) -> Self {
        Self::with_discriminator(Discriminator::Type(kind.into()))
    }

    /// Builds a client-style action frame (`{"action": kind}`).
    pub fn action(kind: impl Into<String>) -> Self {
        Self::with_discriminator(Discriminator::Action(kind.into()))
    }

    fn with_discriminator(discriminator: Discriminator) -> Self {
        let mut fields = Map::new();
        let (key, val) = match &discriminator {
            Discriminator::Type(s) => ("type", s),
            Discriminator::Action(s) => ("action", s),
        };
        fields.insert(key.into(), Value::String(val.clone()));
        Self {
            discriminator,
            fields,
        }
    }

    /// Adds a field. Discriminator keys cannot be overwritten.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != "type" && key != "action" {
            self.fields.insert(key, value.into());
        }
        self
    }

    pub fn discriminator(&self) -> &Discriminator {
        &self.discriminator
    }

    /// Shorthand for the discriminator value, e.g. `"new_message"`.
    pub fn kind(&self) -> &str {
        self.discriminator.as_str()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Deserializes the whole object into a typed payload.
    pub fn parse_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }

    /// Serializes the frame back to its wire form.
    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}

impl TryFrom<Value> for Frame {
    type Error = FrameError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(fields) = value else {
            return Err(FrameError::NotAnObject);
        };
        let discriminator = match (fields.get("type"), fields.get("action")) {
            (Some(Value::String(t)), _) => Discriminator::Type(t.clone()),
            (_, Some(Value::String(a))) => Discriminator::Action(a.clone()),
            _ => return Err(FrameError::MissingDiscriminator),
        };
        Ok(Self {
            discriminator,
            fields,
        })
    }
}

impl From<Frame> for Value {
    fn from(frame: Frame) -> Self {
        Value::Object(frame.fields)
    }
}
