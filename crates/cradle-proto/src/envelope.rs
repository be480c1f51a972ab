use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ExchangeKind;

/// How `sdp` arrived on the wire, so a read hands back what was written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SdpForm {
    /// A bare SDP string.
    #[default]
    Text,
    /// A whole `{type, sdp}` description; holds its members other than `sdp`.
    Description(Map<String, Value>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Offer {
    pub sdp: String,
    pub form: SdpForm,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answer {
    pub sdp: String,
    /// Identity the responder claims; checked by the initiator's trust gate.
    pub parent_id: Option<String>,
    pub form: SdpForm,
}

/// One negotiation message as stored in the exchange slot.
///
/// On the wire this is `{"type":"offer","sdp":..}`,
/// `{"type":"answer","sdp":..,"parentID":..}` or `{"type":null}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Offer(Offer),
    Answer(Answer),
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("type must be `offer`, `answer`, or null")]
    InvalidType,
    #[error("malformed envelope: {0}")]
    Malformed(&'static str),
}

impl Envelope {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Envelope::Offer(Offer {
            sdp: sdp.into(),
            form: SdpForm::Text,
        })
    }

    pub fn answer(sdp: impl Into<String>, parent_id: Option<String>) -> Self {
        Envelope::Answer(Answer {
            sdp: sdp.into(),
            parent_id,
            form: SdpForm::Text,
        })
    }

    pub fn kind(&self) -> Option<ExchangeKind> {
        match self {
            Envelope::Offer(_) => Some(ExchangeKind::Offer),
            Envelope::Answer(_) => Some(ExchangeKind::Answer),
            Envelope::Clear => None,
        }
    }

    /// Classifies an already-parsed JSON body.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let Value::Object(mut body) = value else {
            return Err(EnvelopeError::InvalidType);
        };
        let kind = match body.get("type") {
            Some(Value::Null) => return Ok(Envelope::Clear),
            Some(Value::String(kind)) => kind.parse::<ExchangeKind>()?,
            _ => return Err(EnvelopeError::InvalidType),
        };
        let (sdp, form) = take_sdp(&mut body)?;
        match kind {
            ExchangeKind::Offer => Ok(Envelope::Offer(Offer { sdp, form })),
            ExchangeKind::Answer => {
                let parent_id = match body.remove("parentID") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(id)) => Some(id),
                    Some(_) => return Err(EnvelopeError::Malformed("`parentID` must be a string")),
                };
                Ok(Envelope::Answer(Answer {
                    sdp,
                    parent_id,
                    form,
                }))
            }
        }
    }
}

// Browsers post either the bare SDP string or a whole `{type, sdp}` description.
fn take_sdp(body: &mut Map<String, Value>) -> Result<(String, SdpForm), EnvelopeError> {
    match body.remove("sdp") {
        Some(Value::String(sdp)) => Ok((sdp, SdpForm::Text)),
        Some(Value::Object(mut description)) => match description.remove("sdp") {
            Some(Value::String(sdp)) => Ok((sdp, SdpForm::Description(description))),
            _ => Err(EnvelopeError::Malformed("nested description lacks an `sdp` string")),
        },
        Some(_) => Err(EnvelopeError::Malformed("`sdp` must be a string")),
        None => Err(EnvelopeError::Malformed("missing `sdp`")),
    }
}

struct SdpField<'a> {
    sdp: &'a str,
    form: &'a SdpForm,
}

impl Serialize for SdpField<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.form {
            SdpForm::Text => serializer.serialize_str(self.sdp),
            SdpForm::Description(members) => {
                let mut map = serializer.serialize_map(Some(members.len() + 1))?;
                for (key, value) in members {
                    map.serialize_entry(key, value)?;
                }
                map.serialize_entry("sdp", self.sdp)?;
                map.end()
            }
        }
    }
}

impl Serialize for Envelope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Envelope::Offer(offer) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "offer")?;
                map.serialize_entry(
                    "sdp",
                    &SdpField {
                        sdp: &offer.sdp,
                        form: &offer.form,
                    },
                )?;
                map.end()
            }
            Envelope::Answer(answer) => {
                let len = if answer.parent_id.is_some() { 3 } else { 2 };
                let mut map = serializer.serialize_map(Some(len))?;
                map.serialize_entry("type", "answer")?;
                map.serialize_entry(
                    "sdp",
                    &SdpField {
                        sdp: &answer.sdp,
                        form: &answer.form,
                    },
                )?;
                if let Some(parent_id) = &answer.parent_id {
                    map.serialize_entry("parentID", parent_id)?;
                }
                map.end()
            }
            Envelope::Clear => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", &Value::Null)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Envelope::from_value(value).map_err(D::Error::custom)
    }
}
