// qbus-core/src/envelope.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::BusError;

/// Wire envelope: `{"q": <payload>, "qid"?: "<string>"}`.
///
/// `qid` is present only when the sender expects a reply; it doubles as the
/// routing-key suffix the reply consumer binds on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub q: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qid: Option<String>,
}

impl Envelope {
    pub fn wrap<T: Serialize>(payload: &T) -> Result<Self, BusError> {
        Ok(Self {
            q: serde_json::to_value(payload)
                .map_err(|e| BusError::Serialization(e.to_string()))?,
            qid: None,
        })
    }

    pub fn with_qid(mut self, qid: impl Into<String>) -> Self {
        self.qid = Some(qid.into());
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BusError> {
        serde_json::to_vec(self).map_err(|e| BusError::Serialization(e.to_string()))
    }

    pub fn from_bytes(body: &[u8]) -> Result<Self, BusError> {
        serde_json::from_slice(body).map_err(|e| BusError::Serialization(e.to_string()))
    }
}

/// Outcome of a `communicate_with` call. Replaces the ambiguous
/// null-on-either-meaning return with a tagged result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Decoded reply text correlated to this request.
    Delivered(String),
    /// The caller asked not to wait; nothing was consumed.
    NoResponseRequested,
}

impl Reply {
    pub fn into_text(self) -> Option<String> {
        match self {
            Reply::Delivered(text) => Some(text),
            Reply::NoResponseRequested => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_without_qid_omits_the_key() {
        let env = Envelope::wrap(&json!({"name": "obelix"})).unwrap();
        let text = String::from_utf8(env.to_bytes().unwrap()).unwrap();
        assert_eq!(text, r#"{"q":{"name":"obelix"}}"#);
    }

    #[test]
    fn envelope_with_qid_round_trips() {
        let env = Envelope::wrap(&json!({"number": "2"}))
            .unwrap()
            .with_qid("q7f3a");
        let parsed = Envelope::from_bytes(&env.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.qid.as_deref(), Some("q7f3a"));
        assert_eq!(parsed.q, json!({"number": "2"}));
    }

    #[test]
    fn reply_into_text() {
        assert_eq!(
            Reply::Delivered("ok".into()).into_text().as_deref(),
            Some("ok")
        );
        assert_eq!(Reply::NoResponseRequested.into_text(), None);
    }
}
