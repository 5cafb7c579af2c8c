//! Message envelopes exchanged through the broker.
//!
//! All fields are required. Envelopes are immutable once built.

use serde::{Deserialize, Deserializer, Serialize};

/// Published once a source video has been stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCompletedEvent {
    /// The auth service reports numeric ids; both forms are accepted.
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    pub video_path: String,
}

/// Asks a worker to build the HLS ladder for one source object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeRequest {
    pub video_path: String,
    pub uuid: String,
}

/// Published after every rendition and the master playlist are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationEvent {
    pub uuid: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_event_wire_format() {
        let event = UploadCompletedEvent {
            user_id: "42".to_string(),
            video_path: "unprocessed_videos/abc.mp4".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"user_id": "42", "video_path": "unprocessed_videos/abc.mp4"})
        );
    }

    #[test]
    fn upload_event_accepts_numeric_user_id() {
        let event: UploadCompletedEvent =
            serde_json::from_str(r#"{"user_id": 7, "video_path": "unprocessed_videos/a.mp4"}"#)
                .unwrap();
        assert_eq!(event.user_id, "7");
    }

    #[test]
    fn missing_fields_are_rejected() {
        assert!(serde_json::from_str::<TranscodeRequest>(r#"{"uuid": "abc"}"#).is_err());
        assert!(serde_json::from_str::<ConfirmationEvent>("{}").is_err());
        assert!(serde_json::from_str::<UploadCompletedEvent>(r#"{"user_id": "1"}"#).is_err());
    }

    #[test]
    fn confirmation_wire_format() {
        let json = serde_json::to_string(&ConfirmationEvent {
            uuid: "abc".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"uuid":"abc"}"#);
    }
}
