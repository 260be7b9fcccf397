use serde::{Deserialize, Serialize};

use crate::errors::WidgetError;

/// Who authored a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
        }
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single displayed transcript entry. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub text: String,
    pub sender: Sender,
}

impl Message {
    pub fn new(id: u64, sender: Sender, text: impl Into<String>) -> Self {
        Self { id, text: text.into(), sender }
    }
}

/// Operator decision on a pending tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Approval {
    Yes,
    No,
}

impl Approval {
    pub fn from_bool(approved: bool) -> Self {
        if approved { Approval::Yes } else { Approval::No }
    }
}

/// Frames sent by the widget to the backend.
///
/// Untagged; the backend tells them apart by their single key,
/// `{"content": ...}` for chat and `{"approval": "yes"|"no"}` for decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ClientFrame {
    Chat { content: String },
    Approval { approval: Approval },
}

impl ClientFrame {
    pub fn chat(content: impl Into<String>) -> Self {
        ClientFrame::Chat { content: content.into() }
    }

    pub fn to_json(&self) -> Result<String, WidgetError> {
        serde_json::to_string(self).map_err(WidgetError::MalformedFrame)
    }
}

/// Events received from the backend, internally tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    BotResponse { content: String },
    ToolCall { content: String },
    Error { content: String },
    /// Any discriminator this widget does not understand.
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    pub fn parse(frame: &str) -> Result<Self, WidgetError> {
        serde_json::from_str(frame).map_err(WidgetError::MalformedFrame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_frame_shape() {
        let json = ClientFrame::chat("hello").to_json().unwrap();
        assert_eq!(json, r#"{"content":"hello"}"#);
    }

    #[test]
    fn test_approval_frame_shape() {
        let frame = ClientFrame::Approval { approval: Approval::from_bool(false) };
        assert_eq!(frame.to_json().unwrap(), r#"{"approval":"no"}"#);
    }

    #[test]
    fn test_parse_known_events() {
        let event = ServerEvent::parse(r#"{"type":"bot_response","content":"hi there"}"#).unwrap();
        assert_eq!(event, ServerEvent::BotResponse { content: "hi there".into() });

        let event = ServerEvent::parse(r#"{"type":"tool_call","content":"delete file X?"}"#).unwrap();
        assert_eq!(event, ServerEvent::ToolCall { content: "delete file X?".into() });
    }

    #[test]
    fn test_parse_unknown_type_is_not_an_error() {
        let event = ServerEvent::parse(r#"{"type":"presence","content":"x"}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(ServerEvent::parse("not json").is_err());
        assert!(ServerEvent::parse(r#"{"type":"bot_response"}"#).is_err());
    }
}
