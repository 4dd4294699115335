//! Inbound WebSocket frame DTOs.
//!
//! Clients send either a typed JSON frame (`{"type":"message","text":...}`)
//! or a bare text line. Both decode to the same text payload so the
//! publish path does not care which form the client spoke.

use serde::Deserialize;

/// A typed inbound frame from a client.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    // A JSON object with no "type" field is still a chat message
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

fn default_kind() -> String {
    "message".to_string()
}

impl InboundMessage {
    /// Extract the chat text from a raw inbound frame.
    ///
    /// Typed frames must carry `type: "message"`; an absent `type` defaults
    /// to it, while any other type is dropped (returns `None`). Non-JSON
    /// input is treated as a bare text line. Empty text is dropped.
    pub fn text_of(raw: &str) -> Option<String> {
        let text = match serde_json::from_str::<InboundMessage>(raw) {
            Ok(frame) if frame.kind == "message" => frame.text,
            Ok(_) => return None,
            Err(_) => raw.to_string(),
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}
