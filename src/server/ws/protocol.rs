use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct WsIncomingMessage {
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "requestId")]
    pub request_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat_message() {
        let incoming: WsIncomingMessage =
            serde_json::from_str(r#"{"type":"chat","message":"hi","requestId":"r1"}"#).unwrap();
        assert_eq!(incoming.msg_type.as_deref(), Some("chat"));
        assert_eq!(incoming.message.as_deref(), Some("hi"));
        assert_eq!(incoming.request_id.as_deref(), Some("r1"));
    }

    #[test]
    fn tolerates_missing_fields() {
        let incoming: WsIncomingMessage = serde_json::from_str(r#"{"type":"stop"}"#).unwrap();
        assert_eq!(incoming.msg_type.as_deref(), Some("stop"));
        assert!(incoming.message.is_none());
    }
}
