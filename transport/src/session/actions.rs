//! Outbound host messages and the synthesized replies to them.
//!
//! The remote service has no application message protocol, so the transport
//! handles the one action it can express (`llm` / `append_to_messages`) and
//! answers on the server's behalf.

use gemini_live_host_api::{
    ActionResponse, BotReadyData, HostError, HostResult, InboundMessage, InboundMessageType,
    OutboundMessage,
};
use serde_json::Value;

use crate::core::realtime::gemini::ContextMessage;

pub const LLM_SERVICE: &str = "llm";
pub const APPEND_TO_MESSAGES: &str = "append_to_messages";
pub const MESSAGES_ARGUMENT: &str = "messages";

/// What to do with an outbound host message.
#[derive(Debug, Clone, PartialEq)]
pub enum HostAction {
    /// Send each message as a completed turn, in order.
    AppendToMessages(Vec<ContextMessage>),
    /// An `append_to_messages` action whose `messages` argument is missing or
    /// malformed.
    InvalidArguments,
    /// Anything else. Carries the operation name for logging.
    Unsupported(String),
}

impl HostAction {
    pub fn from_message(message: &OutboundMessage) -> Self {
        if let Some(data) = message.decode_action_data()
            && data.service == LLM_SERVICE
            && data.action == APPEND_TO_MESSAGES
        {
            return match data
                .argument(MESSAGES_ARGUMENT)
                .and_then(ContextMessage::list_from_value)
            {
                Some(messages) => Self::AppendToMessages(messages),
                None => Self::InvalidArguments,
            };
        }

        if message.msg_type == OutboundMessage::ACTION {
            Self::Unsupported(format!(
                "sendMessage of type '{}' (except for '{}')",
                OutboundMessage::ACTION,
                APPEND_TO_MESSAGES
            ))
        } else {
            Self::Unsupported(format!("sendMessage of type '{}'", message.msg_type))
        }
    }
}

/// Successful `action-response` for the message `id`.
pub fn action_response(id: &str) -> HostResult<InboundMessage> {
    let data = serde_json::to_string(&ActionResponse {
        result: Value::Bool(true),
    })
    .map_err(|e| HostError::SerializationError(e.to_string()))?;
    Ok(InboundMessage {
        msg_type: InboundMessageType::ActionResponse,
        data,
        id: id.to_string(),
    })
}

/// `error-response` for the message `id`. The payload is empty.
pub fn error_response(id: &str) -> InboundMessage {
    InboundMessage {
        msg_type: InboundMessageType::ErrorResponse,
        data: String::new(),
        id: id.to_string(),
    }
}

/// `bot-ready` sent once the server accepts the session setup.
pub fn bot_ready() -> HostResult<InboundMessage> {
    let data = serde_json::to_string(&BotReadyData {
        version: "n/a".to_string(),
        config: Vec::new(),
    })
    .map_err(|e| HostError::SerializationError(e.to_string()))?;
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    Ok(InboundMessage {
        msg_type: InboundMessageType::BotReady,
        data,
        id,
    })
}
