use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical participants of an orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Whoever asked for the run.
    Client,
    /// The pipeline itself.
    Orchestrator,
    /// Customer research.
    Research,
    /// First drafts.
    Generator,
    /// Quality scoring.
    Scorer,
    /// Revisions driven by score feedback.
    Refiner,
    /// Campaign recommendations.
    Strategist,
}

impl AgentKind {
    /// Human-readable agent name.
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentKind::Client => "Client",
            AgentKind::Orchestrator => "Pipeline Orchestrator",
            AgentKind::Research => "Research Agent",
            AgentKind::Generator => "Pitch Generator Agent",
            AgentKind::Scorer => "Scoring Agent",
            AgentKind::Refiner => "Refinement Agent",
            AgentKind::Strategist => "Strategy Agent",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Client => write!(f, "client"),
            AgentKind::Orchestrator => write!(f, "orchestrator"),
            AgentKind::Research => write!(f, "research"),
            AgentKind::Generator => write!(f, "generator"),
            AgentKind::Scorer => write!(f, "scorer"),
            AgentKind::Refiner => write!(f, "refiner"),
            AgentKind::Strategist => write!(f, "strategist"),
        }
    }
}

/// What a message does in its exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Opens a run.
    Request,
    /// Successful answer.
    Response,
    /// Hands a stage to an agent.
    Delegate,
    /// Notice with no expected answer.
    Broadcast,
    /// Failed answer.
    Error,
}

/// Delivery state, derived from the message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Awaiting an answer, or a broadcast.
    Sent,
    /// A successful answer.
    Processed,
    /// An error answer.
    Failed,
}

/// One agent-to-agent message. Messages are immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct A2AMessage {
    /// Unique message id.
    pub id: Uuid,
    /// Run this message belongs to.
    pub correlation_id: Uuid,
    /// Position within the run's trail, assigned by the recorder.
    #[serde(default)]
    pub sequence: u64,
    /// Sender.
    pub from: AgentKind,
    /// Recipient.
    pub to: AgentKind,
    /// Kind of message.
    pub message_type: MessageType,
    /// Delivery state.
    pub status: MessageStatus,
    /// The request or delegate this message answers.
    pub in_reply_to: Option<Uuid>,
    /// Stage-specific body.
    pub payload: serde_json::Value,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
}

impl A2AMessage {
    /// Message with a fresh id. The status follows `message_type`.
    pub fn new(
        correlation_id: Uuid,
        from: AgentKind,
        to: AgentKind,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Self {
        let status = match message_type {
            MessageType::Response => MessageStatus::Processed,
            MessageType::Error => MessageStatus::Failed,
            _ => MessageStatus::Sent,
        };
        Self {
            id: Uuid::new_v4(),
            correlation_id,
            sequence: 0,
            from,
            to,
            message_type,
            status,
            in_reply_to: None,
            payload,
            created_at: Utc::now(),
        }
    }

    /// The caller's request that opens a run.
    pub fn request(correlation_id: Uuid, payload: serde_json::Value) -> Self {
        Self::new(
            correlation_id,
            AgentKind::Client,
            AgentKind::Orchestrator,
            MessageType::Request,
            payload,
        )
    }

    /// Orchestrator hands a stage to an agent.
    pub fn delegate(correlation_id: Uuid, to: AgentKind, payload: serde_json::Value) -> Self {
        Self::new(
            correlation_id,
            AgentKind::Orchestrator,
            to,
            MessageType::Delegate,
            payload,
        )
    }

    /// Successful answer to `self`, sent back to its sender.
    pub fn reply(&self, payload: serde_json::Value) -> Self {
        let mut msg = Self::new(
            self.correlation_id,
            self.to,
            self.from,
            MessageType::Response,
            payload,
        );
        msg.in_reply_to = Some(self.id);
        msg
    }

    /// Failed answer to `self`, sent back to its sender.
    pub fn fail(&self, payload: serde_json::Value) -> Self {
        let mut msg = Self::new(
            self.correlation_id,
            self.to,
            self.from,
            MessageType::Error,
            payload,
        );
        msg.in_reply_to = Some(self.id);
        msg
    }

    /// Whether this message opens an exchange that expects an answer.
    pub fn expects_reply(&self) -> bool {
        matches!(
            self.message_type,
            MessageType::Request | MessageType::Delegate
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_swaps_direction() {
        let corr = Uuid::new_v4();
        let delegate = A2AMessage::delegate(corr, AgentKind::Scorer, serde_json::json!({"pitch": 1}));
        let reply = delegate.reply(serde_json::json!({"overall": 0.8}));
        assert_eq!(reply.from, AgentKind::Scorer);
        assert_eq!(reply.to, AgentKind::Orchestrator);
        assert_eq!(reply.correlation_id, corr);
        assert_eq!(reply.in_reply_to, Some(delegate.id));
        assert_eq!(reply.message_type, MessageType::Response);
        assert_eq!(reply.status, MessageStatus::Processed);
    }

    #[test]
    fn test_fail_is_error_message() {
        let request = A2AMessage::request(Uuid::new_v4(), serde_json::json!({}));
        let err = request.fail(serde_json::json!({"kind": "not_found"}));
        assert_eq!(err.message_type, MessageType::Error);
        assert_eq!(err.status, MessageStatus::Failed);
        assert_eq!(err.to, AgentKind::Client);
        assert!(request.expects_reply());
        assert!(!err.expects_reply());
    }

    #[test]
    fn test_message_serialization() {
        let msg = A2AMessage::delegate(Uuid::new_v4(), AgentKind::Research, serde_json::json!({}));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"delegate\""));
        assert!(json.contains("\"research\""));
        let parsed: A2AMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }
}
