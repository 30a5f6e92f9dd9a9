//! Approval message transport
//!
//! The gateway talks to humans through the `MessageChannel` trait: an
//! outbound send carrying machine-decodable action tokens, and inbound
//! events that are either a pressed action or a free-text reply. The
//! concrete transport (chat bot, webhook, email bridge) lives outside this
//! crate; a recording mock ships for wiring and tests.

use async_trait::async_trait;

use crate::error::ApprovalSendError;

/// The closed set of actions a recipient can take on an approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Approve,
    Reject,
    Edit,
    Schedule,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Approve => "approve",
            ActionKind::Reject => "reject",
            ActionKind::Edit => "edit",
            ActionKind::Schedule => "schedule",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(ActionKind::Approve),
            "reject" => Some(ActionKind::Reject),
            "edit" => Some(ActionKind::Edit),
            "schedule" => Some(ActionKind::Schedule),
            _ => None,
        }
    }

    pub fn all() -> &'static [ActionKind] {
        &[
            ActionKind::Approve,
            ActionKind::Reject,
            ActionKind::Edit,
            ActionKind::Schedule,
        ]
    }
}

/// Encode an action token bound to a post: `approve:<post-id>`.
pub fn encode_action(kind: ActionKind, post_id: &str) -> String {
    format!("{}:{}", kind.as_str(), post_id)
}

/// Decode an action token back into its kind and post id.
pub fn decode_action(token: &str) -> Option<(ActionKind, String)> {
    let (kind, post_id) = token.split_once(':')?;
    if post_id.is_empty() {
        return None;
    }
    Some((ActionKind::parse_str(kind)?, post_id.to_string()))
}

/// An event arriving from the message channel.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A structured action bound to a post (e.g. a pressed button).
    Action { token: String, actor: String },
    /// A free-text reply, scoped to the sender's most recent unresolved
    /// approval request.
    Text {
        sender: String,
        body: String,
        actor: String,
    },
}

/// Outbound half of the approval transport.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Deliver `text` with the given action tokens attached; returns the
    /// channel's opaque message reference.
    async fn send(
        &self,
        destination: &str,
        text: &str,
        actions: &[String],
    ) -> std::result::Result<String, ApprovalSendError>;
}

/// Recording mock channel for wiring and tests.
pub mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::MessageChannel;
    use crate::error::ApprovalSendError;

    /// One captured outbound message.
    #[derive(Debug, Clone)]
    pub struct SentMessage {
        pub destination: String,
        pub text: String,
        pub actions: Vec<String>,
    }

    #[derive(Default)]
    pub struct MockChannel {
        fail_with: Option<String>,
        counter: AtomicUsize,
        sent: Mutex<Vec<SentMessage>>,
    }

    impl MockChannel {
        pub fn reachable() -> Self {
            Self::default()
        }

        pub fn unreachable(message: &str) -> Self {
            Self {
                fail_with: Some(message.to_string()),
                ..Default::default()
            }
        }

        pub fn sent(&self) -> Vec<SentMessage> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessageChannel for MockChannel {
        async fn send(
            &self,
            destination: &str,
            text: &str,
            actions: &[String],
        ) -> std::result::Result<String, ApprovalSendError> {
            if let Some(message) = &self.fail_with {
                return Err(ApprovalSendError(message.clone()));
            }

            self.sent.lock().unwrap().push(SentMessage {
                destination: destination.to_string(),
                text: text.to_string(),
                actions: actions.to_vec(),
            });

            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!("mock-msg-{}", n))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_roundtrip() {
        for kind in ActionKind::all() {
            assert_eq!(ActionKind::parse_str(kind.as_str()), Some(*kind));
        }
        assert_eq!(ActionKind::parse_str("publish"), None);
    }

    #[test]
    fn test_encode_decode_action() {
        let token = encode_action(ActionKind::Approve, "post-123");
        assert_eq!(token, "approve:post-123");

        let (kind, post_id) = decode_action(&token).unwrap();
        assert_eq!(kind, ActionKind::Approve);
        assert_eq!(post_id, "post-123");
    }

    #[test]
    fn test_decode_action_with_colons_in_id() {
        // Only the first colon separates kind from id.
        let (kind, post_id) = decode_action("reject:a:b:c").unwrap();
        assert_eq!(kind, ActionKind::Reject);
        assert_eq!(post_id, "a:b:c");
    }

    #[test]
    fn test_decode_action_rejects_malformed() {
        assert!(decode_action("approve").is_none());
        assert!(decode_action("approve:").is_none());
        assert!(decode_action("launch:post-1").is_none());
        assert!(decode_action("").is_none());
    }

    #[tokio::test]
    async fn test_mock_channel_records_sends() {
        use mock::MockChannel;

        let channel = MockChannel::reachable();
        let actions = vec![encode_action(ActionKind::Approve, "p1")];

        let msg_ref = channel.send("chat-1", "Approve this?", &actions).await.unwrap();
        assert_eq!(msg_ref, "mock-msg-0");

        let msg_ref = channel.send("chat-1", "And this?", &actions).await.unwrap();
        assert_eq!(msg_ref, "mock-msg-1");

        let sent = channel.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].destination, "chat-1");
        assert_eq!(sent[0].actions, actions);
    }

    #[tokio::test]
    async fn test_mock_channel_unreachable() {
        use mock::MockChannel;

        let channel = MockChannel::unreachable("gateway timeout");
        let err = channel.send("chat-1", "text", &[]).await.unwrap_err();
        assert!(err.to_string().contains("gateway timeout"));
        assert_eq!(channel.sent_count(), 0);
    }
}
