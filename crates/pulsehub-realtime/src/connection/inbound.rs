//! Client frame intake: validate, authorize against the Session identity,
//! then hand off to the router.

use tracing::{debug, warn};

use pulsehub_core::error::ErrorKind;
use pulsehub_core::events::{InboundEvent, OutboundEvent, PresenceRefresh};

use crate::message::{ClientFrame, decode_client_frame, validate_frame};
use crate::metrics::HubMetrics;
use crate::router::ingress::Ingress;

use super::session::Session;

/// Handles one text frame read from a Session's connection.
///
/// Rejections are answered with an `error` frame on this Session only;
/// the connection stays open.
pub fn handle_client_frame(
    session: &Session,
    raw: &str,
    ingress: &Ingress,
    max_frame_bytes: usize,
    metrics: &HubMetrics,
) {
    session.touch();

    if let Err(e) = validate_frame(raw, max_frame_bytes) {
        reject(session, metrics, "INVALID_FRAME", e.message);
        return;
    }

    let frame = match decode_client_frame(raw) {
        Ok(frame) => frame,
        Err(e) if e.kind == ErrorKind::NotFound => {
            debug!(conn_id = %session.id, error = %e, "Unknown client frame type");
            metrics.unknown_event();
            reject(session, metrics, "UNKNOWN_TYPE", e.message);
            return;
        }
        Err(e) => {
            reject(session, metrics, "INVALID_FRAME", e.message);
            return;
        }
    };

    let frame_type = frame.frame_type();
    let accepted = match frame {
        ClientFrame::Message(message) => {
            if message.sender_id != session.user_id {
                warn!(
                    conn_id = %session.id,
                    user_id = %session.user_id,
                    claimed = %message.sender_id,
                    "Rejected message with spoofed sender"
                );
                reject(session, metrics, "FORBIDDEN", "Sender does not match the connection");
                return;
            }
            if let Err(e) = message.target() {
                reject(session, metrics, "INVALID_MESSAGE", e.message);
                return;
            }
            ingress.submit(InboundEvent::Message(message))
        }
        ClientFrame::Typing(typing) => {
            ingress.submit(InboundEvent::Typing(typing.into_typing(session.user_id)))
        }
        ClientFrame::CallSignal(signal) => {
            ingress.submit(InboundEvent::CallSignal(signal.into_signal(session.user_id)))
        }
        ClientFrame::Presence(_) => ingress.submit(InboundEvent::Presence(PresenceRefresh {
            user_id: session.user_id,
        })),
    };

    if !accepted {
        reject(session, metrics, "BUSY", format!("Server busy, '{frame_type}' dropped"));
    }
}

fn reject(session: &Session, metrics: &HubMetrics, code: &str, message: impl Into<String>) {
    metrics.frame_rejected();
    session.try_deliver(OutboundEvent::error(code, message));
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::router::ingress::{Mailboxes, mailboxes};
    use pulsehub_core::types::id::{MessageId, UserId};

    struct Fixture {
        session: Arc<Session>,
        outbound: mpsc::Receiver<OutboundEvent>,
        ingress: Ingress,
        mailboxes: Mailboxes,
        metrics: Arc<HubMetrics>,
    }

    fn fixture() -> Fixture {
        let metrics = Arc::new(HubMetrics::new());
        let (ingress, mailboxes) = mailboxes(8, Arc::clone(&metrics));
        let (session, outbound) = Session::new(UserId::new(), Default::default(), 8);
        Fixture {
            session,
            outbound,
            ingress,
            mailboxes,
            metrics,
        }
    }

    impl Fixture {
        fn send(&self, frame: serde_json::Value) {
            handle_client_frame(&self.session, &frame.to_string(), &self.ingress, 4096, &self.metrics);
        }

        fn error_code(&mut self) -> Option<String> {
            match self.outbound.try_recv() {
                Ok(OutboundEvent::Error { code, .. }) => Some(code),
                _ => None,
            }
        }
    }

    #[test]
    fn test_spoofed_sender_is_rejected() {
        let mut f = fixture();
        f.send(json!({
            "type": "message",
            "payload": {
                "id": MessageId::new(),
                "sender_id": UserId::new(),
                "receiver_id": UserId::new(),
                "content": "hi",
            }
        }));
        assert_eq!(f.error_code().as_deref(), Some("FORBIDDEN"));
        assert!(f.mailboxes.message.try_recv().is_err());
    }

    #[test]
    fn test_own_message_is_forwarded() {
        let mut f = fixture();
        f.send(json!({
            "type": "message",
            "payload": {
                "id": MessageId::new(),
                "sender_id": f.session.user_id,
                "receiver_id": UserId::new(),
                "content": "hi",
            }
        }));
        assert!(f.error_code().is_none());
        assert_eq!(f.mailboxes.message.try_recv().unwrap().sender_id, f.session.user_id);
    }

    #[test]
    fn test_call_signal_caller_is_overwritten() {
        let mut f = fixture();
        let target = UserId::new();
        f.send(json!({
            "type": "call_signal",
            "payload": {
                "caller_id": UserId::new(),
                "target_id": target,
                "signal_type": "offer",
                "payload": { "sdp": "..." },
            }
        }));
        let signal = f.mailboxes.call.try_recv().unwrap();
        assert_eq!(signal.caller_id, f.session.user_id);
        assert_eq!(signal.target_id, target);
    }

    #[test]
    fn test_typing_is_attributed_to_session() {
        let mut f = fixture();
        f.send(json!({
            "type": "typing",
            "payload": { "user_id": UserId::new(), "receiver_id": UserId::new(), "is_typing": true }
        }));
        assert_eq!(f.mailboxes.typing.try_recv().unwrap().user_id, f.session.user_id);
    }

    #[test]
    fn test_typing_without_typist_is_stamped() {
        let mut f = fixture();
        let group = pulsehub_core::types::id::GroupId::new();
        f.send(json!({
            "type": "typing",
            "payload": { "group_id": group, "is_typing": false }
        }));
        assert!(f.error_code().is_none());
        let typing = f.mailboxes.typing.try_recv().unwrap();
        assert_eq!(typing.user_id, f.session.user_id);
        assert_eq!(typing.group_id, Some(group));
        assert!(!typing.is_typing);
    }

    #[test]
    fn test_presence_frame_becomes_refresh() {
        let mut f = fixture();
        f.send(json!({ "type": "presence", "payload": {} }));
        assert_eq!(f.mailboxes.presence.try_recv().unwrap().user_id, f.session.user_id);
    }

    #[test]
    fn test_unknown_and_oversized_frames() {
        let mut f = fixture();
        f.send(json!({ "type": "rsvp_update", "payload": {} }));
        assert_eq!(f.error_code().as_deref(), Some("UNKNOWN_TYPE"));

        let big = "x".repeat(5000);
        handle_client_frame(&f.session, &big, &f.ingress, 4096, &f.metrics);
        assert_eq!(f.error_code().as_deref(), Some("INVALID_FRAME"));
        assert_eq!(f.metrics.snapshot().frames_rejected, 2);
    }
}
