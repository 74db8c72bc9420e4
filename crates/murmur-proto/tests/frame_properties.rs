//! Property-based tests for envelope encoding/decoding
//!
//! Decoding is fed untrusted server text, so it must reject garbage without
//! panicking, and message bodies must survive encoding byte-for-byte.

use murmur_proto::{InboundFrame, OutboundFrame, PresenceStatus};
use proptest::prelude::*;

/// Strategy for generating arbitrary outbound frames
fn arbitrary_outbound() -> impl Strategy<Value = OutboundFrame> {
    prop_oneof![
        Just(OutboundFrame::Heartbeat),
        Just(OutboundFrame::Typing),
        Just(OutboundFrame::StopTyping),
        prop::collection::vec(any::<u64>(), 0..16)
            .prop_map(|user_ids| OutboundFrame::SubscribePresence { user_ids }),
        prop_oneof![
            Just(PresenceStatus::Online),
            Just(PresenceStatus::Idle),
            Just(PresenceStatus::Dnd),
            Just(PresenceStatus::Offline),
        ]
        .prop_map(|status| OutboundFrame::ChangeStatus { status }),
        (any::<Option<String>>(), any::<Option<String>>())
            .prop_map(|(text, emoji)| OutboundFrame::ChangeStatusMessage { text, emoji }),
        (any::<String>(), any::<Option<u64>>())
            .prop_map(|(message, client_ref)| OutboundFrame::Message { message, client_ref }),
    ]
}

proptest! {
    #[test]
    fn decode_never_panics(text in any::<String>()) {
        let _ = InboundFrame::from_json(&text);
    }

    #[test]
    fn outbound_type_field_matches_kind(frame in arbitrary_outbound()) {
        let json = frame.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(value["type"].as_str(), Some(frame.kind()));
    }

    #[test]
    fn message_body_survives_encoding(body in any::<String>()) {
        let frame = OutboundFrame::Message { message: body.clone(), client_ref: None };
        let decoded: OutboundFrame = murmur_proto::decode(&frame.to_json().unwrap()).unwrap();
        prop_assert_eq!(decoded, OutboundFrame::Message { message: body, client_ref: None });
    }
}
