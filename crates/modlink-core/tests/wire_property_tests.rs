//! Property-based tests for the fixed-layout wire codec
//!
//! Every message must decode to exactly what was encoded, and every
//! buffer shorter than the wire size must be refused on both sides.

use modlink_core::protocol::{
    EventEnvelope, EventRequest, EventResponse, StateEnvelope, StateRequest, StateResponse,
    WireMessage, ERROR_MESSAGE_SIZE, EVENT_REQUEST_DATA_SIZE, EVENT_RESPONSE_DATA_SIZE,
};
use modlink_core::{Envelope, EventId, ModlinkError, ModuleId, Timestamp};
use proptest::prelude::*;

/// Generate arbitrary send time
fn arb_time() -> impl Strategy<Value = Timestamp> {
    any::<i64>().prop_map(Timestamp::new)
}

fn arb_module() -> impl Strategy<Value = ModuleId> {
    any::<u16>().prop_map(ModuleId::new)
}

/// Error text that fits the fixed field without truncation
fn arb_error_text() -> impl Strategy<Value = String> {
    prop::string::string_regex(&format!("[a-zA-Z0-9 ]{{0,{}}}", ERROR_MESSAGE_SIZE)).unwrap()
}

fn arb_event_request() -> impl Strategy<Value = EventRequest> {
    (
        arb_time(),
        arb_module(),
        arb_module(),
        any::<u16>(),
        any::<u16>(),
        prop::collection::vec(any::<u8>(), 0..=EVENT_REQUEST_DATA_SIZE),
        any::<bool>(),
    )
        .prop_map(|(time, sender, target, function, event, payload, required)| {
            let mut request = EventRequest::default();
            request.set_time(time);
            request.set_module_id(sender);
            request.set_function_id(function);
            request.set_event_id(EventId::new(event));
            request.set_target_module_id(target);
            request.set_payload(&payload).unwrap();
            request.set_response_required(required);
            request
        })
}

fn arb_event_response() -> impl Strategy<Value = EventResponse> {
    (
        arb_time(),
        arb_module(),
        any::<u16>(),
        prop::collection::vec(any::<u8>(), 0..=EVENT_RESPONSE_DATA_SIZE),
        any::<u16>(),
        arb_error_text(),
    )
        .prop_map(|(time, sender, event, payload, code, text)| {
            let mut response = EventResponse::new(sender, EventId::new(event));
            response.set_time(time);
            response.set_payload(&payload).unwrap();
            response.set_error(code, &text);
            response
        })
}

fn arb_state_request() -> impl Strategy<Value = StateRequest> {
    (arb_time(), arb_module(), arb_module(), any::<u16>()).prop_map(
        |(time, sender, target, state)| {
            let mut request = StateRequest::default();
            request.set_time(time);
            request.set_module_id(sender);
            request.set_target_module_id(target);
            request.set_requested_id(state);
            request
        },
    )
}

fn arb_state_response() -> impl Strategy<Value = StateResponse> {
    (
        arb_time(),
        arb_module(),
        arb_module(),
        any::<u16>(),
        any::<u16>(),
        arb_error_text(),
    )
        .prop_map(|(time, sender, target, state, code, text)| {
            let mut response = StateResponse::default();
            response.set_time(time);
            response.set_module_id(sender);
            response.set_target_module_id(target);
            response.set_current_id(state);
            response.set_error(code, &text);
            response
        })
}

fn assert_undersized_rejected<M: WireMessage>(msg: &M, short: usize) {
    let mut out = vec![0u8; short];
    assert!(matches!(
        msg.encode_into(&mut out),
        Err(ModlinkError::BufferTooSmall { .. })
    ));

    let bytes = msg.encode().unwrap();
    assert!(matches!(
        M::decode(&bytes[..short]),
        Err(ModlinkError::BufferTooSmall { .. })
    ));
}

proptest! {
    /// Property: event requests survive encode/decode field for field
    #[test]
    fn event_request_roundtrip(request in arb_event_request()) {
        let bytes = request.encode().unwrap();
        prop_assert_eq!(bytes.len(), EventRequest::WIRE_SIZE);
        prop_assert_eq!(EventRequest::decode(&bytes).unwrap(), request.clone());
        prop_assert_eq!(EventEnvelope::decode(&bytes).unwrap(), Envelope::Request(request));
    }

    /// Property: event responses survive encode/decode, error text included
    #[test]
    fn event_response_roundtrip(response in arb_event_response()) {
        let bytes = response.encode().unwrap();
        let decoded = EventResponse::decode(&bytes).unwrap();
        prop_assert_eq!(decoded.error_message(), response.error_message());
        prop_assert_eq!(decoded, response.clone());
        prop_assert_eq!(EventEnvelope::decode(&bytes).unwrap(), Envelope::Response(response));
    }

    #[test]
    fn state_messages_roundtrip(
        request in arb_state_request(),
        response in arb_state_response(),
    ) {
        let bytes = request.encode().unwrap();
        prop_assert_eq!(StateEnvelope::decode(&bytes).unwrap(), Envelope::Request(request));

        let bytes = response.encode().unwrap();
        prop_assert_eq!(StateEnvelope::decode(&bytes).unwrap(), Envelope::Response(response));
    }

    /// Property: any buffer shorter than the wire size fails both ways
    #[test]
    fn undersized_buffers_rejected(
        request in arb_event_request(),
        response in arb_state_response(),
        shortfall in 1usize..=13,
    ) {
        assert_undersized_rejected(&request, EventRequest::WIRE_SIZE - shortfall);
        assert_undersized_rejected(&response, StateResponse::WIRE_SIZE - shortfall);
    }

    /// Property: extra trailing bytes do not change the decoded message
    #[test]
    fn oversized_buffers_ignore_tail(request in arb_state_request(), tail in prop::collection::vec(any::<u8>(), 1..32)) {
        let mut bytes = request.encode().unwrap();
        bytes.extend_from_slice(&tail);
        prop_assert_eq!(StateRequest::decode(&bytes).unwrap(), request);
    }
}
