//! Closed message union and per-channel envelopes

use super::message::{
    EventRequest, EventResponse, Metadata, MessageKind, StateRequest, StateResponse, WireMessage,
};
use crate::types::ModuleId;
use crate::{ModlinkError, Result};

// ----------------------------------------------------------------------------
// IPC Message
// ----------------------------------------------------------------------------

/// Any message that can travel between modules
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcMessage {
    EventRequest(EventRequest),
    EventResponse(EventResponse),
    StateRequest(StateRequest),
    StateResponse(StateResponse),
}

impl IpcMessage {
    pub fn metadata(&self) -> &Metadata {
        match self {
            IpcMessage::EventRequest(msg) => msg.metadata(),
            IpcMessage::EventResponse(msg) => msg.metadata(),
            IpcMessage::StateRequest(msg) => msg.metadata(),
            IpcMessage::StateResponse(msg) => msg.metadata(),
        }
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        match self {
            IpcMessage::EventRequest(msg) => msg.metadata_mut(),
            IpcMessage::EventResponse(msg) => msg.metadata_mut(),
            IpcMessage::StateRequest(msg) => msg.metadata_mut(),
            IpcMessage::StateResponse(msg) => msg.metadata_mut(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.metadata().kind
    }

    pub fn target(&self) -> ModuleId {
        self.metadata().target
    }

    pub fn wire_size(&self) -> usize {
        match self {
            IpcMessage::EventRequest(_) => EventRequest::WIRE_SIZE,
            IpcMessage::EventResponse(_) => EventResponse::WIRE_SIZE,
            IpcMessage::StateRequest(_) => StateRequest::WIRE_SIZE,
            IpcMessage::StateResponse(_) => StateResponse::WIRE_SIZE,
        }
    }

    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize> {
        match self {
            IpcMessage::EventRequest(msg) => msg.encode_into(buf),
            IpcMessage::EventResponse(msg) => msg.encode_into(buf),
            IpcMessage::StateRequest(msg) => msg.encode_into(buf),
            IpcMessage::StateResponse(msg) => msg.encode_into(buf),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            IpcMessage::EventRequest(_) => "EventRequest",
            IpcMessage::EventResponse(_) => "EventResponse",
            IpcMessage::StateRequest(_) => "StateRequest",
            IpcMessage::StateResponse(_) => "StateResponse",
        }
    }
}

impl From<EventRequest> for IpcMessage {
    fn from(msg: EventRequest) -> Self {
        IpcMessage::EventRequest(msg)
    }
}

impl From<EventResponse> for IpcMessage {
    fn from(msg: EventResponse) -> Self {
        IpcMessage::EventResponse(msg)
    }
}

impl From<StateRequest> for IpcMessage {
    fn from(msg: StateRequest) -> Self {
        IpcMessage::StateRequest(msg)
    }
}

impl From<StateResponse> for IpcMessage {
    fn from(msg: StateResponse) -> Self {
        IpcMessage::StateResponse(msg)
    }
}

// ----------------------------------------------------------------------------
// Channel Envelope
// ----------------------------------------------------------------------------

/// A message received on a channel carrying `Req` requests and `Resp` responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope<Req, Resp> {
    Request(Req),
    Response(Resp),
}

impl<Req: WireMessage, Resp: WireMessage> Envelope<Req, Resp> {
    /// Decode a datagram, using byte 0 to pick the concrete type
    pub fn decode(datagram: &[u8]) -> Result<Self> {
        let discriminant = *datagram
            .first()
            .ok_or_else(|| ModlinkError::buffer_too_small(1, 0))?;
        match MessageKind::from_u8(discriminant)? {
            MessageKind::Request => Req::decode(datagram).map(Envelope::Request),
            MessageKind::Response => Resp::decode(datagram).map(Envelope::Response),
        }
    }

    /// Expected datagram size for a given discriminant
    pub fn wire_size_for(discriminant: u8) -> Result<usize> {
        match MessageKind::from_u8(discriminant)? {
            MessageKind::Request => Ok(Req::WIRE_SIZE),
            MessageKind::Response => Ok(Resp::WIRE_SIZE),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Envelope::Request(_) => MessageKind::Request,
            Envelope::Response(_) => MessageKind::Response,
        }
    }

    pub fn sender(&self) -> ModuleId {
        match self {
            Envelope::Request(msg) => msg.module_id(),
            Envelope::Response(msg) => msg.module_id(),
        }
    }
}

/// Messages exchanged on the event channel
pub type EventEnvelope = Envelope<EventRequest, EventResponse>;

/// Messages exchanged on the state channel
pub type StateEnvelope = Envelope<StateRequest, StateResponse>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelFunction, EventId, ModuleState};

    #[test]
    fn test_envelope_dispatch_on_first_byte() {
        let request = EventRequest::new(ModuleId::new(9), ChannelFunction::Query, EventId::new(500));
        let decoded = EventEnvelope::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded, Envelope::Request(request));

        let response = EventResponse::new(ModuleId::new(5), EventId::new(500));
        let decoded = EventEnvelope::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded.kind(), MessageKind::Response);
        assert_eq!(decoded.sender(), ModuleId::new(5));
    }

    #[test]
    fn test_envelope_rejects_empty_and_unknown() {
        assert!(matches!(
            StateEnvelope::decode(&[]),
            Err(ModlinkError::BufferTooSmall { .. })
        ));
        assert!(matches!(
            StateEnvelope::decode(&[2, 0, 0]),
            Err(ModlinkError::UnknownMessageKind(2))
        ));
    }

    #[test]
    fn test_short_datagram_fails() {
        let request = StateRequest::new(ModuleId::new(4), ModuleId::new(2), ModuleState::Setup);
        let bytes = request.encode().unwrap();
        assert!(StateEnvelope::decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_ipc_message_sizes() {
        let msg: IpcMessage = StateResponse::default().into();
        assert_eq!(msg.wire_size(), 81);
        assert_eq!(msg.kind(), MessageKind::Response);
        assert_eq!(EventEnvelope::wire_size_for(0).unwrap(), 274);
        assert_eq!(EventEnvelope::wire_size_for(1).unwrap(), 145);
    }
}
