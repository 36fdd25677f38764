//! Well-known event catalogue
//!
//! Every event number is `module * 100 + offset`. Offset 0 of each module
//! is reserved for the "query events" request.

use crate::types::{EventId, Module};

/// Offset reserved for the query-events event in every module namespace
pub const QUERY_EVENTS_OFFSET: u16 = 0;

const fn event(module: Module, offset: u16) -> EventId {
    module.id().event(offset)
}

/// Input device events
pub mod input_device {
    use super::*;

    pub const QUERY_EVENTS: EventId = event(Module::InputDevice, QUERY_EVENTS_OFFSET);
    pub const GET_CURRENT_POSITION: EventId = event(Module::InputDevice, 1);
    pub const SET_DESIRED_POSITION: EventId = event(Module::InputDevice, 2);
    pub const GET_CURRENT_FORCE: EventId = event(Module::InputDevice, 3);
    pub const SET_DESIRED_FORCE: EventId = event(Module::InputDevice, 4);
    pub const SET_TRANSFORMATION: EventId = event(Module::InputDevice, 5);
    pub const DRAG_AND_DROP: EventId = event(Module::InputDevice, 6);
    pub const GET_DEVICE_INFO: EventId = event(Module::InputDevice, 7);
    pub const GET_TRAVERSAL_BOUNDS: EventId = event(Module::InputDevice, 8);
    pub const START_CALIBRATION: EventId = event(Module::InputDevice, 9);
}

/// Motion control events
pub mod motion_control {
    use super::*;

    pub const QUERY_EVENTS: EventId = event(Module::MotionControl, QUERY_EVENTS_OFFSET);
    pub const SET_OFFSET: EventId = event(Module::MotionControl, 1);
    pub const FLIP_CONTROL: EventId = event(Module::MotionControl, 2);
    pub const TOGGLE_HAPTICS: EventId = event(Module::MotionControl, 3);
    pub const SET_SCALE: EventId = event(Module::MotionControl, 4);
    pub const DRAG_AND_DROP_STATUS: EventId = event(Module::MotionControl, 5);
}

/// Cloud link (sonolink) events
pub mod sonolink {
    use super::*;

    pub const QUERY_EVENTS: EventId = event(Module::SonolinkInterface, QUERY_EVENTS_OFFSET);
    pub const SEND_MOTION: EventId = event(Module::SonolinkInterface, 1);
    pub const SEND_ULTRASOUND: EventId = event(Module::SonolinkInterface, 2);
    pub const SEND_ERROR: EventId = event(Module::SonolinkInterface, 3);
    pub const SEND_ACTION: EventId = event(Module::SonolinkInterface, 4);
    pub const POST_DESIRED_POS_FORCE: EventId = event(Module::SonolinkInterface, 5);
    pub const POST_MAX_FORCE: EventId = event(Module::SonolinkInterface, 6);
    pub const LOGIN: EventId = event(Module::SonolinkInterface, 7);
    pub const SESSION_CONNECT: EventId = event(Module::SonolinkInterface, 8);
    pub const HANDSHAKE_STATUS: EventId = event(Module::SonolinkInterface, 9);
}

/// Operator GUI events
pub mod sonostation_gui {
    use super::*;

    pub const SHOW_PROMPT: EventId = event(Module::SonostationGui, 0);
}

/// Ultrasound input events
pub mod ultrasound_input {
    use super::*;

    pub const KEY_MOUSE_CONTROL_STATUS: EventId = event(Module::UltrasoundInput, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_follows_namespace() {
        assert_eq!(input_device::QUERY_EVENTS.as_u16(), 300);
        assert_eq!(input_device::START_CALIBRATION.as_u16(), 309);
        assert_eq!(motion_control::SET_SCALE.as_u16(), 204);
        assert_eq!(sonolink::HANDSHAKE_STATUS.as_u16(), 109);
        assert_eq!(sonostation_gui::SHOW_PROMPT.module(), Module::SonostationGui.id());
        assert_eq!(ultrasound_input::KEY_MOUSE_CONTROL_STATUS.as_u16(), 900);
    }
}
