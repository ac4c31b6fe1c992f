//! Routing of inbound frames onto event-bus topics.

use crate::event_bus::EventBus;
use crate::events::{ProtocolError, SessionEvent};
use crate::logging::{log_frame, Direction, LogHandle};
use crate::protocol::InboundEnvelope;

/// Parse one inbound text frame and publish it on its topic.
///
/// Malformed frames are dropped and reported on the `error` topic. This
/// never fails: there is no caller waiting on an inbound frame.
pub fn dispatch_frame(bus: &EventBus, transcript: &LogHandle, frame: &str) {
    log_frame(transcript, Direction::Recv, frame);

    match InboundEnvelope::parse(frame) {
        Ok(envelope) => {
            bus.publish(SessionEvent::from(envelope));
        }
        Err(e) => {
            log::warn!("Dropping malformed frame: {}", e);
            bus.publish(SessionEvent::Error(ProtocolError {
                message: e.to_string(),
                frame: frame.to_string(),
            }));
        }
    }
}
