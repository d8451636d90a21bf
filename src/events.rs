//! Frame index events
//!
//! Every device publishes on its own channel, `FrameIndex<deviceIndex>`.
//! While a device records, the channel receives one sample per poll tick:
//! the new frame index for a retained frame, zero for a decimated one.

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

/// Channel name for a device's frame index events
pub fn channel_name(device_index: u32) -> String {
    format!("FrameIndex{}", device_index)
}

/// One event sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameEvent {
    pub channel: String,
    pub device_index: u32,
    pub value: u32,
    /// Microseconds on the session's shared clock
    pub timestamp_us: u64,
}

/// Destination for frame index events. Called from the polling threads.
pub trait EventSink: Send + Sync {
    /// Announce a channel before its first sample
    fn declare_channel(&self, _name: &str) {}

    fn emit(&self, event: FrameEvent);
}

/// Forwards events over a crossbeam channel to whoever holds the receiver
#[derive(Clone)]
pub struct ChannelEventSink {
    sender: Sender<FrameEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, Receiver<FrameEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: FrameEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.sender.send(event);
    }
}

/// Writes events to the log at trace level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn declare_channel(&self, name: &str) {
        log::debug!("Declared event channel {}", name);
    }

    fn emit(&self, event: FrameEvent) {
        log::trace!("{} {} @{}us", event.channel, event.value, event.timestamp_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name() {
        assert_eq!(channel_name(0), "FrameIndex0");
        assert_eq!(channel_name(12), "FrameIndex12");
    }

    #[test]
    fn test_channel_sink_delivers_in_order() {
        let (sink, rx) = ChannelEventSink::new();
        for value in [1, 0, 2] {
            sink.emit(FrameEvent {
                channel: channel_name(1),
                device_index: 1,
                value,
                timestamp_us: 0,
            });
        }
        let values: Vec<u32> = rx.try_iter().map(|e| e.value).collect();
        assert_eq!(values, vec![1, 0, 2]);
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelEventSink::new();
        drop(rx);
        sink.emit(FrameEvent {
            channel: channel_name(0),
            device_index: 0,
            value: 1,
            timestamp_us: 0,
        });
    }
}
