use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::playback::PlaybackSnapshot;
use crate::models::tasks::TaskSnapshot;

const EVENT_CAPACITY: usize = 256;

/// Everything observers can hear about: playback state, task progress and
/// render commits.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ShowEvent {
    Playback(PlaybackSnapshot),
    Task(TaskSnapshot),
    #[serde(rename_all = "camelCase")]
    RenderCommitted {
        digest: String,
        rendered: usize,
        failed: usize,
    },
}

/// Fan-out publish point. Publishing never blocks; slow subscribers lag and
/// lose the oldest events instead of holding up the tick loop.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ShowEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: ShowEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShowEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_each_event() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(ShowEvent::RenderCommitted {
            digest: "abc".into(),
            rendered: 2,
            failed: 0,
        });
        for rx in [&mut a, &mut b] {
            match rx.try_recv().unwrap() {
                ShowEvent::RenderCommitted { rendered, .. } => assert_eq!(rendered, 2),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(ShowEvent::RenderCommitted {
            digest: "d".into(),
            rendered: 1,
            failed: 3,
        })
        .unwrap();
        assert_eq!(json["type"], "renderCommitted");
        assert_eq!(json["failed"], 3);
    }
}
