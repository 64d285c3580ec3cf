use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::debug;

use super::observer::{IntersectionEntry, VisibilityObserver};
use super::tracker::{ManualOverride, ReadTracker};
use crate::conversations::MessageId;

/// What the list renderer knows about a message it is showing.
#[derive(Debug, Clone)]
pub struct MountedMessage {
    pub id: MessageId,
    pub is_read: bool,
    pub is_own: bool,
    pub manual: ManualOverride,
}

/// One read tracker per displayed message of the open conversation.
///
/// Trackers report through a channel instead of touching the store directly;
/// the app drains it on tick and applies the reads.
pub struct TrackerRegistry {
    trackers: BTreeMap<MessageId, ReadTracker>,
    read_tx: mpsc::UnboundedSender<MessageId>,
    read_rx: mpsc::UnboundedReceiver<MessageId>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        let (read_tx, read_rx) = mpsc::unbounded_channel();
        Self {
            trackers: BTreeMap::new(),
            read_tx,
            read_rx,
        }
    }

    /// Mount trackers for newly displayed messages, refresh read flags of
    /// live ones, and dispose trackers whose messages left the list.
    pub fn sync<I>(&mut self, displayed: I, observer: &mut dyn VisibilityObserver, now: Instant)
    where
        I: IntoIterator<Item = MountedMessage>,
    {
        let mut seen = HashSet::new();
        for message in displayed {
            seen.insert(message.id);
            if let Some(tracker) = self.trackers.get_mut(&message.id) {
                tracker.set_read(message.is_read, observer);
                continue;
            }

            let tx = self.read_tx.clone();
            let mut tracker = ReadTracker::new(
                message.id,
                message.is_read,
                message.is_own,
                message.manual,
                Box::new(move |id: MessageId| {
                    let _ = tx.send(id);
                }),
            );
            tracker.mount(observer, now);
            self.trackers.insert(message.id, tracker);
        }

        let gone: Vec<MessageId> = self
            .trackers
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        for id in gone {
            if let Some(mut tracker) = self.trackers.remove(&id) {
                tracker.dispose(observer);
            }
        }
    }

    /// Returns how many trackers fired.
    pub fn dispatch(
        &mut self,
        entries: &[IntersectionEntry],
        observer: &mut dyn VisibilityObserver,
    ) -> usize {
        let mut fired = 0;
        for entry in entries {
            if let Some(tracker) = self.trackers.get_mut(&entry.message_id) {
                if tracker.handle_intersection(entry, observer) {
                    fired += 1;
                }
            }
        }
        fired
    }

    pub fn poll_fallbacks(&mut self, now: Instant, observer: &mut dyn VisibilityObserver) -> usize {
        let mut fired = 0;
        for tracker in self.trackers.values_mut() {
            if tracker.poll_fallback(now, observer) {
                fired += 1;
            }
        }
        fired
    }

    pub fn mark_unread(&mut self, id: MessageId, observer: &mut dyn VisibilityObserver) {
        if let Some(tracker) = self.trackers.get_mut(&id) {
            tracker.set_manually_changed(true, observer);
        }
    }

    pub fn drain_read_requests(&mut self) -> Vec<MessageId> {
        let mut ids = Vec::new();
        while let Ok(id) = self.read_rx.try_recv() {
            ids.push(id);
        }
        ids
    }

    pub fn clear(&mut self, observer: &mut dyn VisibilityObserver) {
        let count = self.trackers.len();
        for (_, mut tracker) in std::mem::take(&mut self.trackers) {
            tracker.dispose(observer);
        }
        if count > 0 {
            debug!(
                count,
                observations = observer.observation_count(),
                "disposed read trackers"
            );
        }
    }

    #[cfg(test)]
    pub fn state(&self, id: MessageId) -> Option<super::tracker::TrackerState> {
        self.trackers.get(&id).map(|t| t.state())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}

impl Default for TrackerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
