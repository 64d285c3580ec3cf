use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::observer::{IntersectionEntry, ObservationHandle, VisibilityObserver, THRESHOLDS};
use crate::conversations::MessageId;
use crate::error::TrackerError;

/// Delay before the direct bounds check runs after mount.
pub const FALLBACK_DELAY: Duration = Duration::from_millis(500);

/// Handle to a message's "read state was changed by hand" flag.
///
/// The conversation store owns one per message and hands clones to every
/// tracker it mounts, so the flag outlives individual trackers. The handle
/// can only raise the flag; nothing clears it.
#[derive(Debug, Clone, Default)]
pub struct ManualOverride(Rc<Cell<bool>>);

impl ManualOverride {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.get()
    }

    pub fn mark(&self) {
        self.0.set(true);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    NotTracking,
    Armed,
    Fired,
    ManuallySuppressed,
}

pub type MarkAsRead = Box<dyn FnMut(MessageId)>;

/// Marks one message as read the first time it is fully on screen.
pub struct ReadTracker {
    message_id: MessageId,
    is_read: bool,
    is_own: bool,
    manual: ManualOverride,
    mark_as_read: MarkAsRead,
    state: TrackerState,
    mounted: bool,
    fired: bool,
    handle: Option<ObservationHandle>,
    fallback_at: Option<Instant>,
}

impl ReadTracker {
    pub fn new(
        message_id: MessageId,
        is_read: bool,
        is_own: bool,
        manual: ManualOverride,
        mark_as_read: MarkAsRead,
    ) -> Self {
        Self {
            message_id,
            is_read,
            is_own,
            manual,
            mark_as_read,
            state: TrackerState::NotTracking,
            mounted: false,
            fired: false,
            handle: None,
            fallback_at: None,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> TrackerState {
        self.state
    }

    #[cfg(test)]
    pub fn is_observing(&self) -> bool {
        self.handle.is_some()
    }

    /// Bind to the host's layout. Only eligible messages are observed; a
    /// tracker mounts at most once.
    pub fn mount(&mut self, observer: &mut dyn VisibilityObserver, now: Instant) {
        if self.mounted {
            return;
        }
        self.mounted = true;

        if self.is_own || self.is_read {
            return;
        }
        if self.manual.is_set() {
            self.state = TrackerState::ManuallySuppressed;
            return;
        }
        if !observer.supports_visibility() {
            warn!(message_id = %self.message_id, "visibility reporting unavailable, read tracking disabled");
            return;
        }

        match observer.observe(self.message_id, &THRESHOLDS) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.fallback_at = Some(now + FALLBACK_DELAY);
                self.state = TrackerState::Armed;
                debug!(message_id = %self.message_id, "read tracker armed");
            }
            Err(TrackerError::Unsupported) => {
                warn!(message_id = %self.message_id, "visibility reporting unavailable, read tracking disabled");
            }
            Err(e) => {
                warn!(message_id = %self.message_id, error = %e, "failed to start read tracking");
            }
        }
    }

    /// Keep the tracker's view of the stored read flag current. A message
    /// that became read elsewhere no longer needs observing.
    pub fn set_read(&mut self, is_read: bool, observer: &mut dyn VisibilityObserver) {
        self.is_read = is_read;
        if is_read && self.state == TrackerState::Armed {
            self.release(observer);
            self.state = TrackerState::NotTracking;
        }
    }

    /// Suppression is sticky: `false` leaves the shared flag as it is.
    pub fn set_manually_changed(&mut self, changed: bool, observer: &mut dyn VisibilityObserver) {
        if !changed {
            return;
        }
        self.manual.mark();
        if self.state == TrackerState::Armed {
            self.release(observer);
            self.state = TrackerState::ManuallySuppressed;
            debug!(message_id = %self.message_id, "read tracking suppressed by manual change");
        }
    }

    pub fn handle_intersection(
        &mut self,
        entry: &IntersectionEntry,
        observer: &mut dyn VisibilityObserver,
    ) -> bool {
        if self.state != TrackerState::Armed || self.handle != Some(entry.handle) {
            return false;
        }
        if !entry.is_fully_visible() {
            return false;
        }
        self.try_fire(observer)
    }

    /// Run the one-shot direct bounds check once its deadline has passed.
    pub fn poll_fallback(&mut self, now: Instant, observer: &mut dyn VisibilityObserver) -> bool {
        if self.state != TrackerState::Armed {
            return false;
        }
        match self.fallback_at {
            Some(at) if now >= at => self.fallback_at = None,
            _ => return false,
        }

        let visible = observer
            .bounds(self.message_id)
            .is_some_and(|bounds| bounds.fully_within(observer.viewport_height()));
        if !visible {
            return false;
        }
        debug!(message_id = %self.message_id, "fallback bounds check found message fully visible");
        self.try_fire(observer)
    }

    pub fn dispose(&mut self, observer: &mut dyn VisibilityObserver) {
        self.release(observer);
        if self.state == TrackerState::Armed {
            self.state = TrackerState::NotTracking;
        }
    }

    fn try_fire(&mut self, observer: &mut dyn VisibilityObserver) -> bool {
        if self.fired {
            return false;
        }
        if self.manual.is_set() {
            self.release(observer);
            self.state = TrackerState::ManuallySuppressed;
            return false;
        }
        if self.is_own || self.is_read {
            return false;
        }

        self.fired = true;
        self.state = TrackerState::Fired;
        self.release(observer);
        info!(message_id = %self.message_id, "marking message as read");
        (self.mark_as_read)(self.message_id);
        true
    }

    fn release(&mut self, observer: &mut dyn VisibilityObserver) {
        if let Some(handle) = self.handle.take() {
            observer.unobserve(handle);
        }
        self.fallback_at = None;
    }
}

impl std::fmt::Debug for ReadTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadTracker")
            .field("message_id", &self.message_id)
            .field("state", &self.state)
            .field("handle", &self.handle)
            .field("fallback_at", &self.fallback_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::observer::{
        ElementBounds, NoopObserver, RowSpan, Viewport, ViewportObserver,
    };
    use std::cell::RefCell;

    fn recorder() -> (Rc<RefCell<Vec<MessageId>>>, MarkAsRead) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        (calls, Box::new(move |id: MessageId| sink.borrow_mut().push(id)))
    }

    fn entry(handle: ObservationHandle, ratio: f32, is_intersecting: bool) -> IntersectionEntry {
        IntersectionEntry {
            handle,
            message_id: MessageId(42),
            ratio,
            is_intersecting,
        }
    }

    fn armed(observer: &mut ViewportObserver) -> (ReadTracker, Rc<RefCell<Vec<MessageId>>>, ObservationHandle) {
        let (calls, callback) = recorder();
        let mut tracker = ReadTracker::new(MessageId(42), false, false, ManualOverride::new(), callback);
        tracker.mount(observer, Instant::now());
        let handle = tracker.handle.expect("tracker should be observing");
        (tracker, calls, handle)
    }

    #[test]
    fn partial_then_full_visibility_fires_once() {
        let mut observer = ViewportObserver::new();
        let (mut tracker, calls, handle) = armed(&mut observer);
        assert_eq!(tracker.state(), TrackerState::Armed);

        assert!(!tracker.handle_intersection(&entry(handle, 0.6, true), &mut observer));
        assert!(calls.borrow().is_empty());

        assert!(tracker.handle_intersection(&entry(handle, 1.0, true), &mut observer));
        assert_eq!(*calls.borrow(), vec![MessageId(42)]);

        assert!(!tracker.handle_intersection(&entry(handle, 1.0, true), &mut observer));
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(tracker.state(), TrackerState::Fired);
        assert_eq!(observer.observation_count(), 0);
    }

    #[test]
    fn full_ratio_without_intersection_does_not_fire() {
        let mut observer = ViewportObserver::new();
        let (mut tracker, calls, handle) = armed(&mut observer);
        assert!(!tracker.handle_intersection(&entry(handle, 1.0, false), &mut observer));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn manual_change_between_events_suppresses_forever() {
        let mut observer = ViewportObserver::new();
        let (mut tracker, calls, handle) = armed(&mut observer);

        tracker.handle_intersection(&entry(handle, 0.6, true), &mut observer);
        tracker.set_manually_changed(true, &mut observer);
        tracker.handle_intersection(&entry(handle, 1.0, true), &mut observer);

        assert!(calls.borrow().is_empty());
        assert_eq!(tracker.state(), TrackerState::ManuallySuppressed);
        assert!(!tracker.is_observing());

        tracker.set_manually_changed(false, &mut observer);
        tracker.handle_intersection(&entry(handle, 1.0, true), &mut observer);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn override_set_through_shared_handle_is_rechecked_before_firing() {
        let mut observer = ViewportObserver::new();
        let manual = ManualOverride::new();
        let (calls, callback) = recorder();
        let mut tracker = ReadTracker::new(MessageId(42), false, false, manual.clone(), callback);
        tracker.mount(&mut observer, Instant::now());
        let handle = tracker.handle.unwrap();

        manual.mark();
        assert!(!tracker.handle_intersection(&entry(handle, 1.0, true), &mut observer));
        assert!(calls.borrow().is_empty());
        assert_eq!(tracker.state(), TrackerState::ManuallySuppressed);
        assert_eq!(observer.observation_count(), 0);
    }

    #[test]
    fn own_message_never_observes() {
        let mut observer = ViewportObserver::new();
        let (calls, callback) = recorder();
        let mut tracker = ReadTracker::new(MessageId(42), false, true, ManualOverride::new(), callback);
        let now = Instant::now();
        tracker.mount(&mut observer, now);

        assert_eq!(observer.observation_count(), 0);
        assert_eq!(tracker.state(), TrackerState::NotTracking);

        observer.update(Viewport::new(0, 10), [(MessageId(42), RowSpan::new(0, 2))]);
        for ratio in [0.0, 0.5, 1.0] {
            let fake = IntersectionEntry {
                handle: ObservationHandle(1),
                message_id: MessageId(42),
                ratio,
                is_intersecting: true,
            };
            tracker.handle_intersection(&fake, &mut observer);
        }
        tracker.poll_fallback(now + FALLBACK_DELAY * 2, &mut observer);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn already_read_message_never_observes() {
        let mut observer = ViewportObserver::new();
        let (calls, callback) = recorder();
        let mut tracker = ReadTracker::new(MessageId(42), true, false, ManualOverride::new(), callback);
        let now = Instant::now();
        tracker.mount(&mut observer, now);
        observer.update(Viewport::new(0, 10), [(MessageId(42), RowSpan::new(0, 2))]);
        tracker.poll_fallback(now + FALLBACK_DELAY, &mut observer);

        assert_eq!(observer.observation_count(), 0);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn preset_override_starts_suppressed() {
        let mut observer = ViewportObserver::new();
        let manual = ManualOverride::new();
        manual.mark();
        let (calls, callback) = recorder();
        let mut tracker = ReadTracker::new(MessageId(42), false, false, manual, callback);
        tracker.mount(&mut observer, Instant::now());

        assert_eq!(tracker.state(), TrackerState::ManuallySuppressed);
        assert_eq!(observer.observation_count(), 0);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn fallback_fires_when_fully_visible_after_delay() {
        let mut observer = ViewportObserver::new();
        let (calls, callback) = recorder();
        let mut tracker = ReadTracker::new(MessageId(42), false, false, ManualOverride::new(), callback);
        let now = Instant::now();
        tracker.mount(&mut observer, now);
        observer.update(Viewport::new(0, 10), [(MessageId(42), RowSpan::new(3, 2))]);

        assert!(!tracker.poll_fallback(now + Duration::from_millis(100), &mut observer));
        assert!(tracker.poll_fallback(now + FALLBACK_DELAY, &mut observer));
        assert_eq!(*calls.borrow(), vec![MessageId(42)]);
    }

    #[test]
    fn fallback_runs_only_once() {
        let mut observer = ViewportObserver::new();
        let (calls, callback) = recorder();
        let mut tracker = ReadTracker::new(MessageId(42), false, false, ManualOverride::new(), callback);
        let now = Instant::now();
        tracker.mount(&mut observer, now);

        // Off screen when the deadline passes.
        observer.update(Viewport::new(0, 10), [(MessageId(42), RowSpan::new(20, 2))]);
        assert!(!tracker.poll_fallback(now + FALLBACK_DELAY, &mut observer));

        observer.update(Viewport::new(0, 10), [(MessageId(42), RowSpan::new(2, 2))]);
        assert!(!tracker.poll_fallback(now + FALLBACK_DELAY * 2, &mut observer));
        assert!(calls.borrow().is_empty());
        assert_eq!(tracker.state(), TrackerState::Armed);
    }

    #[test]
    fn observer_and_fallback_paths_fire_at_most_once_together() {
        let mut observer = ViewportObserver::new();
        let (mut tracker, calls, handle) = armed(&mut observer);
        let entries = observer.update(Viewport::new(0, 10), [(MessageId(42), RowSpan::new(0, 3))]);
        assert_eq!(entries.len(), 1);

        assert!(tracker.handle_intersection(&entries[0], &mut observer));
        assert!(!tracker.poll_fallback(Instant::now() + FALLBACK_DELAY * 4, &mut observer));
        assert!(!tracker.handle_intersection(&entry(handle, 1.0, true), &mut observer));
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn dispose_before_any_event_prevents_calls() {
        let mut observer = ViewportObserver::new();
        let now = Instant::now();
        let (mut tracker, calls, handle) = armed(&mut observer);
        tracker.dispose(&mut observer);

        assert_eq!(observer.observation_count(), 0);
        assert_eq!(tracker.state(), TrackerState::NotTracking);

        observer.update(Viewport::new(0, 10), [(MessageId(42), RowSpan::new(0, 3))]);
        tracker.handle_intersection(&entry(handle, 1.0, true), &mut observer);
        tracker.poll_fallback(now + FALLBACK_DELAY * 2, &mut observer);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn becoming_read_elsewhere_releases_observation() {
        let mut observer = ViewportObserver::new();
        let (mut tracker, calls, handle) = armed(&mut observer);
        tracker.set_read(true, &mut observer);

        assert_eq!(observer.observation_count(), 0);
        tracker.handle_intersection(&entry(handle, 1.0, true), &mut observer);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn unsupported_host_degrades_to_no_op() {
        let mut observer = NoopObserver;
        let (calls, callback) = recorder();
        let mut tracker = ReadTracker::new(MessageId(42), false, false, ManualOverride::new(), callback);
        let now = Instant::now();
        tracker.mount(&mut observer, now);

        assert_eq!(tracker.state(), TrackerState::NotTracking);
        assert!(!tracker.poll_fallback(now + FALLBACK_DELAY, &mut observer));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn second_mount_is_ignored() {
        let mut observer = ViewportObserver::new();
        let (mut tracker, _calls, _handle) = armed(&mut observer);
        tracker.mount(&mut observer, Instant::now());
        assert_eq!(observer.observation_count(), 1);
    }

    #[test]
    fn cleared_override_stays_set_for_later_mounts() {
        let mut observer = ViewportObserver::new();
        let manual = ManualOverride::new();

        let (first_calls, callback) = recorder();
        let mut first = ReadTracker::new(MessageId(42), false, false, manual.clone(), callback);
        first.mount(&mut observer, Instant::now());
        first.set_manually_changed(true, &mut observer);
        first.set_manually_changed(false, &mut observer);
        assert!(manual.is_set());
        first.dispose(&mut observer);

        let (calls, callback) = recorder();
        let mut second = ReadTracker::new(MessageId(42), false, false, manual, callback);
        let now = Instant::now();
        second.mount(&mut observer, now);
        assert_eq!(second.state(), TrackerState::ManuallySuppressed);
        assert_eq!(observer.observation_count(), 0);

        let entries = observer.update(Viewport::new(0, 10), [(MessageId(42), RowSpan::new(0, 2))]);
        assert!(entries.is_empty());
        second.handle_intersection(&entry(ObservationHandle(1), 1.0, true), &mut observer);
        assert!(!second.poll_fallback(now + FALLBACK_DELAY, &mut observer));
        assert!(first_calls.borrow().is_empty());
        assert!(calls.borrow().is_empty());
    }

    /// Reports geometry but refuses every observation.
    struct RejectingObserver(ViewportObserver);

    impl VisibilityObserver for RejectingObserver {
        fn supports_visibility(&self) -> bool {
            true
        }

        fn observe(
            &mut self,
            message_id: MessageId,
            _: &[f32],
        ) -> Result<ObservationHandle, TrackerError> {
            Err(TrackerError::Observe {
                id: message_id.0,
                reason: "layout not ready".to_string(),
            })
        }

        fn unobserve(&mut self, handle: ObservationHandle) {
            self.0.unobserve(handle);
        }

        fn bounds(&self, message_id: MessageId) -> Option<ElementBounds> {
            self.0.bounds(message_id)
        }

        fn viewport_height(&self) -> u32 {
            self.0.viewport_height()
        }

        fn observation_count(&self) -> usize {
            self.0.observation_count()
        }

        fn measure(
            &mut self,
            viewport: Viewport,
            spans: &[(MessageId, RowSpan)],
        ) -> Vec<IntersectionEntry> {
            self.0.measure(viewport, spans)
        }
    }

    #[test]
    fn failed_observation_leaves_tracker_idle() {
        let mut observer = RejectingObserver(ViewportObserver::new());
        let (calls, callback) = recorder();
        let mut tracker = ReadTracker::new(MessageId(42), false, false, ManualOverride::new(), callback);
        let now = Instant::now();
        tracker.mount(&mut observer, now);

        assert_eq!(tracker.state(), TrackerState::NotTracking);
        assert!(!tracker.is_observing());

        observer.measure(Viewport::new(0, 10), &[(MessageId(42), RowSpan::new(0, 2))]);
        assert!(!tracker.poll_fallback(now + FALLBACK_DELAY, &mut observer));
        assert!(!tracker.poll_fallback(now + FALLBACK_DELAY * 4, &mut observer));
        assert!(calls.borrow().is_empty());
    }
}
