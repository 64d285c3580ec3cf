use std::collections::{BTreeMap, HashMap};

use crate::conversations::MessageId;
use crate::error::TrackerError;

/// Visible fractions at which an observation reports a change.
pub const THRESHOLDS: [f32; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservationHandle(pub(crate) u64);

/// Rows a rendered message occupies, measured from the top of the thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSpan {
    pub top: u32,
    pub height: u32,
}

impl RowSpan {
    pub fn new(top: u32, height: u32) -> Self {
        Self { top, height }
    }

    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }
}

/// The window of thread rows currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub offset: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(offset: u32, height: u32) -> Self {
        Self { offset, height }
    }

    /// Bounds of `span` relative to the top edge of the viewport.
    pub fn relative(&self, span: RowSpan) -> ElementBounds {
        let top = i64::from(span.top) - i64::from(self.offset);
        ElementBounds {
            top,
            bottom: top + i64::from(span.height),
        }
    }

    /// Fraction of `span` inside the viewport and whether any of it is.
    pub fn intersection(&self, span: RowSpan) -> (f32, bool) {
        if span.height == 0 || self.height == 0 {
            return (0.0, false);
        }
        let start = span.top.max(self.offset);
        let end = span.bottom().min(self.offset + self.height);
        let overlap = end.saturating_sub(start);
        if overlap == 0 {
            return (0.0, false);
        }
        (overlap as f32 / span.height as f32, true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementBounds {
    pub top: i64,
    pub bottom: i64,
}

impl ElementBounds {
    pub fn fully_within(&self, viewport_height: u32) -> bool {
        self.top >= 0 && self.bottom <= i64::from(viewport_height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub handle: ObservationHandle,
    pub message_id: MessageId,
    pub ratio: f32,
    pub is_intersecting: bool,
}

impl IntersectionEntry {
    pub fn is_fully_visible(&self) -> bool {
        self.is_intersecting && self.ratio >= 1.0
    }
}

/// Host capability for reporting how much of a rendered message is on screen.
pub trait VisibilityObserver {
    fn supports_visibility(&self) -> bool;

    fn observe(
        &mut self,
        message_id: MessageId,
        thresholds: &[f32],
    ) -> Result<ObservationHandle, TrackerError>;

    fn unobserve(&mut self, handle: ObservationHandle);

    /// Last known bounds of a message relative to the viewport top.
    fn bounds(&self, message_id: MessageId) -> Option<ElementBounds>;

    fn viewport_height(&self) -> u32;

    /// Number of live observations.
    fn observation_count(&self) -> usize;

    /// Feed the latest layout, returning observations that crossed a threshold.
    fn measure(&mut self, viewport: Viewport, spans: &[(MessageId, RowSpan)])
        -> Vec<IntersectionEntry>;
}

#[derive(Debug)]
struct Registration {
    message_id: MessageId,
    thresholds: Vec<f32>,
    last_bucket: Option<usize>,
}

impl Registration {
    fn bucket(&self, ratio: f32, is_intersecting: bool) -> usize {
        if !is_intersecting {
            return 0;
        }
        self.thresholds.iter().filter(|t| ratio >= **t).count()
    }
}

/// Measures message row spans against the thread pane of the terminal UI.
#[derive(Debug, Default)]
pub struct ViewportObserver {
    next_handle: u64,
    registrations: BTreeMap<ObservationHandle, Registration>,
    spans: HashMap<MessageId, RowSpan>,
    viewport: Viewport,
}

impl ViewportObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest layout and report observations whose threshold
    /// bucket changed. The first measurement after `observe` always reports.
    pub fn update<I>(&mut self, viewport: Viewport, spans: I) -> Vec<IntersectionEntry>
    where
        I: IntoIterator<Item = (MessageId, RowSpan)>,
    {
        self.viewport = viewport;
        self.spans.clear();
        self.spans.extend(spans);

        let mut entries = Vec::new();
        for (handle, registration) in self.registrations.iter_mut() {
            let Some(span) = self.spans.get(&registration.message_id) else {
                continue;
            };
            let (ratio, is_intersecting) = viewport.intersection(*span);
            let bucket = registration.bucket(ratio, is_intersecting);
            if registration.last_bucket == Some(bucket) {
                continue;
            }
            registration.last_bucket = Some(bucket);
            entries.push(IntersectionEntry {
                handle: *handle,
                message_id: registration.message_id,
                ratio,
                is_intersecting,
            });
        }
        entries
    }
}

impl VisibilityObserver for ViewportObserver {
    fn supports_visibility(&self) -> bool {
        true
    }

    fn observe(
        &mut self,
        message_id: MessageId,
        thresholds: &[f32],
    ) -> Result<ObservationHandle, TrackerError> {
        if thresholds.is_empty() || thresholds.iter().any(|t| !(0.0..=1.0).contains(t)) {
            return Err(TrackerError::Observe {
                id: message_id.0,
                reason: format!("invalid thresholds {:?}", thresholds),
            });
        }
        self.next_handle += 1;
        let handle = ObservationHandle(self.next_handle);
        self.registrations.insert(
            handle,
            Registration {
                message_id,
                thresholds: thresholds.to_vec(),
                last_bucket: None,
            },
        );
        Ok(handle)
    }

    fn unobserve(&mut self, handle: ObservationHandle) {
        self.registrations.remove(&handle);
    }

    fn bounds(&self, message_id: MessageId) -> Option<ElementBounds> {
        self.spans
            .get(&message_id)
            .map(|span| self.viewport.relative(*span))
    }

    fn viewport_height(&self) -> u32 {
        self.viewport.height
    }

    fn observation_count(&self) -> usize {
        self.registrations.len()
    }

    fn measure(
        &mut self,
        viewport: Viewport,
        spans: &[(MessageId, RowSpan)],
    ) -> Vec<IntersectionEntry> {
        self.update(viewport, spans.iter().copied())
    }
}

/// Stand-in for hosts that cannot report visibility. Every tracker bound to
/// it stays idle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl VisibilityObserver for NoopObserver {
    fn supports_visibility(&self) -> bool {
        false
    }

    fn observe(&mut self, _: MessageId, _: &[f32]) -> Result<ObservationHandle, TrackerError> {
        Err(TrackerError::Unsupported)
    }

    fn unobserve(&mut self, _: ObservationHandle) {}

    fn bounds(&self, _: MessageId) -> Option<ElementBounds> {
        None
    }

    fn viewport_height(&self) -> u32 {
        0
    }

    fn observation_count(&self) -> usize {
        0
    }

    fn measure(&mut self, _: Viewport, _: &[(MessageId, RowSpan)]) -> Vec<IntersectionEntry> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_ratio_counts_overlapping_rows() {
        let viewport = Viewport::new(10, 5);
        assert_eq!(viewport.intersection(RowSpan::new(10, 5)), (1.0, true));
        assert_eq!(viewport.intersection(RowSpan::new(12, 4)), (0.75, true));
        assert_eq!(viewport.intersection(RowSpan::new(0, 10)), (0.0, false));
        assert_eq!(viewport.intersection(RowSpan::new(14, 2)), (0.5, true));
    }

    #[test]
    fn relative_bounds_can_be_negative() {
        let viewport = Viewport::new(10, 5);
        let bounds = viewport.relative(RowSpan::new(8, 3));
        assert_eq!(bounds, ElementBounds { top: -2, bottom: 1 });
        assert!(!bounds.fully_within(5));
        assert!(viewport.relative(RowSpan::new(11, 4)).fully_within(5));
    }

    #[test]
    fn update_reports_only_bucket_changes() {
        let mut observer = ViewportObserver::new();
        let handle = observer.observe(MessageId(1), &THRESHOLDS).unwrap();

        let entries = observer.update(Viewport::new(0, 4), [(MessageId(1), RowSpan::new(2, 4))]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].handle, handle);
        assert_eq!(entries[0].ratio, 0.5);

        // Same bucket, no report.
        let entries = observer.update(Viewport::new(0, 4), [(MessageId(1), RowSpan::new(2, 4))]);
        assert!(entries.is_empty());

        let entries = observer.update(Viewport::new(2, 4), [(MessageId(1), RowSpan::new(2, 4))]);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_fully_visible());
    }

    #[test]
    fn unobserved_messages_are_not_reported() {
        let mut observer = ViewportObserver::new();
        let handle = observer.observe(MessageId(1), &THRESHOLDS).unwrap();
        observer.unobserve(handle);
        assert_eq!(observer.observation_count(), 0);

        let entries = observer.update(Viewport::new(0, 10), [(MessageId(1), RowSpan::new(0, 2))]);
        assert!(entries.is_empty());
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        let mut observer = ViewportObserver::new();
        let err = observer.observe(MessageId(3), &[0.0, 1.5]).unwrap_err();
        assert!(matches!(err, TrackerError::Observe { id: 3, .. }));
        assert_eq!(observer.observation_count(), 0);
    }

    #[test]
    fn noop_observer_refuses_observation() {
        let mut observer = NoopObserver;
        assert!(!observer.supports_visibility());
        assert!(observer
            .measure(Viewport::new(0, 10), &[(MessageId(1), RowSpan::new(0, 1))])
            .is_empty());
        assert_eq!(
            observer.observe(MessageId(1), &THRESHOLDS),
            Err(TrackerError::Unsupported)
        );
    }
}
