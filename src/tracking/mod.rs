//! Visibility-based read tracking for the message thread.

pub use observer::{NoopObserver, RowSpan, Viewport, ViewportObserver, VisibilityObserver};
pub use registry::{MountedMessage, TrackerRegistry};
pub use tracker::ManualOverride;

pub mod observer;
pub mod registry;
pub mod tracker;
