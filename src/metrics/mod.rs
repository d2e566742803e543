//! Metrics for the collector and the stream transformer.
//!
//! Events are recorded through the `metrics` facade. This crate never
//! installs a recorder; the hosting process decides where counters go.

pub mod events;

/// Emit an internal event.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding metric.
///
/// # Example
///
/// ```ignore
/// use badger::metrics::events::ObjectsDeleted;
///
/// emit!(ObjectsDeleted { count: 3 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
