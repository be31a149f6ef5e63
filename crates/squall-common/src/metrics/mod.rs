//! Metrics and observability infrastructure.
//!
//! - `events`: the `InternalEvent` trait and transport-level events
//! - `server`: Prometheus HTTP server and initialization

pub mod events;
pub mod server;

pub use events::InternalEvent;
pub use server::init as init_metrics;

/// Macro for emitting metric events.
///
/// Calls `InternalEvent::emit()` on the given event, which records the
/// corresponding Prometheus metric.
///
/// # Example
///
/// ```ignore
/// use squall_common::emit;
/// use squall_common::metrics::events::RecordsQueued;
///
/// emit!(RecordsQueued { backend: url.clone(), count: 100 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        <_ as $crate::metrics::events::InternalEvent>::emit($event)
    };
}
