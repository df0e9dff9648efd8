//! Metrics and observability for playlake.
//!
//! - `events`: internal event types and the `InternalEvent` trait
//! - `server`: Prometheus exporter and its HTTP endpoint

pub mod events;
pub mod server;

pub use server::init;

/// Emit an internal event.
///
/// Calls `InternalEvent::emit()` on the given event, which records the
/// corresponding Prometheus metric and a trace line.
///
/// ```ignore
/// use playlake::metrics::events::{RecordsRead, SourceKind};
///
/// emit!(RecordsRead { kind: SourceKind::Events, count: 100 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
