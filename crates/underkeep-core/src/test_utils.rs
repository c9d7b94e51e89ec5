//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]`.

use crate::id::{PlayerId, SeatId, TeamId};
use crate::seat::SeatRegistry;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

// ===========================================================================
// Seat fixtures
// ===========================================================================

pub fn keeper() -> SeatId {
    SeatId(1)
}
pub fn ally() -> SeatId {
    SeatId(2)
}
pub fn rival() -> SeatId {
    SeatId(3)
}
pub fn neutral() -> SeatId {
    SeatId(4)
}

pub fn keeper_player() -> PlayerId {
    PlayerId(1)
}
pub fn ally_player() -> PlayerId {
    PlayerId(2)
}
pub fn rival_player() -> PlayerId {
    PlayerId(3)
}

/// Four seats:
///
/// - `keeper` (team 1, human `keeper_player`)
/// - `ally` (team 1, computer `ally_player`)
/// - `rival` (team 2, human `rival_player`)
/// - `neutral` (team 3, unclaimed)
pub fn keeper_seats() -> SeatRegistry {
    let mut seats = SeatRegistry::new();
    seats.register(keeper(), TeamId(1)).unwrap();
    seats.register(ally(), TeamId(1)).unwrap();
    seats.register(rival(), TeamId(2)).unwrap();
    seats.register(neutral(), TeamId(3)).unwrap();
    seats.claim(keeper(), keeper_player(), true).unwrap();
    seats.claim(ally(), ally_player(), false).unwrap();
    seats.claim(rival(), rival_player(), true).unwrap();
    seats
}

// ===========================================================================
// Log capture
// ===========================================================================

/// One captured tracing event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedLog {
    pub level: Level,
    pub message: String,
}

#[derive(Clone, Default)]
struct CaptureLayer {
    logs: Arc<Mutex<Vec<CapturedLog>>>,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        if let Ok(mut logs) = self.logs.lock() {
            logs.push(CapturedLog {
                level: *event.metadata().level(),
                message: visitor.message,
            });
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message.insert_str(0, &format!("{value:?}"));
        } else {
            self.message.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

/// Run `f` with a thread-local subscriber and return what it logged.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, Vec<CapturedLog>) {
    let layer = CaptureLayer::default();
    let logs = Arc::clone(&layer.logs);
    let subscriber = tracing_subscriber::registry().with(layer);
    let result = tracing::subscriber::with_default(subscriber, f);
    let captured = logs.lock().map(|l| l.clone()).unwrap_or_default();
    (result, captured)
}

/// Captured events at `WARN` or `ERROR`.
pub fn diagnostics(logs: &[CapturedLog]) -> Vec<&CapturedLog> {
    logs.iter()
        .filter(|l| l.level == Level::WARN || l.level == Level::ERROR)
        .collect()
}
