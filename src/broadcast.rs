use tracing::{debug, warn};

use crate::protocol::OutboundMessage;
use crate::registry::Registry;
use crate::session::SessionId;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub evicted: Vec<SessionId>,
}

/// Fans one message out to every other authenticated session.
///
/// Recipients are copied out of the registry before anything is sent, and
/// sending is a non-blocking enqueue, so a stuck peer never holds up the
/// sender or the other recipients. A recipient whose queue is full or whose
/// writer is gone is evicted; its own handler then tears it down exactly as
/// it would for a disconnect.
pub fn broadcast(registry: &Registry, exclude: SessionId, message: &OutboundMessage) -> Delivery {
    let line = message.to_line();
    let mut report = Delivery::default();

    for (id, outbound) in registry.recipients(exclude) {
        match outbound.try_deliver(line.clone()) {
            Ok(()) => report.delivered += 1,
            Err(err) => {
                warn!(session = %id, error = %err, "evicting slow or dead recipient");
                outbound.evict();
                report.evicted.push(id);
            }
        }
    }

    debug!(from = %exclude, kind = ?message.kind, delivered = report.delivered, "broadcast");

    report
}
