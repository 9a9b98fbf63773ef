use super::{Backlog, Identity};
use crate::{Meter, Packet};
use commonware_runtime::{Clock, Metrics};
use futures::{channel::mpsc, SinkExt, StreamExt};
use prometheus_client::metrics::counter::Counter;
use std::{
    cmp::max,
    fmt::Display,
    time::{Duration, SystemTime},
};
use tracing::{debug, trace};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Time it takes to move `bytes` over a link of `bandwidth` bytes/second (rounded to the
/// nearest nanosecond, saturating).
fn transfer_time(bytes: u64, bandwidth: f64) -> Duration {
    let nanos = (bytes as f64 * NANOS_PER_SEC / bandwidth).round();
    Duration::from_nanos(nanos as u64)
}

/// Transfer loop of a route.
///
/// The actor is the only consumer of the route's queue. It alternates between waiting for a
/// packet and transferring one slice of it, so it is the only place virtual time is spent.
pub struct Actor<I, M> {
    identity: Identity<I>,
    bandwidth: f64,
    slice: u64,
    meter: Option<M>,

    mailbox: mpsc::UnboundedSender<Packet>,
    queue: mpsc::UnboundedReceiver<Packet>,
    backlog: Backlog,

    /// End of the most recent slice (the link is free from this point on).
    idle: SystemTime,

    slices: Counter,
    bytes: Counter,
    completed: Counter,
}

impl<I: Display + Send + 'static, M: Meter<I>> Actor<I, M> {
    #[allow(clippy::too_many_arguments)]
    pub fn new<E: Clock + Metrics>(
        context: &E,
        identity: Identity<I>,
        bandwidth: f64,
        slice: u64,
        meter: Option<M>,
        mailbox: mpsc::UnboundedSender<Packet>,
        queue: mpsc::UnboundedReceiver<Packet>,
        backlog: Backlog,
    ) -> Self {
        let slices = Counter::default();
        let bytes = Counter::default();
        let completed = Counter::default();
        context.register("slices", "slices transferred", slices.clone());
        context.register("bytes", "bytes transferred", bytes.clone());
        context.register("completed", "packets fully transferred", completed.clone());
        context.register(
            "backlog",
            "bytes waiting in the queue",
            backlog.gauge.clone(),
        );

        Self {
            identity,
            bandwidth,
            slice,
            meter,
            mailbox,
            queue,
            backlog,
            idle: context.current(),
            slices,
            bytes,
            completed,
        }
    }

    /// Reserved for varying the route's bandwidth over simulated time. Currently a no-op.
    fn fluctuate(&mut self) {}

    pub async fn run(mut self, context: impl Clock) {
        debug!(
            route = %self.identity,
            bandwidth = self.bandwidth,
            slice = self.slice,
            "route started"
        );

        // The actor holds a sender of its own queue, so this never returns `None`
        while let Some(mut packet) = self.queue.next().await {
            let id = packet.id();
            self.backlog.sub(packet.remaining());
            self.fluctuate();
            let chunk = packet.remaining().min(self.slice);

            if let Some(meter) = self.meter.as_mut() {
                meter.check_in(&self.identity, id);
            }

            // Slices are laid back to back on the link's own clock, so waiting
            // for the executor to poll us never stretches a transfer.
            let start = max(self.idle, packet.ready());
            let end = if self.bandwidth > 0.0 {
                let end = start
                    .checked_add(transfer_time(chunk, self.bandwidth))
                    .expect("slice end overflowed");
                context.sleep_until(end).await;
                end
            } else {
                start
            };
            self.idle = end;
            trace!(route = %self.identity, packet = %id, chunk, "transferred slice");

            if let Some(meter) = self.meter.as_mut() {
                meter.check_out(&self.identity, id, chunk);
            }
            packet.decrement(chunk, end);
            self.slices.inc();
            self.bytes.inc_by(chunk);

            if packet.is_complete() {
                self.completed.inc();
                debug!(route = %self.identity, packet = %id, "packet transferred");
            } else {
                self.backlog.add(packet.remaining());
                if self.mailbox.send(packet).await.is_err() {
                    break;
                }
            }
        }
        debug!(route = %self.identity, "route stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_time() {
        assert_eq!(transfer_time(1_000, 1_000.0), Duration::from_secs(1));
        assert_eq!(transfer_time(500, 1_000.0), Duration::from_millis(500));
        assert_eq!(transfer_time(300, 1_000.0), Duration::from_millis(300));
        assert_eq!(transfer_time(1, 3.0), Duration::from_nanos(333_333_333));
        assert_eq!(
            transfer_time(u64::MAX, f64::MIN_POSITIVE),
            Duration::from_nanos(u64::MAX)
        );
    }
}
