//! Bandwidth-constrained link between two endpoints.

use crate::{
    completion::{self, Notifier, Signal},
    packet, Endpoint, Error, Meter, Packet,
};
use commonware_runtime::{Clock, Metrics, Spawner};
use futures::{channel::mpsc, SinkExt};
use prometheus_client::metrics::gauge::Gauge;
use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::debug;

mod actor;

/// Bytes waiting in a route's queue, mirrored into an exported gauge on every change.
#[derive(Clone, Default)]
struct Backlog {
    bytes: Arc<AtomicU64>,
    gauge: Gauge,
}

impl Backlog {
    fn add(&self, bytes: u64) {
        let total = self.bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.publish(total);
    }

    fn sub(&self, bytes: u64) {
        let total = self.bytes.fetch_sub(bytes, Ordering::Relaxed) - bytes;
        self.publish(total);
    }

    fn get(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn publish(&self, total: u64) {
        self.gauge.set(total.try_into().unwrap_or(i64::MAX));
    }
}

/// Default maximum number of bytes a packet may transfer per turn.
pub const DEFAULT_SLICE: u64 = 1_000;

/// Configuration for a [Route].
#[derive(Clone)]
pub struct Config<N, C, M> {
    /// Endpoint sending over the route.
    pub source: N,

    /// Endpoint receiving over the route.
    pub destination: N,

    /// Capacity of the route in bytes per second of virtual time.
    ///
    /// Zero or negative values mark the route as unconstrained (transfers take no virtual time).
    pub bandwidth: f64,

    /// Maximum number of bytes a packet transfers before yielding the link to the next packet.
    pub slice: u64,

    /// Cluster the route belongs to (informational).
    pub cluster: Option<C>,

    /// Instrumentation notified around each slice.
    pub meter: Option<M>,
}

/// Position of a [Route] in the topology.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity<I> {
    pub source: I,
    pub destination: I,
}

impl<I: fmt::Display> fmt::Display for Identity<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// A simulated link that shares its bandwidth among all in-flight packets with round robin.
///
/// Two routes are equal (and hash identically) iff their [Identity] matches, regardless of
/// bandwidth, cluster, or meter.
pub struct Route<E: Clock, N: Endpoint, C> {
    context: E,
    source: N,
    destination: N,
    identity: Identity<N::Id>,
    bandwidth: f64,
    slice: u64,
    cluster: Option<C>,

    mailbox: mpsc::UnboundedSender<Packet>,
    backlog: Backlog,
}

impl<E: Spawner + Clock + Metrics, N: Endpoint, C> Route<E, N, C> {
    /// Create a new route and start its transfer task.
    ///
    /// The task runs for as long as the runtime keeps executing.
    pub fn new<M: Meter<N::Id>>(context: E, cfg: Config<N, C, M>) -> Result<Self, Error> {
        if !cfg.bandwidth.is_finite() {
            return Err(Error::InvalidBandwidth(cfg.bandwidth));
        }
        if cfg.slice == 0 {
            return Err(Error::InvalidSlice);
        }

        // Start transfer task
        let identity = Identity {
            source: cfg.source.id(),
            destination: cfg.destination.id(),
        };
        let (mailbox, queue) = mpsc::unbounded();
        let backlog = Backlog::default();
        let actor = actor::Actor::new(
            &context,
            identity.clone(),
            cfg.bandwidth,
            cfg.slice,
            cfg.meter,
            mailbox.clone(),
            queue,
            backlog.clone(),
        );
        context.clone().spawn(move |context| actor.run(context));

        Ok(Self {
            context,
            source: cfg.source,
            destination: cfg.destination,
            identity,
            bandwidth: cfg.bandwidth,
            slice: cfg.slice,
            cluster: cfg.cluster,
            mailbox,
            backlog,
        })
    }
}

impl<E: Clock, N: Endpoint, C> Route<E, N, C> {
    /// Queue a transfer of `size` bytes, firing `notifier` once the last byte is sent.
    ///
    /// The packet is validated before anything is queued. The queue is unbounded, so this
    /// only ever waits when the transfer task is gone (in which case [Error::Closed] is returned).
    pub async fn submit(&self, size: u64, notifier: Notifier) -> Result<packet::Id, Error> {
        let packet = match Packet::new(size, notifier, self.context.current()) {
            Ok(packet) => packet,
            Err(err) => {
                debug!(route = %self.identity, size, ?err, "rejected packet");
                return Err(err);
            }
        };
        let id = packet.id();

        // Count the bytes before the transfer task can see them
        self.backlog.add(size);
        let mut mailbox = self.mailbox.clone();
        if mailbox.send(packet).await.is_err() {
            self.backlog.sub(size);
            return Err(Error::Closed);
        }
        Ok(id)
    }

    /// Queue a transfer of `size` bytes and return a [Signal] that resolves once it completes.
    pub async fn send(&self, size: u64) -> Result<Signal, Error> {
        let (notifier, signal) = completion::channel();
        self.submit(size, notifier).await?;
        Ok(signal)
    }

    /// Estimate the bandwidth currently available to a new transfer.
    ///
    /// This is a congestion signal for observers only (the route never uses it). It returns the
    /// configured bandwidth when nothing is queued and strictly decreases as the backlog grows.
    /// The packet currently transferring a slice is not part of the backlog.
    ///
    /// An unconstrained route (bandwidth `<= 0`) always reports its configured bandwidth.
    pub fn realtime_bandwidth(&self) -> f64 {
        let backlog = self.backlog();
        if backlog == 0 || self.bandwidth <= 0.0 {
            return self.bandwidth;
        }
        let estimate = (backlog as f64 + 1.0) / self.bandwidth;
        if estimate == 0.0 {
            self.bandwidth
        } else {
            1.0 / estimate
        }
    }

    /// Bytes waiting in the queue.
    pub fn backlog(&self) -> u64 {
        self.backlog.get()
    }

    pub fn source(&self) -> &N {
        &self.source
    }

    pub fn destination(&self) -> &N {
        &self.destination
    }

    pub fn identity(&self) -> &Identity<N::Id> {
        &self.identity
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn slice(&self) -> u64 {
        self.slice
    }

    pub fn cluster(&self) -> Option<&C> {
        self.cluster.as_ref()
    }

    pub fn set_cluster(&mut self, cluster: Option<C>) {
        self.cluster = cluster;
    }
}

impl<E: Clock, N: Endpoint, C> PartialEq for Route<E, N, C> {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl<E: Clock, N: Endpoint, C> Eq for Route<E, N, C> {}

impl<E: Clock, N: Endpoint, C> Hash for Route<E, N, C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl<E: Clock, N: Endpoint, C> fmt::Display for Route<E, N, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.identity, f)
    }
}

impl<E: Clock, N: Endpoint, C> fmt::Debug for Route<E, N, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("identity", &self.identity)
            .field("bandwidth", &self.bandwidth)
            .field("slice", &self.slice)
            .field("backlog", &self.backlog())
            .finish()
    }
}
