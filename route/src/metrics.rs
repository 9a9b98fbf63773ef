//! Prometheus-backed [Meter].

use crate::{packet, Identity, Meter};
use commonware_runtime::Metrics;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
};
use std::fmt::Display;

/// Labels attached to every per-route metric.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct Route {
    pub source: String,
    pub destination: String,
}

impl Route {
    pub fn new<I: Display>(route: &Identity<I>) -> Self {
        Self {
            source: route.source.to_string(),
            destination: route.destination.to_string(),
        }
    }
}

/// [Meter] that tracks slice activity per route.
///
/// Clones share the same underlying metrics, so a single [Metered] can be handed to every route
/// in a topology.
#[derive(Clone, Debug, Default)]
pub struct Metered {
    check_ins: Family<Route, Counter>,
    bytes: Family<Route, Counter>,
    in_flight: Family<Route, Gauge>,
}

impl Metered {
    /// Create a new meter and register its metrics with `context`.
    pub fn new(context: &impl Metrics) -> Self {
        let metered = Self::default();
        context.register(
            "check_ins",
            "slices started per route",
            metered.check_ins.clone(),
        );
        context.register(
            "bytes",
            "bytes transferred per route",
            metered.bytes.clone(),
        );
        context.register(
            "in_flight",
            "slices currently transferring per route",
            metered.in_flight.clone(),
        );
        metered
    }
}

impl<I: Display> Meter<I> for Metered {
    fn check_in(&mut self, route: &Identity<I>, _: packet::Id) {
        let label = Route::new(route);
        self.check_ins.get_or_create(&label).inc();
        self.in_flight.get_or_create(&label).inc();
    }

    fn check_out(&mut self, route: &Identity<I>, _: packet::Id, bytes: u64) {
        let label = Route::new(route);
        self.bytes.get_or_create(&label).inc_by(bytes);
        self.in_flight.get_or_create(&label).dec();
    }
}
