//! Share a simulated link's bandwidth among concurrent transfers over virtual time.
//!
//! A [Route] models a single bandwidth-constrained link between two endpoints inside a
//! discrete-event simulation. Any number of transfers can be active on a route at once. Each
//! transfer is tracked as a [Packet] and the route interleaves packets with a chunked round robin:
//! the head of the queue transfers at most one slice (by default [DEFAULT_SLICE] bytes), the
//! virtual clock advances by `slice / bandwidth`, and the packet goes to the back of the queue
//! if it has bytes left. No real bytes are moved.
//!
//! # Fairness
//!
//! Because every unfinished packet returns to the tail after exactly one slice, `N` concurrently
//! active packets each receive roughly `1/N` of the link over any window spanning a full rotation.
//! A lone packet of size `S` on a route with bandwidth `B > 0` completes exactly `S/B` seconds
//! after it was submitted, regardless of how many slices it is split into. A bandwidth of zero
//! (or less) marks the route as unconstrained: slices take no virtual time at all.
//!
//! # Limitations
//!
//! Once submitted, a packet is transferred to completion. There is no way to cancel an in-flight
//! packet or to time out a stalled transfer. The transfer task only makes progress while the
//! runtime is executing, so a [completion::Signal] still pending when the runtime stops never
//! fires. [Error::Canceled] is only reported once the packet itself is gone.
//!
//! # Example
//!
//! ```rust
//! use clustersim_route::{Config, Route, DEFAULT_SLICE};
//! use commonware_runtime::{deterministic, Clock, Metrics, Runner};
//! use std::time::Duration;
//!
//! let executor = deterministic::Runner::default();
//! executor.start(|context| async move {
//!     // Create a route with 1000 bytes/s of bandwidth
//!     let route = Route::new(
//!         context.with_label("route"),
//!         Config {
//!             source: 1u64,
//!             destination: 2u64,
//!             bandwidth: 1_000.0,
//!             slice: DEFAULT_SLICE,
//!             cluster: None::<()>,
//!             meter: None::<()>,
//!         },
//!     )
//!     .unwrap();
//!
//!     // Transfer 2500 bytes
//!     let start = context.current();
//!     let completed = route.send(2_500).await.unwrap().await.unwrap();
//!     assert_eq!(completed.duration_since(start).unwrap(), Duration::from_millis(2_500));
//! });
//! ```

use std::{
    fmt::{Debug, Display},
    hash::Hash,
};
use thiserror::Error;

pub mod completion;
pub mod metrics;
pub mod packet;
mod route;

pub use packet::Packet;
pub use route::{Config, Identity, Route, DEFAULT_SLICE};

/// Errors that can occur when interacting with a [Route].
#[derive(Debug, Error)]
pub enum Error {
    #[error("packet size must be positive")]
    InvalidSize,
    #[error("completion notifier has no listener")]
    InvalidNotifier,
    #[error("bandwidth must be finite: {0}")]
    InvalidBandwidth(f64),
    #[error("slice must be positive")]
    InvalidSlice,
    #[error("route closed")]
    Closed,
    #[error("completion canceled")]
    Canceled,
}

/// A source or destination of a [Route].
///
/// Routes only ever look at the identifier of an endpoint, so two routes built from endpoints
/// with equal identifiers are the same route (even if the endpoints differ otherwise).
pub trait Endpoint: Send + 'static {
    /// Stable identifier of the endpoint.
    type Id: Clone + Debug + Display + Eq + Hash + Ord + Send + Sync + 'static;

    /// Returns the identifier of the endpoint.
    fn id(&self) -> Self::Id;
}

macro_rules! impl_endpoint {
    ($($t:ty),*) => {
        $(
            impl Endpoint for $t {
                type Id = $t;

                fn id(&self) -> Self::Id {
                    self.clone()
                }
            }
        )*
    };
}

impl_endpoint!(u32, u64, String);

/// Instrumentation invoked around each slice a [Route] transfers.
///
/// Both hooks are called synchronously from the route's transfer task and must not wait on
/// anything (awaiting virtual time would skew every transfer on the route).
pub trait Meter<I>: Send + 'static {
    /// Called before a slice of `packet` starts transferring on `route`.
    fn check_in(&mut self, route: &Identity<I>, packet: packet::Id);

    /// Called after `bytes` of `packet` finished transferring on `route`.
    fn check_out(&mut self, route: &Identity<I>, packet: packet::Id, bytes: u64);
}

impl<I> Meter<I> for () {
    fn check_in(&mut self, _: &Identity<I>, _: packet::Id) {}

    fn check_out(&mut self, _: &Identity<I>, _: packet::Id, _: u64) {}
}
