//! A deterministic, event-driven market simulator for training and evaluating
//! microstructure trading agents against recorded top-N limit-order-book
//! snapshots.
//!
//! Given a chronologically ordered stream of L2 snapshot [`Record`]s and a
//! sequence of agent requests, [`MarketSimulator`] advances a synthetic
//! exchange clock and produces, tick by tick, order lifecycle events,
//! maker/taker fills, and a mark-to-market ledger — reproducibly from
//! identical inputs.
//!
//! The crate splits into two layers:
//!
//! * [`data`] — the memory-mappable `.snap` format, the zero-copy
//!   [`ReplayKernel`], and the `.csv.gz` converter behind the
//!   `snap-convert` binary.
//! * [`sim`] — the matching and queueing engine: per-price FIFO queues,
//!   depletion inference from observable depth shrinkage, taker sweeps over
//!   visible liquidity, activation with outbound latency, self-trade
//!   prevention, and integer-exact ledger/locking arithmetic.
//!
//! All prices, quantities, and cash values are fixed-point `i64` scaled by
//! `10^8`; all arithmetic is exact within 64-bit range so that two runs (or
//! two implementations) are bit-identical.
//!
//! ```no_run
//! use lobsim::prelude::*;
//!
//! let mut kernel = ReplayKernel::open("btcusdt.snap")?;
//! let mut sim = MarketSimulator::new(SimulatorParams {
//!     max_orders: 1024,
//!     max_events: 65536,
//!     alpha_ppm: 500_000,
//!     ..SimulatorParams::default()
//! });
//! sim.reset(Ns(0), Ledger { cash_q: 10_000 * PRICE_SCALE, ..Ledger::default() });
//!
//! while let Some(rec) = kernel.next() {
//!     sim.step(rec);
//! }
//! # Ok::<(), lobsim::data::SnapError>(())
//! ```
//!
//! [`Record`]: data::Record
//! [`ReplayKernel`]: data::ReplayKernel
//! [`MarketSimulator`]: sim::MarketSimulator

pub mod data;
pub mod fixed;
pub mod sim;
pub mod types;

/// Convenient re-exports of the types needed to drive a simulation.
pub mod prelude {
    pub use crate::data::{
        FileHeader, Level, Record, ReplayKernel, SnapError, DEPTH, PRICE_SCALE, QTY_SCALE,
    };
    pub use crate::sim::MarketSimulator;
    pub use crate::types::{
        Event, EventType, FeeSchedule, FillEvent, Ledger, LimitOrderRequest, LiquidityFlag,
        MarketOrderRequest, Ns, OrdType, Order, OrderState, RejectReason, RiskLimits, Side,
        SimulatorParams, StpPolicy, Tif, Visibility,
    };
}
