//! The matching and queueing engine.
//!
//! [`MarketSimulator`] is single-threaded and run-to-completion: every
//! operation finishes before the next is accepted, and identical inputs
//! produce byte-identical order, event, and fill logs.
//!
//! Per [`step`](MarketSimulator::step), the pipeline is:
//!
//! 1. set the simulator clock from `record.ts_recv_ns`;
//! 2. passive (maker) pass over every active bid bucket, which also drives
//!    the per-bucket visibility state machine;
//! 3. the same over ask buckets;
//! 4. aggressive (taker) pass: resting orders now marketable against the
//!    visible top-N sweep a step-local copy of the displayed depth;
//! 5. compaction of buckets emptied by fills (erasure is deferred while the
//!    passes iterate the bucket arrays);
//! 6. activation drain: orders whose `activate_ts` has arrived pass
//!    self-trade prevention, join the active sets and their price bucket,
//!    and initialise queue tracking — fill-eligible from the *next* record.
//!
//! Passive fills run before activation, so an order submitted at time `t`
//! with zero outbound latency never receives a fill from the very record it
//! was submitted on. This is the key determinism seam.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::data::Record;
use crate::types::{
    Event, EventType, FillEvent, Ledger, Ns, Order, OrderState, RejectReason, Side,
    SimulatorParams, INVALID_INDEX,
};

mod aggressive;
mod book;
mod fills;
mod orders;
mod passive;
mod stp;

pub mod lookup;
pub mod queue;

use book::Bucket;

/// Entry in the activation min-heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingEntry {
    activate_ts: Ns,
    /// Monotone submission counter; totally orders simultaneous
    /// activations.
    seq: u64,
    order_id: u64,
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the earliest (activate_ts, seq).
        other
            .activate_ts
            .cmp(&self.activate_ts)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Deterministic L2 market simulator.
///
/// Construct with [`new`](Self::new), then call [`reset`](Self::reset)
/// before the first operation. All state is owned by the instance; there is
/// no process-global state.
pub struct MarketSimulator {
    params: SimulatorParams,
    now: Ns,
    ledger: Ledger,

    /// Orders in insertion order; `id_to_index` maps order id -> index.
    orders: Vec<Order>,
    /// Direct-address table sized `max_orders + 1`; `INVALID_INDEX` when
    /// absent.
    id_to_index: Vec<usize>,

    pending: BinaryHeap<PendingEntry>,
    next_order_id: u64,
    next_seq: u64,

    /// Resting orders as order-store indices, for O(1) swap-pop removal via
    /// the `active_*_pos` back-pointers.
    active_bids: Vec<usize>,
    active_asks: Vec<usize>,
    active_bid_pos: Vec<usize>,
    active_ask_pos: Vec<usize>,

    // Flat ordered buckets: prices ascending on both sides, so the best bid
    // is the last bid price and the best ask is the first ask price.
    bid_prices: Vec<i64>,
    bid_buckets: Vec<Bucket>,
    ask_prices: Vec<i64>,
    ask_buckets: Vec<Bucket>,

    // O(1) summaries for STP detection.
    has_active_bids: bool,
    has_active_asks: bool,
    best_active_bid_q: i64,
    best_active_ask_q: i64,

    /// While the fill passes iterate the bucket arrays, empty buckets must
    /// not be erased or the iteration indices would shift; compaction runs
    /// once at the end of the passes.
    defer_bucket_erase: bool,

    /// Lifecycle log, hard-capped by `max_events`.
    events: Vec<Event>,
    /// Fill log, unbounded in v0.
    fills: Vec<FillEvent>,
}

impl MarketSimulator {
    pub fn new(params: SimulatorParams) -> Self {
        Self {
            params,
            now: Ns(0),
            ledger: Ledger::default(),
            orders: Vec::new(),
            id_to_index: Vec::new(),
            pending: BinaryHeap::new(),
            next_order_id: 1,
            next_seq: 1,
            active_bids: Vec::new(),
            active_asks: Vec::new(),
            active_bid_pos: Vec::new(),
            active_ask_pos: Vec::new(),
            bid_prices: Vec::new(),
            bid_buckets: Vec::new(),
            ask_prices: Vec::new(),
            ask_buckets: Vec::new(),
            has_active_bids: false,
            has_active_asks: false,
            best_active_bid_q: 0,
            best_active_ask_q: 0,
            defer_bucket_erase: false,
            events: Vec::new(),
            fills: Vec::new(),
        }
    }

    /// Clears all state for a deterministic replay. `start_ts` sets the
    /// simulator clock baseline.
    pub fn reset(&mut self, start_ts: Ns, initial_ledger: Ledger) {
        assert!(self.params.max_orders > 0, "max_orders must be positive");
        assert!(self.params.max_events > 0, "max_events must be positive");
        assert!(
            self.params.alpha_ppm <= 1_000_000,
            "alpha_ppm must be within [0, 1_000_000]"
        );
        assert!(
            initial_ledger.locked_cash_q >= 0 && initial_ledger.locked_position_qty_q >= 0,
            "initial locks must be non-negative"
        );

        self.now = start_ts;
        self.ledger = initial_ledger;

        self.orders.clear();
        self.orders.reserve(self.params.max_orders);
        self.events.clear();
        self.events.reserve(self.params.max_events);
        self.fills.clear();
        self.pending.clear();

        self.next_order_id = 1;
        self.next_seq = 1;

        let table = self.params.max_orders + 1;
        self.id_to_index.clear();
        self.id_to_index.resize(table, INVALID_INDEX);
        self.active_bid_pos.clear();
        self.active_bid_pos.resize(table, INVALID_INDEX);
        self.active_ask_pos.clear();
        self.active_ask_pos.resize(table, INVALID_INDEX);

        self.active_bids.clear();
        self.active_asks.clear();
        self.active_bids.reserve(self.params.max_orders);
        self.active_asks.reserve(self.params.max_orders);

        self.bid_prices.clear();
        self.bid_buckets.clear();
        self.ask_prices.clear();
        self.ask_buckets.clear();

        self.has_active_bids = false;
        self.has_active_asks = false;
        self.best_active_bid_q = 0;
        self.best_active_ask_q = 0;
        self.defer_bucket_erase = false;
    }

    /// Advances the simulator by one market data record.
    ///
    /// The record is borrowed for the duration of the call; the caller must
    /// keep its backing memory valid (the replay kernel's mappings outlive
    /// any step).
    pub fn step(&mut self, rec: &Record) {
        assert!(
            !self.id_to_index.is_empty(),
            "reset() must be called before step()"
        );
        assert!(rec.ts_recv_ns >= 0, "record ts_recv_ns must be non-negative");
        self.now = Ns(rec.ts_recv_ns as u64);

        // Queue advancement and passive fills are handled bucket-level in
        // the passive pass; it is the only site that applies effective
        // depletion to qty_ahead_q, so depletion lands exactly once per
        // bucket per step.
        self.defer_bucket_erase = true;
        for i in 0..self.bid_buckets.len() {
            self.passive_fills_one_bucket(rec, i, Side::Buy);
        }
        for i in 0..self.ask_buckets.len() {
            self.passive_fills_one_bucket(rec, i, Side::Sell);
        }

        self.aggressive_fills(rec);

        self.defer_bucket_erase = false;
        self.compact_empty_buckets();

        // Activations last: newly-due orders become fill-eligible only on
        // the next record.
        self.drain_activations(rec);
    }

    fn drain_activations(&mut self, rec: &Record) {
        while let Some(&top) = self.pending.peek() {
            if top.activate_ts > self.now {
                break;
            }
            self.pending.pop();

            // The heap entry may be stale; validate against the live order.
            if top.order_id == 0 || top.order_id as usize >= self.id_to_index.len() {
                continue;
            }
            let idx = self.id_to_index[top.order_id as usize];
            if idx == INVALID_INDEX {
                continue;
            }
            if self.orders[idx].state != OrderState::Pending {
                continue;
            }

            if !self.apply_stp_on_activate(idx) {
                continue;
            }

            let id = self.orders[idx].id;
            if !self.push_event(
                id,
                EventType::Activate,
                OrderState::Active,
                RejectReason::None,
            ) {
                self.unlock_remaining(idx);
                let o = &mut self.orders[idx];
                o.state = OrderState::Rejected;
                o.reject_reason = RejectReason::InsufficientResources;
                continue;
            }

            self.orders[idx].state = OrderState::Active;
            queue::init_on_activate(rec, &mut self.orders[idx]);

            let (side, price_q) = (self.orders[idx].side, self.orders[idx].price_q);
            match side {
                Side::Buy => {
                    self.active_bid_pos[id as usize] = self.active_bids.len();
                    self.active_bids.push(idx);

                    let bidx = self.get_or_insert_bid_bucket_idx(price_q);
                    self.bucket_push_back_bid(bidx, idx);
                    if self.bid_buckets[bidx].size == 1 {
                        // A fresh bucket inherits the activating order's
                        // observation; the next tick's depletion then diffs
                        // against the snapshot the order joined on.
                        let o = &self.orders[idx];
                        let b = &mut self.bid_buckets[bidx];
                        b.visibility = o.visibility;
                        b.last_level_idx = o.last_level_idx;
                        b.last_level_qty_q = o.last_level_qty_q;
                    }

                    if !self.has_active_bids {
                        self.has_active_bids = true;
                        self.best_active_bid_q = price_q;
                    } else if price_q > self.best_active_bid_q {
                        self.best_active_bid_q = price_q;
                    }
                }
                Side::Sell => {
                    self.active_ask_pos[id as usize] = self.active_asks.len();
                    self.active_asks.push(idx);

                    let aidx = self.get_or_insert_ask_bucket_idx(price_q);
                    self.bucket_push_back_ask(aidx, idx);
                    if self.ask_buckets[aidx].size == 1 {
                        let o = &self.orders[idx];
                        let b = &mut self.ask_buckets[aidx];
                        b.visibility = o.visibility;
                        b.last_level_idx = o.last_level_idx;
                        b.last_level_qty_q = o.last_level_qty_q;
                    }

                    if !self.has_active_asks {
                        self.has_active_asks = true;
                        self.best_active_ask_q = price_q;
                    } else if price_q < self.best_active_ask_q {
                        self.best_active_ask_q = price_q;
                    }
                }
            }
        }
    }

    /// Appends a lifecycle event, refusing once `max_events` is reached.
    /// Any operation that cannot log a required audit event must refuse to
    /// commit the state change.
    pub(crate) fn push_event(
        &mut self,
        order_id: u64,
        event_type: EventType,
        state: OrderState,
        reject_reason: RejectReason,
    ) -> bool {
        if self.events.len() >= self.params.max_events {
            return false;
        }
        self.events.push(Event {
            ts: self.now,
            order_id,
            event_type,
            state,
            reject_reason,
        });
        true
    }

    /// Current simulator clock.
    #[inline]
    pub fn now(&self) -> Ns {
        self.now
    }

    #[inline]
    pub fn params(&self) -> &SimulatorParams {
        &self.params
    }

    #[inline]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// All orders ever accepted, in submission order. Borrowed views stay
    /// valid until the next mutating call; a binding layer should copy at
    /// its boundary.
    #[inline]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Looks up an order by its simulator-assigned id.
    pub fn order(&self, order_id: u64) -> Option<&Order> {
        let idx = *self.id_to_index.get(order_id as usize)?;
        if idx == INVALID_INDEX {
            return None;
        }
        Some(&self.orders[idx])
    }

    /// The lifecycle event log.
    #[inline]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The fill log.
    #[inline]
    pub fn fills(&self) -> &[FillEvent] {
        &self.fills
    }
}
