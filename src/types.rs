//! Core simulator types.
//!
//! All monetary and quantity values are fixed-point `i64` in the
//! quantisation declared by the snapshot file header (see
//! [`PRICE_SCALE`](crate::data::PRICE_SCALE) /
//! [`QTY_SCALE`](crate::data::QTY_SCALE)); the `_q` suffix marks
//! already-scaled values.

/// Sentinel for "no index" in the order store and the intrusive bucket
/// lists.
pub const INVALID_INDEX: usize = usize::MAX;

/// Strongly-typed nanoseconds in the simulator clock domain (`ts_recv_ns`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ns(pub u64);

impl std::ops::Add for Ns {
    type Output = Ns;

    #[inline]
    fn add(self, rhs: Ns) -> Ns {
        Ns(self.0 + rhs.0)
    }
}

impl std::fmt::Display for Ns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OrdType {
    Limit,
    Market,
}

/// Time-in-force. `IOC` and `FOK` are recognised in the API but v0 treats
/// all limits as GTC-equivalent until fills cause a terminal state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Tif {
    #[default]
    Gtc,
    Ioc,
    Fok,
}

/// Visibility of an order's price level relative to the top-N snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Order price currently in the top-N window.
    Visible,
    /// Order price not in the top-N window (deep book).
    #[default]
    Blind,
    /// Was visible, became not visible; queue tracking frozen.
    Frozen,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OrderState {
    #[default]
    Pending,
    Active,
    Partial,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderState {
    /// Returns `true` for the absorbing states.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Cancelled | OrderState::Rejected
        )
    }

    /// Returns `true` when the order rests in a bucket and the active sets.
    #[inline]
    pub fn is_resting(self) -> bool {
        matches!(self, OrderState::Active | OrderState::Partial)
    }
}

/// Self-trade prevention policy, applied at order activation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StpPolicy {
    None,
    /// Reject the activating order if it would self-cross.
    #[default]
    RejectIncoming,
    /// Cancel resting opposite-side orders that would self-cross, then
    /// activate.
    CancelResting,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RejectReason {
    #[default]
    None,
    InvalidParams,
    InsufficientFunds,
    /// Capacity cap hit (`max_orders`, or the event log cannot absorb a
    /// required audit event).
    InsufficientResources,
    SelfTradePrevention,
    UnknownOrderId,
    AlreadyTerminal,
}

/// Fee schedule in parts-per-million of notional.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeeSchedule {
    pub maker_fee_ppm: u64,
    pub taker_fee_ppm: u64,
}

/// Risk model (spot-like in v0).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RiskLimits {
    /// Max absolute position in base `qty_q`. `0` disables the constraint.
    pub max_abs_position_qty_q: i64,
    /// If `true`, disallow selling more base than currently held.
    pub spot_no_short: bool,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_abs_position_qty_q: 0,
            spot_no_short: true,
        }
    }
}

/// Simulator construction parameters. Capacity caps are lifetime hard caps:
/// exceeding them is a deterministic rejection, never an allocation fault.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatorParams {
    /// Outbound order latency (agent request → exchange-active time).
    pub outbound_latency: Ns,
    /// Observation latency (exchange → agent). Reserved; no component reads
    /// it in v0.
    pub observation_latency: Ns,
    pub max_orders: usize,
    pub max_events: usize,
    /// Queue depletion attribution: the fraction of observed displayed-qty
    /// shrinkage attributed to trades rather than cancels, in ppm
    /// (`0..=1_000_000`).
    pub alpha_ppm: u64,
    pub stp: StpPolicy,
    pub fees: FeeSchedule,
    pub risk: RiskLimits,
}

/// Portfolio ledger. An order consumes from the free balance
/// `cash_q - locked_cash_q` at submit time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ledger {
    /// Quote-currency cash balance.
    pub cash_q: i64,
    /// Base-currency position. Negative only if `spot_no_short` is off.
    pub position_qty_q: i64,
    /// Reservations held for pending/resting orders.
    pub locked_cash_q: i64,
    pub locked_position_qty_q: i64,
}

#[derive(Clone, Copy, Debug)]
pub struct LimitOrderRequest {
    pub side: Side,
    pub price_q: i64,
    pub qty_q: i64,
    pub tif: Tif,
    /// Client correlation id; stored as metadata, never used for lookup.
    pub client_order_id: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct MarketOrderRequest {
    pub side: Side,
    pub qty_q: i64,
    pub tif: Tif,
    pub client_order_id: u64,
}

/// An order owned exclusively by the simulator's order store.
#[derive(Clone, Copy, Debug)]
pub struct Order {
    /// Simulator-assigned dense id, 1-based, `<= max_orders`.
    pub id: u64,
    pub client_order_id: u64,
    pub order_type: OrdType,
    pub side: Side,
    pub tif: Tif,

    /// Limit price; `0` for market orders.
    pub price_q: i64,
    pub qty_q: i64,
    /// Monotonically non-decreasing, `<= qty_q`.
    pub filled_qty_q: i64,

    /// Displayed quantity at this price estimated to be ahead of the agent.
    pub qty_ahead_q: i64,
    /// Last observed displayed quantity at the order's price level, for
    /// depletion inference. Only meaningful while not `Blind`.
    pub last_level_qty_q: i64,
    /// Last observed level index in `[0, DEPTH)`; `-1` means not present.
    pub last_level_idx: i16,
    pub visibility: Visibility,

    pub submit_ts: Ns,
    /// `submit_ts + outbound_latency`.
    pub activate_ts: Ns,

    pub state: OrderState,
    pub reject_reason: RejectReason,

    // Intrusive per-price FIFO linkage: indices into the order store.
    // Valid iff the order is resting in a bucket.
    pub(crate) bucket_prev: usize,
    pub(crate) bucket_next: usize,
}

impl Order {
    /// Quantity still open.
    #[inline]
    pub fn remaining_qty_q(&self) -> i64 {
        self.qty_q - self.filled_qty_q
    }
}

/// Lifecycle event kinds recorded in the bounded event log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    Submit,
    Activate,
    Cancel,
    Reject,
}

/// A lifecycle event. `order_id == 0` marks a rejection that never
/// allocated an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Event {
    pub ts: Ns,
    pub order_id: u64,
    pub event_type: EventType,
    pub state: OrderState,
    pub reject_reason: RejectReason,
}

/// Liquidity classification of a fill; governs the fee tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LiquidityFlag {
    Maker,
    Taker,
}

/// A fill. The fill log is append-only and unbounded in v0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FillEvent {
    pub ts: Ns,
    pub order_id: u64,
    pub side: Side,
    pub price_q: i64,
    pub qty_q: i64,
    pub liq: LiquidityFlag,
    pub notional_cash_q: i64,
    pub fee_cash_q: i64,
}
