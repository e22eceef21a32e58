//! Order entry: validation, risk locking, submission, and cancellation.

use crate::types::{
    EventType, LimitOrderRequest, MarketOrderRequest, OrdType, Order, OrderState, RejectReason,
    Side, Visibility, INVALID_INDEX,
};

use super::{MarketSimulator, PendingEntry};

impl MarketSimulator {
    /// Places a limit order. Returns the assigned simulator order id, or
    /// `0` if rejected; the rejection reason is recorded in the lifecycle
    /// log when the event budget allows.
    pub fn place_limit(&mut self, req: &LimitOrderRequest) -> u64 {
        assert!(
            !self.id_to_index.is_empty(),
            "reset() must be called before place_limit()"
        );

        // max_orders is a lifetime cap on ids; reuse after cancel is not
        // permitted.
        if self.next_order_id == 0 || self.next_order_id > self.params.max_orders as u64 {
            self.reject_unallocated(RejectReason::InsufficientResources);
            return 0;
        }
        if self.orders.len() >= self.params.max_orders {
            self.reject_unallocated(RejectReason::InsufficientResources);
            return 0;
        }

        let vr = validate_limit(req);
        if vr != RejectReason::None {
            self.reject_unallocated(vr);
            return 0;
        }

        // Auditability: the submit event must be loggable.
        if self.events.len() >= self.params.max_events {
            self.reject_unallocated(RejectReason::InsufficientResources);
            return 0;
        }

        let rr = self.risk_check_and_lock_limit(req.side, req.price_q, req.qty_q);
        if rr != RejectReason::None {
            self.reject_unallocated(rr);
            return 0;
        }

        let id = self.next_order_id;
        self.next_order_id += 1;
        let idx = self.orders.len();

        let order = Order {
            id,
            client_order_id: req.client_order_id,
            order_type: OrdType::Limit,
            side: req.side,
            tif: req.tif,
            price_q: req.price_q,
            qty_q: req.qty_q,
            filled_qty_q: 0,
            qty_ahead_q: 0,
            last_level_qty_q: 0,
            last_level_idx: -1,
            visibility: Visibility::Blind,
            submit_ts: self.now,
            activate_ts: self.now + self.params.outbound_latency,
            state: OrderState::Pending,
            reject_reason: RejectReason::None,
            bucket_prev: INVALID_INDEX,
            bucket_next: INVALID_INDEX,
        };
        self.orders.push(order);
        self.id_to_index[id as usize] = idx;

        if !self.push_event(id, EventType::Submit, OrderState::Pending, RejectReason::None) {
            // Unreachable given the pre-check; roll back deterministically
            // anyway.
            self.id_to_index[id as usize] = INVALID_INDEX;
            self.orders.pop();
            self.unlock_for(&order);
            return 0;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(PendingEntry {
            activate_ts: order.activate_ts,
            seq,
            order_id: id,
        });
        id
    }

    /// Places a market order. Reserved: the request shape is validated,
    /// then the order is deterministically rejected — no locking rule for
    /// marketable quantity exists yet.
    pub fn place_market(&mut self, req: &MarketOrderRequest) -> u64 {
        assert!(
            !self.id_to_index.is_empty(),
            "reset() must be called before place_market()"
        );

        let vr = validate_market(req);
        if vr != RejectReason::None {
            self.reject_unallocated(vr);
            return 0;
        }
        self.reject_unallocated(RejectReason::InvalidParams);
        0
    }

    /// Cancels an order by simulator id. Returns `false` for an unknown id,
    /// an already-terminal order, or when the cancel event cannot be
    /// logged (the state change is then refused entirely).
    pub fn cancel(&mut self, order_id: u64) -> bool {
        if order_id == 0 || order_id as usize >= self.id_to_index.len() {
            return false;
        }
        let idx = self.id_to_index[order_id as usize];
        if idx == INVALID_INDEX {
            return false;
        }
        if self.orders[idx].state.is_terminal() {
            return false;
        }
        if self.events.len() >= self.params.max_events {
            return false;
        }

        if self.orders[idx].state.is_resting() {
            match self.orders[idx].side {
                Side::Buy => self.remove_active_bid(order_id, idx),
                Side::Sell => self.remove_active_ask(order_id, idx),
            }
        }

        self.unlock_remaining(idx);
        self.orders[idx].state = OrderState::Cancelled;
        self.push_event(
            order_id,
            EventType::Cancel,
            OrderState::Cancelled,
            RejectReason::None,
        )
    }

    /// Best-effort reject logging for requests that never allocated an
    /// order (`order_id = 0`).
    fn reject_unallocated(&mut self, reason: RejectReason) {
        let _ = self.push_event(0, EventType::Reject, OrderState::Rejected, reason);
    }

    fn risk_check_and_lock_limit(&mut self, side: Side, price_q: i64, qty_q: i64) -> RejectReason {
        if price_q <= 0 || qty_q <= 0 {
            return RejectReason::InvalidParams;
        }

        if let Some(limit) = positive(self.params.risk.max_abs_position_qty_q) {
            // Worst-case post-fill position must stay within the band.
            let worst = match side {
                Side::Buy => self.ledger.position_qty_q.saturating_add(qty_q),
                Side::Sell => self.ledger.position_qty_q.saturating_sub(qty_q),
            };
            if worst.saturating_abs() > limit {
                return RejectReason::InsufficientFunds;
            }
        }

        match side {
            Side::Buy => {
                let required = match price_q.checked_mul(qty_q) {
                    Some(v) if v >= 0 => v,
                    _ => return RejectReason::InvalidParams,
                };
                if self.ledger.cash_q - self.ledger.locked_cash_q < required {
                    return RejectReason::InsufficientFunds;
                }
                self.ledger.locked_cash_q += required;
            }
            Side::Sell => {
                if self.params.risk.spot_no_short
                    && self.ledger.position_qty_q - self.ledger.locked_position_qty_q < qty_q
                {
                    return RejectReason::InsufficientFunds;
                }
                self.ledger.locked_position_qty_q += qty_q;
            }
        }
        RejectReason::None
    }

    /// Releases the reservation still held for an order's unfilled
    /// remainder. Used on cancel, reject, and any terminal transition with
    /// quantity left open.
    pub(crate) fn unlock_remaining(&mut self, order_idx: usize) {
        let order = self.orders[order_idx];
        self.unlock_for(&order);
    }

    fn unlock_for(&mut self, o: &Order) {
        let remaining = o.remaining_qty_q();
        if remaining <= 0 || o.order_type != OrdType::Limit {
            return;
        }

        match o.side {
            Side::Buy => {
                match o.price_q.checked_mul(remaining) {
                    // The lock used the same arithmetic, so the subtraction
                    // is exact; the clamp guards the unreachable paths.
                    Some(delta) => {
                        self.ledger.locked_cash_q = (self.ledger.locked_cash_q - delta).max(0);
                    }
                    None => self.ledger.locked_cash_q = 0,
                }
            }
            Side::Sell => {
                self.ledger.locked_position_qty_q =
                    (self.ledger.locked_position_qty_q - remaining).max(0);
            }
        }
    }
}

fn validate_limit(req: &LimitOrderRequest) -> RejectReason {
    if req.qty_q <= 0 || req.price_q <= 0 {
        return RejectReason::InvalidParams;
    }
    RejectReason::None
}

fn validate_market(req: &MarketOrderRequest) -> RejectReason {
    if req.qty_q <= 0 {
        return RejectReason::InvalidParams;
    }
    RejectReason::None
}

#[inline]
fn positive(v: i64) -> Option<i64> {
    (v > 0).then_some(v)
}
