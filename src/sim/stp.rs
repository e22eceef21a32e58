//! Self-trade prevention, enforced at order activation (not submission)
//! against the currently resting active sets.

use crate::types::{EventType, OrdType, Order, OrderState, RejectReason, Side, StpPolicy};

use super::MarketSimulator;

impl MarketSimulator {
    /// Applies the configured STP policy to an order about to activate.
    /// Returns `true` when the order may proceed to the active sets.
    pub(crate) fn apply_stp_on_activate(&mut self, order_idx: usize) -> bool {
        if self.params.stp == StpPolicy::None {
            return true;
        }

        let (id, side, price_q, order_type) = {
            let o = &self.orders[order_idx];
            (o.id, o.side, o.price_q, o.order_type)
        };

        // O(1) detection from the best resting prices.
        let self_cross = if order_type == OrdType::Market {
            match side {
                Side::Buy => self.has_active_asks,
                Side::Sell => self.has_active_bids,
            }
        } else {
            match side {
                Side::Buy => self.has_active_asks && price_q >= self.best_active_ask_q,
                Side::Sell => self.has_active_bids && price_q <= self.best_active_bid_q,
            }
        };
        if !self_cross {
            return true;
        }

        if self.params.stp == StpPolicy::RejectIncoming {
            let mut rr = RejectReason::SelfTradePrevention;
            if !self.push_event(id, EventType::Reject, OrderState::Rejected, rr) {
                // Best effort: the rejection stands even when it cannot be
                // logged.
                rr = RejectReason::InsufficientResources;
            }
            self.unlock_remaining(order_idx);
            let o = &mut self.orders[order_idx];
            o.state = OrderState::Rejected;
            o.reject_reason = rr;
            return false;
        }

        // CancelResting: cancel every crossing opposite resting order.
        let crosses = |r: &Order| {
            r.state.is_resting()
                && (order_type == OrdType::Market
                    || match side {
                        Side::Buy => r.price_q <= price_q,
                        Side::Sell => r.price_q >= price_q,
                    })
        };
        let opposite = match side {
            Side::Buy => &self.active_asks,
            Side::Sell => &self.active_bids,
        };
        let cancel_count = opposite
            .iter()
            .filter(|&&oidx| crosses(&self.orders[oidx]))
            .count();

        // The log must absorb every cancel plus the event that follows the
        // activation; otherwise fail here, before any cancel is committed.
        if self.events.len() + cancel_count + 1 > self.params.max_events {
            let rr = RejectReason::InsufficientResources;
            let _ = self.push_event(id, EventType::Reject, OrderState::Rejected, rr);
            self.unlock_remaining(order_idx);
            let o = &mut self.orders[order_idx];
            o.state = OrderState::Rejected;
            o.reject_reason = rr;
            return false;
        }

        // Index-based walk: removal swap-pops the active set, so the
        // current slot is re-examined after each cancel instead of
        // advancing.
        match side {
            Side::Buy => {
                let mut i = 0;
                while i < self.active_asks.len() {
                    let oidx = self.active_asks[i];
                    if !crosses(&self.orders[oidx]) {
                        i += 1;
                        continue;
                    }
                    let rid = self.orders[oidx].id;
                    self.unlock_remaining(oidx);
                    self.orders[oidx].state = OrderState::Cancelled;
                    let _ = self.push_event(
                        rid,
                        EventType::Cancel,
                        OrderState::Cancelled,
                        RejectReason::None,
                    );
                    self.remove_active_ask(rid, oidx);
                }
            }
            Side::Sell => {
                let mut i = 0;
                while i < self.active_bids.len() {
                    let oidx = self.active_bids[i];
                    if !crosses(&self.orders[oidx]) {
                        i += 1;
                        continue;
                    }
                    let rid = self.orders[oidx].id;
                    self.unlock_remaining(oidx);
                    self.orders[oidx].state = OrderState::Cancelled;
                    let _ = self.push_event(
                        rid,
                        EventType::Cancel,
                        OrderState::Cancelled,
                        RejectReason::None,
                    );
                    self.remove_active_bid(rid, oidx);
                }
            }
        }

        true
    }
}
