//! Aggressive (taker) fills: resting orders whose limit price is now
//! marketable against the observed top-N sweep the visible depth.
//!
//! Runs once per step, after the passive passes. The visible depth is
//! copied into step-local arrays so that multiple agent orders in the same
//! step consume liquidity sequentially and deterministically.

use crate::data::{Record, DEPTH};
use crate::types::{LiquidityFlag, OrdType, OrderState, Side, INVALID_INDEX};

use super::{lookup, MarketSimulator};

impl MarketSimulator {
    pub(crate) fn aggressive_fills(&mut self, rec: &Record) {
        // Marketability checks need a valid top of book on both sides.
        if !rec.has_top_of_book() {
            return;
        }

        let best_bid = rec.bids[0].price_q;
        let best_ask = rec.asks[0].price_q;

        let mut bid_qty_rem = [0i64; DEPTH];
        let mut ask_qty_rem = [0i64; DEPTH];
        for i in 0..DEPTH {
            bid_qty_rem[i] = if lookup::is_valid_bid_price(rec.bids[i].price_q) {
                rec.bids[i].qty_q
            } else {
                0
            };
            ask_qty_rem[i] = if lookup::is_valid_ask_price(rec.asks[i].price_q) {
                rec.asks[i].qty_q
            } else {
                0
            };
        }

        // ----------------------------
        // Buy takers: only buckets priced at or above the best ask are
        // marketable. Scan bid prices descending (best -> worse) and stop
        // at the first non-marketable price.
        // ----------------------------
        for pi in (0..self.bid_prices.len()).rev() {
            let limit_q = self.bid_prices[pi];
            if limit_q < best_ask {
                break;
            }

            let mut cur = self.bid_buckets[pi].head;
            while cur != INVALID_INDEX {
                let next = self.orders[cur].bucket_next;

                let eligible = {
                    let o = &self.orders[cur];
                    o.state.is_resting()
                        && o.side == Side::Buy
                        && o.order_type == OrdType::Limit
                        && o.remaining_qty_q() > 0
                };
                if !eligible {
                    cur = next;
                    continue;
                }

                // Sweep asks from the best outward while they stay at or
                // under the limit and carry unconsumed quantity.
                for lvl in 0..DEPTH {
                    if self.orders[cur].remaining_qty_q() == 0 {
                        break;
                    }
                    let px = rec.asks[lvl].price_q;
                    if !lookup::is_valid_ask_price(px) || px > limit_q {
                        break;
                    }
                    if ask_qty_rem[lvl] <= 0 {
                        continue;
                    }

                    let dq = self.orders[cur].remaining_qty_q().min(ask_qty_rem[lvl]);
                    self.apply_fill(cur, px, dq, LiquidityFlag::Taker);
                    ask_qty_rem[lvl] -= dq;

                    if self.orders[cur].state == OrderState::Filled {
                        let id = self.orders[cur].id;
                        self.remove_active_bid(id, cur);
                        break;
                    }
                }

                cur = next;
            }
        }

        // ----------------------------
        // Sell takers: only buckets priced at or below the best bid are
        // marketable. Scan ask prices ascending (best -> worse).
        // ----------------------------
        for pi in 0..self.ask_prices.len() {
            let limit_q = self.ask_prices[pi];
            if limit_q > best_bid {
                break;
            }

            let mut cur = self.ask_buckets[pi].head;
            while cur != INVALID_INDEX {
                let next = self.orders[cur].bucket_next;

                let eligible = {
                    let o = &self.orders[cur];
                    o.state.is_resting()
                        && o.side == Side::Sell
                        && o.order_type == OrdType::Limit
                        && o.remaining_qty_q() > 0
                };
                if !eligible {
                    cur = next;
                    continue;
                }

                for lvl in 0..DEPTH {
                    if self.orders[cur].remaining_qty_q() == 0 {
                        break;
                    }
                    let px = rec.bids[lvl].price_q;
                    if !lookup::is_valid_bid_price(px) || px < limit_q {
                        break;
                    }
                    if bid_qty_rem[lvl] <= 0 {
                        continue;
                    }

                    let dq = self.orders[cur].remaining_qty_q().min(bid_qty_rem[lvl]);
                    self.apply_fill(cur, px, dq, LiquidityFlag::Taker);
                    bid_qty_rem[lvl] -= dq;

                    if self.orders[cur].state == OrderState::Filled {
                        let id = self.orders[cur].id;
                        self.remove_active_ask(id, cur);
                        break;
                    }
                }

                cur = next;
            }
        }
    }
}
