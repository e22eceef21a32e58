//! Passive (maker) fills: per-bucket depletion accounting, FIFO queue
//! advancement, and the bucket-level visibility state machine.
//!
//! Invoked once per active bucket per step. This is the only site that
//! applies effective depletion to `qty_ahead_q`, which rules out the
//! double-depletion bug class by construction.

use crate::data::Record;
use crate::types::{LiquidityFlag, OrdType, Order, OrderState, Side, Visibility, INVALID_INDEX};

use super::{lookup, MarketSimulator};

/// Applies `f` to every resting limit order in a bucket FIFO. The next
/// link is captured before `f` runs, so `f` may not unlink orders.
fn for_each_resting_limit(orders: &mut [Order], head: usize, mut f: impl FnMut(&mut Order)) {
    let mut cur = head;
    while cur != INVALID_INDEX {
        let next = orders[cur].bucket_next;
        let o = &mut orders[cur];
        if o.state.is_resting() && o.order_type == OrdType::Limit {
            f(o);
        }
        cur = next;
    }
}

impl MarketSimulator {
    /// Runs the queue/visibility update and passive fill allocation for one
    /// bucket against the current record.
    pub(crate) fn passive_fills_one_bucket(&mut self, rec: &Record, bucket_idx: usize, side: Side) {
        let bucket_price_q = match side {
            Side::Buy => self.bid_prices[bucket_idx],
            Side::Sell => self.ask_prices[bucket_idx],
        };
        let best_bid = rec.bids[0].price_q;
        let best_ask = rec.asks[0].price_q;

        let m = match side {
            Side::Buy => lookup::bid_level(rec, bucket_price_q),
            Side::Sell => lookup::ask_level(rec, bucket_price_q),
        };

        // Trade-through: once the opposite best has crossed this price,
        // queue position is moot. Applied on every tick, before (and
        // independently of) the visibility transition and any depletion.
        let crossed = match side {
            Side::Buy => lookup::is_valid_ask_price(best_ask) && best_ask <= bucket_price_q,
            Side::Sell => lookup::is_valid_bid_price(best_bid) && best_bid >= bucket_price_q,
        };
        if crossed {
            let head = self.bucket(side, bucket_idx).head;
            for_each_resting_limit(&mut self.orders, head, |o| o.qty_ahead_q = 0);
        }

        // ----------------------------
        // Bucket-level visibility state machine, mirrored onto the resting
        // orders.
        // ----------------------------
        if m.found {
            let (vis, last_idx, head) = {
                let b = self.bucket(side, bucket_idx);
                (b.visibility, b.last_level_idx, b.head)
            };
            if vis == Visibility::Frozen || vis == Visibility::Blind || last_idx < 0 {
                // Re-entry into the displayed window: we cannot know the
                // true queue position, so re-anchor pessimistically to the
                // full displayed quantity. No depletion inferred on a
                // re-anchor tick. A crossed bucket still ends the tick with
                // no queue ahead: the trade-through signal outranks the
                // re-anchor.
                {
                    let b = self.bucket_mut(side, bucket_idx);
                    b.visibility = Visibility::Visible;
                    b.last_level_idx = m.idx;
                    b.last_level_qty_q = m.qty_q;
                }
                for_each_resting_limit(&mut self.orders, head, |o| {
                    o.visibility = Visibility::Visible;
                    o.last_level_idx = m.idx;
                    o.last_level_qty_q = m.qty_q;
                    o.qty_ahead_q = if crossed { 0 } else { m.qty_q };
                });
                return;
            }
        } else {
            let (vis, last_idx, head) = {
                let b = self.bucket(side, bucket_idx);
                (b.visibility, b.last_level_idx, b.head)
            };
            if m.within_range {
                if vis == Visibility::Blind {
                    // The window now spans this price but nobody displays
                    // at it: the resting orders own the queue.
                    {
                        let b = self.bucket_mut(side, bucket_idx);
                        b.visibility = Visibility::Visible;
                        b.last_level_idx = -1;
                        b.last_level_qty_q = 0;
                    }
                    for_each_resting_limit(&mut self.orders, head, |o| {
                        o.visibility = Visibility::Visible;
                        o.last_level_idx = -1;
                        o.last_level_qty_q = 0;
                        o.qty_ahead_q = 0;
                    });
                } else if vis == Visibility::Visible && last_idx >= 0 {
                    // Displayed level vanished while the window still spans
                    // the price: freeze queue tracking.
                    {
                        let b = self.bucket_mut(side, bucket_idx);
                        b.visibility = Visibility::Frozen;
                        b.last_level_idx = -1;
                        b.last_level_qty_q = 0;
                    }
                    for_each_resting_limit(&mut self.orders, head, |o| {
                        o.visibility = Visibility::Frozen;
                        o.last_level_idx = -1;
                        o.last_level_qty_q = 0;
                    });
                }
            } else if vis == Visibility::Visible {
                {
                    let b = self.bucket_mut(side, bucket_idx);
                    b.visibility = Visibility::Frozen;
                    b.last_level_idx = -1;
                    b.last_level_qty_q = 0;
                }
                for_each_resting_limit(&mut self.orders, head, |o| {
                    o.visibility = Visibility::Frozen;
                    o.last_level_idx = -1;
                    o.last_level_qty_q = 0;
                });
            }
            return;
        }

        // Passive fills only while the level remains visible.
        if self.bucket(side, bucket_idx).visibility != Visibility::Visible {
            return;
        }

        // ----------------------------
        // Bucket-level depletion, applied exactly once per step.
        // ----------------------------
        let (prev, head) = {
            let b = self.bucket(side, bucket_idx);
            (b.last_level_qty_q, b.head)
        };
        let now_q = m.qty_q;
        let depl = (prev - now_q).max(0);
        let mut ep = lookup::effective_depletion(depl, self.params.alpha_ppm);

        {
            let b = self.bucket_mut(side, bucket_idx);
            b.last_level_idx = m.idx;
            b.last_level_qty_q = now_q;
        }

        if ep <= 0 || head == INVALID_INDEX {
            return;
        }

        // FIFO deterministic allocation at this price: depletion first
        // advances queue positions, then spills into maker fills once an
        // order reaches the front.
        let mut cur = head;
        while cur != INVALID_INDEX && ep > 0 {
            let next = self.orders[cur].bucket_next;

            if !(self.orders[cur].state.is_resting()
                && self.orders[cur].order_type == OrdType::Limit)
            {
                cur = next;
                continue;
            }

            {
                let o = &mut self.orders[cur];
                o.visibility = Visibility::Visible;
                o.last_level_idx = m.idx;
                o.last_level_qty_q = now_q;

                if o.qty_ahead_q > 0 {
                    let consume = o.qty_ahead_q.min(ep);
                    o.qty_ahead_q -= consume;
                    ep -= consume;
                    if ep == 0 {
                        break;
                    }
                }
            }

            if self.orders[cur].qty_ahead_q == 0 {
                let remaining = self.orders[cur].remaining_qty_q();
                if remaining > 0 {
                    let fill = remaining.min(ep);
                    ep -= fill;
                    self.apply_fill(cur, bucket_price_q, fill, LiquidityFlag::Maker);

                    if self.orders[cur].state == OrderState::Filled {
                        let id = self.orders[cur].id;
                        match side {
                            Side::Buy => self.remove_active_bid(id, cur),
                            Side::Sell => self.remove_active_ask(id, cur),
                        }
                    }
                }
            }

            cur = next;
        }
    }

    #[inline]
    fn bucket(&self, side: Side, idx: usize) -> &super::Bucket {
        match side {
            Side::Buy => &self.bid_buckets[idx],
            Side::Sell => &self.ask_buckets[idx],
        }
    }

    #[inline]
    fn bucket_mut(&mut self, side: Side, idx: usize) -> &mut super::Bucket {
        match side {
            Side::Buy => &mut self.bid_buckets[idx],
            Side::Sell => &mut self.ask_buckets[idx],
        }
    }
}
