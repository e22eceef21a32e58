//! Fill application: ledger arithmetic, fee tiers, lock release, fill log.

use crate::fixed::{fee_cash_q, notional_cash_q};
use crate::types::{FillEvent, LiquidityFlag, OrdType, OrderState, Side};

use super::MarketSimulator;

impl MarketSimulator {
    /// Applies a single fill of `qty_q` at `price_q` to the order at
    /// `order_idx`: debits/credits the ledger, releases the reserved lock
    /// for the filled portion, transitions the order state, and appends a
    /// [`FillEvent`].
    ///
    /// Removal from the active sets on a full fill is the caller's job, so
    /// that the fill passes can keep their FIFO iteration valid.
    pub(crate) fn apply_fill(
        &mut self,
        order_idx: usize,
        price_q: i64,
        qty_q: i64,
        liq: LiquidityFlag,
    ) {
        let (id, side, limit_price_q, order_type) = {
            let o = &self.orders[order_idx];
            debug_assert!(qty_q > 0);
            debug_assert!(o.filled_qty_q + qty_q <= o.qty_q);
            (o.id, o.side, o.price_q, o.order_type)
        };

        let notional_q = notional_cash_q(price_q, qty_q);
        let fee_ppm = match liq {
            LiquidityFlag::Maker => self.params.fees.maker_fee_ppm,
            LiquidityFlag::Taker => self.params.fees.taker_fee_ppm,
        };
        let fee_q = fee_cash_q(notional_q, fee_ppm);

        // Buy spends cash and gains base; sell earns cash and sheds base.
        match side {
            Side::Buy => {
                self.ledger.cash_q -= notional_q + fee_q;
                self.ledger.position_qty_q += qty_q;
            }
            Side::Sell => {
                self.ledger.cash_q += notional_q - fee_q;
                self.ledger.position_qty_q -= qty_q;
            }
        }

        // Release the reservation for the filled portion. The lock was
        // taken at the limit price, so release at the limit price too; the
        // identical arithmetic keeps release exact, and the clamp only
        // guards the unreachable overflow path.
        if order_type == OrdType::Limit {
            match side {
                Side::Buy => match limit_price_q.checked_mul(qty_q) {
                    Some(delta) => {
                        self.ledger.locked_cash_q = (self.ledger.locked_cash_q - delta).max(0);
                    }
                    None => self.ledger.locked_cash_q = 0,
                },
                Side::Sell => {
                    self.ledger.locked_position_qty_q =
                        (self.ledger.locked_position_qty_q - qty_q).max(0);
                }
            }
        }

        {
            let o = &mut self.orders[order_idx];
            o.filled_qty_q += qty_q;
            o.state = if o.filled_qty_q == o.qty_q {
                OrderState::Filled
            } else {
                OrderState::Partial
            };
        }

        self.fills.push(FillEvent {
            ts: self.now,
            order_id: id,
            side,
            price_q,
            qty_q,
            liq,
            notional_cash_q: notional_q,
            fee_cash_q: fee_q,
        });
    }
}
