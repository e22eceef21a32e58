//! Queue/visibility initialisation when an order becomes active.
//!
//! On activation we can only reason from the current snapshot:
//!
//! * price found in the top-N — the order joins the tail of the displayed
//!   queue, so `qty_ahead_q` starts at the full displayed quantity;
//! * price within the visible range but absent — nobody is displayed at
//!   this price, the agent *is* the queue;
//! * price outside the visible range — the order is `Blind` until the
//!   window moves over it.

use crate::data::Record;
use crate::sim::lookup;
use crate::types::{OrdType, Order, Side, Visibility};

/// Initialises visibility and queue tracking for an order that has just
/// transitioned to `Active`.
pub fn init_on_activate(rec: &Record, o: &mut Order) {
    if o.order_type != OrdType::Limit || o.price_q <= 0 {
        o.visibility = Visibility::Blind;
        o.last_level_idx = -1;
        o.last_level_qty_q = 0;
        o.qty_ahead_q = 0;
        return;
    }

    let m = match o.side {
        Side::Buy => lookup::bid_level(rec, o.price_q),
        Side::Sell => lookup::ask_level(rec, o.price_q),
    };

    if !m.within_range {
        o.visibility = Visibility::Blind;
        o.last_level_idx = -1;
        o.last_level_qty_q = 0;
        o.qty_ahead_q = 0;
        return;
    }

    o.visibility = Visibility::Visible;
    if m.found {
        o.last_level_idx = m.idx;
        o.last_level_qty_q = m.qty_q;
        o.qty_ahead_q = m.qty_q; // join the tail
    } else {
        o.last_level_idx = -1;
        o.last_level_qty_q = 0;
        o.qty_ahead_q = 0; // you are the queue
    }
}
