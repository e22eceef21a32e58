//! Price-bucket index and active-set bookkeeping.
//!
//! Per side, two parallel vectors hold the sorted active prices and their
//! buckets. A bucket owns nothing: the FIFO within it is an intrusive
//! doubly-linked list threaded through the order store via
//! `bucket_prev`/`bucket_next` indices, so cancelling in the middle of a
//! bucket is O(1) and there are no ownership cycles.

use crate::types::{Visibility, INVALID_INDEX};

use super::MarketSimulator;

/// One price level's resting queue plus its cached visibility state, which
/// the passive pass keeps in sync with the snapshots.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Bucket {
    pub head: usize,
    pub tail: usize,
    pub size: u32,
    pub last_level_qty_q: i64,
    pub last_level_idx: i16,
    pub visibility: Visibility,
}

impl Default for Bucket {
    fn default() -> Self {
        Self {
            head: INVALID_INDEX,
            tail: INVALID_INDEX,
            size: 0,
            last_level_qty_q: 0,
            last_level_idx: -1,
            visibility: Visibility::Blind,
        }
    }
}

impl MarketSimulator {
    pub(crate) fn find_bid_bucket_idx(&self, price_q: i64) -> usize {
        match self.bid_prices.binary_search(&price_q) {
            Ok(idx) => idx,
            Err(_) => INVALID_INDEX,
        }
    }

    pub(crate) fn find_ask_bucket_idx(&self, price_q: i64) -> usize {
        match self.ask_prices.binary_search(&price_q) {
            Ok(idx) => idx,
            Err(_) => INVALID_INDEX,
        }
    }

    pub(crate) fn get_or_insert_bid_bucket_idx(&mut self, price_q: i64) -> usize {
        match self.bid_prices.binary_search(&price_q) {
            Ok(idx) => idx,
            Err(idx) => {
                self.bid_prices.insert(idx, price_q);
                self.bid_buckets.insert(idx, Bucket::default());
                idx
            }
        }
    }

    pub(crate) fn get_or_insert_ask_bucket_idx(&mut self, price_q: i64) -> usize {
        match self.ask_prices.binary_search(&price_q) {
            Ok(idx) => idx,
            Err(idx) => {
                self.ask_prices.insert(idx, price_q);
                self.ask_buckets.insert(idx, Bucket::default());
                idx
            }
        }
    }

    fn erase_bid_bucket_if_empty(&mut self, bidx: usize) {
        if self.defer_bucket_erase {
            return;
        }
        debug_assert_eq!(self.bid_buckets[bidx].size, 0);
        self.bid_prices.remove(bidx);
        self.bid_buckets.remove(bidx);

        if self.bid_prices.is_empty() {
            self.has_active_bids = false;
            self.best_active_bid_q = 0;
        } else {
            self.has_active_bids = true;
            self.best_active_bid_q = *self.bid_prices.last().unwrap();
        }
    }

    fn erase_ask_bucket_if_empty(&mut self, aidx: usize) {
        if self.defer_bucket_erase {
            return;
        }
        debug_assert_eq!(self.ask_buckets[aidx].size, 0);
        self.ask_prices.remove(aidx);
        self.ask_buckets.remove(aidx);

        if self.ask_prices.is_empty() {
            self.has_active_asks = false;
            self.best_active_ask_q = 0;
        } else {
            self.has_active_asks = true;
            self.best_active_ask_q = self.ask_prices[0];
        }
    }

    /// Sweeps out buckets emptied while erasure was deferred and restores
    /// the best-price summaries.
    pub(crate) fn compact_empty_buckets(&mut self) {
        debug_assert!(!self.defer_bucket_erase);

        let mut w = 0;
        for r in 0..self.bid_buckets.len() {
            if self.bid_buckets[r].size > 0 {
                self.bid_prices[w] = self.bid_prices[r];
                self.bid_buckets[w] = self.bid_buckets[r];
                w += 1;
            }
        }
        self.bid_prices.truncate(w);
        self.bid_buckets.truncate(w);

        let mut w = 0;
        for r in 0..self.ask_buckets.len() {
            if self.ask_buckets[r].size > 0 {
                self.ask_prices[w] = self.ask_prices[r];
                self.ask_buckets[w] = self.ask_buckets[r];
                w += 1;
            }
        }
        self.ask_prices.truncate(w);
        self.ask_buckets.truncate(w);

        if let Some(&best) = self.bid_prices.last() {
            self.has_active_bids = true;
            self.best_active_bid_q = best;
        } else {
            self.has_active_bids = false;
            self.best_active_bid_q = 0;
        }
        if let Some(&best) = self.ask_prices.first() {
            self.has_active_asks = true;
            self.best_active_ask_q = best;
        } else {
            self.has_active_asks = false;
            self.best_active_ask_q = 0;
        }
    }

    pub(crate) fn bucket_push_back_bid(&mut self, bidx: usize, order_idx: usize) {
        let tail = self.bid_buckets[bidx].tail;
        {
            let o = &mut self.orders[order_idx];
            o.bucket_prev = tail;
            o.bucket_next = INVALID_INDEX;
        }
        if tail != INVALID_INDEX {
            self.orders[tail].bucket_next = order_idx;
        } else {
            self.bid_buckets[bidx].head = order_idx;
        }
        self.bid_buckets[bidx].tail = order_idx;
        self.bid_buckets[bidx].size += 1;
    }

    pub(crate) fn bucket_push_back_ask(&mut self, aidx: usize, order_idx: usize) {
        let tail = self.ask_buckets[aidx].tail;
        {
            let o = &mut self.orders[order_idx];
            o.bucket_prev = tail;
            o.bucket_next = INVALID_INDEX;
        }
        if tail != INVALID_INDEX {
            self.orders[tail].bucket_next = order_idx;
        } else {
            self.ask_buckets[aidx].head = order_idx;
        }
        self.ask_buckets[aidx].tail = order_idx;
        self.ask_buckets[aidx].size += 1;
    }

    fn bucket_erase_bid(&mut self, bidx: usize, order_idx: usize) {
        let (prev, next) = {
            let o = &mut self.orders[order_idx];
            let links = (o.bucket_prev, o.bucket_next);
            o.bucket_prev = INVALID_INDEX;
            o.bucket_next = INVALID_INDEX;
            links
        };
        if prev != INVALID_INDEX {
            self.orders[prev].bucket_next = next;
        } else {
            self.bid_buckets[bidx].head = next;
        }
        if next != INVALID_INDEX {
            self.orders[next].bucket_prev = prev;
        } else {
            self.bid_buckets[bidx].tail = prev;
        }
        debug_assert!(self.bid_buckets[bidx].size > 0);
        self.bid_buckets[bidx].size -= 1;
        if self.bid_buckets[bidx].size == 0 {
            self.erase_bid_bucket_if_empty(bidx);
        }
    }

    fn bucket_erase_ask(&mut self, aidx: usize, order_idx: usize) {
        let (prev, next) = {
            let o = &mut self.orders[order_idx];
            let links = (o.bucket_prev, o.bucket_next);
            o.bucket_prev = INVALID_INDEX;
            o.bucket_next = INVALID_INDEX;
            links
        };
        if prev != INVALID_INDEX {
            self.orders[prev].bucket_next = next;
        } else {
            self.ask_buckets[aidx].head = next;
        }
        if next != INVALID_INDEX {
            self.orders[next].bucket_prev = prev;
        } else {
            self.ask_buckets[aidx].tail = prev;
        }
        debug_assert!(self.ask_buckets[aidx].size > 0);
        self.ask_buckets[aidx].size -= 1;
        if self.ask_buckets[aidx].size == 0 {
            self.erase_ask_bucket_if_empty(aidx);
        }
    }

    /// Removes a resting bid from its bucket FIFO and the active set.
    /// No-op when the order is not in the active set.
    pub(crate) fn remove_active_bid(&mut self, order_id: u64, order_idx: usize) {
        let pos = self.active_bid_pos[order_id as usize];
        if pos == INVALID_INDEX {
            return;
        }

        let bidx = self.find_bid_bucket_idx(self.orders[order_idx].price_q);
        debug_assert_ne!(bidx, INVALID_INDEX);
        self.bucket_erase_bid(bidx, order_idx);

        debug_assert!(!self.active_bids.is_empty());
        let last_idx = *self.active_bids.last().unwrap();
        self.active_bids[pos] = last_idx;
        self.active_bids.pop();
        if pos < self.active_bids.len() {
            let moved_id = self.orders[last_idx].id;
            self.active_bid_pos[moved_id as usize] = pos;
        }
        self.active_bid_pos[order_id as usize] = INVALID_INDEX;
    }

    /// Removes a resting ask from its bucket FIFO and the active set.
    pub(crate) fn remove_active_ask(&mut self, order_id: u64, order_idx: usize) {
        let pos = self.active_ask_pos[order_id as usize];
        if pos == INVALID_INDEX {
            return;
        }

        let aidx = self.find_ask_bucket_idx(self.orders[order_idx].price_q);
        debug_assert_ne!(aidx, INVALID_INDEX);
        self.bucket_erase_ask(aidx, order_idx);

        debug_assert!(!self.active_asks.is_empty());
        let last_idx = *self.active_asks.last().unwrap();
        self.active_asks[pos] = last_idx;
        self.active_asks.pop();
        if pos < self.active_asks.len() {
            let moved_id = self.orders[last_idx].id;
            self.active_ask_pos[moved_id as usize] = pos;
        }
        self.active_ask_pos[order_id as usize] = INVALID_INDEX;
    }
}
