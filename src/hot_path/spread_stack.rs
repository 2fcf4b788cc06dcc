//! Capped, sorted, deduplicated order book side
//!
//! Holds at most `capacity` levels. Sorted after every mutation: bids
//! descending, asks ascending, so index 0 is always the best level and the
//! last index the worst. Prices are `Decimal` so that `8000.10` and `8000.1`
//! are the same level.

use rust_decimal::Decimal;
use std::collections::HashSet;

/// Order book side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookSide {
    Bid,
    Ask,
}

impl BookSide {
    /// True if `a` is a better price than `b` on this side
    #[inline(always)]
    pub fn better(&self, a: Decimal, b: Decimal) -> bool {
        match self {
            BookSide::Bid => a > b,
            BookSide::Ask => a < b,
        }
    }
}

/// Single price level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpreadNode {
    pub price: Decimal,
    pub size: Decimal,
}

impl SpreadNode {
    #[inline]
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Fixed-depth sorted book side
#[derive(Debug, Clone)]
pub struct SpreadStack {
    capacity: usize,
    side: BookSide,
    nodes: Vec<SpreadNode>,
    prices: HashSet<Decimal>,
}

impl SpreadStack {
    pub fn new(capacity: usize, side: BookSide) -> Self {
        Self {
            capacity,
            side,
            nodes: Vec::with_capacity(capacity),
            prices: HashSet::with_capacity(capacity),
        }
    }

    /// Insert a level or update the size of an existing one
    ///
    /// At capacity a new price replaces the current worst level, whatever its
    /// own rank. Callers that only want improving levels check `accepts` first.
    pub fn push(&mut self, node: SpreadNode) {
        if self.capacity == 0 {
            return;
        }

        if self.prices.contains(&node.price) {
            if let Some(existing) = self.nodes.iter_mut().find(|n| n.price == node.price) {
                existing.size = node.size;
            }
            return;
        }

        if self.nodes.len() >= self.capacity {
            if let Some(worst) = self.nodes.last_mut() {
                self.prices.remove(&worst.price);
                *worst = node;
            }
        } else {
            self.nodes.push(node);
        }
        self.prices.insert(node.price);
        self.sort();
    }

    /// Remove the level at `price`; absent prices are a no-op
    pub fn pop(&mut self, price: Decimal) {
        if !self.prices.remove(&price) {
            return;
        }
        if let Some(idx) = self.nodes.iter().position(|n| n.price == price) {
            self.nodes.swap_remove(idx);
        }
        self.sort();
    }

    /// Whether pushing `price` would keep it in the book
    ///
    /// True for known prices, while the stack has room, or when the price
    /// beats the current worst level.
    pub fn accepts(&self, price: Decimal) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if self.prices.contains(&price) || self.nodes.len() < self.capacity {
            return true;
        }
        match self.nodes.last() {
            Some(worst) => self.side.better(price, worst.price),
            None => true,
        }
    }

    /// Best level (index 0)
    #[inline]
    pub fn best(&self) -> Option<&SpreadNode> {
        self.nodes.first()
    }

    /// Worst tracked level
    #[inline]
    pub fn worst(&self) -> Option<&SpreadNode> {
        self.nodes.last()
    }

    #[inline]
    pub fn contains(&self, price: Decimal) -> bool {
        self.prices.contains(&price)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn side(&self) -> BookSide {
        self.side
    }

    /// Levels in side order
    #[inline]
    pub fn nodes(&self) -> &[SpreadNode] {
        &self.nodes
    }

    fn sort(&mut self) {
        match self.side {
            BookSide::Bid => self.nodes.sort_unstable_by(|a, b| b.price.cmp(&a.price)),
            BookSide::Ask => self.nodes.sort_unstable_by(|a, b| a.price.cmp(&b.price)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    const LEVELS: [(&str, &str); 15] = [
        ("8000.01", "0.43"),
        ("8000.04", "0.04"),
        ("8000.02", "0.243"),
        ("8000.90", "0.67"),
        ("8000.83", "0.145"),
        ("8000.07", "0.98"),
        ("8000.13", "0.99"),
        ("8000.25", "0.67"),
        ("8000.88", "0.76"),
        ("8000.33", "0.11"),
        ("8000.44", "0.25"),
        ("8000.52", "0.43"),
        ("8000.56", "0.88"),
        ("8000.69", "0.69"),
        ("8000.73", "0.43"),
    ];

    fn filled(side: BookSide) -> SpreadStack {
        let mut stack = SpreadStack::new(10, side);
        for (price, size) in LEVELS.iter().take(10) {
            stack.push(SpreadNode::new(dec(price), dec(size)));
        }
        stack
    }

    fn assert_consistent(stack: &SpreadStack) {
        assert!(stack.len() <= stack.capacity());
        for pair in stack.nodes().windows(2) {
            match stack.side() {
                BookSide::Bid => assert!(pair[0].price > pair[1].price),
                BookSide::Ask => assert!(pair[0].price < pair[1].price),
            }
        }
        let present: HashSet<Decimal> = stack.nodes().iter().map(|n| n.price).collect();
        assert_eq!(present, stack.prices);
    }

    #[test]
    fn test_stack_creation() {
        let stack = SpreadStack::new(10, BookSide::Bid);
        assert_eq!(stack.capacity(), 10);
        assert_eq!(stack.side(), BookSide::Bid);
        assert!(stack.is_empty());
        assert!(stack.best().is_none());
    }

    #[test]
    fn test_bids_sorted_descending() {
        let stack = filled(BookSide::Bid);
        assert_eq!(stack.best().unwrap().price, dec("8000.90"));
        assert_eq!(stack.worst().unwrap().price, dec("8000.01"));
        assert_consistent(&stack);
    }

    #[test]
    fn test_asks_sorted_ascending() {
        let stack = filled(BookSide::Ask);
        assert_eq!(stack.best().unwrap().price, dec("8000.01"));
        assert_eq!(stack.worst().unwrap().price, dec("8000.90"));
        assert_consistent(&stack);
    }

    #[test]
    fn test_push_beyond_capacity_evicts_worst() {
        let mut stack = filled(BookSide::Bid);
        stack.push(SpreadNode::new(dec("9000"), dec("1.5")));

        assert_eq!(stack.len(), 10);
        assert_eq!(stack.nodes()[0].price, dec("9000"));
        assert!(!stack.contains(dec("8000.01")));
        assert_consistent(&stack);
    }

    #[test]
    fn test_push_existing_updates_size_only() {
        let mut stack = filled(BookSide::Bid);
        let before: Vec<Decimal> = stack.nodes().iter().map(|n| n.price).collect();

        stack.push(SpreadNode::new(dec("8000.25"), dec("456.1")));

        let after: Vec<Decimal> = stack.nodes().iter().map(|n| n.price).collect();
        assert_eq!(before, after);
        let node = stack.nodes().iter().find(|n| n.price == dec("8000.25")).unwrap();
        assert_eq!(node.size, dec("456.1"));
    }

    #[test]
    fn test_equal_decimals_are_one_level() {
        let mut stack = SpreadStack::new(5, BookSide::Ask);
        stack.push(SpreadNode::new(dec("8000.10"), dec("1")));
        stack.push(SpreadNode::new(dec("8000.1"), dec("2")));
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.best().unwrap().size, dec("2"));
    }

    #[test]
    fn test_pop() {
        let mut stack = filled(BookSide::Bid);
        stack.pop(dec("8000.01"));
        assert_eq!(stack.len(), 9);
        assert!(!stack.contains(dec("8000.01")));
        assert_consistent(&stack);
    }

    #[test]
    fn test_pop_absent_is_noop() {
        let mut stack = filled(BookSide::Ask);
        let before = stack.nodes().to_vec();
        stack.pop(dec("1"));
        assert_eq!(stack.nodes(), before.as_slice());
    }

    #[test]
    fn test_prices_set_tracks_nodes() {
        let mut stack = filled(BookSide::Bid);
        stack.pop(dec("8000.01"));
        stack.push(SpreadNode::new(dec("9000.00"), dec("123")));
        assert!(stack.contains(dec("9000")));
        assert_consistent(&stack);
    }

    #[test]
    fn test_accepts() {
        let stack = filled(BookSide::Bid);
        // Worst bid held is 8000.01
        assert!(stack.accepts(dec("8000.02")));
        assert!(stack.accepts(dec("8000.01")));
        assert!(!stack.accepts(dec("7999")));

        let stack = filled(BookSide::Ask);
        // Worst ask held is 8000.90
        assert!(stack.accepts(dec("8000.50")));
        assert!(!stack.accepts(dec("8001")));

        let empty = SpreadStack::new(3, BookSide::Ask);
        assert!(empty.accepts(dec("1000000")));
        assert!(!SpreadStack::new(0, BookSide::Ask).accepts(dec("1")));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(u32, u32),
        Pop(u32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..60, 1u32..100).prop_map(|(p, s)| Op::Push(p, s)),
            (0u32..60).prop_map(Op::Pop),
        ]
    }

    proptest! {
        #[test]
        fn prop_invariants_hold(
            capacity in 1usize..12,
            bid in any::<bool>(),
            ops in prop::collection::vec(op_strategy(), 0..200),
        ) {
            let side = if bid { BookSide::Bid } else { BookSide::Ask };
            let mut stack = SpreadStack::new(capacity, side);

            for op in ops {
                match op {
                    Op::Push(p, s) => {
                        let was_full = stack.len() == capacity;
                        let known = stack.contains(Decimal::from(p));
                        let worst = stack.worst().map(|n| n.price);
                        stack.push(SpreadNode::new(Decimal::from(p), Decimal::from(s)));
                        if was_full && !known {
                            if let Some(w) = worst {
                                prop_assert!(!stack.contains(w));
                            }
                        }
                    }
                    Op::Pop(p) => stack.pop(Decimal::from(p)),
                }

                prop_assert!(stack.len() <= capacity);
                for pair in stack.nodes().windows(2) {
                    match side {
                        BookSide::Bid => prop_assert!(pair[0].price > pair[1].price),
                        BookSide::Ask => prop_assert!(pair[0].price < pair[1].price),
                    }
                }
                let present: HashSet<Decimal> = stack.nodes().iter().map(|n| n.price).collect();
                prop_assert_eq!(&present, &stack.prices);
            }
        }
    }
}
