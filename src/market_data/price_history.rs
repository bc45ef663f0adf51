use std::collections::VecDeque;

use parking_lot::RwLock;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Immutable copy of the price history taken under the read lock.
///
/// `warming_up` is the explicit stand-in for the "not yet initialised"
/// sentinel: while it is set the history still reserves one slot for the
/// marker, and [`HistorySnapshot::len`] counts that slot.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySnapshot {
    pub prices: Vec<f64>,
    pub warming_up: bool,
}

impl HistorySnapshot {
    /// Number of retained entries, including the sentinel slot.
    pub fn len(&self) -> usize {
        self.prices.len() + usize::from(self.warming_up)
    }

    pub fn has_sentinel(&self) -> bool {
        self.warming_up
    }
}

// ---------------------------------------------------------------------------
// PriceHistory -- thread-safe bounded ring of distinct price changes
// ---------------------------------------------------------------------------

struct HistoryState {
    prices: VecDeque<f64>,
    warming_up: bool,
}

impl HistoryState {
    fn len(&self) -> usize {
        self.prices.len() + usize::from(self.warming_up)
    }
}

/// Thread-safe ring buffer holding the most recent *changes* of the observed
/// price, oldest first.
///
/// The buffer starts with a sentinel occupying one of its `capacity` slots.
/// The sentinel is evicted like any other oldest entry, so it disappears the
/// first time an append would push the length past `capacity`.
pub struct PriceHistory {
    inner: RwLock<HistoryState>,
    capacity: usize,
}

impl PriceHistory {
    /// Create an empty history (sentinel only) bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: RwLock::new(HistoryState {
                prices: VecDeque::with_capacity(capacity),
                warming_up: true,
            }),
            capacity,
        }
    }

    /// Record a sample.
    ///
    /// * `None` is a no-op.
    /// * A value equal to the last appended price is not duplicated.
    /// * Otherwise the value is appended and the oldest entry (the sentinel
    ///   first, then real prices) is evicted while the ring is over budget.
    ///
    /// Returns `true` when the value was appended.
    pub fn observe(&self, value: Option<f64>) -> bool {
        let Some(value) = value else {
            return false;
        };

        let mut state = self.inner.write();
        if state.prices.back() == Some(&value) {
            return false;
        }

        state.prices.push_back(value);
        while state.len() > self.capacity {
            if state.warming_up {
                state.warming_up = false;
            } else {
                state.prices.pop_front();
            }
        }
        true
    }

    /// Consistent, owned copy of the current ordered sequence.
    pub fn snapshot(&self) -> HistorySnapshot {
        let state = self.inner.read();
        HistorySnapshot {
            prices: state.prices.iter().copied().collect(),
            warming_up: state.warming_up,
        }
    }

    /// `true` until the sentinel has been evicted.
    pub fn has_sentinel(&self) -> bool {
        self.inner.read().warming_up
    }

    /// Retained entries, counting the sentinel slot.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently appended price, if any.
    pub fn last(&self) -> Option<f64> {
        self.inner.read().prices.back().copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
