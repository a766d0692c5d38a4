//! Per-symbol sliding windows of recent ticks
//!
//! Bounded FIFO sequences with O(1) append; reads produce an ordered copy so
//! analytics never observe a window mid-mutation.

use parking_lot::{Mutex, RwLock};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::model::Tick;

/// Maximum ticks retained per symbol
pub const MAX_WINDOW_SIZE: usize = 500;

type Window = Arc<Mutex<VecDeque<Tick>>>;

/// Concurrent store of per-symbol tick windows
pub struct WindowStore {
    capacity: usize,
    windows: RwLock<HashMap<String, Window>>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self::with_capacity(MAX_WINDOW_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Append a tick to its symbol's window, evicting the oldest on overflow
    pub fn append(&self, tick: Tick) {
        let window = self.window_for(&tick.symbol);
        let mut guard = window.lock();
        if guard.len() == self.capacity {
            guard.pop_front();
        }
        guard.push_back(tick);
    }

    /// Ordered copy of up to `capacity` most recent ticks for a symbol
    pub fn snapshot(&self, symbol: &str) -> Vec<Tick> {
        match self.existing(symbol) {
            Some(window) => window.lock().iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Positive prices of the window as `f64`, in append order
    pub fn prices(&self, symbol: &str) -> Vec<f64> {
        match self.existing(symbol) {
            Some(window) => window
                .lock()
                .iter()
                .filter(|t| t.price > Decimal::ZERO)
                .filter_map(|t| t.price.to_f64())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Most recent tick price for a symbol, if any
    pub fn last_price(&self, symbol: &str) -> Option<Decimal> {
        self.existing(symbol)
            .and_then(|window| window.lock().back().map(|t| t.price))
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.existing(symbol)
            .map(|window| window.lock().len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, symbol: &str) -> bool {
        self.len(symbol) == 0
    }

    fn existing(&self, symbol: &str) -> Option<Window> {
        self.windows.read().get(symbol).cloned()
    }

    fn window_for(&self, symbol: &str) -> Window {
        if let Some(window) = self.existing(symbol) {
            return window;
        }
        let mut guard = self.windows.write();
        guard
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::with_capacity(self.capacity))))
            .clone()
    }
}

impl Default for WindowStore {
    fn default() -> Self {
        Self::new()
    }
}
