//! Read-path bookkeeping: a small LRU of warm records and a graph of which
//! record tends to be opened after which.

use std::collections::{HashMap, VecDeque};

/// Records held warm before the least recently used one is evicted.
pub const CACHE_CAPACITY: usize = 50;

/// Related paths returned with each read.
pub const PREDICTION_LIMIT: usize = 3;

/// Tier a read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Disk,
    Cache,
}

impl ReadSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadSource::Disk => "DISK",
            ReadSource::Cache => "CACHE",
        }
    }
}

/// Recency-ordered set of warm paths, most recent at the front.
#[derive(Debug)]
pub struct ReadCache {
    capacity: usize,
    order: VecDeque<String>,
}

impl Default for ReadCache {
    fn default() -> Self {
        Self::with_capacity(CACHE_CAPACITY)
    }
}

impl ReadCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
        }
    }

    /// Mark a path as read; reports whether it was already warm.
    pub fn touch(&mut self, path: &str) -> ReadSource {
        let source = match self.order.iter().position(|p| p == path) {
            Some(i) => {
                self.order.remove(i);
                ReadSource::Cache
            }
            None => ReadSource::Disk,
        };
        self.warm(path);
        source
    }

    /// Insert a path as most recently used, evicting past capacity.
    pub fn warm(&mut self, path: &str) {
        self.order.retain(|p| p != path);
        self.order.push_front(path.to_string());
        self.order.truncate(self.capacity);
    }

    pub fn evict(&mut self, path: &str) {
        self.order.retain(|p| p != path);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.order.iter().any(|p| p == path)
    }
}

/// Weighted "opened B after A" edges.
#[derive(Debug, Default)]
pub struct AccessGraph {
    edges: HashMap<String, HashMap<String, u32>>,
}

impl AccessGraph {
    /// Strengthen the edge from `source` to `target`. Self-loops are ignored.
    pub fn learn(&mut self, source: &str, target: &str) {
        if source == target {
            return;
        }
        *self
            .edges
            .entry(source.to_string())
            .or_default()
            .entry(target.to_string())
            .or_insert(0) += 1;
    }

    /// Heaviest targets of `source`, ties broken by path.
    pub fn predict(&self, source: &str, limit: usize) -> Vec<String> {
        let Some(targets) = self.edges.get(source) else {
            return Vec::new();
        };
        let mut ranked: Vec<(&String, &u32)> = targets.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Drop every edge touching `path`.
    pub fn forget(&mut self, path: &str) {
        self.edges.remove(path);
        for targets in self.edges.values_mut() {
            targets.remove(path);
        }
        self.edges.retain(|_, targets| !targets.is_empty());
    }
}
