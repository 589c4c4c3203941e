//! Hierarchical wall-clock accounting
//!
//! Collects named durations into a tree so that the cost of a V-cycle
//! can be broken down per level and per phase (smoother, transfer,
//! coarse solve). Paths are slash-separated, e.g. `"vcycle/level 2/smooth"`.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Accumulated timings organized as a tree
#[derive(Debug, Clone, Default)]
pub struct TimerTree {
    total: Duration,
    n_calls: usize,
    children: BTreeMap<String, TimerTree>,
}

impl TimerTree {
    /// Fresh, empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a measured duration under the slash-separated `path`
    pub fn insert(&mut self, path: &str, duration: Duration) {
        let mut node = &mut *self;
        for part in path.split('/') {
            node = node.children.entry(part.to_string()).or_default();
        }
        node.total += duration;
        node.n_calls += 1;
    }

    /// Time a closure and record its duration under `path`
    pub fn timed<R>(&mut self, path: &str, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.insert(path, start.elapsed());
        result
    }

    /// Total duration recorded directly at `path`, if any
    pub fn get(&self, path: &str) -> Option<Duration> {
        let mut node = self;
        for part in path.split('/') {
            node = node.children.get(part)?;
        }
        Some(node.total)
    }

    /// Drop all recorded data
    pub fn clear(&mut self) {
        self.children.clear();
        self.total = Duration::ZERO;
        self.n_calls = 0;
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, name: &str, depth: usize) -> fmt::Result {
        writeln!(
            f,
            "{:indent$}{:<30} {:>10.3e} s  ({} calls)",
            "",
            name,
            self.total.as_secs_f64(),
            self.n_calls,
            indent = 2 * depth
        )?;
        for (child_name, child) in &self.children {
            child.write_indented(f, child_name, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for TimerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, child) in &self.children {
            child.write_indented(f, name, 0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_paths_accumulate() {
        let mut t = TimerTree::new();
        t.insert("vcycle/smooth", Duration::from_millis(3));
        t.insert("vcycle/smooth", Duration::from_millis(4));
        t.insert("vcycle/coarse", Duration::from_millis(1));
        assert_eq!(t.get("vcycle/smooth"), Some(Duration::from_millis(7)));
        assert_eq!(t.get("vcycle/coarse"), Some(Duration::from_millis(1)));
        assert_eq!(t.get("vcycle/missing"), None);
    }

    #[test]
    fn timed_returns_the_closure_result() {
        let mut t = TimerTree::new();
        let v = t.timed("work", || 42);
        assert_eq!(v, 42);
        assert!(t.get("work").is_some());
    }

    #[test]
    fn display_lists_every_node() {
        let mut t = TimerTree::new();
        t.insert("a/b", Duration::from_millis(1));
        let s = format!("{}", t);
        assert!(s.contains('a'));
        assert!(s.contains('b'));
    }
}
