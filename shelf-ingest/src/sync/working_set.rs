//! Per-run working sets, dropped when the run returns

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct WorkingSet {
    processed: HashSet<String>,
    author_seen: HashSet<String>,
    author_order: Vec<String>,
    /// Index of the next author key the backfill has not tried yet
    author_cursor: usize,
}

impl WorkingSet {
    /// True if the identifier was already queued by this run
    pub fn is_processed(&self, isbn: &str) -> bool {
        self.processed.contains(isbn)
    }

    /// Returns false if the identifier was already present
    pub fn mark_processed(&mut self, isbn: &str) -> bool {
        self.processed.insert(isbn.to_string())
    }

    /// Returns true if the key is new to this run
    pub fn add_author(&mut self, key: &str) -> bool {
        if self.author_seen.insert(key.to_string()) {
            self.author_order.push(key.to_string());
            true
        } else {
            false
        }
    }

    /// Author keys in discovery order
    pub fn author_keys(&self) -> &[String] {
        &self.author_order
    }

    pub fn author_count(&self) -> usize {
        self.author_order.len()
    }

    /// Keys not yet handed to the backfill
    pub fn pending_author_count(&self) -> usize {
        self.author_order.len() - self.author_cursor
    }

    /// Take the next untried author key; each key is handed out once
    pub fn next_author(&mut self) -> Option<String> {
        let key = self.author_order.get(self.author_cursor)?.clone();
        self.author_cursor += 1;
        Some(key)
    }
}
