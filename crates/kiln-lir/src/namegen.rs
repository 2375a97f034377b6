// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Per-unit name allocator.

use std::collections::HashMap;

/// Hands out `tag.N` names, counting separately per tag.
///
/// Deterministic for a given call sequence, so printed output is stable
/// across runs.
#[derive(Debug, Default)]
pub struct NameGen {
    counters: HashMap<String, u32>,
}

impl NameGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self, tag: &str) -> String {
        let counter = self.counters.entry(tag.to_string()).or_insert(0);
        let name = format!("{}.{}", tag, counter);
        *counter += 1;
        name
    }
}
