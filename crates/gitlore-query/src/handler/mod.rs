//! Query handlers, one per question category.

pub mod collaboration;
pub mod evolution;
pub mod general;
pub mod impact;
pub mod pattern;
pub mod semantic;

pub use collaboration::CollaborationHandler;
pub use evolution::EvolutionHandler;
pub use general::GeneralHandler;
pub use impact::ImpactHandler;
pub use pattern::PatternHandler;
pub use semantic::SemanticHandler;

use std::collections::HashMap;

/// String-keyed values that iterate in first-insertion order.
#[derive(Debug, Clone, Default)]
pub(crate) struct FirstSeen<V> {
    index: HashMap<String, usize>,
    entries: Vec<(String, V)>,
}

impl<V> FirstSeen<V> {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn into_entries(self) -> Vec<(String, V)> {
        self.entries
    }

    pub(crate) fn into_keys(self) -> Vec<String> {
        self.entries.into_iter().map(|(key, _)| key).collect()
    }
}

impl<V: Default> FirstSeen<V> {
    /// The value for `key`, inserted as `V::default()` on first sight.
    pub(crate) fn entry(&mut self, key: &str) -> &mut V {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                let slot = self.entries.len();
                self.index.insert(key.to_string(), slot);
                self.entries.push((key.to_string(), V::default()));
                slot
            }
        };
        &mut self.entries[slot].1
    }
}

/// Occurrence counts in first-seen order.
pub(crate) fn count_in_order<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: FirstSeen<usize> = FirstSeen::default();
    for item in items {
        *counts.entry(item) += 1;
    }
    counts.into_entries()
}

/// The highest count; ties go to the entry seen first.
pub(crate) fn most_frequent(counts: &[(String, usize)]) -> Option<&(String, usize)> {
    counts
        .iter()
        .fold(None, |best: Option<&(String, usize)>, c| match best {
            Some(b) if b.1 >= c.1 => Some(b),
            _ => Some(c),
        })
}

/// Distinct values in first-seen order.
pub(crate) fn distinct_in_order<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen: FirstSeen<()> = FirstSeen::default();
    for item in items {
        seen.entry(item);
    }
    seen.into_keys()
}
