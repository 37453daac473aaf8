//! Symbol table built while loading program images.

use std::collections::BTreeMap;

/// Name/address maps collected from every loaded image.
///
/// Both directions keep the first definition seen, so the main program wins
/// over payloads loaded after it.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    by_name: BTreeMap<String, u64>,
    by_addr: BTreeMap<u64, String>,
}

impl SymbolTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `symbols` into the table; existing entries are never replaced.
    pub fn merge<'a>(&mut self, symbols: impl IntoIterator<Item = (&'a String, &'a u64)>) {
        for (name, &addr) in symbols {
            let _ = self.by_name.entry(name.clone()).or_insert(addr);
            let _ = self.by_addr.entry(addr).or_insert_with(|| name.clone());
        }
    }

    /// Address of `name`, if defined.
    pub fn address_of(&self, name: &str) -> Option<u64> {
        self.by_name.get(name).copied()
    }

    /// Name recorded for `addr`, if any.
    pub fn symbol_at(&self, addr: u64) -> Option<&str> {
        self.by_addr.get(&addr).map(String::as_str)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns true if nothing has been loaded.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
