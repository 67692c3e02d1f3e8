use sizewatch_core::{AggregatedEntry, CanonicalSize, SizeMap};

/// Keeps the cheapest listing seen per canonical size.
#[derive(Debug, Default)]
pub struct CheapestPerSize {
    entries: SizeMap,
}

impl CheapestPerSize {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers a resolved listing. Returns `true` if it became the size's
    /// current entry: either the first hit or strictly cheaper than the last.
    pub fn offer(&mut self, size: CanonicalSize, price: u64, url: String) -> bool {
        if let Some(current) = self.entries.get_mut(&size) {
            if price >= current.price {
                return false;
            }
            current.price = price;
            current.url = url;
            return true;
        }
        self.entries.insert(
            size.clone(),
            AggregatedEntry { size, price, url },
        );
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn into_map(self) -> SizeMap {
        self.entries
    }
}
