//! Subscription Registry
//!
//! The set of symbols the streaming client is subscribed to. It is the
//! single source of truth replayed on every (re)connection, so it keeps
//! changes made while the socket is down.
//!
//! # Design
//!
//! - Symbols are trimmed and uppercased on the way in; blanks are dropped.
//! - Every mutation reports the symbols that actually changed, so callers
//!   only send incremental control messages for real changes.
//! - Ordered storage keeps outbound subscribe messages deterministic.

use std::collections::BTreeSet;

use parking_lot::RwLock;

/// A normalised (uppercase) ticker symbol.
pub type Symbol = String;

// =============================================================================
// Subscription Change
// =============================================================================

/// Result of a registry mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChange {
    /// Symbols whose membership changed, sorted.
    pub changed: Vec<Symbol>,
    /// Full set after the mutation.
    pub current: BTreeSet<Symbol>,
}

impl SubscriptionChange {
    /// Check if the mutation was a no-op.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Thread-safe set of subscribed symbols.
///
/// # Example
///
/// ```rust
/// use quote_stream::domain::subscription::SubscriptionRegistry;
///
/// let registry = SubscriptionRegistry::new();
///
/// let change = registry.add(["aapl", "MSFT"]);
/// assert_eq!(change.changed, vec!["AAPL", "MSFT"]);
///
/// // Already present - nothing to send upstream
/// assert!(registry.add(["AAPL"]).is_empty());
///
/// let change = registry.remove(["msft"]);
/// assert_eq!(change.changed, vec!["MSFT"]);
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    symbols: RwLock<BTreeSet<Symbol>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalise a raw symbol. Returns `None` for blank input.
    #[must_use]
    pub fn normalize(raw: &str) -> Option<Symbol> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_uppercase())
        }
    }

    /// Add symbols, returning the ones that were not already present.
    pub fn add<I, S>(&self, symbols: I) -> SubscriptionChange
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let incoming: BTreeSet<Symbol> = symbols
            .into_iter()
            .filter_map(|s| Self::normalize(s.as_ref()))
            .collect();

        let mut set = self.symbols.write();
        let changed = incoming
            .into_iter()
            .filter(|symbol| set.insert(symbol.clone()))
            .collect();

        SubscriptionChange {
            changed,
            current: set.clone(),
        }
    }

    /// Remove symbols, returning the ones that were present.
    pub fn remove<I, S>(&self, symbols: I) -> SubscriptionChange
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let outgoing: BTreeSet<Symbol> = symbols
            .into_iter()
            .filter_map(|s| Self::normalize(s.as_ref()))
            .collect();

        let mut set = self.symbols.write();
        let changed = outgoing
            .into_iter()
            .filter(|symbol| set.remove(symbol))
            .collect();

        SubscriptionChange {
            changed,
            current: set.clone(),
        }
    }

    /// Remove every symbol.
    pub fn clear(&self) -> SubscriptionChange {
        let removed = std::mem::take(&mut *self.symbols.write());
        SubscriptionChange {
            changed: removed.into_iter().collect(),
            current: BTreeSet::new(),
        }
    }

    /// Copy of the current set.
    #[must_use]
    pub fn snapshot(&self) -> BTreeSet<Symbol> {
        self.symbols.read().clone()
    }

    /// Current set as a sorted list, ready for a replay message.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Symbol> {
        self.symbols.read().iter().cloned().collect()
    }

    /// Check membership of a (raw) symbol.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        Self::normalize(symbol).is_some_and(|s| self.symbols.read().contains(&s))
    }

    /// Number of subscribed symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.read().len()
    }

    /// Check if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.read().is_empty()
    }
}
