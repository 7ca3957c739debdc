//! Subscription Sets
//!
//! Domain types for comparing the instrument set the venue connection is
//! actually subscribed to (the live set) against the set the watch-list
//! says it should be subscribed to (the desired set).
//!
//! # Design
//!
//! The venue channel has no incremental unsubscribe, so any difference
//! between the two sets is resolved by replacing the whole subscription.
//! [`reconcile`] is a pure decision function; carrying the decision out is
//! the job of the reconnection supervisor.

use std::collections::{BTreeSet, HashMap};

use crate::domain::book::{InstrumentId, MarketId};

// =============================================================================
// Watch-list Entries
// =============================================================================

/// One instrument the watch-list marks as monitored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedInstrument {
    /// Instrument token.
    pub instrument_id: InstrumentId,
    /// Market the instrument belongs to, when the watch-list knows it.
    pub market_id: Option<MarketId>,
}

impl WatchedInstrument {
    /// Create an entry with a known market.
    #[must_use]
    pub fn new(instrument_id: impl Into<InstrumentId>, market_id: impl Into<MarketId>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            market_id: Some(market_id.into()),
        }
    }
}

// =============================================================================
// Desired Set
// =============================================================================

/// The set of instruments the connection should be subscribed to, together
/// with the instrument-to-market catalog derived from the watch-list.
///
/// Equality and ordering of the set ignore duplicates and input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredSet {
    instruments: BTreeSet<InstrumentId>,
    markets: HashMap<InstrumentId, MarketId>,
}

impl DesiredSet {
    /// Build from watch-list entries. Duplicate instruments collapse; the
    /// first known market for an instrument wins.
    #[must_use]
    pub fn from_watched(entries: impl IntoIterator<Item = WatchedInstrument>) -> Self {
        let mut set = Self::default();
        for entry in entries {
            if let Some(market) = entry.market_id {
                set.markets
                    .entry(entry.instrument_id.clone())
                    .or_insert(market);
            }
            set.instruments.insert(entry.instrument_id);
        }
        set
    }

    /// Build from bare instrument ids with no market catalog.
    #[must_use]
    pub fn from_ids<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<InstrumentId>,
    {
        Self {
            instruments: ids.into_iter().map(Into::into).collect(),
            markets: HashMap::new(),
        }
    }

    /// Whether no instrument is desired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Number of distinct instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// The instruments, sorted.
    #[must_use]
    pub const fn instruments(&self) -> &BTreeSet<InstrumentId> {
        &self.instruments
    }

    /// The instruments as a sorted vector, ready for a subscribe frame.
    #[must_use]
    pub fn to_vec(&self) -> Vec<InstrumentId> {
        self.instruments.iter().cloned().collect()
    }

    /// Instrument-to-market catalog.
    #[must_use]
    pub const fn markets(&self) -> &HashMap<InstrumentId, MarketId> {
        &self.markets
    }

    /// Whether the instrument set equals `live`, ignoring the catalog.
    #[must_use]
    pub fn same_instruments(&self, live: &BTreeSet<InstrumentId>) -> bool {
        &self.instruments == live
    }

    /// Difference between `live` and this set.
    #[must_use]
    pub fn changes_from(&self, live: &BTreeSet<InstrumentId>) -> SubscriptionChanges {
        SubscriptionChanges {
            added: self.instruments.difference(live).cloned().collect(),
            removed: live.difference(&self.instruments).cloned().collect(),
        }
    }
}

// =============================================================================
// Subscription Changes
// =============================================================================

/// Instruments gained and lost between two sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Instruments present in the desired set only.
    pub added: BTreeSet<InstrumentId>,
    /// Instruments present in the live set only.
    pub removed: BTreeSet<InstrumentId>,
}

impl SubscriptionChanges {
    /// Check if there are any changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

// =============================================================================
// Reconciliation Decision
// =============================================================================

/// What the reconciler should ask the supervisor to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Sets already agree, or there is nothing to subscribe to.
    None,
    /// Nothing is live yet; begin ingestion with this set.
    Activate(DesiredSet),
    /// Replace the live subscription with this set.
    Resubscribe {
        /// The new desired set.
        desired: DesiredSet,
        /// What changed, for logging.
        changes: SubscriptionChanges,
    },
}

/// Decide how to bring `live` in line with `desired`.
///
/// - empty desired set: nothing to do (an existing subscription is left
///   alone rather than torn down)
/// - empty live set: activate
/// - equal sets: nothing to do
/// - otherwise: full resubscribe
#[must_use]
pub fn reconcile(live: &BTreeSet<InstrumentId>, desired: DesiredSet) -> ReconcileAction {
    if desired.is_empty() {
        return ReconcileAction::None;
    }
    if live.is_empty() {
        return ReconcileAction::Activate(desired);
    }
    if desired.same_instruments(live) {
        return ReconcileAction::None;
    }
    let changes = desired.changes_from(live);
    ReconcileAction::Resubscribe { desired, changes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(ids: &[&str]) -> BTreeSet<InstrumentId> {
        ids.iter().map(|id| InstrumentId::from(*id)).collect()
    }

    #[test]
    fn duplicates_and_order_are_ignored() {
        let a = DesiredSet::from_ids(["B", "A", "B"]);
        let b = DesiredSet::from_ids(["A", "B"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.to_vec(), vec![InstrumentId::from("A"), InstrumentId::from("B")]);
    }

    #[test]
    fn catalog_keeps_first_market() {
        let set = DesiredSet::from_watched([
            WatchedInstrument::new("A", "m1"),
            WatchedInstrument::new("A", "m2"),
            WatchedInstrument {
                instrument_id: "B".into(),
                market_id: None,
            },
        ]);
        assert_eq!(
            set.markets().get(&InstrumentId::from("A")).map(String::as_str),
            Some("m1")
        );
        assert_eq!(set.markets().get(&InstrumentId::from("B")), None);
        assert!(set.instruments().contains(&InstrumentId::from("B")));
    }

    #[test]
    fn empty_live_activates() {
        let desired = DesiredSet::from_ids(["A", "B"]);
        assert_eq!(
            reconcile(&BTreeSet::new(), desired.clone()),
            ReconcileAction::Activate(desired)
        );
    }

    #[test]
    fn equal_sets_do_nothing() {
        let desired = DesiredSet::from_ids(["B", "A"]);
        assert_eq!(reconcile(&live(&["A", "B"]), desired), ReconcileAction::None);
    }

    #[test]
    fn empty_desired_does_nothing() {
        assert_eq!(
            reconcile(&live(&["A"]), DesiredSet::default()),
            ReconcileAction::None
        );
        assert_eq!(
            reconcile(&BTreeSet::new(), DesiredSet::default()),
            ReconcileAction::None
        );
    }

    #[test]
    fn differing_sets_resubscribe_with_changes() {
        let desired = DesiredSet::from_ids(["A", "C"]);
        let action = reconcile(&live(&["A", "B"]), desired.clone());

        let ReconcileAction::Resubscribe {
            desired: got,
            changes,
        } = action
        else {
            panic!("expected resubscribe, got {action:?}");
        };
        assert_eq!(got, desired);
        assert_eq!(changes.added, live(&["C"]));
        assert_eq!(changes.removed, live(&["B"]));
        assert!(!changes.is_empty());
    }

    #[test]
    fn superset_only_adds() {
        let desired = DesiredSet::from_ids(["A", "B", "C"]);
        let changes = desired.changes_from(&live(&["A"]));
        assert_eq!(changes.added, live(&["B", "C"]));
        assert!(changes.removed.is_empty());
    }
}
