//! Aggregate root trait for versioned domain records.

/// Aggregate root marker + minimal interface.
///
/// Every record the ledger persists is an aggregate root: it has a stable
/// identity and a version that the store bumps on each committed update.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the record.
    ///
    /// Starts at 1 on insert and grows by one per committed update.
    fn version(&self) -> u64;

    /// Advance the version after a committed update. Called by stores only.
    fn bump_version(&mut self);
}
