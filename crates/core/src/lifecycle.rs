//! Status lifecycles expressed as explicit transition tables.

/// A status enum whose legal moves are listed in a static transition table.
///
/// Implementors declare every edge as `(from, action, to)`. Anything not in the
/// table is illegal; statuses with no outgoing edge are terminal.
pub trait Lifecycle: Copy + Eq + core::fmt::Debug + 'static {
    /// The actions that drive the lifecycle.
    type Action: Copy + Eq + core::fmt::Debug + 'static;

    /// Every legal edge of the lifecycle graph.
    const TRANSITIONS: &'static [(Self, Self::Action, Self)];

    /// Status reached by applying `action`, if the edge exists.
    fn next(self, action: Self::Action) -> Option<Self> {
        Self::TRANSITIONS
            .iter()
            .find(|(from, a, _)| *from == self && *a == action)
            .map(|(_, _, to)| *to)
    }

    /// Whether `action` is legal from this status.
    fn allows(self, action: Self::Action) -> bool {
        self.next(action).is_some()
    }

    fn is_terminal(self) -> bool {
        !Self::TRANSITIONS.iter().any(|(from, _, _)| *from == self)
    }
}
