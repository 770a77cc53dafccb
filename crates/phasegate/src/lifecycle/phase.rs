//! Liveness and transition phases

use std::fmt;

use serde::{Deserialize, Serialize};

/// Steady-state liveness of a gated object
///
/// Destroy-only gates use `Idle` for "alive"; they never report `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    /// Alive but not running
    #[default]
    Idle,
    /// Started and not yet stopped
    Running,
    /// Destroyed; terminal
    Destroyed,
}

impl Liveness {
    pub(crate) const fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Destroyed => 2,
        }
    }

    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Destroyed,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Transition in progress; at most one at a time per object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// `start` is running its hook
    Starting,
    /// `stop` is running its hook
    Stopping,
    /// `destroy` is running its hook
    Destroying,
}

impl Phase {
    /// Every phase, in declaration order
    pub const ALL: [Self; 3] = [Self::Starting, Self::Stopping, Self::Destroying];

    /// Liveness reached when this transition's hook succeeds
    pub const fn target(self) -> Liveness {
        match self {
            Self::Starting => Liveness::Running,
            Self::Stopping => Liveness::Idle,
            Self::Destroying => Liveness::Destroyed,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Starting => 1,
            Self::Stopping => 1 << 1,
            Self::Destroying => 1 << 2,
        }
    }

    pub(crate) const fn to_u8(phase: Option<Self>) -> u8 {
        match phase {
            None => 0,
            Some(phase) => phase.bit(),
        }
    }

    pub(crate) const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Starting),
            2 => Some(Self::Stopping),
            4 => Some(Self::Destroying),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Stopping => write!(f, "stopping"),
            Self::Destroying => write!(f, "destroying"),
        }
    }
}

/// Set of phases during which a guarded call bypasses the readiness check
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PhaseSet(u8);

impl PhaseSet {
    /// The empty set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every phase
    pub const fn all() -> Self {
        Self(Phase::Starting.bit() | Phase::Stopping.bit() | Phase::Destroying.bit())
    }

    /// Set containing only `phase`
    pub const fn only(phase: Phase) -> Self {
        Self(phase.bit())
    }

    /// Copy of this set with `phase` added
    #[must_use]
    pub const fn with(self, phase: Phase) -> Self {
        Self(self.0 | phase.bit())
    }

    /// Whether `phase` is a member
    pub const fn contains(self, phase: Phase) -> bool {
        self.0 & phase.bit() != 0
    }

    /// Whether the set is empty
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate over the members in declaration order
    pub fn iter(self) -> impl Iterator<Item = Phase> {
        Phase::ALL.into_iter().filter(move |phase| self.contains(*phase))
    }
}

impl FromIterator<Phase> for PhaseSet {
    fn from_iter<I: IntoIterator<Item = Phase>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl From<Phase> for PhaseSet {
    fn from(phase: Phase) -> Self {
        Self::only(phase)
    }
}

impl fmt::Debug for PhaseSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_targets() {
        assert_eq!(Phase::Starting.target(), Liveness::Running);
        assert_eq!(Phase::Stopping.target(), Liveness::Idle);
        assert_eq!(Phase::Destroying.target(), Liveness::Destroyed);
    }

    /// Validates the atomic encodings of `Phase` and `Liveness`.
    ///
    /// Assertions:
    /// - Confirms every value survives the `u8` encoding.
    /// - Confirms `None` encodes as zero.
    #[test]
    fn test_atomic_encoding() {
        for phase in Phase::ALL {
            assert_eq!(Phase::from_u8(Phase::to_u8(Some(phase))), Some(phase));
        }
        assert_eq!(Phase::to_u8(None), 0);
        assert_eq!(Phase::from_u8(0), None);

        for liveness in [Liveness::Idle, Liveness::Running, Liveness::Destroyed] {
            assert_eq!(Liveness::from_u8(liveness.to_u8()), liveness);
        }
    }

    /// Validates `PhaseSet` membership operations.
    ///
    /// Assertions:
    /// - Ensures the empty set contains nothing.
    /// - Ensures `with` and `collect` agree.
    #[test]
    fn test_phase_set_membership() {
        let empty = PhaseSet::empty();
        assert!(empty.is_empty());
        assert!(!empty.contains(Phase::Starting));

        let set = PhaseSet::only(Phase::Starting).with(Phase::Destroying);
        assert!(set.contains(Phase::Starting));
        assert!(!set.contains(Phase::Stopping));
        assert!(set.contains(Phase::Destroying));

        let collected: PhaseSet = [Phase::Destroying, Phase::Starting].into_iter().collect();
        assert_eq!(collected, set);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Phase::Starting, Phase::Destroying]);
        assert_eq!(PhaseSet::all().iter().count(), 3);
    }

    #[test]
    fn test_display() {
        assert_eq!(Phase::Stopping.to_string(), "stopping");
        assert_eq!(Liveness::Destroyed.to_string(), "destroyed");
        assert_eq!(format!("{:?}", PhaseSet::only(Phase::Starting)), "{Starting}");
    }
}
