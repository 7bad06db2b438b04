//! Cartesian axes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three Cartesian axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// First horizontal axis.
    X,
    /// Second horizontal axis.
    Y,
    /// Vertical axis.
    Z,
}

impl Axis {
    /// All axes in index order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index (`X = 0`, `Y = 1`, `Z = 2`).
    pub fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    /// Inverse of [`index`](Self::index).
    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }

    /// The two axes spanning the plane normal to `self`, in index order.
    pub fn complement(self) -> [Axis; 2] {
        match self {
            Self::X => [Self::Y, Self::Z],
            Self::Y => [Self::X, Self::Z],
            Self::Z => [Self::X, Self::Y],
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complement_excludes_self() {
        for axis in Axis::ALL {
            let [a, b] = axis.complement();
            assert_ne!(a, axis);
            assert_ne!(b, axis);
            assert!(a.index() < b.index());
        }
    }

    #[test]
    fn index_roundtrip() {
        for axis in Axis::ALL {
            assert_eq!(Axis::from_index(axis.index()), Some(axis));
        }
        assert_eq!(Axis::from_index(3), None);
    }
}
