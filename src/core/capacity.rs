//! Queue capacity.
//!
//! Deserializes from either a positive integer (`capacity = 128`) or the
//! keyword `"unbounded"`.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "CapacityRepr")]
pub enum Capacity {
    /// At most `n` stored items.
    Bounded(usize),
    #[default]
    Unbounded,
}

impl Capacity {
    /// Returns `true` when a queue holding `len` items cannot accept another.
    #[inline]
    pub fn is_full(self, len: usize) -> bool {
        match self {
            Capacity::Bounded(limit) => len >= limit,
            Capacity::Unbounded => false,
        }
    }

    pub fn limit(self) -> Option<usize> {
        match self {
            Capacity::Bounded(limit) => Some(limit),
            Capacity::Unbounded => None,
        }
    }

    pub fn is_bounded(self) -> bool {
        matches!(self, Capacity::Bounded(_))
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capacity::Bounded(limit) => write!(f, "{limit}"),
            Capacity::Unbounded => write!(f, "unbounded"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid capacity `{0}`: expected a number or \"unbounded\"")]
pub struct InvalidCapacity(pub String);

#[derive(Deserialize)]
#[serde(untagged)]
enum CapacityRepr {
    Bounded(usize),
    Keyword(String),
}

impl TryFrom<CapacityRepr> for Capacity {
    type Error = InvalidCapacity;

    fn try_from(repr: CapacityRepr) -> Result<Self, Self::Error> {
        match repr {
            CapacityRepr::Bounded(limit) => Ok(Capacity::Bounded(limit)),
            CapacityRepr::Keyword(word) if word.eq_ignore_ascii_case("unbounded") => {
                Ok(Capacity::Unbounded)
            }
            CapacityRepr::Keyword(word) => Err(InvalidCapacity(word)),
        }
    }
}
