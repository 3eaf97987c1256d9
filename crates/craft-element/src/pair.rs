//! Canonical, commutative keys for element pairs
//!
//! Combining A with B and B with A must land on the same cache entry, so the
//! key stores the two ids in ascending order. The string form joins them with
//! `+` (`"<low>+<high>"`).

use crate::id::{ElementId, IdError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = '+';

/// Unordered pair of element ids in canonical (sorted) form
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    low: ElementId,
    high: ElementId,
}

impl PairKey {
    /// Build the canonical key for `a` and `b`, in either order
    #[inline]
    #[must_use]
    pub fn new(a: ElementId, b: ElementId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    #[inline]
    #[must_use]
    pub fn low(&self) -> ElementId {
        self.low
    }

    #[inline]
    #[must_use]
    pub fn high(&self) -> ElementId {
        self.high
    }

    /// Whether the key pairs an element with itself
    #[inline]
    #[must_use]
    pub fn is_self_pair(&self) -> bool {
        self.low == self.high
    }

    /// The parent pair recorded on an element produced from this key
    #[inline]
    #[must_use]
    pub fn parents(&self) -> ParentPair {
        ParentPair([self.low, self.high])
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.low, self.high)
    }
}

impl FromStr for PairKey {
    type Err = PairKeyError;

    /// Parses either order; the result is always canonical.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| PairKeyError::MissingSeparator(s.to_string()))?;
        Ok(Self::new(a.parse()?, b.parse()?))
    }
}

impl Serialize for PairKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PairKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

/// The two ids an element was combined from, sorted ascending
///
/// Only obtainable through [`PairKey::parents`], so it is always canonical.
/// Serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ParentPair([ElementId; 2]);

impl ParentPair {
    #[inline]
    #[must_use]
    pub fn ids(&self) -> [ElementId; 2] {
        self.0
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> PairKey {
        PairKey::new(self.0[0], self.0[1])
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: ElementId) -> bool {
        self.0.contains(&id)
    }
}

impl<'de> Deserialize<'de> for ParentPair {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let [a, b] = <[ElementId; 2]>::deserialize(deserializer)?;
        Ok(PairKey::new(a, b).parents())
    }
}

/// Pair key parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairKeyError {
    #[error("pair key '{0}' has no '+' separator")]
    MissingSeparator(String),

    #[error(transparent)]
    InvalidId(#[from] IdError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_id() -> impl Strategy<Value = ElementId> {
        any::<u128>().prop_map(|n| ElementId::from_uuid(uuid::Uuid::from_u128(n)))
    }

    proptest! {
        #[test]
        fn key_is_commutative(a in arb_id(), b in arb_id()) {
            prop_assert_eq!(PairKey::new(a, b), PairKey::new(b, a));
            prop_assert_eq!(PairKey::new(a, b).to_string(), PairKey::new(b, a).to_string());
        }

        #[test]
        fn key_is_sorted(a in arb_id(), b in arb_id()) {
            let key = PairKey::new(a, b);
            prop_assert!(key.low() <= key.high());
            prop_assert!(key.low().to_string() <= key.high().to_string());
        }

        #[test]
        fn display_parses_back(a in arb_id(), b in arb_id()) {
            let key = PairKey::new(a, b);
            prop_assert_eq!(key.to_string().parse::<PairKey>().unwrap(), key);
        }
    }

    #[test]
    fn self_pair_is_allowed() {
        let id = ElementId::new();
        let key = PairKey::new(id, id);
        assert!(key.is_self_pair());
        assert_eq!(key.to_string(), format!("{id}+{id}"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            "nope".parse::<PairKey>(),
            Err(PairKeyError::MissingSeparator(_))
        ));
        assert!(matches!(
            "a+b".parse::<PairKey>(),
            Err(PairKeyError::InvalidId(_))
        ));
    }

    #[test]
    fn parents_deserialize_canonically() {
        let a = ElementId::new();
        let b = ElementId::new();
        let json = serde_json::json!([b.max(a), b.min(a)]);
        let parents: ParentPair = serde_json::from_value(json).unwrap();
        assert_eq!(parents.ids(), [a.min(b), a.max(b)]);
        assert!(parents.contains(a) && parents.contains(b));
    }

    #[test]
    fn pair_key_serializes_as_string() {
        let key = PairKey::new(ElementId::new(), ElementId::new());
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{key}\""));
    }
}
