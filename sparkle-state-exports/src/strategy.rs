// Copyright (c) 2022 MASSA LABS <info@massa.net>

use crate::StateError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};

/// Declared rule used to combine the values of two stores covering adjacent block ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum MergeStrategy {
    /// the later store wins on shared keys
    #[strum(serialize = "LAST_KEY")]
    LastKey,
    /// decimal integers are added
    #[strum(serialize = "SUM_INTS")]
    SumInt,
    /// arbitrary precision decimals are added
    #[strum(serialize = "SUM_FLOATS")]
    SumFloat,
    /// the smallest decimal integer is kept
    #[strum(serialize = "MIN_INT")]
    MinInt,
    /// the smallest arbitrary precision decimal is kept
    #[strum(serialize = "MIN_FLOAT")]
    MinFloat,
}

impl MergeStrategy {
    /// Parses a strategy name, failing with a configuration error on unknown names
    pub fn parse(name: &str) -> Result<Self, StateError> {
        MergeStrategy::from_str(name)
            .map_err(|_| StateError::UnknownMergeStrategy(name.to_string()))
    }

    /// true for the strategies that parse values as numbers
    pub fn is_numeric(&self) -> bool {
        !matches!(self, MergeStrategy::LastKey)
    }
}

impl Serialize for MergeStrategy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MergeStrategy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        MergeStrategy::parse(&name).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use strum::IntoEnumIterator;

    #[test]
    fn names_round_trip() {
        for strategy in MergeStrategy::iter() {
            assert_eq!(MergeStrategy::parse(&strategy.to_string()).unwrap(), strategy);
        }
        assert_eq!(MergeStrategy::parse("SUM_INTS").unwrap(), MergeStrategy::SumInt);
    }

    #[test]
    fn unknown_name_is_a_configuration_error() {
        assert_matches!(
            MergeStrategy::parse("MAX_INT"),
            Err(StateError::UnknownMergeStrategy(name)) if name == "MAX_INT"
        );
        assert!(serde_json::from_str::<MergeStrategy>("\"SET_IF_NOT_EXISTS\"").is_err());
        assert_eq!(
            serde_json::from_str::<MergeStrategy>("\"MIN_FLOAT\"").unwrap(),
            MergeStrategy::MinFloat
        );
    }
}
