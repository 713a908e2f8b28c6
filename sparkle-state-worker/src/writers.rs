// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Typed writes on top of `Store::set`, matching the value encodings the merge strategies expect.

use crate::merge::parse;
use crate::store::Store;
use bigdecimal::BigDecimal;
use num::BigInt;
use sparkle_state_exports::{Key, StateError, StateReader, Value};
use std::str::FromStr;

impl Store {
    /// Adds `delta` to the decimal integer stored at `key` (absent = 0)
    pub fn add_int(&mut self, ordinal: u64, key: impl Into<Key>, delta: &BigInt) -> Result<(), StateError> {
        let key = key.into();
        let sum = match self.get_at(ordinal, &key) {
            Some(raw) => parse::<BigInt>(&key, raw)? + delta,
            None => delta.clone(),
        };
        self.set(ordinal, key, sum.to_string())
    }

    /// Adds `delta` to the decimal number stored at `key` (absent = 0)
    pub fn add_float(
        &mut self,
        ordinal: u64,
        key: impl Into<Key>,
        delta: &BigDecimal,
    ) -> Result<(), StateError> {
        let key = key.into();
        let sum = match self.get_at(ordinal, &key) {
            Some(raw) => parse::<BigDecimal>(&key, raw)? + delta,
            None => delta.clone(),
        };
        self.set(ordinal, key, sum.to_string())
    }

    /// Stores `value` at `key` unless a smaller integer is already there
    pub fn set_min_int(&mut self, ordinal: u64, key: impl Into<Key>, value: &BigInt) -> Result<(), StateError> {
        self.set_min(ordinal, key.into(), value)
    }

    /// Stores `value` at `key` unless a smaller number is already there
    pub fn set_min_float(
        &mut self,
        ordinal: u64,
        key: impl Into<Key>,
        value: &BigDecimal,
    ) -> Result<(), StateError> {
        self.set_min(ordinal, key.into(), value)
    }

    fn set_min<T>(&mut self, ordinal: u64, key: Key, value: &T) -> Result<(), StateError>
    where
        T: FromStr + PartialOrd + ToString,
    {
        if let Some(raw) = self.get_at(ordinal, &key) {
            if parse::<T>(&key, raw)? <= *value {
                return Ok(());
            }
        }
        self.set(ordinal, key, value.to_string())
    }

    /// Stores `value` at `key` only if the key is absent. Returns true if it was written.
    pub fn set_if_not_exists(
        &mut self,
        ordinal: u64,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<bool, StateError> {
        let key = key.into();
        if self.get_last(&key).is_some() {
            return Ok(false);
        }
        self.set(ordinal, key, value)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use sparkle_state_exports::MergeStrategy;

    #[test]
    fn counters() {
        let mut store = Store::new("transactions", MergeStrategy::SumInt, 0);
        store.add_int(1, "pairs", &BigInt::from(1)).unwrap();
        store.add_int(2, "pairs", &BigInt::from(1)).unwrap();
        store.commit_block(0).unwrap();
        store.add_int(0, "pairs", &BigInt::from(-5)).unwrap();
        assert_eq!(store.get_last("pairs"), Some(&b"-3"[..]));

        let mut volumes = Store::new("volumes", MergeStrategy::SumFloat, 0);
        volumes.add_float(1, "v", &BigDecimal::from_str("1.25").unwrap()).unwrap();
        volumes.add_float(2, "v", &BigDecimal::from_str("0.5").unwrap()).unwrap();
        assert_eq!(volumes.get_last("v"), Some(&b"1.75"[..]));
    }

    #[test]
    fn minimums_only_decrease() {
        let mut store = Store::new("first_seen", MergeStrategy::MinInt, 0);
        store.set_min_int(1, "pair:a", &BigInt::from(12)).unwrap();
        store.set_min_int(2, "pair:a", &BigInt::from(15)).unwrap();
        assert_eq!(store.get_last("pair:a"), Some(&b"12"[..]));
        store.set_min_int(3, "pair:a", &BigInt::from(7)).unwrap();
        assert_eq!(store.get_last("pair:a"), Some(&b"7"[..]));
        assert_eq!(store.staged().len(), 2);

        let mut prices = Store::new("low", MergeStrategy::MinFloat, 0);
        prices.set_min_float(1, "p", &BigDecimal::from_str("0.3").unwrap()).unwrap();
        prices.set_min_float(2, "p", &BigDecimal::from_str("0.25").unwrap()).unwrap();
        assert_eq!(prices.get_last("p"), Some(&b"0.25"[..]));
    }

    #[test]
    fn garbage_is_not_a_number() {
        let mut store = Store::new("transactions", MergeStrategy::SumInt, 0);
        store.set(1, "pairs", "many").unwrap();
        assert_matches!(
            store.add_int(2, "pairs", &BigInt::from(1)),
            Err(StateError::InvalidNumber { .. })
        );
    }

    #[test]
    fn set_if_not_exists() {
        let mut store = Store::new("pairs", MergeStrategy::LastKey, 0);
        assert!(store.set_if_not_exists(1, "k", "a").unwrap());
        assert!(!store.set_if_not_exists(2, "k", "b").unwrap());
        assert_eq!(store.get_last("k"), Some(&b"a"[..]));
    }
}
