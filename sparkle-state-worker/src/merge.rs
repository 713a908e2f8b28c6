// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Reconciliation of stores computed independently over adjacent block ranges.

use crate::store::Store;
use bigdecimal::BigDecimal;
use num::BigInt;
use sparkle_state_exports::{BlockRange, MergeStrategy, StateError, Table, Value};
use std::str::FromStr;
use tracing::info;

/// Combines `base` with `next`, the store of the block range that directly follows it.
///
/// Keys present on a single side pass through unchanged. Keys present on both sides are reduced
/// with the declared merge strategy. Under `LAST_KEY`, a `next` whose last ordinal is behind the
/// one of `base` leaves the table of `base` unchanged. Neither input is modified, the caller marks
/// them as merged.
pub fn merge(base: &Store, next: &Store) -> Result<Store, StateError> {
    if base.strategy() != next.strategy() {
        return Err(StateError::IncompatibleStrategies {
            base: base.strategy(),
            next: next.strategy(),
        });
    }
    if !base.range().is_followed_by(&next.range()) {
        return Err(StateError::NonContiguousRanges {
            base: base.range(),
            next: next.range(),
        });
    }
    for store in [base, next] {
        if !store.staged().is_empty() {
            return Err(StateError::UnflushedDeltas(store.name().to_string()));
        }
    }

    let table = match base.strategy() {
        // next behind base contributes nothing
        MergeStrategy::LastKey if next.last_ordinal() < base.last_ordinal() => {
            base.table().clone()
        }
        MergeStrategy::LastKey => {
            reduce(base.table(), next.table(), |_, _, value| Ok(value.to_vec()))?
        }
        MergeStrategy::SumInt => reduce(base.table(), next.table(), |key, prev, value| {
            let sum = parse::<BigInt>(key, prev)? + parse::<BigInt>(key, value)?;
            Ok(sum.to_string().into_bytes())
        })?,
        MergeStrategy::SumFloat => reduce(base.table(), next.table(), |key, prev, value| {
            let sum = parse::<BigDecimal>(key, prev)? + parse::<BigDecimal>(key, value)?;
            Ok(sum.to_string().into_bytes())
        })?,
        MergeStrategy::MinInt => reduce(base.table(), next.table(), |key, prev, value| {
            let (a, b) = (parse::<BigInt>(key, prev)?, parse::<BigInt>(key, value)?);
            Ok(keep_min(a, b, prev, value))
        })?,
        MergeStrategy::MinFloat => reduce(base.table(), next.table(), |key, prev, value| {
            let (a, b) = (parse::<BigDecimal>(key, prev)?, parse::<BigDecimal>(key, value)?);
            Ok(keep_min(a, b, prev, value))
        })?,
    };

    let range = BlockRange::new(base.range().start, next.range().end);
    info!(
        "merged store {} over {} ({}) into {} keys",
        base.name(),
        range,
        base.strategy(),
        table.len()
    );
    Ok(Store::from_merge(
        base.name().to_string(),
        base.strategy(),
        table,
        range,
        base.last_ordinal().max(next.last_ordinal()),
    ))
}

/// Folds shard stores, ordered by block range, into one continuous store.
///
/// Every consumed store ends up `Merged`. Returns `None` if there is nothing to fold.
pub fn merge_all<I>(stores: I) -> Result<Option<Store>, StateError>
where
    I: IntoIterator<Item = Store>,
{
    let mut stores = stores.into_iter();
    let Some(mut running) = stores.next() else {
        return Ok(None);
    };
    for mut next in stores {
        let merged = merge(&running, &next)?;
        running.mark_merged();
        next.mark_merged();
        running = merged;
    }
    Ok(Some(running))
}

fn reduce<F>(base: &Table, next: &Table, reducer: F) -> Result<Table, StateError>
where
    F: Fn(&str, &[u8], &[u8]) -> Result<Value, StateError>,
{
    let mut merged = base.clone();
    for (key, value) in next {
        let reduced = match base.get(key) {
            Some(prev) => reducer(key, prev, value)?,
            None => value.clone(),
        };
        merged.insert(key.clone(), reduced);
    }
    Ok(merged)
}

/// Parses a decimal string value
pub(crate) fn parse<T: FromStr>(key: &str, raw: &[u8]) -> Result<T, StateError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| T::from_str(s.trim()).ok())
        .ok_or_else(|| StateError::InvalidNumber {
            key: key.to_string(),
            value: String::from_utf8_lossy(raw).into_owned(),
        })
}

/// Keeps the encoding of the smaller side, `base` on ties
fn keep_min<T: PartialOrd>(prev: T, value: T, prev_raw: &[u8], value_raw: &[u8]) -> Value {
    if value < prev {
        value_raw.to_vec()
    } else {
        prev_raw.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use sparkle_state_exports::{StateReader, StoreStatus};

    /// Store over `[start, end)` holding `entries`, written at `ordinal`
    fn store(
        strategy: MergeStrategy,
        start: u64,
        end: u64,
        ordinal: u64,
        entries: &[(&str, &str)],
    ) -> Store {
        let mut store = Store::new("test", strategy, start);
        for (key, value) in entries {
            store.set(ordinal, *key, *value).unwrap();
        }
        store.commit_block(end - 1).unwrap();
        store
    }

    fn entries(store: &Store) -> Vec<(String, String)> {
        store
            .table()
            .iter()
            .map(|(k, v)| (k.clone(), String::from_utf8(v.clone()).unwrap()))
            .collect()
    }

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn sum_ints() {
        let base = store(MergeStrategy::SumInt, 0, 10, 1, &[("x", "5")]);
        let next = store(MergeStrategy::SumInt, 10, 20, 1, &[("x", "3"), ("y", "2")]);
        let merged = merge(&base, &next).unwrap();
        assert_eq!(entries(&merged), pairs(&[("x", "8"), ("y", "2")]));
        assert_eq!(merged.range(), BlockRange::new(0, 20));
        assert_eq!(merged.status(), StoreStatus::Live);
        assert_eq!(merged.bundler().window_start(), None);
    }

    #[test]
    fn sum_floats_keep_precision() {
        let base = store(MergeStrategy::SumFloat, 0, 10, 1, &[("v", "0.1"), ("w", "7")]);
        let next = store(
            MergeStrategy::SumFloat,
            10,
            20,
            1,
            &[("v", "0.2"), ("z", "1.5")],
        );
        let merged = merge(&base, &next).unwrap();
        assert_eq!(
            entries(&merged),
            pairs(&[("v", "0.3"), ("w", "7"), ("z", "1.5")])
        );
    }

    #[test]
    fn last_key() {
        let base = store(MergeStrategy::LastKey, 0, 10, 1, &[("x", "old")]);
        let next = store(MergeStrategy::LastKey, 10, 20, 2, &[("x", "new"), ("y", "added")]);
        let merged = merge(&base, &next).unwrap();
        assert_eq!(entries(&merged), pairs(&[("x", "new"), ("y", "added")]));
        assert_eq!(merged.last_ordinal(), 2);
    }

    #[test]
    fn last_key_keeps_base_when_next_is_behind() {
        let base = store(MergeStrategy::LastKey, 0, 10, 9, &[("x", "old")]);
        let next = store(MergeStrategy::LastKey, 10, 20, 2, &[("x", "new"), ("y", "added")]);
        let merged = merge(&base, &next).unwrap();
        assert_eq!(entries(&merged), pairs(&[("x", "old")]));
        assert_eq!(merged.get_last("y"), None);
        assert_eq!(merged.range(), BlockRange::new(0, 20));
        assert_eq!(merged.last_ordinal(), 9);
    }

    #[test]
    fn minimums() {
        let base = store(MergeStrategy::MinInt, 0, 10, 1, &[("x", "5"), ("y", "-1")]);
        let next = store(MergeStrategy::MinInt, 10, 20, 1, &[("x", "3"), ("y", "4"), ("z", "9")]);
        let merged = merge(&base, &next).unwrap();
        assert_eq!(
            entries(&merged),
            pairs(&[("x", "3"), ("y", "-1"), ("z", "9")])
        );

        let base = store(MergeStrategy::MinFloat, 0, 10, 1, &[("p", "0.50")]);
        let next = store(MergeStrategy::MinFloat, 10, 20, 1, &[("p", "0.25")]);
        assert_eq!(merge(&base, &next).unwrap().get_last("p"), Some(&b"0.25"[..]));
    }

    #[test]
    fn incompatible_strategies_leave_inputs_unchanged() {
        let base = store(MergeStrategy::SumInt, 0, 10, 1, &[("x", "5")]);
        let next = store(MergeStrategy::LastKey, 10, 20, 1, &[("x", "3")]);
        let (base_before, next_before) = (base.table().clone(), next.table().clone());

        let err = merge(&base, &next).unwrap_err();
        assert_matches!(
            err,
            StateError::IncompatibleStrategies {
                base: MergeStrategy::SumInt,
                next: MergeStrategy::LastKey
            }
        );
        assert!(err.is_fatal());
        assert_eq!(base.table(), &base_before);
        assert_eq!(next.table(), &next_before);
        assert_eq!(base.status(), StoreStatus::Live);
        assert_eq!(next.status(), StoreStatus::Live);
    }

    #[test]
    fn preconditions() {
        let base = store(MergeStrategy::SumInt, 0, 10, 1, &[("x", "5")]);
        let gap = store(MergeStrategy::SumInt, 11, 20, 1, &[("x", "3")]);
        assert_matches!(
            merge(&base, &gap),
            Err(StateError::NonContiguousRanges { .. })
        );

        let mut dirty = store(MergeStrategy::SumInt, 10, 20, 1, &[("x", "3")]);
        dirty.set(2, "x", "4").unwrap();
        assert_matches!(merge(&base, &dirty), Err(StateError::UnflushedDeltas(_)));
    }

    #[test]
    fn unparsable_numbers_fail() {
        let base = store(MergeStrategy::SumInt, 0, 10, 1, &[("x", "five")]);
        let next = store(MergeStrategy::SumInt, 10, 20, 1, &[("x", "3")]);
        assert_matches!(
            merge(&base, &next),
            Err(StateError::InvalidNumber { key, value }) if key == "x" && value == "five"
        );

        // single sided values are not parsed
        let next = store(MergeStrategy::SumInt, 10, 20, 1, &[("y", "3")]);
        assert!(merge(&base, &next).is_ok());
    }

    #[test]
    fn folds_left_to_right() {
        let shards = vec![
            store(MergeStrategy::SumInt, 0, 10, 1, &[("x", "1")]),
            store(MergeStrategy::SumInt, 10, 20, 1, &[("x", "2"), ("y", "1")]),
            store(MergeStrategy::SumInt, 20, 30, 1, &[("y", "4")]),
        ];
        let merged = merge_all(shards).unwrap().unwrap();
        assert_eq!(entries(&merged), pairs(&[("x", "3"), ("y", "5")]));
        assert_eq!(merged.range(), BlockRange::new(0, 30));

        assert!(merge_all(Vec::<Store>::new()).unwrap().is_none());
    }
}
