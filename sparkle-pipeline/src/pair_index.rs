// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! Lookup of pairs by token and of tokens by pair.
//!
//! Built once by the driver and shared read-only with the handlers of every shard.

use crate::error::PipelineError;
use crate::records::PairCreated;
use sparkle_state_worker::Store;
use std::collections::{BTreeSet, HashMap};

/// Key prefix of the pair records of the `pairs` store
pub const PAIR_KEY_PREFIX: &str = "pair:";

/// Key of the pair record of `address` in the `pairs` store
pub fn pair_key(address: &str) -> String {
    format!("{}{}", PAIR_KEY_PREFIX, address)
}

/// Order independent key of a token couple
pub fn tokens_key(token0: &str, token1: &str) -> String {
    if token0 > token1 {
        format!("tokens:{}:{}", token1, token0)
    } else {
        format!("tokens:{}:{}", token0, token1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenPairIndex {
    pairs_by_token: HashMap<String, BTreeSet<String>>,
    tokens_by_pair: HashMap<String, (String, String)>,
}

impl TokenPairIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pair: &PairCreated) {
        for token in [&pair.token0.address, &pair.token1.address] {
            self.pairs_by_token
                .entry(token.clone())
                .or_default()
                .insert(pair.address.clone());
        }
        self.tokens_by_pair.insert(
            pair.address.clone(),
            (pair.token0.address.clone(), pair.token1.address.clone()),
        );
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = &'a PairCreated>) -> Self {
        let mut index = TokenPairIndex::new();
        for pair in pairs {
            index.insert(pair);
        }
        index
    }

    /// Index of the pair records committed in a `pairs` store
    pub fn from_store(store: &Store) -> Result<Self, PipelineError> {
        let mut index = TokenPairIndex::new();
        for (key, value) in store
            .table()
            .range(PAIR_KEY_PREFIX.to_string()..)
            .take_while(|(key, _)| key.starts_with(PAIR_KEY_PREFIX))
        {
            let pair: PairCreated = serde_json::from_slice(value).map_err(|err| {
                PipelineError::InvalidRecord {
                    block: store.range().end,
                    reason: format!("pair record {} of store {}: {}", key, store.name(), err),
                }
            })?;
            index.insert(&pair);
        }
        Ok(index)
    }

    /// Pairs trading `token`, sorted by address
    pub fn pairs_of<'a>(&'a self, token: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs_by_token
            .get(token)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn tokens_of(&self, pair: &str) -> Option<(&str, &str)> {
        self.tokens_by_pair
            .get(pair)
            .map(|(token0, token1)| (token0.as_str(), token1.as_str()))
    }

    pub fn contains_pair(&self, pair: &str) -> bool {
        self.tokens_by_pair.contains_key(pair)
    }

    /// Number of indexed pairs
    pub fn len(&self) -> usize {
        self.tokens_by_pair.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens_by_pair.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Token;
    use sparkle_state_exports::MergeStrategy;

    fn pair(address: &str, token0: &str, token1: &str) -> PairCreated {
        let token = |address: &str| Token {
            address: address.to_string(),
            symbol: address.to_uppercase(),
            decimals: 18,
        };
        PairCreated {
            address: address.to_string(),
            token0: token(token0),
            token1: token(token1),
            transaction: format!("0xtx{}", address),
            log_ordinal: 1,
        }
    }

    #[test]
    fn lookups() {
        let pairs = [pair("0xp1", "wbnb", "cake"), pair("0xp2", "busd", "wbnb")];
        let index = TokenPairIndex::from_pairs(&pairs);
        assert_eq!(index.len(), 2);
        assert_eq!(index.pairs_of("wbnb").collect::<Vec<_>>(), vec!["0xp1", "0xp2"]);
        assert_eq!(index.pairs_of("cake").collect::<Vec<_>>(), vec!["0xp1"]);
        assert_eq!(index.pairs_of("nothing").count(), 0);
        assert_eq!(index.tokens_of("0xp2"), Some(("busd", "wbnb")));
        assert!(!index.contains_pair("0xp3"));
    }

    #[test]
    fn tokens_key_is_symmetric() {
        assert_eq!(tokens_key("b", "a"), tokens_key("a", "b"));
        assert_eq!(tokens_key("a", "b"), "tokens:a:b");
    }

    #[test]
    fn built_from_pairs_store() {
        let mut store = Store::new("pairs", MergeStrategy::LastKey, 0);
        let p = pair("0xp1", "wbnb", "cake");
        store
            .set(1, pair_key(&p.address), serde_json::to_vec(&p).unwrap())
            .unwrap();
        store
            .set(1, tokens_key("wbnb", "cake"), p.address.clone())
            .unwrap();
        store.set(1, "pairz", "not a pair").unwrap();
        store.commit_block(0).unwrap();

        let index = TokenPairIndex::from_store(&store).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.tokens_of("0xp1"), Some(("wbnb", "cake")));
    }
}
