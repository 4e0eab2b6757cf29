//! The grouping primitive shared by the aggregator and every detector.
//!
//! `Groups` partitions transactions by an arbitrary key while remembering the order in which
//! keys were first seen. Detectors differ only in the key they group by, the window they run
//! over each group and the predicate that decides what to flag, so those are passed in as
//! closures.

use crate::model::{Amount, Transaction};
use std::collections::HashMap;
use std::hash::Hash;

/// Transactions partitioned by key, in first-seen key order.
#[derive(Debug, Clone)]
pub(crate) struct Groups<'a, K> {
    keys: Vec<K>,
    index: HashMap<K, usize>,
    members: Vec<Vec<&'a Transaction>>,
}

impl<'a, K> Groups<'a, K>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn by<I, F>(transactions: I, mut key: F) -> Self
    where
        I: IntoIterator<Item = &'a Transaction>,
        F: FnMut(&Transaction) -> K,
    {
        let mut groups = Self {
            keys: Vec::new(),
            index: HashMap::new(),
            members: Vec::new(),
        };
        for txn in transactions {
            let k = key(txn);
            let ix = match groups.index.get(&k) {
                Some(ix) => *ix,
                None => {
                    let ix = groups.keys.len();
                    groups.index.insert(k.clone(), ix);
                    groups.keys.push(k);
                    groups.members.push(Vec::new());
                    ix
                }
            };
            groups.members[ix].push(txn);
        }
        groups
    }

    /// Sorts the members of every group by date. The sort is stable, so same-day transactions
    /// keep their input order.
    pub(crate) fn sorted_by_date(mut self) -> Self {
        for members in &mut self.members {
            members.sort_by_key(|t| t.date());
        }
        self
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn get(&self, key: &K) -> Option<&[&'a Transaction]> {
        self.index.get(key).map(|ix| self.members[*ix].as_slice())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, &[&'a Transaction])> + '_ {
        self.keys
            .iter()
            .zip(self.members.iter().map(Vec::as_slice))
    }

    /// Runs `window` over every group and collects whatever it flags.
    pub(crate) fn scan<O, W>(&self, mut window: W) -> Vec<O>
    where
        W: FnMut(&K, &[&'a Transaction]) -> Vec<O>,
    {
        self.iter()
            .flat_map(|(key, members)| window(key, members))
            .collect()
    }
}

/// Sums the amounts of `members`.
pub(crate) fn total(members: &[&Transaction]) -> Amount {
    members.iter().map(|t| t.amount()).sum()
}

/// Splits date-sorted `members` into maximal runs in which every consecutive pair satisfies
/// `linked`. Runs of a single transaction are dropped.
pub(crate) fn linked_runs<'a, F>(members: &[&'a Transaction], mut linked: F) -> Vec<Vec<&'a Transaction>>
where
    F: FnMut(&Transaction, &Transaction) -> bool,
{
    let mut runs = Vec::new();
    let mut current: Vec<&'a Transaction> = Vec::new();
    for &txn in members {
        let extends = current
            .last()
            .map_or(false, |previous| linked(previous, txn));
        if extends {
            current.push(txn);
        } else {
            if current.len() > 1 {
                runs.push(std::mem::take(&mut current));
            }
            current = vec![txn];
        }
    }
    if current.len() > 1 {
        runs.push(current);
    }
    runs
}
