//! Ordered-Set Primitive
//!
//! A namespace-keyed container of distinct members, each carrying an `f64`
//! sort score. Members sharing a score keep their first-insertion order.
//!
//! Every index the cache maintains is one namespace of a `VSet` plus a rule
//! for computing each record's score: equality indexes use the implicit
//! increasing score of [`VSet::add`], range indexes use the field value via
//! [`VSet::sort_add`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{OrmError, Result};

// == Score ==
/// Totally ordered wrapper around `f64`.
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0).is_eq()
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Position of a member: its score, then its insertion sequence.
type Slot = (Score, u64);

// Sequence numbers start at 1 so 0 and u64::MAX can serve as bound sentinels.
const FIRST_SEQ: u64 = 1;

// == Namespace ==
#[derive(Debug)]
struct Namespace<M> {
    order: BTreeMap<Slot, M>,
    members: HashMap<M, Slot>,
    next_seq: u64,
    last_implicit: f64,
}

impl<M: Eq + Hash + Clone> Namespace<M> {
    fn new() -> Self {
        Self {
            order: BTreeMap::new(),
            members: HashMap::new(),
            next_seq: FIRST_SEQ,
            last_implicit: 0.0,
        }
    }

    fn insert_new(&mut self, score: f64, member: M) {
        let slot = (Score(score), self.next_seq);
        self.next_seq += 1;
        self.order.insert(slot, member.clone());
        self.members.insert(member, slot);
    }

    fn add(&mut self, member: M) -> bool {
        if self.members.contains_key(&member) {
            return false;
        }
        let top = self
            .order
            .keys()
            .next_back()
            .map(|(score, _)| score.0)
            .filter(|score| score.is_finite())
            .unwrap_or(f64::NEG_INFINITY);
        let score = self.last_implicit.max(top) + 1.0;
        self.last_implicit = score;
        self.insert_new(score, member);
        true
    }

    fn sort_add(&mut self, score: f64, member: M) -> bool {
        match self.members.get(&member).copied() {
            Some(slot) => {
                self.order.remove(&slot);
                let moved = (Score(score), slot.1);
                self.order.insert(moved, member.clone());
                self.members.insert(member, moved);
                false
            }
            None => {
                self.insert_new(score, member);
                true
            }
        }
    }

    fn remove(&mut self, member: &M) -> bool {
        match self.members.remove(member) {
            Some(slot) => {
                self.order.remove(&slot);
                true
            }
            None => false,
        }
    }

    fn by_score(&self, min: Bound<f64>, max: Bound<f64>) -> std::collections::btree_map::Range<'_, Slot, M> {
        self.order.range(slot_bounds(min, max))
    }
}

/// Maps score bounds onto slot bounds, collapsing empty ranges to a
/// well-formed empty one so `BTreeMap::range` never panics.
fn slot_bounds(min: Bound<f64>, max: Bound<f64>) -> (Bound<Slot>, Bound<Slot>) {
    let lower = match min {
        Bound::Included(score) => Bound::Included((Score(score), 0)),
        Bound::Excluded(score) => Bound::Excluded((Score(score), u64::MAX)),
        Bound::Unbounded => Bound::Unbounded,
    };
    let upper = match max {
        Bound::Included(score) => Bound::Included((Score(score), u64::MAX)),
        Bound::Excluded(score) => Bound::Excluded((Score(score), 0)),
        Bound::Unbounded => Bound::Unbounded,
    };

    let inverted = match (&lower, &upper) {
        (
            Bound::Included(lo) | Bound::Excluded(lo),
            Bound::Included(hi) | Bound::Excluded(hi),
        ) => lo > hi,
        _ => false,
    };

    if inverted {
        let empty = (Score(f64::NEG_INFINITY), 0);
        (Bound::Included(empty), Bound::Excluded(empty))
    } else {
        (lower, upper)
    }
}

// == Window Validation ==
/// Validates an `(offset, count)` window, `count == -1` meaning "to the end".
pub fn check_window(offset: i64, count: i64) -> Result<(usize, usize)> {
    if offset < 0 {
        return Err(OrmError::InvalidArgument(format!(
            "offset must be non-negative, got {}",
            offset
        )));
    }
    let count = match count {
        -1 => usize::MAX,
        c if c < -1 => {
            return Err(OrmError::InvalidArgument(format!(
                "count must be -1 or non-negative, got {}",
                c
            )))
        }
        c => usize::try_from(c).unwrap_or(usize::MAX),
    };
    Ok((usize::try_from(offset).unwrap_or(usize::MAX), count))
}

/// Rejects NaN bounds, which have no place in a score ordering.
pub fn check_bounds(min: Bound<f64>, max: Bound<f64>) -> Result<()> {
    for bound in [min, max] {
        if let Bound::Included(v) | Bound::Excluded(v) = bound {
            if v.is_nan() {
                return Err(OrmError::InvalidArgument("range bound is NaN".to_string()));
            }
        }
    }
    Ok(())
}

fn page<'a, M, I>(members: I, offset: i64, count: i64) -> Result<Vec<M>>
where
    M: Clone + 'a,
    I: Iterator<Item = &'a M>,
{
    let (offset, count) = check_window(offset, count)?;
    Ok(members.skip(offset).take(count).cloned().collect())
}

// == VSet ==
/// Thread-safe ordered set keyed by namespace.
///
/// Each mutating call holds the internal lock for its whole duration, so a
/// multi-member `add` or `sort_add` is observed atomically by other callers.
#[derive(Debug)]
pub struct VSet<N = i64, M = i64> {
    spaces: Mutex<HashMap<N, Namespace<M>>>,
}

impl<N, M> Default for VSet<N, M>
where
    N: Eq + Hash + Clone,
    M: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<N, M> VSet<N, M>
where
    N: Eq + Hash + Clone,
    M: Eq + Hash + Clone,
{
    // == Constructor ==
    /// Creates an empty set with no namespaces.
    pub fn new() -> Self {
        Self {
            spaces: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<N, Namespace<M>>> {
        self.spaces.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // == Add ==
    /// Inserts members with strictly increasing implicit scores.
    ///
    /// Members already present keep their score. Returns how many were new.
    pub fn add<I>(&self, ns: &N, members: I) -> usize
    where
        I: IntoIterator<Item = M>,
    {
        let mut spaces = self.lock();
        let space = spaces.entry(ns.clone()).or_insert_with(Namespace::new);
        members.into_iter().filter(|m| space.add(m.clone())).count()
    }

    // == Sort Add ==
    /// Inserts `(score, member)` pairs, overwriting scores of existing members.
    ///
    /// Fails without applying anything if any score is NaN.
    pub fn sort_add<I>(&self, ns: &N, scored: I) -> Result<usize>
    where
        I: IntoIterator<Item = (f64, M)>,
    {
        let scored: Vec<(f64, M)> = scored.into_iter().collect();
        if scored.iter().any(|(score, _)| score.is_nan()) {
            return Err(OrmError::InvalidArgument("score is NaN".to_string()));
        }
        let mut spaces = self.lock();
        let space = spaces.entry(ns.clone()).or_insert_with(Namespace::new);
        Ok(scored
            .into_iter()
            .filter(|(score, member)| space.sort_add(*score, member.clone()))
            .count())
    }

    // == Remove ==
    /// Removes members; an emptied namespace is dropped. Returns how many were removed.
    pub fn remove<'a, I>(&self, ns: &N, members: I) -> usize
    where
        M: 'a,
        I: IntoIterator<Item = &'a M>,
    {
        let mut spaces = self.lock();
        let Some(space) = spaces.get_mut(ns) else {
            return 0;
        };
        let removed = members.into_iter().filter(|m| space.remove(m)).count();
        if space.members.is_empty() {
            spaces.remove(ns);
        }
        removed
    }

    /// Score of a member, if present.
    pub fn score(&self, ns: &N, member: &M) -> Option<f64> {
        self.lock()
            .get(ns)
            .and_then(|space| space.members.get(member))
            .map(|(score, _)| score.0)
    }

    /// Number of members in a namespace.
    pub fn card(&self, ns: &N) -> usize {
        self.lock().get(ns).map_or(0, |space| space.members.len())
    }

    // == Values ==
    /// Members in ascending score order, starting at `offset`.
    ///
    /// `count == -1` returns everything from `offset` to the end.
    pub fn values(&self, ns: &N, offset: i64, count: i64) -> Result<Vec<M>> {
        let spaces = self.lock();
        match spaces.get(ns) {
            Some(space) => page(space.order.values(), offset, count),
            None => page(std::iter::empty(), offset, count),
        }
    }

    /// Members in descending score order, starting at `offset`.
    pub fn values_rev(&self, ns: &N, offset: i64, count: i64) -> Result<Vec<M>> {
        let spaces = self.lock();
        match spaces.get(ns) {
            Some(space) => page(space.order.values().rev(), offset, count),
            None => page(std::iter::empty(), offset, count),
        }
    }

    // == Score Ranges ==
    /// Number of members whose score lies within the bounds.
    pub fn count_by_score(&self, ns: &N, min: Bound<f64>, max: Bound<f64>) -> Result<usize> {
        check_bounds(min, max)?;
        Ok(self
            .lock()
            .get(ns)
            .map_or(0, |space| space.by_score(min, max).count()))
    }

    /// Page of members within the bounds, ascending.
    pub fn range_by_score(
        &self,
        ns: &N,
        min: Bound<f64>,
        max: Bound<f64>,
        offset: i64,
        count: i64,
    ) -> Result<Vec<M>> {
        check_bounds(min, max)?;
        let spaces = self.lock();
        match spaces.get(ns) {
            Some(space) => page(space.by_score(min, max).map(|(_, m)| m), offset, count),
            None => page(std::iter::empty(), offset, count),
        }
    }

    /// Page of members within the bounds, descending.
    pub fn rev_range_by_score(
        &self,
        ns: &N,
        min: Bound<f64>,
        max: Bound<f64>,
        offset: i64,
        count: i64,
    ) -> Result<Vec<M>> {
        check_bounds(min, max)?;
        let spaces = self.lock();
        match spaces.get(ns) {
            Some(space) => page(space.by_score(min, max).rev().map(|(_, m)| m), offset, count),
            None => page(std::iter::empty(), offset, count),
        }
    }

    // == Namespace Management ==
    /// True if the namespace holds at least one member.
    pub fn contains_namespace(&self, ns: &N) -> bool {
        self.lock().contains_key(ns)
    }

    /// Drops a whole namespace.
    pub fn clear_namespace(&self, ns: &N) -> bool {
        self.lock().remove(ns).is_some()
    }

    /// Drops every namespace matching the predicate, returning how many went.
    pub fn remove_namespaces<F>(&self, mut matches: F) -> usize
    where
        F: FnMut(&N) -> bool,
    {
        let mut spaces = self.lock();
        let before = spaces.len();
        spaces.retain(|ns, _| !matches(ns));
        before - spaces.len()
    }

    /// Number of non-empty namespaces.
    pub fn namespace_count(&self) -> usize {
        self.lock().len()
    }
}
