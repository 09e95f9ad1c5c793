//! Types: normalized sets of schema ids.
//!
//! A [`Type`] is strictly ascending, which is what makes it usable as an
//! archetype identity and lets every set operation run as a single merge
//! pass over two sorted slices.

use std::{cmp::Ordering, fmt, ops::Deref};

use smallvec::SmallVec;

use crate::{
    error::{EcsError, EcsResult},
    schema::SchemaId,
};

/// A strictly ascending, duplicate-free list of schema ids.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type(SmallVec<[SchemaId; 8]>);

impl Type {
    /// The empty type, identifying the root archetype.
    #[must_use]
    pub fn empty() -> Self {
        Self(SmallVec::new())
    }

    /// Sort and deduplicate arbitrary ids into a type.
    pub fn normalize(ids: impl IntoIterator<Item = SchemaId>) -> Self {
        let mut ids: SmallVec<[SchemaId; 8]> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self(ids)
    }

    /// Accept ids that are already normalized, rejecting anything else.
    pub fn from_sorted(ids: &[SchemaId]) -> EcsResult<Self> {
        if is_normalized(ids) {
            Ok(Self(ids.iter().copied().collect()))
        } else {
            Err(EcsError::UnnormalizedType(
                ids.iter().map(|id| id.as_raw()).collect(),
            ))
        }
    }

    /// The schema ids, ascending.
    #[must_use]
    pub fn ids(&self) -> &[SchemaId] {
        &self.0
    }

    /// Check if the type contains `id`.
    #[must_use]
    pub fn contains(&self, id: SchemaId) -> bool {
        self.0.binary_search(&id).is_ok()
    }

    /// Position of `id` within the type.
    #[must_use]
    pub fn position(&self, id: SchemaId) -> Option<usize> {
        self.0.binary_search(&id).ok()
    }

    /// A copy of this type with `id` inserted at its sorted position.
    #[must_use]
    pub fn with(&self, id: SchemaId) -> Self {
        let mut ids = self.0.clone();
        if let Err(at) = ids.binary_search(&id) {
            ids.insert(at, id);
        }
        Self(ids)
    }

    /// A copy of this type with `id` removed.
    #[must_use]
    pub fn without(&self, id: SchemaId) -> Self {
        let mut ids = self.0.clone();
        if let Ok(at) = ids.binary_search(&id) {
            ids.remove(at);
        }
        Self(ids)
    }

    /// Every id in either type.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut out = SmallVec::with_capacity(self.len() + other.len());
        let (mut i, mut j) = (0, 0);
        while i < self.len() && j < other.len() {
            match self.0[i].cmp(&other.0[j]) {
                Ordering::Less => {
                    out.push(self.0[i]);
                    i += 1;
                }
                Ordering::Greater => {
                    out.push(other.0[j]);
                    j += 1;
                }
                Ordering::Equal => {
                    out.push(self.0[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&self.0[i..]);
        out.extend_from_slice(&other.0[j..]);
        Self(out)
    }

    /// Every id in this type that is not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        let mut out = SmallVec::new();
        let mut j = 0;
        for &id in &self.0 {
            while j < other.len() && other.0[j] < id {
                j += 1;
            }
            if j < other.len() && other.0[j] == id {
                continue;
            }
            out.push(id);
        }
        Self(out)
    }

    /// Check if every id of `other` is in this type.
    #[must_use]
    pub fn is_equal_or_superset_of(&self, other: &Self) -> bool {
        let mut i = 0;
        for &id in &other.0 {
            loop {
                match self.0.get(i) {
                    None => return false,
                    Some(&mine) if mine < id => i += 1,
                    Some(&mine) if mine == id => break,
                    Some(_) => return false,
                }
            }
            i += 1;
        }
        true
    }

    /// Strict superset: contains `other` and at least one more id.
    #[must_use]
    pub fn is_superset_of(&self, other: &Self) -> bool {
        self.len() > other.len() && self.is_equal_or_superset_of(other)
    }

    /// Strict subset: contained in `other`, which has at least one more id.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        other.is_superset_of(self)
    }

    /// If `self` is `other` plus exactly one id, that id.
    ///
    /// Scans both types for the first point where they diverge; the rest of
    /// `self` must then line up with the rest of `other`.
    #[must_use]
    pub fn single_extra(&self, other: &Self) -> Option<SchemaId> {
        if self.len() != other.len() + 1 {
            return None;
        }
        let split = self
            .0
            .iter()
            .zip(other.0.iter())
            .position(|(a, b)| a != b)
            .unwrap_or(other.len());
        (self.0[split + 1..] == other.0[split..]).then_some(self.0[split])
    }
}

/// Check that `ids` is strictly ascending.
#[must_use]
pub fn is_normalized(ids: &[SchemaId]) -> bool {
    ids.windows(2).all(|pair| pair[0] < pair[1])
}

impl Deref for Type {
    type Target = [SchemaId];

    fn deref(&self) -> &[SchemaId] {
        &self.0
    }
}

impl FromIterator<SchemaId> for Type {
    fn from_iter<I: IntoIterator<Item = SchemaId>>(iter: I) -> Self {
        Self::normalize(iter)
    }
}

impl<const N: usize> From<[SchemaId; N]> for Type {
    fn from(ids: [SchemaId; N]) -> Self {
        Self::normalize(ids)
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|id| id.as_raw()))
            .finish()
    }
}
