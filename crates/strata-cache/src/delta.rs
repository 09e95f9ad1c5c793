//! Per-entity merge of buffered deltas.

use std::collections::{BTreeMap, BTreeSet};

use strata_ecs::{SchemaId, Type, Value};

use crate::buffer::Delta;

/// Everything pending for one entity after merging its deltas.
///
/// Merge rules: a later set or unset of the same schema replaces the earlier
/// one, and a destroy wins over everything else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityDelta {
    /// The entity was reserved by the cache and has not been placed yet.
    pub created: bool,
    /// Pending values; `None` takes the schema's default on insert.
    pub sets: BTreeMap<SchemaId, Option<Value>>,
    /// Pending removals.
    pub unsets: BTreeSet<SchemaId>,
    /// Tombstone.
    pub destroyed: bool,
}

impl EntityDelta {
    /// Fold one delta into this entity's pending state.
    pub fn merge(&mut self, delta: Delta) {
        match delta {
            Delta::Make { ty, data, .. } => {
                self.created = true;
                self.merge_sets(&ty, data);
            }
            Delta::Set { ty, data, .. } => self.merge_sets(&ty, data),
            Delta::Unset { ty, .. } => {
                for &id in ty.iter() {
                    self.sets.remove(&id);
                    self.unsets.insert(id);
                }
            }
            Delta::Destroy { .. } => self.destroyed = true,
        }
    }

    fn merge_sets(&mut self, ty: &Type, data: Option<Vec<Option<Value>>>) {
        let mut values = data.map(Vec::into_iter);
        for &id in ty.iter() {
            let value = values.as_mut().and_then(Iterator::next).flatten();
            self.unsets.remove(&id);
            self.sets.insert(id, value);
        }
    }

    /// Type and data of the pending sets, in type order.
    pub fn set_type(&self) -> (Type, Vec<Option<Value>>) {
        let ty = Type::normalize(self.sets.keys().copied());
        let data = self.sets.values().cloned().collect();
        (ty, data)
    }

    /// Type of the pending removals.
    pub fn unset_type(&self) -> Type {
        Type::normalize(self.unsets.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use strata_ecs::{Entity, Generation};

    use super::*;

    fn ids() -> (Entity, SchemaId, SchemaId) {
        (
            Entity::new(0, Generation::new()),
            SchemaId::from_raw(1),
            SchemaId::from_raw(2),
        )
    }

    #[test]
    fn test_later_set_wins() {
        let (entity, a, _) = ids();
        let mut delta = EntityDelta::default();

        delta.merge(Delta::Set {
            entity,
            ty: Type::from([a]),
            data: Some(vec![Some(Value::Number(1.0))]),
        });
        delta.merge(Delta::Set {
            entity,
            ty: Type::from([a]),
            data: Some(vec![Some(Value::Number(2.0))]),
        });

        assert_eq!(delta.sets[&a], Some(Value::Number(2.0)));
    }

    #[test]
    fn test_set_and_unset_cancel() {
        let (entity, a, b) = ids();
        let mut delta = EntityDelta::default();

        delta.merge(Delta::Set {
            entity,
            ty: Type::from([a, b]),
            data: None,
        });
        delta.merge(Delta::Unset {
            entity,
            ty: Type::from([a]),
        });
        assert_eq!(delta.set_type().0, Type::from([b]));
        assert_eq!(delta.unset_type(), Type::from([a]));

        delta.merge(Delta::Set {
            entity,
            ty: Type::from([a]),
            data: None,
        });
        assert_eq!(delta.set_type().0, Type::from([a, b]));
        assert!(delta.unset_type().is_empty());
    }

    #[test]
    fn test_destroy_wins() {
        let (entity, a, _) = ids();
        let mut delta = EntityDelta::default();

        delta.merge(Delta::Destroy { entity });
        delta.merge(Delta::Set {
            entity,
            ty: Type::from([a]),
            data: None,
        });

        assert!(delta.destroyed);
    }
}
