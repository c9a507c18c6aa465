//! Directories group analysis objects for display. They have no effect on
//! processing.

use crate::pipeline::id::ObjectId;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Directory {
    pub id: ObjectId,
    pub name: String,
    pub event_id: ObjectId,
    pub user_level: i32,
    /// Ordered member ids. Members may be nodes or other directories.
    pub members: Vec<ObjectId>,
}

impl Directory {
    pub fn new(name: impl Into<String>, event_id: ObjectId) -> Self {
        Self {
            id: ObjectId::new(),
            name: name.into(),
            event_id,
            user_level: 0,
            members: Vec::new(),
        }
    }

    pub fn with_user_level(mut self, user_level: i32) -> Self {
        self.user_level = user_level;
        self
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.members.contains(id)
    }

    /// Append a member unless it is already present.
    pub fn push_member(&mut self, id: ObjectId) {
        if !self.contains(&id) {
            self.members.push(id);
        }
    }

    pub fn remove_member(&mut self, id: &ObjectId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != id);
        self.members.len() != before
    }

    /// Copy of this directory with a fresh id whose members are mapped
    /// through `id_map`. Members that were not cloned are dropped.
    pub fn clone_with_ids(&self, id_map: &HashMap<ObjectId, ObjectId>) -> Directory {
        Directory {
            id: ObjectId::new(),
            name: self.name.clone(),
            event_id: self.event_id,
            user_level: self.user_level,
            members: self
                .members
                .iter()
                .filter_map(|m| id_map.get(m).copied())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_retargets_and_drops_members() {
        let event = ObjectId::new();
        let (a, b, a2) = (ObjectId::new(), ObjectId::new(), ObjectId::new());
        let mut dir = Directory::new("raw", event);
        dir.push_member(a);
        dir.push_member(b);
        dir.push_member(a);
        assert_eq!(dir.members.len(), 2);

        let map = HashMap::from([(a, a2)]);
        let clone = dir.clone_with_ids(&map);
        assert_ne!(clone.id, dir.id);
        assert_eq!(clone.members, vec![a2]);
    }
}
