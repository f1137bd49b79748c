use std::ops::{Index, IndexMut};

use slotmap::SlotMap;
use tracing::warn;

use super::window::{GroupId, StackId, WindowKey, WindowRecord};
use crate::common::collections::HashMap;

/// Arena of window records with id and group lookup.
///
/// Groups are an index keyed by [`GroupId`]; neither windows nor groups own
/// each other, so the window/group relationship stays acyclic as data. A
/// single store can back the stacks of several screens.
#[derive(Debug, Default)]
pub struct WindowStore {
    windows: SlotMap<WindowKey, WindowRecord>,
    by_id: HashMap<StackId, WindowKey>,
    groups: HashMap<GroupId, Vec<WindowKey>>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record and returns its key. The record's server id must
    /// be unique among live records.
    pub fn insert(&mut self, record: WindowRecord) -> WindowKey {
        debug_assert!(
            !self.by_id.contains_key(&record.id),
            "window {} registered twice",
            record.id
        );
        if self.by_id.contains_key(&record.id) {
            warn!(window = %record.id, "window id already registered; replacing the lookup entry");
        }
        let id = record.id;
        let group = record.group;
        let key = self.windows.insert(record);
        self.by_id.insert(id, key);
        if let Some(group) = group {
            self.groups.entry(group).or_default().push(key);
        }
        key
    }

    pub fn remove(&mut self, key: WindowKey) -> Option<WindowRecord> {
        let record = self.windows.remove(key)?;
        self.by_id.remove(&record.id);
        if let Some(group) = record.group {
            self.unindex_group(group, key);
        }
        Some(record)
    }

    pub fn contains(&self, key: WindowKey) -> bool {
        self.windows.contains_key(key)
    }

    pub fn contains_id(&self, id: StackId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn key_of(&self, id: StackId) -> Option<WindowKey> {
        self.by_id.get(&id).copied()
    }

    pub fn get(&self, key: WindowKey) -> Option<&WindowRecord> {
        self.windows.get(key)
    }

    pub fn get_mut(&mut self, key: WindowKey) -> Option<&mut WindowRecord> {
        self.windows.get_mut(key)
    }

    /// Windows sharing a group, in registration order.
    pub fn group_members(&self, group: GroupId) -> &[WindowKey] {
        self.groups.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Moves a window between groups, keeping the group index consistent.
    pub fn set_group(&mut self, key: WindowKey, group: Option<GroupId>) {
        let Some(record) = self.windows.get_mut(key) else {
            warn!("set_group on an unknown window");
            return;
        };
        let old = record.group;
        if old == group {
            return;
        }
        record.group = group;
        if let Some(old) = old {
            self.unindex_group(old, key);
        }
        if let Some(new) = group {
            self.groups.entry(new).or_default().push(key);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (WindowKey, &WindowRecord)> {
        self.windows.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (WindowKey, &mut WindowRecord)> {
        self.windows.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    fn unindex_group(&mut self, group: GroupId, key: WindowKey) {
        if let Some(members) = self.groups.get_mut(&group) {
            members.retain(|&k| k != key);
            if members.is_empty() {
                self.groups.remove(&group);
            }
        }
    }
}

impl Index<WindowKey> for WindowStore {
    type Output = WindowRecord;

    fn index(&self, key: WindowKey) -> &Self::Output {
        &self.windows[key]
    }
}

impl IndexMut<WindowKey> for WindowStore {
    fn index_mut(&mut self, key: WindowKey) -> &mut Self::Output {
        &mut self.windows[key]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::window::WindowKind;

    fn record(id: u64) -> WindowRecord {
        WindowRecord::new(StackId::new(id), WindowKind::Normal)
    }

    #[test]
    fn insert_and_lookup() {
        let mut store = WindowStore::new();
        let key = store.insert(record(7));
        assert_eq!(store.key_of(StackId::new(7)), Some(key));
        assert!(store.contains_id(StackId::new(7)));
        assert_eq!(store[key].id, StackId::new(7));
    }

    #[test]
    fn remove_clears_lookup() {
        let mut store = WindowStore::new();
        let key = store.insert(record(7));
        let removed = store.remove(key);
        assert_eq!(removed.map(|r| r.id), Some(StackId::new(7)));
        assert!(!store.contains_id(StackId::new(7)));
        assert!(store.get(key).is_none());
    }

    #[test]
    fn group_index_follows_membership() {
        let mut store = WindowStore::new();
        let group = GroupId(1);
        let mut a = record(1);
        a.group = Some(group);
        let a = store.insert(a);
        let b = store.insert(record(2));

        assert_eq!(store.group_members(group), &[a]);

        store.set_group(b, Some(group));
        assert_eq!(store.group_members(group), &[a, b]);

        store.set_group(a, None);
        assert_eq!(store.group_members(group), &[b]);

        store.remove(b);
        assert!(store.group_members(group).is_empty());
    }
}
