//! Best-effort persistence seam. The core calls these fire-and-forget;
//! failures are logged by the caller and never unwind applied state.

use crate::records::{AwardRecord, BindingRecord, GroupRecord, MemberRecord};
use anyhow::Result;
use std::sync::Mutex;

pub trait GroupStore: Send + Sync {
    fn save_group(&self, rec: &GroupRecord) -> Result<()>;
    fn delete_group(&self, group: u64) -> Result<()>;
    fn save_member(&self, rec: &MemberRecord) -> Result<()>;
    fn delete_member(&self, group: u64, member: u64) -> Result<()>;
    fn save_binding(&self, rec: &BindingRecord) -> Result<()>;
    fn delete_binding(&self, group: u64, save: u64) -> Result<()>;
    fn save_award(&self, rec: &AwardRecord) -> Result<()>;
}

/// Store that drops everything. Battleground groups and tests that do not
/// care about persistence use this.
#[derive(Debug, Default)]
pub struct NullStore;

impl GroupStore for NullStore {
    fn save_group(&self, _rec: &GroupRecord) -> Result<()> {
        Ok(())
    }
    fn delete_group(&self, _group: u64) -> Result<()> {
        Ok(())
    }
    fn save_member(&self, _rec: &MemberRecord) -> Result<()> {
        Ok(())
    }
    fn delete_member(&self, _group: u64, _member: u64) -> Result<()> {
        Ok(())
    }
    fn save_binding(&self, _rec: &BindingRecord) -> Result<()> {
        Ok(())
    }
    fn delete_binding(&self, _group: u64, _save: u64) -> Result<()> {
        Ok(())
    }
    fn save_award(&self, _rec: &AwardRecord) -> Result<()> {
        Ok(())
    }
}

/// Everything the store was asked to do, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Group(GroupRecord),
    DeleteGroup(u64),
    Member(MemberRecord),
    DeleteMember { group: u64, member: u64 },
    Binding(BindingRecord),
    DeleteBinding { group: u64, save: u64 },
    Award(AwardRecord),
}

/// In-memory store for tests and the demo harness.
#[derive(Debug, Default)]
pub struct MemStore {
    events: Mutex<Vec<StoreEvent>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, ev: StoreEvent) {
        if let Ok(mut evs) = self.events.lock() {
            evs.push(ev);
        }
    }

    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<StoreEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Drain recorded events.
    pub fn take(&self) -> Vec<StoreEvent> {
        self.events.lock().map(|mut e| std::mem::take(&mut *e)).unwrap_or_default()
    }
}

impl GroupStore for MemStore {
    fn save_group(&self, rec: &GroupRecord) -> Result<()> {
        self.push(StoreEvent::Group(rec.clone()));
        Ok(())
    }
    fn delete_group(&self, group: u64) -> Result<()> {
        self.push(StoreEvent::DeleteGroup(group));
        Ok(())
    }
    fn save_member(&self, rec: &MemberRecord) -> Result<()> {
        self.push(StoreEvent::Member(rec.clone()));
        Ok(())
    }
    fn delete_member(&self, group: u64, member: u64) -> Result<()> {
        self.push(StoreEvent::DeleteMember { group, member });
        Ok(())
    }
    fn save_binding(&self, rec: &BindingRecord) -> Result<()> {
        self.push(StoreEvent::Binding(rec.clone()));
        Ok(())
    }
    fn delete_binding(&self, group: u64, save: u64) -> Result<()> {
        self.push(StoreEvent::DeleteBinding { group, save });
        Ok(())
    }
    fn save_award(&self, rec: &AwardRecord) -> Result<()> {
        self.push(StoreEvent::Award(rec.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_store_records_in_order() {
        let store = MemStore::new();
        store.delete_group(3).unwrap();
        store
            .save_member(&MemberRecord { leader: 3, member: 9, assistant: false, subgroup: 0 })
            .unwrap();
        let evs = store.take();
        assert_eq!(evs.len(), 2);
        assert_eq!(evs[0], StoreEvent::DeleteGroup(3));
        assert!(store.events().is_empty());
    }
}
