//! Loot distribution: method settings, the per-container policy decision,
//! and the round-robin looter rotation. Contested rolls live in [`roll`].

pub mod roll;

pub use roll::{Roll, Rolls};

use crate::group::Group;
use crate::hooks::Hooks;
use crate::{ItemId, ObjectId, PlayerId};
use data_runtime::specs::items::ItemDb;
use net_core::message::GroupMessage;
use std::sync::{Arc, Mutex};

/// Group loot setting, as configured by the leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LootMethod {
    FreeForAll,
    RoundRobin,
    Master,
    GroupLoot,
    NeedBeforeGreed,
}

impl LootMethod {
    pub fn as_u8(self) -> u8 {
        match self {
            LootMethod::FreeForAll => 0,
            LootMethod::RoundRobin => 1,
            LootMethod::Master => 2,
            LootMethod::GroupLoot => 3,
            LootMethod::NeedBeforeGreed => 4,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LootMethod::FreeForAll,
            1 => LootMethod::RoundRobin,
            2 => LootMethod::Master,
            4 => LootMethod::NeedBeforeGreed,
            _ => LootMethod::GroupLoot,
        }
    }
}

/// Distribution rule resolved once, when a container is opened. The
/// group's method may change afterwards without affecting containers
/// already in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LootPolicy {
    FreeForAll,
    RoundRobin,
    Master { master: PlayerId },
    Roll { need_before_greed: bool },
}

impl LootPolicy {
    pub fn for_group(group: &Group) -> Self {
        match group.loot_method() {
            LootMethod::FreeForAll => LootPolicy::FreeForAll,
            LootMethod::RoundRobin => LootPolicy::RoundRobin,
            LootMethod::Master => match group.looter() {
                Some(master) => LootPolicy::Master { master },
                // master unset or gone: degrade rather than lock the loot
                None => LootPolicy::RoundRobin,
            },
            LootMethod::GroupLoot => LootPolicy::Roll { need_before_greed: false },
            LootMethod::NeedBeforeGreed => LootPolicy::Roll { need_before_greed: true },
        }
    }
}

/// One droppable stack inside a container.
#[derive(Debug, Clone)]
pub struct LootItem {
    pub item: ItemId,
    pub count: u32,
    /// Quest/conditional drops visible to everyone regardless of method.
    pub free_for_all: bool,
    /// Withheld from regular pickup while a roll or master decision is
    /// pending.
    pub blocked: bool,
    pub looted: bool,
}

impl LootItem {
    pub fn new(item: ItemId, count: u32) -> Self {
        Self { item, count, free_for_all: false, blocked: false, looted: false }
    }
}

/// Contents of one lootable world object.
#[derive(Debug)]
pub struct Loot {
    pub object: ObjectId,
    pub items: Vec<LootItem>,
    /// Count of items not yet looted; the container despawns at zero.
    pub unlooted: usize,
}

impl Loot {
    pub fn new(object: ObjectId, items: Vec<LootItem>) -> Self {
        let unlooted = items.iter().filter(|i| !i.looted).count();
        Self { object, items, unlooted }
    }

    pub fn is_empty(&self) -> bool {
        self.unlooted == 0
    }
}

/// Loot containers outlive the group lock (rolls hold weak references to
/// them), so they are shared and individually locked.
pub type SharedLoot = Arc<Mutex<Loot>>;

impl Group {
    /// Apply the group's distribution rule to a freshly opened container.
    /// Called exactly once per container, by whoever opens it first.
    pub fn open_loot(
        &mut self,
        loot: &SharedLoot,
        items: &ItemDb,
        rolls: &mut Rolls,
        hooks: &Hooks,
    ) {
        let policy = LootPolicy::for_group(self);
        match policy {
            LootPolicy::FreeForAll => {}
            LootPolicy::RoundRobin => {
                self.update_looter(hooks);
                if let Some(looter) = self.looter {
                    let object = match loot.lock() {
                        Ok(l) => l.object,
                        Err(_) => return,
                    };
                    self.broadcast(
                        GroupMessage::LootList { object: object.0, looter: looter.0 },
                        None,
                        None,
                        hooks,
                    );
                }
            }
            LootPolicy::Master { master } => self.assign_master_loot(loot, items, master, hooks),
            LootPolicy::Roll { need_before_greed } => {
                self.start_rolls(loot, items, need_before_greed, rolls, hooks)
            }
        }
    }

    /// Withhold every at-threshold item and hand the master looter the
    /// list of players they may assign those items to.
    fn assign_master_loot(
        &self,
        loot: &SharedLoot,
        items: &ItemDb,
        master: PlayerId,
        hooks: &Hooks,
    ) {
        let Ok(mut l) = loot.lock() else { return };
        let mut withheld: Vec<ItemId> = Vec::new();
        for it in l.items.iter_mut() {
            if it.looted || it.free_for_all {
                continue;
            }
            let Some(proto) = items.get(it.item.0) else {
                log::warn!("loot: unknown item {:?}, skipping", it.item);
                continue;
            };
            if proto.quality >= self.loot_threshold {
                it.blocked = true;
                withheld.push(it.item);
            }
        }
        if withheld.is_empty() || !hooks.sessions.is_online(master) {
            return;
        }
        let candidates: Vec<u64> = self
            .members
            .iter()
            .map(|m| m.player)
            .filter(|&p| {
                hooks.sessions.is_online(p)
                    && hooks.loot.in_loot_range(p)
                    && withheld.iter().any(|&it| hooks.loot.may_loot(p, it))
            })
            .map(|p| p.0)
            .collect();
        hooks.notify.send(master, GroupMessage::MasterLootList { candidates });
    }

    /// Open a contested roll for every at-threshold item with at least two
    /// eligible voters. Items with fewer stay unblocked and fall to
    /// regular pickup.
    fn start_rolls(
        &self,
        loot: &SharedLoot,
        items: &ItemDb,
        need_before_greed: bool,
        rolls: &mut Rolls,
        hooks: &Hooks,
    ) {
        let Ok(mut l) = loot.lock() else { return };
        for slot in 0..l.items.len() {
            let it = &l.items[slot];
            if it.looted || it.free_for_all || it.blocked {
                continue;
            }
            let Some(proto) = items.get(it.item.0) else {
                log::warn!("loot: unknown item {:?}, skipping", it.item);
                continue;
            };
            if proto.quality < self.loot_threshold {
                continue;
            }
            let voters: Vec<PlayerId> = self
                .members
                .iter()
                .map(|m| m.player)
                .filter(|&p| {
                    hooks.sessions.is_online(p)
                        && hooks.loot.may_loot(p, it.item)
                        && hooks.loot.in_loot_range(p)
                        && (!need_before_greed || hooks.loot.can_use(p, it.item))
                })
                .collect();
            if voters.len() < 2 {
                continue;
            }
            let item = it.item;
            let count = it.count;
            l.items[slot].blocked = true;
            rolls.create_roll(self, loot, slot, item, count, voters, hooks);
        }
    }

    /// Advance the round-robin pointer to the next online, in-range member
    /// after the current one, wrapping around. A stale pointer (looter no
    /// longer in the group) restarts the scan from the first slot.
    pub fn update_looter(&mut self, hooks: &Hooks) {
        let start = self
            .looter
            .and_then(|p| self.members.iter().position(|m| m.player == p))
            .map(|i| i + 1)
            .unwrap_or(0);
        let n = self.members.len();
        let next = (0..n)
            .map(|off| &self.members[(start + off) % n])
            .find(|m| hooks.sessions.is_online(m.player) && hooks.loot.in_loot_range(m.player))
            .map(|m| m.player);
        if next != self.looter {
            self.looter = next;
            self.persist_group(hooks);
        }
    }
}
