//! Authoritative group/raid coordination core.
//!
//! A `Group` owns its member slots, subgroup counters, leader pointer,
//! target markers, and instance bindings; the `GroupManager` serializes
//! mutation per group, reference-counts shared instance saves across
//! groups, and drives succession and roll deadlines from the world tick.

pub mod group;
pub mod hooks;
pub mod instance;
pub mod leader;
pub mod loot;
pub mod manager;
pub mod roster;
pub mod subgroup;

pub use group::{Group, GroupKind};
pub use hooks::{Hooks, LootHooks, Notifier, PersonalBind, SessionDirectory};
pub use instance::{InstanceBinding, ResetReason, SaveRefChange, SaveRegistry};
pub use loot::{Loot, LootItem, LootMethod, LootPolicy, SharedLoot};
pub use manager::GroupManager;
pub use roster::{AddMemberError, RemoveOutcome};

/// Capacity of one raid subgroup (also the size cap of a normal group).
pub const MAX_SUBGROUP_SIZE: u8 = 5;
/// Number of subgroups in a raid.
pub const MAX_RAID_SUBGROUPS: u8 = 8;
/// Hard raid size ceiling.
pub const MAX_RAID_SIZE: usize = MAX_SUBGROUP_SIZE as usize * MAX_RAID_SUBGROUPS as usize;
/// Raid target marker slots.
pub const MARKER_SLOTS: usize = 8;

pub const MEMBER_FLAG_ASSISTANT: u8 = 0x01;
pub const MEMBER_FLAG_MAINTANK: u8 = 0x02;
pub const MEMBER_FLAG_MAINASSIST: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SaveId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RollId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(pub u32);

/// Handle of some lootable world object (creature corpse, chest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u64);

/// World-entity handle used by raid target markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(pub u64);

/// Dungeon difficulty tier. Maps that have no heroic mode collapse onto
/// `Normal` for binding purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Difficulty {
    Normal,
    Heroic,
}

impl Difficulty {
    pub const COUNT: usize = 2;

    pub fn index(self) -> usize {
        match self {
            Difficulty::Normal => 0,
            Difficulty::Heroic => 1,
        }
    }

    pub fn as_u8(self) -> u8 {
        self.index() as u8
    }

    pub fn from_u8(v: u8) -> Self {
        if v == 1 {
            Difficulty::Heroic
        } else {
            Difficulty::Normal
        }
    }

    pub fn both() -> [Difficulty; Self::COUNT] {
        [Difficulty::Normal, Difficulty::Heroic]
    }
}
