//! Serde record types handed to the persistence store. Field sets mirror
//! the durable group state: one row per group, per member, per instance
//! binding, plus loot awards.

use serde::{Deserialize, Serialize};

/// Durable group attributes, keyed by leader id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub leader: u64,
    pub main_tank: Option<u64>,
    pub main_assistant: Option<u64>,
    pub loot_method: u8,
    pub looter: u64,
    pub loot_threshold: u8,
    pub markers: [u64; 8],
    pub is_raid: bool,
    pub difficulty: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub leader: u64,
    pub member: u64,
    pub assistant: bool,
    pub subgroup: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingRecord {
    pub leader: u64,
    pub save: u64,
    pub map: u32,
    pub difficulty: u8,
    pub permanent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardRecord {
    pub group: u64,
    pub item: u32,
    pub count: u32,
    pub winner: u64,
}
