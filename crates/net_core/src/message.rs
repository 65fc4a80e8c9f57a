//! Structured notifications. One enum covers roster fan-out, the roll
//! protocol, markers, and the odd per-player failure signal.

use serde::{Deserialize, Serialize};

/// A vote in a loot roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollVote {
    Pass,
    Need,
    Greed,
}

/// Why a won item could not be deposited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquipFail {
    InventoryFull,
    CantCarry,
}

/// One member as seen in a roster update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberLine {
    pub player: u64,
    pub name: String,
    pub online: bool,
    pub subgroup: u8,
    pub flags: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupMessage {
    /// Per-recipient roster view, sent after every membership or
    /// leadership mutation. `members` excludes the recipient.
    RosterUpdate {
        is_raid: bool,
        battleground: bool,
        your_subgroup: u8,
        your_flags: u8,
        members: Vec<MemberLine>,
        leader: u64,
        loot_method: u8,
        looter: u64,
        loot_threshold: u8,
        difficulty: u8,
    },
    /// The recipient is no longer in any group.
    RosterCleared,
    /// The recipient was explicitly uninvited (vs. leaving).
    Uninvited,
    GroupDestroyed,
    LeaderChanged {
        name: String,
    },
    Marker {
        slot: u8,
        target: u64,
    },
    MarkerList {
        markers: Vec<(u8, u64)>,
    },
    DungeonDifficulty {
        difficulty: u8,
    },
    InstanceReset {
        map: u32,
        ok: bool,
    },
    RollStarted {
        roll: u64,
        item: u32,
        voters: u32,
        countdown_ms: u64,
    },
    /// A vote was cast. Pass votes are announced as they land; need and
    /// greed reveals wait for resolution.
    VoteCast {
        roll: u64,
        player: u64,
        vote: RollVote,
    },
    /// A random draw revealed during resolution.
    RollDraw {
        roll: u64,
        player: u64,
        value: u8,
        vote: RollVote,
    },
    RollWon {
        roll: u64,
        player: u64,
        value: u8,
        vote: RollVote,
    },
    AllPassed {
        roll: u64,
        item: u32,
    },
    EquipFailure {
        item: u32,
        reason: EquipFail,
    },
    /// Round-robin: who loots the freshly opened object.
    LootList {
        object: u64,
        looter: u64,
    },
    /// Master loot: player ids the master looter may assign the withheld
    /// items to.
    MasterLootList {
        candidates: Vec<u64>,
    },
}
