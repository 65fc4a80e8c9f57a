//! The `Group` aggregate: slots, leadership, markers, loot settings,
//! instance bindings. Mutation happens under the manager's per-group lock;
//! methods here take `&mut self` and never block on I/O.

use crate::hooks::Hooks;
use crate::instance::{InstanceBinding, ResetReason, SaveRefChange};
use crate::loot::LootMethod;
use crate::subgroup::SubGroupCounters;
use crate::{
    Difficulty, GroupId, MapId, PlayerId, UnitId, MARKER_SLOTS, MAX_RAID_SIZE, MAX_SUBGROUP_SIZE,
    MEMBER_FLAG_ASSISTANT, MEMBER_FLAG_MAINASSIST, MEMBER_FLAG_MAINTANK,
};
use data_runtime::records::GroupRecord;
use data_runtime::specs::items::ItemQuality;
use data_runtime::specs::maps::MapDb;
use net_core::message::{GroupMessage, MemberLine};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Normal,
    Raid,
}

/// One member, in join order. Join order doubles as succession order.
#[derive(Debug, Clone)]
pub struct MemberSlot {
    pub player: PlayerId,
    pub name: String,
    pub subgroup: u8,
    pub assistant: bool,
}

#[derive(Debug)]
pub struct Group {
    pub(crate) id: GroupId,
    pub(crate) kind: GroupKind,
    pub(crate) battleground: bool,
    pub(crate) leader: PlayerId,
    pub(crate) leader_name: String,
    pub(crate) members: Vec<MemberSlot>,
    /// Materialized for raid groups only.
    pub(crate) subgroups: Option<SubGroupCounters>,
    pub(crate) invites: HashMap<PlayerId, String>,
    pub(crate) loot_method: LootMethod,
    pub(crate) looter: Option<PlayerId>,
    pub(crate) loot_threshold: ItemQuality,
    pub(crate) difficulty: Difficulty,
    pub(crate) main_tank: Option<PlayerId>,
    pub(crate) main_assist: Option<PlayerId>,
    pub(crate) markers: [Option<UnitId>; MARKER_SLOTS],
    pub(crate) bindings: [HashMap<MapId, InstanceBinding>; Difficulty::COUNT],
    pub(crate) leader_offline_for: Option<Duration>,
    pub(crate) disbanded: bool,
}

impl Group {
    /// Create a group around its first member. The leader's personal
    /// instance bindings become the group's (battleground groups carry no
    /// bindings and are never persisted).
    pub fn create(
        id: GroupId,
        leader: PlayerId,
        leader_name: &str,
        battleground: bool,
        difficulty: Difficulty,
        hooks: &Hooks,
        changes: &mut Vec<SaveRefChange>,
    ) -> Self {
        let kind = if battleground { GroupKind::Raid } else { GroupKind::Normal };
        let mut g = Self {
            id,
            kind,
            battleground,
            leader,
            leader_name: leader_name.to_string(),
            members: Vec::new(),
            subgroups: matches!(kind, GroupKind::Raid).then(SubGroupCounters::new),
            invites: HashMap::new(),
            loot_method: LootMethod::GroupLoot,
            looter: Some(leader),
            loot_threshold: ItemQuality::Uncommon,
            difficulty,
            main_tank: None,
            main_assist: None,
            markers: [None; MARKER_SLOTS],
            bindings: Default::default(),
            leader_offline_for: None,
            disbanded: false,
        };
        if !battleground {
            g.merge_personal_binds(leader, hooks, changes);
            hooks.persist("create group", hooks.store.save_group(&g.group_record()));
        }
        let _ = g.add_member(leader, leader_name, false, None, hooks);
        metrics::counter!("group.created_total").increment(1);
        g
    }

    /// Rebuild a group from its stored record. Members and bindings are
    /// hydrated separately; callers must drop groups that finish loading
    /// with fewer than two members.
    pub fn from_record(id: GroupId, rec: &GroupRecord, leader_name: &str) -> Self {
        let kind = if rec.is_raid { GroupKind::Raid } else { GroupKind::Normal };
        let mut markers = [None; MARKER_SLOTS];
        for (i, &m) in rec.markers.iter().enumerate() {
            if m != 0 {
                markers[i] = Some(UnitId(m));
            }
        }
        Self {
            id,
            kind,
            battleground: false,
            leader: PlayerId(rec.leader),
            leader_name: leader_name.to_string(),
            members: Vec::new(),
            subgroups: matches!(kind, GroupKind::Raid).then(SubGroupCounters::new),
            invites: HashMap::new(),
            loot_method: LootMethod::from_u8(rec.loot_method),
            looter: (rec.looter != 0).then_some(PlayerId(rec.looter)),
            loot_threshold: ItemQuality::from_u8(rec.loot_threshold),
            difficulty: Difficulty::from_u8(rec.difficulty),
            main_tank: rec.main_tank.map(PlayerId),
            main_assist: rec.main_assistant.map(PlayerId),
            markers,
            bindings: Default::default(),
            // give a crashed leader a chance to keep their position
            leader_offline_for: Some(Duration::ZERO),
            disbanded: false,
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn is_raid(&self) -> bool {
        matches!(self.kind, GroupKind::Raid)
    }

    pub fn is_battleground(&self) -> bool {
        self.battleground
    }

    pub fn leader(&self) -> PlayerId {
        self.leader
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn loot_method(&self) -> LootMethod {
        self.loot_method
    }

    pub fn loot_threshold(&self) -> ItemQuality {
        self.loot_threshold
    }

    pub fn looter(&self) -> Option<PlayerId> {
        self.looter
    }

    pub fn members_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_disbanded(&self) -> bool {
        self.disbanded
    }

    pub fn is_member(&self, player: PlayerId) -> bool {
        self.members.iter().any(|m| m.player == player)
    }

    pub fn is_leader(&self, player: PlayerId) -> bool {
        self.leader == player
    }

    pub fn is_assistant(&self, player: PlayerId) -> bool {
        self.members
            .iter()
            .any(|m| m.player == player && m.assistant)
    }

    pub fn is_full(&self) -> bool {
        match self.kind {
            GroupKind::Normal => self.members.len() >= MAX_SUBGROUP_SIZE as usize,
            GroupKind::Raid => self.members.len() >= MAX_RAID_SIZE,
        }
    }

    pub fn member_subgroup(&self, player: PlayerId) -> Option<u8> {
        self.members
            .iter()
            .find(|m| m.player == player)
            .map(|m| m.subgroup)
    }

    pub fn same_subgroup(&self, a: PlayerId, b: PlayerId) -> bool {
        match (self.member_subgroup(a), self.member_subgroup(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// Assistant / main tank / main assist bitmask for a member.
    pub fn flags_of(&self, player: PlayerId) -> u8 {
        let mut flags = 0u8;
        if self.is_assistant(player) {
            flags |= MEMBER_FLAG_ASSISTANT;
        }
        if self.main_tank == Some(player) {
            flags |= MEMBER_FLAG_MAINTANK;
        }
        if self.main_assist == Some(player) {
            flags |= MEMBER_FLAG_MAINASSIST;
        }
        flags
    }

    /// Members in slot (succession) order.
    pub fn member_slots(&self) -> &[MemberSlot] {
        &self.members
    }

    pub fn set_assistant(&mut self, player: PlayerId, state: bool, hooks: &Hooks) -> bool {
        let Some(slot) = self.members.iter_mut().find(|m| m.player == player) else {
            return false;
        };
        slot.assistant = state;
        let subgroup = slot.subgroup;
        self.persist_member(player, state, subgroup, hooks);
        self.send_update(hooks);
        true
    }

    /// Main tank and main assist are mutually exclusive references.
    pub fn set_main_tank(&mut self, player: Option<PlayerId>, hooks: &Hooks) -> bool {
        if let Some(p) = player {
            if !self.is_member(p) {
                return false;
            }
            if self.main_assist == Some(p) {
                self.main_assist = None;
            }
        }
        self.main_tank = player;
        self.persist_group(hooks);
        true
    }

    pub fn set_main_assist(&mut self, player: Option<PlayerId>, hooks: &Hooks) -> bool {
        if let Some(p) = player {
            if !self.is_member(p) {
                return false;
            }
            if self.main_tank == Some(p) {
                self.main_tank = None;
            }
        }
        self.main_assist = player;
        self.persist_group(hooks);
        true
    }

    pub fn set_loot_method(
        &mut self,
        method: LootMethod,
        looter: Option<PlayerId>,
        threshold: ItemQuality,
        hooks: &Hooks,
    ) {
        self.loot_method = method;
        self.looter = looter;
        self.loot_threshold = threshold;
        self.persist_group(hooks);
        self.send_update(hooks);
    }

    /// One-directional conversion; counters are rebuilt from current
    /// membership and members keep their slot indices.
    pub fn convert_to_raid(&mut self, hooks: &Hooks) {
        if self.is_raid() {
            return;
        }
        self.kind = GroupKind::Raid;
        self.subgroups = Some(SubGroupCounters::from_members(
            self.members.iter().map(|m| m.subgroup),
        ));
        self.persist_group(hooks);
        self.send_update(hooks);
    }

    /// Set the dungeon difficulty and tell every live member. Resetting
    /// the now-stale bindings is composed by the manager.
    pub fn set_difficulty(&mut self, difficulty: Difficulty, hooks: &Hooks) {
        self.difficulty = difficulty;
        self.persist_group(hooks);
        for m in &self.members {
            if hooks.sessions.is_online(m.player) {
                hooks.notify.send(
                    m.player,
                    GroupMessage::DungeonDifficulty { difficulty: difficulty.as_u8() },
                );
            }
        }
    }

    /// Place a raid target marker. A target may occupy one slot at most;
    /// marking it elsewhere clears the old slot first.
    pub fn set_marker(&mut self, slot: u8, target: Option<UnitId>, hooks: &Hooks) {
        let idx = slot as usize;
        if idx >= MARKER_SLOTS {
            return;
        }
        if let Some(t) = target {
            for m in self.markers.iter_mut() {
                if *m == Some(t) {
                    *m = None;
                }
            }
        }
        self.markers[idx] = target;
        self.persist_group(hooks);
        self.broadcast(
            GroupMessage::Marker { slot, target: target.map(|t| t.0).unwrap_or(0) },
            None,
            None,
            hooks,
        );
    }

    /// Current marker assignments, for sessions that just joined or loaded.
    pub fn send_marker_list(&self, to: PlayerId, hooks: &Hooks) {
        let markers = self
            .markers
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.map(|t| (i as u8, t.0)))
            .collect();
        hooks.notify.send(to, GroupMessage::MarkerList { markers });
    }

    /// Tear the group down: detach every member, clear invites, release
    /// all instance bindings. Terminal state; no operation is valid after.
    /// The manager voids outstanding rolls before calling this.
    pub fn disband(
        &mut self,
        hide_destroy: bool,
        maps: &MapDb,
        resettable: &HashMap<crate::SaveId, bool>,
        hooks: &Hooks,
        changes: &mut Vec<SaveRefChange>,
    ) {
        for m in &self.members {
            if !hooks.sessions.is_online(m.player) {
                continue;
            }
            if !hide_destroy {
                hooks.notify.send(m.player, GroupMessage::GroupDestroyed);
            }
            hooks.notify.send(m.player, GroupMessage::RosterCleared);
            hooks.sessions.start_homebind(m.player);
        }
        self.members.clear();
        if let Some(sg) = self.subgroups.as_mut() {
            *sg = SubGroupCounters::new();
        }
        self.remove_all_invites();
        if !self.battleground {
            hooks.persist("disband group", hooks.store.delete_group(self.persist_key()));
            self.reset_instances(ResetReason::Disband, None, maps, resettable, hooks, changes);
        }
        self.leader = PlayerId(0);
        self.leader_name.clear();
        self.disbanded = true;
        metrics::counter!("group.disbanded_total").increment(1);
    }

    /// Fan a per-recipient roster view out to every live member.
    pub fn send_update(&self, hooks: &Hooks) {
        for recipient in &self.members {
            if !hooks.sessions.is_online(recipient.player) {
                continue;
            }
            let members: Vec<MemberLine> = self
                .members
                .iter()
                .filter(|m| m.player != recipient.player)
                .map(|m| MemberLine {
                    player: m.player.0,
                    name: m.name.clone(),
                    online: hooks.sessions.is_online(m.player),
                    subgroup: m.subgroup,
                    flags: self.flags_of(m.player),
                })
                .collect();
            hooks.notify.send(
                recipient.player,
                GroupMessage::RosterUpdate {
                    is_raid: self.is_raid(),
                    battleground: self.battleground,
                    your_subgroup: recipient.subgroup,
                    your_flags: self.flags_of(recipient.player),
                    members,
                    leader: self.leader.0,
                    loot_method: self.loot_method.as_u8(),
                    looter: self.looter.map(|p| p.0).unwrap_or(0),
                    loot_threshold: self.loot_threshold.as_u8(),
                    difficulty: self.difficulty.as_u8(),
                },
            );
        }
    }

    /// Deliver to live members, optionally restricted to one subgroup and
    /// optionally excluding one player.
    pub fn broadcast(
        &self,
        msg: GroupMessage,
        subgroup: Option<u8>,
        exclude: Option<PlayerId>,
        hooks: &Hooks,
    ) {
        for m in &self.members {
            if Some(m.player) == exclude {
                continue;
            }
            if let Some(sg) = subgroup {
                if m.subgroup != sg {
                    continue;
                }
            }
            if hooks.sessions.is_online(m.player) {
                hooks.notify.send(m.player, msg.clone());
            }
        }
    }

    /// Durable-record key. Non-battleground groups are keyed by leader id.
    pub(crate) fn persist_key(&self) -> u64 {
        self.leader.0
    }

    pub(crate) fn group_record(&self) -> GroupRecord {
        let mut markers = [0u64; MARKER_SLOTS];
        for (i, m) in self.markers.iter().enumerate() {
            markers[i] = m.map(|t| t.0).unwrap_or(0);
        }
        GroupRecord {
            leader: self.leader.0,
            main_tank: self.main_tank.map(|p| p.0),
            main_assistant: self.main_assist.map(|p| p.0),
            loot_method: self.loot_method.as_u8(),
            looter: self.looter.map(|p| p.0).unwrap_or(0),
            loot_threshold: self.loot_threshold.as_u8(),
            markers,
            is_raid: self.is_raid(),
            difficulty: self.difficulty.as_u8(),
        }
    }

    pub(crate) fn persist_group(&self, hooks: &Hooks) {
        if self.battleground {
            return;
        }
        hooks.persist("update group", hooks.store.save_group(&self.group_record()));
    }

    pub(crate) fn persist_member(
        &self,
        player: PlayerId,
        assistant: bool,
        subgroup: u8,
        hooks: &Hooks,
    ) {
        if self.battleground {
            return;
        }
        hooks.persist(
            "update member",
            hooks.store.save_member(&data_runtime::records::MemberRecord {
                leader: self.persist_key(),
                member: player.0,
                assistant,
                subgroup,
            }),
        );
    }

    /// Check the counter-sum invariant (raid groups only). Debug aid and
    /// test hook.
    pub fn counters_consistent(&self) -> bool {
        match &self.subgroups {
            Some(sg) => sg.total() == self.members.len(),
            None => true,
        }
    }

    pub(crate) fn bound_save_ids(&self) -> HashSet<crate::SaveId> {
        self.bindings
            .iter()
            .flat_map(|per_map| per_map.values().map(|b| b.save))
            .collect()
    }
}
