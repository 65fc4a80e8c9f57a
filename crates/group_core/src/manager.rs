//! Process-wide owner of groups, shared saves, and rolls.
//!
//! Lock order is one-way: the groups table, then one group, then either
//! the roll registry or a loot container. The save registry is only ever
//! locked with no group lock held; binding mutations performed under a
//! group lock hand back a `SaveRefChange` batch that gets applied here
//! afterwards.

use crate::group::Group;
use crate::hooks::Hooks;
use crate::instance::{ResetReason, SaveRefChange, SaveRegistry};
use crate::loot::{Rolls, SharedLoot};
use crate::roster::{AddMemberError, RemoveOutcome};
use crate::{Difficulty, GroupId, MapId, PlayerId, RollId, SaveId};
use data_runtime::configs::group::GroupCfg;
use data_runtime::records::{BindingRecord, GroupRecord, MemberRecord};
use data_runtime::specs::items::ItemDb;
use data_runtime::specs::maps::MapDb;
use net_core::message::RollVote;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub struct GroupManager {
    hooks: Hooks,
    maps: Arc<MapDb>,
    items: Arc<ItemDb>,
    cfg: GroupCfg,
    groups: Mutex<HashMap<GroupId, Arc<Mutex<Group>>>>,
    saves: Arc<Mutex<SaveRegistry>>,
    rolls: Mutex<Rolls>,
    next_group: Mutex<u64>,
}

impl GroupManager {
    pub fn new(hooks: Hooks, maps: Arc<MapDb>, items: Arc<ItemDb>, cfg: GroupCfg) -> Self {
        let timeout = Duration::from_millis(cfg.roll_timeout_ms());
        let rolls = Rolls::new(cfg.roll_seed, timeout);
        Self {
            hooks,
            maps,
            items,
            cfg,
            groups: Mutex::new(HashMap::new()),
            saves: Arc::new(Mutex::new(SaveRegistry::new())),
            rolls: Mutex::new(rolls),
            next_group: Mutex::new(0),
        }
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub fn saves(&self) -> &Arc<Mutex<SaveRegistry>> {
        &self.saves
    }

    fn alloc_group_id(&self) -> GroupId {
        let Ok(mut next) = self.next_group.lock() else {
            return GroupId(0);
        };
        *next += 1;
        GroupId(*next)
    }

    pub fn group(&self, id: GroupId) -> Option<Arc<Mutex<Group>>> {
        let table = self.groups.lock().ok()?;
        table.get(&id).cloned()
    }

    /// The group a player belongs to, if any.
    pub fn group_of(&self, player: PlayerId) -> Option<(GroupId, Arc<Mutex<Group>>)> {
        let table = self.groups.lock().ok()?;
        for (&id, g) in table.iter() {
            if g.lock().map(|g| g.is_member(player)).unwrap_or(false) {
                return Some((id, g.clone()));
            }
        }
        None
    }

    pub fn group_count(&self) -> usize {
        self.groups.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn create_group(
        &self,
        leader: PlayerId,
        leader_name: &str,
        battleground: bool,
        difficulty: Difficulty,
    ) -> GroupId {
        let id = self.alloc_group_id();
        let mut changes = Vec::new();
        let group = Group::create(
            id,
            leader,
            leader_name,
            battleground,
            difficulty,
            &self.hooks,
            &mut changes,
        );
        self.apply_save_changes(id, changes);
        if let Ok(mut table) = self.groups.lock() {
            table.insert(id, Arc::new(Mutex::new(group)));
        }
        id
    }

    pub fn add_member(
        &self,
        id: GroupId,
        player: PlayerId,
        name: &str,
    ) -> Result<(), AddMemberError> {
        let Some(g) = self.group(id) else {
            return Err(AddMemberError::NoSuchGroup);
        };
        let Ok(mut group) = g.lock() else {
            return Err(AddMemberError::NoSuchGroup);
        };
        group.add_member(player, name, false, None, &self.hooks)
    }

    /// Remove a member, disbanding the group instead when removal would
    /// leave it below its minimum size.
    pub fn remove_member(&self, id: GroupId, player: PlayerId, uninvite: bool) -> RemoveOutcome {
        let outcome = {
            let Some(g) = self.group(id) else {
                return RemoveOutcome::NotAMember;
            };
            let Ok(mut group) = g.lock() else {
                return RemoveOutcome::NotAMember;
            };
            let mut changes = Vec::new();
            let outcome = group.remove_member(player, uninvite, &self.hooks, &mut changes);
            drop(group);
            self.apply_save_changes(id, changes);
            outcome
        };
        if outcome == RemoveOutcome::MustDisband {
            // shrink-triggered teardowns skip the destroy notice
            self.disband(id, true);
        }
        outcome
    }

    /// Tear a group down and forget it. Outstanding rolls are voided
    /// first so their items fall back to regular pickup.
    pub fn disband(&self, id: GroupId, hide_destroy: bool) {
        if let Ok(mut rolls) = self.rolls.lock() {
            rolls.void_group_rolls(id);
        }
        let Some(g) = self.group(id) else {
            return;
        };
        let resettable = self.resettable_snapshot(&g);
        let mut changes = Vec::new();
        if let Ok(mut group) = g.lock() {
            group.disband(hide_destroy, &self.maps, &resettable, &self.hooks, &mut changes);
        }
        self.apply_save_changes(id, changes);
        if let Ok(mut table) = self.groups.lock() {
            table.remove(&id);
        }
    }

    pub fn change_leader(&self, id: GroupId, new_leader: PlayerId) -> bool {
        let Some(g) = self.group(id) else {
            return false;
        };
        let Ok(mut group) = g.lock() else {
            return false;
        };
        let mut changes = Vec::new();
        let ok = group.change_leader(new_leader, &self.hooks, &mut changes);
        drop(group);
        self.apply_save_changes(id, changes);
        ok
    }

    pub fn bind_instance(
        &self,
        id: GroupId,
        map: MapId,
        difficulty: Difficulty,
        save: SaveId,
        permanent: bool,
    ) -> bool {
        let Some(g) = self.group(id) else {
            return false;
        };
        let Ok(mut group) = g.lock() else {
            return false;
        };
        let mut changes = Vec::new();
        let ok = group.bind_instance(
            map,
            difficulty,
            save,
            permanent,
            false,
            &self.maps,
            &self.hooks,
            &mut changes,
        );
        drop(group);
        self.apply_save_changes(id, changes);
        ok
    }

    pub fn unbind_instance(&self, id: GroupId, map: MapId, difficulty: Difficulty) {
        let Some(g) = self.group(id) else {
            return;
        };
        let Ok(mut group) = g.lock() else {
            return;
        };
        let mut changes = Vec::new();
        group.unbind_instance(map, difficulty, false, &self.hooks, &mut changes);
        drop(group);
        self.apply_save_changes(id, changes);
    }

    /// Player-requested "reset all instances", reported per map to the
    /// requester.
    pub fn reset_instances(&self, id: GroupId, requester: PlayerId) {
        self.reset_with_reason(id, ResetReason::General, Some(requester));
    }

    /// Change dungeon difficulty. Bindings on the outgoing tier are reset
    /// first; they would be unreachable afterwards.
    pub fn set_difficulty(&self, id: GroupId, difficulty: Difficulty) {
        self.reset_with_reason(id, ResetReason::ChangeDifficulty, None);
        let Some(g) = self.group(id) else {
            return;
        };
        let Ok(mut group) = g.lock() else {
            return;
        };
        group.set_difficulty(difficulty, &self.hooks);
    }

    fn reset_with_reason(&self, id: GroupId, reason: ResetReason, notify_to: Option<PlayerId>) {
        let Some(g) = self.group(id) else {
            return;
        };
        let resettable = self.resettable_snapshot(&g);
        let mut changes = Vec::new();
        if let Ok(mut group) = g.lock() {
            group.reset_instances(
                reason,
                notify_to,
                &self.maps,
                &resettable,
                &self.hooks,
                &mut changes,
            );
        }
        self.apply_save_changes(id, changes);
    }

    /// Apply the group's loot rule to a freshly opened container.
    pub fn open_loot(&self, id: GroupId, loot: &SharedLoot) {
        let Some(g) = self.group(id) else {
            return;
        };
        let Ok(mut group) = g.lock() else {
            return;
        };
        let Ok(mut rolls) = self.rolls.lock() else {
            return;
        };
        group.open_loot(loot, &self.items, &mut rolls, &self.hooks);
    }

    pub fn count_roll_vote(&self, roll: RollId, player: PlayerId, vote: RollVote) {
        // roll -> group lookup first; the group lock must come before the
        // registry lock
        let group_id = {
            let Ok(rolls) = self.rolls.lock() else {
                return;
            };
            let Some(id) = rolls.group_of(roll) else {
                return;
            };
            id
        };
        let Some(g) = self.group(group_id) else {
            return;
        };
        let Ok(group) = g.lock() else {
            return;
        };
        let Ok(mut rolls) = self.rolls.lock() else {
            return;
        };
        rolls.count_vote(roll, player, vote, &group, &self.hooks);
    }

    pub fn note_login(&self, player: PlayerId) {
        if let Some((_, g)) = self.group_of(player) {
            if let Ok(mut group) = g.lock() {
                group.note_login(player, &self.hooks);
                group.send_update(&self.hooks);
            }
        }
    }

    pub fn note_logout(&self, player: PlayerId) {
        if let Some((_, g)) = self.group_of(player) {
            if let Ok(mut group) = g.lock() {
                group.note_logout(player);
                group.send_update(&self.hooks);
            }
        }
    }

    /// Rebuild one group from its stored rows. Groups that finish loading
    /// with fewer than two resolvable members are dropped instead of
    /// registered.
    pub fn load_group(
        &self,
        rec: &GroupRecord,
        members: &[MemberRecord],
        bindings: &[BindingRecord],
    ) -> Option<GroupId> {
        let leader_name = self
            .hooks
            .sessions
            .player_name(PlayerId(rec.leader))
            .unwrap_or_default();
        let id = self.alloc_group_id();
        let mut group = Group::from_record(id, rec, &leader_name);
        for m in members {
            if !group.load_member_record(m, &self.hooks) {
                log::warn!("group {:?}: dropping unresolvable member {}", id, m.member);
                self.hooks.persist(
                    "prune member",
                    self.hooks.store.delete_member(rec.leader, m.member),
                );
            }
        }
        if group.members_count() < 2 {
            log::info!("group {:?}: fewer than two members after load, deleting", id);
            self.hooks
                .persist("prune group", self.hooks.store.delete_group(rec.leader));
            return None;
        }
        let mut changes = Vec::new();
        if let Ok(mut saves) = self.saves.lock() {
            for b in bindings {
                let difficulty = Difficulty::from_u8(b.difficulty);
                let raid = self.maps.get(b.map).map(|m| m.raid).unwrap_or(false);
                let resettable = difficulty == Difficulty::Normal && !raid;
                saves.restore_save(SaveId(b.save), MapId(b.map), difficulty, resettable);
            }
        }
        for b in bindings {
            group.bind_instance(
                MapId(b.map),
                Difficulty::from_u8(b.difficulty),
                SaveId(b.save),
                b.permanent,
                true,
                &self.maps,
                &self.hooks,
                &mut changes,
            );
        }
        self.apply_save_changes(id, changes);
        if let Ok(mut table) = self.groups.lock() {
            table.insert(id, Arc::new(Mutex::new(group)));
        }
        Some(id)
    }

    /// One world tick: leader succession timers, then roll countdowns.
    pub fn advance(&self, dt: Duration) {
        let started = Instant::now();

        let grace = Duration::from_secs(self.cfg.leader_grace_secs());
        let live: Vec<(GroupId, Arc<Mutex<Group>>)> = match self.groups.lock() {
            Ok(table) => table.iter().map(|(&id, g)| (id, g.clone())).collect(),
            Err(_) => Vec::new(),
        };
        for (id, g) in live {
            let mut changes = Vec::new();
            if let Ok(mut group) = g.lock() {
                group.tick_succession(dt, grace, &self.hooks, &mut changes);
            }
            self.apply_save_changes(id, changes);
        }

        let due = match self.rolls.lock() {
            Ok(mut rolls) => rolls.tick(dt),
            Err(_) => Vec::new(),
        };
        for (roll, group_id) in due {
            let Some(g) = self.group(group_id) else {
                if let Ok(mut rolls) = self.rolls.lock() {
                    rolls.void_group_rolls(group_id);
                }
                continue;
            };
            let Ok(group) = g.lock() else {
                continue;
            };
            if let Ok(mut rolls) = self.rolls.lock() {
                rolls.resolve(roll, &group, &self.hooks);
            }
        }

        metrics::histogram!("group.tick_ms").record(started.elapsed().as_secs_f64() * 1000.0);
    }

    /// Group lock released, so the registry lock is safe to take.
    fn apply_save_changes(&self, id: GroupId, changes: Vec<SaveRefChange>) {
        if changes.is_empty() {
            return;
        }
        if let Ok(mut saves) = self.saves.lock() {
            saves.apply(id, &changes);
        }
    }

    /// Which of the group's bound saves may be reset, read with no group
    /// lock held.
    fn resettable_snapshot(&self, g: &Arc<Mutex<Group>>) -> HashMap<SaveId, bool> {
        let ids = match g.lock() {
            Ok(group) => group.bound_save_ids(),
            Err(_) => return HashMap::new(),
        };
        let Ok(saves) = self.saves.lock() else {
            return HashMap::new();
        };
        ids.into_iter()
            .map(|id| (id, saves.get(id).map(|s| s.resettable).unwrap_or(true)))
            .collect()
    }
}
