//! Instance bindings and the shared save-state registry.
//!
//! A group holds binding entries per difficulty tier; the save-state a
//! binding points at is shared with other groups and players and lives in
//! the process-wide `SaveRegistry`, reference-counted via weak back-refs
//! (sets of holder ids, never ownership edges, so no cycles).
//!
//! Binding mutations executed under a group lock only *record* reference
//! changes; the manager applies them to the registry after the group lock
//! is dropped, which keeps the lock order one-way.

use crate::group::Group;
use crate::hooks::Hooks;
use crate::{Difficulty, GroupId, MapId, PlayerId, SaveId};
use data_runtime::records::BindingRecord;
use data_runtime::specs::maps::MapDb;
use net_core::message::GroupMessage;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// A group's association with one save-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceBinding {
    pub save: SaveId,
    pub permanent: bool,
}

/// Deferred save-reference mutation, applied to the registry once the
/// group lock is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveRefChange {
    Acquire(SaveId),
    Release(SaveId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// Blanket player-requested reset; only resettable, normal-tier,
    /// non-raid maps qualify.
    General,
    ChangeDifficulty,
    Disband,
}

/// One shared instance save. Holder sets are back-references for
/// notification/liveness only.
#[derive(Debug)]
pub struct InstanceSave {
    pub id: SaveId,
    pub map: MapId,
    pub difficulty: Difficulty,
    /// Non-resettable saves (raid/heroic lockouts) survive blanket resets.
    pub resettable: bool,
    groups: HashSet<GroupId>,
    players: HashSet<PlayerId>,
}

impl InstanceSave {
    pub fn referenced(&self) -> bool {
        !self.groups.is_empty() || !self.players.is_empty()
    }

    pub fn groups(&self) -> &HashSet<GroupId> {
        &self.groups
    }
}

/// Process-wide table of live instance saves.
#[derive(Debug, Default)]
pub struct SaveRegistry {
    next: u64,
    saves: HashMap<SaveId, InstanceSave>,
}

impl SaveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_save(&mut self, map: MapId, difficulty: Difficulty, resettable: bool) -> SaveId {
        self.next += 1;
        let id = SaveId(self.next);
        self.saves.insert(
            id,
            InstanceSave {
                id,
                map,
                difficulty,
                resettable,
                groups: HashSet::new(),
                players: HashSet::new(),
            },
        );
        id
    }

    /// Re-insert a save with a known id while hydrating from storage.
    pub fn restore_save(
        &mut self,
        id: SaveId,
        map: MapId,
        difficulty: Difficulty,
        resettable: bool,
    ) {
        self.next = self.next.max(id.0);
        self.saves.entry(id).or_insert(InstanceSave {
            id,
            map,
            difficulty,
            resettable,
            groups: HashSet::new(),
            players: HashSet::new(),
        });
    }

    pub fn get(&self, id: SaveId) -> Option<&InstanceSave> {
        self.saves.get(&id)
    }

    pub fn len(&self) -> usize {
        self.saves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saves.is_empty()
    }

    pub fn add_player_ref(&mut self, id: SaveId, player: PlayerId) {
        if let Some(s) = self.saves.get_mut(&id) {
            s.players.insert(player);
        }
    }

    pub fn remove_player_ref(&mut self, id: SaveId, player: PlayerId) {
        if let Some(s) = self.saves.get_mut(&id) {
            s.players.remove(&player);
        }
        self.drop_if_unreferenced(id);
    }

    /// Apply a batch of deferred reference changes on behalf of `group`.
    pub fn apply(&mut self, group: GroupId, changes: &[SaveRefChange]) {
        for ch in changes {
            match *ch {
                SaveRefChange::Acquire(id) => {
                    if let Some(s) = self.saves.get_mut(&id) {
                        s.groups.insert(group);
                    }
                }
                SaveRefChange::Release(id) => {
                    if let Some(s) = self.saves.get_mut(&id) {
                        s.groups.remove(&group);
                    }
                    self.drop_if_unreferenced(id);
                }
            }
        }
    }

    fn drop_if_unreferenced(&mut self, id: SaveId) {
        if let Some(s) = self.saves.get(&id) {
            if !s.referenced() {
                log::debug!("save {:?} unreferenced, unloading (map {:?})", id, s.map);
                self.saves.remove(&id);
            }
        }
    }
}

/// Difficulty a binding actually lives under: maps without a heroic tier
/// collapse onto normal.
pub fn normalize_difficulty(maps: &MapDb, map: MapId, difficulty: Difficulty) -> Difficulty {
    if maps.supports_heroic(map.0) {
        difficulty
    } else {
        Difficulty::Normal
    }
}

impl Group {
    /// Look up the group's binding for a map at a difficulty.
    pub fn bound_instance(
        &self,
        map: MapId,
        difficulty: Difficulty,
        maps: &MapDb,
    ) -> Option<&InstanceBinding> {
        let difficulty = normalize_difficulty(maps, map, difficulty);
        self.bindings[difficulty.index()].get(&map)
    }

    /// Attach a save. The difficulty collapses onto normal for single-tier
    /// maps, same as lookups. An existing binding for the same
    /// (map, difficulty) is replaced, releasing the old save's reference.
    /// `is_load` suppresses persistence while hydrating. Battleground
    /// groups carry no bindings.
    #[allow(clippy::too_many_arguments)]
    pub fn bind_instance(
        &mut self,
        map: MapId,
        difficulty: Difficulty,
        save: SaveId,
        permanent: bool,
        is_load: bool,
        maps: &MapDb,
        hooks: &Hooks,
        changes: &mut Vec<SaveRefChange>,
    ) -> bool {
        if self.battleground || self.disbanded {
            return false;
        }
        let difficulty = normalize_difficulty(maps, map, difficulty);
        let per_map = &mut self.bindings[difficulty.index()];
        match per_map.entry(map) {
            Entry::Occupied(mut e) => {
                let bind = e.get_mut();
                if bind.save != save {
                    changes.push(SaveRefChange::Release(bind.save));
                    changes.push(SaveRefChange::Acquire(save));
                }
                bind.save = save;
                bind.permanent = permanent;
            }
            Entry::Vacant(v) => {
                v.insert(InstanceBinding { save, permanent });
                changes.push(SaveRefChange::Acquire(save));
            }
        }
        if !is_load {
            hooks.persist(
                "save binding",
                hooks.store.save_binding(&BindingRecord {
                    leader: self.persist_key(),
                    save: save.0,
                    map: map.0,
                    difficulty: difficulty.as_u8(),
                    permanent,
                }),
            );
            log::debug!(
                "group {:?} bound to map {:?} save {:?} (difficulty {:?}, permanent {})",
                self.id,
                map,
                save,
                difficulty,
                permanent
            );
        }
        true
    }

    /// Drop the binding for (map, difficulty), releasing the save
    /// reference. `unload` suppresses persistence (process shutdown).
    pub fn unbind_instance(
        &mut self,
        map: MapId,
        difficulty: Difficulty,
        unload: bool,
        hooks: &Hooks,
        changes: &mut Vec<SaveRefChange>,
    ) {
        if let Some(bind) = self.bindings[difficulty.index()].remove(&map) {
            if !unload && !self.battleground {
                hooks.persist(
                    "delete binding",
                    hooks.store.delete_binding(self.persist_key(), bind.save.0),
                );
            }
            changes.push(SaveRefChange::Release(bind.save));
        }
    }

    /// Walk the current difficulty's bindings and release every one that
    /// is eligible: its instance is empty of players, or a disband /
    /// difficulty change forces it. Ineligible bindings are skipped and
    /// per-map success/failure optionally reported to `notify_to`.
    pub fn reset_instances(
        &mut self,
        reason: ResetReason,
        notify_to: Option<PlayerId>,
        maps: &MapDb,
        resettable: &HashMap<SaveId, bool>,
        hooks: &Hooks,
        changes: &mut Vec<SaveRefChange>,
    ) {
        if self.battleground {
            return;
        }
        let difficulty = self.difficulty;
        let bound: Vec<MapId> = self.bindings[difficulty.index()].keys().copied().collect();
        for map in bound {
            let bind = self.bindings[difficulty.index()][&map];
            let can_reset = resettable.get(&bind.save).copied().unwrap_or(true);
            if !can_reset && reason != ResetReason::Disband {
                continue;
            }
            if reason == ResetReason::General {
                // blanket resets never touch heroic tiers or raid maps
                let is_raid_map = maps.get(map.0).map(|m| m.raid).unwrap_or(false);
                if difficulty == Difficulty::Heroic || is_raid_map {
                    continue;
                }
            }
            let empty = !hooks.sessions.instance_has_players(bind.save);
            if let Some(to) = notify_to {
                hooks.notify.send(to, GroupMessage::InstanceReset { map: map.0, ok: empty });
            }
            if empty || reason != ResetReason::General {
                self.bindings[difficulty.index()].remove(&map);
                hooks.persist(
                    "delete binding",
                    hooks.store.delete_binding(self.persist_key(), bind.save.0),
                );
                changes.push(SaveRefChange::Release(bind.save));
            }
        }
    }

    /// Drop every permanent binding across all difficulties. Part of the
    /// leader-change delta: permanent binds never transfer.
    pub(crate) fn drop_permanent_binds(
        &mut self,
        hooks: &Hooks,
        changes: &mut Vec<SaveRefChange>,
    ) {
        let key = self.persist_key();
        for difficulty in Difficulty::both() {
            let per_map = &mut self.bindings[difficulty.index()];
            let drop: Vec<MapId> = per_map
                .iter()
                .filter(|(_, b)| b.permanent)
                .map(|(&m, _)| m)
                .collect();
            for map in drop {
                if let Some(bind) = per_map.remove(&map) {
                    hooks.persist("delete binding", hooks.store.delete_binding(key, bind.save.0));
                    changes.push(SaveRefChange::Release(bind.save));
                }
            }
        }
    }

    /// Fold a player's own bindings into the group's set. Their permanent
    /// binds override the group's prior solo binds; solo binds only fill
    /// vacant slots. Persistence of the merged set happens when the
    /// durable records are re-keyed by the caller.
    pub(crate) fn merge_personal_binds(
        &mut self,
        from: PlayerId,
        hooks: &Hooks,
        changes: &mut Vec<SaveRefChange>,
    ) {
        for pb in hooks.sessions.personal_binds(from) {
            let per_map = &mut self.bindings[pb.difficulty.index()];
            match per_map.entry(pb.map) {
                Entry::Occupied(mut e) => {
                    let bind = e.get_mut();
                    if bind.save == pb.save {
                        bind.permanent |= pb.permanent;
                    } else if pb.permanent {
                        changes.push(SaveRefChange::Release(bind.save));
                        changes.push(SaveRefChange::Acquire(pb.save));
                        *bind = InstanceBinding { save: pb.save, permanent: true };
                    }
                }
                Entry::Vacant(v) => {
                    v.insert(InstanceBinding { save: pb.save, permanent: pb.permanent });
                    changes.push(SaveRefChange::Acquire(pb.save));
                }
            }
        }
    }
}
