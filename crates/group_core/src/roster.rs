//! Membership mutation: joins, leaves, subgroup moves, and the invite set.

use crate::group::{Group, MemberSlot};
use crate::hooks::Hooks;
use crate::instance::SaveRefChange;
use crate::{PlayerId, MAX_RAID_SUBGROUPS};
use data_runtime::records::MemberRecord;
use net_core::message::GroupMessage;

/// Why a join was refused. Not an error in the exception sense; callers
/// translate these into UI messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMemberError {
    AlreadyMember,
    /// Raid subgroups (or the normal-group cap) are exhausted.
    Full,
    NoSuchGroup,
}

/// Outcome of a removal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed {
        leader_changed: bool,
        remaining: usize,
    },
    /// Removing would drop membership below the disband threshold; the
    /// caller must disband the group instead.
    MustDisband,
    NotAMember,
}

impl Group {
    /// Append a member. `subgroup = None` picks the lowest-index subgroup
    /// with room. A live joiner gets their pending solo instance state
    /// cleared unless they are already inside an instance the group is
    /// bound to.
    pub fn add_member(
        &mut self,
        player: PlayerId,
        name: &str,
        assistant: bool,
        subgroup: Option<u8>,
        hooks: &Hooks,
    ) -> Result<(), AddMemberError> {
        if self.is_member(player) {
            return Err(AddMemberError::AlreadyMember);
        }
        if self.is_full() {
            return Err(AddMemberError::Full);
        }
        let target = match (&self.subgroups, subgroup) {
            (Some(sg), None) => sg.has_free_slot().ok_or(AddMemberError::Full)?,
            (Some(sg), Some(want)) => {
                if !sg.has_room(want) {
                    return Err(AddMemberError::Full);
                }
                want
            }
            (None, _) => 0,
        };

        self.members.push(MemberSlot {
            player,
            name: name.to_string(),
            subgroup: target,
            assistant,
        });
        if let Some(sg) = self.subgroups.as_mut() {
            sg.increase(target);
        }
        self.invites.remove(&player);

        if !self.is_raid() {
            // fresh party wipes stale raid markers
            self.markers = [None; crate::MARKER_SLOTS];
        }

        self.persist_member(player, assistant, target, hooks);

        if hooks.sessions.is_online(player) && !self.battleground && !self.is_leader(player) {
            match hooks.sessions.instance_of(player) {
                Some(save) if self.bound_save_ids().contains(&save) => {
                    hooks.sessions.revalidate_instance(player);
                }
                _ => hooks.sessions.reset_solo_instances(player),
            }
        }

        self.send_update(hooks);
        metrics::counter!("group.members_added_total").increment(1);
        Ok(())
    }

    /// Remove a member. Refuses (with `MustDisband`) when the group would
    /// shrink below its disband threshold: 2 for normal groups, 1 for
    /// battleground groups. Promotes the first remaining slot if the
    /// leader left.
    pub fn remove_member(
        &mut self,
        player: PlayerId,
        uninvite: bool,
        hooks: &Hooks,
        changes: &mut Vec<SaveRefChange>,
    ) -> RemoveOutcome {
        let Some(idx) = self.members.iter().position(|m| m.player == player) else {
            return RemoveOutcome::NotAMember;
        };
        let threshold = if self.battleground { 1 } else { 2 };
        if self.members.len() <= threshold {
            return RemoveOutcome::MustDisband;
        }

        let removed = self.members.remove(idx);
        if let Some(sg) = self.subgroups.as_mut() {
            sg.decrease(removed.subgroup);
        }
        if !self.battleground {
            hooks.persist(
                "delete member",
                hooks.store.delete_member(self.persist_key(), player.0),
            );
        }

        if hooks.sessions.is_online(player) {
            if uninvite {
                hooks.notify.send(player, GroupMessage::Uninvited);
            }
            hooks.notify.send(player, GroupMessage::RosterCleared);
            hooks.sessions.start_homebind(player);
        }

        let leader_changed = if self.leader == player {
            let next = self.members[0].player;
            self.set_leader(next, hooks, changes);
            self.broadcast(
                GroupMessage::LeaderChanged { name: self.leader_name.clone() },
                None,
                None,
                hooks,
            );
            true
        } else {
            false
        };

        self.send_update(hooks);
        RemoveOutcome::Removed { leader_changed, remaining: self.members.len() }
    }

    /// Move a member between raid subgroups. No-op when the target equals
    /// the current subgroup; counters are swapped atomically.
    pub fn change_subgroup(&mut self, player: PlayerId, new_subgroup: u8, hooks: &Hooks) -> bool {
        if !self.is_raid() || new_subgroup >= MAX_RAID_SUBGROUPS {
            return false;
        }
        let Some(current) = self.member_subgroup(player) else {
            return false;
        };
        if current == new_subgroup {
            return true;
        }
        let Some(sg) = self.subgroups.as_mut() else {
            return false;
        };
        if !sg.has_room(new_subgroup) {
            return false;
        }
        sg.decrease(current);
        sg.increase(new_subgroup);
        let mut assistant = false;
        if let Some(slot) = self.members.iter_mut().find(|m| m.player == player) {
            slot.subgroup = new_subgroup;
            assistant = slot.assistant;
        }
        self.persist_member(player, assistant, new_subgroup, hooks);
        self.send_update(hooks);
        true
    }

    /// Hydrate one member row. Unresolvable players are skipped (stale
    /// rows survive character deletion).
    pub fn load_member_record(&mut self, rec: &MemberRecord, hooks: &Hooks) -> bool {
        let Some(name) = hooks.sessions.player_name(PlayerId(rec.member)) else {
            return false;
        };
        self.members.push(MemberSlot {
            player: PlayerId(rec.member),
            name,
            subgroup: rec.subgroup,
            assistant: rec.assistant,
        });
        if let Some(sg) = self.subgroups.as_mut() {
            sg.increase(rec.subgroup);
        }
        true
    }

    // --- invites -----------------------------------------------------

    pub fn add_invite(&mut self, player: PlayerId, name: &str) -> bool {
        if self.is_member(player) || self.invites.contains_key(&player) {
            return false;
        }
        self.invites.insert(player, name.to_string());
        true
    }

    pub fn remove_invite(&mut self, player: PlayerId) {
        self.invites.remove(&player);
    }

    pub fn remove_all_invites(&mut self) {
        self.invites.clear();
    }

    pub fn invited(&self, player: PlayerId) -> bool {
        self.invites.contains_key(&player)
    }

    pub fn invited_by_name(&self, name: &str) -> Option<PlayerId> {
        self.invites
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(&p, _)| p)
    }
}
