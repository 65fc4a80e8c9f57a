//! Leader succession: a disconnect-armed grace timer and the promotion
//! path. Leadership transfer itself (with binding migration) lives here;
//! the binding delta helpers are in `instance`.

use crate::group::Group;
use crate::hooks::Hooks;
use crate::instance::SaveRefChange;
use crate::{Difficulty, PlayerId};
use net_core::message::GroupMessage;
use std::time::Duration;

impl Group {
    /// A member logged out. Only the leader arms the succession timer.
    pub fn note_logout(&mut self, player: PlayerId) {
        if self.is_leader(player) {
            self.leader_offline_for = Some(Duration::ZERO);
        }
    }

    /// A member logged in. The leader coming back disarms the timer; a
    /// regular member logging in while the leader is absent arms it.
    pub fn note_login(&mut self, player: PlayerId, hooks: &Hooks) {
        if self.is_leader(player) {
            self.leader_offline_for = None;
        } else if self.leader_offline_for.is_none() && !hooks.sessions.is_online(self.leader) {
            self.leader_offline_for = Some(Duration::ZERO);
        }
    }

    /// Advance the succession timer by one tick. Once the grace period
    /// elapses the first online non-leader slot is promoted; if nobody is
    /// online the timer stays armed and promotion retries next tick.
    pub fn tick_succession(
        &mut self,
        dt: Duration,
        grace: Duration,
        hooks: &Hooks,
        changes: &mut Vec<SaveRefChange>,
    ) {
        if self.disbanded {
            return;
        }
        let Some(t) = self.leader_offline_for.as_mut() else {
            return;
        };
        *t += dt;
        if *t < grace {
            return;
        }
        let candidate = self
            .members
            .iter()
            .find(|m| m.player != self.leader && hooks.sessions.is_online(m.player))
            .map(|m| m.player);
        if let Some(next) = candidate {
            log::info!(
                "group {:?}: leader {:?} offline past grace, promoting {:?}",
                self.id,
                self.leader,
                next
            );
            metrics::counter!("group.successions_total").increment(1);
            self.change_leader(next, hooks, changes);
        }
    }

    /// Explicit leadership transfer. Fails if the target is not a member.
    /// Clears any pending succession timer.
    pub fn change_leader(
        &mut self,
        new_leader: PlayerId,
        hooks: &Hooks,
        changes: &mut Vec<SaveRefChange>,
    ) -> bool {
        if !self.is_member(new_leader) {
            return false;
        }
        self.set_leader(new_leader, hooks, changes);
        self.broadcast(
            GroupMessage::LeaderChanged { name: self.leader_name.clone() },
            None,
            None,
            hooks,
        );
        self.send_update(hooks);
        true
    }

    /// Swap leadership. The binding delta is computed against both the old
    /// and new leader identity first; only then does the identity change
    /// and the durable records get re-keyed.
    pub(crate) fn set_leader(
        &mut self,
        new_leader: PlayerId,
        hooks: &Hooks,
        changes: &mut Vec<SaveRefChange>,
    ) {
        let Some(slot) = self.members.iter().find(|m| m.player == new_leader) else {
            return;
        };
        let new_name = slot.name.clone();

        if !self.battleground {
            let old_key = self.persist_key();
            // permanent binds do not follow the departing leader
            self.drop_permanent_binds(hooks, changes);
            // fold the incoming leader's own binds into the group's set
            self.merge_personal_binds(new_leader, hooks, changes);
            hooks.persist("re-key group", hooks.store.delete_group(old_key));
        }

        self.leader = new_leader;
        self.leader_name = new_name;
        self.leader_offline_for = None;

        if !self.battleground {
            hooks.persist("save group", hooks.store.save_group(&self.group_record()));
            for m in &self.members {
                self.persist_member(m.player, m.assistant, m.subgroup, hooks);
            }
            for difficulty in Difficulty::both() {
                for (map, bind) in &self.bindings[difficulty.index()] {
                    hooks.persist(
                        "save binding",
                        hooks.store.save_binding(&data_runtime::records::BindingRecord {
                            leader: self.persist_key(),
                            save: bind.save.0,
                            map: map.0,
                            difficulty: difficulty.as_u8(),
                            permanent: bind.permanent,
                        }),
                    );
                }
            }
        }
    }
}
