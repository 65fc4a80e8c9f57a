//! Contested loot rolls.
//!
//! A roll is live from container-open until every voter has spoken or the
//! countdown expires, whichever comes first. Resolution removes the roll
//! from the registry before any award side effects run, so it happens
//! exactly once no matter how vote and deadline interleave.

use crate::group::Group;
use crate::hooks::Hooks;
use crate::loot::{Loot, SharedLoot};
use crate::{GroupId, ItemId, PlayerId, RollId};
use data_runtime::records::AwardRecord;
use net_core::message::{GroupMessage, RollVote};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// One in-flight roll over one loot slot.
#[derive(Debug)]
pub struct Roll {
    pub id: RollId,
    pub group: GroupId,
    pub item: ItemId,
    pub count: u32,
    /// Index into the owning container's item list.
    pub slot: usize,
    /// Weak: the container may despawn mid-roll, which voids the roll.
    loot: Weak<Mutex<Loot>>,
    votes: Vec<(PlayerId, Option<RollVote>)>,
    passes: usize,
    needs: usize,
    greeds: usize,
    remaining: Duration,
}

impl Roll {
    fn decided(&self) -> bool {
        self.passes + self.needs + self.greeds >= self.votes.len()
    }

    fn notify_voters(&self, msg: &GroupMessage, hooks: &Hooks) {
        for (p, _) in &self.votes {
            if hooks.sessions.is_online(*p) {
                hooks.notify.send(*p, msg.clone());
            }
        }
    }
}

/// Winner selection over revealed draws: highest value wins, a tied later
/// draw never displaces an earlier one.
pub fn pick_winner(draws: &[(PlayerId, u8)]) -> Option<(PlayerId, u8)> {
    let mut best: Option<(PlayerId, u8)> = None;
    for &(p, v) in draws {
        if best.map(|(_, bv)| v > bv).unwrap_or(true) {
            best = Some((p, v));
        }
    }
    best
}

/// Registry of every in-flight roll in the process, with the one RNG that
/// produces all draw values.
pub struct Rolls {
    next: u64,
    rng: ChaCha8Rng,
    timeout: Duration,
    table: HashMap<RollId, Roll>,
}

impl Rolls {
    /// A fixed seed makes draw sequences reproducible; `None` seeds from
    /// the OS.
    pub fn new(seed: Option<u64>, timeout: Duration) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { next: 0, rng, timeout, table: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn group_of(&self, roll: RollId) -> Option<GroupId> {
        self.table.get(&roll).map(|r| r.group)
    }

    /// Open a roll and announce it to every voter.
    pub fn create_roll(
        &mut self,
        group: &Group,
        loot: &SharedLoot,
        slot: usize,
        item: ItemId,
        count: u32,
        voters: Vec<PlayerId>,
        hooks: &Hooks,
    ) -> RollId {
        self.next += 1;
        let id = RollId(self.next);
        let roll = Roll {
            id,
            group: group.id(),
            item,
            count,
            slot,
            loot: Arc::downgrade(loot),
            votes: voters.iter().map(|&p| (p, None)).collect(),
            passes: 0,
            needs: 0,
            greeds: 0,
            remaining: self.timeout,
        };
        let announce = GroupMessage::RollStarted {
            roll: id.0,
            item: item.0,
            voters: roll.votes.len() as u32,
            countdown_ms: self.timeout.as_millis() as u64,
        };
        roll.notify_voters(&announce, hooks);
        metrics::counter!("loot.rolls_started_total").increment(1);
        self.table.insert(id, roll);
        id
    }

    /// Record one vote. Unknown rolls, non-voters, and repeat votes are
    /// ignored. Resolves immediately once every voter has spoken.
    pub fn count_vote(
        &mut self,
        id: RollId,
        player: PlayerId,
        vote: RollVote,
        group: &Group,
        hooks: &Hooks,
    ) {
        match self.table.get(&id) {
            None => return,
            Some(r) => {
                let gone = match r.loot.upgrade() {
                    None => true,
                    Some(l) => l.lock().map(|l| l.is_empty()).unwrap_or(true),
                };
                if gone {
                    // container despawned or was emptied under the roll
                    self.void_roll(id);
                    return;
                }
            }
        }
        let Some(roll) = self.table.get_mut(&id) else {
            return;
        };
        let Some(slot) = roll.votes.iter_mut().find(|(p, _)| *p == player) else {
            return;
        };
        if slot.1.is_some() {
            return;
        }
        slot.1 = Some(vote);
        match vote {
            RollVote::Pass => roll.passes += 1,
            RollVote::Need => roll.needs += 1,
            RollVote::Greed => roll.greeds += 1,
        }
        roll.notify_voters(
            &GroupMessage::VoteCast { roll: id.0, player: player.0, vote },
            hooks,
        );
        if roll.decided() {
            self.resolve(id, group, hooks);
        }
    }

    /// Advance every countdown; expired rolls are returned for the caller
    /// to resolve under the owning group's lock.
    pub fn tick(&mut self, dt: Duration) -> Vec<(RollId, GroupId)> {
        let mut due = Vec::new();
        for roll in self.table.values_mut() {
            roll.remaining = roll.remaining.saturating_sub(dt);
            if roll.remaining.is_zero() {
                due.push((roll.id, roll.group));
            }
        }
        due
    }

    /// Settle a roll: reveal draws, pick the winner, award the item.
    /// Voters who never spoke count as passing. Removing the roll first
    /// makes re-entry (deadline racing the last vote) a no-op.
    pub fn resolve(&mut self, id: RollId, group: &Group, hooks: &Hooks) {
        let Some(roll) = self.table.remove(&id) else {
            return;
        };
        let Some(loot) = roll.loot.upgrade() else {
            return;
        };

        let winning_vote = if roll.needs > 0 {
            RollVote::Need
        } else if roll.greeds > 0 {
            RollVote::Greed
        } else {
            roll.notify_voters(&GroupMessage::AllPassed { roll: id.0, item: roll.item.0 }, hooks);
            if let Ok(mut l) = loot.lock() {
                if let Some(it) = l.items.get_mut(roll.slot) {
                    it.blocked = false;
                }
            }
            return;
        };

        let mut draws: Vec<(PlayerId, u8)> = Vec::new();
        for (p, v) in &roll.votes {
            if *v != Some(winning_vote) {
                continue;
            }
            let value: u8 = self.rng.gen_range(1..=99);
            roll.notify_voters(
                &GroupMessage::RollDraw { roll: id.0, player: p.0, value, vote: winning_vote },
                hooks,
            );
            draws.push((*p, value));
        }
        let Some((winner, value)) = pick_winner(&draws) else {
            return;
        };
        roll.notify_voters(
            &GroupMessage::RollWon { roll: id.0, player: winner.0, value, vote: winning_vote },
            hooks,
        );
        metrics::counter!("loot.rolls_resolved_total").increment(1);

        match hooks.loot.store_item(winner, roll.item, roll.count) {
            Ok(()) => {
                if let Ok(mut l) = loot.lock() {
                    if let Some(it) = l.items.get_mut(roll.slot) {
                        if !it.looted {
                            it.looted = true;
                            l.unlooted = l.unlooted.saturating_sub(1);
                        }
                    }
                }
                // the in-memory state above is authoritative either way
                hooks.persist(
                    "save award",
                    hooks.store.save_award(&AwardRecord {
                        group: group.id().0,
                        item: roll.item.0,
                        count: roll.count,
                        winner: winner.0,
                    }),
                );
            }
            Err(reason) => {
                if let Ok(mut l) = loot.lock() {
                    if let Some(it) = l.items.get_mut(roll.slot) {
                        it.blocked = false;
                    }
                }
                hooks
                    .notify
                    .send(winner, GroupMessage::EquipFailure { item: roll.item.0, reason });
            }
        }
    }

    /// Drop every roll belonging to a group (disband), unblocking the
    /// items so they fall back to regular pickup.
    pub fn void_group_rolls(&mut self, group: GroupId) {
        let ids: Vec<RollId> = self
            .table
            .values()
            .filter(|r| r.group == group)
            .map(|r| r.id)
            .collect();
        for id in ids {
            self.void_roll(id);
        }
    }

    fn void_roll(&mut self, id: RollId) {
        if let Some(roll) = self.table.remove(&id) {
            if let Some(loot) = roll.loot.upgrade() {
                if let Ok(mut l) = loot.lock() {
                    if let Some(it) = l.items.get_mut(roll.slot) {
                        it.blocked = false;
                    }
                }
            }
        }
    }
}
