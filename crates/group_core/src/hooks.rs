//! Collaborator seams the core calls out to. The world on the other side
//! of these traits (sessions, inventories, distance checks, storage) is
//! treated as a set of pure queries and best-effort commands.

use crate::{Difficulty, ItemId, MapId, PlayerId, SaveId};
use data_runtime::store::GroupStore;
use net_core::message::{EquipFail, GroupMessage};
use std::sync::Arc;

/// One of a player's own instance bindings, offered up for merging when
/// that player becomes group leader.
#[derive(Debug, Clone, Copy)]
pub struct PersonalBind {
    pub map: MapId,
    pub difficulty: Difficulty,
    pub save: SaveId,
    pub permanent: bool,
}

/// Resolve player identifiers to live-session facts.
pub trait SessionDirectory: Send + Sync {
    fn is_online(&self, player: PlayerId) -> bool;
    /// Display name, if the player exists at all (used when hydrating
    /// groups from storage).
    fn player_name(&self, player: PlayerId) -> Option<String>;
    /// Save-state of the instance the player is currently inside, if any.
    fn instance_of(&self, player: PlayerId) -> Option<SaveId>;
    /// Clear the player's pending solo instance state (called on group join).
    fn reset_solo_instances(&self, player: PlayerId);
    /// Cancel a pending eviction: the player turned out to be inside an
    /// instance the group is bound to.
    fn revalidate_instance(&self, player: PlayerId);
    /// Start the eviction timer for a player leaving the group while
    /// inside a group-bound dungeon.
    fn start_homebind(&self, player: PlayerId);
    /// The player's own instance bindings, for leader-change migration.
    fn personal_binds(&self, player: PlayerId) -> Vec<PersonalBind>;
    /// Whether any player is currently inside the given save's instance.
    fn instance_has_players(&self, save: SaveId) -> bool;
}

/// Loot eligibility and award. All item rules beyond rarity live behind
/// these predicates.
pub trait LootHooks: Send + Sync {
    /// Loot permission: quest conditions, ownership, and the like.
    fn may_loot(&self, player: PlayerId, item: ItemId) -> bool;
    /// Class/proficiency gate used by need-before-greed.
    fn can_use(&self, player: PlayerId, item: ItemId) -> bool;
    /// Distance qualification against the loot source.
    fn in_loot_range(&self, player: PlayerId) -> bool;
    /// Deposit an awarded item into the winner's inventory.
    fn store_item(&self, player: PlayerId, item: ItemId, count: u32) -> Result<(), EquipFail>;
}

/// Deliver a structured message to one player. Offline targets are
/// silently dropped.
pub trait Notifier: Send + Sync {
    fn send(&self, to: PlayerId, msg: GroupMessage);
}

impl Notifier for net_core::channel::Relay {
    fn send(&self, to: PlayerId, msg: GroupMessage) {
        net_core::channel::Relay::send(self, to.0, msg);
    }
}

/// Everything a group mutation may need to reach. Cloned freely; all
/// members are shared handles.
#[derive(Clone)]
pub struct Hooks {
    pub sessions: Arc<dyn SessionDirectory>,
    pub loot: Arc<dyn LootHooks>,
    pub notify: Arc<dyn Notifier>,
    pub store: Arc<dyn GroupStore>,
}

impl Hooks {
    /// Fire-and-forget persistence: failures are logged and counted, never
    /// propagated back into applied state.
    pub(crate) fn persist(&self, what: &str, res: anyhow::Result<()>) {
        if let Err(e) = res {
            log::warn!("group: persistence failed ({what}): {e:#}");
            metrics::counter!("group.store_errors_total").increment(1);
        }
    }
}
