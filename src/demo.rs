//! Scripted single-process walkthrough: a trio forms a group, opens a
//! contested drop, votes, and the tick loop settles everything. Useful
//! for eyeballing the message flow and exercising the metrics surface.

use anyhow::{Context, Result};
use data_runtime::configs::group::GroupCfg;
use data_runtime::specs::items::{ItemDb, ItemQuality};
use data_runtime::specs::maps::MapDb;
use data_runtime::store::MemStore;
use group_core::loot::{Loot, LootItem, LootMethod};
use group_core::{
    Difficulty, GroupManager, Hooks, ItemId, LootHooks, ObjectId, PersonalBind, PlayerId, SaveId,
    SessionDirectory,
};
use net_core::channel::{Relay, Rx};
use net_core::message::{EquipFail, RollVote};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Demo sessions: everyone named, everyone online.
struct DemoSessions;

impl SessionDirectory for DemoSessions {
    fn is_online(&self, _player: PlayerId) -> bool {
        true
    }
    fn player_name(&self, player: PlayerId) -> Option<String> {
        Some(format!("adventurer-{}", player.0))
    }
    fn instance_of(&self, _player: PlayerId) -> Option<SaveId> {
        None
    }
    fn reset_solo_instances(&self, _player: PlayerId) {}
    fn revalidate_instance(&self, _player: PlayerId) {}
    fn start_homebind(&self, _player: PlayerId) {}
    fn personal_binds(&self, _player: PlayerId) -> Vec<PersonalBind> {
        Vec::new()
    }
    fn instance_has_players(&self, _save: SaveId) -> bool {
        false
    }
}

/// Demo inventories: everything lootable, bags never fill.
struct DemoLoot;

impl LootHooks for DemoLoot {
    fn may_loot(&self, _player: PlayerId, _item: ItemId) -> bool {
        true
    }
    fn can_use(&self, _player: PlayerId, _item: ItemId) -> bool {
        true
    }
    fn in_loot_range(&self, _player: PlayerId) -> bool {
        true
    }
    fn store_item(&self, player: PlayerId, item: ItemId, count: u32) -> Result<(), EquipFail> {
        tracing::info!(player = player.0, item = item.0, count, "item stored");
        Ok(())
    }
}

pub fn run(tick: Duration, ticks: u64) -> Result<()> {
    let maps = Arc::new(MapDb::load_default().context("load maps")?);
    let items = Arc::new(ItemDb::load_default().context("load items")?);
    let cfg = data_runtime::configs::group::load_default().unwrap_or_else(|e| {
        tracing::warn!("group config failed to load, using defaults: {e:#}");
        GroupCfg::default()
    });

    let relay = Arc::new(Relay::new());
    let hooks = Hooks {
        sessions: Arc::new(DemoSessions),
        loot: Arc::new(DemoLoot),
        notify: relay.clone(),
        store: Arc::new(MemStore::new()),
    };
    let mgr = GroupManager::new(hooks, maps, items, cfg);

    let players: Vec<(u64, Rx)> = (1..=3u64).map(|p| (p, relay.connect(p))).collect();

    let group = mgr.create_group(PlayerId(1), "adventurer-1", false, Difficulty::Normal);
    for p in 2..=3u64 {
        mgr.add_member(group, PlayerId(p), &format!("adventurer-{p}"))
            .ok();
    }
    if let Some(g) = mgr.group(group) {
        if let Ok(mut g) = g.lock() {
            g.set_loot_method(
                LootMethod::NeedBeforeGreed,
                None,
                ItemQuality::Uncommon,
                mgr.hooks(),
            );
        }
    }

    // an epic drop worth arguing over
    let loot = Arc::new(Mutex::new(Loot::new(
        ObjectId(9000),
        vec![LootItem::new(ItemId(770), 1), LootItem::new(ItemId(210), 3)],
    )));
    mgr.open_loot(group, &loot);

    let mut voted = false;
    for n in 0..ticks {
        mgr.advance(tick);
        for (p, rx) in &players {
            for msg in rx.drain() {
                tracing::info!(player = *p, ?msg, "delivered");
                if let net_core::message::GroupMessage::RollStarted { roll, .. } = msg {
                    if !voted {
                        voted = true;
                        mgr.count_roll_vote(group_core::RollId(roll), PlayerId(1), RollVote::Need);
                        mgr.count_roll_vote(group_core::RollId(roll), PlayerId(2), RollVote::Greed);
                        mgr.count_roll_vote(group_core::RollId(roll), PlayerId(3), RollVote::Pass);
                    }
                }
            }
        }
        if n == ticks / 2 {
            mgr.remove_member(group, PlayerId(3), false);
        }
        std::thread::sleep(tick);
    }

    mgr.disband(group, false);
    for (p, rx) in &players {
        for msg in rx.drain() {
            tracing::info!(player = *p, ?msg, "delivered");
        }
    }
    tracing::info!(groups = mgr.group_count(), "demo complete");
    Ok(())
}
