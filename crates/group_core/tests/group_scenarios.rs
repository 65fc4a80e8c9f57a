//! End-to-end scenarios over a full `GroupManager` with stubbed sessions,
//! inventories, and an in-memory store.

use data_runtime::configs::group::GroupCfg;
use data_runtime::specs::items::{ItemDb, ItemProto, ItemQuality};
use data_runtime::specs::maps::{MapDb, MapSpec};
use data_runtime::store::{MemStore, StoreEvent};
use group_core::loot::{Loot, LootItem, LootMethod};
use group_core::{
    Difficulty, GroupManager, Hooks, ItemId, LootHooks, MapId, Notifier, ObjectId, PersonalBind,
    PlayerId, RemoveOutcome, RollId, SaveId, SessionDirectory, UnitId,
};
use net_core::message::{EquipFail, GroupMessage, RollVote};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Sessions {
    offline: Mutex<HashSet<u64>>,
    personal: Mutex<HashMap<u64, Vec<PersonalBind>>>,
    inside: Mutex<HashMap<u64, u64>>,
}

impl Sessions {
    fn set_offline(&self, player: u64, offline: bool) {
        let mut set = self.offline.lock().unwrap();
        if offline {
            set.insert(player);
        } else {
            set.remove(&player);
        }
    }

    fn set_personal(&self, player: u64, binds: Vec<PersonalBind>) {
        self.personal.lock().unwrap().insert(player, binds);
    }
}

impl SessionDirectory for Sessions {
    fn is_online(&self, player: PlayerId) -> bool {
        !self.offline.lock().unwrap().contains(&player.0)
    }
    fn player_name(&self, player: PlayerId) -> Option<String> {
        Some(format!("player-{}", player.0))
    }
    fn instance_of(&self, player: PlayerId) -> Option<SaveId> {
        self.inside.lock().unwrap().get(&player.0).copied().map(SaveId)
    }
    fn reset_solo_instances(&self, _player: PlayerId) {}
    fn revalidate_instance(&self, _player: PlayerId) {}
    fn start_homebind(&self, _player: PlayerId) {}
    fn personal_binds(&self, player: PlayerId) -> Vec<PersonalBind> {
        self.personal
            .lock()
            .unwrap()
            .get(&player.0)
            .cloned()
            .unwrap_or_default()
    }
    fn instance_has_players(&self, save: SaveId) -> bool {
        self.inside.lock().unwrap().values().any(|&s| s == save.0)
    }
}

#[derive(Default)]
struct Inventories {
    full: Mutex<HashSet<u64>>,
    out_of_range: Mutex<HashSet<u64>>,
    stored: Mutex<Vec<(u64, u32, u32)>>,
}

impl LootHooks for Inventories {
    fn may_loot(&self, _player: PlayerId, _item: ItemId) -> bool {
        true
    }
    fn can_use(&self, _player: PlayerId, _item: ItemId) -> bool {
        true
    }
    fn in_loot_range(&self, player: PlayerId) -> bool {
        !self.out_of_range.lock().unwrap().contains(&player.0)
    }
    fn store_item(&self, player: PlayerId, item: ItemId, count: u32) -> Result<(), EquipFail> {
        if self.full.lock().unwrap().contains(&player.0) {
            return Err(EquipFail::InventoryFull);
        }
        self.stored.lock().unwrap().push((player.0, item.0, count));
        Ok(())
    }
}

#[derive(Default)]
struct Sink {
    msgs: Mutex<Vec<(u64, GroupMessage)>>,
}

impl Sink {
    fn take(&self) -> Vec<(u64, GroupMessage)> {
        std::mem::take(&mut *self.msgs.lock().unwrap())
    }
}

impl Notifier for Sink {
    fn send(&self, to: PlayerId, msg: GroupMessage) {
        self.msgs.lock().unwrap().push((to.0, msg));
    }
}

struct World {
    mgr: GroupManager,
    maps: Arc<MapDb>,
    sessions: Arc<Sessions>,
    inventories: Arc<Inventories>,
    sink: Arc<Sink>,
    store: Arc<MemStore>,
}

fn world(cfg: GroupCfg) -> World {
    let maps = Arc::new(MapDb::from_specs(vec![
        MapSpec { id: 0, name: "overland".into(), dungeon: false, raid: false, heroic: false },
        MapSpec { id: 540, name: "shattered halls".into(), dungeon: true, raid: false, heroic: true },
        MapSpec { id: 543, name: "ramparts".into(), dungeon: true, raid: false, heroic: true },
        MapSpec { id: 469, name: "blackwing lair".into(), dungeon: true, raid: true, heroic: false },
        MapSpec { id: 309, name: "sunken gardens".into(), dungeon: true, raid: false, heroic: false },
    ]));
    let items = Arc::new(ItemDb::from_protos(vec![
        ItemProto { id: 210, name: "linen scrap".into(), quality: ItemQuality::Common },
        ItemProto { id: 355, name: "emberforged dagger".into(), quality: ItemQuality::Uncommon },
        ItemProto { id: 412, name: "stormcaller band".into(), quality: ItemQuality::Rare },
    ]));
    let sessions = Arc::new(Sessions::default());
    let inventories = Arc::new(Inventories::default());
    let sink = Arc::new(Sink::default());
    let store = Arc::new(MemStore::new());
    let hooks = Hooks {
        sessions: sessions.clone(),
        loot: inventories.clone(),
        notify: sink.clone(),
        store: store.clone(),
    };
    let mgr = GroupManager::new(hooks, maps.clone(), items, cfg);
    World { mgr, maps, sessions, inventories, sink, store }
}

fn seeded_cfg() -> GroupCfg {
    GroupCfg {
        leader_grace_secs: Some(30),
        roll_timeout_ms: Some(60_000),
        roll_seed: Some(1234),
    }
}

fn roll_id_from(msgs: &[(u64, GroupMessage)]) -> RollId {
    msgs.iter()
        .find_map(|(_, m)| match m {
            GroupMessage::RollStarted { roll, .. } => Some(RollId(*roll)),
            _ => None,
        })
        .expect("a roll should have started")
}

fn shared_loot(items: Vec<LootItem>) -> group_core::SharedLoot {
    Arc::new(Mutex::new(Loot::new(ObjectId(9000), items)))
}

#[test]
fn need_vote_beats_greed_and_pass() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();
    w.mgr.add_member(id, PlayerId(3), "player-3").unwrap();

    {
        let g = w.mgr.group(id).unwrap();
        g.lock().unwrap().set_loot_method(
            LootMethod::NeedBeforeGreed,
            None,
            ItemQuality::Uncommon,
            w.mgr.hooks(),
        );
    }
    w.sink.take();

    let loot = shared_loot(vec![LootItem::new(ItemId(412), 1)]);
    w.mgr.open_loot(id, &loot);
    let roll = roll_id_from(&w.sink.take());
    assert!(loot.lock().unwrap().items[0].blocked);

    w.mgr.count_roll_vote(roll, PlayerId(2), RollVote::Greed);
    w.mgr.count_roll_vote(roll, PlayerId(3), RollVote::Pass);
    w.mgr.count_roll_vote(roll, PlayerId(1), RollVote::Need);

    let msgs = w.sink.take();
    let won = msgs
        .iter()
        .find_map(|(_, m)| match m {
            GroupMessage::RollWon { player, vote, .. } => Some((*player, *vote)),
            _ => None,
        })
        .expect("roll should resolve once all voters spoke");
    assert_eq!(won, (1, RollVote::Need), "sole need voter wins over greed and pass");

    let l = loot.lock().unwrap();
    assert!(l.items[0].looted);
    assert!(l.is_empty());
    drop(l);
    assert_eq!(w.inventories.stored.lock().unwrap().as_slice(), &[(1, 412, 1)]);
    assert!(w
        .store
        .events()
        .iter()
        .any(|e| matches!(e, StoreEvent::Award(a) if a.winner == 1 && a.item == 412)));

    // late vote on a settled roll changes nothing
    w.mgr.count_roll_vote(roll, PlayerId(2), RollVote::Need);
    assert!(w.sink.take().is_empty());
}

#[test]
fn all_greed_resolves_by_highest_draw_and_full_bags_unblock() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();
    w.sink.take();

    let loot = shared_loot(vec![LootItem::new(ItemId(355), 1)]);
    w.mgr.open_loot(id, &loot);
    let roll = roll_id_from(&w.sink.take());

    // whoever wins, their bags are full
    w.inventories.full.lock().unwrap().extend([1u64, 2u64]);

    w.mgr.count_roll_vote(roll, PlayerId(1), RollVote::Greed);
    w.mgr.count_roll_vote(roll, PlayerId(2), RollVote::Greed);

    let msgs = w.sink.take();
    let draws: Vec<(u64, u8)> = msgs
        .iter()
        .filter_map(|(_, m)| match m {
            GroupMessage::RollDraw { player, value, .. } => Some((*player, *value)),
            _ => None,
        })
        .collect();
    // per-voter draws deduplicate across recipients
    let mut unique = draws.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 2, "both greed voters draw");
    for (_, v) in &unique {
        assert!((1..=99).contains(v));
    }
    let (winner, value) = msgs
        .iter()
        .find_map(|(_, m)| match m {
            GroupMessage::RollWon { player, value, .. } => Some((*player, *value)),
            _ => None,
        })
        .expect("greed roll resolves");
    assert_eq!(value, unique.iter().map(|&(_, v)| v).max().unwrap());

    // inventory-full: no award, item falls back to regular pickup
    assert!(msgs.iter().any(|(to, m)| *to == winner
        && matches!(m, GroupMessage::EquipFailure { item: 355, reason: EquipFail::InventoryFull })));
    let l = loot.lock().unwrap();
    assert!(!l.items[0].looted);
    assert!(!l.items[0].blocked);
    assert!(w.inventories.stored.lock().unwrap().is_empty());
}

#[test]
fn roll_deadline_settles_with_absent_voters_passing() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();
    w.mgr.add_member(id, PlayerId(3), "player-3").unwrap();
    w.sink.take();

    let loot = shared_loot(vec![LootItem::new(ItemId(412), 1)]);
    w.mgr.open_loot(id, &loot);
    let roll = roll_id_from(&w.sink.take());

    w.mgr.count_roll_vote(roll, PlayerId(2), RollVote::Greed);
    w.mgr.advance(Duration::from_secs(61));

    let msgs = w.sink.take();
    let won = msgs
        .iter()
        .find_map(|(_, m)| match m {
            GroupMessage::RollWon { player, .. } => Some(*player),
            _ => None,
        })
        .expect("deadline resolves the roll");
    assert_eq!(won, 2, "only voter who spoke takes the greed win");
    assert!(loot.lock().unwrap().items[0].looted);

    // a second tick must not resolve it again
    w.mgr.advance(Duration::from_secs(61));
    assert!(w
        .sink
        .take()
        .iter()
        .all(|(_, m)| !matches!(m, GroupMessage::RollWon { .. })));
}

#[test]
fn everyone_passing_releases_the_item() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();
    w.sink.take();

    let loot = shared_loot(vec![LootItem::new(ItemId(412), 1)]);
    w.mgr.open_loot(id, &loot);
    let roll = roll_id_from(&w.sink.take());

    w.mgr.count_roll_vote(roll, PlayerId(1), RollVote::Pass);
    w.mgr.count_roll_vote(roll, PlayerId(2), RollVote::Pass);

    let msgs = w.sink.take();
    assert!(msgs.iter().any(|(_, m)| matches!(m, GroupMessage::AllPassed { item: 412, .. })));
    let l = loot.lock().unwrap();
    assert!(!l.items[0].blocked);
    assert!(!l.items[0].looted);
}

#[test]
fn below_threshold_items_never_roll() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();
    w.sink.take();

    let loot = shared_loot(vec![LootItem::new(ItemId(210), 3)]);
    w.mgr.open_loot(id, &loot);
    assert!(w
        .sink
        .take()
        .iter()
        .all(|(_, m)| !matches!(m, GroupMessage::RollStarted { .. })));
    assert!(!loot.lock().unwrap().items[0].blocked);
}

#[test]
fn raid_fills_to_forty_and_refuses_the_next() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    {
        let g = w.mgr.group(id).unwrap();
        g.lock().unwrap().convert_to_raid(w.mgr.hooks());
    }
    for p in 2..=40u64 {
        w.mgr
            .add_member(id, PlayerId(p), &format!("player-{p}"))
            .unwrap_or_else(|e| panic!("member {p} refused: {e:?}"));
    }
    let err = w.mgr.add_member(id, PlayerId(41), "player-41").unwrap_err();
    assert_eq!(err, group_core::AddMemberError::Full);

    let g = w.mgr.group(id).unwrap();
    let g = g.lock().unwrap();
    assert_eq!(g.members_count(), 40);
    assert!(g.counters_consistent());
    // auto-placement packs subgroups lowest-index first
    assert_eq!(g.member_subgroup(PlayerId(5)), Some(0));
    assert_eq!(g.member_subgroup(PlayerId(6)), Some(1));
}

#[test]
fn duplicate_join_is_refused() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();
    assert_eq!(
        w.mgr.add_member(id, PlayerId(2), "player-2"),
        Err(group_core::AddMemberError::AlreadyMember)
    );
}

#[test]
fn removing_from_a_pair_disbands_instead() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();
    w.sink.take();

    let outcome = w.mgr.remove_member(id, PlayerId(2), true);
    assert_eq!(outcome, RemoveOutcome::MustDisband);
    assert!(w.mgr.group(id).is_none(), "manager forgets the disbanded group");
    assert!(w
        .store
        .events()
        .iter()
        .any(|e| matches!(e, StoreEvent::DeleteGroup(1))));

    // shrink teardowns clear rosters quietly, without the destroy notice
    let msgs = w.sink.take();
    assert!(msgs.iter().all(|(_, m)| !matches!(m, GroupMessage::GroupDestroyed)));
    assert!(msgs.iter().any(|(_, m)| matches!(m, GroupMessage::RosterCleared)));
}

#[test]
fn leaving_a_trio_keeps_the_group() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();
    w.mgr.add_member(id, PlayerId(3), "player-3").unwrap();

    let outcome = w.mgr.remove_member(id, PlayerId(3), false);
    assert_eq!(outcome, RemoveOutcome::Removed { leader_changed: false, remaining: 2 });
    assert!(w.mgr.group(id).is_some());
}

#[test]
fn leader_removal_promotes_next_slot() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();
    w.mgr.add_member(id, PlayerId(3), "player-3").unwrap();

    let outcome = w.mgr.remove_member(id, PlayerId(1), false);
    assert_eq!(outcome, RemoveOutcome::Removed { leader_changed: true, remaining: 2 });
    let g = w.mgr.group(id).unwrap();
    assert!(g.lock().unwrap().is_leader(PlayerId(2)));
}

#[test]
fn offline_leader_is_replaced_after_grace_and_binds_migrate() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();

    // group's permanent lockout under leader 1, plus a personal one the
    // incoming leader will contribute
    let (group_save, personal_save) = {
        let mut saves = w.mgr.saves().lock().unwrap();
        (
            saves.create_save(MapId(540), Difficulty::Heroic, false),
            saves.create_save(MapId(543), Difficulty::Heroic, false),
        )
    };
    assert!(w.mgr.bind_instance(id, MapId(540), Difficulty::Heroic, group_save, true));
    w.sessions.set_personal(
        2,
        vec![PersonalBind {
            map: MapId(543),
            difficulty: Difficulty::Heroic,
            save: personal_save,
            permanent: true,
        }],
    );
    {
        let mut saves = w.mgr.saves().lock().unwrap();
        saves.add_player_ref(personal_save, PlayerId(2));
    }

    w.sessions.set_offline(1, true);
    w.mgr.note_logout(PlayerId(1));
    w.store.take();

    w.mgr.advance(Duration::from_secs(15));
    {
        let g = w.mgr.group(id).unwrap();
        assert!(g.lock().unwrap().is_leader(PlayerId(1)), "grace not yet elapsed");
    }
    w.mgr.advance(Duration::from_secs(16));

    let g = w.mgr.group(id).unwrap();
    let group = g.lock().unwrap();
    assert!(group.is_leader(PlayerId(2)));
    assert!(
        group.bound_instance(MapId(540), Difficulty::Heroic, &w.maps).is_none(),
        "permanent binds do not follow the departing leader"
    );
    let migrated = group
        .bound_instance(MapId(543), Difficulty::Heroic, &w.maps)
        .expect("incoming leader's bind is folded in");
    assert_eq!(migrated.save, personal_save);
    assert!(migrated.permanent);
    drop(group);

    // old save lost its last reference; the record set was re-keyed
    let saves = w.mgr.saves().lock().unwrap();
    assert!(saves.get(group_save).is_none());
    assert!(saves.get(personal_save).unwrap().groups().contains(&id));
    drop(saves);
    let events = w.store.events();
    assert!(events.iter().any(|e| matches!(e, StoreEvent::DeleteGroup(1))));
    assert!(events.iter().any(|e| matches!(e, StoreEvent::Group(r) if r.leader == 2)));
}

#[test]
fn returning_leader_disarms_the_timer() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();

    w.sessions.set_offline(1, true);
    w.mgr.note_logout(PlayerId(1));
    w.mgr.advance(Duration::from_secs(20));
    w.sessions.set_offline(1, false);
    w.mgr.note_login(PlayerId(1));
    w.mgr.advance(Duration::from_secs(60));

    let g = w.mgr.group(id).unwrap();
    assert!(g.lock().unwrap().is_leader(PlayerId(1)));
}

#[test]
fn bind_unbind_round_trip_drops_the_save() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();

    let save = w
        .mgr
        .saves()
        .lock()
        .unwrap()
        .create_save(MapId(540), Difficulty::Normal, true);
    assert!(w.mgr.bind_instance(id, MapId(540), Difficulty::Normal, save, false));
    assert!(w.mgr.saves().lock().unwrap().get(save).unwrap().groups().contains(&id));

    w.mgr.unbind_instance(id, MapId(540), Difficulty::Normal);
    assert!(w.mgr.saves().lock().unwrap().get(save).is_none());
    let g = w.mgr.group(id).unwrap();
    assert!(g.lock().unwrap().bound_instance(MapId(540), Difficulty::Normal, &w.maps).is_none());
}

#[test]
fn general_reset_skips_occupied_and_raid_instances() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();

    let (empty_save, occupied_save, raid_save) = {
        let mut saves = w.mgr.saves().lock().unwrap();
        (
            saves.create_save(MapId(540), Difficulty::Normal, true),
            saves.create_save(MapId(543), Difficulty::Normal, true),
            saves.create_save(MapId(469), Difficulty::Normal, false),
        )
    };
    assert!(w.mgr.bind_instance(id, MapId(540), Difficulty::Normal, empty_save, false));
    assert!(w.mgr.bind_instance(id, MapId(543), Difficulty::Normal, occupied_save, false));
    assert!(w.mgr.bind_instance(id, MapId(469), Difficulty::Normal, raid_save, false));
    w.sessions.inside.lock().unwrap().insert(99, occupied_save.0);
    w.sink.take();

    w.mgr.reset_instances(id, PlayerId(1));

    let msgs = w.sink.take();
    assert!(msgs
        .iter()
        .any(|(to, m)| *to == 1 && matches!(m, GroupMessage::InstanceReset { map: 540, ok: true })));
    assert!(msgs
        .iter()
        .any(|(to, m)| *to == 1 && matches!(m, GroupMessage::InstanceReset { map: 543, ok: false })));

    let g = w.mgr.group(id).unwrap();
    let group = g.lock().unwrap();
    assert!(group.bound_instance(MapId(540), Difficulty::Normal, &w.maps).is_none());
    assert!(group.bound_instance(MapId(543), Difficulty::Normal, &w.maps).is_some());
    assert!(
        group.bound_instance(MapId(469), Difficulty::Normal, &w.maps).is_some(),
        "raid lockouts resist blanket resets"
    );
}

#[test]
fn difficulty_change_resets_old_tier_bindings() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();

    let save = w
        .mgr
        .saves()
        .lock()
        .unwrap()
        .create_save(MapId(540), Difficulty::Normal, true);
    assert!(w.mgr.bind_instance(id, MapId(540), Difficulty::Normal, save, false));
    w.sink.take();

    w.mgr.set_difficulty(id, Difficulty::Heroic);

    let msgs = w.sink.take();
    assert!(msgs
        .iter()
        .any(|(_, m)| matches!(m, GroupMessage::DungeonDifficulty { difficulty: 1 })));
    let g = w.mgr.group(id).unwrap();
    let group = g.lock().unwrap();
    assert_eq!(group.difficulty(), Difficulty::Heroic);
    assert!(
        group.bound_instance(MapId(540), Difficulty::Normal, &w.maps).is_none(),
        "outgoing tier's bindings are reset"
    );
    assert!(group.bound_instance(MapId(540), Difficulty::Heroic, &w.maps).is_none());
    drop(group);
    assert!(w.mgr.saves().lock().unwrap().get(save).is_none());
}

#[test]
fn disband_voids_rolls_and_releases_items() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();
    w.sink.take();

    let loot = shared_loot(vec![LootItem::new(ItemId(412), 1)]);
    w.mgr.open_loot(id, &loot);
    assert!(loot.lock().unwrap().items[0].blocked);

    w.mgr.disband(id, false);

    let l = loot.lock().unwrap();
    assert!(!l.items[0].blocked, "voided rolls release their items");
    assert!(!l.items[0].looted);
    drop(l);
    assert!(w.mgr.group(id).is_none());
    assert!(w
        .sink
        .take()
        .iter()
        .any(|(_, m)| matches!(m, GroupMessage::GroupDestroyed)));
}

#[test]
fn round_robin_rotates_past_offline_and_out_of_range_members() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();
    w.mgr.add_member(id, PlayerId(3), "player-3").unwrap();
    w.mgr.add_member(id, PlayerId(4), "player-4").unwrap();
    {
        let g = w.mgr.group(id).unwrap();
        g.lock().unwrap().set_loot_method(
            LootMethod::RoundRobin,
            Some(PlayerId(1)),
            ItemQuality::Uncommon,
            w.mgr.hooks(),
        );
    }
    w.sessions.set_offline(2, true);
    w.inventories.out_of_range.lock().unwrap().insert(3);
    w.sink.take();

    let loot = shared_loot(vec![LootItem::new(ItemId(210), 1)]);
    w.mgr.open_loot(id, &loot);

    let msgs = w.sink.take();
    let looter = msgs
        .iter()
        .find_map(|(_, m)| match m {
            GroupMessage::LootList { looter, .. } => Some(*looter),
            _ => None,
        })
        .expect("round robin announces the looter");
    assert_eq!(looter, 4, "offline and out-of-range members are skipped");
}

#[test]
fn master_loot_withholds_items_and_lists_eligible_recipients() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();
    w.mgr.add_member(id, PlayerId(3), "player-3").unwrap();
    {
        let g = w.mgr.group(id).unwrap();
        g.lock().unwrap().set_loot_method(
            LootMethod::Master,
            Some(PlayerId(2)),
            ItemQuality::Uncommon,
            w.mgr.hooks(),
        );
    }
    w.inventories.out_of_range.lock().unwrap().insert(3);
    w.sink.take();

    let loot = shared_loot(vec![
        LootItem::new(ItemId(210), 1),
        LootItem::new(ItemId(412), 1),
    ]);
    w.mgr.open_loot(id, &loot);

    let msgs = w.sink.take();
    let candidates = msgs
        .iter()
        .find_map(|(to, m)| match m {
            GroupMessage::MasterLootList { candidates } if *to == 2 => Some(candidates.clone()),
            _ => None,
        })
        .expect("master looter receives the recipient list");
    assert_eq!(candidates, vec![1, 2], "out-of-range member is not a recipient");
    let l = loot.lock().unwrap();
    assert!(!l.items[0].blocked, "below-threshold stack stays open");
    assert!(l.items[1].blocked);
}

#[test]
fn hydration_restores_membership_and_bindings() {
    use data_runtime::records::{BindingRecord, GroupRecord, MemberRecord};

    let w = world(seeded_cfg());
    let rec = GroupRecord {
        leader: 7,
        main_tank: None,
        main_assistant: None,
        loot_method: LootMethod::GroupLoot.as_u8(),
        looter: 7,
        loot_threshold: ItemQuality::Uncommon.as_u8(),
        markers: [0; 8],
        is_raid: false,
        difficulty: 1,
    };
    let members = [
        MemberRecord { leader: 7, member: 7, assistant: false, subgroup: 0 },
        MemberRecord { leader: 7, member: 8, assistant: true, subgroup: 0 },
    ];
    let bindings = [BindingRecord { leader: 7, save: 31, map: 540, difficulty: 1, permanent: true }];

    let id = w.mgr.load_group(&rec, &members, &bindings).expect("group loads");
    let g = w.mgr.group(id).unwrap();
    let group = g.lock().unwrap();
    assert_eq!(group.members_count(), 2);
    assert!(group.is_leader(PlayerId(7)));
    assert!(group.is_assistant(PlayerId(8)));
    let bind = group.bound_instance(MapId(540), Difficulty::Heroic, &w.maps).unwrap();
    assert_eq!(bind.save, SaveId(31));
    drop(group);
    assert!(w.mgr.saves().lock().unwrap().get(SaveId(31)).unwrap().groups().contains(&id));
}

#[test]
fn hydration_drops_groups_below_two_members() {
    use data_runtime::records::{GroupRecord, MemberRecord};

    let w = world(seeded_cfg());
    let rec = GroupRecord {
        leader: 7,
        main_tank: None,
        main_assistant: None,
        loot_method: 3,
        looter: 7,
        loot_threshold: 2,
        markers: [0; 8],
        is_raid: false,
        difficulty: 0,
    };
    let members = [MemberRecord { leader: 7, member: 7, assistant: false, subgroup: 0 }];
    assert!(w.mgr.load_group(&rec, &members, &[]).is_none());
    assert!(w
        .store
        .events()
        .iter()
        .any(|e| matches!(e, StoreEvent::DeleteGroup(7))));
}

#[test]
fn subgroup_moves_swap_counters_and_respect_capacity() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    let g = w.mgr.group(id).unwrap();
    {
        let mut g = g.lock().unwrap();
        g.convert_to_raid(w.mgr.hooks());
        for p in 2..=6u64 {
            g.add_member(PlayerId(p), &format!("player-{p}"), false, Some(1), w.mgr.hooks())
                .unwrap();
        }
        g.add_member(PlayerId(7), "player-7", false, Some(0), w.mgr.hooks())
            .unwrap();
    }
    w.store.take();

    let mut g = g.lock().unwrap();
    assert!(!g.change_subgroup(PlayerId(7), 1, w.mgr.hooks()), "subgroup 1 is full");
    assert_eq!(g.member_subgroup(PlayerId(7)), Some(0));

    assert!(g.change_subgroup(PlayerId(7), 2, w.mgr.hooks()));
    assert_eq!(g.member_subgroup(PlayerId(7)), Some(2));
    assert!(g.counters_consistent());
    assert!(w
        .store
        .events()
        .iter()
        .any(|e| matches!(e, StoreEvent::Member(m) if m.member == 7 && m.subgroup == 2)));

    // same-target move is accepted without touching anything
    assert!(g.change_subgroup(PlayerId(7), 2, w.mgr.hooks()));
    assert!(g.counters_consistent());
    assert!(!g.change_subgroup(PlayerId(99), 3, w.mgr.hooks()), "not a member");
}

#[test]
fn marking_a_target_elsewhere_clears_its_old_slot() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();
    let g = w.mgr.group(id).unwrap();
    let mut g = g.lock().unwrap();

    g.set_marker(0, Some(UnitId(42)), w.mgr.hooks());
    g.set_marker(5, Some(UnitId(77)), w.mgr.hooks());
    g.set_marker(3, Some(UnitId(42)), w.mgr.hooks());
    g.set_marker(8, Some(UnitId(11)), w.mgr.hooks());
    w.sink.take();

    g.send_marker_list(PlayerId(2), w.mgr.hooks());
    let msgs = w.sink.take();
    let markers = msgs
        .iter()
        .find_map(|(to, m)| match m {
            GroupMessage::MarkerList { markers } if *to == 2 => Some(markers.clone()),
            _ => None,
        })
        .expect("marker list delivered");
    assert_eq!(markers, vec![(3, 42), (5, 77)], "target 42 occupies one slot only");
}

#[test]
fn invites_are_tracked_until_join() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    let g = w.mgr.group(id).unwrap();
    let mut g = g.lock().unwrap();

    assert!(g.add_invite(PlayerId(2), "player-2"));
    assert!(!g.add_invite(PlayerId(2), "player-2"), "already invited");
    assert!(!g.add_invite(PlayerId(1), "player-1"), "already a member");
    assert!(g.invited(PlayerId(2)));
    assert_eq!(g.invited_by_name("player-2"), Some(PlayerId(2)));

    g.add_member(PlayerId(2), "player-2", false, None, w.mgr.hooks())
        .unwrap();
    assert!(!g.invited(PlayerId(2)), "joining consumes the invite");

    assert!(g.add_invite(PlayerId(3), "player-3"));
    g.remove_invite(PlayerId(3));
    assert!(!g.invited(PlayerId(3)));
    assert_eq!(g.invited_by_name("player-3"), None);
}

#[test]
fn single_tier_maps_bind_on_the_normal_tier() {
    let w = world(seeded_cfg());
    let id = w.mgr.create_group(PlayerId(1), "player-1", false, Difficulty::Normal);
    w.mgr.add_member(id, PlayerId(2), "player-2").unwrap();
    w.store.take();

    let save = w
        .mgr
        .saves()
        .lock()
        .unwrap()
        .create_save(MapId(309), Difficulty::Normal, true);
    assert!(w.mgr.bind_instance(id, MapId(309), Difficulty::Heroic, save, false));

    let g = w.mgr.group(id).unwrap();
    let g = g.lock().unwrap();
    let bind = g
        .bound_instance(MapId(309), Difficulty::Heroic, &w.maps)
        .expect("heroic lookup collapses onto the normal tier");
    assert_eq!(bind.save, save);
    assert!(g.bound_instance(MapId(309), Difficulty::Normal, &w.maps).is_some());
    assert!(w
        .store
        .events()
        .iter()
        .any(|e| matches!(e, StoreEvent::Binding(b) if b.map == 309 && b.difficulty == 0)));
}
