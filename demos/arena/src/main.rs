use std::collections::HashMap;
use std::time::Duration;

use laneforge::prelude::*;
use laneforge::replication::LocalIdCategory;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

const CN_MOVE: u16 = 200;
const CN_ATTACK: u16 = 201;
const SN_ATTACK_RESULT: u16 = 210;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MoveInput {
    pub dir: Vec2,
    pub speed: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Attack {
    pub target: LocalId,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttackResult {
    pub target: LocalId,
    pub remaining_hp: i32,
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

const HALF_EXTENT: f32 = 100.0;
const NPC_COUNT: usize = 12;
const NPC_HP: i32 = 20;
const HIT_DAMAGE: i32 = 10;
const RESPAWN_AFTER: Duration = Duration::from_secs(5);
const CHARACTER_CLASS: u32 = 3;
const ACTION_ATTACK: u16 = 2;

struct Npc {
    uid: ActorUid,
    position: Vec3,
    heading: Vec2,
    speed: f32,
    /// Time until the next change of heading.
    turn_in: Duration,
    hp: i32,
}

impl Npc {
    fn spawn(uid: ActorUid, rng: &mut impl Rng) -> Self {
        let position = Vec3::new(
            rng.random_range(-HALF_EXTENT..HALF_EXTENT),
            0.0,
            rng.random_range(-HALF_EXTENT..HALF_EXTENT),
        );
        let mut npc = Self {
            uid,
            position,
            heading: Vec2::ZERO,
            speed: 0.0,
            turn_in: Duration::ZERO,
            hp: NPC_HP,
        };
        npc.wander(Duration::ZERO, rng);
        npc
    }

    /// Walks along the current heading, bouncing off the arena edge.
    fn wander(&mut self, dt: Duration, rng: &mut impl Rng) {
        if self.turn_in <= dt {
            let angle = rng.random_range(0.0..std::f32::consts::TAU);
            self.heading = Vec2::new(angle.cos(), angle.sin());
            self.speed = rng.random_range(1.0..4.0);
            self.turn_in = Duration::from_millis(rng.random_range(1_000..4_000));
        } else {
            self.turn_in -= dt;
        }

        let step = self.speed * dt.as_secs_f32();
        self.position.x += self.heading.x * step;
        self.position.z += self.heading.y * step;
        if self.position.x.abs() > HALF_EXTENT {
            self.position.x = self.position.x.clamp(-HALF_EXTENT, HALF_EXTENT);
            self.heading.x = -self.heading.x;
        }
        if self.position.z.abs() > HALF_EXTENT {
            self.position.z = self.position.z.clamp(-HALF_EXTENT, HALF_EXTENT);
            self.heading.y = -self.heading.y;
        }
    }

    fn actor(&self) -> Actor {
        let mut state = ActorState::at(ActorCategory::Npc, 7, self.position);
        state.move_dir = self.heading;
        state.speed = self.speed;
        Actor::new(self.uid, state)
    }
}

struct Character {
    uid: ActorUid,
    player: ActorUid,
    name: String,
    position: Vec3,
    input: MoveInput,
    attacked: bool,
}

/// Wandering NPCs and one character per connected player.
pub struct Skirmish {
    lane: LaneId,
    next_uid: u64,
    npcs: Arena<Npc>,
    npc_by_uid: HashMap<ActorUid, Handle>,
    characters: HashMap<ClientHandle, Character>,
    respawns: Vec<Duration>,
}

impl Skirmish {
    pub fn new(lane: LaneId) -> Self {
        let mut world = Self {
            lane,
            next_uid: u64::from(lane.0) << 40,
            npcs: Arena::new(),
            npc_by_uid: HashMap::new(),
            characters: HashMap::new(),
            respawns: Vec::new(),
        };
        let mut rng = rand::rng();
        for _ in 0..NPC_COUNT {
            world.spawn_npc(&mut rng);
        }
        world
    }

    fn uid(&mut self) -> ActorUid {
        self.next_uid += 1;
        ActorUid(self.next_uid)
    }

    fn spawn_npc(&mut self, rng: &mut impl Rng) {
        let uid = self.uid();
        let handle = self.npcs.insert(Npc::spawn(uid, rng));
        self.npc_by_uid.insert(uid, handle);
    }

    fn attack(&mut self, ctx: &mut LaneContext<'_, JsonCodec>, client: ClientHandle, attack: Attack) {
        let Some(uid) = ctx.resolve_local(client, attack.target) else {
            return;
        };
        let Some(&handle) = self.npc_by_uid.get(&uid) else {
            debug!(%client, %uid, "attack on a non-npc ignored");
            return;
        };
        let Some(npc) = self.npcs.get_mut(handle) else {
            return;
        };
        npc.hp -= HIT_DAMAGE;
        let remaining_hp = npc.hp.max(0);
        if npc.hp <= 0 {
            self.npcs.remove(handle);
            self.npc_by_uid.remove(&uid);
            self.respawns.push(RESPAWN_AFTER);
            info!(lane = %self.lane, %client, %uid, "npc defeated");
        }
        if let Some(character) = self.characters.get_mut(&client) {
            character.attacked = true;
        }
        let result = AttackResult {
            target: attack.target,
            remaining_hp,
        };
        if let Err(err) = ctx.send(client, SN_ATTACK_RESULT, &result) {
            warn!(%client, %err, "failed to send attack result");
        }
    }
}

impl World for Skirmish {
    fn on_client_joined(
        &mut self,
        ctx: &mut LaneContext<'_, JsonCodec>,
        client: ClientHandle,
        account: &AccountInfo,
    ) {
        let uid = self.uid();
        let player = self.uid();
        // A client's own character lives at a fixed id in its view.
        if let Some(local) = LocalIdCategory::self_master(CHARACTER_CLASS) {
            ctx.pin_local_id(client, uid, local);
        }
        self.characters.insert(
            client,
            Character {
                uid,
                player,
                name: account.nickname.clone(),
                position: Vec3::ZERO,
                input: MoveInput {
                    dir: Vec2::ZERO,
                    speed: 0.0,
                },
                attacked: false,
            },
        );
    }

    fn on_client_disconnected(&mut self, _ctx: &mut LaneContext<'_, JsonCodec>, client: ClientHandle) {
        self.characters.remove(&client);
    }

    fn handle_message(
        &mut self,
        ctx: &mut LaneContext<'_, JsonCodec>,
        client: ClientHandle,
        unit: &InboundUnit,
    ) {
        match unit.message_type() {
            CN_MOVE => match decode_unit::<_, MoveInput>(&JsonCodec, unit) {
                Ok(input) => {
                    if let Some(character) = self.characters.get_mut(&client) {
                        character.input = input;
                    }
                }
                Err(err) => warn!(%client, %err, "bad move input"),
            },
            CN_ATTACK => match decode_unit::<_, Attack>(&JsonCodec, unit) {
                Ok(attack) => self.attack(ctx, client, attack),
                Err(err) => warn!(%client, %err, "bad attack"),
            },
            other => debug!(%client, message_type = other, "unhandled message"),
        }
    }

    fn step(&mut self, ctx: &mut LaneContext<'_, JsonCodec>, dt: Duration) {
        let mut rng = rand::rng();

        let mut due = 0;
        self.respawns.retain_mut(|left| {
            if *left <= dt {
                due += 1;
                false
            } else {
                *left -= dt;
                true
            }
        });
        for _ in 0..due {
            self.spawn_npc(&mut rng);
        }

        for (_, npc) in self.npcs.iter_mut() {
            npc.wander(dt, &mut rng);
            ctx.push_actor(npc.actor());
        }

        for (&client, character) in &mut self.characters {
            let step = character.input.speed * dt.as_secs_f32();
            character.position.x =
                (character.position.x + character.input.dir.x * step).clamp(-HALF_EXTENT, HALF_EXTENT);
            character.position.z =
                (character.position.z + character.input.dir.y * step).clamp(-HALF_EXTENT, HALF_EXTENT);

            let mut state = ActorState::at(ActorCategory::Character, CHARACTER_CLASS, character.position);
            state.move_dir = character.input.dir;
            state.speed = character.input.speed;
            let mut actor = Actor::new(character.uid, state)
                .owned_by(client)
                .of_player(character.player);
            if std::mem::take(&mut character.attacked) {
                actor = actor.fire(ActionState::new(ACTION_ATTACK));
            }
            ctx.push_actor(actor);
            ctx.push_player(PlayerRecord {
                uid: character.player,
                owner: Some(client),
                name: character.name.clone(),
                team: 0,
                characters: [Some(character.uid), None],
                main: 0,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    laneforge::init_tracing("info");

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_json_file(path)?,
        None => ServerConfig::default(),
    };
    let tokens = (1..=8).fold(TokenTable::new(), |table, i| {
        table.with_token(format!("player{i}"), i, format!("Player {i}"))
    });

    let server = LaneforgeServer::builder(config)
        .authenticator(tokens)
        .start(Skirmish::new)?;
    info!(addr = ?server.local_addr(), "arena running, tokens player1..player8");

    tokio::signal::ctrl_c().await?;
    server.shutdown()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use laneforge::lane::Lane;
    use laneforge::protocol::{ReplicationEvent, encode_unit};
    use laneforge::transport::{ConnectionSlot, OutboundCommand, OutboundQueue};

    use super::*;

    const DT: Duration = Duration::from_millis(33);

    struct Driver {
        lane: Lane<Skirmish>,
        outbound: OutboundQueue,
        tick: u64,
    }

    impl Driver {
        fn new() -> Self {
            let outbound = OutboundQueue::new();
            let lane = Lane::new(
                LaneId(0),
                LaneConfig::default(),
                Skirmish::new(LaneId(0)),
                JsonCodec,
                outbound.clone(),
            );
            Self {
                lane,
                outbound,
                tick: 0,
            }
        }

        fn send<T: Serialize>(&self, client: ClientHandle, message_type: u16, body: &T) {
            let bytes = encode_unit(&JsonCodec, message_type, body).unwrap();
            let unit = InboundUnit::parse(client.slot, bytes).unwrap();
            self.lane.sender().push_packet(client, unit).unwrap();
        }

        fn join(&self, n: u32) -> ClientHandle {
            let client = ClientHandle::new(ConnectionSlot::new(n), 1);
            let account = AccountInfo {
                account_id: u64::from(n),
                nickname: format!("p{n}"),
            };
            self.lane.sender().push_joined(client, account).unwrap();
            self.send(client, message_type::CN_READY_TO_LOAD, &());
            client
        }

        /// Ticks once and returns every unit sent to `client`.
        fn tick(&mut self, client: ClientHandle) -> Vec<InboundUnit> {
            self.tick += 1;
            self.lane.tick(self.tick, DT);
            let mut buf = Vec::new();
            self.outbound.swap_out(&mut buf);
            buf.into_iter()
                .filter_map(|command| match command {
                    OutboundCommand::Send { client: to, bytes } if to == client => {
                        Some(InboundUnit::parse(to.slot, bytes).unwrap())
                    }
                    _ => None,
                })
                .collect()
        }
    }

    fn events(units: &[InboundUnit]) -> Vec<ReplicationEvent> {
        units
            .iter()
            .filter(|u| (message_type::SN_SPAWN..=message_type::SN_TAG).contains(&u.message_type()))
            .map(|u| decode_unit(&JsonCodec, u).unwrap())
            .collect()
    }

    #[test]
    fn test_npc_wander_stays_inside_arena() {
        let mut rng = rand::rng();
        let mut npc = Npc::spawn(ActorUid(1), &mut rng);
        for _ in 0..10_000 {
            npc.wander(Duration::from_millis(100), &mut rng);
            assert!(npc.position.x.abs() <= HALF_EXTENT);
            assert!(npc.position.z.abs() <= HALF_EXTENT);
        }
    }

    #[test]
    fn test_joining_player_sees_npcs_and_pinned_character() {
        let mut driver = Driver::new();
        let client = driver.join(0);
        let spawned = events(&driver.tick(client));

        let mut npcs = 0;
        let mut own = None;
        for event in &spawned {
            if let ReplicationEvent::Spawn { local_id, state } = event {
                match state.state.category {
                    ActorCategory::Npc => npcs += 1,
                    ActorCategory::Character => own = Some((*local_id, state.controlled)),
                }
            }
        }
        assert_eq!(npcs, NPC_COUNT);
        assert_eq!(own, Some((LocalId(21000 + CHARACTER_CLASS), true)));
    }

    #[test]
    fn test_two_hits_defeat_an_npc() {
        let mut driver = Driver::new();
        let client = driver.join(0);
        let target = events(&driver.tick(client))
            .into_iter()
            .find_map(|event| match event {
                ReplicationEvent::Spawn { local_id, state }
                    if state.state.category == ActorCategory::Npc =>
                {
                    Some(local_id)
                }
                _ => None,
            })
            .unwrap();

        driver.send(client, CN_ATTACK, &Attack { target });
        driver.send(client, CN_ATTACK, &Attack { target });
        let units = driver.tick(client);

        let results: Vec<AttackResult> = units
            .iter()
            .filter(|u| u.message_type() == SN_ATTACK_RESULT)
            .map(|u| decode_unit(&JsonCodec, u).unwrap())
            .collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].remaining_hp, NPC_HP - HIT_DAMAGE);
        assert_eq!(results[1].remaining_hp, 0);
        assert!(
            events(&units)
                .iter()
                .any(|e| *e == ReplicationEvent::Destroy { local_id: target })
        );
    }

    #[test]
    fn test_attack_on_unknown_local_id_is_ignored() {
        let mut driver = Driver::new();
        let client = driver.join(0);
        driver.tick(client);

        driver.send(
            client,
            CN_ATTACK,
            &Attack {
                target: LocalId(5999),
            },
        );
        let units = driver.tick(client);
        assert!(units.iter().all(|u| u.message_type() != SN_ATTACK_RESULT));
    }
}
