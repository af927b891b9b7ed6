//! End-to-end tests: a real server on an OS-assigned port driven by
//! `tokio-tungstenite` clients.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use laneforge::prelude::*;
use laneforge::protocol::{
    AuthResult, Authenticate, Hello, HelloAck, PROTOCOL_VERSION, ReplicationEvent, encode_unit,
};
use laneforge::transport::NetHeader;
use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Test world and server
// =========================================================================

/// One NPC plus a character for every client in the lane.
struct Field {
    lane: LaneId,
    next_uid: u64,
    npc: ActorUid,
    characters: HashMap<ClientHandle, ActorUid>,
}

impl Field {
    fn new(lane: LaneId) -> Self {
        let base = u64::from(lane.0) * 1_000_000;
        Self {
            lane,
            next_uid: base + 2,
            npc: ActorUid(base + 1),
            characters: HashMap::new(),
        }
    }
}

impl World for Field {
    fn on_client_joined(
        &mut self,
        ctx: &mut LaneContext<'_, JsonCodec>,
        client: ClientHandle,
        _account: &AccountInfo,
    ) {
        assert_eq!(ctx.lane(), self.lane);
        self.characters.insert(client, ActorUid(self.next_uid));
        self.next_uid += 1;
    }

    fn on_client_disconnected(&mut self, _ctx: &mut LaneContext<'_, JsonCodec>, client: ClientHandle) {
        self.characters.remove(&client);
    }

    fn step(&mut self, ctx: &mut LaneContext<'_, JsonCodec>, _dt: Duration) {
        ctx.push_actor(Actor::new(
            self.npc,
            ActorState::at(ActorCategory::Npc, 7, Vec3::new(10.0, 0.0, 10.0)),
        ));
        for (&client, &uid) in &self.characters {
            ctx.push_actor(
                Actor::new(uid, ActorState::at(ActorCategory::Character, 1, Vec3::ZERO))
                    .owned_by(client),
            );
        }
    }
}

fn start_server(config: ServerConfig) -> ServerHandle {
    let tokens = TokenTable::new()
        .with_token("alice", 1, "alice")
        .with_token("bob", 2, "bob");
    LaneforgeServer::builder(ServerConfig {
        bind_addr: "127.0.0.1:0".into(),
        ..config
    })
    .authenticator(tokens)
    .start(Field::new)
    .expect("server should start")
}

fn one_lane() -> ServerConfig {
    ServerConfig {
        lane_count: 1,
        ..ServerConfig::default()
    }
}

// =========================================================================
// Client helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const WAIT: Duration = Duration::from_secs(5);

async fn connect(server: &ServerHandle) -> ClientWs {
    let addr = server.local_addr().expect("server should have an address");
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send<T: Serialize>(ws: &mut ClientWs, message_type: u16, body: &T) {
    let bytes = encode_unit(&JsonCodec, message_type, body).unwrap();
    ws.send(Message::Binary(bytes.into())).await.expect("send");
}

/// Next unit from the server, or `None` once the connection is closed.
async fn recv(ws: &mut ClientWs) -> Option<InboundUnit> {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for the server");
        match msg {
            Some(Ok(Message::Binary(data))) => {
                let unit = InboundUnit::parse(
                    laneforge::transport::ConnectionSlot::new(0),
                    data.to_vec(),
                )
                .expect("server sent a malformed unit");
                return Some(unit);
            }
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

/// Skips units until one of `message_type` arrives.
async fn recv_type(ws: &mut ClientWs, message_type: u16) -> InboundUnit {
    loop {
        let unit = recv(ws).await.expect("connection closed early");
        if unit.message_type() == message_type {
            return unit;
        }
    }
}

async fn expect_closed(ws: &mut ClientWs) {
    while recv(ws).await.is_some() {}
}

async fn hello(ws: &mut ClientWs) -> HelloAck {
    let body = Hello {
        protocol_version: PROTOCOL_VERSION,
    };
    send(ws, message_type::CN_HELLO, &body).await;
    decode_unit(&JsonCodec, &recv_type(ws, message_type::SN_HELLO).await).unwrap()
}

async fn authenticate(ws: &mut ClientWs, token: &str) -> AuthResult {
    let body = Authenticate {
        token: token.into(),
    };
    send(ws, message_type::CN_AUTHENTICATE, &body).await;
    decode_unit(&JsonCodec, &recv_type(ws, message_type::SN_AUTH_RESULT).await).unwrap()
}

/// Handshake, authenticate and enter the game.
async fn join(server: &ServerHandle, token: &str) -> ClientWs {
    let mut ws = connect(server).await;
    assert!(hello(&mut ws).await.accepted);
    assert!(authenticate(&mut ws, token).await.ok);
    send(&mut ws, message_type::CN_READY_TO_LOAD, &()).await;
    ws
}

async fn next_event(ws: &mut ClientWs) -> ReplicationEvent {
    loop {
        let unit = recv(ws).await.expect("connection closed early");
        if matches!(
            unit.message_type(),
            message_type::SN_SPAWN
                | message_type::SN_UPDATE
                | message_type::SN_DESTROY
                | message_type::SN_TAG
        ) {
            return decode_unit(&JsonCodec, &unit).unwrap();
        }
    }
}

async fn spawns(ws: &mut ClientWs, count: usize) -> Vec<(LocalId, bool, ActorCategory)> {
    let mut seen = Vec::new();
    while seen.len() < count {
        if let ReplicationEvent::Spawn { local_id, state } = next_event(ws).await {
            seen.push((local_id, state.controlled, state.state.category));
        }
    }
    seen
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_login_and_enter_game_spawns_world() {
    let server = start_server(one_lane());
    let mut ws = join(&server, "alice").await;

    let mut seen = spawns(&mut ws, 2).await;
    seen.sort_by_key(|s| s.0);
    let (npc_id, npc_controlled, npc_category) = seen[0];
    assert!((5000..21000).contains(&npc_id.0));
    assert!(!npc_controlled);
    assert_eq!(npc_category, ActorCategory::Npc);
    let (own_id, own_controlled, own_category) = seen[1];
    assert!((21100..30000).contains(&own_id.0));
    assert!(own_controlled);
    assert_eq!(own_category, ActorCategory::Character);

    send(&mut ws, message_type::CN_MAP_LOADED, &()).await;
    recv_type(&mut ws, message_type::SN_LOADING_COMPLETE).await;

    assert_eq!(server.lane_stats(LaneId(0)).unwrap().clients(), 1);
    server.shutdown().expect("clean shutdown");
}

#[tokio::test]
async fn test_version_mismatch_is_refused_and_closed() {
    let server = start_server(one_lane());
    let mut ws = connect(&server).await;

    let body = Hello {
        protocol_version: PROTOCOL_VERSION + 7,
    };
    send(&mut ws, message_type::CN_HELLO, &body).await;
    let ack: HelloAck =
        decode_unit(&JsonCodec, &recv_type(&mut ws, message_type::SN_HELLO).await).unwrap();
    assert!(!ack.accepted);
    expect_closed(&mut ws).await;

    server.shutdown().expect("clean shutdown");
}

#[tokio::test]
async fn test_unknown_token_is_rejected_and_closed() {
    let server = start_server(one_lane());
    let mut ws = connect(&server).await;

    assert!(hello(&mut ws).await.accepted);
    let result = authenticate(&mut ws, "nobody").await;
    assert!(!result.ok);
    assert!(result.account.is_none());
    expect_closed(&mut ws).await;

    server.shutdown().expect("clean shutdown");
}

#[tokio::test]
async fn test_other_client_appears_and_disappears() {
    let server = start_server(one_lane());
    let mut alice = join(&server, "alice").await;
    spawns(&mut alice, 2).await;

    let mut bob = join(&server, "bob").await;
    let bob_seen = spawns(&mut bob, 3).await;
    assert_eq!(bob_seen.iter().filter(|s| s.1).count(), 1);

    let (bob_in_alice, controlled, category) = spawns(&mut alice, 1).await[0];
    assert!(!controlled);
    assert_eq!(category, ActorCategory::Character);

    bob.close(None).await.expect("close");
    loop {
        if let ReplicationEvent::Destroy { local_id } = next_event(&mut alice).await {
            assert_eq!(local_id, bob_in_alice);
            break;
        }
    }

    server.shutdown().expect("clean shutdown");
}

#[tokio::test]
async fn test_malformed_unit_closes_connection() {
    let server = start_server(one_lane());
    let mut ws = connect(&server).await;

    // Declares 9 bytes but carries 4.
    let mut bytes = Vec::new();
    NetHeader {
        total_size: 9,
        message_type: message_type::CN_HELLO,
    }
    .write(&mut bytes);
    ws.send(Message::Binary(bytes.into())).await.unwrap();
    expect_closed(&mut ws).await;

    server.shutdown().expect("clean shutdown");
}

#[tokio::test]
async fn test_connections_beyond_limit_are_closed() {
    let server = start_server(ServerConfig {
        max_connections: 1,
        ..one_lane()
    });
    let mut first = connect(&server).await;
    let mut second = connect(&server).await;

    expect_closed(&mut second).await;
    assert!(hello(&mut first).await.accepted);

    server.shutdown().expect("clean shutdown");
}

#[tokio::test]
async fn test_clients_spread_across_lanes() {
    let server = start_server(ServerConfig {
        lane_count: 2,
        ..ServerConfig::default()
    });
    let mut alice = join(&server, "alice").await;
    let mut bob = join(&server, "bob").await;

    // Each lane holds one NPC and one character.
    spawns(&mut alice, 2).await;
    spawns(&mut bob, 2).await;
    assert_eq!(server.lane_count(), 2);
    assert_eq!(server.lane_stats(LaneId(0)).unwrap().clients(), 1);
    assert_eq!(server.lane_stats(LaneId(1)).unwrap().clients(), 1);

    server.shutdown().expect("clean shutdown");
}
