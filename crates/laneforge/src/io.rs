//! The transport I/O thread.
//!
//! The only thread that blocks on the network. It hosts a single-threaded
//! Tokio runtime with:
//!
//! - an acceptor task that takes connections from the [`Transport`],
//! - one reader and one writer task per connection,
//! - the pump, which hands out connection slots, routes the shared
//!   [`OutboundQueue`] to writers and reports connects/disconnects.
//!
//! Each admitted connection gets a fresh generation for its slot. The
//! pump only delivers a command to a writer when the command's
//! [`ClientHandle`] matches the live link, so bytes a lane produced for
//! a departed client never reach the slot's next occupant.
//!
//! Everything inbound lands in the Coordinator's event queue as whole
//! [`InboundUnit`]s, in receive order per slot.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};

use laneforge_transport::{
    ClientHandle, Connection, ConnectionSlot, HandoffQueue, InboundUnit, OutboundCommand, OutboundQueue,
    Transport, TransportError, TransportEvent,
};
use tokio::sync::{Notify, mpsc as chan};
use tokio::task::LocalSet;
use tracing::{debug, error, info, warn};

use crate::LaneforgeError;

// ---------------------------------------------------------------------------
// SlotTable
// ---------------------------------------------------------------------------

/// Hands out connection slots up to a fixed capacity.
///
/// Every acquire bumps the slot's generation. Released slots are reused
/// oldest-first.
#[derive(Debug)]
pub(crate) struct SlotTable {
    capacity: usize,
    live: usize,
    /// Last generation handed out, indexed by slot.
    generations: Vec<u32>,
    released: VecDeque<ConnectionSlot>,
}

impl SlotTable {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            live: 0,
            generations: Vec::new(),
            released: VecDeque::new(),
        }
    }

    pub(crate) fn acquire(&mut self) -> Option<ClientHandle> {
        if self.live >= self.capacity {
            return None;
        }
        let slot = match self.released.pop_front() {
            Some(slot) => slot,
            None => {
                let index = u32::try_from(self.generations.len()).ok()?;
                self.generations.push(0);
                ConnectionSlot::new(index)
            }
        };
        let generation = self.generations.get_mut(slot.index() as usize)?;
        *generation = generation.wrapping_add(1);
        self.live += 1;
        Some(ClientHandle::new(slot, *generation))
    }

    pub(crate) fn release(&mut self, slot: ConnectionSlot) {
        debug_assert!(!self.released.contains(&slot), "{slot} released twice");
        self.live = self.live.saturating_sub(1);
        self.released.push_back(slot);
    }

    pub(crate) fn live(&self) -> usize {
        self.live
    }
}

// ---------------------------------------------------------------------------
// Thread
// ---------------------------------------------------------------------------

/// Running I/O thread.
pub(crate) struct IoThread {
    pub(crate) thread: JoinHandle<()>,
    pub(crate) local_addr: Option<SocketAddr>,
}

/// Starts the I/O thread and waits until the transport is bound.
///
/// `bind` runs on the I/O thread's runtime, so listeners are registered
/// with the reactor that will poll them.
pub(crate) fn spawn_io<T, F, Fut>(
    bind: F,
    max_connections: usize,
    events: Arc<HandoffQueue<TransportEvent>>,
    outbound: OutboundQueue,
    shutdown: Arc<Notify>,
) -> Result<IoThread, LaneforgeError>
where
    T: Transport,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, TransportError>> + 'static,
{
    let (ready_tx, ready_rx) = mpsc::channel::<Result<Option<SocketAddr>, LaneforgeError>>();

    let thread = thread::Builder::new()
        .name("transport-io".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    let _ = ready_tx.send(Err(err.into()));
                    return;
                }
            };
            let local = LocalSet::new();
            local.block_on(&runtime, async move {
                let transport = match bind().await {
                    Ok(transport) => transport,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.into()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(transport.bound_addr()));
                Pump::new(max_connections, events, outbound)
                    .run(transport, shutdown)
                    .await;
            });
        })
        .map_err(|source| LaneforgeError::ThreadSpawn {
            name: "transport-io",
            source,
        })?;

    match ready_rx.recv() {
        Ok(Ok(local_addr)) => Ok(IoThread { thread, local_addr }),
        Ok(Err(err)) => {
            let _ = thread.join();
            Err(err)
        }
        Err(_) => {
            let _ = thread.join();
            Err(LaneforgeError::ThreadPanicked("transport-io"))
        }
    }
}

// ---------------------------------------------------------------------------
// Pump
// ---------------------------------------------------------------------------

enum Write {
    Bytes(Vec<u8>),
    Close,
}

/// The pump's end of one live connection.
struct Link {
    client: ClientHandle,
    writes: chan::UnboundedSender<Write>,
}

struct Pump {
    slots: SlotTable,
    links: HashMap<ConnectionSlot, Link>,
    events: Arc<HandoffQueue<TransportEvent>>,
    outbound: OutboundQueue,
    scratch: Vec<OutboundCommand>,
}

impl Pump {
    fn new(
        max_connections: usize,
        events: Arc<HandoffQueue<TransportEvent>>,
        outbound: OutboundQueue,
    ) -> Self {
        Self {
            slots: SlotTable::new(max_connections),
            links: HashMap::new(),
            events,
            outbound,
            scratch: Vec::new(),
        }
    }

    async fn run<T: Transport>(mut self, transport: T, shutdown: Arc<Notify>) {
        let (accepted_tx, mut accepted_rx) = chan::unbounded_channel();
        let (ended_tx, mut ended_rx) = chan::unbounded_channel::<ConnectionSlot>();
        tokio::task::spawn_local(accept_loop(transport, accepted_tx));
        info!(max_connections = self.slots.capacity, "transport pump running");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => break,
                Some(slot) = ended_rx.recv() => self.on_ended(slot),
                _ = self.outbound.notified() => self.flush_outbound(),
                accepted = accepted_rx.recv() => match accepted {
                    Some(conn) => self.admit(conn, &ended_tx),
                    None => {
                        error!("acceptor stopped, transport pump exiting");
                        break;
                    }
                },
            }
        }
        info!(live = self.slots.live(), "transport pump stopped");
    }

    fn admit<C: Connection>(&mut self, conn: C, ended: &chan::UnboundedSender<ConnectionSlot>) {
        let conn = Rc::new(conn);
        let Some(client) = self.slots.acquire() else {
            warn!("connection limit reached, refusing connection");
            tokio::task::spawn_local(async move {
                let _ = conn.close().await;
            });
            return;
        };

        let slot = client.slot;
        // Connected is queued before any unit the reader can produce.
        self.events.push(TransportEvent::Connected(client));
        let (writes_tx, writes_rx) = chan::unbounded_channel();
        let closing = Rc::new(Notify::new());
        tokio::task::spawn_local(read_loop(
            slot,
            Rc::clone(&conn),
            Rc::clone(&closing),
            Arc::clone(&self.events),
            ended.clone(),
        ));
        tokio::task::spawn_local(write_loop(slot, conn, closing, writes_rx));
        self.links.insert(
            slot,
            Link {
                client,
                writes: writes_tx,
            },
        );
        debug!(%client, live = self.slots.live(), "connection admitted");
    }

    /// The reader for `slot` is done; every unit it produced is queued.
    fn on_ended(&mut self, slot: ConnectionSlot) {
        // Dropping the link lets the writer drain and close.
        self.links.remove(&slot);
        self.slots.release(slot);
        self.events.push(TransportEvent::Disconnected(slot));
        debug!(%slot, live = self.slots.live(), "connection ended");
    }

    fn flush_outbound(&mut self) {
        self.outbound.swap_out(&mut self.scratch);
        for command in self.scratch.drain(..) {
            let (client, write) = match command {
                OutboundCommand::Send { client, bytes } => (client, Write::Bytes(bytes)),
                OutboundCommand::Close { client } => (client, Write::Close),
            };
            match self.links.get(&client.slot) {
                Some(link) if link.client == client => {
                    let _ = link.writes.send(write);
                }
                Some(link) => {
                    debug!(%client, current = %link.client, "outbound for a previous occupant dropped")
                }
                None => debug!(%client, "outbound for closed slot dropped"),
            }
        }
    }
}

async fn accept_loop<T: Transport>(mut transport: T, accepted: chan::UnboundedSender<T::Connection>) {
    loop {
        match transport.accept().await {
            Ok(conn) => {
                if accepted.send(conn).is_err() {
                    return;
                }
            }
            Err(err) => warn!(%err, "accept failed"),
        }
    }
}

async fn read_loop<C: Connection>(
    slot: ConnectionSlot,
    conn: Rc<C>,
    closing: Rc<Notify>,
    events: Arc<HandoffQueue<TransportEvent>>,
    ended: chan::UnboundedSender<ConnectionSlot>,
) {
    loop {
        let received = tokio::select! {
            _ = closing.notified() => break,
            received = conn.recv() => received,
        };
        match received {
            Ok(Some(bytes)) => match InboundUnit::parse(slot, bytes) {
                Ok(unit) => events.push(TransportEvent::Unit(unit)),
                Err(err) => {
                    warn!(%slot, %err, "malformed unit, closing connection");
                    break;
                }
            },
            Ok(None) => {
                debug!(%slot, "peer closed connection");
                break;
            }
            Err(err) => {
                debug!(%slot, %err, "receive failed");
                break;
            }
        }
    }
    let _ = ended.send(slot);
}

async fn write_loop<C: Connection>(
    slot: ConnectionSlot,
    conn: Rc<C>,
    closing: Rc<Notify>,
    mut writes: chan::UnboundedReceiver<Write>,
) {
    while let Some(write) = writes.recv().await {
        match write {
            Write::Bytes(bytes) => {
                if let Err(err) = conn.send(&bytes).await {
                    debug!(%slot, %err, "send failed");
                    break;
                }
            }
            Write::Close => {
                debug!(%slot, "closing connection on request");
                break;
            }
        }
    }
    closing.notify_one();
    let _ = conn.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(slot: u32, generation: u32) -> ClientHandle {
        ClientHandle::new(ConnectionSlot::new(slot), generation)
    }

    #[test]
    fn test_slot_table_hands_out_fresh_slots_in_order() {
        let mut slots = SlotTable::new(4);
        assert_eq!(slots.acquire(), Some(handle(0, 1)));
        assert_eq!(slots.acquire(), Some(handle(1, 1)));
        assert_eq!(slots.live(), 2);
    }

    #[test]
    fn test_slot_table_full_refuses() {
        let mut slots = SlotTable::new(1);
        assert!(slots.acquire().is_some());
        assert_eq!(slots.acquire(), None);
    }

    #[test]
    fn test_slot_table_reuses_oldest_release_first() {
        let mut slots = SlotTable::new(3);
        let a = slots.acquire().unwrap().slot;
        let b = slots.acquire().unwrap().slot;
        let c = slots.acquire().unwrap().slot;
        slots.release(b);
        slots.release(a);
        slots.release(c);

        assert_eq!(slots.acquire().map(|h| h.slot), Some(b));
        assert_eq!(slots.acquire().map(|h| h.slot), Some(a));
        assert_eq!(slots.acquire().map(|h| h.slot), Some(c));
        assert_eq!(slots.acquire(), None);
    }

    #[test]
    fn test_slot_table_reused_slot_gets_next_generation() {
        let mut slots = SlotTable::new(1);
        let first = slots.acquire().unwrap();
        slots.release(first.slot);
        let second = slots.acquire().unwrap();

        assert_eq!(second.slot, first.slot);
        assert_eq!(second.generation, first.generation + 1);
    }

    /// A pump with one live link for `client`, returning the writer's
    /// receiving end.
    fn pump_with_link(client: ClientHandle) -> (Pump, chan::UnboundedReceiver<Write>) {
        let mut pump = Pump::new(4, Arc::new(HandoffQueue::new()), OutboundQueue::new());
        let (writes, rx) = chan::unbounded_channel();
        pump.links.insert(client.slot, Link { client, writes });
        (pump, rx)
    }

    fn drain(rx: &mut chan::UnboundedReceiver<Write>) -> Vec<Write> {
        let mut writes = Vec::new();
        while let Ok(write) = rx.try_recv() {
            writes.push(write);
        }
        writes
    }

    #[test]
    fn test_pump_delivers_outbound_to_current_occupant() {
        let client = handle(0, 2);
        let (mut pump, mut rx) = pump_with_link(client);
        pump.outbound.send(client, vec![7]);
        pump.outbound.close(client);
        pump.flush_outbound();

        let writes = drain(&mut rx);
        assert_eq!(writes.len(), 2);
        assert!(matches!(&writes[0], Write::Bytes(bytes) if bytes == &[7]));
        assert!(matches!(writes[1], Write::Close));
    }

    #[test]
    fn test_pump_drops_outbound_for_previous_occupant() {
        let previous = handle(0, 1);
        let current = handle(0, 2);
        let (mut pump, mut rx) = pump_with_link(current);
        pump.outbound.send(previous, vec![1]);
        pump.outbound.close(previous);
        pump.outbound.send(current, vec![2]);
        pump.flush_outbound();

        let writes = drain(&mut rx);
        assert_eq!(writes.len(), 1);
        assert!(matches!(&writes[0], Write::Bytes(bytes) if bytes == &[2]));
        assert!(pump.outbound.is_empty());
    }

    #[test]
    fn test_pump_drops_outbound_for_closed_slot() {
        let (mut pump, mut rx) = pump_with_link(handle(0, 1));
        pump.outbound.send(handle(3, 1), vec![1]);
        pump.flush_outbound();
        assert!(drain(&mut rx).is_empty());
    }
}
