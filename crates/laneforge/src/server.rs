//! Server builder and running-server handle.
//!
//! This is the entry point for running a Laneforge server. It ties the
//! layers together: transport I/O thread → Coordinator thread → Lane
//! threads, all linked by hand-off queues.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use laneforge_lane::{Lane, LaneHandle, LaneStats, World, spawn_lane};
use laneforge_protocol::{Codec, JsonCodec, LaneId};
use laneforge_session::{AllowAll, Authenticator};
use laneforge_transport::{
    ConnectionSlot, OutboundQueue, Transport, TransportError, WebSocketTransport,
};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::coordinator::spawn_coordinator;
use crate::io::spawn_io;
use crate::{AssignmentTable, Coordinator, LaneforgeError, ServerConfig};

/// Namespace for [`LaneforgeServer::builder`].
pub struct LaneforgeServer;

impl LaneforgeServer {
    /// Starts configuring a server. Defaults to [`AllowAll`] and
    /// [`JsonCodec`].
    pub fn builder(config: ServerConfig) -> ServerBuilder<AllowAll, JsonCodec> {
        ServerBuilder {
            config,
            auth: AllowAll::default(),
            codec: JsonCodec,
        }
    }
}

/// Builder for configuring and starting a Laneforge server.
///
/// # Example
///
/// ```rust,ignore
/// use laneforge::prelude::*;
///
/// let server = LaneforgeServer::builder(ServerConfig::default())
///     .authenticator(TokenTable::new().with_token("secret", 1, "alice"))
///     .start(|lane| MyWorld::new(lane))?;
/// println!("listening on {:?}", server.local_addr());
/// server.wait()?;
/// ```
pub struct ServerBuilder<A, C> {
    config: ServerConfig,
    auth: A,
    codec: C,
}

impl<A, C> ServerBuilder<A, C>
where
    A: Authenticator,
    C: Codec,
{
    pub fn authenticator<B: Authenticator>(self, auth: B) -> ServerBuilder<B, C> {
        ServerBuilder {
            config: self.config,
            auth,
            codec: self.codec,
        }
    }

    pub fn codec<D: Codec>(self, codec: D) -> ServerBuilder<A, D> {
        ServerBuilder {
            config: self.config,
            auth: self.auth,
            codec,
        }
    }

    /// Starts every thread on a WebSocket transport bound to
    /// `config.bind_addr`. `make_world` is called once per lane.
    pub fn start<W, M>(self, make_world: M) -> Result<ServerHandle, LaneforgeError>
    where
        W: World<C>,
        M: FnMut(LaneId) -> W,
    {
        let addr = self.config.bind_addr.clone();
        self.start_with(
            move || async move { WebSocketTransport::bind(&addr).await },
            make_world,
        )
    }

    /// Starts every thread on a custom transport. `bind` runs on the I/O
    /// thread.
    pub fn start_with<T, F, Fut, W, M>(
        self,
        bind: F,
        mut make_world: M,
    ) -> Result<ServerHandle, LaneforgeError>
    where
        T: Transport,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TransportError>> + 'static,
        W: World<C>,
        M: FnMut(LaneId) -> W,
    {
        let config = self.config.validated();
        let outbound = OutboundQueue::new();

        let mut lanes = Vec::with_capacity(usize::from(config.lane_count));
        for index in 0..config.lane_count {
            let id = LaneId(index);
            let lane = Lane::new(
                id,
                config.lane.clone(),
                make_world(id),
                self.codec.clone(),
                outbound.clone(),
            );
            lanes.push(spawn_lane(lane)?);
        }

        let coordinator = Coordinator::new(
            &config,
            self.auth,
            self.codec,
            lanes.iter().map(LaneHandle::sender).collect(),
            outbound.clone(),
        );
        let assignments = coordinator.assignments();

        let io_shutdown = Arc::new(Notify::new());
        let io = spawn_io(
            bind,
            config.max_connections,
            coordinator.events(),
            outbound,
            Arc::clone(&io_shutdown),
        )?;

        let coordinator_stop = Arc::new(AtomicBool::new(false));
        let coordinator = match spawn_coordinator(coordinator, &config, Arc::clone(&coordinator_stop))
        {
            Ok(thread) => thread,
            Err(err) => {
                io_shutdown.notify_one();
                let _ = io.thread.join();
                return Err(err);
            }
        };

        info!(
            addr = ?io.local_addr,
            lanes = lanes.len(),
            max_connections = config.max_connections,
            "laneforge server started"
        );
        Ok(ServerHandle {
            local_addr: io.local_addr,
            lanes,
            assignments,
            io_shutdown,
            io: Some(io.thread),
            coordinator_stop,
            coordinator: Some(coordinator),
        })
    }
}

/// A running server.
///
/// Dropping the handle asks every thread to stop without waiting; call
/// [`ServerHandle::shutdown`] to stop and wait.
pub struct ServerHandle {
    local_addr: Option<SocketAddr>,
    lanes: Vec<LaneHandle>,
    assignments: Arc<AssignmentTable>,
    io_shutdown: Arc<Notify>,
    io: Option<JoinHandle<()>>,
    coordinator_stop: Arc<AtomicBool>,
    coordinator: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// The address clients connect to, if the transport has one.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn lane_stats(&self, lane: LaneId) -> Option<&LaneStats> {
        self.lanes.get(usize::from(lane.0)).map(LaneHandle::stats)
    }

    /// The lane a connection slot is assigned to.
    pub fn assignment(&self, slot: ConnectionSlot) -> Option<LaneId> {
        self.assignments.get(slot)
    }

    /// Blocks until the transport thread exits, then stops the rest.
    pub fn wait(mut self) -> Result<(), LaneforgeError> {
        if let Some(io) = self.io.take() {
            io.join()
                .map_err(|_| LaneforgeError::ThreadPanicked("transport-io"))?;
        }
        self.stop_all()
    }

    /// Stops the transport, the Coordinator and every lane, in that
    /// order, and waits for each.
    pub fn shutdown(mut self) -> Result<(), LaneforgeError> {
        info!("laneforge server shutting down");
        self.io_shutdown.notify_one();
        if let Some(io) = self.io.take() {
            io.join()
                .map_err(|_| LaneforgeError::ThreadPanicked("transport-io"))?;
        }
        self.stop_all()
    }

    fn stop_all(&mut self) -> Result<(), LaneforgeError> {
        self.coordinator_stop.store(true, Ordering::Release);
        if let Some(coordinator) = self.coordinator.take() {
            coordinator
                .join()
                .map_err(|_| LaneforgeError::ThreadPanicked("coordinator"))?;
        }
        let mut result = Ok(());
        for lane in self.lanes.drain(..) {
            let id = lane.id();
            if let Err(err) = lane.join() {
                warn!(lane = %id, %err, "lane did not stop cleanly");
                result = Err(err.into());
            }
        }
        result
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.io_shutdown.notify_one();
        self.coordinator_stop.store(true, Ordering::Release);
        for lane in &self.lanes {
            lane.shutdown();
        }
    }
}
