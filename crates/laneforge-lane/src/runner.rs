//! Runs a Lane on its own OS thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use laneforge_protocol::{AccountInfo, ClientHandle, Codec, LaneId};
use laneforge_tick::TickPacer;
use laneforge_transport::InboundUnit;
use tracing::{debug, error, info};

use crate::{Lane, LaneError, LaneInbox, LaneStats, World};

/// Cheap, cloneable feeding end of a running lane.
///
/// The Coordinator keeps one per lane.
#[derive(Debug, Clone)]
pub struct LaneSender {
    id: LaneId,
    inbox: Arc<LaneInbox>,
    stats: Arc<LaneStats>,
    stopping: Arc<AtomicBool>,
}

impl LaneSender {
    pub fn id(&self) -> LaneId {
        self.id
    }

    pub fn stats(&self) -> &LaneStats {
        &self.stats
    }

    pub fn push_joined(&self, client: ClientHandle, account: AccountInfo) -> Result<(), LaneError> {
        self.check_running()?;
        self.inbox.push_joined(client, account);
        Ok(())
    }

    pub fn push_packet(&self, client: ClientHandle, unit: InboundUnit) -> Result<(), LaneError> {
        self.check_running()?;
        self.inbox.push_packet(client, unit);
        Ok(())
    }

    /// Disconnect notices are accepted even while stopping.
    pub fn push_disconnect(&self, client: ClientHandle) {
        self.inbox.push_disconnect(client);
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    fn check_running(&self) -> Result<(), LaneError> {
        if self.is_stopping() {
            return Err(LaneError::ShuttingDown(self.id));
        }
        Ok(())
    }
}

impl<W, C> Lane<W, C>
where
    W: World<C>,
    C: Codec,
{
    /// A feeding end for this lane when it is driven by hand through
    /// [`Lane::tick`] rather than [`spawn_lane`].
    pub fn sender(&self) -> LaneSender {
        LaneSender {
            id: self.id(),
            inbox: self.inbox(),
            stats: self.stats(),
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Owning handle to a lane thread.
///
/// Dropping it asks the lane to stop but does not wait; call
/// [`LaneHandle::join`] to wait.
#[derive(Debug)]
pub struct LaneHandle {
    sender: LaneSender,
    thread: Option<JoinHandle<()>>,
}

impl LaneHandle {
    pub fn id(&self) -> LaneId {
        self.sender.id
    }

    pub fn sender(&self) -> LaneSender {
        self.sender.clone()
    }

    pub fn stats(&self) -> &LaneStats {
        self.sender.stats()
    }

    pub fn push_joined(&self, client: ClientHandle, account: AccountInfo) -> Result<(), LaneError> {
        self.sender.push_joined(client, account)
    }

    pub fn push_packet(&self, client: ClientHandle, unit: InboundUnit) -> Result<(), LaneError> {
        self.sender.push_packet(client, unit)
    }

    pub fn push_disconnect(&self, client: ClientHandle) {
        self.sender.push_disconnect(client);
    }

    /// Asks the lane to stop after its current tick.
    pub fn shutdown(&self) {
        if !self.sender.stopping.swap(true, Ordering::AcqRel) {
            debug!(lane = %self.sender.id, "lane shutdown requested");
        }
    }

    /// Stops the lane and waits for its thread.
    pub fn join(mut self) -> Result<(), LaneError> {
        self.shutdown();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| LaneError::Panicked(self.sender.id)),
            None => Ok(()),
        }
    }
}

impl Drop for LaneHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Starts `lane` on a dedicated thread named `lane-<n>`.
///
/// The thread paces itself with a [`TickPacer`] at the lane's tick
/// rate and exits once [`LaneHandle::shutdown`] is called.
pub fn spawn_lane<W, C>(mut lane: Lane<W, C>) -> Result<LaneHandle, LaneError>
where
    W: World<C>,
    C: Codec,
{
    let id = lane.id();
    let sender = lane.sender();
    let stopping = Arc::clone(&sender.stopping);
    let tick_config = lane.config().tick_config();

    let thread = thread::Builder::new()
        .name(format!("lane-{}", id.0))
        .spawn(move || {
            let mut pacer = TickPacer::new(tick_config);
            info!(lane = %id, rate_hz = pacer.rate_hz(), "lane started");
            pacer.run_until(&stopping, |tick| {
                lane.tick(tick.number, tick.dt);
            });
            let stats = pacer.stats();
            info!(
                lane = %id,
                ticks = stats.ticks,
                late = stats.late_ticks,
                busy_avg_us = stats.busy_avg.as_micros() as u64,
                "lane stopped"
            );
        })
        .map_err(|source| {
            error!(lane = %id, %source, "failed to spawn lane thread");
            LaneError::Spawn { lane: id, source }
        })?;

    Ok(LaneHandle {
        sender,
        thread: Some(thread),
    })
}
