//! Per-slot session records.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use laneforge_protocol::{AccountInfo, ClientHandle, LaneId};
use laneforge_transport::ConnectionSlot;
use tracing::{debug, info};

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// Where a connection is in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    AwaitingHello,
    AwaitingAuth,
    /// Authenticated and bound to a lane; traffic is forwarded there.
    Assigned(LaneId),
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingHello => f.write_str("awaiting hello"),
            Self::AwaitingAuth => f.write_str("awaiting auth"),
            Self::Assigned(lane) => write!(f, "assigned to {lane}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The Coordinator's record of one live connection.
#[derive(Debug, Clone)]
pub struct Session {
    handle: ClientHandle,
    phase: SessionPhase,
    account: Option<AccountInfo>,
    opened_at: Instant,
    /// A close was requested; further traffic is ignored.
    closing: bool,
}

impl Session {
    pub fn handle(&self) -> ClientHandle {
        self.handle
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn account(&self) -> Option<&AccountInfo> {
        self.account.as_ref()
    }

    pub fn lane(&self) -> Option<LaneId> {
        match self.phase {
            SessionPhase::Assigned(lane) => Some(lane),
            _ => None,
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Session records keyed by connection slot.
///
/// Owned by the Coordinator thread; not shared.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionSlot, Session>,
    /// Account id → slot, for duplicate-login checks.
    accounts: HashMap<u64, ConnectionSlot>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a session for a newly connected client.
    ///
    /// The handle comes from the transport, which owns slot generations.
    pub fn open(&mut self, handle: ClientHandle) -> Result<ClientHandle, SessionError> {
        let slot = handle.slot;
        if self.sessions.contains_key(&slot) {
            return Err(SessionError::AlreadyOpen(slot));
        }

        self.sessions.insert(
            slot,
            Session {
                handle,
                phase: SessionPhase::AwaitingHello,
                account: None,
                opened_at: Instant::now(),
                closing: false,
            },
        );
        debug!(client = %handle, "session opened");
        Ok(handle)
    }

    /// Releases a slot's record.
    pub fn close(&mut self, slot: ConnectionSlot) -> Option<Session> {
        let session = self.sessions.remove(&slot)?;
        if let Some(account) = &session.account {
            if self.accounts.get(&account.account_id) == Some(&slot) {
                self.accounts.remove(&account.account_id);
            }
        }
        debug!(client = %session.handle, phase = %session.phase, "session closed");
        Some(session)
    }

    /// `AwaitingHello → AwaitingAuth`.
    pub fn hello(&mut self, slot: ConnectionSlot) -> Result<ClientHandle, SessionError> {
        let session = session_in(
            &mut self.sessions,
            slot,
            SessionPhase::AwaitingHello,
            "awaiting hello",
        )?;
        session.phase = SessionPhase::AwaitingAuth;
        Ok(session.handle)
    }

    /// Checks that `slot` may authenticate now.
    pub fn expect_auth(&mut self, slot: ConnectionSlot) -> Result<ClientHandle, SessionError> {
        session_in(&mut self.sessions, slot, SessionPhase::AwaitingAuth, "awaiting auth")
            .map(|s| s.handle)
    }

    /// `AwaitingAuth → Assigned(lane)`, binding the account to this slot.
    pub fn assign(
        &mut self,
        slot: ConnectionSlot,
        account: AccountInfo,
        lane: LaneId,
    ) -> Result<ClientHandle, SessionError> {
        if matches!(self.accounts.get(&account.account_id), Some(&other) if other != slot) {
            return Err(SessionError::AccountInUse(account.account_id));
        }
        let session = session_in(
            &mut self.sessions,
            slot,
            SessionPhase::AwaitingAuth,
            "awaiting auth",
        )?;
        session.phase = SessionPhase::Assigned(lane);
        let handle = session.handle;
        info!(
            client = %handle,
            %lane,
            account_id = account.account_id,
            nickname = %account.nickname,
            "client assigned to lane"
        );
        self.accounts.insert(account.account_id, slot);
        session.account = Some(account);
        Ok(handle)
    }

    /// Flags a session so later traffic on it is ignored until the
    /// transport reports the disconnect.
    pub fn mark_closing(&mut self, slot: ConnectionSlot) {
        if let Some(session) = self.sessions.get_mut(&slot) {
            session.closing = true;
        }
    }

    /// Flags and returns every unassigned session older than `timeout`.
    ///
    /// Each session is returned once; the caller is expected to close it.
    pub fn expire_stale(&mut self, timeout: Duration) -> Vec<ClientHandle> {
        let mut expired = Vec::new();
        for session in self.sessions.values_mut() {
            if session.closing || session.lane().is_some() || session.age() <= timeout {
                continue;
            }
            session.closing = true;
            info!(client = %session.handle, phase = %session.phase, "handshake timed out");
            expired.push(session.handle);
        }
        expired.sort();
        expired
    }

    pub fn get(&self, slot: ConnectionSlot) -> Option<&Session> {
        self.sessions.get(&slot)
    }

    pub fn handle(&self, slot: ConnectionSlot) -> Option<ClientHandle> {
        self.sessions.get(&slot).map(Session::handle)
    }

    pub fn lane_of(&self, slot: ConnectionSlot) -> Option<LaneId> {
        self.sessions.get(&slot).and_then(Session::lane)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn session_in<'a>(
    sessions: &'a mut HashMap<ConnectionSlot, Session>,
    slot: ConnectionSlot,
    phase: SessionPhase,
    expected: &'static str,
) -> Result<&'a mut Session, SessionError> {
    let session = sessions.get_mut(&slot).ok_or(SessionError::NotFound(slot))?;
    if session.phase != phase {
        return Err(SessionError::UnexpectedPhase {
            slot,
            phase: session.phase,
            expected,
        });
    }
    Ok(session)
}
