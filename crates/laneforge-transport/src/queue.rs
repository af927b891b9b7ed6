//! Hand-off queues between threads.
//!
//! Every piece of state shared between the transport thread, the
//! Coordinator and the Lanes goes through one of these. A queue is a
//! growable buffer behind one mutex: producers append under the lock,
//! the consumer swaps the whole buffer out under the lock and then
//! processes it with the lock released. Lock hold time is bounded by a
//! push or a pointer swap, never by message processing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::{ClientHandle, ConnectionSlot};

// ---------------------------------------------------------------------------
// HandoffQueue
// ---------------------------------------------------------------------------

/// Multi-producer, single-consumer append/swap buffer.
#[derive(Debug)]
pub struct HandoffQueue<T> {
    items: Mutex<Vec<T>>,
}

impl<T> HandoffQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    /// Creates an empty queue with room for `capacity` items.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Appends one item.
    pub fn push(&self, item: T) {
        self.lock().push(item);
    }

    /// Appends many items under a single lock.
    pub fn extend<I: IntoIterator<Item = T>>(&self, items: I) {
        self.lock().extend(items);
    }

    /// Swaps the queued items into `buf`.
    ///
    /// `buf` should be empty; its allocation is handed back to the queue
    /// so the two buffers ping-pong instead of reallocating every drain.
    pub fn swap_out(&self, buf: &mut Vec<T>) {
        debug_assert!(buf.is_empty(), "swap_out into a non-empty buffer");
        std::mem::swap(&mut *self.lock(), buf);
    }

    /// Takes everything queued, leaving a fresh empty buffer behind.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.lock())
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panicking producer cannot leave a half-pushed `Vec`, so the
    // buffer behind a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// OutboundQueue
// ---------------------------------------------------------------------------

/// A request for the transport thread.
///
/// Commands name the connection by [`ClientHandle`]. The transport drops
/// any command whose generation is not the slot's current occupant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Deliver an already framed unit to a client.
    Send { client: ClientHandle, bytes: Vec<u8> },
    /// Close a client's connection.
    Close { client: ClientHandle },
}

impl OutboundCommand {
    /// The connection this command is addressed to.
    pub fn client(&self) -> ClientHandle {
        match self {
            Self::Send { client, .. } | Self::Close { client } => *client,
        }
    }

    /// Shorthand for `self.client().slot`.
    pub fn slot(&self) -> ConnectionSlot {
        self.client().slot
    }
}

#[derive(Debug, Default)]
struct OutboundInner {
    queue: HandoffQueue<OutboundCommand>,
    notify: Notify,
}

/// Lane/Coordinator → transport queue.
///
/// Producers are plain threads; the consumer is the transport's async
/// pump, which parks on [`OutboundQueue::notified`] until something is
/// pushed. Cloning is cheap (it's an `Arc`).
#[derive(Debug, Clone, Default)]
pub struct OutboundQueue {
    inner: Arc<OutboundInner>,
}

impl OutboundQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes for a client and wakes the pump.
    pub fn send(&self, client: ClientHandle, bytes: Vec<u8>) {
        self.inner.queue.push(OutboundCommand::Send { client, bytes });
        self.inner.notify.notify_one();
    }

    /// Queues many commands under one lock and wakes the pump once.
    pub fn send_batch<I>(&self, commands: I)
    where
        I: IntoIterator<Item = OutboundCommand>,
    {
        self.inner.queue.extend(commands);
        self.inner.notify.notify_one();
    }

    /// Asks the transport to close a client's connection.
    pub fn close(&self, client: ClientHandle) {
        self.inner.queue.push(OutboundCommand::Close { client });
        self.inner.notify.notify_one();
    }

    /// Swaps out everything queued (see [`HandoffQueue::swap_out`]).
    pub fn swap_out(&self, buf: &mut Vec<OutboundCommand>) {
        self.inner.queue.swap_out(buf);
    }

    /// Waits until a producer pushes something.
    ///
    /// A push that happens while nobody waits leaves a permit behind, so
    /// the next call returns immediately and nothing is missed.
    pub async fn notified(&self) {
        self.inner.notify.notified().await;
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handoff_swap_out_returns_items_in_push_order() {
        let queue = HandoffQueue::new();
        queue.push(1);
        queue.push(2);
        queue.extend([3, 4]);

        let mut buf = Vec::new();
        queue.swap_out(&mut buf);
        assert_eq!(buf, vec![1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_handoff_swap_out_recycles_allocation() {
        let queue: HandoffQueue<u32> = HandoffQueue::new();
        let mut buf = Vec::with_capacity(64);
        queue.swap_out(&mut buf);
        assert!(buf.is_empty());
        // The 64-slot allocation now lives inside the queue.
        queue.push(9);
        let taken = queue.take();
        assert!(taken.capacity() >= 64);
    }

    #[test]
    fn test_handoff_concurrent_producers_lose_nothing() {
        let queue = Arc::new(HandoffQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        queue.push(t * 1000 + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let mut items = queue.take();
        assert_eq!(items.len(), 1000);
        // Per-producer order is preserved.
        for t in 0..4 {
            let mine: Vec<_> =
                items.iter().copied().filter(|v| v / 1000 == t).collect();
            let mut sorted = mine.clone();
            sorted.sort();
            assert_eq!(mine, sorted);
        }
        items.sort();
        items.dedup();
        assert_eq!(items.len(), 1000);
    }

    #[tokio::test]
    async fn test_outbound_push_before_wait_does_not_block() {
        let queue = OutboundQueue::new();
        let client = ClientHandle::new(ConnectionSlot::new(1), 1);
        queue.send(client, vec![1]);
        queue.notified().await;

        let mut buf = Vec::new();
        queue.swap_out(&mut buf);
        assert_eq!(
            buf,
            vec![OutboundCommand::Send {
                client,
                bytes: vec![1]
            }]
        );
    }

    #[test]
    fn test_outbound_close_is_queued() {
        let queue = OutboundQueue::new();
        let client = ClientHandle::new(ConnectionSlot::new(4), 3);
        queue.close(client);
        assert_eq!(queue.len(), 1);

        let command = queue_take(&queue).remove(0);
        assert_eq!(command.client(), client);
        assert_eq!(command.slot(), ConnectionSlot::new(4));
    }

    fn queue_take(queue: &OutboundQueue) -> Vec<OutboundCommand> {
        let mut buf = Vec::new();
        queue.swap_out(&mut buf);
        buf
    }
}
