//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable** but non-blocking: the exchange context calls
//! `.wait()` before it trusts that a buffer is ready.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;

/// Message tag, namespaced per exchange kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommTag(pub u16);

impl CommTag {
    /// Owner -> ghost scatter of zipped values (unzip and zip finalisation).
    pub const GHOST_SCATTER: CommTag = CommTag(0x5A00);
    /// Ghost -> owner accumulation of partial zip sums.
    pub const GHOST_ACCUMULATE: CommTag = CommTag(0x5A10);

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag `offset` slots above this one.
    #[inline]
    pub const fn offset(self, offset: u16) -> CommTag {
        CommTag(self.0.wrapping_add(offset))
    }
}

/// Non-blocking communication interface (minimal by design).
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Post a send of `buf`; the bytes are copied before returning.
    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of `buf.len()` bytes; the data is returned by `wait`.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Compile-time no-op comm for pure serial use.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (usize, usize, u16); // (src, dst, tag)
type Mailbox = Arc<DashMap<Key, VecDeque<Bytes>>>;

/// How long a receive polls before declaring the peer lost.
const RECV_TIMEOUT: Duration = Duration::from_secs(60);

/// Receive handle polling the shared mailbox on `wait`.
pub struct LocalHandle {
    mailbox: Mailbox,
    key: Key,
    len: usize,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let start = Instant::now();
        loop {
            if let Some(mut queue) = self.mailbox.get_mut(&self.key) {
                if let Some(bytes) = queue.pop_front() {
                    let n = self.len.min(bytes.len());
                    return Some(bytes[..n].to_vec());
                }
            }
            if start.elapsed() > RECV_TIMEOUT {
                log::warn!("receive {:?} timed out", self.key);
                return None;
            }
            std::thread::yield_now();
        }
    }
}

/// In-process communicator: every rank of a world is a thread sharing one
/// mailbox. Messages between a pair of ranks with the same tag are delivered
/// in FIFO order.
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Mailbox,
}

impl RayonComm {
    /// One communicator per rank of a fresh `size`-rank world.
    pub fn world(size: usize) -> Vec<RayonComm> {
        let mailbox: Mailbox = Arc::new(DashMap::new());
        (0..size)
            .map(|rank| RayonComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        self.mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            len: buf.len(),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// Communicator over an MPI communicator.
    ///
    /// Buffers handed to MPI are leaked for the `'static` request scope and
    /// reclaimed once the request completes in `wait`.
    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new(world: SimpleCommunicator) -> Self {
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self { world, rank, size }
        }
    }

    /// Completion closure of one posted request.
    pub struct MpiHandle(Box<dyn FnOnce() -> Option<Vec<u8>>>);

    impl Wait for MpiHandle {
        fn wait(self) -> Option<Vec<u8>> {
            (self.0)()
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiHandle {
            let data: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr: *mut [u8] = data;
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, &*data, i32::from(tag));
            MpiHandle(Box::new(move || {
                let _ = req.wait();
                // SAFETY: the request has completed, so MPI no longer reads the buffer.
                drop(unsafe { Box::from_raw(ptr) });
                None
            }))
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiHandle {
            let data: &'static mut [u8] = Box::leak(vec![0u8; buf.len()].into_boxed_slice());
            let ptr: *mut [u8] = data;
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, data, i32::from(tag));
            MpiHandle(Box::new(move || {
                let _ = req.wait();
                // SAFETY: the receive has completed and the request is consumed.
                let owned = unsafe { Box::from_raw(ptr) };
                Some(owned.into_vec())
            }))
        }

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::{MpiComm, MpiHandle};
