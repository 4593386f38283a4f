//! Exchange context: staging buffers and outstanding requests of one vector's halo exchange.
//!
//! A context is tagged with the identity of the vector being exchanged. The
//! [`ExchangeRegistry`] it is opened against refuses a second open context for
//! the same vector. Staging buffers are owned by the context and are released
//! by [`ExchangeContext::close`] or, on any other exit path, by `Drop`, which
//! first waits for every posted request.

use std::ops::Range;

use dashmap::DashSet;

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{cast_slice, cast_slice_mut, copy_from_bytes};
use crate::mesh_error::MeshUnzipError;

/// Identity of a vector taking part in an exchange (its buffer address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VectorId(usize);

impl VectorId {
    pub fn of<T>(values: &[T]) -> Self {
        VectorId(values.as_ptr() as usize)
    }

    pub fn from_raw(raw: usize) -> Self {
        VectorId(raw)
    }

    pub fn raw(self) -> usize {
        self.0
    }
}

/// Set of vectors with an open exchange context.
#[derive(Debug, Default)]
pub struct ExchangeRegistry {
    open: DashSet<VectorId>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self, vector: VectorId) -> bool {
        self.open.contains(&vector)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    fn acquire(&self, vector: VectorId) -> Result<(), MeshUnzipError> {
        if self.open.insert(vector) {
            Ok(())
        } else {
            Err(MeshUnzipError::ExchangeAlreadyOpen(vector))
        }
    }

    fn release(&self, vector: VectorId) {
        self.open.remove(&vector);
    }
}

/// Lifecycle of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Requests may be outstanding.
    Open,
    /// Every posted request has completed; received data is readable.
    Completed,
    /// Staging released; the vector may be exchanged again.
    Closed,
}

struct PendingReceive<H> {
    peer: usize,
    range: Range<usize>,
    handle: H,
}

/// Staging buffers and outstanding requests for one in-flight vector.
pub struct ExchangeContext<'a, C: Communicator> {
    vector: VectorId,
    comm: &'a C,
    registry: &'a ExchangeRegistry,
    send_staging: Option<Vec<f64>>,
    recv_staging: Option<Vec<f64>>,
    sends: Vec<(usize, C::SendHandle)>,
    recvs: Vec<PendingReceive<C::RecvHandle>>,
    state: ContextState,
}

fn staging_len(bytes: usize) -> Result<usize, MeshUnzipError> {
    let width = std::mem::size_of::<f64>();
    if bytes % width != 0 {
        return Err(MeshUnzipError::SizeMismatch {
            what: "staging bytes (multiple of 8)",
            expected: bytes.next_multiple_of(width),
            found: bytes,
        });
    }
    Ok(bytes / width)
}

fn check_range(which: &'static str, range: &Range<usize>, len: usize) -> Result<(), MeshUnzipError> {
    if range.start <= range.end && range.end <= len {
        Ok(())
    } else {
        Err(MeshUnzipError::StagingOutOfBounds {
            which,
            start: range.start,
            end: range.end,
            len,
        })
    }
}

impl<'a, C: Communicator> ExchangeContext<'a, C> {
    /// Open a context for `vector`; fails if one is already open for it.
    pub fn open(
        vector: VectorId,
        comm: &'a C,
        registry: &'a ExchangeRegistry,
    ) -> Result<Self, MeshUnzipError> {
        registry.acquire(vector)?;
        log::trace!("rank {}: open exchange for {:?}", comm.rank(), vector);
        Ok(Self {
            vector,
            comm,
            registry,
            send_staging: None,
            recv_staging: None,
            sends: Vec::new(),
            recvs: Vec::new(),
            state: ContextState::Open,
        })
    }

    pub fn vector(&self) -> VectorId {
        self.vector
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Number of posted requests not yet waited on.
    pub fn outstanding(&self) -> usize {
        self.sends.len() + self.recvs.len()
    }

    /// Reserve `bytes` of zeroed send staging and return it for packing.
    pub fn allocate_send_staging(&mut self, bytes: usize) -> Result<&mut [f64], MeshUnzipError> {
        self.ensure_not_closed("send")?;
        let len = staging_len(bytes)?;
        Ok(self.send_staging.insert(vec![0.0; len]).as_mut_slice())
    }

    /// Reserve `bytes` of receive staging.
    pub fn allocate_receive_staging(&mut self, bytes: usize) -> Result<(), MeshUnzipError> {
        self.ensure_not_closed("receive")?;
        let len = staging_len(bytes)?;
        self.recv_staging = Some(vec![0.0; len]);
        Ok(())
    }

    pub fn send_staging_mut(&mut self) -> Result<&mut [f64], MeshUnzipError> {
        self.send_staging
            .as_deref_mut()
            .ok_or(MeshUnzipError::StagingNotAllocated("send"))
    }

    /// Post a non-blocking send of `range` of the send staging to `peer`.
    pub fn post_send(
        &mut self,
        peer: usize,
        tag: CommTag,
        range: Range<usize>,
    ) -> Result<(), MeshUnzipError> {
        let staging = self
            .send_staging
            .as_deref()
            .ok_or(MeshUnzipError::StagingNotAllocated("send"))?;
        check_range("send", &range, staging.len())?;
        let handle = self.comm.isend(peer, tag.as_u16(), cast_slice(&staging[range]));
        self.sends.push((peer, handle));
        self.state = ContextState::Open;
        Ok(())
    }

    /// Post a non-blocking receive from `peer` into `range` of the receive staging.
    pub fn post_receive(
        &mut self,
        peer: usize,
        tag: CommTag,
        range: Range<usize>,
    ) -> Result<(), MeshUnzipError> {
        let staging = self
            .recv_staging
            .as_deref_mut()
            .ok_or(MeshUnzipError::StagingNotAllocated("receive"))?;
        check_range("receive", &range, staging.len())?;
        let handle = self
            .comm
            .irecv(peer, tag.as_u16(), cast_slice_mut(&mut staging[range.clone()]));
        self.recvs.push(PendingReceive {
            peer,
            range,
            handle,
        });
        self.state = ContextState::Open;
        Ok(())
    }

    /// Wait for every posted request.
    ///
    /// All handles are drained even when one fails; the first failure is
    /// returned afterwards.
    pub fn wait_all(&mut self) -> Result<(), MeshUnzipError> {
        let mut first_err = None;

        for (_peer, handle) in self.sends.drain(..) {
            let _ = handle.wait();
        }

        let pending = std::mem::take(&mut self.recvs);
        for PendingReceive {
            peer,
            range,
            handle,
        } in pending
        {
            let outcome = match (handle.wait(), self.recv_staging.as_deref_mut()) {
                (Some(data), Some(staging)) => copy_from_bytes(&mut staging[range], &data)
                    .map_err(|message| MeshUnzipError::CommError {
                        neighbor: peer,
                        message,
                    }),
                (None, _) => Err(MeshUnzipError::CommError {
                    neighbor: peer,
                    message: "receive completed without data".to_string(),
                }),
                (Some(_), None) => Err(MeshUnzipError::StagingNotAllocated("receive")),
            };
            if let Err(e) = outcome {
                first_err.get_or_insert(e);
            }
        }

        if self.state != ContextState::Closed {
            self.state = ContextState::Completed;
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Received values; only readable once every request has completed.
    pub fn received(&self) -> Result<&[f64], MeshUnzipError> {
        if self.outstanding() > 0 {
            return Err(MeshUnzipError::ExchangePending(self.vector));
        }
        self.recv_staging
            .as_deref()
            .ok_or(MeshUnzipError::StagingNotAllocated("receive"))
    }

    /// Wait for all requests, then release both staging buffers.
    ///
    /// Calling `close` again is a no-op.
    pub fn close(&mut self) -> Result<(), MeshUnzipError> {
        if self.state == ContextState::Closed {
            return Ok(());
        }
        let waited = self.wait_all();
        self.release();
        waited
    }

    fn release(&mut self) {
        self.send_staging = None;
        self.recv_staging = None;
        self.registry.release(self.vector);
        self.state = ContextState::Closed;
        log::trace!("rank {}: closed exchange for {:?}", self.comm.rank(), self.vector);
    }

    fn ensure_not_closed(&self, which: &'static str) -> Result<(), MeshUnzipError> {
        if self.state == ContextState::Closed {
            Err(MeshUnzipError::StagingNotAllocated(which))
        } else {
            Ok(())
        }
    }
}

impl<C: Communicator> Drop for ExchangeContext<'_, C> {
    fn drop(&mut self) {
        if self.state == ContextState::Closed {
            return;
        }
        if self.outstanding() > 0 {
            log::warn!(
                "exchange for {:?} dropped with {} outstanding requests; waiting",
                self.vector,
                self.outstanding()
            );
        }
        if let Err(e) = self.wait_all() {
            log::warn!("exchange for {:?} failed during drop: {e}", self.vector);
        }
        self.release();
    }
}

impl<C: Communicator> PartialEq for ExchangeContext<'_, C> {
    fn eq(&self, other: &Self) -> bool {
        self.vector == other.vector
    }
}

impl<C: Communicator> std::fmt::Debug for ExchangeContext<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeContext")
            .field("vector", &self.vector)
            .field("state", &self.state)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, RayonComm};

    #[test]
    fn second_open_on_same_vector_fails() {
        let registry = ExchangeRegistry::new();
        let data = vec![0.0f64; 4];
        let id = VectorId::of(&data);
        let comm = NoComm;
        let mut first = ExchangeContext::open(id, &comm, &registry).unwrap();
        assert_eq!(
            ExchangeContext::open(id, &comm, &registry).unwrap_err(),
            MeshUnzipError::ExchangeAlreadyOpen(id)
        );
        first.close().unwrap();
        assert!(!registry.is_open(id));
        let again = ExchangeContext::open(id, &comm, &registry).unwrap();
        drop(again);
        assert_eq!(registry.open_count(), 0);
    }

    #[test]
    fn close_is_idempotent_and_releases_staging() {
        let registry = ExchangeRegistry::new();
        let comm = NoComm;
        let mut ctx = ExchangeContext::open(VectorId::from_raw(1), &comm, &registry).unwrap();
        ctx.allocate_send_staging(32).unwrap()[0] = 1.0;
        ctx.allocate_receive_staging(16).unwrap();
        ctx.close().unwrap();
        ctx.close().unwrap();
        assert_eq!(ctx.state(), ContextState::Closed);
        assert!(ctx.send_staging_mut().is_err());
        assert!(ctx.received().is_err());
    }

    #[test]
    fn staging_must_be_whole_values() {
        let registry = ExchangeRegistry::new();
        let comm = NoComm;
        let mut ctx = ExchangeContext::open(VectorId::from_raw(2), &comm, &registry).unwrap();
        assert!(matches!(
            ctx.allocate_send_staging(12),
            Err(MeshUnzipError::SizeMismatch { .. })
        ));
        ctx.allocate_receive_staging(8).unwrap();
        assert!(matches!(
            ctx.post_receive(0, CommTag(1), 0..2),
            Err(MeshUnzipError::StagingOutOfBounds { .. })
        ));
    }

    #[test]
    fn received_only_after_wait() {
        let world = RayonComm::world(2);
        let registry = ExchangeRegistry::new();
        let tag = CommTag(0x77);

        let mut tx = ExchangeContext::open(VectorId::from_raw(10), &world[0], &registry).unwrap();
        tx.allocate_send_staging(16)
            .unwrap()
            .copy_from_slice(&[3.0, 4.0]);
        tx.post_send(1, tag, 0..2).unwrap();

        let mut rx = ExchangeContext::open(VectorId::from_raw(11), &world[1], &registry).unwrap();
        rx.allocate_receive_staging(16).unwrap();
        rx.post_receive(0, tag, 0..2).unwrap();
        assert_eq!(
            rx.received().unwrap_err(),
            MeshUnzipError::ExchangePending(VectorId::from_raw(11))
        );
        rx.wait_all().unwrap();
        assert_eq!(rx.received().unwrap(), &[3.0, 4.0]);
        assert_eq!(rx.state(), ContextState::Completed);
        rx.close().unwrap();
        tx.close().unwrap();
        assert_eq!(registry.open_count(), 0);
    }

    #[test]
    fn missing_data_reports_peer() {
        let registry = ExchangeRegistry::new();
        let comm = NoComm;
        let mut ctx = ExchangeContext::open(VectorId::from_raw(3), &comm, &registry).unwrap();
        ctx.allocate_receive_staging(8).unwrap();
        ctx.post_receive(4, CommTag(5), 0..1).unwrap();
        let err = ctx.close().unwrap_err();
        assert!(matches!(err, MeshUnzipError::CommError { neighbor: 4, .. }));
        assert_eq!(registry.open_count(), 0);
    }

    #[test]
    fn contexts_compare_by_vector() {
        let registry_a = ExchangeRegistry::new();
        let registry_b = ExchangeRegistry::new();
        let comm = NoComm;
        let a = ExchangeContext::open(VectorId::from_raw(9), &comm, &registry_a).unwrap();
        let b = ExchangeContext::open(VectorId::from_raw(9), &comm, &registry_b).unwrap();
        let c = ExchangeContext::open(VectorId::from_raw(8), &comm, &registry_b).unwrap();
        assert_eq!(a, b);
        assert!(a != c);
    }
}
