//! Ghost-node exchange of zipped vectors driven by an [`ExchangeContext`].
//!
//! Every peer link lists, in matching order on both sides, the owned nodes
//! this rank sends (`send`) and the ghost nodes it receives (`recv`). A
//! scatter copies owner values into ghosts; an accumulation sends ghost
//! partial sums back and adds them into the owners.

use std::ops::Range;

use super::context::{ExchangeContext, ExchangeRegistry, VectorId};
use crate::algs::communicator::{CommTag, Communicator};
use crate::mesh_error::MeshUnzipError;

/// Nodes exchanged with one peer, as local node indices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PeerLink {
    pub rank: usize,
    /// Owned nodes the peer holds as ghosts.
    pub send: Vec<usize>,
    /// Ghost nodes owned by the peer.
    pub recv: Vec<usize>,
}

/// All peer links of one rank, sorted by peer rank.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HaloPlan {
    pub num_nodes: usize,
    pub links: Vec<PeerLink>,
}

impl HaloPlan {
    pub fn peers(&self) -> impl Iterator<Item = usize> + '_ {
        self.links.iter().map(|l| l.rank)
    }

    pub fn ghost_count(&self) -> usize {
        self.links.iter().map(|l| l.recv.len()).sum()
    }
}

/// Which way values flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GhostMode {
    /// owner -> ghost copy
    Scatter,
    /// ghost -> owner sum
    Accumulate,
}

impl GhostMode {
    fn outgoing(self, link: &PeerLink) -> &[usize] {
        match self {
            GhostMode::Scatter => &link.send,
            GhostMode::Accumulate => &link.recv,
        }
    }

    fn incoming(self, link: &PeerLink) -> &[usize] {
        match self {
            GhostMode::Scatter => &link.recv,
            GhostMode::Accumulate => &link.send,
        }
    }
}

/// A posted ghost exchange; finish it with [`GhostExchange::finish`].
pub struct GhostExchange<'a, C: Communicator> {
    ctx: ExchangeContext<'a, C>,
    plan: &'a HaloPlan,
    mode: GhostMode,
    recv_ranges: Vec<Range<usize>>,
}

fn check_nodes(plan: &HaloPlan, values: &[f64]) -> Result<(), MeshUnzipError> {
    if values.len() == plan.num_nodes {
        Ok(())
    } else {
        Err(MeshUnzipError::SizeMismatch {
            what: "zipped vector",
            expected: plan.num_nodes,
            found: values.len(),
        })
    }
}

/// Pack `values` for every peer and post all sends and receives.
///
/// The exchange is tagged with `values`' identity; `values` itself is not
/// borrowed while the exchange is in flight.
pub fn begin_ghost_exchange<'a, C: Communicator>(
    plan: &'a HaloPlan,
    values: &[f64],
    mode: GhostMode,
    tag: CommTag,
    comm: &'a C,
    registry: &'a ExchangeRegistry,
) -> Result<GhostExchange<'a, C>, MeshUnzipError> {
    check_nodes(plan, values)?;
    let mut ctx = ExchangeContext::open(VectorId::of(values), comm, registry)?;
    let width = std::mem::size_of::<f64>();

    let send_total: usize = plan.links.iter().map(|l| mode.outgoing(l).len()).sum();
    let recv_total: usize = plan.links.iter().map(|l| mode.incoming(l).len()).sum();

    let staging = ctx.allocate_send_staging(send_total * width)?;
    let mut send_ranges = Vec::with_capacity(plan.links.len());
    let mut cursor = 0;
    for link in &plan.links {
        let out = mode.outgoing(link);
        for (slot, &node) in staging[cursor..cursor + out.len()].iter_mut().zip(out) {
            *slot = values[node];
        }
        send_ranges.push(cursor..cursor + out.len());
        cursor += out.len();
    }

    ctx.allocate_receive_staging(recv_total * width)?;
    let mut recv_ranges = Vec::with_capacity(plan.links.len());
    let mut cursor = 0;
    for link in &plan.links {
        let len = mode.incoming(link).len();
        let range = cursor..cursor + len;
        if len > 0 {
            ctx.post_receive(link.rank, tag, range.clone())?;
        }
        recv_ranges.push(range);
        cursor += len;
    }
    for (link, range) in plan.links.iter().zip(send_ranges) {
        if !range.is_empty() {
            ctx.post_send(link.rank, tag, range)?;
        }
    }
    log::trace!(
        "rank {}: ghost {:?} posted to {} peers ({} out, {} in)",
        comm.rank(),
        mode,
        plan.links.len(),
        send_total,
        recv_total
    );

    Ok(GhostExchange {
        ctx,
        plan,
        mode,
        recv_ranges,
    })
}

impl<C: Communicator> GhostExchange<'_, C> {
    pub fn vector(&self) -> VectorId {
        self.ctx.vector()
    }

    /// Wait for the exchange, unpack into `values` and release the staging.
    pub fn finish(mut self, values: &mut [f64]) -> Result<(), MeshUnzipError> {
        check_nodes(self.plan, values)?;
        self.ctx.wait_all()?;
        let received = self.ctx.received()?;
        for (link, range) in self.plan.links.iter().zip(&self.recv_ranges) {
            let targets = self.mode.incoming(link);
            for (&node, &v) in targets.iter().zip(&received[range.clone()]) {
                match self.mode {
                    GhostMode::Scatter => values[node] = v,
                    GhostMode::Accumulate => values[node] += v,
                }
            }
        }
        self.ctx.close()
    }
}

/// Blocking convenience: begin and finish in one call.
pub fn exchange_ghosts<C: Communicator>(
    plan: &HaloPlan,
    values: &mut [f64],
    mode: GhostMode,
    tag: CommTag,
    comm: &C,
    registry: &ExchangeRegistry,
) -> Result<(), MeshUnzipError> {
    let pending = begin_ghost_exchange(plan, values, mode, tag, comm, registry)?;
    pending.finish(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::RayonComm;

    fn two_rank_plans() -> (HaloPlan, HaloPlan) {
        // rank 0 owns nodes 0..2 and ghosts node 2 (owned by rank 1's local 0)
        let p0 = HaloPlan {
            num_nodes: 3,
            links: vec![PeerLink {
                rank: 1,
                send: vec![1],
                recv: vec![2],
            }],
        };
        // rank 1: ghost 0 (rank 0's node 1), owned 1..3
        let p1 = HaloPlan {
            num_nodes: 3,
            links: vec![PeerLink {
                rank: 0,
                send: vec![1],
                recv: vec![0],
            }],
        };
        (p0, p1)
    }

    #[test]
    fn scatter_then_accumulate() {
        let world = RayonComm::world(2);
        let (p0, p1) = two_rank_plans();
        let c1 = world[1].clone();
        let handle = std::thread::spawn(move || {
            let registry = ExchangeRegistry::new();
            let mut v1 = vec![0.0, 20.0, 30.0];
            exchange_ghosts(&p1, &mut v1, GhostMode::Scatter, CommTag(1), &c1, &registry).unwrap();
            let after_scatter = v1.clone();
            let mut partial = vec![5.0, 0.0, 0.0];
            exchange_ghosts(&p1, &mut partial, GhostMode::Accumulate, CommTag(2), &c1, &registry)
                .unwrap();
            (after_scatter, partial)
        });

        let registry = ExchangeRegistry::new();
        let mut v0 = vec![1.0, 2.0, 0.0];
        exchange_ghosts(&p0, &mut v0, GhostMode::Scatter, CommTag(1), &world[0], &registry).unwrap();
        let mut partial = vec![0.0, 1.0, 7.0];
        exchange_ghosts(&p0, &mut partial, GhostMode::Accumulate, CommTag(2), &world[0], &registry)
            .unwrap();

        let (v1, partial1) = handle.join().unwrap();
        assert_eq!(v0, vec![1.0, 2.0, 20.0]);
        assert_eq!(v1, vec![2.0, 20.0, 30.0]);
        // rank 0's owned node 1 gains rank 1's ghost partial 5.0
        assert_eq!(partial[1], 6.0);
        // rank 1's owned node 1 gains rank 0's ghost partial 7.0
        assert_eq!(partial1[1], 7.0);
        assert_eq!(registry.open_count(), 0);
    }

    #[test]
    fn wrong_length_rejected() {
        let world = RayonComm::world(2);
        let (p0, _) = two_rank_plans();
        let registry = ExchangeRegistry::new();
        let mut short = vec![0.0; 2];
        assert!(matches!(
            exchange_ghosts(&p0, &mut short, GhostMode::Scatter, CommTag(3), &world[0], &registry),
            Err(MeshUnzipError::SizeMismatch { .. })
        ));
    }
}
