//! Zip and unzip between CG node vectors and padded block buffers.
//!
//! *Unzip* expands a zipped (one value per CG node) vector into every block's
//! padded array: interior cells come from the block's own elements, padding
//! cells from neighboring elements (injected from finer or same-level
//! neighbors, interpolated from coarser ones). Ghost node values are
//! exchanged first; blocks that only read owned nodes are filled while the
//! exchange is in flight.
//!
//! *Zip* is the reverse: interior element values are accumulated onto CG
//! nodes, partial sums on ghost nodes are sent back to their owners, owned
//! nodes are divided by a [`NodeWeighting`], and the result is scattered back
//! to the ghosts.

use hashbrown::HashMap;
use itertools::iproduct;

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::exchange::context::ExchangeRegistry;
use crate::algs::exchange::halo::{begin_ghost_exchange, exchange_ghosts, GhostMode};
use crate::mesh::block::{Block, CellSource};
use crate::mesh::local::LocalMesh;
use crate::mesh_error::MeshUnzipError;
use crate::refel::{InterpScratch, ReferenceElement};
use crate::topology::direction::Direction;

/// Per-node divisor applied to owned nodes at the end of a zip.
pub trait NodeWeighting {
    fn divisor(&self, node: usize) -> f64;
}

impl<F> NodeWeighting for F
where
    F: Fn(usize) -> f64,
{
    fn divisor(&self, node: usize) -> f64 {
        self(node)
    }
}

/// Plain summation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unweighted;

impl NodeWeighting for Unweighted {
    fn divisor(&self, _node: usize) -> f64 {
        1.0
    }
}

/// How many element contributions each owned node receives in a zip.
///
/// Dividing by it turns the zip into an average, so `zip(unzip(u)) == u`
/// for any `u` on conforming meshes and for constants everywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct Multiplicity {
    weights: Vec<f64>,
}

impl Multiplicity {
    /// Accumulate an all-ones unzipped buffer. Collective over all ranks.
    pub fn assemble<C: Communicator>(
        transfer: &BlockTransfer<'_, C>,
        scratch: &mut InterpScratch,
    ) -> Result<Self, MeshUnzipError> {
        let ones = vec![1.0; transfer.mesh().unzip_len()];
        let weights = transfer.accumulate(&ones, scratch)?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

impl NodeWeighting for Multiplicity {
    fn divisor(&self, node: usize) -> f64 {
        self.weights[node]
    }
}

/// Zip/unzip driver for one rank.
pub struct BlockTransfer<'a, C: Communicator> {
    mesh: &'a LocalMesh,
    refel: &'a ReferenceElement,
    comm: &'a C,
    registry: ExchangeRegistry,
    #[cfg(feature = "rayon")]
    pool: parking_lot::Mutex<Vec<InterpScratch>>,
}

impl<'a, C: Communicator> BlockTransfer<'a, C> {
    /// `refel` must be the 3D element of the mesh's order; `comm` must be the
    /// mesh's rank in a world of the mesh's size.
    pub fn new(mesh: &'a LocalMesh, refel: &'a ReferenceElement, comm: &'a C) -> Result<Self, MeshUnzipError> {
        if refel.dim() != 3 {
            return Err(MeshUnzipError::InvalidDimension {
                requested: refel.dim(),
                supported: 3,
            });
        }
        if refel.order() != mesh.order() {
            return Err(MeshUnzipError::InvalidOrder(refel.order()));
        }
        if comm.rank() != mesh.rank() || comm.size() != mesh.n_ranks() {
            return Err(MeshUnzipError::InvalidConfig(format!(
                "communicator is rank {}/{} but the mesh view is rank {}/{}",
                comm.rank(),
                comm.size(),
                mesh.rank(),
                mesh.n_ranks()
            )));
        }
        Ok(Self {
            mesh,
            refel,
            comm,
            registry: ExchangeRegistry::new(),
            #[cfg(feature = "rayon")]
            pool: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub fn mesh(&self) -> &LocalMesh {
        self.mesh
    }

    pub fn refel(&self) -> &ReferenceElement {
        self.refel
    }

    pub fn comm(&self) -> &C {
        self.comm
    }

    /// Exchanges currently in flight on this rank.
    pub fn registry(&self) -> &ExchangeRegistry {
        &self.registry
    }

    /// Unzip into a fresh buffer of [`LocalMesh::unzip_len`] values.
    pub fn unzip(&self, zipped: &[f64], scratch: &mut InterpScratch) -> Result<Vec<f64>, MeshUnzipError> {
        let mut out = vec![0.0; self.mesh.unzip_len()];
        self.unzip_into(zipped, &mut out, scratch)?;
        Ok(out)
    }

    /// Unzip `zipped` into `out`. Collective over all ranks.
    ///
    /// `zipped` only needs valid owned entries; ghost entries are fetched from
    /// their owners. Cells outside the domain, and same-level remote padding
    /// whose direction flag is cleared, are left at zero.
    pub fn unzip_into(
        &self,
        zipped: &[f64],
        out: &mut [f64],
        scratch: &mut InterpScratch,
    ) -> Result<(), MeshUnzipError> {
        check_len("zipped vector", self.mesh.num_nodes(), zipped.len())?;
        check_len("unzipped vector", self.mesh.unzip_len(), out.len())?;
        out.fill(0.0);

        let mut work = zipped.to_vec();
        let pending = begin_ghost_exchange(
            self.mesh.halo(),
            zipped,
            GhostMode::Scatter,
            CommTag::GHOST_SCATTER,
            self.comm,
            &self.registry,
        )?;

        let (mesh, refel) = (self.mesh, self.refel);
        {
            let owned_only = &work;
            self.run_blocks(out, scratch, Block::is_independent, |b, slice, s| {
                fill_interior(mesh, refel, b, owned_only, slice, s)
            })?;
        }
        pending.finish(&mut work)?;
        log::trace!("rank {}: ghost values received", mesh.rank());

        let work = &work;
        self.run_blocks(out, scratch, |b| !b.is_independent(), |b, slice, s| {
            fill_interior(mesh, refel, b, work, slice, s)
        })?;
        self.run_blocks(out, scratch, |_| true, |b, slice, s| {
            fill_padding(mesh, refel, b, work, slice, s)
        })
    }

    /// Sum interior element values onto CG nodes and return ghost partials to
    /// their owners. Owned entries hold the totals; ghost entries are zero.
    pub fn accumulate(&self, unzipped: &[f64], scratch: &mut InterpScratch) -> Result<Vec<f64>, MeshUnzipError> {
        let mesh = self.mesh;
        check_len("unzipped vector", mesh.unzip_len(), unzipped.len())?;
        let nrp = mesh.config().nodes_per_axis();
        let npe = mesh.config().nodes_per_element();

        let mut acc = vec![0.0; mesh.num_nodes()];
        let mut vals = vec![0.0; npe];
        let mut child = vec![0.0; npe];
        let mut parent = vec![0.0; npe];
        for block in mesh.blocks() {
            let slice = &unzipped[block.range()];
            let m = block.elements_per_axis();
            for (ez, ey, ex) in iproduct!(0..m, 0..m, 0..m) {
                for (k, j, i) in iproduct!(0..nrp, 0..nrp, 0..nrp) {
                    vals[(k * nrp + j) * nrp + i] = slice[block.element_node_index([ex, ey, ez], [i, j, k])];
                }
                let rec = mesh.element(block.element_at(ex, ey, ez))?;
                for (v, node) in vals.iter().zip(&rec.cg) {
                    if let Some(n) = node {
                        acc[*n] += v;
                    }
                }
                if let Some(h) = &rec.hanging {
                    child.fill(0.0);
                    for &n in &h.nodes {
                        child[n] = vals[n];
                    }
                    self.refel.child_to_parent_3d(&child, h.child, &mut parent, scratch)?;
                    for &(pi, n) in &h.support {
                        acc[n] += parent[pi];
                    }
                }
            }
        }

        exchange_ghosts(
            mesh.halo(),
            &mut acc,
            GhostMode::Accumulate,
            CommTag::GHOST_ACCUMULATE,
            self.comm,
            &self.registry,
        )?;
        for link in &mesh.halo().links {
            for &n in &link.recv {
                acc[n] = 0.0;
            }
        }
        Ok(acc)
    }

    /// Zip `unzipped` back to a CG vector. Collective over all ranks.
    pub fn zip<W: NodeWeighting + ?Sized>(
        &self,
        unzipped: &[f64],
        weighting: &W,
        scratch: &mut InterpScratch,
    ) -> Result<Vec<f64>, MeshUnzipError> {
        let mut zipped = self.accumulate(unzipped, scratch)?;
        for node in self.mesh.owned_nodes() {
            let weight = weighting.divisor(node);
            if weight == 0.0 || !weight.is_finite() {
                return Err(MeshUnzipError::DegenerateWeight { node, weight });
            }
            zipped[node] /= weight;
        }
        self.ghost_exchange(&mut zipped)?;
        Ok(zipped)
    }

    /// Overwrite ghost entries of `zipped` with their owners' values.
    pub fn ghost_exchange(&self, zipped: &mut [f64]) -> Result<(), MeshUnzipError> {
        exchange_ghosts(
            self.mesh.halo(),
            zipped,
            GhostMode::Scatter,
            CommTag::GHOST_SCATTER,
            self.comm,
            &self.registry,
        )
    }

    #[cfg(not(feature = "rayon"))]
    fn run_blocks<F>(
        &self,
        out: &mut [f64],
        scratch: &mut InterpScratch,
        select: fn(&Block) -> bool,
        fill: F,
    ) -> Result<(), MeshUnzipError>
    where
        F: Fn(&Block, &mut [f64], &mut InterpScratch) -> Result<(), MeshUnzipError>,
    {
        let blocks = self.mesh.blocks();
        for (block, slice) in blocks.iter().zip(split_blocks(blocks, out)) {
            if select(block) {
                fill(block, slice, scratch)?;
            }
        }
        Ok(())
    }

    #[cfg(feature = "rayon")]
    fn run_blocks<F>(
        &self,
        out: &mut [f64],
        _scratch: &mut InterpScratch,
        select: fn(&Block) -> bool,
        fill: F,
    ) -> Result<(), MeshUnzipError>
    where
        F: Fn(&Block, &mut [f64], &mut InterpScratch) -> Result<(), MeshUnzipError> + Sync,
    {
        use rayon::prelude::*;

        let blocks = self.mesh.blocks();
        let slices = split_blocks(blocks, out);
        let (pool, refel) = (&self.pool, self.refel);
        blocks
            .par_iter()
            .zip(slices)
            .filter(|(block, _)| select(block))
            .try_for_each_init(
                || PooledScratch::take(pool, refel),
                |s, (block, slice)| fill(block, slice, &mut s.scratch),
            )
    }
}

/// A scratch borrowed from the transfer's pool for one rayon worker.
#[cfg(feature = "rayon")]
struct PooledScratch<'p> {
    pool: &'p parking_lot::Mutex<Vec<InterpScratch>>,
    scratch: InterpScratch,
}

#[cfg(feature = "rayon")]
impl<'p> PooledScratch<'p> {
    fn take(pool: &'p parking_lot::Mutex<Vec<InterpScratch>>, refel: &ReferenceElement) -> Self {
        let scratch = pool.lock().pop().unwrap_or_else(|| refel.scratch());
        Self { pool, scratch }
    }
}

#[cfg(feature = "rayon")]
impl Drop for PooledScratch<'_> {
    fn drop(&mut self) {
        self.pool.lock().push(std::mem::take(&mut self.scratch));
    }
}

fn check_len(what: &'static str, expected: usize, found: usize) -> Result<(), MeshUnzipError> {
    if expected == found {
        Ok(())
    } else {
        Err(MeshUnzipError::SizeMismatch {
            what,
            expected,
            found,
        })
    }
}

/// Disjoint per-block views of the unzipped buffer.
fn split_blocks<'o>(blocks: &[Block], mut out: &'o mut [f64]) -> Vec<&'o mut [f64]> {
    let mut slices = Vec::with_capacity(blocks.len());
    for block in blocks {
        let (head, tail) = std::mem::take(&mut out).split_at_mut(block.len());
        slices.push(head);
        out = tail;
    }
    slices
}

fn fill_interior(
    mesh: &LocalMesh,
    refel: &ReferenceElement,
    block: &Block,
    zipped: &[f64],
    out: &mut [f64],
    scratch: &mut InterpScratch,
) -> Result<(), MeshUnzipError> {
    let nrp = mesh.config().nodes_per_axis();
    let mut vals = vec![0.0; mesh.config().nodes_per_element()];
    let m = block.elements_per_axis();
    for (ez, ey, ex) in iproduct!(0..m, 0..m, 0..m) {
        mesh.element_nodal_values(zipped, block.element_at(ex, ey, ez), refel, scratch, &mut vals)?;
        for (k, j, i) in iproduct!(0..nrp, 0..nrp, 0..nrp) {
            out[block.element_node_index([ex, ey, ez], [i, j, k])] = vals[(k * nrp + j) * nrp + i];
        }
    }
    Ok(())
}

/// Fill every padding cell of `block` in face, edge, corner order.
fn fill_padding(
    mesh: &LocalMesh,
    refel: &ReferenceElement,
    block: &Block,
    zipped: &[f64],
    out: &mut [f64],
    scratch: &mut InterpScratch,
) -> Result<(), MeshUnzipError> {
    let npe = mesh.config().nodes_per_element();
    let mut nodal: HashMap<usize, Vec<f64>> = HashMap::new();
    let mut refined: HashMap<(usize, u8), Vec<f64>> = HashMap::new();
    for dir in Direction::all() {
        for cell in block.padding(dir) {
            if !block.fills(dir, cell) {
                continue;
            }
            if !nodal.contains_key(&cell.element) {
                let mut v = vec![0.0; npe];
                mesh.element_nodal_values(zipped, cell.element, refel, scratch, &mut v)?;
                nodal.insert(cell.element, v);
            }
            out[cell.index] = match cell.source {
                CellSource::Node(n) => nodal[&cell.element][n],
                CellSource::Child { child, node } => {
                    let key = (cell.element, child);
                    if !refined.contains_key(&key) {
                        let mut v = vec![0.0; npe];
                        refel.parent_to_child_3d(&nodal[&cell.element], child, &mut v, scratch)?;
                        refined.insert(key, v);
                    }
                    refined[&key][node]
                }
            };
        }
    }
    Ok(())
}
