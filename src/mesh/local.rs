//! One rank's view of the distributed octree mesh.
//!
//! Elements `0..n_local` are the leaves this rank owns, in space-filling-curve
//! order; the remaining elements are ghosts referenced by block padding.
//! Nodes are the continuous (CG) nodes touched by any element of the view,
//! ordered by global id, so the nodes this rank owns form one contiguous range.

use std::ops::Range;

use hashbrown::HashMap;

use super::block::Block;
use crate::algs::exchange::halo::HaloPlan;
use crate::config::UnzipConfig;
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshUnzipError;
use crate::refel::{InterpScratch, ReferenceElement};
use crate::topology::direction::Direction;
use crate::topology::octant::Octant;

/// Element nodes that do not coincide with a node of the coarser neighbor.
///
/// Their values are interpolated from the parent's nodes listed in `support`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HangingNodes {
    /// Position of the element within its parent.
    pub child: u8,
    /// Element-local indices of the hanging nodes.
    pub nodes: Vec<usize>,
    /// `(parent-lattice index, local node)` pairs the hanging values depend on.
    pub support: Vec<(usize, usize)>,
}

/// A leaf in the local view.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRecord {
    pub octant: Octant,
    pub owner: usize,
    /// Local node of each element node, `None` where the node hangs.
    pub cg: Vec<Option<usize>>,
    pub hanging: Option<HangingNodes>,
}

/// The mesh view of a single rank.
#[derive(Debug, Clone)]
pub struct LocalMesh {
    pub(crate) config: UnzipConfig,
    pub(crate) rank: usize,
    pub(crate) n_ranks: usize,
    pub(crate) elements: Vec<ElementRecord>,
    pub(crate) n_local: usize,
    pub(crate) lookup: HashMap<Octant, usize>,
    pub(crate) global_ids: Vec<usize>,
    pub(crate) node_owner: Vec<usize>,
    pub(crate) node_points: Vec<[f64; 3]>,
    pub(crate) owned: Range<usize>,
    pub(crate) blocks: Vec<Block>,
    pub(crate) unzip_len: usize,
    pub(crate) halo: HaloPlan,
}

impl LocalMesh {
    pub fn config(&self) -> &UnzipConfig {
        &self.config
    }

    pub fn order(&self) -> usize {
        self.config.order
    }

    pub fn padding_width(&self) -> usize {
        self.config.padding_width
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }

    /// All elements of the view (local first, then ghosts).
    pub fn elements(&self) -> &[ElementRecord] {
        &self.elements
    }

    pub fn element(&self, e: usize) -> Result<&ElementRecord, MeshUnzipError> {
        self.elements
            .get(e)
            .ok_or_else(|| MeshUnzipError::MissingElement(format!("element {e}")))
    }

    pub fn local_elements(&self) -> Range<usize> {
        0..self.n_local
    }

    pub fn ghost_elements(&self) -> Range<usize> {
        self.n_local..self.elements.len()
    }

    /// Element index of `octant` if it is in the view.
    pub fn find_element(&self, octant: &Octant) -> Option<usize> {
        self.lookup.get(octant).copied()
    }

    /// CG node map of element `e`.
    pub fn e2n_cg(&self, e: usize) -> Result<&[Option<usize>], MeshUnzipError> {
        Ok(&self.element(e)?.cg)
    }

    /// Discontinuous (per element) node index.
    #[inline]
    pub fn e2n_dg(&self, e: usize, node: usize) -> usize {
        e * self.config.nodes_per_element() + node
    }

    /// Element and `(i, j, k)` of a DG node index.
    pub fn dg_to_eijk(&self, dg: usize) -> Result<(usize, [usize; 3]), MeshUnzipError> {
        let npe = self.config.nodes_per_element();
        let e = dg / npe;
        if e >= self.elements.len() {
            return Err(MeshUnzipError::MissingElement(format!("DG node {dg}")));
        }
        let nrp = self.config.nodes_per_axis();
        let n = dg % npe;
        Ok((e, [n % nrp, (n / nrp) % nrp, n / (nrp * nrp)]))
    }

    /// Number of nodes in the view (owned + ghost).
    pub fn num_nodes(&self) -> usize {
        self.global_ids.len()
    }

    pub fn owned_nodes(&self) -> Range<usize> {
        self.owned.clone()
    }

    pub fn node_local_begin(&self) -> usize {
        self.owned.start
    }

    pub fn node_local_end(&self) -> usize {
        self.owned.end
    }

    pub fn is_owned(&self, node: usize) -> bool {
        self.owned.contains(&node)
    }

    pub fn node_owner(&self, node: usize) -> usize {
        self.node_owner[node]
    }

    pub fn global_id(&self, node: usize) -> usize {
        self.global_ids[node]
    }

    /// Coordinates of every node in finest-level units.
    pub fn node_points(&self) -> &[[f64; 3]] {
        &self.node_points
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, b: usize) -> Result<&Block, MeshUnzipError> {
        self.blocks
            .get(b)
            .ok_or_else(|| MeshUnzipError::MissingElement(format!("block {b}")))
    }

    /// Override whether same-level remote padding of `dir` is filled for block `b`.
    pub fn set_direction_flag(&mut self, b: usize, dir: Direction, on: bool) -> Result<(), MeshUnzipError> {
        let block = self
            .blocks
            .get_mut(b)
            .ok_or_else(|| MeshUnzipError::MissingElement(format!("block {b}")))?;
        block.set_direction_flag(dir, on);
        Ok(())
    }

    /// Length of the unzipped buffer.
    pub fn unzip_len(&self) -> usize {
        self.unzip_len
    }

    pub fn halo(&self) -> &HaloPlan {
        &self.halo
    }

    /// Nodal values of element `e` from the CG vector `values`.
    ///
    /// Hanging nodes are interpolated from the parent's nodes, so the result
    /// is the element's full `(p+1)^3` nodal vector.
    pub fn element_nodal_values(
        &self,
        values: &[f64],
        e: usize,
        refel: &ReferenceElement,
        scratch: &mut InterpScratch,
        out: &mut [f64],
    ) -> Result<(), MeshUnzipError> {
        check_len("zipped vector", self.num_nodes(), values.len())?;
        let npe = self.config.nodes_per_element();
        check_len("element values", npe, out.len())?;
        let rec = self.element(e)?;
        for (slot, node) in out.iter_mut().zip(&rec.cg) {
            *slot = node.map_or(0.0, |n| values[n]);
        }
        if let Some(h) = &rec.hanging {
            let mut parent = vec![0.0; npe];
            for &(pi, node) in &h.support {
                parent[pi] = values[node];
            }
            let mut child = vec![0.0; npe];
            refel.parent_to_child_3d(&parent, h.child, &mut child, scratch)?;
            for &n in &h.nodes {
                out[n] = child[n];
            }
        }
        Ok(())
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

impl DebugInvariants for LocalMesh {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "LocalMesh invalid");
    }

    fn validate_invariants(&self) -> Result<(), MeshUnzipError> {
        let n = self.num_nodes();
        let npe = self.config.nodes_per_element();
        let bad = |reason: String| MeshUnzipError::InvalidLeafSet(reason);

        // 1) node tables agree and are sorted by global id
        if self.node_owner.len() != n || self.node_points.len() != n {
            return Err(bad("node tables differ in length".into()));
        }
        if self.global_ids.windows(2).any(|w| w[0] >= w[1]) {
            return Err(bad("global ids not strictly increasing".into()));
        }

        // 2) owned range is exactly the nodes owned by this rank
        if self.owned.end > n {
            return Err(bad(format!("owned range {:?} exceeds {n} nodes", self.owned)));
        }
        if let Some(node) = (0..n).find(|&i| self.owned.contains(&i) != (self.node_owner[i] == self.rank)) {
            return Err(bad(format!("node {node} ownership disagrees with owned range")));
        }

        // 3) element maps stay inside the view
        for (e, rec) in self.elements.iter().enumerate() {
            if rec.cg.len() != npe {
                return Err(MeshUnzipError::SizeMismatch {
                    what: "element node map",
                    expected: npe,
                    found: rec.cg.len(),
                });
            }
            let out_of_range = rec.cg.iter().flatten().any(|&i| i >= n)
                || rec
                    .hanging
                    .iter()
                    .flat_map(|h| h.support.iter())
                    .any(|&(pi, i)| i >= n || pi >= npe);
            if out_of_range {
                return Err(bad(format!("element {e} references a node outside the view")));
            }
        }

        // 4) blocks tile the unzipped buffer contiguously
        let mut next = 0usize;
        for (b, block) in self.blocks.iter().enumerate() {
            if block.offset() != next {
                return Err(bad(format!("block {b} starts at {} instead of {next}", block.offset())));
            }
            next += block.len();
        }
        if next != self.unzip_len {
            return Err(MeshUnzipError::SizeMismatch {
                what: "unzipped length",
                expected: next,
                found: self.unzip_len,
            });
        }

        // 5) halo lists point at nodes of the right owner
        for link in &self.halo.links {
            if link.send.iter().any(|&i| !self.is_owned(i)) {
                return Err(bad(format!("send list to rank {} holds a ghost", link.rank)));
            }
            if link.recv.iter().any(|&i| i >= n || self.node_owner[i] != link.rank) {
                return Err(bad(format!("recv list from rank {} holds a foreign node", link.rank)));
            }
        }
        Ok(())
    }
}
