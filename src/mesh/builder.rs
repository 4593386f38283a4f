//! Construction of per-rank mesh views from a global leaf list.
//!
//! Positions are handled in *scaled* integer units: one finest-level unit is
//! `2p` scaled units, so both the node lattice of every leaf (spacing
//! `2 len`) and the lattice of its children (spacing `len`) are integral.
//!
//! The builder sees every leaf and its owner, so it computes the views of all
//! ranks consistently; [`MeshBuilder::build_rank`] simply keeps one of them.

use std::collections::BTreeSet;
use std::ops::Range;

use hashbrown::hash_map::Entry;
use hashbrown::{HashMap, HashSet};
use itertools::iproduct;

use super::block::{padded_direction, Block, CellSource, LevelRelation, PaddingCell};
use super::local::{ElementRecord, HangingNodes, LocalMesh};
use crate::algs::exchange::halo::{HaloPlan, PeerLink};
use crate::config::UnzipConfig;
use crate::debug_invariants::{invariants_enabled, DebugInvariants};
use crate::mesh_error::MeshUnzipError;
use crate::topology::direction::{Direction, DirectionFlags};
use crate::topology::octant::Octant;

type Pos = [i64; 3];

/// Global description of a distributed octree mesh.
#[derive(Debug, Clone)]
pub struct MeshBuilder {
    leaves: Vec<Octant>,
    owners: Vec<usize>,
    n_ranks: usize,
    config: UnzipConfig,
}

impl MeshBuilder {
    /// `owners[i]` is the rank owning `leaves[i]`.
    pub fn new(
        leaves: Vec<Octant>,
        owners: Vec<usize>,
        n_ranks: usize,
        config: UnzipConfig,
    ) -> Result<Self, MeshUnzipError> {
        config.validate()?;
        if n_ranks == 0 {
            return Err(MeshUnzipError::InvalidConfig("at least one rank is required".into()));
        }
        if leaves.len() != owners.len() {
            return Err(MeshUnzipError::SizeMismatch {
                what: "leaf owners",
                expected: leaves.len(),
                found: owners.len(),
            });
        }
        if let Some(&o) = owners.iter().find(|&&o| o >= n_ranks) {
            return Err(MeshUnzipError::InvalidConfig(format!(
                "owner rank {o} outside a world of {n_ranks}"
            )));
        }
        if let Some(o) = leaves
            .iter()
            .find(|o| o.level > config.max_depth || o.coords.iter().any(|&c| u64::from(c) >= 1u64 << o.level))
        {
            return Err(MeshUnzipError::InvalidLeafSet(format!(
                "{o:?} lies outside a domain of depth {}",
                config.max_depth
            )));
        }
        Ok(Self {
            leaves,
            owners,
            n_ranks,
            config,
        })
    }

    /// Every leaf on rank 0 of a one-rank world.
    pub fn single_rank(leaves: Vec<Octant>, config: UnzipConfig) -> Result<Self, MeshUnzipError> {
        let owners = vec![0; leaves.len()];
        Self::new(leaves, owners, 1, config)
    }

    /// Split the space-filling-curve order of `leaves` into `n_ranks` contiguous parts.
    pub fn partitioned(
        mut leaves: Vec<Octant>,
        n_ranks: usize,
        config: UnzipConfig,
    ) -> Result<Self, MeshUnzipError> {
        leaves.sort_by_key(|o| o.sfc_key(config.max_depth));
        let n = leaves.len().max(1);
        let owners = (0..leaves.len()).map(|i| i * n_ranks / n).collect();
        Self::new(leaves, owners, n_ranks, config)
    }

    pub fn config(&self) -> &UnzipConfig {
        &self.config
    }

    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }

    /// View of a single rank.
    pub fn build_rank(&self, rank: usize) -> Result<LocalMesh, MeshUnzipError> {
        if rank >= self.n_ranks {
            return Err(MeshUnzipError::InvalidConfig(format!(
                "rank {rank} outside a world of {}",
                self.n_ranks
            )));
        }
        let topo = Topology::new(self)?;
        let plans = topo.plan_all()?;
        topo.finish(rank, &plans)
    }

    /// Views of every rank, indexed by rank.
    pub fn build_all(&self) -> Result<Vec<LocalMesh>, MeshUnzipError> {
        let topo = Topology::new(self)?;
        let plans = topo.plan_all()?;
        (0..self.n_ranks).map(|r| topo.finish(r, &plans)).collect()
    }
}

/// Leaves, CG numbering and hanging-node structure shared by all ranks.
struct Topology {
    cfg: UnzipConfig,
    scale: i64,
    n_ranks: usize,
    leaves: Vec<Octant>,
    owners: Vec<usize>,
    lookup: HashMap<Octant, usize>,
    levels: Vec<u8>,
    positions: Vec<Pos>,
    node_owner: Vec<usize>,
    cg: Vec<Vec<Option<usize>>>,
    hanging: Vec<Option<HangingNodes>>,
}

struct RawCell {
    dir: Direction,
    index: usize,
    leaf: usize,
    source: CellSource,
    relation: LevelRelation,
    remote: bool,
}

struct BlockPlan {
    root: Octant,
    level: u8,
    m: usize,
    leaves: Vec<usize>,
    cells: Vec<RawCell>,
}

struct RankPlan {
    local: Vec<usize>,
    ghosts: Vec<usize>,
    blocks: Vec<BlockPlan>,
    nodes: Vec<usize>,
}

fn lattice_index(ijk: [usize; 3], nrp: usize) -> usize {
    (ijk[2] * nrp + ijk[1]) * nrp + ijk[0]
}

fn lattice_ijk(n: usize, nrp: usize) -> [usize; 3] {
    [n % nrp, (n / nrp) % nrp, n / (nrp * nrp)]
}

impl Topology {
    fn new(b: &MeshBuilder) -> Result<Self, MeshUnzipError> {
        let cfg = b.config;
        let depth = cfg.max_depth;
        let mut order: Vec<usize> = (0..b.leaves.len()).collect();
        order.sort_by_key(|&i| b.leaves[i].sfc_key(depth));
        let leaves: Vec<Octant> = order.iter().map(|&i| b.leaves[i]).collect();
        let owners: Vec<usize> = order.iter().map(|&i| b.owners[i]).collect();

        let mut lookup = HashMap::with_capacity(leaves.len());
        for (i, o) in leaves.iter().enumerate() {
            if lookup.insert(*o, i).is_some() {
                return Err(MeshUnzipError::InvalidLeafSet(format!("{o:?} listed twice")));
            }
        }
        for o in &leaves {
            if let Some(anc) = (0..o.level).map(|l| o.ancestor(l)).find(|a| lookup.contains_key(a)) {
                return Err(MeshUnzipError::InvalidLeafSet(format!("{o:?} overlaps leaf {anc:?}")));
            }
        }
        let covered: u128 = leaves
            .iter()
            .map(|o| 1u128 << (3 * u32::from(depth - o.level)))
            .sum();
        let total = 1u128 << (3 * u32::from(depth));
        if covered != total {
            return Err(MeshUnzipError::InvalidLeafSet(format!(
                "leaves cover {covered} of {total} finest cells"
            )));
        }

        let levels: Vec<u8> = leaves
            .iter()
            .map(|o| o.level)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut topo = Topology {
            cfg,
            scale: 2 * cfg.order as i64,
            n_ranks: b.n_ranks,
            leaves,
            owners,
            lookup,
            levels,
            positions: Vec::new(),
            node_owner: Vec::new(),
            cg: Vec::new(),
            hanging: Vec::new(),
        };
        if invariants_enabled() {
            topo.check_balance()?;
        }
        topo.number_nodes();
        topo.link_hanging()?;
        log::debug!(
            "mesh: {} leaves on levels {:?}, {} CG nodes, {} elements with hanging nodes",
            topo.leaves.len(),
            topo.levels,
            topo.positions.len(),
            topo.hanging.iter().flatten().count()
        );
        Ok(topo)
    }

    fn depth(&self) -> u8 {
        self.cfg.max_depth
    }

    fn anchor_scaled(&self, o: &Octant) -> Pos {
        o.anchor(self.depth()).map(|c| i64::from(c) * self.scale)
    }

    fn len(&self, o: &Octant) -> i64 {
        i64::from(o.len(self.depth()))
    }

    /// Position of lattice node `ijk` of `o`.
    fn node_pos(&self, o: &Octant, ijk: [usize; 3]) -> Pos {
        let base = self.anchor_scaled(o);
        let step = 2 * self.len(o);
        std::array::from_fn(|a| base[a] + ijk[a] as i64 * step)
    }

    fn domain_scaled(&self) -> i64 {
        i64::from(self.cfg.domain_len()) * self.scale
    }

    fn in_domain(&self, u: Pos) -> bool {
        let top = self.domain_scaled();
        u.iter().all(|&c| (0..=top).contains(&c))
    }

    /// Leaf containing `u` (half-open cells, the upper domain face folded inward).
    fn locate(&self, u: Pos) -> Option<usize> {
        if !self.in_domain(u) {
            return None;
        }
        let top = self.domain_scaled();
        let u = u.map(|c| c.min(top - 1));
        self.levels.iter().find_map(|&level| {
            let extent = i64::from(1u32 << (self.depth() - level)) * self.scale;
            let coords = u.map(|c| (c / extent) as u32);
            self.lookup.get(&Octant::new(level, coords)).copied()
        })
    }

    /// Leaves whose closure contains `x`.
    fn touching(&self, x: Pos) -> Vec<usize> {
        let mut out = Vec::with_capacity(8);
        for (dz, dy, dx) in iproduct!([-1i64, 1], [-1i64, 1], [-1i64, 1]) {
            if let Some(leaf) = self.locate([x[0] + dx, x[1] + dy, x[2] + dz]) {
                if !out.contains(&leaf) {
                    out.push(leaf);
                }
            }
        }
        out
    }

    fn on_lattice(&self, leaf: usize, x: Pos) -> bool {
        let o = &self.leaves[leaf];
        let base = self.anchor_scaled(o);
        let step = 2 * self.len(o);
        (0..3).all(|a| (x[a] - base[a]).rem_euclid(step) == 0)
    }

    fn check_balance(&self) -> Result<(), MeshUnzipError> {
        let p = self.cfg.order;
        for (i, o) in self.leaves.iter().enumerate() {
            for (k, j, ii) in iproduct!([0, p], [0, p], [0, p]) {
                let levels: Vec<u8> = self
                    .touching(self.node_pos(o, [ii, j, k]))
                    .iter()
                    .map(|&t| self.leaves[t].level)
                    .collect();
                let lo = levels.iter().copied().min().unwrap_or(o.level);
                let hi = levels.iter().copied().max().unwrap_or(o.level);
                if hi - lo > 1 {
                    return Err(MeshUnzipError::UnbalancedMesh {
                        leaf: i,
                        reason: format!("levels {lo} and {hi} meet at a corner of {o:?}"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Classify every element node and number the shared ones.
    ///
    /// A position hangs when some leaf touching it does not carry it on its
    /// lattice. Shared positions are owned by the lowest rank among the
    /// leaves that carry them; ids are ordered by `(owner, z, y, x)`.
    fn number_nodes(&mut self) {
        let nrp = self.cfg.nodes_per_axis();
        let mut info: HashMap<Pos, (bool, usize)> = HashMap::new();
        for (i, o) in self.leaves.iter().enumerate() {
            for (k, j, ii) in iproduct!(0..nrp, 0..nrp, 0..nrp) {
                let x = self.node_pos(o, [ii, j, k]);
                match info.entry(x) {
                    Entry::Occupied(mut e) => {
                        let v = e.get_mut();
                        v.1 = v.1.min(self.owners[i]);
                    }
                    Entry::Vacant(e) => {
                        let hanging = self.touching(x).iter().any(|&t| !self.on_lattice(t, x));
                        e.insert((hanging, self.owners[i]));
                    }
                }
            }
        }

        let mut shared: Vec<(Pos, usize)> = info
            .iter()
            .filter(|(_, (hanging, _))| !hanging)
            .map(|(x, (_, owner))| (*x, *owner))
            .collect();
        shared.sort_unstable_by_key(|(x, owner)| (*owner, x[2], x[1], x[0]));
        let ids: HashMap<Pos, usize> = shared.iter().enumerate().map(|(g, (x, _))| (*x, g)).collect();
        self.positions = shared.iter().map(|(x, _)| *x).collect();
        self.node_owner = shared.iter().map(|(_, owner)| *owner).collect();

        self.cg = self
            .leaves
            .iter()
            .map(|o| {
                iproduct!(0..nrp, 0..nrp, 0..nrp)
                    .map(|(k, j, ii)| ids.get(&self.node_pos(o, [ii, j, k])).copied())
                    .collect()
            })
            .collect();
    }

    /// Attach the parent support of every element with hanging nodes.
    fn link_hanging(&mut self) -> Result<(), MeshUnzipError> {
        let p = self.cfg.order;
        let nrp = p + 1;
        let ids: HashMap<Pos, usize> = self.positions.iter().enumerate().map(|(g, x)| (*x, g)).collect();
        let mut hanging = Vec::with_capacity(self.leaves.len());
        for (i, o) in self.leaves.iter().enumerate() {
            let nodes: Vec<usize> = self.cg[i]
                .iter()
                .enumerate()
                .filter_map(|(n, id)| id.is_none().then_some(n))
                .collect();
            if nodes.is_empty() {
                hanging.push(None);
                continue;
            }
            let parent = o.parent().ok_or_else(|| MeshUnzipError::UnbalancedMesh {
                leaf: i,
                reason: "root leaf has hanging nodes".into(),
            })?;
            let child = o.child_index();

            let mut support_idx = BTreeSet::new();
            for &n in &nodes {
                let ijk = lattice_ijk(n, nrp);
                let ranges: [Range<usize>; 3] = std::array::from_fn(|a| {
                    let q = ((usize::from(child) >> a) & 1) * p + ijk[a];
                    if q % 2 == 0 { q / 2..q / 2 + 1 } else { 0..nrp }
                });
                let [rx, ry, rz] = ranges;
                for (c, b, a) in iproduct!(rz, ry, rx) {
                    support_idx.insert(lattice_index([a, b, c], nrp));
                }
            }
            let support = support_idx
                .into_iter()
                .map(|pi| {
                    let x = self.node_pos(&parent, lattice_ijk(pi, nrp));
                    ids.get(&x).map(|&g| (pi, g)).ok_or_else(|| MeshUnzipError::UnbalancedMesh {
                        leaf: i,
                        reason: format!("parent node {pi} of {o:?} is not a shared node"),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            hanging.push(Some(HangingNodes { child, nodes, support }));
        }
        self.hanging = hanging;
        Ok(())
    }

    /// Where the value at `u` comes from within `leaf`.
    fn source_of(&self, leaf: usize, u: Pos) -> Result<CellSource, MeshUnzipError> {
        let o = &self.leaves[leaf];
        let p = self.cfg.order;
        let nrp = p + 1;
        let base = self.anchor_scaled(o);
        let len = self.len(o);
        let r: [i64; 3] = std::array::from_fn(|a| u[a] - base[a]);
        if r.iter().all(|&c| c % (2 * len) == 0) {
            let ijk = r.map(|c| (c / (2 * len)) as usize);
            return Ok(CellSource::Node(lattice_index(ijk, nrp)));
        }
        if r.iter().all(|&c| c % len == 0) {
            let q = r.map(|c| (c / len) as usize);
            let mut child = 0u8;
            let mut ijk = [0usize; 3];
            for a in 0..3 {
                if q[a] > p {
                    child |= 1 << a;
                    ijk[a] = q[a] - p;
                } else {
                    ijk[a] = q[a];
                }
            }
            return Ok(CellSource::Child {
                child,
                node: lattice_index(ijk, nrp),
            });
        }
        Err(MeshUnzipError::Nonconforming {
            element: leaf,
            reason: format!("point {u:?} is on neither the node nor the child lattice of {o:?}"),
        })
    }

    fn plan_all(&self) -> Result<Vec<RankPlan>, MeshUnzipError> {
        (0..self.n_ranks).map(|r| self.plan_rank(r)).collect()
    }

    fn plan_rank(&self, rank: usize) -> Result<RankPlan, MeshUnzipError> {
        let local: Vec<usize> = (0..self.leaves.len()).filter(|&i| self.owners[i] == rank).collect();

        // local level-L leaves below each ancestor
        let mut counts: HashMap<(Octant, u8), usize> = HashMap::new();
        for &i in &local {
            let o = self.leaves[i];
            for l in 0..o.level {
                *counts.entry((o.ancestor(l), o.level)).or_default() += 1;
            }
        }
        let mut roots: Vec<(Octant, Vec<usize>)> = Vec::new();
        let mut root_index: HashMap<Octant, usize> = HashMap::new();
        for &i in &local {
            let o = self.leaves[i];
            let mut root = o;
            for l in (0..o.level).rev() {
                let anc = o.ancestor(l);
                let full = 1usize << (3 * usize::from(o.level - l));
                if counts.get(&(anc, o.level)) == Some(&full) {
                    root = anc;
                } else {
                    break;
                }
            }
            let slot = *root_index.entry(root).or_insert_with(|| {
                roots.push((root, Vec::new()));
                roots.len() - 1
            });
            roots[slot].1.push(i);
        }

        let mut blocks = Vec::with_capacity(roots.len());
        for (root, leaves) in roots {
            blocks.push(self.plan_block(rank, root, leaves)?);
        }

        let ghosts: Vec<usize> = blocks
            .iter()
            .flat_map(|b| b.cells.iter())
            .filter(|c| c.remote)
            .map(|c| c.leaf)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut nodes: BTreeSet<usize> = BTreeSet::new();
        for &leaf in local.iter().chain(&ghosts) {
            nodes.extend(self.cg[leaf].iter().flatten().copied());
            if let Some(h) = &self.hanging[leaf] {
                nodes.extend(h.support.iter().map(|&(_, g)| g));
            }
        }

        Ok(RankPlan {
            local,
            ghosts,
            blocks,
            nodes: nodes.into_iter().collect(),
        })
    }

    fn plan_block(&self, rank: usize, root: Octant, leaves: Vec<usize>) -> Result<BlockPlan, MeshUnzipError> {
        let level = self.leaves[leaves[0]].level;
        let shift = level - root.level;
        let m = 1usize << shift;
        let mut grid = vec![usize::MAX; m * m * m];
        for &i in &leaves {
            let o = &self.leaves[i];
            let e: [usize; 3] = std::array::from_fn(|a| (o.coords[a] - (root.coords[a] << shift)) as usize);
            grid[(e[2] * m + e[1]) * m + e[0]] = i;
        }

        let p = self.cfg.order;
        let pw = self.cfg.padding_width;
        let size = m * p + 1 + 2 * pw;
        let base = self.anchor_scaled(&root);
        let step = 2 * i64::from(1u32 << (self.depth() - level));
        let mut cells = Vec::new();
        for (k, j, i) in iproduct!(0..size, 0..size, 0..size) {
            let Some(dir) = padded_direction([i, j, k], size, pw) else {
                continue;
            };
            let idx = [i, j, k];
            let u: Pos = std::array::from_fn(|a| base[a] + (idx[a] as i64 - pw as i64) * step);
            if !self.in_domain(u) {
                continue;
            }
            let leaf = self
                .locate(u)
                .ok_or_else(|| MeshUnzipError::MissingElement(format!("scaled point {u:?}")))?;
            let src_level = self.leaves[leaf].level;
            let relation = match src_level.cmp(&level) {
                std::cmp::Ordering::Equal => LevelRelation::Same,
                std::cmp::Ordering::Less => LevelRelation::Coarser,
                std::cmp::Ordering::Greater => LevelRelation::Finer,
            };
            cells.push(RawCell {
                dir,
                index: (k * size + j) * size + i,
                leaf,
                source: self.source_of(leaf, u)?,
                relation,
                remote: self.owners[leaf] != rank,
            });
        }
        Ok(BlockPlan {
            root,
            level,
            m,
            leaves: grid,
            cells,
        })
    }

    /// Assemble the [`LocalMesh`] of `rank` from the plans of all ranks.
    fn finish(&self, rank: usize, plans: &[RankPlan]) -> Result<LocalMesh, MeshUnzipError> {
        let plan = &plans[rank];
        let p = self.cfg.order;
        let pw = self.cfg.padding_width;

        let elem_of: HashMap<usize, usize> = plan
            .local
            .iter()
            .chain(&plan.ghosts)
            .enumerate()
            .map(|(e, &leaf)| (leaf, e))
            .collect();
        let node_of: HashMap<usize, usize> = plan.nodes.iter().enumerate().map(|(n, &g)| (g, n)).collect();
        let local_node = |g: usize| -> Result<usize, MeshUnzipError> {
            node_of
                .get(&g)
                .copied()
                .ok_or_else(|| MeshUnzipError::MissingElement(format!("global node {g} on rank {rank}")))
        };
        let local_elem = |leaf: usize| -> Result<usize, MeshUnzipError> {
            elem_of
                .get(&leaf)
                .copied()
                .ok_or_else(|| MeshUnzipError::MissingElement(format!("leaf {:?}", self.leaves[leaf])))
        };

        let mut elements = Vec::with_capacity(elem_of.len());
        for &leaf in plan.local.iter().chain(&plan.ghosts) {
            let cg = self.cg[leaf]
                .iter()
                .map(|id| id.map(&local_node).transpose())
                .collect::<Result<Vec<_>, _>>()?;
            let hanging = match &self.hanging[leaf] {
                Some(h) => Some(HangingNodes {
                    child: h.child,
                    nodes: h.nodes.clone(),
                    support: h
                        .support
                        .iter()
                        .map(|&(pi, g)| local_node(g).map(|n| (pi, n)))
                        .collect::<Result<Vec<_>, _>>()?,
                }),
                None => None,
            };
            elements.push(ElementRecord {
                octant: self.leaves[leaf],
                owner: self.owners[leaf],
                cg,
                hanging,
            });
        }
        let lookup: HashMap<Octant, usize> = elements.iter().enumerate().map(|(e, r)| (r.octant, e)).collect();

        let node_owner: Vec<usize> = plan.nodes.iter().map(|&g| self.node_owner[g]).collect();
        let begin = node_owner.partition_point(|&o| o < rank);
        let end = node_owner.partition_point(|&o| o <= rank);
        let scale = self.scale as f64;
        let node_points = plan
            .nodes
            .iter()
            .map(|&g| self.positions[g].map(|c| c as f64 / scale))
            .collect();

        let mut blocks = Vec::with_capacity(plan.blocks.len());
        let mut offset = 0usize;
        for bp in &plan.blocks {
            let size = bp.m * p + 1 + 2 * pw;
            let spacing = f64::from(1u32 << (self.depth() - bp.level)) / p as f64;
            let anchor = bp.root.anchor(self.depth());
            let mut padding = Block::empty_padding();
            let mut flags = DirectionFlags::default();
            for cell in &bp.cells {
                if cell.remote && cell.relation == LevelRelation::Same {
                    flags.set(cell.dir, true);
                }
                padding[cell.dir.index()].push(PaddingCell {
                    index: cell.index,
                    element: local_elem(cell.leaf)?,
                    source: cell.source,
                    relation: cell.relation,
                    remote: cell.remote,
                });
            }
            let independent = bp.leaves.iter().all(|&leaf| {
                let direct = self.cg[leaf].iter().flatten().all(|&g| self.node_owner[g] == rank);
                let support = self.hanging[leaf]
                    .iter()
                    .flat_map(|h| h.support.iter())
                    .all(|&(_, g)| self.node_owner[g] == rank);
                direct && support
            });
            let block = Block {
                octant: bp.root,
                regular_level: bp.level,
                elements_per_axis: bp.m,
                elements: bp.leaves.iter().map(|&leaf| local_elem(leaf)).collect::<Result<_, _>>()?,
                order: p,
                padding_width: pw,
                size,
                offset,
                origin: anchor.map(|c| f64::from(c) - pw as f64 * spacing),
                spacing,
                flags,
                independent,
                padding,
            };
            offset += block.len();
            blocks.push(block);
        }

        let mut links = Vec::new();
        for (q, other) in plans.iter().enumerate() {
            if q == rank {
                continue;
            }
            let recv = plan
                .nodes
                .iter()
                .filter(|&&g| self.node_owner[g] == q)
                .map(|&g| local_node(g))
                .collect::<Result<Vec<_>, _>>()?;
            let send = other
                .nodes
                .iter()
                .filter(|&&g| self.node_owner[g] == rank)
                .map(|&g| local_node(g))
                .collect::<Result<Vec<_>, _>>()?;
            if !send.is_empty() || !recv.is_empty() {
                links.push(PeerLink { rank: q, send, recv });
            }
        }

        let ghost_nodes: HashSet<usize> = links.iter().flat_map(|l| l.recv.iter().copied()).collect();
        log::debug!(
            "rank {rank}: {} local + {} ghost elements in {} blocks, {} nodes ({} owned, {} ghost), {} peers",
            plan.local.len(),
            plan.ghosts.len(),
            blocks.len(),
            plan.nodes.len(),
            end - begin,
            ghost_nodes.len(),
            links.len()
        );

        let mesh = LocalMesh {
            config: self.cfg,
            rank,
            n_ranks: self.n_ranks,
            elements,
            n_local: plan.local.len(),
            lookup,
            global_ids: plan.nodes.clone(),
            node_owner,
            node_points,
            owned: begin..end,
            blocks,
            unzip_len: offset,
            halo: HaloPlan {
                num_nodes: plan.nodes.len(),
                links,
            },
        };
        mesh.debug_assert_invariants();
        Ok(mesh)
    }
}
