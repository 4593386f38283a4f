#![allow(dead_code)]
use mesh_unzip::prelude::*;

pub const MAX_DEPTH: u8 = 4;
pub const ORDER: usize = 4;
pub const PADDING: usize = 3;

pub fn config() -> UnzipConfig {
    UnzipConfig::new(ORDER, PADDING, MAX_DEPTH)
}

/// 64 leaves at level 2.
pub fn uniform_leaves() -> Vec<Octant> {
    OctForest::uniform(2).sorted_leaves(MAX_DEPTH)
}

/// Level 2 with the cell at (1, 1, 1) refined once: balanced, with hanging nodes.
pub fn refined_leaves() -> Vec<Octant> {
    let mut forest = OctForest::uniform(2);
    forest.refine_cells(&[Octant::new(2, [1, 1, 1])]);
    forest.sorted_leaves(MAX_DEPTH)
}

pub fn single_mesh(leaves: Vec<Octant>) -> LocalMesh {
    MeshBuilder::single_rank(leaves, config())
        .unwrap()
        .build_rank(0)
        .unwrap()
}

pub fn split_meshes(leaves: Vec<Octant>, n_ranks: usize) -> Vec<LocalMesh> {
    MeshBuilder::partitioned(leaves, n_ranks, config())
        .unwrap()
        .build_all()
        .unwrap()
}

pub fn refel() -> ReferenceElement {
    ReferenceElement::new(3, ORDER).unwrap()
}

/// Smooth field of degree at most 4 per axis, positive on the domain.
pub fn field(p: [f64; 3]) -> f64 {
    let [x, y, z] = p.map(|c| c / f64::from(1u32 << MAX_DEPTH));
    2.0 + 0.3 * x - 0.2 * y + 0.1 * z + 0.5 * x * y * z + 0.4 * x * x * z
}

/// `f` at every node of the view.
pub fn sample<F: Fn([f64; 3]) -> f64>(mesh: &LocalMesh, f: F) -> Vec<f64> {
    mesh.node_points().iter().map(|&p| f(p)).collect()
}

/// `f` at owned nodes, NaN on ghosts.
pub fn sample_owned<F: Fn([f64; 3]) -> f64>(mesh: &LocalMesh, f: F) -> Vec<f64> {
    mesh.node_points()
        .iter()
        .enumerate()
        .map(|(n, &p)| if mesh.is_owned(n) { f(p) } else { f64::NAN })
        .collect()
}

/// Run `f` once per rank on its own thread with a shared in-process world.
pub fn run_ranks<T, F>(meshes: Vec<LocalMesh>, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(LocalMesh, RayonComm) -> T + Sync,
{
    let world = RayonComm::world(meshes.len());
    std::thread::scope(|s| {
        let handles: Vec<_> = meshes
            .into_iter()
            .zip(world)
            .map(|(mesh, comm)| {
                let f = &f;
                s.spawn(move || f(mesh, comm))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}
