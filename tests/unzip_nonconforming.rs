mod util;
use util::*;

use mesh_unzip::algs::check::{element_value_mismatches, unzip_mismatches};
use mesh_unzip::mesh::{CellSource, LevelRelation};
use mesh_unzip::prelude::*;

#[test]
fn refined_mesh_has_hanging_nodes_and_mixed_level_blocks() {
    let mesh = single_mesh(refined_leaves());
    assert_eq!(mesh.local_elements().len(), 71);
    // seven coarse singles next to the refined cell, seven full level-1 blocks, one fine block
    assert_eq!(mesh.blocks().len(), 15);
    let fine = mesh
        .blocks()
        .iter()
        .find(|b| b.regular_level() == 3)
        .unwrap();
    assert_eq!(fine.elements_per_axis(), 2);
    assert_eq!(fine.octant(), Octant::new(2, [1, 1, 1]));

    let hanging = mesh.elements().iter().filter(|e| e.hanging.is_some()).count();
    assert_eq!(hanging, 8);
    for e in mesh.elements().iter().filter_map(|e| e.hanging.as_ref()) {
        assert!(!e.nodes.is_empty());
        assert!(!e.support.is_empty());
    }
}

#[test]
fn padding_sources_cover_coarser_and_finer_neighbors() {
    let mesh = single_mesh(refined_leaves());
    let mut seen_coarse_child = false;
    let mut seen_finer = false;
    for block in mesh.blocks() {
        for dir in Direction::all() {
            for cell in block.padding(dir) {
                match (cell.relation, cell.source) {
                    (LevelRelation::Coarser, CellSource::Child { .. }) => seen_coarse_child = true,
                    (LevelRelation::Finer, CellSource::Node(_)) => seen_finer = true,
                    (LevelRelation::Finer, CellSource::Child { .. }) => {
                        panic!("finer neighbors are injected, never interpolated")
                    }
                    _ => {}
                }
                assert!(!cell.remote);
            }
        }
    }
    assert!(seen_coarse_child && seen_finer);
}

#[test]
fn smooth_field_is_reproduced_across_levels() {
    let mesh = single_mesh(refined_leaves());
    let refel = refel();
    let transfer = BlockTransfer::new(&mesh, &refel, &NoComm).unwrap();
    let zipped = sample(&mesh, field);
    let unzipped = transfer.unzip(&zipped, &mut refel.scratch()).unwrap();
    let bad = unzip_mismatches(&mesh, &unzipped, field, 1e-8).unwrap();
    assert!(bad.is_empty(), "{} mismatches, first {:?}", bad.len(), bad.first());
}

#[test]
fn hanging_nodes_are_interpolated_from_the_coarse_face() {
    let mesh = single_mesh(refined_leaves());
    let refel = refel();
    let zipped = sample(&mesh, field);
    let bad = element_value_mismatches(&mesh, &refel, &zipped, field, 1e-8, &mut refel.scratch()).unwrap();
    assert!(bad.is_empty(), "first mismatch {:?}", bad.first());
}

#[test]
fn unbalanced_refinement_is_rejected() {
    let mut forest = OctForest::uniform(2);
    forest.refine_cells(&[Octant::new(2, [1, 1, 1])]);
    forest.refine_cells(&[Octant::new(3, [3, 3, 3])]);
    let err = MeshBuilder::single_rank(forest.sorted_leaves(MAX_DEPTH), config())
        .unwrap()
        .build_rank(0)
        .unwrap_err();
    assert!(matches!(err, MeshUnzipError::UnbalancedMesh { .. }));
}
