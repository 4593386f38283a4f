mod util;
use util::*;

use mesh_unzip::algs::check::{element_value_mismatches, find_nan_directions, is_unzip_nan, unzip_mismatches};
use mesh_unzip::prelude::*;

#[test]
fn smooth_field_is_reproduced_in_every_filled_cell() {
    let mesh = single_mesh(uniform_leaves());
    let refel = refel();
    let transfer = BlockTransfer::new(&mesh, &refel, &NoComm).unwrap();
    let zipped = sample(&mesh, field);
    let unzipped = transfer.unzip(&zipped, &mut refel.scratch()).unwrap();
    let bad = unzip_mismatches(&mesh, &unzipped, field, 1e-10).unwrap();
    assert!(bad.is_empty(), "first mismatch: {:?}", bad.first());
    assert_eq!(transfer.registry().open_count(), 0);
}

#[test]
fn whole_uniform_forest_is_one_block_without_padding_sources() {
    let mesh = single_mesh(uniform_leaves());
    assert_eq!(mesh.blocks().len(), 1);
    let block = &mesh.blocks()[0];
    assert_eq!(block.elements_per_axis(), 4);
    assert_eq!(block.allocation(), [4 * ORDER + 1 + 2 * PADDING; 3]);
    assert_eq!(mesh.unzip_len(), block.len());
    // every padding cell lies outside the domain
    assert!(Direction::all().all(|d| block.padding(d).is_empty()));
}

#[test]
fn domain_boundary_cells_stay_zero() {
    let mesh = single_mesh(uniform_leaves());
    let refel = refel();
    let transfer = BlockTransfer::new(&mesh, &refel, &NoComm).unwrap();
    let unzipped = transfer.unzip(&sample(&mesh, field), &mut refel.scratch()).unwrap();
    let block = &mesh.blocks()[0];
    let [n, _, _] = block.allocation();
    for (k, j, i) in itertools::iproduct!(0..n, 0..n, 0..n) {
        if block.direction_of([i, j, k]).is_some() {
            assert_eq!(unzipped[block.linear_index(i, j, k)], 0.0);
        }
    }
}

#[test]
fn zero_input_unzips_to_zero_without_nan() {
    let leaves = refined_leaves();
    let mesh = single_mesh(leaves);
    let refel = refel();
    let transfer = BlockTransfer::new(&mesh, &refel, &NoComm).unwrap();
    let zipped = vec![0.0; mesh.num_nodes()];
    let mut scratch = refel.scratch();
    let first = transfer.unzip(&zipped, &mut scratch).unwrap();
    assert!(first.iter().all(|v| *v == 0.0));
    assert!(!is_unzip_nan(&mesh, &first).unwrap());
    assert!(find_nan_directions(&mesh, &first).unwrap().is_empty());

    // repeated unzips into the same buffer give the same result
    let mut again = vec![1.0; mesh.unzip_len()];
    transfer.unzip_into(&zipped, &mut again, &mut scratch).unwrap();
    assert_eq!(first, again);
}

#[test]
fn element_values_match_field_at_nodes() {
    let mesh = single_mesh(uniform_leaves());
    let refel = refel();
    let zipped = sample(&mesh, field);
    let bad = element_value_mismatches(&mesh, &refel, &zipped, field, 1e-12, &mut refel.scratch()).unwrap();
    assert!(bad.is_empty());
}

#[test]
fn wrong_lengths_rejected() {
    let mesh = single_mesh(uniform_leaves());
    let refel = refel();
    let transfer = BlockTransfer::new(&mesh, &refel, &NoComm).unwrap();
    let mut scratch = refel.scratch();
    assert!(matches!(
        transfer.unzip(&vec![0.0; mesh.num_nodes() - 1], &mut scratch),
        Err(MeshUnzipError::SizeMismatch { .. })
    ));
    let mut short = vec![0.0; mesh.unzip_len() - 1];
    assert!(matches!(
        transfer.unzip_into(&vec![0.0; mesh.num_nodes()], &mut short, &mut scratch),
        Err(MeshUnzipError::SizeMismatch { .. })
    ));
}

#[test]
fn dg_indices_round_trip_through_element_coordinates() {
    let mesh = single_mesh(uniform_leaves());
    let nrp = ORDER + 1;
    let dg = mesh.e2n_dg(5, (3 * nrp + 2) * nrp + 1);
    assert_eq!(mesh.dg_to_eijk(dg).unwrap(), (5, [1, 2, 3]));
    assert!(mesh.dg_to_eijk(mesh.elements().len() * nrp * nrp * nrp).is_err());
}
