mod util;
use util::*;

use mesh_unzip::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn assert_close(got: &[f64], want: &[f64], tol: f64) {
    assert_eq!(got.len(), want.len());
    for (n, (g, w)) in got.iter().zip(want).enumerate() {
        assert!((g - w).abs() <= tol, "node {n}: got {g}, want {w}");
    }
}

#[test]
fn multiplicity_zip_inverts_unzip_on_uniform_mesh() {
    let mesh = single_mesh(uniform_leaves());
    let refel = refel();
    let transfer = BlockTransfer::new(&mesh, &refel, &NoComm).unwrap();
    let mut scratch = refel.scratch();
    let weights = Multiplicity::assemble(&transfer, &mut scratch).unwrap();

    let mut rng = SmallRng::seed_from_u64(42);
    let u: Vec<f64> = (0..mesh.num_nodes()).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let unzipped = transfer.unzip(&u, &mut scratch).unwrap();
    let back = transfer.zip(&unzipped, &weights, &mut scratch).unwrap();
    assert_close(&back, &u, 1e-12);
}

#[test]
fn unweighted_zip_of_ones_is_the_multiplicity() {
    let mesh = single_mesh(uniform_leaves());
    let refel = refel();
    let transfer = BlockTransfer::new(&mesh, &refel, &NoComm).unwrap();
    let mut scratch = refel.scratch();
    let weights = Multiplicity::assemble(&transfer, &mut scratch).unwrap();
    let ones = vec![1.0; mesh.unzip_len()];
    let summed = transfer.zip(&ones, &Unweighted, &mut scratch).unwrap();
    assert_eq!(summed, weights.weights());
    let max = weights.weights().iter().copied().fold(0.0, f64::max);
    assert_eq!(max, 8.0);
}

#[test]
fn constants_survive_zip_on_nonconforming_mesh() {
    let mesh = single_mesh(refined_leaves());
    let refel = refel();
    let transfer = BlockTransfer::new(&mesh, &refel, &NoComm).unwrap();
    let mut scratch = refel.scratch();
    let weights = Multiplicity::assemble(&transfer, &mut scratch).unwrap();
    let u = vec![3.5; mesh.num_nodes()];
    let unzipped = transfer.unzip(&u, &mut scratch).unwrap();
    let back = transfer.zip(&unzipped, &weights, &mut scratch).unwrap();
    assert_close(&back, &u, 1e-12);
}

#[test]
fn custom_weighting_closure_is_applied_to_owned_nodes() {
    let mesh = single_mesh(uniform_leaves());
    let refel = refel();
    let transfer = BlockTransfer::new(&mesh, &refel, &NoComm).unwrap();
    let mut scratch = refel.scratch();
    let weights = Multiplicity::assemble(&transfer, &mut scratch).unwrap();
    let doubled = |n: usize| 2.0 * weights.weights()[n];
    let u = sample(&mesh, field);
    let unzipped = transfer.unzip(&u, &mut scratch).unwrap();
    let half = transfer.zip(&unzipped, &doubled, &mut scratch).unwrap();
    let want: Vec<f64> = u.iter().map(|v| v / 2.0).collect();
    assert_close(&half, &want, 1e-12);
}

#[test]
fn two_rank_zip_inverts_unzip() {
    let results = run_ranks(split_meshes(uniform_leaves(), 2), |mesh, comm| {
        let refel = refel();
        let transfer = BlockTransfer::new(&mesh, &refel, &comm).unwrap();
        let mut scratch = refel.scratch();
        let weights = Multiplicity::assemble(&transfer, &mut scratch).unwrap();
        let unzipped = transfer.unzip(&sample_owned(&mesh, field), &mut scratch).unwrap();
        let back = transfer.zip(&unzipped, &weights, &mut scratch).unwrap();
        (back, sample(&mesh, field), transfer.registry().open_count())
    });
    for (back, want, open) in results {
        // ghosts are refreshed by the final scatter, so every entry matches
        assert_close(&back, &want, 1e-12);
        assert_eq!(open, 0);
    }
}
