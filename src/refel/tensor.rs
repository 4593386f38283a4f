//! Separable application of 1D operators to tensor-product nodal arrays.
//!
//! Arrays are stored x-fastest: the value of node `(i, j, k)` lives at
//! `(k * n + j) * n + i`.

/// Apply the `n x n` row-major operator `op` along `axis` of a `dim`-dimensional
/// array with `n` points per axis.
pub(crate) fn apply_axis(
    n: usize,
    dim: usize,
    axis: usize,
    op: &[f64],
    input: &[f64],
    output: &mut [f64],
) {
    debug_assert!(axis < dim);
    debug_assert_eq!(op.len(), n * n);
    let inner = n.pow(axis as u32);
    let outer = n.pow((dim - 1 - axis) as u32);
    for o in 0..outer {
        for i in 0..n {
            let row = &op[i * n..(i + 1) * n];
            for s in 0..inner {
                let mut acc = 0.0;
                for (m, w) in row.iter().enumerate() {
                    acc += w * input[(o * n + m) * inner + s];
                }
                output[(o * n + i) * inner + s] = acc;
            }
        }
    }
}

/// Apply one operator per axis: x first, then y, then z.
///
/// `im1` and `im2` must hold at least `n^dim` values; they are clobbered.
pub(crate) fn apply_separable(
    n: usize,
    ops: &[&[f64]],
    input: &[f64],
    output: &mut [f64],
    im1: &mut [f64],
    im2: &mut [f64],
) {
    let dim = ops.len();
    let len = n.pow(dim as u32);
    match dim {
        1 => apply_axis(n, 1, 0, ops[0], input, output),
        2 => {
            apply_axis(n, 2, 0, ops[0], input, &mut im1[..len]);
            apply_axis(n, 2, 1, ops[1], &im1[..len], output);
        }
        _ => {
            apply_axis(n, 3, 0, ops[0], input, &mut im1[..len]);
            apply_axis(n, 3, 1, ops[1], &im1[..len], &mut im2[..len]);
            apply_axis(n, 3, 2, ops[2], &im2[..len], output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(n: usize) -> Vec<f64> {
        (0..n * n)
            .map(|idx| if idx / n == idx % n { 1.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn axis_selection_follows_storage_order() {
        let n = 2;
        // swaps the two entries along one axis
        let swap = vec![0.0, 1.0, 1.0, 0.0];
        let input: Vec<f64> = (0..8).map(|v| v as f64).collect();
        let mut out = vec![0.0; 8];

        apply_axis(n, 3, 0, &swap, &input, &mut out);
        assert_eq!(out, vec![1.0, 0.0, 3.0, 2.0, 5.0, 4.0, 7.0, 6.0]);

        apply_axis(n, 3, 1, &swap, &input, &mut out);
        assert_eq!(out, vec![2.0, 3.0, 0.0, 1.0, 6.0, 7.0, 4.0, 5.0]);

        apply_axis(n, 3, 2, &swap, &input, &mut out);
        assert_eq!(out, vec![4.0, 5.0, 6.0, 7.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn separable_identity_is_noop() {
        let n = 3;
        let id = identity(n);
        let input: Vec<f64> = (0..27).map(|v| (v as f64).sin()).collect();
        let mut out = vec![0.0; 27];
        let (mut a, mut b) = (vec![0.0; 27], vec![0.0; 27]);
        apply_separable(n, &[&id, &id, &id], &input, &mut out, &mut a, &mut b);
        assert_eq!(out, input);
    }
}
