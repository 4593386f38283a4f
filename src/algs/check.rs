//! Diagnostics for zipped and unzipped vectors.

use num_traits::Float;

use crate::mesh::local::LocalMesh;
use crate::mesh_error::MeshUnzipError;
use crate::refel::{InterpScratch, ReferenceElement};
use crate::topology::direction::Direction;

/// NaN cells found in one region of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NanReport {
    pub block: usize,
    /// `None` for the block interior.
    pub direction: Option<Direction>,
    pub count: usize,
}

/// A cell whose value disagrees with the expected field.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub block: usize,
    pub direction: Option<Direction>,
    pub cell: [usize; 3],
    pub point: [f64; 3],
    pub got: f64,
    pub want: f64,
}

/// True if any value is NaN.
pub fn is_zip_nan<T: Float>(values: &[T]) -> bool {
    values.iter().any(|v| v.is_nan())
}

/// NaN counts per block region of an unzipped buffer.
pub fn find_nan_directions(mesh: &LocalMesh, unzipped: &[f64]) -> Result<Vec<NanReport>, MeshUnzipError> {
    check_unzip_len(mesh, unzipped)?;
    let mut reports = Vec::new();
    for (b, block) in mesh.blocks().iter().enumerate() {
        let values = &unzipped[block.range()];
        // slot 0 is the interior, slot d + 1 direction d
        let mut counts = [0usize; 27];
        for (index, v) in values.iter().enumerate() {
            if v.is_nan() {
                let slot = block.direction_of(block.cell_indices(index)).map_or(0, |d| d.index() + 1);
                counts[slot] += 1;
            }
        }
        for (slot, &count) in counts.iter().enumerate().filter(|(_, c)| **c > 0) {
            let direction = match slot {
                0 => None,
                s => Some(Direction::new((s - 1) as u8)?),
            };
            log::warn!("block {b}: {count} NaN cells in {}", direction.map_or("interior".to_string(), |d| d.name()));
            reports.push(NanReport {
                block: b,
                direction,
                count,
            });
        }
    }
    Ok(reports)
}

pub fn is_unzip_nan(mesh: &LocalMesh, unzipped: &[f64]) -> Result<bool, MeshUnzipError> {
    check_unzip_len(mesh, unzipped)?;
    Ok(is_zip_nan(unzipped))
}

/// Compare every cell unzip writes against `field`, evaluated at the cell's
/// coordinates (finest-level units).
pub fn unzip_mismatches<F>(
    mesh: &LocalMesh,
    unzipped: &[f64],
    field: F,
    tol: f64,
) -> Result<Vec<Mismatch>, MeshUnzipError>
where
    F: Fn([f64; 3]) -> f64,
{
    check_unzip_len(mesh, unzipped)?;
    let mut out = Vec::new();
    for (b, block) in mesh.blocks().iter().enumerate() {
        let values = &unzipped[block.range()];
        let mut probe = |index: usize, direction: Option<Direction>| {
            let cell = block.cell_indices(index);
            let point = block.cell_point(cell);
            let (got, want) = (values[index], field(point));
            if (got - want).abs() > tol || got.is_nan() {
                out.push(Mismatch {
                    block: b,
                    direction,
                    cell,
                    point,
                    got,
                    want,
                });
            }
        };
        let pw = block.padding_width();
        let [n, _, _] = block.allocation();
        for (k, j, i) in itertools::iproduct!(pw..n - pw, pw..n - pw, pw..n - pw) {
            probe(block.linear_index(i, j, k), None);
        }
        for dir in Direction::all() {
            for cell in block.padding(dir).iter().filter(|c| block.fills(dir, c)) {
                probe(cell.index, Some(dir));
            }
        }
    }
    Ok(out)
}

/// Compare the nodal values of every local element against `field` at its
/// nodes. Returns `(element, node, got, want)` for each disagreement.
pub fn element_value_mismatches<F>(
    mesh: &LocalMesh,
    refel: &ReferenceElement,
    zipped: &[f64],
    field: F,
    tol: f64,
    scratch: &mut InterpScratch,
) -> Result<Vec<(usize, usize, f64, f64)>, MeshUnzipError>
where
    F: Fn([f64; 3]) -> f64,
{
    let p = mesh.order();
    let nrp = p + 1;
    let depth = mesh.config().max_depth;
    let mut vals = vec![0.0; mesh.config().nodes_per_element()];
    let mut out = Vec::new();
    for e in mesh.local_elements() {
        mesh.element_nodal_values(zipped, e, refel, scratch, &mut vals)?;
        let octant = mesh.element(e)?.octant;
        let anchor = octant.anchor(depth);
        let h = f64::from(octant.len(depth)) / p as f64;
        for (n, &got) in vals.iter().enumerate() {
            let ijk = [n % nrp, (n / nrp) % nrp, n / (nrp * nrp)];
            let x: [f64; 3] = std::array::from_fn(|a| f64::from(anchor[a]) + ijk[a] as f64 * h);
            let want = field(x);
            if (got - want).abs() > tol {
                out.push((e, n, got, want));
            }
        }
    }
    Ok(out)
}

fn check_unzip_len(mesh: &LocalMesh, unzipped: &[f64]) -> Result<(), MeshUnzipError> {
    if unzipped.len() == mesh.unzip_len() {
        Ok(())
    } else {
        Err(MeshUnzipError::SizeMismatch {
            what: "unzipped vector",
            expected: mesh.unzip_len(),
            found: unzipped.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnzipConfig;
    use crate::mesh::builder::MeshBuilder;
    use crate::topology::forest::OctForest;

    #[test]
    fn nan_is_attributed_to_its_region() {
        let cfg = UnzipConfig::new(2, 1, 3);
        let mesh = MeshBuilder::single_rank(OctForest::uniform(1).sorted_leaves(3), cfg)
            .unwrap()
            .build_rank(0)
            .unwrap();
        let mut buf = vec![0.0; mesh.unzip_len()];
        assert!(!is_unzip_nan(&mesh, &buf).unwrap());
        let b = &mesh.blocks()[0];
        buf[b.linear_index(0, 3, 3)] = f64::NAN;
        buf[b.linear_index(3, 3, 3)] = f64::NAN;
        let reports = find_nan_directions(&mesh, &buf).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].direction, None);
        assert_eq!(reports[1].direction.unwrap().name(), "LEFT");
        assert!(is_zip_nan(&[1.0f32, f32::NAN]));
    }
}
