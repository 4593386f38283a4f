//! Reference element: 1D nodal/modal tables and separable parent/child transfers.
//!
//! A [`ReferenceElement`] is built once per `(dim, order)` and is immutable
//! afterwards, so it can be shared read-only between threads. All scratch
//! storage lives in an [`InterpScratch`] owned by the caller; concurrent callers
//! each bring their own.
//!
//! Children are numbered by a bit code: bit 0 selects the x half, bit 1 the y
//! half and bit 2 the z half (0 = lower, 1 = upper).

pub mod basis;
pub(crate) mod tensor;

use nalgebra::DMatrix;

use crate::mesh_error::MeshUnzipError;
use self::basis::{
    child_points, equispaced_points, gauss_lobatto_points, gauss_points, grad_vandermonde,
    vandermonde,
};
use self::tensor::apply_separable;

/// Caller-owned workspace for the separable transfers.
///
/// Buffers grow on demand, so a scratch built for one reference element can be
/// reused with another of higher order.
#[derive(Debug, Clone, Default)]
pub struct InterpScratch {
    im1: Vec<f64>,
    im2: Vec<f64>,
    stage: Vec<f64>,
    accum: Vec<f64>,
    restriction_override: Option<f64>,
}

impl InterpScratch {
    /// Workspace able to hold `len` nodal values without reallocating.
    pub fn with_capacity(len: usize) -> Self {
        Self {
            im1: vec![0.0; len],
            im2: vec![0.0; len],
            stage: vec![0.0; len],
            accum: vec![0.0; len],
            restriction_override: None,
        }
    }

    /// Test hook: every child-to-parent result is overwritten with `value`.
    ///
    /// With `Some(1.0)` an accumulation counts how many children contribute
    /// to each parent node.
    pub fn set_restriction_override(&mut self, value: Option<f64>) {
        self.restriction_override = value;
    }

    pub fn restriction_override(&self) -> Option<f64> {
        self.restriction_override
    }

    fn ensure(&mut self, len: usize) {
        for buf in [
            &mut self.im1,
            &mut self.im2,
            &mut self.stage,
            &mut self.accum,
        ] {
            if buf.len() < len {
                buf.resize(len, 0.0);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transfer {
    Prolong,
    Restrict,
}

/// Immutable 1D operator tables for one dimension and order.
#[derive(Debug, Clone)]
pub struct ReferenceElement {
    dim: usize,
    order: usize,
    nrp: usize,
    /// equispaced nodal points
    u: Vec<f64>,
    u_child: [Vec<f64>; 2],
    /// Gauss-Lobatto-Legendre points and weights
    r: Vec<f64>,
    wgll: Vec<f64>,
    /// Gauss points and weights
    g: Vec<f64>,
    w: Vec<f64>,
    vu: Vec<f64>,
    vu_inv: Vec<f64>,
    vr: Vec<f64>,
    vg: Vec<f64>,
    ip: [Vec<f64>; 2],
    ipt: [Vec<f64>; 2],
    dr: Vec<f64>,
    dg: Vec<f64>,
    dgt: Vec<f64>,
    quad: Vec<f64>,
    quadt: Vec<f64>,
    mass: Vec<f64>,
    mass_inv: Vec<f64>,
}

fn row_major(m: &DMatrix<f64>) -> Vec<f64> {
    (0..m.nrows())
        .flat_map(|i| (0..m.ncols()).map(move |j| m[(i, j)]))
        .collect()
}

impl ReferenceElement {
    /// Build the tables for `dim` in `1..=3` and `order >= 1`.
    pub fn new(dim: usize, order: usize) -> Result<Self, MeshUnzipError> {
        if !(1..=3).contains(&dim) {
            return Err(MeshUnzipError::InvalidDimension {
                requested: dim,
                supported: 3,
            });
        }
        if order == 0 {
            return Err(MeshUnzipError::InvalidOrder(order));
        }
        let nrp = order + 1;

        let u = equispaced_points(order);
        let u_child = [child_points(&u, 0), child_points(&u, 1)];
        let (r, wgll) = gauss_lobatto_points(order);
        let (g, w) = gauss_points(nrp);

        let vu = vandermonde(&u, nrp);
        let vu_inv = vu
            .clone()
            .try_inverse()
            .ok_or(MeshUnzipError::SingularOperator("Vandermonde"))?;
        let vr = vandermonde(&r, nrp);
        let vg = vandermonde(&g, nrp);

        // nodal -> nodal maps are similarity transforms through the modal basis
        let ip0 = vandermonde(&u_child[0], nrp) * &vu_inv;
        let ip1 = vandermonde(&u_child[1], nrp) * &vu_inv;
        let dr = grad_vandermonde(&u, nrp) * &vu_inv;
        let dg = grad_vandermonde(&g, nrp) * &vu_inv;
        let quad = &vg * &vu_inv;
        // orthonormal modes: M = V^-T V^-1
        let mass = vu_inv.transpose() * &vu_inv;
        let mass_inv = &vu * vu.transpose();

        log::debug!("reference element: dim={dim} order={order}");

        Ok(Self {
            dim,
            order,
            nrp,
            u,
            u_child,
            r,
            wgll,
            g,
            w,
            vu: row_major(&vu),
            vu_inv: row_major(&vu_inv),
            vr: row_major(&vr),
            vg: row_major(&vg),
            ipt: [row_major(&ip0.transpose()), row_major(&ip1.transpose())],
            ip: [row_major(&ip0), row_major(&ip1)],
            dgt: row_major(&dg.transpose()),
            dr: row_major(&dr),
            dg: row_major(&dg),
            quadt: row_major(&quad.transpose()),
            quad: row_major(&quad),
            mass: row_major(&mass),
            mass_inv: row_major(&mass_inv),
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Points per axis, `order + 1`.
    pub fn nodes_per_axis(&self) -> usize {
        self.nrp
    }

    /// Nodal values per element in `form_dim` dimensions.
    pub fn nodes_per_element(&self, form_dim: usize) -> usize {
        self.nrp.pow(form_dim as u32)
    }

    /// A workspace large enough for every transfer of this element.
    pub fn scratch(&self) -> InterpScratch {
        InterpScratch::with_capacity(self.nodes_per_element(self.dim))
    }

    // ---- 1D tables (row-major, `nrp x nrp`) ----

    pub fn equispaced_nodes(&self) -> &[f64] {
        &self.u
    }

    /// Parent-coordinate positions of the nodes of 1D child 0 or 1.
    pub fn child_nodes(&self, half: usize) -> &[f64] {
        &self.u_child[half & 1]
    }

    pub fn gll_nodes(&self) -> &[f64] {
        &self.r
    }

    pub fn gll_weights(&self) -> &[f64] {
        &self.wgll
    }

    pub fn gauss_nodes(&self) -> &[f64] {
        &self.g
    }

    pub fn gauss_weights(&self) -> &[f64] {
        &self.w
    }

    pub fn vandermonde(&self) -> &[f64] {
        &self.vu
    }

    pub fn vandermonde_inv(&self) -> &[f64] {
        &self.vu_inv
    }

    pub fn vandermonde_gll(&self) -> &[f64] {
        &self.vr
    }

    pub fn vandermonde_gauss(&self) -> &[f64] {
        &self.vg
    }

    /// Parent nodal values to the nodal values of 1D child `half`.
    pub fn prolongation_1d(&self, half: usize) -> &[f64] {
        &self.ip[half & 1]
    }

    /// Transpose of [`prolongation_1d`](Self::prolongation_1d).
    pub fn restriction_1d(&self, half: usize) -> &[f64] {
        &self.ipt[half & 1]
    }

    /// Derivative of the nodal interpolant at the nodal points.
    pub fn dr(&self) -> &[f64] {
        &self.dr
    }

    /// Derivative of the nodal interpolant at the Gauss points.
    pub fn dg(&self) -> &[f64] {
        &self.dg
    }

    pub fn dgt(&self) -> &[f64] {
        &self.dgt
    }

    /// Nodal values to values at the Gauss points.
    pub fn quad_1d(&self) -> &[f64] {
        &self.quad
    }

    pub fn quadt_1d(&self) -> &[f64] {
        &self.quadt
    }

    /// Nodal mass matrix on `[-1, 1]`.
    pub fn mass_1d(&self) -> &[f64] {
        &self.mass
    }

    pub fn mass_inv_1d(&self) -> &[f64] {
        &self.mass_inv
    }

    // ---- transfers ----

    /// Interpolate 3D parent values onto child `child` (`0..8`).
    pub fn parent_to_child_3d(
        &self,
        input: &[f64],
        child: u8,
        out: &mut [f64],
        scratch: &mut InterpScratch,
    ) -> Result<(), MeshUnzipError> {
        self.transfer(3, Transfer::Prolong, input, child, out, scratch)
    }

    /// Restriction contribution of child `child` to its parent (transposed operators).
    pub fn child_to_parent_3d(
        &self,
        input: &[f64],
        child: u8,
        out: &mut [f64],
        scratch: &mut InterpScratch,
    ) -> Result<(), MeshUnzipError> {
        self.transfer(3, Transfer::Restrict, input, child, out, scratch)
    }

    /// Face form of [`parent_to_child_3d`](Self::parent_to_child_3d), `child` in `0..4`.
    pub fn parent_to_child_2d(
        &self,
        input: &[f64],
        child: u8,
        out: &mut [f64],
        scratch: &mut InterpScratch,
    ) -> Result<(), MeshUnzipError> {
        self.transfer(2, Transfer::Prolong, input, child, out, scratch)
    }

    pub fn child_to_parent_2d(
        &self,
        input: &[f64],
        child: u8,
        out: &mut [f64],
        scratch: &mut InterpScratch,
    ) -> Result<(), MeshUnzipError> {
        self.transfer(2, Transfer::Restrict, input, child, out, scratch)
    }

    /// Edge form, `child` in `0..2`.
    pub fn parent_to_child_1d(
        &self,
        input: &[f64],
        child: u8,
        out: &mut [f64],
        scratch: &mut InterpScratch,
    ) -> Result<(), MeshUnzipError> {
        self.transfer(1, Transfer::Prolong, input, child, out, scratch)
    }

    pub fn child_to_parent_1d(
        &self,
        input: &[f64],
        child: u8,
        out: &mut [f64],
        scratch: &mut InterpScratch,
    ) -> Result<(), MeshUnzipError> {
        self.transfer(1, Transfer::Restrict, input, child, out, scratch)
    }

    /// L2 projection of all `2^form_dim` children back onto the parent.
    ///
    /// Computes `M^-1 * sum_c I_c^T (M / 2^d) x_c` with the tensor mass matrix
    /// `M`, which returns the parent values exactly whenever the children were
    /// produced by [`parent_to_child_3d`](Self::parent_to_child_3d) (or its
    /// lower-dimensional forms) from a common parent.
    pub fn project_children_to_parent(
        &self,
        form_dim: usize,
        children: &[&[f64]],
        out: &mut [f64],
        scratch: &mut InterpScratch,
    ) -> Result<(), MeshUnzipError> {
        self.check_form(form_dim)?;
        let n_children = 1usize << form_dim;
        if children.len() != n_children {
            return Err(MeshUnzipError::SizeMismatch {
                what: "children",
                expected: n_children,
                found: children.len(),
            });
        }
        let len = self.nodes_per_element(form_dim);
        check_len("projection output", len, out.len())?;
        scratch.ensure(len);

        let scale = 1.0 / n_children as f64;
        let mass_ops: Vec<&[f64]> = vec![self.mass.as_slice(); form_dim];
        out.fill(0.0);
        let InterpScratch {
            im1,
            im2,
            stage,
            accum,
            ..
        } = scratch;

        for (c, child) in children.iter().enumerate() {
            check_len("child values", len, child.len())?;
            apply_separable(self.nrp, &mass_ops, child, &mut stage[..len], im1, im2);
            let ops: Vec<&[f64]> = (0..form_dim)
                .map(|axis| self.ipt[(c >> axis) & 1].as_slice())
                .collect();
            apply_separable(self.nrp, &ops, &stage[..len], &mut accum[..len], im1, im2);
            for (o, a) in out.iter_mut().zip(&accum[..len]) {
                *o += scale * a;
            }
        }

        stage[..len].copy_from_slice(out);
        let inv_ops: Vec<&[f64]> = vec![self.mass_inv.as_slice(); form_dim];
        apply_separable(self.nrp, &inv_ops, &stage[..len], out, im1, im2);
        Ok(())
    }

    fn check_form(&self, form_dim: usize) -> Result<(), MeshUnzipError> {
        if form_dim == 0 || form_dim > self.dim {
            return Err(MeshUnzipError::InvalidDimension {
                requested: form_dim,
                supported: self.dim,
            });
        }
        Ok(())
    }

    fn transfer(
        &self,
        form_dim: usize,
        kind: Transfer,
        input: &[f64],
        child: u8,
        out: &mut [f64],
        scratch: &mut InterpScratch,
    ) -> Result<(), MeshUnzipError> {
        self.check_form(form_dim)?;
        if usize::from(child) >= 1 << form_dim {
            return Err(MeshUnzipError::InvalidChild {
                child,
                dim: form_dim,
            });
        }
        let len = self.nodes_per_element(form_dim);
        check_len("transfer input", len, input.len())?;
        check_len("transfer output", len, out.len())?;
        scratch.ensure(len);

        let table = match kind {
            Transfer::Prolong => &self.ip,
            Transfer::Restrict => &self.ipt,
        };
        let ops: Vec<&[f64]> = (0..form_dim)
            .map(|axis| table[(usize::from(child) >> axis) & 1].as_slice())
            .collect();
        apply_separable(self.nrp, &ops, input, out, &mut scratch.im1, &mut scratch.im2);

        if kind == Transfer::Restrict {
            if let Some(value) = scratch.restriction_override {
                out.fill(value);
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
