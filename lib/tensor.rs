//! Dense-array plumbing for local tensors.
//!
//! Everything here works on plain `ndarray` arrays: general pairwise
//! contraction, partial traces, block placement, and the QR, LQ, and truncated
//! singular value decompositions that drive canonicalization and compression.
//! Local tensors are always laid out as `[left bond, legs..., right bond]`, so
//! "left" and "right" matricizations group every axis but the last or first,
//! respectively.

use itertools::Itertools;
use ndarray::{ self as nd, Dimension, ShapeArg };
use ndarray_linalg::{ QRInto, SVDInto, error::LinalgError };
use thiserror::Error;
use crate::Entry;

#[derive(Debug, Error)]
pub enum TensorError {
    /// Returned when a contraction is attempted over axes that don't exist,
    /// appear twice, or have mismatched dimensions.
    #[error("error in tensor contraction: incompatible axes")]
    IncompatibleAxes,

    /// Returned when a reordering of array axes is attempted over a number of
    /// sites that does not evenly divide the number of axes.
    #[error("error in axis reordering: {ndim} axes cannot be spread over {sites} sites")]
    IndivisibleAxes { ndim: usize, sites: usize },

    #[error(transparent)]
    Shape(#[from] nd::ShapeError),

    #[error(transparent)]
    Linalg(#[from] LinalgError),
}
use TensorError::*;
pub type TensorResult<T> = Result<T, TensorError>;

/// Reshape an array to `shape` in logical (row-major) order, regardless of its
/// memory layout.
pub fn reshape<A, S, D, E>(a: &nd::ArrayBase<S, D>, shape: E)
    -> TensorResult<nd::Array<A, E::Dim>>
where
    A: Clone,
    S: nd::Data<Elem = A>,
    D: Dimension,
    E: ShapeArg,
{
    Ok(a.to_shape(shape)?.into_owned())
}

/// Contract `a` and `b` over the paired axes `axes_a[k] <-> axes_b[k]`.
///
/// The axes of the result are the remaining axes of `a` followed by the
/// remaining axes of `b`, each in their original order. Empty axis lists give
/// the outer product.
pub fn tensordot<A>(
    a: &nd::ArrayD<A>,
    b: &nd::ArrayD<A>,
    axes_a: &[usize],
    axes_b: &[usize],
) -> TensorResult<nd::ArrayD<A>>
where A: nd::LinalgScalar
{
    let sh_a = a.shape();
    let sh_b = b.shape();
    let valid
        = axes_a.len() == axes_b.len()
        && axes_a.iter().all_unique()
        && axes_b.iter().all_unique()
        && axes_a.iter().zip(axes_b)
            .all(|(&i, &j)| i < a.ndim() && j < b.ndim() && sh_a[i] == sh_b[j]);
    if !valid { return Err(IncompatibleAxes); }

    let free_a: Vec<usize>
        = (0..a.ndim()).filter(|k| !axes_a.contains(k)).collect();
    let free_b: Vec<usize>
        = (0..b.ndim()).filter(|k| !axes_b.contains(k)).collect();
    let m: usize = free_a.iter().map(|&k| sh_a[k]).product();
    let n: usize = free_b.iter().map(|&k| sh_b[k]).product();
    let c: usize = axes_a.iter().map(|&k| sh_a[k]).product();

    let perm_a: Vec<usize> = free_a.iter().chain(axes_a).copied().collect();
    let perm_b: Vec<usize> = axes_b.iter().chain(&free_b).copied().collect();
    let mat_a = reshape(&a.view().permuted_axes(perm_a), (m, c))?;
    let mat_b = reshape(&b.view().permuted_axes(perm_b), (c, n))?;

    let new_shape: Vec<usize>
        = free_a.iter().map(|&k| sh_a[k])
        .chain(free_b.iter().map(|&k| sh_b[k]))
        .collect();
    reshape(&mat_a.dot(&mat_b), new_shape)
}

/// Sum over the diagonal of axes `ax1` and `ax2`, removing both.
pub fn trace_axes<A>(t: &nd::ArrayD<A>, ax1: usize, ax2: usize)
    -> TensorResult<nd::ArrayD<A>>
where A: Entry
{
    let (lo, hi) = if ax1 < ax2 { (ax1, ax2) } else { (ax2, ax1) };
    if lo == hi || hi >= t.ndim() || t.shape()[lo] != t.shape()[hi] {
        return Err(IncompatibleAxes);
    }
    let mut shape = t.shape().to_vec();
    shape.remove(hi);
    shape.remove(lo);
    let mut acc: nd::ArrayD<A> = nd::ArrayD::zeros(shape);
    for k in 0..t.shape()[lo] {
        let diag
            = t.view()
            .index_axis_move(nd::Axis(hi), k)
            .index_axis_move(nd::Axis(lo), k);
        acc += &diag;
    }
    Ok(acc)
}

/// Group every axis but the last into the rows of a matrix.
pub fn left_matrix<A>(t: &nd::ArrayD<A>) -> TensorResult<nd::Array2<A>>
where A: Clone
{
    let cols = t.shape()[t.ndim() - 1];
    reshape(t, (t.len() / cols.max(1), cols))
}

/// Group every axis but the first into the columns of a matrix.
pub fn right_matrix<A>(t: &nd::ArrayD<A>) -> TensorResult<nd::Array2<A>>
where A: Clone
{
    let rows = t.shape()[0];
    reshape(t, (rows, t.len() / rows.max(1)))
}

/// Copy `block` into `t` with its first and last axes offset by `left` and
/// `right`; all other axes must match exactly.
pub fn place_block<A>(
    t: &mut nd::ArrayD<A>,
    left: usize,
    right: usize,
    block: &nd::ArrayD<A>,
)
where A: Clone
{
    let last = t.ndim() - 1;
    let mut view = t.view_mut();
    view.slice_axis_inplace(
        nd::Axis(0), nd::Slice::from(left..left + block.shape()[0]));
    view.slice_axis_inplace(
        nd::Axis(last), nd::Slice::from(right..right + block.shape()[last]));
    view.assign(block);
}

/// Arrange `a` and `b` block-diagonally with respect to their first and last
/// axes.
pub fn block_diag<A>(a: &nd::ArrayD<A>, b: &nd::ArrayD<A>) -> nd::ArrayD<A>
where A: Entry
{
    let last = a.ndim() - 1;
    let mut shape = a.shape().to_vec();
    shape[0] += b.shape()[0];
    shape[last] += b.shape()[last];
    let mut res: nd::ArrayD<A> = nd::ArrayD::zeros(shape);
    place_block(&mut res, 0, 0, a);
    place_block(&mut res, a.shape()[0], a.shape()[last], b);
    res
}

/// Thin QR decomposition: for an `m × n` input, `q` is `m × k` with
/// orthonormal columns and `r` is `k × n`, where `k = min(m, n)`.
pub fn qr<A>(m: nd::Array2<A>) -> TensorResult<(nd::Array2<A>, nd::Array2<A>)>
where A: Entry
{
    let m = m.as_standard_layout().into_owned();
    let (q, r) = m.qr_into()?;
    Ok((q, r))
}

/// Thin LQ decomposition: for an `m × n` input, `l` is `m × k` and `q` is
/// `k × n` with orthonormal rows, where `k = min(m, n)`.
pub fn lq<A>(m: nd::Array2<A>) -> TensorResult<(nd::Array2<A>, nd::Array2<A>)>
where A: Entry
{
    let mt = m.t().as_standard_layout().into_owned();
    let (q, r) = mt.qr_into()?;
    let l = r.t().as_standard_layout().into_owned();
    let q = q.t().as_standard_layout().into_owned();
    Ok((l, q))
}

/// Data struct holding a truncated singular value decomposition
/// `m ≈ u · diag(s) · v`.
#[derive(Clone, Debug, PartialEq)]
pub struct Schmidt<A> {
    /// Matrix whose columns are the kept left singular vectors.
    pub u: nd::Array2<A>,
    /// Kept singular values, in descending order.
    pub s: Vec<f64>,
    /// Matrix whose rows are the kept right singular vectors.
    pub v: nd::Array2<A>,
    /// Number of kept singular values.
    pub rank: usize,
    /// Sum of the squares of the discarded singular values.
    pub discarded: f64,
}

impl<A: Entry> Schmidt<A> {
    /// Return `diag(s) · v`.
    pub fn sv(&self) -> nd::Array2<A> {
        let mut sv = self.v.clone();
        sv.axis_iter_mut(nd::Axis(0))
            .zip(&self.s)
            .for_each(|(mut row, sk)| {
                row.map_inplace(|x| { *x *= A::from_real(*sk); });
            });
        sv
    }

    /// Return `u · diag(s)`.
    pub fn us(&self) -> nd::Array2<A> {
        let mut us = self.u.clone();
        us.axis_iter_mut(nd::Axis(1))
            .zip(&self.s)
            .for_each(|(mut col, sk)| {
                col.map_inplace(|x| { *x *= A::from_real(*sk); });
            });
        us
    }
}

/// Compute the singular value decomposition of `m`, keeping at most `bdim`
/// singular values.
///
/// If `relerr` is given, the rank is further reduced to the smallest `k` such
/// that the discarded singular values satisfy `Σ_{j ≥ k} s_j² ≤ relerr² Σ_j
/// s_j²`. At least one singular value is always kept.
pub fn truncated_svd<A>(m: nd::Array2<A>, bdim: usize, relerr: Option<f64>)
    -> TensorResult<Schmidt<A>>
where A: Entry
{
    let m = m.as_standard_layout().into_owned();
    let (Some(u), s, Some(vt)) = m.svd_into(true, true)?
        else { unreachable!() };
    let sq: Vec<f64> = s.iter().map(|sk| sk * sk).collect();
    let total: f64 = sq.iter().sum();

    let mut rank = sq.len().min(bdim);
    if let Some(eps) = relerr {
        let thresh = eps * eps * total;
        let mut tail = 0.0;
        let mut k = sq.len();
        while k > 0 && tail + sq[k - 1] <= thresh {
            tail += sq[k - 1];
            k -= 1;
        }
        rank = rank.min(k);
    }
    rank = rank.max(1).min(sq.len());
    let discarded: f64 = sq[rank..].iter().sum();

    let u = u.slice(nd::s![.., ..rank]).to_owned();
    let v = vt.slice(nd::s![..rank, ..]).to_owned();
    let s = s.iter().take(rank).copied().collect();
    Ok(Schmidt { u, s, v, rank, discarded })
}
