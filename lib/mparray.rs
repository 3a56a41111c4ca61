//! Matrix product arrays and the operations acting on them without
//! reconstructing the full array.
//!
//! An [`MPArray`] with *L* sites and *p* legs per site stores local tensors of
//! shape `[left bond, leg 0, ..., leg p-1, right bond]`. The full array it
//! represents has `L × p` axes, ordered site by site:
//!
//! ```text
//! full[i(0,0), ..., i(0,p-1), i(1,0), ..., i(L-1,p-1)]
//!     = T[0][:, i(0,0), ..., i(0,p-1), :] · ... · T[L-1][:, i(L-1,0), ..., :]
//! ```
//!
//! Arithmetic, contraction, and trace operations here act directly on the
//! local tensors. Results of operations that grow bond dimensions ([`dot`],
//! `+`, [`local_sum`], ...) are generally not compact; see
//! [`MPArray::compress_svd`] and [`MPArray::compress_var`] for recovering small
//! bonds.
//!
//! # Example
//!
//! ```
//! use ndarray as nd;
//! use mparray::{ MPArray, inner, norm };
//!
//! let psi = nd::ArrayD::from_shape_fn(vec![2, 2, 2], |ix| {
//!     (ix[0] + 2 * ix[1] + 4 * ix[2]) as f64
//! });
//! let mpa = MPArray::from_array(&psi, 1).unwrap();
//! assert_eq!(mpa.len(), 3);
//! assert_eq!(mpa.plegs(), 1);
//!
//! // 0² + 1² + ... + 7² = 140
//! let nsq = inner(&mpa, &mpa).unwrap();
//! assert!((nsq - 140.0).abs() < 1e-10);
//! assert!((norm(&mpa).unwrap() - 140.0_f64.sqrt()).abs() < 1e-10);
//! ```

use std::ops::{
    Add,
    AddAssign,
    Div,
    DivAssign,
    Index,
    Mul,
    MulAssign,
    Neg,
    Sub,
    SubAssign,
};
use itertools::Itertools;
use ndarray as nd;
use ndarray_linalg::error::LinalgError;
use num_complex::Complex64 as C64;
use thiserror::Error;
use crate::{
    DType,
    Entry,
    ltens::LocalTensors,
    tensor::{ self, TensorError },
};

#[derive(Debug, Error)]
pub enum MPAError {
    /// Returned when attempting to create an array with no sites.
    #[error("error in MPA creation: cannot create for an empty system")]
    EmptySystem,

    /// Returned when attempting to split an array into sites with zero legs
    /// each.
    #[error("error in MPA creation: number of legs per site must be positive")]
    ZeroLegs,

    /// Returned when a dense array's shape cannot be spread evenly over sites.
    #[error("error in MPA creation: array shape doesn't match legs per site")]
    IncompatibleShape,

    /// Returned when a local tensor has fewer than two axes.
    #[error("error in MPA creation: local tensor at site {site} is missing bond axes")]
    MissingBonds { site: usize },

    /// Returned when an outermost bond has dimension other than 1.
    #[error("error in MPA creation: outermost bonds must have dimension 1")]
    BoundaryBond,

    /// Returned when local tensors have different numbers of legs.
    #[error("error in MPA creation: all sites must carry the same number of legs")]
    NonUniformLegs,

    /// Returned when neighboring local tensors disagree on a shared bond.
    #[error("error in MPA creation: bond dimension mismatch between sites {site} and {}", .site + 1)]
    BondMismatch { site: usize },

    /// Returned when two arrays that must have equal lengths do not.
    #[error("error in MPA operation: site counts {0} and {1} don't match")]
    LengthMismatch(usize, usize),

    /// Returned when two arrays disagree on the leg dimensions of a site.
    #[error("error in MPA operation: leg dimension mismatch at site {site}")]
    LegMismatch { site: usize },

    /// Returned when a leg axis is out of range for the number of legs.
    #[error("error in MPA operation: invalid leg axis {0}")]
    InvalidAxis(isize),

    /// Returned when a site's trace axes are out of range, equal, or of
    /// unequal dimension.
    #[error("error in partial trace: invalid axes at site {site}")]
    InvalidTraceAxes { site: usize },

    /// Returned when a site index lies outside of an array.
    #[error("error in MPA operation: position {pos} out of bounds for {len} sites")]
    InvalidPosition { pos: usize, len: usize },

    /// Returned when the number of sites is not a multiple of the group size.
    #[error("error in site grouping: {len} sites cannot be grouped by {k}")]
    IndivisibleSites { len: usize, k: usize },

    /// Returned when the number of legs is not a multiple of the split size.
    #[error("error in site splitting: {plegs} legs cannot be split over {k} sites")]
    IndivisibleLegs { plegs: usize, k: usize },

    /// Returned when an operator-only operation is applied to an array that
    /// doesn't have exactly two legs per site.
    #[error("error in MPA operation: expected two legs per site, got {0}")]
    NotOperator(usize),

    /// Returned when implicit identity padding is needed for an array that
    /// doesn't have exactly two legs per site.
    #[error("error in MPA operation: identity padding requires two legs per site")]
    IdentityNeedsTwoLegs,

    /// Returned when normalization targets are out of range or inconsistent.
    #[error("error in normalization: {0}")]
    InvalidNormalization(String),

    /// Returned when compression parameters are missing or invalid.
    #[error("error in compression: {0}")]
    InvalidCompression(String),

    /// Returned when parsing an unknown sweep direction.
    #[error("error in compression: invalid direction '{0}'")]
    InvalidDirection(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error(transparent)]
    Shape(#[from] nd::ShapeError),

    #[error(transparent)]
    Linalg(#[from] LinalgError),
}
use MPAError::*;
pub type MPAResult<T> = Result<T, MPAError>;

/// A matrix product array.
///
/// Constructed from a dense array with [`from_array`][Self::from_array], from
/// explicit local tensors with [`new`][Self::new], or through the builders in
/// [`factory`][crate::factory]. Binary arithmetic operators panic on shape
/// mismatches; use [`add_checked`][Self::add_checked] and
/// [`sub_checked`][Self::sub_checked] for fallible versions.
#[derive(Clone, Debug, PartialEq)]
pub struct MPArray<A> {
    pub(crate) lt: LocalTensors<A>,
}

impl<A> MPArray<A>
where A: Entry
{
    /// Create a new array from a list of local tensors.
    ///
    /// Each tensor must have shape `[left bond, legs..., right bond]`, with all
    /// tensors carrying the same number of legs, trivial outermost bonds, and
    /// matching inner bonds. No site is assumed canonical.
    pub fn new(ltens: Vec<nd::ArrayD<A>>) -> MPAResult<Self> {
        if ltens.is_empty() { return Err(EmptySystem); }
        let ndim = ltens[0].ndim();
        for (site, t) in ltens.iter().enumerate() {
            if t.ndim() < 2 { return Err(MissingBonds { site }); }
            if t.ndim() != ndim { return Err(NonUniformLegs); }
        }
        let last = &ltens[ltens.len() - 1];
        if ltens[0].shape()[0] != 1 || last.shape()[ndim - 1] != 1 {
            return Err(BoundaryBond);
        }
        let bad_bond
            = ltens.iter().tuple_windows()
            .position(|(l, r)| l.shape()[ndim - 1] != r.shape()[0]);
        if let Some(site) = bad_bond { return Err(BondMismatch { site }); }
        Ok(Self { lt: LocalTensors::new_unchecked(ltens) })
    }

    /// Split a dense array into an MPA by successive QR decompositions.
    ///
    /// The axes of `array` are divided into consecutive groups of `plegs`,
    /// one group per site. The result is exact (up to floating-point error),
    /// with every site but the last left-normalized.
    pub fn from_array<S, D>(array: &nd::ArrayBase<S, D>, plegs: usize)
        -> MPAResult<Self>
    where
        S: nd::Data<Elem = A>,
        D: nd::Dimension,
    {
        if plegs == 0 { return Err(ZeroLegs); }
        if array.ndim() == 0 { return Err(EmptySystem); }
        if array.ndim() % plegs != 0 || array.shape().contains(&0) {
            return Err(IncompatibleShape);
        }
        let nsites = array.ndim() / plegs;
        let full_shape: Vec<usize>
            = [1].into_iter()
            .chain(array.shape().iter().copied())
            .chain([1])
            .collect();
        let full = tensor::reshape(array, full_shape)?;
        let ltens = split_local(full, plegs, nsites)?;
        Ok(Self { lt: LocalTensors::with_normal_form(ltens, (nsites - 1, nsites)) })
    }

    /// Create a product (bond dimension 1) array from a list of local factors,
    /// each of which supplies the legs of one site.
    pub fn from_kron<I>(factors: I) -> MPAResult<Self>
    where I: IntoIterator<Item = nd::ArrayD<A>>
    {
        let ltens: Vec<nd::ArrayD<A>>
            = factors.into_iter()
            .map(|f| {
                let f = f.insert_axis(nd::Axis(0));
                let n = f.ndim();
                f.insert_axis(nd::Axis(n))
            })
            .collect();
        Self::new(ltens)
    }

    /// Contract all bonds, returning the full array with `len() × plegs()`
    /// axes.
    pub fn to_array(&self) -> MPAResult<nd::ArrayD<A>> {
        let mut acc = self.lt[0].clone();
        for t in self.lt.iter().skip(1) {
            let last = acc.ndim() - 1;
            acc = tensor::tensordot(&acc, t, &[last], &[0])?;
        }
        let shape: Vec<usize> = acc.shape()[1..acc.ndim() - 1].to_vec();
        Ok(tensor::reshape(&acc, shape)?)
    }

    /// Return the number of sites.
    pub fn len(&self) -> usize { self.lt.len() }

    /// Always `false`; arrays have at least one site.
    pub fn is_empty(&self) -> bool { self.lt.is_empty() }

    /// Return the number of legs per site.
    pub fn plegs(&self) -> usize { self.lt[0].ndim() - 2 }

    /// Return the dimensions of the `len() - 1` inner bonds.
    pub fn bdims(&self) -> Vec<usize> {
        self.lt.iter()
            .take(self.len() - 1)
            .map(|t| t.shape()[t.ndim() - 1])
            .collect()
    }

    /// Return the largest inner bond dimension, or 1 for a single site.
    pub fn bdim(&self) -> usize {
        self.bdims().into_iter().max().unwrap_or(1)
    }

    /// Return the leg dimensions of each site.
    pub fn pdims(&self) -> Vec<Vec<usize>> {
        self.lt.iter()
            .map(|t| t.shape()[1..t.ndim() - 1].to_vec())
            .collect()
    }

    /// Return the `(lnormal, rnormal)` pair: sites `k < lnormal` are
    /// left-normalized and sites `k >= rnormal` are right-normalized.
    pub fn normal_form(&self) -> (usize, usize) { self.lt.normal_form() }

    /// Return a reference to the local tensors.
    pub fn lt(&self) -> &LocalTensors<A> { &self.lt }

    /// Unwrap into the list of local tensors.
    pub fn into_ltens(self) -> Vec<nd::ArrayD<A>> { self.lt.into_vec() }

    /// Return the element type tag.
    pub fn dtype(&self) -> DType { A::DTYPE }

    /// Reverse the order of the legs at every site.
    ///
    /// For operators (two legs per site) this is the usual transpose.
    /// Canonical forms are preserved.
    pub fn transpose(&self) -> Self {
        let ltens: Vec<nd::ArrayD<A>>
            = self.lt.iter()
            .map(|t| {
                let n = t.ndim();
                let perm: Vec<usize>
                    = [0].into_iter()
                    .chain((1..n - 1).rev())
                    .chain([n - 1])
                    .collect();
                t.view().permuted_axes(perm).as_standard_layout().into_owned()
            })
            .collect();
        Self {
            lt: LocalTensors::with_normal_form(ltens, self.normal_form()),
        }
    }

    /// Alias for [`transpose`][Self::transpose].
    #[allow(non_snake_case)]
    pub fn T(&self) -> Self { self.transpose() }

    /// Complex-conjugate every entry. Canonical forms are preserved.
    pub fn conj(&self) -> Self {
        let ltens: Vec<nd::ArrayD<A>>
            = self.lt.iter().map(|t| t.mapv(|x| x.conj())).collect();
        Self {
            lt: LocalTensors::with_normal_form(ltens, self.normal_form()),
        }
    }

    /// Return the conjugate transpose.
    pub fn adjoint(&self) -> Self { self.transpose().conj() }

    pub(crate) fn check_same_shape(&self, other: &Self) -> MPAResult<()> {
        if self.len() != other.len() {
            return Err(LengthMismatch(self.len(), other.len()));
        }
        let mismatch
            = self.lt.iter().zip(other.lt.iter())
            .position(|(a, b)| {
                a.ndim() != b.ndim()
                    || a.shape()[1..a.ndim() - 1] != b.shape()[1..b.ndim() - 1]
            });
        match mismatch {
            Some(site) => Err(LegMismatch { site }),
            None => Ok(()),
        }
    }

    /// Sum two arrays of identical leg shapes.
    ///
    /// Bond dimensions of the result are the sums of those of the operands.
    /// No site of the result is canonical.
    pub fn add_checked(&self, other: &Self) -> MPAResult<Self> {
        self.check_same_shape(other)?;
        let n = self.len();
        if n == 1 {
            let sum = &self.lt[0] + &other.lt[0];
            return Ok(Self { lt: LocalTensors::new_unchecked(vec![sum]) });
        }
        let ltens: Vec<nd::ArrayD<A>>
            = self.lt.iter().zip(other.lt.iter()).enumerate()
            .map(|(site, (a, b))| {
                let last = a.ndim() - 1;
                if site == 0 {
                    nd::concatenate(nd::Axis(last), &[a.view(), b.view()])
                        .map_err(MPAError::from)
                } else if site == n - 1 {
                    nd::concatenate(nd::Axis(0), &[a.view(), b.view()])
                        .map_err(MPAError::from)
                } else {
                    Ok(tensor::block_diag(a, b))
                }
            })
            .collect::<MPAResult<Vec<_>>>()?;
        Ok(Self { lt: LocalTensors::new_unchecked(ltens) })
    }

    /// Subtract `other` from `self`; see [`add_checked`][Self::add_checked].
    pub fn sub_checked(&self, other: &Self) -> MPAResult<Self> {
        self.add_checked(&(-other))
    }

    /// Multiply by a scalar in place.
    ///
    /// Only the leftmost non-left-normalized site is modified, so the normal
    /// form of every other site is kept.
    pub fn scale(&mut self, x: A) -> &mut Self {
        let (lnormal, _) = self.normal_form();
        let site = lnormal.min(self.len() - 1);
        let scaled = self.lt[site].mapv(|v| v * x);
        self.lt.update(site, scaled, None);
        self
    }

    /// Contract each consecutive group of `sites_per_group` sites into a
    /// single site carrying all of their legs.
    pub fn group_sites(&self, sites_per_group: usize) -> MPAResult<Self> {
        let k = sites_per_group;
        if k == 0 || self.len() % k != 0 {
            return Err(IndivisibleSites { len: self.len(), k });
        }
        let ltens: Vec<nd::ArrayD<A>>
            = self.lt.as_slice().chunks(k)
            .map(|group| {
                let mut acc = group[0].clone();
                for t in group.iter().skip(1) {
                    let last = acc.ndim() - 1;
                    acc = tensor::tensordot(&acc, t, &[last], &[0])?;
                }
                Ok(acc)
            })
            .collect::<MPAResult<Vec<_>>>()?;
        Self::new(ltens)
    }

    /// Split every site into `sites_per_site` sites, dividing its legs evenly;
    /// the inverse of [`group_sites`][Self::group_sites].
    pub fn split_sites(&self, sites_per_site: usize) -> MPAResult<Self> {
        let k = sites_per_site;
        let plegs = self.plegs();
        if k == 0 || plegs == 0 || plegs % k != 0 {
            return Err(IndivisibleLegs { plegs, k });
        }
        let mut ltens: Vec<nd::ArrayD<A>> = Vec::with_capacity(self.len() * k);
        for t in self.lt.iter() {
            ltens.append(&mut split_local(t.clone(), plegs / k, k)?);
        }
        Self::new(ltens)
    }

    /// Return a copy where every site's tensors are reshaped to a single leg
    /// of dimension equal to the product of its leg dimensions.
    pub fn ravel(&self) -> MPAResult<Self> {
        let ltens: Vec<nd::ArrayD<A>>
            = self.lt.iter()
            .map(|t| {
                let n = t.ndim();
                let (bl, br) = (t.shape()[0], t.shape()[n - 1]);
                tensor::reshape(t, vec![bl, t.len() / (bl * br), br])
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            lt: LocalTensors::with_normal_form(ltens, self.normal_form()),
        })
    }
}

// Split a tensor of shape `[bl, legs..., br]` into `nsites` left-normalized
// sites (except the last) with `plegs` legs each.
pub(crate) fn split_local<A>(t: nd::ArrayD<A>, plegs: usize, nsites: usize)
    -> MPAResult<Vec<nd::ArrayD<A>>>
where A: Entry
{
    let shape = t.shape().to_vec();
    let br = shape[shape.len() - 1];
    let legs = &shape[1..shape.len() - 1];
    let mut ltens: Vec<nd::ArrayD<A>> = Vec::with_capacity(nsites);
    let mut rest = t;
    for k in 0..nsites - 1 {
        let bl = rest.shape()[0];
        let site_legs = &legs[k * plegs..(k + 1) * plegs];
        let rows: usize = bl * site_legs.iter().product::<usize>();
        let cols: usize = rest.len() / rows;
        let (q, r) = tensor::qr(tensor::reshape(&rest, (rows, cols))?)?;
        let rank = q.ncols();
        let site_shape: Vec<usize>
            = [bl].into_iter()
            .chain(site_legs.iter().copied())
            .chain([rank])
            .collect();
        ltens.push(tensor::reshape(&q, site_shape)?);
        let rest_shape: Vec<usize>
            = [rank].into_iter()
            .chain(legs[(k + 1) * plegs..].iter().copied())
            .chain([br])
            .collect();
        rest = tensor::reshape(&r, rest_shape)?;
    }
    ltens.push(rest);
    Ok(ltens)
}

impl<A> Index<usize> for MPArray<A> {
    type Output = nd::ArrayD<A>;

    fn index(&self, k: usize) -> &Self::Output { &self.lt[k] }
}

impl<A> Neg for &MPArray<A>
where A: Entry
{
    type Output = MPArray<A>;

    fn neg(self) -> Self::Output {
        let mut res = self.clone();
        res.scale(-A::one());
        res
    }
}

impl<A> Neg for MPArray<A>
where A: Entry
{
    type Output = MPArray<A>;

    fn neg(mut self) -> Self::Output {
        self.scale(-A::one());
        self
    }
}

impl<A> Add<&MPArray<A>> for &MPArray<A>
where A: Entry
{
    type Output = MPArray<A>;

    fn add(self, rhs: &MPArray<A>) -> Self::Output {
        match self.add_checked(rhs) {
            Ok(res) => res,
            Err(err) => panic!("{}", err),
        }
    }
}

impl<A> Add<MPArray<A>> for MPArray<A>
where A: Entry
{
    type Output = MPArray<A>;

    fn add(self, rhs: MPArray<A>) -> Self::Output { &self + &rhs }
}

impl<A> AddAssign<&MPArray<A>> for MPArray<A>
where A: Entry
{
    fn add_assign(&mut self, rhs: &MPArray<A>) { *self = &*self + rhs; }
}

impl<A> AddAssign<MPArray<A>> for MPArray<A>
where A: Entry
{
    fn add_assign(&mut self, rhs: MPArray<A>) { *self = &*self + &rhs; }
}

impl<A> Sub<&MPArray<A>> for &MPArray<A>
where A: Entry
{
    type Output = MPArray<A>;

    fn sub(self, rhs: &MPArray<A>) -> Self::Output {
        match self.sub_checked(rhs) {
            Ok(res) => res,
            Err(err) => panic!("{}", err),
        }
    }
}

impl<A> Sub<MPArray<A>> for MPArray<A>
where A: Entry
{
    type Output = MPArray<A>;

    fn sub(self, rhs: MPArray<A>) -> Self::Output { &self - &rhs }
}

impl<A> SubAssign<&MPArray<A>> for MPArray<A>
where A: Entry
{
    fn sub_assign(&mut self, rhs: &MPArray<A>) { *self = &*self - rhs; }
}

impl<A> SubAssign<MPArray<A>> for MPArray<A>
where A: Entry
{
    fn sub_assign(&mut self, rhs: MPArray<A>) { *self = &*self - &rhs; }
}

impl<A> MulAssign<A> for MPArray<A>
where A: Entry
{
    fn mul_assign(&mut self, x: A) { self.scale(x); }
}

impl<A> Mul<A> for MPArray<A>
where A: Entry
{
    type Output = MPArray<A>;

    fn mul(mut self, x: A) -> Self::Output {
        self.scale(x);
        self
    }
}

impl<A> Mul<A> for &MPArray<A>
where A: Entry
{
    type Output = MPArray<A>;

    fn mul(self, x: A) -> Self::Output { self.clone() * x }
}

impl<A> DivAssign<A> for MPArray<A>
where A: Entry
{
    fn div_assign(&mut self, x: A) { self.scale(A::one() / x); }
}

impl<A> Div<A> for MPArray<A>
where A: Entry
{
    type Output = MPArray<A>;

    fn div(mut self, x: A) -> Self::Output {
        self /= x;
        self
    }
}

impl<A> Div<A> for &MPArray<A>
where A: Entry
{
    type Output = MPArray<A>;

    fn div(self, x: A) -> Self::Output { self.clone() / x }
}

macro_rules! impl_scalar_lmul {
    ( $t:ty ) => {
        impl Mul<MPArray<$t>> for $t {
            type Output = MPArray<$t>;

            fn mul(self, rhs: MPArray<$t>) -> Self::Output { rhs * self }
        }

        impl Mul<&MPArray<$t>> for $t {
            type Output = MPArray<$t>;

            fn mul(self, rhs: &MPArray<$t>) -> Self::Output { rhs * self }
        }
    }
}
impl_scalar_lmul!(f64);
impl_scalar_lmul!(C64);

// Resolve a possibly negative leg axis against `plegs`.
fn leg_axis(axis: isize, plegs: usize) -> MPAResult<usize> {
    let resolved = if axis < 0 { axis + plegs as isize } else { axis };
    if resolved < 0 || resolved >= plegs as isize {
        Err(InvalidAxis(axis))
    } else {
        Ok(resolved as usize)
    }
}

// Contract one leg of `ta` with one leg of `tb`, merging the bonds pairwise.
// Result axes: [al·bl, remaining legs of ta..., remaining legs of tb..., ar·br]
fn local_dot<A>(ta: &nd::ArrayD<A>, tb: &nd::ArrayD<A>, ax_a: usize, ax_b: usize)
    -> MPAResult<nd::ArrayD<A>>
where A: Entry
{
    let c = tensor::tensordot(ta, tb, &[ax_a], &[ax_b])?;
    let na = ta.ndim() - 1;
    let nc = c.ndim();
    let perm: Vec<usize>
        = [0, na].into_iter()
        .chain(1..na - 1)
        .chain(na + 1..nc - 1)
        .chain([na - 1, nc - 1])
        .collect();
    let c = c.permuted_axes(perm);
    let sh = c.shape();
    let new_shape: Vec<usize>
        = [sh[0] * sh[1]].into_iter()
        .chain(sh[2..nc - 2].iter().copied())
        .chain([sh[nc - 2] * sh[nc - 1]])
        .collect();
    Ok(tensor::reshape(&c, new_shape)?)
}

/// Contract leg `axes.0` of every site of `a` with leg `axes.1` of the same
/// site of `b` (default: `(-1, 0)`, the last leg of `a` with the first leg of
/// `b`).
///
/// Negative axes count from the last leg. The remaining legs of `a` come
/// before those of `b` at each site, and bond dimensions multiply.
pub fn dot<A>(a: &MPArray<A>, b: &MPArray<A>, axes: Option<(isize, isize)>)
    -> MPAResult<MPArray<A>>
where A: Entry
{
    let (ax_a, ax_b) = axes.unwrap_or((-1, 0));
    if a.len() != b.len() { return Err(LengthMismatch(a.len(), b.len())); }
    let ax_a = leg_axis(ax_a, a.plegs())? + 1;
    let ax_b = leg_axis(ax_b, b.plegs())? + 1;
    let ltens: Vec<nd::ArrayD<A>>
        = a.lt.iter().zip(b.lt.iter()).enumerate()
        .map(|(site, (ta, tb))| {
            if ta.shape()[ax_a] != tb.shape()[ax_b] {
                return Err(LegMismatch { site });
            }
            local_dot(ta, tb, ax_a, ax_b)
        })
        .collect::<MPAResult<Vec<_>>>()?;
    Ok(MPArray { lt: LocalTensors::new_unchecked(ltens) })
}

// Embed `short` into an array as long as `long`, starting at site `start`,
// filling the other sites with identities whose dimension matches leg `axis`
// of `long`.
fn pad_identity<A>(short: &MPArray<A>, start: usize, long: &MPArray<A>, axis: usize)
    -> MPAResult<MPArray<A>>
where A: Entry
{
    if short.plegs() != 2 { return Err(IdentityNeedsTwoLegs); }
    let ltens: Vec<nd::ArrayD<A>>
        = (0..long.len())
        .map(|site| {
            if (start..start + short.len()).contains(&site) {
                Ok(short.lt[site - start].clone())
            } else {
                let d = long.lt[site].shape()[axis + 1];
                tensor::reshape(&nd::Array2::<A>::eye(d), vec![1, d, d, 1])
                    .map_err(MPAError::from)
            }
        })
        .collect::<MPAResult<Vec<_>>>()?;
    MPArray::new(ltens)
}

/// Like [`dot`], but for arrays of different lengths: the shorter array is
/// contracted against sites `start_at..start_at + shorter.len()` of the longer
/// one, which keeps its legs unchanged on all other sites.
///
/// The shorter array must have two legs per site.
pub fn partialdot<A>(
    a: &MPArray<A>,
    b: &MPArray<A>,
    start_at: usize,
    axes: Option<(isize, isize)>,
) -> MPAResult<MPArray<A>>
where A: Entry
{
    let (ax_a, ax_b) = axes.unwrap_or((-1, 0));
    let a_is_long = a.len() >= b.len();
    let (long, short, ax_long)
        = if a_is_long { (a, b, ax_a) } else { (b, a, ax_b) };
    if start_at + short.len() > long.len() {
        return Err(InvalidPosition { pos: start_at, len: long.len() });
    }
    if short.len() == long.len() { return dot(a, b, Some((ax_a, ax_b))); }
    let ax_long = leg_axis(ax_long, long.plegs())?;
    let padded = pad_identity(short, start_at, long, ax_long)?;
    if a_is_long {
        dot(a, &padded, Some((ax_a, ax_b)))
    } else {
        dot(&padded, b, Some((ax_a, ax_b)))
    }
}

/// Compute the inner product `⟨a|b⟩ = Σ conj(a) · b` over all entries.
///
/// Runs in time linear in the number of sites.
pub fn inner<A>(a: &MPArray<A>, b: &MPArray<A>) -> MPAResult<A>
where A: Entry
{
    a.check_same_shape(b)?;
    let mut env: nd::ArrayD<A> = nd::ArrayD::from_elem(vec![1, 1], A::one());
    for (ta, tb) in a.lt.iter().zip(b.lt.iter()) {
        let tmp = tensor::tensordot(&env, tb, &[1], &[0])?;
        let axes: Vec<usize> = (0..ta.ndim() - 1).collect();
        env = tensor::tensordot(&ta.mapv(|x| x.conj()), &tmp, &axes, &axes)?;
    }
    let env = env.into_dimensionality::<nd::Ix2>()?;
    Ok(env[[0, 0]])
}

/// Compute the Frobenius norm.
///
/// If exactly one site is not known to be canonical, only that site is read.
pub fn norm<A>(mpa: &MPArray<A>) -> MPAResult<f64>
where A: Entry
{
    let (lnormal, rnormal) = mpa.normal_form();
    if rnormal == lnormal + 1 {
        let nsq: f64 = mpa.lt[lnormal].iter().map(|x| x.square()).sum();
        Ok(nsq.sqrt())
    } else {
        Ok(inner(mpa, mpa)?.re().max(0.0).sqrt())
    }
}

/// Compute the Frobenius norm of `a - b`.
pub fn normdist<A>(a: &MPArray<A>, b: &MPArray<A>) -> MPAResult<f64>
where A: Entry
{
    norm(&a.sub_checked(b)?)
}

/// Trace out a pair of legs at each site, per `axes[site] == Some((i, j))`;
/// sites with `None` are kept unchanged.
///
/// Sites left without legs are absorbed into their right neighbor (or into
/// the rightmost remaining site), so the result can be shorter than `mpa`.
/// All remaining sites must end up with the same number of legs.
pub fn partialtrace<A>(mpa: &MPArray<A>, axes: &[Option<(usize, usize)>])
    -> MPAResult<MPArray<A>>
where A: Entry
{
    if axes.len() != mpa.len() {
        return Err(LengthMismatch(mpa.len(), axes.len()));
    }
    let plegs = mpa.plegs();
    let mut ltens: Vec<nd::ArrayD<A>> = Vec::with_capacity(mpa.len());
    let mut carry: Option<nd::ArrayD<A>> = None;
    for (site, (t, ax)) in mpa.lt.iter().zip(axes).enumerate() {
        let t = match *ax {
            None => t.clone(),
            Some((i, j)) => {
                if i >= plegs || j >= plegs || i == j
                    || t.shape()[i + 1] != t.shape()[j + 1]
                {
                    return Err(InvalidTraceAxes { site });
                }
                tensor::trace_axes(t, i + 1, j + 1)?
            },
        };
        let t = match carry.take() {
            Some(m) => tensor::tensordot(&m, &t, &[1], &[0])?,
            None => t,
        };
        if t.ndim() == 2 { carry = Some(t); } else { ltens.push(t); }
    }
    if let Some(m) = carry {
        match ltens.pop() {
            Some(t) => {
                let last = t.ndim() - 1;
                ltens.push(tensor::tensordot(&t, &m, &[last], &[0])?);
            },
            None => { ltens.push(m); },
        }
    }
    MPArray::new(ltens)
}

/// Compute the full trace of an operator (two legs per site).
pub fn trace<A>(mpa: &MPArray<A>) -> MPAResult<A>
where A: Entry
{
    if mpa.plegs() != 2 { return Err(NotOperator(mpa.plegs())); }
    let axes = vec![Some((0, 1)); mpa.len()];
    let reduced = partialtrace(mpa, &axes)?.to_array()?;
    Ok(reduced.into_dimensionality::<nd::Ix0>()?.into_scalar())
}

/// Concatenate arrays into a single longer array, representing their outer
/// (tensor) product. All arrays must have the same number of legs.
pub fn outer<'a, A, I>(mpas: I) -> MPAResult<MPArray<A>>
where
    A: Entry + 'a,
    I: IntoIterator<Item = &'a MPArray<A>>,
{
    let ltens: Vec<nd::ArrayD<A>>
        = mpas.into_iter()
        .flat_map(|mpa| mpa.lt.iter().cloned())
        .collect();
    MPArray::new(ltens)
}

/// Insert `num` uncorrelated sites before site `pos`.
///
/// Each inserted site carries `inject_ten` as its legs, multiplied by an
/// identity on the bond at `pos` so that the rest of the array is unchanged.
/// If `inject_ten` is `None`, `mpa` must
/// have two legs per site and an identity matching the dimension of the first
/// leg at `pos` (or the last site, if `pos == mpa.len()`) is used.
pub fn inject<A>(
    mpa: &MPArray<A>,
    pos: usize,
    num: usize,
    inject_ten: Option<&nd::ArrayD<A>>,
) -> MPAResult<MPArray<A>>
where A: Entry
{
    if pos > mpa.len() {
        return Err(InvalidPosition { pos, len: mpa.len() });
    }
    let ten = match inject_ten {
        Some(ten) => ten.clone(),
        None => {
            if mpa.plegs() != 2 { return Err(IdentityNeedsTwoLegs); }
            let d = mpa.lt[pos.min(mpa.len() - 1)].shape()[1];
            nd::Array2::<A>::eye(d).into_dyn()
        },
    };
    if ten.ndim() != mpa.plegs() { return Err(NonUniformLegs); }
    // the bond at `pos` passes through the new sites unchanged
    let bond = if pos == 0 || pos == mpa.len() { 1 } else { mpa.lt[pos].shape()[0] };
    let pass = nd::Array2::<A>::eye(bond).into_dyn();
    let nlegs = ten.ndim();
    let perm: Vec<usize>
        = [0].into_iter()
        .chain(2..nlegs + 2)
        .chain([1])
        .collect();
    let ten = tensor::tensordot(&pass, &ten, &[], &[])?
        .permuted_axes(perm)
        .as_standard_layout()
        .into_owned();
    let ltens: Vec<nd::ArrayD<A>>
        = mpa.lt.iter().take(pos).cloned()
        .chain(std::iter::repeat(ten).take(num))
        .chain(mpa.lt.iter().skip(pos).cloned())
        .collect();
    MPArray::new(ltens)
}

// Bond channels of a local sum at one cut between sites.
struct Channels {
    // all terms start at or after this cut
    pending: Option<usize>,
    // some term has ended at or before this cut
    done: Option<usize>,
    // (term, offset) for terms whose support straddles this cut
    active: Vec<(usize, usize)>,
    dim: usize,
}

impl Channels {
    fn at<A>(cut: usize, terms: &[MPArray<A>], width: usize) -> Self
    where A: Entry
    {
        let mut dim = 0;
        let pending = (cut < terms.len()).then(|| { dim += 1; dim - 1 });
        let done = (cut >= width).then(|| { dim += 1; dim - 1 });
        let mut active: Vec<(usize, usize)> = Vec::new();
        for (i, term) in terms.iter().enumerate() {
            if i < cut && cut < i + width {
                active.push((i, dim));
                dim += term.bdims()[cut - i - 1];
            }
        }
        Self { pending, done, active, dim }
    }

    fn offset(&self, term: usize) -> Option<usize> {
        self.active.iter().find(|(i, _)| *i == term).map(|(_, off)| *off)
    }
}

/// Compute `Σ_i (1 ⊗ ... ⊗ terms[i] ⊗ ... ⊗ 1)`, where the `i`-th term acts
/// on sites `i..i + width` of a chain with `terms.len() + width - 1` sites.
///
/// All terms must have the same number of sites and two legs per site, and
/// overlapping terms must agree on leg dimensions. The result's bond
/// dimensions are never larger than those of summing the embedded terms one by
/// one.
pub fn local_sum<A>(terms: &[MPArray<A>]) -> MPAResult<MPArray<A>>
where A: Entry
{
    let first = terms.first().ok_or(EmptySystem)?;
    let width = first.len();
    if let Some(bad) = terms.iter().find(|t| t.len() != width) {
        return Err(LengthMismatch(width, bad.len()));
    }
    if terms.iter().any(|t| t.plegs() != 2) { return Err(IdentityNeedsTwoLegs); }
    let nsites = terms.len() + width - 1;

    let mut pdims: Vec<Option<Vec<usize>>> = vec![None; nsites];
    for (i, term) in terms.iter().enumerate() {
        for (j, dims) in term.pdims().into_iter().enumerate() {
            match &pdims[i + j] {
                None => { pdims[i + j] = Some(dims); },
                Some(known) if *known != dims => {
                    return Err(LegMismatch { site: i + j });
                },
                Some(_) => { },
            }
        }
    }

    let channels: Vec<Channels>
        = (0..=nsites).map(|cut| Channels::at(cut, terms, width)).collect();
    let ltens: Vec<nd::ArrayD<A>>
        = (0..nsites)
        .map(|site| {
            let (left, right) = (&channels[site], &channels[site + 1]);
            let legs = pdims[site].clone().ok_or(LegMismatch { site })?;
            if legs[0] != legs[1] { return Err(LegMismatch { site }); }
            let shape: Vec<usize>
                = [left.dim].into_iter()
                .chain(legs.iter().copied())
                .chain([right.dim])
                .collect();
            let mut t: nd::ArrayD<A> = nd::ArrayD::zeros(shape);
            let eye = tensor::reshape(
                &nd::Array2::<A>::eye(legs[0]), vec![1, legs[0], legs[1], 1])?;
            if let (Some(l), Some(r)) = (left.pending, right.pending) {
                tensor::place_block(&mut t, l, r, &eye);
            }
            if let (Some(l), Some(r)) = (left.done, right.done) {
                tensor::place_block(&mut t, l, r, &eye);
            }
            for (i, term) in terms.iter().enumerate() {
                if site < i || site >= i + width { continue; }
                let j = site - i;
                let l = if j == 0 { left.pending } else { left.offset(i) };
                let r = if j == width - 1 { right.done } else { right.offset(i) };
                let (Some(l), Some(r)) = (l, r)
                    else { return Err(BondMismatch { site }); };
                tensor::place_block(&mut t, l, r, &term.lt[j]);
            }
            Ok(t)
        })
        .collect::<MPAResult<Vec<_>>>()?;
    MPArray::new(ltens)
}
