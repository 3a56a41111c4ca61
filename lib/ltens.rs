//! Storage for the chain of local tensors behind an [`MPArray`][crate::MPArray],
//! together with the bookkeeping of which sites are known to be canonical.
//!
//! A chain of length *L* tracks a pair `(lnormal, rnormal)` with
//! `0 <= lnormal <= rnormal <= L`: every site `k < lnormal` is
//! left-normalized and every site `k >= rnormal` is right-normalized. The pair
//! is conservative; a site may be canonical without being recorded as such,
//! but never the other way around.
//!
//! ```text
//!   left-normalized      unconstrained       right-normalized
//! |-----------------|----------------------|------------------|
//! 0              lnormal                rnormal               L
//! ```

use std::ops::Index;
use ndarray as nd;

/// Kind of canonical form assigned to a single local tensor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Normalization {
    /// The left matricization (all axes but the last grouped into rows) has
    /// orthonormal columns.
    Left,
    /// The right matricization (all axes but the first grouped into columns)
    /// has orthonormal rows.
    Right,
}

/// A non-empty chain of local tensors, each laid out as
/// `[left bond, legs..., right bond]`.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalTensors<A> {
    ltens: Vec<nd::ArrayD<A>>,
    lnormal: usize,
    rnormal: usize,
}

impl<A> LocalTensors<A> {
    /// Wrap a list of tensors without checking shapes, with no site marked as
    /// canonical.
    pub(crate) fn new_unchecked(ltens: Vec<nd::ArrayD<A>>) -> Self {
        let n = ltens.len();
        Self { ltens, lnormal: 0, rnormal: n }
    }

    /// Wrap a list of tensors without checking shapes, with a known normal
    /// form.
    pub(crate) fn with_normal_form(
        ltens: Vec<nd::ArrayD<A>>,
        nform: (usize, usize),
    ) -> Self
    {
        let n = ltens.len();
        let rnormal = nform.1.min(n);
        let lnormal = nform.0.min(rnormal);
        Self { ltens, lnormal, rnormal }
    }

    /// Return the number of sites.
    pub fn len(&self) -> usize { self.ltens.len() }

    /// Return `true` if there are no sites.
    pub fn is_empty(&self) -> bool { self.ltens.is_empty() }

    /// Return the current `(lnormal, rnormal)` pair.
    pub fn normal_form(&self) -> (usize, usize) { (self.lnormal, self.rnormal) }

    /// Return a reference to the tensor at site `k`, if it exists.
    pub fn get(&self, k: usize) -> Option<&nd::ArrayD<A>> { self.ltens.get(k) }

    /// Return an iterator over all local tensors, left to right.
    pub fn iter(&self) -> std::slice::Iter<'_, nd::ArrayD<A>> {
        self.ltens.iter()
    }

    /// Return all local tensors as a slice.
    pub fn as_slice(&self) -> &[nd::ArrayD<A>] { &self.ltens }

    /// Unwrap into the underlying list of tensors.
    pub fn into_vec(self) -> Vec<nd::ArrayD<A>> { self.ltens }

    /// Replace the tensor at site `index`, updating the normal form.
    ///
    /// With `normalization == None`, the site is assumed to have lost any
    /// canonical form, so both canonical regions shrink to exclude it. A site
    /// declared [`Left`][Normalization::Left] extends the left region if it is
    /// adjacent to it, and likewise for [`Right`][Normalization::Right]. A
    /// canonical site that is not adjacent to its region is treated as
    /// unconstrained.
    ///
    /// *Panics* if `index` is out of bounds.
    pub(crate) fn update(
        &mut self,
        index: usize,
        tensor: nd::ArrayD<A>,
        normalization: Option<Normalization>,
    ) {
        self.ltens[index] = tensor;
        match normalization {
            Some(Normalization::Left) if index <= self.lnormal => {
                self.lnormal = self.lnormal.max(index + 1);
                self.rnormal = self.rnormal.max(index + 1);
            },
            Some(Normalization::Right) if index + 1 >= self.rnormal => {
                self.rnormal = self.rnormal.min(index);
                self.lnormal = self.lnormal.min(index);
            },
            _ => {
                self.lnormal = self.lnormal.min(index);
                self.rnormal = self.rnormal.max(index + 1);
            },
        }
    }
}

impl<A> Index<usize> for LocalTensors<A> {
    type Output = nd::ArrayD<A>;

    fn index(&self, k: usize) -> &Self::Output { &self.ltens[k] }
}

impl<'a, A> IntoIterator for &'a LocalTensors<A> {
    type Item = &'a nd::ArrayD<A>;
    type IntoIter = std::slice::Iter<'a, nd::ArrayD<A>>;

    fn into_iter(self) -> Self::IntoIter { self.ltens.iter() }
}
