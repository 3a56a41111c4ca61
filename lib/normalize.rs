//! Canonicalization of matrix product arrays by QR sweeps.
//!
//! A site is *left-normalized* if its left matricization (all axes but the
//! right bond grouped into rows) has orthonormal columns, and
//! *right-normalized* if its right matricization has orthonormal rows. Moving
//! the boundary of either canonical region by one site costs one QR (or LQ)
//! decomposition of that site plus a contraction of the remaining factor into
//! its neighbor; the full array is unchanged.

use tracing::{ debug, trace };
use crate::{
    Entry,
    ltens::Normalization,
    mparray::{ MPAError, MPAResult, MPArray },
    tensor,
};

impl<A> MPArray<A>
where A: Entry
{
    /// Bring the array into a canonical form.
    ///
    /// - `left = Some(l)`: make sites `0..l` left-normalized (`0 <= l < L`).
    /// - `right = Some(r)`: make sites `r..L` right-normalized (`1 <= r <= L`).
    /// - Both: requires `l < r`; the left sweep runs first.
    /// - Neither: move to whichever fully canonical form, `(0, 1)` or
    ///   `(L - 1, L)`, is closer to the current one.
    ///
    /// Only sites outside of the currently known canonical regions are
    /// touched, so requesting a form that already holds is free. Bond
    /// dimensions can only shrink, down to the rank of each bond.
    pub fn normalize(&mut self, left: Option<usize>, right: Option<usize>)
        -> MPAResult<&mut Self>
    {
        let n = self.len();
        if let Some(l) = left {
            if l >= n {
                return Err(MPAError::InvalidNormalization(
                    format!("left target {l} out of range for {n} sites")));
            }
        }
        if let Some(r) = right {
            if r == 0 || r > n {
                return Err(MPAError::InvalidNormalization(
                    format!("right target {r} out of range for {n} sites")));
            }
        }
        if let (Some(l), Some(r)) = (left, right) {
            if l >= r {
                return Err(MPAError::InvalidNormalization(
                    format!("left target {l} must be less than right target {r}")));
            }
        }

        match (left, right) {
            (None, None) => {
                let (lnormal, rnormal) = self.normal_form();
                if lnormal < n - rnormal {
                    self.rnormalize(1)?;
                } else {
                    self.lnormalize(n - 1)?;
                }
            },
            _ => {
                if let Some(l) = left {
                    if l > self.normal_form().0 { self.lnormalize(l)?; }
                }
                if let Some(r) = right {
                    if r < self.normal_form().1 { self.rnormalize(r)?; }
                }
            },
        }
        Ok(self)
    }

    /// Left-normalize sites `lnormal..to_site`, pushing the triangular factors
    /// rightward into `to_site`.
    pub(crate) fn lnormalize(&mut self, to_site: usize) -> MPAResult<()> {
        let (lnormal, _) = self.normal_form();
        debug!(from = lnormal, to = to_site, "left-normalize");
        for site in lnormal..to_site {
            let t = &self.lt[site];
            let mut shape = t.shape().to_vec();
            let (q, r) = tensor::qr(tensor::left_matrix(t)?)?;
            trace!(site, bond = q.ncols());
            let last = shape.len() - 1;
            shape[last] = q.ncols();
            let q = tensor::reshape(&q, shape)?;
            let next
                = tensor::tensordot(&r.into_dyn(), &self.lt[site + 1], &[1], &[0])?;
            self.lt.update(site, q, Some(Normalization::Left));
            self.lt.update(site + 1, next, None);
        }
        Ok(())
    }

    /// Right-normalize sites `to_site..rnormal`, pushing the triangular
    /// factors leftward into `to_site - 1`.
    pub(crate) fn rnormalize(&mut self, to_site: usize) -> MPAResult<()> {
        let (_, rnormal) = self.normal_form();
        debug!(from = rnormal, to = to_site, "right-normalize");
        for site in (to_site..rnormal).rev() {
            let t = &self.lt[site];
            let mut shape = t.shape().to_vec();
            let (l, q) = tensor::lq(tensor::right_matrix(t)?)?;
            trace!(site, bond = q.nrows());
            shape[0] = q.nrows();
            let q = tensor::reshape(&q, shape)?;
            let prev = &self.lt[site - 1];
            let last = prev.ndim() - 1;
            let prev = tensor::tensordot(prev, &l.into_dyn(), &[last], &[0])?;
            self.lt.update(site, q, Some(Normalization::Right));
            self.lt.update(site - 1, prev, None);
        }
        Ok(())
    }
}
