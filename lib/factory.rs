//! Builders for common arrays: random states and operators, zeros, and
//! identities, both dense and in MPA form.
//!
//! Random entries are drawn from the standard normal distribution (see
//! [`Entry::randn`]); all functions take the random number generator
//! explicitly so that results are reproducible from a seed.

use ndarray as nd;
use rand::Rng;
use crate::{
    Entry,
    ltens::LocalTensors,
    mparray::{ MPAError, MPAResult, MPArray, norm },
    tensor,
};

/// Return a dense array of the given shape with random entries.
pub fn random_array<A, R>(shape: &[usize], rng: &mut R) -> nd::ArrayD<A>
where
    A: Entry,
    R: Rng + ?Sized,
{
    nd::ArrayD::from_shape_simple_fn(shape.to_vec(), || A::randn(rng))
}

/// Return a random dense vector on `sites` sites with local dimension `ldim`,
/// normalized to unit Frobenius norm.
pub fn random_vec<A, R>(sites: usize, ldim: usize, rng: &mut R) -> nd::ArrayD<A>
where
    A: Entry,
    R: Rng + ?Sized,
{
    let mut psi: nd::ArrayD<A> = random_array(&vec![ldim; sites], rng);
    let n: f64 = psi.iter().map(|x| x.square()).sum::<f64>().sqrt();
    if n > 0.0 { psi.map_inplace(|x| { *x /= A::from_real(n); }); }
    psi
}

/// Return a random dense operator on `sites` sites with local dimension
/// `ldim`, with axes ordered as `[row 0, col 0, row 1, col 1, ...]`.
pub fn random_op<A, R>(sites: usize, ldim: usize, rng: &mut R) -> nd::ArrayD<A>
where
    A: Entry,
    R: Rng + ?Sized,
{
    random_array(&vec![ldim; 2 * sites], rng)
}

/// Return a random MPA where every site has legs of dimensions `ldims`, with
/// all inner bonds of dimension `bdim`.
pub fn random_mpa<A, R>(sites: usize, ldims: &[usize], bdim: usize, rng: &mut R)
    -> MPAResult<MPArray<A>>
where
    A: Entry,
    R: Rng + ?Sized,
{
    random_mpa_with(&vec![ldims.to_vec(); sites], bdim, rng)
}

/// Like [`random_mpa`], but with leg dimensions given per site.
pub fn random_mpa_with<A, R>(pdims: &[Vec<usize>], bdim: usize, rng: &mut R)
    -> MPAResult<MPArray<A>>
where
    A: Entry,
    R: Rng + ?Sized,
{
    let ltens = with_bonds(pdims, bdim, |shape| random_array(shape, rng))?;
    MPArray::new(ltens)
}

/// Return a random operator MPA (two legs per site of dimension `ldim`).
///
/// If `normalized`, the result is scaled to unit Frobenius norm.
pub fn random_mpo<A, R>(
    sites: usize,
    ldim: usize,
    bdim: usize,
    rng: &mut R,
    normalized: bool,
) -> MPAResult<MPArray<A>>
where
    A: Entry,
    R: Rng + ?Sized,
{
    let mut mpo = random_mpa(sites, &[ldim, ldim], bdim, rng)?;
    if normalized {
        let n = norm(&mpo)?;
        if n > 0.0 { mpo /= A::from_real(n); }
    }
    Ok(mpo)
}

/// Return an all-zero MPA with the given leg and bond dimensions.
pub fn zero<A>(sites: usize, ldims: &[usize], bdim: usize)
    -> MPAResult<MPArray<A>>
where A: Entry
{
    let pdims = vec![ldims.to_vec(); sites];
    let ltens = with_bonds(&pdims, bdim, |shape| nd::ArrayD::zeros(shape))?;
    MPArray::new(ltens)
}

/// Return the identity operator on `sites` sites with local dimension `ldim`,
/// as an MPA with bond dimension 1.
pub fn eye<A>(sites: usize, ldim: usize) -> MPAResult<MPArray<A>>
where A: Entry
{
    if sites == 0 { return Err(MPAError::EmptySystem); }
    let site = nd::Array2::<A>::eye(ldim).into_dyn();
    let ltens: Vec<nd::ArrayD<A>>
        = (0..sites)
        .map(|_| tensor::reshape(&site, vec![1, ldim, ldim, 1]))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MPArray { lt: LocalTensors::new_unchecked(ltens) })
}

// Build local tensors of shape [bl, pdims[k]..., br] with trivial outer bonds
// and inner bonds of dimension `bdim`.
fn with_bonds<A, F>(pdims: &[Vec<usize>], bdim: usize, mut make: F)
    -> MPAResult<Vec<nd::ArrayD<A>>>
where F: FnMut(&[usize]) -> nd::ArrayD<A>
{
    if pdims.is_empty() { return Err(MPAError::EmptySystem); }
    let n = pdims.len();
    let ltens = pdims.iter().enumerate()
        .map(|(k, legs)| {
            let bl = if k == 0 { 1 } else { bdim };
            let br = if k == n - 1 { 1 } else { bdim };
            let shape: Vec<usize>
                = [bl].into_iter()
                .chain(legs.iter().copied())
                .chain([br])
                .collect();
            make(&shape)
        })
        .collect();
    Ok(ltens)
}
