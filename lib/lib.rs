//! Matrix product arrays (MPAs): high-dimensional arrays stored as chains of
//! low-rank local tensors connected by bond indices.
//!
//! An array with *L* groups of physical indices is represented by *L* local
//! tensors `T[0], ..., T[L - 1]`, each carrying a left bond index, some number
//! of physical ("leg") indices, and a right bond index. Outermost bonds are
//! trivial (dimension 1), so the full array is recovered by contracting every
//! bond in sequence.
//!
//! ```text
//!         .-bond 0-.        .-bond 1-.          .-bond L-2-.
//!         V        V        V        V          V          V
//! 1 --- T[0] ------------ T[1] ------------ ... ---------- T[L-1] --- 1
//!        |                 |                                 |
//!        | <- legs of      | <- legs of                      | <- legs of
//!             site 0            site 1                            site L-1
//! ```
//!
//! Vector-like arrays carry one leg per site, operator-like arrays carry two;
//! the number of legs is the same at every site of a given array.
//!
//! Beyond arithmetic and contractions, the main tools here are
//! canonicalization (see [`MPArray::normalize`]) and the two compression
//! schemes [`MPArray::compress_svd`] and [`MPArray::compress_var`], which
//! reduce bond dimensions without ever forming the full array.
//!
//! # Example
//!
//! ```
//! use mparray::{ MPArray, SvdConfig, factory };
//! use rand::{ SeedableRng, rngs::StdRng };
//!
//! let mut rng = StdRng::seed_from_u64(10546);
//!
//! // random 6-site operator with local dimension 2 and bond dimension 4
//! let mpo: MPArray<f64> = factory::random_mpa(6, &[2, 2], 4, &mut rng).unwrap();
//!
//! // adding an all-zero array doubles the bond dimension without changing
//! // the content
//! let padded = &mpo + &factory::zero::<f64>(6, &[2, 2], 4).unwrap();
//! assert_eq!(padded.bdims(), vec![8; 5]);
//!
//! // SVD compression removes the redundant bond channels again
//! let mut compressed = padded.clone();
//! let config = SvdConfig { bdim: Some(4), ..SvdConfig::default() };
//! compressed.compress_svd(&config).unwrap();
//! assert_eq!(compressed.bdims(), vec![4; 5]);
//! ```

use ndarray_linalg::types::{ Lapack, Scalar };
use num_complex::Complex64 as C64;
use rand::Rng;
use rand_distr::{ Distribution, StandardNormal };

// Same expansion as `ndarray_linalg::assert_close_l2!`, whose `$crate::$close`
// form is rejected by current rustc.
#[cfg(test)]
macro_rules! assert_close_l2 {
    ($test: expr, $truth: expr, $tol: expr) => {
        ::ndarray_linalg::close_l2($test, $truth, $tol);
    };
    ($test: expr, $truth: expr, $tol: expr; $comment: expr) => {
        eprintln!($comment);
        ::ndarray_linalg::close_l2($test, $truth, $tol);
    };
}

pub mod tensor;
pub mod ltens;
pub mod mparray;
pub mod normalize;
pub mod compress;
pub mod promote;
pub mod factory;
pub mod tools;

pub use crate::{
    compress::{ Compression, Direction, SvdConfig, VarConfig },
    ltens::LocalTensors,
    mparray::{
        MPAError,
        MPAResult,
        MPArray,
        dot,
        inject,
        inner,
        local_sum,
        norm,
        normdist,
        outer,
        partialdot,
        partialtrace,
        trace,
    },
    promote::MPArrayDyn,
};

/// Tag for the element type of an array.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    /// Real, double-precision entries.
    Real,
    /// Complex, double-precision entries.
    Complex,
}

/// Convenience trait to identify the scalar types that can be stored in an
/// [`MPArray`] and fed through the QR and singular value decompositions used
/// for canonicalization and compression.
///
/// Associated real values are always `f64`.
pub trait Entry: Scalar<Real = f64> + Lapack {
    /// Run-time tag for the element type.
    const DTYPE: DType;

    /// Draw a sample from the standard normal distribution.
    ///
    /// For complex types, real and imaginary parts are drawn independently
    /// and scaled so that `E[|z|²] == 1`.
    fn randn<R>(rng: &mut R) -> Self
    where R: Rng + ?Sized;
}

impl Entry for f64 {
    const DTYPE: DType = DType::Real;

    fn randn<R>(rng: &mut R) -> Self
    where R: Rng + ?Sized
    {
        StandardNormal.sample(rng)
    }
}

impl Entry for C64 {
    const DTYPE: DType = DType::Complex;

    fn randn<R>(rng: &mut R) -> Self
    where R: Rng + ?Sized
    {
        let re: f64 = StandardNormal.sample(rng);
        let im: f64 = StandardNormal.sample(rng);
        C64::new(re, im) * std::f64::consts::FRAC_1_SQRT_2
    }
}
