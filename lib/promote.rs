//! Element-type promotion for mixed real/complex arithmetic.
//!
//! [`MPArray`] is generic over its element type, so sums of real and complex
//! arrays are expressed through [`MPArrayDyn`], which promotes real operands
//! to complex whenever the other operand is complex.

use std::ops::{ Add, AddAssign, Mul, MulAssign, Sub, SubAssign };
use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    DType,
    ltens::LocalTensors,
    mparray::{ MPAResult, MPArray },
};

impl MPArray<f64> {
    /// Convert to a complex array with the same entries and normal form.
    pub fn to_complex(&self) -> MPArray<C64> {
        let ltens: Vec<nd::ArrayD<C64>>
            = self.lt.iter().map(|t| t.mapv(C64::from)).collect();
        MPArray {
            lt: LocalTensors::with_normal_form(ltens, self.normal_form()),
        }
    }
}

/// A matrix product array with a run-time element type.
#[derive(Clone, Debug, PartialEq)]
pub enum MPArrayDyn {
    Real(MPArray<f64>),
    Complex(MPArray<C64>),
}

impl From<MPArray<f64>> for MPArrayDyn {
    fn from(mpa: MPArray<f64>) -> Self { Self::Real(mpa) }
}

impl From<MPArray<C64>> for MPArrayDyn {
    fn from(mpa: MPArray<C64>) -> Self { Self::Complex(mpa) }
}

impl MPArrayDyn {
    /// Return the element type tag.
    pub fn dtype(&self) -> DType {
        match self {
            Self::Real(_) => DType::Real,
            Self::Complex(_) => DType::Complex,
        }
    }

    /// Return the number of sites.
    pub fn len(&self) -> usize {
        match self {
            Self::Real(mpa) => mpa.len(),
            Self::Complex(mpa) => mpa.len(),
        }
    }

    /// Always `false`; arrays have at least one site.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Return the inner bond dimensions.
    pub fn bdims(&self) -> Vec<usize> {
        match self {
            Self::Real(mpa) => mpa.bdims(),
            Self::Complex(mpa) => mpa.bdims(),
        }
    }

    /// Return a reference to the real array, if real.
    pub fn as_real(&self) -> Option<&MPArray<f64>> {
        match self {
            Self::Real(mpa) => Some(mpa),
            Self::Complex(_) => None,
        }
    }

    /// Return a reference to the complex array, if complex.
    pub fn as_complex(&self) -> Option<&MPArray<C64>> {
        match self {
            Self::Real(_) => None,
            Self::Complex(mpa) => Some(mpa),
        }
    }

    /// Convert to a complex array, promoting if necessary.
    pub fn into_complex(self) -> MPArray<C64> {
        match self {
            Self::Real(mpa) => mpa.to_complex(),
            Self::Complex(mpa) => mpa,
        }
    }

    /// Contract all bonds, returning the full array as complex numbers.
    pub fn to_array(&self) -> MPAResult<nd::ArrayD<C64>> {
        match self {
            Self::Real(mpa) => Ok(mpa.to_array()?.mapv(C64::from)),
            Self::Complex(mpa) => mpa.to_array(),
        }
    }

    /// Sum two arrays, promoting to complex if either is complex.
    pub fn add_checked(&self, other: &Self) -> MPAResult<Self> {
        match (self, other) {
            (Self::Real(a), Self::Real(b))
                => Ok(Self::Real(a.add_checked(b)?)),
            (Self::Real(a), Self::Complex(b))
                => Ok(Self::Complex(a.to_complex().add_checked(b)?)),
            (Self::Complex(a), Self::Real(b))
                => Ok(Self::Complex(a.add_checked(&b.to_complex())?)),
            (Self::Complex(a), Self::Complex(b))
                => Ok(Self::Complex(a.add_checked(b)?)),
        }
    }

    /// Subtract two arrays, promoting to complex if either is complex.
    pub fn sub_checked(&self, other: &Self) -> MPAResult<Self> {
        match (self, other) {
            (Self::Real(a), Self::Real(b))
                => Ok(Self::Real(a.sub_checked(b)?)),
            (Self::Real(a), Self::Complex(b))
                => Ok(Self::Complex(a.to_complex().sub_checked(b)?)),
            (Self::Complex(a), Self::Real(b))
                => Ok(Self::Complex(a.sub_checked(&b.to_complex())?)),
            (Self::Complex(a), Self::Complex(b))
                => Ok(Self::Complex(a.sub_checked(b)?)),
        }
    }
}

impl Add<&MPArrayDyn> for &MPArrayDyn {
    type Output = MPArrayDyn;

    fn add(self, rhs: &MPArrayDyn) -> Self::Output {
        match self.add_checked(rhs) {
            Ok(res) => res,
            Err(err) => panic!("{}", err),
        }
    }
}

impl AddAssign<&MPArrayDyn> for MPArrayDyn {
    fn add_assign(&mut self, rhs: &MPArrayDyn) { *self = &*self + rhs; }
}

impl Sub<&MPArrayDyn> for &MPArrayDyn {
    type Output = MPArrayDyn;

    fn sub(self, rhs: &MPArrayDyn) -> Self::Output {
        match self.sub_checked(rhs) {
            Ok(res) => res,
            Err(err) => panic!("{}", err),
        }
    }
}

impl SubAssign<&MPArrayDyn> for MPArrayDyn {
    fn sub_assign(&mut self, rhs: &MPArrayDyn) { *self = &*self - rhs; }
}

impl MulAssign<f64> for MPArrayDyn {
    fn mul_assign(&mut self, x: f64) {
        match self {
            Self::Real(mpa) => { *mpa *= x; },
            Self::Complex(mpa) => { *mpa *= C64::from(x); },
        }
    }
}

impl MulAssign<C64> for MPArrayDyn {
    fn mul_assign(&mut self, x: C64) {
        let mut promoted = self.clone().into_complex();
        promoted *= x;
        *self = Self::Complex(promoted);
    }
}

impl<X> Mul<X> for MPArrayDyn
where MPArrayDyn: MulAssign<X>
{
    type Output = MPArrayDyn;

    fn mul(mut self, x: X) -> Self::Output {
        self *= x;
        self
    }
}
