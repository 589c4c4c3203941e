//! Types and traits for real numbers
use std::fmt::Debug;
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

/// Scalar type, used throughout this crate for arithmetic operations
pub trait Scalar:
    num_traits::Float
    + num_traits::Zero
    + num_traits::One
    + From<f64>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + Debug
    + 'static
{
}

impl<T> Scalar for T where
    T: num_traits::Float
        + num_traits::Zero
        + num_traits::One
        + From<f64>
        + AddAssign
        + SubAssign
        + MulAssign
        + DivAssign
        + Debug
        + 'static
{
}

/// Degree-of-freedom vector on a single multigrid level
pub type DofVector = ndarray::Array1<f64>;
