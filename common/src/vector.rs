use std::ops::{Index, IndexMut};

/// A fixed-size, element-wise vector over `DIMS` components.
///
/// Mixing component types does not compile:
/// ```compile_fail
/// use common::vector::Vector;
/// let x = Vector::new([0isize, 1, 2]);
/// let y = Vector::new([1usize, 2, 3]);
/// let _ = x + y;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Vector<T, const DIMS: usize>([T; DIMS]);

impl<T, const DIMS: usize> Vector<T, DIMS> {
    /// Wraps an array as a [`Vector`].
    pub const fn new(data: [T; DIMS]) -> Self {
        Self(data)
    }

    /// Builds a [`Vector`] by evaluating `idx_fn` on every component index.
    #[inline]
    pub fn from_idx(idx_fn: impl FnMut(usize) -> T) -> Self {
        Self(std::array::from_fn(idx_fn))
    }

    /// Applies `map_fn` to each component.
    #[inline]
    pub fn map<U>(self, map_fn: impl FnMut(T) -> U) -> Vector<U, DIMS> {
        Vector(self.0.map(map_fn))
    }

    /// Combines two vectors component by component.
    #[inline]
    pub fn zip_with<U, V>(self, other: Vector<U, DIMS>, mut f: impl FnMut(T, U) -> V) -> Vector<V, DIMS>
    where
        T: Copy,
        U: Copy,
    {
        Vector::from_idx(|i| f(self.0[i], other.0[i]))
    }

    /// Consumes the vector, iterating over its components.
    pub fn iter(self) -> impl Iterator<Item = T> {
        self.0.into_iter()
    }

    /// The underlying array.
    pub const fn as_array(&self) -> &[T; DIMS] {
        &self.0
    }

    /// The sum of all components.
    #[inline]
    pub fn sum(self) -> T
    where
        T: std::ops::Add<Output = T> + num::Zero,
    {
        self.0.into_iter().fold(T::zero(), |a, b| a + b)
    }

    /// The product of all components.
    #[inline]
    pub fn product(self) -> T
    where
        T: std::ops::Mul<Output = T> + num::One,
    {
        self.0.into_iter().fold(T::one(), |a, b| a * b)
    }
}

impl<T: num::Zero, const DIMS: usize> Vector<T, DIMS> {
    /// The zero vector.
    #[inline]
    pub fn zero() -> Self {
        Vector::from_idx(|_| T::zero())
    }
}

impl<T: num::Signed + Copy, const DIMS: usize> Vector<T, DIMS> {
    /// Component-wise absolute value.
    #[inline]
    pub fn abs(self) -> Self {
        self.map(|i| i.abs())
    }
}

impl<T: Copy + std::ops::Mul<Output = T> + std::ops::Add<Output = T> + num::Zero, const DIMS: usize>
    Vector<T, DIMS>
{
    /// The squared Euclidean length.
    #[inline]
    pub fn norm_squared(self) -> T {
        self.map(|i| i * i).sum()
    }
}

impl<T, const DIMS: usize> Index<usize> for Vector<T, DIMS> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<T, const DIMS: usize> IndexMut<usize> for Vector<T, DIMS> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<T, const DIMS: usize> From<[T; DIMS]> for Vector<T, DIMS> {
    fn from(value: [T; DIMS]) -> Self {
        Self(value)
    }
}

impl<T: Copy + std::ops::Neg<Output = T>, const DIMS: usize> std::ops::Neg for Vector<T, DIMS> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.map(|i| -i)
    }
}

macro_rules! impl_binary_operation {
    ($($op:ident),+$(,)?) => {
        paste::paste! {
            $(impl<T: Copy + std::ops::$op<Output = T>, const DIMS: usize> std::ops::$op
                for Vector<T, DIMS>
            {
                type Output = Self;

                fn [< $op:lower >](self, rhs: Self) -> Self::Output {
                    self.zip_with(rhs, |a, b| a.[< $op:lower >](b))
                }
            }

            impl<T: Copy + std::ops::$op<Output = T>, const DIMS: usize>
                std::ops::[< $op Assign >] for Vector<T, DIMS>
            {
                fn [< $op:lower _assign >](&mut self, rhs: Self) {
                    *self = std::ops::$op::[< $op:lower >](*self, rhs);
                }
            })+
        }
    };
}

impl_binary_operation!(Add, Sub, Mul, Rem);

#[cfg(test)]
mod tests {
    use super::Vector;

    #[test]
    fn test_displacement_arithmetic() {
        let a = Vector::new([3isize, 0, 2]);
        let b = Vector::new([1isize, 4, 2]);

        assert_eq!(b - a, Vector::new([-2, 4, 0]));
        assert_eq!(-(b - a), a - b);
    }

    #[test]
    fn test_abs_and_norm() {
        let d = Vector::new([-2isize, 1, -2]);

        assert_eq!(d.abs(), Vector::new([2, 1, 2]));
        assert_eq!(d.norm_squared(), 9);
    }

    #[test]
    fn test_sum_and_product() {
        let dims = Vector::new([4usize, 5, 2]);

        assert_eq!(dims.sum(), 11);
        assert_eq!(dims.product(), 40);
    }

    #[test]
    fn test_assign_operations() {
        let mut p = Vector::new([1usize, 2, 3]);
        p += Vector::new([1, 1, 1]);
        p %= Vector::new([2, 2, 2]);

        assert_eq!(p, Vector::new([0, 1, 0]));
    }
}
