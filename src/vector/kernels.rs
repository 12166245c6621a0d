//! Buffer kernels executed on an execution [`Context`].
//!
//! These functions operate on raw slices and are the building blocks of [`DeviceVector`]. Every
//! kernel returns only after all of its work has completed, also on the parallel backend.
//!
//! Dense kernels and gathers may run on the rayon thread pool. Scatter kernels
//! ([`set_subvector`], [`clear_dofs`], [`map_dofs`], [`scatter_add`]) always run serially in
//! index order, so if an index appears several times in one call, the write for the *last*
//! occurrence wins (for [`scatter_add`], all contributions are summed). [`DeviceVector`] only
//! ever passes duplicate-free index lists to the overwriting scatters.
//!
//! # Panics
//!
//! All kernels panic if slice lengths are inconsistent or an index is out of bounds.
//!
//! [`DeviceVector`]: crate::vector::DeviceVector
use crate::layout::Context;
use ferroform_traits::Real;
use itertools::izip;
use rayon::prelude::*;

pub fn fill<T: Real>(context: &Context, buffer: &mut [T], value: T) {
    if context.runs_parallel(buffer.len()) {
        buffer.par_iter_mut().for_each(|x| *x = value);
    } else {
        buffer.fill(value);
    }
}

/// `dst = src`.
pub fn copy<T: Real>(context: &Context, dst: &mut [T], src: &[T]) {
    assert_eq!(dst.len(), src.len());
    if context.runs_parallel(dst.len()) {
        dst.par_iter_mut()
            .zip(src.par_iter())
            .for_each(|(d, &s)| *d = s);
    } else {
        dst.copy_from_slice(src);
    }
}

/// `y = alpha * y + beta * x`.
pub fn axpby<T: Real>(context: &Context, y: &mut [T], alpha: T, beta: T, x: &[T]) {
    assert_eq!(y.len(), x.len());
    if context.runs_parallel(y.len()) {
        y.par_iter_mut()
            .zip(x.par_iter())
            .for_each(|(y_i, &x_i)| *y_i = alpha * *y_i + beta * x_i);
    } else {
        for (y_i, &x_i) in izip!(y.iter_mut(), x) {
            *y_i = alpha * *y_i + beta * x_i;
        }
    }
}

pub fn dot<T: Real>(context: &Context, a: &[T], b: &[T]) -> T {
    assert_eq!(a.len(), b.len());
    if context.runs_parallel(a.len()) {
        a.par_iter()
            .zip(b.par_iter())
            .map(|(&a_i, &b_i)| a_i * b_i)
            .reduce(T::zero, |acc, x| acc + x)
    } else {
        izip!(a, b).fold(T::zero(), |acc, (&a_i, &b_i)| acc + a_i * b_i)
    }
}

/// `dst[i] = src[indices[i]]` for `i in 0 .. indices.len()`.
pub fn get_subvector<T: Real>(context: &Context, dst: &mut [T], src: &[T], indices: &[usize]) {
    assert_eq!(dst.len(), indices.len());
    if context.runs_parallel(dst.len()) {
        dst.par_iter_mut()
            .zip(indices.par_iter())
            .for_each(|(d, &idx)| *d = src[idx]);
    } else {
        for (d, &idx) in izip!(dst.iter_mut(), indices) {
            *d = src[idx];
        }
    }
}

/// `dst[indices[i]] = src[i]` for `i in 0 .. indices.len()`.
pub fn set_subvector<T: Real>(_context: &Context, dst: &mut [T], src: &[T], indices: &[usize]) {
    assert_eq!(src.len(), indices.len());
    for (&s, &idx) in izip!(src, indices) {
        dst[idx] = s;
    }
}

/// `buffer[indices[i]] = 0` for `i in 0 .. indices.len()`.
pub fn clear_dofs<T: Real>(_context: &Context, buffer: &mut [T], indices: &[usize]) {
    for &idx in indices {
        buffer[idx] = T::zero();
    }
}

/// `dst[indices[i]] = src[indices[i]]` for `i in 0 .. indices.len()`.
pub fn map_dofs<T: Real>(_context: &Context, dst: &mut [T], src: &[T], indices: &[usize]) {
    assert_eq!(dst.len(), src.len());
    for &idx in indices {
        dst[idx] = src[idx];
    }
}

/// `dst[indices[i]] += src[i]` for `i in 0 .. indices.len()`.
pub fn scatter_add<T: Real>(_context: &Context, dst: &mut [T], src: &[T], indices: &[usize]) {
    assert_eq!(src.len(), indices.len());
    for (&s, &idx) in izip!(src, indices) {
        dst[idx] += s;
    }
}
