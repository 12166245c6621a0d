//! Strategies for property-based testing with `proptest`.
use crate::constraint::ConstraintSet;
use crate::layout::Context;
use crate::operator::DenseOperator;
use crate::space::ElementDofSpace;
use crate::vector::DeviceVector;
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use ::proptest::sample::subsequence;
use nalgebra::DMatrix;

/// Constraint sets of arbitrary size over `global_size` degrees of freedom, in arbitrary order.
pub fn constraint_set(global_size: usize) -> impl Strategy<Value = ConstraintSet> {
    let all_indices: Vec<usize> = (0..global_size).collect();
    subsequence(all_indices, 0..=global_size)
        .prop_shuffle()
        .prop_filter_map("constraint indices must be unique and in bounds", move |indices| {
            ConstraintSet::new(indices, global_size).ok()
        })
}

/// Vectors of the given length on `context`.
pub fn device_vector(context: Context, len: usize) -> impl Strategy<Value = DeviceVector<f64>> {
    // Keep values moderate so that products of several operators stay well within
    // the range where absolute tolerances are meaningful
    vec(-10.0..10.0, len).prop_map(move |values| DeviceVector::from_slice(&context, &values))
}

/// Dense operators with `nrows` rows and `ncols` columns on `context`.
pub fn dense_operator(context: Context, nrows: usize, ncols: usize) -> impl Strategy<Value = DenseOperator<f64>> {
    vec(-10.0..10.0, nrows * ncols)
        .prop_map(move |values| DenseOperator::new(DMatrix::from_row_slice(nrows, ncols, &values), &context))
}

/// Element spaces over `num_dofs` degrees of freedom with up to `max_elements` elements.
///
/// Each element has between one and three degrees of freedom, which may repeat within and across
/// elements. `num_dofs` must be positive.
pub fn element_dof_space(
    context: Context,
    num_dofs: usize,
    max_elements: usize,
) -> impl Strategy<Value = ElementDofSpace<f64>> {
    vec(vec(0..num_dofs, 1..=3), 0..=max_elements).prop_filter_map(
        "element dofs must be in bounds",
        move |elements| ElementDofSpace::from_element_dofs(&context, num_dofs, elements).ok(),
    )
}

/// A square dense operator together with a constraint set of matching size.
pub fn constrained_problem(
    context: Context,
    max_size: usize,
) -> impl Strategy<Value = (DenseOperator<f64>, ConstraintSet)> {
    (1..=max_size).prop_flat_map(move |n| (dense_operator(context.clone(), n, n), constraint_set(n)))
}
