//! Matrix-free bilinear forms and the essential boundary condition protocol.
//!
//! A [`BilinearForm`] accumulates the element-local contributions of its integrators into a
//! global, matrix-free linear operator. Solving a problem with essential boundary conditions
//! follows a fixed sequence of calls:
//!
//! 1. [`BilinearForm::assemble`] lets every integrator precompute its data,
//! 2. [`BilinearForm::form_operator`] builds the [`ConstrainedOperator`] on the true degrees of
//!    freedom,
//! 3. [`BilinearForm::init_rhs`] restricts the initial guess and right-hand side and eliminates
//!    the constrained degrees of freedom from the right-hand side,
//! 4. an external solver applies the constrained operator to the [`ReducedSystem`],
//! 5. [`BilinearForm::recover_solution`] maps the reduced solution back to the global space.
use crate::constraint::ConstraintSet;
use crate::error::OperatorError;
use crate::integrator::{Integrator, IntegratorKind, IntegratorSetup};
use crate::layout::Layout;
use crate::operator::{ConstrainedOperator, LinearOperator, OperatorRef, RapOperator};
use crate::span::Span;
use crate::space::FiniteElementSpace;
use crate::vector::DeviceVector;
use ferroform_traits::Real;
use log::debug;
use std::cell::RefCell;
use std::fmt;

struct IntegratorEntry<'s, T: Real> {
    integrator: Box<dyn Integrator<T> + 's>,
    kind: IntegratorKind,
    assembled: bool,
}

impl<'s, T: Real> IntegratorEntry<'s, T> {
    fn error(&self, source: eyre::Report) -> OperatorError {
        OperatorError::Integrator {
            name: self.integrator.name().to_string(),
            kind: self.kind,
            source,
        }
    }
}

/// A bilinear form applied matrix-free through its integrators.
///
/// The action of the form on a global vector `x` is computed by scattering `x` to element-local
/// storage of the trial space, accumulating the contributions of all integrators in the order
/// they were registered, and gathering the result into the global vector of the test space,
/// which sums the contributions to shared degrees of freedom.
pub struct BilinearForm<'s, T: Real> {
    trial_space: &'s dyn FiniteElementSpace<T>,
    test_space: &'s dyn FiniteElementSpace<T>,
    integrators: Vec<IntegratorEntry<'s, T>>,
    local_x: RefCell<DeviceVector<T>>,
    local_y: RefCell<DeviceVector<T>>,
}

/// The right-hand side and initial guess on the true degrees of freedom.
///
/// If the trial space has no prolongation, the reduced vectors *are* the vectors passed to
/// [`BilinearForm::init_rhs`]. Otherwise they are separate vectors owned by the system.
#[derive(Debug)]
pub enum ReducedSystem<'v, T: Real> {
    Aliased {
        x: &'v mut DeviceVector<T>,
        b: &'v mut DeviceVector<T>,
    },
    Projected {
        x: &'v mut DeviceVector<T>,
        solution: DeviceVector<T>,
        rhs: DeviceVector<T>,
    },
}

impl<'v, T: Real> ReducedSystem<'v, T> {
    pub fn is_aliased(&self) -> bool {
        matches!(self, Self::Aliased { .. })
    }

    /// The reduced solution vector `X`.
    pub fn solution(&self) -> &DeviceVector<T> {
        match self {
            Self::Aliased { x, .. } => &**x,
            Self::Projected { solution, .. } => solution,
        }
    }

    /// The reduced right-hand side `B`.
    pub fn rhs(&self) -> &DeviceVector<T> {
        match self {
            Self::Aliased { b, .. } => &**b,
            Self::Projected { rhs, .. } => rhs,
        }
    }

    pub fn solution_mut(&mut self) -> &mut DeviceVector<T> {
        self.parts_mut().0
    }

    /// Mutable access to `(X, B)` at the same time.
    pub fn parts_mut(&mut self) -> (&mut DeviceVector<T>, &mut DeviceVector<T>) {
        match self {
            Self::Aliased { x, b } => (&mut **x, &mut **b),
            Self::Projected { solution, rhs, .. } => (solution, rhs),
        }
    }
}

impl<'s, T: Real> BilinearForm<'s, T> {
    /// A form whose trial and test spaces coincide.
    pub fn new(space: &'s dyn FiniteElementSpace<T>) -> Self {
        Self::new_mixed(space, space)
    }

    pub fn new_mixed(trial_space: &'s dyn FiniteElementSpace<T>, test_space: &'s dyn FiniteElementSpace<T>) -> Self {
        Self {
            trial_space,
            test_space,
            integrators: Vec::new(),
            local_x: RefCell::new(DeviceVector::zeros(trial_space.element_layout().clone())),
            local_y: RefCell::new(DeviceVector::zeros(test_space.element_layout().clone())),
        }
    }

    pub fn trial_space(&self) -> &'s dyn FiniteElementSpace<T> {
        self.trial_space
    }

    pub fn test_space(&self) -> &'s dyn FiniteElementSpace<T> {
        self.test_space
    }

    pub fn trial_prolongation(&self) -> Option<&'s dyn LinearOperator<T>> {
        self.trial_space.prolongation()
    }

    pub fn test_prolongation(&self) -> Option<&'s dyn LinearOperator<T>> {
        self.test_space.prolongation()
    }

    pub fn trial_restriction(&self) -> Option<&'s dyn LinearOperator<T>> {
        self.trial_space.restriction()
    }

    pub fn test_restriction(&self) -> Option<&'s dyn LinearOperator<T>> {
        self.test_space.restriction()
    }

    /// Binds `integrator` to this form and appends it to the registry.
    ///
    /// The registry order is the order in which contributions are accumulated.
    ///
    /// # Errors
    ///
    /// Fails with [`OperatorError::Integrator`] if the integrator rejects its setup, in which case
    /// it is not registered.
    pub fn add_integrator(
        &mut self,
        mut integrator: Box<dyn Integrator<T> + 's>,
        kind: IntegratorKind,
    ) -> Result<(), OperatorError> {
        let position = self.integrators.len();
        let setup = IntegratorSetup::new(kind, position, self.trial_space, self.test_space);
        if let Err(source) = integrator.setup(&setup) {
            return Err(OperatorError::Integrator {
                name: integrator.name().to_string(),
                kind,
                source,
            });
        }

        debug!(
            "Registered {} integrator '{}' at position {}",
            kind,
            integrator.name(),
            position
        );
        self.integrators.push(IntegratorEntry {
            integrator,
            kind,
            assembled: false,
        });
        Ok(())
    }

    pub fn add_domain_integrator(&mut self, integrator: impl Integrator<T> + 's) -> Result<(), OperatorError> {
        self.add_integrator(Box::new(integrator), IntegratorKind::Domain)
    }

    pub fn add_boundary_integrator(&mut self, integrator: impl Integrator<T> + 's) -> Result<(), OperatorError> {
        self.add_integrator(Box::new(integrator), IntegratorKind::Boundary)
    }

    pub fn add_interior_face_integrator(&mut self, integrator: impl Integrator<T> + 's) -> Result<(), OperatorError> {
        self.add_integrator(Box::new(integrator), IntegratorKind::InteriorFace)
    }

    pub fn add_boundary_face_integrator(&mut self, integrator: impl Integrator<T> + 's) -> Result<(), OperatorError> {
        self.add_integrator(Box::new(integrator), IntegratorKind::BoundaryFace)
    }

    pub fn num_integrators(&self) -> usize {
        self.integrators.len()
    }

    /// The registered integrators together with their kinds, in registry order.
    pub fn integrators(&self) -> impl Iterator<Item = (IntegratorKind, &(dyn Integrator<T> + 's))> {
        self.integrators
            .iter()
            .map(|entry| (entry.kind, entry.integrator.as_ref()))
    }

    /// Whether every registered integrator has been assembled.
    pub fn is_assembled(&self) -> bool {
        self.integrators.iter().all(|entry| entry.assembled)
    }

    /// Assembles all integrators in registry order.
    pub fn assemble(&mut self) -> Result<(), OperatorError> {
        let _span = Span::enter("BilinearForm::assemble");
        for entry in &mut self.integrators {
            if let Err(source) = entry.integrator.assemble() {
                entry.assembled = false;
                return Err(entry.error(source));
            }
            entry.assembled = true;
        }
        debug!("Assembled {} integrators", self.integrators.len());
        Ok(())
    }

    /// Builds the operator on the true degrees of freedom, wrapped with the given constraints.
    ///
    /// If the trial space has a prolongation `P` and the test space a prolongation `Q`, the
    /// wrapped operator is the newly created composition `Q^T A P`, owned by the returned
    /// operator. Otherwise the form itself is wrapped by reference.
    ///
    /// # Errors
    ///
    /// Fails with [`OperatorError::InvalidArgument`] if only the trial space has a prolongation,
    /// and with the errors of [`ConstrainedOperator::new`].
    pub fn form_operator(&self, constraints: ConstraintSet) -> Result<ConstrainedOperator<'_, T>, OperatorError> {
        let _span = Span::enter("BilinearForm::form_operator");
        let a = match self.trial_prolongation() {
            Some(p) => {
                let q = self.test_prolongation().ok_or_else(|| {
                    OperatorError::invalid_argument(
                        "test_space",
                        "the trial space has a prolongation, but the test space does not",
                    )
                })?;
                let rap = RapOperator::new(q, self, p)?;
                OperatorRef::Owned(Box::new(rap))
            }
            None => OperatorRef::Borrowed(self as &dyn LinearOperator<T>),
        };

        debug!(
            "Formed {:?} operator on {} with {} constrained degrees of freedom",
            a.ownership(),
            a.in_layout(),
            constraints.len()
        );
        ConstrainedOperator::new(a, constraints)
    }

    /// Prepares the reduced linear system for the constrained operator `a`.
    ///
    /// If the trial space has a prolongation `P` with restriction `R`, the reduced solution is
    /// `X = R x` and the reduced right-hand side is `B = P^T b`. Otherwise `X` and `B` are `x`
    /// and `b` themselves.
    ///
    /// Unless `copy_interior` is set, all entries of `X` except the constrained ones are zeroed.
    /// Finally the constrained degrees of freedom are eliminated from `B`
    /// (see [`ConstrainedOperator::eliminate_rhs`]), using the values of `X` at the constrained
    /// indices as prescribed values.
    pub fn init_rhs<'v>(
        &self,
        a: &ConstrainedOperator<'_, T>,
        x: &'v mut DeviceVector<T>,
        b: &'v mut DeviceVector<T>,
        copy_interior: bool,
    ) -> Result<ReducedSystem<'v, T>, OperatorError> {
        let _span = Span::enter("BilinearForm::init_rhs");
        let mut system = match self.trial_prolongation() {
            Some(p) => {
                let r = self.trial_restriction().ok_or_else(|| {
                    OperatorError::invalid_argument(
                        "trial_space",
                        "the trial space has a prolongation, but no restriction",
                    )
                })?;
                let mut rhs = DeviceVector::zeros(p.in_layout().clone());
                p.mult_transpose(b, &mut rhs)?;
                let mut solution = DeviceVector::zeros(r.out_layout().clone());
                r.mult(x, &mut solution)?;
                ReducedSystem::Projected { x, solution, rhs }
            }
            None => ReducedSystem::Aliased { x, b },
        };

        let constraints = a.constraints();
        let (solution, rhs) = system.parts_mut();
        if !copy_interior && !constraints.is_empty() {
            let prescribed = solution.subvector(constraints)?;
            solution.fill(T::zero());
            solution.set_subvector(&prescribed, constraints)?;
        }
        a.eliminate_rhs(solution, rhs)?;
        Ok(system)
    }

    /// Combines [`form_operator`](Self::form_operator) and [`init_rhs`](Self::init_rhs).
    pub fn form_linear_system<'v>(
        &self,
        constraints: ConstraintSet,
        x: &'v mut DeviceVector<T>,
        b: &'v mut DeviceVector<T>,
        copy_interior: bool,
    ) -> Result<(ConstrainedOperator<'_, T>, ReducedSystem<'v, T>), OperatorError> {
        let a = self.form_operator(constraints)?;
        let system = self.init_rhs(&a, x, b, copy_interior)?;
        Ok((a, system))
    }

    /// Writes the solution of a reduced system back to the global vector it was created from.
    ///
    /// For an aliased system the solution is already in place and nothing is computed.
    pub fn recover_solution(&self, system: ReducedSystem<'_, T>) -> Result<(), OperatorError> {
        let _span = Span::enter("BilinearForm::recover_solution");
        match system {
            ReducedSystem::Aliased { .. } => Ok(()),
            ReducedSystem::Projected { x, solution, .. } => self.recover_solution_into(&solution, x),
        }
    }

    /// Computes `x = P X`, or copies `X` into `x` if the trial space has no prolongation.
    pub fn recover_solution_into(&self, solution: &DeviceVector<T>, x: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        match self.trial_prolongation() {
            Some(p) => p.mult(solution, x),
            None => x.assign(solution),
        }
    }
}

impl<'s, T: Real> LinearOperator<T> for BilinearForm<'s, T> {
    fn in_layout(&self) -> &Layout {
        self.trial_space.layout()
    }

    fn out_layout(&self) -> &Layout {
        self.test_space.layout()
    }

    fn apply(&self, x: &DeviceVector<T>, y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        let _span = Span::enter("BilinearForm::mult");
        if let Some(entry) = self.integrators.iter().find(|entry| !entry.assembled) {
            return Err(OperatorError::contract_violation(format!(
                "{} integrator '{}' must be assembled before the form is applied",
                entry.kind,
                entry.integrator.name()
            )));
        }

        let local_x = &mut *self.local_x.borrow_mut();
        let local_y = &mut *self.local_y.borrow_mut();

        self.trial_space.global_to_local(x, local_x)?;
        local_y.fill(T::zero());
        for entry in &self.integrators {
            entry
                .integrator
                .mult_add(local_x, local_y)
                .map_err(|source| entry.error(source))?;
        }
        self.test_space.local_to_global(local_y, y)
    }

    fn apply_transpose(&self, _x: &DeviceVector<T>, _y: &mut DeviceVector<T>) -> Result<(), OperatorError> {
        Err(OperatorError::unsupported(
            "mult_transpose",
            "the transpose action of a bilinear form is not available",
        ))
    }
}

impl<'s, T: Real> fmt::Debug for BilinearForm<'s, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let integrators: Vec<_> = self
            .integrators
            .iter()
            .map(|entry| format!("{} ({})", entry.integrator.name(), entry.kind))
            .collect();
        f.debug_struct("BilinearForm")
            .field("in_layout", self.in_layout())
            .field("out_layout", self.out_layout())
            .field("integrators", &integrators)
            .finish()
    }
}
