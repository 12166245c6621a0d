use crate::{chain_space, laplace_element_matrix, FixedElementMatrices};
use eyre::eyre;
use ferroform::constraint::ConstraintSet;
use ferroform::error::OperatorError;
use ferroform::form::BilinearForm;
use ferroform::integrator::{ElementMatrixIntegrator, Integrator, IntegratorKind, IntegratorSetup};
use ferroform::layout::{Context, Layout};
use ferroform::operator::{LinearOperator, Ownership};
use ferroform::proptest::device_vector;
use ferroform::space::{ElementDofSpace, FiniteElementSpace};
use ferroform::vector::DeviceVector;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use proptest::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

/// Adds `factor * x_local` to the output and records the setups it receives.
struct ScalingIntegrator {
    factor: f64,
    setups: Rc<RefCell<Vec<(IntegratorKind, usize)>>>,
    fail_assembly: bool,
}

impl ScalingIntegrator {
    fn new(factor: f64) -> Self {
        Self {
            factor,
            setups: Rc::new(RefCell::new(Vec::new())),
            fail_assembly: false,
        }
    }
}

impl Integrator<f64> for ScalingIntegrator {
    fn name(&self) -> &str {
        "scaling"
    }

    fn setup(&mut self, setup: &IntegratorSetup<f64>) -> eyre::Result<()> {
        if setup.trial_space().element_layout() != setup.test_space().element_layout() {
            return Err(eyre!("scaling requires identical element layouts"));
        }
        self.setups
            .borrow_mut()
            .push((setup.kind(), setup.position()));
        Ok(())
    }

    fn assemble(&mut self) -> eyre::Result<()> {
        if self.fail_assembly {
            Err(eyre!("assembly failed on purpose"))
        } else {
            Ok(())
        }
    }

    fn mult_add(&self, x_local: &DeviceVector<f64>, y_local: &mut DeviceVector<f64>) -> eyre::Result<()> {
        y_local.axpby(1.0, self.factor, x_local)?;
        Ok(())
    }
}

fn laplace_integrator(num_elements: usize) -> ElementMatrixIntegrator<f64, FixedElementMatrices> {
    let h = 1.0 / num_elements as f64;
    ElementMatrixIntegrator::new("laplace", FixedElementMatrices::repeated(laplace_element_matrix(h), num_elements))
}

/// The Laplace form on a chain of four unit elements.
fn unit_laplace_form(space: &ElementDofSpace<f64>) -> BilinearForm<'_, f64> {
    let mut form = BilinearForm::new(space);
    form.add_domain_integrator(ElementMatrixIntegrator::new(
        "laplace",
        FixedElementMatrices::repeated(laplace_element_matrix(1.0), 4),
    ))
    .unwrap();
    form.assemble().unwrap();
    form
}

#[test]
fn form_mult_assembles_global_action() {
    let context = Context::host();
    let space = chain_space(&context, 4);
    let form = unit_laplace_form(&space);
    assert!(form.is_assembled());
    assert_eq!(form.in_layout(), space.layout());
    assert_eq!(form.out_layout(), space.layout());

    let x = DeviceVector::from_slice(&context, &[1.0, 2.0, 4.0, 8.0, 16.0]);
    let mut y = DeviceVector::zeros(Layout::host(5));
    form.mult(&x, &mut y).unwrap();
    assert_eq!(y.as_slice(), &[-1.0, -1.0, -2.0, -4.0, 8.0]);
}

#[test]
fn form_mult_before_assembly_is_contract_violation() {
    let context = Context::host();
    let space = chain_space(&context, 4);
    let mut form = BilinearForm::new(&space);
    form.add_domain_integrator(laplace_integrator(4)).unwrap();
    assert!(!form.is_assembled());

    let x = DeviceVector::zeros(Layout::host(5));
    let mut y = DeviceVector::zeros(Layout::host(5));
    assert!(matches!(form.mult(&x, &mut y), Err(OperatorError::ContractViolation(_))));
}

#[test]
fn form_mult_transpose_is_unsupported() {
    let context = Context::host();
    let space = chain_space(&context, 4);
    let form = unit_laplace_form(&space);
    let x = DeviceVector::zeros(Layout::host(5));
    let mut y = DeviceVector::zeros(Layout::host(5));
    assert!(matches!(
        form.mult_transpose(&x, &mut y),
        Err(OperatorError::UnsupportedOperation { .. })
    ));
}

#[test]
fn integrators_are_registered_in_order() {
    let context = Context::host();
    let space = chain_space(&context, 2);
    let mut form = BilinearForm::new(&space);

    let first = ScalingIntegrator::new(1.0);
    let second = ScalingIntegrator::new(2.0);
    let third = ScalingIntegrator::new(3.0);
    let setups = [first.setups.clone(), second.setups.clone(), third.setups.clone()];

    form.add_boundary_integrator(first).unwrap();
    form.add_interior_face_integrator(second).unwrap();
    form.add_integrator(Box::new(third), "boundary_face".parse().unwrap())
        .unwrap();

    assert_eq!(form.num_integrators(), 3);
    let kinds: Vec<_> = form.integrators().map(|(kind, _)| kind).collect();
    assert_eq!(
        kinds,
        vec![
            IntegratorKind::Boundary,
            IntegratorKind::InteriorFace,
            IntegratorKind::BoundaryFace
        ]
    );
    assert_eq!(*setups[0].borrow(), vec![(IntegratorKind::Boundary, 0)]);
    assert_eq!(*setups[1].borrow(), vec![(IntegratorKind::InteriorFace, 1)]);
    assert_eq!(*setups[2].borrow(), vec![(IntegratorKind::BoundaryFace, 2)]);
}

#[test]
fn failing_setup_is_reported_and_not_registered() {
    let context = Context::host();
    let trial = chain_space(&context, 1);
    let test = chain_space(&context, 2);
    let mut form = BilinearForm::new_mixed(&trial, &test);

    let err = form
        .add_domain_integrator(ScalingIntegrator::new(1.0))
        .unwrap_err();
    match err {
        OperatorError::Integrator { name, kind, .. } => {
            assert_eq!(name, "scaling");
            assert_eq!(kind, IntegratorKind::Domain);
        }
        other => panic!("expected integrator error, got {:?}", other),
    }
    assert_eq!(form.num_integrators(), 0);
}

#[test]
fn failing_assembly_is_reported() {
    let context = Context::host();
    let space = chain_space(&context, 2);
    let mut form = BilinearForm::new(&space);
    let mut integrator = ScalingIntegrator::new(1.0);
    integrator.fail_assembly = true;
    form.add_boundary_integrator(integrator).unwrap();

    let err = form.assemble().unwrap_err();
    assert!(matches!(
        err,
        OperatorError::Integrator {
            kind: IntegratorKind::Boundary,
            ..
        }
    ));
    assert!(std::error::Error::source(&err).is_some());
    assert!(!form.is_assembled());
}

#[test]
fn mixed_form_maps_trial_to_test_space() {
    let context = Context::host();
    let trial = chain_space(&context, 1);
    let test = ElementDofSpace::from_element_dofs(&context, 3, [[0, 1, 2]]).unwrap();
    let mut form = BilinearForm::new_mixed(&trial, &test);
    let matrix = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    form.add_domain_integrator(ElementMatrixIntegrator::new("mixed", FixedElementMatrices::new(vec![matrix])))
        .unwrap();
    form.assemble().unwrap();

    assert_eq!(form.in_layout().len(), 2);
    assert_eq!(form.out_layout().len(), 3);

    let x = DeviceVector::from_slice(&context, &[2.0, 3.0]);
    let mut y = DeviceVector::zeros(form.out_layout().clone());
    form.mult(&x, &mut y).unwrap();
    assert_eq!(y.as_slice(), &[2.0, 3.0, 5.0]);
}

#[test]
fn form_operator_without_prolongation_borrows_form() {
    let context = Context::host();
    let space = chain_space(&context, 4);
    let form = unit_laplace_form(&space);

    let op = form
        .form_operator(ConstraintSet::new(vec![0, 4], 5).unwrap())
        .unwrap();
    assert_eq!(op.ownership(), Ownership::Borrowed);
    assert_eq!(op.in_layout(), form.in_layout());
    assert_eq!(op.out_layout(), form.out_layout());
    assert!(std::ptr::addr_eq(op.inner(), &form));
}

#[test]
fn form_operator_with_prolongation_owns_composite() {
    let context = Context::host();
    // Global dofs 0 and 4 are the same true dof
    let space = chain_space(&context, 4)
        .with_dof_identification(&[0, 1, 2, 3, 0], 4)
        .unwrap();
    let form = unit_laplace_form(&space);

    let op = form.form_operator(ConstraintSet::new(vec![0], 4).unwrap()).unwrap();
    assert_eq!(op.ownership(), Ownership::Owned);
    assert_eq!(op.in_layout(), space.prolongation().unwrap().in_layout());
    assert_eq!(op.out_layout(), space.prolongation().unwrap().in_layout());
    assert_eq!(op.in_layout(), &Layout::host(4));
}

#[test]
fn form_operator_requires_test_prolongation_with_trial_prolongation() {
    let context = Context::host();
    let trial = chain_space(&context, 4)
        .with_dof_identification(&[0, 1, 2, 3, 0], 4)
        .unwrap();
    let test = chain_space(&context, 4);
    let form = BilinearForm::new_mixed(&trial, &test);
    assert!(matches!(
        form.form_operator(ConstraintSet::empty(4)),
        Err(OperatorError::InvalidArgument { arg: "test_space", .. })
    ));
}

#[test]
fn init_rhs_without_prolongation_aliases_and_eliminates() {
    let context = Context::host();
    let space = chain_space(&context, 4);
    let form = unit_laplace_form(&space);
    let op = form
        .form_operator(ConstraintSet::new(vec![0, 4], 5).unwrap())
        .unwrap();

    let mut x = DeviceVector::from_slice(&context, &[1.0, 9.0, 9.0, 9.0, 5.0]);
    let mut b = DeviceVector::zeros(Layout::host(5));
    {
        let system = form.init_rhs(&op, &mut x, &mut b, false).unwrap();
        assert!(system.is_aliased());
        assert_eq!(system.solution().as_slice(), &[1.0, 0.0, 0.0, 0.0, 5.0]);
        assert_eq!(system.rhs().as_slice(), &[1.0, 1.0, 0.0, 5.0, 5.0]);
        form.recover_solution(system).unwrap();
    }
    // The reduced vectors were the caller's vectors
    assert_eq!(x.as_slice(), &[1.0, 0.0, 0.0, 0.0, 5.0]);
    assert_eq!(b.as_slice(), &[1.0, 1.0, 0.0, 5.0, 5.0]);
}

#[test]
fn init_rhs_copy_interior_keeps_initial_guess() {
    let context = Context::host();
    let space = chain_space(&context, 4);
    let form = unit_laplace_form(&space);

    let mut x = DeviceVector::from_slice(&context, &[1.0, 9.0, 9.0, 9.0, 5.0]);
    let mut b = DeviceVector::zeros(Layout::host(5));
    let (_, system) = form
        .form_linear_system(ConstraintSet::new(vec![0, 4], 5).unwrap(), &mut x, &mut b, true)
        .unwrap();
    assert_eq!(system.solution().as_slice(), &[1.0, 9.0, 9.0, 9.0, 5.0]);
    assert_eq!(system.rhs().as_slice(), &[1.0, 1.0, 0.0, 5.0, 5.0]);
}

#[test]
fn init_rhs_with_prolongation_projects() {
    let context = Context::host();
    // True dofs are numbered in reverse
    let space = chain_space(&context, 4)
        .with_dof_identification(&[4, 3, 2, 1, 0], 5)
        .unwrap();
    let form = unit_laplace_form(&space);
    let op = form.form_operator(ConstraintSet::empty(5)).unwrap();

    let mut x = DeviceVector::from_slice(&context, &[1.0, 2.0, 3.0, 4.0, 5.0]);
    let mut b = DeviceVector::from_slice(&context, &[10.0, 20.0, 30.0, 40.0, 50.0]);
    let mut system = form.init_rhs(&op, &mut x, &mut b, true).unwrap();
    assert!(!system.is_aliased());
    assert_eq!(system.solution().as_slice(), &[5.0, 4.0, 3.0, 2.0, 1.0]);
    assert_eq!(system.rhs().as_slice(), &[50.0, 40.0, 30.0, 20.0, 10.0]);

    system.solution_mut().fill(-1.0);
    system.solution_mut().as_mut_slice()[0] = 7.0;
    form.recover_solution(system).unwrap();
    assert_eq!(x.as_slice(), &[-1.0, -1.0, -1.0, -1.0, 7.0]);
    assert_eq!(b.as_slice(), &[10.0, 20.0, 30.0, 40.0, 50.0]);
}

#[test]
fn recover_solution_into_explicit_buffer() {
    let context = Context::host();
    let space = chain_space(&context, 2)
        .with_dof_identification(&[0, 1, 0], 2)
        .unwrap();
    let form = BilinearForm::new(&space);

    let solution = DeviceVector::from_slice(&context, &[3.0, 4.0]);
    let mut x = DeviceVector::zeros(space.layout().clone());
    form.recover_solution_into(&solution, &mut x).unwrap();
    assert_eq!(x.as_slice(), &[3.0, 4.0, 3.0]);

    let plain = chain_space(&context, 2);
    let form = BilinearForm::new(&plain);
    let solution = DeviceVector::from_slice(&context, &[1.0, 2.0, 3.0]);
    let mut x = DeviceVector::zeros(plain.layout().clone());
    form.recover_solution_into(&solution, &mut x).unwrap();
    assert_eq!(x, solution);
}

proptest! {
    #[test]
    fn integrator_contributions_are_additive(x in device_vector(Context::host(), 5)) {
        let space = chain_space(&Context::host(), 4);
        let laplace = FixedElementMatrices::repeated(laplace_element_matrix(0.25), 4);
        let mass = FixedElementMatrices::repeated(DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]) / 24.0, 4);

        let apply = |assemblers: &[&FixedElementMatrices]| -> DVector<f64> {
            let mut form = BilinearForm::new(&space);
            for &assembler in assemblers {
                form.add_domain_integrator(ElementMatrixIntegrator::new("fixed", assembler.clone())).unwrap();
            }
            form.assemble().unwrap();
            let mut y = DeviceVector::zeros(space.layout().clone());
            form.mult(&x, &mut y).unwrap();
            y.into_dvector()
        };

        let both = apply(&[&laplace, &mass]);
        let separately = apply(&[&laplace]) + apply(&[&mass]);
        assert_matrix_eq!(both, separately, comp = abs, tol = 1e-9);
    }
}
