//! End-to-end tests of the multigrid preconditioner: hierarchy shapes
//! for pure h- and p-coarsening, linearity in the residual across all
//! smoother and coarse-solver combinations, and a convergence smoke
//! test on the Helmholtz subproblem.

use rustmg::communicator::SerialComm;
use rustmg::constraints::DirichletBc;
use rustmg::dof::{BOUNDARY_BOTTOM, BOUNDARY_LEFT, BOUNDARY_RIGHT, BOUNDARY_TOP};
use rustmg::element::Element;
use rustmg::grid::{DistributedMesh, SerialMesh};
use rustmg::matrix_free::MatrixFreeContext;
use rustmg::multigrid::{
    CoarseGridSolverType, LevelInfo, MultigridData, MultigridPreconditioner, MultigridType,
    SmootherType,
};
use rustmg::operator::{HelmholtzOperator, MultigridOperator};
use rustmg::types::DofVector;
use std::rc::Rc;

fn mesh(levels: usize) -> Rc<DistributedMesh> {
    let mut m = SerialMesh::unit_square();
    m.refine_global(levels);
    Rc::new(DistributedMesh::from_serial(m, 1))
}

fn all_boundaries() -> DirichletBc {
    [BOUNDARY_LEFT, BOUNDARY_RIGHT, BOUNDARY_BOTTOM, BOUNDARY_TOP]
        .iter()
        .copied()
        .collect()
}

fn helmholtz(ctx: &Rc<MatrixFreeContext>, _level: &LevelInfo) -> HelmholtzOperator {
    HelmholtzOperator::new(Rc::clone(ctx), 1.0)
}

#[test]
fn pure_h_hierarchy_on_twice_refined_square() {
    let data = MultigridData::default();
    let pre = MultigridPreconditioner::new(
        &data,
        &mesh(2),
        &Element::new(2, true, 1),
        None,
        None,
        &SerialComm,
        helmholtz,
    );

    assert_eq!(pre.n_levels(), 3);
    for (h, level) in pre.levels().iter().enumerate() {
        assert_eq!(level.h_level, h);
        assert_eq!(level.degree(), 2);
        assert!(level.is_dg());
    }
}

#[test]
fn pure_p_hierarchy_bisects_from_degree_seven() {
    let mut data = MultigridData::default();
    data.mg_type = MultigridType::PMG;
    let pre = MultigridPreconditioner::new(
        &data,
        &mesh(1),
        &Element::new(7, true, 1),
        None,
        None,
        &SerialComm,
        helmholtz,
    );

    let degrees: Vec<usize> = pre.levels().iter().map(|l| l.degree()).collect();
    assert_eq!(degrees, vec![1, 3, 7]);
    // p-coarsening stays on the finest mesh level
    assert!(pre.levels().iter().all(|l| l.h_level == 1));
}

#[test]
fn vcycle_of_zero_is_zero_for_every_smoother_and_coarse_solver() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bc = all_boundaries();
    let smoothers = [
        SmootherType::Chebyshev,
        SmootherType::Jacobi,
        SmootherType::Cg,
        SmootherType::Gmres,
    ];
    let coarse_solvers = [
        CoarseGridSolverType::Chebyshev,
        CoarseGridSolverType::Cg,
        CoarseGridSolverType::Gmres,
        CoarseGridSolverType::Amg,
    ];

    for &smoother in smoothers.iter() {
        for &coarse in coarse_solvers.iter() {
            let mut data = MultigridData::default();
            data.smoother_data.smoother = smoother;
            data.coarse_problem.solver = coarse;

            let mut pre = MultigridPreconditioner::new(
                &data,
                &mesh(2),
                &Element::new(2, false, 1),
                Some(&bc),
                Some(&[]),
                &SerialComm,
                helmholtz,
            );

            let n = pre.n_dofs();
            let src = DofVector::zeros(n);
            let mut dst = DofVector::from_elem(n, 1.0);
            pre.vmult(&mut dst, &src);
            assert!(
                dst.iter().all(|&x| x == 0.0),
                "nonzero correction from zero residual for {:?}/{:?}",
                smoother,
                coarse
            );
        }
    }
}

#[test]
fn preconditioned_cg_reduces_the_helmholtz_residual() {
    let _ = env_logger::builder().is_test(true).try_init();
    let data = MultigridData::default();
    let bc = all_boundaries();
    let mut pre = MultigridPreconditioner::new(
        &data,
        &mesh(3),
        &Element::new(2, false, 1),
        Some(&bc),
        Some(&[]),
        &SerialComm,
        helmholtz,
    );

    let fine = Rc::clone(pre.context(pre.n_levels() - 1));
    let op = HelmholtzOperator::new(Rc::clone(&fine), 1.0);
    let n = op.n_dofs();

    let mut b = DofVector::from_iter((0..n).map(|i| (i % 7) as f64 - 3.0));
    fine.constraints.set_zero(&mut b);
    let norm_b = b.dot(&b).sqrt();

    // flexible conjugate gradients with one V-cycle per preconditioner
    // application (Polak-Ribiere update, since the V-cycle is not an
    // exactly symmetric operator)
    let mut x = DofVector::zeros(n);
    let mut r = b.clone();
    let mut z = DofVector::zeros(n);
    pre.vmult(&mut z, &r);
    let mut p = z.clone();
    let mut rz = r.dot(&z);
    let mut q = DofVector::zeros(n);

    let mut iterations = 0;
    for _ in 0..40 {
        op.vmult(&mut q, &p);
        let alpha = rz / p.dot(&q);
        x.scaled_add(alpha, &p);
        let r_old = r.clone();
        r.scaled_add(-alpha, &q);
        iterations += 1;
        if r.dot(&r).sqrt() <= 1e-8 * norm_b {
            break;
        }
        pre.vmult(&mut z, &r);
        let rz_new = z.dot(&(&r - &r_old));
        let beta = (rz_new / rz).max(0.0);
        rz = r.dot(&z);
        p.zip_mut_with(&z, |pi, zi| *pi = zi + beta * *pi);
    }

    let norm_r = r.dot(&r).sqrt();
    assert!(
        norm_r <= 1e-6 * norm_b,
        "residual {:e} after {} iterations",
        norm_r,
        iterations
    );
}

#[test]
fn hp_hierarchy_combines_mesh_and_degree_coarsening() {
    let mut data = MultigridData::default();
    data.mg_type = MultigridType::PhMG;
    let mut pre = MultigridPreconditioner::new(
        &data,
        &mesh(2),
        &Element::new(4, true, 1),
        None,
        None,
        &SerialComm,
        helmholtz,
    );

    let shape: Vec<(usize, usize)> = pre
        .levels()
        .iter()
        .map(|l| (l.h_level, l.degree()))
        .collect();
    assert_eq!(shape, vec![(0, 1), (1, 1), (2, 1), (2, 2), (2, 4)]);

    let n = pre.n_dofs();
    let src = DofVector::zeros(n);
    let mut dst = DofVector::from_elem(n, -4.0);
    pre.vmult(&mut dst, &src);
    assert!(dst.iter().all(|&x| x == 0.0));
}
