//! # `rustmg`: hp-multigrid preconditioners for high-order discretizations
//!
//! Geometric and polynomial multigrid infrastructure: level sequencing
//! over mesh size, polynomial degree and element continuity,
//! coarse-mesh construction with process-count shrinking, intergrid
//! transfer operators, Chebyshev/Jacobi/Krylov smoothers, coarse-grid
//! solvers (Chebyshev, CG, GMRES, algebraic multigrid) and the V-cycle
//! assembling them into a preconditioner for iterative solves.
//!
//! The preconditioner is generic over the discrete operator: any type
//! implementing [`operator::MultigridOperator`] can be placed on the
//! levels. A matrix-free Helmholtz operator on the unit square,
//! [`operator::HelmholtzOperator`], is included and used by the test
//! suite.
//!
//! ## Coarsening strategies
//!
//! Fourteen level sequences are supported, combining coarsening in
//! mesh size (`h`), polynomial degree (`p`) and continuity (`c`,
//! discontinuous to continuous), see
//! [`multigrid::MultigridType`]. Adjacent levels always differ in
//! exactly one of the three.
//!
//! # Example
//! Build an h-multigrid hierarchy for a discontinuous discretization
//! and apply one V-cycle:
//! ```
//! use rustmg::communicator::SerialComm;
//! use rustmg::element::Element;
//! use rustmg::grid::{DistributedMesh, SerialMesh};
//! use rustmg::multigrid::{MultigridData, MultigridPreconditioner};
//! use rustmg::operator::HelmholtzOperator;
//! use rustmg::types::DofVector;
//! use std::rc::Rc;
//!
//! let mut mesh = SerialMesh::unit_square();
//! mesh.refine_global(3);
//! let mesh = Rc::new(DistributedMesh::from_serial(mesh, 1));
//!
//! let data = MultigridData::default();
//! let mut preconditioner = MultigridPreconditioner::new(
//!     &data,
//!     &mesh,
//!     &Element::new(3, true, 1),
//!     None,
//!     None,
//!     &SerialComm,
//!     |ctx, _level| HelmholtzOperator::new(Rc::clone(ctx), 1.0),
//! );
//!
//! let b = DofVector::from_elem(preconditioner.n_dofs(), 1.0);
//! let mut z = DofVector::zeros(b.len());
//! preconditioner.vmult(&mut z, &b);
//! ```
//!
//! ## MPI
//!
//! The coarse-grid gather/redistribute machinery runs on an abstract
//! [`communicator::Communicator`]. The default
//! [`communicator::SerialComm`] executes the identical collective call
//! sequence on a single rank; enable the `mpi` cargo feature for a
//! real MPI-backed communicator.
//!
//! ## Documentation
//!
//! Download and run:
//!
//! `cargo doc --open`
#![warn(missing_docs)]
#![allow(clippy::unnecessary_cast)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
pub mod communicator;
pub mod constraints;
pub mod dof;
pub mod element;
pub mod grid;
pub mod matrix_free;
pub mod multigrid;
pub mod operator;
pub mod solver;
pub mod timer;
pub mod types;

pub use communicator::{Communicator, SerialComm};
pub use element::Element;
pub use grid::{DistributedMesh, SerialMesh};
pub use matrix_free::MatrixFreeContext;
pub use multigrid::{MultigridData, MultigridPreconditioner, MultigridType};
pub use operator::{HelmholtzOperator, MultigridOperator};
pub use timer::TimerTree;
pub use types::DofVector;
