//! Level sequencing over mesh size, degree and continuity
//!
//! Expands a multigrid configuration into the coarse-to-fine list of
//! levels the preconditioner operates on. The level list obeys one
//! hard rule: two consecutive levels differ in exactly one of mesh
//! level, polynomial degree or continuity, so that every transfer is
//! a pure h-, p- or c-transfer.
//!
//! Example for `PhMG` with three mesh levels and degree 7 (bisection):
//!
//! ```text
//! level  h_level  degree
//! 4      2        7
//! 3      1        7
//! 2      0        7
//! 1      0        3
//! 0      0        1
//! ```

use super::data::{MultigridData, MultigridType, PSequenceType};

/// Discretization signature of a level: these two attributes decide
/// which dof handler a level can share
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DofHandlerId {
    /// Polynomial degree
    pub degree: usize,
    /// Discontinuous or continuous space
    pub is_dg: bool,
}

impl DofHandlerId {
    /// Signature from degree and continuity
    pub fn new(degree: usize, is_dg: bool) -> Self {
        Self { degree, is_dg }
    }
}

/// One multigrid level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelInfo {
    /// Mesh level within the geometric hierarchy
    pub h_level: usize,
    /// Degree and continuity of this level
    pub id: DofHandlerId,
}

impl LevelInfo {
    /// Polynomial degree of this level
    pub fn degree(&self) -> usize {
        self.id.degree
    }

    /// Whether this level uses a discontinuous space
    pub fn is_dg(&self) -> bool {
        self.id.is_dg
    }
}

fn next_degree(p: usize, degree: usize, sequence: PSequenceType) -> usize {
    match sequence {
        PSequenceType::GoToOne => 1,
        PSequenceType::DecreaseByOne => (p - 1).max(1),
        PSequenceType::Bisect => (p / 2).max(1),
        PSequenceType::Manual => {
            if degree == 3 && p == 3 {
                2
            } else {
                (degree / 2).max(1)
            }
        }
    }
}

/// Expand the configuration into the coarse-to-fine level list plus
/// the distinct coarse-to-fine degree/continuity signatures.
///
/// `n_h_levels` is the number of available mesh levels; the finest
/// level uses mesh level `n_h_levels - 1`, element degree `degree` and
/// continuity `is_dg`.
///
/// # Panics
/// If `n_h_levels` is zero, if a continuity-coarsening type is
/// combined with a continuous fine-level space, or if the resulting
/// sequence would violate the one-transfer-per-level rule.
pub fn sequence_levels(
    n_h_levels: usize,
    degree: usize,
    is_dg: bool,
    data: &MultigridData,
) -> (Vec<LevelInfo>, Vec<DofHandlerId>) {
    assert!(n_h_levels > 0, "mesh hierarchy is empty");
    let mg_type = data.mg_type;
    if mg_type.involves_c_transfer() {
        assert!(
            is_dg,
            "continuity coarsening requires a discontinuous fine-level space"
        );
    }

    // h-levels
    let h_levels: Vec<usize> = if matches!(
        mg_type,
        MultigridType::PMG | MultigridType::CpMG | MultigridType::PcMG
    ) {
        vec![n_h_levels - 1]
    } else {
        (0..n_h_levels).collect()
    };

    // p-levels, built fine-to-coarse and then reversed
    let mut p_levels: Vec<DofHandlerId> = Vec::new();
    match mg_type {
        MultigridType::HMG => {
            p_levels.push(DofHandlerId::new(degree, is_dg));
        }
        MultigridType::ChMG | MultigridType::HcMG => {
            p_levels.push(DofHandlerId::new(degree, false));
            p_levels.push(DofHandlerId::new(degree, is_dg));
        }
        _ => {
            let mut p = degree;
            let mut discontinuous = is_dg;

            // c-transfer before p-coarsening
            if is_dg
                && matches!(
                    mg_type,
                    MultigridType::CpMG
                        | MultigridType::HcpMG
                        | MultigridType::ChpMG
                        | MultigridType::CphMG
                )
            {
                p_levels.push(DofHandlerId::new(p, discontinuous));
                discontinuous = false;
            }

            loop {
                p_levels.push(DofHandlerId::new(p, discontinuous));
                p = next_degree(p, degree, data.p_sequence);
                if p == p_levels.last().expect("nonempty").degree {
                    break;
                }
            }

            // c-transfer after p-coarsening
            if is_dg
                && matches!(
                    mg_type,
                    MultigridType::PcMG
                        | MultigridType::HpcMG
                        | MultigridType::PhcMG
                        | MultigridType::PchMG
                )
            {
                p_levels.push(DofHandlerId::new(p, false));
            }

            p_levels.reverse();
        }
    }

    // combine into the coarse-to-fine global level list
    let mut level_info: Vec<LevelInfo> = Vec::new();
    let push = |levels: &mut Vec<LevelInfo>, h_level: usize, id: DofHandlerId| {
        levels.push(LevelInfo { h_level, id });
    };
    match mg_type {
        MultigridType::HMG => {
            for &h in &h_levels {
                push(&mut level_info, h, p_levels[0]);
            }
        }
        MultigridType::ChMG => {
            for &h in &h_levels {
                push(&mut level_info, h, p_levels[0]);
            }
            push(
                &mut level_info,
                *h_levels.last().expect("nonempty"),
                *p_levels.last().expect("nonempty"),
            );
        }
        MultigridType::HcMG => {
            push(&mut level_info, h_levels[0], p_levels[0]);
            for &h in &h_levels {
                push(&mut level_info, h, *p_levels.last().expect("nonempty"));
            }
        }
        MultigridType::PMG | MultigridType::PcMG | MultigridType::CpMG => {
            for &id in &p_levels {
                push(&mut level_info, h_levels[0], id);
            }
        }
        MultigridType::PhMG | MultigridType::CphMG | MultigridType::PchMG => {
            for &h in &h_levels[..h_levels.len() - 1] {
                push(&mut level_info, h, p_levels[0]);
            }
            let h_back = *h_levels.last().expect("nonempty");
            for &id in &p_levels {
                push(&mut level_info, h_back, id);
            }
        }
        MultigridType::HpMG | MultigridType::HcpMG | MultigridType::HpcMG => {
            for &id in &p_levels[..p_levels.len() - 1] {
                push(&mut level_info, h_levels[0], id);
            }
            let p_back = *p_levels.last().expect("nonempty");
            for &h in &h_levels {
                push(&mut level_info, h, p_back);
            }
        }
        MultigridType::PhcMG => {
            push(&mut level_info, h_levels[0], p_levels[0]);
            for &h in &h_levels[..h_levels.len() - 1] {
                push(&mut level_info, h, p_levels[1]);
            }
            let h_back = *h_levels.last().expect("nonempty");
            for &id in &p_levels[1..] {
                push(&mut level_info, h_back, id);
            }
        }
        MultigridType::ChpMG => {
            for &id in &p_levels[..p_levels.len() - 2] {
                push(&mut level_info, h_levels[0], id);
            }
            let id_mid = p_levels[p_levels.len() - 2];
            for &h in &h_levels {
                push(&mut level_info, h, id_mid);
            }
            push(
                &mut level_info,
                *h_levels.last().expect("nonempty"),
                *p_levels.last().expect("nonempty"),
            );
        }
    }

    check_levels(&level_info);
    (level_info, p_levels)
}

/// Verify that consecutive levels differ in exactly one attribute.
///
/// # Panics
/// On the first level pair violating the rule.
pub fn check_levels(level_info: &[LevelInfo]) {
    for l in 1..level_info.len() {
        let fine = &level_info[l];
        let coarse = &level_info[l - 1];
        let n_changes = usize::from(fine.h_level != coarse.h_level)
            + usize::from(fine.degree() != coarse.degree())
            + usize::from(fine.is_dg() != coarse.is_dg());
        assert!(
            n_changes == 1,
            "between levels {} and {} exactly one of mesh level, degree and \
             continuity must change, found {} changes",
            l - 1,
            l,
            n_changes
        );
    }
}
