use crate::data::{ClassroomLayout, Constraint, Seat, Student, StudentId};
use crate::error::{Result, SeatingError};
use itertools::iproduct;
use log::{info, trace, warn};
use serde::Serialize;
use std::collections::HashSet;

pub type VarId = usize;

/// `x[student, seat]`: 1 if the student sits in the seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
    pub id: VarId,
    /// Index into [`ConstraintModel::students`].
    pub student: usize,
    pub seat: Seat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Le,
}

/// Where a model constraint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    SeatPerStudent(StudentId),
    StudentPerSeat(Seat),
    /// Index into the declared constraint list.
    Declared(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelConstraint {
    /// `Σ vars (relation) rhs`
    Linear {
        vars: Vec<VarId>,
        relation: Relation,
        rhs: u32,
        origin: Origin,
    },
    /// `¬a ∨ ¬b`
    NotBoth { a: VarId, b: VarId, origin: Origin },
}

/// Non-blocking notice raised while compiling the declared constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelWarning {
    pub code: &'static str,
    pub constraint_index: usize,
    pub message: String,
}

/// A soft preference that was accepted but contributes nothing to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnenforcedConstraint {
    pub constraint_index: usize,
    pub constraint_type: String,
    pub student: StudentId,
    pub reason: &'static str,
}

#[derive(Debug, Clone)]
pub struct ConstraintModel {
    pub layout: ClassroomLayout,
    pub students: Vec<Student>,
    /// Student-major: `variables[s * seats + seat_index]`.
    pub variables: Vec<Variable>,
    pub constraints: Vec<ModelConstraint>,
    pub warnings: Vec<ModelWarning>,
    pub unenforced: Vec<UnenforcedConstraint>,
}

impl ConstraintModel {
    pub fn var(&self, student: usize, seat: Seat) -> VarId {
        student * self.layout.total_seats() + self.layout.index_of(seat)
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id]
    }

    fn vars_where(&self, student: usize, keep: impl Fn(Seat) -> bool) -> Vec<VarId> {
        self.layout
            .seats()
            .filter(|&seat| keep(seat))
            .map(|seat| self.var(student, seat))
            .collect()
    }
}

/// Builds the constraint model for one seating request.
///
/// Fails on structural problems: empty dimensions, duplicate student ids,
/// constraints that reference students outside the class.
pub fn build(
    layout: ClassroomLayout,
    students: &[Student],
    constraints: &[Constraint],
) -> Result<ConstraintModel> {
    layout.ensure_valid()?;

    let mut seen = HashSet::new();
    for student in students {
        if !seen.insert(student.id) {
            return Err(SeatingError::DuplicateStudent(student.id));
        }
    }
    let index_of = |id: StudentId| students.iter().position(|s| s.id == id);

    info!(
        "Setting up seating model with {} students, {}x{} seats and {} constraints...",
        students.len(),
        layout.rows,
        layout.columns,
        constraints.len()
    );

    let seat_list: Vec<Seat> = layout.seats().collect();
    let variables: Vec<Variable> = iproduct!(0..students.len(), seat_list.iter().copied())
        .enumerate()
        .map(|(id, (student, seat))| Variable { id, student, seat })
        .collect();
    trace!("Generated {} seat-choice variables.", variables.len());

    let mut model = ConstraintModel {
        layout,
        students: students.to_vec(),
        variables,
        constraints: Vec::new(),
        warnings: Vec::new(),
        unenforced: Vec::new(),
    };

    info!("Adding 'one seat per student' constraints...");
    for (s, student) in students.iter().enumerate() {
        let vars = model.vars_where(s, |_| true);
        model.constraints.push(ModelConstraint::Linear {
            vars,
            relation: Relation::Eq,
            rhs: 1,
            origin: Origin::SeatPerStudent(student.id),
        });
    }

    info!("Adding 'one student per seat' constraints...");
    for &seat in &seat_list {
        let vars = (0..students.len()).map(|s| model.var(s, seat)).collect();
        model.constraints.push(ModelConstraint::Linear {
            vars,
            relation: Relation::Le,
            rhs: 1,
            origin: Origin::StudentPerSeat(seat),
        });
    }

    info!("Adding declared placement constraints...");
    for (index, constraint) in constraints.iter().enumerate() {
        let mut resolved = Vec::new();
        for id in constraint.students() {
            let s = index_of(id).ok_or_else(|| SeatingError::UnknownStudent {
                index,
                kind: constraint.kind().to_string(),
                student: id,
            })?;
            resolved.push(s);
        }
        let origin = Origin::Declared(index);

        match constraint {
            Constraint::CannotSitTogether { student1, .. } => {
                let (a, b) = (resolved[0], resolved[1]);
                if a == b {
                    return Err(SeatingError::SelfPair {
                        index,
                        kind: constraint.kind().to_string(),
                        student: *student1,
                    });
                }
                // Both (p, q) and (q, p) are visited, so the exclusion holds in
                // either direction.
                for &p in &seat_list {
                    for q in p.neighbors(&layout) {
                        let (va, vb) = (model.var(a, p), model.var(b, q));
                        model.constraints.push(ModelConstraint::NotBoth {
                            a: va,
                            b: vb,
                            origin,
                        });
                    }
                }
            }
            Constraint::MustFrontRow { .. } => {
                let vars = model.vars_where(resolved[0], |seat| layout.is_front_row(seat));
                model.constraints.push(ModelConstraint::Linear {
                    vars,
                    relation: Relation::Eq,
                    rhs: 1,
                    origin,
                });
            }
            Constraint::CannotBackRow { .. } => {
                let vars = model.vars_where(resolved[0], |seat| layout.is_back_row(seat));
                model.constraints.push(forbid(vars, origin));
            }
            Constraint::CannotByWindow { .. } => {
                let vars = model.vars_where(resolved[0], |seat| layout.is_by_window(seat));
                model.constraints.push(forbid(vars, origin));
            }
            Constraint::CannotByDoor { .. } => {
                let vars = model.vars_where(resolved[0], |seat| layout.is_by_door(seat));
                model.constraints.push(forbid(vars, origin));
            }
            Constraint::NearDoor { student } | Constraint::NearWindow { student } => {
                model.unenforced.push(UnenforcedConstraint {
                    constraint_index: index,
                    constraint_type: constraint.kind().to_string(),
                    student: *student,
                    reason: "soft preferences are accepted but not yet enforced",
                });
            }
            Constraint::Unrecognized { kind } => {
                warn!("Ignoring constraint {index} with unrecognized type `{kind}`");
                model.warnings.push(ModelWarning {
                    code: "unrecognized_constraint",
                    constraint_index: index,
                    message: format!("Constraint type `{kind}` is not recognized and was ignored"),
                });
            }
        }
    }

    info!(
        "Model ready: {} variables, {} constraints, {} unenforced, {} warnings.",
        model.variables.len(),
        model.constraints.len(),
        model.unenforced.len(),
        model.warnings.len()
    );
    Ok(model)
}

fn forbid(vars: Vec<VarId>, origin: Origin) -> ModelConstraint {
    ModelConstraint::Linear {
        vars,
        relation: Relation::Eq,
        rhs: 0,
        origin,
    }
}
