use crate::data::{ClassroomLayout, Constraint, StudentId};
use itertools::Itertools;
use log::{debug, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub info: CapacityInfo,
    /// Constraint `type` → number of occurrences.
    pub constraint_summary: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityInfo {
    pub total_seats: usize,
    pub students: usize,
    /// Negative when the class is larger than the room.
    pub available_seats: i64,
}

/// Validates capacity and row requirements against the classroom size.
pub fn validate(
    layout: ClassroomLayout,
    student_count: usize,
    constraints: &[Constraint],
) -> ValidationReport {
    let total_seats = layout.total_seats();
    let constraint_summary: BTreeMap<String, usize> = constraints
        .iter()
        .map(|c| c.kind().to_string())
        .counts()
        .into_iter()
        .collect();

    let mut report = ValidationReport {
        valid: true,
        errors: Vec::new(),
        warnings: Vec::new(),
        info: CapacityInfo {
            total_seats,
            students: student_count,
            available_seats: total_seats as i64 - student_count as i64,
        },
        constraint_summary,
    };

    if let Err(e) = layout.ensure_valid() {
        report.valid = false;
        report.errors.push(e.to_string());
        return report;
    }

    if student_count > total_seats {
        report.valid = false;
        report.errors.push(format!(
            "Not enough seats: {student_count} students but only {total_seats} seats"
        ));
        return report;
    }

    let front_row = students_with(constraints, |c| matches!(c, Constraint::MustFrontRow { .. }));
    let no_back_row = students_with(constraints, |c| matches!(c, Constraint::CannotBackRow { .. }));

    if front_row.len() > layout.columns as usize {
        report.warnings.push(format!(
            "Front row has only {} seats but {} students require it",
            layout.columns,
            front_row.len()
        ));
    }

    let outside_back_row = no_back_row.len() + front_row.len();
    let non_back_row_seats = (layout.rows as usize - 1) * layout.columns as usize;
    if outside_back_row > non_back_row_seats {
        report.warnings.push(format!(
            "Too many students excluding back row: {outside_back_row} students for \
             {non_back_row_seats} seats outside the back row - may be difficult to satisfy"
        ));
    }

    for (index, constraint) in constraints.iter().enumerate() {
        match constraint {
            Constraint::Unrecognized { kind } => report.warnings.push(format!(
                "unrecognized_constraint: constraint {index} has unknown type `{kind}` and will be ignored"
            )),
            c if c.is_soft() => report.warnings.push(format!(
                "unenforced_preference: constraint {index} ({}) is accepted but not enforced",
                c.kind()
            )),
            _ => {}
        }
    }

    for warning in &report.warnings {
        warn!("{warning}");
    }
    debug!(
        "Validated {} students against {} seats with {} constraints",
        student_count,
        total_seats,
        constraints.len()
    );

    report
}

fn students_with(
    constraints: &[Constraint],
    predicate: impl Fn(&Constraint) -> bool,
) -> BTreeSet<StudentId> {
    constraints
        .iter()
        .filter(|&c| predicate(c))
        .flat_map(Constraint::students)
        .collect()
}
