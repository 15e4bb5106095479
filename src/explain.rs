use crate::data::{Constraint, SeatingChart};
use crate::error::Result;
use log::debug;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintExplanation {
    pub constraint: String,
    pub satisfied: bool,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplanationReport {
    pub all_constraints_satisfied: bool,
    pub total_constraints: usize,
    pub explanations: Vec<ConstraintExplanation>,
    /// Declared constraints with no entry: soft preferences, unknown types,
    /// or rules naming a student who is not on the chart.
    pub unchecked: Vec<String>,
    pub summary: String,
}

impl ExplanationReport {
    pub fn satisfied_count(&self) -> usize {
        self.explanations.iter().filter(|e| e.satisfied).count()
    }
}

/// Explains, per constraint, whether the chart satisfies it, working from
/// seat positions alone. Ragged charts and repeated students are errors.
pub fn explain(chart: &SeatingChart, constraints: &[Constraint]) -> Result<ExplanationReport> {
    let layout = chart.layout()?;
    let positions = chart.positions()?;

    let mut explanations = Vec::new();
    let mut unchecked = Vec::new();

    for constraint in constraints {
        let entry = match *constraint {
            Constraint::CannotSitTogether { student1, student2 } => {
                match (positions.get(&student1), positions.get(&student2)) {
                    (Some(p1), Some(p2)) => {
                        let distance = p1.distance(*p2);
                        Some((
                            distance > 1,
                            format!("They are {distance} seats apart (row/col distance)"),
                        ))
                    }
                    _ => None,
                }
            }
            Constraint::MustFrontRow { student } => positions.get(&student).map(|&seat| {
                (
                    layout.is_front_row(seat),
                    format!("Seated in {seat}"),
                )
            }),
            Constraint::CannotBackRow { student } => positions.get(&student).map(|&seat| {
                let satisfied = !layout.is_back_row(seat);
                let note = if satisfied { "not back row" } else { "back row" };
                (satisfied, format!("Seated in row {} ({note})", seat.row + 1))
            }),
            Constraint::CannotByWindow { student } => positions.get(&student).map(|&seat| {
                let satisfied = !layout.is_by_window(seat);
                let note = if satisfied { "away from the window" } else { "window column" };
                (satisfied, format!("Seated in column {} ({note})", seat.column + 1))
            }),
            Constraint::CannotByDoor { student } => positions.get(&student).map(|&seat| {
                let satisfied = !layout.is_by_door(seat);
                let note = if satisfied { "away from the door" } else { "door column" };
                (satisfied, format!("Seated in column {} ({note})", seat.column + 1))
            }),
            _ => None,
        };

        match entry {
            Some((satisfied, explanation)) => explanations.push(ConstraintExplanation {
                constraint: constraint.to_string(),
                satisfied,
                explanation,
            }),
            None => unchecked.push(constraint.to_string()),
        }
    }

    let satisfied = explanations.iter().filter(|e| e.satisfied).count();
    let report = ExplanationReport {
        all_constraints_satisfied: explanations.iter().all(|e| e.satisfied),
        total_constraints: constraints.len(),
        summary: format!(
            "Successfully satisfied {satisfied} out of {} constraints",
            constraints.len()
        ),
        explanations,
        unchecked,
    };
    debug!(
        "Explained {} constraints: {} checked, {} unchecked",
        report.total_constraints,
        report.explanations.len(),
        report.unchecked.len()
    );
    Ok(report)
}
