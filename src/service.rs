use crate::data::{ClassroomLayout, Constraint, SeatingChart, Student};
use crate::error::Result;
use crate::explain::{self, ExplanationReport};
use crate::model::{self, ModelWarning, UnenforcedConstraint};
use crate::solver::{self, SearchLimits, SolveStatus, StopReason};
use crate::validator::{self, ValidationReport};
use log::{info, warn};
use serde::{Deserialize, Serialize};

pub const INFEASIBLE_MESSAGE: &str = "Could not find a valid seating arrangement with the \
     given constraints. Try relaxing some constraints.";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidateRequest {
    pub classroom_size: ClassroomLayout,
    pub num_students: usize,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OptimizeRequest {
    #[serde(default)]
    pub classroom_layout: ClassroomLayout,
    pub students: Vec<Student>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExplainRequest {
    pub seating_chart: SeatingChart,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub solve_time_seconds: f64,
    /// Hard constraints confirmed by re-checking the produced chart.
    pub constraints_satisfied: usize,
    pub nodes_explored: u64,
    pub backtracks: u64,
    pub exhaustive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizeResponse {
    pub success: bool,
    pub status: SolveStatus,
    pub seating_chart: Option<SeatingChart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<ClassroomLayout>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set when a limit ended the search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped: Option<StopReason>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ModelWarning>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unenforced: Vec<UnenforcedConstraint>,
}

impl OptimizeResponse {
    fn infeasible(message: String) -> Self {
        Self {
            success: false,
            status: SolveStatus::Infeasible,
            seating_chart: None,
            layout: None,
            statistics: None,
            message: Some(message),
            stopped: None,
            warnings: Vec::new(),
            unenforced: Vec::new(),
        }
    }
}

pub fn validate_constraints(request: &ValidateRequest) -> ValidationReport {
    validator::validate(
        request.classroom_size,
        request.num_students,
        &request.constraints,
    )
}

/// Validates, builds, solves and cross-checks one seating request.
///
/// Structural input problems come back as `Err`; capacity and constraint
/// infeasibility are regular responses with `success: false`.
pub fn optimize_seating(
    request: &OptimizeRequest,
    limits: &SearchLimits,
) -> Result<OptimizeResponse> {
    let layout = request.classroom_layout;
    layout.ensure_valid()?;
    if let Some(limit) = limits.max_seat_choices {
        layout.ensure_fits(request.students.len(), limit)?;
    }

    let report = validator::validate(layout, request.students.len(), &request.constraints);
    if !report.valid {
        warn!("Request rejected before solving: {}", report.errors.join("; "));
        return Ok(OptimizeResponse::infeasible(report.errors.join("; ")));
    }

    let model = model::build(layout, &request.students, &request.constraints)?;
    let result = solver::solve(&model, limits)?;

    let Some(assignment) = result.assignment else {
        let message = match result.stopped {
            Some(reason) => format!(
                "Search stopped ({}) after {} nodes before any arrangement was found; the \
                 constraints were not proven impossible. Try relaxing some constraints or \
                 allowing more time.",
                stop_label(reason),
                result.stats.nodes_explored
            ),
            None => INFEASIBLE_MESSAGE.to_string(),
        };
        let mut response = OptimizeResponse::infeasible(message);
        response.stopped = result.stopped;
        response.warnings = model.warnings;
        response.unenforced = model.unenforced;
        return Ok(response);
    };

    let chart = SeatingChart::from_assignment(&layout, &request.students, &assignment)?;
    let check = explain::explain(&chart, &request.constraints)?;
    if !check.all_constraints_satisfied {
        warn!("Produced chart fails its own cross-check: {}", check.summary);
    }
    info!(
        "Seated {} students ({:?}), {} constraints confirmed.",
        assignment.len(),
        result.status,
        check.satisfied_count()
    );

    Ok(OptimizeResponse {
        success: true,
        status: result.status,
        seating_chart: Some(chart),
        layout: Some(layout),
        statistics: Some(Statistics {
            solve_time_seconds: result.stats.solve_time.as_secs_f64(),
            constraints_satisfied: check.satisfied_count(),
            nodes_explored: result.stats.nodes_explored,
            backtracks: result.stats.backtracks,
            exhaustive: result.stats.exhaustive,
        }),
        message: None,
        stopped: result.stopped,
        warnings: model.warnings,
        unenforced: model.unenforced,
    })
}

pub fn explain_solution(request: &ExplainRequest) -> Result<ExplanationReport> {
    explain::explain(&request.seating_chart, &request.constraints)
}

fn stop_label(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Deadline => "time limit reached",
        StopReason::NodeLimit => "node limit reached",
        StopReason::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SeatingError;
    use serde_json::json;

    fn optimize(value: serde_json::Value) -> Result<OptimizeResponse> {
        let request: OptimizeRequest = serde_json::from_value(value).unwrap();
        optimize_seating(&request, &SearchLimits::unbounded())
    }

    #[test]
    fn test_three_students_in_two_by_two() {
        let response = optimize(json!({
            "classroom_layout": {"rows": 2, "columns": 2},
            "students": [
                {"id": 1, "name": "Ada"},
                {"id": 2, "name": "Ben"},
                {"id": 3, "name": "Cleo"}
            ],
            "constraints": []
        }))
        .unwrap();

        assert!(response.success);
        assert_eq!(response.status, SolveStatus::Optimal);
        let chart = response.seating_chart.unwrap();
        assert_eq!(chart.empty_seats(), 1);
        assert_eq!(response.layout, Some(ClassroomLayout::new(2, 2)));
    }

    #[test]
    fn test_over_capacity_is_reported_without_solving() {
        let response = optimize(json!({
            "classroom_layout": {"rows": 1, "columns": 1},
            "students": [{"id": 1, "name": "Ada"}, {"id": 2, "name": "Ben"}]
        }))
        .unwrap();

        assert!(!response.success);
        assert_eq!(response.status, SolveStatus::Infeasible);
        assert!(response.statistics.is_none());
        let message = response.message.unwrap();
        assert!(message.contains("2 students") && message.contains("1 seats"));
    }

    #[test]
    fn test_contradictory_constraints_are_infeasible() {
        let response = optimize(json!({
            "classroom_layout": {"rows": 2, "columns": 1},
            "students": [{"id": 1, "name": "Ada"}],
            "constraints": [
                {"type": "must_front_row", "student": 1},
                {"type": "cannot_by_door", "student": 1}
            ]
        }))
        .unwrap();

        assert!(!response.success);
        assert_eq!(response.status, SolveStatus::Infeasible);
        assert_eq!(response.message.as_deref(), Some(INFEASIBLE_MESSAGE));
        assert!(response.seating_chart.is_none());
    }

    #[test]
    fn test_time_bounded_infeasible_is_distinguished() {
        let request: OptimizeRequest = serde_json::from_value(json!({
            "classroom_layout": {"rows": 3, "columns": 3},
            "students": [{"id": 1, "name": "Ada"}, {"id": 2, "name": "Ben"}]
        }))
        .unwrap();
        let limits = SearchLimits::unbounded().with_max_nodes(0);
        let response = optimize_seating(&request, &limits).unwrap();

        assert_eq!(response.status, SolveStatus::Infeasible);
        assert_eq!(response.stopped, Some(StopReason::NodeLimit));
        assert!(response.message.unwrap().contains("not proven impossible"));
    }

    #[test]
    fn test_statistics_and_metadata() {
        let response = optimize(json!({
            "classroom_layout": {"rows": 3, "columns": 3},
            "students": [
                {"id": 1, "name": "Ada"},
                {"id": 2, "name": "Ben"},
                {"id": 3, "name": "Cleo"}
            ],
            "constraints": [
                {"type": "cannot_sit_together", "student1": 1, "student2": 2},
                {"type": "must_front_row", "student": 3},
                {"type": "near_window", "student": 2},
                {"type": "needs_quiet_area", "student": 1}
            ]
        }))
        .unwrap();

        assert!(response.success);
        let stats = response.statistics.unwrap();
        assert_eq!(stats.constraints_satisfied, 2);
        assert!(stats.exhaustive);
        assert_eq!(response.unenforced.len(), 1);
        assert_eq!(response.warnings.len(), 1);
        assert_eq!(response.warnings[0].code, "unrecognized_constraint");
    }

    #[test]
    fn test_unknown_student_is_an_error() {
        let err = optimize(json!({
            "classroom_layout": {"rows": 2, "columns": 2},
            "students": [{"id": 1, "name": "Ada"}],
            "constraints": [{"type": "cannot_back_row", "student": 5}]
        }))
        .unwrap_err();

        assert!(matches!(err, SeatingError::UnknownStudent { student: 5, .. }));
    }

    #[test]
    fn test_zero_dimensions_is_an_error() {
        let err = optimize(json!({
            "classroom_layout": {"rows": 0, "columns": 3},
            "students": []
        }))
        .unwrap_err();
        assert!(matches!(err, SeatingError::InvalidDimensions { rows: 0, columns: 3 }));
    }

    #[test]
    fn test_oversized_room_is_an_error() {
        let students: Vec<serde_json::Value> = (1..=100)
            .map(|id| json!({"id": id, "name": format!("S{id}")}))
            .collect();
        let request: OptimizeRequest = serde_json::from_value(json!({
            "classroom_layout": {"rows": 200, "columns": 200},
            "students": students
        }))
        .unwrap();
        let limits = SearchLimits::unbounded().with_max_seat_choices(250_000);

        let err = optimize_seating(&request, &limits).unwrap_err();
        assert!(matches!(err, SeatingError::TooLarge { students: 100, limit: 250_000, .. }));
    }

    #[test]
    fn test_ragged_chart_is_an_error() {
        let request: ExplainRequest = serde_json::from_value(json!({
            "seating_chart": [[{"id": 1, "name": "Ada"}, null], [null]],
            "constraints": [{"type": "must_front_row", "student": 1}]
        }))
        .unwrap();
        let err = explain_solution(&request).unwrap_err();
        assert!(matches!(err, SeatingError::RaggedChart { row: 1, expected: 2, found: 1 }));
    }

    #[test]
    fn test_default_layout() {
        let request: OptimizeRequest =
            serde_json::from_value(json!({"students": [{"id": 1, "name": "Ada"}]})).unwrap();
        assert_eq!(request.classroom_layout, ClassroomLayout::new(5, 6));
    }

    #[test]
    fn test_explain_hand_placed_neighbours() {
        let request: ExplainRequest = serde_json::from_value(json!({
            "seating_chart": [
                [{"id": 1, "name": "Ada"}, {"id": 2, "name": "Ben"}, null],
                [null, null, null],
                [null, null, null]
            ],
            "constraints": [{"type": "cannot_sit_together", "student1": 1, "student2": 2}]
        }))
        .unwrap();
        let report = explain_solution(&request).unwrap();

        assert!(!report.all_constraints_satisfied);
        assert!(!report.explanations[0].satisfied);
    }

    #[test]
    fn test_validate_operation() {
        let request: ValidateRequest = serde_json::from_value(json!({
            "classroom_size": {"rows": 2, "columns": 2},
            "num_students": 3,
            "constraints": [
                {"type": "must_front_row", "student": 1},
                {"type": "must_front_row", "student": 2},
                {"type": "must_front_row", "student": 3}
            ]
        }))
        .unwrap();
        let report = validate_constraints(&request);

        assert!(report.valid);
        assert!(report.warnings.iter().any(|w| w.contains("Front row")));
        assert_eq!(report.constraint_summary["must_front_row"], 3);
    }
}
