use crate::data::{Seat, StudentId};
use thiserror::Error;

/// Structural input errors.
///
/// Running out of seats or over-constraining the classroom is not an error:
/// those outcomes come back as normal, infeasible results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeatingError {
    #[error("Classroom must have at least one row and one column, got {rows}x{columns}")]
    InvalidDimensions { rows: u32, columns: u32 },

    #[error(
        "Classroom of {rows}x{columns} seats with {students} students exceeds the model limit of {limit} seat choices"
    )]
    TooLarge {
        rows: u32,
        columns: u32,
        students: usize,
        limit: usize,
    },

    #[error("Seating chart row {row} has {found} seats, expected {expected}")]
    RaggedChart {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Duplicate student ID: {0}")]
    DuplicateStudent(StudentId),

    #[error("Constraint {index} ({kind}) references unknown student {student}")]
    UnknownStudent {
        index: usize,
        kind: String,
        student: StudentId,
    },

    #[error("Constraint {index} ({kind}) pairs student {student} with themselves")]
    SelfPair {
        index: usize,
        kind: String,
        student: StudentId,
    },

    #[error("Constraint `{kind}` is missing field `{field}`")]
    MissingField { kind: String, field: &'static str },

    #[error("Student {0} is assigned more than one seat")]
    StudentSeatedTwice(StudentId),

    #[error("Seat ({}, {}) is assigned to more than one student", .seat.row, .seat.column)]
    SeatTaken { seat: Seat },

    #[error("Seat ({}, {}) lies outside the classroom", .seat.row, .seat.column)]
    SeatOutOfBounds { seat: Seat },

    #[error("Solver cannot interpret constraint: {0}")]
    UnsupportedConstraint(String),
}

pub type Result<T> = std::result::Result<T, SeatingError>;
