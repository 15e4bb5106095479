use crate::error::{Result, SeatingError};
use itertools::iproduct;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type StudentId = u32;

/// Classroom dimensions. Seat (0, 0) is front row, door side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassroomLayout {
    pub rows: u32,
    pub columns: u32,
}

impl Default for ClassroomLayout {
    fn default() -> Self {
        Self {
            rows: 5,
            columns: 6,
        }
    }
}

impl ClassroomLayout {
    pub fn new(rows: u32, columns: u32) -> Self {
        Self { rows, columns }
    }

    pub fn total_seats(&self) -> usize {
        (self.rows as usize).saturating_mul(self.columns as usize)
    }

    pub fn ensure_valid(&self) -> Result<()> {
        if self.rows == 0 || self.columns == 0 {
            return Err(SeatingError::InvalidDimensions {
                rows: self.rows,
                columns: self.columns,
            });
        }
        Ok(())
    }

    /// Rejects rooms whose students × seats model exceeds `limit` entries.
    pub fn ensure_fits(&self, students: usize, limit: usize) -> Result<()> {
        if self.total_seats().saturating_mul(students.max(1)) > limit {
            return Err(SeatingError::TooLarge {
                rows: self.rows,
                columns: self.columns,
                students,
                limit,
            });
        }
        Ok(())
    }

    /// All seats in row-major order.
    pub fn seats(&self) -> impl Iterator<Item = Seat> + use<> {
        let columns = self.columns;
        (0..self.rows).flat_map(move |row| (0..columns).map(move |column| Seat { row, column }))
    }

    pub fn contains(&self, seat: Seat) -> bool {
        seat.row < self.rows && seat.column < self.columns
    }

    /// Row-major index of `seat`. The seat must lie inside the layout.
    pub fn index_of(&self, seat: Seat) -> usize {
        seat.row as usize * self.columns as usize + seat.column as usize
    }

    pub fn seat_at(&self, index: usize) -> Seat {
        let columns = self.columns as usize;
        Seat::new((index / columns) as u32, (index % columns) as u32)
    }

    pub fn is_front_row(&self, seat: Seat) -> bool {
        seat.row == 0
    }

    pub fn is_back_row(&self, seat: Seat) -> bool {
        seat.row + 1 == self.rows
    }

    /// The window runs along the last column.
    pub fn is_by_window(&self, seat: Seat) -> bool {
        seat.column + 1 == self.columns
    }

    /// The door is next to the first column.
    pub fn is_by_door(&self, seat: Seat) -> bool {
        seat.column == 0
    }
}

/// A 0-indexed grid position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Seat {
    pub row: u32,
    pub column: u32,
}

impl Seat {
    pub fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// Chebyshev distance: 1 means the seats touch, diagonals included.
    pub fn distance(&self, other: Seat) -> u32 {
        self.row.abs_diff(other.row).max(self.column.abs_diff(other.column))
    }

    /// The up to 8 seats touching this one, clipped at the classroom edges.
    pub fn neighbors(&self, layout: &ClassroomLayout) -> Vec<Seat> {
        iproduct!(-1i64..=1, -1i64..=1)
            .filter(|&(dr, dc)| (dr, dc) != (0, 0))
            .filter_map(|(dr, dc)| {
                let row = i64::from(self.row) + dr;
                let column = i64::from(self.column) + dc;
                if row < 0 || column < 0 {
                    return None;
                }
                let seat = Seat::new(row as u32, column as u32);
                layout.contains(seat).then_some(seat)
            })
            .collect()
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}, column {}", self.row + 1, self.column + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
}

impl Student {
    pub fn new(id: StudentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A placement rule, decoded from `{"type": ..., "student": ..}` objects.
///
/// Unknown `type` values decode into [`Constraint::Unrecognized`] so they can
/// be reported instead of rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawConstraint", into = "RawConstraint")]
pub enum Constraint {
    /// The two students may not occupy touching seats.
    CannotSitTogether {
        student1: StudentId,
        student2: StudentId,
    },
    MustFrontRow { student: StudentId },
    CannotBackRow { student: StudentId },
    CannotByWindow { student: StudentId },
    CannotByDoor { student: StudentId },
    /// Soft preference, accepted but not enforced.
    NearDoor { student: StudentId },
    /// Soft preference, accepted but not enforced.
    NearWindow { student: StudentId },
    Unrecognized { kind: String },
}

impl Constraint {
    pub const CANNOT_SIT_TOGETHER: &'static str = "cannot_sit_together";
    pub const MUST_FRONT_ROW: &'static str = "must_front_row";
    pub const CANNOT_BACK_ROW: &'static str = "cannot_back_row";
    pub const CANNOT_BY_WINDOW: &'static str = "cannot_by_window";
    pub const CANNOT_BY_DOOR: &'static str = "cannot_by_door";
    pub const NEAR_DOOR: &'static str = "near_door";
    pub const NEAR_WINDOW: &'static str = "near_window";

    pub fn cannot_sit_together(student1: StudentId, student2: StudentId) -> Self {
        Self::CannotSitTogether { student1, student2 }
    }

    pub fn must_front_row(student: StudentId) -> Self {
        Self::MustFrontRow { student }
    }

    pub fn cannot_back_row(student: StudentId) -> Self {
        Self::CannotBackRow { student }
    }

    pub fn cannot_by_window(student: StudentId) -> Self {
        Self::CannotByWindow { student }
    }

    pub fn cannot_by_door(student: StudentId) -> Self {
        Self::CannotByDoor { student }
    }

    pub fn near_door(student: StudentId) -> Self {
        Self::NearDoor { student }
    }

    pub fn near_window(student: StudentId) -> Self {
        Self::NearWindow { student }
    }

    /// The wire `type` tag.
    pub fn kind(&self) -> &str {
        match self {
            Self::CannotSitTogether { .. } => Self::CANNOT_SIT_TOGETHER,
            Self::MustFrontRow { .. } => Self::MUST_FRONT_ROW,
            Self::CannotBackRow { .. } => Self::CANNOT_BACK_ROW,
            Self::CannotByWindow { .. } => Self::CANNOT_BY_WINDOW,
            Self::CannotByDoor { .. } => Self::CANNOT_BY_DOOR,
            Self::NearDoor { .. } => Self::NEAR_DOOR,
            Self::NearWindow { .. } => Self::NEAR_WINDOW,
            Self::Unrecognized { kind } => kind.as_str(),
        }
    }

    /// Student ids the constraint refers to.
    pub fn students(&self) -> Vec<StudentId> {
        match *self {
            Self::CannotSitTogether { student1, student2 } => vec![student1, student2],
            Self::MustFrontRow { student }
            | Self::CannotBackRow { student }
            | Self::CannotByWindow { student }
            | Self::CannotByDoor { student }
            | Self::NearDoor { student }
            | Self::NearWindow { student } => vec![student],
            Self::Unrecognized { .. } => Vec::new(),
        }
    }

    pub fn is_soft(&self) -> bool {
        matches!(self, Self::NearDoor { .. } | Self::NearWindow { .. })
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CannotSitTogether { student1, student2 } => {
                write!(f, "Students {student1} and {student2} cannot sit together")
            }
            Self::MustFrontRow { student } => write!(f, "Student {student} must sit in front row"),
            Self::CannotBackRow { student } => write!(f, "Student {student} cannot sit in back row"),
            Self::CannotByWindow { student } => {
                write!(f, "Student {student} cannot sit by the window")
            }
            Self::CannotByDoor { student } => write!(f, "Student {student} cannot sit by the door"),
            Self::NearDoor { student } => write!(f, "Student {student} prefers a seat near the door"),
            Self::NearWindow { student } => {
                write!(f, "Student {student} prefers a seat near the window")
            }
            Self::Unrecognized { kind } => write!(f, "Unrecognized constraint `{kind}`"),
        }
    }
}

fn unknown_kind() -> String {
    "unknown".to_string()
}

/// Wire shape of a constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawConstraint {
    #[serde(rename = "type", default = "unknown_kind")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    student: Option<StudentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    student1: Option<StudentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    student2: Option<StudentId>,
}

impl TryFrom<RawConstraint> for Constraint {
    type Error = SeatingError;

    fn try_from(raw: RawConstraint) -> Result<Self> {
        let field = |value: Option<StudentId>, field: &'static str| {
            value.ok_or_else(|| SeatingError::MissingField {
                kind: raw.kind.clone(),
                field,
            })
        };
        let constraint = match raw.kind.as_str() {
            Self::CANNOT_SIT_TOGETHER => Self::CannotSitTogether {
                student1: field(raw.student1, "student1")?,
                student2: field(raw.student2, "student2")?,
            },
            Self::MUST_FRONT_ROW => Self::MustFrontRow {
                student: field(raw.student, "student")?,
            },
            Self::CANNOT_BACK_ROW => Self::CannotBackRow {
                student: field(raw.student, "student")?,
            },
            Self::CANNOT_BY_WINDOW => Self::CannotByWindow {
                student: field(raw.student, "student")?,
            },
            Self::CANNOT_BY_DOOR => Self::CannotByDoor {
                student: field(raw.student, "student")?,
            },
            Self::NEAR_DOOR => Self::NearDoor {
                student: field(raw.student, "student")?,
            },
            Self::NEAR_WINDOW => Self::NearWindow {
                student: field(raw.student, "student")?,
            },
            _ => Self::Unrecognized {
                kind: raw.kind.clone(),
            },
        };
        Ok(constraint)
    }
}

impl From<Constraint> for RawConstraint {
    fn from(constraint: Constraint) -> Self {
        let mut raw = RawConstraint {
            kind: constraint.kind().to_string(),
            student: None,
            student1: None,
            student2: None,
        };
        match constraint {
            Constraint::CannotSitTogether { student1, student2 } => {
                raw.student1 = Some(student1);
                raw.student2 = Some(student2);
            }
            Constraint::Unrecognized { .. } => {}
            other => raw.student = other.students().first().copied(),
        }
        raw
    }
}

/// Total, injective mapping from student to seat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Assignment {
    seats: BTreeMap<StudentId, Seat>,
}

impl Assignment {
    /// Builds an assignment, rejecting a student seated twice or a shared seat.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (StudentId, Seat)>) -> Result<Self> {
        let mut seats = BTreeMap::new();
        let mut taken = std::collections::BTreeSet::new();
        for (student, seat) in pairs {
            if !taken.insert(seat) {
                return Err(SeatingError::SeatTaken { seat });
            }
            if seats.insert(student, seat).is_some() {
                return Err(SeatingError::StudentSeatedTwice(student));
            }
        }
        Ok(Self { seats })
    }

    pub fn seat_of(&self, student: StudentId) -> Option<Seat> {
        self.seats.get(&student).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StudentId, Seat)> + '_ {
        self.seats.iter().map(|(&id, &seat)| (id, seat))
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }
}

/// A seated student as shown in a chart cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub id: StudentId,
    pub name: String,
}

/// Rows × columns grid; `null` cells are empty seats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatingChart {
    cells: Vec<Vec<Option<Occupant>>>,
}

impl SeatingChart {
    pub fn from_assignment(
        layout: &ClassroomLayout,
        students: &[Student],
        assignment: &Assignment,
    ) -> Result<Self> {
        let mut cells = vec![vec![None; layout.columns as usize]; layout.rows as usize];
        for student in students {
            let Some(seat) = assignment.seat_of(student.id) else {
                continue;
            };
            let cell = cells
                .get_mut(seat.row as usize)
                .and_then(|row| row.get_mut(seat.column as usize))
                .ok_or(SeatingError::SeatOutOfBounds { seat })?;
            *cell = Some(Occupant {
                id: student.id,
                name: student.name.clone(),
            });
        }
        Ok(Self { cells })
    }

    /// Dimensions of the chart. Every row must be as wide as the first.
    pub fn layout(&self) -> Result<ClassroomLayout> {
        let expected = self.cells.first().map_or(0, Vec::len);
        if let Some((row, cells)) = self
            .cells
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != expected)
        {
            return Err(SeatingError::RaggedChart {
                row,
                expected,
                found: cells.len(),
            });
        }
        Ok(ClassroomLayout::new(self.cells.len() as u32, expected as u32))
    }

    pub fn cell(&self, seat: Seat) -> Option<&Occupant> {
        self.cells
            .get(seat.row as usize)?
            .get(seat.column as usize)?
            .as_ref()
    }

    /// Where each charted student sits.
    pub fn positions(&self) -> Result<BTreeMap<StudentId, Seat>> {
        let mut positions = BTreeMap::new();
        for (row, cells) in self.cells.iter().enumerate() {
            for (column, cell) in cells.iter().enumerate() {
                if let Some(occupant) = cell {
                    let seat = Seat::new(row as u32, column as u32);
                    if positions.insert(occupant.id, seat).is_some() {
                        return Err(SeatingError::StudentSeatedTwice(occupant.id));
                    }
                }
            }
        }
        Ok(positions)
    }

    pub fn empty_seats(&self) -> usize {
        self.cells.iter().flatten().filter(|cell| cell.is_none()).count()
    }
}
