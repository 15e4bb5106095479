use crate::data::{Assignment, StudentId};
use crate::error::{Result, SeatingError};
use crate::model::{ConstraintModel, ModelConstraint, Relation, VarId};
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Bounds on a single search. Deadline and cancellation are checked around
/// model compilation and between node expansions.
#[derive(Debug, Clone, Default)]
pub struct SearchLimits {
    pub deadline: Option<Instant>,
    pub max_nodes: Option<u64>,
    pub cancel: Option<Arc<AtomicBool>>,
    /// Largest students × seats model accepted for solving.
    pub max_seat_choices: Option<usize>,
}

impl SearchLimits {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            ..Self::default()
        }
    }

    pub fn with_max_nodes(mut self, max_nodes: u64) -> Self {
        self.max_nodes = Some(max_nodes);
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_max_seat_choices(mut self, limit: usize) -> Self {
        self.max_seat_choices = Some(limit);
        self
    }

    fn interrupted(&self) -> Option<StopReason> {
        if self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Some(StopReason::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Some(StopReason::Deadline);
        }
        None
    }

    /// Reason to stop before expanding another node, after `nodes` so far.
    fn reached(&self, nodes: u64) -> Option<StopReason> {
        self.interrupted().or_else(|| {
            self.max_nodes
                .is_some_and(|max| nodes >= max)
                .then_some(StopReason::NodeLimit)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Deadline,
    NodeLimit,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    /// Search ran to completion without hitting a limit.
    Optimal,
    /// An arrangement was found, but a limit had been reached by then.
    Feasible,
    Infeasible,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveStats {
    pub solve_time: Duration,
    pub nodes_explored: u64,
    pub backtracks: u64,
    /// False when a limit was reached before the search returned.
    pub exhaustive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveResult {
    pub status: SolveStatus,
    pub assignment: Option<Assignment>,
    pub stats: SolveStats,
    pub stopped: Option<StopReason>,
}

/// Finds a seating arrangement by backtracking over students with
/// forward propagation of seat exclusions.
///
/// Students are picked smallest-domain first (ties by ascending id) and
/// seats are tried in row-major order, so equal inputs give equal answers.
pub fn solve(model: &ConstraintModel, limits: &SearchLimits) -> Result<SolveResult> {
    let start_time = Instant::now();
    if let Some(limit) = limits.max_seat_choices {
        model.layout.ensure_fits(model.students.len(), limit)?;
    }
    if let Some(reason) = limits.interrupted() {
        return Ok(stopped_before_search(reason, start_time));
    }

    let network = Network::compile(model)?;
    if let Some(reason) = limits.interrupted() {
        debug!("Limit reached while compiling the model.");
        return Ok(stopped_before_search(reason, start_time));
    }
    debug!(
        "Compiled {} seat groups and {} pairwise exclusions.",
        network.groups.len(),
        network.conflicts.iter().map(Vec::len).sum::<usize>() / 2
    );

    let mut search = Search {
        ids: model.students.iter().map(|s| s.id).collect(),
        assigned: vec![None; network.students],
        trail: Vec::new(),
        network,
        limits,
        nodes: 0,
        backtracks: 0,
    };

    info!("Starting seating search for {} students...", model.students.len());
    let outcome = if search.network.root_consistent() {
        search.run()
    } else {
        trace!("Root propagation emptied a domain.");
        Outcome::Exhausted
    };

    let (status, stopped) = settle(outcome, limits);

    let assignment = match outcome {
        Outcome::Found => Some(Assignment::from_pairs(
            search
                .assigned
                .iter()
                .enumerate()
                .filter_map(|(s, seat)| seat.map(|k| (search.ids[s], model.layout.seat_at(k)))),
        )?),
        _ => None,
    };

    let stats = SolveStats {
        solve_time: start_time.elapsed(),
        nodes_explored: search.nodes,
        backtracks: search.backtracks,
        exhaustive: stopped.is_none(),
    };
    info!(
        "Search finished in {:.2?}: {:?} after {} nodes ({} backtracks).",
        stats.solve_time, status, stats.nodes_explored, stats.backtracks
    );

    Ok(SolveResult {
        status,
        assignment,
        stats,
        stopped,
    })
}

/// A found arrangement only counts as cut short when the clock ran out or the
/// caller cancelled; using up the node budget on the last node does not.
fn settle(outcome: Outcome, limits: &SearchLimits) -> (SolveStatus, Option<StopReason>) {
    match outcome {
        Outcome::Found => match limits.interrupted() {
            Some(reason) => (SolveStatus::Feasible, Some(reason)),
            None => (SolveStatus::Optimal, None),
        },
        Outcome::Exhausted => (SolveStatus::Infeasible, None),
        Outcome::Stopped(reason) => (SolveStatus::Infeasible, Some(reason)),
    }
}

fn stopped_before_search(reason: StopReason, start_time: Instant) -> SolveResult {
    info!("Seating search not started: {reason:?}.");
    SolveResult {
        status: SolveStatus::Infeasible,
        assignment: None,
        stats: SolveStats {
            solve_time: start_time.elapsed(),
            nodes_explored: 0,
            backtracks: 0,
            exhaustive: false,
        },
        stopped: Some(reason),
    }
}

/// Per-student seat domains plus the propagation structure derived from
/// the model constraints.
struct Network {
    students: usize,
    seats: usize,
    domains: Vec<Vec<bool>>,
    sizes: Vec<usize>,
    /// At most one variable of each group may be true.
    groups: Vec<Vec<VarId>>,
    groups_by_var: Vec<Vec<usize>>,
    /// Variables that must be false once the key variable is true.
    conflicts: Vec<Vec<VarId>>,
    contradiction: bool,
}

impl Network {
    fn compile(model: &ConstraintModel) -> Result<Self> {
        let students = model.students.len();
        let seats = model.layout.total_seats();
        let var_count = students * seats;

        if model.variables.len() != var_count
            || model
                .variables
                .iter()
                .any(|v| v.id != v.student * seats + model.layout.index_of(v.seat))
        {
            return Err(SeatingError::UnsupportedConstraint(
                "variables are not laid out student-major".to_string(),
            ));
        }

        let mut network = Network {
            students,
            seats,
            domains: vec![vec![true; seats]; students],
            sizes: vec![seats; students],
            groups: Vec::new(),
            groups_by_var: vec![Vec::new(); var_count],
            conflicts: vec![Vec::new(); var_count],
            contradiction: false,
        };

        for constraint in &model.constraints {
            match constraint {
                ModelConstraint::Linear {
                    vars,
                    relation,
                    rhs,
                    origin,
                } => {
                    if let Some(&v) = vars.iter().find(|&&v| v >= var_count) {
                        return Err(SeatingError::UnsupportedConstraint(format!(
                            "{origin:?} references variable {v}"
                        )));
                    }
                    let owners: BTreeSet<usize> = vars.iter().map(|&v| v / seats).collect();
                    match (owners.len(), relation, rhs) {
                        (0, Relation::Eq, r) if *r > 0 => network.contradiction = true,
                        (_, _, 0) => {
                            for &v in vars {
                                network.remove(v / seats, v % seats);
                            }
                        }
                        // With one seat per student, Σ subset = 1 confines the
                        // student to the subset.
                        (1, Relation::Eq, 1) => {
                            let keep: BTreeSet<usize> = vars.iter().map(|&v| v % seats).collect();
                            let s = vars[0] / seats;
                            for k in 0..seats {
                                if !keep.contains(&k) {
                                    network.remove(s, k);
                                }
                            }
                        }
                        (1, Relation::Le, _) => {}
                        (_, Relation::Le, 1) => {
                            let g = network.groups.len();
                            for &v in vars {
                                network.groups_by_var[v].push(g);
                            }
                            network.groups.push(vars.clone());
                        }
                        (n, relation, rhs) => {
                            return Err(SeatingError::UnsupportedConstraint(format!(
                                "{origin:?}: sum {relation:?} {rhs} across {n} students"
                            )));
                        }
                    }
                }
                ModelConstraint::NotBoth { a, b, origin } => {
                    if *a >= var_count || *b >= var_count {
                        return Err(SeatingError::UnsupportedConstraint(format!(
                            "{origin:?} references variables {a} and {b}"
                        )));
                    }
                    if a == b {
                        network.remove(a / seats, a % seats);
                    } else if a / seats != b / seats {
                        network.conflicts[*a].push(*b);
                        network.conflicts[*b].push(*a);
                    }
                }
            }
        }

        Ok(network)
    }

    fn remove(&mut self, student: usize, seat: usize) {
        if std::mem::take(&mut self.domains[student][seat]) {
            self.sizes[student] -= 1;
        }
    }

    fn root_consistent(&self) -> bool {
        !self.contradiction && self.sizes.iter().all(|&size| size > 0)
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Found,
    Exhausted,
    Stopped(StopReason),
}

struct Search<'a> {
    network: Network,
    limits: &'a SearchLimits,
    ids: Vec<StudentId>,
    assigned: Vec<Option<usize>>,
    /// Domain removals, undone on backtrack.
    trail: Vec<(usize, usize)>,
    nodes: u64,
    backtracks: u64,
}

impl Search<'_> {
    fn run(&mut self) -> Outcome {
        let Some(student) = self.select_student() else {
            return Outcome::Found;
        };

        let candidates: Vec<usize> = (0..self.network.seats)
            .filter(|&k| self.network.domains[student][k])
            .collect();

        for seat in candidates {
            if let Some(reason) = self.limits.reached(self.nodes) {
                return Outcome::Stopped(reason);
            }
            self.nodes += 1;
            trace!("Trying student {} at seat {}", self.ids[student], seat);

            let mark = self.trail.len();
            self.assigned[student] = Some(seat);
            if self.propagate(student, seat) {
                match self.run() {
                    Outcome::Exhausted => {}
                    done => return done,
                }
            }
            self.undo(mark);
            self.assigned[student] = None;
            self.backtracks += 1;
        }

        Outcome::Exhausted
    }

    /// Unassigned student with the fewest remaining seats, ties by lowest id.
    fn select_student(&self) -> Option<usize> {
        (0..self.network.students)
            .filter(|&s| self.assigned[s].is_none())
            .min_by_key(|&s| (self.network.sizes[s], self.ids[s]))
    }

    /// Applies every exclusion implied by seating `student` at `seat`.
    /// Returns false as soon as some student is left without a seat.
    fn propagate(&mut self, student: usize, seat: usize) -> bool {
        let var = student * self.network.seats + seat;

        for gi in 0..self.network.groups_by_var[var].len() {
            let g = self.network.groups_by_var[var][gi];
            for wi in 0..self.network.groups[g].len() {
                let w = self.network.groups[g][wi];
                if w != var && !self.falsify(w) {
                    return false;
                }
            }
        }
        for wi in 0..self.network.conflicts[var].len() {
            let w = self.network.conflicts[var][wi];
            if !self.falsify(w) {
                return false;
            }
        }
        true
    }

    fn falsify(&mut self, var: VarId) -> bool {
        let (student, seat) = (var / self.network.seats, var % self.network.seats);
        match self.assigned[student] {
            Some(taken) => taken != seat,
            None => {
                if std::mem::take(&mut self.network.domains[student][seat]) {
                    self.network.sizes[student] -= 1;
                    self.trail.push((student, seat));
                }
                self.network.sizes[student] > 0
            }
        }
    }

    fn undo(&mut self, mark: usize) {
        while self.trail.len() > mark {
            if let Some((student, seat)) = self.trail.pop() {
                self.network.domains[student][seat] = true;
                self.network.sizes[student] += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ClassroomLayout, Constraint, Seat, Student};
    use crate::model::build;

    fn students(n: u32) -> Vec<Student> {
        (1..=n).map(|id| Student::new(id, format!("S{id}"))).collect()
    }

    fn solve_with(
        layout: ClassroomLayout,
        n: u32,
        constraints: &[Constraint],
        limits: &SearchLimits,
    ) -> SolveResult {
        let model = build(layout, &students(n), constraints).unwrap();
        solve(&model, limits).unwrap()
    }

    fn check_hard_constraints(
        layout: ClassroomLayout,
        n: u32,
        constraints: &[Constraint],
        assignment: &Assignment,
    ) {
        assert_eq!(assignment.len(), n as usize);
        let distinct: BTreeSet<Seat> = assignment.iter().map(|(_, seat)| seat).collect();
        assert_eq!(distinct.len(), n as usize);
        for (_, seat) in assignment.iter() {
            assert!(layout.contains(seat));
        }

        let at = |id| assignment.seat_of(id).unwrap();
        for c in constraints {
            match *c {
                Constraint::CannotSitTogether { student1, student2 } => {
                    assert!(at(student1).distance(at(student2)) >= 2)
                }
                Constraint::MustFrontRow { student } => assert_eq!(at(student).row, 0),
                Constraint::CannotBackRow { student } => assert!(at(student).row < layout.rows - 1),
                Constraint::CannotByWindow { student } => {
                    assert_ne!(at(student).column, layout.columns - 1)
                }
                Constraint::CannotByDoor { student } => assert_ne!(at(student).column, 0),
                _ => {}
            }
        }
    }

    #[test]
    fn test_unconstrained_leaves_one_seat_empty() {
        let result = solve_with(ClassroomLayout::new(2, 2), 3, &[], &SearchLimits::unbounded());

        assert_eq!(result.status, SolveStatus::Optimal);
        assert!(result.stats.exhaustive);
        assert_eq!(result.stats.nodes_explored, 3);
        assert_eq!(result.stats.backtracks, 0);
        let assignment = result.assignment.unwrap();
        assert_eq!(assignment.seat_of(1), Some(Seat::new(0, 0)));
        assert_eq!(assignment.seat_of(2), Some(Seat::new(0, 1)));
        assert_eq!(assignment.seat_of(3), Some(Seat::new(1, 0)));
    }

    #[test]
    fn test_contradictory_row_and_door() {
        let constraints = vec![Constraint::must_front_row(1), Constraint::cannot_by_door(1)];
        let result = solve_with(
            ClassroomLayout::new(3, 1),
            1,
            &constraints,
            &SearchLimits::unbounded(),
        );

        assert_eq!(result.status, SolveStatus::Infeasible);
        assert!(result.assignment.is_none());
        assert!(result.stats.exhaustive);
        assert_eq!(result.stats.nodes_explored, 0);
    }

    #[test]
    fn test_separates_pair_in_single_row() {
        let constraints = vec![Constraint::cannot_sit_together(1, 2)];
        let result = solve_with(
            ClassroomLayout::new(1, 3),
            2,
            &constraints,
            &SearchLimits::unbounded(),
        );

        let assignment = result.assignment.unwrap();
        assert_eq!(assignment.seat_of(1), Some(Seat::new(0, 0)));
        assert_eq!(assignment.seat_of(2), Some(Seat::new(0, 2)));
    }

    #[test]
    fn test_every_seat_adjacent_is_infeasible() {
        let constraints = vec![Constraint::cannot_sit_together(1, 2)];
        let result = solve_with(
            ClassroomLayout::new(2, 2),
            2,
            &constraints,
            &SearchLimits::unbounded(),
        );

        assert_eq!(result.status, SolveStatus::Infeasible);
        assert!(result.stats.exhaustive);
        assert_eq!(result.stats.nodes_explored, 4);
    }

    #[test]
    fn test_mixed_constraints_hold() {
        let layout = ClassroomLayout::new(4, 5);
        let constraints = vec![
            Constraint::cannot_sit_together(1, 2),
            Constraint::cannot_sit_together(2, 3),
            Constraint::cannot_sit_together(1, 3),
            Constraint::cannot_sit_together(4, 5),
            Constraint::must_front_row(1),
            Constraint::must_front_row(4),
            Constraint::cannot_back_row(2),
            Constraint::cannot_back_row(6),
            Constraint::cannot_by_window(3),
            Constraint::cannot_by_door(3),
            Constraint::cannot_by_door(5),
            Constraint::near_window(7),
        ];
        let result = solve_with(layout, 8, &constraints, &SearchLimits::unbounded());

        assert_eq!(result.status, SolveStatus::Optimal);
        check_hard_constraints(layout, 8, &constraints, &result.assignment.unwrap());
    }

    #[test]
    fn test_full_room_with_front_row_demand() {
        let layout = ClassroomLayout::new(3, 3);
        let constraints: Vec<Constraint> = (1..=3).map(Constraint::must_front_row).collect();
        let result = solve_with(layout, 9, &constraints, &SearchLimits::unbounded());

        assert_eq!(result.status, SolveStatus::Optimal);
        check_hard_constraints(layout, 9, &constraints, &result.assignment.unwrap());
    }

    #[test]
    fn test_repeatable() {
        let layout = ClassroomLayout::new(3, 4);
        let constraints = vec![
            Constraint::cannot_sit_together(1, 2),
            Constraint::cannot_sit_together(3, 4),
            Constraint::cannot_by_door(2),
        ];
        let first = solve_with(layout, 6, &constraints, &SearchLimits::unbounded());
        let second = solve_with(layout, 6, &constraints, &SearchLimits::unbounded());

        assert_eq!(first.assignment, second.assignment);
        assert_eq!(first.stats.nodes_explored, second.stats.nodes_explored);
    }

    #[test]
    fn test_adding_constraint_keeps_infeasible() {
        let layout = ClassroomLayout::new(2, 2);
        let mut constraints = vec![Constraint::cannot_sit_together(1, 2)];
        let base = solve_with(layout, 3, &constraints, &SearchLimits::unbounded());
        assert_eq!(base.status, SolveStatus::Infeasible);

        for extra in [
            Constraint::must_front_row(3),
            Constraint::cannot_by_window(1),
            Constraint::near_door(2),
        ] {
            constraints.push(extra);
            let result = solve_with(layout, 3, &constraints, &SearchLimits::unbounded());
            assert_eq!(result.status, SolveStatus::Infeasible);
        }
    }

    #[test]
    fn test_dense_exclusions_terminate() {
        let layout = ClassroomLayout::new(3, 3);
        let mut constraints = Vec::new();
        for a in 1..=9 {
            for b in (a + 1)..=9 {
                constraints.push(Constraint::cannot_sit_together(a, b));
            }
        }
        let limits = SearchLimits::with_timeout(Duration::from_secs(10));
        let result = solve_with(layout, 9, &constraints, &limits);

        assert_eq!(result.status, SolveStatus::Infeasible);
        assert!(result.assignment.is_none());
    }

    #[test]
    fn test_expired_deadline_stops_before_first_node() {
        let limits = SearchLimits {
            deadline: Some(Instant::now()),
            ..SearchLimits::default()
        };
        let result = solve_with(ClassroomLayout::new(2, 2), 2, &[], &limits);

        assert_eq!(result.status, SolveStatus::Infeasible);
        assert_eq!(result.stopped, Some(StopReason::Deadline));
        assert!(!result.stats.exhaustive);
        assert_eq!(result.stats.nodes_explored, 0);
    }

    #[test]
    fn test_solution_on_last_allowed_node_is_optimal() {
        let limits = SearchLimits::unbounded().with_max_nodes(3);
        let result = solve_with(ClassroomLayout::new(2, 2), 3, &[], &limits);
        let unbounded = solve_with(ClassroomLayout::new(2, 2), 3, &[], &SearchLimits::unbounded());

        assert_eq!(result.status, SolveStatus::Optimal);
        assert_eq!(result.stopped, None);
        assert!(result.stats.exhaustive);
        assert_eq!(result.stats.nodes_explored, unbounded.stats.nodes_explored);
        assert_eq!(result.assignment, unbounded.assignment);
    }

    #[test]
    fn test_found_after_deadline_is_feasible() {
        let expired = SearchLimits {
            deadline: Some(Instant::now()),
            ..SearchLimits::default()
        };
        assert_eq!(
            settle(Outcome::Found, &expired),
            (SolveStatus::Feasible, Some(StopReason::Deadline))
        );

        let spent = SearchLimits::unbounded().with_max_nodes(0);
        assert_eq!(settle(Outcome::Found, &spent), (SolveStatus::Optimal, None));
    }

    #[test]
    fn test_deadline_stops_live_search() {
        let layout = ClassroomLayout::new(5, 5);
        let mut constraints = Vec::new();
        for a in 1..=13 {
            for b in (a + 1)..=13 {
                constraints.push(Constraint::cannot_sit_together(a, b));
            }
        }
        let model = build(layout, &students(13), &constraints).unwrap();

        let started = Instant::now();
        let limits = SearchLimits::with_timeout(Duration::from_millis(200));
        let result = solve(&model, &limits).unwrap();

        assert_eq!(result.status, SolveStatus::Infeasible);
        assert_eq!(result.stopped, Some(StopReason::Deadline));
        assert!(!result.stats.exhaustive);
        assert!(result.stats.nodes_explored > 0);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_oversized_model_is_rejected() {
        let model = build(ClassroomLayout::new(4, 4), &students(4), &[]).unwrap();
        let limits = SearchLimits::unbounded().with_max_seat_choices(63);

        let err = solve(&model, &limits).unwrap_err();
        assert!(matches!(err, SeatingError::TooLarge { students: 4, limit: 63, .. }));
        assert!(solve(&model, &limits.with_max_seat_choices(64)).is_ok());
    }

    #[test]
    fn test_node_limit_without_solution_is_infeasible() {
        let limits = SearchLimits::unbounded().with_max_nodes(1);
        let result = solve_with(ClassroomLayout::new(2, 2), 3, &[], &limits);

        assert_eq!(result.status, SolveStatus::Infeasible);
        assert_eq!(result.stopped, Some(StopReason::NodeLimit));
        assert!(!result.stats.exhaustive);
        assert_eq!(result.stats.nodes_explored, 1);
    }

    #[test]
    fn test_cancellation_is_observed() {
        let flag = Arc::new(AtomicBool::new(true));
        let limits = SearchLimits::unbounded().with_cancel(flag);
        let result = solve_with(ClassroomLayout::new(2, 2), 1, &[], &limits);

        assert_eq!(result.status, SolveStatus::Infeasible);
        assert_eq!(result.stopped, Some(StopReason::Cancelled));
    }

    #[test]
    fn test_no_students_is_trivially_optimal() {
        let result = solve_with(ClassroomLayout::new(1, 1), 0, &[], &SearchLimits::unbounded());
        assert_eq!(result.status, SolveStatus::Optimal);
        assert!(result.assignment.unwrap().is_empty());
    }
}
