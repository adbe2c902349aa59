//! Pareto ranking with constraint handling and crowding distance.
//!
//! Rows are ranked in fronts: front 0 holds every row no other row dominates, front 1 the rows
//! dominated only by front 0, and so on. Within a front, rows in sparse regions of objective
//! space get a larger crowding distance and sort first.

use std::cmp::Ordering;

use itertools::Itertools;
use sdds_error::{SddsResult, sdds_bail};

/// Whether an objective is to be made small or large.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Minimize,
    Maximize,
}

/// One objective column.
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    pub values: Vec<f64>,
    pub direction: Direction,
}

impl Objective {
    pub fn new(values: Vec<f64>, direction: Direction) -> Self {
        Self { values, direction }
    }

    /// The value at `row` oriented so that smaller is better.
    fn cost(&self, row: usize) -> f64 {
        match self.direction {
            Direction::Minimize => self.values[row],
            Direction::Maximize => -self.values[row],
        }
    }
}

/// Result of [`non_dominated_sort`], indexed by original row.
#[derive(Debug, Clone, PartialEq)]
pub struct Fronts {
    /// Rows in output order: rank ascending, then crowding distance descending.
    pub order: Vec<usize>,
    pub rank: Vec<usize>,
    /// Infinite for the extreme rows of each front.
    pub crowding: Vec<f64>,
    /// Constraint violation as supplied; zero when none was.
    pub violation: Vec<f64>,
}

impl Fronts {
    /// Number of fronts.
    pub fn front_count(&self) -> usize {
        self.rank.iter().max().map_or(0, |r| r + 1)
    }

    /// Rows of front `rank`, in output order.
    pub fn front(&self, rank: usize) -> Vec<usize> {
        self.order
            .iter()
            .copied()
            .filter(|&row| self.rank[row] == rank)
            .collect()
    }
}

/// Sum the negative parts of per-constraint columns into one violation per row.
pub fn aggregate_constraints(columns: &[Vec<f64>], rows: usize) -> Vec<f64> {
    let mut total = vec![0.0; rows];
    for column in columns {
        for (sum, &v) in total.iter_mut().zip(column) {
            if v < 0.0 {
                *sum += v;
            }
        }
    }
    total
}

/// Whether row `a` dominates row `b`.
///
/// A feasible row dominates an infeasible one; of two infeasible rows the one with the smaller
/// violation dominates. Feasible rows compare by Pareto dominance: no worse in every objective
/// and strictly better in at least one. NaN objectives never dominate.
pub fn dominates(objectives: &[Objective], violation: &[f64], a: usize, b: usize) -> bool {
    let (ca, cb) = (violation[a].min(0.0), violation[b].min(0.0));
    if ca < 0.0 || cb < 0.0 {
        return ca > cb;
    }
    let mut better = false;
    for objective in objectives {
        let (x, y) = (objective.cost(a), objective.cost(b));
        match x.partial_cmp(&y) {
            Some(Ordering::Less) => better = true,
            Some(Ordering::Equal) => {}
            Some(Ordering::Greater) | None => return false,
        }
    }
    better
}

/// Rank rows into Pareto fronts and order them for output.
///
/// `violation`, when given, has one entry per row; values below zero mark infeasible rows.
pub fn non_dominated_sort(
    objectives: &[Objective],
    violation: Option<&[f64]>,
) -> SddsResult<Fronts> {
    let Some(first) = objectives.first() else {
        sdds_bail!(EmptyInput: "no objectives to sort on");
    };
    let rows = first.values.len();
    if rows == 0 {
        sdds_bail!(EmptyInput: "no rows to sort");
    }
    if let Some(bad) = objectives.iter().find(|o| o.values.len() != rows) {
        sdds_bail!(
            InvalidArgument: "objective has {} rows where {} were expected",
            bad.values.len(), rows
        );
    }
    let violation = match violation {
        Some(v) if v.len() != rows => {
            sdds_bail!(InvalidArgument: "{} constraint violations for {} rows", v.len(), rows)
        }
        Some(v) => v.to_vec(),
        None => vec![0.0; rows],
    };

    let rank = rank_fronts(objectives, &violation);
    let crowding = crowding_distances(objectives, &rank);
    let order = (0..rows)
        .sorted_by(|&a, &b| {
            rank[a]
                .cmp(&rank[b])
                .then_with(|| crowding[b].total_cmp(&crowding[a]))
        })
        .collect();
    let fronts = Fronts {
        order,
        rank,
        crowding,
        violation,
    };
    log::debug!("ranked {} rows into {} fronts", rows, fronts.front_count());
    Ok(fronts)
}

fn rank_fronts(objectives: &[Objective], violation: &[f64]) -> Vec<usize> {
    let rows = violation.len();
    let mut dominated_by = vec![0usize; rows];
    let mut dominates_set = vec![Vec::new(); rows];
    for a in 0..rows {
        for b in a + 1..rows {
            if dominates(objectives, violation, a, b) {
                dominates_set[a].push(b);
                dominated_by[b] += 1;
            } else if dominates(objectives, violation, b, a) {
                dominates_set[b].push(a);
                dominated_by[a] += 1;
            }
        }
    }

    let mut rank = vec![0; rows];
    let mut front: Vec<usize> = (0..rows).filter(|&r| dominated_by[r] == 0).collect();
    let mut level = 0;
    while !front.is_empty() {
        let mut next = Vec::new();
        for &a in &front {
            rank[a] = level;
            for &b in &dominates_set[a] {
                dominated_by[b] -= 1;
                if dominated_by[b] == 0 {
                    next.push(b);
                }
            }
        }
        front = next;
        level += 1;
    }
    rank
}

fn crowding_distances(objectives: &[Objective], rank: &[usize]) -> Vec<f64> {
    let mut crowding = vec![0.0; rank.len()];
    let fronts = rank.iter().max().map_or(0, |r| r + 1);
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); fronts];
    for (row, &r) in rank.iter().enumerate() {
        members[r].push(row);
    }

    for objective in objectives {
        let (low, high) = objective
            .values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        let range = high - low;
        for front in &members {
            let sorted = front
                .iter()
                .copied()
                .sorted_by(|&a, &b| objective.values[a].total_cmp(&objective.values[b]))
                .collect::<Vec<_>>();
            let (Some(&first), Some(&last)) = (sorted.first(), sorted.last()) else {
                continue;
            };
            crowding[first] = f64::INFINITY;
            crowding[last] = f64::INFINITY;
            if !(range > 0.0 && range.is_finite()) {
                continue;
            }
            for window in sorted.windows(3) {
                let gap = objective.values[window[2]] - objective.values[window[0]];
                crowding[window[1]] += gap / range;
            }
        }
    }
    crowding
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;
    use sdds_error::ErrorKind;

    use super::*;

    fn minimize(columns: &[&[f64]]) -> Vec<Objective> {
        columns
            .iter()
            .map(|c| Objective::new(c.to_vec(), Direction::Minimize))
            .collect()
    }

    #[test]
    fn trade_off_is_one_front() {
        let objectives = minimize(&[&[1.0, 2.0, 3.0, 4.0], &[4.0, 3.0, 2.0, 1.0]]);
        let fronts = non_dominated_sort(&objectives, None).unwrap();
        assert_eq!(fronts.rank, vec![0, 0, 0, 0]);
        assert!(fronts.crowding[0].is_infinite());
        assert!(fronts.crowding[3].is_infinite());
        for row in [1, 2] {
            assert!(fronts.crowding[row].is_finite() && fronts.crowding[row] > 0.0);
        }
        assert_eq!(&fronts.order[..2], &[0, 3]);
    }

    #[test]
    fn dominated_rows_rank_later() {
        let objectives = minimize(&[&[1.0, 2.0, 3.0, 1.5], &[1.0, 2.0, 3.0, 0.5]]);
        let fronts = non_dominated_sort(&objectives, None).unwrap();
        assert_eq!(fronts.rank, vec![0, 1, 2, 0]);
        assert_eq!(fronts.front_count(), 3);
        assert_eq!(fronts.front(1), vec![1]);
    }

    #[test]
    fn maximize_flips_the_order() {
        let objectives = vec![Objective::new(vec![1.0, 3.0, 2.0], Direction::Maximize)];
        let fronts = non_dominated_sort(&objectives, None).unwrap();
        assert_eq!(fronts.rank, vec![2, 0, 1]);
        assert_eq!(fronts.order, vec![1, 2, 0]);
    }

    #[test]
    fn feasible_rows_come_first() {
        let objectives = minimize(&[&[1.0, 5.0, 0.0]]);
        let violation = [-2.0, 0.0, -0.5];
        let fronts = non_dominated_sort(&objectives, Some(&violation)).unwrap();
        assert_eq!(fronts.rank, vec![2, 0, 1]);
        assert_eq!(fronts.violation, vec![-2.0, 0.0, -0.5]);
    }

    #[test]
    fn constraints_sum_their_negative_parts() {
        let columns = vec![vec![1.0, -1.0, 0.0], vec![-2.0, -0.5, 3.0]];
        assert_eq!(aggregate_constraints(&columns, 3), vec![-2.0, -1.5, 0.0]);
        assert_eq!(aggregate_constraints(&[], 2), vec![0.0, 0.0]);
    }

    #[rstest]
    #[case(vec![], ErrorKind::EmptyInput)]
    #[case(vec![Objective::new(vec![], Direction::Minimize)], ErrorKind::EmptyInput)]
    #[case(minimize(&[&[1.0, 2.0], &[1.0]]), ErrorKind::InvalidArgument)]
    fn rejected(#[case] objectives: Vec<Objective>, #[case] kind: ErrorKind) {
        assert_eq!(
            non_dominated_sort(&objectives, None).unwrap_err().kind(),
            kind
        );
    }

    fn matrix() -> impl Strategy<Value = (Vec<Vec<f64>>, Vec<f64>)> {
        (1usize..4, 1usize..24).prop_flat_map(|(m, n)| {
            (
                prop::collection::vec(prop::collection::vec(-5i8..5, n), m).prop_map(|columns| {
                    columns
                        .into_iter()
                        .map(|c| c.into_iter().map(f64::from).collect())
                        .collect()
                }),
                prop::collection::vec(prop_oneof![3 => Just(0.0), 1 => -3.0..0.0f64], n),
            )
        })
    }

    proptest! {
        #[test]
        fn fronts_respect_dominance((columns, violation) in matrix()) {
            let objectives = columns
                .into_iter()
                .map(|c| Objective::new(c, Direction::Minimize))
                .collect::<Vec<_>>();
            let fronts = non_dominated_sort(&objectives, Some(&violation)).unwrap();
            let rows = violation.len();
            for b in 0..rows {
                for a in 0..rows {
                    if fronts.rank[b] == 0 {
                        prop_assert!(!dominates(&objectives, &violation, a, b));
                    }
                }
                if fronts.rank[b] > 0 {
                    prop_assert!((0..rows).any(|a| fronts.rank[a] == fronts.rank[b] - 1
                        && dominates(&objectives, &violation, a, b)));
                }
            }
            let mut seen = fronts.order.clone();
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..rows).collect::<Vec<_>>());
            prop_assert!(fronts.order.windows(2).all(|w| fronts.rank[w[0]] <= fronts.rank[w[1]]));
        }
    }
}
