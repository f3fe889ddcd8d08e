#![warn(missing_docs)]
#![doc(test(no_crate_inject))]
#![doc(test(attr(deny(unused, future_incompatible))))]

//! This crate provides constraint-based structure learning for discrete data, as described by
//! these books:
//!
//! - Neapolitan, Learning Bayesian Networks, 2004, Section 10.1.2 (the PC algorithm)
//! - Koller & Friedman, Probabilistic Graphical Models - Principles and Techniques, 2009,
//!   Sections 3.4.2.1 and 18.2
//!
//! Given a table of discrete observations, the [`PcEstimator`] identifies conditional
//! independencies with a chi-square test ([`ChiSquareTest`]) and estimates a DAG pattern (a
//! [`Pdag`]) consistent with them. The PDAG represents a Markov equivalence class: any completion
//! that picks one direction for each remaining undirected edge without creating new colliders or
//! cycles yields an equivalent Bayesian network DAG.

pub use sorted_iter;

use lasso::{LargeSpur, MicroSpur, MiniSpur, Spur};
use petgraph::algo::all_simple_paths;
use petgraph::stable_graph::{NodeIndex, StableDiGraph, StableUnGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use smallvec::SmallVec;
use sorted_iter::assume::AssumeSortedByItemExt;
use sorted_iter::sorted_iterator::SortedByItem;
use sorted_iter::SortedIterator;
use statrs::distribution::{ChiSquared, Univariate};
use std::collections::HashMap;
use std::iter;
use tracing::warn;

/// Types which can be used to identify variables in a [`Dataset`].
pub trait VariableId: Sized + Copy + std::fmt::Debug + std::hash::Hash + Ord {
    /// SmallVec contains two `usize` fields which overlap with the inline vector, so variable sets
    /// will have minimum size if this array occupies the same number of bytes.
    ///
    /// It can be declared like this for any implementation, or you can have the [`variable_id!`]
    /// macro do it for you.
    ///
    /// ```ignore
    /// use std::mem::size_of;
    /// type SmallArray = [Self; 2 * size_of::<usize>() / size_of::<Self>()];
    /// ```
    type SmallArray: smallvec::Array<Item = Self> + Clone + std::fmt::Debug + std::hash::Hash + Ord;
}

/// Generates implementations of the [`VariableId`] trait which set the associated `SmallArray`
/// type to the biggest array that will fit within a [`SmallVec`][smallvec::SmallVec]'s minimum
/// size.
///
/// It also generates a test with the given `$testname` that checks that the generated definition
/// is as small as the smallest `SmallVec`.
///
/// For example, this library provides implementations for the basic unsigned integer types using
/// this declaration:
///
/// ```ignore
/// variable_id![unsigned_id_size, u8, u16, u32, u64, usize];
/// ```
#[macro_export]
macro_rules! variable_id {
    ($testname:ident, $($t:ty),*) => {
        $(
            impl $crate::VariableId for $t {
                type SmallArray = [
                    Self;
                    2 * ::std::mem::size_of::<usize>() / ::std::mem::size_of::<Self>()
                ];
            }
        )*

        #[cfg(test)]
        #[test]
        fn $testname() {
            use $crate::VariableSet;
            use smallvec::SmallVec;
            use std::mem::size_of;
            $(
                assert_eq!(
                    size_of::<VariableSet<$t>>(),
                    size_of::<SmallVec<[(); 0]>>()
                );
            )*
        }
    };
}

variable_id![lasso_id_size, LargeSpur, Spur, MiniSpur, MicroSpur];
variable_id![unsigned_id_size, u8, u16, u32, u64, usize];
variable_id![signed_id_size, i8, i16, i32, i64, isize];

/// A set of variables, such as the conditioning set of an independence test or the separating set
/// recorded for a removed edge.
///
/// This implementation avoids heap allocations for sets containing a number of variables smaller
/// than the length of [`VariableId::SmallArray`].
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VariableSet<V: VariableId>(SmallVec<V::SmallArray>);

impl<V: VariableId> VariableSet<V> {
    /// Creates a variable set containing the specified variables.
    ///
    /// It's okay if the provided slice contains duplicates.
    pub fn new(ids: &[V]) -> Self {
        let mut v = SmallVec::from_slice(ids);
        v.sort_unstable();
        v.dedup();
        VariableSet(v)
    }

    /// The number of variables in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set contains no variables.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if the given variable is a member of this set.
    pub fn contains(&self, id: V) -> bool {
        self.0.binary_search(&id).is_ok()
    }

    /// Returns an iterator over the variables which appear in this set.
    ///
    /// ```
    /// use pcalg::VariableSet;
    ///
    /// let abc = VariableSet::new(&[2, 3, 1]);
    /// let mut it = abc.iter();
    /// assert_eq!(it.next(), Some(1));
    /// assert_eq!(it.next(), Some(2));
    /// assert_eq!(it.next(), Some(3));
    /// assert_eq!(it.next(), None);
    /// ```
    pub fn iter(&self) -> impl Iterator<Item = V> + SortedByItem + Clone + '_ {
        self.0.iter().copied().assume_sorted_by_item()
    }

    /// Returns `true` if `other` contains every variable that `self` does.
    ///
    /// ```
    /// use pcalg::VariableSet;
    /// let nil = VariableSet::new(&[]);
    /// let one = VariableSet::new(&[1]);
    ///
    /// assert!(nil.is_subset(&one));
    /// assert!(nil.is_subset(&nil));
    /// assert!(one.is_subset(&one));
    /// assert!(!one.is_subset(&nil));
    /// ```
    pub fn is_subset(&self, other: &Self) -> bool {
        self.len() <= other.len() && self.iter().intersection(other.iter()).eq(self.iter())
    }

    /// Returns a copy of this set with the given variable removed, if present.
    pub fn without(&self, id: V) -> Self {
        VariableSet(self.0.iter().copied().filter(|v| *v != id).collect())
    }

    /// Returns an iterator over every subset of this set containing exactly `size` variables, in
    /// lexicographic order over the set's natural variable order.
    ///
    /// This is the canonical enumeration order used by [`PcEstimator::estimate_skeleton`] when
    /// searching for separating sets, so the first satisfying subset it finds is reproducible.
    ///
    /// ```
    /// use pcalg::VariableSet;
    ///
    /// let abc = VariableSet::new(&[1, 2, 3]);
    /// let pairs: Vec<_> = abc.subsets(2).collect();
    /// assert_eq!(pairs, vec![
    ///     VariableSet::new(&[1, 2]),
    ///     VariableSet::new(&[1, 3]),
    ///     VariableSet::new(&[2, 3]),
    /// ]);
    ///
    /// assert_eq!(abc.subsets(0).count(), 1);
    /// assert_eq!(abc.subsets(4).count(), 0);
    /// ```
    pub fn subsets(&self, size: usize) -> impl Iterator<Item = Self> + '_ {
        let n = self.0.len();
        let mut indices: Vec<usize> = (0..size).collect();
        let mut done = size > n;
        iter::from_fn(move || {
            if done {
                return None;
            }
            let subset = VariableSet(indices.iter().map(|&i| self.0[i]).collect());
            // Advance to the next combination, rightmost index first.
            let mut i = size;
            loop {
                if i == 0 {
                    done = true;
                    break;
                }
                i -= 1;
                if indices[i] != i + n - size {
                    indices[i] += 1;
                    for j in i + 1..size {
                        indices[j] = indices[j - 1] + 1;
                    }
                    break;
                }
            }
            Some(subset)
        })
    }
}

impl<V: VariableId> std::fmt::Debug for VariableSet<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

impl<V: VariableId> iter::FromIterator<V> for VariableSet<V> {
    /// Creates a variable set containing the specified variables.
    ///
    /// It's okay if the provided iterator contains duplicates.
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        let mut v = SmallVec::from_iter(iter);
        v.sort_unstable();
        v.dedup();
        VariableSet(v)
    }
}

/// Errors raised while assembling a [`Dataset`].
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// A column with the same variable id was already added.
    #[error("column already present in dataset")]
    DuplicateColumn,

    /// Every column must contain one value (or missing marker) per row.
    #[error("column length mismatch: dataset has {expected} rows, column has {got}")]
    LengthMismatch {
        /// Number of rows in the dataset so far.
        expected: usize,
        /// Number of values in the offending column.
        got: usize,
    },

    /// An observed state fell outside the column's declared domain.
    #[error("state {state} out of declared domain of {states} states")]
    StateOutOfDomain {
        /// The largest offending state index.
        state: u32,
        /// The declared domain size.
        states: usize,
    },

    /// A domain must contain at least one state, either declared explicitly or inferred from at
    /// least one non-missing observation.
    #[error("column has an empty domain")]
    EmptyDomain,
}

#[derive(Clone, Debug)]
struct Column {
    states: usize,
    values: Vec<Option<u32>>,
}

/// A table of discrete observations, one column per variable.
///
/// Each cell holds a state index within the variable's finite, ordered domain `0..states`, or
/// `None` for a missing value. The domain of a column is either declared explicitly or inferred
/// as one more than the largest observed state index. The dataset is only ever read to compute
/// empirical counts; nothing mutates it after construction.
#[derive(Clone, Debug)]
pub struct Dataset<V: VariableId> {
    variables: VariableSet<V>,
    columns: HashMap<V, Column>,
    rows: usize,
}

impl<V: VariableId> Dataset<V> {
    /// Creates an empty dataset.
    pub fn new() -> Self {
        Dataset {
            variables: VariableSet::new(&[]),
            columns: HashMap::new(),
            rows: 0,
        }
    }

    /// Adds one column of observations for the variable `id`.
    ///
    /// If `states` is `None` the domain is inferred from the observed values. All columns must
    /// have the same number of rows.
    ///
    /// ```
    /// use pcalg::Dataset;
    ///
    /// let mut data = Dataset::new();
    /// data.add_column(1u8, None, vec![Some(0), Some(1), None]).unwrap();
    /// data.add_column(2u8, Some(3), vec![Some(2), Some(0), Some(1)]).unwrap();
    /// assert_eq!(data.rows(), 3);
    /// assert_eq!(data.domain_size(1), Some(2));
    /// assert_eq!(data.domain_size(2), Some(3));
    /// ```
    pub fn add_column(
        &mut self,
        id: V,
        states: Option<usize>,
        values: Vec<Option<u32>>,
    ) -> Result<&mut Self, DatasetError> {
        if self.columns.contains_key(&id) {
            return Err(DatasetError::DuplicateColumn);
        }
        if !self.columns.is_empty() && values.len() != self.rows {
            return Err(DatasetError::LengthMismatch {
                expected: self.rows,
                got: values.len(),
            });
        }

        let observed_max = values.iter().filter_map(|v| *v).max();
        let states = match states {
            Some(0) => return Err(DatasetError::EmptyDomain),
            Some(states) => states,
            None => match observed_max {
                Some(max) => max as usize + 1,
                None => return Err(DatasetError::EmptyDomain),
            },
        };
        if let Some(max) = observed_max {
            if max as usize >= states {
                return Err(DatasetError::StateOutOfDomain { state: max, states });
            }
        }

        self.rows = values.len();
        self.columns.insert(id, Column { states, values });
        self.variables = self.columns.keys().copied().collect();
        Ok(self)
    }

    /// The number of rows in the dataset.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// The set of variables the dataset has columns for.
    pub fn variables(&self) -> &VariableSet<V> {
        &self.variables
    }

    /// The declared domain size of the given variable, if it has a column.
    pub fn domain_size(&self, id: V) -> Option<usize> {
        self.columns.get(&id).map(|column| column.states)
    }
}

impl<V: VariableId> Default for Dataset<V> {
    fn default() -> Self {
        Dataset::new()
    }
}

/// How rows with missing values are treated when computing counts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MissingDataPolicy {
    /// Exclude a row from every count if it has a missing value in *any* column. This is the
    /// default: all tests then draw from the same set of rows.
    CompleteSamples,

    /// Exclude a row from a count only if it has a missing value in one of the variables involved
    /// in that count. Different tests then see different sample sizes, which changes test
    /// semantics.
    AvailableSamples,
}

impl Default for MissingDataPolicy {
    fn default() -> Self {
        MissingDataPolicy::CompleteSamples
    }
}

/// Errors raised by a single conditional independence test.
#[derive(Debug, thiserror::Error)]
pub enum IndependenceError {
    /// The two tested variables must be distinct.
    #[error("tested variables must be distinct")]
    IdenticalVariables,

    /// The conditioning set must not contain either tested variable.
    #[error("conditioning set overlaps the tested pair")]
    OverlappingConditioningSet,

    /// A tested or conditioning variable has no column in the dataset.
    #[error("variable not present in dataset")]
    UnknownVariable,

    /// After dropping cells with zero expected frequency, fewer than two cells remain, so the
    /// chi-square statistic is undefined. The test is untestable rather than failed; callers may
    /// skip it or treat the pair conservatively.
    #[error("degenerate test: only {retained} cells with nonzero expected frequency")]
    Degenerate {
        /// Number of cells that survived the zero-expected filter.
        retained: usize,
    },
}

/// A chi-square conditional independence oracle over a [`Dataset`].
///
/// The oracle is a stateless function of the data and the tested variable subset; constructing it
/// only precomputes which rows are admissible under the chosen [`MissingDataPolicy`].
pub struct ChiSquareTest<'a, V: VariableId> {
    data: &'a Dataset<V>,
    complete_rows: Option<Vec<bool>>,
}

impl<'a, V: VariableId> ChiSquareTest<'a, V> {
    /// Creates an oracle for the given dataset and missing-data policy.
    pub fn new(data: &'a Dataset<V>, policy: MissingDataPolicy) -> Self {
        let complete_rows = match policy {
            MissingDataPolicy::CompleteSamples => Some(
                (0..data.rows)
                    .map(|row| {
                        data.columns
                            .values()
                            .all(|column| column.values[row].is_some())
                    })
                    .collect(),
            ),
            MissingDataPolicy::AvailableSamples => None,
        };
        ChiSquareTest {
            data,
            complete_rows,
        }
    }

    /// Tests whether `x` is independent of `y` given the conditioning set `z`.
    ///
    /// Observed frequencies over the full declared joint domain of `(x, y, z)` are compared with
    /// the expected frequencies under conditional independence,
    /// `expected(x,y,z) = count(x,z) * count(y,z) / count(z)`, using a Pearson chi-square
    /// statistic. Cells whose expected frequency is zero are dropped, which also corrects the
    /// degrees of freedom.
    ///
    /// Returns the p-value: the probability of falsely rejecting the hypothesis that the
    /// variables are dependent. A low p-value (below the significance threshold) indicates
    /// dependence.
    ///
    /// When fewer samples are available than the heuristic minimum of
    /// `(|dom x|-1) * (|dom y|-1) * prod |dom z_i|` (at least five observations per parameter on
    /// average, per Spirtes et al.), a warning is logged but the test still runs; the caller
    /// absorbs the unreliability.
    pub fn test(&self, x: V, y: V, z: &VariableSet<V>) -> Result<f64, IndependenceError> {
        if x == y {
            return Err(IndependenceError::IdenticalVariables);
        }
        if z.contains(x) || z.contains(y) {
            return Err(IndependenceError::OverlappingConditioningSet);
        }
        let col_x = self
            .data
            .columns
            .get(&x)
            .ok_or(IndependenceError::UnknownVariable)?;
        let col_y = self
            .data
            .columns
            .get(&y)
            .ok_or(IndependenceError::UnknownVariable)?;
        let z_cols = z
            .iter()
            .map(|id| {
                self.data
                    .columns
                    .get(&id)
                    .ok_or(IndependenceError::UnknownVariable)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let card_x = col_x.states;
        let card_y = col_y.states;
        let card_z: usize = z_cols.iter().map(|column| column.states).product();

        // Joint counts over the full declared domain, zero-filled for unobserved combinations.
        // The z-combination index is mixed-radix over the conditioning columns.
        let mut observed = vec![0.0f64; card_x * card_y * card_z];
        let mut samples = 0usize;
        'rows: for row in 0..self.data.rows {
            if let Some(complete) = &self.complete_rows {
                if !complete[row] {
                    continue;
                }
            }
            let xv = match col_x.values[row] {
                Some(v) => v as usize,
                None => continue,
            };
            let yv = match col_y.values[row] {
                Some(v) => v as usize,
                None => continue,
            };
            let mut zi = 0usize;
            for column in &z_cols {
                match column.values[row] {
                    Some(v) => zi = zi * column.states + v as usize,
                    None => continue 'rows,
                }
            }
            observed[(zi * card_x + xv) * card_y + yv] += 1.0;
            samples += 1;
        }

        let recommended = card_x.saturating_sub(1) * card_y.saturating_sub(1) * card_z;
        if samples < recommended {
            warn!(
                ?x,
                ?y,
                conditioning = ?z,
                available = samples,
                recommended,
                "insufficient samples for chi-square independence test"
            );
        }

        // Marginal counts: (x,z) summing out y, (y,z) summing out x, and z alone.
        let mut xz = vec![0.0f64; card_x * card_z];
        let mut yz = vec![0.0f64; card_y * card_z];
        let mut zc = vec![0.0f64; card_z];
        for zi in 0..card_z {
            for xi in 0..card_x {
                for yi in 0..card_y {
                    let count = observed[(zi * card_x + xi) * card_y + yi];
                    xz[zi * card_x + xi] += count;
                    yz[zi * card_y + yi] += count;
                    zc[zi] += count;
                }
            }
        }

        // Pearson statistic over cells with nonzero expected frequency. A z-combination with no
        // observations contributes no defined cells at all.
        let mut statistic = 0.0;
        let mut retained = 0usize;
        for zi in 0..card_z {
            if zc[zi] == 0.0 {
                continue;
            }
            for xi in 0..card_x {
                for yi in 0..card_y {
                    let expected = xz[zi * card_x + xi] * yz[zi * card_y + yi] / zc[zi];
                    if expected == 0.0 {
                        continue;
                    }
                    let count = observed[(zi * card_x + xi) * card_y + yi];
                    statistic += (count - expected) * (count - expected) / expected;
                    retained += 1;
                }
            }
        }

        if retained < 2 {
            return Err(IndependenceError::Degenerate { retained });
        }

        // retained >= 2 guarantees at least one degree of freedom.
        let chi2 = ChiSquared::new((retained - 1) as f64).unwrap();
        Ok(1.0 - chi2.cdf(statistic))
    }
}

/// An undirected graph over variables, used for the skeleton of the estimated structure.
///
/// The graph starts complete and only ever loses edges; a removed edge is never re-added.
#[derive(Clone, Debug)]
pub struct Skeleton<V: VariableId> {
    graph: StableUnGraph<V, ()>,
    index: HashMap<V, NodeIndex>,
}

impl<V: VariableId> Skeleton<V> {
    /// Creates the complete undirected graph over the given variables.
    pub fn complete(variables: &VariableSet<V>) -> Self {
        let n = variables.len();
        let mut graph = StableUnGraph::with_capacity(n, n * n.saturating_sub(1) / 2);
        let mut index = HashMap::with_capacity(n);
        let ids: Vec<NodeIndex> = variables
            .iter()
            .map(|v| {
                let ix = graph.add_node(v);
                index.insert(v, ix);
                ix
            })
            .collect();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                graph.add_edge(a, b, ());
            }
        }
        Skeleton { graph, index }
    }

    /// The set of variables in the graph.
    pub fn variables(&self) -> VariableSet<V> {
        self.index.keys().copied().collect()
    }

    /// Returns `true` if the two variables are adjacent.
    pub fn has_edge(&self, a: V, b: V) -> bool {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(&ia), Some(&ib)) => self.graph.find_edge(ia, ib).is_some(),
            _ => false,
        }
    }

    /// Removes the edge between the two variables, if present.
    pub fn remove_edge(&mut self, a: V, b: V) {
        if let (Some(&ia), Some(&ib)) = (self.index.get(&a), self.index.get(&b)) {
            if let Some(edge) = self.graph.find_edge(ia, ib) {
                self.graph.remove_edge(edge);
            }
        }
    }

    /// The current neighbors of the given variable.
    pub fn neighbors(&self, id: V) -> VariableSet<V> {
        match self.index.get(&id) {
            Some(&ix) => self.graph.neighbors(ix).map(|n| self.graph[n]).collect(),
            None => VariableSet::new(&[]),
        }
    }

    /// The current number of neighbors of the given variable.
    pub fn degree(&self, id: V) -> usize {
        match self.index.get(&id) {
            Some(&ix) => self.graph.neighbors(ix).count(),
            None => 0,
        }
    }

    /// The current number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All current edges as unordered pairs, sorted for deterministic iteration.
    pub fn edges(&self) -> Vec<(V, V)> {
        let mut edges: Vec<(V, V)> = self
            .graph
            .edge_references()
            .map(|edge| {
                let a = self.graph[edge.source()];
                let b = self.graph[edge.target()];
                if a <= b {
                    (a, b)
                } else {
                    (b, a)
                }
            })
            .collect();
        edges.sort_unstable();
        edges
    }
}

/// A map from unordered variable pairs to the conditioning set that rendered them independent.
///
/// Populated exactly once per removed skeleton edge; only defined for pairs that are non-adjacent
/// in the final skeleton.
#[derive(Clone, Debug)]
pub struct SeparatingSets<V: VariableId>(HashMap<(V, V), VariableSet<V>>);

impl<V: VariableId> SeparatingSets<V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        SeparatingSets(HashMap::new())
    }

    fn key(a: V, b: V) -> (V, V) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Records the separating set for the pair `{a, b}`.
    pub fn insert(&mut self, a: V, b: V, separating_set: VariableSet<V>) {
        self.0.insert(Self::key(a, b), separating_set);
    }

    /// The separating set recorded for the pair `{a, b}`, if any.
    pub fn get(&self, a: V, b: V) -> Option<&VariableSet<V>> {
        self.0.get(&Self::key(a, b))
    }

    /// The number of pairs with a recorded separating set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no separating set has been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V: VariableId> Default for SeparatingSets<V> {
    fn default() -> Self {
        SeparatingSets::new()
    }
}

/// A partially directed graph over variables: the output of the PC algorithm.
///
/// An edge present in both directions denotes an undirected (undetermined) edge; an edge present
/// in only one direction is a forced orientation. Created from a [`Skeleton`] with every edge
/// bidirected, then orientation rules selectively remove directions; edges are never added.
#[derive(Clone, Debug)]
pub struct Pdag<V: VariableId> {
    graph: StableDiGraph<V, ()>,
    index: HashMap<V, NodeIndex>,
}

impl<V: VariableId> Pdag<V> {
    /// Creates a PDAG from a skeleton, with every skeleton edge initially bidirected.
    pub fn from_skeleton(skeleton: &Skeleton<V>) -> Self {
        let variables = skeleton.variables();
        let mut graph = StableDiGraph::with_capacity(variables.len(), 2 * skeleton.edge_count());
        let mut index = HashMap::with_capacity(variables.len());
        for v in variables.iter() {
            index.insert(v, graph.add_node(v));
        }
        for (a, b) in skeleton.edges() {
            let (ia, ib) = (index[&a], index[&b]);
            graph.add_edge(ia, ib, ());
            graph.add_edge(ib, ia, ());
        }
        Pdag { graph, index }
    }

    /// The set of variables in the graph.
    pub fn nodes(&self) -> VariableSet<V> {
        self.index.keys().copied().collect()
    }

    /// Returns `true` if the directed edge `a -> b` is present.
    pub fn has_edge(&self, a: V, b: V) -> bool {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(&ia), Some(&ib)) => self.graph.find_edge(ia, ib).is_some(),
            _ => false,
        }
    }

    /// Removes the directed edge `a -> b`, if present.
    pub fn remove_edge(&mut self, a: V, b: V) {
        if let (Some(&ia), Some(&ib)) = (self.index.get(&a), self.index.get(&b)) {
            if let Some(edge) = self.graph.find_edge(ia, ib) {
                self.graph.remove_edge(edge);
            }
        }
    }

    /// Returns `true` if the edge between `a` and `b` is present in both directions.
    pub fn is_undirected(&self, a: V, b: V) -> bool {
        self.has_edge(a, b) && self.has_edge(b, a)
    }

    /// Returns `true` if `a -> b` is present and `b -> a` is not.
    pub fn is_directed(&self, a: V, b: V) -> bool {
        self.has_edge(a, b) && !self.has_edge(b, a)
    }

    /// Returns `true` if any edge connects `a` and `b`, in either direction.
    pub fn is_adjacent(&self, a: V, b: V) -> bool {
        self.has_edge(a, b) || self.has_edge(b, a)
    }

    /// The targets of directed edge instances leaving the given variable.
    pub fn successors(&self, id: V) -> VariableSet<V> {
        self.directed_neighbors(id, Direction::Outgoing)
    }

    /// The sources of directed edge instances entering the given variable.
    pub fn predecessors(&self, id: V) -> VariableSet<V> {
        self.directed_neighbors(id, Direction::Incoming)
    }

    fn directed_neighbors(&self, id: V, direction: Direction) -> VariableSet<V> {
        match self.index.get(&id) {
            Some(&ix) => self
                .graph
                .neighbors_directed(ix, direction)
                .map(|n| self.graph[n])
                .collect(),
            None => VariableSet::new(&[]),
        }
    }

    /// The current number of directed edge instances. An undirected edge counts twice.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All directed edge instances, sorted for deterministic iteration. An undirected edge
    /// between `a` and `b` appears as both `(a, b)` and `(b, a)`.
    pub fn edges(&self) -> Vec<(V, V)> {
        let mut edges: Vec<(V, V)> = self
            .graph
            .edge_references()
            .map(|edge| (self.graph[edge.source()], self.graph[edge.target()]))
            .collect();
        edges.sort_unstable();
        edges
    }

    /// Returns `true` if there is a simple path from `from` to `to` using only strictly directed
    /// edges.
    pub fn has_directed_path(&self, from: V, to: V) -> bool {
        let (ia, ib) = match (self.index.get(&from), self.index.get(&to)) {
            (Some(&ia), Some(&ib)) => (ia, ib),
            _ => return false,
        };
        all_simple_paths::<Vec<_>, _>(&self.graph, ia, ib, 0, None).any(|path| {
            path.windows(2)
                .all(|hop| self.graph.find_edge(hop[1], hop[0]).is_none())
        })
    }

    /// Orients unshielded colliders: for every non-adjacent pair `(x, y)` with a common neighbor
    /// `z` that is not in the pair's separating set, keep only `x -> z` and `y -> z`.
    ///
    /// `z` not being the reason `x` and `y` were judged independent implies `x, z, y` form a
    /// v-structure (Koller & Friedman, Algorithm 3.4).
    pub fn orient_colliders(
        &mut self,
        skeleton: &Skeleton<V>,
        separating_sets: &SeparatingSets<V>,
    ) {
        let nodes: Vec<V> = self.nodes().iter().collect();
        for (i, &x) in nodes.iter().enumerate() {
            for &y in &nodes[i + 1..] {
                if skeleton.has_edge(x, y) {
                    continue;
                }
                let x_neighbors = skeleton.neighbors(x);
                let y_neighbors = skeleton.neighbors(y);
                let common: VariableSet<V> =
                    x_neighbors.iter().intersection(y_neighbors.iter()).collect();
                for z in common.iter() {
                    let separated_by_z = separating_sets
                        .get(x, y)
                        .map_or(false, |separating_set| separating_set.contains(z));
                    if !separated_by_z {
                        self.remove_edge(z, x);
                        self.remove_edge(z, y);
                    }
                }
            }
        }
    }

    /// Applies the three Meek orientation rules until a full pass changes no edge.
    ///
    /// Each pass that makes progress strictly decreases the number of directed edge instances, so
    /// the loop terminates; the edge count is compared before and after every pass. Applying this
    /// method again after convergence leaves the graph unchanged.
    pub fn propagate(&mut self) {
        let nodes: Vec<V> = self.nodes().iter().collect();
        loop {
            let edges = self.edge_count();
            self.rule_one(&nodes);
            self.rule_two(&nodes);
            self.rule_three(&nodes);
            if self.edge_count() == edges {
                break;
            }
        }
    }

    /// Meek rule 1: `x -> z` with `z - y` undirected and `x, y` non-adjacent forces `z -> y`,
    /// since `y -> z` would create a new unshielded collider at `z`.
    fn rule_one(&mut self, nodes: &[V]) {
        for &x in nodes {
            for &z in nodes {
                if z == x || !self.is_directed(x, z) {
                    continue;
                }
                for &y in nodes {
                    if y == x || y == z {
                        continue;
                    }
                    if self.is_undirected(z, y) && !self.is_adjacent(x, y) {
                        self.remove_edge(y, z);
                    }
                }
            }
        }
    }

    /// Meek rule 2: `x - y` undirected with a strictly directed path from `x` to `y` forces
    /// `x -> y`, since `y -> x` would create a directed cycle.
    fn rule_two(&mut self, nodes: &[V]) {
        for &x in nodes {
            for &y in nodes {
                if y == x || !self.is_undirected(x, y) {
                    continue;
                }
                if self.has_directed_path(x, y) {
                    self.remove_edge(y, x);
                }
            }
        }
    }

    /// Meek rule 3: non-adjacent `x, y` both undirected-adjacent to `z`, with a common neighbor
    /// `w` such that `x -> w`, `y -> w`, and `z - w` undirected, forces `z -> w`; orienting
    /// `w -> z` instead would force a new unshielded collider or a cycle through rules 1 and 2.
    fn rule_three(&mut self, nodes: &[V]) {
        for (i, &x) in nodes.iter().enumerate() {
            for &y in &nodes[i + 1..] {
                if self.is_adjacent(x, y) {
                    continue;
                }
                for &z in nodes {
                    if z == x || z == y {
                        continue;
                    }
                    if !self.is_undirected(z, x) || !self.is_undirected(z, y) {
                        continue;
                    }
                    for &w in nodes {
                        if w == x || w == y || w == z {
                            continue;
                        }
                        if self.is_directed(x, w)
                            && self.is_directed(y, w)
                            && self.is_undirected(z, w)
                        {
                            self.remove_edge(w, z);
                        }
                    }
                }
            }
        }
    }
}

/// Orients a skeleton into a PDAG using the recorded separating sets.
///
/// Every skeleton edge starts bidirected; unshielded colliders are oriented first, then the Meek
/// rules are iterated to a fixed point. Deterministic: node pairs are visited in the variables'
/// natural order, so running this twice on the same inputs yields identical PDAGs.
pub fn orient<V: VariableId>(
    skeleton: &Skeleton<V>,
    separating_sets: &SeparatingSets<V>,
) -> Pdag<V> {
    let mut pdag = Pdag::from_skeleton(skeleton);
    pdag.orient_colliders(skeleton, separating_sets);
    pdag.propagate();
    pdag
}

/// Estimates a DAG pattern for a dataset with the PC algorithm.
///
/// Independencies are determined with [`ChiSquareTest`] at the configured significance threshold.
/// The lower the threshold, the more likely dependencies are rejected, resulting in a sparser
/// graph.
pub struct PcEstimator<'a, V: VariableId> {
    data: &'a Dataset<V>,
    significance: f64,
    missing_data: MissingDataPolicy,
}

impl<'a, V: VariableId> PcEstimator<'a, V> {
    /// Creates an estimator with the default significance threshold of 0.05 and the
    /// complete-samples missing-data policy.
    pub fn new(data: &'a Dataset<V>) -> Self {
        PcEstimator {
            data,
            significance: 0.05,
            missing_data: MissingDataPolicy::CompleteSamples,
        }
    }

    /// Sets the significance threshold for the independence tests.
    pub fn with_significance(mut self, significance: f64) -> Self {
        self.significance = significance;
        self
    }

    /// Sets the missing-data policy for the independence tests.
    pub fn with_missing_data_policy(mut self, policy: MissingDataPolicy) -> Self {
        self.missing_data = policy;
        self
    }

    /// Estimates the undirected skeleton and the separating sets that justify each removed edge
    /// (Neapolitan, Algorithm 10.2; Koller & Friedman, Algorithm 3.3).
    ///
    /// Starting from the complete graph, edges whose endpoints test independent conditioned on
    /// some size-`k` subset of one endpoint's other neighbors are removed, for growing `k`. The
    /// first satisfying subset in lexicographic order wins and is recorded as the pair's
    /// separating set. The loop ends once every variable has fewer than `k` neighbors.
    pub fn estimate_skeleton(
        &self,
    ) -> Result<(Skeleton<V>, SeparatingSets<V>), IndependenceError> {
        let oracle = ChiSquareTest::new(self.data, self.missing_data);
        let mut graph = Skeleton::complete(self.data.variables());
        let mut separating_sets = SeparatingSets::new();

        let mut limit = 0;
        while self
            .data
            .variables()
            .iter()
            .any(|v| graph.degree(v) >= limit)
        {
            self.prune_pass(&oracle, &mut graph, &mut separating_sets, limit)?;
            limit += 1;
        }

        Ok((graph, separating_sets))
    }

    /// One pruning round at a fixed conditioning-set size.
    fn prune_pass(
        &self,
        oracle: &ChiSquareTest<'a, V>,
        graph: &mut Skeleton<V>,
        separating_sets: &mut SeparatingSets<V>,
        size: usize,
    ) -> Result<(), IndependenceError> {
        for node in self.data.variables().iter() {
            // The graph mutates during the pass, so iterate over a stable snapshot and skip
            // pairs whose edge was already removed from the other side.
            let snapshot = graph.neighbors(node);
            for neighbor in snapshot.iter() {
                if !graph.has_edge(node, neighbor) {
                    continue;
                }
                let candidates = graph.neighbors(node).without(neighbor);
                for subset in candidates.subsets(size) {
                    match oracle.test(node, neighbor, &subset) {
                        Ok(p_value) if p_value >= self.significance => {
                            // Reject the hypothesis that they are dependent; the first
                            // satisfying subset wins.
                            separating_sets.insert(node, neighbor, subset);
                            graph.remove_edge(node, neighbor);
                            break;
                        }
                        Ok(_) => {}
                        // An untestable cell pattern cannot justify removing the edge.
                        Err(IndependenceError::Degenerate { .. }) => {}
                        Err(error) => return Err(error),
                    }
                }
            }
        }
        Ok(())
    }

    /// Estimates the full DAG pattern: skeleton estimation followed by orientation.
    ///
    /// The returned [`Pdag`] may contain undirected (bidirected) edges; any completion picking
    /// one direction per such edge without creating new colliders or cycles yields an equivalent
    /// DAG.
    pub fn estimate(&self) -> Result<Pdag<V>, IndependenceError> {
        let (skeleton, separating_sets) = self.estimate_skeleton()?;
        Ok(orient(&skeleton, &separating_sets))
    }
}
