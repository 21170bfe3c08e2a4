// Linear expressions over model variables

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

/// Identity of a variable inside one `OptimizationProblem`.
///
/// Ids carry the index handed out by `OptimizationProblem::add_variable`
/// plus a token naming the model that created them. Equality, ordering and
/// hashing look at the index only, so rebuilding the same input yields equal
/// models; ownership checks compare the token.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VariableId {
    model: u64,
    index: usize,
}

impl VariableId {
    pub(crate) fn new(model: u64, index: usize) -> Self {
        Self { model, index }
    }

    pub fn index(self) -> usize {
        self.index
    }

    pub(crate) fn model(self) -> u64 {
        self.model
    }
}

impl PartialEq for VariableId {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for VariableId {}

impl Hash for VariableId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl PartialOrd for VariableId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VariableId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.index)
    }
}

/// Weighted sum of variables plus a constant offset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpression {
    terms: Vec<(VariableId, f64)>,
    constant: f64,
}

impl LinearExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn term(variable: VariableId, coefficient: f64) -> Self {
        Self {
            terms: vec![(variable, coefficient)],
            constant: 0.0,
        }
    }

    pub fn add_term(&mut self, variable: VariableId, coefficient: f64) {
        self.terms.push((variable, coefficient));
    }

    pub fn with_term(mut self, variable: VariableId, coefficient: f64) -> Self {
        self.add_term(variable, coefficient);
        self
    }

    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    /// Raw terms in insertion order, duplicates included.
    pub fn terms(&self) -> &[(VariableId, f64)] {
        &self.terms
    }

    pub fn offset(&self) -> f64 {
        self.constant
    }

    /// Terms with duplicates merged and zero coefficients dropped, ordered by id.
    pub fn compacted(&self) -> Vec<(VariableId, f64)> {
        let mut merged: BTreeMap<VariableId, f64> = BTreeMap::new();
        for &(var, coeff) in &self.terms {
            *merged.entry(var).or_insert(0.0) += coeff;
        }
        merged.into_iter().filter(|&(_, c)| c != 0.0).collect()
    }

    /// Evaluate against a dense value vector; ids beyond it count as zero.
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(var, coeff)| coeff * values.get(var.index()).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.constant
    }

    pub fn variables(&self) -> impl Iterator<Item = VariableId> + '_ {
        self.terms.iter().map(|&(var, _)| var)
    }

    fn scaled(mut self, factor: f64) -> Self {
        for (_, coeff) in &mut self.terms {
            *coeff *= factor;
        }
        self.constant *= factor;
        self
    }
}

impl From<VariableId> for LinearExpression {
    fn from(variable: VariableId) -> Self {
        Self::term(variable, 1.0)
    }
}

impl From<f64> for LinearExpression {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl FromIterator<(VariableId, f64)> for LinearExpression {
    fn from_iter<I: IntoIterator<Item = (VariableId, f64)>>(iter: I) -> Self {
        Self {
            terms: iter.into_iter().collect(),
            constant: 0.0,
        }
    }
}

impl AddAssign for LinearExpression {
    fn add_assign(&mut self, rhs: LinearExpression) {
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
    }
}

impl Add for LinearExpression {
    type Output = LinearExpression;

    fn add(mut self, rhs: LinearExpression) -> LinearExpression {
        self += rhs;
        self
    }
}

impl Add<VariableId> for LinearExpression {
    type Output = LinearExpression;

    fn add(self, rhs: VariableId) -> LinearExpression {
        self.with_term(rhs, 1.0)
    }
}

impl Add<f64> for LinearExpression {
    type Output = LinearExpression;

    fn add(mut self, rhs: f64) -> LinearExpression {
        self.constant += rhs;
        self
    }
}

impl Add<f64> for VariableId {
    type Output = LinearExpression;

    fn add(self, rhs: f64) -> LinearExpression {
        LinearExpression::from(self) + rhs
    }
}

impl Neg for LinearExpression {
    type Output = LinearExpression;

    fn neg(self) -> LinearExpression {
        self.scaled(-1.0)
    }
}

impl Sub for LinearExpression {
    type Output = LinearExpression;

    fn sub(self, rhs: LinearExpression) -> LinearExpression {
        self + (-rhs)
    }
}

impl Sub<VariableId> for LinearExpression {
    type Output = LinearExpression;

    fn sub(self, rhs: VariableId) -> LinearExpression {
        self.with_term(rhs, -1.0)
    }
}

impl Sub<f64> for LinearExpression {
    type Output = LinearExpression;

    fn sub(self, rhs: f64) -> LinearExpression {
        self + (-rhs)
    }
}

impl Mul<f64> for LinearExpression {
    type Output = LinearExpression;

    fn mul(self, rhs: f64) -> LinearExpression {
        self.scaled(rhs)
    }
}

impl Mul<f64> for VariableId {
    type Output = LinearExpression;

    fn mul(self, rhs: f64) -> LinearExpression {
        LinearExpression::term(self, rhs)
    }
}
