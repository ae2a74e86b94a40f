use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::builder::Strategy;
use crate::coverage::CoverageRelation;
use crate::error::BuildWarning;

/// One coordinate of a component index: a number or a label such as an
/// axis name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexItem {
    Int(u32),
    Label(String),
}

impl From<u32> for IndexItem {
    fn from(value: u32) -> Self {
        IndexItem::Int(value)
    }
}

impl From<&str> for IndexItem {
    fn from(value: &str) -> Self {
        IndexItem::Label(value.to_string())
    }
}

impl From<bool> for IndexItem {
    fn from(value: bool) -> Self {
        IndexItem::Label(value.to_string())
    }
}

impl fmt::Display for IndexItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexItem::Int(v) => write!(f, "{v}"),
            IndexItem::Label(s) => f.write_str(s),
        }
    }
}

/// Index tuple of a variable, parameter or constraint. Scalars use the
/// empty tuple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Index(pub Vec<IndexItem>);

impl Index {
    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }

    pub fn int(&self, pos: usize) -> Option<u32> {
        match self.0.get(pos)? {
            IndexItem::Int(v) => Some(*v),
            IndexItem::Label(_) => None,
        }
    }

    pub fn label(&self, pos: usize) -> Option<&str> {
        match self.0.get(pos)? {
            IndexItem::Label(s) => Some(s),
            IndexItem::Int(_) => None,
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_scalar() {
            return Ok(());
        }
        f.write_str("[")?;
        for (n, item) in self.0.iter().enumerate() {
            if n > 0 {
                f.write_str(",")?;
            }
            write!(f, "{item}")?;
        }
        f.write_str("]")
    }
}

/// Builds an [`Index`] from anything convertible into [`IndexItem`]s.
macro_rules! idx {
    ($($item:expr),* $(,)?) => {
        $crate::model::Index(vec![$($crate::model::IndexItem::from($item)),*])
    };
}
pub(crate) use idx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    pub fn position(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Domain {
    Binary,
    NonNegativeReal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDef {
    pub family: &'static str,
    pub index: Index,
    pub domain: Domain,
    pub upper: Option<f64>,
}

impl fmt::Display for VariableDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.family, self.index)
    }
}

/// `Σ coefficient · variable + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_constant(constant: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant,
        }
    }

    pub fn term(var: VarId, coefficient: f64) -> Self {
        Self {
            terms: vec![(var, coefficient)],
            constant: 0.0,
        }
    }

    pub fn add_term(&mut self, var: VarId, coefficient: f64) {
        self.terms.push((var, coefficient));
    }

    pub fn plus(mut self, var: VarId, coefficient: f64) -> Self {
        self.add_term(var, coefficient);
        self
    }

    pub fn plus_constant(mut self, constant: f64) -> Self {
        self.constant += constant;
        self
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// Value of the expression; `values` is indexed by [`VarId::position`].
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(var, coef)| coef * values.get(var.0).copied().unwrap_or(0.0))
            .sum::<f64>()
            + self.constant
    }
}

impl From<VarId> for LinearExpr {
    fn from(var: VarId) -> Self {
        LinearExpr::term(var, 1.0)
    }
}

impl FromIterator<(VarId, f64)> for LinearExpr {
    fn from_iter<T: IntoIterator<Item = (VarId, f64)>>(iter: T) -> Self {
        Self {
            terms: iter.into_iter().collect(),
            constant: 0.0,
        }
    }
}

impl FromIterator<VarId> for LinearExpr {
    fn from_iter<T: IntoIterator<Item = VarId>>(iter: T) -> Self {
        iter.into_iter().map(|v| (v, 1.0)).collect()
    }
}

impl Add for LinearExpr {
    type Output = LinearExpr;

    fn add(mut self, rhs: LinearExpr) -> LinearExpr {
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
        self
    }
}

impl Neg for LinearExpr {
    type Output = LinearExpr;

    fn neg(self) -> LinearExpr {
        self * -1.0
    }
}

impl Sub for LinearExpr {
    type Output = LinearExpr;

    fn sub(self, rhs: LinearExpr) -> LinearExpr {
        self + (-rhs)
    }
}

impl Mul<f64> for LinearExpr {
    type Output = LinearExpr;

    fn mul(mut self, factor: f64) -> LinearExpr {
        for term in &mut self.terms {
            term.1 *= factor;
        }
        self.constant *= factor;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Sense::Le => "<=",
            Sense::Ge => ">=",
            Sense::Eq => "==",
        })
    }
}

/// A linear row `expr sense rhs` with every variable on the left-hand side.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub family: &'static str,
    pub index: Index,
    pub expr: LinearExpr,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    /// Normalizes `lhs sense rhs` so that all terms sit on the left and all
    /// constants on the right.
    pub fn new(
        family: &'static str,
        index: Index,
        lhs: LinearExpr,
        sense: Sense,
        rhs: LinearExpr,
    ) -> Self {
        let mut expr = lhs - rhs;
        let rhs = 0.0 - expr.constant;
        expr.constant = 0.0;
        Self {
            family,
            index,
            expr,
            sense,
            rhs,
        }
    }

    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.expr.evaluate(values);
        match self.sense {
            Sense::Le => lhs <= self.rhs + tolerance,
            Sense::Ge => lhs >= self.rhs - tolerance,
            Sense::Eq => (lhs - self.rhs).abs() <= tolerance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveSense {
    Maximize,
    Minimize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    pub sense: ObjectiveSense,
    pub expr: LinearExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexSet {
    pub name: &'static str,
    pub members: Vec<IndexItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValues {
    Table(Vec<(Index, f64)>),
    /// Indexed by `[tile, x, y, cell_x, cell_y]`; listed keys are 1, all
    /// others 0.
    Cover(Arc<CoverageRelation>),
}

impl ParamValues {
    pub fn len(&self) -> usize {
        match self {
            ParamValues::Table(values) => values.len(),
            ParamValues::Cover(relation) => relation.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: &'static str,
    pub values: ParamValues,
}

/// Component counts, logged after every build and stored with results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStats {
    pub variables: usize,
    pub binaries: usize,
    pub constraints: usize,
    pub constraint_families: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct PackingModel {
    name: String,
    strategy: Strategy,
    sets: Vec<IndexSet>,
    params: Vec<Param>,
    variables: Vec<VariableDef>,
    lookup: HashMap<&'static str, HashMap<Index, VarId>>,
    constraints: Vec<Constraint>,
    objective: Objective,
    warnings: Vec<BuildWarning>,
}

impl PackingModel {
    pub fn new(name: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            name: name.into(),
            strategy,
            sets: Vec::new(),
            params: Vec::new(),
            variables: Vec::new(),
            lookup: HashMap::new(),
            constraints: Vec::new(),
            objective: Objective {
                sense: ObjectiveSense::Maximize,
                expr: LinearExpr::new(),
            },
            warnings: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn add_set<I, T>(&mut self, name: &'static str, members: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<IndexItem>,
    {
        self.sets.push(IndexSet {
            name,
            members: members.into_iter().map(Into::into).collect(),
        });
    }

    pub fn add_param(&mut self, name: &'static str, values: impl IntoIterator<Item = (Index, f64)>) {
        self.params.push(Param {
            name,
            values: ParamValues::Table(values.into_iter().collect()),
        });
    }

    pub fn add_cover_param(&mut self, name: &'static str, relation: Arc<CoverageRelation>) {
        self.params.push(Param {
            name,
            values: ParamValues::Cover(relation),
        });
    }

    pub fn add_variable(&mut self, family: &'static str, index: Index, domain: Domain) -> VarId {
        self.push_variable(family, index, domain, None)
    }

    pub fn add_bounded_variable(
        &mut self,
        family: &'static str,
        index: Index,
        domain: Domain,
        upper: f64,
    ) -> VarId {
        self.push_variable(family, index, domain, Some(upper))
    }

    fn push_variable(
        &mut self,
        family: &'static str,
        index: Index,
        domain: Domain,
        upper: Option<f64>,
    ) -> VarId {
        let id = VarId(self.variables.len());
        self.lookup
            .entry(family)
            .or_default()
            .insert(index.clone(), id);
        self.variables.push(VariableDef {
            family,
            index,
            domain,
            upper,
        });
        id
    }

    pub fn var(&self, family: &str, index: &Index) -> Option<VarId> {
        self.lookup.get(family)?.get(index).copied()
    }

    pub fn variable(&self, id: VarId) -> &VariableDef {
        &self.variables[id.0]
    }

    pub fn variables(&self) -> &[VariableDef] {
        &self.variables
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn add_constraints(&mut self, constraints: impl IntoIterator<Item = Constraint>) {
        self.constraints.extend(constraints);
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraints_of<'a>(&'a self, family: &'a str) -> impl Iterator<Item = &'a Constraint> {
        self.constraints.iter().filter(move |c| c.family == family)
    }

    pub fn maximize(&mut self, expr: LinearExpr) {
        self.objective = Objective {
            sense: ObjectiveSense::Maximize,
            expr,
        };
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn sets(&self) -> &[IndexSet] {
        &self.sets
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn warnings(&self) -> &[BuildWarning] {
        &self.warnings
    }

    pub fn add_warnings(&mut self, warnings: impl IntoIterator<Item = BuildWarning>) {
        self.warnings.extend(warnings);
    }

    pub fn stats(&self) -> ModelStats {
        let mut constraint_families = BTreeMap::new();
        for c in &self.constraints {
            *constraint_families.entry(c.family.to_string()).or_insert(0) += 1;
        }
        ModelStats {
            variables: self.variables.len(),
            binaries: self
                .variables
                .iter()
                .filter(|v| v.domain == Domain::Binary)
                .count(),
            constraints: self.constraints.len(),
            constraint_families,
        }
    }

    /// Checks a full assignment (indexed by [`VarId::position`]) against
    /// domains, bounds and every constraint.
    pub fn is_feasible(&self, values: &[f64], tolerance: f64) -> bool {
        if values.len() != self.variables.len() {
            return false;
        }
        let domains_ok = self.variables.iter().zip(values).all(|(def, &v)| {
            let in_domain = match def.domain {
                Domain::Binary => v.abs() <= tolerance || (v - 1.0).abs() <= tolerance,
                Domain::NonNegativeReal => v >= -tolerance,
            };
            in_domain && def.upper.is_none_or(|u| v <= u + tolerance)
        });
        domains_ok && self.constraints.iter().all(|c| c.is_satisfied(values, tolerance))
    }

    fn write_expr(&self, f: &mut fmt::Formatter<'_>, expr: &LinearExpr) -> fmt::Result {
        if expr.terms.is_empty() {
            return write!(f, "{}", expr.constant);
        }
        for (n, &(var, coef)) in expr.terms.iter().enumerate() {
            let name = &self.variables[var.0];
            let sign = if coef < 0.0 { "-" } else { "+" };
            let magnitude = coef.abs();
            match (n, magnitude == 1.0) {
                (0, true) if coef < 0.0 => write!(f, "- {name}")?,
                (0, true) => write!(f, "{name}")?,
                (0, false) => write!(f, "{coef} {name}")?,
                (_, true) => write!(f, " {sign} {name}")?,
                (_, false) => write!(f, " {sign} {magnitude} {name}")?,
            }
        }
        if expr.constant != 0.0 {
            let sign = if expr.constant < 0.0 { "-" } else { "+" };
            write!(f, " {sign} {}", expr.constant.abs())?;
        }
        Ok(())
    }
}

impl fmt::Display for PackingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model '{}' ({})", self.name, self.strategy)?;

        writeln!(f, "\n{} Set Declarations", self.sets.len())?;
        for set in &self.sets {
            write!(f, "    {} : size={} : {{", set.name, set.members.len())?;
            for (n, m) in set.members.iter().enumerate() {
                if n > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{m}")?;
            }
            writeln!(f, "}}")?;
        }

        writeln!(f, "\n{} Param Declarations", self.params.len())?;
        for param in &self.params {
            writeln!(f, "    {} : size={}", param.name, param.values.len())?;
            match &param.values {
                ParamValues::Table(values) => {
                    for (index, value) in values {
                        writeln!(f, "        {index} : {value}")?;
                    }
                }
                ParamValues::Cover(relation) => {
                    for k in relation.iter() {
                        writeln!(
                            f,
                            "        [{},{},{},{},{}] : 1",
                            k.placement.tile_id, k.placement.x, k.placement.y, k.cell.x, k.cell.y
                        )?;
                    }
                }
            }
        }

        writeln!(f, "\n{} Var Declarations", self.variables.len())?;
        for var in &self.variables {
            let domain = match var.domain {
                Domain::Binary => "Binary",
                Domain::NonNegativeReal => "NonNegativeReals",
            };
            match var.upper {
                Some(upper) => writeln!(f, "    {var} : {domain} <= {upper}")?,
                None => writeln!(f, "    {var} : {domain}")?,
            }
        }

        writeln!(f, "\n{} Constraint Declarations", self.constraints.len())?;
        for c in &self.constraints {
            write!(f, "    {}{} : ", c.family, c.index)?;
            self.write_expr(f, &c.expr)?;
            writeln!(f, " {} {}", c.sense, c.rhs)?;
        }

        let sense = match self.objective.sense {
            ObjectiveSense::Maximize => "maximize",
            ObjectiveSense::Minimize => "minimize",
        };
        write!(f, "\nObjective : {sense} ")?;
        self.write_expr(f, &self.objective.expr)?;
        writeln!(f)?;

        for warning in &self.warnings {
            writeln!(f, "Warning : {warning}")?;
        }
        Ok(())
    }
}
