///! Definition of the factor module
///!
///! A `Factor` represents a relationship between some set of `Variable`s.

use util::{Result, LauritzenError};
use variable::{Variable, Assignment, all_assignments};

use ndarray::prelude as nd;
use itertools::Itertools;

use std::collections::HashSet;
use std::f64;

/// Alias f64 ndarray::Array as Table
pub type Table = nd::ArrayD<f64>;


/// The pointwise operator used when two `Factor`s are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombinationOp {
    Product,
    Sum,
    Min,
    Max
}

impl CombinationOp {

    fn apply(&self, a: f64, b: f64) -> f64 {
        match *self {
            CombinationOp::Product => a * b,
            CombinationOp::Sum => a + b,
            CombinationOp::Min => a.min(b),
            CombinationOp::Max => a.max(b)
        }
    }

}


/// The operator used when a `Factor` is projected onto a smaller scope: the values of every
/// assignment that agrees on the kept scope are folded together with this operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionOp {
    Sum,
    Max,
    Min
}

impl ProjectionOp {

    /// The neutral starting value of a fold. Factor values are non-negative, so zero is neutral
    /// for both `Sum` and `Max`.
    fn init(&self) -> f64 {
        match *self {
            ProjectionOp::Sum => 0.0,
            ProjectionOp::Max => 0.0,
            ProjectionOp::Min => f64::INFINITY
        }
    }

    fn fold(&self, acc: f64, v: f64) -> f64 {
        match *self {
            ProjectionOp::Sum => acc + v,
            ProjectionOp::Max => acc.max(v),
            ProjectionOp::Min => acc.min(v)
        }
    }

}


#[derive(Clone, Debug)]
pub enum Factor {
    /// The empty, identity `Factor` with no scope. This type exists for dealing with arithmetic
    /// operations of `Factor`s; it behaves as the neutral element of combination.
    Identity,

    /// A `Factor` over some scope of variables. Represented as a table-CPD as described in Koller
    /// & Friedman.
    TableFactor {
        /// The scope of the `Factor`
        scope: Vec<Variable>,

        /// The values of the `Factor` table.
        table: Table,

        /// `true`, if the `Factor` is a conditional probability distribution
        cpd: bool
    }
}


impl Factor {

    /// Get the identity factor
    pub fn identity() -> Self {
        Factor::Identity
    }


    /// Create a new `Factor`.
    ///
    /// An empty scope with an empty table yields the identity `Factor`.
    ///
    /// # Errors
    /// * `LauritzenError::General` if the scope does not match the table dimensions
    /// * `LauritzenError::DuplicateVariable` if a variable appears twice in the scope
    /// * `LauritzenError::NonPositiveProbability` if the table holds a negative value
    pub fn new(scope: Vec<Variable>, table: Table) -> Result<Self> {
        if scope.len() == 0 && table.len() == 0 {
            return Ok(Factor::Identity);
        } else if scope.len() != table.ndim() {
            return Err(
                LauritzenError::General(
                    String::from("Invalid arguments. Cardinality of scope must match number of table dimensions")
                )
            );
        }

        if scope.iter().unique().count() != scope.len() {
            return Err(LauritzenError::DuplicateVariable);
        }

        for (v, t) in scope.iter().map(|&v| v.cardinality()).zip(table.shape().iter()) {
            if v != *t {
                return Err(
                    LauritzenError::General(
                        String::from("Invalid arguments. Dimensions do not match")
                    )
                );
            }
        }

        // factors may not have negative values
        if table.iter().any(|&v| v < 0.0) {
            return Err(LauritzenError::NonPositiveProbability);
        }

        Ok(Factor::TableFactor { scope, table, cpd: false })
    }


    /// Create a Conditional Probability Distribution `P(var | parents)`.
    ///
    /// The scope of the resulting `Factor` is `parents + [var]`: the table's trailing axis ranges
    /// over `var`, and each slice along it must be normalized.
    ///
    /// # Errors
    /// * `LauritzenError::DuplicateVariable` if `var` appears among its own parents
    /// * `LauritzenError::NotACPD` if some conditional distribution does not sum to one
    pub fn cpd(var: Variable, parents: Vec<Variable>, table: Table) -> Result<Self> {
        if parents.contains(&var) {
            return Err(LauritzenError::DuplicateVariable);
        }

        let mut scope = parents;
        scope.push(var);

        let f = Factor::new(scope, table)?;
        if let Factor::TableFactor { scope, table, .. } = f {
            {
                let conditionals = table.sum_axis(nd::Axis(scope.len() - 1));
                if conditionals.iter().any(|&z| (z - 1.0).abs() > 0.001) {
                    return Err(LauritzenError::NotACPD);
                }
            }

            Ok(Factor::TableFactor { scope, table, cpd: true })
        } else {
            Err(LauritzenError::NotACPD)
        }
    }


    /// Create the indicator `Factor` of a single observation: one at `value`, zero elsewhere.
    pub fn indicator(var: Variable, value: usize) -> Result<Self> {
        if value >= var.cardinality() {
            return Err(
                LauritzenError::InvalidArgument(
                    format!("Value {} is outside the domain of a variable with cardinality {}",
                            value, var.cardinality())
                )
            );
        }

        let mut table = Table::zeros(vec![var.cardinality()]);
        table[nd::IxDyn(&[value])] = 1.0;

        Factor::new(vec![var], table)
    }


    /// Create a `Factor` over a single variable holding the same value everywhere
    pub fn constant(var: Variable, value: f64) -> Result<Self> {
        if value < 0.0 {
            return Err(LauritzenError::NonPositiveProbability);
        }

        Factor::new(vec![var], Table::from_elem(vec![var.cardinality()], value))
    }


    /// Check if the `Factor` is the identity `Factor`
    pub fn is_identity(&self) -> bool {
        match self {
            &Factor::Identity => true,
            _ => false
        }
    }


    /// Check if the `Factor` is a Conditional Probability Distribution.
    ///
    /// # Note
    /// A conditional probability distribution is a specialization of a `Factor`. All CPDs are
    /// `Factor`s, but not all `Factor`s are CPDs. The identity `Factor` is considered a CPD.
    pub fn is_cpd(&self) -> bool {
        match self {
            &Factor::Identity => true,
            &Factor::TableFactor { cpd, .. } => cpd
        }
    }


    /// Retrieve the scope of the `Factor`.
    ///
    /// # Note
    /// This method returns a clone of the `Factor`'s scope. `Variable`'s are lightweight and
    /// therefore this is an acceptable overhead
    pub fn scope(&self) -> Vec<Variable> {
        match self {
            &Factor::Identity => vec![],
            &Factor::TableFactor { ref scope, .. } => scope.clone()
        }
    }


    /// Retrieve the value for a complete assignment over the scope of this `Factor`
    ///
    /// # Args
    /// assignment: a full assignment to the scope of a `Factor`. The assignment's scope may be a
    ///             superset of the `Factor`s scope.
    ///
    /// # Errors
    /// * `LauritzenError::General` if the `Factor` is the identity
    /// * `LauritzenError::IncompleteAssignment`, if assignment is not a complete assignment to the
    ///   scope of the `Factor`
    pub fn value(&self, assignment: &Assignment) -> Result<f64> {
        match self {
            &Factor::Identity => {
                Err(LauritzenError::General(String::from("The identity factor has no value")))
            },
            &Factor::TableFactor { ref scope, ref table, .. } => {
                let idxs: Vec<Option<&usize>> = scope.iter().map(|v| assignment.get(v)).collect();
                if idxs.iter().any(|&v| v.is_none()) {
                    return Err(LauritzenError::IncompleteAssignment);
                }

                let idxs: Vec<usize> = idxs.iter().map(|&v| *(v.unwrap())).collect();
                Ok(table[nd::IxDyn(&idxs)])
            }
        }
    }


    /// Combine this `Factor` with another under the given operator.
    ///
    /// The result has scope `union(self.scope(), other.scope())`; disjoint scopes are allowed
    /// (for `CombinationOp::Product` this is the outer product). The identity `Factor` is treated
    /// as the neutral element for every operator.
    ///
    /// Defined in Koller & Friedman Section 4.2.1
    pub fn combine(&self, other: &Self, op: CombinationOp) -> Result<Self> {
        if let &Factor::Identity = self {
            return Ok(other.clone());
        } else if let &Factor::Identity = other {
            return Ok(self.clone());
        }

        // We are computing a new factor Psi(X, Y, Z) = phi1(X, Y) op phi2(Y, Z).
        // See Koller & Friedman Definition 4.2
        let my_scope = self.scope();

        // compute the set union(X, Y, Z)
        let new_scope: Vec<Variable> = my_scope.into_iter()
                                               .chain(other.scope())
                                               .unique()
                                               .collect();

        let new_shape: Vec<usize> = new_scope.iter().map(|&v| v.cardinality()).collect();

        // Allocate space for new table
        let mut tbl = nd::Array::ones(new_shape).into_dyn();

        for assn in all_assignments(&new_scope) {
            // For each assignment, combine the values in each and store the result in the
            // new table
            //
            // Unwrapping here is safe because a failed lookup should be impossible if
            // invariants are maintained
            let phi1_val = self.value(&assn).unwrap();
            let phi2_val = other.value(&assn).unwrap();

            let idx: Vec<usize> = new_scope.iter().map(|v| *assn.get(&v).unwrap()).collect();
            tbl[nd::IxDyn(&idx)] = op.apply(phi1_val, phi2_val);
        }

        Factor::new(new_scope, tbl)
    }


    /// Product of this `Factor` and another `Factor`; shorthand for combination under
    /// `CombinationOp::Product`.
    pub fn product(&self, other: &Self) -> Result<Self> {
        self.combine(other, CombinationOp::Product)
    }


    /// Reduce the `Factor` to over the given partial assignment
    ///
    /// Defined in Koller & Friedman 4.2.3
    ///
    /// # Args
    /// assignment: a partial assignment to the `Factor`
    ///
    /// # Returns
    /// A new `Factor` reduced over the given assignment
    pub fn reduce(&self, assignment: &Assignment) -> Self {
        match self {
            &Factor::Identity => Factor::Identity,
            &Factor::TableFactor { ref scope, ref table, .. } => {
                // reduce table based on assignment
                let mut view = table.view();
                let mut new_shape: Vec<usize> = Vec::new();
                let mut new_scope: Vec<Variable> = Vec::new();

                for (i, &v) in scope.iter().enumerate() {
                    if let Some(&val) = assignment.get(&v) {
                        view.subview_inplace(nd::Axis(new_scope.len()), val);
                    } else {
                        new_shape.push(table.len_of(nd::Axis(i)));
                        new_scope.push(v);
                    }
                }

                if new_scope.len() == 0 {
                    // complete assignment
                    Factor::Identity
                } else if new_scope.len() == scope.len() {
                    // empty assignment (relative to scope)
                    self.clone()
                } else {
                    Factor::new(
                        new_scope,
                        view.to_owned().into_shape(new_shape).expect("reduce encountered error")
                    ).expect(
                        "reduce encountered unexpected error"
                    )
                }
            }
        }
    }


    /// Marginalize the `Factor` over the given `Variable`
    ///
    /// Defined in Koller & Friedman 9.3.1
    ///
    /// # Args
    /// other: the `Variable` over which to marginalize
    ///
    /// # Returns
    /// another `Factor`, marginalized over the given `Variable`
    pub fn marginalize(&self, other: Variable) -> Self {
        match self {
            // the identity factor marginalized over anything is the identity
            &Factor::Identity => Factor::Identity,

            &Factor::TableFactor { ref scope, ref table, .. } => {
                if let Some(idx) = scope.iter().position(|&v| v == other) {
                    let new_table = table.sum_axis(nd::Axis(idx));
                    let new_scope = scope.clone().into_iter().filter(|&v| v != other).collect();

                    Factor::new(new_scope, new_table).expect(
                        "marginalize encountered error that should never occur"
                    )
                } else {
                    // variable not in the scope of this factor, so the factor is already
                    // marginalized over the variable
                    self.clone()
                }
            }
        }
    }


    /// Project the `Factor` onto `keep`: every scope variable outside `keep` is folded out under
    /// the given operator. The kept variables retain their relative order in the scope.
    ///
    /// # Errors
    /// * `LauritzenError::InvalidScope` if no scope variable survives the projection
    pub fn project(&self, keep: &HashSet<Variable>, op: ProjectionOp) -> Result<Self> {
        match self {
            &Factor::Identity => Ok(Factor::Identity),

            &Factor::TableFactor { ref scope, .. } => {
                let kept: Vec<Variable> = scope.iter().filter(|v| keep.contains(v)).cloned().collect();

                if kept.len() == scope.len() {
                    return Ok(self.clone());
                } else if kept.is_empty() {
                    return Err(LauritzenError::InvalidScope);
                }

                let shape: Vec<usize> = kept.iter().map(|v| v.cardinality()).collect();
                let mut tbl = nd::Array::from_elem(shape, op.init()).into_dyn();

                for assn in all_assignments(scope) {
                    let val = self.value(&assn).unwrap();
                    let idx: Vec<usize> = kept.iter().map(|v| *assn.get(v).unwrap()).collect();
                    let slot = &mut tbl[idx.as_slice()];
                    *slot = op.fold(*slot, val);
                }

                Factor::new(kept, tbl)
            }
        }
    }


    /// The sum of every value of the `Factor`. The identity behaves as the constant one.
    pub fn sum(&self) -> f64 {
        match self {
            &Factor::Identity => 1.0,
            &Factor::TableFactor { ref table, .. } => table.scalar_sum()
        }
    }


    /// Fold every value of the `Factor` into a single number under the given operator. The
    /// identity behaves as the constant one.
    pub fn fold_all(&self, op: ProjectionOp) -> f64 {
        match self {
            &Factor::Identity => 1.0,
            &Factor::TableFactor { ref table, .. } => {
                table.iter().fold(op.init(), |acc, &v| op.fold(acc, v))
            }
        }
    }


    /// Normalize the `Factor` so its values sum to one.
    ///
    /// # Errors
    /// * `LauritzenError::IncompatibleEvidence` if the values sum to zero
    pub fn normalize(&self) -> Result<Self> {
        match self {
            &Factor::Identity => Ok(Factor::Identity),
            &Factor::TableFactor { ref scope, ref table, .. } => {
                let z = table.scalar_sum();
                if z <= 0.0 {
                    return Err(LauritzenError::IncompatibleEvidence);
                }

                Ok(Factor::TableFactor {
                    scope: scope.clone(),
                    table: table / z,
                    cpd: true
                })
            }
        }
    }


    /// The assignment maximizing the `Factor` and its value. Ties resolve to the first maximizing
    /// assignment in row-major order.
    ///
    /// # Errors
    /// * `LauritzenError::General` if the `Factor` is the identity
    pub fn argmax(&self) -> Result<(Assignment, f64)> {
        match self {
            &Factor::Identity => {
                Err(LauritzenError::General(String::from("The identity factor has no argmax")))
            },
            &Factor::TableFactor { ref scope, .. } => {
                let mut best: Option<(Assignment, f64)> = None;

                for assn in all_assignments(scope) {
                    let val = self.value(&assn).unwrap();
                    let better = match best {
                        Some((_, b)) => val > b,
                        None => true
                    };

                    if better {
                        best = Some((assn, val));
                    }
                }

                // the scope of a table factor is never empty, so best is always Some
                best.ok_or(LauritzenError::Unknown)
            }
        }
    }

}

// Unit tests
#[cfg(test)]
mod tests {
    use super::*;
    use std;

    #[test]
    fn identity() {
        let f = Factor::identity();
        let f2 = Factor::identity();

        assert!(f.is_identity());
        assert!(f2.is_identity());
    }

    #[test]
    fn table_factor() {
        let vars = vec![ Variable::binary(), Variable::discrete(5), Variable::discrete(3) ];
        let mut table = Table::ones(vec![2, 5, 3]);
        table[[1, 1, 1].as_ref()] = 5.;

        // assert table holds correct values
        let f = Factor::new(vars.clone(), table).unwrap();

        assert!(! f.is_identity());
        for (x, y, z) in iproduct!(0..2, 0..5, 0..3) {
            let mut assn = Assignment::new();
            assn.set(&vars[0], x);
            assn.set(&vars[1], y);
            assn.set(&vars[2], z);

            let val = f.value(&assn).unwrap();
            if x == 1 && y == 1 && z == 1 {
                assert_eq!(5., val);
            } else {
                assert_eq!(1., val);
            }
        }

        assert!(! f.is_cpd());
    }

    #[test]
    fn table_factor_errs() {
        // empty scope, nonempty table
        let vars = vec![];
        let table = Table::ones(vec![2, 5, 3]);
        let f = Factor::new(vars, table);
        assert!(f.is_err());
        match f.expect_err("missing error") {
            LauritzenError::General(_) => assert!(true),
            _ => panic!("wrong error type")
        };

        // mismatched number of dimensions
        let vars = vec![ Variable::binary(), Variable::binary() ];
        let table = Table::ones(vec![2, 2, 2]);
        let f = Factor::new(vars.clone(), table);
        assert!(f.is_err());
        match f.expect_err("missing error") {
            LauritzenError::General(_) => assert!(true),
            _ => panic!("wrong error type")
        };

        // wrong cardinality
        let table = Table::ones(vec![2, 3]);
        let f = Factor::new(vars.clone(), table);
        assert!(f.is_err());
        match f.expect_err("missing error") {
            LauritzenError::General(_) => assert!(true),
            _ => panic!("wrong error type")
        };

        // duplicated variable
        let v = Variable::binary();
        let table = Table::ones(vec![2, 2]);
        let f = Factor::new(vec![v, v], table);
        assert!(f.is_err());
        match f.expect_err("missing error") {
            LauritzenError::DuplicateVariable => assert!(true),
            _ => panic!("wrong error type")
        };

        // negative value
        let table = Table::from_elem(vec![2, 2], -1.0);
        let f = Factor::new(vars.clone(), table);
        assert!(f.is_err());
        match f.expect_err("missing error") {
            LauritzenError::NonPositiveProbability => assert!(true),
            _ => panic!("wrong error type")
        };
    }

    #[test]
    fn cpd() {
        let a = Variable::binary();
        let b = Variable::binary();

        let f = Factor::cpd(b, vec![a], array![[0.95, 0.05], [0.2, 0.8]].into_dyn()).unwrap();
        assert!(f.is_cpd());
        assert_eq!(vec![a, b], f.scope());

        // each conditional must be normalized
        let f = Factor::cpd(b, vec![a], array![[0.95, 0.5], [0.2, 0.8]].into_dyn());
        assert!(f.is_err());
        match f.expect_err("missing error") {
            LauritzenError::NotACPD => assert!(true),
            _ => panic!("wrong error type")
        };
    }

    #[test]
    fn indicator() {
        let a = Variable::discrete(3);

        let f = Factor::indicator(a, 1).unwrap();
        for i in 0..3 {
            let mut assn = Assignment::new();
            assn.set(&a, i);

            let expected = if i == 1 { 1.0 } else { 0.0 };
            assert_eq!(expected, f.value(&assn).unwrap());
        }

        assert!(Factor::indicator(a, 3).is_err());
    }

    #[test]
    fn value() {
        let vars = vec![ Variable::binary(), Variable::binary() ];
        let mut table = Table::ones(vec![2, 2]);

        for (i, (x, y)) in (0..2).zip(0..2).enumerate() {
            table[[x, y].as_ref()] = i as f64;
        }

        let f = Factor::new(vars.clone(), table).expect("Unexpected error");

        // verify behavior on precise assignment
        for (i, (x, y)) in (0..2).zip(0..2).enumerate() {
            let mut assn = Assignment::new();
            assn.set(&vars[0], x);
            assn.set(&vars[1], y);

            assert_eq!(i as f64, f.value(&assn).expect("unexpected error"));
        }

        // verify behavior on full assignment with out of scope values
        let v3 = Variable::binary();

        for (i, (x, y)) in (0..2).zip(0..2).enumerate() {
            let mut assn = Assignment::new();
            assn.set(&vars[0], x);
            assn.set(&vars[1], y);
            assn.set(&v3, 0);

            assert_eq!(i as f64, f.value(&assn).expect("unexpected error"));
        }

        // verify behavior on incomplete assignment
        let mut assn = Assignment::new();
        assn.set(&vars[0], 0);
        assn.set(&v3, 0);

        let res = f.value(&assn);
        assert!(res.is_err());
        match res.expect_err("") {
            LauritzenError::IncompleteAssignment => assert!(true),
            _ => panic!("incorrect error")
        };
    }

    #[test]
    /// Example taken from Koller & Friedman Figure 4.3
    fn product() {
        let a = Variable::discrete(3);
        let b = Variable::binary();
        let c = Variable::binary();

        let tbl1 = nd::Array::from_shape_vec(
            (3, 2),
            vec![ 0.5, 0.8, 0.1, 0., 0.3, 0.9 ]
        ).expect("Unexpected error").into_dyn();
        let phi1 = Factor::new(vec![ a, b ], tbl1).expect("Unexpected error");

        let tbl2 = nd::Array::from_shape_vec(
            (2, 2),
            vec![ 0.5, 0.7, 0.1, 0.2 ]
        ).expect("Unexpected error").into_dyn();
        let phi2 = Factor::new(vec![ b, c ], tbl2).expect("Unexpected error");

        let phi = phi1.product(&phi2).expect("Unexpected error");

        let expected = nd::Array::from_shape_vec(
            (3, 2, 2),
            vec![ 0.25, 0.35, 0.08, 0.16, 0.05, 0.07, 0., 0., 0.15, 0.21, 0.09, 0.18 ]
        ).expect("Unexpected error").into_dyn();

        for (x, y, z) in iproduct!(0..3, 0..2, 0..2) {
            let mut assn = Assignment::new();
            assn.set(&a, x);
            assn.set(&b, y);
            assn.set(&c, z);

            let idx = vec![x, y, z];
            let val = expected[nd::IxDyn(&idx)];

            assert!(
                (val - phi.value(&assn).unwrap()).abs() < std::f64::EPSILON
            );
        }
    }

    #[test]
    fn prod_identity() {
        let a = Variable::discrete(3);
        let b = Variable::binary();

        let tbl1 = nd::Array::from_shape_vec(
            (3, 2),
            vec![ 0.5, 0.8, 0.1, 0., 0.3, 0.9 ]
        ).expect("Unexpected error").into_dyn();
        let phi1 = Factor::new(vec![ a, b ], tbl1.clone()).expect("Unexpected error");

        let phi2 = Factor::identity();
        let phi = phi1.product(&phi2).expect("Unexpected error");

        assert_eq!(phi1.scope(), phi.scope());

        for (x, y) in iproduct!(0..3, 0..2) {
            let mut assn = Assignment::new();
            assn.set(&a, x);
            assn.set(&b, y);

            let idx = vec![x, y];
            let val = tbl1[nd::IxDyn(&idx)];
            assert!(
                (val - phi.value(&assn).unwrap()).abs() < std::f64::EPSILON
            );
        }

        let phi = phi2.product(&phi1).expect("Unexpected error");
        assert_eq!(phi1.scope(), phi.scope());
    }

    #[test]
    /// The product of factors with disjoint scopes is the outer product
    fn prod_disjoint() {
        let a = Variable::discrete(3);
        let b = Variable::binary();

        let tbl1 = array![ 0.2, 0.3, 0.5 ].into_dyn();
        let phi1 = Factor::new(vec![ a ], tbl1.clone()).expect("Unexpected error");

        let tbl2 = array![ 0.4, 0.6 ].into_dyn();
        let phi2 = Factor::new(vec![ b ], tbl2.clone()).expect("Unexpected error");

        let phi = phi1.product(&phi2).expect("Unexpected error");
        assert_eq!(vec![a, b], phi.scope());

        for (x, y) in iproduct!(0..3, 0..2) {
            let mut assn = Assignment::new();
            assn.set(&a, x);
            assn.set(&b, y);

            let val = tbl1[nd::IxDyn(&[x])] * tbl2[nd::IxDyn(&[y])];
            assert!(
                (val - phi.value(&assn).unwrap()).abs() < std::f64::EPSILON
            );
        }
    }

    #[test]
    /// Example take from Koller & Friedman Figure 4.5
    fn reduce_simple() {
        let a = Variable::discrete(3);
        let b = Variable::binary();
        let c = Variable::binary();

        let table = nd::Array::from_shape_vec(
            (3, 2, 2),
            vec![ 0.25, 0.35, 0.08, 0.16, 0.05, 0.07, 0., 0., 0.15, 0.21, 0.09, 0.18 ]
        ).expect("Unexpected error").into_dyn();

        let phi = Factor::new(vec![a, b, c], table).expect("Unexpected error");

        let mut assn = Assignment::new();
        assn.set(&c, 0);

        let expected = nd::Array::from_shape_vec(
            (3, 2),
            vec![ 0.25, 0.08, 0.05, 0., 0.15, 0.09 ]
        ).expect("Unexpected error").into_dyn();

        let reduced = phi.reduce(&assn);
        assert_eq!(vec![a, b], reduced.scope());
        for (x, y) in (0..3).zip(0..2) {
            let mut assn = Assignment::new();
            assn.set(&a, x);
            assn.set(&b, y);

            let idx = [x, y];
            assert_eq!(expected[nd::IxDyn(&idx)], reduced.value(&assn).expect("unexpected error"));
        }
    }

    #[test]
    fn reduce_empty() {
        let a = Variable::binary();
        let b = Variable::binary();
        let c = Variable::binary();

        let table = array![[ 1., 0. ], [ 0., 1. ]].into_dyn();
        let phi = Factor::new(vec![a, b], table.clone()).expect("Unexpected error");

        let mut assn = Assignment::new();
        assn.set(&c, 1);

        let reduced = phi.reduce(&assn);
        assert_eq!(vec![a, b], reduced.scope());
        for (x, y) in (0..2).zip(0..2) {
            let mut asn = Assignment::new();
            asn.set(&a, x);
            asn.set(&b, y);

            let idx = [x, y];
            assert_eq!(table[nd::IxDyn(&idx)], reduced.value(&asn).expect("Unexpected error"));
        }
    }

    #[test]
    fn reduce_full() {
        let a = Variable::binary();
        let b = Variable::binary();
        let c = Variable::binary();

        let table = array![[ 1., 0. ], [ 0., 1. ]].into_dyn();
        let phi = Factor::new(vec![a, b], table.clone()).expect("Unexpected error");

        let mut assn = Assignment::new();
        assn.set(&a, 0);
        assn.set(&b, 0);
        assn.set(&c, 1);

        let reduced = phi.reduce(&assn);
        assert!(reduced.is_identity());
    }

    #[test]
    fn reduce_multiple() {
        let a = Variable::discrete(3);
        let b = Variable::binary();
        let c = Variable::binary();

        let table = nd::Array::from_shape_vec(
            (3, 2, 2),
            vec![ 0.25, 0.35, 0.08, 0.16, 0.05, 0.07, 0., 0., 0.15, 0.21, 0.09, 0.18 ]
        ).expect("Unexpected error").into_dyn();

        let phi = Factor::new(vec![a, b, c], table).expect("Unexpected error");

        let mut assn = Assignment::new();
        assn.set(&c, 0);
        assn.set(&a, 2);

        let expected = array![0.15, 0.09].into_dyn();

        let reduced = phi.reduce(&assn);
        assert_eq!(vec![b], reduced.scope());
        for x in 0..2 {
            let mut assn = Assignment::new();
            assn.set(&b, x);

            let idx = [x];
            assert_eq!(expected[nd::IxDyn(&idx)], reduced.value(&assn).expect("unexpected error"));
        }
    }

    #[test]
    /// Example taken from Koller & Friedman Figure 9.7
    fn marginalize() {
        let a = Variable::discrete(3);
        let b = Variable::binary();
        let c = Variable::binary();

        let table = nd::Array::from_shape_vec(
            (3, 2, 2),
            vec![ 0.25, 0.35, 0.08, 0.16, 0.05, 0.07, 0., 0., 0.15, 0.21, 0.09, 0.18 ]
        ).expect("Unexpected error").into_dyn();

        let phi = Factor::new(vec![a, b, c], table).expect("Unexpected error");

        let marginalized = phi.marginalize(b);
        assert_eq!(vec![a, c], marginalized.scope());

        let expected = array![[0.33, 0.51], [0.05, 0.07], [0.24, 0.39]].into_dyn();
        for (x, y) in (0..3).zip(0..2) {
            let mut assn = Assignment::new();
            assn.set(&a, x);
            assn.set(&c, y);

            let idx = [ x, y ];
            let val = expected[nd::IxDyn(&idx)];
            assert!(
                (val - marginalized.value(&assn).unwrap()).abs() < std::f64::EPSILON
            );
        }
    }

    #[test]
    fn project_sum_matches_marginalize() {
        let a = Variable::discrete(3);
        let b = Variable::binary();
        let c = Variable::binary();

        let table = nd::Array::from_shape_vec(
            (3, 2, 2),
            vec![ 0.25, 0.35, 0.08, 0.16, 0.05, 0.07, 0., 0., 0.15, 0.21, 0.09, 0.18 ]
        ).expect("Unexpected error").into_dyn();

        let phi = Factor::new(vec![a, b, c], table).expect("Unexpected error");

        let keep: HashSet<Variable> = vec![a, c].into_iter().collect();
        let projected = phi.project(&keep, ProjectionOp::Sum).unwrap();
        let marginalized = phi.marginalize(b);

        assert_eq!(marginalized.scope(), projected.scope());
        for assn in all_assignments(&projected.scope()) {
            assert!(
                (projected.value(&assn).unwrap() - marginalized.value(&assn).unwrap()).abs()
                    < std::f64::EPSILON
            );
        }
    }

    #[test]
    fn project_max() {
        let a = Variable::binary();
        let b = Variable::binary();

        let table = array![[ 0.1, 0.4 ], [ 0.3, 0.2 ]].into_dyn();
        let phi = Factor::new(vec![a, b], table).expect("Unexpected error");

        let keep: HashSet<Variable> = vec![a].into_iter().collect();
        let projected = phi.project(&keep, ProjectionOp::Max).unwrap();

        assert_eq!(vec![a], projected.scope());
        let mut assn = Assignment::new();
        assn.set(&a, 0);
        assert_eq!(0.4, projected.value(&assn).unwrap());
        let mut assn = Assignment::new();
        assn.set(&a, 1);
        assert_eq!(0.3, projected.value(&assn).unwrap());
    }

    #[test]
    fn project_empty_scope_err() {
        let a = Variable::binary();
        let phi = Factor::new(vec![a], array![0.5, 0.5].into_dyn()).unwrap();

        let keep: HashSet<Variable> = HashSet::new();
        assert!(phi.project(&keep, ProjectionOp::Sum).is_err());
    }

    #[test]
    fn normalize() {
        let a = Variable::binary();
        let phi = Factor::new(vec![a], array![1.0, 3.0].into_dyn()).unwrap();

        let normalized = phi.normalize().unwrap();
        assert!(normalized.is_cpd());

        let mut assn = Assignment::new();
        assn.set(&a, 0);
        assert!((0.25 - normalized.value(&assn).unwrap()).abs() < std::f64::EPSILON);

        // an all-zero factor has no normalization
        let zero = Factor::new(vec![a], array![0.0, 0.0].into_dyn()).unwrap();
        match zero.normalize().expect_err("missing error") {
            LauritzenError::IncompatibleEvidence => assert!(true),
            _ => panic!("wrong error type")
        };
    }

    #[test]
    fn argmax() {
        let a = Variable::discrete(3);
        let b = Variable::binary();

        let table = array![[ 0.1, 0.05 ], [ 0.02, 0.4 ], [ 0.3, 0.13 ]].into_dyn();
        let phi = Factor::new(vec![a, b], table).unwrap();

        let (assn, val) = phi.argmax().unwrap();
        assert_eq!(0.4, val);
        assert_eq!(Some(&1), assn.get(&a));
        assert_eq!(Some(&1), assn.get(&b));
    }

    #[test]
    fn sum() {
        let a = Variable::binary();
        let phi = Factor::new(vec![a], array![1.0, 3.0].into_dyn()).unwrap();
        assert_eq!(4.0, phi.sum());
        assert_eq!(1.0, Factor::identity().sum());
    }
}
