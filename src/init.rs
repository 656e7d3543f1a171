//! Module containing initialization routines for the parameters of a model.

use factor::Factor;
use util::{LauritzenError, Result};
use variable::Variable;

use ndarray::prelude as nd;

use std::collections::HashSet;

/// Defines possible ways to initialize a `Variable`s CPD.
pub enum Initialization<'a> {
    /// A uniform distribution over all possibilities
    Uniform,

    /// Initialize the CPD as a Binomial distribution with parameter ```p```.
    /// Note that this `Initialization` is valid only to a `Variable` with no parents.
    Binomial(f64),

    /// Initialize the CPD as a Multinomial distribution with parameters ```p_0, p_1...```.
    /// Note that this `Initialization` is valid only to a `Variable` with no parents.
    Multinomial(&'a [f64]),

    /// User defined CPD
    Table(Factor)
}


impl<'a> Initialization<'a> {

    /// Construct a CPD, initialized based on ```self```
    ///
    /// # Args
    /// * `var`: the `Variable` the CPD is over
    /// * `parents`: the conditioning set
    ///
    /// # Returns
    /// a `Factor`, initialized according to ```self```.
    pub fn build_cpd(self, var: Variable, parents: HashSet<Variable>) -> Result<Factor> {
        ///////////////////////////////////////////////////////////////////////////////
        // Trivial cases

        // if this is a user defined factor, it just needs to be verified and returned
        if let Initialization::Table(f) = self {
            if ! f.is_cpd() {
                return Err(LauritzenError::InvalidInitialization);
            }

            let s = f.scope();
            if parents.iter().all(|v| s.contains(v)) && s.len() == parents.len() + 1 && s.contains(&var) {
                return Ok(f);
            } else {
                return Err(LauritzenError::InvalidScope);
            }
        }

        ///////////////////////////////////////////////////////////////////////////////
        // Check for errors
        if parents.len() == 0 {

            match self {

                // A binomial distribution on a non-binary variable
                Initialization::Binomial(_) if var.cardinality() != 2 => {
                    return Err(LauritzenError::InvalidInitialization);
                },

                // A multinomial distribution with an incorrect number of parameters
                Initialization::Multinomial(ps) if ps.len() != var.cardinality() => {
                    return Err(LauritzenError::InvalidInitialization);
                },

                _ => ()
            }
        } else {
            match self {

                // A binomial/multinomial on a non-unit scope
                Initialization::Binomial(_) | Initialization::Multinomial(_) => {
                    return Err(LauritzenError::InvalidInitialization);
                },

                _ => ()
            }
        }

        ///////////////////////////////////////////////////////////////////////////////
        // now, build CPD
        let ordered: Vec<Variable> = parents.into_iter().collect();
        let mut shape: Vec<usize> = ordered.iter().map(|v| v.cardinality()).collect();
        shape.push(var.cardinality());

        let tbl = match self {
            Initialization::Uniform => {
                // normalizing constant is just the number of elements
                let val = 1. / (var.cardinality() as f64);
                nd::Array::from_elem(shape, val).into_dyn()
            },
            Initialization::Binomial(p) => {
                array![p, (1.0 - p)].into_dyn()
            },
            Initialization::Multinomial(p) => {
                nd::Array::from_iter(p.iter().map(|&x| x)).into_dyn()
            },
            Initialization::Table(_) => panic!("unreachable")
        };

        Factor::cpd(var, ordered, tbl)
    }
}
