//! Defines the interface to the inference engine
//!
//! The `JunctionTreeEngine` compiles a `DirectedModel` into a junction tree and answers exact
//! conditional queries by lazy message passing. The submodules split the engine by concern:
//! structure building and incremental bookkeeping (`junction_tree`), message computation and
//! cache invalidation (`propagation`), query extraction (`posterior`) and relevance analysis
//! (`relevance`).

use factor::Factor;
use variable::Variable;
use super::Result;

use std::collections::HashSet;

mod junction_tree;
mod posterior;
mod propagation;
pub mod relevance;

pub use self::junction_tree::JunctionTreeEngine;


/// A `ConditionalInferenceEngine` is capable of answering Conditional Probability Queries of the
/// form: ```P(Y | E = e)```
///
/// `ConditionalInferenceEngine`s are stateful; evidence is registered against the engine itself
/// and may be revised between queries.
pub trait ConditionalInferenceEngine {

    /// Infer the joint distribution ```P(variables | evidence)```
    fn infer(&mut self, variables: &HashSet<Variable>) -> Result<Factor>;

}

impl<'a> ConditionalInferenceEngine for JunctionTreeEngine<'a> {

    fn infer(&mut self, variables: &HashSet<Variable>) -> Result<Factor> {
        let mut vars = variables.iter();
        match (vars.next(), vars.next()) {
            (Some(&v), None) => self.posterior(v),
            _ => self.joint_posterior(variables)
        }
    }

}
