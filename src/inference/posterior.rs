//! Posterior extraction: marginals, joints, evidence probability and most probable explanation.
//!
//! All queries share one kernel: collect toward the hosting clique, combine its factor list with
//! every incoming message, and project onto the requested variables. Hard-evidenced targets are
//! answered from their indicator factors without touching the tree. The whole-network queries
//! (`evidence_probability`, `mpe`) temporarily treat every node as a target and disable pruning,
//! since pruning is only sound for the specific targets it was computed against.

use factor::{Factor, ProjectionOp};
use util::{LauritzenError, Result};
use variable::{Assignment, Variable};
use super::junction_tree::JunctionTreeEngine;

use std::collections::{BTreeSet, HashSet};

impl<'a> JunctionTreeEngine<'a> {

    /// The normalized posterior `P(var | evidence)`.
    ///
    /// # Errors
    /// * `LauritzenError::UndefinedElement` if `var` is not addressable under the current pruning
    /// * `LauritzenError::IncompatibleEvidence` if the evidence is jointly impossible
    pub fn posterior(&mut self, var: Variable) -> Result<Factor> {
        self.prepare()?;

        if let Some(f) = self.posterior_cache.get(&var) {
            return Ok(f.clone());
        }

        let unnormalized = self.unnormalized_marginal(var)?;
        if unnormalized.sum() <= 0.0 {
            return Err(LauritzenError::IncompatibleEvidence);
        }

        let result = unnormalized.normalize()?;
        self.posterior_cache.insert(var, result.clone());
        Ok(result)
    }

    /// The unnormalized posterior of a single variable: its marginal of the product of every
    /// factor relevant to it. The caller owns the normalization decision.
    pub fn unnormalized_posterior(&mut self, var: Variable) -> Result<Factor> {
        self.prepare()?;
        self.unnormalized_marginal(var)
    }

    /// The normalized joint posterior `P(vars | evidence)`.
    ///
    /// # Errors
    /// * `LauritzenError::UndefinedElement` if the set spans no single clique
    /// * `LauritzenError::IncompatibleEvidence` if the evidence is jointly impossible
    pub fn joint_posterior(&mut self, vars: &HashSet<Variable>) -> Result<Factor> {
        self.prepare()?;

        let key: BTreeSet<Variable> = vars.iter().cloned().collect();
        if let Some(f) = self.joint_cache.get(&key) {
            return Ok(f.clone());
        }

        let unnormalized = self.unnormalized_joint(&key)?;
        if unnormalized.sum() <= 0.0 {
            return Err(LauritzenError::IncompatibleEvidence);
        }

        let result = unnormalized.normalize()?;
        self.joint_cache.insert(key, result.clone());
        Ok(result)
    }

    /// The unnormalized joint posterior over a variable set.
    pub fn unnormalized_joint_posterior(&mut self, vars: &HashSet<Variable>) -> Result<Factor> {
        self.prepare()?;
        let key: BTreeSet<Variable> = vars.iter().cloned().collect();
        self.unnormalized_joint(&key)
    }

    /// The probability of the evidence, `P(e)`: the product over connected components of the
    /// component's unnormalized mass, times every hard-evidence-only constant.
    pub fn evidence_probability(&mut self) -> Result<f64> {
        self.with_all_targets(|engine| {
            engine.prepare()?;

            let mut p = 1.0;
            let roots = engine.roots.clone();
            for root in roots {
                let anchor = engine.tree_ref()?
                                   .clique(root)
                                   .iter()
                                   .min()
                                   .cloned()
                                   .ok_or_else(|| {
                                       LauritzenError::Fatal(String::from("A root clique is empty"))
                                   })?;

                let keep: HashSet<Variable> = vec![anchor].into_iter().collect();
                let marginal = engine.clique_posterior(root, &keep)?;
                p *= marginal.sum();
            }

            for (_, &c) in engine.constants.iter() {
                p *= c;
            }

            Ok(p)
        })
    }

    /// The most probable explanation: the single joint assignment of every variable maximizing
    /// the posterior given the evidence. Hard-evidenced variables keep their observed values.
    pub fn mpe(&mut self) -> Result<Assignment> {
        self.mpe_with_value().map(|(assignment, _)| assignment)
    }

    /// The natural log of the posterior probability of the most probable explanation,
    /// `ln P(mpe | evidence)`.
    pub fn mpe_log_posterior(&mut self) -> Result<f64> {
        let (_, best) = self.mpe_with_value()?;
        let p_evidence = self.evidence_probability()?;

        if best <= 0.0 || p_evidence <= 0.0 {
            return Err(LauritzenError::IncompatibleEvidence);
        }

        Ok(best.ln() - p_evidence.ln())
    }

    ///////////////////////////////////////////////////////////////////////////
    // internals

    fn unnormalized_marginal(&mut self, var: Variable) -> Result<Factor> {
        if ! self.model.contains(&var) {
            return Err(
                LauritzenError::UndefinedElement(format!("{} is not a model variable", var))
            );
        }

        // a hard-evidenced target is its own indicator; no tree traversal needed
        if let Some(value) = self.evidence.hard_value(&var) {
            return Factor::indicator(var, value);
        }

        let host = match self.node_clique.get(&var) {
            Some(&c) => c,
            None => {
                return Err(
                    LauritzenError::UndefinedElement(
                        format!("{} is not covered by any clique under the current pruning", var)
                    )
                );
            }
        };

        let keep: HashSet<Variable> = vec![var].into_iter().collect();
        self.clique_posterior(host, &keep)
    }

    fn unnormalized_joint(&mut self, key: &BTreeSet<Variable>) -> Result<Factor> {
        if key.is_empty() {
            return Err(LauritzenError::InvalidScope);
        }

        for v in key.iter() {
            if ! self.model.contains(v) {
                return Err(
                    LauritzenError::UndefinedElement(format!("{} is not a model variable", v))
                );
            }
        }

        let members: Vec<Variable> = key.iter()
                                        .filter(|v| self.evidence.hard_value(v).is_none())
                                        .cloned()
                                        .collect();

        // every member observed: the joint is the combination of the evidence factors
        if members.is_empty() {
            let mut result = Factor::identity();
            for &v in key.iter() {
                let value = self.evidence.hard_value(&v).ok_or_else(|| {
                    LauritzenError::Fatal(String::from("A hard value disappeared mid-query"))
                })?;
                result = result.product(&Factor::indicator(v, value)?)?;
            }
            return Ok(result);
        }

        let host = self.joint_host(key, &members)?;
        let keep: HashSet<Variable> = members.iter().cloned().collect();
        let mut result = self.clique_posterior(host, &keep)?;

        // hard members re-enter through their indicators
        for v in key.iter() {
            if let Some(value) = self.evidence.hard_value(v) {
                result = result.product(&Factor::indicator(*v, value)?)?;
            }
        }

        Ok(result)
    }

    /// The clique hosting a joint target, discovering and caching one for sets that were never
    /// registered but happen to fit an existing clique.
    fn joint_host(&mut self, key: &BTreeSet<Variable>, members: &[Variable]) -> Result<usize> {
        if let Some(&c) = self.joint_clique.get(key) {
            return Ok(c);
        }

        let found = {
            let tree = self.tree_ref()?;
            (0..tree.clique_count())
                .find(|&c| members.iter().all(|m| tree.clique(c).contains(m)))
        };

        match found {
            Some(c) => {
                self.joint_clique.insert(key.clone(), c);
                Ok(c)
            },
            None => Err(
                LauritzenError::UndefinedElement(
                    String::from("The requested variables span no common clique")
                )
            )
        }
    }

    /// Collect toward `host`, combine its factor list with every incoming message and project
    /// onto `keep`. The result spans exactly `keep`; unconstrained dimensions come out uniform.
    fn clique_posterior(&mut self, host: usize, keep: &HashSet<Variable>) -> Result<Factor> {
        self.collect_to(host)?;

        let neighbors = self.tree_ref()?.neighbors(host).to_vec();
        let mut gathered: Vec<Factor> = self.clique_factors[host].values().cloned().collect();
        for n in neighbors {
            let incoming = self.messages.get(&(n, host)).ok_or_else(|| {
                LauritzenError::Fatal(String::from("Collect left an arc without a message"))
            })?;
            gathered.extend(incoming.iter().cloned());
        }

        let mut projected = self.combine_and_project(gathered, keep)?;
        let mut result = match projected.len() {
            0 => Factor::identity(),
            1 => projected.pop().ok_or(LauritzenError::Unknown)?,
            n => {
                return Err(
                    LauritzenError::Fatal(
                        format!("A combine-and-project step produced {} factors", n)
                    )
                );
            }
        };

        let scope: HashSet<Variable> = result.scope().into_iter().collect();
        let missing: Vec<Variable> = keep.difference(&scope).cloned().collect();
        if ! missing.is_empty() {
            result = result.product(&Self::uniform_over(&missing)?)?;
        }

        Ok(result)
    }

    /// Max-propagate over the whole tree, then fix variables clique by clique walking outward
    /// from each component's root.
    fn mpe_with_value(&mut self) -> Result<(Assignment, f64)> {
        let saved_projection = self.projection;
        if saved_projection != ProjectionOp::Max {
            self.projection = ProjectionOp::Max;
            self.invalidate_all_messages();
        }

        let result = self.with_all_targets(|engine| engine.mpe_diffusion());

        if self.projection != saved_projection {
            self.projection = saved_projection;
            self.invalidate_all_messages();
        }

        result
    }

    fn mpe_diffusion(&mut self) -> Result<(Assignment, f64)> {
        self.prepare()?;

        let mut assignment = self.evidence.hard_assignment();
        let mut best = 1.0;
        for (_, &c) in self.constants.iter() {
            best *= c;
        }

        let roots = self.roots.clone();
        let mut visited: HashSet<usize> = roots.iter().cloned().collect();

        for &root in roots.iter() {
            let mut stack = vec![root];
            let mut first = true;

            while let Some(clique) = stack.pop() {
                let neighbors = self.tree_ref()?.neighbors(clique).to_vec();
                for &n in neighbors.iter() {
                    self.ensure_message(n, clique)?;
                }

                let mut gathered: Vec<Factor> = self.clique_factors[clique].values().cloned().collect();
                for &n in neighbors.iter() {
                    let incoming = self.messages.get(&(n, clique)).ok_or_else(|| {
                        LauritzenError::Fatal(String::from("Collect left an arc without a message"))
                    })?;
                    gathered.extend(incoming.iter().cloned());
                }

                if gathered.is_empty() {
                    // no constraint: every completion ties, so take the first value
                    let mut vars: Vec<Variable> =
                        self.tree_ref()?.clique(clique).iter().cloned().collect();
                    vars.sort();
                    for v in vars {
                        if ! assignment.contains(&v) {
                            assignment.set(&v, 0);
                        }
                    }
                } else {
                    let mut iter = gathered.into_iter();
                    let head = iter.next().ok_or(LauritzenError::Unknown)?;
                    let combined = iter.fold(Ok(head), |acc: Result<Factor>, f| {
                        acc.and_then(|a| a.combine(&f, self.combination))
                    })?;

                    // variables fixed by earlier cliques (and the folded hard evidence) stay
                    // fixed; the rest take their max-consistent extension
                    let restricted = combined.reduce(&assignment);
                    match restricted {
                        Factor::Identity => (),
                        reduced => {
                            let (amax, value) = reduced.argmax()?;
                            assignment.merge(&amax);
                            if first {
                                // the root's max-marginal carries the component's full mass
                                best *= value;
                            }
                        }
                    }
                }

                first = false;
                for &n in neighbors.iter() {
                    if visited.insert(n) {
                        stack.push(n);
                    }
                }
            }
        }

        // a variable no factor constrains ties across its whole domain
        let mut hosted: Vec<Variable> = self.node_clique.keys().cloned().collect();
        hosted.sort();
        for v in hosted {
            if self.evidence.hard_value(&v).is_none() && ! assignment.contains(&v) {
                assignment.set(&v, 0);
            }
        }

        Ok((assignment, best))
    }

}
