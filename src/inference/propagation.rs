//! Lazy message passing over the junction tree.
//!
//! A message on the directed arc `(from, to)` is the projection onto the separator of the
//! combination of `from`'s local factors with every message flowing into `from` from its other
//! neighbors. Messages are computed on demand ("collect"), cached per arc, and survive until an
//! evidence change invalidates the subtree feeding them. The cache slot owns its factors; an
//! invalidation just drops the slot.
//!
//! The collect recursion is driven by an explicit work list, so tree depth never grows the call
//! stack, and independent branches stay visibly independent for the deferred `Schedule`.

use factor::{Factor, Table};
use schedule::Schedule;
use util::{LauritzenError, Result};
use variable::Variable;
use super::junction_tree::JunctionTreeEngine;
use super::relevance;

use std::collections::{HashMap, HashSet};

impl<'a> JunctionTreeEngine<'a> {

    /// Make every message flowing into `root` valid.
    pub(crate) fn collect_to(&mut self, root: usize) -> Result<()> {
        let neighbors = self.tree_ref()?.neighbors(root).to_vec();
        for n in neighbors {
            self.ensure_message(n, root)?;
        }
        Ok(())
    }

    /// Make the message on the arc `(from, to)` valid, computing missing upstream messages in
    /// dependency order first.
    pub(crate) fn ensure_message(&mut self, from: usize, to: usize) -> Result<()> {
        let mut stack = vec![(from, to)];

        while let Some(&(x, y)) = stack.last() {
            if self.messages.contains_key(&(x, y)) {
                stack.pop();
                continue;
            }

            let missing: Vec<usize> = {
                let tree = self.tree_ref()?;
                tree.neighbors(x)
                    .iter()
                    .filter(|&&z| z != y && ! self.messages.contains_key(&(z, x)))
                    .cloned()
                    .collect()
            };

            if missing.is_empty() {
                self.compute_message(x, y)?;
                stack.pop();
            } else {
                for z in missing {
                    stack.push((z, x));
                }
            }
        }

        Ok(())
    }

    /// Compute and cache the message on `(from, to)`. Every upstream message must already be
    /// valid.
    fn compute_message(&mut self, from: usize, to: usize) -> Result<()> {
        let separator = self.tree_ref()?.separator(from, to);
        let neighbors = self.tree_ref()?.neighbors(from).to_vec();

        let mut gathered: Vec<Factor> = self.clique_factors[from].values().cloned().collect();
        for z in neighbors {
            if z != to {
                let incoming = self.messages.get(&(z, from)).ok_or_else(|| {
                    LauritzenError::Fatal(String::from("A message was computed out of order"))
                })?;
                gathered.extend(incoming.iter().cloned());
            }
        }

        let message = self.combine_and_project(gathered, &separator)?;
        trace!("message {} -> {}: {} factors", from, to, message.len());
        self.messages.insert((from, to), message);
        Ok(())
    }

    /// The shared kernel of message and posterior computation: filter the gathered factors for
    /// relevance against `keep`, project out single-occurrence barren variables, then combine
    /// everything and project onto `keep`.
    ///
    /// An empty result means "no constraint". A non-empty result holds exactly one factor; any
    /// other count is an invariant break.
    pub(crate) fn combine_and_project(
        &self,
        gathered: Vec<Factor>,
        keep: &HashSet<Variable>
    ) -> Result<Vec<Factor>> {
        if gathered.is_empty() {
            return Ok(Vec::new());
        }

        // relevance: factors the kept variables cannot feel are dropped before any combination
        let hard = self.evidence.hard_nodes();
        let soft = self.evidence.soft_nodes();
        let scopes: Vec<HashSet<Variable>> = gathered
            .iter()
            .map(|f| f.scope().into_iter().collect())
            .collect();
        let flags = relevance::relevant_factors(
            self.relevance, &self.dag, keep, &hard, &soft, &scopes
        );

        let mut kept: Vec<Factor> = gathered
            .into_iter()
            .zip(flags)
            .filter(|&(_, keep)| keep)
            .map(|(f, _)| f)
            .collect();

        if kept.is_empty() {
            return Ok(Vec::new());
        }

        // a variable outside `keep` held by exactly one factor is projected out of that factor
        // directly, which is cheaper than carrying it through the joint combination
        if self.barren == relevance::BarrenPolicy::Prune {
            let mut occurrences: HashMap<Variable, usize> = HashMap::new();
            for f in kept.iter() {
                for v in f.scope() {
                    if ! keep.contains(&v) {
                        *occurrences.entry(v).or_insert(0) += 1;
                    }
                }
            }

            for f in kept.iter_mut() {
                let scope = f.scope();
                let survivors: HashSet<Variable> = scope
                    .iter()
                    .filter(|v| keep.contains(v) || occurrences.get(v).map_or(true, |&n| n > 1))
                    .cloned()
                    .collect();

                if ! survivors.is_empty() && survivors.len() < scope.len() {
                    *f = f.project(&survivors, self.projection)?;
                }
            }
        }

        let result = self.run_combination(kept, keep)?;
        Ok(vec![result])
    }

    /// Combine the factors pairwise and project onto `keep`, eagerly or through a deferred
    /// schedule depending on the configured threshold.
    fn run_combination(&self, factors: Vec<Factor>, keep: &HashSet<Variable>) -> Result<Factor> {
        let combined_scope: HashSet<Variable> = factors
            .iter()
            .flat_map(|f| f.scope())
            .collect();
        let overlaps = combined_scope.iter().any(|v| keep.contains(v));

        let deferred = self.tree_ref()
                           .map(|t| t.total_state_space() > self.schedule_threshold)
                           .unwrap_or(false);

        let combined = if deferred {
            let mut schedule = Schedule::new();
            let refs: Vec<_> = factors.into_iter().map(|f| schedule.input(f)).collect();

            let mut acc = refs[0];
            for &r in refs[1..].iter() {
                acc = schedule.combine(acc, r, self.combination);
            }

            let out = if overlaps {
                schedule.project(acc, keep.clone(), self.projection)
            } else {
                acc
            };

            let mut results = schedule.execute(&[out], self.parallel_schedules)?;
            if results.len() != 1 {
                return Err(
                    LauritzenError::Fatal(
                        format!("A combine-and-project step produced {} factors", results.len())
                    )
                );
            }
            results.pop().unwrap()
        } else {
            let mut iter = factors.into_iter();
            let first = iter.next().ok_or_else(|| {
                LauritzenError::Fatal(String::from("Combination over an empty factor list"))
            })?;

            let product = iter.fold(Ok(first), |acc: Result<Factor>, f| {
                acc.and_then(|a| a.combine(&f, self.combination))
            })?;

            if overlaps {
                product.project(keep, self.projection)?
            } else {
                product
            }
        };

        if overlaps {
            Ok(combined)
        } else {
            // nothing of `keep` survives: the result is constant over the kept variables,
            // anchored at the lowest-id one
            let scalar = combined.fold_all(self.projection);
            let anchor = keep.iter().min().cloned().ok_or_else(|| {
                LauritzenError::Fatal(String::from("Projection onto an empty variable set"))
            })?;
            Factor::constant(anchor, scalar)
        }
    }

    /// A uniform factor over the given variables, used where "no constraint" must still span a
    /// requested scope.
    pub(crate) fn uniform_over(vars: &[Variable]) -> Result<Factor> {
        let mut sorted: Vec<Variable> = vars.to_vec();
        sorted.sort();
        let shape: Vec<usize> = sorted.iter().map(|v| v.cardinality()).collect();
        Factor::new(sorted, Table::ones(shape))
    }

    /// Drop every message on an arc reachable from the given cliques, walking outward and
    /// stopping at arcs that are already invalid. Returns the cliques that lost an incoming
    /// message, plus the sources themselves.
    pub(crate) fn invalidate_outward(&mut self, sources: &HashSet<usize>) -> Result<HashSet<usize>> {
        let mut invalidated = sources.clone();
        let mut stack: Vec<(usize, usize)> = Vec::new();

        {
            let tree = self.tree_ref()?;
            let mut ordered: Vec<usize> = sources.iter().cloned().collect();
            ordered.sort();
            for c in ordered {
                for &n in tree.neighbors(c) {
                    stack.push((c, n));
                }
            }
        }

        while let Some((x, y)) = stack.pop() {
            if self.messages.remove(&(x, y)).is_some() {
                invalidated.insert(y);
                let downstream: Vec<usize> = self.tree_ref()?
                                                 .neighbors(y)
                                                 .iter()
                                                 .filter(|&&z| z != x)
                                                 .cloned()
                                                 .collect();
                for z in downstream {
                    stack.push((y, z));
                }
            }
        }

        Ok(invalidated)
    }

}
