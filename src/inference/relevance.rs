//! Relevance analysis: which nodes and factors can influence a query under the current evidence.
//!
//! The engine asks this question twice. During structure building it keeps only the nodes
//! d-connected to the registered targets, so the junction tree never hosts provably irrelevant
//! factors. During message computation it filters the gathered factor list against the separator,
//! so a message never carries the weight of factors that cannot reach the receiving side.
//!
//! Soft evidence is modelled as an observed virtual child of its node: a likelihood attached to
//! `X` behaves exactly like a hard-evidenced leaf hanging off `X`, which is how it participates
//! in d-separation.

use model::directed::DirectedModel;
use variable::Variable;

use std::collections::{HashMap, HashSet};

/// Selects how relevance is decided. All four strategies answer the same contract; they differ
/// in how aggressively (and by which algorithm) they prune.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelevanceStrategy {
    /// No pruning. Required for whole-network quantities (evidence probability, MPE).
    FindAll,

    /// Bayes-ball requisite nodes; a factor is kept if its scope touches a requisite node.
    BayesBallNodes,

    /// Bayes-ball run directly over the factor graph, marking factors instead of nodes.
    BayesBallFactors,

    /// The Koller & Friedman reachable-node procedure (Algorithm 3.1), same contract as
    /// `BayesBallNodes`.
    GraphSearch
}

/// Whether barren nodes are removed during structure building.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BarrenPolicy {
    Prune,
    Keep
}


/// An immutable parent/children view of a `DirectedModel`'s DAG, computed once per engine.
pub struct DagView {
    parents: HashMap<Variable, Vec<Variable>>,
    children: HashMap<Variable, Vec<Variable>>
}

impl DagView {

    pub fn new(model: &DirectedModel) -> Self {
        let parents = model.topological_order()
                           .into_iter()
                           .map(|v| (v, model.parents(&v)))
                           .collect();

        DagView { parents, children: model.children_map() }
    }

    pub fn parents(&self, v: &Variable) -> &[Variable] {
        self.parents.get(v).map_or(&[], |p| p.as_slice())
    }

    pub fn children(&self, v: &Variable) -> &[Variable] {
        self.children.get(v).map_or(&[], |c| c.as_slice())
    }

}


/// The direction a Bayes ball arrives from.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Visit {
    FromChild,
    FromParent
}

/// The marks left by one Bayes-ball pass.
pub struct BayesBallMarks {
    /// Nodes whose CPT is requisite for the query
    pub top: HashSet<Variable>,

    /// Nodes the ball passed through downward
    pub bottom: HashSet<Variable>,

    /// Soft-evidenced nodes whose likelihood factor is requisite
    pub soft_hit: HashSet<Variable>
}

/// Run Shachter's Bayes-ball algorithm from `query` given `hard` observations and `soft`
/// likelihood attachments.
pub fn bayes_ball(
    dag: &DagView,
    query: &HashSet<Variable>,
    hard: &HashSet<Variable>,
    soft: &HashSet<Variable>
) -> BayesBallMarks {
    let mut top = HashSet::new();
    let mut bottom = HashSet::new();
    let mut soft_hit = HashSet::new();
    let mut scheduled: HashSet<(Variable, Visit)> = HashSet::new();

    let mut stack: Vec<(Variable, Visit)> =
        query.iter().map(|&v| (v, Visit::FromChild)).collect();

    while let Some((j, dir)) = stack.pop() {
        if ! scheduled.insert((j, dir)) {
            continue;
        }

        match dir {
            Visit::FromChild => {
                if hard.contains(&j) {
                    // an observed node blocks a ball arriving from a child
                    continue;
                }

                if top.insert(j) {
                    for &p in dag.parents(&j) {
                        stack.push((p, Visit::FromChild));
                    }
                }

                if bottom.insert(j) {
                    for &c in dag.children(&j) {
                        stack.push((c, Visit::FromParent));
                    }
                    if soft.contains(&j) {
                        soft_hit.insert(j);
                    }
                }
            },

            Visit::FromParent => {
                if hard.contains(&j) {
                    // v-structure: an observed node bounces the ball back to its parents
                    if top.insert(j) {
                        for &p in dag.parents(&j) {
                            stack.push((p, Visit::FromChild));
                        }
                    }
                } else {
                    if bottom.insert(j) {
                        for &c in dag.children(&j) {
                            stack.push((c, Visit::FromParent));
                        }
                        if soft.contains(&j) {
                            // the observed virtual child bounces the ball back upward
                            soft_hit.insert(j);
                            stack.push((j, Visit::FromChild));
                        }
                    }
                }
            }
        }
    }

    BayesBallMarks { top, bottom, soft_hit }
}


/// The nodes to retain during structure building: everything whose CPT or likelihood is
/// requisite for the query, plus the query itself.
pub fn relevant_nodes(
    dag: &DagView,
    query: &HashSet<Variable>,
    hard: &HashSet<Variable>,
    soft: &HashSet<Variable>
) -> HashSet<Variable> {
    let marks = bayes_ball(dag, query, hard, soft);

    let mut kept = marks.top;
    kept.extend(marks.soft_hit);
    kept.extend(query.iter().cloned());
    kept
}


/// The seeds' ancestral closure: the seeds together with every ancestor.
pub fn ancestral_closure(dag: &DagView, seeds: &HashSet<Variable>) -> HashSet<Variable> {
    let mut closure: HashSet<Variable> = HashSet::new();
    let mut stack: Vec<Variable> = seeds.iter().cloned().collect();

    while let Some(v) = stack.pop() {
        if closure.insert(v) {
            for &p in dag.parents(&v) {
                stack.push(p);
            }
        }
    }

    closure
}


/// Find the barren nodes: nodes with no path down to the boundary (targets and evidence), whose
/// removal cannot change any in-scope posterior.
pub fn barren_nodes(
    dag: &DagView,
    all_nodes: &HashSet<Variable>,
    boundary: &HashSet<Variable>
) -> HashSet<Variable> {
    let closure = ancestral_closure(dag, boundary);
    all_nodes.difference(&closure).cloned().collect()
}


/// The Koller & Friedman requisite-node procedure: active-trail reachability (Algorithm 3.1)
/// over the graph augmented with one phantom parent per node. A node's CPT is requisite exactly
/// when its phantom parent is reachable from the query, which happens when the node itself is
/// reached moving upward while unobserved, or reached moving downward while it has an observed
/// descendant.
pub fn requisite_graph_search(
    dag: &DagView,
    query: &HashSet<Variable>,
    hard: &HashSet<Variable>,
    soft: &HashSet<Variable>
) -> HashSet<Variable> {
    // phase 1: the observations' ancestral closure decides v-structure activation; a soft
    // likelihood counts as an observed descendant of its node
    let mut observed_seeds: HashSet<Variable> = hard.clone();
    observed_seeds.extend(soft.iter().cloned());
    let active = ancestral_closure(dag, &observed_seeds);

    // phase 2: breadth-first search over (node, direction)
    let mut requisite: HashSet<Variable> = HashSet::new();
    let mut scheduled: HashSet<(Variable, Visit)> = HashSet::new();
    let mut stack: Vec<(Variable, Visit)> =
        query.iter().map(|&v| (v, Visit::FromChild)).collect();

    while let Some((y, dir)) = stack.pop() {
        if ! scheduled.insert((y, dir)) {
            continue;
        }

        match dir {
            Visit::FromChild => {
                if ! hard.contains(&y) {
                    // the phantom parent of y is reached alongside the real ones
                    requisite.insert(y);
                    for &p in dag.parents(&y) {
                        stack.push((p, Visit::FromChild));
                    }
                    for &c in dag.children(&y) {
                        stack.push((c, Visit::FromParent));
                    }
                    if soft.contains(&y) {
                        // the trail bounces off y's observed virtual child
                        stack.push((y, Visit::FromChild));
                    }
                }
            },
            Visit::FromParent => {
                if ! hard.contains(&y) {
                    for &c in dag.children(&y) {
                        stack.push((c, Visit::FromParent));
                    }
                    if soft.contains(&y) {
                        stack.push((y, Visit::FromChild));
                    }
                }
                if active.contains(&y) {
                    requisite.insert(y);
                    for &p in dag.parents(&y) {
                        stack.push((p, Visit::FromChild));
                    }
                }
            }
        }
    }

    requisite
}


/// Decide, per factor, whether it can influence the kept variables. `scopes` lists each
/// candidate factor's scope; the result holds one flag per candidate.
pub fn relevant_factors(
    strategy: RelevanceStrategy,
    dag: &DagView,
    kept: &HashSet<Variable>,
    hard: &HashSet<Variable>,
    soft: &HashSet<Variable>,
    scopes: &[HashSet<Variable>]
) -> Vec<bool> {
    match strategy {
        RelevanceStrategy::FindAll => scopes.iter().map(|_| true).collect(),

        RelevanceStrategy::BayesBallNodes => {
            let marks = bayes_ball(dag, kept, hard, soft);
            let mut requisite = marks.top;
            requisite.extend(marks.soft_hit);
            requisite.extend(kept.iter().cloned());

            scopes.iter()
                  .map(|s| ! s.is_disjoint(&requisite))
                  .collect()
        },

        RelevanceStrategy::BayesBallFactors => {
            // the ball bounces over the factor graph itself: start at the kept variables and
            // spread through factors sharing an unobserved variable
            let mut frontier: Vec<Variable> = kept.iter().cloned().collect();
            let mut seen_vars: HashSet<Variable> = kept.clone();
            let mut marked = vec![false; scopes.len()];

            while let Some(v) = frontier.pop() {
                for (i, scope) in scopes.iter().enumerate() {
                    if marked[i] || ! scope.contains(&v) {
                        continue;
                    }

                    marked[i] = true;
                    for &w in scope.iter() {
                        if ! hard.contains(&w) && seen_vars.insert(w) {
                            frontier.push(w);
                        }
                    }
                }
            }

            marked
        },

        RelevanceStrategy::GraphSearch => {
            let mut requisite = requisite_graph_search(dag, kept, hard, soft);
            requisite.extend(kept.iter().cloned());

            scopes.iter()
                  .map(|s| ! s.is_disjoint(&requisite))
                  .collect()
        }
    }
}
