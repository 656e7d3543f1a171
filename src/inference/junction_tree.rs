//! The junction-tree inference engine: structure building and incremental bookkeeping.
//!
//! The engine compiles a `DirectedModel` into a junction tree, assigns every projected CPT and
//! soft-evidence likelihood to a hosting clique, and answers posterior queries by lazy message
//! passing over the tree (see `propagation` and `posterior`). Between queries it tracks evidence
//! and target mutations and decides how much cached work survives:
//!
//! * `Ready` - caches are reusable as they stand.
//! * `FactorsOutdated` - the tree stands, but some clique factor lists must be refreshed and the
//!   messages depending on them dropped.
//! * `StructureOutdated` - the tree itself is stale and is rebuilt on the next query.

use evidence::{EvidenceChange, EvidenceStore};
use factor::{CombinationOp, Factor, ProjectionOp};
use graph::UndirectedGraph;
use model::Model;
use model::directed::DirectedModel;
use triangulation::{JunctionTree, MinFillTriangulation, TriangulationStrategy};
use util::{LauritzenError, Result};
use variable::Variable;
use super::relevance::{self, BarrenPolicy, DagView, RelevanceStrategy};

use indexmap::IndexMap;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::mem;

/// The provenance of a factor assigned to a clique. Local updates replace factors by origin, so
/// a changed likelihood or a re-projected CPT never duplicates its slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FactorOrigin {
    /// The (hard-evidence-projected) CPT of this variable
    Cpt(Variable),

    /// The soft-evidence likelihood attached to this variable
    Likelihood(Variable)
}

/// How stale the engine's caches are.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EngineState {
    Ready,
    FactorsOutdated,
    StructureOutdated
}

/// Exact inference over a `DirectedModel` by lazy propagation on a junction tree.
///
/// The engine exclusively owns its tree, factor store and caches. Queries take `&mut self`;
/// concurrent use of one engine must be serialized by the caller.
pub struct JunctionTreeEngine<'a> {
    pub(crate) model: &'a DirectedModel,
    pub(crate) dag: DagView,
    pub(crate) evidence: EvidenceStore,

    pub(crate) targets: HashSet<Variable>,
    pub(crate) joint_targets: Vec<BTreeSet<Variable>>,

    pub(crate) relevance: RelevanceStrategy,
    pub(crate) barren: BarrenPolicy,
    pub(crate) combination: CombinationOp,
    pub(crate) projection: ProjectionOp,
    triangulation: Box<TriangulationStrategy>,
    pub(crate) schedule_threshold: f64,
    pub(crate) parallel_schedules: bool,

    pub(crate) state: EngineState,
    pub(crate) tree: Option<JunctionTree>,
    pub(crate) node_clique: HashMap<Variable, usize>,
    pub(crate) joint_clique: HashMap<BTreeSet<Variable>, usize>,
    pub(crate) roots: Vec<usize>,
    pub(crate) clique_factors: Vec<IndexMap<FactorOrigin, Factor>>,
    pub(crate) messages: HashMap<(usize, usize), Vec<Factor>>,
    pub(crate) constants: IndexMap<Variable, f64>,
    pub(crate) posterior_cache: HashMap<Variable, Factor>,
    pub(crate) joint_cache: HashMap<BTreeSet<Variable>, Factor>
}

impl<'a> JunctionTreeEngine<'a> {

    /// Create an engine over the given model with no evidence and no registered targets.
    ///
    /// With no registered target every node is an implicit target: the first query compiles a
    /// tree covering the whole network, and any node can be queried. Registering targets narrows
    /// the tree to the relevant part of the network.
    pub fn new(model: &'a DirectedModel) -> Self {
        JunctionTreeEngine {
            model,
            dag: DagView::new(model),
            evidence: EvidenceStore::new(),
            targets: HashSet::new(),
            joint_targets: Vec::new(),
            relevance: RelevanceStrategy::BayesBallNodes,
            barren: BarrenPolicy::Prune,
            combination: CombinationOp::Product,
            projection: ProjectionOp::Sum,
            triangulation: Box::new(MinFillTriangulation),
            schedule_threshold: 4096.0,
            parallel_schedules: false,
            state: EngineState::StructureOutdated,
            tree: None,
            node_clique: HashMap::new(),
            joint_clique: HashMap::new(),
            roots: Vec::new(),
            clique_factors: Vec::new(),
            messages: HashMap::new(),
            constants: IndexMap::new(),
            posterior_cache: HashMap::new(),
            joint_cache: HashMap::new()
        }
    }

    ///////////////////////////////////////////////////////////////////////////
    // configuration

    /// Select the relevance analysis used for pruning and message filtering. Every cached message
    /// is dropped, since the choice changes which factors a message depends on.
    pub fn set_relevance_strategy(&mut self, strategy: RelevanceStrategy) {
        if strategy != self.relevance {
            self.relevance = strategy;
            self.invalidate_all_messages();
        }
    }

    /// Enable or disable barren-node elimination. The junction tree is rebuilt on the next
    /// query, since the retained node set changes.
    pub fn set_barren_policy(&mut self, policy: BarrenPolicy) {
        if policy != self.barren {
            self.barren = policy;
            self.state = EngineState::StructureOutdated;
        }
    }

    /// Select the operator used to combine factors.
    pub fn set_combination_op(&mut self, op: CombinationOp) {
        if op != self.combination {
            self.combination = op;
            self.invalidate_all_messages();
        }
    }

    /// Select the operator used to project factors onto separators and targets.
    pub fn set_projection_op(&mut self, op: ProjectionOp) {
        if op != self.projection {
            self.projection = op;
            self.invalidate_all_messages();
        }
    }

    /// Replace the triangulation strategy. The tree is rebuilt on the next query.
    pub fn set_triangulation(&mut self, strategy: Box<TriangulationStrategy>) {
        self.triangulation = strategy;
        self.state = EngineState::StructureOutdated;
    }

    /// Set the total clique state-space size above which combination and projection are recorded
    /// into a deferred `Schedule` instead of executing eagerly.
    pub fn set_schedule_threshold(&mut self, threshold: f64) {
        self.schedule_threshold = threshold;
    }

    /// Allow deferred schedules to execute independent operations in parallel.
    pub fn set_parallel_schedules(&mut self, parallel: bool) {
        self.parallel_schedules = parallel;
    }

    ///////////////////////////////////////////////////////////////////////////
    // evidence

    /// Observe a variable at a fixed value.
    pub fn add_hard_evidence(&mut self, var: Variable, value: usize) -> Result<()> {
        if ! self.model.contains(&var) {
            return Err(
                LauritzenError::InvalidArgument(format!("{} is not a model variable", var))
            );
        }

        self.evidence.set_hard(var, value)
    }

    /// Attach a soft likelihood over a variable's domain.
    pub fn add_soft_evidence(&mut self, var: Variable, likelihood: &[f64]) -> Result<()> {
        if ! self.model.contains(&var) {
            return Err(
                LauritzenError::InvalidArgument(format!("{} is not a model variable", var))
            );
        }

        self.evidence.set_soft(var, likelihood)
    }

    /// Erase the evidence held on a variable. Returns `false` if there was none.
    pub fn erase_evidence(&mut self, var: Variable) -> bool {
        self.evidence.erase(var)
    }

    /// Read access to the evidence store
    pub fn evidence(&self) -> &EvidenceStore {
        &self.evidence
    }

    ///////////////////////////////////////////////////////////////////////////
    // targets

    /// Register a marginal target. Rebuilds the tree only if the current tree does not already
    /// cover the variable.
    pub fn add_target(&mut self, var: Variable) -> Result<()> {
        if ! self.model.contains(&var) {
            return Err(
                LauritzenError::UndefinedElement(format!("{} is not a model variable", var))
            );
        }

        if self.targets.insert(var) {
            let covered = self.evidence.hard_value(&var).is_some()
                || self.node_clique.contains_key(&var);

            if self.tree.is_none() || ! covered {
                self.state = EngineState::StructureOutdated;
            }
        }

        Ok(())
    }

    /// Unregister a marginal target. Returns `false` if it was not registered.
    pub fn remove_target(&mut self, var: &Variable) -> bool {
        let removed = self.targets.remove(var);

        // an empty target set means every node is an implicit target again, which the pruned
        // tree does not cover
        if removed && self.targets.is_empty() && self.joint_targets.is_empty() {
            self.state = EngineState::StructureOutdated;
        }

        removed
    }

    /// Register a joint target. Rebuilds the tree only if no existing clique hosts every
    /// non-hard-evidence member.
    pub fn add_joint_target(&mut self, vars: &HashSet<Variable>) -> Result<()> {
        if vars.is_empty() {
            return Err(LauritzenError::InvalidScope);
        }

        for v in vars.iter() {
            if ! self.model.contains(v) {
                return Err(
                    LauritzenError::UndefinedElement(format!("{} is not a model variable", v))
                );
            }
        }

        let key: BTreeSet<Variable> = vars.iter().cloned().collect();
        if self.joint_targets.contains(&key) {
            return Ok(());
        }

        self.joint_targets.push(key.clone());

        if let Some(host) = self.find_covering_clique(&key) {
            self.joint_clique.insert(key, host);
        } else {
            self.state = EngineState::StructureOutdated;
        }

        Ok(())
    }

    /// Unregister a joint target. Returns `false` if it was not registered.
    pub fn remove_joint_target(&mut self, vars: &HashSet<Variable>) -> bool {
        let key: BTreeSet<Variable> = vars.iter().cloned().collect();

        match self.joint_targets.iter().position(|jt| *jt == key) {
            Some(pos) => {
                self.joint_targets.remove(pos);
                self.joint_clique.remove(&key);
                self.joint_cache.remove(&key);

                if self.targets.is_empty() && self.joint_targets.is_empty() {
                    self.state = EngineState::StructureOutdated;
                }

                true
            },
            None => false
        }
    }

    /// The registered marginal targets
    pub fn targets(&self) -> &HashSet<Variable> {
        &self.targets
    }

    ///////////////////////////////////////////////////////////////////////////
    // observability

    /// The number of currently valid cached messages, over both directions of every separator.
    pub fn cached_message_count(&self) -> usize {
        self.messages.len()
    }

    /// The number of cliques of the current tree, if one has been built.
    pub fn clique_count(&self) -> Option<usize> {
        self.tree.as_ref().map(|t| t.clique_count())
    }

    ///////////////////////////////////////////////////////////////////////////
    // internals shared with the propagation and posterior modules

    pub(crate) fn tree_ref(&self) -> Result<&JunctionTree> {
        self.tree.as_ref().ok_or_else(|| {
            LauritzenError::Fatal(String::from("No junction tree has been built"))
        })
    }

    /// The targets driving structure building: the registered ones, or every node when none is
    /// registered.
    pub(crate) fn effective_targets(&self) -> HashSet<Variable> {
        if self.targets.is_empty() && self.joint_targets.is_empty() {
            self.model.variables()
        } else {
            let mut targets = self.targets.clone();
            for jt in self.joint_targets.iter() {
                targets.extend(jt.iter().cloned());
            }
            targets
        }
    }

    /// `true` if every non-hard-evidence model variable is hosted by the current tree.
    pub(crate) fn covers_whole_network(&self) -> bool {
        if self.tree.is_none() {
            return false;
        }

        self.model
            .topological_order()
            .iter()
            .all(|v| self.evidence.hard_value(v).is_some() || self.node_clique.contains_key(v))
    }

    /// Find a clique hosting every non-hard-evidence member of the given set, preferring the
    /// lowest clique id. `None` when the members are spread over no single clique. An all-hard
    /// set needs no clique and reports the first one (or nothing on an empty tree).
    fn find_covering_clique(&self, key: &BTreeSet<Variable>) -> Option<usize> {
        let tree = match self.tree {
            Some(ref t) => t,
            None => return None
        };

        let members: Vec<Variable> = key.iter()
                                        .filter(|v| self.evidence.hard_value(v).is_none())
                                        .cloned()
                                        .collect();

        if members.is_empty() {
            return None;
        }

        (0..tree.clique_count()).find(|&c| members.iter().all(|m| tree.clique(c).contains(m)))
    }

    /// Drop every cached message and posterior. The tree and the clique factors stand.
    pub(crate) fn invalidate_all_messages(&mut self) {
        self.messages.clear();
        self.posterior_cache.clear();
        self.joint_cache.clear();
    }

    ///////////////////////////////////////////////////////////////////////////
    // update cycle

    /// Bring the engine up to date with every pending evidence and configuration change. Called
    /// at the start of every query.
    pub(crate) fn prepare(&mut self) -> Result<()> {
        let changes = self.evidence.drain_changes();

        let mut state = self.state;
        if self.tree.is_none() {
            state = EngineState::StructureOutdated;
        }

        let mut local: Vec<(Variable, EvidenceChange)> = Vec::new();

        for (var, change) in changes {
            match change {
                EvidenceChange::Added { hard: true }
                | EvidenceChange::Erased { hard: true }
                | EvidenceChange::Modified { kind_changed: true, .. } => {
                    state = EngineState::StructureOutdated;
                },

                EvidenceChange::Modified { hard: true, kind_changed: false } => {
                    if state == EngineState::Ready {
                        state = EngineState::FactorsOutdated;
                    }
                    local.push((var, change));
                },

                EvidenceChange::Added { hard: false } => {
                    if self.node_clique.contains_key(&var) {
                        if state == EngineState::Ready {
                            state = EngineState::FactorsOutdated;
                        }
                        local.push((var, change));
                    } else {
                        // the likelihood's node was pruned away; it needs a hosting clique
                        state = EngineState::StructureOutdated;
                    }
                },

                EvidenceChange::Modified { hard: false, .. }
                | EvidenceChange::Erased { hard: false } => {
                    if self.node_clique.contains_key(&var) {
                        if state == EngineState::Ready {
                            state = EngineState::FactorsOutdated;
                        }
                        local.push((var, change));
                    }
                    // a pruned node's likelihood was never hosted, so nothing changes
                }
            }
        }

        match state {
            EngineState::Ready => (),
            EngineState::StructureOutdated => self.rebuild()?,
            EngineState::FactorsOutdated => self.local_update(&local)?
        }

        self.state = EngineState::Ready;
        Ok(())
    }

    ///////////////////////////////////////////////////////////////////////////
    // structure building

    /// Compile the moral graph, prune it, triangulate it and reinitialize the factor store.
    fn rebuild(&mut self) -> Result<()> {
        let hard = self.evidence.hard_nodes();
        let soft = self.evidence.soft_nodes();
        let hard_assignment = self.evidence.hard_assignment();
        let all_nodes = self.model.variables();

        let eff_targets = self.effective_targets();
        let all_targeted = eff_targets.len() == all_nodes.len();

        let mut retained = all_nodes;

        // barren nodes influence neither the targets nor the evidence
        if ! all_targeted && self.barren == BarrenPolicy::Prune {
            let mut boundary = eff_targets.clone();
            boundary.extend(hard.iter().cloned());
            boundary.extend(soft.iter().cloned());

            for b in relevance::barren_nodes(&self.dag, &retained, &boundary) {
                retained.remove(&b);
            }
        }

        // d-separation pruning: keep the nodes that can influence the targets, plus the
        // hard-evidence nodes whose values are folded into factors below
        if ! all_targeted && self.relevance != RelevanceStrategy::FindAll {
            let keep = match self.relevance {
                RelevanceStrategy::GraphSearch => {
                    let mut k = relevance::requisite_graph_search(&self.dag, &eff_targets, &hard, &soft);
                    k.extend(eff_targets.iter().cloned());
                    k
                },
                _ => relevance::relevant_nodes(&self.dag, &eff_targets, &hard, &soft)
            };

            retained.retain(|v| keep.contains(v) || hard.contains(v));
        }

        // moralize: connect every retained node to its retained parents and those parents to
        // each other
        let mut moral = UndirectedGraph::new();
        let mut retained_sorted: Vec<Variable> = retained.iter().cloned().collect();
        retained_sorted.sort();

        for &v in retained_sorted.iter() {
            moral.add_node(v);
        }

        for &v in retained_sorted.iter() {
            let parents: Vec<Variable> = self.dag
                                             .parents(&v)
                                             .iter()
                                             .filter(|p| retained.contains(p))
                                             .cloned()
                                             .collect();

            for (i, &p) in parents.iter().enumerate() {
                moral.add_edge(v, p);
                for &q in parents[(i + 1)..].iter() {
                    moral.add_edge(p, q);
                }
            }
        }

        // a joint target must end up inside a single clique, so its members form one
        for jt in self.joint_targets.iter() {
            let members: Vec<Variable> = jt.iter()
                                           .filter(|m| retained.contains(m) && ! hard.contains(m))
                                           .cloned()
                                           .collect();
            for (i, &a) in members.iter().enumerate() {
                for &b in members[(i + 1)..].iter() {
                    moral.add_edge(a, b);
                }
            }
        }

        // hard-evidence nodes are folded into factors, not represented in the tree
        for h in hard.iter() {
            moral.remove_node(h);
        }

        let tree = self.triangulation.junction_tree(&moral)?;

        // map every tree variable to the clique created at the earliest elimination position
        // among the variable and its retained parents
        let mut node_clique: HashMap<Variable, usize> = HashMap::new();
        for &v in moral.nodes().iter() {
            let mut candidates: Vec<Variable> = vec![v];
            candidates.extend(
                self.dag.parents(&v).iter().filter(|p| tree.contains(p)).cloned()
            );

            let host = Self::earliest_created(&tree, &candidates)?;
            node_clique.insert(v, host);
        }

        // a hard-evidence node with retained parents leaves its projected CPT with them
        let mut hard_sorted: Vec<Variable> = hard.iter().cloned().collect();
        hard_sorted.sort();
        for &h in hard_sorted.iter() {
            let candidates: Vec<Variable> = self.dag
                                                .parents(&h)
                                                .iter()
                                                .filter(|p| tree.contains(p))
                                                .cloned()
                                                .collect();
            if ! candidates.is_empty() {
                let host = Self::earliest_created(&tree, &candidates)?;
                node_clique.insert(h, host);
            }
        }

        // joint targets map to the clique hosting their non-hard members; an all-hard joint
        // target stays unmapped and is answered from the evidence factors alone
        let mut joint_clique: HashMap<BTreeSet<Variable>, usize> = HashMap::new();
        for jt in self.joint_targets.iter() {
            let members: Vec<Variable> = jt.iter()
                                           .filter(|m| tree.contains(m))
                                           .cloned()
                                           .collect();
            if members.is_empty() {
                continue;
            }

            let host = Self::earliest_created(&tree, &members)?;
            if ! members.iter().all(|m| tree.clique(host).contains(m)) {
                return Err(
                    LauritzenError::Fatal(
                        String::from("A joint target's hosting clique does not cover it")
                    )
                );
            }
            joint_clique.insert(jt.clone(), host);
        }

        // assign the projected CPTs, recording fully collapsed ones as constants
        let mut clique_factors: Vec<IndexMap<FactorOrigin, Factor>> =
            (0..tree.clique_count()).map(|_| IndexMap::new()).collect();
        let mut constants: IndexMap<Variable, f64> = IndexMap::new();

        for w in self.model.topological_order() {
            let cpd = self.model.cpd(&w).ok_or_else(|| {
                LauritzenError::Fatal(String::from("A model variable lost its CPD"))
            })?;

            if let Some(&c) = node_clique.get(&w) {
                let projected = cpd.reduce(&hard_assignment);
                let in_clique = projected.scope().iter().all(|s| tree.clique(c).contains(s));
                if projected.is_identity() || ! in_clique {
                    return Err(
                        LauritzenError::Fatal(
                            String::from("A projected CPT does not fit its hosting clique")
                        )
                    );
                }

                clique_factors[c].insert(FactorOrigin::Cpt(w), projected);
            } else if cpd.scope().iter().all(|s| hard.contains(s)) {
                // every scope variable observed: the CPT collapses to a number
                constants.insert(w, cpd.value(&hard_assignment)?);
            }
            // otherwise the CPT was pruned as irrelevant to the current targets
        }

        // soft likelihoods join their node's hosting clique
        let mut soft_sorted: Vec<Variable> = soft.iter().cloned().collect();
        soft_sorted.sort();
        for &s in soft_sorted.iter() {
            if let Some(&c) = node_clique.get(&s) {
                let likelihood = self.evidence.soft_factor(&s).ok_or_else(|| {
                    LauritzenError::Fatal(String::from("A soft-evidence factor disappeared"))
                })?;
                clique_factors[c].insert(FactorOrigin::Likelihood(s), likelihood.clone());
            }
        }

        // one root per connected component: the smallest-state-space clique hosting a target,
        // first encountered on ties
        let target_hosts: HashSet<usize> = eff_targets.iter()
                                                      .filter_map(|t| node_clique.get(t))
                                                      .cloned()
                                                      .collect();
        let mut roots = Vec::new();
        for component in tree.components() {
            let candidates: Vec<usize> = component.iter()
                                                  .filter(|c| target_hosts.contains(c))
                                                  .cloned()
                                                  .collect();
            let pool = if candidates.is_empty() { component } else { candidates };

            let mut best: Option<(f64, usize)> = None;
            for c in pool {
                let size = tree.state_space(c);
                if best.map_or(true, |(s, _)| size < s) {
                    best = Some((size, c));
                }
            }

            if let Some((_, c)) = best {
                roots.push(c);
            }
        }

        debug!(
            "rebuilt junction tree: {} cliques over {} variables, {} constant CPTs",
            tree.clique_count(),
            moral.node_count(),
            constants.len()
        );

        self.tree = Some(tree);
        self.node_clique = node_clique;
        self.joint_clique = joint_clique;
        self.roots = roots;
        self.clique_factors = clique_factors;
        self.constants = constants;
        self.messages.clear();
        self.posterior_cache.clear();
        self.joint_cache.clear();

        Ok(())
    }

    /// Among the candidates, the clique created at the earliest elimination position.
    fn earliest_created(tree: &JunctionTree, candidates: &[Variable]) -> Result<usize> {
        let mut best: Option<(usize, usize)> = None;

        for v in candidates.iter() {
            let position = tree.elimination_position(v).ok_or_else(|| {
                LauritzenError::Fatal(String::from("A mapped variable is missing from the tree"))
            })?;

            if best.map_or(true, |(p, _)| position < p) {
                let created = tree.created_clique(v).ok_or_else(|| {
                    LauritzenError::Fatal(String::from("A mapped variable has no creation clique"))
                })?;
                best = Some((position, created));
            }
        }

        best.map(|(_, c)| c).ok_or_else(|| {
            LauritzenError::Fatal(String::from("No candidate clique for a hosted variable"))
        })
    }

    ///////////////////////////////////////////////////////////////////////////
    // local update

    /// Refresh the factor store after evidence changes that left the tree intact, then diffuse
    /// the invalidation outward and drop the posteriors it reaches.
    fn local_update(&mut self, changes: &[(Variable, EvidenceChange)]) -> Result<()> {
        let hard_assignment = self.evidence.hard_assignment();
        let mut dirty: HashSet<usize> = HashSet::new();
        let mut changed_hard: HashSet<Variable> = HashSet::new();

        for &(var, change) in changes.iter() {
            match change {
                EvidenceChange::Modified { hard: true, .. } => {
                    changed_hard.insert(var);

                    // every hosted CPT mentioning the changed value is re-projected
                    let owners: Vec<(Variable, usize)> = self.node_clique
                        .iter()
                        .filter(|&(w, _)| {
                            self.model.cpd(w).map_or(false, |cpd| cpd.scope().contains(&var))
                        })
                        .map(|(&w, &c)| (w, c))
                        .collect();

                    for (w, c) in owners {
                        let cpd = self.model.cpd(&w).ok_or_else(|| {
                            LauritzenError::Fatal(String::from("A model variable lost its CPD"))
                        })?;
                        let projected = cpd.reduce(&hard_assignment);
                        self.clique_factors[c].insert(FactorOrigin::Cpt(w), projected);
                        dirty.insert(c);
                    }

                    // fully collapsed CPTs re-evaluate their constant
                    let owners: Vec<Variable> = self.constants.keys().cloned().collect();
                    for w in owners {
                        let cpd = self.model.cpd(&w).ok_or_else(|| {
                            LauritzenError::Fatal(String::from("A model variable lost its CPD"))
                        })?;
                        if cpd.scope().contains(&var) {
                            self.constants.insert(w, cpd.value(&hard_assignment)?);
                        }
                    }
                },

                EvidenceChange::Added { hard: false }
                | EvidenceChange::Modified { hard: false, .. } => {
                    let c = *self.node_clique.get(&var).ok_or_else(|| {
                        LauritzenError::Fatal(String::from("A local update hit an unhosted node"))
                    })?;
                    let likelihood = self.evidence.soft_factor(&var).ok_or_else(|| {
                        LauritzenError::Fatal(String::from("A soft-evidence factor disappeared"))
                    })?.clone();

                    self.clique_factors[c].insert(FactorOrigin::Likelihood(var), likelihood);
                    dirty.insert(c);
                },

                EvidenceChange::Erased { hard: false } => {
                    let c = *self.node_clique.get(&var).ok_or_else(|| {
                        LauritzenError::Fatal(String::from("A local update hit an unhosted node"))
                    })?;
                    self.clique_factors[c].shift_remove(&FactorOrigin::Likelihood(var));
                    dirty.insert(c);
                },

                _ => {
                    return Err(
                        LauritzenError::Fatal(
                            String::from("A structural evidence change reached the local update")
                        )
                    );
                }
            }
        }

        debug!("local update: {} dirty cliques, {} changed hard values", dirty.len(), changed_hard.len());

        let invalidated = self.invalidate_outward(&dirty)?;

        // posteriors fed by an invalidated clique are stale, as are those answered directly
        // from a changed hard value
        let node_clique = &self.node_clique;
        self.posterior_cache.retain(|v, _| {
            ! changed_hard.contains(v)
                && node_clique.get(v).map_or(true, |c| ! invalidated.contains(c))
        });

        let joint_clique = &self.joint_clique;
        self.joint_cache.retain(|key, _| {
            key.iter().all(|v| ! changed_hard.contains(v))
                && joint_clique.get(key).map_or(true, |c| ! invalidated.contains(c))
        });

        Ok(())
    }

    /// Save the target registration, run `body`, and restore it. Used by the whole-network
    /// queries, which temporarily treat every node as a target.
    pub(crate) fn with_all_targets<T, F>(&mut self, body: F) -> Result<T>
        where F: FnOnce(&mut Self) -> Result<T>
    {
        let saved_targets = mem::replace(&mut self.targets, HashSet::new());
        let saved_joints = mem::replace(&mut self.joint_targets, Vec::new());
        let saved_strategy = self.relevance;

        if saved_strategy != RelevanceStrategy::FindAll {
            self.relevance = RelevanceStrategy::FindAll;
            self.invalidate_all_messages();
        }

        if ! self.covers_whole_network() {
            self.state = EngineState::StructureOutdated;
        }

        let result = body(self);

        self.targets = saved_targets;
        self.joint_targets = saved_joints;

        if self.relevance != saved_strategy {
            self.relevance = saved_strategy;
            self.invalidate_all_messages();
        }

        result
    }

}
