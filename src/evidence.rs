//! Defines the `EvidenceStore` - the per-variable record of observations against a model.
//!
//! Evidence comes in two kinds. *Hard* evidence fixes a variable to a single value of its domain;
//! the inference engine removes such variables from the junction tree entirely and folds their
//! value into neighboring factors. *Soft* evidence is a likelihood weighting over the variable's
//! domain, injected into the variable's hosting clique as an extra factor.
//!
//! The store additionally keeps one pending `EvidenceChange` per variable. Changes accumulate
//! between inference cycles and are drained exactly once by the engine, which uses them to decide
//! between a full structure rebuild and a local factor update.

use factor::{Factor, Table};
use util::{LauritzenError, Result};
use variable::{Assignment, Variable};

use indexmap::IndexMap;

use std::collections::HashSet;

/// A single observation against one variable.
#[derive(Clone, Debug)]
pub enum Evidence {
    /// The variable is fixed to this value
    Hard(usize),

    /// A likelihood over the variable's domain, held as a factor with unit scope
    Soft(Factor)
}

impl Evidence {

    /// `true` if this is hard evidence
    pub fn is_hard(&self) -> bool {
        match self {
            &Evidence::Hard(_) => true,
            _ => false
        }
    }

}

/// The net effect of the mutations applied to one variable's evidence since the last drain.
/// `hard` describes the current kind (for `Erased`, the kind that was removed).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvidenceChange {
    Added { hard: bool },
    Modified { hard: bool, kind_changed: bool },
    Erased { hard: bool }
}

/// The per-variable evidence table of one inference engine.
#[derive(Clone, Debug, Default)]
pub struct EvidenceStore {
    entries: IndexMap<Variable, Evidence>,
    pending: IndexMap<Variable, EvidenceChange>
}

impl EvidenceStore {

    pub fn new() -> Self {
        EvidenceStore {
            entries: IndexMap::new(),
            pending: IndexMap::new()
        }
    }

    /// Observe a variable at a fixed value, replacing any previous evidence on it.
    ///
    /// # Errors
    /// * `LauritzenError::InvalidArgument` if `value` is outside the domain of `var`
    pub fn set_hard(&mut self, var: Variable, value: usize) -> Result<()> {
        if value >= var.cardinality() {
            return Err(
                LauritzenError::InvalidArgument(
                    format!("Value {} is outside the domain of {}", value, var)
                )
            );
        }

        let previous = self.entries.insert(var, Evidence::Hard(value));
        self.record(var, previous.as_ref(), true);
        Ok(())
    }

    /// Attach a likelihood over a variable's domain, replacing any previous evidence on it.
    ///
    /// # Errors
    /// * `LauritzenError::InvalidArgument` if the likelihood length does not match the domain
    /// * `LauritzenError::NonPositiveProbability` if the likelihood holds a negative value
    pub fn set_soft(&mut self, var: Variable, likelihood: &[f64]) -> Result<()> {
        if likelihood.len() != var.cardinality() {
            return Err(
                LauritzenError::InvalidArgument(
                    format!("Likelihood of length {} does not fit the domain of {}",
                            likelihood.len(), var)
                )
            );
        }

        let table = Table::from_shape_vec(vec![var.cardinality()], likelihood.to_vec())
            .expect("shape was checked above");
        let factor = Factor::new(vec![var], table)?;

        let previous = self.entries.insert(var, Evidence::Soft(factor));
        self.record(var, previous.as_ref(), false);
        Ok(())
    }

    /// Erase the evidence held on a variable. Returns `false` if there was none.
    pub fn erase(&mut self, var: Variable) -> bool {
        match self.entries.shift_remove(&var) {
            Some(previous) => {
                let was_hard = previous.is_hard();

                let merged = match self.pending.shift_remove(&var) {
                    // added then erased before a drain: net no-op
                    Some(EvidenceChange::Added { .. }) => None,
                    Some(EvidenceChange::Modified { .. }) | None =>
                        Some(EvidenceChange::Erased { hard: was_hard }),
                    Some(e @ EvidenceChange::Erased { .. }) => Some(e)
                };

                if let Some(m) = merged {
                    self.pending.insert(var, m);
                }

                true
            },
            None => false
        }
    }

    /// Fold a new mutation into the pending change of `var`.
    fn record(&mut self, var: Variable, previous: Option<&Evidence>, now_hard: bool) {
        let event = match previous {
            None => EvidenceChange::Added { hard: now_hard },
            Some(p) => EvidenceChange::Modified {
                hard: now_hard,
                kind_changed: p.is_hard() != now_hard
            }
        };

        let merged = match (self.pending.shift_remove(&var), event) {
            (None, e) => e,

            // still unseen by the engine, so any further mutation is part of the addition
            (Some(EvidenceChange::Added { .. }), EvidenceChange::Modified { hard, .. }) =>
                EvidenceChange::Added { hard },

            (Some(EvidenceChange::Modified { kind_changed: k1, .. }),
             EvidenceChange::Modified { hard, kind_changed: k2 }) =>
                EvidenceChange::Modified { hard, kind_changed: k1 || k2 },

            (Some(EvidenceChange::Erased { hard: was }), EvidenceChange::Added { hard }) =>
                EvidenceChange::Modified { hard, kind_changed: was != hard },

            (_, e) => e
        };

        self.pending.insert(var, merged);
    }

    /// Take every pending change, leaving the change log empty.
    pub fn drain_changes(&mut self) -> Vec<(Variable, EvidenceChange)> {
        self.pending.drain(..).collect()
    }

    /// `true` if mutations have accumulated since the last drain
    pub fn has_pending_changes(&self) -> bool {
        ! self.pending.is_empty()
    }

    /// The hard value observed for a variable, if any
    pub fn hard_value(&self, var: &Variable) -> Option<usize> {
        match self.entries.get(var) {
            Some(&Evidence::Hard(v)) => Some(v),
            _ => None
        }
    }

    /// The soft likelihood factor attached to a variable, if any
    pub fn soft_factor(&self, var: &Variable) -> Option<&Factor> {
        match self.entries.get(var) {
            Some(&Evidence::Soft(ref f)) => Some(f),
            _ => None
        }
    }

    /// Every variable holding hard evidence
    pub fn hard_nodes(&self) -> HashSet<Variable> {
        self.entries
            .iter()
            .filter(|&(_, e)| e.is_hard())
            .map(|(&v, _)| v)
            .collect()
    }

    /// Every variable holding soft evidence
    pub fn soft_nodes(&self) -> HashSet<Variable> {
        self.entries
            .iter()
            .filter(|&(_, e)| ! e.is_hard())
            .map(|(&v, _)| v)
            .collect()
    }

    /// The joint `Assignment` of every hard-evidenced variable
    pub fn hard_assignment(&self) -> Assignment {
        let mut assignment = Assignment::new();
        for (v, e) in self.entries.iter() {
            if let &Evidence::Hard(val) = e {
                assignment.set(v, val);
            }
        }

        assignment
    }

    /// The number of observed variables
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no variable is observed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

}
