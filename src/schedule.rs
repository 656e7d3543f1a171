//! A deferred execution plan for factor combination and projection.
//!
//! When clique state spaces are small it is cheapest to combine and project factors eagerly. On
//! large state spaces the same calls can instead be *recorded* into a `Schedule`: an operation
//! graph whose nodes are combine/project steps and whose edges are data dependencies. Executing
//! the graph in one batch allows independent operations to run in parallel without changing any
//! result.
//!
//! The schedule is built for a single query and discarded afterwards; it carries no cross-query
//! state.

use factor::{CombinationOp, Factor, ProjectionOp};
use util::{LauritzenError, Result};
use variable::Variable;

use rayon::prelude::*;

use std::collections::HashSet;

/// A handle to the result of one recorded operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpRef(usize);

enum Op {
    /// An externally supplied factor
    Input(Factor),

    /// Pointwise combination of two earlier results
    Combine(usize, usize, CombinationOp),

    /// Projection of an earlier result onto a kept scope
    Project(usize, HashSet<Variable>, ProjectionOp)
}

/// An operation graph over factors. Operations refer to earlier operations by `OpRef`, so the
/// graph is acyclic by construction.
pub struct Schedule {
    ops: Vec<Op>
}

impl Schedule {

    pub fn new() -> Self {
        Schedule { ops: Vec::new() }
    }

    /// Record an input factor
    pub fn input(&mut self, f: Factor) -> OpRef {
        self.ops.push(Op::Input(f));
        OpRef(self.ops.len() - 1)
    }

    /// Record the combination of two results
    pub fn combine(&mut self, a: OpRef, b: OpRef, op: CombinationOp) -> OpRef {
        self.ops.push(Op::Combine(a.0, b.0, op));
        OpRef(self.ops.len() - 1)
    }

    /// Record the projection of a result onto `keep`
    pub fn project(&mut self, a: OpRef, keep: HashSet<Variable>, op: ProjectionOp) -> OpRef {
        self.ops.push(Op::Project(a.0, keep, op));
        OpRef(self.ops.len() - 1)
    }

    /// Execute the whole graph and return the factors produced by `outputs`, in order.
    ///
    /// With `parallel` set, operations of equal depth execute on a rayon pool; the dependency
    /// order is preserved either way, so the results are identical.
    pub fn execute(self, outputs: &[OpRef], parallel: bool) -> Result<Vec<Factor>> {
        // depth of each operation = longest dependency chain below it
        let mut depth: Vec<usize> = Vec::with_capacity(self.ops.len());
        for op in self.ops.iter() {
            let d = match op {
                &Op::Input(_) => 0,
                &Op::Combine(a, b, _) => 1 + depth[a].max(depth[b]),
                &Op::Project(a, _, _) => 1 + depth[a]
            };
            depth.push(d);
        }

        let max_depth = depth.iter().cloned().max().unwrap_or(0);
        let mut slots: Vec<Option<Factor>> = self.ops.iter().map(|_| None).collect();

        // move inputs into their slots up front
        let ops: Vec<Op> = self.ops;
        let mut pending: Vec<(usize, Op)> = Vec::new();
        for (i, op) in ops.into_iter().enumerate() {
            match op {
                Op::Input(f) => slots[i] = Some(f),
                other => pending.push((i, other))
            }
        }

        for level in 1..(max_depth + 1) {
            let batch: Vec<&(usize, Op)> =
                pending.iter().filter(|&&(i, _)| depth[i] == level).collect();

            let computed: Vec<(usize, Result<Factor>)> = if parallel {
                batch.par_iter()
                     .map(|&&(i, ref op)| (i, Schedule::eval(op, &slots)))
                     .collect()
            } else {
                batch.iter()
                     .map(|&&(i, ref op)| (i, Schedule::eval(op, &slots)))
                     .collect()
            };

            for (i, result) in computed {
                slots[i] = Some(result?);
            }
        }

        outputs.iter()
               .map(|&OpRef(i)| {
                   slots[i].clone().ok_or_else(|| {
                       LauritzenError::Fatal(String::from("A scheduled operation produced no factor"))
                   })
               })
               .collect()
    }

    fn eval(op: &Op, slots: &[Option<Factor>]) -> Result<Factor> {
        match op {
            &Op::Input(ref f) => Ok(f.clone()),
            &Op::Combine(a, b, c) => {
                let fa = slots[a].as_ref().ok_or_else(Schedule::missing)?;
                let fb = slots[b].as_ref().ok_or_else(Schedule::missing)?;
                fa.combine(fb, c)
            },
            &Op::Project(a, ref keep, p) => {
                let fa = slots[a].as_ref().ok_or_else(Schedule::missing)?;
                fa.project(keep, p)
            }
        }
    }

    fn missing() -> LauritzenError {
        LauritzenError::Fatal(String::from("A scheduled operation ran before its dependencies"))
    }

}


#[cfg(test)]
mod tests {

    use super::*;
    use variable::{all_assignments, Assignment};

    fn chain_inputs() -> (Variable, Variable, Variable, Factor, Factor, Factor) {
        let a = Variable::binary();
        let b = Variable::binary();
        let c = Variable::binary();

        let pa = Factor::new(vec![a], array![0.6, 0.4].into_dyn()).unwrap();
        let pb = Factor::cpd(b, vec![a], array![[0.7, 0.3], [0.2, 0.8]].into_dyn()).unwrap();
        let pc = Factor::cpd(c, vec![b], array![[0.9, 0.1], [0.5, 0.5]].into_dyn()).unwrap();

        (a, b, c, pa, pb, pc)
    }

    #[test]
    fn matches_eager_execution() {
        let (a, b, c, pa, pb, pc) = chain_inputs();

        // eager reference: sum_{a,b} P(a) P(b|a) P(c|b)
        let keep: HashSet<Variable> = vec![c].into_iter().collect();
        let eager = pa.product(&pb).unwrap()
                      .product(&pc).unwrap()
                      .project(&keep, ProjectionOp::Sum).unwrap();

        for &parallel in [false, true].iter() {
            let mut schedule = Schedule::new();
            let ia = schedule.input(pa.clone());
            let ib = schedule.input(pb.clone());
            let ic = schedule.input(pc.clone());

            let ab = schedule.combine(ia, ib, CombinationOp::Product);
            let abc = schedule.combine(ab, ic, CombinationOp::Product);
            let out = schedule.project(abc, keep.clone(), ProjectionOp::Sum);

            let results = schedule.execute(&[out], parallel).unwrap();
            assert_eq!(1, results.len());

            let deferred = &results[0];
            assert_eq!(eager.scope(), deferred.scope());
            for assn in all_assignments(&eager.scope()) {
                assert!(
                    (eager.value(&assn).unwrap() - deferred.value(&assn).unwrap()).abs() < 1e-12
                );
            }
        }

        // keep the unused bindings from tripping the lint
        let _ = (a, b);
    }

    #[test]
    fn independent_branches() {
        let (_, _, _, pa, pb, pc) = chain_inputs();

        let mut schedule = Schedule::new();
        let ia = schedule.input(pa);
        let ib = schedule.input(pb);
        let ic = schedule.input(pc);

        // two independent combines at the same depth, joined afterwards
        let left = schedule.combine(ia, ib, CombinationOp::Product);
        let right = schedule.combine(ib, ic, CombinationOp::Product);
        let joined = schedule.combine(left, right, CombinationOp::Product);

        let sequential = {
            let mut s = Schedule::new();
            let (a2, b2, c2) = {
                let (_, _, _, pa, pb, pc) = chain_inputs();
                (s.input(pa), s.input(pb), s.input(pc))
            };
            let l = s.combine(a2, b2, CombinationOp::Product);
            let r = s.combine(b2, c2, CombinationOp::Product);
            let j = s.combine(l, r, CombinationOp::Product);
            s.execute(&[j], false).unwrap()
        };

        let parallel = schedule.execute(&[joined], true).unwrap();

        // different Variable instances, but identical table contents
        assert_eq!(sequential[0].scope().len(), parallel[0].scope().len());
        let mut assn = Assignment::new();
        for v in parallel[0].scope() {
            assn.set(&v, 0);
        }
        let mut assn2 = Assignment::new();
        for v in sequential[0].scope() {
            assn2.set(&v, 0);
        }
        assert!(
            (parallel[0].value(&assn).unwrap() - sequential[0].value(&assn2).unwrap()).abs() < 1e-12
        );
    }

    #[test]
    fn multiple_outputs() {
        let (_, _, _, pa, pb, _) = chain_inputs();

        let mut schedule = Schedule::new();
        let ia = schedule.input(pa.clone());
        let ib = schedule.input(pb.clone());
        let ab = schedule.combine(ia, ib, CombinationOp::Product);

        let results = schedule.execute(&[ia, ab], false).unwrap();
        assert_eq!(2, results.len());
        assert_eq!(pa.scope(), results[0].scope());
        assert_eq!(pa.product(&pb).unwrap().scope(), results[1].scope());
    }

}
