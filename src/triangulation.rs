//! Triangulation of an undirected graph into a junction tree.
//!
//! Turning a moral graph into a clique tree is a pluggable step: the inference engine only
//! depends on the `TriangulationStrategy` trait, which consumes an `UndirectedGraph` and returns
//! a `JunctionTree` together with the elimination bookkeeping ("which clique was created when
//! this variable was eliminated") that the engine needs to map factors onto cliques.
//!
//! `MinFillTriangulation` is the default strategy: greedy min-fill elimination with ties broken
//! toward the lowest variable id, followed by a maximum-weight spanning forest over the maximal
//! cliques (Jensen's construction). Every choice is deterministic, so rebuilding an unchanged
//! graph reproduces the same tree.

use graph::UndirectedGraph;
use util::{LauritzenError, Result};
use variable::Variable;

use std::collections::{HashMap, HashSet};

/// A tree (in general, a forest) of cliques over `Variable`s satisfying the running intersection
/// property: a variable held by two cliques is held by every clique on the path between them.
#[derive(Clone, Debug)]
pub struct JunctionTree {
    cliques: Vec<HashSet<Variable>>,
    neighbors: Vec<Vec<usize>>,
    created: HashMap<Variable, usize>,
    position: HashMap<Variable, usize>,
    order: Vec<Variable>
}

impl JunctionTree {

    /// The number of cliques
    pub fn clique_count(&self) -> usize {
        self.cliques.len()
    }

    /// The variables of a clique
    pub fn clique(&self, id: usize) -> &HashSet<Variable> {
        &self.cliques[id]
    }

    /// The cliques adjacent to the given clique, in ascending id order
    pub fn neighbors(&self, id: usize) -> &[usize] {
        &self.neighbors[id]
    }

    /// The separator of two adjacent cliques: the intersection of their variable sets
    pub fn separator(&self, a: usize, b: usize) -> HashSet<Variable> {
        self.cliques[a].intersection(&self.cliques[b]).cloned().collect()
    }

    /// The clique that was created when the given variable was eliminated
    pub fn created_clique(&self, v: &Variable) -> Option<usize> {
        self.created.get(v).cloned()
    }

    /// The position of the given variable in the elimination order
    pub fn elimination_position(&self, v: &Variable) -> Option<usize> {
        self.position.get(v).cloned()
    }

    /// The elimination order the tree was built from
    pub fn elimination_order(&self) -> &[Variable] {
        &self.order
    }

    /// The number of joint states of a clique: the product of its variables' cardinalities
    pub fn state_space(&self, id: usize) -> f64 {
        self.cliques[id].iter().map(|v| v.cardinality() as f64).product()
    }

    /// The total number of joint states across every clique
    pub fn total_state_space(&self) -> f64 {
        (0..self.cliques.len()).map(|c| self.state_space(c)).sum()
    }

    /// Check whether the given variable is held by any clique
    pub fn contains(&self, v: &Variable) -> bool {
        self.created.contains_key(v)
    }

    /// Partition the cliques into connected components, each in ascending id order
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.cliques.len()];
        let mut components = Vec::new();

        for root in 0..self.cliques.len() {
            if seen[root] {
                continue;
            }

            let mut component = Vec::new();
            let mut stack = vec![root];
            seen[root] = true;

            while let Some(c) = stack.pop() {
                component.push(c);
                for &n in self.neighbors[c].iter() {
                    if ! seen[n] {
                        seen[n] = true;
                        stack.push(n);
                    }
                }
            }

            component.sort();
            components.push(component);
        }

        components
    }

}


/// A strategy that triangulates an undirected graph and assembles the junction tree.
pub trait TriangulationStrategy {

    /// Build a `JunctionTree` covering every node of the graph.
    fn junction_tree(&self, graph: &UndirectedGraph) -> Result<JunctionTree>;

}


/// Greedy min-fill elimination. At each step the variable whose elimination introduces the fewest
/// fill-in edges is eliminated; ties resolve to the lowest variable id.
#[derive(Clone, Copy, Debug, Default)]
pub struct MinFillTriangulation;

impl MinFillTriangulation {

    /// Simulate elimination, returning the order and the clique formed at each step.
    fn eliminate(graph: &UndirectedGraph) -> (Vec<Variable>, Vec<HashSet<Variable>>) {
        let mut work = graph.clone();
        let mut order = Vec::with_capacity(graph.node_count());
        let mut cliques = Vec::with_capacity(graph.node_count());

        while work.node_count() > 0 {
            let mut best: Option<(usize, Variable)> = None;

            for v in work.nodes() {
                let mut ns: Vec<Variable> = work.neighbors(&v).unwrap().iter().cloned().collect();
                ns.sort();

                let mut fills = 0;
                for i in 0..ns.len() {
                    for j in (i + 1)..ns.len() {
                        if ! work.has_edge(&ns[i], &ns[j]) {
                            fills += 1;
                        }
                    }
                }

                // nodes() is ascending, so a strict comparison keeps the lowest id on ties
                if best.map_or(true, |(f, _)| fills < f) {
                    best = Some((fills, v));
                }
            }

            let (_, v) = best.unwrap();
            let mut ns: Vec<Variable> = work.neighbors(&v).unwrap().iter().cloned().collect();
            ns.sort();

            for i in 0..ns.len() {
                for j in (i + 1)..ns.len() {
                    work.add_edge(ns[i], ns[j]);
                }
            }

            let mut clique: HashSet<Variable> = ns.into_iter().collect();
            clique.insert(v);
            cliques.push(clique);

            order.push(v);
            work.remove_node(&v);
        }

        (order, cliques)
    }

}

impl TriangulationStrategy for MinFillTriangulation {

    fn junction_tree(&self, graph: &UndirectedGraph) -> Result<JunctionTree> {
        let (order, elim_cliques) = MinFillTriangulation::eliminate(graph);

        let position: HashMap<Variable, usize> =
            order.iter().enumerate().map(|(i, &v)| (v, i)).collect();

        // keep the maximal cliques, in elimination order; duplicates keep their first occurrence
        let mut maximal: Vec<HashSet<Variable>> = Vec::new();
        for (i, c) in elim_cliques.iter().enumerate() {
            let dominated = elim_cliques.iter().enumerate().any(|(j, other)| {
                if i == j {
                    false
                } else if c.len() < other.len() {
                    c.is_subset(other)
                } else {
                    // an identical clique survives only at its first occurrence
                    j < i && c == other
                }
            });

            if ! dominated {
                maximal.push(c.clone());
            }
        }

        // map each elimination step to the first maximal clique covering it
        let mut created = HashMap::new();
        for (i, &v) in order.iter().enumerate() {
            let host = maximal.iter()
                              .position(|m| elim_cliques[i].is_subset(m))
                              .ok_or_else(|| {
                                  LauritzenError::Fatal(
                                      String::from("An elimination clique is covered by no maximal clique")
                                  )
                              })?;
            created.insert(v, host);
        }

        // Jensen's construction: a maximum weight spanning forest of the clique graph, weighted
        // by separator size, is a junction tree of the triangulated graph
        let mut candidates: Vec<(usize, usize, usize)> = Vec::new();
        for i in 0..maximal.len() {
            for j in (i + 1)..maximal.len() {
                let weight = maximal[i].intersection(&maximal[j]).count();
                if weight > 0 {
                    candidates.push((weight, i, j));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut parent: Vec<usize> = (0..maximal.len()).collect();
        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); maximal.len()];

        fn find(parent: &mut Vec<usize>, mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        for (_, i, j) in candidates {
            let ri = find(&mut parent, i);
            let rj = find(&mut parent, j);
            if ri != rj {
                parent[ri] = rj;
                neighbors[i].push(j);
                neighbors[j].push(i);
            }
        }

        for ns in neighbors.iter_mut() {
            ns.sort();
        }

        Ok(JunctionTree {
            cliques: maximal,
            neighbors,
            created,
            position,
            order
        })
    }

}


#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn chain() {
        let a = Variable::binary();
        let b = Variable::binary();
        let c = Variable::binary();

        let mut g = UndirectedGraph::new();
        g.add_edge(a, b);
        g.add_edge(b, c);

        let tree = MinFillTriangulation.junction_tree(&g).unwrap();

        assert_eq!(2, tree.clique_count());
        let ab: HashSet<Variable> = vec![a, b].into_iter().collect();
        let bc: HashSet<Variable> = vec![b, c].into_iter().collect();
        assert!(tree.cliques.contains(&ab));
        assert!(tree.cliques.contains(&bc));

        // the two cliques are joined and separated by b
        assert_eq!(vec![1], tree.neighbors(0).to_vec());
        let sep = tree.separator(0, 1);
        assert_eq!(1, sep.len());
        assert!(sep.contains(&b));

        // every variable maps to a clique that holds it
        for v in vec![a, b, c] {
            let host = tree.created_clique(&v).unwrap();
            assert!(tree.clique(host).contains(&v));
        }

        assert_eq!(8.0, tree.total_state_space());
    }

    #[test]
    fn diamond() {
        // a - b, a - c, b - d, c - d, plus the fill that elimination introduces
        let a = Variable::binary();
        let b = Variable::binary();
        let c = Variable::binary();
        let d = Variable::binary();

        let mut g = UndirectedGraph::new();
        g.add_edge(a, b);
        g.add_edge(a, c);
        g.add_edge(b, d);
        g.add_edge(c, d);

        let tree = MinFillTriangulation.junction_tree(&g).unwrap();

        // one fill edge splits the square into two triangles
        assert_eq!(2, tree.clique_count());
        assert_eq!(3, tree.clique(0).len());
        assert_eq!(3, tree.clique(1).len());
        assert_eq!(2, tree.separator(0, 1).len());
    }

    #[test]
    fn forest() {
        let a = Variable::binary();
        let b = Variable::binary();
        let c = Variable::binary();

        let mut g = UndirectedGraph::new();
        g.add_edge(a, b);
        g.add_node(c);

        let tree = MinFillTriangulation.junction_tree(&g).unwrap();

        assert_eq!(2, tree.clique_count());
        assert_eq!(2, tree.components().len());

        let host = tree.created_clique(&c).unwrap();
        assert!(tree.neighbors(host).is_empty());
        assert_eq!(1, tree.clique(host).len());
    }

    #[test]
    fn running_intersection() {
        // a 5-cycle needs two fills; check the running intersection property on the result
        let vars: Vec<Variable> = (0..5).map(|_| Variable::binary()).collect();

        let mut g = UndirectedGraph::new();
        for i in 0..5 {
            g.add_edge(vars[i], vars[(i + 1) % 5]);
        }

        let tree = MinFillTriangulation.junction_tree(&g).unwrap();

        for v in vars.iter() {
            // the cliques holding v must induce a connected subtree; count the edges of that
            // induced subgraph and compare against (number of holders - 1)
            let holders: Vec<usize> = (0..tree.clique_count())
                .filter(|&c| tree.clique(c).contains(v))
                .collect();

            let mut edges = 0;
            for &c in holders.iter() {
                for &n in tree.neighbors(c).iter() {
                    if n > c && holders.contains(&n) {
                        edges += 1;
                    }
                }
            }

            assert_eq!(holders.len() - 1, edges);
        }
    }

    #[test]
    fn deterministic() {
        let vars: Vec<Variable> = (0..6).map(|_| Variable::discrete(3)).collect();

        let mut g = UndirectedGraph::new();
        for i in 0..6 {
            g.add_edge(vars[i], vars[(i + 1) % 6]);
        }
        g.add_edge(vars[0], vars[3]);

        let first = MinFillTriangulation.junction_tree(&g).unwrap();
        let second = MinFillTriangulation.junction_tree(&g).unwrap();

        assert_eq!(first.cliques, second.cliques);
        assert_eq!(first.neighbors, second.neighbors);
        assert_eq!(first.created, second.created);
        assert_eq!(first.order, second.order);
    }

}
