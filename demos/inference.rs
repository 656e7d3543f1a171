//! Provides an example of how to use lauritzen to perform exact inference on a Bayesian Network.

extern crate env_logger;
extern crate lauritzen;
#[macro_use]
extern crate ndarray;

use lauritzen as lz;
use lz::Model;
use std::collections::HashSet;

fn main() -> lz::Result<()> {
    env_logger::init();

    let difficulty = lz::Variable::binary();
    let intelligence = lz::Variable::binary();
    let grade = lz::Variable::discrete(3);
    let sat = lz::Variable::binary();
    let letter = lz::Variable::binary();

    let scope = StudentVariables(difficulty, intelligence, grade, sat, letter);

    /////////////////////////////////////////////////////
    // Step 1: Build Model
    let model = build_model(scope)?;

    /////////////////////////////////////////////////////
    // Step 2: Build the inference engine and register the evidence
    let mut engine = lz::JunctionTreeEngine::new(&model);
    engine.add_hard_evidence(difficulty, 0)?;
    engine.add_hard_evidence(sat, 0)?;
    engine.add_hard_evidence(letter, 1)?;

    /////////////////////////////////////////////////////
    // Step 3: Run a Conditional Query

    let scope = vec![intelligence];
    let p = engine.posterior(intelligence)?;

    for (i, assignment) in lz::all_assignments(&scope).enumerate() {
        println!("P(I = {} | D = 0, S = 0, L = 1) = {:.4}", i, p.value(&assignment).unwrap());
    }

    /////////////////////////////////////////////////////
    // Step 4: Revise the evidence in place
    //
    // Changing the value of existing hard evidence leaves the tree standing: only the factors
    // the value touches are re-projected, and only the messages downstream of them recomputed.
    engine.add_hard_evidence(sat, 1)?;

    let p = engine.posterior(intelligence)?;
    for (i, assignment) in lz::all_assignments(&scope).enumerate() {
        println!("P(I = {} | D = 0, S = 1, L = 1) = {:.4}", i, p.value(&assignment).unwrap());
    }

    /////////////////////////////////////////////////////
    // Step 5: Whole-network queries

    println!("P(e) = {:.6}", engine.evidence_probability()?);

    let explanation = engine.mpe()?;
    let mut bindings: Vec<(String, usize)> = explanation
        .variables()
        .map(|v| {
            let name = model.lookup_name(&v).cloned().unwrap_or_else(|| v.to_string());
            (name, *explanation.get(&v).unwrap())
        })
        .collect();
    bindings.sort();

    print!("MPE:");
    for (name, value) in bindings {
        print!(" {} = {}", name, value);
    }
    println!(" (log posterior {:.4})", engine.mpe_log_posterior()?);

    Ok(())
}

struct StudentVariables(lz::Variable, lz::Variable, lz::Variable, lz::Variable, lz::Variable);

fn build_model(vars: StudentVariables) -> lz::Result<lz::DirectedModel> {
    let StudentVariables(d, i, g, s, l) = vars;

    ///////////////////////////////////////////////////
    // Step 1: Build CPTs for variables with parents
    let cpt_g = lz::Factor::cpd(
        g,
        vec![i, d],
        array![
            [[0.3, 0.4, 0.3], [0.05, 0.25, 0.7]],
            [[0.9, 0.08, 0.02], [0.5, 0.3, 0.2]]
        ].into_dyn()
    )?;

    let cpt_s = lz::Factor::cpd(
        s,
        vec![i],
        array![
            [0.95, 0.05],
            [0.2, 0.8]
        ].into_dyn()
    )?;

    let cpt_l = lz::Factor::cpd(
        l,
        vec![g],
        array![
            [0.1, 0.9],
            [0.4, 0.6],
            [0.99, 0.01]
        ].into_dyn()
    )?;

    ///////////////////////////////////////////////////
    // Step 2: Build the Model
    let mut builder = lz::DirectedModelBuilder::new();
    builder = builder.with_named_variable(&d, "D", HashSet::new(), lz::Initialization::Binomial(0.6));
    builder = builder.with_named_variable(&i, "I", HashSet::new(), lz::Initialization::Binomial(0.7));
    builder = builder.with_named_variable(
        &g, "G", vec![d, i].into_iter().collect(), lz::Initialization::Table(cpt_g)
    );
    builder = builder.with_named_variable(
        &s, "S", vec![i].into_iter().collect(), lz::Initialization::Table(cpt_s)
    );
    builder = builder.with_named_variable(
        &l, "L", vec![g].into_iter().collect(), lz::Initialization::Table(cpt_l)
    );

    builder.build()
}
