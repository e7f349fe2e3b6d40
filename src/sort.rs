// Copyright 2021 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The dependency sorter (§4.5): three independent topological orderings
//! over `refId`s, one each for `evalAux`, `evalLevels`, and the init-time
//! phase (`initConstants`/`initLookups`/`initLevels`).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::common::{Ident, Result};
use crate::variable::{VarType, Variable};

/// Kahn's algorithm with a min-heap ready queue so ties (including every
/// dependency-free node) resolve in `refId` order: a run with no edges at
/// all degenerates to the ascending, stable order §4.5 calls for.
fn topo_sort(nodes: &[Ident], deps: &HashMap<Ident, Vec<Ident>>) -> Result<Vec<Ident>> {
    let node_set: HashSet<&Ident> = nodes.iter().collect();
    let mut indegree: HashMap<Ident, usize> = nodes.iter().map(|n| (n.clone(), 0)).collect();
    let mut dependents: HashMap<Ident, Vec<Ident>> = HashMap::new();

    for n in nodes {
        for d in deps.get(n).into_iter().flatten() {
            if node_set.contains(d) {
                *indegree.get_mut(n).unwrap() += 1;
                dependents.entry(d.clone()).or_default().push(n.clone());
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<Ident>> = indegree
        .iter()
        .filter(|(_, &c)| c == 0)
        .map(|(n, _)| Reverse(n.clone()))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(n)) = ready.pop() {
        order.push(n.clone());
        for m in dependents.get(&n).into_iter().flatten() {
            let e = indegree.get_mut(m).unwrap();
            *e -= 1;
            if *e == 0 {
                ready.push(Reverse(m.clone()));
            }
        }
    }

    if order.len() != nodes.len() {
        let done: HashSet<&Ident> = order.iter().collect();
        let mut remaining: Vec<&Ident> = nodes.iter().filter(|n| !done.contains(n)).collect();
        remaining.sort();
        return err!(DependencyCycle, remaining[0]);
    }
    Ok(order)
}

/// Kahn's algorithm, but a real cycle never aborts: whenever the ready
/// queue runs dry with nodes still unplaced, the smallest remaining `refId`
/// is forced into the order as if it had no outstanding dependencies, same
/// as `emit_eval_levels` reading every level's *current* value into a
/// shadow cell before committing any of them -- a level-to-level cycle
/// after inversion picks a value to emit this one value; its own dependents
/// just see that level's current (not yet updated) value regardless of the
/// position chosen.
fn topo_sort_lenient(nodes: &[Ident], deps: &HashMap<Ident, Vec<Ident>>) -> Vec<Ident> {
    let node_set: HashSet<&Ident> = nodes.iter().collect();
    let mut indegree: HashMap<Ident, usize> = nodes.iter().map(|n| (n.clone(), 0)).collect();
    let mut dependents: HashMap<Ident, Vec<Ident>> = HashMap::new();

    for n in nodes {
        for d in deps.get(n).into_iter().flatten() {
            if node_set.contains(d) {
                *indegree.get_mut(n).unwrap() += 1;
                dependents.entry(d.clone()).or_default().push(n.clone());
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<Ident>> = indegree
        .iter()
        .filter(|(_, &c)| c == 0)
        .map(|(n, _)| Reverse(n.clone()))
        .collect();
    let mut placed: HashSet<Ident> = HashSet::new();
    let mut order = Vec::with_capacity(nodes.len());

    while order.len() < nodes.len() {
        if ready.is_empty() {
            let mut remaining: Vec<&Ident> = nodes.iter().filter(|n| !placed.contains(*n)).collect();
            remaining.sort();
            ready.push(Reverse(remaining[0].clone()));
        }
        while let Some(Reverse(n)) = ready.pop() {
            if !placed.insert(n.clone()) {
                continue;
            }
            order.push(n.clone());
            for m in dependents.get(&n).into_iter().flatten() {
                if placed.contains(m) {
                    continue;
                }
                let e = indegree.get_mut(m).unwrap();
                *e = e.saturating_sub(1);
                if *e == 0 {
                    ready.push(Reverse(m.clone()));
                }
            }
        }
    }
    order
}

/// `evalAux` order (§4.5): edges run dependency-before-dependent among
/// `Aux` variables only. `Const`/`Data`/`Lookup` values are already
/// available every step and `Level` values carry over from the last
/// integration, so neither constrains this graph. The `Time` pseudo-variable
/// defaults to `VarType::Aux` (§3, `Variable::time_placeholder`) but is not
/// a real model variable and never belongs in `evalAux`, so it is excluded
/// by name.
pub fn sort_step_aux(vars: &[Variable]) -> Result<Vec<Ident>> {
    let is_aux = |v: &&Variable| v.var_type == VarType::Aux && v.var_name != crate::common::TIME_VAR;
    let auxes: Vec<Ident> = vars.iter().filter(is_aux).map(|v| v.ref_id.clone()).collect();
    let aux_set: HashSet<&Ident> = auxes.iter().collect();

    let mut deps: HashMap<Ident, Vec<Ident>> = HashMap::new();
    for v in vars.iter().filter(is_aux) {
        for r in v.references.iter() {
            if aux_set.contains(r) {
                deps.entry(v.ref_id.clone()).or_default().push(r.clone());
            }
        }
    }
    topo_sort(&auxes, &deps)
}

/// `evalLevels` order (§4.5): a level's flow equation reads other levels'
/// *current* values, already fixed for this step, so an ordinary
/// dependency-before-dependent edge would be backwards once levels are
/// updated in place. Level-to-level edges are inverted instead: the level
/// doing the reading is updated before the level it reads from.
///
/// Unlike `sort_step_aux`, a cycle here is not an error: `emit_eval_levels`
/// computes every level's new value from the *current* snapshot into a
/// shadow cell before committing any of them, so a mutual level-to-level
/// reference (`p = INTEG(q, 0)`, `q = INTEG(p, 1)`) is correct regardless of
/// which one is emitted first. `topo_sort_lenient` breaks the remaining
/// cycle by `refId` rather than failing.
pub fn sort_step_levels(vars: &[Variable]) -> Result<Vec<Ident>> {
    let levels: Vec<Ident> = vars
        .iter()
        .filter(|v| v.var_type == VarType::Level)
        .map(|v| v.ref_id.clone())
        .collect();
    let level_set: HashSet<&Ident> = levels.iter().collect();

    let mut deps: HashMap<Ident, Vec<Ident>> = HashMap::new();
    for v in vars.iter().filter(|v| v.var_type == VarType::Level) {
        for r in v.references.iter() {
            if level_set.contains(r) {
                deps.entry(r.clone()).or_default().push(v.ref_id.clone());
            }
        }
    }
    Ok(topo_sort_lenient(&levels, &deps))
}

/// Init-time order (§4.5): the transitive closure, over every variable type,
/// reachable from the `init_references` of every variable with
/// `has_init_value` set, plus every `Const` variable's own `refId` -- every
/// const needs a position here even when no level's init expression happens
/// to need it, since `initConstants()` assigns every const var
/// unconditionally, not just the ones some level's init value transitively
/// depends on. Unlike the two step-time graphs, `Const`/`Data` edges
/// participate here since `initConstants()` itself needs them in dependency
/// order.
pub fn sort_init(vars: &[Variable]) -> Result<Vec<Ident>> {
    let by_ref: HashMap<Ident, &Variable> = vars.iter().map(|v| (v.ref_id.clone(), v)).collect();

    let mut needed: HashSet<Ident> = HashSet::new();
    let mut stack: Vec<Ident> = vars
        .iter()
        .filter(|v| v.has_init_value)
        .flat_map(|v| v.init_references.clone())
        .chain(vars.iter().filter(|v| v.var_type == VarType::Const).map(|v| v.ref_id.clone()))
        .collect();

    while let Some(n) = stack.pop() {
        if !needed.insert(n.clone()) {
            continue;
        }
        if let Some(v) = by_ref.get(&n) {
            let deps_of_n = if v.has_init_value { &v.init_references } else { &v.references };
            stack.extend(deps_of_n.clone());
        }
    }

    let nodes: Vec<Ident> = needed.into_iter().collect();
    let node_set: HashSet<&Ident> = nodes.iter().collect();
    let mut deps: HashMap<Ident, Vec<Ident>> = HashMap::new();
    for n in &nodes {
        if let Some(v) = by_ref.get(n) {
            let refs = if v.has_init_value { &v.init_references } else { &v.references };
            for r in refs {
                if node_set.contains(r) {
                    deps.entry(n.clone()).or_default().push(r.clone());
                }
            }
        }
    }
    topo_sort(&nodes, &deps)
}
