// Copyright 2021 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The analyzer (§4.4): assigns every variable its `refId`, resolves the
//! raw names the equation reader collected into `refId`s, and synthesizes a
//! placeholder `Data` variable for an undeclared name backed by an external
//! data file.

use std::collections::{HashMap, HashSet};

use crate::common::{Ident, Result, TIME_VAR};
use crate::variable::{VarType, Variable};

/// `refId` is the bare `varName` for an apply-to-all variable (exactly one
/// record shares that name) and `varName[s1,...,sn]` once a name has more
/// than one record, i.e. it was separated non-apply-to-all (§4.2, §4.4).
pub fn assign_ref_ids(vars: &mut [Variable]) {
    let mut counts: HashMap<Ident, usize> = HashMap::new();
    for v in vars.iter() {
        *counts.entry(v.var_name.clone()).or_insert(0) += 1;
    }
    for v in vars.iter_mut() {
        v.ref_id = if counts[&v.var_name] > 1 {
            format!("{}[{}]", v.var_name, v.subscripts.join(","))
        } else {
            v.var_name.clone()
        };
    }
}

fn dedup(ids: Vec<Ident>) -> Vec<Ident> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Resolve one raw reference name to the `refId`(s) it binds to. A name of
/// the plain `varName` form expands to every record sharing that name (the
/// usual case, and the only possible outcome for an apply-to-all target,
/// which has exactly one record). A name of the `varName[s1,...]` form --
/// the reader only produces this when every subscript was a specific index,
/// never a dimension, see `reader::collect_refs` -- binds to that one exact
/// record when it exists among `varName`'s group, letting a non-apply-to-all
/// record name a specific sibling element without pulling in the rest of the
/// group (and, critically, without appearing to depend on itself). A name
/// with no such record but listed in `directData` gets a synthesized `Data`
/// placeholder (§4.4, §4.7): this core does not read data files itself, so
/// the placeholder stands in for whatever `WITH LOOKUP(Time, ...)` the
/// data-file reader would have produced.
fn resolve_one(
    name: &Ident,
    groups: &mut HashMap<Ident, Vec<Ident>>,
    synthesized: &mut Vec<Variable>,
    direct_data_tags: &HashSet<Ident>,
) -> Result<Vec<Ident>> {
    let base = match name.find('[') {
        Some(i) => &name[..i],
        None => name.as_str(),
    };
    if let Some(ids) = groups.get(base) {
        if name != base && ids.iter().any(|id| id == name) {
            return Ok(vec![name.clone()]);
        }
        return Ok(ids.clone());
    }
    if direct_data_tags.contains(base) {
        let mut data_var = Variable::new(base, Vec::new(), base, "");
        data_var.var_type = VarType::Data;
        data_var.ref_id = base.to_string();
        data_var.references = vec![TIME_VAR.to_string()];
        groups.insert(base.to_string(), vec![base.to_string()]);
        synthesized.push(data_var);
        return Ok(vec![base.to_string()]);
    }
    err!(DoesNotExist, base)
}

/// Rewrite every variable's `references`/`init_references` from raw
/// `varName`s to resolved `refId`s, expanding a non-apply-to-all name into
/// every element's `refId` (a conservative, but always-correct,
/// over-approximation of which element a runtime loop will actually touch —
/// see DESIGN.md). Appends any variables synthesized along the way.
pub fn resolve_references(vars: &mut Vec<Variable>, direct_data_tags: &HashSet<Ident>) -> Result<()> {
    let mut groups: HashMap<Ident, Vec<Ident>> = HashMap::new();
    for v in vars.iter() {
        groups.entry(v.var_name.clone()).or_default().push(v.ref_id.clone());
    }

    let mut synthesized = Vec::new();

    for v in vars.iter_mut() {
        let mut refs = Vec::new();
        for r in v.references.iter() {
            refs.extend(resolve_one(r, &mut groups, &mut synthesized, direct_data_tags)?);
        }
        v.references = dedup(refs);

        let mut init_refs = Vec::new();
        for r in v.init_references.iter() {
            init_refs.extend(resolve_one(r, &mut groups, &mut synthesized, direct_data_tags)?);
        }
        v.init_references = dedup(init_refs);
    }

    vars.extend(synthesized);
    Ok(())
}

/// `refId` -> `VarType`, for the dependency sorter and the emitter.
pub fn type_by_ref_id(vars: &[Variable]) -> HashMap<Ident, VarType> {
    vars.iter().map(|v| (v.ref_id.clone(), v.var_type)).collect()
}

/// Constant-reference pruning (§4.4 step 4): once every reference is a
/// resolved `refId`, drop any whose target is `const`, `data`, or `lookup`
/// from both `references` and `init_references` -- those targets are always
/// available and never constrain an evaluation order, so carrying them past
/// this point would only make the dependency graphs bigger than they need
/// to be.
pub fn prune_const_references(vars: &mut [Variable]) {
    let types = type_by_ref_id(vars);
    let is_pruned = |r: &Ident| types.get(r).map(|t| t.is_pruned_from_deps()).unwrap_or(false);
    for v in vars.iter_mut() {
        v.references.retain(|r| !is_pruned(r));
        v.init_references.retain(|r| !is_pruned(r));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, subs: &[&str]) -> Variable {
        Variable::new(name, subs.iter().map(|s| s.to_string()).collect(), name, "")
    }

    #[test]
    fn test_assign_ref_ids_apply_to_all_stays_bare() {
        let mut vars = vec![var("x", &["r"])];
        assign_ref_ids(&mut vars);
        assert_eq!(vars[0].ref_id, "x");
    }

    #[test]
    fn test_assign_ref_ids_non_apply_to_all_gets_brackets() {
        let mut vars = vec![var("a", &["_r1"]), var("a", &["_r2"])];
        assign_ref_ids(&mut vars);
        assert_eq!(vars[0].ref_id, "a[_r1]");
        assert_eq!(vars[1].ref_id, "a[_r2]");
    }

    #[test]
    fn test_resolve_references_expands_non_apply_to_all_target() {
        let mut vars = vec![var("a", &["_r1"]), var("a", &["_r2"]), var("b", &[])];
        assign_ref_ids(&mut vars);
        vars[2].references = vec!["a".to_string()];
        resolve_references(&mut vars, &HashSet::new()).unwrap();
        let b = vars.iter().find(|v| v.var_name == "b").unwrap();
        assert_eq!(b.references, vec!["a[_r1]".to_string(), "a[_r2]".to_string()]);
    }

    #[test]
    fn test_resolve_references_synthesizes_data_variable() {
        let mut vars = vec![var("b", &[])];
        assign_ref_ids(&mut vars);
        vars[0].references = vec!["external_series".to_string()];
        let mut tags = HashSet::new();
        tags.insert("external_series".to_string());
        resolve_references(&mut vars, &tags).unwrap();
        assert!(vars.iter().any(|v| v.var_name == "external_series" && v.var_type == VarType::Data));
    }

    #[test]
    fn test_resolve_references_unknown_name_errors() {
        let mut vars = vec![var("b", &[])];
        assign_ref_ids(&mut vars);
        vars[0].references = vec!["nonexistent".to_string()];
        let err = resolve_references(&mut vars, &HashSet::new()).unwrap_err();
        assert_eq!(err.code, crate::common::ErrorCode::DoesNotExist);
    }

    /// Scenario 4: a fully-explicit subscripted reference to a sibling
    /// non-apply-to-all element binds to exactly that element, not the whole
    /// group -- otherwise `a[R3] = a[R1] + a[R2]` would appear to depend on
    /// `a[R3]` itself.
    #[test]
    fn test_resolve_references_exact_match_non_apply_to_all_sibling() {
        let mut vars = vec![var("a", &["_r1"]), var("a", &["_r2"]), var("a", &["_r3"])];
        assign_ref_ids(&mut vars);
        vars[2].references = vec!["a[_r1]".to_string(), "a[_r2]".to_string()];
        resolve_references(&mut vars, &HashSet::new()).unwrap();
        let a3 = vars.iter().find(|v| v.ref_id == "a[_r3]").unwrap();
        assert_eq!(a3.references, vec!["a[_r1]".to_string(), "a[_r2]".to_string()]);
    }

    #[test]
    fn test_prune_const_references_drops_const_and_lookup_targets() {
        let mut x = var("x", &[]);
        x.var_type = VarType::Const;
        let mut l = var("lut", &[]);
        l.var_type = VarType::Lookup;
        let mut y = var("y", &[]);
        y.var_type = VarType::Aux;
        let mut vars = vec![x, l, y];
        assign_ref_ids(&mut vars);
        vars[2].references = vec!["x".to_string(), "lut".to_string()];
        vars[2].init_references = vec!["x".to_string()];
        prune_const_references(&mut vars);
        let y = vars.iter().find(|v| v.var_name == "y").unwrap();
        assert!(y.references.is_empty());
        assert!(y.init_references.is_empty());
    }
}
