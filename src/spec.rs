// Copyright 2021 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The spec reconciler (§4.7): the JSON `Spec` document the caller supplies
//! alongside the parsed model, and the non-fatal checks run against the
//! variable table once it exists.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::common::{canonicalize, Diagnostic, ErrorCode, Ident};
use crate::dimensions::Registry;
use crate::variable::Variable;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    #[serde(default)]
    pub input_vars: Vec<String>,
    #[serde(default)]
    pub output_vars: Vec<String>,
    #[serde(default)]
    pub external_datfiles: Vec<String>,
    #[serde(default)]
    pub direct_data: Vec<String>,
    #[serde(default)]
    pub dimension_families: HashMap<String, String>,
    #[serde(default)]
    pub index_families: HashMap<String, String>,
    #[serde(default)]
    pub special_separation_dims: HashMap<String, Vec<String>>,
}

impl Spec {
    pub fn from_json(text: &str) -> serde_json::Result<Spec> {
        serde_json::from_str(text)
    }
}

/// Stage every `dimensionFamilies` override onto `registry` before
/// `registry.resolve()` runs -- family resolution happens inside
/// `resolve()`, so overrides must land first.
pub fn apply_family_overrides(spec: &Spec, registry: &mut Registry) {
    for (dim, family) in &spec.dimension_families {
        registry.set_family_override(dim, family);
    }
}

pub fn direct_data_tags(spec: &Spec) -> HashSet<Ident> {
    spec.direct_data.iter().map(|d| canonicalize(d)).collect()
}

pub fn separation_dims(spec: &Spec) -> HashMap<Ident, Vec<Ident>> {
    spec.special_separation_dims
        .iter()
        .map(|(k, v)| (canonicalize(k), v.iter().map(|d| canonicalize(d)).collect()))
        .collect()
}

/// Confirm every `inputVars`/`outputVars` entry names a variable that
/// actually exists: a bare `varName` (apply-to-all, or any non-apply-to-all
/// element's group), a full `refId` (one exact non-apply-to-all element), or
/// `varName[idx,...]` selecting one element of an apply-to-all array (the
/// same selector syntax `emit_store_outputs` parses for scenario 3).
/// Unresolved names are collected as diagnostics rather than aborting the
/// pipeline (§4.7, §7).
pub fn reconcile(spec: &Spec, vars: &[Variable]) -> Vec<Diagnostic> {
    let var_names: HashSet<&str> = vars.iter().map(|v| v.var_name.as_str()).collect();
    let ref_ids: HashSet<&str> = vars.iter().map(|v| v.ref_id.as_str()).collect();

    let mut diagnostics = Vec::new();
    let mut check = |raw: &str, role: &str| {
        let canonical = canonicalize(raw);
        let base = raw.find('[').map(|i| &raw[..i]).unwrap_or(raw);
        let base_known = var_names.contains(canonicalize(base).as_str());
        if !var_names.contains(canonical.as_str()) && !ref_ids.contains(raw) && !base_known {
            diagnostics.push(Diagnostic {
                code: ErrorCode::UnknownSpecVar,
                offending: canonical,
                message: format!("{} variable not found in model", role),
            });
        }
    };
    for v in &spec.input_vars {
        check(v, "input");
    }
    for v in &spec.output_vars {
        check(v, "output");
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_defaults_missing_fields() {
        let spec = Spec::from_json("{}").unwrap();
        assert!(spec.input_vars.is_empty());
        assert!(spec.dimension_families.is_empty());
    }

    #[test]
    fn test_reconcile_flags_unknown_output_var() {
        let mut x = Variable::new("x", vec![], "x", "1");
        x.ref_id = "x".to_string();
        let spec = Spec {
            output_vars: vec!["y".to_string()],
            ..Default::default()
        };
        let diags = reconcile(&spec, &[x]);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, ErrorCode::UnknownSpecVar);
        assert_eq!(diags[0].offending, "y");
    }

    #[test]
    fn test_reconcile_accepts_apply_to_all_element_selector() {
        let mut b = Variable::new("b", vec!["R".to_string()], "b", "1");
        b.ref_id = "b".to_string();
        let spec = Spec {
            output_vars: vec!["b[_r2]".to_string()],
            ..Default::default()
        };
        assert!(reconcile(&spec, &[b]).is_empty());
    }

    #[test]
    fn test_reconcile_accepts_known_var() {
        let mut x = Variable::new("x", vec![], "x", "1");
        x.ref_id = "x".to_string();
        let spec = Spec {
            output_vars: vec!["X".to_string()],
            ..Default::default()
        };
        assert!(reconcile(&spec, &[x]).is_empty());
    }
}
