// Copyright 2021 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! `_vars`/`_subs` listings (§6): a JSON form via `serde_json`, and
//! hand-formatted `.txt`/`.yaml` forms -- no YAML-handling crate appears
//! anywhere in this project's dependency lineage, so those two are built
//! with the same `writeln!` approach the teacher uses for its own text
//! output (see DESIGN.md).

use std::fmt::Write as _;

use serde::Serialize;

use crate::dimensions::{Registry, Subscript};
use crate::variable::{VarType, Variable};

#[derive(Serialize)]
pub struct VarListing {
    pub ref_id: String,
    pub var_name: String,
    pub var_type: String,
    pub subscripts: Vec<String>,
    pub references: Vec<String>,
    pub init_references: Vec<String>,
    pub has_init_value: bool,
    pub units: Option<String>,
    pub doc: Option<String>,
}

fn var_type_name(t: VarType) -> &'static str {
    match t {
        VarType::Const => "const",
        VarType::Data => "data",
        VarType::Lookup => "lookup",
        VarType::Aux => "aux",
        VarType::Level => "level",
    }
}

impl From<&Variable> for VarListing {
    fn from(v: &Variable) -> VarListing {
        VarListing {
            ref_id: v.ref_id.clone(),
            var_name: v.var_name.clone(),
            var_type: var_type_name(v.var_type).to_string(),
            subscripts: v.subscripts.clone(),
            references: v.references.clone(),
            init_references: v.init_references.clone(),
            has_init_value: v.has_init_value,
            units: v.units.clone(),
            doc: v.doc.clone(),
        }
    }
}

fn listings(vars: &[Variable]) -> Vec<VarListing> {
    let mut out: Vec<VarListing> = vars.iter().map(VarListing::from).collect();
    out.sort_by(|a, b| a.ref_id.cmp(&b.ref_id));
    out
}

pub fn vars_json(vars: &[Variable]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&listings(vars))
}

pub fn vars_txt(vars: &[Variable]) -> String {
    let mut out = String::new();
    for v in listings(vars) {
        let _ = writeln!(out, "{}\t{}\t{}", v.ref_id, v.var_type, v.subscripts.join(","));
        if !v.references.is_empty() {
            let _ = writeln!(out, "\treferences: {}", v.references.join(", "));
        }
        if !v.init_references.is_empty() {
            let _ = writeln!(out, "\tinit_references: {}", v.init_references.join(", "));
        }
    }
    out
}

pub fn vars_yaml(vars: &[Variable]) -> String {
    let mut out = String::new();
    for v in listings(vars) {
        let _ = writeln!(out, "- ref_id: {}", v.ref_id);
        let _ = writeln!(out, "  var_name: {}", v.var_name);
        let _ = writeln!(out, "  var_type: {}", v.var_type);
        let _ = writeln!(out, "  subscripts: [{}]", v.subscripts.join(", "));
        let _ = writeln!(out, "  references: [{}]", v.references.join(", "));
        let _ = writeln!(out, "  init_references: [{}]", v.init_references.join(", "));
        let _ = writeln!(out, "  has_init_value: {}", v.has_init_value);
        if let Some(units) = &v.units {
            let _ = writeln!(out, "  units: {}", units);
        }
    }
    out
}

#[derive(Serialize)]
pub struct SubListing {
    pub name: String,
    pub kind: String,
    pub family: String,
    pub value: Vec<String>,
}

fn sub_listings(registry: &Registry) -> Vec<SubListing> {
    let mut out: Vec<SubListing> = registry
        .all_subscripts()
        .into_iter()
        .map(|s| match s {
            Subscript::Dimension(d) => SubListing {
                name: d.name.clone(),
                kind: "dimension".to_string(),
                family: d.family.clone(),
                value: d.value.clone(),
            },
            Subscript::Index(i) => SubListing {
                name: i.name.clone(),
                kind: "index".to_string(),
                family: i.family.clone(),
                value: Vec::new(),
            },
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

pub fn subs_json(registry: &Registry) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&sub_listings(registry))
}

pub fn subs_txt(registry: &Registry) -> String {
    let mut out = String::new();
    for s in sub_listings(registry) {
        let _ = writeln!(out, "{}\t{}\t{}\t{}", s.name, s.kind, s.family, s.value.join(","));
    }
    out
}

pub fn subs_yaml(registry: &Registry) -> String {
    let mut out = String::new();
    for s in sub_listings(registry) {
        let _ = writeln!(out, "- name: {}", s.name);
        let _ = writeln!(out, "  kind: {}", s.kind);
        let _ = writeln!(out, "  family: {}", s.family);
        let _ = writeln!(out, "  value: [{}]", s.value.join(", "));
    }
    out
}
