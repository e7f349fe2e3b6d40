// Copyright 2021 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The contract between the (external) Vensim grammar front end and this
//! core (§4.2a). The front end walks raw `.mdl` text and hands back these
//! types; the variable and equation readers consume them and never see
//! source text directly except for the `model_lhs`/`model_formula` strings
//! kept around for diagnostics and re-emission.

use std::rc::Rc;

use crate::ast::Expr;

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedSimSpecs {
    pub initial_time: f64,
    pub final_time: f64,
    pub time_step: f64,
    pub saveper: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawDimension {
    pub name: String,
    /// Elements may themselves be other dimension names; the subscript
    /// registry's `expand()` sorts that out.
    pub elements: Vec<String>,
    /// Optional `A -> B` map-to declaration: target dimension name to an
    /// explicit ordered list of target index names, or an empty list for
    /// an identity mapping (§4.1).
    pub mappings: Vec<(String, Vec<String>)>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RhsNode {
    Expr(Rc<Expr>),
    Table { points: Vec<(f64, f64)> },
}

/// One LHS occurrence as the grammar produced it, *before* non-apply-to-all
/// separation (§4.2). `lhs_subscripts` is the subscript list exactly as
/// written on the LHS, including explicit index enumeration.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedEquation {
    pub model_lhs: String,
    pub lhs_name: String,
    pub lhs_subscripts: Vec<String>,
    pub rhs: RhsNode,
    pub units: Option<String>,
    pub doc: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedModel {
    pub sim_specs: ParsedSimSpecs,
    pub dimensions: Vec<RawDimension>,
    pub equations: Vec<ParsedEquation>,
}
