// Copyright 2021 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![allow(dead_code)]

#[macro_use]
extern crate lazy_static;
extern crate regex;
extern crate serde;

#[macro_use]
mod common;
mod analyzer;
mod ast;
mod builtins;
mod dimensions;
mod emit;
mod listing;
mod parsetree;
mod project;
mod reader;
mod sort;
mod spec;
mod variable;

pub use analyzer::{assign_ref_ids, prune_const_references, resolve_references, type_by_ref_id};
pub use ast::{BinaryOp, Expr, SubscriptedVar, UnaryOp, Visitor};
pub use common::{canonicalize, canonicalize_element, Diagnostic, Error, ErrorCode, Ident, Result};
pub use dimensions::{Dimension, Index, Registry, Subscript};
pub use emit::emit_model;
pub use parsetree::{ParsedEquation, ParsedModel, ParsedSimSpecs, RawDimension, RhsNode};
pub use project::Project;
pub use reader::{classify_all, read_equations, read_variables};
pub use sort::{sort_init, sort_step_aux, sort_step_levels};
pub use spec::Spec;
pub use variable::{Table, VarType, Variable};
