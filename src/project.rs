// Copyright 2021 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The top-level pipeline driver: wires the subscript registry, the
//! variable/equation readers, the analyzer, the dependency sorter, and the
//! emitter together into the single entry point a caller (the CLI, which is
//! out of this core's scope) needs.

use std::collections::HashMap;

use crate::common::{Diagnostic, Ident, Result};
use crate::dimensions::Registry;
use crate::parsetree::ParsedModel;
use crate::variable::Variable;
use crate::{analyzer, emit, listing, reader, sort, spec};

pub struct Project {
    pub registry: Registry,
    pub vars: Vec<Variable>,
    pub diagnostics: Vec<Diagnostic>,
    pub sim_specs: crate::parsetree::ParsedSimSpecs,
}

impl Project {
    /// Run the full pipeline short of code generation: declare and resolve
    /// subscripts, read variables and equations, assign `refId`s, resolve
    /// references, and reconcile against the spec.
    pub fn build(model: &ParsedModel, spec: &spec::Spec) -> Result<Project> {
        let mut registry = Registry::new();
        for dim in &model.dimensions {
            let mappings: HashMap<String, Vec<String>> = dim.mappings.iter().cloned().collect();
            registry.declare_dimension(&dim.name, dim.elements.clone(), mappings);
        }
        spec::apply_family_overrides(spec, &mut registry);
        registry.resolve()?;

        let separation = spec::separation_dims(spec);
        let mut vars = reader::read_variables(model, &registry, &separation);

        let direct_data = spec::direct_data_tags(spec);
        reader::read_equations(&mut vars, &registry, &direct_data)?;

        analyzer::assign_ref_ids(&mut vars);
        analyzer::resolve_references(&mut vars, &direct_data)?;
        analyzer::prune_const_references(&mut vars);

        let diagnostics = spec::reconcile(spec, &vars);

        Ok(Project {
            registry,
            vars,
            diagnostics,
            sim_specs: model.sim_specs.clone(),
        })
    }

    /// The three §4.5 orderings: `evalAux`, `evalLevels`, init-time.
    pub fn sort_orders(&self) -> Result<(Vec<Ident>, Vec<Ident>, Vec<Ident>)> {
        let aux = sort::sort_step_aux(&self.vars)?;
        let levels = sort::sort_step_levels(&self.vars)?;
        let init = sort::sort_init(&self.vars)?;
        Ok((aux, levels, init))
    }

    pub fn emit_c(&self, output_vars: &[Ident]) -> Result<String> {
        let (aux, levels, init) = self.sort_orders()?;
        Ok(emit::emit_model(
            &self.registry,
            &self.vars,
            &aux,
            &levels,
            &init,
            &self.sim_specs,
            output_vars,
        ))
    }

    pub fn vars_listing_json(&self) -> serde_json::Result<String> {
        listing::vars_json(&self.vars)
    }

    pub fn vars_listing_txt(&self) -> String {
        listing::vars_txt(&self.vars)
    }

    pub fn vars_listing_yaml(&self) -> String {
        listing::vars_yaml(&self.vars)
    }

    pub fn subs_listing_json(&self) -> serde_json::Result<String> {
        listing::subs_json(&self.registry)
    }

    pub fn subs_listing_txt(&self) -> String {
        listing::subs_txt(&self.registry)
    }

    pub fn subs_listing_yaml(&self) -> String {
        listing::subs_yaml(&self.registry)
    }
}
