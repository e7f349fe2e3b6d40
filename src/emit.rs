// Copyright 2021 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The C code emitter (§4.6): declarations, the `init*`/`eval*` functions,
//! `storeOutputs`, and the `run_model` driver. Deterministic, textual, no
//! attempt to match any particular formatter's whitespace conventions --
//! this core just needs output a C compiler accepts.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::builtins::{is_initial, is_integ};
use crate::common::Ident;
use crate::dimensions::{Dimension, Registry, Subscript};
use crate::parsetree::ParsedSimSpecs;
use crate::variable::{VarType, Variable};

fn c_name(ref_id: &str) -> String {
    let mut out = String::with_capacity(ref_id.len() + 1);
    out.push('_');
    for ch in ref_id.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    out
}

struct Shape {
    apply_to_all: bool,
    dims: Vec<Ident>,
}

fn shapes_by_var_name(vars: &[Variable]) -> HashMap<Ident, Shape> {
    let mut counts: HashMap<Ident, usize> = HashMap::new();
    for v in vars {
        *counts.entry(v.var_name.clone()).or_insert(0) += 1;
    }
    let mut shapes = HashMap::new();
    for v in vars {
        let apply_to_all = counts[&v.var_name] == 1;
        shapes.entry(v.var_name.clone()).or_insert(Shape {
            apply_to_all,
            dims: if apply_to_all { v.subscripts.clone() } else { Vec::new() },
        });
    }
    shapes
}

fn dim_size(registry: &Registry, dim: &str) -> usize {
    registry.index_names_for_subscript(dim).len().max(1)
}

fn strides(sizes: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; sizes.len()];
    for i in (0..sizes.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * sizes[i + 1];
    }
    strides
}

fn index_position(registry: &Registry, dim: &str, index: &str) -> usize {
    registry
        .index_names_for_subscript(dim)
        .iter()
        .position(|i| i == index)
        .unwrap_or(0)
}

/// Emit every storage cell: a flat, row-major `double` array per
/// apply-to-all subscripted variable, a `const struct lookup_point *` plus
/// its paired length for a lookup or data series (so a call site has
/// somewhere to read the table `initLookups` builds), and a plain `double`
/// scalar for everything else.
pub fn emit_declarations(registry: &Registry, vars: &[Variable]) -> String {
    let shapes = shapes_by_var_name(vars);
    let mut out = String::new();
    let mut seen_array = std::collections::HashSet::new();
    for v in vars {
        let shape = &shapes[&v.var_name];
        if shape.apply_to_all && !shape.dims.is_empty() {
            if !seen_array.insert(v.var_name.clone()) {
                continue;
            }
            let size: usize = shape.dims.iter().map(|d| dim_size(registry, d)).product();
            let _ = writeln!(out, "double _{}[{}];", v.var_name, size);
        } else if matches!(v.var_type, VarType::Lookup | VarType::Data) {
            let _ = writeln!(out, "const struct lookup_point *{};", c_name(&v.ref_id));
            let _ = writeln!(out, "int {};", lookup_len_name(&v.ref_id));
        } else {
            let _ = writeln!(out, "double {};", c_name(&v.ref_id));
        }
    }
    out
}

fn lookup_table_name(ref_id: &str) -> String {
    format!("{}_points", c_name(ref_id))
}

fn lookup_len_name(ref_id: &str) -> String {
    format!("{}_len", c_name(ref_id))
}

/// One dimension's contribution to a flattened array index: a direct loop
/// variable when the reference names the same dimension the active loop
/// iterates, or a runtime lookup through a `map-to` table (§4.1, §4.6) when
/// it names a dimension mapped to/from one of the active loop dimensions.
/// Loop dimensions are tried in sorted order so a reference that happens to
/// be reachable through more than one active loop's mapping still picks a
/// deterministic one.
fn index_term(dim: &Ident, loop_vars: &HashMap<Ident, String>, registry: &Registry) -> String {
    if let Some(v) = loop_vars.get(dim) {
        return v.clone();
    }
    if let Some(Subscript::Dimension(d)) = registry.sub(dim) {
        let mut loop_dims: Vec<&Ident> = loop_vars.keys().collect();
        loop_dims.sort();
        for loop_dim in loop_dims {
            if d.mappings.contains_key(loop_dim) {
                let loop_var = &loop_vars[loop_dim];
                return format!("_map_{}_from_{}[{}]", dim, loop_dim, loop_var);
            }
        }
    }
    "0".to_string()
}

fn emit_index_expr(dims: &[Ident], loop_vars: &HashMap<Ident, String>, registry: &Registry) -> String {
    let sizes: Vec<usize> = dims.iter().map(|d| dim_size(registry, d)).collect();
    let strides = strides(&sizes);
    let terms: Vec<String> = dims
        .iter()
        .zip(strides.iter())
        .map(|(d, stride)| {
            let var = index_term(d, loop_vars, registry);
            if *stride == 1 {
                var
            } else {
                format!("{} * {}", var, stride)
            }
        })
        .collect();
    terms.join(" + ")
}

/// One `static const int[]` per declared `map-to` table (§4.1), translating
/// a position in the mapping's target dimension to the matching position in
/// its source dimension. `emit_index_expr` references these by name when a
/// reference's subscript names a dimension other than the one an enclosing
/// loop iterates.
pub fn emit_mapping_tables(registry: &Registry) -> String {
    let mut dims: Vec<&Dimension> = registry
        .all_subscripts()
        .into_iter()
        .filter_map(|s| match s {
            Subscript::Dimension(d) if !d.mappings.is_empty() => Some(d),
            _ => None,
        })
        .collect();
    dims.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::new();
    for d in dims {
        let mut to_names: Vec<&Ident> = d.mappings.keys().collect();
        to_names.sort();
        for to_name in to_names {
            let entries: Vec<String> = d.mappings[to_name]
                .iter()
                .map(|index_name| index_position(registry, &d.name, index_name).to_string())
                .collect();
            let _ = writeln!(
                out,
                "static const int _map_{}_from_{}[] = {{ {} }};",
                d.name,
                to_name,
                entries.join(", ")
            );
        }
    }
    out
}

/// Translate one RHS reference (`Var`/`Subscripted`) to the C expression
/// that reads its current value: a loop-indexed array read for an
/// apply-to-all target, a direct scalar for a non-apply-to-all element
/// named by explicit indices, or a ternary dispatch chain keyed on the
/// active loop variable when the element varies with the loop (§4.6).
fn emit_reference(
    var_name: &str,
    subs: &[Ident],
    vars: &[Variable],
    shapes: &HashMap<Ident, Shape>,
    loop_vars: &HashMap<Ident, String>,
    registry: &Registry,
) -> String {
    if var_name == crate::common::TIME_VAR {
        return "_time".to_string();
    }
    let shape = match shapes.get(var_name) {
        Some(s) => s,
        None => return c_name(var_name),
    };
    if shape.apply_to_all {
        if shape.dims.is_empty() {
            return format!("_{}", var_name);
        }
        let idx = emit_index_expr(subs, loop_vars, registry);
        return format!("_{}[{}]", var_name, idx);
    }

    // Non-apply-to-all: every dynamic (dimension, not index) position needs
    // a runtime dispatch over the candidate elements.
    let dynamic = subs.iter().any(|s| registry.is_dimension(s));
    let candidates: Vec<&Variable> = vars.iter().filter(|v| v.var_name == var_name).collect();
    if !dynamic {
        let normalized = registry.normalize_subscripts(subs);
        let ref_id = format!("{}[{}]", var_name, normalized.join(","));
        return c_name(&ref_id);
    }

    let mut chain = "0.0".to_string();
    for cand in candidates.iter().rev() {
        let mut conds = Vec::new();
        for (i, s) in subs.iter().enumerate() {
            if let Some(loopvar) = loop_vars.get(s) {
                if let Some(elem) = cand.subscripts.get(i) {
                    conds.push(format!("{} == {}", loopvar, index_position(registry, s, elem)));
                }
            }
        }
        let cond = if conds.is_empty() { "1".to_string() } else { conds.join(" && ") };
        chain = format!("(({}) ? {} : ({}))", cond, c_name(&cand.ref_id), chain);
    }
    chain
}

fn emit_expr(
    e: &Expr,
    vars: &[Variable],
    shapes: &HashMap<Ident, Shape>,
    loop_vars: &HashMap<Ident, String>,
    registry: &Registry,
) -> String {
    match e {
        Expr::Const(n) => format!("{:?}", n),
        Expr::Var(id) => emit_reference(id, &[], vars, shapes, loop_vars, registry),
        Expr::Subscripted(sv) => emit_reference(&sv.ident, &sv.subs, vars, shapes, loop_vars, registry),
        Expr::App(func, args) if is_integ(func) => {
            emit_expr(&args[0], vars, shapes, loop_vars, registry)
        }
        Expr::App(func, args) if is_initial(func) => {
            emit_expr(&args[0], vars, shapes, loop_vars, registry)
        }
        Expr::App(func, args) => {
            if let Some(v) = vars
                .iter()
                .find(|v| v.var_name == *func && matches!(v.var_type, VarType::Lookup | VarType::Data))
            {
                let x = emit_expr(&args[0], vars, shapes, loop_vars, registry);
                return format!("_sdc_lookup({}, {}, {})", c_name(&v.ref_id), lookup_len_name(&v.ref_id), x);
            }
            let body: Vec<String> = args
                .iter()
                .map(|a| emit_expr(a, vars, shapes, loop_vars, registry))
                .collect();
            format!("_sdc_{}({})", func, body.join(", "))
        }
        Expr::Op1(op, a) => {
            let inner = emit_expr(a, vars, shapes, loop_vars, registry);
            match op {
                UnaryOp::Positive => format!("(+{})", inner),
                UnaryOp::Negative => format!("(-{})", inner),
                UnaryOp::Not => format!("(!{})", inner),
            }
        }
        Expr::Op2(op, l, r) => {
            let lhs = emit_expr(l, vars, shapes, loop_vars, registry);
            let rhs = emit_expr(r, vars, shapes, loop_vars, registry);
            match op {
                BinaryOp::Add => format!("({} + {})", lhs, rhs),
                BinaryOp::Sub => format!("({} - {})", lhs, rhs),
                BinaryOp::Mul => format!("({} * {})", lhs, rhs),
                BinaryOp::Div => format!("({} / {})", lhs, rhs),
                BinaryOp::Exp => format!("pow({}, {})", lhs, rhs),
                BinaryOp::Mod => format!("fmod({}, {})", lhs, rhs),
                BinaryOp::Gt => format!("({} > {})", lhs, rhs),
                BinaryOp::Lt => format!("({} < {})", lhs, rhs),
                BinaryOp::Gte => format!("({} >= {})", lhs, rhs),
                BinaryOp::Lte => format!("({} <= {})", lhs, rhs),
                BinaryOp::Eq => format!("({} == {})", lhs, rhs),
                BinaryOp::Neq => format!("({} != {})", lhs, rhs),
                BinaryOp::And => format!("({} && {})", lhs, rhs),
                BinaryOp::Or => format!("({} || {})", lhs, rhs),
            }
        }
        Expr::If(c, t, f) => format!(
            "({} ? {} : {})",
            emit_expr(c, vars, shapes, loop_vars, registry),
            emit_expr(t, vars, shapes, loop_vars, registry),
            emit_expr(f, vars, shapes, loop_vars, registry)
        ),
    }
}

/// Emit one assignment statement for `var`, nesting a nested `for` loop per
/// apply-to-all dimension around it; `ast` is whichever expression (normal
/// or init) should be assigned this time.
fn emit_assignment(
    var: &Variable,
    ast: &Expr,
    target: &str,
    vars: &[Variable],
    shapes: &HashMap<Ident, Shape>,
    registry: &Registry,
    out: &mut String,
) {
    let shape = &shapes[&var.var_name];
    if shape.apply_to_all && !shape.dims.is_empty() {
        let mut loop_vars = HashMap::new();
        let mut indent = String::from("    ");
        for (i, dim) in shape.dims.iter().enumerate() {
            let size = dim_size(registry, dim);
            let lv = format!("i{}", i);
            let _ = writeln!(out, "{}for (int {} = 0; {} < {}; {}++) {{", indent, lv, lv, size, lv);
            loop_vars.insert(dim.clone(), lv);
            indent.push_str("    ");
        }
        let idx = emit_index_expr(&shape.dims, &loop_vars, registry);
        let rhs = emit_expr(ast, vars, shapes, &loop_vars, registry);
        let _ = writeln!(out, "{}{}[{}] = {};", indent, target, idx, rhs);
        for _ in &shape.dims {
            indent.truncate(indent.len() - 4);
            let _ = writeln!(out, "{}}}", indent);
        }
    } else {
        let rhs = emit_expr(ast, vars, shapes, &HashMap::new(), registry);
        let _ = writeln!(out, "    {} = {};", target, rhs);
    }
}

fn target_name(var: &Variable, shapes: &HashMap<Ident, Shape>) -> String {
    let shape = &shapes[&var.var_name];
    if shape.apply_to_all && !shape.dims.is_empty() {
        format!("_{}", var.var_name)
    } else {
        c_name(&var.ref_id)
    }
}

/// A level's shadow cell, same shape as its real storage, one name per
/// `target_name`. `emit_eval_levels` writes every level's new value here
/// from the current snapshot before committing any of them, so a
/// level-to-level reference -- including a mutual one -- always reads the
/// step's starting value no matter which level is processed first.
fn shadow_target_name(var: &Variable, shapes: &HashMap<Ident, Shape>) -> String {
    format!("_next{}", target_name(var, shapes))
}

/// One `double _next_X[...]`/`double _next_X;` per level, declared alongside
/// its real cell (§4.6, scenario 5).
pub fn emit_level_shadow_declarations(registry: &Registry, vars: &[Variable]) -> String {
    let shapes = shapes_by_var_name(vars);
    let mut out = String::new();
    let mut seen_array = std::collections::HashSet::new();
    for v in vars.iter().filter(|v| v.var_type == VarType::Level) {
        let shape = &shapes[&v.var_name];
        if shape.apply_to_all && !shape.dims.is_empty() {
            if !seen_array.insert(v.var_name.clone()) {
                continue;
            }
            let size: usize = shape.dims.iter().map(|d| dim_size(registry, d)).product();
            let _ = writeln!(out, "double {}[{}];", shadow_target_name(v, &shapes), size);
        } else {
            let _ = writeln!(out, "double {};", shadow_target_name(v, &shapes));
        }
    }
    out
}

/// Copy one level's shadow cell into its real storage once every level's
/// shadow has been computed from the same pre-step snapshot.
fn emit_commit_shadow(var: &Variable, shapes: &HashMap<Ident, Shape>, registry: &Registry, out: &mut String) {
    let shape = &shapes[&var.var_name];
    let target = target_name(var, shapes);
    let shadow = shadow_target_name(var, shapes);
    if shape.apply_to_all && !shape.dims.is_empty() {
        let size: usize = shape.dims.iter().map(|d| dim_size(registry, d)).product();
        let _ = writeln!(
            out,
            "    for (int _i = 0; _i < {}; _i++) {{ {}[_i] = {}[_i]; }}",
            size, target, shadow
        );
    } else {
        let _ = writeln!(out, "    {} = {};", target, shadow);
    }
}

fn by_ref_id<'a>(vars: &'a [Variable]) -> HashMap<Ident, &'a Variable> {
    vars.iter().map(|v| (v.ref_id.clone(), v)).collect()
}

pub fn emit_init_constants(registry: &Registry, vars: &[Variable], init_order: &[Ident]) -> String {
    let shapes = shapes_by_var_name(vars);
    let by_ref = by_ref_id(vars);
    let mut out = String::from("void initConstants(void) {\n");
    for ref_id in init_order {
        if let Some(v) = by_ref.get(ref_id) {
            if v.var_type == VarType::Const {
                if let Some(ast) = &v.ast {
                    emit_assignment(v, ast, &target_name(v, &shapes), vars, &shapes, registry, &mut out);
                }
            }
        }
    }
    out.push_str("}\n");
    out
}

/// One `static const struct lookup_point X_points[]` per `Lookup` variable
/// (§4.2 step 3's stored `points`), declared at file scope so it outlives
/// the call to `initLookups` that wires it up and so a call site anywhere
/// else in the translation unit can read it (§4.6).
pub fn emit_lookup_tables(vars: &[Variable]) -> String {
    let mut out = String::new();
    for v in vars.iter().filter(|v| v.var_type == VarType::Lookup) {
        if let Some(table) = &v.points {
            let points: Vec<String> = table
                .points
                .iter()
                .map(|(x, y)| format!("{{ {:?}, {:?} }}", x, y))
                .collect();
            let _ = writeln!(
                out,
                "static const struct lookup_point {}[] = {{ {} }};",
                lookup_table_name(&v.ref_id),
                points.join(", ")
            );
        }
    }
    out
}

/// Points every `Lookup` variable's cell at its file-scope table (built by
/// `emit_lookup_tables`) and loads every synthesized `Data` series (§4.4
/// step 3's `directData` placeholders) through the runtime's external-data
/// loader, so both kinds of table are actually populated before `evalAux`
/// or `evalLevels` ever calls into one (§4.6).
pub fn emit_init_lookups(vars: &[Variable]) -> String {
    let mut out = String::from("void initLookups(void) {\n");
    for v in vars.iter().filter(|v| v.var_type == VarType::Lookup) {
        if let Some(table) = &v.points {
            let _ = writeln!(out, "    {} = {};", c_name(&v.ref_id), lookup_table_name(&v.ref_id));
            let _ = writeln!(out, "    {} = {};", lookup_len_name(&v.ref_id), table.points.len());
        }
    }
    for v in vars.iter().filter(|v| v.var_type == VarType::Data) {
        let _ = writeln!(
            out,
            "    _sdc_load_direct_data(\"{}\", &{}, &{});",
            v.var_name,
            c_name(&v.ref_id),
            lookup_len_name(&v.ref_id)
        );
    }
    out.push_str("}\n");
    out
}

pub fn emit_init_levels(registry: &Registry, vars: &[Variable], init_order: &[Ident]) -> String {
    let shapes = shapes_by_var_name(vars);
    let by_ref = by_ref_id(vars);
    let mut out = String::from("void initLevels(void) {\n");
    // Everything the level init values transitively need, except the
    // levels themselves (each gets its own `init_ast`-based assignment
    // below instead of its normal step-time equation).
    for ref_id in init_order {
        if let Some(v) = by_ref.get(ref_id) {
            if v.var_type != VarType::Const && v.var_type != VarType::Level {
                if let Some(ast) = &v.ast {
                    emit_assignment(v, ast, &target_name(v, &shapes), vars, &shapes, registry, &mut out);
                }
            }
        }
    }
    for v in vars.iter().filter(|v| v.var_type == VarType::Level) {
        let ast = v.init_ast.clone().or_else(|| v.ast.clone());
        if let Some(ast) = ast {
            emit_assignment(v, &ast, &target_name(v, &shapes), vars, &shapes, registry, &mut out);
        }
    }
    out.push_str("}\n");
    out
}

pub fn emit_eval_aux(registry: &Registry, vars: &[Variable], aux_order: &[Ident]) -> String {
    let shapes = shapes_by_var_name(vars);
    let by_ref = by_ref_id(vars);
    let mut out = String::from("void evalAux(void) {\n");
    for ref_id in aux_order {
        if let Some(v) = by_ref.get(ref_id) {
            if let Some(ast) = &v.ast {
                emit_assignment(v, ast, &target_name(v, &shapes), vars, &shapes, registry, &mut out);
            }
        }
    }
    out.push_str("}\n");
    out
}

/// `_next_X = _X + dt * flow` per level, computed from the pre-step
/// snapshot into a shadow cell, then every shadow committed into real
/// storage in a second pass (§4.6, scenario 5). Splitting the step this way
/// means no level ever reads another level's already-updated value within a
/// single `evalLevels` call, so a level-to-level reference -- even a mutual
/// one that `sort_step_levels` cannot give a cycle-free order -- is always
/// correct regardless of which order the shadows are computed in.
/// `INTEG`'s flow argument is added onto the level's own current value;
/// every other level primitive (the `DELAY`/`SMOOTH`/`TREND` family) is
/// assumed to already describe its own next-value update when emitted as an
/// ordinary expression, via its runtime helper.
pub fn emit_eval_levels(registry: &Registry, vars: &[Variable], level_order: &[Ident]) -> String {
    let shapes = shapes_by_var_name(vars);
    let by_ref = by_ref_id(vars);
    let mut out = String::from("void evalLevels(void) {\n");
    for ref_id in level_order {
        if let Some(v) = by_ref.get(ref_id) {
            if let Some(ast) = &v.ast {
                let shadow = shadow_target_name(v, &shapes);
                match ast.as_ref() {
                    Expr::App(func, args) if is_integ(func) => {
                        emit_integ_update(v, &args[0], vars, &shapes, registry, &mut out, &shadow)
                    }
                    _ => emit_assignment(v, ast, &shadow, vars, &shapes, registry, &mut out),
                }
            }
        }
    }
    for ref_id in level_order {
        if let Some(v) = by_ref.get(ref_id) {
            emit_commit_shadow(v, &shapes, registry, &mut out);
        }
    }
    out.push_str("}\n");
    out
}

fn emit_integ_update(
    var: &Variable,
    flow: &Expr,
    vars: &[Variable],
    shapes: &HashMap<Ident, Shape>,
    registry: &Registry,
    out: &mut String,
    shadow: &str,
) {
    let shape = &shapes[&var.var_name];
    let base = if shape.apply_to_all && !shape.dims.is_empty() {
        format!("_{}", var.var_name)
    } else {
        c_name(&var.ref_id)
    };
    if shape.apply_to_all && !shape.dims.is_empty() {
        let mut loop_vars = HashMap::new();
        let mut indent = String::from("    ");
        for (i, dim) in shape.dims.iter().enumerate() {
            let size = dim_size(registry, dim);
            let lv = format!("i{}", i);
            let _ = writeln!(out, "{}for (int {} = 0; {} < {}; {}++) {{", indent, lv, lv, size, lv);
            loop_vars.insert(dim.clone(), lv);
            indent.push_str("    ");
        }
        let idx = emit_index_expr(&shape.dims, &loop_vars, registry);
        let flow_text = emit_expr(flow, vars, shapes, &loop_vars, registry);
        let _ = writeln!(
            out,
            "{}{}[{}] = {}[{}] + (_dt * {});",
            indent, shadow, idx, base, idx, flow_text
        );
        for _ in &shape.dims {
            indent.truncate(indent.len() - 4);
            let _ = writeln!(out, "{}}}", indent);
        }
    } else {
        let flow_text = emit_expr(flow, vars, shapes, &HashMap::new(), registry);
        let _ = writeln!(out, "    {} = {} + (_dt * {});", shadow, base, flow_text);
    }
}

/// Split an output spec entry into its base `varName` and, when present, an
/// explicit `[idx1,idx2,...]` element selector naming already-canonical
/// index names -- the same bracket syntax a non-apply-to-all `refId` uses.
fn parse_output_ref(name: &str) -> (&str, Option<Vec<&str>>) {
    if let Some(start) = name.find('[') {
        if let Some(end) = name.rfind(']') {
            if end > start {
                let base = &name[..start];
                let subs: Vec<&str> = name[start + 1..end].split(',').map(|s| s.trim()).collect();
                return (base, Some(subs));
            }
        }
    }
    (name, None)
}

fn flat_offset(registry: &Registry, dims: &[Ident], subs: &[&str]) -> Option<usize> {
    if dims.len() != subs.len() {
        return None;
    }
    let sizes: Vec<usize> = dims.iter().map(|d| dim_size(registry, d)).collect();
    let strides = strides(&sizes);
    let mut offset = 0usize;
    for ((dim, sub), stride) in dims.iter().zip(subs.iter()).zip(strides.iter()) {
        offset += index_position(registry, dim, sub) * stride;
    }
    Some(offset)
}

/// Emit one `row[i] = ...;` per requested output name (§4.6, §6). A bare
/// apply-to-all array name with no selector defaults to its first element;
/// an explicit `name[idx,...]` selector picks the exact flattened position
/// (scenario 3). A non-apply-to-all name is already a full `refId` and reads
/// its own scalar cell directly.
pub fn emit_store_outputs(registry: &Registry, vars: &[Variable], output_vars: &[Ident]) -> String {
    let shapes = shapes_by_var_name(vars);
    let mut out = String::from("void storeOutputs(double *row) {\n");
    for (i, name) in output_vars.iter().enumerate() {
        let (base, subs) = parse_output_ref(name);
        let shape = shapes.get(base);
        let expr = match (shape, subs) {
            (Some(s), Some(subs)) if s.apply_to_all && !s.dims.is_empty() => {
                match flat_offset(registry, &s.dims, &subs) {
                    Some(offset) => format!("_{}[{}]", base, offset),
                    None => format!("_{}[0]", base),
                }
            }
            (Some(s), None) if s.apply_to_all && !s.dims.is_empty() => format!("_{}[0]", base),
            _ => c_name(name),
        };
        let _ = writeln!(out, "    row[{}] = {};", i, expr);
    }
    out.push_str("}\n");
    out
}

pub fn emit_run_model(sim: &ParsedSimSpecs, output_count: usize) -> String {
    let saveper = sim.saveper.unwrap_or(sim.time_step);
    let row_len = output_count.max(1);
    format!(
        "void run_model(void) {{\n    _time = {:?};\n    initConstants();\n    initLookups();\n    initLevels();\n    double save_step = {:?};\n    double next_save = _time;\n    while (_time <= {:?} + 1e-9) {{\n        evalAux();\n        if (_time + 1e-9 >= next_save) {{\n            double row[{}];\n            storeOutputs(row);\n            next_save += save_step;\n        }}\n        evalLevels();\n        _time += _dt;\n    }}\n}}\n",
        sim.initial_time, saveper, sim.final_time, row_len
    )
}

/// Assemble the full generated C source.
pub fn emit_model(
    registry: &Registry,
    vars: &[Variable],
    aux_order: &[Ident],
    level_order: &[Ident],
    init_order: &[Ident],
    sim: &ParsedSimSpecs,
    output_vars: &[Ident],
) -> String {
    let mut out = String::new();
    out.push_str("#include <math.h>\n#include \"sdc_runtime.h\"\n\n");
    let _ = writeln!(out, "double _time;\ndouble _dt = {:?};\n", sim.time_step);
    out.push_str(&emit_mapping_tables(registry));
    out.push('\n');
    out.push_str(&emit_lookup_tables(vars));
    out.push('\n');
    out.push_str(&emit_declarations(registry, vars));
    out.push_str(&emit_level_shadow_declarations(registry, vars));
    out.push('\n');
    out.push_str(&emit_init_lookups(vars));
    out.push('\n');
    out.push_str(&emit_init_constants(registry, vars, init_order));
    out.push('\n');
    out.push_str(&emit_init_levels(registry, vars, init_order));
    out.push('\n');
    out.push_str(&emit_eval_aux(registry, vars, aux_order));
    out.push('\n');
    out.push_str(&emit_eval_levels(registry, vars, level_order));
    out.push('\n');
    out.push_str(&emit_store_outputs(registry, vars, output_vars));
    out.push('\n');
    out.push_str(&emit_run_model(sim, output_vars.len()));
    out
}
