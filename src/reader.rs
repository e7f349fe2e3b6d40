// Copyright 2021 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The variable reader (§4.2) and equation reader (§4.3): turn a
//! [`ParsedModel`](crate::parsetree::ParsedModel) into flat
//! [`Variable`](crate::variable::Variable) records, separating
//! non-apply-to-all equations and splitting each RHS into references,
//! init-references, and a classification.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::builtins::{is_builtin_fn, is_initial, is_integ, is_state_primitive};
use crate::common::{canonicalize, canonicalize_element, Ident, Result};
use crate::dimensions::{Registry, Subscript};
use crate::parsetree::{ParsedModel, RhsNode};
use crate::variable::{Table, VarType, Variable};

fn canonical_subscript(raw: &str, registry: &Registry) -> Ident {
    let plain = canonicalize(raw);
    if registry.is_dimension(&plain) {
        plain
    } else {
        canonicalize_element(raw)
    }
}

fn cross_product(lists: &[Vec<Ident>]) -> Vec<Vec<Ident>> {
    let mut result: Vec<Vec<Ident>> = vec![Vec::new()];
    for list in lists {
        let mut next = Vec::with_capacity(result.len() * list.len().max(1));
        for combo in &result {
            for item in list {
                let mut c = combo.clone();
                c.push(item.clone());
                next.push(c);
            }
        }
        result = next;
    }
    result
}

/// Walk the LHS's raw subscripts, split out the ones that need non-apply-to-
/// all separation (explicit index enumeration, or a dimension named in
/// `specialSeparationDims` for this variable), and emit one [`Variable`] per
/// resulting combination (§4.2).
pub fn read_variables(
    model: &ParsedModel,
    registry: &Registry,
    special_separation_dims: &HashMap<Ident, Vec<Ident>>,
) -> Vec<Variable> {
    let mut vars = Vec::new();

    for eq in &model.equations {
        let var_name = canonicalize(&eq.lhs_name);
        let lhs_subs: Vec<Ident> = eq
            .lhs_subscripts
            .iter()
            .map(|s| canonical_subscript(s, registry))
            .collect();

        let special: HashSet<Ident> = special_separation_dims
            .get(&var_name)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|d| canonicalize(&d))
            .collect();

        let separation_dims: Vec<Ident> = lhs_subs
            .iter()
            .filter(|s| registry.is_dimension(s) && special.contains(s.as_str()))
            .cloned()
            .collect();

        let position_values: Vec<Vec<Ident>> = lhs_subs
            .iter()
            .map(|s| {
                if !registry.is_dimension(s) {
                    vec![s.clone()]
                } else if special.contains(s.as_str()) {
                    registry.index_names_for_subscript(s)
                } else {
                    vec![s.clone()]
                }
            })
            .collect();

        let combos = cross_product(&position_values);
        let formula = format_rhs(&eq.rhs);

        for combo in combos {
            let subs = registry.normalize_subscripts(&combo);
            let mut var = Variable::new(&var_name, subs, &eq.model_lhs, &formula);
            var.units = eq.units.clone();
            var.doc = eq.doc.clone();
            if !separation_dims.is_empty() {
                var.separation_dims = separation_dims.clone();
            }
            match &eq.rhs {
                RhsNode::Table { points } => {
                    var.points = Some(Table {
                        points: points.clone(),
                    });
                }
                RhsNode::Expr(ast) => {
                    var.ast = Some(ast.clone());
                }
            }
            vars.push(var);
        }
    }

    vars.push(Variable::time_placeholder());
    vars
}

/// Validate that every subscripted reference in `ast` binds legally against
/// `var_subs`, position by position (§4.3): index against index must share a
/// family (a non-apply-to-all element may name any sibling element, e.g.
/// `a[R3] = a[R1] + a[R2]`, not only its own), dimension against dimension
/// must match exactly or be connected by a declared map-to/map-from mapping
/// (scenario 6: `x[T] = y[F]` with `F` mapped to `T`), a dimension on the
/// variable accepts one of its own indices on the reference, and an index on
/// the variable never accepts a whole dimension on the reference.
fn check_bindings(ast: &Expr, var_subs: &[Ident], registry: &Registry, model_lhs: &str) -> Result<()> {
    match ast {
        Expr::Subscripted(sv) => {
            for (vs, rs) in var_subs.iter().zip(sv.subs.iter()) {
                check_pair(vs, rs, registry, model_lhs)?;
            }
            Ok(())
        }
        Expr::App(_, args) => {
            for a in args {
                check_bindings(a, var_subs, registry, model_lhs)?;
            }
            Ok(())
        }
        Expr::Op1(_, a) => check_bindings(a, var_subs, registry, model_lhs),
        Expr::Op2(_, l, r) => {
            check_bindings(l, var_subs, registry, model_lhs)?;
            check_bindings(r, var_subs, registry, model_lhs)
        }
        Expr::If(c, t, f) => {
            check_bindings(c, var_subs, registry, model_lhs)?;
            check_bindings(t, var_subs, registry, model_lhs)?;
            check_bindings(f, var_subs, registry, model_lhs)
        }
        Expr::Const(_) | Expr::Var(_) => Ok(()),
    }
}

fn family_of(registry: &Registry, sub: &str) -> Ident {
    registry
        .sub(sub)
        .map(|s| s.family().to_string())
        .unwrap_or_else(|| sub.to_string())
}

/// Whether `a -> b` or `b -> a` is a declared map-to/map-from relationship
/// (§4.1): after `Registry::resolve()` inverts every mapping, the *from*
/// dimension's `mappings` table is keyed by the *to* dimension's name, but a
/// binding check has no reason to prefer one direction over the other.
fn dimensions_mapped(registry: &Registry, a: &str, b: &str) -> bool {
    let maps_to = |from: &str, to: &str| {
        matches!(registry.sub(from), Some(Subscript::Dimension(d)) if d.mappings.contains_key(to))
    };
    maps_to(a, b) || maps_to(b, a)
}

/// Scenario 6: `x[T] = y[F]` with `F: F1, F2 -> T` binds even though `F` and
/// `T` are different dimensions (and different families) entirely, because a
/// declared mapping is exactly the registry's own notion of "these two
/// dimensions address the same positions" -- `emit_index_expr` relies on the
/// same mapping table to translate the reference at code-generation time.
fn check_pair(var_sub: &str, ref_sub: &str, registry: &Registry, model_lhs: &str) -> Result<()> {
    let var_is_index = registry.is_index(var_sub);
    let ref_is_index = registry.is_index(ref_sub);
    let ok = match (var_is_index, ref_is_index) {
        (true, true) => family_of(registry, var_sub) == family_of(registry, ref_sub),
        (false, false) => var_sub == ref_sub || dimensions_mapped(registry, var_sub, ref_sub),
        (false, true) => registry
            .index_names_for_subscript(var_sub)
            .iter()
            .any(|i| i == ref_sub),
        (true, false) => false,
    };
    if ok {
        Ok(())
    } else {
        err!(SubscriptMismatch, ref_sub, model_lhs)
    }
}

fn push_ref(id: &str, in_initial: bool, refs: &mut Vec<Ident>, init_refs: &mut Vec<Ident>) {
    let list = if in_initial { init_refs } else { refs };
    if !list.iter().any(|r| r == id) {
        list.push(id.to_string());
    }
}

/// Collect every variable identifier `ast` depends on, splitting them
/// between `references` and `init_references` per the `INTEG`/`INITIAL`
/// rules in §4.3: anything reached while `in_initial` is set, or reached
/// through `INTEG`'s second argument, contributes only to `init_refs`. A
/// subscripted reference with `registry` available and no dimension among
/// its subscripts (every position is a specific index) is recorded in full
/// `name[s1,...]` form so [`resolve_one`] can bind it to the single matching
/// non-apply-to-all record instead of conservatively expanding to every
/// record sharing the name -- needed so a record can name a sibling element
/// (`a[R3] = a[R1] + a[R2]`) without appearing to depend on itself.
fn collect_refs(
    ast: &Expr,
    in_initial: bool,
    registry: Option<&Registry>,
    refs: &mut Vec<Ident>,
    init_refs: &mut Vec<Ident>,
) {
    match ast {
        Expr::Const(_) => (),
        Expr::Var(id) => push_ref(id, in_initial, refs, init_refs),
        Expr::Subscripted(sv) => {
            let raw = match registry {
                Some(reg) if !sv.subs.is_empty() && !sv.subs.iter().any(|s| reg.is_dimension(s)) => {
                    format!("{}[{}]", sv.ident, sv.subs.join(","))
                }
                _ => sv.ident.clone(),
            };
            push_ref(&raw, in_initial, refs, init_refs);
        }
        Expr::App(func, args) => {
            if is_initial(func) {
                for a in args {
                    collect_refs(a, true, registry, refs, init_refs);
                }
            } else if is_integ(func) {
                if let Some(flow) = args.first() {
                    collect_refs(flow, in_initial, registry, refs, init_refs);
                }
                if let Some(init) = args.get(1) {
                    collect_refs(init, true, registry, refs, init_refs);
                }
            } else {
                if !is_builtin_fn(func) {
                    // Not a recognized builtin: this is a lookup variable
                    // called as a function, e.g. `demand_curve(price)`.
                    push_ref(func, in_initial, refs, init_refs);
                }
                for a in args {
                    collect_refs(a, in_initial, registry, refs, init_refs);
                }
            }
        }
        Expr::Op1(_, a) => collect_refs(a, in_initial, registry, refs, init_refs),
        Expr::Op2(_, l, r) => {
            collect_refs(l, in_initial, registry, refs, init_refs);
            collect_refs(r, in_initial, registry, refs, init_refs);
        }
        Expr::If(c, t, f) => {
            collect_refs(c, in_initial, registry, refs, init_refs);
            collect_refs(t, in_initial, registry, refs, init_refs);
            collect_refs(f, in_initial, registry, refs, init_refs);
        }
    }
}

fn collect_all_idents(ast: &Expr, out: &mut Vec<Ident>) {
    let mut refs = Vec::new();
    let mut init_refs = Vec::new();
    collect_refs(ast, false, None, &mut refs, &mut init_refs);
    out.extend(refs);
    out.extend(init_refs);
}

/// True when `ast` is built purely from literals and operators over them,
/// with no reference to any other variable at all (§4.3 rule 4: "RHS
/// contains only literals..."). A lone reference disqualifies an equation
/// from `const` even when that reference's own target happens to be const
/// itself -- see the worked scalar-model example in DESIGN.md, which
/// classifies `y = x + 2` as `aux` even though `x = 1` is `const`. This is
/// a single check with no dependency on any other variable's classification,
/// so [`classify_all`] needs only one pass, not a fixed point.
fn is_const_expr(ast: &Expr) -> bool {
    let mut ids = Vec::new();
    collect_all_idents(ast, &mut ids);
    ids.is_empty()
}

/// A non-apply-to-all array is one `varName` split across several records
/// (§4.2); §4.3's const rule is evaluated per `varName`, not per record, so
/// one record with a real reference (`a[R3] = a[R1] + a[R2]`) keeps every
/// sibling record `aux` even though `a[R1] = 1` and `a[R2] = 2` have no
/// references of their own (DESIGN.md). Only records that would otherwise
/// fall through to the plain const-or-aux rule -- not `Level`/`Initial`
/// records, which classify from their own shape regardless of siblings --
/// contribute to a group's verdict.
fn const_eligible_groups(vars: &[Variable], direct_data_tags: &HashSet<Ident>) -> HashMap<Ident, bool> {
    let mut groups: HashMap<Ident, bool> = HashMap::new();
    for v in vars.iter() {
        if v.points.is_some() || direct_data_tags.contains(&v.var_name) {
            continue;
        }
        let ast = match v.ast.as_ref() {
            Some(ast) => ast,
            None => continue,
        };
        let is_plain = match ast.as_ref() {
            Expr::App(func, _) if is_state_primitive(func) => false,
            Expr::App(func, _) if is_initial(func) => false,
            _ => true,
        };
        if !is_plain {
            continue;
        }
        let entry = groups.entry(v.var_name.clone()).or_insert(true);
        *entry = *entry && is_const_expr(ast);
    }
    groups
}

/// Assign `var_type`/`has_init_value`/`init_ast` to every variable, per the
/// first-match-wins rules in §4.3. Tables and `directData` tags resolve
/// immediately; `INTEG`/the other state primitives resolve from shape alone;
/// `INITIAL(...)` always computes a value fixed once at init time, so it is
/// `const` regardless of what it wraps; everything else is `const` only when
/// every record sharing its `varName` has no variable references at all (see
/// `const_eligible_groups`).
pub fn classify_all(vars: &mut [Variable], direct_data_tags: &HashSet<Ident>) {
    let const_groups = const_eligible_groups(vars, direct_data_tags);
    for v in vars.iter_mut() {
        if v.points.is_some() {
            v.var_type = VarType::Lookup;
            continue;
        }
        if direct_data_tags.contains(&v.var_name) {
            v.var_type = VarType::Data;
            continue;
        }
        let ast = match v.ast.as_ref() {
            Some(ast) => ast,
            None => continue,
        };
        match ast.as_ref() {
            Expr::App(func, args) if is_state_primitive(func) => {
                v.var_type = VarType::Level;
                v.has_init_value = true;
                if is_integ(func) {
                    if let Some(init) = args.get(1) {
                        v.init_ast = Some(Rc::clone(init));
                    }
                }
            }
            Expr::App(func, args) if is_initial(func) => {
                v.var_type = VarType::Const;
                v.has_init_value = true;
                if let Some(inner) = args.first() {
                    v.init_ast = Some(Rc::clone(inner));
                }
            }
            _ if const_groups.get(&v.var_name).copied().unwrap_or(false) => {
                v.var_type = VarType::Const;
            }
            _ => {}
        }
    }
}

/// Validate subscript bindings and fill in `references`/`init_references`
/// and classification for every variable that has an equation (§4.3). Must
/// run after [`read_variables`] and after `registry.resolve()`.
pub fn read_equations(
    vars: &mut [Variable],
    registry: &Registry,
    direct_data_tags: &HashSet<Ident>,
) -> Result<()> {
    for var in vars.iter_mut() {
        if let Some(ast) = var.ast.clone() {
            check_bindings(ast.as_ref(), &var.subscripts, registry, &var.model_lhs)?;
            let mut refs = Vec::new();
            let mut init_refs = Vec::new();
            collect_refs(ast.as_ref(), false, Some(registry), &mut refs, &mut init_refs);
            var.references = refs;
            var.init_references = init_refs;
        }
    }
    classify_all(vars, direct_data_tags);
    Ok(())
}

/// Reconstruct a readable formula string from a parsed RHS for diagnostics
/// and listings; the grammar front end keeps the original source text to
/// itself, so this is the closest this core gets to `model_formula`.
fn format_rhs(rhs: &RhsNode) -> String {
    match rhs {
        RhsNode::Table { points } => {
            let body: Vec<String> = points.iter().map(|(x, y)| format!("({}, {})", x, y)).collect();
            format!("WITH LOOKUP([{}])", body.join(", "))
        }
        RhsNode::Expr(ast) => format_expr(ast),
    }
}

fn format_expr(e: &Expr) -> String {
    match e {
        Expr::Const(n) => format!("{}", n),
        Expr::Var(id) => id.clone(),
        Expr::Subscripted(sv) => format!("{}[{}]", sv.ident, sv.subs.join(",")),
        Expr::App(func, args) => {
            let body: Vec<String> = args.iter().map(|a| format_expr(a)).collect();
            format!("{}({})", func, body.join(","))
        }
        Expr::Op1(op, a) => format!("{}{}", unary_symbol(*op), format_expr(a)),
        Expr::Op2(op, l, r) => format!("({} {} {})", format_expr(l), binary_symbol(*op), format_expr(r)),
        Expr::If(c, t, f) => format!(
            "IF THEN ELSE({}, {}, {})",
            format_expr(c),
            format_expr(t),
            format_expr(f)
        ),
    }
}

fn unary_symbol(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Positive => "+",
        UnaryOp::Negative => "-",
        UnaryOp::Not => "NOT ",
    }
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Exp => "^",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "MOD",
        BinaryOp::Gt => ">",
        BinaryOp::Lt => "<",
        BinaryOp::Gte => ">=",
        BinaryOp::Lte => "<=",
        BinaryOp::Eq => "=",
        BinaryOp::Neq => "<>",
        BinaryOp::And => "AND",
        BinaryOp::Or => "OR",
    }
}
