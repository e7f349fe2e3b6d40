// Copyright 2020 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::rc::Rc;

use crate::common::Ident;

/// A subscripted reference on the right-hand side, e.g. `a[R1, C]`. `subs`
/// holds the raw subscript names as they appeared in the formula; the
/// equation reader resolves them against the LHS's subscripts per the
/// matching rules in §4.3.
#[derive(PartialEq, Clone, Debug)]
pub struct SubscriptedVar {
    pub ident: Ident,
    pub subs: Vec<Ident>,
}

#[derive(PartialEq, Clone, Debug)]
pub enum Expr {
    Const(f64),
    Var(Ident),
    Subscripted(SubscriptedVar),
    /// A function application. `INTEG`, `INITIAL`, `DELAY FIXED`, the
    /// `SMOOTH*`/`DELAY*`/`TREND*` families, and the ordinary math builtins
    /// all arrive here; the equation reader (§4.3) special-cases the ones
    /// that affect classification or reference splitting by name.
    App(Ident, Vec<Rc<Expr>>),
    Op1(UnaryOp, Rc<Expr>),
    Op2(BinaryOp, Rc<Expr>, Rc<Expr>),
    If(Rc<Expr>, Rc<Expr>, Rc<Expr>),
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Exp,
    Mul,
    Div,
    Mod,
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
    Neq,
    And,
    Or,
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum UnaryOp {
    Positive,
    Negative,
    Not,
}

pub trait Visitor<T> {
    fn walk(&mut self, e: &Expr) -> T;
}

/// Walk `e`, calling `f` on every `Var`/`Subscripted` identifier reached
/// (including the callee of an `App`). Shared by the equation reader's
/// reference collector and the emitter's subscript-loop codegen.
pub fn walk_idents(e: &Expr, f: &mut impl FnMut(&Ident)) {
    match e {
        Expr::Const(_) => (),
        Expr::Var(id) => f(id),
        Expr::Subscripted(sv) => f(&sv.ident),
        Expr::App(func, args) => {
            f(func);
            for arg in args.iter() {
                walk_idents(arg, f);
            }
        }
        Expr::Op2(_, l, r) => {
            walk_idents(l, f);
            walk_idents(r, f);
        }
        Expr::Op1(_, l) => walk_idents(l, f),
        Expr::If(cond, t, e2) => {
            walk_idents(cond, f);
            walk_idents(t, f);
            walk_idents(e2, f);
        }
    }
}
