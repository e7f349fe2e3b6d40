// Copyright 2021 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Recognizing the builtin function names the equation reader and emitter
//! need to special-case. Everything not listed here is either an ordinary
//! math builtin the emitter lowers straight to a C runtime call, or a
//! reference to a variable in module position, which the reader treats as an
//! error.

/// `INTEG(flow, initial)`: the only builtin whose two arguments are spliced
/// into `references`/`initReferences` rather than treated uniformly (§4.3).
pub fn is_integ(func: &str) -> bool {
    func == "integ"
}

/// `INITIAL(expr)`: everything inside routes to `initReferences` regardless
/// of where in the tree it appears (§4.3).
pub fn is_initial(func: &str) -> bool {
    func == "initial"
}

/// The state-carrying primitives besides `INTEG` that make a variable a
/// level (§4.3): the `DELAY`/`SMOOTH`/`TREND` families and `DELAY FIXED`.
/// Named here with underscores, as they arrive after `canonicalize()`.
const STATE_PRIMITIVES: &[&str] = &[
    "delay_fixed",
    "delay1",
    "delay1i",
    "delay3",
    "delay3i",
    "smooth",
    "smoothi",
    "smooth3",
    "smooth3i",
    "trend",
];

pub fn is_state_primitive(func: &str) -> bool {
    func == "integ" || STATE_PRIMITIVES.contains(&func)
}

/// Ordinary math builtins the emitter lowers to a runtime call with the same
/// name (`_abs`, `_min`, ...). Not exhaustive of every Vensim function, just
/// the ones this core needs to distinguish from a variable reference.
const MATH_BUILTINS: &[&str] = &[
    "abs",
    "arccos",
    "arcsin",
    "arctan",
    "cos",
    "exp",
    "if_then_else",
    "integer",
    "ln",
    "log10",
    "max",
    "mean",
    "min",
    "modulo",
    "pulse",
    "ramp",
    "random_uniform",
    "safe_div",
    "sin",
    "sqrt",
    "step",
    "tan",
    "with_lookup",
    "xidz",
    "zidz",
];

pub fn is_math_builtin(func: &str) -> bool {
    MATH_BUILTINS.contains(&func)
}

/// True for any name the reader should never treat as a variable reference:
/// `INTEG`/`INITIAL` plus every recognized state or math builtin.
pub fn is_builtin_fn(func: &str) -> bool {
    is_integ(func) || is_initial(func) || is_state_primitive(func) || is_math_builtin(func)
}
