// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::convert::From;
use std::fmt;
use std::{error, result};

use regex::Regex;

pub type Ident = String;

/// Every failure kind the pipeline can report, per the error-handling design:
/// parse-time and subscript-resolution errors abort, reference/ordering errors
/// abort naming the offender, and spec errors are collected as diagnostics
/// rather than aborting. Classification conflicts are a defect and panic
/// instead of flowing through this enum (see `classification_conflict`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    DoesNotExist,
    BadSpec,
    CyclicDimension,
    MappingError,
    SubscriptMismatch,
    DependencyCycle,
    UnknownSpecVar,
    BadTable,
    EmptyEquation,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            DoesNotExist => "does_not_exist",
            BadSpec => "bad_spec",
            CyclicDimension => "cyclic_dimension",
            MappingError => "mapping_error",
            SubscriptMismatch => "subscript_mismatch",
            DependencyCycle => "dependency_cycle",
            UnknownSpecVar => "unknown_spec_var",
            BadTable => "bad_table",
            EmptyEquation => "empty_equation",
        };

        write!(f, "{}", name)
    }
}

/// One offending canonical name plus, when it came from a textual formula,
/// the formula text it was found in. Every fatal error and every collected
/// diagnostic carries one of these so the caller can point a user at the
/// right place in the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub code: ErrorCode,
    pub offending: Ident,
    pub formula: Option<String>,
}

impl Error {
    pub fn new(code: ErrorCode, offending: &str) -> Error {
        Error {
            code,
            offending: offending.to_string(),
            formula: None,
        }
    }

    pub fn with_formula(code: ErrorCode, offending: &str, formula: &str) -> Error {
        Error {
            code,
            offending: offending.to_string(),
            formula: Some(formula.to_string()),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.formula {
            Some(formula) => write!(f, "{}: {} (in `{}`)", self.code, self.offending, formula),
            None => write!(f, "{}: {}", self.code, self.offending),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

macro_rules! err(
    ($code:tt, $offending:expr) => {{
        use crate::common::{Error, ErrorCode};
        Err(Error::new(ErrorCode::$code, $offending))
    }};
    ($code:tt, $offending:expr, $formula:expr) => {{
        use crate::common::{Error, ErrorCode};
        Err(Error::with_formula(ErrorCode::$code, $offending, $formula))
    }};
);

/// A non-fatal finding produced by the spec reconciler (§4.7): the pipeline
/// keeps going and produces as much of the listing output as it can, but the
/// caller still needs to know an input or output variable didn't resolve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub offending: Ident,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}: {}", self.code, self.offending, self.message)
    }
}

/// Classification rules in §4.3 are mutually exclusive by construction; if
/// two of them ever both match, that's a defect in this implementation, not
/// a malformed model. Per the error-handling design this panics rather than
/// returning an `Error`.
pub fn classification_conflict(offending: &str) -> ! {
    panic!(
        "internal invariant violation: ambiguous variable classification for `{}`",
        offending
    );
}

/// Canonicalize a Vensim identifier: trim, strip a surrounding pair of
/// quotes, collapse internal whitespace/newlines to underscores, and
/// lower-case. Variable and dimension names keep their natural first
/// character; a leading underscore is only forced when the result would
/// otherwise be empty or start with a digit, so it remains a valid C
/// identifier once the emitter uses it verbatim as a storage-cell name.
pub fn canonicalize(name: &str) -> String {
    let name = name.trim();

    let bytes = name.as_bytes();
    let quoted = bytes.len() >= 2 && bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"';
    let name = if quoted {
        &name[1..bytes.len() - 1]
    } else {
        name
    };

    lazy_static! {
        static ref NON_ALNUM_RE: Regex = Regex::new(r"[^\p{Alphabetic}0-9]+").unwrap();
    }
    let canonical = NON_ALNUM_RE.replace_all(name, "_").to_lowercase();

    match canonical.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("_{}", canonical),
        None => "_".to_string(),
        _ => canonical,
    }
}

/// Canonicalize a subscript element (index) name for use inside a `refId`'s
/// subscript list or a generated C array index, e.g. `R1` -> `_r1`. Indices
/// live in a separate namespace from variable names and are conventionally
/// underscore-prefixed so that all-numeric index labels ("1", "2", ...)
/// become valid identifiers and never collide textually with a variable of
/// the same canonicalized name (see DESIGN.md).
pub fn canonicalize_element(name: &str) -> String {
    format!("_{}", canonicalize(name))
}

/// The pseudo-variable representing the simulation clock; always present
/// and never typed (see §3).
pub const TIME_VAR: &str = "_time";
