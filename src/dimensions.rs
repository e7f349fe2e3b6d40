// Copyright 2021 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The subscript registry (§4.1): stores dimensions and indices, expands
//! dimension-of-dimensions declarations, resolves each dimension's family,
//! and inverts map-to/map-from tables.

use std::collections::HashMap;

use crate::common::{canonicalize, canonicalize_element, Error, ErrorCode, Ident, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Index {
    pub name: Ident,
    pub family: Ident,
    pub position: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dimension {
    pub name: Ident,
    pub value: Vec<Ident>,
    pub family: Ident,
    /// toDimName -> ordered fromDim index names, one per toDim index position.
    pub mappings: HashMap<Ident, Vec<Ident>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Subscript {
    Dimension(Dimension),
    Index(Index),
}

impl Subscript {
    pub fn name(&self) -> &str {
        match self {
            Subscript::Dimension(d) => &d.name,
            Subscript::Index(i) => &i.name,
        }
    }

    pub fn family(&self) -> &str {
        match self {
            Subscript::Dimension(d) => &d.family,
            Subscript::Index(i) => &i.family,
        }
    }
}

struct RawDeclaration {
    value: Vec<Ident>,
    /// toDimName -> raw declared elements (empty means "use identity").
    mappings: HashMap<Ident, Vec<Ident>>,
}

/// The subscript registry. Declarations are staged and only become queryable
/// `Subscript`s after `resolve()` runs the full pipeline in §4.1: expand,
/// resolve families, instantiate indices, invert mappings.
#[derive(Default)]
pub struct Registry {
    raw: HashMap<Ident, RawDeclaration>,
    family_overrides: HashMap<Ident, Ident>,
    subscripts: HashMap<Ident, Subscript>,
    resolved: bool,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Declare a dimension. `raw_value` elements may themselves be other
    /// dimension names; they are expanded in `resolve()`. `mappings` maps a
    /// target dimension name to either an explicit ordered list of target
    /// index names (one per element of `raw_value`) or an empty list meaning
    /// "identity".
    pub fn declare_dimension(
        &mut self,
        name: &str,
        raw_value: Vec<String>,
        mappings: HashMap<String, Vec<String>>,
    ) {
        let name = canonicalize(name);
        // Kept in the plain dimension-name namespace for now: until `expand()`
        // sees every declaration, we can't tell a reference to another
        // dimension apart from a bare index element. The underscore prefix
        // for leaf index names is applied inside `expand_one`.
        let value = raw_value.iter().map(|v| canonicalize(v)).collect();
        let mappings = mappings
            .into_iter()
            .map(|(k, v)| (canonicalize(&k), v.iter().map(|e| canonicalize(e)).collect()))
            .collect();
        self.raw.insert(name, RawDeclaration { value, mappings });
        self.resolved = false;
    }

    pub fn set_family_override(&mut self, dim_name: &str, family_name: &str) {
        self.family_overrides
            .insert(canonicalize(dim_name), canonicalize(family_name));
    }

    /// Run the full §4.1 pipeline. Idempotent once it has succeeded.
    pub fn resolve(&mut self) -> Result<()> {
        if self.resolved {
            return Ok(());
        }
        let expanded = self.expand()?;
        let families = self.resolve_families(&expanded);
        let mut subscripts = HashMap::new();
        for (name, value) in expanded.iter() {
            subscripts.insert(
                name.clone(),
                Subscript::Dimension(Dimension {
                    name: name.clone(),
                    value: value.clone(),
                    family: families[name].clone(),
                    mappings: HashMap::new(),
                }),
            );
        }
        self.instantiate_indices(&expanded, &families, &mut subscripts);
        self.invert_mappings(&expanded, &families, &mut subscripts)?;
        self.subscripts = subscripts;
        self.resolved = true;
        Ok(())
    }

    /// Repeatedly replace dimension names appearing inside a dimension's
    /// value with that dimension's own value, until every value list
    /// contains only index names. Detects cycles in the dimension-name
    /// graph.
    fn expand(&self) -> Result<HashMap<Ident, Vec<Ident>>> {
        let mut expanded: HashMap<Ident, Vec<Ident>> = HashMap::new();
        for name in self.raw.keys() {
            self.expand_one(name, &mut expanded, &mut Vec::new())?;
        }
        Ok(expanded)
    }

    fn expand_one(
        &self,
        name: &str,
        expanded: &mut HashMap<Ident, Vec<Ident>>,
        stack: &mut Vec<Ident>,
    ) -> Result<Vec<Ident>> {
        if let Some(v) = expanded.get(name) {
            return Ok(v.clone());
        }
        if stack.iter().any(|s| s == name) {
            return err!(CyclicDimension, name);
        }
        let decl = match self.raw.get(name) {
            Some(decl) => decl,
            // referenced name isn't itself a declared dimension -> it's an index
            None => return Ok(vec![canonicalize_element(name)]),
        };
        stack.push(name.to_string());
        let mut value = Vec::new();
        for elem in decl.value.iter() {
            if self.raw.contains_key(elem) {
                value.extend(self.expand_one(elem, expanded, stack)?);
            } else {
                value.push(canonicalize_element(elem));
            }
        }
        stack.pop();
        expanded.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// §3 family selection: a spec override wins; otherwise the family of
    /// `D` is the dimension of greatest size among those whose value
    /// contains `D`'s first index, ties broken by sorting candidate names
    /// descending and taking the last (i.e. the alphabetically smallest) —
    /// see DESIGN.md for why this tiebreak was chosen over the reverse.
    fn resolve_families(&self, expanded: &HashMap<Ident, Vec<Ident>>) -> HashMap<Ident, Ident> {
        let mut families = HashMap::new();
        for (name, value) in expanded.iter() {
            if let Some(over) = self.family_overrides.get(name) {
                families.insert(name.clone(), over.clone());
                continue;
            }
            let family = match value.first() {
                None => name.clone(),
                Some(first_index) => {
                    let mut candidates: Vec<&Ident> = expanded
                        .iter()
                        .filter(|(_, v)| v.contains(first_index))
                        .map(|(n, _)| n)
                        .collect();
                    let max_size = candidates
                        .iter()
                        .map(|n| expanded[*n].len())
                        .max()
                        .unwrap_or(0);
                    candidates.retain(|n| expanded[*n].len() == max_size);
                    candidates.sort_by(|a, b| b.cmp(a));
                    candidates
                        .last()
                        .cloned()
                        .cloned()
                        .unwrap_or_else(|| name.clone())
                }
            };
            families.insert(name.clone(), family);
        }
        families
    }

    fn instantiate_indices(
        &self,
        expanded: &HashMap<Ident, Vec<Ident>>,
        families: &HashMap<Ident, Ident>,
        subscripts: &mut HashMap<Ident, Subscript>,
    ) {
        for (name, value) in expanded.iter() {
            if families[name] != *name {
                continue;
            }
            for (i, index_name) in value.iter().enumerate() {
                subscripts.entry(index_name.clone()).or_insert_with(|| {
                    Subscript::Index(Index {
                        name: index_name.clone(),
                        family: name.clone(),
                        position: i,
                    })
                });
            }
        }
    }

    fn invert_mappings(
        &self,
        expanded: &HashMap<Ident, Vec<Ident>>,
        families: &HashMap<Ident, Ident>,
        subscripts: &mut HashMap<Ident, Subscript>,
    ) -> Result<()> {
        let _ = families;
        for (from_name, decl) in self.raw.iter() {
            if decl.mappings.is_empty() {
                continue;
            }
            let from_value = &expanded[from_name];
            let mut inverted: HashMap<Ident, Vec<Ident>> = HashMap::new();
            for (to_name, raw) in decl.mappings.iter() {
                let to_value = expanded.get(to_name).ok_or_else(|| {
                    Error::new(ErrorCode::MappingError, to_name)
                })?;
                let mut result = vec![String::new(); to_value.len()];
                if raw.is_empty() {
                    for (i, v) in from_value.iter().take(to_value.len()).enumerate() {
                        result[i] = v.clone();
                    }
                } else {
                    for (i, target) in raw.iter().enumerate() {
                        let target = canonicalize_element(target);
                        let j = to_value
                            .iter()
                            .position(|e| *e == target)
                            .ok_or_else(|| Error::new(ErrorCode::MappingError, &target))?;
                        result[j] = from_value
                            .get(i)
                            .cloned()
                            .ok_or_else(|| Error::new(ErrorCode::MappingError, from_name))?;
                    }
                }
                inverted.insert(to_name.clone(), result);
            }
            if let Some(Subscript::Dimension(d)) = subscripts.get_mut(from_name) {
                d.mappings = inverted;
            }
        }
        Ok(())
    }

    pub fn sub(&self, name: &str) -> Option<&Subscript> {
        self.subscripts.get(&canonicalize(name))
    }

    pub fn is_dimension(&self, name: &str) -> bool {
        matches!(self.sub(name), Some(Subscript::Dimension(_)))
    }

    pub fn is_index(&self, name: &str) -> bool {
        matches!(self.sub(name), Some(Subscript::Index(_)))
    }

    /// All index names belonging to the dimension/index `name`, in order.
    pub fn index_names_for_subscript(&self, name: &str) -> Vec<Ident> {
        match self.sub(name) {
            Some(Subscript::Dimension(d)) => d.value.clone(),
            Some(Subscript::Index(i)) => vec![i.name.clone()],
            None => Vec::new(),
        }
    }

    /// The family name backing each subscript, in the order given.
    pub fn subscript_families(&self, subscripts: &[Ident]) -> Vec<Ident> {
        subscripts
            .iter()
            .map(|s| {
                self.sub(s)
                    .map(|sub| sub.family().to_string())
                    .unwrap_or_else(|| s.clone())
            })
            .collect()
    }

    /// Every resolved dimension and index, in no particular order; the
    /// listing emitter sorts by name itself.
    pub fn all_subscripts(&self) -> Vec<&Subscript> {
        self.subscripts.values().collect()
    }

    /// Sort a subscript list ascending by family name (normal order, §3).
    pub fn normalize_subscripts(&self, subscripts: &[Ident]) -> Vec<Ident> {
        let mut indexed: Vec<(Ident, Ident)> = subscripts
            .iter()
            .map(|s| {
                let family = self
                    .sub(s)
                    .map(|sub| sub.family().to_string())
                    .unwrap_or_else(|| s.clone());
                (family, s.clone())
            })
            .collect();
        indexed.sort_by(|a, b| a.0.cmp(&b.0));
        indexed.into_iter().map(|(_, s)| s).collect()
    }
}
