//! Binding of generic placeholders to concrete types, one map per call site, and
//! the per-function registry of instantiations that must be emitted.
//!
//! A binding map is only meaningful while lowering the instantiation it was built
//! for. The registry never hands the map of one instantiation to another.

use crate::language::types::{FunctionSig, Type};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use thiserror::Error;

pub type Specialization = BTreeMap<String, Type>;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SpecializeError {
    #[error("expected {expected} arguments, found {found}")]
    Arity { expected: usize, found: usize },
    #[error("type parameter `{key}` bound to both `{first}` and `{second}`")]
    Conflict { key: String, first: Type, second: Type },
    #[error("type parameter `{key}` has no binding")]
    Unbound { key: String },
}

/// Binds every placeholder of the declared parameter types to the matching argument
/// type. Repeated placeholders must agree.
pub fn specialize_call(sig: &FunctionSig, args: &[Type]) -> Result<Specialization, SpecializeError> {
    if sig.params.len() != args.len() {
        return Err(SpecializeError::Arity {
            expected: sig.params.len(),
            found: args.len(),
        });
    }
    let mut map = Specialization::new();
    for ((_, declared), actual) in sig.params.iter().zip(args) {
        bind(declared, actual, &mut map)?;
    }
    Ok(map)
}

fn bind(declared: &Type, actual: &Type, map: &mut Specialization) -> Result<(), SpecializeError> {
    match (declared, actual) {
        (Type::Generic(key), _) => match map.get(key) {
            Some(existing) if existing != actual => Err(SpecializeError::Conflict {
                key: key.clone(),
                first: existing.clone(),
                second: actual.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                map.insert(key.clone(), actual.clone());
                Ok(())
            }
        },
        (Type::List(declared), Type::List(actual)) => bind(declared, actual, map),
        _ => Ok(()),
    }
}

/// Substitutes through `map` and insists nothing generic is left.
pub fn resolve(ty: &Type, map: &Specialization) -> Result<Type, SpecializeError> {
    let resolved = ty.substitute(map);
    match first_placeholder(&resolved) {
        Some(key) => Err(SpecializeError::Unbound { key }),
        None => Ok(resolved),
    }
}

fn first_placeholder(ty: &Type) -> Option<String> {
    match ty {
        Type::Generic(key) => Some(key.clone()),
        Type::Union(members) => members.iter().find_map(first_placeholder),
        Type::List(element) => first_placeholder(element),
        _ => None,
    }
}

/// Concrete parameter and return types of `sig` under `map`.
pub fn instantiate(
    sig: &FunctionSig,
    map: &Specialization,
) -> Result<(Vec<Type>, Type), SpecializeError> {
    let params = sig
        .param_types()
        .map(|ty| resolve(ty, map))
        .collect::<Result<Vec<_>, _>>()?;
    let ret = resolve(&sig.ret, map)?;
    Ok((params, ret))
}

pub fn method_descriptor<'a>(params: impl IntoIterator<Item = &'a Type>, ret: &Type) -> String {
    let params: String = params.into_iter().map(Type::descriptor).collect();
    format!("({params}){}", ret.descriptor())
}

#[derive(Clone, Debug)]
pub struct GenericEntry {
    pub sig: Arc<FunctionSig>,
    pub instances: Vec<Specialization>,
    lowered: usize,
}

impl GenericEntry {
    fn new(sig: Arc<FunctionSig>) -> Self {
        Self {
            sig,
            instances: Vec::new(),
            lowered: 0,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.lowered < self.instances.len()
    }
}

/// Instantiations required so far, keyed by function name, in discovery order.
#[derive(Clone, Debug, Default)]
pub struct SpecializationTable {
    entries: HashMap<String, GenericEntry>,
    order: Vec<String>,
}

impl SpecializationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `map` for `sig` and returns its index; an equal map already recorded
    /// is reused.
    pub fn require(&mut self, sig: &Arc<FunctionSig>, map: Specialization) -> (usize, bool) {
        if !self.entries.contains_key(&sig.name) {
            self.order.push(sig.name.clone());
        }
        let entry = self
            .entries
            .entry(sig.name.clone())
            .or_insert_with(|| GenericEntry::new(sig.clone()));
        if let Some(index) = entry.instances.iter().position(|known| known == &map) {
            return (index, false);
        }
        entry.instances.push(map);
        (entry.instances.len() - 1, true)
    }

    pub fn get(&self, name: &str) -> Option<&GenericEntry> {
        self.entries.get(name)
    }

    pub fn instances(&self, name: &str) -> &[Specialization] {
        self.entries
            .get(name)
            .map(|entry| entry.instances.as_slice())
            .unwrap_or(&[])
    }

    /// Instantiations of `name` not handed out yet; marks them handed out.
    pub fn take_pending(&mut self, name: &str) -> Vec<Specialization> {
        match self.entries.get_mut(name) {
            Some(entry) => {
                let pending = entry.instances[entry.lowered..].to_vec();
                entry.lowered = entry.instances.len();
                pending
            }
            None => Vec::new(),
        }
    }

    pub fn pending_functions(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| self.entries.get(*name).is_some_and(GenericEntry::has_pending))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|entry| entry.instances.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
