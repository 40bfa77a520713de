//! Per-compilation-unit state for the text reader: identifier name maps,
//! the label stack, and the function-type map that numbers deferred type
//! uses.

use std::collections::HashMap;

use crate::error::Errors;
use crate::features::Features;
use crate::span::{At, OptAt};

use super::types::{BindVar, BoundFunctionType, FunctionType, TypeEntry, Var};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameMapKind {
    /// The oldest binding has the lowest index (functions, types, ...).
    #[default]
    Forward,
    /// The most recent binding has index 0 (labels).
    Reverse,
}

/// Identifier-to-index map. An unbound entry still advances the counter,
/// so the nth declared item receives index n whether or not it is named.
#[derive(Debug, Default)]
pub struct NameMap {
    map: HashMap<BindVar, u32>,
    next_index: u32,
    kind: NameMapKind,
}

impl NameMap {
    pub fn new(kind: NameMapKind) -> Self {
        Self {
            map: HashMap::new(),
            next_index: 0,
            kind,
        }
    }

    pub fn reset(&mut self) {
        self.map.clear();
        self.next_index = 0;
    }

    pub fn new_unbound(&mut self) {
        self.next_index += 1;
    }

    /// Binds `name` to the next index. On a duplicate the first binding
    /// wins and the new item is treated as unbound; returns `false` so
    /// the caller can report it.
    pub fn new_bound(&mut self, name: BindVar) -> bool {
        if self.map.contains_key(&name) {
            self.next_index += 1;
            return false;
        }
        self.map.insert(name, self.next_index);
        self.next_index += 1;
        true
    }

    /// Binds `name`, shadowing any existing binding (labels).
    pub fn replace_bound(&mut self, name: BindVar) {
        self.map.insert(name, self.next_index);
        self.next_index += 1;
    }

    pub fn new_opt(&mut self, name: Option<BindVar>) -> bool {
        match name {
            Some(name) => self.new_bound(name),
            None => {
                self.new_unbound();
                true
            }
        }
    }

    /// Removes the most recent binding slot (labels on block end).
    pub fn delete(&mut self, name: Option<&BindVar>) {
        if let Some(name) = name {
            self.map.remove(name);
        }
        self.next_index -= 1;
    }

    pub fn has(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        let order = *self.map.get(name)?;
        Some(match self.kind {
            NameMapKind::Forward => order,
            NameMapKind::Reverse => self.next_index - 1 - order,
        })
    }

    pub fn size(&self) -> u32 {
        self.next_index
    }
}

pub type LabelNameStack = Vec<Option<At<BindVar>>>;

/// Records function types defined by the module and function types used
/// by imports, blocks, `call_indirect`, and function declarations. Uses
/// that match no explicit definition become deferred type entries,
/// numbered after the explicit ones in first-use order.
#[derive(Debug, Default)]
pub struct FunctionTypeMap {
    list: Vec<FunctionType>,
    deferred: Vec<FunctionType>,
}

impl FunctionTypeMap {
    pub fn begin_module(&mut self) {
        self.list.clear();
        self.deferred.clear();
    }

    pub fn define(&mut self, ty: &BoundFunctionType) {
        self.list.push(ty.to_unbound());
    }

    /// Records a use. Only an inline-only use (no `(type ...)`) can
    /// create a deferred entry.
    pub fn use_type(&mut self, type_use: &OptAt<Var>, ty: &BoundFunctionType) {
        if type_use.is_some() {
            return;
        }
        let unbound = ty.to_unbound();
        if self.find(&unbound).is_none() {
            self.deferred.push(unbound);
        }
    }

    /// Structural lookup (parameter names already discarded).
    pub fn find(&self, ty: &FunctionType) -> Option<u32> {
        if let Some(pos) = self.list.iter().position(|t| t == ty) {
            return Some(pos as u32);
        }
        self.deferred
            .iter()
            .position(|t| t == ty)
            .map(|pos| (self.list.len() + pos) as u32)
    }

    pub fn get(&self, index: u32) -> Option<&FunctionType> {
        let index = index as usize;
        self.list
            .get(index)
            .or_else(|| self.deferred.get(index - self.list.len().min(index)))
    }

    pub fn size(&self) -> u32 {
        (self.list.len() + self.deferred.len()) as u32
    }

    /// Emits the deferred entries and merges them into the explicit list.
    pub fn end_module(&mut self) -> Vec<At<TypeEntry>> {
        let deferred = std::mem::take(&mut self.deferred);
        let entries = deferred
            .iter()
            .map(|ty| {
                At::synthetic(TypeEntry {
                    bind_var: None,
                    ty: At::synthetic(BoundFunctionType {
                        params: ty
                            .params
                            .iter()
                            .map(|p| {
                                At::synthetic(super::types::BoundValueType {
                                    name: None,
                                    value_type: p.clone(),
                                })
                            })
                            .collect(),
                        results: ty.results.clone(),
                    }),
                })
            })
            .collect();
        self.list.extend(deferred);
        entries
    }
}

/// All the state the text reader carries through one compilation unit.
/// Reset between modules within a script.
#[derive(Debug, Default)]
pub struct ReadCtx {
    pub features: Features,
    pub errors: Errors,

    // Script context.
    pub module_names: NameMap,

    // Module context.
    pub seen_non_import: bool,
    pub seen_start: bool,
    pub type_names: NameMap,
    pub function_names: NameMap,
    pub table_names: NameMap,
    pub memory_names: NameMap,
    pub global_names: NameMap,
    pub event_names: NameMap,
    pub element_segment_names: NameMap,
    pub data_segment_names: NameMap,
    pub function_type_map: FunctionTypeMap,

    // Function context.
    pub local_names: NameMap,
    pub label_names: NameMap,
    pub label_name_stack: LabelNameStack,
}

impl ReadCtx {
    pub fn new(features: Features) -> Self {
        Self {
            features,
            label_names: NameMap::new(NameMapKind::Reverse),
            ..Self::default()
        }
    }

    pub fn begin_module(&mut self) {
        self.seen_non_import = false;
        self.seen_start = false;
        self.type_names.reset();
        self.function_names.reset();
        self.table_names.reset();
        self.memory_names.reset();
        self.global_names.reset();
        self.event_names.reset();
        self.element_segment_names.reset();
        self.data_segment_names.reset();
        self.function_type_map.begin_module();
        self.begin_function();
    }

    pub fn begin_function(&mut self) {
        self.local_names.reset();
        self.label_names.reset();
        self.label_name_stack.clear();
    }

    pub fn begin_block(&mut self, label: Option<At<BindVar>>) {
        match &label {
            Some(name) => self.label_names.replace_bound(name.value.clone()),
            None => self.label_names.new_unbound(),
        }
        self.label_name_stack.push(label);
    }

    pub fn end_block(&mut self) {
        if let Some(label) = self.label_name_stack.pop() {
            self.label_names
                .delete(label.as_ref().map(|at| &at.value));
        }
    }

    pub fn end_module(&mut self) -> Vec<At<TypeEntry>> {
        self.function_type_map.end_module()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::At;

    #[test]
    fn unbound_items_still_advance_indices() {
        let mut map = NameMap::default();
        map.new_unbound();
        assert!(map.new_bound("$a".to_owned()));
        map.new_unbound();
        assert!(map.new_bound("$b".to_owned()));
        assert_eq!(map.get("$a"), Some(1));
        assert_eq!(map.get("$b"), Some(3));
        assert_eq!(map.get("$missing"), None);
        assert_eq!(map.size(), 4);
    }

    #[test]
    fn duplicate_binding_keeps_first() {
        let mut map = NameMap::default();
        assert!(map.new_bound("$a".to_owned()));
        assert!(!map.new_bound("$a".to_owned()));
        // The first binding survives; the duplicate consumed an index.
        assert_eq!(map.get("$a"), Some(0));
        assert_eq!(map.size(), 2);
    }

    #[test]
    fn reverse_map_puts_innermost_at_zero() {
        let mut labels = NameMap::new(NameMapKind::Reverse);
        labels.replace_bound("$outer".to_owned());
        labels.replace_bound("$inner".to_owned());
        assert_eq!(labels.get("$inner"), Some(0));
        assert_eq!(labels.get("$outer"), Some(1));
        labels.delete(Some(&"$inner".to_owned()));
        assert_eq!(labels.get("$outer"), Some(0));
    }

    #[test]
    fn label_stack_tracks_block_depth() {
        let mut ctx = ReadCtx::new(crate::features::Features::default());
        ctx.begin_block(Some(At::synthetic("$l".to_owned())));
        ctx.begin_block(None);
        assert_eq!(ctx.label_name_stack.len(), 2);
        assert_eq!(ctx.label_names.get("$l"), Some(1));
        ctx.end_block();
        assert_eq!(ctx.label_names.get("$l"), Some(0));
        ctx.end_block();
        assert!(ctx.label_name_stack.is_empty());
    }

    #[test]
    fn function_type_map_defers_unmatched_uses() {
        use super::super::types::*;

        let i32_ty = || At::synthetic(ValueType::Numeric(crate::types::NumericType::I32));
        let bound = |params: usize, results: usize| BoundFunctionType {
            params: (0..params)
                .map(|_| {
                    At::synthetic(BoundValueType {
                        name: None,
                        value_type: i32_ty(),
                    })
                })
                .collect(),
            results: (0..results).map(|_| i32_ty()).collect(),
        };

        let mut map = FunctionTypeMap::default();
        map.define(&bound(2, 1));
        // A use matching the explicit definition creates nothing.
        map.use_type(&None, &bound(2, 1));
        // A new shape defers.
        map.use_type(&None, &bound(1, 0));
        // Using the same shape twice defers only once.
        map.use_type(&None, &bound(1, 0));
        assert_eq!(map.find(&bound(2, 1).to_unbound()), Some(0));
        assert_eq!(map.find(&bound(1, 0).to_unbound()), Some(1));

        let entries = map.end_module();
        assert_eq!(entries.len(), 1);
        assert_eq!(map.size(), 2);
    }
}
