//! Text AST to binary AST lowering.
//!
//! Resolves every symbolic variable through the reader's name maps,
//! numbers deferred function types, lowers block types and memargs,
//! run-length-encodes locals, and desugars inline imports, exports, and
//! segments into their top-level binary forms.

use crate::binary::types as binary;
use crate::error::ErrorKind;
use crate::opcode::Opcode;
use crate::span::{At, OptAt};
use crate::text::context::{NameMap, ReadCtx};
use crate::text::types as text;
use crate::types::{ExternalKind, Index, SegmentType};

pub struct Converter<'a> {
    ctx: &'a mut ReadCtx,
    // Per-function state.
    labels: Vec<Option<String>>,
    local_frames: Vec<Vec<Option<String>>>,
    // Index counters for inline-export desugaring.
    next_function: Index,
    next_table: Index,
    next_memory: Index,
    next_global: Index,
    next_event: Index,
}

impl<'a> Converter<'a> {
    pub fn new(ctx: &'a mut ReadCtx) -> Self {
        Self {
            ctx,
            labels: Vec::new(),
            local_frames: Vec::new(),
            next_function: 0,
            next_table: 0,
            next_memory: 0,
            next_global: 0,
            next_event: 0,
        }
    }

    fn undefined(&mut self, var: &At<text::Var>) -> At<Index> {
        let name = match &var.value {
            text::Var::Name(name) => name.clone(),
            text::Var::Index(index) => index.to_string(),
        };
        self.ctx.errors.report(
            var.loc,
            ErrorKind::UndefinedIdentifier,
            format!("undefined identifier {name}"),
        );
        At::synthetic(0)
    }

    fn resolve_with(map: &NameMap, var: &At<text::Var>) -> Option<At<Index>> {
        match &var.value {
            text::Var::Index(index) => Some(At { value: *index, loc: var.loc }),
            text::Var::Name(name) => map.get(name).map(|index| At {
                value: index,
                loc: var.loc,
            }),
        }
    }

    fn resolve_function(&mut self, var: &At<text::Var>) -> At<Index> {
        Self::resolve_with(&self.ctx.function_names, var).unwrap_or_else(|| self.undefined(var))
    }

    fn resolve_table(&mut self, var: &At<text::Var>) -> At<Index> {
        Self::resolve_with(&self.ctx.table_names, var).unwrap_or_else(|| self.undefined(var))
    }

    fn resolve_memory(&mut self, var: &At<text::Var>) -> At<Index> {
        Self::resolve_with(&self.ctx.memory_names, var).unwrap_or_else(|| self.undefined(var))
    }

    fn resolve_global(&mut self, var: &At<text::Var>) -> At<Index> {
        Self::resolve_with(&self.ctx.global_names, var).unwrap_or_else(|| self.undefined(var))
    }

    fn resolve_event(&mut self, var: &At<text::Var>) -> At<Index> {
        Self::resolve_with(&self.ctx.event_names, var).unwrap_or_else(|| self.undefined(var))
    }

    fn resolve_type(&mut self, var: &At<text::Var>) -> At<Index> {
        Self::resolve_with(&self.ctx.type_names, var).unwrap_or_else(|| self.undefined(var))
    }

    fn resolve_elem_segment(&mut self, var: &At<text::Var>) -> At<Index> {
        Self::resolve_with(&self.ctx.element_segment_names, var)
            .unwrap_or_else(|| self.undefined(var))
    }

    fn resolve_data_segment(&mut self, var: &At<text::Var>) -> At<Index> {
        Self::resolve_with(&self.ctx.data_segment_names, var)
            .unwrap_or_else(|| self.undefined(var))
    }

    fn resolve_opt(
        &mut self,
        var: &OptAt<text::Var>,
        resolve: fn(&mut Self, &At<text::Var>) -> At<Index>,
    ) -> At<Index> {
        match var {
            Some(var) => resolve(self, var),
            None => At::synthetic(0),
        }
    }

    /// Labels resolve against the block nesting at the instruction's
    /// position: depth 0 is the innermost enclosing block.
    fn resolve_label(&mut self, var: &At<text::Var>) -> At<Index> {
        match &var.value {
            text::Var::Index(index) => At {
                value: *index,
                loc: var.loc,
            },
            text::Var::Name(name) => {
                let found = self
                    .labels
                    .iter()
                    .rev()
                    .position(|label| label.as_deref() == Some(name.as_str()));
                match found {
                    Some(depth) => At {
                        value: depth as u32,
                        loc: var.loc,
                    },
                    None => self.undefined(var),
                }
            }
        }
    }

    fn resolve_local(&mut self, var: &At<text::Var>) -> At<Index> {
        match &var.value {
            text::Var::Index(index) => At {
                value: *index,
                loc: var.loc,
            },
            text::Var::Name(name) => {
                let mut shift = 0u32;
                for frame in self.local_frames.iter().rev() {
                    if let Some(pos) = frame
                        .iter()
                        .position(|local| local.as_deref() == Some(name.as_str()))
                    {
                        return At {
                            value: pos as u32 + shift,
                            loc: var.loc,
                        };
                    }
                    shift += frame.len() as u32;
                }
                self.undefined(var)
            }
        }
    }

    // --- Types ---

    fn heap_type(&mut self, heap_type: &At<text::HeapType>) -> At<binary::HeapType> {
        let value = match &heap_type.value {
            text::HeapType::Kind(kind) => binary::HeapType::Kind(*kind),
            text::HeapType::Var(var) => binary::HeapType::Index(self.resolve_type(var)),
        };
        At {
            value,
            loc: heap_type.loc,
        }
    }

    fn reference_type(&mut self, reference: &At<text::ReferenceType>) -> At<binary::ReferenceType> {
        let value = match &reference.value {
            text::ReferenceType::Kind(kind) => binary::ReferenceType::Kind(*kind),
            text::ReferenceType::Ref(ref_type) => binary::ReferenceType::Ref(binary::RefType {
                heap_type: self.heap_type(&ref_type.heap_type),
                null: ref_type.null,
            }),
        };
        At {
            value,
            loc: reference.loc,
        }
    }

    fn value_type(&mut self, value_type: &At<text::ValueType>) -> At<binary::ValueType> {
        let value = match &value_type.value {
            text::ValueType::Numeric(numeric) => binary::ValueType::Numeric(*numeric),
            text::ValueType::Reference(reference) => binary::ValueType::Reference(
                self.reference_type(&At::synthetic(reference.clone())).value,
            ),
        };
        At {
            value,
            loc: value_type.loc,
        }
    }

    fn value_type_list(&mut self, list: &text::ValueTypeList) -> binary::ValueTypeList {
        list.iter().map(|ty| self.value_type(ty)).collect()
    }

    fn function_type(&mut self, ty: &text::FunctionType) -> binary::FunctionType {
        binary::FunctionType {
            param_types: self.value_type_list(&ty.params),
            result_types: self.value_type_list(&ty.results),
        }
    }

    fn type_entry(&mut self, entry: &At<text::TypeEntry>) -> At<binary::TypeEntry> {
        let unbound = entry.value.ty.value.to_unbound();
        At {
            value: binary::TypeEntry {
                ty: At::synthetic(self.function_type(&unbound)),
            },
            loc: entry.loc,
        }
    }

    /// Numbers a function type use: an explicit `(type ...)` resolves
    /// directly; an inline-only use finds its (possibly deferred) entry.
    fn type_use_index(&mut self, use_: &text::FunctionTypeUse) -> At<Index> {
        if let Some(var) = &use_.type_use {
            return self.resolve_type(var);
        }
        let unbound = text::FunctionType {
            params: use_.ty.value.params.clone(),
            results: use_.ty.value.results.clone(),
        };
        match self.ctx.function_type_map.find(&unbound) {
            Some(index) => At::synthetic(index),
            None => {
                self.ctx.errors.report(
                    use_.ty.loc,
                    ErrorKind::UndefinedIdentifier,
                    "function type was not recorded",
                );
                At::synthetic(0)
            }
        }
    }

    /// Void and bare single results use the compact encodings; everything
    /// else is a type index (multi-value).
    fn block_type(&mut self, block: &text::BlockImmediate) -> At<binary::BlockType> {
        let ty = &block.ty.ty.value;
        if block.ty.type_use.is_none() {
            if ty.params.is_empty() && ty.results.is_empty() {
                return At::synthetic(binary::BlockType::Void);
            }
            if ty.params.is_empty() && ty.results.len() == 1 {
                let value = self.value_type(&ty.results[0]);
                return At::synthetic(binary::BlockType::Value(value.value));
            }
        } else if ty.params.is_empty() && ty.results.is_empty() {
            // Only `(type $t)` was written; classify by the definition.
            let index = self.type_use_index(&block.ty);
            if let Some(defined) = self.ctx.function_type_map.get(index.value) {
                if defined.params.is_empty() && defined.results.is_empty() {
                    return At::synthetic(binary::BlockType::Void);
                }
                if defined.params.is_empty() && defined.results.len() == 1 {
                    let result = defined.results[0].clone();
                    let value = self.value_type(&result);
                    return At::synthetic(binary::BlockType::Value(value.value));
                }
            }
            return At::synthetic(binary::BlockType::Index(index.value));
        }
        let index = self.type_use_index(&block.ty);
        At::synthetic(binary::BlockType::Index(index.value))
    }

    fn locals(&mut self, list: &text::BoundValueTypeList) -> binary::LocalsList {
        let mut out = binary::LocalsList::new();
        for local in list {
            let value_type = self.value_type(&local.value.value_type);
            match out.last_mut() {
                Some(last) if last.value.value_type == value_type => {
                    last.value.count.value += 1;
                }
                _ => out.push(At::synthetic(binary::Locals {
                    count: At::synthetic(1),
                    value_type,
                })),
            }
        }
        out
    }

    // --- Instructions ---

    fn memarg(
        &mut self,
        opcode: Opcode,
        memarg: &text::MemArgImmediate,
    ) -> binary::MemArgImmediate {
        let natural = opcode.natural_align_log2().unwrap_or(0);
        let align_log2 = match &memarg.align {
            Some(align) => At {
                value: align.value.trailing_zeros(),
                loc: align.loc,
            },
            None => At::synthetic(natural),
        };
        let offset = match &memarg.offset {
            Some(offset) => *offset,
            None => At::synthetic(0),
        };
        binary::MemArgImmediate { align_log2, offset }
    }

    fn constant_expression(
        &mut self,
        expr: &At<text::ConstantExpression>,
    ) -> At<binary::ConstantExpression> {
        At {
            value: binary::ConstantExpression {
                instructions: self.instruction_list(&expr.value.instructions),
            },
            loc: expr.loc,
        }
    }

    fn element_expression(
        &mut self,
        expr: &At<text::ElementExpression>,
    ) -> At<binary::ElementExpression> {
        At {
            value: binary::ElementExpression {
                instructions: self.instruction_list(&expr.instructions),
            },
            loc: expr.loc,
        }
    }

    fn instruction(&mut self, instr: &At<text::Instruction>) -> At<binary::Instruction> {
        let opcode = instr.value.opcode;
        let immediate = match &instr.value.immediate {
            text::Immediate::None => match opcode.value {
                // Implicit in the text format, explicit on the wire.
                Opcode::MemorySize
                | Opcode::MemoryGrow
                | Opcode::MemoryFill
                | Opcode::AtomicFence => binary::Immediate::Index(At::synthetic(0)),
                _ => binary::Immediate::None,
            },
            text::Immediate::S32(v) => binary::Immediate::S32(*v),
            text::Immediate::S64(v) => binary::Immediate::S64(*v),
            text::Immediate::F32(v) => binary::Immediate::F32(*v),
            text::Immediate::F64(v) => binary::Immediate::F64(*v),
            text::Immediate::V128(v) => binary::Immediate::V128(*v),
            text::Immediate::Var(var) => {
                let index = match opcode.value {
                    Opcode::Br | Opcode::BrIf | Opcode::BrOnNull => self.resolve_label(var),
                    Opcode::LocalGet | Opcode::LocalSet | Opcode::LocalTee => {
                        self.resolve_local(var)
                    }
                    Opcode::GlobalGet | Opcode::GlobalSet => self.resolve_global(var),
                    Opcode::Call | Opcode::ReturnCall | Opcode::RefFunc => {
                        self.resolve_function(var)
                    }
                    Opcode::Throw => self.resolve_event(var),
                    Opcode::TableGet
                    | Opcode::TableSet
                    | Opcode::TableGrow
                    | Opcode::TableSize
                    | Opcode::TableFill => self.resolve_table(var),
                    Opcode::DataDrop => self.resolve_data_segment(var),
                    Opcode::ElemDrop => self.resolve_elem_segment(var),
                    _ => self.resolve_function(var),
                };
                binary::Immediate::Index(index)
            }
            text::Immediate::Block(block) => {
                let block_type = self.block_type(&block.value);
                self.labels
                    .push(block.value.label.as_ref().map(|l| l.value.clone()));
                binary::Immediate::BlockType(block_type)
            }
            text::Immediate::BrOnExn(imm) => binary::Immediate::BrOnExn(At {
                value: binary::BrOnExnImmediate {
                    target: self.resolve_label(&imm.value.target),
                    event_index: self.resolve_event(&imm.value.event),
                },
                loc: imm.loc,
            }),
            text::Immediate::BrTable(imm) => binary::Immediate::BrTable(At {
                value: binary::BrTableImmediate {
                    targets: imm
                        .value
                        .targets
                        .iter()
                        .map(|target| self.resolve_label(target))
                        .collect(),
                    default_target: self.resolve_label(&imm.value.default_target),
                },
                loc: imm.loc,
            }),
            text::Immediate::CallIndirect(imm) => {
                let type_index = self.type_use_index(&imm.value.ty);
                if opcode.value == Opcode::FuncBind {
                    binary::Immediate::Index(type_index)
                } else {
                    binary::Immediate::CallIndirect(At {
                        value: binary::CallIndirectImmediate {
                            type_index,
                            table_index: self.resolve_opt(&imm.value.table, Self::resolve_table),
                        },
                        loc: imm.loc,
                    })
                }
            }
            text::Immediate::Copy(imm) => {
                let resolve = if opcode.value == Opcode::TableCopy {
                    Self::resolve_table
                } else {
                    Self::resolve_memory
                };
                binary::Immediate::Copy(At {
                    value: binary::CopyImmediate {
                        dst_index: self.resolve_opt(&imm.value.dst, resolve),
                        src_index: self.resolve_opt(&imm.value.src, resolve),
                    },
                    loc: imm.loc,
                })
            }
            text::Immediate::Init(imm) => {
                let (segment, dst) = if opcode.value == Opcode::TableInit {
                    (
                        self.resolve_elem_segment(&imm.value.segment),
                        self.resolve_opt(&imm.value.dst, Self::resolve_table),
                    )
                } else {
                    (
                        self.resolve_data_segment(&imm.value.segment),
                        self.resolve_opt(&imm.value.dst, Self::resolve_memory),
                    )
                };
                binary::Immediate::Init(At {
                    value: binary::InitImmediate {
                        segment_index: segment,
                        dst_index: dst,
                    },
                    loc: imm.loc,
                })
            }
            text::Immediate::Let(imm) => {
                let block_type = self.block_type(&imm.value.block);
                self.labels
                    .push(imm.value.block.label.as_ref().map(|l| l.value.clone()));
                self.local_frames.push(
                    imm.value
                        .locals
                        .iter()
                        .map(|local| local.value.name.as_ref().map(|n| n.value.clone()))
                        .collect(),
                );
                binary::Immediate::Let(At {
                    value: binary::LetImmediate {
                        block_type,
                        locals: self.locals(&imm.value.locals),
                    },
                    loc: imm.loc,
                })
            }
            text::Immediate::MemArg(imm) => {
                binary::Immediate::MemArg(At {
                    value: self.memarg(opcode.value, &imm.value),
                    loc: imm.loc,
                })
            }
            text::Immediate::HeapType(heap_type) => {
                binary::Immediate::HeapType(self.heap_type(heap_type))
            }
            text::Immediate::Select(types) => binary::Immediate::Select(At {
                value: self.value_type_list(&types.value),
                loc: types.loc,
            }),
            text::Immediate::Shuffle(lanes) => binary::Immediate::Shuffle(*lanes),
            text::Immediate::SimdLane(lane) => binary::Immediate::SimdLane(*lane),
        };

        if opcode.value == Opcode::End {
            self.labels.pop();
        }

        At {
            value: binary::Instruction {
                opcode,
                immediate,
            },
            loc: instr.loc,
        }
    }

    fn instruction_list(&mut self, list: &text::InstructionList) -> binary::InstructionList {
        let mut lets_open: Vec<usize> = Vec::new();
        let mut out = binary::InstructionList::with_capacity(list.len());
        for instr in list {
            match instr.value.opcode.value {
                Opcode::Let => lets_open.push(self.labels.len()),
                Opcode::End => {
                    if lets_open.last() == Some(&(self.labels.len().saturating_sub(1))) {
                        lets_open.pop();
                        self.local_frames.pop();
                    }
                }
                _ => {}
            }
            out.push(self.instruction(instr));
        }
        out
    }

    // --- Items ---

    fn inline_exports(
        &mut self,
        exports: &text::InlineExportList,
        kind: ExternalKind,
        index: Index,
        out: &mut binary::Module,
    ) {
        for export in exports {
            out.exports.push(At {
                value: binary::Export {
                    kind: At::synthetic(kind),
                    name: self.text_string(&export.value.name),
                    index: At::synthetic(index),
                },
                loc: export.loc,
            });
        }
    }

    fn text_string(&mut self, text: &At<text::Text>) -> At<String> {
        let value = match text.value.as_str() {
            Some(s) => s.to_owned(),
            None => {
                self.ctx
                    .errors
                    .report_kind(text.loc, ErrorKind::InvalidUtf8);
                String::new()
            }
        };
        At {
            value,
            loc: text.loc,
        }
    }

    fn function_desc_type_index(&mut self, desc: &text::FunctionDesc) -> At<Index> {
        let use_ = text::FunctionTypeUse {
            type_use: desc.type_use.clone(),
            ty: At::synthetic(desc.ty.value.to_unbound()),
        };
        self.type_use_index(&use_)
    }

    fn begin_code(&mut self, function: &text::Function) {
        self.labels.clear();
        self.local_frames.clear();
        let mut base = Vec::new();
        for param in &function.desc.ty.value.params {
            base.push(param.value.name.as_ref().map(|n| n.value.clone()));
        }
        for local in &function.locals {
            base.push(local.value.name.as_ref().map(|n| n.value.clone()));
        }
        self.local_frames.push(base);
    }

    fn table_type(&mut self, ty: &At<text::TableType>) -> At<binary::TableType> {
        At {
            value: binary::TableType {
                limits: ty.value.limits.clone(),
                elemtype: self.reference_type(&ty.value.elemtype),
            },
            loc: ty.loc,
        }
    }

    fn memory_type(&mut self, ty: &At<text::MemoryType>) -> At<binary::MemoryType> {
        At {
            value: binary::MemoryType {
                limits: ty.value.limits.clone(),
            },
            loc: ty.loc,
        }
    }

    fn global_type(&mut self, ty: &At<text::GlobalType>) -> At<binary::GlobalType> {
        At {
            value: binary::GlobalType {
                valtype: self.value_type(&ty.value.valtype),
                mutability: ty.value.mutability,
            },
            loc: ty.loc,
        }
    }

    fn event_type(&mut self, ty: &At<text::EventType>) -> At<binary::EventType> {
        At {
            value: binary::EventType {
                attribute: ty
                    .value
                    .attribute
                    .unwrap_or_else(|| At::synthetic(crate::types::EventAttribute::Exception)),
                type_index: self.type_use_index(&ty.value.ty),
            },
            loc: ty.loc,
        }
    }

    fn element_list(&mut self, list: &text::ElementList) -> binary::ElementList {
        match list {
            text::ElementList::Vars(vars) => {
                binary::ElementList::Indexes(binary::ElementListWithIndexes {
                    kind: vars.kind,
                    list: vars
                        .list
                        .iter()
                        .map(|var| self.resolve_function(var))
                        .collect(),
                })
            }
            text::ElementList::Expressions(exprs) => {
                binary::ElementList::Expressions(binary::ElementListWithExpressions {
                    elemtype: self.reference_type(&exprs.elemtype),
                    list: exprs
                        .list
                        .iter()
                        .map(|expr| self.element_expression(expr))
                        .collect(),
                })
            }
        }
    }

    fn zero_offset() -> At<binary::ConstantExpression> {
        At::synthetic(binary::ConstantExpression::new(At::synthetic(
            binary::Instruction::with_immediate(
                At::synthetic(Opcode::I32Const),
                binary::Immediate::S32(At::synthetic(0)),
            ),
        )))
    }

    fn import_desc(&mut self, desc: &text::ImportDesc) -> binary::ImportDesc {
        match desc {
            text::ImportDesc::Function(desc) => {
                self.next_function += 1;
                binary::ImportDesc::Function(self.function_desc_type_index(desc))
            }
            text::ImportDesc::Table(desc) => {
                self.next_table += 1;
                binary::ImportDesc::Table(self.table_type(&desc.ty))
            }
            text::ImportDesc::Memory(desc) => {
                self.next_memory += 1;
                binary::ImportDesc::Memory(self.memory_type(&desc.ty))
            }
            text::ImportDesc::Global(desc) => {
                self.next_global += 1;
                binary::ImportDesc::Global(self.global_type(&desc.ty))
            }
            text::ImportDesc::Event(desc) => {
                self.next_event += 1;
                binary::ImportDesc::Event(self.event_type(&desc.ty))
            }
        }
    }

    fn inline_import(
        &mut self,
        import: &At<text::InlineImport>,
        desc: binary::ImportDesc,
        out: &mut binary::Module,
    ) {
        out.imports.push(At {
            value: binary::Import {
                module: self.text_string(&import.value.module),
                name: self.text_string(&import.value.name),
                desc,
            },
            loc: import.loc,
        });
    }

    /// Converts a whole module. The reader's context must still hold this
    /// module's name maps.
    pub fn convert_module(&mut self, module: &text::Module) -> binary::Module {
        let mut out = binary::Module::default();

        for item in module {
            match &item.value {
                text::ModuleItem::DefinedType(entry) => {
                    let converted = self.type_entry(entry);
                    out.types.push(converted);
                }
                text::ModuleItem::Import(import) => {
                    let desc = self.import_desc(&import.value.desc);
                    out.imports.push(At {
                        value: binary::Import {
                            module: self.text_string(&import.value.module),
                            name: self.text_string(&import.value.name),
                            desc,
                        },
                        loc: import.loc,
                    });
                }
                text::ModuleItem::Function(function) => {
                    let index = self.next_function;
                    self.next_function += 1;
                    let type_index = self.function_desc_type_index(&function.value.desc);
                    if let Some(import) = &function.value.import {
                        self.inline_import(
                            import,
                            binary::ImportDesc::Function(type_index),
                            &mut out,
                        );
                    } else {
                        out.functions.push(At {
                            value: binary::Function { type_index },
                            loc: item.loc,
                        });
                        self.begin_code(&function.value);
                        let body = self.instruction_list(&function.value.instructions);
                        out.codes.push(At {
                            value: binary::UnpackedCode {
                                locals: self.locals(&function.value.locals),
                                body,
                            },
                            loc: item.loc,
                        });
                    }
                    self.inline_exports(
                        &function.value.exports,
                        ExternalKind::Function,
                        index,
                        &mut out,
                    );
                }
                text::ModuleItem::Table(table) => {
                    let index = self.next_table;
                    self.next_table += 1;
                    let ty = self.table_type(&table.value.desc.ty);
                    if let Some(import) = &table.value.import {
                        self.inline_import(import, binary::ImportDesc::Table(ty), &mut out);
                    } else {
                        out.tables.push(At {
                            value: binary::Table { table_type: ty },
                            loc: item.loc,
                        });
                        if let Some(elements) = &table.value.elements {
                            // Inline segments become active segments at
                            // offset zero in the enclosing table.
                            let elements = self.element_list(elements);
                            out.element_segments.push(At::synthetic(
                                binary::ElementSegment::active(
                                    At::synthetic(index),
                                    Self::zero_offset(),
                                    elements,
                                ),
                            ));
                        }
                    }
                    self.inline_exports(
                        &table.value.exports,
                        ExternalKind::Table,
                        index,
                        &mut out,
                    );
                }
                text::ModuleItem::Memory(memory) => {
                    let index = self.next_memory;
                    self.next_memory += 1;
                    let ty = self.memory_type(&memory.value.desc.ty);
                    if let Some(import) = &memory.value.import {
                        self.inline_import(import, binary::ImportDesc::Memory(ty), &mut out);
                    } else {
                        out.memories.push(At {
                            value: binary::Memory { memory_type: ty },
                            loc: item.loc,
                        });
                        if let Some(data) = &memory.value.data {
                            let init = concat_texts(data);
                            out.data_segments.push(At::synthetic(
                                binary::DataSegment::active(
                                    At::synthetic(index),
                                    Self::zero_offset(),
                                    init,
                                ),
                            ));
                        }
                    }
                    self.inline_exports(
                        &memory.value.exports,
                        ExternalKind::Memory,
                        index,
                        &mut out,
                    );
                }
                text::ModuleItem::Global(global) => {
                    let index = self.next_global;
                    self.next_global += 1;
                    let ty = self.global_type(&global.value.desc.ty);
                    if let Some(import) = &global.value.import {
                        self.inline_import(import, binary::ImportDesc::Global(ty), &mut out);
                    } else {
                        let init = match &global.value.init {
                            Some(init) => self.constant_expression(init),
                            None => Self::zero_offset(),
                        };
                        out.globals.push(At {
                            value: binary::Global {
                                global_type: ty,
                                init,
                            },
                            loc: item.loc,
                        });
                    }
                    self.inline_exports(
                        &global.value.exports,
                        ExternalKind::Global,
                        index,
                        &mut out,
                    );
                }
                text::ModuleItem::Event(event) => {
                    let index = self.next_event;
                    self.next_event += 1;
                    let ty = self.event_type(&event.value.desc.ty);
                    if let Some(import) = &event.value.import {
                        self.inline_import(import, binary::ImportDesc::Event(ty), &mut out);
                    } else {
                        out.events.push(At {
                            value: binary::Event { event_type: ty },
                            loc: item.loc,
                        });
                    }
                    self.inline_exports(
                        &event.value.exports,
                        ExternalKind::Event,
                        index,
                        &mut out,
                    );
                }
                text::ModuleItem::Export(export) => {
                    let index = match export.value.kind.value {
                        ExternalKind::Function => self.resolve_function(&export.value.var),
                        ExternalKind::Table => self.resolve_table(&export.value.var),
                        ExternalKind::Memory => self.resolve_memory(&export.value.var),
                        ExternalKind::Global => self.resolve_global(&export.value.var),
                        ExternalKind::Event => self.resolve_event(&export.value.var),
                    };
                    let name = self.text_string(&export.value.name);
                    out.exports.push(At {
                        value: binary::Export {
                            kind: export.value.kind,
                            name,
                            index,
                        },
                        loc: export.loc,
                    });
                }
                text::ModuleItem::Start(start) => {
                    let func_index = self.resolve_function(&start.value.var);
                    out.start = Some(At {
                        value: binary::Start { func_index },
                        loc: start.loc,
                    });
                }
                text::ModuleItem::ElementSegment(segment) => {
                    let converted = self.element_segment(segment);
                    out.element_segments.push(converted);
                }
                text::ModuleItem::DataSegment(segment) => {
                    let converted = self.data_segment(segment);
                    out.data_segments.push(converted);
                }
            }
        }

        // Deferred function types, in first-use order.
        for entry in self.ctx.end_module() {
            let converted = self.type_entry(&entry);
            out.types.push(converted);
        }

        if out
            .data_segments
            .iter()
            .any(|segment| segment.value.segment_type == SegmentType::Passive)
        {
            out.data_count = Some(At::synthetic(binary::DataCount {
                count: At::synthetic(out.data_segments.len() as u32),
            }));
        }

        out
    }

    fn element_segment(&mut self, segment: &At<text::ElementSegment>) -> At<binary::ElementSegment> {
        let value = &segment.value;
        let table_index = match value.segment_type {
            SegmentType::Active => Some(self.resolve_opt(&value.table_use, Self::resolve_table)),
            _ => None,
        };
        let offset = value
            .offset
            .as_ref()
            .map(|offset| self.constant_expression(offset));
        At {
            value: binary::ElementSegment {
                segment_type: value.segment_type,
                table_index,
                offset,
                elements: self.element_list(&value.elements),
            },
            loc: segment.loc,
        }
    }

    fn data_segment(&mut self, segment: &At<text::DataSegment>) -> At<binary::DataSegment> {
        let value = &segment.value;
        let memory_index = match value.segment_type {
            SegmentType::Active => Some(self.resolve_opt(&value.memory_use, Self::resolve_memory)),
            _ => None,
        };
        let offset = value
            .offset
            .as_ref()
            .map(|offset| self.constant_expression(offset));
        At {
            value: binary::DataSegment {
                segment_type: value.segment_type,
                memory_index,
                offset,
                init: concat_texts(&value.data),
            },
            loc: segment.loc,
        }
    }
}

fn concat_texts(list: &text::TextList) -> Vec<u8> {
    let mut out = Vec::new();
    for text in list {
        out.extend_from_slice(&text.value.bytes);
    }
    out
}

/// Convenience wrapper: convert a freshly-read module.
pub fn to_binary(module: &text::Module, ctx: &mut ReadCtx) -> binary::Module {
    Converter::new(ctx).convert_module(module)
}
