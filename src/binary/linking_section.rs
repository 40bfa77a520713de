//! The "linking" and "reloc.*" custom-section sub-formats used by
//! toolchains that emit relocatable modules.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

use crate::error::ErrorKind;
use crate::span::At;
use crate::types::Index;

use super::read::ReadCtx;
use super::reader::Reader;

pub const LINKING_VERSION: u32 = 2;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum LinkingSubsectionId {
    SegmentInfo = 5,
    InitFunctions = 6,
    ComdatInfo = 7,
    SymbolTable = 8,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum SymbolInfoKind {
    Function = 0,
    Data = 1,
    Global = 2,
    Section = 3,
    Event = 4,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum ComdatSymbolKind {
    Data = 0,
    Function = 1,
    Global = 2,
    Event = 3,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum RelocationType {
    FunctionIndexLeb = 0,
    TableIndexSleb = 1,
    TableIndexI32 = 2,
    MemoryAddressLeb = 3,
    MemoryAddressSleb = 4,
    MemoryAddressI32 = 5,
    TypeIndexLeb = 6,
    GlobalIndexLeb = 7,
    FunctionOffsetI32 = 8,
    SectionOffsetI32 = 9,
    EventIndexLeb = 10,
}

impl RelocationType {
    pub fn has_addend(self) -> bool {
        matches!(
            self,
            RelocationType::MemoryAddressLeb
                | RelocationType::MemoryAddressSleb
                | RelocationType::MemoryAddressI32
                | RelocationType::FunctionOffsetI32
                | RelocationType::SectionOffsetI32
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelocationEntry {
    pub ty: At<RelocationType>,
    pub offset: At<u32>,
    pub index: At<Index>,
    pub addend: Option<At<i32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelocationSection {
    /// Index of the section the relocations apply to.
    pub section_index: At<Index>,
    pub entries: Vec<At<RelocationEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    pub name: At<String>,
    pub align_log2: At<u32>,
    pub flags: At<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InitFunction {
    pub priority: At<u32>,
    /// Symbol index, not a function index.
    pub index: At<Index>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComdatSymbol {
    pub kind: At<ComdatSymbolKind>,
    pub index: At<Index>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comdat {
    pub name: At<String>,
    pub flags: At<u32>,
    pub symbols: Vec<At<ComdatSymbol>>,
}

pub mod symbol_info_flags {
    pub const BINDING_WEAK: u32 = 0x01;
    pub const BINDING_LOCAL: u32 = 0x02;
    pub const BINDING_MASK: u32 = 0x03;
    pub const VISIBILITY_HIDDEN: u32 = 0x04;
    pub const UNDEFINED: u32 = 0x10;
    pub const EXPLICIT_NAME: u32 = 0x40;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SymbolBinding {
    Global,
    Weak,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SymbolInfoFlags {
    pub binding: SymbolBinding,
    pub hidden: bool,
    pub undefined: bool,
    pub explicit_name: bool,
}

impl SymbolInfoFlags {
    pub fn decode(raw: u32) -> Option<Self> {
        use symbol_info_flags::*;
        let binding = match raw & BINDING_MASK {
            0 => SymbolBinding::Global,
            BINDING_WEAK => SymbolBinding::Weak,
            BINDING_LOCAL => SymbolBinding::Local,
            _ => return None,
        };
        Some(Self {
            binding,
            hidden: raw & VISIBILITY_HIDDEN != 0,
            undefined: raw & UNDEFINED != 0,
            explicit_name: raw & EXPLICIT_NAME != 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SymbolInfoDesc {
    /// Function, global and event symbols.
    Base {
        kind: SymbolInfoKind,
        index: At<Index>,
        name: Option<At<String>>,
    },
    Data {
        name: At<String>,
        defined: Option<DataSymbolDefined>,
    },
    Section {
        section: At<u32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataSymbolDefined {
    pub index: At<Index>,
    pub offset: At<u32>,
    pub size: At<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolInfo {
    pub flags: SymbolInfoFlags,
    pub desc: SymbolInfoDesc,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkingSectionContents {
    pub segment_infos: Vec<At<SegmentInfo>>,
    pub init_functions: Vec<At<InitFunction>>,
    pub comdats: Vec<At<Comdat>>,
    pub symbols: Vec<At<SymbolInfo>>,
}

fn read_segment_info(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<SegmentInfo>> {
    let start = r.offset();
    let name = r.read_string(&mut ctx.errors)?;
    let align_log2 = r.read_u32_leb(&mut ctx.errors)?;
    let flags = r.read_u32_leb(&mut ctx.errors)?;
    Some(At::new(
        r.loc_from(start),
        SegmentInfo {
            name,
            align_log2,
            flags,
        },
    ))
}

fn read_init_function(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<InitFunction>> {
    let start = r.offset();
    let priority = r.read_u32_leb(&mut ctx.errors)?;
    let index = r.read_index(&mut ctx.errors)?;
    Some(At::new(r.loc_from(start), InitFunction { priority, index }))
}

fn read_comdat(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<Comdat>> {
    let start = r.offset();
    let name = r.read_string(&mut ctx.errors)?;
    let flags = r.read_u32_leb(&mut ctx.errors)?;
    let count = r.read_count(&mut ctx.errors)?;
    let mut symbols = Vec::with_capacity(count.value as usize);
    for _ in 0..count.value {
        let sym_start = r.offset();
        let kind_byte = r.read_u8(&mut ctx.errors)?;
        let kind = match ComdatSymbolKind::try_from(kind_byte.value) {
            Ok(kind) => At::new(kind_byte.loc.unwrap(), kind),
            Err(_) => {
                ctx.errors.report(
                    kind_byte.loc,
                    ErrorKind::InvalidFlags,
                    format!("invalid comdat symbol kind: {}", kind_byte.value),
                );
                return None;
            }
        };
        let index = r.read_index(&mut ctx.errors)?;
        symbols.push(At::new(r.loc_from(sym_start), ComdatSymbol { kind, index }));
    }
    Some(At::new(
        r.loc_from(start),
        Comdat {
            name,
            flags,
            symbols,
        },
    ))
}

fn read_symbol_info(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<SymbolInfo>> {
    let start = r.offset();
    let kind_byte = r.read_u8(&mut ctx.errors)?;
    let kind = match SymbolInfoKind::try_from(kind_byte.value) {
        Ok(kind) => kind,
        Err(_) => {
            ctx.errors.report(
                kind_byte.loc,
                ErrorKind::InvalidFlags,
                format!("invalid symbol kind: {}", kind_byte.value),
            );
            return None;
        }
    };
    let flags_raw = r.read_u32_leb(&mut ctx.errors)?;
    let flags = match SymbolInfoFlags::decode(flags_raw.value) {
        Some(flags) => flags,
        None => {
            ctx.errors.report(
                flags_raw.loc,
                ErrorKind::InvalidFlags,
                format!("invalid symbol flags: {:#x}", flags_raw.value),
            );
            return None;
        }
    };
    let desc = match kind {
        SymbolInfoKind::Function | SymbolInfoKind::Global | SymbolInfoKind::Event => {
            let index = r.read_index(&mut ctx.errors)?;
            // Imported symbols reuse the import's name unless an explicit
            // name is flagged.
            let name = if !flags.undefined || flags.explicit_name {
                Some(r.read_string(&mut ctx.errors)?)
            } else {
                None
            };
            SymbolInfoDesc::Base { kind, index, name }
        }
        SymbolInfoKind::Data => {
            let name = r.read_string(&mut ctx.errors)?;
            let defined = if !flags.undefined {
                let index = r.read_index(&mut ctx.errors)?;
                let offset = r.read_u32_leb(&mut ctx.errors)?;
                let size = r.read_u32_leb(&mut ctx.errors)?;
                Some(DataSymbolDefined {
                    index,
                    offset,
                    size,
                })
            } else {
                None
            };
            SymbolInfoDesc::Data { name, defined }
        }
        SymbolInfoKind::Section => {
            let section = r.read_u32_leb(&mut ctx.errors)?;
            SymbolInfoDesc::Section { section }
        }
    };
    Some(At::new(r.loc_from(start), SymbolInfo { flags, desc }))
}

fn read_linking_subsection_items<T>(
    r: &mut Reader,
    ctx: &mut ReadCtx,
    read_item: fn(&mut Reader, &mut ReadCtx) -> Option<At<T>>,
) -> Option<Vec<At<T>>> {
    let count = r.read_count(&mut ctx.errors)?;
    let mut out = Vec::with_capacity(count.value as usize);
    for _ in 0..count.value {
        out.push(read_item(r, ctx)?);
    }
    Some(out)
}

/// Decodes the payload of a `linking` custom section.
pub fn read_linking_section(mut r: Reader, ctx: &mut ReadCtx) -> Option<LinkingSectionContents> {
    let version = r.read_u32_leb(&mut ctx.errors)?;
    if version.value != LINKING_VERSION {
        ctx.errors.report(
            version.loc,
            ErrorKind::UnsupportedVersion,
            format!("unsupported linking section version: {}", version.value),
        );
        return None;
    }
    let mut contents = LinkingSectionContents::default();
    while !r.is_empty() {
        let id_byte = r.read_u8(&mut ctx.errors)?;
        let size = r.read_count(&mut ctx.errors)?;
        let mut content = r.sub_reader(size.value as usize, &mut ctx.errors)?;
        match LinkingSubsectionId::try_from(id_byte.value) {
            Ok(LinkingSubsectionId::SegmentInfo) => {
                contents.segment_infos =
                    read_linking_subsection_items(&mut content, ctx, read_segment_info)?;
            }
            Ok(LinkingSubsectionId::InitFunctions) => {
                contents.init_functions =
                    read_linking_subsection_items(&mut content, ctx, read_init_function)?;
            }
            Ok(LinkingSubsectionId::ComdatInfo) => {
                contents.comdats = read_linking_subsection_items(&mut content, ctx, read_comdat)?;
            }
            Ok(LinkingSubsectionId::SymbolTable) => {
                contents.symbols =
                    read_linking_subsection_items(&mut content, ctx, read_symbol_info)?;
            }
            Err(_) => {
                ctx.errors.report(
                    id_byte.loc,
                    ErrorKind::UnknownSectionId,
                    format!("unknown linking subsection id: {}", id_byte.value),
                );
                // Skippable: the size prefix tells us where the next one starts.
            }
        }
    }
    Some(contents)
}

/// Decodes the payload of a `reloc.*` custom section.
pub fn read_relocation_section(mut r: Reader, ctx: &mut ReadCtx) -> Option<RelocationSection> {
    let section_index = r.read_index(&mut ctx.errors)?;
    let count = r.read_count(&mut ctx.errors)?;
    let mut entries = Vec::with_capacity(count.value as usize);
    for _ in 0..count.value {
        let start = r.offset();
        let ty_byte = r.read_u8(&mut ctx.errors)?;
        let ty = match RelocationType::try_from(ty_byte.value) {
            Ok(ty) => At::new(ty_byte.loc.unwrap(), ty),
            Err(_) => {
                ctx.errors.report(
                    ty_byte.loc,
                    ErrorKind::InvalidFlags,
                    format!("invalid relocation type: {}", ty_byte.value),
                );
                return None;
            }
        };
        let offset = r.read_u32_leb(&mut ctx.errors)?;
        let index = r.read_index(&mut ctx.errors)?;
        let addend = if ty.value.has_addend() {
            Some(r.read_s32_leb(&mut ctx.errors)?)
        } else {
            None
        };
        entries.push(At::new(
            r.loc_from(start),
            RelocationEntry {
                ty,
                offset,
                index,
                addend,
            },
        ));
    }
    Some(RelocationSection {
        section_index,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Features;

    #[test]
    fn reads_symbol_table() {
        // version 2; symtab subsection (id 8), one defined function symbol.
        let mut bytes = vec![0x02];
        let sub = {
            let mut sub = vec![0x01]; // count
            sub.push(0x00); // kind function
            sub.push(0x00); // flags: defined, global binding
            sub.push(0x02); // index
            sub.extend_from_slice(&[0x01, b'f']); // name "f"
            sub
        };
        bytes.push(0x08);
        bytes.push(sub.len() as u8);
        bytes.extend_from_slice(&sub);

        let mut ctx = ReadCtx::new(Features::default());
        let contents = read_linking_section(Reader::new(&bytes), &mut ctx).unwrap();
        assert!(ctx.errors.is_empty());
        assert_eq!(contents.symbols.len(), 1);
        match &contents.symbols[0].desc {
            SymbolInfoDesc::Base { kind, index, name } => {
                assert_eq!(*kind, SymbolInfoKind::Function);
                assert_eq!(index.value, 2);
                assert_eq!(name.as_ref().unwrap().value, "f");
            }
            _ => panic!("expected base symbol"),
        }
    }

    #[test]
    fn rejects_wrong_linking_version() {
        let mut ctx = ReadCtx::new(Features::default());
        assert!(read_linking_section(Reader::new(&[0x01]), &mut ctx).is_none());
        assert!(ctx.errors.has_kind(ErrorKind::UnsupportedVersion));
    }

    #[test]
    fn reads_relocations_with_addend() {
        // section index 1, one MemoryAddressLeb reloc with addend -4.
        let bytes = [0x01, 0x01, 0x03, 0x08, 0x02, 0x7c];
        let mut ctx = ReadCtx::new(Features::default());
        let section = read_relocation_section(Reader::new(&bytes), &mut ctx).unwrap();
        assert_eq!(section.section_index.value, 1);
        let entry = &section.entries[0];
        assert_eq!(entry.ty.value, RelocationType::MemoryAddressLeb);
        assert_eq!(entry.offset.value, 8);
        assert_eq!(entry.index.value, 2);
        assert_eq!(entry.addend.as_ref().unwrap().value, -4);
    }
}
