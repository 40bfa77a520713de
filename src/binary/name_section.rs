//! The "name" custom section sub-format: module name, function names, and
//! local names, each in its own subsection.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

use crate::error::ErrorKind;
use crate::span::{At, OptAt};
use crate::types::Index;

use super::read::ReadCtx;
use super::reader::Reader;
use super::write::{write_bytes, write_index, write_string, write_u32_leb, write_vec};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u8)]
pub enum NameSubsectionId {
    ModuleName = 0,
    FunctionNames = 1,
    LocalNames = 2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameAssoc {
    pub index: At<Index>,
    pub name: At<String>,
}

pub type NameMap = Vec<At<NameAssoc>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndirectNameAssoc {
    pub index: At<Index>,
    pub name_map: NameMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NameSubsection {
    ModuleName(At<String>),
    FunctionNames(NameMap),
    LocalNames(Vec<At<IndirectNameAssoc>>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NameSectionContents {
    pub module_name: OptAt<String>,
    pub function_names: NameMap,
    pub local_names: Vec<At<IndirectNameAssoc>>,
}

fn read_name_assoc(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<NameAssoc>> {
    let start = r.offset();
    let index = r.read_index(&mut ctx.errors)?;
    let name = r.read_string(&mut ctx.errors)?;
    Some(At::new(r.loc_from(start), NameAssoc { index, name }))
}

fn read_name_map(r: &mut Reader, ctx: &mut ReadCtx) -> Option<NameMap> {
    let count = r.read_count(&mut ctx.errors)?;
    let mut out = Vec::with_capacity(count.value as usize);
    for _ in 0..count.value {
        out.push(read_name_assoc(r, ctx)?);
    }
    Some(out)
}

fn read_indirect_name_assoc(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<IndirectNameAssoc>> {
    let start = r.offset();
    let index = r.read_index(&mut ctx.errors)?;
    let name_map = read_name_map(r, ctx)?;
    Some(At::new(
        r.loc_from(start),
        IndirectNameAssoc { index, name_map },
    ))
}

pub fn read_name_subsection(r: &mut Reader, ctx: &mut ReadCtx) -> Option<At<NameSubsection>> {
    let id_byte = r.read_u8(&mut ctx.errors)?;
    let size = r.read_count(&mut ctx.errors)?;
    let mut content = r.sub_reader(size.value as usize, &mut ctx.errors)?;
    let id = match NameSubsectionId::try_from(id_byte.value) {
        Ok(id) => id,
        Err(_) => {
            ctx.errors.report(
                id_byte.loc,
                ErrorKind::UnknownSectionId,
                format!("unknown name subsection id: {}", id_byte.value),
            );
            return None;
        }
    };
    let start = id_byte.loc.unwrap().start;
    let subsection = match id {
        NameSubsectionId::ModuleName => NameSubsection::ModuleName(content.read_string(&mut ctx.errors)?),
        NameSubsectionId::FunctionNames => {
            NameSubsection::FunctionNames(read_name_map(&mut content, ctx)?)
        }
        NameSubsectionId::LocalNames => {
            let count = content.read_count(&mut ctx.errors)?;
            let mut out = Vec::with_capacity(count.value as usize);
            for _ in 0..count.value {
                out.push(read_indirect_name_assoc(&mut content, ctx)?);
            }
            NameSubsection::LocalNames(out)
        }
    };
    if !content.is_empty() {
        ctx.errors.report(
            Some(content.loc_from(content.offset())),
            ErrorKind::SectionSizeMismatch,
            format!(
                "name subsection size mismatch: {} unread bytes",
                content.remaining()
            ),
        );
        return None;
    }
    Some(At::new(r.loc_from(start), subsection))
}

/// Decodes the payload of a `name` custom section (the section name
/// string itself already consumed).
pub fn read_name_section(mut r: Reader, ctx: &mut ReadCtx) -> NameSectionContents {
    let mut contents = NameSectionContents::default();
    while !r.is_empty() {
        let Some(subsection) = read_name_subsection(&mut r, ctx) else {
            break;
        };
        match subsection.value {
            NameSubsection::ModuleName(name) => contents.module_name = Some(name),
            NameSubsection::FunctionNames(names) => contents.function_names = names,
            NameSubsection::LocalNames(names) => contents.local_names = names,
        }
    }
    contents
}

fn write_subsection(out: &mut Vec<u8>, id: NameSubsectionId, payload: &[u8]) {
    out.push(u8::from(id));
    write_bytes(out, payload);
}

pub fn write_name_section(contents: &NameSectionContents) -> Vec<u8> {
    let mut out = Vec::new();
    if let Some(module_name) = &contents.module_name {
        let mut payload = Vec::new();
        write_string(&mut payload, &module_name.value);
        write_subsection(&mut out, NameSubsectionId::ModuleName, &payload);
    }
    if !contents.function_names.is_empty() {
        let mut payload = Vec::new();
        write_vec(&mut payload, &contents.function_names, |out, assoc| {
            write_index(out, assoc.index.value);
            write_string(out, &assoc.name.value);
        });
        write_subsection(&mut out, NameSubsectionId::FunctionNames, &payload);
    }
    if !contents.local_names.is_empty() {
        let mut payload = Vec::new();
        write_u32_leb(&mut payload, contents.local_names.len() as u32);
        for indirect in &contents.local_names {
            write_index(&mut payload, indirect.index.value);
            write_vec(&mut payload, &indirect.name_map, |out, assoc| {
                write_index(out, assoc.index.value);
                write_string(out, &assoc.name.value);
            });
        }
        write_subsection(&mut out, NameSubsectionId::LocalNames, &payload);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Features;

    #[test]
    fn round_trips_all_subsections() {
        let contents = NameSectionContents {
            module_name: Some(At::synthetic("mod".to_owned())),
            function_names: vec![At::synthetic(NameAssoc {
                index: At::synthetic(0),
                name: At::synthetic("f".to_owned()),
            })],
            local_names: vec![At::synthetic(IndirectNameAssoc {
                index: At::synthetic(0),
                name_map: vec![At::synthetic(NameAssoc {
                    index: At::synthetic(1),
                    name: At::synthetic("x".to_owned()),
                })],
            })],
        };
        let bytes = write_name_section(&contents);
        let mut ctx = ReadCtx::new(Features::default());
        let decoded = read_name_section(Reader::new(&bytes), &mut ctx);
        assert!(ctx.errors.is_empty());
        assert_eq!(decoded, contents);
    }

    #[test]
    fn unknown_subsection_id_reports() {
        let bytes = [0x07, 0x01, 0x00];
        let mut ctx = ReadCtx::new(Features::default());
        let _ = read_name_section(Reader::new(&bytes), &mut ctx);
        assert!(ctx.errors.has_kind(ErrorKind::UnknownSectionId));
    }
}
