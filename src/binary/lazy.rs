//! Lazy decoding: a module is magic + version + a pull-sequence of
//! section views; each typed section is a pull-sequence of items.
//!
//! Construction of a lazy section parses only the element count. One item
//! is materialized per pull. Iteration is single-pass; re-decode to
//! restart.

use log::debug;

use crate::error::ErrorKind;
use crate::span::{At, OptAt};

use super::read::{self, ReadCtx};
use super::reader::Reader;
use super::types::*;

pub const MAGIC: &[u8; 4] = b"\0asm";
pub const VERSION: &[u8; 4] = &[0x01, 0x00, 0x00, 0x00];

#[derive(Debug, Clone, Copy)]
pub struct KnownSection<'a> {
    pub id: At<SectionId>,
    pub content: Reader<'a>,
}

#[derive(Debug, Clone)]
pub struct CustomSectionView<'a> {
    pub name: At<String>,
    pub content: Reader<'a>,
}

#[derive(Debug, Clone)]
pub enum Section<'a> {
    Known(At<KnownSection<'a>>),
    Custom(At<CustomSectionView<'a>>),
}

/// Magic + version + lazy section sequence.
#[derive(Debug)]
pub struct LazyModule<'a> {
    reader: Reader<'a>,
    last_known_order: Option<u8>,
}

impl<'a> LazyModule<'a> {
    pub fn new(data: &'a [u8], ctx: &mut ReadCtx) -> Option<Self> {
        let mut reader = Reader::new(data);
        reader.expect_bytes(MAGIC, ErrorKind::BadMagic, &mut ctx.errors)?;
        reader.expect_bytes(VERSION, ErrorKind::UnsupportedVersion, &mut ctx.errors)?;
        Some(Self {
            reader,
            last_known_order: None,
        })
    }

    /// Pulls the next section view. Returns `None` at end of input or when
    /// the section frame itself is unreadable.
    pub fn next_section(&mut self, ctx: &mut ReadCtx) -> Option<Section<'a>> {
        loop {
            if self.reader.is_empty() {
                return None;
            }
            let id_byte = self.reader.read_u8(&mut ctx.errors)?;
            let size = self.reader.read_count(&mut ctx.errors)?;
            let content = self
                .reader
                .sub_reader(size.value as usize, &mut ctx.errors)?;

            let Some(id) = SectionId::decode(u32::from(id_byte.value), ctx.features) else {
                ctx.errors.report(
                    id_byte.loc,
                    ErrorKind::UnknownSectionId,
                    format!("unknown section id: {}", id_byte.value),
                );
                // Non-fatal: skip the payload and continue with the next frame.
                continue;
            };
            debug!("section {:?}, {} bytes", id, size.value);
            return Some(self.classify(id_byte, id, content, ctx)?);
        }
    }

    fn classify(
        &mut self,
        id_byte: At<u8>,
        id: SectionId,
        mut content: Reader<'a>,
        ctx: &mut ReadCtx,
    ) -> Option<Section<'a>> {

        if id == SectionId::Custom {
            let name = content.read_string(&mut ctx.errors)?;
            return Some(Section::Custom(At::new(
                content.loc_from(id_byte.loc.unwrap().start),
                CustomSectionView { name, content },
            )));
        }

        let order = id.order();
        if let Some(last) = self.last_known_order {
            if order <= last {
                ctx.errors.report(
                    id_byte.loc,
                    ErrorKind::SectionOrder,
                    format!("section {id:?} out of order"),
                );
            }
        }
        self.last_known_order = Some(order);
        Some(Section::Known(At::new(
            content.loc_from(id_byte.loc.unwrap().start),
            KnownSection { id: id_byte.map(|_| id), content },
        )))
    }
}

type ItemReadFn<'a, T> = fn(&mut Reader<'a>, &mut ReadCtx) -> Option<At<T>>;

/// Pull iterator over one typed section's items. The element count is
/// parsed eagerly; items are decoded one per [`LazySection::next`] call.
/// A failed item poisons the iterator (the byte position of the following
/// item is unknowable), but the enclosing module keeps decoding its other
/// sections.
#[derive(Debug)]
pub struct LazySection<'a, T> {
    reader: Reader<'a>,
    pub count: OptAt<u32>,
    remaining: u32,
    poisoned: bool,
    read_item: ItemReadFn<'a, T>,
}

impl<'a, T> LazySection<'a, T> {
    pub fn new(mut reader: Reader<'a>, ctx: &mut ReadCtx, read_item: ItemReadFn<'a, T>) -> Self {
        let count = reader.read_count(&mut ctx.errors);
        let remaining = count.as_ref().map_or(0, |c| c.value);
        Self {
            reader,
            count,
            remaining,
            poisoned: count.is_none(),
            read_item,
        }
    }

    pub fn next(&mut self, ctx: &mut ReadCtx) -> Option<At<T>> {
        if self.poisoned {
            return None;
        }
        if self.remaining == 0 {
            if !self.reader.is_empty() {
                ctx.errors.report(
                    Some(self.reader.loc_from(self.reader.offset())),
                    ErrorKind::SectionSizeMismatch,
                    format!(
                        "section size mismatch: {} unread bytes",
                        self.reader.remaining()
                    ),
                );
                self.poisoned = true;
            }
            return None;
        }
        let index = self.count.as_ref().map_or(0, |c| c.value) - self.remaining;
        self.remaining -= 1;
        ctx.errors.push_context(
            Some(self.reader.loc_from(self.reader.offset())),
            format!("item {index}"),
        );
        let item = (self.read_item)(&mut self.reader, ctx);
        ctx.errors.pop_context();
        match item {
            Some(item) => Some(item),
            None => {
                self.poisoned = true;
                None
            }
        }
    }

    pub fn collect(mut self, ctx: &mut ReadCtx) -> Vec<At<T>> {
        let mut out = Vec::new();
        while let Some(item) = self.next(ctx) {
            out.push(item);
        }
        // Drive the exhaustion check even when the caller drains eagerly.
        let _ = self.next(ctx);
        out
    }
}

pub type LazyTypeSection<'a> = LazySection<'a, TypeEntry>;
pub type LazyImportSection<'a> = LazySection<'a, Import>;
pub type LazyFunctionSection<'a> = LazySection<'a, Function>;
pub type LazyTableSection<'a> = LazySection<'a, Table>;
pub type LazyMemorySection<'a> = LazySection<'a, Memory>;
pub type LazyGlobalSection<'a> = LazySection<'a, Global>;
pub type LazyEventSection<'a> = LazySection<'a, Event>;
pub type LazyExportSection<'a> = LazySection<'a, Export>;
pub type LazyElementSection<'a> = LazySection<'a, ElementSegment>;
pub type LazyCodeSection<'a> = LazySection<'a, UnpackedCode>;
pub type LazyDataSection<'a> = LazySection<'a, DataSegment>;

pub fn read_type_section<'a>(section: KnownSection<'a>, ctx: &mut ReadCtx) -> LazyTypeSection<'a> {
    LazySection::new(section.content, ctx, read::read_type_entry)
}

pub fn read_import_section<'a>(
    section: KnownSection<'a>,
    ctx: &mut ReadCtx,
) -> LazyImportSection<'a> {
    LazySection::new(section.content, ctx, read::read_import)
}

pub fn read_function_section<'a>(
    section: KnownSection<'a>,
    ctx: &mut ReadCtx,
) -> LazyFunctionSection<'a> {
    LazySection::new(section.content, ctx, read::read_function)
}

pub fn read_table_section<'a>(
    section: KnownSection<'a>,
    ctx: &mut ReadCtx,
) -> LazyTableSection<'a> {
    LazySection::new(section.content, ctx, read::read_table)
}

pub fn read_memory_section<'a>(
    section: KnownSection<'a>,
    ctx: &mut ReadCtx,
) -> LazyMemorySection<'a> {
    LazySection::new(section.content, ctx, read::read_memory)
}

pub fn read_global_section<'a>(
    section: KnownSection<'a>,
    ctx: &mut ReadCtx,
) -> LazyGlobalSection<'a> {
    LazySection::new(section.content, ctx, read::read_global)
}

pub fn read_event_section<'a>(
    section: KnownSection<'a>,
    ctx: &mut ReadCtx,
) -> LazyEventSection<'a> {
    LazySection::new(section.content, ctx, read::read_event)
}

pub fn read_export_section<'a>(
    section: KnownSection<'a>,
    ctx: &mut ReadCtx,
) -> LazyExportSection<'a> {
    LazySection::new(section.content, ctx, read::read_export)
}

pub fn read_element_section<'a>(
    section: KnownSection<'a>,
    ctx: &mut ReadCtx,
) -> LazyElementSection<'a> {
    LazySection::new(section.content, ctx, read::read_element_segment)
}

pub fn read_code_section<'a>(section: KnownSection<'a>, ctx: &mut ReadCtx) -> LazyCodeSection<'a> {
    LazySection::new(section.content, ctx, read::read_unpacked_code)
}

pub fn read_data_section<'a>(section: KnownSection<'a>, ctx: &mut ReadCtx) -> LazyDataSection<'a> {
    LazySection::new(section.content, ctx, read::read_data_segment)
}

fn read_whole_section<T>(
    section: KnownSection<'_>,
    ctx: &mut ReadCtx,
    read_item: fn(&mut Reader, &mut ReadCtx) -> Option<At<T>>,
) -> Option<At<T>> {
    let mut reader = section.content;
    let item = read_item(&mut reader, ctx)?;
    if !reader.is_empty() {
        ctx.errors.report(
            Some(reader.loc_from(reader.offset())),
            ErrorKind::SectionSizeMismatch,
            format!("section size mismatch: {} unread bytes", reader.remaining()),
        );
        return None;
    }
    Some(item)
}

pub fn read_start_section(section: KnownSection<'_>, ctx: &mut ReadCtx) -> OptAt<Start> {
    read_whole_section(section, ctx, read::read_start)
}

pub fn read_data_count_section(section: KnownSection<'_>, ctx: &mut ReadCtx) -> OptAt<DataCount> {
    read_whole_section(section, ctx, read::read_data_count)
}

/// Decodes a whole module, folding every section into a [`Module`].
///
/// Decoding continues past failed sections; the result is whatever could
/// be assembled, with the damage reported in `ctx.errors`.
pub fn read_module(data: &[u8], ctx: &mut ReadCtx) -> Option<Module> {
    let mut lazy = LazyModule::new(data, ctx)?;
    let mut module = Module::default();
    let mut last_known: Option<SectionId> = None;

    while let Some(section) = lazy.next_section(ctx) {
        match section {
            Section::Custom(custom) => {
                let custom = custom.value;
                module.custom_sections.push((
                    last_known,
                    At::synthetic(CustomSection {
                        name: custom.name,
                        data: custom.content.rest().to_vec(),
                    }),
                ));
            }
            Section::Known(known) => {
                let known = known.value;
                last_known = Some(known.id.value);
                ctx.errors.push_context(
                    known.id.loc,
                    format!("section {:?}", known.id.value),
                );
                match known.id.value {
                    SectionId::Custom => unreachable!("custom sections split above"),
                    SectionId::Type => {
                        module.types = read_type_section(known, ctx).collect(ctx);
                    }
                    SectionId::Import => {
                        module.imports = read_import_section(known, ctx).collect(ctx);
                    }
                    SectionId::Function => {
                        module.functions = read_function_section(known, ctx).collect(ctx);
                    }
                    SectionId::Table => {
                        module.tables = read_table_section(known, ctx).collect(ctx);
                    }
                    SectionId::Memory => {
                        module.memories = read_memory_section(known, ctx).collect(ctx);
                    }
                    SectionId::Global => {
                        module.globals = read_global_section(known, ctx).collect(ctx);
                    }
                    SectionId::Event => {
                        module.events = read_event_section(known, ctx).collect(ctx);
                    }
                    SectionId::Export => {
                        module.exports = read_export_section(known, ctx).collect(ctx);
                    }
                    SectionId::Start => {
                        module.start = read_start_section(known, ctx);
                    }
                    SectionId::Element => {
                        module.element_segments = read_element_section(known, ctx).collect(ctx);
                    }
                    SectionId::DataCount => {
                        module.data_count = read_data_count_section(known, ctx);
                    }
                    SectionId::Code => {
                        module.codes = read_code_section(known, ctx).collect(ctx);
                    }
                    SectionId::Data => {
                        module.data_segments = read_data_section(known, ctx).collect(ctx);
                    }
                }
                ctx.errors.pop_context();
            }
        }
    }

    if let Some(data_count) = &module.data_count {
        if data_count.count.value as usize != module.data_segments.len() {
            ctx.errors.report(
                data_count.loc,
                ErrorKind::DataCountMismatch,
                format!(
                    "data count mismatch: declared {}, read {}",
                    data_count.count.value,
                    module.data_segments.len()
                ),
            );
        }
    }

    Some(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Features;

    fn module_bytes(sections: &[&[u8]]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(VERSION);
        for section in sections {
            bytes.extend_from_slice(section);
        }
        bytes
    }

    #[test]
    fn empty_module_has_no_sections() {
        let bytes = module_bytes(&[]);
        let mut ctx = ReadCtx::new(Features::default());
        let mut lazy = LazyModule::new(&bytes, &mut ctx).unwrap();
        assert!(lazy.next_section(&mut ctx).is_none());
        assert!(ctx.errors.is_empty());
    }

    #[test]
    fn bad_magic_fails() {
        let mut ctx = ReadCtx::new(Features::default());
        assert!(LazyModule::new(b"\0wasm\x01\0\0\0", &mut ctx).is_none());
        assert!(ctx.errors.has_kind(ErrorKind::BadMagic));
    }

    #[test]
    fn unsupported_version_fails() {
        let mut ctx = ReadCtx::new(Features::default());
        assert!(LazyModule::new(b"\0asm\x02\0\0\0", &mut ctx).is_none());
        assert!(ctx.errors.has_kind(ErrorKind::UnsupportedVersion));
    }

    #[test]
    fn section_order_violation_is_reported() {
        // Function section (id 3) then type section (id 1).
        let bytes = module_bytes(&[&[0x03, 0x01, 0x00], &[0x01, 0x01, 0x00]]);
        let mut ctx = ReadCtx::new(Features::default());
        let module = read_module(&bytes, &mut ctx).unwrap();
        assert!(ctx.errors.has_kind(ErrorKind::SectionOrder));
        assert!(module.types.is_empty());
    }

    #[test]
    fn custom_sections_may_interleave() {
        // type section, custom "x", function section
        let bytes = module_bytes(&[
            &[0x01, 0x01, 0x00],
            &[0x00, 0x02, 0x01, b'x'],
            &[0x03, 0x01, 0x00],
        ]);
        let mut ctx = ReadCtx::new(Features::default());
        let module = read_module(&bytes, &mut ctx).unwrap();
        assert!(ctx.errors.is_empty());
        assert_eq!(module.custom_sections.len(), 1);
        assert_eq!(module.custom_sections[0].0, Some(SectionId::Type));
        assert_eq!(module.custom_sections[0].1.name.value, "x");
    }

    #[test]
    fn section_size_mismatch_is_reported() {
        // Type section claims one entry but carries trailing garbage.
        let bytes = module_bytes(&[&[0x01, 0x05, 0x01, 0x60, 0x00, 0x00, 0xff]]);
        let mut ctx = ReadCtx::new(Features::default());
        let _ = read_module(&bytes, &mut ctx);
        assert!(ctx.errors.has_kind(ErrorKind::SectionSizeMismatch));
    }

    #[test]
    fn data_count_cross_check() {
        // DataCount declares 1 segment, data section has none.
        let bytes = module_bytes(&[&[0x0c, 0x01, 0x01], &[0x0b, 0x01, 0x00]]);
        let mut ctx = ReadCtx::new(Features::default().with(Features::BULK_MEMORY));
        let _ = read_module(&bytes, &mut ctx);
        assert!(ctx.errors.has_kind(ErrorKind::DataCountMismatch));
    }

    #[test]
    fn lazy_section_parses_count_eagerly_and_items_per_pull() {
        // Two function entries.
        let bytes = [0x02, 0x00, 0x01];
        let mut ctx = ReadCtx::new(Features::default());
        let section = KnownSection {
            id: At::synthetic(SectionId::Function),
            content: Reader::new(&bytes),
        };
        let mut lazy = read_function_section(section, &mut ctx);
        assert_eq!(lazy.count.as_ref().map(|c| c.value), Some(2));
        assert_eq!(lazy.next(&mut ctx).unwrap().type_index.value, 0);
        assert_eq!(lazy.next(&mut ctx).unwrap().type_index.value, 1);
        assert!(lazy.next(&mut ctx).is_none());
        assert!(ctx.errors.is_empty());
    }
}
