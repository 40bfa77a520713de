use std::path::Path;

use anyhow::{ensure, Result};

use wasm_codec::binary::name_section::read_name_section;
use wasm_codec::binary::read::ReadCtx;
use wasm_codec::binary::{read_module, Reader};
use wasm_codec::Features;

pub fn dump(input: &Path, features: Features, json: bool) -> Result<()> {
    let bytes = std::fs::read(input)?;
    let mut ctx = ReadCtx::new(features);
    let module = read_module(&bytes, &mut ctx);

    for error in ctx.errors.iter() {
        eprintln!("error: {error}");
    }
    let module = match module {
        Some(module) => module,
        None => {
            ensure!(ctx.errors.is_empty(), "failed to decode {}", input.display());
            return Ok(());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&module)?);
        return Ok(());
    }

    println!("types: {}", module.types.len());
    println!("imports: {}", module.imports.len());
    println!("functions: {}", module.functions.len());
    println!("tables: {}", module.tables.len());
    println!("memories: {}", module.memories.len());
    println!("globals: {}", module.globals.len());
    println!("events: {}", module.events.len());
    println!("exports: {}", module.exports.len());
    if let Some(start) = &module.start {
        println!("start: func {}", start.func_index.value);
    }
    println!("element segments: {}", module.element_segments.len());
    println!("data segments: {}", module.data_segments.len());
    for (_, custom) in &module.custom_sections {
        println!(
            "custom section {:?}: {} bytes",
            custom.name.value,
            custom.data.len()
        );
        if custom.name.value == "name" {
            let mut name_ctx = ReadCtx::new(features);
            let contents = read_name_section(Reader::new(&custom.data), &mut name_ctx);
            if let Some(module_name) = contents.module_name {
                println!("  module name: {:?}", module_name.value);
            }
            for assoc in contents.function_names {
                println!("  func {}: {:?}", assoc.index.value, assoc.name.value);
            }
        }
    }
    Ok(())
}
