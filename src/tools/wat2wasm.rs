use std::path::Path;

use anyhow::{anyhow, ensure, Result};

use wasm_codec::binary::write_module;
use wasm_codec::convert;
use wasm_codec::text::lexer::Tokenizer;
use wasm_codec::text::{read_module, ReadCtx};
use wasm_codec::Features;

pub fn wat2wasm(input: &Path, output: &Path, features: Features) -> Result<()> {
    let source = std::fs::read_to_string(input)?;
    let mut ctx = ReadCtx::new(features);
    let mut tokenizer = Tokenizer::new(&source);
    let module = read_module(&mut tokenizer, &mut ctx);
    let binary = module.map(|module| convert::to_binary(&module, &mut ctx));

    for error in ctx.errors.iter() {
        eprintln!("error: {error}");
    }
    ensure!(
        ctx.errors.is_empty(),
        "failed to parse {}",
        input.display()
    );
    let binary = binary.ok_or_else(|| anyhow!("failed to parse {}", input.display()))?;

    let bytes = write_module(&binary);
    std::fs::write(output, bytes)?;
    Ok(())
}
