//! The text dialect: tokenizer, recursive descent reader, and the script
//! layer, producing a symbolic AST.

pub mod context;
pub mod keywords;
pub mod lexer;
pub mod numeric;
pub mod read;
pub mod tokens;
pub mod types;

pub use context::ReadCtx;
pub use lexer::{Lexer, Tokenizer};
pub use read::{read_module, read_script};
