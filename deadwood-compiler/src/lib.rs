pub mod lexer;
pub mod parser_combinator;
pub mod ast;
pub mod codegen;
pub mod compiler;
pub mod dce;
#[macro_use]
pub mod error;
pub mod parser;
pub mod purity;
pub mod scope;
pub mod span;
pub mod token;
mod vec_map;
pub use vec_map::VecMap;

pub fn compile(input: &str) -> error::Result<String> {
    compiler::Compiler::new(compiler::Config::default()).compile(input)
}
