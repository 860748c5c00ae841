pub mod builtins;
pub mod parser;
pub mod source;
pub mod span;
pub mod symbols;

pub use source::{Language, LineEnding, SourceUnit, Syntax, TextEncoding};
pub use span::{ByteSpan, Position};
pub use symbols::{Resolution, ResolutionGap, SymbolTable};
