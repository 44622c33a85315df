pub mod ast;
mod cache;
pub mod error;
pub mod fs;
pub mod parser;
mod render;
mod serializer;
pub mod value;

pub use error::{ParseError, ParseErrorKind, RenderError};
pub use fs::{DiskFs, FileSystem};
pub use render::{render, render_with};
pub use serializer::to_value;
pub use value::{LazyValue, SectionFn, Value};
