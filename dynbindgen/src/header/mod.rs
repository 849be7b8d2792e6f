//! Header front end: a tokenizer and recursive-descent parser for the C
//! declaration subset the generator understands.
//!
//! ```
//! let declarations = dynbindgen::header::parse(
//!     "typedef struct Calc_s *Calc;\n\
//!      double calc_add(Calc calc, double a, double b);",
//! )
//! .unwrap();
//! assert!(declarations.structs[0].opaque);
//! assert_eq!(declarations.functions[0].params.len(), 3);
//! ```

mod lexer;
mod parser;

use std::path::Path;

use crate::model::Declarations;

/// A syntax error with its 1-based position in the header
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Parse header text into a declaration model
pub fn parse(source: &str) -> Result<Declarations, ParseError> {
    let tokens = lexer::tokenize(source)?;
    parser::Parser::new(tokens).parse()
}

/// Read and parse a header file
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Declarations, HeaderError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|source| HeaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&source).map_err(|source| HeaderError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("{}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}:{source}", path.display())]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: ParseError,
    },
}
