use thiserror::Error;

/// Positioned, fatal parse failure. Line and column are 1-based; the column
/// counts bytes since the last newline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} on line {line}, col {col}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    ExpectedKeyPart,
    ExpectedQuotedKeyPart,
    UnclosedQuote,
    UnclosedComment,
    UnexpectedCharacter,
    UnexpectedCloseTag,
    MissingPartialName,
    ExpectedDelimiter(&'static str),
    CloseTagMismatch { open: String, found: String },
    MissingCloseTag { open: String },
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErrorKind::ExpectedKeyPart => f.write_str("Expected key part"),
            ParseErrorKind::ExpectedQuotedKeyPart => f.write_str("Expected quoted key part"),
            ParseErrorKind::UnclosedQuote => f.write_str("Unclosed quote in key part"),
            ParseErrorKind::UnclosedComment => f.write_str("Unclosed comment starting"),
            ParseErrorKind::UnexpectedCharacter => f.write_str("Unexpected character"),
            ParseErrorKind::UnexpectedCloseTag => f.write_str("Unexpected close tag"),
            ParseErrorKind::MissingPartialName => f.write_str("Expected partial name"),
            ParseErrorKind::ExpectedDelimiter(delim) => write!(f, "Expected \"{}\"", delim),
            ParseErrorKind::CloseTagMismatch { open, found } => {
                write!(f, "Expected close tag for {} but found {}", open, found)
            }
            ParseErrorKind::MissingCloseTag { open } => {
                write!(f, "Expected close tag for {}", open)
            }
        }
    }
}

/// Represents errors that can abort a render call.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Parse error in \"{path}\": {source}")]
    Parse {
        path: String,
        #[source]
        source: ParseError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(
        "Runtime error in \"{path}\": {tag} is a section function (it can only have textual content) on line {line}, col {col}"
    )]
    SectionBody {
        path: String,
        tag: String,
        line: u32,
        col: u32,
    },
    /// Failure reported by a lazy value or a section function, passed through
    /// verbatim.
    #[error("{0}")]
    Custom(String),
}
