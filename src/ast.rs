/// Key-path tag metadata. `src` is the exact source substring from the
/// opening `{{` through the closing delimiter; `line`/`col` point at the
/// opening `{{`, 1-based, and are quoted verbatim in diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub key: Vec<String>,
    pub src: String,
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartialTag {
    pub name: String,
    pub src: String,
    pub line: u32,
    pub col: u32,
}

/// One item of a parsed template body. Comments never appear here; they are
/// dropped during parsing. Adjacent text runs are merged, so no two
/// consecutive `Text` nodes ever exist in a body.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Variable(Tag),
    Unescaped(Tag),
    Section {
        open: Tag,
        close: Tag,
        body: Vec<Node>,
    },
    Inverted {
        open: Tag,
        close: Tag,
        body: Vec<Node>,
    },
    Partial(PartialTag),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub items: Vec<Node>,
}
