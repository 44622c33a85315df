use crate::ast::{Node, PartialTag, Tag, Template};
use crate::error::{ParseError, ParseErrorKind};

/// Parse template source into an AST. Any grammar violation is fatal; there
/// is no error recovery.
pub fn parse(text: &str) -> Result<Template, ParseError> {
    let mut parser = Parser::new(text);
    let items = parser.template()?;

    // template() only stops early on a close tag; at the root that close tag
    // has no matching open tag.
    if parser.i < parser.bytes.len() {
        return Err(parser.fail(ParseErrorKind::UnexpectedCloseTag));
    }

    Ok(Template { items })
}

#[derive(Debug, Clone, Copy)]
struct Location {
    i: usize,
    line: u32,
    col: u32,
}

struct Parser<'t> {
    src: &'t str,
    bytes: &'t [u8],
    i: usize,
    line: u32,
    i_at_eol: isize,
    /// Position of the most recently seen opening `{{`, anchoring tag source
    /// substrings and tag-level diagnostics.
    mustaches: Location,
}

impl<'t> Parser<'t> {
    fn new(src: &'t str) -> Self {
        Parser {
            src,
            bytes: src.as_bytes(),
            i: 0,
            line: 1,
            i_at_eol: -1,
            mustaches: Location {
                i: 0,
                line: 1,
                col: 1,
            },
        }
    }

    fn template(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut list = Vec::new();
        let mut start = self.i;

        while self.i < self.bytes.len() {
            if self.look("{{") {
                self.append_text(&mut list, start);
                self.mustaches = self.location();

                if self.bytes.get(self.i + 2) == Some(&b'/') {
                    // Close tag; the enclosing section consumes it.
                    return Ok(list);
                }

                self.eat(2);
                if let Some(node) = self.item()? {
                    list.push(node);
                }
                start = self.i;
            } else {
                self.eat(1);
            }
        }

        self.append_text(&mut list, start);
        Ok(list)
    }

    /// Flush accumulated literal text, merging into a trailing text node so
    /// that no two consecutive text nodes ever exist.
    fn append_text(&self, list: &mut Vec<Node>, start: usize) {
        if start < self.i {
            let text = &self.src[start..self.i];
            if let Some(Node::Text(prev)) = list.last_mut() {
                prev.push_str(text);
            } else {
                list.push(Node::Text(text.to_string()));
            }
        }
    }

    fn item(&mut self) -> Result<Option<Node>, ParseError> {
        match self.cur() {
            Some(b'!') => {
                self.eat(1);
                self.comment()?;
                Ok(None)
            }
            Some(b'#') => {
                self.eat(1);
                self.section(false).map(Some)
            }
            Some(b'^') => {
                self.eat(1);
                self.section(true).map(Some)
            }
            Some(b'>') => {
                self.eat(1);
                self.partial().map(Some)
            }
            Some(b'{') => {
                self.eat(1);
                self.tag(true).map(|t| Some(Node::Unescaped(t)))
            }
            _ => self.tag(false).map(|t| Some(Node::Variable(t))),
        }
    }

    fn tag(&mut self, triple: bool) -> Result<Tag, ParseError> {
        self.spaces();

        let mut key = vec![self.tag_part()?];
        while self.i < self.bytes.len() && self.cur() != Some(b'}') && self.cur() != Some(b' ') {
            if self.cur() == Some(b'.') {
                self.eat(1);
                key.push(self.tag_part()?);
            } else {
                return Err(self.fail(ParseErrorKind::UnexpectedCharacter));
            }
        }

        self.spaces();

        let expected = if triple { "}}}" } else { "}}" };
        if self.look(expected) {
            self.eat(expected.len());
        } else {
            return Err(self.fail(ParseErrorKind::ExpectedDelimiter(expected)));
        }

        Ok(Tag {
            key,
            src: self.src[self.mustaches.i..self.i].to_string(),
            line: self.mustaches.line,
            col: self.mustaches.col,
        })
    }

    fn tag_part(&mut self) -> Result<String, ParseError> {
        match self.cur() {
            Some(quote @ (b'"' | b'\'')) => {
                let quote_location = self.location();
                self.eat(1);

                let start = self.i;
                while self.cur() != Some(quote) {
                    if self.i >= self.bytes.len() {
                        return Err(
                            self.fail_at(ParseErrorKind::UnclosedQuote, quote_location)
                        );
                    }
                    if self.cur() == Some(b'\\') && self.bytes.get(self.i + 1) == Some(&quote) {
                        self.eat(2);
                    } else {
                        self.eat(1);
                    }
                }

                if start == self.i {
                    return Err(self.fail(ParseErrorKind::ExpectedQuotedKeyPart));
                }

                let escaped = format!("\\{}", quote as char);
                let part = self.src[start..self.i].replace(&escaped, &(quote as char).to_string());
                self.eat(1);
                Ok(part)
            }
            _ => {
                let start = self.i;
                while self.i < self.bytes.len()
                    && matches!(self.cur(), Some(b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_'))
                {
                    self.eat(1);
                }

                if start < self.i {
                    Ok(self.src[start..self.i].to_string())
                } else {
                    Err(self.fail(ParseErrorKind::ExpectedKeyPart))
                }
            }
        }
    }

    fn partial(&mut self) -> Result<Node, ParseError> {
        self.spaces();

        let start = self.i;
        while self.i < self.bytes.len() && self.cur() != Some(b'}') && self.cur() != Some(b' ') {
            self.eat(1);
        }
        if start == self.i {
            return Err(self.fail(ParseErrorKind::MissingPartialName));
        }
        let name = self.src[start..self.i].to_string();

        self.spaces();

        if self.look("}}") {
            self.eat(2);
        } else {
            return Err(self.fail(ParseErrorKind::ExpectedDelimiter("}}")));
        }

        Ok(Node::Partial(PartialTag {
            name,
            src: self.src[self.mustaches.i..self.i].to_string(),
            line: self.mustaches.line,
            col: self.mustaches.col,
        }))
    }

    fn section(&mut self, inverted: bool) -> Result<Node, ParseError> {
        let open = self.tag(false)?;
        let body = self.template()?;

        if !self.look("{{/") {
            return Err(self.fail(ParseErrorKind::MissingCloseTag { open: open.src }));
        }
        self.eat(3);

        // template() anchored `mustaches` at this close tag's `{{`.
        let close = self.tag(false)?;
        if open.key != close.key {
            return Err(self.fail_at(
                ParseErrorKind::CloseTagMismatch {
                    open: open.src,
                    found: close.src,
                },
                self.mustaches,
            ));
        }

        Ok(if inverted {
            Node::Inverted { open, close, body }
        } else {
            Node::Section { open, close, body }
        })
    }

    fn comment(&mut self) -> Result<(), ParseError> {
        while self.i < self.bytes.len() {
            if self.look("}}") {
                self.eat(2);
                return Ok(());
            }
            self.eat(1);
        }
        Err(self.fail_at(ParseErrorKind::UnclosedComment, self.mustaches))
    }

    fn cur(&self) -> Option<u8> {
        self.bytes.get(self.i).copied()
    }

    fn look(&self, expected: &str) -> bool {
        self.bytes
            .get(self.i..)
            .is_some_and(|rest| rest.starts_with(expected.as_bytes()))
    }

    fn eat(&mut self, count: usize) {
        for _ in 0..count {
            if self.cur() == Some(b'\n') {
                self.line += 1;
                self.i_at_eol = self.i as isize;
            }
            self.i += 1;
        }
    }

    fn spaces(&mut self) {
        while self.cur() == Some(b' ') {
            self.eat(1);
        }
    }

    fn location(&self) -> Location {
        Location {
            i: self.i,
            line: self.line,
            col: (self.i as isize - self.i_at_eol) as u32,
        }
    }

    fn fail(&self, kind: ParseErrorKind) -> ParseError {
        self.fail_at(kind, self.location())
    }

    fn fail_at(&self, kind: ParseErrorKind, location: Location) -> ParseError {
        ParseError {
            kind,
            line: location.line,
            col: location.col,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Node {
        Node::Text(s.to_string())
    }

    fn tag(key: &[&str], src: &str, line: u32, col: u32) -> Tag {
        Tag {
            key: key.iter().map(|s| s.to_string()).collect(),
            src: src.to_string(),
            line,
            col,
        }
    }

    fn var(key: &[&str], src: &str, line: u32, col: u32) -> Node {
        Node::Variable(tag(key, src, line, col))
    }

    fn parsed(template: &str) -> Vec<Node> {
        parse(template).expect("parse failed").items
    }

    fn parse_err(template: &str) -> String {
        parse(template).expect_err("parse succeeded").to_string()
    }

    #[test]
    fn test_empty() {
        assert_eq!(parsed(""), vec![]);
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(parsed("foo"), vec![text("foo")]);
    }

    #[test]
    fn test_comment_is_dropped_and_text_merged() {
        assert_eq!(
            parsed("fo{{! comment with a newline\nwoop }}o"),
            vec![text("foo")]
        );
    }

    #[test]
    fn test_single_variable() {
        assert_eq!(
            parsed("foo {{bar}}"),
            vec![text("foo "), var(&["bar"], "{{bar}}", 1, 5)]
        );
    }

    #[test]
    fn test_two_variables() {
        assert_eq!(
            parsed("{{foo}}{{bar}}"),
            vec![
                var(&["foo"], "{{foo}}", 1, 1),
                var(&["bar"], "{{bar}}", 1, 8)
            ]
        );
    }

    #[test]
    fn test_variable_with_whitespace() {
        assert_eq!(
            parsed("foo {{  bar  }}"),
            vec![text("foo "), var(&["bar"], "{{  bar  }}", 1, 5)]
        );
    }

    #[test]
    fn test_text_after_variable() {
        assert_eq!(
            parsed("foo {{bar}} baz"),
            vec![text("foo "), var(&["bar"], "{{bar}}", 1, 5), text(" baz")]
        );
    }

    #[test]
    fn test_partial() {
        assert_eq!(
            parsed("foo {{>example}} baz"),
            vec![
                text("foo "),
                Node::Partial(PartialTag {
                    name: "example".to_string(),
                    src: "{{>example}}".to_string(),
                    line: 1,
                    col: 5,
                }),
                text(" baz"),
            ]
        );
    }

    #[test]
    fn test_partial_with_whitespace() {
        assert_eq!(
            parsed("foo {{> example}} baz"),
            vec![
                text("foo "),
                Node::Partial(PartialTag {
                    name: "example".to_string(),
                    src: "{{> example}}".to_string(),
                    line: 1,
                    col: 5,
                }),
                text(" baz"),
            ]
        );
    }

    #[test]
    fn test_partial_with_path() {
        assert_eq!(
            parsed("foo {{> foo/example.html}} baz"),
            vec![
                text("foo "),
                Node::Partial(PartialTag {
                    name: "foo/example.html".to_string(),
                    src: "{{> foo/example.html}}".to_string(),
                    line: 1,
                    col: 5,
                }),
                text(" baz"),
            ]
        );
    }

    #[test]
    fn test_unescaped_variable() {
        assert_eq!(
            parsed("foo {{{bar}}}s"),
            vec![
                text("foo "),
                Node::Unescaped(tag(&["bar"], "{{{bar}}}", 1, 5)),
                text("s"),
            ]
        );
    }

    #[test]
    fn test_empty_section() {
        assert_eq!(
            parsed("{{#foo}}{{/foo}}"),
            vec![Node::Section {
                open: tag(&["foo"], "{{#foo}}", 1, 1),
                close: tag(&["foo"], "{{/foo}}", 1, 9),
                body: vec![],
            }]
        );
    }

    #[test]
    fn test_empty_inverted_section() {
        assert_eq!(
            parsed("{{^foo}}{{/foo}}"),
            vec![Node::Inverted {
                open: tag(&["foo"], "{{^foo}}", 1, 1),
                close: tag(&["foo"], "{{/foo}}", 1, 9),
                body: vec![],
            }]
        );
    }

    #[test]
    fn test_simple_section() {
        assert_eq!(
            parsed("{{#foo}}bar{{/foo}}"),
            vec![Node::Section {
                open: tag(&["foo"], "{{#foo}}", 1, 1),
                close: tag(&["foo"], "{{/foo}}", 1, 12),
                body: vec![text("bar")],
            }]
        );
    }

    #[test]
    fn test_section_with_tag_at_end() {
        assert_eq!(
            parsed("{{#foo}}a {{bar}}{{/foo}}"),
            vec![Node::Section {
                open: tag(&["foo"], "{{#foo}}", 1, 1),
                close: tag(&["foo"], "{{/foo}}", 1, 18),
                body: vec![text("a "), var(&["bar"], "{{bar}}", 1, 11)],
            }]
        );
    }

    #[test]
    fn test_section_with_tag_at_start() {
        assert_eq!(
            parsed("{{#foo}}{{bar}} b{{/foo}}"),
            vec![Node::Section {
                open: tag(&["foo"], "{{#foo}}", 1, 1),
                close: tag(&["foo"], "{{/foo}}", 1, 18),
                body: vec![var(&["bar"], "{{bar}}", 1, 9), text(" b")],
            }]
        );
    }

    #[test]
    fn test_section_with_stuff_around() {
        assert_eq!(
            parsed("a{{#foo}}b{{bar}}c{{/foo}}d"),
            vec![
                text("a"),
                Node::Section {
                    open: tag(&["foo"], "{{#foo}}", 1, 2),
                    close: tag(&["foo"], "{{/foo}}", 1, 19),
                    body: vec![text("b"), var(&["bar"], "{{bar}}", 1, 11), text("c")],
                },
                text("d"),
            ]
        );
    }

    #[test]
    fn test_nested_section() {
        assert_eq!(
            parsed("{{#foo}}{{#bar}}{{/bar}}{{/foo}}"),
            vec![Node::Section {
                open: tag(&["foo"], "{{#foo}}", 1, 1),
                close: tag(&["foo"], "{{/foo}}", 1, 25),
                body: vec![Node::Section {
                    open: tag(&["bar"], "{{#bar}}", 1, 9),
                    close: tag(&["bar"], "{{/bar}}", 1, 17),
                    body: vec![],
                }],
            }]
        );
    }

    #[test]
    fn test_dotted_names() {
        assert_eq!(
            parsed("{{foo.bar}}"),
            vec![var(&["foo", "bar"], "{{foo.bar}}", 1, 1)]
        );
    }

    #[test]
    fn test_quoted_key() {
        assert_eq!(
            parsed("{{\"foo bar\"}}"),
            vec![var(&["foo bar"], "{{\"foo bar\"}}", 1, 1)]
        );
    }

    #[test]
    fn test_quoted_key_with_escaped_quote() {
        assert_eq!(
            parsed("{{foo.\"bar... }}\\\"{{\"}}"),
            vec![var(
                &["foo", "bar... }}\"{{"],
                "{{foo.\"bar... }}\\\"{{\"}}",
                1,
                1
            )]
        );
    }

    #[test]
    fn test_single_quoted_key() {
        assert_eq!(
            parsed("{{foo.'[]*\\'bar?'}}"),
            vec![var(&["foo", "[]*'bar?"], "{{foo.'[]*\\'bar?'}}", 1, 1)]
        );
    }

    #[test]
    fn test_dotted_number() {
        assert_eq!(
            parsed("{{foo.5}}"),
            vec![var(&["foo", "5"], "{{foo.5}}", 1, 1)]
        );
    }

    #[test]
    fn test_dotted_mixed_parts() {
        assert_eq!(
            parsed("{{foo.\"b(a)r\".3.14baz.\"\\\"\\\"\"}}"),
            vec![var(
                &["foo", "b(a)r", "3", "14baz", "\"\""],
                "{{foo.\"b(a)r\".3.14baz.\"\\\"\\\"\"}}",
                1,
                1
            )]
        );
    }

    // Re-parsing a recorded tag source as a standalone template yields the
    // same key path.
    #[test]
    fn test_tag_src_round_trips() {
        for template in ["{{  bar  }}", "{{foo.bar}}", "{{\"a b\".3}}"] {
            let nodes = parsed(template);
            let Node::Variable(orig) = &nodes[0] else {
                panic!("expected variable")
            };
            let reparsed = parsed(&orig.src);
            let Node::Variable(again) = &reparsed[0] else {
                panic!("expected variable")
            };
            assert_eq!(orig.key, again.key);
        }
    }

    #[test]
    fn test_no_adjacent_text_nodes() {
        fn check(items: &[Node]) {
            for pair in items.windows(2) {
                assert!(
                    !(matches!(pair[0], Node::Text(_)) && matches!(pair[1], Node::Text(_))),
                    "adjacent text nodes"
                );
            }
            for item in items {
                if let Node::Section { body, .. } | Node::Inverted { body, .. } = item {
                    check(body);
                }
            }
        }
        check(&parsed(
            "a{{!x}}b{{#s}}c{{!y}}d{{/s}}e{{!z}}{{!w}}f",
        ));
    }

    #[test]
    fn test_bad_identifiers() {
        assert_eq!(parse_err("{{ }}"), "Expected key part on line 1, col 4");
        assert_eq!(parse_err("\n{{ }}"), "Expected key part on line 2, col 4");
        assert_eq!(parse_err("foo {{ }}"), "Expected key part on line 1, col 8");
        assert_eq!(
            parse_err("foo\nbar {{ }}"),
            "Expected key part on line 2, col 8"
        );
        assert_eq!(
            parse_err("foo\r\nbar {{ }}"),
            "Expected key part on line 2, col 8"
        );
        assert_eq!(parse_err("\r\n{{}}"), "Expected key part on line 2, col 3");
        assert_eq!(
            parse_err("{{!\n}}\n{{}}"),
            "Expected key part on line 3, col 3"
        );
        assert_eq!(parse_err("{{}}"), "Expected key part on line 1, col 3");
        assert_eq!(parse_err("{{"), "Expected key part on line 1, col 3");
    }

    #[test]
    fn test_unexpected_close_tag() {
        assert_eq!(
            parse_err("foo {{/close}} bar"),
            "Unexpected close tag on line 1, col 5"
        );
    }

    #[test]
    fn test_mismatched_close_tag() {
        assert_eq!(
            parse_err("foo {{^bar}}hey, {{/baz}}"),
            "Expected close tag for {{^bar}} but found {{/baz}} on line 1, col 18"
        );
        assert_eq!(
            parse_err("foo {{^foo.bar}}hey, {{/baz}}"),
            "Expected close tag for {{^foo.bar}} but found {{/baz}} on line 1, col 22"
        );
    }

    #[test]
    fn test_missing_close_tag() {
        assert_eq!(
            parse_err("foo {{^bar}}hey, {{baz}}"),
            "Expected close tag for {{^bar}} on line 1, col 25"
        );
    }

    #[test]
    fn test_missing_partial_name() {
        assert_eq!(
            parse_err("{{>}}"),
            "Expected partial name on line 1, col 4"
        );
    }

    #[test]
    fn test_missing_closing_delimiter() {
        assert_eq!(
            parse_err("hey {{foo} bar"),
            "Expected \"}}\" on line 1, col 10"
        );
        assert_eq!(
            parse_err("hey {{#foo}}bar {{/foo}baz"),
            "Expected \"}}\" on line 1, col 23"
        );
        assert_eq!(
            parse_err("hey {{{foo}} bar"),
            "Expected \"}}}\" on line 1, col 11"
        );
    }

    #[test]
    fn test_unclosed_comment() {
        assert_eq!(
            parse_err("hey {{! how are you?"),
            "Unclosed comment starting on line 1, col 5"
        );
    }

    #[test]
    fn test_comment_swallows_close_tag() {
        assert_eq!(
            parse_err("{{^you}} {{! how are {{/you}}?"),
            "Expected close tag for {{^you}} on line 1, col 31"
        );
    }

    #[test]
    fn test_troublesome_dots() {
        assert_eq!(parse_err("{{.foo}}"), "Expected key part on line 1, col 3");
        assert_eq!(parse_err("{{foo.}}"), "Expected key part on line 1, col 7");
        assert_eq!(
            parse_err("{{\"foo\" bar}}"),
            "Expected \"}}\" on line 1, col 9"
        );
    }

    #[test]
    fn test_empty_quoted_part() {
        assert_eq!(
            parse_err("{{\"\"}}"),
            "Expected quoted key part on line 1, col 4"
        );
    }

    #[test]
    fn test_unclosed_quote() {
        assert_eq!(
            parse_err("{{\"foo"),
            "Unclosed quote in key part on line 1, col 3"
        );
        assert_eq!(
            parse_err("{{#\"foo}}{{/foo}}"),
            "Unclosed quote in key part on line 1, col 4"
        );
    }

    #[test]
    fn test_unexpected_character() {
        assert_eq!(
            parse_err("{{foo?}}"),
            "Unexpected character on line 1, col 6"
        );
        assert_eq!(
            parse_err("{{\"foo\"bar}}"),
            "Unexpected character on line 1, col 8"
        );
    }
}
