//! Support for the Xcode `.strings` localization format.
//!
//! The parser is a character-level state machine that keeps every byte of the
//! input (whitespace, comments, separator text) inside the parsed components,
//! so serializing an unmodified parse reproduces the source file exactly.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use std::collections::BTreeMap;

use crate::{
    error::{Error, ParseError},
    loc_file::ImportedEntry,
    traits::FileFormat,
};

/// Characters allowed in an unquoted key or value token.
fn is_unquoted_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '/' | ':' | '.' | '-')
}

/// One syntactic element of a `.strings` file, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    /// A run of whitespace between entries.
    Whitespace(String),

    /// A `/* ... */` or `// ...` comment, markers included. Line comments do
    /// not include their terminating newline; it belongs to the following
    /// whitespace run.
    Comment { text: String, is_block: bool },

    /// A `key = value;` entry. `key` and `value` hold the raw source token
    /// text (quotes stripped, escapes untouched); `equals_separator` is the
    /// exact text from the end of the key token to the start of the value
    /// token (the `=`, surrounding whitespace, embedded comments), and
    /// `terminator` the exact text from the end of the value token through
    /// the `;`.
    LocalizedString {
        key: String,
        key_quoted: bool,
        equals_separator: String,
        value: String,
        value_quoted: bool,
        terminator: String,
    },
}

impl Component {
    /// The decoded (unescaped) key, for quoted keys.
    pub fn decoded_key(&self) -> Option<String> {
        match self {
            Component::LocalizedString {
                key, key_quoted, ..
            } => Some(if *key_quoted {
                unescape_plist_string(key)
            } else {
                key.clone()
            }),
            _ => None,
        }
    }

    /// The decoded (unescaped) value, for quoted values.
    pub fn decoded_value(&self) -> Option<String> {
        match self {
            Component::LocalizedString {
                value,
                value_quoted,
                ..
            } => Some(if *value_quoted {
                unescape_plist_string(value)
            } else {
                value.clone()
            }),
            _ => None,
        }
    }

    fn write(&self, out: &mut String) {
        match self {
            Component::Whitespace(text) => out.push_str(text),
            Component::Comment { text, .. } => out.push_str(text),
            Component::LocalizedString {
                key,
                key_quoted,
                equals_separator,
                value,
                value_quoted,
                terminator,
            } => {
                if *key_quoted {
                    out.push('"');
                    out.push_str(key);
                    out.push('"');
                } else {
                    out.push_str(key);
                }
                out.push_str(equals_separator);
                if *value_quoted {
                    out.push('"');
                    out.push_str(value);
                    out.push('"');
                } else {
                    out.push_str(value);
                }
                out.push_str(terminator);
            }
        }
    }
}

/// Unescape quoted-string content per the legacy plist rules: `\\`, `\"`,
/// `\n`, `\t`, `\r` and `\Uxxxx` (exactly four hex digits). Unknown escapes
/// keep the escaped character verbatim.
pub fn unescape_plist_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('U') => {
                let mut hex = String::new();
                while hex.len() < 4 {
                    match chars.peek() {
                        Some(h) if h.is_ascii_hexdigit() => {
                            hex.push(*h);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if !hex.is_empty() => out.push(decoded),
                    _ => {
                        out.push('U');
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Escape a string for inclusion in a quoted `.strings` token.
pub fn escape_plist_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// Scanner states. One machine scans a single string token together with the
/// junk around it, up to and including a designated separator character
/// (`=` after keys, `;` after values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingStringStart,
    ConfirmingCommentStart,
    InBlockComment,
    ConfirmingBlockCommentEnd,
    InLineComment,
    InUnquotedString,
    InQuotedString,
    HandlingEscape,
    AwaitingSeparator,
}

/// Which half of an entry the token scanner is working on; decides how
/// low-level scan failures map to [`ParseError`] kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Key,
    Value,
}

/// Where scanned junk characters accumulate relative to the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Prefix,
    Suffix,
}

#[derive(Debug)]
struct Token {
    prefix: String,
    raw: String,
    quoted: bool,
    suffix: String,
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    byte: usize,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Scanner {
            chars: source.chars().collect(),
            pos: 0,
            byte: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        self.byte += c.len_utf8();
        Some(c)
    }

    fn read_whitespace_run(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    /// Reads a full comment (both markers checked by the caller); returns the
    /// raw text including markers. Line comments stop before the newline.
    fn read_comment(&mut self) -> Result<(String, bool), ParseError> {
        let mut text = String::new();
        text.push(self.bump().unwrap()); // '/'
        let is_block = match self.bump() {
            Some('*') => {
                text.push('*');
                true
            }
            Some('/') => {
                text.push('/');
                false
            }
            _ => {
                return Err(ParseError::UnterminatedToken {
                    what: "comment",
                    offset: self.byte,
                });
            }
        };
        if is_block {
            let mut prev_star = false;
            loop {
                match self.bump() {
                    Some(c) => {
                        text.push(c);
                        if prev_star && c == '/' {
                            return Ok((text, true));
                        }
                        prev_star = c == '*';
                    }
                    None => {
                        return Err(ParseError::UnterminatedToken {
                            what: "block comment",
                            offset: self.byte,
                        });
                    }
                }
            }
        } else {
            while let Some(c) = self.peek() {
                if c == '\n' {
                    break;
                }
                text.push(c);
                self.bump();
            }
            Ok((text, false))
        }
    }

    /// The token state machine: scans `[junk] token [junk] separator` and
    /// returns the three pieces. `phase` only affects error mapping.
    fn read_token(&mut self, separator: char, phase: Phase, key: &str) -> Result<Token, ParseError> {
        let mut state = State::AwaitingStringStart;
        let mut side = Side::Prefix;
        let mut tok = Token {
            prefix: String::new(),
            raw: String::new(),
            quoted: false,
            suffix: String::new(),
        };

        let unexpected = |offset: usize| match phase {
            Phase::Key => ParseError::CannotParseKey { offset },
            Phase::Value => ParseError::ValueNotFound {
                key: key.to_string(),
                offset,
            },
        };

        loop {
            let c = self.peek();
            match (state, c) {
                (State::AwaitingStringStart, Some(w)) if w.is_whitespace() => {
                    tok.prefix.push(w);
                    self.bump();
                }
                (State::AwaitingStringStart, Some('/'))
                    if matches!(self.peek2(), Some('*') | Some('/')) =>
                {
                    state = State::ConfirmingCommentStart;
                    self.junk_mut(side, &mut tok).push('/');
                    self.bump();
                }
                (State::AwaitingStringStart, Some('"')) => {
                    tok.quoted = true;
                    state = State::InQuotedString;
                    self.bump();
                }
                (State::AwaitingStringStart, Some(u)) if is_unquoted_char(u) => {
                    tok.raw.push(u);
                    state = State::InUnquotedString;
                    self.bump();
                }
                (State::AwaitingStringStart, _) => return Err(unexpected(self.byte)),

                (State::ConfirmingCommentStart, Some('*')) => {
                    self.junk_mut(side, &mut tok).push('*');
                    state = State::InBlockComment;
                    self.bump();
                }
                (State::ConfirmingCommentStart, Some('/')) => {
                    self.junk_mut(side, &mut tok).push('/');
                    state = State::InLineComment;
                    self.bump();
                }
                (State::ConfirmingCommentStart, _) => {
                    return Err(ParseError::UnterminatedToken {
                        what: "comment",
                        offset: self.byte,
                    });
                }

                (State::InBlockComment, Some('*')) => {
                    self.junk_mut(side, &mut tok).push('*');
                    state = State::ConfirmingBlockCommentEnd;
                    self.bump();
                }
                (State::InBlockComment, Some(any)) => {
                    self.junk_mut(side, &mut tok).push(any);
                    self.bump();
                }
                (State::InBlockComment, None) | (State::ConfirmingBlockCommentEnd, None) => {
                    return Err(ParseError::UnterminatedToken {
                        what: "block comment",
                        offset: self.byte,
                    });
                }
                (State::ConfirmingBlockCommentEnd, Some('/')) => {
                    self.junk_mut(side, &mut tok).push('/');
                    state = match side {
                        Side::Prefix => State::AwaitingStringStart,
                        Side::Suffix => State::AwaitingSeparator,
                    };
                    self.bump();
                }
                (State::ConfirmingBlockCommentEnd, Some('*')) => {
                    self.junk_mut(side, &mut tok).push('*');
                    self.bump();
                }
                (State::ConfirmingBlockCommentEnd, Some(any)) => {
                    self.junk_mut(side, &mut tok).push(any);
                    state = State::InBlockComment;
                    self.bump();
                }

                (State::InLineComment, Some('\n')) | (State::InLineComment, None) => {
                    state = match side {
                        Side::Prefix => State::AwaitingStringStart,
                        Side::Suffix => State::AwaitingSeparator,
                    };
                    // newline is consumed as plain whitespace by the next state
                }
                (State::InLineComment, Some(any)) => {
                    self.junk_mut(side, &mut tok).push(any);
                    self.bump();
                }

                (State::InUnquotedString, Some(u)) if is_unquoted_char(u) => {
                    tok.raw.push(u);
                    self.bump();
                }
                (State::InUnquotedString, _) => {
                    state = State::AwaitingSeparator;
                    side = Side::Suffix;
                    // reprocess the current char in the new state
                }

                (State::InQuotedString, Some('"')) => {
                    state = State::AwaitingSeparator;
                    side = Side::Suffix;
                    self.bump();
                }
                (State::InQuotedString, Some('\\')) => {
                    tok.raw.push('\\');
                    state = State::HandlingEscape;
                    self.bump();
                }
                (State::InQuotedString, Some(any)) => {
                    tok.raw.push(any);
                    self.bump();
                }
                (State::InQuotedString, None) => {
                    return Err(ParseError::UnterminatedToken {
                        what: "quoted string",
                        offset: self.byte,
                    });
                }

                (State::HandlingEscape, Some(any)) => {
                    tok.raw.push(any);
                    state = State::InQuotedString;
                    self.bump();
                }
                (State::HandlingEscape, None) => {
                    return Err(ParseError::UnterminatedToken {
                        what: "escape sequence",
                        offset: self.byte,
                    });
                }

                (State::AwaitingSeparator, Some(s)) if s == separator => {
                    tok.suffix.push(s);
                    self.bump();
                    return Ok(tok);
                }
                (State::AwaitingSeparator, Some(w)) if w.is_whitespace() => {
                    tok.suffix.push(w);
                    self.bump();
                }
                (State::AwaitingSeparator, Some('/'))
                    if matches!(self.peek2(), Some('*') | Some('/')) =>
                {
                    tok.suffix.push('/');
                    state = State::ConfirmingCommentStart;
                    self.bump();
                }
                // the key token was read but no separator follows: the value
                // is missing, whichever phase we are in
                (State::AwaitingSeparator, _) => {
                    let key = match phase {
                        Phase::Key => tok.raw.clone(),
                        Phase::Value => key.to_string(),
                    };
                    return Err(ParseError::ValueNotFound {
                        key,
                        offset: self.byte,
                    });
                }
            }
        }
    }

    fn junk_mut<'t>(&self, side: Side, tok: &'t mut Token) -> &'t mut String {
        match side {
            Side::Prefix => &mut tok.prefix,
            Side::Suffix => &mut tok.suffix,
        }
    }
}

/// Parse `.strings` source text into its ordered components.
pub fn parse(source: &str) -> Result<Vec<Component>, ParseError> {
    let mut scanner = Scanner::new(source);
    let mut components = Vec::new();

    loop {
        let ws = scanner.read_whitespace_run();
        if !ws.is_empty() {
            components.push(Component::Whitespace(ws));
        }
        match scanner.peek() {
            None => break,
            Some('/') => match scanner.peek2() {
                Some('*') | Some('/') => {
                    let (text, is_block) = scanner.read_comment()?;
                    components.push(Component::Comment { text, is_block });
                    continue;
                }
                None => {
                    return Err(ParseError::UnterminatedToken {
                        what: "comment",
                        offset: scanner.byte,
                    });
                }
                // a lone '/' followed by an ordinary char starts an unquoted key
                Some(_) => {}
            },
            Some(c) if c == '"' || is_unquoted_char(c) => {}
            Some(_) => {
                return Err(ParseError::CannotParseKey {
                    offset: scanner.byte,
                });
            }
        }

        let key_tok = scanner.read_token('=', Phase::Key, "")?;
        let value_tok = scanner.read_token(';', Phase::Value, &key_tok.raw)?;

        let mut equals_separator = key_tok.suffix;
        equals_separator.push_str(&value_tok.prefix);

        components.push(Component::LocalizedString {
            key: key_tok.raw,
            key_quoted: key_tok.quoted,
            equals_separator,
            value: value_tok.raw,
            value_quoted: value_tok.quoted,
            terminator: value_tok.suffix,
        });
    }

    Ok(components)
}

/// Serialize components back to source text. Byte-identical to the original
/// input when the components are untouched.
pub fn serialize(components: &[Component]) -> String {
    let mut out = String::new();
    for component in components {
        component.write(&mut out);
    }
    out
}

/// A parsed Xcode `.strings` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringsFile {
    pub components: Vec<Component>,
}

impl StringsFile {
    /// Iterates over the decoded `(key, value)` pairs, skipping whitespace
    /// and comments.
    pub fn entries(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.components.iter().filter_map(|c| {
            Some((c.decoded_key()?, c.decoded_value()?))
        })
    }

    /// The comment text (markers stripped) immediately preceding each entry,
    /// keyed by decoded key. Used by the merge adapter to seed `LineKey`
    /// comments.
    pub fn comment_for_entry(&self, wanted_key: &str) -> Option<String> {
        let mut last_comment: Option<String> = None;
        for component in &self.components {
            match component {
                Component::Comment { text, is_block } => {
                    let stripped = if *is_block {
                        text.trim_start_matches("/*")
                            .trim_end_matches("*/")
                            .trim()
                            .to_string()
                    } else {
                        text.trim_start_matches("//").trim().to_string()
                    };
                    last_comment = Some(stripped);
                }
                Component::Whitespace(_) => {}
                Component::LocalizedString { .. } => {
                    if component.decoded_key().as_deref() == Some(wanted_key) {
                        return last_comment;
                    }
                    last_comment = None;
                }
            }
        }
        None
    }

    /// Converts the parse into merge-ready entries: every localized string
    /// becomes one [`ImportedEntry`] for `language`, carrying the comment
    /// that immediately precedes it.
    pub fn to_imported_entries(&self, origin_file: &str, language: &str) -> Vec<ImportedEntry> {
        let mut entries = Vec::new();
        let mut last_comment: Option<String> = None;
        for component in &self.components {
            match component {
                Component::Comment { text, is_block } => {
                    let stripped = if *is_block {
                        text.trim_start_matches("/*")
                            .trim_end_matches("*/")
                            .trim()
                            .to_string()
                    } else {
                        text.trim_start_matches("//").trim().to_string()
                    };
                    last_comment = Some(stripped);
                }
                Component::Whitespace(_) => {}
                Component::LocalizedString { .. } => {
                    let key = component.decoded_key().unwrap_or_default();
                    let value = component.decoded_value().unwrap_or_default();
                    entries.push(ImportedEntry {
                        logical_key: key,
                        origin_file: origin_file.to_string(),
                        comment: last_comment.take().unwrap_or_default(),
                        attributes: BTreeMap::new(),
                        values: [(language.to_string(), value)].into_iter().collect(),
                    });
                }
            }
        }
        entries
    }
}

impl FileFormat for StringsFile {
    fn from_reader<R: std::io::BufRead>(mut reader: R) -> Result<Self, Error> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        let components = parse(&content)?;
        Ok(StringsFile { components })
    }

    fn to_writer<W: std::io::Write>(&self, mut writer: W) -> Result<(), Error> {
        writer
            .write_all(serialize(&self.components).as_bytes())
            .map_err(Error::Io)
    }

    /// BOM-aware file reading; Apple tooling historically emitted UTF-16
    /// `.strings` files.
    fn read_from<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path).map_err(Error::Io)?;
        let mut decoder = encoding_rs_io::DecodeReaderBytesBuilder::new()
            .bom_override(true)
            .build(file);

        let mut decoded = String::new();
        decoder.read_to_string(&mut decoded).map_err(Error::Io)?;

        Self::from_str(&decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(source: &str) -> Vec<Component> {
        let components = parse(source).unwrap();
        assert_eq!(serialize(&components), source);
        components
    }

    #[test]
    fn test_parse_simple_quoted_pair() {
        let components = roundtrip("\"hello\" = \"Hello!\";");
        assert_eq!(components.len(), 1);
        assert_eq!(
            components[0],
            Component::LocalizedString {
                key: "hello".to_string(),
                key_quoted: true,
                equals_separator: " = ".to_string(),
                value: "Hello!".to_string(),
                value_quoted: true,
                terminator: ";".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_unquoted_pair_with_trailing_whitespace() {
        let components = roundtrip("key=value;  \n");
        assert_eq!(
            components,
            vec![
                Component::LocalizedString {
                    key: "key".to_string(),
                    key_quoted: false,
                    equals_separator: "=".to_string(),
                    value: "value".to_string(),
                    value_quoted: false,
                    terminator: ";".to_string(),
                },
                Component::Whitespace("  \n".to_string()),
            ]
        );
    }

    #[test]
    fn test_comments_and_whitespace_preserved() {
        let source = "/* header */\n\n// line\n\"a\" = \"b\";\n";
        let components = roundtrip(source);
        assert!(matches!(
            components[0],
            Component::Comment { is_block: true, .. }
        ));
        assert!(matches!(
            &components[2],
            Component::Comment {
                is_block: false,
                text
            } if text == "// line"
        ));
    }

    #[test]
    fn test_comment_between_key_and_separator() {
        let source = "\"k\" /* why */ = /* what */ \"v\" /* done */ ;";
        let components = roundtrip(source);
        match &components[0] {
            Component::LocalizedString {
                equals_separator,
                terminator,
                ..
            } => {
                assert_eq!(equals_separator, " /* why */ = /* what */ ");
                assert_eq!(terminator, " /* done */ ;");
            }
            other => panic!("expected localized string, got {:?}", other),
        }
    }

    #[test]
    fn test_escaped_quote_kept_raw_and_decoded() {
        let source = r#""quote" = "say \"hi\"\n";"#;
        let components = roundtrip(source);
        assert_eq!(
            components[0].decoded_value().unwrap(),
            "say \"hi\"\n".to_string()
        );
    }

    #[test]
    fn test_unicode_escape_decoding() {
        assert_eq!(unescape_plist_string(r"\U0041"), "A");
        assert_eq!(unescape_plist_string(r"\U00e9x"), "éx");
        // malformed hex keeps the escaped char verbatim
        assert_eq!(unescape_plist_string(r"\Uzz"), "Uzz");
    }

    #[test]
    fn test_unquoted_key_slash_prefix() {
        let components = roundtrip("/path/to:thing = ok;");
        assert_eq!(
            components[0],
            Component::LocalizedString {
                key: "/path/to:thing".to_string(),
                key_quoted: false,
                equals_separator: " = ".to_string(),
                value: "ok".to_string(),
                value_quoted: false,
                terminator: ";".to_string(),
            }
        );
    }

    #[test]
    fn test_unterminated_quote_fails() {
        // the quote swallows ` = ` into the key, so the value goes missing
        assert!(matches!(
            parse("\"open = \"v\";"),
            Err(ParseError::ValueNotFound { .. })
        ));
        assert!(matches!(
            parse("\"never closed"),
            Err(ParseError::UnterminatedToken {
                what: "quoted string",
                ..
            })
        ));
    }

    #[test]
    fn test_unterminated_block_comment_fails() {
        assert!(matches!(
            parse("/* still open"),
            Err(ParseError::UnterminatedToken {
                what: "block comment",
                ..
            })
        ));
    }

    #[test]
    fn test_lone_slash_at_eof_fails() {
        assert!(matches!(
            parse("  /"),
            Err(ParseError::UnterminatedToken { what: "comment", .. })
        ));
    }

    #[test]
    fn test_missing_value_fails() {
        let err = parse("\"key\" = ").unwrap_err();
        assert!(matches!(err, ParseError::ValueNotFound { ref key, .. } if key == "key"));
    }

    #[test]
    fn test_malformed_key_fails() {
        assert!(matches!(
            parse("= \"v\";"),
            Err(ParseError::CannotParseKey { .. })
        ));
    }

    #[test]
    fn test_trailing_line_comment_at_eof() {
        let components = roundtrip("\"a\" = \"b\";\n// trailing");
        assert!(matches!(
            components.last(),
            Some(Component::Comment { is_block: false, .. })
        ));
    }

    #[test]
    fn test_entries_iterator() {
        let file = StringsFile {
            components: parse("\"a\" = \"1\";\nb = 2;").unwrap(),
        };
        let entries: Vec<_> = file.entries().collect();
        assert_eq!(
            entries,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn test_comment_for_entry() {
        let file = StringsFile {
            components: parse("/* Greeting */\n\"a\" = \"1\";\n\"b\" = \"2\";").unwrap(),
        };
        assert_eq!(file.comment_for_entry("a").as_deref(), Some("Greeting"));
        assert_eq!(file.comment_for_entry("b"), None);
    }

    #[test]
    fn test_multiline_value_roundtrip() {
        roundtrip("\"m\" = \"line one\nline two\";\n");
    }
}
