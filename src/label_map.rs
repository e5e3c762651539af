//! Label maps in the protobuf text format used by pretrained detection models:
//!
//! ```text
//! item {
//!   name: "/m/01g317"
//!   id: 1
//!   display_name: "person"
//! }
//! ```

use std::path::Path;

use crate::error::{Error, Result};

const MSCOCO_LABEL_MAP: &str = include_str!("data/mscoco_label_map.pbtxt");

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelMapItem {
    pub id: i64,
    pub name: String,
    pub display_name: Option<String>,
}

impl LabelMapItem {
    /// `display_name` when present, otherwise `name`.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LabelMap {
    items: Vec<LabelMapItem>,
}

impl LabelMap {
    /// The MS-COCO label map shipped with the crate: 80 classes over ids 1 to 90.
    pub fn mscoco() -> Self {
        // The embedded file is covered by tests.
        Self::parse(MSCOCO_LABEL_MAP).unwrap_or_default()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!("parsing label map {}", path.as_ref().display());
        Self::parse(&text)
    }

    pub fn from_pairs(pairs: &[(i64, &str)]) -> Self {
        Self {
            items: pairs
                .iter()
                .map(|(id, l)| LabelMapItem {
                    id: *id,
                    name: l.to_string(),
                    display_name: None,
                })
                .collect(),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut tokens = Tokenizer::new(text);
        let mut items = vec![];

        while let Some((line, token)) = tokens.next_token()? {
            match token {
                Token::Ident(ident) if ident == "item" => {
                    tokens.expect_open()?;
                    items.push(parse_item(&mut tokens, line)?);
                }
                other => {
                    return Err(Error::LabelMap {
                        line,
                        message: format!("expected `item`, found {other}"),
                    })
                }
            }
        }

        Ok(Self { items })
    }

    /// First item with this id, as in a linear scan over the file.
    pub fn get(&self, id: i64) -> Option<&str> {
        self.items.iter().find(|i| i.id == id).map(|i| i.label())
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelMapItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn parse_item(tokens: &mut Tokenizer<'_>, start_line: usize) -> Result<LabelMapItem> {
    let mut id = None;
    let mut name = None;
    let mut display_name = None;

    loop {
        let Some((line, token)) = tokens.next_token()? else {
            return Err(Error::LabelMap {
                line: start_line,
                message: "unterminated `item` block".to_string(),
            });
        };

        let field = match token {
            Token::Close => break,
            Token::Ident(field) => field,
            other => {
                return Err(Error::LabelMap {
                    line,
                    message: format!("expected field name, found {other}"),
                })
            }
        };

        match tokens.next_token()? {
            Some((_, Token::Colon)) => {}
            // nested message without a colon, e.g. `keypoints { ... }`
            Some((_, Token::Open)) => {
                tokens.skip_block(line)?;
                continue;
            }
            Some((line, other)) => {
                return Err(Error::LabelMap {
                    line,
                    message: format!("expected `:` after `{field}`, found {other}"),
                })
            }
            None => {
                return Err(Error::LabelMap {
                    line,
                    message: format!("missing value for `{field}`"),
                })
            }
        }

        let (value_line, value) = tokens.next_token()?.ok_or_else(|| Error::LabelMap {
            line,
            message: format!("missing value for `{field}`"),
        })?;

        match (field, value) {
            ("id", Token::Ident(raw)) => {
                let parsed = raw.parse::<i64>().map_err(|_| Error::LabelMap {
                    line: value_line,
                    message: format!("invalid id `{raw}`"),
                })?;
                id = Some(parsed);
            }
            ("name", Token::Str(s)) => name = Some(s),
            ("display_name", Token::Str(s)) => display_name = Some(s),
            ("id" | "name" | "display_name", other) => {
                return Err(Error::LabelMap {
                    line: value_line,
                    message: format!("unexpected value {other} for `{field}`"),
                })
            }
            (_, Token::Open) => tokens.skip_block(value_line)?,
            _ => {}
        }
    }

    let id = id.ok_or_else(|| Error::LabelMap {
        line: start_line,
        message: "item without `id`".to_string(),
    })?;

    Ok(LabelMapItem {
        id,
        name: name.unwrap_or_default(),
        display_name,
    })
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Ident(&'a str),
    Str(String),
    Colon,
    Open,
    Close,
}

impl std::fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "`{s}`"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Colon => f.write_str("`:`"),
            Token::Open => f.write_str("`{`"),
            Token::Close => f.write_str("`}`"),
        }
    }
}

struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0, line: 1 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<(usize, Token<'a>)>> {
        self.skip_trivia();
        let line = self.line;
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let token = match c {
            ':' => {
                self.bump();
                Token::Colon
            }
            '{' => {
                self.bump();
                Token::Open
            }
            '}' => {
                self.bump();
                Token::Close
            }
            '"' | '\'' => {
                self.bump();
                Token::Str(self.string(c, line)?)
            }
            c if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' => {
                let src = self.src;
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
                {
                    self.bump();
                }
                Token::Ident(&src[start..self.pos])
            }
            other => {
                return Err(Error::LabelMap {
                    line,
                    message: format!("unexpected character `{other}`"),
                })
            }
        };

        Ok(Some((line, token)))
    }

    fn string(&mut self, quote: char, line: usize) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => break,
                },
                Some('\n') | None => break,
                Some(c) => out.push(c),
            }
        }
        Err(Error::LabelMap {
            line,
            message: "unterminated string".to_string(),
        })
    }

    fn expect_open(&mut self) -> Result<()> {
        match self.next_token()? {
            Some((_, Token::Open)) => Ok(()),
            // `item: { ... }` is also valid text format
            Some((_, Token::Colon)) => self.expect_open(),
            Some((line, other)) => Err(Error::LabelMap {
                line,
                message: format!("expected `{{`, found {other}"),
            }),
            None => Err(Error::LabelMap {
                line: self.line,
                message: "expected `{`, found end of input".to_string(),
            }),
        }
    }

    /// Consumes tokens up to the `}` matching an already consumed `{`.
    fn skip_block(&mut self, start_line: usize) -> Result<()> {
        let mut depth = 1;
        while depth > 0 {
            match self.next_token()? {
                Some((_, Token::Open)) => depth += 1,
                Some((_, Token::Close)) => depth -= 1,
                Some(_) => {}
                None => {
                    return Err(Error::LabelMap {
                        line: start_line,
                        message: "unterminated block".to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}
