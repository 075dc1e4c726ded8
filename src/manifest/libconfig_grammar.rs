//! The libconfig-style manifest grammar, the second registered grammar
//! alongside [`super::json_grammar::JsonGrammar`]. A small hand-written
//! recursive-descent parser -- the original project delegates this to
//! `libconfig`, which this crate does not depend on, so the grammar is
//! reimplemented directly over the subset of the syntax this manifest
//! format actually uses: `key = value;` pairs, `{ }` groups and `( )`
//! lists of groups or scalars.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::hwcompat::HardwareCompatEntry;
use crate::manifest::common::{decode_iv, decode_sha256, parse_compressed};
use crate::manifest::grammar::ManifestGrammar;
use crate::manifest::{Artifact, ArtifactClass, HardwareCompatList, InstallPlan, SoftwareIdentity, Target, UpdatePolicy};

#[derive(Debug, Clone)]
enum Value {
    String(String),
    Bool(bool),
    Int(i64),
    List(Vec<Value>),
    Group(HashMap<String, Value>),
}

impl Value {
    fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn as_group(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Group(g) => Some(g),
            _ => None,
        }
    }

    fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

struct Tokenizer<'a> {
    bytes: &'a [u8],
    pos: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    True,
    False,
    Eq,
    Colon,
    Semi,
    Comma,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

impl<'a> Tokenizer<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Tokenizer { bytes, pos: 0 }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            while matches!(self.peek_byte(), Some(b) if b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            if self.bytes[self.pos..].starts_with(b"//") {
                while self.peek_byte().is_some_and(|b| b != b'\n') {
                    self.pos += 1;
                }
                continue;
            }
            if self.bytes[self.pos..].starts_with(b"/*") {
                self.pos += 2;
                while self.pos < self.bytes.len() && !self.bytes[self.pos..].starts_with(b"*/") {
                    self.pos += 1;
                }
                self.pos = (self.pos + 2).min(self.bytes.len());
                continue;
            }
            break;
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_ws_and_comments();
        let Some(b) = self.peek_byte() else { return Ok(None) };
        let tok = match b {
            b'{' => {
                self.pos += 1;
                Token::LBrace
            }
            b'}' => {
                self.pos += 1;
                Token::RBrace
            }
            b'(' => {
                self.pos += 1;
                Token::LParen
            }
            b')' => {
                self.pos += 1;
                Token::RParen
            }
            b'[' => {
                self.pos += 1;
                Token::LBracket
            }
            b']' => {
                self.pos += 1;
                Token::RBracket
            }
            b'=' => {
                self.pos += 1;
                Token::Eq
            }
            b':' => {
                self.pos += 1;
                Token::Colon
            }
            b';' => {
                self.pos += 1;
                Token::Semi
            }
            b',' => {
                self.pos += 1;
                Token::Comma
            }
            b'"' => {
                self.pos += 1;
                let start = self.pos;
                while self.peek_byte().is_some_and(|b| b != b'"') {
                    self.pos += 1;
                }
                if self.peek_byte() != Some(b'"') {
                    return Err(Error::Parse("unterminated string literal".to_string()));
                }
                let s = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                self.pos += 1;
                Token::Str(s)
            }
            b'-' | b'0'..=b'9' => {
                let start = self.pos;
                self.pos += 1;
                while self.peek_byte().is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
                let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
                let n: i64 = text.parse().map_err(|_| Error::Parse(format!("bad integer literal {text:?}")))?;
                Token::Int(n)
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = self.pos;
                while self.peek_byte().is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-') {
                    self.pos += 1;
                }
                let word = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
                match word {
                    "true" => Token::True,
                    "false" => Token::False,
                    other => Token::Ident(other.to_string()),
                }
            }
            other => return Err(Error::Parse(format!("unexpected byte {other:#04x} in manifest"))),
        };
        Ok(Some(tok))
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(tok) = self.next_token()? {
            tokens.push(tok);
        }
        Ok(tokens)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.bump() {
            Some(ref t) if t == expected => Ok(()),
            other => Err(Error::Parse(format!("expected {expected:?}, found {other:?}"))),
        }
    }

    /// Parses a sequence of `ident (= | :) value ;` pairs, either at the
    /// top level (no enclosing braces) or inside a `{ }` group.
    fn parse_group_body(&mut self, top_level: bool) -> Result<HashMap<String, Value>> {
        let mut map = HashMap::new();
        loop {
            match self.peek() {
                Some(Token::RBrace) if !top_level => break,
                None if top_level => break,
                _ => {}
            }
            let name = match self.bump() {
                Some(Token::Ident(name)) => name,
                other => return Err(Error::Parse(format!("expected a key, found {other:?}"))),
            };
            match self.bump() {
                Some(Token::Eq) | Some(Token::Colon) => {}
                other => return Err(Error::Parse(format!("expected `=` or `:` after {name:?}, found {other:?}"))),
            }
            let value = self.parse_value()?;
            self.expect(&Token::Semi)?;
            map.insert(name, value);
        }
        Ok(map)
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.bump() {
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Int(n)) => Ok(Value::Int(n)),
            Some(Token::True) => Ok(Value::Bool(true)),
            Some(Token::False) => Ok(Value::Bool(false)),
            Some(Token::LBrace) => {
                let group = self.parse_group_body(false)?;
                self.expect(&Token::RBrace)?;
                Ok(Value::Group(group))
            }
            Some(Token::LParen) => self.parse_list(Token::RParen),
            Some(Token::LBracket) => self.parse_list(Token::RBracket),
            other => Err(Error::Parse(format!("expected a value, found {other:?}"))),
        }
    }

    fn parse_list(&mut self, close: Token) -> Result<Value> {
        let mut items = Vec::new();
        if self.peek() == Some(&close) {
            self.bump();
            return Ok(Value::List(items));
        }
        loop {
            items.push(self.parse_value()?);
            match self.bump() {
                Some(Token::Comma) => continue,
                Some(t) if t == close => break,
                other => return Err(Error::Parse(format!("expected `,` or closing bracket, found {other:?}"))),
            }
        }
        Ok(Value::List(items))
    }
}

fn parse_document(bytes: &[u8]) -> Result<HashMap<String, Value>> {
    let tokens = Tokenizer::new(bytes).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let map = parser.parse_group_body(true)?;
    if parser.pos != parser.tokens.len() {
        return Err(Error::Parse("trailing tokens after top-level group".to_string()));
    }
    Ok(map)
}

fn string_field(group: &HashMap<String, Value>, key: &str) -> Option<String> {
    group.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_field(group: &HashMap<String, Value>, key: &str) -> bool {
    group.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn artifact_from_group(group: &HashMap<String, Value>, class: ArtifactClass) -> Result<Artifact> {
    let handler_type = string_field(group, "type").ok_or_else(|| Error::Parse("artifact missing `type`".to_string()))?;
    let source_filename = string_field(group, "filename").unwrap_or_default();

    let target = if let Some(volume) = string_field(group, "volume") {
        Target::Partition { volume }
    } else if let Some(mtdname) = string_field(group, "mtdname") {
        Target::Mtd { name: mtdname }
    } else if let (Some(device), Some(filesystem), Some(path)) = (string_field(group, "device"), string_field(group, "filesystem"), string_field(group, "path")) {
        Target::Filesystem { device, filesystem, path }
    } else if let Some(path) = string_field(group, "path") {
        Target::Path(path)
    } else {
        Target::None
    };

    let compressed = match group.get("compressed") {
        None => crate::transform::CompressionSelector::None,
        Some(Value::Bool(false)) => crate::transform::CompressionSelector::None,
        Some(Value::Bool(true)) => crate::transform::CompressionSelector::ZlibGzip,
        Some(Value::String(s)) => parse_compressed(s)?,
        Some(other) => return Err(Error::Parse(format!("unexpected `compressed` value: {other:?}"))),
    };

    let expected_sha256 = string_field(group, "sha256").as_deref().map(decode_sha256).transpose()?;
    let iv = string_field(group, "ivt").as_deref().map(decode_iv).transpose()?;

    let mut properties = HashMap::new();
    if let Some(Value::Group(props)) = group.get("properties") {
        for (key, value) in props {
            if let Some(list) = value.as_list() {
                let values = list.iter().filter_map(Value::as_str).map(str::to_string).collect();
                properties.insert(key.clone(), values);
            } else if let Some(s) = value.as_str() {
                properties.insert(key.clone(), vec![s.to_string()]);
            }
        }
    }

    Ok(Artifact {
        name: string_field(group, "name").unwrap_or_else(|| source_filename.clone()),
        version: string_field(group, "version"),
        handler_type,
        source_filename,
        target,
        expected_sha256,
        size: None,
        compressed,
        encrypted: bool_field(group, "encrypted"),
        iv,
        properties,
        class,
        install_if_different: bool_field(group, "install-if-different"),
        install_if_higher: bool_field(group, "install-if-higher"),
    })
}

fn artifact_list(root: &HashMap<String, Value>, key: &str, class: ArtifactClass) -> Result<Vec<Artifact>> {
    let Some(list) = root.get(key).and_then(Value::as_list) else {
        return Ok(Vec::new());
    };
    list.iter()
        .map(|value| value.as_group().ok_or_else(|| Error::Parse(format!("entry in `{key}` is not a group"))).and_then(|g| artifact_from_group(g, class)))
        .collect()
}

pub struct LibconfigGrammar;

impl ManifestGrammar for LibconfigGrammar {
    fn name(&self) -> &'static str {
        "libconfig"
    }

    fn parse(&self, bytes: &[u8]) -> Result<InstallPlan> {
        let root = parse_document(bytes)?;

        let software = root.get("software").and_then(Value::as_group).ok_or_else(|| Error::Parse("missing top-level `software` group".to_string()))?;

        let hardware_compat = match software.get("hardware-compatibility").and_then(Value::as_list) {
            Some(list) => list
                .iter()
                .map(|v| {
                    let g = v.as_group().ok_or_else(|| Error::Parse("hardware-compatibility entry is not a group".to_string()))?;
                    Ok(HardwareCompatEntry {
                        board: string_field(g, "board").unwrap_or_default(),
                        revision_pattern: string_field(g, "revision").unwrap_or_default(),
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let policy = match root.get("policy").and_then(Value::as_group) {
            Some(g) => UpdatePolicy {
                no_downgrading: bool_field(g, "no-downgrading"),
                check_max_version: bool_field(g, "check-max-version"),
                no_reinstalling: bool_field(g, "no-reinstalling"),
            },
            None => UpdatePolicy::default(),
        };

        let mut artifacts = Vec::new();
        artifacts.extend(artifact_list(&root, "scripts", ArtifactClass::SCRIPT)?);
        artifacts.extend(artifact_list(&root, "partitions", ArtifactClass::PARTITION)?);
        artifacts.extend(artifact_list(&root, "images", ArtifactClass::IMAGE)?);
        artifacts.extend(artifact_list(&root, "files", ArtifactClass::FILE)?);

        let bootloader_vars = match root.get("bootenv").and_then(Value::as_list) {
            Some(list) => list
                .iter()
                .map(|v| {
                    let g = v.as_group().ok_or_else(|| Error::Parse("bootenv entry is not a group".to_string()))?;
                    Ok((string_field(g, "name").unwrap_or_default(), string_field(g, "value").unwrap_or_default()))
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(InstallPlan {
            software: SoftwareIdentity {
                name: string_field(software, "name").unwrap_or_default(),
                version: string_field(software, "version").unwrap_or_default(),
                description: string_field(software, "description"),
            },
            hardware_compat: HardwareCompatList(hardware_compat),
            update_type: string_field(&root, "update-type").unwrap_or_else(|| "default".to_string()),
            policy,
            artifacts,
            bootloader_vars,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest() {
        let text = br#"
            software = {
                name = "demo-os";
                version = "1.2.3";
                hardware-compatibility = ( { board = "demo-board"; revision = "v1"; } );
            };
            images = (
                { type = "raw"; filename = "rootfs.img"; sha256 = "0000000000000000000000000000000000000000000000000000000000000000"; }
            );
        "#;
        let plan = LibconfigGrammar.parse(text).unwrap();
        assert_eq!(plan.software.name, "demo-os");
        assert_eq!(plan.artifacts.len(), 1);
        assert!(plan.artifacts[0].class.contains(ArtifactClass::IMAGE));
    }

    #[test]
    fn parses_policy_and_bootenv() {
        let text = br#"
            software = { name = "n"; version = "1.0.0"; hardware-compatibility = (); };
            policy = { no-downgrading = true; };
            bootenv = ( { name = "upgrade_available"; value = "1"; } );
        "#;
        let plan = LibconfigGrammar.parse(text).unwrap();
        assert!(plan.policy.no_downgrading);
        assert_eq!(plan.bootloader_vars, vec![("upgrade_available".to_string(), "1".to_string())]);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(LibconfigGrammar.parse(b"{not valid").is_err());
    }

    #[test]
    fn rejects_json_input_cleanly() {
        let json = br#"{"software":{"name":"n"}}"#;
        assert!(LibconfigGrammar.parse(json).is_err());
    }
}
