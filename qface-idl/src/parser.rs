//! Recursive descent parser turning QFace source text into a [`Document`].

use crate::error::{ParseError, Result};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::types::{
    Declaration, Document, Enum, EnumMember, Field, Import, Interface, Location, ModuleDecl,
    Operation, Parameter, Property, Signal, Struct, Tags, TypeRef,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const CONTAINER_TYPES: &[&str] = &["list", "map", "model"];

/// Parse a document from already loaded source text.
pub fn parse_source(path: impl AsRef<Path>, source: &str) -> Result<Document> {
    let path = path.as_ref().to_path_buf();
    let tokens = Lexer::new(source)
        .tokenize()
        .map_err(|e| ParseError::Syntax {
            path: path.clone(),
            line: e.line,
            column: e.column,
            message: e.message,
        })?;

    Parser {
        path,
        tokens,
        pos: 0,
    }
    .document()
}

/// Doc comment and annotations collected in front of a declaration.
#[derive(Default)]
struct Prelude {
    comment: Option<String>,
    tags: Tags,
}

struct Parser {
    path: PathBuf,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn location(&self) -> Location {
        let token = self.peek();
        Location {
            path: self.path.clone(),
            line: token.line,
            column: token.column,
        }
    }

    fn error_at(&self, token: &Token, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            path: self.path.clone(),
            line: token.line,
            column: token.column,
            message: message.into(),
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.peek();
        self.error_at(
            token,
            format!("expected {}, found {}", expected, token.kind.describe()),
        )
    }

    fn is_punct(&self, c: char) -> bool {
        self.peek().kind == TokenKind::Punct(c)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(s) if s == keyword)
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.is_punct(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<()> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", c)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        match &self.peek().kind {
            TokenKind::Ident(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn qualified_name(&mut self, what: &str) -> Result<String> {
        let mut name = self.expect_ident(what)?;
        while self.is_punct('.') && matches!(self.peek_at(1), TokenKind::Ident(_)) {
            self.advance();
            name.push('.');
            name.push_str(&self.expect_ident(what)?);
        }
        Ok(name)
    }

    fn version(&mut self) -> Option<String> {
        match &self.peek().kind {
            TokenKind::Real(v) => {
                let v = v.clone();
                self.advance();
                Some(v)
            }
            TokenKind::Int(n) => {
                let v = n.to_string();
                self.advance();
                Some(v)
            }
            _ => None,
        }
    }

    fn document(mut self) -> Result<Document> {
        let prelude = self.prelude()?;
        let location = self.location();
        if !self.eat_keyword("module") {
            return Err(self.unexpected("module declaration"));
        }
        let name = self.qualified_name("module name")?;
        let version = self.version();
        self.eat_punct(';');

        let module = ModuleDecl {
            name,
            version,
            comment: prelude.comment,
            tags: prelude.tags,
            location,
        };

        let mut imports = Vec::new();
        while self.eat_keyword("import") {
            let name = self.qualified_name("imported module name")?;
            let version = self.version();
            self.eat_punct(';');
            imports.push(Import { name, version });
        }

        let mut declarations = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            declarations.push(self.declaration()?);
        }

        Ok(Document {
            path: self.path,
            module,
            imports,
            declarations,
        })
    }

    fn prelude(&mut self) -> Result<Prelude> {
        let mut prelude = Prelude::default();
        loop {
            match &self.peek().kind {
                TokenKind::DocComment(text) => {
                    prelude.comment = Some(text.clone());
                    self.advance();
                }
                TokenKind::Punct('@') => {
                    self.advance();
                    let (name, value) = self.annotation()?;
                    prelude.tags.insert(name, value);
                }
                _ => return Ok(prelude),
            }
        }
    }

    fn annotation(&mut self) -> Result<(String, serde_json::Value)> {
        let name = self.qualified_name("annotation name")?;
        if !self.eat_punct('(') {
            return Ok((name, serde_json::Value::Bool(true)));
        }

        let mut args = serde_json::Map::new();
        while !self.eat_punct(')') {
            let key = self.expect_ident("annotation key")?;
            let value = if self.eat_punct(':') {
                self.annotation_value()?
            } else {
                serde_json::Value::Bool(true)
            };
            args.insert(key, value);
            if !self.eat_punct(',') && !self.is_punct(')') {
                return Err(self.unexpected("',' or ')'"));
            }
        }
        Ok((name, serde_json::Value::Object(args)))
    }

    fn annotation_value(&mut self) -> Result<serde_json::Value> {
        let token = self.peek().clone();
        let value = match &token.kind {
            TokenKind::Str(s) => serde_json::Value::String(s.clone()),
            TokenKind::Int(n) => serde_json::Value::from(*n),
            TokenKind::Real(r) => real_value(r),
            TokenKind::Punct('-') => {
                self.advance();
                return match &self.peek().kind {
                    TokenKind::Int(n) => {
                        let n = -*n;
                        self.advance();
                        Ok(serde_json::Value::from(n))
                    }
                    TokenKind::Real(r) => {
                        let v = real_value(&format!("-{}", r));
                        self.advance();
                        Ok(v)
                    }
                    _ => Err(self.unexpected("number")),
                };
            }
            TokenKind::Punct('[') => {
                self.advance();
                let mut items = Vec::new();
                while !self.eat_punct(']') {
                    items.push(self.annotation_value()?);
                    if !self.eat_punct(',') && !self.is_punct(']') {
                        return Err(self.unexpected("',' or ']'"));
                    }
                }
                return Ok(serde_json::Value::Array(items));
            }
            TokenKind::Ident(s) if s == "true" => serde_json::Value::Bool(true),
            TokenKind::Ident(s) if s == "false" => serde_json::Value::Bool(false),
            TokenKind::Ident(_) => {
                return self.qualified_name("value").map(serde_json::Value::String);
            }
            _ => return Err(self.unexpected("annotation value")),
        };
        self.advance();
        Ok(value)
    }

    fn declaration(&mut self) -> Result<Declaration> {
        let prelude = self.prelude()?;
        let location = self.location();
        let keyword = self.expect_ident("'interface', 'struct', 'enum' or 'flag'")?;
        match keyword.as_str() {
            "interface" => self.interface(prelude, location).map(Declaration::Interface),
            "struct" => self.struct_(prelude, location).map(Declaration::Struct),
            "enum" => self.enum_(prelude, location, false).map(Declaration::Enum),
            "flag" => self.enum_(prelude, location, true).map(Declaration::Enum),
            other => Err(ParseError::Syntax {
                path: self.path.clone(),
                line: location.line,
                column: location.column,
                message: format!("unknown declaration '{}'", other),
            }),
        }
    }

    fn interface(&mut self, prelude: Prelude, location: Location) -> Result<Interface> {
        let name = self.expect_ident("interface name")?;
        let extends = if self.eat_keyword("extends") {
            Some(self.qualified_name("base interface name")?)
        } else {
            None
        };
        self.expect_punct('{')?;

        let mut interface = Interface {
            name,
            extends,
            properties: Vec::new(),
            operations: Vec::new(),
            signals: Vec::new(),
            comment: prelude.comment,
            tags: prelude.tags,
            location,
        };
        let mut seen = HashSet::new();

        while !self.eat_punct('}') {
            let member = self.prelude()?;
            let location = self.location();
            let start = self.peek().clone();

            if self.eat_keyword("signal") {
                let name = self.expect_ident("signal name")?;
                let parameters = self.parameters()?;
                self.eat_punct(';');
                self.check_member(&mut seen, &interface.name, &name, &location)?;
                interface.signals.push(Signal {
                    name,
                    parameters,
                    comment: member.comment,
                    tags: member.tags,
                    location,
                });
                continue;
            }

            let mut readonly = false;
            let mut const_ = false;
            loop {
                if self.eat_keyword("readonly") {
                    readonly = true;
                } else if self.eat_keyword("const") {
                    const_ = true;
                } else {
                    break;
                }
            }

            let type_ = self.type_ref()?;
            let name = self.expect_ident("member name")?;
            self.check_member(&mut seen, &interface.name, &name, &location)?;

            if self.is_punct('(') {
                if readonly || const_ {
                    return Err(self.error_at(&start, "operations cannot be readonly or const-prefixed"));
                }
                let parameters = self.parameters()?;
                let const_ = self.eat_keyword("const");
                self.eat_punct(';');
                interface.operations.push(Operation {
                    name,
                    return_type: type_,
                    parameters,
                    const_,
                    comment: member.comment,
                    tags: member.tags,
                    location,
                });
            } else {
                if type_.is_void() {
                    return Err(self.error_at(&start, format!("property '{}' cannot be void", name)));
                }
                self.eat_punct(';');
                interface.properties.push(Property {
                    name,
                    type_,
                    readonly,
                    const_,
                    comment: member.comment,
                    tags: member.tags,
                    location,
                });
            }
        }

        Ok(interface)
    }

    fn struct_(&mut self, prelude: Prelude, location: Location) -> Result<Struct> {
        let name = self.expect_ident("struct name")?;
        self.expect_punct('{')?;
        let mut fields = Vec::new();
        let mut seen = HashSet::new();

        while !self.eat_punct('}') {
            let member = self.prelude()?;
            let location = self.location();
            let type_ = self.type_ref()?;
            let field = self.expect_ident("field name")?;
            self.check_member(&mut seen, &name, &field, &location)?;
            self.eat_punct(';');
            fields.push(Field {
                name: field,
                type_,
                comment: member.comment,
                tags: member.tags,
                location,
            });
        }

        Ok(Struct {
            name,
            fields,
            comment: prelude.comment,
            tags: prelude.tags,
            location,
        })
    }

    fn enum_(&mut self, prelude: Prelude, location: Location, is_flag: bool) -> Result<Enum> {
        let name = self.expect_ident(if is_flag { "flag name" } else { "enum name" })?;
        self.expect_punct('{')?;
        let mut members: Vec<EnumMember> = Vec::new();
        let mut seen = HashSet::new();

        while !self.eat_punct('}') {
            let member = self.prelude()?;
            let location = self.location();
            let member_name = self.expect_ident("enum member")?;
            self.check_member(&mut seen, &name, &member_name, &location)?;

            let explicit = self.eat_punct('=');
            let value = if explicit {
                let negative = self.eat_punct('-');
                match self.peek().kind {
                    TokenKind::Int(n) => {
                        self.advance();
                        if negative {
                            -n
                        } else {
                            n
                        }
                    }
                    _ => return Err(self.unexpected("integer value")),
                }
            } else {
                let implicit = if is_flag {
                    // Bit 63 is the sign bit.
                    (members.len() < 63).then(|| 1i64 << members.len())
                } else {
                    match members.last() {
                        Some(previous) => previous.value.checked_add(1),
                        None => Some(0),
                    }
                };
                implicit.ok_or_else(|| ParseError::Syntax {
                    path: self.path.clone(),
                    line: location.line,
                    column: location.column,
                    message: format!("implicit value of '{}' is out of range", member_name),
                })?
            };
            self.eat_punct(',');

            members.push(EnumMember {
                name: member_name,
                value,
                explicit,
                comment: member.comment,
                tags: member.tags,
                location,
            });
        }

        Ok(Enum {
            name,
            is_flag,
            members,
            comment: prelude.comment,
            tags: prelude.tags,
            location,
        })
    }

    fn parameters(&mut self) -> Result<Vec<Parameter>> {
        self.expect_punct('(')?;
        let mut parameters = Vec::new();
        while !self.eat_punct(')') {
            let type_ = self.type_ref()?;
            let name = self.expect_ident("parameter name")?;
            parameters.push(Parameter { name, type_ });
            if !self.eat_punct(',') && !self.is_punct(')') {
                return Err(self.unexpected("',' or ')'"));
            }
        }
        Ok(parameters)
    }

    fn type_ref(&mut self) -> Result<TypeRef> {
        let name = self.qualified_name("type")?;
        if CONTAINER_TYPES.contains(&name.as_str()) && self.eat_punct('<') {
            let nested = self.type_ref()?;
            self.expect_punct('>')?;
            return Ok(TypeRef::container(name, nested));
        }
        Ok(TypeRef::simple(name))
    }

    fn check_member(
        &self,
        seen: &mut HashSet<String>,
        owner: &str,
        name: &str,
        location: &Location,
    ) -> Result<()> {
        if seen.insert(name.to_string()) {
            return Ok(());
        }
        Err(ParseError::Syntax {
            path: self.path.clone(),
            line: location.line,
            column: location.column,
            message: format!("duplicate member '{}' in '{}'", name, owner),
        })
    }
}

fn real_value(text: &str) -> serde_json::Value {
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(text.to_string()))
}
