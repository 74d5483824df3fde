//! Type name parsing: primary types with template parameters, tuples,
//! function types, `static_array`/`pointer`, dicts, `typeof` and the `?`
//! (maybe) qualifier.

use crate::lexer::{Keyword, TokenKind};

use super::ast::{
    ArrayType, DictType, FuncType, PointerType, PrimaryType, QualifiedType, Qualifier, TupleType,
    TypeName, TypeofType,
};
use super::{node_id, ParseResult, Parser};

fn ident_shaped(name: &str) -> bool {
    let core = name.strip_suffix('?').unwrap_or(name);
    let mut chars = core.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Parser<'_> {
    pub(crate) fn parse_qualified_type(&mut self) -> ParseResult<TypeName> {
        let start = self.mark();
        let inner = self.parse_compound_type()?;
        if self.eat(&TokenKind::Question) {
            return Ok(TypeName::Qualified(QualifiedType {
                id: node_id(),
                location: self.loc(start),
                inner: Box::new(inner),
                qualifier: Qualifier::Maybe,
            }));
        }
        Ok(inner)
    }

    fn parse_compound_type(&mut self) -> ParseResult<TypeName> {
        let start = self.mark();
        match self.peek_kind() {
            Some(TokenKind::Keyword(Keyword::Func)) => {
                self.state.next();
                if !self.peek_is(&TokenKind::LParen) {
                    // Bare `func` is the callable template type.
                    return Ok(TypeName::Func(FuncType {
                        id: node_id(),
                        location: self.loc(start),
                        params: vec![],
                        ret: None,
                    }));
                }
                let params = self.parse_type_list_in_parens()?;
                let mut ret = None;
                if self.eat(&TokenKind::Colon) {
                    self.opt_eol();
                    ret = Some(Box::new(self.parse_qualified_type()?));
                }
                Ok(TypeName::Func(FuncType {
                    id: node_id(),
                    location: self.loc(start),
                    params,
                    ret,
                }))
            }
            Some(TokenKind::Keyword(Keyword::Proc)) => {
                self.state.next();
                let params = if self.peek_is(&TokenKind::LParen) {
                    self.parse_type_list_in_parens()?
                } else {
                    vec![]
                };
                Ok(TypeName::Func(FuncType {
                    id: node_id(),
                    location: self.loc(start),
                    params,
                    ret: None,
                }))
            }
            Some(TokenKind::Keyword(Keyword::StaticArray)) => {
                self.state.next();
                let element = self.parse_optional_type_argument()?;
                Ok(TypeName::Array(ArrayType {
                    id: node_id(),
                    location: self.loc(start),
                    element: element.map(Box::new),
                }))
            }
            Some(TokenKind::Keyword(Keyword::Pointer)) => {
                self.state.next();
                let pointee = self.parse_optional_type_argument()?;
                Ok(TypeName::Pointer(PointerType {
                    id: node_id(),
                    location: self.loc(start),
                    pointee: pointee.map(Box::new),
                }))
            }
            Some(TokenKind::Keyword(Keyword::Typeof)) => {
                self.state.next();
                self.expect(&TokenKind::LParen, "'(' after 'typeof'")?;
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "')' closing 'typeof'")?;
                Ok(TypeName::Typeof(TypeofType {
                    id: node_id(),
                    location: self.loc(start),
                    expr: Box::new(expr),
                }))
            }
            Some(TokenKind::LBracket) => {
                // `[T]` denotes the variable-length array class over T.
                self.state.next();
                self.opt_eol();
                let element = self.parse_qualified_type()?;
                self.opt_eol();
                self.expect(&TokenKind::RBracket, "']' closing array type")?;
                self.array_found = true;
                let pointer = TypeName::Pointer(PointerType {
                    id: node_id(),
                    location: element.location().clone(),
                    pointee: Some(Box::new(element)),
                });
                Ok(TypeName::Primary(PrimaryType {
                    id: node_id(),
                    location: self.loc(start),
                    name: "array".to_string(),
                    template_params: vec![pointer],
                }))
            }
            Some(TokenKind::LBrace) => {
                self.state.next();
                self.opt_eol();
                let key = self.parse_qualified_type()?;
                self.opt_eol();
                self.expect(&TokenKind::FatArrow, "'=>' in dictionary type")?;
                self.opt_eol();
                let value = self.parse_qualified_type()?;
                self.opt_eol();
                self.expect(&TokenKind::RBrace, "'}' closing dictionary type")?;
                Ok(TypeName::Dict(DictType {
                    id: node_id(),
                    location: self.loc(start),
                    key: Box::new(key),
                    value: Box::new(value),
                }))
            }
            Some(TokenKind::LParen) => {
                self.state.next();
                self.opt_eol();
                if self.eat(&TokenKind::RParen) {
                    return Ok(TypeName::Tuple(TupleType {
                        id: node_id(),
                        location: self.loc(start),
                        elements: vec![],
                    }));
                }
                let first = self.parse_qualified_type()?;
                if self.comma() {
                    let mut elements = vec![first];
                    loop {
                        elements.push(self.parse_qualified_type()?);
                        if !self.comma() {
                            break;
                        }
                        if self.peek_is(&TokenKind::RParen) {
                            break;
                        }
                    }
                    self.opt_eol();
                    self.expect(&TokenKind::RParen, "')' closing tuple type")?;
                    Ok(TypeName::Tuple(TupleType {
                        id: node_id(),
                        location: self.loc(start),
                        elements,
                    }))
                } else {
                    self.opt_eol();
                    self.expect(&TokenKind::RParen, "')' closing nested type")?;
                    Ok(first)
                }
            }
            Some(TokenKind::Ident(_)) => {
                let (name, _) = self.expect_identifier("type name")?;
                self.parse_primary_type_with_name(name, start)
            }
            _ => Err(self.error("type name")),
        }
    }

    /// Finish a primary type whose name has already been read, including
    /// template parameters and a name-fused `?` qualifier.
    pub(crate) fn parse_primary_type_with_name(
        &mut self,
        name: String,
        start: crate::lexer::Span,
    ) -> ParseResult<TypeName> {
        let (name, fused_maybe) = match name.strip_suffix('?') {
            Some(core) => (core.to_string(), true),
            None => (name, false),
        };

        let mut template_params = vec![];
        if self.peek_is(&TokenKind::LParen) {
            template_params = self.parse_type_list_in_parens()?;
        }

        match name.as_str() {
            "array" => self.array_found = true,
            "string" => self.string_found = true,
            _ => {}
        }

        let primary = TypeName::Primary(PrimaryType {
            id: node_id(),
            location: self.loc(start),
            name,
            template_params,
        });

        if fused_maybe {
            return Ok(TypeName::Qualified(QualifiedType {
                id: node_id(),
                location: self.loc(start),
                inner: Box::new(primary),
                qualifier: Qualifier::Maybe,
            }));
        }
        Ok(primary)
    }

    fn parse_optional_type_argument(&mut self) -> ParseResult<Option<TypeName>> {
        if !self.peek_is(&TokenKind::LParen) {
            return Ok(None);
        }
        self.state.next();
        self.opt_eol();
        let inner = self.parse_qualified_type()?;
        self.opt_eol();
        self.expect(&TokenKind::RParen, "')' closing type argument")?;
        Ok(Some(inner))
    }

    fn parse_type_list_in_parens(&mut self) -> ParseResult<Vec<TypeName>> {
        self.expect(&TokenKind::LParen, "'(' opening type list")?;
        self.opt_eol();
        let mut types = vec![];
        if !self.peek_is(&TokenKind::RParen) {
            loop {
                types.push(self.parse_qualified_type()?);
                if !self.comma() {
                    break;
                }
                if self.peek_is(&TokenKind::RParen) {
                    break;
                }
            }
        }
        self.trailing_comma();
        self.expect(&TokenKind::RParen, "')' closing type list")?;
        Ok(types)
    }

    /// Optional `: T` annotation. Also recovers the lexical fusion where
    /// `:name` was scanned as a symbol literal (e.g. `x:int`).
    pub(crate) fn try_parse_type_annotation(&mut self) -> ParseResult<Option<TypeName>> {
        if self.peek_is(&TokenKind::Colon) {
            self.state.next();
            self.opt_eol();
            return Ok(Some(self.parse_qualified_type()?));
        }
        if let Some(TokenKind::Symbol(name)) = self.peek_kind() {
            if ident_shaped(name) {
                let name = name.clone();
                let start = self.mark();
                self.state.next();
                return Ok(Some(self.parse_primary_type_with_name(name, start)?));
            }
        }
        Ok(None)
    }
}
