use std::collections::{HashMap, HashSet};

use log::debug;

use crate::{
    header::{
        lexer::{Token, TokenKind},
        ParseError,
    },
    model::{
        CType, Declarations, EnumDecl, EnumMember, FieldDecl, FunctionDecl, ParamDecl, StructDecl,
        TypedefDecl,
    },
};

/// Words that build up a primitive type name
const PRIMITIVE_WORDS: &[&str] = &[
    "char", "short", "int", "long", "float", "double", "void", "_Bool", "bool",
];

const QUALIFIERS: &[&str] = &[
    "const",
    "volatile",
    "restrict",
    "__restrict",
    "__restrict__",
    "register",
    "__extension__",
];

const INLINE: &[&str] = &["inline", "__inline", "__inline__"];

const ATTRIBUTES: &[&str] = &["__attribute__", "__declspec", "__asm__", "asm"];

/// A struct or enum body met while reading type specifiers
enum Body {
    Struct {
        tag: Option<String>,
        fields: Vec<FieldDecl>,
    },
    Enum {
        tag: Option<String>,
        members: Vec<EnumMember>,
    },
}

impl Body {
    fn tag(&self) -> Option<&str> {
        match self {
            Body::Struct { tag, .. } | Body::Enum { tag, .. } => tag.as_deref(),
        }
    }
}

struct Specifiers {
    ty: CType,
    is_static: bool,
    is_inline: bool,
    /// Set for `struct tag` without a body
    struct_tag: Option<String>,
    body: Option<Body>,
}

#[derive(Default)]
struct Declarator {
    name: Option<String>,
    pointers: usize,
    array: Vec<usize>,
    /// `name(params)`: parameters and the variadic flag
    function: Option<(Vec<ParamDecl>, bool)>,
    /// `(*name)(params)`
    function_pointer: bool,
}

impl Declarator {
    fn is_plain(&self) -> bool {
        self.pointers == 0
            && self.array.is_empty()
            && self.function.is_none()
            && !self.function_pointer
    }

    /// The declared type given the specifier type. Function pointers and
    /// multi-level pointers become a raw `void*`.
    fn apply(&self, base: &CType) -> CType {
        if self.function.is_some() || self.function_pointer || self.pointers > 1 {
            return CType::pointer_to("void");
        }
        CType {
            pointer: self.pointers == 1,
            array: self.array.clone(),
            ..base.clone()
        }
    }
}

/// `typedef struct tag [*]Name;` whose meaning depends on whether `tag` ever gets a body
struct PendingAlias {
    name: String,
    tag: String,
    pointer: bool,
}

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    declarations: Declarations,
    /// Enum constants seen so far, usable in later value expressions
    constants: HashMap<String, i64>,
    /// Names and tags of structs defined with a body
    records: HashSet<String>,
    /// Every type name declared so far
    type_names: HashSet<String>,
    pending: Vec<PendingAlias>,
    /// `struct tag;` forward declarations
    forward: Vec<String>,
    extern_depth: usize,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            declarations: Declarations::new(),
            constants: HashMap::new(),
            records: HashSet::new(),
            type_names: HashSet::new(),
            pending: Vec::new(),
            forward: Vec::new(),
            extern_depth: 0,
        }
    }

    fn nth(&self, n: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + n).min(last)]
    }

    fn peek(&self) -> &Token {
        self.nth(0)
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn peek_ident(&self) -> Option<&str> {
        match &self.peek().kind {
            TokenKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    fn is_punct(&self, c: char) -> bool {
        self.peek().kind == TokenKind::Punct(c)
    }

    fn eat_punct(&mut self, c: char) -> bool {
        let found = self.is_punct(c);
        if found {
            self.next();
        }
        found
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let token = self.peek();
        ParseError::new(token.line, token.column, message)
    }

    fn expected(&self, what: &str) -> ParseError {
        self.error(format!("expected {what}, found {}", self.peek().kind))
    }

    fn expect_punct(&mut self, c: char) -> Result<(), ParseError> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.expected(&format!("`{c}`")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek_ident() {
            Some(name) => {
                let name = name.to_string();
                self.next();
                Ok(name)
            }
            None => Err(self.expected(what)),
        }
    }

    /// Skip a balanced `open ... close` group starting at the current token
    fn skip_group(&mut self, open: char, close: char) -> Result<(), ParseError> {
        let start = self.peek().clone();
        self.expect_punct(open)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.next().kind {
                TokenKind::Punct(c) if c == open => depth += 1,
                TokenKind::Punct(c) if c == close => depth -= 1,
                TokenKind::Eof => {
                    return Err(ParseError::new(
                        start.line,
                        start.column,
                        format!("unclosed `{open}`"),
                    ))
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn skip_attributes(&mut self) -> Result<(), ParseError> {
        while self.peek_ident().is_some_and(|name| ATTRIBUTES.contains(&name)) {
            self.next();
            if self.is_punct('(') {
                self.skip_group('(', ')')?;
            }
        }
        Ok(())
    }

    pub(crate) fn parse(mut self) -> Result<Declarations, ParseError> {
        loop {
            match &self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::Punct(';') => {
                    self.next();
                }
                TokenKind::Punct('}') if self.extern_depth > 0 => {
                    self.next();
                    self.extern_depth -= 1;
                }
                TokenKind::Ident(name)
                    if name == "extern" && matches!(self.nth(1).kind, TokenKind::Str(_)) =>
                {
                    self.next();
                    self.next();
                    if self.eat_punct('{') {
                        self.extern_depth += 1;
                    }
                }
                TokenKind::Ident(name) if name == "typedef" => {
                    self.next();
                    self.typedef()?;
                }
                _ => self.declaration()?,
            }
        }
        if self.extern_depth > 0 {
            return Err(self.error("unclosed `extern` block"));
        }
        Ok(self.finish())
    }

    /// An all-caps identifier in front of a type, like an export macro left
    /// behind by the skipped preprocessor lines
    fn is_export_macro(&self, name: &str) -> bool {
        let macro_like = name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
        if !macro_like || self.type_names.contains(name) {
            return false;
        }
        match &self.nth(1).kind {
            TokenKind::Ident(next) if PRIMITIVE_WORDS.contains(&next.as_str()) => true,
            TokenKind::Ident(next) if QUALIFIERS.contains(&next.as_str()) => true,
            TokenKind::Ident(next) if next == "struct" || next == "enum" || next == "unsigned" => {
                true
            }
            TokenKind::Ident(_) => !matches!(
                self.nth(2).kind,
                TokenKind::Punct(',' | ')' | ';' | '[' | ':' | '=')
            ),
            _ => false,
        }
    }

    fn specifiers(&mut self) -> Result<Specifiers, ParseError> {
        let start = self.peek().clone();
        let mut words: Vec<String> = Vec::new();
        let mut name: Option<String> = None;
        let mut spec = Specifiers {
            ty: CType::new(""),
            is_static: false,
            is_inline: false,
            struct_tag: None,
            body: None,
        };
        let mut sign_given = false;

        loop {
            self.skip_attributes()?;
            let Some(word) = self.peek_ident().map(str::to_string) else {
                break;
            };
            let named = name.is_some() || !words.is_empty() || sign_given;
            match word.as_str() {
                "const" => spec.ty.is_const = true,
                w if QUALIFIERS.contains(&w) => {}
                "extern" => {}
                "static" => spec.is_static = true,
                w if INLINE.contains(&w) => spec.is_inline = true,
                "unsigned" => {
                    spec.ty.unsigned = true;
                    sign_given = true;
                }
                "signed" => sign_given = true,
                w if PRIMITIVE_WORDS.contains(&w)
                    && name.is_none()
                    && combines(&words, sign_given, w) =>
                {
                    words.push(word)
                }
                "union" => return Err(self.error("unions are not supported")),
                "struct" | "enum" if !named => {
                    self.next();
                    let tag = match self.peek_ident() {
                        Some(tag) => Some(tag.to_string()),
                        None => None,
                    };
                    if tag.is_some() {
                        self.next();
                    }
                    if self.is_punct('{') {
                        let body = if word == "struct" {
                            Body::Struct {
                                tag: tag.clone(),
                                fields: self.struct_body()?,
                            }
                        } else {
                            Body::Enum {
                                tag: tag.clone(),
                                members: self.enum_body()?,
                            }
                        };
                        spec.body = Some(body);
                    } else if tag.is_none() {
                        return Err(self.expected(&format!("a {word} tag or body")));
                    } else if word == "struct" {
                        spec.struct_tag = tag.clone();
                    }
                    name = Some(tag.unwrap_or_default());
                    continue;
                }
                _ if !named && self.is_export_macro(&word) => {
                    debug!("skipping `{word}` in front of a declaration");
                }
                _ if !named => name = Some(word),
                _ => break,
            }
            self.next();
        }

        spec.ty.name = match name {
            Some(name) => name,
            None => primitive_name(&words, sign_given).ok_or_else(|| {
                ParseError::new(
                    start.line,
                    start.column,
                    format!("expected a type, found {}", start.kind),
                )
            })?,
        };
        Ok(spec)
    }

    fn declarator(&mut self) -> Result<Declarator, ParseError> {
        let mut declarator = Declarator::default();
        self.skip_attributes()?;
        while self.eat_punct('*') {
            declarator.pointers += 1;
            while self
                .peek_ident()
                .is_some_and(|word| QUALIFIERS.contains(&word))
            {
                self.next();
            }
        }
        self.skip_attributes()?;

        if self.is_punct('(') && self.nth(1).kind == TokenKind::Punct('*') {
            self.next();
            while self.eat_punct('*') {}
            if self.peek_ident().is_some() {
                declarator.name = Some(self.expect_ident("a name")?);
            }
            self.expect_punct(')')?;
            self.skip_group('(', ')')?;
            declarator.function_pointer = true;
        } else if let Some(name) = self.peek_ident() {
            declarator.name = Some(name.to_string());
            self.next();
        }

        while self.eat_punct('[') {
            if self.eat_punct(']') {
                declarator.pointers += 1;
                continue;
            }
            let token = self.peek().clone();
            let len = self.const_expr()?;
            let len = usize::try_from(len)
                .ok()
                .filter(|len| *len > 0)
                .ok_or_else(|| {
                    ParseError::new(token.line, token.column, format!("invalid array length {len}"))
                })?;
            declarator.array.push(len);
            self.expect_punct(']')?;
        }

        if !declarator.function_pointer && self.is_punct('(') {
            declarator.function = Some(self.params()?);
        }
        self.skip_attributes()?;
        Ok(declarator)
    }

    fn params(&mut self) -> Result<(Vec<ParamDecl>, bool), ParseError> {
        self.expect_punct('(')?;
        if self.eat_punct(')') {
            return Ok((Vec::new(), false));
        }
        if self.peek_ident() == Some("void") && self.nth(1).kind == TokenKind::Punct(')') {
            self.next();
            self.next();
            return Ok((Vec::new(), false));
        }

        let mut params = Vec::new();
        loop {
            if self.peek().kind == TokenKind::Ellipsis {
                self.next();
                self.expect_punct(')')?;
                return Ok((params, true));
            }
            let spec = self.specifiers()?;
            if spec.body.is_some() {
                return Err(self.error("type definitions in parameter lists are not supported"));
            }
            let declarator = self.declarator()?;
            params.push(ParamDecl::new(
                declarator.name.clone().unwrap_or_default(),
                declarator.apply(&spec.ty),
            ));
            if self.eat_punct(')') {
                return Ok((params, false));
            }
            self.expect_punct(',')?;
        }
    }

    fn struct_body(&mut self) -> Result<Vec<FieldDecl>, ParseError> {
        self.expect_punct('{')?;
        let mut fields = Vec::new();
        while !self.eat_punct('}') {
            if self.peek().kind == TokenKind::Eof {
                return Err(self.expected("`}`"));
            }
            let spec = self.specifiers()?;
            if spec.body.is_some() {
                return Err(self.error("nested struct and enum definitions are not supported"));
            }
            loop {
                let declarator = self.declarator()?;
                let Some(name) = declarator.name.clone() else {
                    return Err(self.expected("a field name"));
                };
                let bit_width = if self.eat_punct(':') {
                    let width = self.const_expr()?;
                    Some(u32::try_from(width).map_err(|_| {
                        self.error(format!("invalid bitfield width {width}"))
                    })?)
                } else {
                    None
                };
                fields.push(FieldDecl {
                    name,
                    ty: declarator.apply(&spec.ty),
                    bit_width,
                });
                if self.eat_punct(';') {
                    break;
                }
                self.expect_punct(',')?;
            }
        }
        Ok(fields)
    }

    fn enum_body(&mut self) -> Result<Vec<EnumMember>, ParseError> {
        self.expect_punct('{')?;
        let mut members = Vec::new();
        let mut next_value = 0i64;
        while !self.eat_punct('}') {
            let name = self.expect_ident("an enum member")?;
            let value = if self.eat_punct('=') {
                Some(self.const_expr()?)
            } else {
                None
            };
            let resolved = value.unwrap_or(next_value);
            next_value = resolved.wrapping_add(1);
            self.constants.insert(name.clone(), resolved);
            members.push(EnumMember::new(name, value));
            if !self.is_punct('}') {
                self.expect_punct(',')?;
            }
        }
        Ok(members)
    }

    /// `a | b`, `a << b`, `a + b`, `a - b`, unary `-` and `~`, literals and
    /// earlier enum members
    fn const_expr(&mut self) -> Result<i64, ParseError> {
        let mut value = self.shift_expr()?;
        while self.eat_punct('|') {
            value |= self.shift_expr()?;
        }
        Ok(value)
    }

    fn shift_expr(&mut self) -> Result<i64, ParseError> {
        let mut value = self.additive_expr()?;
        while self.peek().kind == TokenKind::Shl {
            self.next();
            let shift = self.additive_expr()?;
            let shift = u32::try_from(shift)
                .ok()
                .filter(|shift| *shift < 64)
                .ok_or_else(|| self.error(format!("invalid shift amount {shift}")))?;
            value = value.wrapping_shl(shift);
        }
        Ok(value)
    }

    fn additive_expr(&mut self) -> Result<i64, ParseError> {
        let mut value = self.unary_expr()?;
        loop {
            if self.eat_punct('+') {
                value = value.wrapping_add(self.unary_expr()?);
            } else if self.eat_punct('-') {
                value = value.wrapping_sub(self.unary_expr()?);
            } else {
                return Ok(value);
            }
        }
    }

    fn unary_expr(&mut self) -> Result<i64, ParseError> {
        if self.eat_punct('-') {
            return Ok(self.unary_expr()?.wrapping_neg());
        }
        if self.eat_punct('~') {
            return Ok(!self.unary_expr()?);
        }
        if self.eat_punct('(') {
            let value = self.const_expr()?;
            self.expect_punct(')')?;
            return Ok(value);
        }
        match self.peek().kind.clone() {
            TokenKind::Int(value) => {
                self.next();
                Ok(value)
            }
            TokenKind::Ident(name) => match self.constants.get(&name) {
                Some(value) => {
                    let value = *value;
                    self.next();
                    Ok(value)
                }
                None => Err(self.error(format!("unknown constant `{name}`"))),
            },
            _ => Err(self.expected("a constant expression")),
        }
    }

    fn add_struct(&mut self, name: &str, fields: Vec<FieldDecl>) {
        debug!("parsed struct {name} with {} fields", fields.len());
        self.records.insert(name.to_string());
        self.type_names.insert(name.to_string());
        self.declarations.structs.push(StructDecl::new(name, fields));
    }

    fn add_enum(&mut self, name: &str, members: Vec<EnumMember>) {
        debug!("parsed enum {name} with {} members", members.len());
        self.type_names.insert(name.to_string());
        self.declarations.enums.push(EnumDecl::new(name, members));
    }

    fn add_typedef(&mut self, name: &str, target: CType) {
        debug!("parsed typedef {name} = {target}");
        self.type_names.insert(name.to_string());
        self.declarations
            .typedefs
            .push(TypedefDecl::new(name, target));
    }

    fn typedef(&mut self) -> Result<(), ParseError> {
        let start = self.peek().clone();
        let spec = self.specifiers()?;
        let mut declarators = Vec::new();
        loop {
            let declarator = self.declarator()?;
            if declarator.name.is_none() {
                return Err(self.expected("a typedef name"));
            }
            declarators.push(declarator);
            if self.eat_punct(';') {
                break;
            }
            self.expect_punct(',')?;
        }

        let mut base = spec.ty.clone();
        let mut defined = None;
        if let Some(body) = spec.body {
            let tag = body.tag().map(str::to_string);
            let name = declarators
                .iter()
                .find(|d| d.is_plain())
                .and_then(|d| d.name.clone())
                .or_else(|| tag.clone())
                .ok_or_else(|| {
                    ParseError::new(start.line, start.column, "anonymous type needs a plain typedef name")
                })?;
            match body {
                Body::Struct { fields, .. } => self.add_struct(&name, fields),
                Body::Enum { members, .. } => self.add_enum(&name, members),
            }
            if let Some(tag) = tag.filter(|tag| *tag != name) {
                self.records.insert(tag.clone());
                self.add_typedef(&tag, CType::new(&name));
            }
            base.name = name.clone();
            defined = Some(name);
        }

        for declarator in declarators {
            let Some(name) = declarator.name.clone() else {
                continue;
            };
            if declarator.is_plain() && defined.as_ref() == Some(&name) {
                continue;
            }
            match &spec.struct_tag {
                Some(tag) if declarator.pointers <= 1 && declarator.array.is_empty()
                    && declarator.function.is_none()
                    && !declarator.function_pointer =>
                {
                    self.type_names.insert(name.clone());
                    self.pending.push(PendingAlias {
                        name,
                        tag: tag.clone(),
                        pointer: declarator.pointers == 1,
                    });
                }
                _ => self.add_typedef(&name, declarator.apply(&base)),
            }
        }
        Ok(())
    }

    fn declaration(&mut self) -> Result<(), ParseError> {
        let spec = self.specifiers()?;
        if let Some(body) = &spec.body {
            match (body, body.tag().map(str::to_string)) {
                (Body::Struct { fields, .. }, Some(tag)) => self.add_struct(&tag, fields.clone()),
                (Body::Enum { members, .. }, Some(tag)) => self.add_enum(&tag, members.clone()),
                // Anonymous enums only contribute their constants
                (Body::Enum { .. }, None) => {}
                (Body::Struct { .. }, None) => {
                    return Err(self.error("anonymous struct outside a typedef"))
                }
            }
        } else if let Some(tag) = &spec.struct_tag {
            if self.is_punct(';') {
                self.forward.push(tag.clone());
            }
        }
        if self.eat_punct(';') {
            return Ok(());
        }

        loop {
            let declarator = self.declarator()?;
            match (&declarator.function, &declarator.name) {
                (Some((params, variadic)), Some(name)) => {
                    let returns = Declarator {
                        pointers: declarator.pointers,
                        ..Default::default()
                    }
                    .apply(&spec.ty);
                    let has_body = self.is_punct('{');
                    if has_body {
                        self.skip_group('{', '}')?;
                    }
                    if spec.is_static || has_body {
                        debug!("skipping non-exported function {name}");
                    } else {
                        if spec.is_inline {
                            debug!("binding inline declaration {name}");
                        }
                        self.declarations.functions.push(FunctionDecl {
                            name: name.clone(),
                            returns,
                            params: params.clone(),
                            variadic: *variadic,
                        });
                    }
                    if has_body {
                        return Ok(());
                    }
                }
                (None, Some(name)) => debug!("skipping variable {name}"),
                (_, None) => return Err(self.expected("a declaration name")),
            }
            if self.eat_punct(';') {
                return Ok(());
            }
            self.expect_punct(',')?;
        }
    }

    fn has_struct(&self, name: &str) -> bool {
        self.declarations.structs.iter().any(|s| s.name == name)
    }

    fn has_typedef(&self, name: &str) -> bool {
        self.declarations.typedefs.iter().any(|t| t.name == name)
    }

    /// Settle aliases and forward declarations now that every body is known
    fn finish(mut self) -> Declarations {
        for alias in std::mem::take(&mut self.pending) {
            if self.records.contains(&alias.tag) {
                if alias.tag != alias.name || alias.pointer {
                    let target = CType {
                        pointer: alias.pointer,
                        ..CType::new(&alias.tag)
                    };
                    self.add_typedef(&alias.name, target);
                }
                continue;
            }
            if !self.has_struct(&alias.name) {
                debug!("parsed opaque struct {} (tag {})", alias.name, alias.tag);
                self.declarations
                    .structs
                    .push(StructDecl::opaque(&alias.name));
            }
            if alias.tag != alias.name && !self.has_struct(&alias.tag) && !self.has_typedef(&alias.tag) {
                self.add_typedef(&alias.tag, CType::new(&alias.name));
            }
        }
        for tag in std::mem::take(&mut self.forward) {
            if !self.records.contains(&tag) && !self.has_struct(&tag) && !self.has_typedef(&tag) {
                debug!("parsed opaque struct {tag}");
                self.declarations.structs.push(StructDecl::opaque(&tag));
            }
        }
        self.declarations
    }
}

/// Canonical name of a combination of primitive type words
/// Whether primitive word `next` extends the words read so far into one type.
/// `typedef unsigned char bool;` stops before `bool`, which is then the declarator.
fn combines(words: &[String], sign_given: bool, next: &str) -> bool {
    let only = |allowed: &[&str]| words.iter().all(|w| allowed.contains(&w.as_str()));
    let longs = words.iter().filter(|w| *w == "long").count();
    match next {
        "char" => words.is_empty(),
        "int" => only(&["short", "long"]),
        "short" => only(&["int"]),
        "long" => longs < 2 && only(&["int", "long", "double"]),
        "double" => !sign_given && longs <= 1 && only(&["long"]),
        _ => words.is_empty() && !sign_given,
    }
}

fn primitive_name(words: &[String], sign_given: bool) -> Option<String> {
    let has = |word: &str| words.iter().any(|w| w == word);
    let longs = words.iter().filter(|w| *w == "long").count();
    let name = if has("double") {
        if longs > 0 {
            "long double"
        } else {
            "double"
        }
    } else if has("float") {
        "float"
    } else if has("char") {
        "char"
    } else if has("short") {
        "short"
    } else if longs >= 2 {
        "long long"
    } else if longs == 1 {
        "long"
    } else if has("void") {
        "void"
    } else if has("_Bool") || has("bool") {
        "bool"
    } else if has("int") || sign_given {
        "int"
    } else {
        return None;
    };
    Some(name.to_string())
}
