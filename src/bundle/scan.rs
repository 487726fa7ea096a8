//! Module syntax scanner. Finds the import/export statements and
//! `new URL(.., import.meta.url)` file references in a token stream.
//!
//! Only top-level module syntax is recognised, plus the names each
//! top-level declaration binds. Everything else is opaque program text the
//! linker copies through unchanged.

use std::ops::Range;

use crate::token::{Spanned, Token};

/// What a module imports, exports and references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleSyntax {
    pub imports: Vec<ImportDecl>,
    pub exports: Vec<ExportDecl>,
    pub asset_refs: Vec<AssetRef>,
    /// Every name a top-level statement declares, exported or not.
    pub declarations: Vec<Declared>,
}

/// A top-level binding introduced by `let`, `const`, `var`, `function` or
/// `class`.
#[derive(Debug, Clone, PartialEq)]
pub struct Declared {
    pub name: String,
    pub kind: DeclKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
    Function,
    Class,
}

impl DeclKind {
    fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "var" => Some(DeclKind::Var),
            "let" => Some(DeclKind::Let),
            "const" => Some(DeclKind::Const),
            "function" | "async" => Some(DeclKind::Function),
            "class" => Some(DeclKind::Class),
            _ => None,
        }
    }

    /// `let` and `var` bindings can be reassigned after they are read.
    pub fn is_mutable(self) -> bool {
        matches!(self, DeclKind::Var | DeclKind::Let)
    }
}

/// `import ... from "specifier"` or `import "specifier"`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub specifier: String,
    /// Empty for a side-effect import.
    pub bindings: Vec<ImportBinding>,
    /// Whole statement including a trailing `;`.
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportBinding {
    /// `import local from ..`
    Default(String),
    /// `import { imported as local } from ..`
    Named { imported: String, local: String },
    /// `import * as local from ..`
    Namespace(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportDecl {
    /// `export function f`, `export const a = .., b = ..`. The span covers
    /// the `export` keyword and the whitespace after it.
    Declaration {
        names: Vec<String>,
        keyword_span: Range<usize>,
    },
    /// `export default function f` / `export default class C`.
    /// The span covers `export default `.
    DefaultNamed {
        local: String,
        keyword_span: Range<usize>,
    },
    /// `export default <expression>`. The span covers `export default`.
    DefaultExpr { keyword_span: Range<usize> },
    /// `export { local as exported };`
    List {
        items: Vec<(String, String)>,
        span: Range<usize>,
    },
    /// `export { imported as exported } from ".."`
    ReexportNamed {
        specifier: String,
        items: Vec<(String, String)>,
        span: Range<usize>,
    },
    /// `export * from ".."`
    ReexportAll {
        specifier: String,
        span: Range<usize>,
    },
    /// `export * as name from ".."`
    ReexportNamespace {
        specifier: String,
        name: String,
        span: Range<usize>,
    },
}

/// A `new URL("file", import.meta.url)` reference to a sibling file.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRef {
    pub specifier: String,
    /// Span of the string literal, quotes included.
    pub span: Range<usize>,
}

impl ModuleSyntax {
    pub fn declaration(&self, name: &str) -> Option<&Declared> {
        self.declarations.iter().find(|d| d.name == name)
    }

    /// Relative specifiers of imports and re-exports, in source order.
    pub fn local_specifiers(&self) -> Vec<&str> {
        let from_imports = self.imports.iter().map(|i| i.specifier.as_str());
        let from_exports = self.exports.iter().filter_map(ExportDecl::specifier);
        from_imports
            .chain(from_exports)
            .filter(|s| is_local_specifier(s))
            .collect()
    }
}

impl ExportDecl {
    /// Source module of a re-export.
    pub fn specifier(&self) -> Option<&str> {
        match self {
            ExportDecl::ReexportNamed { specifier, .. }
            | ExportDecl::ReexportAll { specifier, .. }
            | ExportDecl::ReexportNamespace { specifier, .. } => Some(specifier),
            _ => None,
        }
    }
}

/// `./x.js` and `../x.js` are linked; bare names and URLs stay external.
pub fn is_local_specifier(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

/// Scan `tokens` (lexed from `source`) for module syntax.
pub fn scan(source: &str, tokens: &[Spanned]) -> Result<ModuleSyntax, String> {
    let mut scanner = Scanner {
        source,
        tokens,
        pos: 0,
        depth: 0,
        syntax: ModuleSyntax::default(),
    };
    scanner.run()?;
    Ok(scanner.syntax)
}

struct Scanner<'a> {
    source: &'a str,
    tokens: &'a [Spanned],
    pos: usize,
    /// Bracket nesting at the cursor; 0 is module top level.
    depth: i32,
    syntax: ModuleSyntax,
}

impl<'a> Scanner<'a> {
    fn run(&mut self) -> Result<(), String> {
        while let Some(current) = self.tokens.get(self.pos) {
            // `obj.import` / `obj.export` are property names.
            let after_dot = self.pos > 0 && self.tokens[self.pos - 1].token == Token::Dot;
            match &current.token {
                Token::Import if !after_dot => self.import()?,
                Token::Export if !after_dot => self.export()?,
                Token::Ident(word) if word == "new" => {
                    if let Some(asset) = self.asset_ref() {
                        self.syntax.asset_refs.push(asset);
                    }
                    self.pos += 1;
                }
                Token::Ident(word)
                    if self.depth == 0
                        && !after_dot
                        && DeclKind::from_keyword(word).is_some()
                        && self.at_statement_start() =>
                {
                    self.declaration(word);
                }
                _ => {
                    self.depth += bracket_delta(self.source, current);
                    self.pos += 1;
                }
            }
        }
        Ok(())
    }

    // ── Cursor helpers ────────────────────────────────────────────────

    fn peek(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset).map(|t| &t.token)
    }

    fn peek_word(&self, word: &str) -> bool {
        self.peek(0).is_some_and(|t| t.is_word(word))
    }

    fn span_at(&self, offset: usize) -> Range<usize> {
        match self.tokens.get(self.pos + offset) {
            Some(t) => t.span.clone(),
            None => self.source.len()..self.source.len(),
        }
    }

    /// True when the token under the cursor begins a statement: first in
    /// the file, after `;` or `}`, or on a new line after a complete
    /// expression.
    fn at_statement_start(&self) -> bool {
        let Some(prev) = self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) else {
            return true;
        };
        match prev.token {
            Token::Semi | Token::RBrace => true,
            Token::Ident(_)
            | Token::Number
            | Token::Str(_)
            | Token::Template
            | Token::Regex
            | Token::RParen => {
                let gap = prev.span.end..self.span_at(0).start;
                self.source[gap].contains('\n')
            }
            _ => false,
        }
    }

    fn declare(&mut self, name: String, kind: DeclKind) {
        if self.syntax.declaration(&name).is_none() {
            self.syntax.declarations.push(Declared { name, kind });
        }
    }

    fn describe_next(&self) -> &'static str {
        self.peek(0).map_or("end of file", Token::describe)
    }

    fn expect(&mut self, token: Token) -> Result<(), String> {
        if self.peek(0) == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected {}, got {}", token.describe(), self.describe_next()))
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<(), String> {
        if self.peek_word(word) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected '{word}', got {}", self.describe_next()))
        }
    }

    fn ident(&mut self) -> Result<String, String> {
        match self.peek(0) {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(name.clone())
            }
            _ => Err(format!("expected identifier, got {}", self.describe_next())),
        }
    }

    /// An identifier or a string-literal module export name.
    fn export_name(&mut self) -> Result<String, String> {
        match self.peek(0) {
            Some(Token::Ident(name)) | Some(Token::Str(name)) => {
                self.pos += 1;
                Ok(name.clone())
            }
            _ => Err(format!("expected export name, got {}", self.describe_next())),
        }
    }

    fn string(&mut self) -> Result<String, String> {
        match self.peek(0) {
            Some(Token::Str(value)) => {
                self.pos += 1;
                Ok(value.clone())
            }
            _ => Err(format!("expected module specifier, got {}", self.describe_next())),
        }
    }

    /// Skip `with { type: "json" }` import attributes.
    fn skip_attributes(&mut self) {
        if !(self.peek_word("with") || self.peek_word("assert")) || self.peek(1) != Some(&Token::LBrace) {
            return;
        }
        self.pos += 1;
        let mut depth = 0usize;
        while let Some(token) = self.peek(0) {
            self.pos += 1;
            match token {
                Token::LBrace => depth += 1,
                Token::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    /// Consume an optional `;` and return the statement's end offset.
    fn finish_statement(&mut self) -> usize {
        if self.peek(0) == Some(&Token::Semi) {
            self.pos += 1;
        }
        self.tokens[self.pos - 1].span.end
    }

    // ── Imports ───────────────────────────────────────────────────────

    fn import(&mut self) -> Result<(), String> {
        let start = self.span_at(0).start;
        self.pos += 1;

        // `import(..)` and `import.meta` are expressions.
        if matches!(self.peek(0), Some(Token::LParen) | Some(Token::Dot)) {
            return Ok(());
        }

        let bindings = if matches!(self.peek(0), Some(Token::Str(_))) {
            Vec::new()
        } else {
            let bindings = self.import_clause()?;
            self.expect_word("from")?;
            bindings
        };
        let specifier = self.string()?;
        self.skip_attributes();
        let end = self.finish_statement();

        self.syntax.imports.push(ImportDecl {
            specifier,
            bindings,
            span: start..end,
        });
        Ok(())
    }

    fn import_clause(&mut self) -> Result<Vec<ImportBinding>, String> {
        let mut bindings = Vec::new();

        if let Some(Token::Ident(name)) = self.peek(0) {
            self.pos += 1;
            bindings.push(ImportBinding::Default(name.clone()));
            if self.peek(0) != Some(&Token::Comma) {
                return Ok(bindings);
            }
            self.pos += 1;
        }

        match self.peek(0) {
            Some(Token::Star) => {
                self.pos += 1;
                self.expect_word("as")?;
                bindings.push(ImportBinding::Namespace(self.ident()?));
            }
            Some(Token::LBrace) => {
                for (imported, local) in self.specifier_list()? {
                    bindings.push(ImportBinding::Named { imported, local });
                }
            }
            _ => {
                return Err(format!(
                    "expected import bindings, got {}",
                    self.describe_next()
                ));
            }
        }
        Ok(bindings)
    }

    /// `{ a, b as c, "d-e" as f }` → `[(a, a), (b, c), (d-e, f)]`.
    fn specifier_list(&mut self) -> Result<Vec<(String, String)>, String> {
        self.expect(Token::LBrace)?;
        let mut items = Vec::new();
        loop {
            if self.peek(0) == Some(&Token::RBrace) {
                self.pos += 1;
                return Ok(items);
            }
            let name = self.export_name()?;
            let alias = if self.peek_word("as") {
                self.pos += 1;
                self.export_name()?
            } else {
                name.clone()
            };
            items.push((name, alias));

            match self.peek(0) {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RBrace) => {}
                _ => return Err(format!("expected ',' or '}}', got {}", self.describe_next())),
            }
        }
    }

    // ── Exports ───────────────────────────────────────────────────────

    fn export(&mut self) -> Result<(), String> {
        let start = self.span_at(0).start;
        self.pos += 1;

        let decl = match self.peek(0) {
            Some(Token::Star) => {
                self.pos += 1;
                if self.peek_word("as") {
                    self.pos += 1;
                    let name = self.export_name()?;
                    self.expect_word("from")?;
                    let specifier = self.string()?;
                    self.skip_attributes();
                    let end = self.finish_statement();
                    ExportDecl::ReexportNamespace {
                        specifier,
                        name,
                        span: start..end,
                    }
                } else {
                    self.expect_word("from")?;
                    let specifier = self.string()?;
                    self.skip_attributes();
                    let end = self.finish_statement();
                    ExportDecl::ReexportAll {
                        specifier,
                        span: start..end,
                    }
                }
            }
            Some(Token::LBrace) => {
                let items = self.specifier_list()?;
                if self.peek_word("from") {
                    self.pos += 1;
                    let specifier = self.string()?;
                    self.skip_attributes();
                    let end = self.finish_statement();
                    ExportDecl::ReexportNamed {
                        specifier,
                        items,
                        span: start..end,
                    }
                } else {
                    let end = self.finish_statement();
                    ExportDecl::List {
                        items,
                        span: start..end,
                    }
                }
            }
            Some(Token::Ident(word)) if word == "default" => {
                let default_end = self.span_at(0).end;
                self.pos += 1;
                match self.default_declaration_name() {
                    Some((local, kind)) => {
                        self.declare(local.clone(), kind);
                        ExportDecl::DefaultNamed {
                            local,
                            keyword_span: start..self.span_at(0).start,
                        }
                    }
                    None => ExportDecl::DefaultExpr {
                        keyword_span: start..default_end,
                    },
                }
            }
            Some(Token::Ident(word)) if matches!(word.as_str(), "function" | "class" | "async") => {
                let keyword_span = start..self.span_at(0).start;
                let kind = if word == "class" { DeclKind::Class } else { DeclKind::Function };
                let name = self.function_or_class_name()?;
                self.declare(name.clone(), kind);
                ExportDecl::Declaration {
                    names: vec![name],
                    keyword_span,
                }
            }
            Some(Token::Ident(word)) if matches!(word.as_str(), "const" | "let" | "var") => {
                let keyword_span = start..self.span_at(0).start;
                let kind = DeclKind::from_keyword(word).unwrap_or(DeclKind::Var);
                self.pos += 1;
                let names = self.declarator_names()?;
                for name in &names {
                    self.declare(name.clone(), kind);
                }
                ExportDecl::Declaration { names, keyword_span }
            }
            _ => {
                return Err(format!(
                    "unsupported export form starting with {}",
                    self.describe_next()
                ));
            }
        };

        self.syntax.exports.push(decl);
        Ok(())
    }

    /// Name of `function f`, `async function f`, `function* f` or `class C`
    /// following `export default`, without consuming anything.
    fn default_declaration_name(&self) -> Option<(String, DeclKind)> {
        let mut offset = 0;
        if self.peek(offset)?.is_word("async") {
            offset += 1;
        }
        let keyword = self.peek(offset)?;
        let kind = if keyword.is_word("function") {
            offset += 1;
            if self.peek(offset) == Some(&Token::Star) {
                offset += 1;
            }
            DeclKind::Function
        } else if keyword.is_word("class") && offset == 0 {
            offset += 1;
            DeclKind::Class
        } else {
            return None;
        };
        match self.peek(offset)? {
            Token::Ident(name) if name != "extends" => Some((name.clone(), kind)),
            _ => None,
        }
    }

    fn function_or_class_name(&mut self) -> Result<String, String> {
        if self.peek_word("async") {
            self.pos += 1;
            self.expect_word("function")?;
        } else if self.peek_word("function") || self.peek_word("class") {
            self.pos += 1;
        }
        if self.peek(0) == Some(&Token::Star) {
            self.pos += 1;
        }
        self.ident()
    }

    /// Names bound by an exported `const a = .., b = ..`.
    fn declarator_names(&mut self) -> Result<Vec<String>, String> {
        if !matches!(self.peek(0), Some(Token::Ident(_))) {
            return Err(format!(
                "destructuring exports are not supported (got {})",
                self.describe_next()
            ));
        }
        Ok(self.binding_names())
    }

    /// Record the names a top-level declaration binds, with the cursor on
    /// its keyword. Declarations are never errors: a shape that doesn't fit
    /// is skipped as ordinary program text.
    fn declaration(&mut self, word: &str) {
        let Some(kind) = DeclKind::from_keyword(word) else {
            self.pos += 1;
            return;
        };
        match kind {
            DeclKind::Function | DeclKind::Class => {
                let mut offset = 0;
                if self.peek_word("async") {
                    if !self.peek(1).is_some_and(|t| t.is_word("function")) {
                        self.pos += 1;
                        return;
                    }
                    offset += 1;
                }
                offset += 1;
                if self.peek(offset) == Some(&Token::Star) {
                    offset += 1;
                }
                if let Some(Token::Ident(name)) = self.peek(offset) {
                    self.declare(name.clone(), kind);
                    self.pos += offset + 1;
                } else {
                    self.pos += offset;
                }
            }
            DeclKind::Var | DeclKind::Let | DeclKind::Const => {
                self.pos += 1;
                for name in self.binding_names() {
                    self.declare(name, kind);
                }
            }
        }
    }

    /// Names bound by the declarators at the cursor: `a = .., b`,
    /// `{ x, y: z } = ..`, `[p, ...q] = ..`. Looks ahead without moving the
    /// cursor so initialisers are still scanned for file references.
    fn binding_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut index = self.pos;
        let mut first = true;
        loop {
            let Some(target) = self.tokens.get(index) else {
                return names;
            };
            if matches!(target.token, Token::Ident(_)) || bracket_delta(self.source, target) == 1 {
                if let Token::Ident(name) = &target.token {
                    // After the first declarator, `, name` must look like a
                    // binding so a following expression statement isn't read
                    // as one.
                    let next = self.tokens.get(index + 1).map(|t| &t.token);
                    let looks_bound =
                        matches!(next, Some(Token::Assign | Token::Comma | Token::Semi) | None);
                    if !first && !looks_bound {
                        return names;
                    }
                    names.push(name.clone());
                    index += 1;
                } else {
                    index = self.pattern_names(index, &mut names);
                }
            } else {
                return names;
            }
            first = false;

            // Skip the initialiser up to the next top-level `,`.
            let mut depth = 0i32;
            loop {
                let Some(spanned) = self.tokens.get(index) else {
                    return names;
                };
                match &spanned.token {
                    Token::Semi | Token::Import | Token::Export if depth == 0 => return names,
                    Token::Ident(word) if depth == 0 && DeclKind::from_keyword(word).is_some() => {
                        return names;
                    }
                    Token::Comma if depth == 0 => {
                        index += 1;
                        break;
                    }
                    _ => depth += bracket_delta(self.source, spanned),
                }
                if depth < 0 {
                    return names;
                }
                index += 1;
            }
        }
    }

    /// Collect the names a destructuring pattern starting at `start` binds.
    /// Returns the index just past the pattern.
    fn pattern_names(&self, start: usize, names: &mut Vec<String>) -> usize {
        let mut depth = 0i32;
        let mut index = start;
        while let Some(spanned) = self.tokens.get(index) {
            match &spanned.token {
                Token::Assign if depth > 0 => {
                    index = self.skip_default(index + 1);
                    continue;
                }
                // `{ key: target }` binds `target`, shorthand `{ a }` binds `a`.
                Token::Ident(name) => {
                    let binds = self.tokens.get(index + 1).is_some_and(|next| {
                        matches!(next.token, Token::Comma | Token::RBrace | Token::Assign)
                            || (next.token == Token::Punct && &self.source[next.span.clone()] == "]")
                    });
                    if binds {
                        names.push(name.clone());
                    }
                }
                _ => depth += bracket_delta(self.source, spanned),
            }
            index += 1;
            if depth <= 0 {
                return index;
            }
        }
        index
    }

    /// Skip a default value inside a pattern, stopping at the `,` or closing
    /// bracket that ends it.
    fn skip_default(&self, mut index: usize) -> usize {
        let mut depth = 0i32;
        while let Some(spanned) = self.tokens.get(index) {
            if depth == 0 && spanned.token == Token::Comma {
                return index;
            }
            depth += bracket_delta(self.source, spanned);
            if depth < 0 {
                return index;
            }
            index += 1;
        }
        index
    }

    // ── File references ───────────────────────────────────────────────

    /// `new URL("file", import.meta.url)` with the cursor on `new`.
    fn asset_ref(&self) -> Option<AssetRef> {
        let specifier = match self.peek(3)? {
            Token::Str(s) => s.clone(),
            _ => return None,
        };
        let shape = self.peek(1)?.is_word("URL")
            && self.peek(2)? == &Token::LParen
            && self.peek(4)? == &Token::Comma
            && self.peek(5)? == &Token::Import
            && self.peek(6)? == &Token::Dot
            && self.peek(7)?.is_word("meta")
            && self.peek(8)? == &Token::Dot
            && self.peek(9)?.is_word("url");
        if !shape || !is_file_reference(&specifier) {
            return None;
        }
        Some(AssetRef {
            specifier,
            span: self.span_at(3),
        })
    }
}

/// +1 for an opening bracket, -1 for a closing one.
fn bracket_delta(source: &str, spanned: &Spanned) -> i32 {
    match &spanned.token {
        Token::LParen | Token::LBrace => 1,
        Token::RParen | Token::RBrace => -1,
        Token::Punct => match &source[spanned.span.clone()] {
            "[" => 1,
            "]" => -1,
            _ => 0,
        },
        _ => 0,
    }
}

/// A specifier naming a file next to the module rather than a URL.
fn is_file_reference(specifier: &str) -> bool {
    !specifier.is_empty()
        && !specifier.contains(':')
        && !specifier.starts_with('/')
        && !specifier.starts_with('#')
        && !specifier.starts_with('?')
}
