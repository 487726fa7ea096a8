use logos::Logos;

/// Tokens produced by scanning a JavaScript module.
///
/// Only the shapes that matter for linking get their own variant; everything
/// else collapses into `Ident`, `Number` or a one-character `Punct`, so any
/// input lexes without error.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    // ── Module keywords ────────────────────────────────────────────────
    #[token("import")]
    Import,
    #[token("export")]
    Export,

    // ── Literals ───────────────────────────────────────────────────────
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unquote(lex.slice()))]
    #[regex(r#"'([^'\\\n]|\\.)*'"#, |lex| unquote(lex.slice()))]
    Str(String),

    #[regex(r"`([^`\\]|\\(.|\n))*`")]
    Template,

    #[regex(r"[0-9][0-9a-zA-Z_]*")]
    Number,

    /// `/pattern/flags`. Never produced by the token rules themselves: the
    /// lexer rewrites a `Slash` in expression position into this.
    Regex,

    // Contextual words (`from`, `as`, `default`, `function`, ...) stay
    // identifiers; the module scanner interprets them by position.
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    // ── Punctuation ────────────────────────────────────────────────────
    #[token("*")]
    Star,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(".")]
    Dot,
    #[token("=")]
    Assign,
    #[token("/")]
    Slash,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    /// Any other single character.
    #[regex(r".", priority = 0)]
    Punct,
}

fn unquote(quoted: &str) -> String {
    quoted[1..quoted.len() - 1].to_string()
}

impl Token {
    /// Human-readable name for error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Token::Import => "'import'",
            Token::Export => "'export'",
            Token::Str(_) => "string",
            Token::Template => "template literal",
            Token::Number => "number",
            Token::Regex => "regular expression",
            Token::Ident(_) => "identifier",
            Token::Star => "'*'",
            Token::Comma => "','",
            Token::Semi => "';'",
            Token::Dot => "'.'",
            Token::Assign => "'='",
            Token::Slash => "'/'",
            Token::LBrace => "'{'",
            Token::RBrace => "'}'",
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::Punct => "punctuation",
        }
    }

    /// True for an identifier spelled exactly `word`.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self, Token::Ident(s) if s == word)
    }
}

/// A token with its source location (byte offset span).
#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub span: std::ops::Range<usize>,
}
