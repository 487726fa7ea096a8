use logos::Logos;

use crate::token::{Spanned, Token};

/// Tokenize a JavaScript source string into spanned tokens.
///
/// Never fails: input the token set cannot describe is kept as `Punct`, the
/// linker only needs to find module syntax, not validate the program.
///
/// A `/` where an expression may start begins a regular expression literal,
/// whose body is consumed whole so that `/*`, quotes or `import` inside it
/// are not read as code.
pub fn lex(source: &str) -> Vec<Spanned> {
    let mut tokens: Vec<Spanned> = Vec::new();
    let mut lexer = Token::lexer(source);

    while let Some(result) = lexer.next() {
        let mut token = result.unwrap_or(Token::Punct);
        if token == Token::Slash && regex_allowed(source, tokens.last()) {
            if let Some(len) = regex_len(lexer.remainder()) {
                lexer.bump(len);
                token = Token::Regex;
            }
        }
        tokens.push(Spanned {
            token,
            span: lexer.span(),
        });
    }

    tokens
}

/// Whether a `/` after `prev` starts a regex rather than dividing.
fn regex_allowed(source: &str, prev: Option<&Spanned>) -> bool {
    let Some(prev) = prev else {
        return true;
    };
    match &prev.token {
        Token::Ident(word) => matches!(
            word.as_str(),
            "return"
                | "typeof"
                | "instanceof"
                | "in"
                | "of"
                | "new"
                | "delete"
                | "void"
                | "throw"
                | "case"
                | "do"
                | "else"
                | "yield"
                | "await"
        ),
        Token::Number | Token::Str(_) | Token::Template | Token::Regex | Token::RParen => false,
        Token::Punct => &source[prev.span.clone()] != "]",
        _ => true,
    }
}

/// Length of a regex literal's remainder after the opening `/`: body,
/// closing `/` and flags. `None` if the line ends first.
fn regex_len(rest: &str) -> Option<usize> {
    let mut in_class = false;
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                if escaped == '\n' {
                    return None;
                }
            }
            '\n' | '\r' => return None,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                let body = i + 1;
                let flags = rest[body..]
                    .find(|c: char| !c.is_ascii_alphabetic())
                    .unwrap_or(rest.len() - body);
                return Some(body + flags);
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn lex_named_import() {
        let tokens = kinds("import { a as b, c } from './mod.js';");
        assert_eq!(tokens[0], Token::Import);
        assert_eq!(tokens[1], Token::LBrace);
        assert!(tokens[2].is_word("a"));
        assert!(tokens[3].is_word("as"));
        assert!(tokens[4].is_word("b"));
        assert_eq!(tokens[5], Token::Comma);
        assert!(tokens[6].is_word("c"));
        assert_eq!(tokens[7], Token::RBrace);
        assert!(tokens[8].is_word("from"));
        assert_eq!(tokens[9], Token::Str("./mod.js".to_string()));
        assert_eq!(tokens[10], Token::Semi);
        assert_eq!(tokens.len(), 11);
    }

    #[test]
    fn lex_skips_comments() {
        let tokens = kinds("// import x from 'y'\n/* export * from 'z' */ export const q = 1;");
        assert_eq!(tokens[0], Token::Export);
        assert!(tokens[1].is_word("const"));
    }

    #[test]
    fn lex_strings_hide_keywords() {
        let tokens = kinds(r#"const s = "import x from 'y'"; const t = `export ${s}`;"#);
        assert!(!tokens.contains(&Token::Import));
        assert!(!tokens.contains(&Token::Export));
        assert!(tokens.contains(&Token::Template));
    }

    #[test]
    fn lex_import_meta_url() {
        let tokens = kinds("new URL('app_bg.wasm', import.meta.url)");
        assert!(tokens[0].is_word("new"));
        assert!(tokens[1].is_word("URL"));
        assert_eq!(tokens[2], Token::LParen);
        assert_eq!(tokens[3], Token::Str("app_bg.wasm".to_string()));
        assert_eq!(tokens[5], Token::Import);
        assert_eq!(tokens[6], Token::Dot);
        assert!(tokens[7].is_word("meta"));
    }

    #[test]
    fn lex_unknown_characters_become_punct() {
        let tokens = kinds("a => #b @ c");
        assert!(tokens.iter().any(|t| *t == Token::Punct));
        assert!(tokens[0].is_word("a"));
        assert!(tokens.last().unwrap().is_word("c"));
    }

    #[test]
    fn regex_literal_hides_comment_openers() {
        let source = "const re = /a\\/*/g;\nimport { u } from './util.js';";
        let tokens = lex(source);
        let regex = tokens.iter().find(|t| t.token == Token::Regex).unwrap();
        assert_eq!(&source[regex.span.clone()], "/a\\/*/g");
        assert!(tokens.iter().any(|t| t.token == Token::Import));
    }

    #[test]
    fn regex_character_class_may_contain_slash() {
        let source = "if (ok) x = /[/*]+/.test(s); export const y = 1;";
        let tokens = lex(source);
        let regex = tokens.iter().find(|t| t.token == Token::Regex).unwrap();
        assert_eq!(&source[regex.span.clone()], "/[/*]+/");
        assert!(tokens.iter().any(|t| t.token == Token::Export));
    }

    #[test]
    fn division_stays_division() {
        let tokens = kinds("const half = total / 2 / count; a[0] / b; f() / g");
        assert!(!tokens.contains(&Token::Regex));
        assert_eq!(tokens.iter().filter(|t| **t == Token::Slash).count(), 4);
    }

    #[test]
    fn unterminated_regex_falls_back_to_slash() {
        let tokens = kinds("x = /oops\nexport const y = 1;");
        assert!(tokens.contains(&Token::Slash));
        assert!(tokens.contains(&Token::Export));
    }

    #[test]
    fn spans_point_into_source() {
        let source = "export default init;";
        let tokens = lex(source);
        assert_eq!(&source[tokens[0].span.clone()], "export");
        assert_eq!(&source[tokens[1].span.clone()], "default");
    }
}
