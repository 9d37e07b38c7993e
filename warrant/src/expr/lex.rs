//! Expression tokenizer.

use crate::error::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    True,
    False,
    In,
    AndAnd,  // &&
    OrOr,    // ||
    Not,     // !
    Eq,      // ==
    Ne,      // !=
    Lt,      // <
    Le,      // <=
    Gt,      // >
    Ge,      // >=
    Plus,    // +
    Minus,   // -
    Star,    // *
    Slash,   // /
    Percent, // %
    LParen,  // (
    RParen,  // )
    LBrack,  // [
    RBrack,  // ]
    Comma,   // ,
    Dot,     // .
}

/// Tokenize an expression string.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Tok>, EvalError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Tok::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Tok::LBrack);
                i += 1;
            }
            ']' => {
                tokens.push(Tok::RBrack);
                i += 1;
            }
            ',' => {
                tokens.push(Tok::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Tok::Dot);
                i += 1;
            }
            '+' => {
                tokens.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Tok::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Tok::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Tok::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Tok::Percent);
                i += 1;
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Tok::AndAnd);
                    i += 2;
                } else {
                    return Err(EvalError::Parse("single '&', expected '&&'".into()));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Tok::OrOr);
                    i += 2;
                } else {
                    return Err(EvalError::Parse("single '|', expected '||'".into()));
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::Eq);
                    i += 2;
                } else {
                    return Err(EvalError::Parse("single '=', expected '=='".into()));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::Ne);
                    i += 2;
                } else {
                    tokens.push(Tok::Not);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::Le);
                    i += 2;
                } else {
                    tokens.push(Tok::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Tok::Ge);
                    i += 2;
                } else {
                    tokens.push(Tok::Gt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                i += 1;
                let mut s = String::new();
                let mut closed = false;
                while i < chars.len() {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        s.push(chars[i + 1]);
                        i += 2;
                    } else if chars[i] == quote {
                        i += 1;
                        closed = true;
                        break;
                    } else {
                        s.push(chars[i]);
                        i += 1;
                    }
                }
                if !closed {
                    return Err(EvalError::Parse(format!("unterminated string '{}'", s)));
                }
                tokens.push(Tok::Str(s));
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                let mut is_float = false;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                // A dot followed by a digit makes this a float; a bare dot
                // would be attribute access on a number, which is malformed
                // anyway.
                if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                    is_float = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    let n = text
                        .parse::<f64>()
                        .map_err(|e| EvalError::Parse(format!("bad number '{}': {}", text, e)))?;
                    tokens.push(Tok::Float(n));
                } else {
                    let n = text
                        .parse::<i64>()
                        .map_err(|e| EvalError::Parse(format!("bad number '{}': {}", text, e)))?;
                    tokens.push(Tok::Int(n));
                }
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "true" => tokens.push(Tok::True),
                    "false" => tokens.push(Tok::False),
                    "in" => tokens.push(Tok::In),
                    _ => tokens.push(Tok::Ident(word)),
                }
            }
            other => {
                return Err(EvalError::Parse(format!("unexpected character '{}'", other)));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_matcher() {
        let toks = tokenize("r_sub == p_sub && g(r_sub, p_sub)").unwrap();
        assert_eq!(
            toks,
            vec![
                Tok::Ident("r_sub".into()),
                Tok::Eq,
                Tok::Ident("p_sub".into()),
                Tok::AndAnd,
                Tok::Ident("g".into()),
                Tok::LParen,
                Tok::Ident("r_sub".into()),
                Tok::Comma,
                Tok::Ident("p_sub".into()),
                Tok::RParen,
            ]
        );
    }

    #[test]
    fn tokenize_numbers() {
        assert_eq!(
            tokenize("18 2.5").unwrap(),
            vec![Tok::Int(18), Tok::Float(2.5)]
        );
    }

    #[test]
    fn tokenize_strings_with_escapes() {
        assert_eq!(
            tokenize(r#"'al\'ice' "bob""#).unwrap(),
            vec![Tok::Str("al'ice".into()), Tok::Str("bob".into())]
        );
    }

    #[test]
    fn tokenize_attr_access() {
        assert_eq!(
            tokenize("r_sub.Age >= 18").unwrap(),
            vec![
                Tok::Ident("r_sub".into()),
                Tok::Dot,
                Tok::Ident("Age".into()),
                Tok::Ge,
                Tok::Int(18),
            ]
        );
    }

    #[test]
    fn tokenize_rejects_single_ampersand() {
        assert!(tokenize("a & b").is_err());
    }

    #[test]
    fn tokenize_unterminated_string() {
        assert!(tokenize("'oops").is_err());
    }
}
