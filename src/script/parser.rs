//! Top-level function declaration scanner for generated bot scripts
//!
//! This is not a JavaScript parser. It tokenizes just enough of the language
//! (strings, template literals, comments, regex literals and bracket nesting)
//! to find the `function` and `async function` declarations that sit at the
//! top level of a script, and to cut their exact source text out.

use std::fmt;

use super::ScriptError;

/// Whether a declaration carries the `async` marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    AsyncFunctionDeclaration,
    FunctionDeclaration,
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AsyncFunctionDeclaration => f.write_str("AsyncFunctionDeclaration"),
            Self::FunctionDeclaration => f.write_str("FunctionDeclaration"),
        }
    }
}

/// One top-level function declaration found in a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub name: String,
    pub kind: FunctionKind,
    /// Exact source text from `async`/`function` to the closing brace
    pub body: String,
    /// Raw text of each parameter, trimmed
    pub params: Vec<String>,
}

impl FunctionDescriptor {
    pub fn is_async(&self) -> bool {
        self.kind == FunctionKind::AsyncFunctionDeclaration
    }
}

/// Find every top-level function declaration in `src`, in declaration order.
///
/// Other top-level statements are skipped over. Unbalanced brackets and
/// unterminated literals or comments are reported as [`ScriptError::Parse`].
pub fn parse_functions(src: &str) -> Result<Vec<FunctionDescriptor>, ScriptError> {
    let mut scanner = Scanner::new(src);
    let mut functions = Vec::new();

    loop {
        let newline = scanner.skip_trivia()?;
        if scanner.eof() {
            break;
        }

        if scanner.declaration_allowed(newline) {
            if let Some(function) = scanner.try_function()? {
                functions.push(function);
                scanner.prev = Some(b'}');
                scanner.prev_keyword = false;
                continue;
            }
        }

        match scanner.peek() {
            Some(b @ (b')' | b']' | b'}')) => {
                return Err(scanner.error(format!("unexpected '{}'", b as char)));
            }
            _ => scanner.skip_token()?,
        }
    }

    Ok(functions)
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Last significant byte consumed, used to tell regex literals from division
    prev: Option<u8>,
    /// Whether the last token was a keyword after which `/` starts a regex
    prev_keyword: bool,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            prev: None,
            prev_keyword: false,
        }
    }

    fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Parse {
            offset: self.pos,
            message: message.into(),
        }
    }

    /// Skip whitespace and comments. Returns whether a line break was crossed.
    fn skip_trivia(&mut self) -> Result<bool, ScriptError> {
        let mut newline = false;
        while let Some(b) = self.peek() {
            match b {
                b'\n' => {
                    newline = true;
                    self.pos += 1;
                }
                b if b.is_ascii_whitespace() => self.pos += 1,
                b'/' if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    let start = self.pos;
                    match self.src[self.pos + 2..].find("*/") {
                        Some(end) => {
                            let comment = &self.src[self.pos..self.pos + 2 + end + 2];
                            newline |= comment.contains('\n');
                            self.pos += 2 + end + 2;
                        }
                        None => {
                            self.pos = start;
                            return Err(self.error("unterminated block comment"));
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(newline)
    }

    /// A declaration may begin at the start of the script, after a statement
    /// terminator or block, or on a new line after a complete expression.
    fn declaration_allowed(&self, newline: bool) -> bool {
        match self.prev {
            None | Some(b';') | Some(b'}') => true,
            Some(b) if newline => is_ident_byte(b) || matches!(b, b')' | b']' | b'"' | b'\'' | b'`'),
            _ => false,
        }
    }

    fn regex_allowed(&self) -> bool {
        if self.prev_keyword {
            return true;
        }
        match self.prev {
            None => true,
            Some(b) => matches!(
                b,
                b'(' | b',' | b'=' | b':' | b'[' | b'!' | b'&' | b'|' | b'?' | b'{' | b'}' | b';'
                    | b'+' | b'-' | b'*' | b'%' | b'<' | b'>' | b'~' | b'^'
            ),
        }
    }

    fn read_ident(&mut self) -> Option<&'a str> {
        let start = self.pos;
        match self.peek() {
            Some(b) if is_ident_start(b) => self.pos += 1,
            _ => return None,
        }
        while matches!(self.peek(), Some(b) if is_ident_byte(b)) {
            self.pos += 1;
        }
        Some(&self.src[start..self.pos])
    }

    /// Parse a declaration at the cursor, or leave the cursor untouched and
    /// return `None` if the next tokens are not `function` / `async function`.
    fn try_function(&mut self) -> Result<Option<FunctionDescriptor>, ScriptError> {
        let start = self.pos;
        let kind = match self.read_ident() {
            Some("function") => FunctionKind::FunctionDeclaration,
            Some("async") => {
                // a line break after `async` ends it as a plain identifier
                if self.skip_trivia()? || self.read_ident() != Some("function") {
                    self.pos = start;
                    return Ok(None);
                }
                FunctionKind::AsyncFunctionDeclaration
            }
            _ => {
                self.pos = start;
                return Ok(None);
            }
        };

        self.skip_trivia()?;
        if self.peek() == Some(b'*') {
            self.pos += 1;
            self.skip_trivia()?;
        }

        let name = self
            .read_ident()
            .ok_or_else(|| self.error("function declaration requires a name"))?
            .to_string();

        self.skip_trivia()?;
        if self.peek() != Some(b'(') {
            return Err(self.error(format!("expected '(' after function {name}")));
        }
        let params_start = self.pos + 1;
        self.skip_balanced()?;
        let params = split_params(&self.src[params_start..self.pos - 1]);

        self.skip_trivia()?;
        if self.peek() != Some(b'{') {
            return Err(self.error(format!("expected '{{' to open body of function {name}")));
        }
        self.skip_balanced()?;

        Ok(Some(FunctionDescriptor {
            name,
            kind,
            body: self.src[start..self.pos].to_string(),
            params,
        }))
    }

    /// Consume one token at the top level
    fn skip_token(&mut self) -> Result<(), ScriptError> {
        let Some(b) = self.peek() else {
            return Ok(());
        };
        let mut keyword = false;
        match b {
            b'(' | b'[' | b'{' => self.skip_balanced()?,
            b'"' | b'\'' => self.skip_string(b)?,
            b'`' => self.skip_template()?,
            b'/' if self.regex_allowed() => self.skip_regex()?,
            b if is_ident_start(b) => {
                keyword = self.read_ident().is_some_and(precedes_regex);
            }
            _ => self.pos += 1,
        }
        self.prev = Some(self.bytes[self.pos - 1]);
        self.prev_keyword = keyword;
        Ok(())
    }

    /// Consume an opening bracket and everything up to its matching closer
    fn skip_balanced(&mut self) -> Result<(), ScriptError> {
        let open_at = self.pos;
        let Some(open) = self.peek() else {
            return Err(self.error("expected an opening bracket"));
        };
        self.pos += 1;
        self.prev = Some(open);
        self.prev_keyword = false;
        let mut stack = vec![closer_for(open)];

        while let Some(&expected) = stack.last() {
            self.skip_trivia()?;
            let Some(b) = self.peek() else {
                self.pos = open_at;
                return Err(self.error(format!("unclosed '{}'", open as char)));
            };
            let mut keyword = false;
            match b {
                b'(' | b'[' | b'{' => {
                    stack.push(closer_for(b));
                    self.pos += 1;
                }
                b')' | b']' | b'}' => {
                    if b != expected {
                        return Err(self.error(format!(
                            "expected '{}' but found '{}'",
                            expected as char, b as char
                        )));
                    }
                    stack.pop();
                    self.pos += 1;
                }
                b'"' | b'\'' => self.skip_string(b)?,
                b'`' => self.skip_template()?,
                b'/' if self.regex_allowed() => self.skip_regex()?,
                b if is_ident_start(b) => {
                    keyword = self.read_ident().is_some_and(precedes_regex);
                }
                _ => self.pos += 1,
            }
            self.prev = Some(self.bytes[self.pos - 1]);
            self.prev_keyword = keyword;
        }
        Ok(())
    }

    fn skip_string(&mut self, quote: u8) -> Result<(), ScriptError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek() {
                Some(b'\\') => self.pos += 2,
                Some(b) if b == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b'\n') | None => {
                    self.pos = start;
                    return Err(self.error("unterminated string literal"));
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn skip_template(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.peek() {
                Some(b'\\') => self.pos += 2,
                Some(b'`') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b'$') if self.peek_at(1) == Some(b'{') => {
                    self.pos += 1;
                    self.skip_balanced()?;
                }
                Some(_) => self.pos += 1,
                None => {
                    self.pos = start;
                    return Err(self.error("unterminated template literal"));
                }
            }
        }
    }

    fn skip_regex(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        self.pos += 1;
        let mut in_class = false;
        loop {
            match self.peek() {
                Some(b'\\') => self.pos += 2,
                Some(b'[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(b']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some(b'/') if !in_class => {
                    self.pos += 1;
                    while matches!(self.peek(), Some(b) if b.is_ascii_alphabetic()) {
                        self.pos += 1;
                    }
                    return Ok(());
                }
                Some(b'\n') | None => {
                    self.pos = start;
                    return Err(self.error("unterminated regular expression"));
                }
                Some(_) => self.pos += 1,
            }
        }
    }
}

fn closer_for(open: u8) -> u8 {
    match open {
        b'(' => b')',
        b'[' => b']',
        _ => b'}',
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_ident_byte(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

/// Keywords that end in operand position, so a following `/` opens a regex
fn precedes_regex(ident: &str) -> bool {
    matches!(
        ident,
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
    )
}

/// Split a parameter list on its top-level commas.
///
/// Comments are dropped. A trailing comma does not introduce an extra parameter.
fn split_params(list: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    let mut chars = list.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '/' if chars.peek() == Some(&'/') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
                current.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut last = ' ';
                for skipped in chars.by_ref() {
                    if last == '*' && skipped == '/' {
                        break;
                    }
                    last = skipped;
                }
                current.push(' ');
            }
            '"' | '\'' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => params.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    params.push(current);

    let mut params: Vec<String> = params.into_iter().map(|p| p.trim().to_string()).collect();
    if params.last().is_some_and(|p| p.is_empty()) {
        params.pop();
    }
    params
}
