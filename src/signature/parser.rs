//! Parser for the lowered signature text format.

use thiserror::Error;

use super::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at offset {offset}")]
pub struct SignatureParseError {
    pub offset: usize,
    pub message: String,
}

pub fn parse_signature(text: &str) -> Result<LoweredFunction, SignatureParseError> {
    let mut parser = Parser { text, pos: 0 };
    let func = parser.parse_function()?;
    parser.skip_whitespace();
    if !parser.is_eof() {
        return Err(parser.error("Unexpected trailing input"));
    }
    Ok(func)
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> SignatureParseError {
        SignatureParseError { offset: self.pos, message: message.into() }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn current_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        loop {
            if self.rest().starts_with("//") {
                while let Some(ch) = self.current_char() {
                    self.advance();
                    if ch == '\n' {
                        break;
                    }
                }
            } else if self.current_char().is_some_and(char::is_whitespace) {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, token: &str) -> bool {
        self.skip_whitespace();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), SignatureParseError> {
        if !self.try_read(token) {
            return Err(self.error(format!(
                "Expected '{}' but found {:?}",
                token,
                self.current_char()
            )));
        }
        Ok(())
    }

    /// Identifier made of alphanumerics, `_`, `.` and `-`.
    fn read_identifier(&mut self) -> Result<&'a str, SignatureParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' || ch == '-' {
                self.advance();
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(self.error("Expected identifier"));
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_number(&mut self) -> Result<i64, SignatureParseError> {
        self.skip_whitespace();
        let start = self.pos;
        if self.current_char() == Some('-') {
            self.advance();
        }
        while self.current_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        self.text[start..self.pos]
            .parse()
            .map_err(|_| SignatureParseError { offset: start, message: "Expected integer".into() })
    }

    fn read_string(&mut self) -> Result<String, SignatureParseError> {
        self.expect("\"")?;
        let mut out = String::new();
        loop {
            match self.current_char() {
                None => return Err(self.error("Unterminated string")),
                Some('"') => {
                    self.advance();
                    return Ok(out);
                }
                Some('\\') => {
                    self.advance();
                    match self.current_char() {
                        Some(ch) => {
                            out.push(ch);
                            self.advance();
                        }
                        None => return Err(self.error("Unterminated string")),
                    }
                }
                Some(ch) => {
                    out.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn parse_function(&mut self) -> Result<LoweredFunction, SignatureParseError> {
        self.expect("func")?;
        self.expect("@")?;
        let name = self.read_identifier()?.to_string();
        self.expect("(")?;

        let mut args = Vec::new();
        if !self.try_read(")") {
            loop {
                args.push(self.parse_arg()?);
                if self.try_read(")") {
                    break;
                }
                self.expect(",")?;
            }
        }

        let attrs = if self.try_read("attributes") {
            self.parse_attr_dict()?
        } else {
            Vec::new()
        };

        Ok(LoweredFunction { name, args, attrs })
    }

    fn parse_arg(&mut self) -> Result<FunctionArg, SignatureParseError> {
        self.expect("%")?;
        let name = self.read_identifier()?.to_string();
        self.expect(":")?;
        let ty = self.parse_type()?;
        self.skip_whitespace();
        let attrs = if self.current_char() == Some('{') {
            self.parse_attr_dict()?
        } else {
            Vec::new()
        };
        Ok(FunctionArg { name, ty, attrs })
    }

    fn parse_type(&mut self) -> Result<ArgType, SignatureParseError> {
        self.skip_whitespace();
        let start = self.pos;
        match self.read_alnum()? {
            "token" => Ok(ArgType::Token),
            "index" => Ok(ArgType::Index),
            "tensor" => self.parse_tensor_body(),
            other => Err(SignatureParseError {
                offset: start,
                message: format!("Unknown type '{}'", other),
            }),
        }
    }

    fn read_alnum(&mut self) -> Result<&'a str, SignatureParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while self.current_char().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.advance();
        }
        if start == self.pos {
            return Err(self.error("Expected type name"));
        }
        Ok(&self.text[start..self.pos])
    }

    fn parse_tensor_body(&mut self) -> Result<ArgType, SignatureParseError> {
        self.expect("<")?;
        let mut dims = Vec::new();
        let mut dynamic = Vec::new();
        loop {
            self.skip_whitespace();
            let bounded = self.try_read("<=");
            if !bounded && !self.current_char().is_some_and(|c| c.is_ascii_digit()) {
                break;
            }
            let dim = self.read_number()?;
            if dim < 0 {
                return Err(self.error("Negative dimension"));
            }
            dims.push(dim as u64);
            dynamic.push(bounded);
            if !self.rest().starts_with('x') {
                return Err(self.error("Expected 'x' after dimension"));
            }
            self.advance();
        }

        let start = self.pos;
        let mut element = self.read_alnum()?.to_string();
        if element == "complex" {
            self.expect("<")?;
            let inner = self.read_alnum()?;
            self.expect(">")?;
            element = format!("complex<{}>", inner);
        }
        let element_type = PrimitiveType::from_name(&element).ok_or(SignatureParseError {
            offset: start,
            message: format!("Unknown element type '{}'", element),
        })?;
        self.expect(">")?;

        Ok(ArgType::Shaped(ShapedType { element_type, dims, dynamic }))
    }

    fn parse_attr_dict(&mut self) -> Result<Vec<NamedAttr>, SignatureParseError> {
        self.expect("{")?;
        let mut attrs = Vec::new();
        if self.try_read("}") {
            return Ok(attrs);
        }
        loop {
            let name = self.read_identifier()?.to_string();
            self.expect("=")?;
            let value = self.parse_attr_value()?;
            attrs.push(NamedAttr { name, value });
            if self.try_read("}") {
                return Ok(attrs);
            }
            self.expect(",")?;
        }
    }

    fn parse_attr_value(&mut self) -> Result<AttrValue, SignatureParseError> {
        self.skip_whitespace();
        match self.current_char() {
            Some('"') => Ok(AttrValue::Str(self.read_string()?)),
            Some('[') => {
                self.advance();
                let mut values = Vec::new();
                if self.try_read("]") {
                    return Ok(AttrValue::IntList(values));
                }
                loop {
                    values.push(self.read_number()?);
                    if self.try_read("]") {
                        return Ok(AttrValue::IntList(values));
                    }
                    self.expect(",")?;
                }
            }
            Some(c) if c == '-' || c.is_ascii_digit() => Ok(AttrValue::Int(self.read_number()?)),
            _ => {
                if self.try_read("true") {
                    Ok(AttrValue::Bool(true))
                } else if self.try_read("false") {
                    Ok(AttrValue::Bool(false))
                } else {
                    Err(self.error("Expected attribute value"))
                }
            }
        }
    }
}
