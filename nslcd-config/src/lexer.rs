//! Splits an `nslcd.conf`-style file into `(line number, keyword, rest of
//! line)` directives, grounded on the line-oriented config lexer used
//! elsewhere in this stack (e.g. the network interfaces file parser) but
//! simplified for this format: one directive per line, first whitespace
//! run is the keyword, everything after is a free-form argument string
//! interpreted by that directive's own handler.

use std::io::BufRead;

pub(crate) struct Directive {
    pub line: usize,
    pub keyword: String,
    pub rest: String,
}

pub(crate) struct Lexer<R> {
    input: R,
    line_no: usize,
}

impl<R: BufRead> Lexer<R> {
    pub(crate) fn new(input: R) -> Self {
        Lexer { input, line_no: 0 }
    }
}

impl<R: BufRead> Iterator for Lexer<R> {
    type Item = std::io::Result<Directive>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut raw = String::new();
            match self.input.read_line(&mut raw) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
            self.line_no += 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (keyword, rest) = match trimmed.split_once(char::is_whitespace) {
                Some((k, r)) => (k, r.trim_start()),
                None => (trimmed, ""),
            };
            return Some(Ok(Directive {
                line: self.line_no,
                keyword: keyword.to_string(),
                rest: rest.to_string(),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn skips_blank_lines_and_comments() {
        let input = "# a comment\n\nuri ldap://localhost\n  \nbase dc=example,dc=com\n";
        let mut lexer = Lexer::new(Cursor::new(input));
        let d1 = lexer.next().unwrap().unwrap();
        assert_eq!(d1.keyword, "uri");
        assert_eq!(d1.rest, "ldap://localhost");
        let d2 = lexer.next().unwrap().unwrap();
        assert_eq!(d2.keyword, "base");
        assert_eq!(d2.rest, "dc=example,dc=com");
        assert!(lexer.next().is_none());
    }

    #[test]
    fn keyword_without_argument_yields_empty_rest() {
        let mut lexer = Lexer::new(Cursor::new("referrals\n"));
        let d = lexer.next().unwrap().unwrap();
        assert_eq!(d.keyword, "referrals");
        assert_eq!(d.rest, "");
    }
}
