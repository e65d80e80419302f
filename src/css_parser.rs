use std::collections::HashMap;

use thiserror::Error;

use crate::selector::Selector;

/// A style rule: selector plus its declaration block.
pub type Rule = (Selector, HashMap<String, String>);

#[derive(Debug, Error, PartialEq)]
#[error("css parse error at offset {0}")]
pub struct CssError(pub usize);

/// Character-cursor CSS parser. Malformed declarations are skipped to the
/// next `;` or `}`; malformed rules to the next `}`. Parsing never fails as
/// a whole.
pub struct CssParser {
    chars: Vec<char>,
    i: usize,
}

impl CssParser {
    pub fn new(style: &str) -> Self {
        CssParser {
            chars: style.chars().collect(),
            i: 0,
        }
    }

    pub fn parse(mut self) -> Vec<Rule> {
        let mut rules = Vec::new();
        while self.i < self.chars.len() {
            let result = self.rule();
            match result {
                Ok(rule) => rules.push(rule),
                Err(_) => match self.ignore_until(&['}']) {
                    Some('}') => {
                        self.i += 1;
                        self.whitespace();
                    }
                    _ => break,
                },
            }
        }
        rules
    }

    fn rule(&mut self) -> Result<Rule, CssError> {
        self.whitespace();
        let selector = self.selector()?;
        self.literal('{')?;
        self.whitespace();
        let declarations = self.body();
        self.literal('}')?;
        Ok((selector, declarations))
    }

    /// `word (space word)*`, left-nesting into descendant selectors.
    pub fn selector(&mut self) -> Result<Selector, CssError> {
        let mut out = Selector::tag(self.word()?.to_ascii_lowercase());
        self.whitespace();
        while self.i < self.chars.len() && self.chars[self.i] != '{' {
            let tag = self.word()?;
            out = Selector::descendant(out, Selector::tag(tag.to_ascii_lowercase()));
            self.whitespace();
        }
        Ok(out)
    }

    /// `pair (; pair)*` up to `}` or end of input.
    pub fn body(&mut self) -> HashMap<String, String> {
        let mut pairs = HashMap::new();
        while self.i < self.chars.len() && self.chars[self.i] != '}' {
            let parsed = self.pair().and_then(|(property, value)| {
                pairs.insert(property, value);
                self.whitespace();
                self.literal(';')?;
                self.whitespace();
                Ok(())
            });
            if parsed.is_err() {
                match self.ignore_until(&[';', '}']) {
                    Some(';') => {
                        self.i += 1;
                        self.whitespace();
                    }
                    _ => break,
                }
            }
        }
        pairs
    }

    fn pair(&mut self) -> Result<(String, String), CssError> {
        let property = self.word()?;
        self.whitespace();
        self.literal(':')?;
        self.whitespace();
        let value = self.word()?;
        Ok((property.to_ascii_lowercase(), value))
    }

    fn whitespace(&mut self) {
        while self.i < self.chars.len() && self.chars[self.i].is_whitespace() {
            self.i += 1;
        }
    }

    fn word(&mut self) -> Result<String, CssError> {
        let start = self.i;
        while self.i < self.chars.len() {
            let c = self.chars[self.i];
            if c.is_alphanumeric() || "#-.%".contains(c) {
                self.i += 1;
            } else {
                break;
            }
        }
        if self.i == start {
            return Err(CssError(self.i));
        }
        Ok(self.chars[start..self.i].iter().collect())
    }

    fn literal(&mut self, expected: char) -> Result<(), CssError> {
        if self.i < self.chars.len() && self.chars[self.i] == expected {
            self.i += 1;
            Ok(())
        } else {
            Err(CssError(self.i))
        }
    }

    /// Skips forward to one of `chars`, returning which was found.
    fn ignore_until(&mut self, chars: &[char]) -> Option<char> {
        while self.i < self.chars.len() {
            let c = self.chars[self.i];
            if chars.contains(&c) {
                return Some(c);
            }
            self.i += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn single_rule(css: &str) -> Rule {
        let mut rules = CssParser::new(css).parse();
        assert_eq!(rules.len(), 1, "css {:?}", css);
        rules.remove(0)
    }

    #[test]
    fn parses_a_simple_rule() {
        let (selector, body) = single_rule("p { color: red; }");
        assert_eq!(selector, Selector::tag("p".to_string()));
        assert_eq!(body.get("color").map(String::as_str), Some("red"));
    }

    #[test]
    fn bad_declarations_skip_to_the_next_semicolon() {
        let rules = CssParser::new("a { color: red } b { color: blue; bad } c{color:green}").parse();
        let colors: Vec<&str> = rules
            .iter()
            .map(|(_, body)| body.get("color").map(String::as_str).unwrap_or("?"))
            .collect();
        assert_eq!(colors, ["red", "blue", "green"]);
    }

    #[test]
    fn bad_rules_skip_to_the_closing_brace() {
        let rules = CssParser::new("@media { oops } p { color: red; }").parse();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].0, Selector::tag("p".to_string()));
    }

    #[test]
    fn properties_are_case_folded_and_values_kept() {
        let (_, body) = single_rule("p { COLOR: Red; }");
        assert_eq!(body.get("color").map(String::as_str), Some("Red"));
    }

    #[test]
    fn descendant_selectors_nest_left() {
        let (selector, _) = single_rule("ul li b { color: red; }");
        let ul_li = Selector::descendant(
            Selector::tag("ul".to_string()),
            Selector::tag("li".to_string()),
        );
        assert_eq!(selector, Selector::descendant(ul_li, Selector::tag("b".to_string())));
    }

    #[test]
    fn inline_body_stops_at_end_of_input() {
        let mut parser = CssParser::new("font-size: 90%; color: blue");
        let body = parser.body();
        assert_eq!(body.get("font-size").map(String::as_str), Some("90%"));
        assert_eq!(body.get("color").map(String::as_str), Some("blue"));
    }

    #[test]
    fn garbage_never_panics() {
        for css in ["", "{}{}{}", "}}}}", "p { color", "p color: red;"] {
            let _ = CssParser::new(css).parse();
        }
    }
}
