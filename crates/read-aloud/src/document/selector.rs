//! Simple CSS selector subset used to match attachments and icons.
//!
//! Supported: comma-separated groups of compound selectors built from an optional tag
//! (or `*`), `#id`, `.class`, `[attr]` and `[attr=value]`. Combinators are rejected.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;
use std::str::FromStr;

/// Element data a selector can be evaluated against.
pub trait SelectorTarget {
    fn tag(&self) -> &str;
    fn attr(&self, name: &str) -> Option<&str>;
    fn has_class(&self, class: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorError {
    selector: String,
    reason: &'static str,
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid selector {:?}: {}", self.selector, self.reason)
    }
}

impl std::error::Error for SelectorError {}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatch {
    name: String,
    value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatch>,
}

impl Compound {
    fn matches<T: SelectorTarget + ?Sized>(&self, el: &T) -> bool {
        if let Some(tag) = &self.tag {
            if !el.tag().eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if el.attr("id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| el.has_class(c)) {
            return false;
        }
        self.attrs.iter().all(|a| match (&a.value, el.attr(&a.name)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(want), Some(have)) => want == have,
        })
    }

    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attrs.is_empty()
    }
}

/// Parsed selector; matches if any of its groups matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    groups: Vec<Compound>,
}

impl Selector {
    /// Selector matching a single class.
    #[cfg(test)]
    pub(crate) fn class(name: &str) -> Self {
        Self {
            source: format!(".{name}"),
            groups: vec![Compound {
                classes: vec![name.to_string()],
                ..Compound::default()
            }],
        }
    }

    pub fn matches<T: SelectorTarget + ?Sized>(&self, el: &T) -> bool {
        self.groups.iter().any(|g| g.matches(el))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| SelectorError {
            selector: s.to_string(),
            reason,
        };
        let mut groups = Vec::new();
        for raw in s.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(err("empty selector group"));
            }
            groups.push(parse_compound(raw).map_err(err)?);
        }
        Ok(Self {
            source: s.trim().to_string(),
            groups,
        })
    }
}

fn parse_compound(raw: &str) -> Result<Compound, &'static str> {
    let mut chars = raw.chars().peekable();
    let mut compound = Compound::default();
    let mut universal = false;

    let tag = take_ident(&mut chars);
    if !tag.is_empty() {
        compound.tag = Some(tag.to_ascii_lowercase());
    } else if chars.peek() == Some(&'*') {
        chars.next();
        universal = true;
    }

    while let Some(c) = chars.next() {
        match c {
            '#' => {
                let id = take_ident(&mut chars);
                if id.is_empty() {
                    return Err("expected id after '#'");
                }
                compound.id = Some(id);
            }
            '.' => {
                let class = take_ident(&mut chars);
                if class.is_empty() {
                    return Err("expected class after '.'");
                }
                compound.classes.push(class);
            }
            '[' => {
                skip_ws(&mut chars);
                let name = take_ident(&mut chars);
                if name.is_empty() {
                    return Err("expected attribute name");
                }
                skip_ws(&mut chars);
                match chars.next() {
                    Some(']') => compound.attrs.push(AttrMatch { name, value: None }),
                    Some('=') => {
                        let value = take_value(&mut chars)?;
                        skip_ws(&mut chars);
                        if chars.next() != Some(']') {
                            return Err("unterminated attribute selector");
                        }
                        compound.attrs.push(AttrMatch {
                            name,
                            value: Some(value),
                        });
                    }
                    _ => return Err("unterminated attribute selector"),
                }
            }
            c if c.is_whitespace() || matches!(c, '>' | '+' | '~') => {
                return Err("combinators are not supported");
            }
            _ => return Err("unexpected character"),
        }
    }

    if compound.is_empty() && !universal {
        return Err("empty selector");
    }
    Ok(compound)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        out.push(c);
        chars.next();
    }
    out
}

fn skip_ws(chars: &mut Peekable<Chars<'_>>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn take_value(chars: &mut Peekable<Chars<'_>>) -> Result<String, &'static str> {
    skip_ws(chars);
    match chars.peek().copied() {
        Some(quote @ ('"' | '\'')) => {
            chars.next();
            let mut out = String::new();
            for c in chars.by_ref() {
                if c == quote {
                    return Ok(out);
                }
                out.push(c);
            }
            Err("unterminated quoted value")
        }
        _ => {
            let mut out = String::new();
            while let Some(&c) = chars.peek() {
                if c == ']' {
                    break;
                }
                out.push(c);
                chars.next();
            }
            let out = out.trim().to_string();
            if out.is_empty() {
                Err("expected attribute value")
            } else {
                Ok(out)
            }
        }
    }
}
