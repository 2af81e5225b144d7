//! Model path parsing.
//!
//! Paths look like `/module:top/list[key=value][k2=v2]/leaf`. Predicate
//! values may contain `/` and may be quoted with `'` or `"`.

use crate::error::{Error, ErrorClass, ErrorOrigin};
use std::fmt;
use thiserror::Error as ThisError;
use xlatedb_schema::{MODULE_SEPARATOR, PATH_SEPARATOR};

///
/// PathError
///

#[derive(Debug, ThisError)]
pub enum PathError {
    #[error("path must start with '/': '{0}'")]
    NotAbsolute(String),

    #[error("unterminated predicate in '{0}'")]
    Unterminated(String),

    #[error("malformed predicate '{pred}' in '{path}'")]
    Predicate { path: String, pred: String },

    #[error("empty path element in '{0}'")]
    EmptyElement(String),
}

impl From<PathError> for Error {
    fn from(err: PathError) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Translate, err.to_string())
    }
}

///
/// PathElem
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathElem {
    pub module: Option<String>,
    pub name: String,
    pub keys: Vec<(String, String)>,
}

impl PathElem {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: None,
            name: name.into(),
            keys: Vec::new(),
        }
    }

    #[must_use]
    pub fn key(&self, name: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn is_keyed(&self) -> bool {
        !self.keys.is_empty()
    }
}

impl fmt::Display for PathElem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(module) = &self.module {
            write!(f, "{module}{MODULE_SEPARATOR}")?;
        }
        write!(f, "{}", self.name)?;
        for (k, v) in &self.keys {
            write!(f, "[{k}={v}]")?;
        }

        Ok(())
    }
}

///
/// ModelPath
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ModelPath {
    elems: Vec<PathElem>,
}

impl ModelPath {
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let Some(rest) = path.strip_prefix(PATH_SEPARATOR) else {
            return Err(PathError::NotAbsolute(path.to_string()));
        };

        let mut elems = Vec::new();
        for raw in split_elements(rest, path)? {
            elems.push(parse_element(&raw, path)?);
        }

        Ok(Self { elems })
    }

    #[must_use]
    pub fn elems(&self) -> &[PathElem] {
        &self.elems
    }

    #[must_use]
    pub fn last(&self) -> Option<&PathElem> {
        self.elems.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut PathElem> {
        self.elems.last_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Schema path: predicates dropped, module prefix kept on the first
    /// element only.
    #[must_use]
    pub fn schema_path(&self) -> String {
        let mut out = String::new();
        for (i, elem) in self.elems.iter().enumerate() {
            out.push(PATH_SEPARATOR);
            if i == 0
                && let Some(module) = &elem.module
            {
                out.push_str(module);
                out.push(MODULE_SEPARATOR);
            }
            out.push_str(&elem.name);
        }

        out
    }

    /// Module of the first element.
    #[must_use]
    pub fn module(&self) -> Option<&str> {
        self.elems.first().and_then(|e| e.module.as_deref())
    }

    #[must_use]
    pub fn child(&self, elem: PathElem) -> Self {
        let mut elems = self.elems.clone();
        elems.push(elem);
        Self { elems }
    }

    /// The first `len` elements.
    #[must_use]
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            elems: self.elems.iter().take(len).cloned().collect(),
        }
    }

    /// Copy with the last element's predicates replaced by `keys`.
    #[must_use]
    pub fn with_last_keys(&self, keys: Vec<(String, String)>) -> Self {
        let mut out = self.clone();
        if let Some(last) = out.elems.last_mut() {
            last.keys = keys;
        }

        out
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, head) = self.elems.split_last()?;
        Some(Self {
            elems: head.to_vec(),
        })
    }

    /// Key values of every keyed element, outermost first.
    #[must_use]
    pub fn key_values(&self) -> Vec<Vec<String>> {
        self.elems
            .iter()
            .filter(|e| e.is_keyed())
            .map(|e| e.keys.iter().map(|(_, v)| v.clone()).collect())
            .collect()
    }
}

impl fmt::Display for ModelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for elem in &self.elems {
            write!(f, "{PATH_SEPARATOR}{elem}")?;
        }

        Ok(())
    }
}

/// Schema path of `path` (predicates removed).
pub fn strip_predicates(path: &str) -> Result<String, PathError> {
    Ok(ModelPath::parse(path)?.schema_path())
}

/// Parent of a schema path, or `None` at the top.
#[must_use]
pub fn parent_path(path: &str) -> Option<&str> {
    let idx = path.rfind(PATH_SEPARATOR)?;
    (idx > 0).then(|| &path[..idx])
}

// split on '/' outside of predicates and quotes
fn split_elements(rest: &str, path: &str) -> Result<Vec<String>, PathError> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in rest.chars() {
        match (c, quote) {
            (q, Some(open)) if q == open => {
                quote = None;
                cur.push(c);
            }
            (_, Some(_)) => cur.push(c),
            ('\'' | '"', None) if depth > 0 => {
                quote = Some(c);
                cur.push(c);
            }
            ('[', None) => {
                depth += 1;
                cur.push(c);
            }
            (']', None) => {
                depth = depth.saturating_sub(1);
                cur.push(c);
            }
            (PATH_SEPARATOR, None) if depth == 0 => out.push(std::mem::take(&mut cur)),
            _ => cur.push(c),
        }
    }

    if depth > 0 || quote.is_some() {
        return Err(PathError::Unterminated(path.to_string()));
    }
    out.push(cur);

    Ok(out)
}

fn parse_element(raw: &str, path: &str) -> Result<PathElem, PathError> {
    let (head, preds) = raw.find('[').map_or((raw, ""), |i| raw.split_at(i));
    if head.is_empty() {
        return Err(PathError::EmptyElement(path.to_string()));
    }

    let mut elem = match head.split_once(MODULE_SEPARATOR) {
        Some((module, name)) => PathElem {
            module: Some(module.to_string()),
            name: name.to_string(),
            keys: Vec::new(),
        },
        None => PathElem::new(head),
    };

    let mut rest = preds;
    while !rest.is_empty() {
        let body = rest
            .strip_prefix('[')
            .ok_or_else(|| predicate_error(path, rest))?;
        let end = predicate_end(body).ok_or_else(|| PathError::Unterminated(path.to_string()))?;
        let pred = &body[..end];
        let (k, v) = pred
            .split_once('=')
            .ok_or_else(|| predicate_error(path, pred))?;
        elem.keys.push((k.trim().to_string(), unquote(v.trim()).to_string()));
        rest = &body[end + 1..];
    }

    Ok(elem)
}

// index of the closing ']' of a predicate body, honoring quotes
fn predicate_end(body: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in body.char_indices() {
        match (c, quote) {
            (q, Some(open)) if q == open => quote = None,
            ('\'' | '"', None) => quote = Some(c),
            (']', None) => return Some(i),
            _ => {}
        }
    }

    None
}

fn unquote(v: &str) -> &str {
    for q in ['\'', '"'] {
        if let Some(inner) = v.strip_prefix(q).and_then(|s| s.strip_suffix(q)) {
            return inner;
        }
    }

    v
}

fn predicate_error(path: &str, pred: &str) -> PathError {
    PathError::Predicate {
        path: path.to_string(),
        pred: pred.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_values_may_contain_separators() {
        let p = ModelPath::parse(
            "/openconfig-interfaces:interfaces/interface[name=Ethernet0/1]/config/mtu",
        )
        .expect("path should parse");

        assert_eq!(p.len(), 4);
        assert_eq!(p.elems()[1].key("name"), Some("Ethernet0/1"));
        assert_eq!(
            p.schema_path(),
            "/openconfig-interfaces:interfaces/interface/config/mtu"
        );
        assert_eq!(p.module(), Some("openconfig-interfaces"));
    }

    #[test]
    fn quoted_values_and_multiple_keys() {
        let p = ModelPath::parse("/m:acl/acl-set[name='a]b'][type=\"ipv4\"]/x")
            .expect("path should parse");

        let set = &p.elems()[1];
        assert_eq!(set.key("name"), Some("a]b"));
        assert_eq!(set.key("type"), Some("ipv4"));
        assert_eq!(p.key_values(), vec![vec!["a]b".to_string(), "ipv4".to_string()]]);
    }

    #[test]
    fn inner_module_prefixes_are_dropped_from_schema_path() {
        let p = ModelPath::parse("/m:a/other:b/c").expect("path should parse");
        assert_eq!(p.schema_path(), "/m:a/b/c");
    }

    #[test]
    fn malformed_paths_are_rejected() {
        assert!(matches!(ModelPath::parse("m:a"), Err(PathError::NotAbsolute(_))));
        assert!(matches!(
            ModelPath::parse("/m:a/b[k=v"),
            Err(PathError::Unterminated(_))
        ));
        assert!(matches!(
            ModelPath::parse("/m:a/b[kv]"),
            Err(PathError::Predicate { .. })
        ));
        assert!(matches!(ModelPath::parse("/m:a//b"), Err(PathError::EmptyElement(_))));
    }

    #[test]
    fn display_round_trips() {
        let raw = "/m:a/b[k=v/w]/c";
        assert_eq!(ModelPath::parse(raw).expect("parse").to_string(), raw);
        assert_eq!(parent_path("/m:a/b/c"), Some("/m:a/b"));
        assert_eq!(parent_path("/m:a"), None);
    }
}
