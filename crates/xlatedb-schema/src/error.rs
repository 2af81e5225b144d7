use serde::Serialize;
use std::{collections::BTreeMap, fmt};

///
/// ErrorTree
///
/// Route-aware aggregation of validation messages. Each child tree is keyed
/// by the schema route it was produced under.
///

#[derive(Clone, Debug, Default, Serialize)]
pub struct ErrorTree {
    messages: Vec<String>,
    children: BTreeMap<String, Self>,
}

impl ErrorTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, message: impl ToString) {
        self.messages.push(message.to_string());
    }

    /// Merge `other` under `route`, skipping empty trees.
    pub fn merge_route(&mut self, route: impl Into<String>, other: Self) {
        if other.is_empty() {
            return;
        }

        self.children.entry(route.into()).or_default().merge(other);
    }

    /// Merge `other` into this tree at the same level.
    pub fn merge(&mut self, other: Self) {
        self.messages.extend(other.messages);
        for (route, child) in other.children {
            self.merge_route(route, child);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.children.values().all(Self::is_empty)
    }

    /// Number of messages in the whole tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len() + self.children.values().map(Self::len).sum::<usize>()
    }

    /// Flatten into `(route, message)` pairs, routes joined with `/`.
    #[must_use]
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut stack: Vec<(String, &Self)> = vec![(String::new(), self)];

        while let Some((route, tree)) = stack.pop() {
            for msg in &tree.messages {
                out.push((route.clone(), msg.clone()));
            }
            for (child_route, child) in tree.children.iter().rev() {
                let joined = if route.is_empty() {
                    child_route.clone()
                } else {
                    format!("{route}/{child_route}")
                };
                stack.push((joined, child));
            }
        }

        out
    }

    pub fn result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ErrorTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (route, msg)) in self.flatten().iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            if route.is_empty() {
                write!(f, "{msg}")?;
            } else {
                write!(f, "{route}: {msg}")?;
            }
        }

        Ok(())
    }
}

/// Push a formatted message onto an [`ErrorTree`].
#[macro_export]
macro_rules! err {
    ($errs:expr, $($arg:tt)*) => {{
        $errs.add(format!($($arg)*));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_prefixes_nested_routes() {
        let mut inner = ErrorTree::new();
        inner.add("missing key leaf");

        let mut tree = ErrorTree::new();
        tree.add("top");
        tree.merge_route("mod:a", inner);

        assert_eq!(
            tree.flatten(),
            vec![
                (String::new(), "top".to_string()),
                ("mod:a".to_string(), "missing key leaf".to_string()),
            ]
        );
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn empty_children_do_not_count() {
        let mut tree = ErrorTree::new();
        tree.merge_route("x", ErrorTree::new());

        assert!(tree.is_empty());
        assert!(tree.result().is_ok());
    }
}
