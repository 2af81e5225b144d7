//! Store-style glob matching for key enumeration.
//!
//! Supports `*` (any run, separators included), `?`, `[abc]`, `[a-z]`,
//! `[^x]` and backslash escapes.

/// Match `text` against a store key glob.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    match_from(&p, &t)
}

/// True when the pattern contains any glob metacharacter.
#[must_use]
pub fn is_pattern(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

fn match_from(p: &[char], t: &[char]) -> bool {
    let Some((&pc, rest)) = p.split_first() else {
        return t.is_empty();
    };

    match pc {
        '*' => {
            // collapse runs of '*'
            let rest = trim_stars(rest);
            if rest.is_empty() {
                return true;
            }
            (0..=t.len()).any(|i| match_from(rest, &t[i..]))
        }
        '?' => !t.is_empty() && match_from(rest, &t[1..]),
        '[' => {
            let Some((&tc, t_rest)) = t.split_first() else {
                return false;
            };
            match match_class(rest, tc) {
                Some((true, after)) => match_from(after, t_rest),
                Some((false, _)) => false,
                // unterminated class matches a literal '['
                None => tc == '[' && match_from(rest, t_rest),
            }
        }
        '\\' if !rest.is_empty() => {
            t.first() == Some(&rest[0]) && match_from(&rest[1..], &t[1..])
        }
        c => t.first() == Some(&c) && match_from(rest, &t[1..]),
    }
}

fn trim_stars(mut p: &[char]) -> &[char] {
    while p.first() == Some(&'*') {
        p = &p[1..];
    }
    p
}

// Returns (matched, pattern after the closing bracket).
fn match_class(p: &[char], c: char) -> Option<(bool, &[char])> {
    let (negate, mut i) = match p.first() {
        Some('^') => (true, 1),
        _ => (false, 0),
    };
    let mut matched = false;

    while i < p.len() {
        match p[i] {
            ']' => return Some((matched != negate, &p[i + 1..])),
            '\\' if i + 1 < p.len() => {
                matched |= p[i + 1] == c;
                i += 2;
            }
            lo if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' => {
                let hi = p[i + 2];
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                matched |= (lo..=hi).contains(&c);
                i += 3;
            }
            other => {
                matched |= other == c;
                i += 1;
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn star_spans_separators() {
        assert!(glob_match("ACL_RULE|*", "ACL_RULE|acl1|rule1"));
        assert!(glob_match("ACL_RULE|acl1|*", "ACL_RULE|acl1|rule1"));
        assert!(!glob_match("ACL_RULE|acl2|*", "ACL_RULE|acl1|rule1"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn classes_and_escapes() {
        assert!(glob_match("Ethernet[0-9]", "Ethernet4"));
        assert!(!glob_match("Ethernet[^0-9]", "Ethernet4"));
        assert!(glob_match("a\\*b", "a*b"));
        assert!(!glob_match("a\\*b", "axb"));
        assert!(glob_match("h?llo", "hello"));
        assert!(glob_match("x[", "x["));
    }

    proptest! {
        #[test]
        fn literal_text_matches_itself(s in "[a-zA-Z0-9|:_.-]{0,24}") {
            prop_assert!(glob_match(&s, &s));
        }

        #[test]
        fn prefix_star_matches_any_suffix(prefix in "[a-z|]{0,8}", suffix in "[a-z0-9|]{0,8}") {
            let pattern = format!("{prefix}*");
            let text = format!("{prefix}{suffix}");
            prop_assert!(glob_match(&pattern, &text));
        }
    }
}
