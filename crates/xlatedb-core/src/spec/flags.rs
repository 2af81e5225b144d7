use super::Builder;

const STATE_WITHIN: &str = "/state/";
const CONFIG_WITHIN: &str = "/config/";
const STATE_SUFFIX: &str = "/state";
const CONFIG_SUFFIX: &str = "/config";

impl Builder {
    /// Back-propagate the non-terminal and subtree-transformer flags to
    /// every ancestor.
    pub(super) fn propagate_flags(&mut self) {
        let interior: Vec<String> = self
            .yang
            .iter()
            .filter(|(_, i)| i.kind.is_interior())
            .map(|(p, _)| p.clone())
            .collect();
        for path in &interior {
            for ancestor in self.ancestors(path) {
                if let Some(info) = self.yang.get_mut(&ancestor) {
                    info.has_non_terminal = true;
                }
            }
        }

        let subtrees: Vec<String> = self.own_subtrees.iter().cloned().collect();
        for path in &subtrees {
            for ancestor in self.ancestors(path) {
                if let Some(info) = self.yang.get_mut(&ancestor) {
                    info.has_child_subtree = true;
                }
            }
        }
    }

    /// Mark read-only nodes with no configuration counterpart as
    /// operational-only and flag their ancestors.
    pub(super) fn classify_operational(&mut self) {
        // BTreeMap order visits ancestors before descendants
        let candidates: Vec<String> = self
            .yang
            .iter()
            .filter(|(_, i)| i.read_only && !i.kind.is_transparent())
            .map(|(p, _)| p.clone())
            .collect();

        for path in candidates {
            let nested = self
                .ancestors(&path)
                .iter()
                .any(|a| self.yang.get(a).is_some_and(|i| i.operational));
            let has_config =
                config_sibling(&path).is_some_and(|cfg| self.yang.contains_key(&cfg));
            if nested || has_config {
                continue;
            }

            if let Some(info) = self.yang.get_mut(&path) {
                info.operational = true;
                if !info.is_terminal() {
                    info.has_child_operational = true;
                }
            }

            for ancestor in self.ancestors(&path) {
                let Some(info) = self.yang.get_mut(&ancestor) else {
                    continue;
                };
                if info.has_child_operational {
                    break;
                }
                info.has_child_operational = true;
            }
        }
    }

    /// Record paths above `path`, nearest first, choice and case records
    /// included.
    fn ancestors(&self, path: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut cur = self.yang.get(path).and_then(|i| i.schema_parent.clone());

        while let Some(p) = cur {
            cur = self.yang.get(&p).and_then(|i| i.schema_parent.clone());
            out.push(p);
        }

        out
    }
}

/// Configuration-side counterpart of a state path: every `/state/` becomes
/// `/config/` and a trailing `/state` becomes `/config`. `None` when the
/// path is not under a state container.
fn config_sibling(path: &str) -> Option<String> {
    if path.contains(STATE_WITHIN) {
        let cfg = path.replace(STATE_WITHIN, CONFIG_WITHIN);
        return Some(match cfg.strip_suffix(STATE_SUFFIX) {
            Some(head) => format!("{head}{CONFIG_SUFFIX}"),
            None => cfg,
        });
    }

    path.strip_suffix(STATE_SUFFIX)
        .map(|head| format!("{head}{CONFIG_SUFFIX}"))
}
