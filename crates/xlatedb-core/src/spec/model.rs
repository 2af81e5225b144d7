use super::{Builder, Inherit, ModelInfo, ModuleHooks, YangXpathInfo};
use crate::config::DbNum;
use tracing::debug;
use xlatedb_schema::{
    PATH_SEPARATOR,
    annotation::Annotation,
    node::{NodeKind, SchemaModule, SchemaNode},
};

///
/// Inherited
///
/// Values children adopt from their nearest concrete ancestor unless they
/// declare their own.
///

#[derive(Clone, Copy, Debug)]
struct Inherited {
    db: Inherit<DbNum>,
    cascade: Inherit<bool>,
    interval: Inherit<u32>,
}

impl Inherited {
    const ROOT: Self = Self {
        db: Inherit::Resolved(DbNum::ConfigDb),
        cascade: Inherit::Resolved(false),
        interval: Inherit::Resolved(0),
    };

    const fn is_pending(&self) -> bool {
        self.db.is_pending() || self.cascade.is_pending() || self.interval.is_pending()
    }
}

///
/// Annotations
///
/// Parsed per-node annotations of a model node.
///

#[derive(Debug, Default)]
struct Annotations {
    table: Option<String>,
    xfmr_table: Option<String>,
    key_name: Option<String>,
    field: Option<String>,
    subtree: Option<String>,
    key_xfmr: Option<String>,
    field_xfmr: Option<String>,
    delim: Option<String>,
    validate: Option<String>,
    rpc: Option<String>,
    pre: Option<String>,
    post: Option<String>,
    use_self_key: bool,
    db: Option<DbNum>,
    table_owner: Option<bool>,
    virtual_table: Option<bool>,
    cascade: Option<bool>,
    interval: Option<u32>,
    db_key_count: Option<usize>,

    /// A numeric hint failed to parse.
    malformed: bool,
}

struct Visit<'a> {
    node: &'a SchemaNode,

    /// Nearest concrete ancestor record.
    parent: Option<String>,

    /// Immediate parent record, possibly a choice or case.
    schema_parent: Option<String>,

    /// Path including choice/case names; keys choice/case records.
    full_prefix: String,

    key_level: usize,
    inherited: Inherited,
}

impl Builder {
    /// Model-side pass over one model module, depth first with an
    /// explicit stack.
    pub(super) fn model_module(&mut self, module: &SchemaModule) {
        self.models.insert(
            module.name.clone(),
            ModelInfo {
                version: module.version.clone().unwrap_or_default(),
                organization: module.organization.clone().unwrap_or_default(),
            },
        );

        let module_hooks = ModuleHooks {
            pre: module
                .annotation(Annotation::PreTransformer)
                .map(ToString::to_string),
            post: module
                .annotation(Annotation::PostTransformer)
                .map(ToString::to_string),
        };

        for top in &module.nodes {
            let top_path = module.top_path(&top.name);
            if module_hooks.pre.is_some() || module_hooks.post.is_some() {
                self.hooks.insert(top_path.clone(), module_hooks.clone());
            }

            let mut stack = vec![Visit {
                node: top,
                parent: None,
                schema_parent: None,
                full_prefix: String::new(),
                key_level: 0,
                inherited: Inherited::ROOT,
            }];

            while let Some(visit) = stack.pop() {
                self.visit(module, &top_path, visit, &mut stack);
            }
        }
    }

    fn visit<'a>(
        &mut self,
        module: &SchemaModule,
        top_path: &str,
        visit: Visit<'a>,
        stack: &mut Vec<Visit<'a>>,
    ) {
        let node = visit.node;
        let is_top = visit.parent.is_none() && visit.schema_parent.is_none();

        if visit.inherited.is_pending() {
            let at = visit.parent.clone().unwrap_or_else(|| top_path.to_string());
            self.diag(
                &at,
                format!("inherited values unresolved above '{}', subtree skipped", node.name),
            );
            return;
        }

        if node.kind.is_transparent() {
            self.visit_transparent(module, visit, stack);
            return;
        }

        let path = if is_top {
            top_path.to_string()
        } else {
            let prefix = visit.parent.as_deref().unwrap_or(top_path);
            format!("{prefix}{PATH_SEPARATOR}{}", node.name)
        };
        let full_path = if is_top {
            path.clone()
        } else {
            format!("{}{PATH_SEPARATOR}{}", visit.full_prefix, node.name)
        };

        let annots = self.parse_annotations(&path, node);
        let parent = visit.parent.as_deref().and_then(|p| self.yang.get(p)).cloned();
        let mut info = YangXpathInfo::new(&node.name, &module.name, node.kind);
        info.parent.clone_from(&visit.parent);
        info.schema_parent.clone_from(&visit.schema_parent);
        info.default.clone_from(&node.default);
        info.read_only = node.read_only || parent.as_ref().is_some_and(|p| p.read_only);

        // table binding: a declared name or transformer starts a new boundary
        info.table.clone_from(&annots.table);
        info.xfmr_table.clone_from(&annots.xfmr_table);
        info.table_boundary = annots.table.is_some() || annots.xfmr_table.is_some();
        info.db_key_count = annots.db_key_count.unwrap_or(0);
        if !info.table_boundary
            && let Some(p) = &parent
        {
            if p.table.is_some() {
                info.table.clone_from(&p.table);
                if annots.db_key_count.is_none() {
                    info.db_key_count = p.db_key_count;
                }
            } else if p.xfmr_table.is_some() {
                info.xfmr_table.clone_from(&p.xfmr_table);
            }
        }
        if let Some(table) = &annots.table {
            self.own_tables.push((path.clone(), table.clone()));
            if let Some(db) = self.db.get_mut(table) {
                db.yang_paths.push(path.clone());
            }
        }

        // inherited hints
        let db = Inherit::from(annots.db).or_inherit(visit.inherited.db);
        let interval = if annots.malformed {
            Inherit::Pending
        } else {
            Inherit::from(annots.interval).or_inherit(visit.inherited.interval)
        };
        let cascade = match (annots.cascade, db) {
            (Some(c), _) => Inherit::Resolved(c),
            (None, Inherit::Resolved(DbNum::ConfigDb)) => visit.inherited.cascade,
            (None, _) => Inherit::Resolved(false),
        };
        info.db = db.resolved_or(DbNum::ConfigDb);
        info.cascade_delete = cascade.resolved_or(false);
        info.subscribe_min_interval = interval.resolved_or(0);

        // callbacks; subtree and validate carry down
        info.xfmr_subtree = annots
            .subtree
            .clone()
            .or_else(|| parent.as_ref().and_then(|p| p.xfmr_subtree.clone()));
        info.validate = annots
            .validate
            .clone()
            .or_else(|| parent.as_ref().and_then(|p| p.validate.clone()));
        info.xfmr_key.clone_from(&annots.key_xfmr);
        info.xfmr_field.clone_from(&annots.field_xfmr);
        info.key_name.clone_from(&annots.key_name);
        info.delim.clone_from(&annots.delim);
        info.table_owner = annots.table_owner;
        info.virtual_table = annots.virtual_table;
        if annots.subtree.is_some() {
            self.own_subtrees.insert(path.clone());
        }

        // key levels
        let mut child_level = visit.key_level;
        if node.kind == NodeKind::List && !node.keys.is_empty() {
            let level: Vec<String> = node
                .keys
                .iter()
                .map(|k| format!("{path}{PATH_SEPARATOR}{k}"))
                .collect();
            if !annots.use_self_key
                && let Some(p) = &parent
            {
                info.key_levels.clone_from(&p.key_levels);
            }
            info.key_levels.push(level);
            info.keys.clone_from(&node.keys);
            info.key_level = visit.key_level;
            child_level += 1;
        } else if let Some(p) = &parent {
            info.key_levels.clone_from(&p.key_levels);
            info.key_level = visit.key_level;
        }
        info.is_key = node.kind.is_terminal()
            && parent
                .as_ref()
                .is_some_and(|p| p.is_list() && p.keys.contains(&node.name));

        if node.kind.is_terminal() {
            info.field = self.resolve_field(&info, &annots, node);
            if let (Some(table), Some(field)) = (&info.table, &info.field)
                && let Some(db) = self.db.get_mut(&format!("{table}/{field}"))
            {
                db.yang_paths.push(path.clone());
            }
        }

        // module-level bookkeeping
        if node.kind == NodeKind::Rpc
            && let Some(cb) = &annots.rpc
        {
            self.yang_rpc.insert(path.clone(), cb.clone());
        }
        if annots.pre.is_some() || annots.post.is_some() {
            let hooks = self.hooks.entry(path.clone()).or_default();
            if annots.pre.is_some() {
                hooks.pre.clone_from(&annots.pre);
            }
            if annots.post.is_some() {
                hooks.post.clone_from(&annots.post);
            }
        }

        self.attach_child(&visit, &path);
        self.yang.insert(path.clone(), info);

        let inherited = Inherited {
            db,
            cascade,
            interval,
        };
        for child in node.children.iter().rev() {
            stack.push(Visit {
                node: child,
                parent: Some(path.clone()),
                schema_parent: Some(path.clone()),
                full_prefix: full_path.clone(),
                key_level: child_level,
                inherited,
            });
        }
    }

    // choice and case records copy their concrete parent's bindings
    fn visit_transparent<'a>(
        &mut self,
        module: &SchemaModule,
        visit: Visit<'a>,
        stack: &mut Vec<Visit<'a>>,
    ) {
        let node = visit.node;
        let record = format!("{}{PATH_SEPARATOR}{}", visit.full_prefix, node.name);
        let mut info = YangXpathInfo::new(&node.name, &module.name, node.kind);

        if let Some(p) = visit.parent.as_deref().and_then(|p| self.yang.get(p)) {
            info.table.clone_from(&p.table);
            info.xfmr_table.clone_from(&p.xfmr_table);
            info.key_levels.clone_from(&p.key_levels);
            info.read_only = p.read_only;
            info.db = p.db;
        }
        info.parent.clone_from(&visit.parent);
        info.schema_parent.clone_from(&visit.schema_parent);
        info.key_level = visit.key_level;
        info.cascade_delete = visit.inherited.cascade.resolved_or(false);
        info.subscribe_min_interval = visit.inherited.interval.resolved_or(0);
        if !node.annotations.is_empty() {
            debug!(path = %record, "annotations on {} nodes are ignored", node.kind);
        }
        self.yang.insert(record.clone(), info);

        for child in node.children.iter().rev() {
            stack.push(Visit {
                node: child,
                parent: visit.parent.clone(),
                schema_parent: Some(record.clone()),
                full_prefix: record.clone(),
                key_level: visit.key_level,
                inherited: visit.inherited,
            });
        }
    }

    fn attach_child(&mut self, visit: &Visit<'_>, path: &str) {
        if let Some(parent) = visit.parent.as_deref().and_then(|p| self.yang.get_mut(p)) {
            parent.children.push(path.to_string());
        }
        if visit.schema_parent != visit.parent
            && let Some(via) = visit.schema_parent.as_deref().and_then(|p| self.yang.get_mut(p))
        {
            via.children.push(path.to_string());
        }
    }

    /// Field name of a leaf: explicit annotation, a store field of the
    /// same name, its upper-case form, or the leaf name under a table
    /// transformer.
    fn resolve_field(
        &self,
        info: &YangXpathInfo,
        annots: &Annotations,
        node: &SchemaNode,
    ) -> Option<String> {
        if let Some(field) = &annots.field {
            return Some(field.clone());
        }

        if let Some(table) = &info.table
            && self.db.contains_key(table)
        {
            let stored = |name: &str| {
                self.db
                    .get(&format!("{table}/{name}"))
                    .is_some_and(|f| !f.is_key)
            };
            if stored(&node.name) {
                return Some(node.name.clone());
            }
            let upper = node.name.to_uppercase();
            return stored(&upper).then_some(upper);
        }

        info.xfmr_table.as_ref().map(|_| node.name.clone())
    }

    fn parse_annotations(&mut self, path: &str, node: &SchemaNode) -> Annotations {
        let mut out = Annotations::default();

        for (key, value) in &node.annotations {
            let Some(annotation) = Annotation::from_key(key) else {
                self.diag(path, format!("unknown annotation '{key}' ignored"));
                continue;
            };
            let owned = Some(value.clone());

            match annotation {
                Annotation::TableName => out.table = owned,
                Annotation::TableTransformer => out.xfmr_table = owned,
                Annotation::KeyName => out.key_name = owned,
                Annotation::FieldName => out.field = owned,
                Annotation::SubtreeTransformer => out.subtree = owned,
                Annotation::KeyTransformer => out.key_xfmr = owned,
                Annotation::FieldTransformer => out.field_xfmr = owned,
                Annotation::KeyDelimiter | Annotation::KeyDelim => out.delim = owned,
                Annotation::GetValidate => out.validate = owned,
                Annotation::RpcCallback => out.rpc = owned,
                Annotation::PreTransformer => out.pre = owned,
                Annotation::PostTransformer => out.post = owned,
                Annotation::UseSelfKey => out.use_self_key = true,
                Annotation::DbName => match DbNum::from_name(value) {
                    Some(db) => out.db = Some(db),
                    None => self.diag(path, format!("unknown db-name '{value}', using CONFIG_DB")),
                },
                Annotation::TableOwner => out.table_owner = Some(!value.eq_ignore_ascii_case("false")),
                Annotation::VirtualTable => out.virtual_table = Some(value.eq_ignore_ascii_case("true")),
                Annotation::CascadeDelete => out.cascade = Some(value.eq_ignore_ascii_case("enable")),
                Annotation::SubscribeMinInterval => {
                    if value == "NONE" {
                        out.interval = Some(0);
                    } else if let Ok(v) = value.parse() {
                        out.interval = Some(v);
                    } else {
                        self.diag(path, format!("invalid subscribe-min-interval '{value}'"));
                        out.malformed = true;
                    }
                }
                Annotation::DbKeyCount => {
                    if let Ok(v) = value.parse() {
                        out.db_key_count = Some(v);
                    } else {
                        self.diag(path, format!("invalid db-key-count '{value}'"));
                        out.malformed = true;
                    }
                }
                Annotation::ValueTransformer => {
                    debug!(path, "value-transformer applies to store modules only");
                }
            }
        }

        out
    }

    /// Record each declared table on its ancestors, up to and including
    /// the nearest list that binds a table.
    pub(super) fn link_child_tables(&mut self) {
        let own = std::mem::take(&mut self.own_tables);

        for (path, table) in &own {
            let mut cur = self.yang.get(path).and_then(|i| i.parent.clone());
            while let Some(p) = cur {
                let Some(info) = self.yang.get_mut(&p) else {
                    break;
                };
                if !info.child_tables.contains(table) {
                    info.child_tables.push(table.clone());
                }
                if info.is_list() && (info.table.is_some() || info.xfmr_table.is_some()) {
                    break;
                }
                cur = info.parent.clone();
            }
        }

        self.own_tables = own;
    }
}
