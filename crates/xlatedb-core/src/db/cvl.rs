//! Contract with the external schema-validation engine.
//!
//! The store layer describes every mutation inside a transaction as an
//! [`EditRecord`] and re-submits the growing list to a
//! [`ValidationSession`]. The schema compiler also asks the engine for
//! per-module table ordering and dependency lists.

use crate::db::glob::glob_match;
use parking_lot::Mutex;
use serde::Serialize;
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::debug;

///
/// CvlOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum CvlOp {
    Create,
    Update,
    Delete,
}

///
/// ValidateType
///
/// `None` marks records already accepted earlier in the transaction.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum ValidateType {
    All,
    None,
}

///
/// EditRecord
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct EditRecord {
    pub vtype: ValidateType,
    pub op: CvlOp,
    pub key: String,
    pub data: BTreeMap<String, String>,
}

impl EditRecord {
    #[must_use]
    pub const fn new(op: CvlOp, key: String, data: BTreeMap<String, String>) -> Self {
        Self {
            vtype: ValidateType::All,
            op,
            key,
            data,
        }
    }
}

///
/// CvlRetCode
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[repr(i32)]
pub enum CvlRetCode {
    Success = 0,
    Error = 1,
    NotImplemented = 2,
    InternalUnknown = 3,
    Failure = 4,
    SyntaxError = 5,
    SemanticError = 6,
    SyntaxMissingField = 7,
    SemanticDependentDataMissing = 8,
    SemanticKeyAlreadyExist = 9,
    SemanticKeyNotExist = 10,
}

impl CvlRetCode {
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

///
/// CvlErrorInfo
///
/// Diagnostics returned alongside a rejection.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CvlErrorInfo {
    pub table_name: String,
    pub keys: Vec<String>,
    pub field: String,
    pub value: String,
    pub constraint_msg: String,
    pub error_app_tag: String,
}

///
/// ValidationOutcome
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationOutcome {
    pub code: CvlRetCode,
    pub info: CvlErrorInfo,
}

impl ValidationOutcome {
    #[must_use]
    pub fn accept() -> Self {
        Self {
            code: CvlRetCode::Success,
            info: CvlErrorInfo::default(),
        }
    }
}

///
/// ValidationFailure
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationFailure {
    pub code: CvlRetCode,
    pub info: CvlErrorInfo,
}

impl ValidationFailure {
    #[must_use]
    pub const fn numeric_code(&self) -> i32 {
        self.code.code()
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed ({:?})", self.code)?;
        if !self.info.constraint_msg.is_empty() {
            write!(f, ": {}", self.info.constraint_msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

///
/// ValidationSession
///

pub trait ValidationSession: Send {
    /// Validate the full edit list accumulated so far.
    fn validate(&mut self, edits: &[EditRecord]) -> ValidationOutcome;

    fn close(self: Box<Self>);
}

///
/// ValidationEngine
///

pub trait ValidationEngine: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn ValidationSession>, CvlRetCode>;

    /// Tables of `module` in dependency order, dependents first.
    fn ordered_tables(&self, module: &str) -> Result<Vec<String>, CvlRetCode>;

    /// Tables within `module` that depend on `table`, in delete order.
    fn ordered_dep_tables(&self, module: &str, table: &str) -> Result<Vec<String>, CvlRetCode>;

    /// Tables in any module that depend on `table`.
    fn cross_module_dep_tables(&self, module: &str, table: &str)
    -> Result<Vec<String>, CvlRetCode>;
}

///
/// Rule
///

#[derive(Clone, Debug)]
pub enum Rule {
    /// Reject edits of `op` on physical keys matching `pattern`.
    RejectKey {
        pattern: String,
        op: CvlOp,
        code: CvlRetCode,
    },

    /// Creates on `table` must carry `field`.
    RequireField { table: String, field: String },
}

#[derive(Clone, Debug, Default)]
struct ModuleOrder {
    ordered: Vec<String>,
    within: BTreeMap<String, Vec<String>>,
    across: BTreeMap<String, Vec<String>>,
}

///
/// RuleValidator
///
/// Rule-driven engine: accepts everything except edits matching a
/// [`Rule`], and answers ordering queries from registered module data.
/// Every submitted edit list is recorded for inspection.
///

#[derive(Clone, Debug)]
pub struct RuleValidator {
    modules: BTreeMap<String, ModuleOrder>,
    rules: Arc<Vec<Rule>>,
    table_separator: String,
    submissions: Arc<Mutex<Vec<Vec<EditRecord>>>>,
}

impl Default for RuleValidator {
    fn default() -> Self {
        Self {
            modules: BTreeMap::new(),
            rules: Arc::new(Vec::new()),
            table_separator: "|".to_string(),
            submissions: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl RuleValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_table_separator(mut self, sep: &str) -> Self {
        self.table_separator = sep.to_string();
        self
    }

    /// Dependency order for `module`, dependents first.
    #[must_use]
    pub fn order<S: AsRef<str>>(mut self, module: &str, tables: &[S]) -> Self {
        self.modules.entry(module.to_string()).or_default().ordered =
            tables.iter().map(|t| t.as_ref().to_string()).collect();
        self
    }

    #[must_use]
    pub fn depends<S: AsRef<str>>(
        mut self,
        module: &str,
        table: &str,
        within: &[S],
        across: &[S],
    ) -> Self {
        let entry = self.modules.entry(module.to_string()).or_default();
        entry.within.insert(
            table.to_string(),
            within.iter().map(|t| t.as_ref().to_string()).collect(),
        );
        entry.across.insert(
            table.to_string(),
            across.iter().map(|t| t.as_ref().to_string()).collect(),
        );
        self
    }

    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        Arc::make_mut(&mut self.rules).push(rule);
        self
    }

    /// Every edit list submitted so far, in submission order.
    #[must_use]
    pub fn submissions(&self) -> Vec<Vec<EditRecord>> {
        self.submissions.lock().clone()
    }

    fn module(&self, module: &str) -> Result<&ModuleOrder, CvlRetCode> {
        self.modules.get(module).ok_or(CvlRetCode::Error)
    }
}

impl ValidationEngine for RuleValidator {
    fn open_session(&self) -> Result<Box<dyn ValidationSession>, CvlRetCode> {
        Ok(Box::new(RuleSession {
            rules: Arc::clone(&self.rules),
            table_separator: self.table_separator.clone(),
            submissions: Arc::clone(&self.submissions),
        }))
    }

    fn ordered_tables(&self, module: &str) -> Result<Vec<String>, CvlRetCode> {
        Ok(self.module(module)?.ordered.clone())
    }

    fn ordered_dep_tables(&self, module: &str, table: &str) -> Result<Vec<String>, CvlRetCode> {
        Ok(self
            .module(module)?
            .within
            .get(table)
            .cloned()
            .unwrap_or_default())
    }

    fn cross_module_dep_tables(
        &self,
        module: &str,
        table: &str,
    ) -> Result<Vec<String>, CvlRetCode> {
        Ok(self
            .module(module)?
            .across
            .get(table)
            .cloned()
            .unwrap_or_default())
    }
}

struct RuleSession {
    rules: Arc<Vec<Rule>>,
    table_separator: String,
    submissions: Arc<Mutex<Vec<Vec<EditRecord>>>>,
}

impl RuleSession {
    fn check(&self, edit: &EditRecord) -> Option<ValidationOutcome> {
        let table = edit
            .key
            .split_once(self.table_separator.as_str())
            .map_or(edit.key.as_str(), |(t, _)| t);

        for rule in self.rules.iter() {
            match rule {
                Rule::RejectKey { pattern, op, code } => {
                    if *op == edit.op && glob_match(pattern, &edit.key) {
                        return Some(reject(*code, table, &edit.key, "", "key rejected"));
                    }
                }
                Rule::RequireField { table: t, field } => {
                    if t == table && edit.op == CvlOp::Create && !edit.data.contains_key(field) {
                        return Some(reject(
                            CvlRetCode::SyntaxMissingField,
                            table,
                            &edit.key,
                            field,
                            "mandatory field missing",
                        ));
                    }
                }
            }
        }

        None
    }
}

fn reject(code: CvlRetCode, table: &str, key: &str, field: &str, msg: &str) -> ValidationOutcome {
    ValidationOutcome {
        code,
        info: CvlErrorInfo {
            table_name: table.to_string(),
            keys: vec![key.to_string()],
            field: field.to_string(),
            constraint_msg: msg.to_string(),
            ..CvlErrorInfo::default()
        },
    }
}

impl ValidationSession for RuleSession {
    fn validate(&mut self, edits: &[EditRecord]) -> ValidationOutcome {
        self.submissions.lock().push(edits.to_vec());

        edits
            .iter()
            .filter(|e| e.vtype == ValidateType::All)
            .find_map(|e| self.check(e))
            .map_or_else(ValidationOutcome::accept, |outcome| {
                debug!(code = ?outcome.code, table = %outcome.info.table_name, "edit rejected by rule");
                outcome
            })
    }

    fn close(self: Box<Self>) {}
}
