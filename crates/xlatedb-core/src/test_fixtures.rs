//! Shared schema, transformers and store setup for translation tests.

use crate::{
    config::DbNum,
    db::{DbSet, Key, TableSpec, Value, cvl::{RuleValidator, ValidationEngine}, memory::MemoryStore},
    registry::{Xfmr, XfmrRegistry},
    spec::{SpecHandle, SpecInput},
    xlate::{DbMutations, Oper, QueryParams, Translator},
};
use serde_json::{Value as JsonValue, json};
use std::{collections::BTreeMap, sync::Arc};
use tracing_subscriber::EnvFilter;
use xlatedb_schema::{
    annotation::Annotation,
    node::{SchemaModule, SchemaNode},
};

pub(crate) const DBS: [DbNum; 3] = [DbNum::ConfigDb, DbNum::StateDb, DbNum::CountersDb];

//
// store modules
//

pub(crate) fn sonic_port() -> SchemaModule {
    SchemaModule::store("sonic-port").node(
        SchemaNode::container("sonic-port")
            .child(
                SchemaNode::container("PORT").child(
                    SchemaNode::list("PORT_LIST", &["ifname"]).children([
                        SchemaNode::leaf("ifname"),
                        SchemaNode::leaf("mtu"),
                        SchemaNode::leaf("admin_status").default_value("down"),
                        SchemaNode::leaf("description"),
                        SchemaNode::leaf("speed").annotate(Annotation::ValueTransformer, "speed_xfmr"),
                    ]),
                ),
            )
            .child(
                SchemaNode::container("PORT_TABLE")
                    .annotate(Annotation::DbName, "STATE_DB")
                    .child(SchemaNode::list("PORT_TABLE_LIST", &["ifname"]).children([
                        SchemaNode::leaf("ifname"),
                        SchemaNode::leaf("oper_status"),
                        SchemaNode::leaf("mtu"),
                        SchemaNode::leaf("in_pkts"),
                    ])),
            ),
    )
}

pub(crate) fn sonic_acl() -> SchemaModule {
    SchemaModule::store("sonic-acl")
        .node(
            SchemaNode::container("sonic-acl")
                .child(
                    SchemaNode::container("ACL_TABLE").child(
                        SchemaNode::list("ACL_TABLE_LIST", &["aclname"]).children([
                            SchemaNode::leaf("aclname"),
                            SchemaNode::leaf("policy_desc"),
                            SchemaNode::leaf("type").default_value("L3"),
                            SchemaNode::leaf_list("ports")
                                .leafref("/sonic-port:sonic-port/PORT/PORT_LIST/ifname"),
                        ]),
                    ),
                )
                .child(
                    SchemaNode::container("ACL_RULE").child(
                        SchemaNode::list("ACL_RULE_LIST", &["aclname", "rulename"]).children([
                            SchemaNode::leaf("aclname")
                                .leafref("../../../ACL_TABLE/ACL_TABLE_LIST/aclname"),
                            SchemaNode::leaf("rulename"),
                            SchemaNode::leaf("PRIORITY"),
                            SchemaNode::leaf("PACKET_ACTION"),
                        ]),
                    ),
                ),
        )
        .node(
            SchemaNode::rpc("clear-acl-counters")
                .annotate(Annotation::RpcCallback, "rpc_clear_acl_counters"),
        )
}

pub(crate) fn sonic_grp() -> SchemaModule {
    SchemaModule::store("sonic-grp").node(
        SchemaNode::container("sonic-grp").child(
            SchemaNode::container("GROUP").children([
                SchemaNode::list("GROUP_LIST", &["g"])
                    .children([SchemaNode::leaf("g"), SchemaNode::leaf("desc")]),
                SchemaNode::list("GROUP_MEMBER_LIST", &["g", "r"]).children([
                    SchemaNode::leaf("g"),
                    SchemaNode::leaf("r"),
                    SchemaNode::leaf("weight"),
                ]),
                SchemaNode::list("GROUP_SUB_LIST", &["g", "r", "s"]).children([
                    SchemaNode::leaf("g"),
                    SchemaNode::leaf("r"),
                    SchemaNode::leaf("s"),
                    SchemaNode::leaf("state"),
                ]),
            ]),
        ),
    )
}

pub(crate) fn sonic_device_metadata() -> SchemaModule {
    SchemaModule::store("sonic-device-metadata").node(
        SchemaNode::container("sonic-device-metadata").child(
            SchemaNode::container("DEVICE_METADATA").child(
                SchemaNode::container("localhost")
                    .children([SchemaNode::leaf("hostname"), SchemaNode::leaf("platform")]),
            ),
        ),
    )
}

//
// model modules
//

pub(crate) fn openconfig_interfaces() -> SchemaModule {
    let config = SchemaNode::container("config").children([
        SchemaNode::leaf("mtu"),
        SchemaNode::leaf("description"),
        SchemaNode::leaf("enabled").annotate(Annotation::FieldTransformer, "enabled_xfmr"),
    ]);
    let state = SchemaNode::container("state")
        .annotate(Annotation::TableName, "PORT_TABLE")
        .annotate(Annotation::DbName, "STATE_DB")
        .read_only()
        .children([
            SchemaNode::leaf("oper-status").annotate(Annotation::FieldName, "oper_status"),
            SchemaNode::leaf("mtu"),
            SchemaNode::container("counters")
                .annotate(Annotation::SubtreeTransformer, "intf_counters_xfmr")
                .annotate(Annotation::GetValidate, "counters_valid")
                .child(SchemaNode::leaf("in-pkts")),
        ]);
    let subinterfaces = SchemaNode::container("subinterfaces").child(
        SchemaNode::list("subinterface", &["index"])
            .annotate(Annotation::TableTransformer, "subintf_tbl_xfmr")
            .annotate(Annotation::KeyTransformer, "subintf_key_xfmr")
            .children([
                SchemaNode::leaf("index"),
                SchemaNode::container("config").child(SchemaNode::leaf("mtu")),
            ]),
    );

    SchemaModule::model("openconfig-interfaces").node(
        SchemaNode::container("interfaces").child(
            SchemaNode::list("interface", &["name"])
                .annotate(Annotation::TableName, "PORT")
                .children([SchemaNode::leaf("name"), config, state, subinterfaces]),
        ),
    )
}

pub(crate) fn openconfig_acl() -> SchemaModule {
    let entry = SchemaNode::list("acl-entry", &["sequence-id"])
        .annotate(Annotation::TableName, "ACL_RULE")
        .children([
            SchemaNode::leaf("sequence-id"),
            SchemaNode::container("config").children([
                SchemaNode::leaf("priority"),
                SchemaNode::leaf("action")
                    .annotate(Annotation::FieldName, "PACKET_ACTION")
                    .default_value("FORWARD"),
            ]),
        ]);
    let set = SchemaNode::list("acl-set", &["name"])
        .annotate(Annotation::TableName, "ACL_TABLE")
        .annotate(Annotation::CascadeDelete, "enable")
        .children([
            SchemaNode::leaf("name"),
            SchemaNode::container("config").children([
                SchemaNode::leaf("description").annotate(Annotation::FieldName, "policy_desc"),
                SchemaNode::leaf("type").default_value("L3"),
                SchemaNode::leaf_list("ports"),
            ]),
            SchemaNode::container("acl-entries").child(entry),
        ]);

    SchemaModule::model("openconfig-acl")
        .version("2019-11-27")
        .organization("OpenConfig working group")
        .annotate(Annotation::PostTransformer, "acl_post_xfmr")
        .node(SchemaNode::container("acl").child(SchemaNode::container("acl-sets").child(set)))
}

pub(crate) fn spec_input() -> SpecInput {
    SpecInput::new()
        .module(sonic_port())
        .module(sonic_acl())
        .module(sonic_grp())
        .module(sonic_device_metadata())
        .module(openconfig_interfaces())
        .module(openconfig_acl())
}

pub(crate) fn validator() -> RuleValidator {
    RuleValidator::new()
        .order("sonic-port", &["PORT", "PORT_TABLE"])
        .depends("sonic-port", "PORT", &[], &["ACL_TABLE"])
        .order("sonic-acl", &["ACL_RULE", "ACL_TABLE"])
        .depends("sonic-acl", "ACL_TABLE", &["ACL_RULE"], &[])
        .order("sonic-grp", &["GROUP"])
        .order("sonic-device-metadata", &["DEVICE_METADATA"])
}

//
// transformers
//

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

pub(crate) fn registry() -> XfmrRegistry {
    let mut reg = XfmrRegistry::new();
    register_all(&mut reg);
    reg
}

pub(crate) fn register_all(reg: &mut XfmrRegistry) {
    let entries = [
        (
            "YangToDb_enabled_xfmr",
            Xfmr::field_to_db(|_, v| {
                let status = match v {
                    JsonValue::Bool(true) => "up",
                    JsonValue::Bool(false) => "down",
                    JsonValue::String(s) if s == "true" => "up",
                    JsonValue::String(_) => "down",
                    _ => "",
                };
                Ok(string_map(&[("admin_status", status)]))
            }),
        ),
        (
            "DbToYang_enabled_xfmr",
            Xfmr::field_from_db(|_, row| {
                let mut out = BTreeMap::new();
                if row.has("admin_status") {
                    out.insert("enabled".to_string(), json!(row.get("admin_status") == "up"));
                }
                Ok(out)
            }),
        ),
        (
            "DbToYang_intf_counters_xfmr",
            Xfmr::subtree_from_db(|params| {
                let (Some(table), Some(key)) = (params.table, params.key) else {
                    return Ok(JsonValue::Null);
                };
                let db = params.dbs.get(params.db)?;
                match db.get_entry(&TableSpec::new(table), key) {
                    Ok(row) if row.has("in_pkts") => Ok(json!({ "in-pkts": row.get("in_pkts") })),
                    Ok(_) => Ok(JsonValue::Null),
                    Err(err) if err.is_not_found() => Ok(JsonValue::Null),
                    Err(err) => Err(err),
                }
            }),
        ),
        (
            "counters_valid",
            Xfmr::validate(|params| {
                params
                    .path
                    .elems()
                    .get(1)
                    .and_then(|e| e.key("name"))
                    .is_some_and(|name| !name.starts_with("Loopback"))
            }),
        ),
        (
            "subintf_tbl_xfmr",
            Xfmr::table(|_| Ok(vec!["VLAN_SUB_INTERFACE".to_string()])),
        ),
        (
            "YangToDb_subintf_key_xfmr",
            Xfmr::key_to_db(|params| {
                let elems = params.path.elems();
                let name = elems.get(1).and_then(|e| e.key("name"));
                let index = elems.get(3).and_then(|e| e.key("index"));
                Ok(match (name, index) {
                    (Some(name), Some(index)) => format!("{name}.{index}"),
                    _ => String::new(),
                })
            }),
        ),
        (
            "DbToYang_subintf_key_xfmr",
            Xfmr::key_from_db(|_, key| {
                let local = key.join("|");
                Ok(local
                    .split_once('.')
                    .map(|(_, index)| string_map(&[("index", index)]))
                    .unwrap_or_default())
            }),
        ),
        (
            "speed_xfmr",
            Xfmr::value(|params, v| {
                Ok(if params.to_db {
                    v.strip_suffix('G').map_or_else(|| v.to_string(), |g| format!("{g}000"))
                } else {
                    v.strip_suffix("000").map_or_else(|| v.to_string(), |g| format!("{g}G"))
                })
            }),
        ),
        (
            "acl_post_xfmr",
            Xfmr::post_xfmr(|params, plan| {
                if params.oper == Oper::Delete {
                    return Ok(());
                }
                let mut audit = DbMutations::new();
                audit
                    .entry(DbNum::ConfigDb)
                    .or_default()
                    .entry("ACL_AUDIT".to_string())
                    .or_default()
                    .insert(
                        Key::single("last"),
                        Value::from_pairs([("oper", params.oper.to_string())]),
                    );
                let dst = plan.entry(Oper::Update).or_default();
                for (db, tables) in audit {
                    dst.entry(db).or_default().extend(tables);
                }
                Ok(())
            }),
        ),
        (
            "rpc_clear_acl_counters",
            Xfmr::rpc(|body, dbs| {
                let req: JsonValue = serde_json::from_slice(body)
                    .map_err(|e| crate::error::Error::translate_internal(e.to_string()))?;
                let name = req.get("aclname").and_then(JsonValue::as_str).unwrap_or_default();
                dbs.get_mut(DbNum::CountersDb)?.set_entry(
                    &TableSpec::new("ACL_COUNTERS"),
                    &Key::single(name),
                    &Value::from_pairs([("packets", "0")]),
                )?;
                Ok(json!({ "status": "cleared", "aclname": name }).to_string().into_bytes())
            }),
        ),
    ];

    for (name, xfmr) in entries {
        reg.register(name, xfmr).expect("fixture transformer registers once");
    }
}

/// Route engine logs to the test harness; `RUST_LOG` picks the level.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

///
/// Fixture
///
/// Compiled schema, registry and an in-memory store with one connection
/// per database in [`DBS`].
///

pub(crate) struct Fixture {
    pub store: MemoryStore,
    pub validator: RuleValidator,
    pub translator: Translator,
    pub dbs: DbSet,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with(validator(), registry())
    }

    pub fn with(validator: RuleValidator, registry: XfmrRegistry) -> Self {
        let store = MemoryStore::new();
        let engine: Arc<dyn ValidationEngine> = Arc::new(validator.clone());
        Self::with_engine(store, validator, &engine, registry)
    }

    pub fn with_engine(
        store: MemoryStore,
        validator: RuleValidator,
        engine: &Arc<dyn ValidationEngine>,
        registry: XfmrRegistry,
    ) -> Self {
        init_tracing();
        let spec = SpecHandle::compile(&spec_input(), &validator).expect("fixture schema compiles");
        let dbs = DbSet::open_memory(&store, &DBS, None, engine).expect("fixture dbs open");

        Self {
            store,
            validator,
            translator: Translator::new(spec, Arc::new(registry)),
            dbs,
        }
    }

    /// Write a row directly, outside any transaction.
    pub fn seed(&mut self, db: DbNum, table: &str, key: &str, fields: &[(&str, &str)]) {
        let key = Key::new(key.split('|'));
        self.dbs
            .get_mut(db)
            .expect("fixture db")
            .set_entry(&TableSpec::new(table), &key, &Value::from_pairs(fields.iter().copied()))
            .expect("seed row");
    }

    /// Stored row by physical key, straight from the backend.
    pub fn row(&self, db: DbNum, physical: &str) -> Option<BTreeMap<String, String>> {
        self.store.dump(db).remove(physical)
    }

    pub fn get(&self, path: &str) -> JsonValue {
        self.translator
            .get(&self.dbs, path, &QueryParams::default())
            .expect("read succeeds")
            .tree
    }

    pub fn write(&mut self, oper: Oper, path: &str, payload: Option<JsonValue>) {
        self.translator
            .commit_write(&mut self.dbs, oper, path, payload.as_ref())
            .expect("write commits");
    }

    /// A port with config and state rows.
    pub fn seed_port(&mut self, name: &str) {
        self.seed(
            DbNum::ConfigDb,
            "PORT",
            name,
            &[("mtu", "9100"), ("admin_status", "up"), ("description", "uplink")],
        );
        self.seed(
            DbNum::StateDb,
            "PORT_TABLE",
            name,
            &[("oper_status", "up"), ("mtu", "9100"), ("in_pkts", "42")],
        );
    }
}
