use super::*;
use crate::{
    config::Options,
    db::{
        Db, TableSpec,
        cvl::{
            CvlOp, CvlRetCode, EditRecord, Rule, RuleValidator, ValidationEngine,
            ValidationOutcome, ValidationSession,
        },
        memory::MemoryStore,
    },
    test_fixtures::{Fixture, register_all, registry, validator},
};
use serde_json::json;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

const ETH0: &str = "/openconfig-interfaces:interfaces/interface[name=Ethernet0]";
const ACL1: &str = "/openconfig-acl:acl/acl-sets/acl-set[name=ACL1]";

fn acl1_payload() -> JsonValue {
    json!({
        "acl-set": [{
            "name": "ACL1",
            "config": { "description": "edge", "ports": ["Ethernet0", "Ethernet4"] },
            "acl-entries": {
                "acl-entry": [{ "sequence-id": "10", "config": { "priority": "100" } }]
            }
        }]
    })
}

fn row_of(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

//
// reads
//

#[test]
fn get_interface_merges_config_and_state_rows() {
    let mut fx = Fixture::new();
    fx.seed_port("Ethernet0");

    assert_eq!(
        fx.get(ETH0),
        json!({
            "interface": [{
                "name": "Ethernet0",
                "config": { "mtu": "9100", "description": "uplink", "enabled": true },
                "state": {
                    "oper-status": "up",
                    "mtu": "9100",
                    "counters": { "in-pkts": "42" }
                }
            }]
        })
    );
}

#[test]
fn get_container_lists_every_instance() {
    let mut fx = Fixture::new();
    fx.seed_port("Ethernet0");
    fx.seed_port("Ethernet4");

    let tree = fx.get("/openconfig-interfaces:interfaces");
    let names: Vec<&str> = tree["interfaces"]["interface"]
        .as_array()
        .expect("interface list")
        .iter()
        .filter_map(|i| i["name"].as_str())
        .collect();

    assert_eq!(names, ["Ethernet0", "Ethernet4"]);
}

#[test]
fn get_leaf_returns_single_member() {
    let mut fx = Fixture::new();
    fx.seed_port("Ethernet0");

    assert_eq!(fx.get(&format!("{ETH0}/config/mtu")), json!({ "mtu": "9100" }));
    assert_eq!(
        fx.get(&format!("{ETH0}/state/oper-status")),
        json!({ "oper-status": "up" })
    );
}

#[test]
fn get_reports_which_rows_were_fetched() {
    let mut fx = Fixture::new();
    fx.seed_port("Ethernet0");

    let resp = fx
        .translator
        .get(&fx.dbs, ETH0, &QueryParams::default())
        .expect("read succeeds");

    assert!(resp.was_queried(DbNum::ConfigDb, "PORT", &Key::single("Ethernet0")));
    assert!(!resp.was_queried(DbNum::ConfigDb, "PORT", &Key::single("Ethernet4")));
}

#[test]
fn missing_instance_is_not_found() {
    let fx = Fixture::new();

    let err = fx
        .translator
        .get(
            &fx.dbs,
            "/openconfig-interfaces:interfaces/interface[name=Ethernet9]",
            &QueryParams::default(),
        )
        .expect_err("no such port");

    assert!(err.is_not_found());
}

#[test]
fn missing_leaf_value_is_not_found() {
    let mut fx = Fixture::new();
    fx.seed(DbNum::ConfigDb, "PORT", "Ethernet0", &[("mtu", "9100")]);

    let err = fx
        .translator
        .get(&fx.dbs, &format!("{ETH0}/config/description"), &QueryParams::default())
        .expect_err("field absent");

    assert!(err.is_not_found());
}

#[test]
fn unknown_path_is_rejected() {
    let fx = Fixture::new();

    let err = fx
        .translator
        .get(&fx.dbs, "/openconfig-interfaces:bogus", &QueryParams::default())
        .expect_err("unknown node");

    assert_eq!(err.class, ErrorClass::Internal);
}

#[test]
fn content_config_drops_state() {
    let mut fx = Fixture::new();
    fx.seed_port("Ethernet0");

    let params = QueryParams::default().with_content(Content::Config);
    let tree = fx.translator.get(&fx.dbs, ETH0, &params).expect("read").tree;

    assert!(tree["interface"][0].get("state").is_none());
    assert_eq!(tree["interface"][0]["config"]["mtu"], "9100");
}

#[test]
fn content_non_config_keeps_only_read_only_leaves() {
    let mut fx = Fixture::new();
    fx.seed_port("Ethernet0");

    let params = QueryParams::default().with_content(Content::NonConfig);
    let tree = fx.translator.get(&fx.dbs, ETH0, &params).expect("read").tree;
    let entry = &tree["interface"][0];

    assert!(entry.get("config").is_none());
    assert!(entry.get("name").is_none());
    assert_eq!(entry["state"]["mtu"], "9100");
}

#[test]
fn content_operational_skips_mirrored_state() {
    let mut fx = Fixture::new();
    fx.seed_port("Ethernet0");

    let params = QueryParams::default().with_content(Content::Operational);
    let tree = fx.translator.get(&fx.dbs, ETH0, &params).expect("read").tree;

    assert_eq!(
        tree,
        json!({
            "interface": [{
                "state": { "oper-status": "up", "counters": { "in-pkts": "42" } }
            }]
        })
    );
}

#[test]
fn depth_limits_returned_levels() {
    let mut fx = Fixture::new();
    fx.seed_port("Ethernet0");

    let params = QueryParams::default().with_depth(2);
    let tree = fx.translator.get(&fx.dbs, ETH0, &params).expect("read").tree;

    assert_eq!(tree, json!({ "interface": [{ "name": "Ethernet0" }] }));
}

//
// transformers
//

#[test]
fn validate_transformer_hides_subtree() {
    let mut fx = Fixture::new();
    fx.seed_port("Loopback0");

    let tree = fx.get("/openconfig-interfaces:interfaces/interface[name=Loopback0]/state");

    assert!(tree["state"].get("counters").is_none());
    assert_eq!(tree["state"]["oper-status"], "up");
}

#[test]
fn table_and_key_transformers_locate_rows() {
    let mut fx = Fixture::new();
    fx.seed_port("Ethernet0");
    fx.seed(DbNum::ConfigDb, "VLAN_SUB_INTERFACE", "Ethernet0.10", &[("mtu", "1500")]);

    let tree = fx.get(&format!("{ETH0}/subinterfaces/subinterface[index=10]"));

    assert_eq!(
        tree,
        json!({ "subinterface": [{ "index": "10", "config": { "mtu": "1500" } }] })
    );
}

#[test]
fn key_transformer_builds_row_key_on_write() {
    let mut fx = Fixture::new();
    fx.seed_port("Ethernet0");

    fx.write(
        Oper::Update,
        &format!("{ETH0}/subinterfaces/subinterface[index=20]"),
        Some(json!({ "subinterface": [{ "index": "20", "config": { "mtu": "9000" } }] })),
    );

    assert_eq!(
        fx.row(DbNum::ConfigDb, "VLAN_SUB_INTERFACE|Ethernet0.20"),
        Some(row_of(&[("mtu", "9000")]))
    );
}

#[test]
fn field_transformer_maps_both_ways() {
    let mut fx = Fixture::new();
    fx.seed_port("Ethernet0");

    fx.write(
        Oper::Update,
        &format!("{ETH0}/config/enabled"),
        Some(json!({ "enabled": false })),
    );

    let row = fx.row(DbNum::ConfigDb, "PORT|Ethernet0").expect("port row");
    assert_eq!(row.get("admin_status").map(String::as_str), Some("down"));
    assert_eq!(
        fx.get(&format!("{ETH0}/config/enabled")),
        json!({ "enabled": false })
    );
}

#[test]
fn lenient_registry_treats_missing_transformer_as_empty() {
    let mut fx = Fixture::with(validator(), XfmrRegistry::new());
    fx.seed_port("Ethernet0");

    let err = fx
        .translator
        .get(&fx.dbs, &format!("{ETH0}/config/enabled"), &QueryParams::default())
        .expect_err("nothing produced the leaf");
    assert!(err.is_not_found());

    // counters come only from the subtree transformer
    let tree = fx.get(&format!("{ETH0}/state"));
    assert!(tree["state"].get("counters").is_none());
}

#[test]
fn strict_registry_rejects_missing_transformer() {
    let mut fx = Fixture::with(validator(), XfmrRegistry::strict());
    fx.seed_port("Ethernet0");

    let err = fx
        .translator
        .get(&fx.dbs, &format!("{ETH0}/config/enabled"), &QueryParams::default())
        .expect_err("strict lookup");
    assert_eq!(err.class, ErrorClass::Unsupported);

    // paths without transformers are unaffected
    assert_eq!(fx.get(&format!("{ETH0}/config/mtu")), json!({ "mtu": "9100" }));
}

#[test]
fn strict_registry_accepts_registered_names() {
    let mut reg = XfmrRegistry::strict();
    register_all(&mut reg);
    let mut fx = Fixture::with(validator(), reg);
    fx.seed_port("Ethernet0");

    assert_eq!(
        fx.get(&format!("{ETH0}/config/enabled")),
        json!({ "enabled": true })
    );
}

//
// writes
//

#[test]
fn create_writes_rows_with_defaults_and_reads_back() {
    let mut fx = Fixture::new();
    fx.write(Oper::Create, ACL1, Some(acl1_payload()));

    assert_eq!(
        fx.row(DbNum::ConfigDb, "ACL_TABLE|ACL1"),
        Some(row_of(&[
            ("policy_desc", "edge"),
            ("ports@", "Ethernet0,Ethernet4"),
            ("type", "L3"),
        ]))
    );
    assert_eq!(
        fx.row(DbNum::ConfigDb, "ACL_RULE|ACL1|10"),
        Some(row_of(&[("PRIORITY", "100"), ("PACKET_ACTION", "FORWARD")]))
    );

    assert_eq!(
        fx.get(ACL1),
        json!({
            "acl-set": [{
                "name": "ACL1",
                "config": {
                    "description": "edge",
                    "type": "L3",
                    "ports": ["Ethernet0", "Ethernet4"]
                },
                "acl-entries": {
                    "acl-entry": [{
                        "sequence-id": "10",
                        "config": { "priority": "100", "action": "FORWARD" }
                    }]
                }
            }]
        })
    );
}

#[test]
fn create_orders_owner_tables_first() {
    let mut fx = Fixture::new();
    fx.write(Oper::Create, ACL1, Some(acl1_payload()));

    let last = fx.validator.submissions().pop().unwrap_or_default();
    let keys: Vec<&str> = last.iter().map(|e| e.key.as_str()).collect();

    assert_eq!(keys[..2], ["ACL_TABLE|ACL1", "ACL_RULE|ACL1|10"]);
}

#[test]
fn post_hook_adds_audit_row() {
    let fx = Fixture::new();

    let plan = fx
        .translator
        .translate_write(&fx.dbs, Oper::Create, ACL1, Some(&acl1_payload()))
        .expect("translate");

    let audit = plan
        .rows(Oper::Update, DbNum::ConfigDb, "ACL_AUDIT")
        .expect("audit rows");
    assert_eq!(audit[&Key::single("last")].get("oper"), "CREATE");
    assert!(plan.tables_to_watch.iter().any(|t| t == "ACL_TABLE"));
}

#[test]
fn get_is_not_a_write() {
    let fx = Fixture::new();

    let err = fx
        .translator
        .translate_write(&fx.dbs, Oper::Get, ACL1, None)
        .expect_err("get is a read");

    assert_eq!(err.class, ErrorClass::Unsupported);
}

#[test]
fn unknown_payload_member_is_rejected() {
    let fx = Fixture::new();

    let err = fx
        .translator
        .translate_write(
            &fx.dbs,
            Oper::Update,
            &format!("{ACL1}/config"),
            Some(&json!({ "config": { "colour": "red" } })),
        )
        .expect_err("unknown member");

    assert_eq!(err.class, ErrorClass::Internal);
}

#[test]
fn update_leaf_keeps_other_fields() {
    let mut fx = Fixture::new();
    fx.write(Oper::Create, ACL1, Some(acl1_payload()));

    fx.write(
        Oper::Update,
        &format!("{ACL1}/config/description"),
        Some(json!({ "description": "core" })),
    );

    let row = fx.row(DbNum::ConfigDb, "ACL_TABLE|ACL1").expect("acl row");
    assert_eq!(row.get("policy_desc").map(String::as_str), Some("core"));
    assert_eq!(row.get("type").map(String::as_str), Some("L3"));
}

#[test]
fn replace_overwrites_row() {
    let mut fx = Fixture::new();
    fx.write(Oper::Create, ACL1, Some(acl1_payload()));

    fx.write(
        Oper::Replace,
        &format!("{ACL1}/config"),
        Some(json!({ "config": { "description": "fresh" } })),
    );

    assert_eq!(
        fx.row(DbNum::ConfigDb, "ACL_TABLE|ACL1"),
        Some(row_of(&[("policy_desc", "fresh"), ("type", "L3")]))
    );
    // rows outside the payload stay
    assert!(fx.row(DbNum::ConfigDb, "ACL_RULE|ACL1|10").is_some());
}

#[test]
fn delete_leaf_removes_one_field() {
    let mut fx = Fixture::new();
    fx.write(Oper::Create, ACL1, Some(acl1_payload()));

    fx.write(Oper::Delete, &format!("{ACL1}/config/description"), None);

    let row = fx.row(DbNum::ConfigDb, "ACL_TABLE|ACL1").expect("acl row");
    assert!(!row.contains_key("policy_desc"));
    assert!(row.contains_key("type"));
}

#[test]
fn delete_instance_cascades_to_dependents() {
    let mut fx = Fixture::new();
    fx.write(Oper::Create, ACL1, Some(acl1_payload()));
    fx.seed(DbNum::ConfigDb, "ACL_RULE", "ACL1|20", &[("PRIORITY", "5")]);
    fx.seed(DbNum::ConfigDb, "ACL_TABLE", "ACL2", &[("policy_desc", "keep")]);
    fx.seed(DbNum::ConfigDb, "ACL_RULE", "ACL2|10", &[("PRIORITY", "7")]);

    fx.write(Oper::Delete, ACL1, None);

    let rows = fx.store.dump(DbNum::ConfigDb);
    assert!(!rows.contains_key("ACL_TABLE|ACL1"));
    assert!(!rows.contains_key("ACL_RULE|ACL1|10"));
    assert!(!rows.contains_key("ACL_RULE|ACL1|20"));
    assert!(rows.contains_key("ACL_TABLE|ACL2"));
    assert!(rows.contains_key("ACL_RULE|ACL2|10"));

    // dependents go before their owner
    let last = fx.validator.submissions().pop().unwrap_or_default();
    let keys: Vec<&str> = last.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys.last().copied(), Some("ACL_TABLE|ACL1"));
}

#[test]
fn delete_instance_spares_siblings_sharing_a_key_prefix() {
    let mut fx = Fixture::new();
    fx.write(Oper::Create, ACL1, Some(acl1_payload()));
    fx.seed(DbNum::ConfigDb, "ACL_TABLE", "ACL10", &[("policy_desc", "keep")]);
    fx.seed(DbNum::ConfigDb, "ACL_RULE", "ACL10|10", &[("PRIORITY", "7")]);
    fx.seed(DbNum::ConfigDb, "ACL_TABLE", "XACL1", &[("policy_desc", "keep")]);
    fx.seed(DbNum::ConfigDb, "ACL_RULE", "XACL1|10", &[("PRIORITY", "8")]);

    fx.write(Oper::Delete, ACL1, None);

    let rows = fx.store.dump(DbNum::ConfigDb);
    assert!(!rows.contains_key("ACL_RULE|ACL1|10"));
    assert!(rows.contains_key("ACL_RULE|ACL10|10"));
    assert!(rows.contains_key("ACL_RULE|XACL1|10"));
    assert!(rows.contains_key("ACL_TABLE|ACL10"));
    assert!(rows.contains_key("ACL_TABLE|XACL1"));
}

#[test]
fn delete_instance_leaves_read_only_rows() {
    let mut fx = Fixture::new();
    fx.seed_port("Ethernet0");

    fx.write(Oper::Delete, ETH0, None);

    assert!(fx.row(DbNum::ConfigDb, "PORT|Ethernet0").is_none());
    assert!(fx.row(DbNum::StateDb, "PORT_TABLE|Ethernet0").is_some());
}

//
// store paths
//

#[test]
fn store_path_get_applies_value_transformer() {
    let mut fx = Fixture::new();
    fx.seed(
        DbNum::ConfigDb,
        "PORT",
        "Ethernet0",
        &[("mtu", "9100"), ("speed", "100000")],
    );

    assert_eq!(
        fx.get("/sonic-port:sonic-port/PORT/PORT_LIST[ifname=Ethernet0]"),
        json!({ "PORT_LIST": [{ "ifname": "Ethernet0", "mtu": "9100", "speed": "100G" }] })
    );
    assert_eq!(
        fx.get("/sonic-port:sonic-port/PORT/PORT_LIST[ifname=Ethernet0]/speed"),
        json!({ "speed": "100G" })
    );
}

#[test]
fn store_path_get_groups_multi_shape_rows() {
    let mut fx = Fixture::new();
    fx.seed(DbNum::ConfigDb, "GROUP", "g1", &[("desc", "first")]);
    fx.seed(DbNum::ConfigDb, "GROUP", "g1|r1", &[("weight", "3")]);
    fx.seed(DbNum::ConfigDb, "GROUP", "g1|r1|s1", &[("state", "on")]);

    assert_eq!(
        fx.get("/sonic-grp:sonic-grp/GROUP"),
        json!({
            "GROUP": {
                "GROUP_LIST": [{ "g": "g1", "desc": "first" }],
                "GROUP_MEMBER_LIST": [{ "g": "g1", "r": "r1", "weight": "3" }],
                "GROUP_SUB_LIST": [{ "g": "g1", "r": "r1", "s": "s1", "state": "on" }]
            }
        })
    );
}

#[test]
fn store_path_singleton_row_is_an_object() {
    let mut fx = Fixture::new();
    fx.seed(DbNum::ConfigDb, "DEVICE_METADATA", "localhost", &[("hostname", "sw1")]);

    assert_eq!(
        fx.get("/sonic-device-metadata:sonic-device-metadata/DEVICE_METADATA/localhost"),
        json!({ "localhost": { "hostname": "sw1" } })
    );
}

#[test]
fn store_path_write_fills_defaults_and_converts_values() {
    let mut fx = Fixture::new();

    fx.write(
        Oper::Create,
        "/sonic-port:sonic-port/PORT/PORT_LIST",
        Some(json!({ "PORT_LIST": [{ "ifname": "Ethernet8", "speed": "40G" }] })),
    );

    assert_eq!(
        fx.row(DbNum::ConfigDb, "PORT|Ethernet8"),
        Some(row_of(&[("speed", "40000"), ("admin_status", "down")]))
    );
}

#[test]
fn empty_row_gets_null_placeholder() {
    let fx = Fixture::new();

    let plan = fx
        .translator
        .translate_write(
            &fx.dbs,
            Oper::Update,
            "/sonic-port:sonic-port/PORT/PORT_LIST",
            Some(&json!({ "PORT_LIST": [{ "ifname": "Ethernet12" }] })),
        )
        .expect("translate");

    let rows = plan
        .rows(Oper::Update, DbNum::ConfigDb, "PORT")
        .expect("port rows");
    assert_eq!(rows[&Key::single("Ethernet12")].get(to_db::NULL_FIELD), "NULL");
}

#[test]
fn store_path_table_delete_removes_children_first() {
    let mut fx = Fixture::new();
    fx.seed(DbNum::ConfigDb, "GROUP", "g1", &[("desc", "first")]);
    fx.seed(DbNum::ConfigDb, "GROUP", "g1|r1", &[("weight", "3")]);
    fx.seed(DbNum::ConfigDb, "GROUP", "g1|r1|s1", &[("state", "on")]);

    fx.write(Oper::Delete, "/sonic-grp:sonic-grp/GROUP", None);

    let last = fx.validator.submissions().pop().unwrap_or_default();
    let keys: Vec<&str> = last.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, ["GROUP|g1|r1|s1", "GROUP|g1|r1", "GROUP|g1"]);
    assert!(fx.store.dump(DbNum::ConfigDb).is_empty());
}

#[test]
fn store_path_field_delete() {
    let mut fx = Fixture::new();
    fx.seed(
        DbNum::ConfigDb,
        "PORT",
        "Ethernet0",
        &[("mtu", "9100"), ("description", "x")],
    );

    fx.write(
        Oper::Delete,
        "/sonic-port:sonic-port/PORT/PORT_LIST[ifname=Ethernet0]/description",
        None,
    );

    assert_eq!(
        fx.row(DbNum::ConfigDb, "PORT|Ethernet0"),
        Some(row_of(&[("mtu", "9100")]))
    );
}

#[test]
fn multi_shape_keys_sort_longest_first() {
    let fx = Fixture::new();
    let mut keys = vec![
        Key::new(["g1"]),
        Key::new(["g1", "r1", "s1"]),
        Key::new(["g1", "r1"]),
    ];

    fx.translator.sort_table_keys("GROUP", &mut keys);

    let lens: Vec<usize> = keys.iter().map(|k| k.len()).collect();
    assert_eq!(lens, [3, 2, 1]);
}

//
// key specs
//

#[test]
fn key_specs_root_on_keyed_instance() {
    let fx = Fixture::new();

    let tree = fx.translator.key_specs(&fx.dbs, ETH0).expect("key specs");
    let root = tree.node(tree.roots()[0]).expect("root node");

    assert_eq!(tree.roots().len(), 1);
    assert_eq!(root.ts.name, "PORT");
    assert_eq!(root.key, Some(Key::single("Ethernet0")));

    let children: Vec<(&str, DbNum)> = root
        .children
        .iter()
        .filter_map(|&i| tree.node(i))
        .map(|n| (n.ts.name.as_str(), n.db))
        .collect();
    assert!(children.contains(&("PORT_TABLE", DbNum::StateDb)));
    assert!(children.contains(&("VLAN_SUB_INTERFACE", DbNum::ConfigDb)));
}

#[test]
fn key_specs_store_table_enumerates() {
    let fx = Fixture::new();

    let tree = fx
        .translator
        .key_specs(&fx.dbs, "/sonic-acl:sonic-acl/ACL_TABLE")
        .expect("key specs");
    let root = tree.node(tree.roots()[0]).expect("root node");

    assert_eq!(root.ts.name, "ACL_TABLE");
    assert!(root.key.is_none());
    assert!(root.ignore_parent_key);
}

//
// commit
//

#[test]
fn validation_failure_commits_nothing() {
    let rejecting = validator().rule(Rule::RejectKey {
        pattern: "ACL_RULE|*".to_string(),
        op: CvlOp::Create,
        code: CvlRetCode::SemanticError,
    });
    let mut fx = Fixture::with(rejecting, registry());

    let err = fx
        .translator
        .commit_write(&mut fx.dbs, Oper::Create, ACL1, Some(&acl1_payload()))
        .expect_err("rule rejects entries");

    assert_eq!(err.class, ErrorClass::Validation);
    assert!(fx.store.dump(DbNum::ConfigDb).is_empty());
}

// writes the watched row through a second connection on first validation
struct RacingEngine {
    inner: RuleValidator,
    store: MemoryStore,
    fired: Arc<AtomicBool>,
}

struct RacingSession {
    inner: Box<dyn ValidationSession>,
    store: MemoryStore,
    fired: Arc<AtomicBool>,
}

impl ValidationSession for RacingSession {
    fn validate(&mut self, edits: &[EditRecord]) -> ValidationOutcome {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let mut other = Db::open_memory(
                &self.store,
                Options::new(DbNum::ConfigDb),
                Arc::new(RuleValidator::new()),
            )
            .expect("second connection");
            other
                .set_entry(
                    &TableSpec::new("ACL_TABLE"),
                    &Key::single("ACL1"),
                    &Value::from_pairs([("policy_desc", "theirs")]),
                )
                .expect("concurrent write");
        }
        self.inner.validate(edits)
    }

    fn close(self: Box<Self>) {
        self.inner.close();
    }
}

impl ValidationEngine for RacingEngine {
    fn open_session(&self) -> Result<Box<dyn ValidationSession>, CvlRetCode> {
        Ok(Box::new(RacingSession {
            inner: self.inner.open_session()?,
            store: self.store.clone(),
            fired: Arc::clone(&self.fired),
        }))
    }

    fn ordered_tables(&self, module: &str) -> Result<Vec<String>, CvlRetCode> {
        self.inner.ordered_tables(module)
    }

    fn ordered_dep_tables(&self, module: &str, table: &str) -> Result<Vec<String>, CvlRetCode> {
        self.inner.ordered_dep_tables(module, table)
    }

    fn cross_module_dep_tables(
        &self,
        module: &str,
        table: &str,
    ) -> Result<Vec<String>, CvlRetCode> {
        self.inner.cross_module_dep_tables(module, table)
    }
}

#[test]
fn concurrent_write_to_watched_row_conflicts() {
    let store = MemoryStore::new();
    let engine: Arc<dyn ValidationEngine> = Arc::new(RacingEngine {
        inner: validator(),
        store: store.clone(),
        fired: Arc::new(AtomicBool::new(false)),
    });
    let mut fx = Fixture::with_engine(store, validator(), &engine, registry());

    let err = fx
        .translator
        .commit_write(&mut fx.dbs, Oper::Create, ACL1, Some(&acl1_payload()))
        .expect_err("watched row changed");

    assert!(err.is_conflict());
    assert_eq!(
        fx.row(DbNum::ConfigDb, "ACL_TABLE|ACL1"),
        Some(row_of(&[("policy_desc", "theirs")]))
    );
    assert!(fx.row(DbNum::ConfigDb, "ACL_RULE|ACL1|10").is_none());
}

//
// rpc
//

#[test]
fn rpc_dispatches_to_callback() {
    let mut fx = Fixture::new();

    let out = fx
        .translator
        .call_rpc(
            &mut fx.dbs,
            "/sonic-acl:clear-acl-counters",
            br#"{"aclname":"ACL1"}"#,
        )
        .expect("rpc runs");
    let reply: JsonValue = serde_json::from_slice(&out).expect("json reply");

    assert_eq!(reply, json!({ "status": "cleared", "aclname": "ACL1" }));
    assert_eq!(
        fx.row(DbNum::CountersDb, "ACL_COUNTERS:ACL1"),
        Some(row_of(&[("packets", "0")]))
    );
}

#[test]
fn unknown_rpc_is_unsupported() {
    let mut fx = Fixture::new();

    let err = fx
        .translator
        .call_rpc(&mut fx.dbs, "/sonic-acl:reboot", b"{}")
        .expect_err("no such rpc");

    assert_eq!(err.class, ErrorClass::Unsupported);
}

#[test]
fn unregistered_rpc_callback_returns_empty() {
    let mut fx = Fixture::with(validator(), XfmrRegistry::new());

    let out = fx
        .translator
        .call_rpc(&mut fx.dbs, "/sonic-acl:clear-acl-counters", b"{}")
        .expect("lenient registry");

    assert!(out.is_empty());
}
