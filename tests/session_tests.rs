use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dirodm::client::{Attributes, ClientResult};
use dirodm::{
    ConnectionConfig, ConnectionProvider, DirectoryClient, Entity, EntityDeclaration, LazyRef,
    MemoryDirectory, ModOp, Modification, PropertyDeclaration, PropertyValue, SchemaRegistry,
    SearchEntry, Session, SessionFactory, TrackedSet, ValueCodec,
};

const PEOPLE: &str = "ou=people,o=example";
const GROUPS: &str = "ou=groups,o=example";

#[derive(Default)]
struct Person {
    uid: Option<String>,
    name: Option<String>,
    mail: Option<String>,
    manager: Option<LazyRef>,
}

impl Entity for Person {
    fn declare() -> EntityDeclaration<Self> {
        EntityDeclaration::new("Person", PEOPLE)
            .object_classes(["person", "top"])
            .property(
                PropertyDeclaration::id("uid")
                    .get(|p: &Person| p.uid.clone().map(PropertyValue::Text))
                    .set(|p, v| p.uid = v.and_then(|v| v.as_text().map(String::from))),
            )
            .property(
                PropertyDeclaration::single("name")
                    .attr("displayName")
                    .get(|p: &Person| p.name.clone().map(PropertyValue::Text))
                    .set(|p, v| p.name = v.and_then(|v| v.as_text().map(String::from))),
            )
            .property(
                PropertyDeclaration::single("mail")
                    .codec(ValueCodec::Lowercase)
                    .get(|p: &Person| p.mail.clone().map(PropertyValue::Text))
                    .set(|p, v| p.mail = v.and_then(|v| v.as_text().map(String::from))),
            )
            .property(
                PropertyDeclaration::single_ref("manager")
                    .get(|p: &Person| p.manager.clone().map(PropertyValue::Ref))
                    .set(|p, v| p.manager = v.and_then(|v| v.as_ref_value().cloned())),
            )
    }
}

#[derive(Default)]
struct Group {
    cn: Option<String>,
    description: Option<String>,
    members: TrackedSet<LazyRef>,
}

impl Entity for Group {
    fn declare() -> EntityDeclaration<Self> {
        EntityDeclaration::new("Group", GROUPS)
            .object_classes(["group", "top"])
            .property(
                PropertyDeclaration::id("cn")
                    .get(|g: &Group| g.cn.clone().map(PropertyValue::Text))
                    .set(|g, v| g.cn = v.and_then(|v| v.as_text().map(String::from))),
            )
            .property(
                PropertyDeclaration::single("description")
                    .get(|g: &Group| g.description.clone().map(PropertyValue::Text))
                    .set(|g, v| g.description = v.and_then(|v| v.as_text().map(String::from))),
            )
            .property(
                PropertyDeclaration::multi_ref("members")
                    .attr("uniqueMember")
                    .get(|g: &Group| Some(PropertyValue::RefSet(g.members.clone())))
                    .set(|g, v| {
                        g.members = v.and_then(|v| v.as_ref_set().cloned()).unwrap_or_default();
                    }),
            )
    }
}

fn person_dn(uid: &str) -> String {
    format!("uid={uid},{PEOPLE}")
}

fn setup() -> (MemoryDirectory, SessionFactory) {
    let directory = MemoryDirectory::new();
    directory.seed(
        &person_dn("u1"),
        &[
            ("objectClass", &["person", "top"]),
            ("uid", &["u1"]),
            ("displayName", &["User One"]),
            ("mail", &["u1@example.com"]),
            ("manager", &[&person_dn("u2")]),
        ],
    );
    directory.seed(
        &person_dn("u2"),
        &[
            ("objectClass", &["person", "top"]),
            ("uid", &["u2"]),
            ("displayName", &["User Two"]),
        ],
    );
    directory.seed(
        &format!("cn=admins,{GROUPS}"),
        &[
            ("objectClass", &["group", "top"]),
            ("cn", &["admins"]),
            ("description", &["ops group"]),
            ("uniqueMember", &[&person_dn("u1") as &str, &person_dn("u2")]),
        ],
    );
    let factory = SessionFactory::new(
        ConnectionConfig::default(),
        Arc::new(SchemaRegistry::new()),
        Arc::new(directory.clone()),
    )
    .unwrap();
    (directory, factory)
}

fn open(factory: &SessionFactory) -> Session {
    factory.open_session().unwrap()
}

#[test]
fn test_create_requires_identity_value() {
    let (_, factory) = setup();
    let session = open(&factory);
    let err = session.create(&Person::default()).unwrap_err();
    assert!(err.to_string().contains("identity value"));
}

#[test]
fn test_create_serializes_properties_and_codec() {
    let (directory, factory) = setup();
    let session = open(&factory);

    let person = Person {
        uid: Some("u3".into()),
        name: Some("User Three".into()),
        mail: Some("U3@Example.COM".into()),
        manager: Some(LazyRef::detached(person_dn("u2"))),
    };
    let dn = session.create(&person).unwrap();
    assert_eq!(dn, person_dn("u3"));

    assert_eq!(
        directory.attribute(&dn, "objectClass").unwrap(),
        vec!["person", "top"]
    );
    assert_eq!(directory.attribute(&dn, "uid").unwrap(), vec!["u3"]);
    assert_eq!(
        directory.attribute(&dn, "displayName").unwrap(),
        vec!["User Three"]
    );
    // the codec folds the value before it reaches the directory
    assert_eq!(
        directory.attribute(&dn, "mail").unwrap(),
        vec!["u3@example.com"]
    );
    assert_eq!(
        directory.attribute(&dn, "manager").unwrap(),
        vec![person_dn("u2")]
    );
}

#[test]
fn test_read_populates_and_wires_references() {
    let (_, factory) = setup();
    let session = open(&factory);

    let handle = session.read::<Person>(&person_dn("u1")).unwrap().unwrap();
    let person = handle.borrow();
    assert_eq!(person.dn(), person_dn("u1"));
    assert_eq!(person.value().uid.as_deref(), Some("u1"));
    assert_eq!(person.value().name.as_deref(), Some("User One"));
    let manager = person.value().manager.as_ref().unwrap();
    assert_eq!(manager.dn(), person_dn("u2"));
    assert!(!manager.is_resolved());
}

#[test]
fn test_read_missing_is_none() {
    let (_, factory) = setup();
    let session = open(&factory);
    assert!(session.read::<Person>(&person_dn("ghost")).unwrap().is_none());
}

#[test]
fn test_read_returns_the_same_instance() {
    let (directory, factory) = setup();
    let session = open(&factory);

    let a = session.read::<Person>(&person_dn("u1")).unwrap().unwrap();
    directory.clear_ops();
    let b = session.read::<Person>("UID=U1,OU=People,O=Example").unwrap().unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    // the cache hit made no directory call
    assert!(directory.ops().is_empty());
}

#[test]
fn test_search_shares_instances_with_read() {
    let (_, factory) = setup();
    let session = open(&factory);

    let read = session.read::<Person>(&person_dn("u1")).unwrap().unwrap();
    let found = session.search::<Person>("(objectClass=person)").unwrap();
    assert_eq!(found.len(), 2);
    let from_search = found
        .iter()
        .find(|h| h.borrow().dn() == person_dn("u1"))
        .unwrap();
    assert!(Rc::ptr_eq(&read, from_search));
}

#[test]
fn test_unique_search() {
    let (_, factory) = setup();
    let session = open(&factory);

    let hit = session.unique_search::<Person>("(uid=u2)").unwrap().unwrap();
    assert_eq!(hit.borrow().value().uid.as_deref(), Some("u2"));
    assert!(session.unique_search::<Person>("(uid=nobody)").unwrap().is_none());
}

#[test]
fn test_lazy_reference_resolves_through_the_session() {
    let (_, factory) = setup();
    let session = open(&factory);

    let u1 = session.read::<Person>(&person_dn("u1")).unwrap().unwrap();
    let manager_ref = u1.borrow().value().manager.clone().unwrap();

    let resolved = manager_ref.resolve::<Person>().unwrap().unwrap();
    assert!(manager_ref.is_resolved());
    assert_eq!(resolved.borrow().value().name.as_deref(), Some("User Two"));

    // the resolved target is the same instance a direct read returns
    let direct = session.read::<Person>(&person_dn("u2")).unwrap().unwrap();
    assert!(Rc::ptr_eq(&resolved, &direct));
}

#[test]
fn test_lazy_reference_fails_after_close() {
    let (_, factory) = setup();
    let session = open(&factory);

    let u1 = session.read::<Person>(&person_dn("u1")).unwrap().unwrap();
    let manager_ref = u1.borrow().value().manager.clone().unwrap();
    session.close();

    let err = manager_ref.resolve::<Person>().unwrap_err();
    assert!(err.to_string().contains("closed"));
}

#[test]
fn test_update_sends_minimal_modifications() {
    let (directory, factory) = setup();
    let session = open(&factory);
    let dn = format!("cn=admins,{GROUPS}");

    let handle = session.read::<Group>(&dn).unwrap().unwrap();
    {
        let group = handle.borrow();
        let mut members = group.value().members.clone();
        members.insert(LazyRef::detached(person_dn("u3")));
        members.remove(&LazyRef::detached(person_dn("u1")));
    }
    directory.clear_ops();
    session.update(&handle).unwrap();

    let batches = directory.modify_ops_for(&dn);
    assert_eq!(batches.len(), 1);
    let mods = &batches[0];
    assert_eq!(mods.len(), 2);
    assert!(mods.iter().any(|m| m.op == ModOp::Add
        && m.attr == "uniqueMember"
        && m.values == vec![person_dn("u3")]));
    assert!(mods.iter().any(|m| m.op == ModOp::Remove
        && m.attr == "uniqueMember"
        && m.values == vec![person_dn("u1")]));
    assert_eq!(
        directory.attribute(&dn, "uniqueMember").unwrap(),
        vec![person_dn("u2"), person_dn("u3")]
    );

    // deltas were cleared, so a second update is silent
    directory.clear_ops();
    session.update(&handle).unwrap();
    assert!(directory.ops().is_empty());
}

#[test]
fn test_update_without_changes_makes_no_directory_call() {
    let (directory, factory) = setup();
    let session = open(&factory);

    let handle = session.read::<Group>(&format!("cn=admins,{GROUPS}")).unwrap().unwrap();
    directory.clear_ops();
    session.update(&handle).unwrap();
    assert!(directory.ops().is_empty());
}

#[test]
fn test_update_touched_single_value() {
    let (directory, factory) = setup();
    let session = open(&factory);
    let dn = format!("cn=admins,{GROUPS}");

    let handle = session.read::<Group>(&dn).unwrap().unwrap();
    handle.borrow_mut().set_text("description", "new text").unwrap();
    directory.clear_ops();
    session.update(&handle).unwrap();

    let batches = directory.modify_ops_for(&dn);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].op, ModOp::Replace);
    assert_eq!(directory.attribute(&dn, "description").unwrap(), vec!["new text"]);
}

#[test]
fn test_update_cleared_single_value_removes_attribute() {
    let (directory, factory) = setup();
    let session = open(&factory);
    let dn = format!("cn=admins,{GROUPS}");

    let handle = session.read::<Group>(&dn).unwrap().unwrap();
    handle.borrow_mut().clear("description").unwrap();
    session.update(&handle).unwrap();
    assert!(directory.attribute(&dn, "description").is_none());
}

#[test]
fn test_substituted_plain_collection_replaces_wholesale() {
    let (directory, factory) = setup();
    let session = open(&factory);
    let dn = format!("cn=admins,{GROUPS}");

    let handle = session.read::<Group>(&dn).unwrap().unwrap();
    let replacement: TrackedSet<LazyRef> = [LazyRef::detached(person_dn("u2"))]
        .into_iter()
        .collect();
    handle
        .borrow_mut()
        .set("members", Some(PropertyValue::RefSet(replacement)))
        .unwrap();
    directory.clear_ops();
    session.update(&handle).unwrap();

    let batches = directory.modify_ops_for(&dn);
    assert_eq!(batches.len(), 1);
    let replace = batches[0]
        .iter()
        .find(|m| m.attr == "uniqueMember")
        .unwrap();
    assert_eq!(replace.op, ModOp::Replace);
    assert_eq!(replace.values, vec![person_dn("u2")]);

    // the substituted container is tracked from here on
    let group = handle.borrow();
    assert!(group.value().members.is_tracking());
    drop(group);
    directory.clear_ops();
    session.update(&handle).unwrap();
    assert!(directory.ops().is_empty());
}

#[test]
fn test_read_attributes_served_from_cache() {
    let (directory, factory) = setup();
    let session = open(&factory);
    let dn = format!("cn=admins,{GROUPS}");

    session.read::<Group>(&dn).unwrap().unwrap();
    directory.clear_ops();

    let map = session
        .read_attributes::<Group>(&dn, &["cn", "uniqueMember", "description"])
        .unwrap()
        .unwrap();
    assert!(directory.ops().is_empty());
    assert_eq!(map["cn"].as_single(), Some("admins"));
    assert_eq!(
        map["uniqueMember"].as_multi().unwrap(),
        &[person_dn("u1"), person_dn("u2")]
    );

    let json = serde_json::to_value(&map).unwrap();
    assert_eq!(json["cn"], "admins");
    assert_eq!(json["description"], "ops group");
    assert!(json["uniqueMember"].is_array());
}

#[test]
fn test_read_attributes_uncached_and_missing() {
    let (_, factory) = setup();
    let session = open(&factory);

    let map = session
        .read_attributes::<Person>(&person_dn("u1"), &["displayName", "mail"])
        .unwrap()
        .unwrap();
    assert_eq!(map["displayName"].as_single(), Some("User One"));
    assert_eq!(map["mail"].as_single(), Some("u1@example.com"));

    assert!(session
        .read_attributes::<Person>(&person_dn("ghost"), &["mail"])
        .unwrap()
        .is_none());
}

#[test]
fn test_search_attributes_is_uncached_projection() {
    let (_, factory) = setup();
    let session = open(&factory);

    let rows = session
        .search_attributes::<Person>("(uid=u1)", &["displayName"])
        .unwrap();
    assert_eq!(rows.len(), 1);
    let (dn, map) = &rows[0];
    assert_eq!(dn, &person_dn("u1"));
    assert_eq!(map["displayName"].as_single(), Some("User One"));
}

#[test]
fn test_lookup_returns_dns_only() {
    let (_, factory) = setup();
    let session = open(&factory);

    let mut dns = session.lookup(PEOPLE, "(objectClass=person)").unwrap();
    dns.sort();
    assert_eq!(dns, vec![person_dn("u1"), person_dn("u2")]);
}

#[test]
fn test_search_raw_returns_server_shape() {
    let (_, factory) = setup();
    let session = open(&factory);

    let entries = session
        .search_raw(GROUPS, "(objectClass=group)", Some(&["uniqueMember"]))
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].attrs["uniqueMember"].len(), 2);
}

#[test]
fn test_delete_is_idempotent_and_evicts() {
    let (directory, factory) = setup();
    let session = open(&factory);
    let dn = person_dn("u2");

    session.read::<Person>(&dn).unwrap().unwrap();
    session.delete(&dn).unwrap();
    assert!(!directory.contains(&dn));
    // gone already: still a success
    session.delete(&dn).unwrap();
    assert!(session.read::<Person>(&dn).unwrap().is_none());
}

#[test]
fn test_delete_entity_goes_by_handle_dn() {
    let (directory, factory) = setup();
    let session = open(&factory);

    let handle = session.read::<Person>(&person_dn("u1")).unwrap().unwrap();
    session.delete_entity(&handle).unwrap();
    assert!(!directory.contains(&person_dn("u1")));
}

struct ReleaseFlagClient {
    inner: MemoryDirectory,
    released: Arc<AtomicBool>,
}

impl Drop for ReleaseFlagClient {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

impl DirectoryClient for ReleaseFlagClient {
    fn add(&mut self, dn: &str, attrs: Attributes) -> ClientResult<()> {
        self.inner.add(dn, attrs)
    }

    fn modify(&mut self, dn: &str, mods: &[Modification]) -> ClientResult<()> {
        self.inner.modify(dn, mods)
    }

    fn delete(&mut self, dn: &str) -> ClientResult<()> {
        self.inner.delete(dn)
    }

    fn lookup(&mut self, dn: &str, attrs: Option<&[String]>) -> ClientResult<SearchEntry> {
        self.inner.lookup(dn, attrs)
    }

    fn search(
        &mut self,
        base: &str,
        filter: &str,
        attrs: Option<&[String]>,
    ) -> ClientResult<Vec<SearchEntry>> {
        self.inner.search(base, filter, attrs)
    }
}

struct ReleaseFlagProvider {
    directory: MemoryDirectory,
    released: Arc<AtomicBool>,
}

impl ConnectionProvider for ReleaseFlagProvider {
    fn acquire(&self) -> ClientResult<Box<dyn DirectoryClient>> {
        Ok(Box::new(ReleaseFlagClient {
            inner: self.directory.clone(),
            released: Arc::clone(&self.released),
        }))
    }
}

#[test]
fn test_close_hands_the_connection_back_through_drop() {
    let released = Arc::new(AtomicBool::new(false));
    let factory = SessionFactory::new(
        ConnectionConfig::default(),
        Arc::new(SchemaRegistry::new()),
        Arc::new(ReleaseFlagProvider {
            directory: MemoryDirectory::new(),
            released: Arc::clone(&released),
        }),
    )
    .unwrap();

    let session = factory.open_session().unwrap();
    let dn = session
        .create(&Person {
            uid: Some("u9".into()),
            ..Person::default()
        })
        .unwrap();
    assert_eq!(dn, person_dn("u9"));
    assert!(!released.load(Ordering::SeqCst));

    session.close();
    assert!(released.load(Ordering::SeqCst));
    session.close();
}

#[test]
fn test_closed_session_rejects_operations() {
    let (_, factory) = setup();
    let session = open(&factory);
    session.close();
    session.close(); // idempotent

    assert!(session.is_closed());
    let err = session.read::<Person>(&person_dn("u1")).unwrap_err();
    assert!(err.to_string().contains("closed"));
    assert!(session.create(&Person::default()).is_err());
    assert!(session.search::<Person>("(objectClass=person)").is_err());
    assert!(session.delete(&person_dn("u1")).is_err());
}
