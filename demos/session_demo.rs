//! End-to-end walkthrough: typed entities with references, the identity
//! cache, minimal-diff updates, and relation synchronization.

use std::sync::Arc;

use anyhow::Result;

use dirodm::{
    ConnectionConfig, Entity, EntityDeclaration, Indirection, LazyRef, MemoryDirectory,
    PropertyDeclaration, PropertyValue, Relation, RelationDeclaration, SchemaRegistry,
    SessionFactory, TrackedSet,
};

const PEOPLE: &str = "ou=people,o=example";
const GROUPS: &str = "ou=groups,o=example";

#[derive(Default)]
struct Person {
    uid: Option<String>,
    name: Option<String>,
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
    }
}

#[derive(Default)]
struct Group {
    cn: Option<String>,
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
                PropertyDeclaration::multi_ref("members")
                    .attr("uniqueMember")
                    .get(|g: &Group| Some(PropertyValue::RefSet(g.members.clone())))
                    .set(|g, v| {
                        g.members = v.and_then(|v| v.as_ref_set().cloned()).unwrap_or_default();
                    }),
            )
    }
}

struct Membership;

impl Relation for Membership {
    fn declare() -> RelationDeclaration {
        RelationDeclaration::new("membership")
            .one(GROUPS, "cn", "uniqueMember")
            .many(PEOPLE, "uid", "memberOf")
    }
}

fn main() -> Result<()> {
    let directory = MemoryDirectory::new();
    let factory = SessionFactory::new(
        ConnectionConfig::default(),
        Arc::new(SchemaRegistry::new()),
        Arc::new(directory.clone()),
    )?;
    let session = factory.open_session()?;

    // People first, then a group pointing at them.
    for (uid, name) in [("alice", "Alice"), ("bob", "Bob")] {
        let dn = session.create(&Person {
            uid: Some(uid.into()),
            name: Some(name.into()),
        })?;
        println!("created {dn}");
    }

    let group_dn = session.create(&Group {
        cn: Some("staff".into()),
        members: [LazyRef::detached(format!("uid=alice,{PEOPLE}"))]
            .into_iter()
            .collect(),
    })?;
    println!("created {group_dn}");

    // The identity cache hands back the same instance per DN.
    let group = session.read::<Group>(&group_dn)?.expect("just created");
    let again = session.read::<Group>(&group_dn)?.expect("cached");
    println!(
        "same instance from the cache: {}",
        std::rc::Rc::ptr_eq(&group, &again)
    );

    // References resolve lazily, through the same cache.
    let alice_ref = group.borrow().value().members.elements()[0].clone();
    let alice = alice_ref.resolve::<Person>()?.expect("alice exists");
    println!("resolved member: {:?}", alice.borrow().value().name);

    // Container edits turn into minimal modifications.
    {
        let mut members = group.borrow().value().members.clone();
        members.insert(LazyRef::detached(format!("uid=bob,{PEOPLE}")));
    }
    directory.clear_ops();
    session.update(&group)?;
    println!("update sent {} operation(s)", directory.ops().len());

    // Relation synchronization keeps both back pointers aligned.
    let mut membership = Indirection::<Membership>::with_one("staff");
    membership.many().insert(format!("uid=alice,{PEOPLE}"));
    membership.many().insert(format!("uid=bob,{PEOPLE}"));
    session.create_indirection(&mut membership)?;
    println!(
        "alice memberOf: {:?}",
        directory.attribute(&format!("uid=alice,{PEOPLE}"), "memberOf")
    );

    session.close();
    Ok(())
}
