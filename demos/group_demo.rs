//! Minimal mapping walkthrough: one entity type, one session, the full
//! create / read / update / delete cycle against the embedded directory.

use std::sync::Arc;

use anyhow::Result;

use dirodm::{
    ConnectionConfig, Entity, EntityDeclaration, MemoryDirectory, PropertyDeclaration,
    PropertyValue, SchemaRegistry, SessionFactory,
};

#[derive(Default)]
struct Group {
    cn: Option<String>,
    name: Option<String>,
}

impl Entity for Group {
    fn declare() -> EntityDeclaration<Self> {
        EntityDeclaration::new("Group", "ou=groups,ou=example,o=com")
            .object_classes(["group", "top"])
            .property(
                PropertyDeclaration::id("cn")
                    .get(|g: &Group| g.cn.clone().map(PropertyValue::Text))
                    .set(|g, v| g.cn = v.and_then(|v| v.as_text().map(String::from))),
            )
            .property(
                PropertyDeclaration::single("name")
                    .attr("longName")
                    .get(|g: &Group| g.name.clone().map(PropertyValue::Text))
                    .set(|g, v| g.name = v.and_then(|v| v.as_text().map(String::from))),
            )
    }
}

fn main() -> Result<()> {
    let directory = MemoryDirectory::new();
    let factory = SessionFactory::new(
        ConnectionConfig::new("ldap://localhost:389"),
        Arc::new(SchemaRegistry::new()),
        Arc::new(directory.clone()),
    )?;
    let session = factory.open_session()?;

    let dn = session.create(&Group {
        cn: Some("demo".into()),
        name: Some("Demo Group".into()),
    })?;
    println!("created {dn}");

    let handle = session
        .read::<Group>(&dn)?
        .expect("the entry was just created");
    println!("long name: {:?}", handle.borrow().value().name);

    handle.borrow_mut().set_text("name", "Renamed Demo Group")?;
    session.update(&handle)?;
    println!(
        "after update: {:?}",
        directory.attribute(&dn, "longName")
    );

    session.delete(&dn)?;
    println!("deleted: entry present = {}", directory.contains(&dn));

    session.close();
    Ok(())
}
