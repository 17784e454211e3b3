use anyhow::Result;
use rust_sqliter::{
    Database, Entry, FieldDescriptor, FieldType, Fields, ForeignKeyAction, SqliterError, Table,
    Value,
};
use tempfile::tempdir;

fn id_field() -> Result<FieldDescriptor> {
    Ok(FieldDescriptor::builder(FieldType::Integer)
        .primary_key()
        .build()?)
}

fn owner_field(on_delete: &str) -> Result<FieldDescriptor> {
    Ok(FieldDescriptor::builder(FieldType::Integer)
        .references("owners", "id")
        .on_delete(on_delete)
        .build()?)
}

// Creates `owners` and `dogs`, where dogs.owner references owners.id
fn create_tables(db: &Database) -> Result<(Table, Table)> {
    let owners = db.create_table_if_not_exists(
        "owners",
        &[
            ("id", id_field()?),
            ("name", FieldDescriptor::builder(FieldType::Text).not_null().build()?),
        ],
    )?;
    let dogs = db.create_table_if_not_exists(
        "dogs",
        &[
            ("id", id_field()?),
            ("name", FieldDescriptor::builder(FieldType::Text).not_null().build()?),
            ("owner", owner_field("CASCADE")?),
        ],
    )?;
    Ok((owners, dogs))
}

// Helper function to create an in-memory database with one owner and one dog
fn create_test_db() -> Result<(Database, Table, Table, Entry)> {
    let db = Database::open_in_memory()?;
    let (owners, dogs) = create_tables(&db)?;
    let frank = owners.create(Fields::new().with_value("name", "Frank"))?;
    dogs.create(
        Fields::new()
            .with_value("name", "Rex")
            .with_value("owner", frank.pk().clone()),
    )?;
    Ok((db, owners, dogs, frank))
}

#[test]
fn test_foreign_key_is_resolved() {
    test_foreign_key_is_resolved_impl().unwrap();
}

fn test_foreign_key_is_resolved_impl() -> Result<()> {
    let (_db, _owners, dogs, frank) = create_test_db()?;

    let rex = dogs.get(Fields::new().with_value("name", "Rex"))?;
    let owner = rex
        .get("owner")?
        .as_entry()
        .expect("owner is resolved to an entry");
    assert_eq!(owner.table_name(), "owners");
    assert_eq!(owner.get("id")?, frank.get("id")?);
    assert_eq!(owner, &frank);

    let json: serde_json::Value = serde_json::from_str(&rex.to_string())?;
    assert_eq!(json["owner"]["name"], "Frank");

    Ok(())
}

#[test]
fn test_nested_entries_are_shallow() {
    test_nested_entries_are_shallow_impl().unwrap();
}

fn test_nested_entries_are_shallow_impl() -> Result<()> {
    let (db, _owners, dogs, _frank) = create_test_db()?;

    let collars = db.create_table(
        "collars",
        &[
            ("id", id_field()?),
            (
                "dog",
                FieldDescriptor::builder(FieldType::Integer)
                    .references("dogs", "id")
                    .on_delete_action(ForeignKeyAction::SetNull)
                    .build()?,
            ),
        ],
    )?;
    let rex = dogs.get(Fields::new().with_value("name", "Rex"))?;
    let collar = collars.create(Fields::new().with_value("dog", rex))?;

    let dog = collar.get("dog")?.as_entry().expect("dog is resolved");
    assert_eq!(dog.get("name")?.as_text(), Some("Rex"));
    // one hop only: the dog's owner stays a plain key
    assert_eq!(dog.get("owner")?, &Value::Integer(1));

    // SET NULL leaves the collar behind without a dog
    dogs.clear()?;
    let collar = collars.get_pk(collar.pk().clone())?;
    assert_eq!(collar.get("dog")?, &Value::Null);

    Ok(())
}

#[test]
fn test_missing_reference_is_rejected() {
    test_missing_reference_is_rejected_impl().unwrap();
}

fn test_missing_reference_is_rejected_impl() -> Result<()> {
    let (_db, _owners, dogs, _frank) = create_test_db()?;

    let result = dogs.create(
        Fields::new()
            .with_value("name", "Stray")
            .with_value("owner", 99),
    );
    assert!(matches!(result, Err(SqliterError::ForeignKey(_))));
    assert_eq!(dogs.all().count()?, 1);

    Ok(())
}

#[test]
fn test_cascade_delete() {
    test_cascade_delete_impl().unwrap();
}

fn test_cascade_delete_impl() -> Result<()> {
    let (_db, owners, dogs, frank) = create_test_db()?;

    let alice = owners.create(Fields::new().with_value("name", "Alice"))?;
    dogs.create(
        Fields::new()
            .with_value("name", "Luna")
            .with_value("owner", alice.clone()),
    )?;

    frank.delete()?;
    let remaining = dogs.all().all()?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].get("name")?.as_text(), Some("Luna"));

    owners.clear()?;
    assert_eq!(dogs.all().count()?, 0);

    Ok(())
}

#[test]
fn test_filter_by_entry() {
    test_filter_by_entry_impl().unwrap();
}

fn test_filter_by_entry_impl() -> Result<()> {
    let (_db, owners, dogs, frank) = create_test_db()?;

    let alice = owners.create(Fields::new().with_value("name", "Alice"))?;
    dogs.create(
        Fields::new()
            .with_value("name", "Bolt")
            .with_value("owner", frank.clone()),
    )?;
    dogs.create(
        Fields::new()
            .with_value("name", "Luna")
            .with_value("owner", alice),
    )?;

    let franks = dogs.filter(Fields::new().with_value("owner", frank.clone()))?;
    assert_eq!(franks.count()?, 2);
    assert_eq!(
        dogs.filter(Fields::new().with_value("owner__in", Value::list([frank.clone()])))?
            .count()?,
        2
    );

    // an entry from another table cannot stand in for an owner
    let rex = dogs.get(Fields::new().with_value("name", "Rex"))?;
    assert!(matches!(
        dogs.filter(Fields::new().with_value("owner", rex)),
        Err(SqliterError::ForeignKey(_))
    ));

    Ok(())
}

#[test]
fn test_save_with_reassigned_owner() {
    test_save_with_reassigned_owner_impl().unwrap();
}

fn test_save_with_reassigned_owner_impl() -> Result<()> {
    let (_db, owners, dogs, _frank) = create_test_db()?;

    let alice = owners.create(Fields::new().with_value("name", "Alice"))?;
    let mut rex = dogs.get(Fields::new().with_value("name", "Rex"))?;
    rex.set("owner", alice.clone())?;
    rex.save()?;
    rex.reload()?;

    let owner = rex.get("owner")?.as_entry().expect("owner is resolved");
    assert_eq!(owner.pk(), alice.pk());

    rex.set("owner", 42)?;
    assert!(matches!(rex.save(), Err(SqliterError::ForeignKey(_))));

    Ok(())
}

#[test]
fn test_foreign_keys_survive_reopen() {
    test_foreign_keys_survive_reopen_impl().unwrap();
}

fn test_foreign_keys_survive_reopen_impl() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("pets.db");

    {
        let db = Database::open(&path)?;
        assert!(db.foreign_keys_enabled()?);
        let (owners, dogs) = create_tables(&db)?;
        let frank = owners.create(Fields::new().with_value("name", "Frank"))?;
        dogs.create(
            Fields::new()
                .with_value("name", "Rex")
                .with_value("owner", frank),
        )?;
    }

    let db = Database::open(&path)?;
    assert!(db.foreign_keys_enabled()?);

    let dogs = db.table("dogs")?;
    let fk = dogs
        .schema()
        .foreign_key("owner")
        .expect("owner is a foreign key");
    assert_eq!(fk.referenced_table, "owners");
    assert_eq!(fk.referenced_column.as_deref(), Some("id"));
    assert_eq!(fk.on_delete, ForeignKeyAction::Cascade);

    assert!(matches!(
        dogs.create(
            Fields::new()
                .with_value("name", "Stray")
                .with_value("owner", 7)
        ),
        Err(SqliterError::ForeignKey(_))
    ));

    db.table("owners")?.clear()?;
    assert_eq!(dogs.all().count()?, 0);

    Ok(())
}
