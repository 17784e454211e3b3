use anyhow::Result;
use rust_sqliter::{Database, Entry, FieldDescriptor, FieldType, Fields, SqliterError, Table, Value};

// Helper function to create a `pets` table with four rows: ids 1..=4, ages [3, 1, 5, 1]
fn create_test_db() -> Result<(Database, Table)> {
    let db = Database::open_in_memory()?;
    let pets = db.create_table(
        "pets",
        &[
            ("id", FieldDescriptor::builder(FieldType::Integer).primary_key().build()?),
            ("name", FieldDescriptor::builder(FieldType::Text).not_null().build()?),
            ("age", FieldDescriptor::builder(FieldType::Integer).build()?),
            ("weight", FieldDescriptor::builder(FieldType::Real).build()?),
            ("nickname", FieldDescriptor::builder(FieldType::Text).build()?),
        ],
    )?;
    pets.bulk_create(vec![
        Fields::new()
            .with_value("name", "Frank")
            .with_value("age", 3)
            .with_value("weight", 12.5),
        Fields::new()
            .with_value("name", "Bella")
            .with_value("age", 1)
            .with_value("weight", 4.0),
        Fields::new()
            .with_value("name", "Max")
            .with_value("age", 5)
            .with_value("weight", 30.25),
        Fields::new()
            .with_value("name", "Luna")
            .with_value("age", 1)
            .with_value("weight", 3.5),
    ])?;
    Ok((db, pets))
}

fn ids(entries: &[Entry]) -> Result<Vec<i64>> {
    entries
        .iter()
        .map(|entry| -> Result<i64> {
            entry
                .get("id")?
                .as_integer()
                .ok_or_else(|| anyhow::anyhow!("id is not an integer"))
        })
        .collect()
}

#[test]
fn test_filter_construction_errors() {
    test_filter_construction_errors_impl().unwrap();
}

fn test_filter_construction_errors_impl() -> Result<()> {
    let (_db, pets) = create_test_db()?;

    assert!(matches!(
        pets.filter(Fields::new().with_value("age__between", 1)),
        Err(SqliterError::UnknownOperation(op)) if op == "between"
    ));
    assert!(matches!(
        pets.filter(Fields::new().with_value("color", "brown")),
        Err(SqliterError::NoSuchField { .. })
    ));
    assert!(matches!(
        pets.filter(Fields::new().with_value("age", "three")),
        Err(SqliterError::MismatchingTypes { .. })
    ));
    assert!(matches!(
        pets.filter(Fields::new().with_value("__rowid", 1)),
        Err(SqliterError::InvalidFieldName(_))
    ));
    assert!(matches!(
        pets.filter(Fields::new().with_value("age__gt", Value::Null)),
        Err(SqliterError::MismatchingTypes { found: "NULL", .. })
    ));
    assert!(matches!(
        pets.filter_by("xor", Fields::new().with_value("age", 1)),
        Err(SqliterError::UnknownOperation(_))
    ));

    Ok(())
}

#[test]
fn test_comparison_operators() {
    test_comparison_operators_impl().unwrap();
}

fn test_comparison_operators_impl() -> Result<()> {
    let (_db, pets) = create_test_db()?;

    let older = pets
        .filter(Fields::new().with_value("age__gt", 1))?
        .order_by(&["id"])?
        .all()?;
    assert_eq!(ids(&older)?, vec![1, 3]);

    assert_eq!(pets.filter(Fields::new().with_value("age__gte", 3))?.count()?, 2);
    assert_eq!(pets.filter(Fields::new().with_value("age__lt", 3))?.count()?, 2);
    assert_eq!(pets.filter(Fields::new().with_value("weight__lte", 4.0))?.count()?, 2);
    assert_eq!(
        pets.filter(Fields::new().with_value("age__equals", 1))?.count()?,
        2
    );

    // conditions are combined with AND by default
    let between = pets.filter(
        Fields::new()
            .with_value("age__gt", 1)
            .with_value("weight__lt", 20.0),
    )?;
    assert_eq!(ids(&between.all()?)?, vec![1]);

    Ok(())
}

#[test]
fn test_text_operators() {
    test_text_operators_impl().unwrap();
}

fn test_text_operators_impl() -> Result<()> {
    let (_db, pets) = create_test_db()?;

    let count = |key: &str, value: &str| -> Result<usize> {
        Ok(pets.filter(Fields::new().with_value(key, value))?.count()?)
    };

    assert_eq!(count("name__like", "%a%")?, 4);
    assert_eq!(count("name__like", "F%")?, 1);
    assert_eq!(count("name__ilike", "AN")?, 1);
    assert_eq!(count("name__contains", "ran")?, 1);
    assert_eq!(count("name__contains", "RAN")?, 0);
    assert_eq!(count("name__icontains", "RAN")?, 1);
    // wildcards inside icontains match literally
    assert_eq!(count("name__icontains", "%")?, 0);

    Ok(())
}

#[test]
fn test_or_combinator() {
    test_or_combinator_impl().unwrap();
}

fn test_or_combinator_impl() -> Result<()> {
    let (_db, pets) = create_test_db()?;

    let fields = Fields::new()
        .with_value("name", "Frank")
        .with_value("name", "Max");
    // a repeated key replaces the earlier value
    assert_eq!(fields.len(), 1);

    let either = pets.filter_by(
        "or",
        Fields::new()
            .with_value("name", "Frank")
            .with_value("age__gte", 5),
    )?;
    assert_eq!(ids(&either.order_by(&["id"])?.all()?)?, vec![1, 3]);

    let both = pets.filter_by(
        "AND",
        Fields::new()
            .with_value("name", "Frank")
            .with_value("age__gte", 5),
    )?;
    assert!(!both.exists()?);

    Ok(())
}

#[test]
fn test_in_operator() {
    test_in_operator_impl().unwrap();
}

fn test_in_operator_impl() -> Result<()> {
    let (_db, pets) = create_test_db()?;

    let picked = pets
        .filter(Fields::new().with_value("id__in", Value::list([1, 3])))?
        .order_by(&["-id"])?
        .all()?;
    assert_eq!(ids(&picked)?, vec![3, 1]);

    let names = pets.filter(Fields::new().with_value("name__in", Value::list(["Luna", "Nobody"])))?;
    assert_eq!(names.count()?, 1);

    assert!(matches!(
        pets.filter(Fields::new().with_value("id__in", 1)),
        Err(SqliterError::MismatchingTypes { found: "INTEGER", .. })
    ));
    assert!(matches!(
        pets.filter(Fields::new().with_value("id__in", Value::list(["one"]))),
        Err(SqliterError::MismatchingTypes { .. })
    ));

    Ok(())
}

#[test]
fn test_null_equality() {
    test_null_equality_impl().unwrap();
}

fn test_null_equality_impl() -> Result<()> {
    let (_db, pets) = create_test_db()?;

    let unnamed = Fields::new().with_value("nickname", Value::Null);
    assert_eq!(pets.filter(unnamed.clone())?.count()?, 4);

    let mut frank = pets.get_pk(1)?;
    frank.set("nickname", "Frankie")?;
    frank.save()?;

    assert_eq!(pets.filter(unnamed)?.count()?, 3);
    assert_eq!(
        pets.filter(Fields::new().with_value("nickname", Option::<&str>::None))?
            .count()?,
        3
    );

    Ok(())
}

#[test]
fn test_ordering() {
    test_ordering_impl().unwrap();
}

fn test_ordering_impl() -> Result<()> {
    let (_db, pets) = create_test_db()?;

    let ages: Vec<i64> = pets
        .all()
        .order_by(&["-age"])?
        .iter()?
        .map(|entry| -> Result<i64> { Ok(entry?.get("age")?.as_integer().unwrap_or_default()) })
        .collect::<Result<_>>()?;
    assert_eq!(ages, vec![5, 3, 1, 1]);

    // later order_by calls replace earlier ones
    let by_name = pets.all().order_by(&["-age"])?.order_by(&["name"])?.all()?;
    assert_eq!(ids(&by_name)?, vec![2, 1, 4, 3]);

    let ties = pets.all().order_by(&["age", "-name"])?.all()?;
    assert_eq!(ids(&ties)?, vec![4, 2, 1, 3]);

    assert!(matches!(
        pets.all().order_by(&["-color"]),
        Err(SqliterError::NoSuchField { .. })
    ));

    Ok(())
}

#[test]
fn test_limit_and_offset() {
    test_limit_and_offset_impl().unwrap();
}

fn test_limit_and_offset_impl() -> Result<()> {
    let (_db, pets) = create_test_db()?;

    let ordered = pets.all().order_by(&["id"])?;
    assert_eq!(ids(&ordered.clone().limit(2).offset(1).all()?)?, vec![2, 3]);
    assert_eq!(ids(&ordered.clone().offset(1).all()?)?, vec![2, 3, 4]);
    assert_eq!(ordered.clone().limit(3).count()?, 3);
    assert_eq!(
        ordered.first()?.map(|entry| entry.pk().clone()),
        Some(Value::Integer(1))
    );

    // deletes are restricted to the rows the limited select returns
    let removed = pets.all().order_by(&["-id"])?.limit(1).delete()?;
    assert_eq!(removed, 1);
    assert_eq!(ids(&pets.all().order_by(&["id"])?.all()?)?, vec![1, 2, 3]);

    Ok(())
}

#[test]
fn test_delete_matching_rows() {
    test_delete_matching_rows_impl().unwrap();
}

fn test_delete_matching_rows_impl() -> Result<()> {
    let (_db, pets) = create_test_db()?;

    let removed = pets.filter(Fields::new().with_value("id__gt", 2))?.delete()?;
    assert_eq!(removed, 2);
    assert_eq!(ids(&pets.all().order_by(&["id"])?.all()?)?, vec![1, 2]);

    Ok(())
}

#[test]
fn test_update_matching_rows() {
    test_update_matching_rows_impl().unwrap();
}

fn test_update_matching_rows_impl() -> Result<()> {
    let (_db, pets) = create_test_db()?;

    let puppies = pets.filter(Fields::new().with_value("age__lt", 3))?;
    let updated = puppies.update(Fields::new().with_value("nickname", "puppy"))?;
    assert_eq!(updated, 2);
    assert_eq!(
        pets.filter(Fields::new().with_value("nickname", "puppy"))?.count()?,
        2
    );

    assert_eq!(puppies.update(Fields::new())?, 0);
    assert!(matches!(
        puppies.update(Fields::new().with_value("color", "brown")),
        Err(SqliterError::NoSuchField { .. })
    ));
    assert!(matches!(
        puppies.update(Fields::new().with_value("age", "young")),
        Err(SqliterError::MismatchingTypes { .. })
    ));
    assert!(matches!(
        puppies.update(Fields::new().with_value("name", Value::Null)),
        Err(SqliterError::Engine(_))
    ));

    Ok(())
}

#[test]
fn test_result_set_is_restartable() {
    test_result_set_is_restartable_impl().unwrap();
}

fn test_result_set_is_restartable_impl() -> Result<()> {
    let (_db, pets) = create_test_db()?;

    let grown = pets.filter(Fields::new().with_value("age__gte", 3))?;
    assert_eq!(grown.iter()?.count(), 2);
    assert_eq!(grown.iter()?.count(), 2);

    pets.create(Fields::new().with_value("name", "Rex").with_value("age", 9))?;
    assert_eq!(grown.all()?.len(), 3);
    assert_eq!(grown.count()?, 3);

    Ok(())
}

#[test]
fn test_case_insensitive_operators_need_textual_columns() {
    test_case_insensitive_operators_need_textual_columns_impl().unwrap();
}

fn test_case_insensitive_operators_need_textual_columns_impl() -> Result<()> {
    let db = Database::open_in_memory()?;
    let samples = db.create_table(
        "samples",
        &[
            ("id", FieldDescriptor::builder(FieldType::Integer).primary_key().build()?),
            ("flag", FieldDescriptor::builder(FieldType::Boolean).build()?),
            ("data", FieldDescriptor::builder(FieldType::Blob).build()?),
            ("taken", FieldDescriptor::builder(FieldType::Date).build()?),
        ],
    )?;
    samples.create(
        Fields::new()
            .with_value("flag", true)
            .with_value("data", vec![1u8, 2, 3])
            .with_value("taken", chrono::NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()),
    )?;

    assert!(matches!(
        samples.filter(Fields::new().with_value("flag__icontains", true)),
        Err(SqliterError::MismatchingTypes { found: "BOOLEAN", .. })
    ));
    assert!(matches!(
        samples.filter(Fields::new().with_value("data__ilike", vec![2u8])),
        Err(SqliterError::MismatchingTypes { found: "BLOB", .. })
    ));

    // the case-sensitive operator compares stored values directly
    assert_eq!(
        samples.filter(Fields::new().with_value("flag__contains", true))?.count()?,
        1
    );
    assert_eq!(
        samples.filter(Fields::new().with_value("data__contains", vec![2u8]))?.count()?,
        1
    );

    let day = chrono::NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
    assert_eq!(
        samples.filter(Fields::new().with_value("taken__icontains", day))?.count()?,
        1
    );

    Ok(())
}
