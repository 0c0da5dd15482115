use std::error::Error;

use rowflow::storage::{DataRow, RowId, StorageProvider, Value};

type TestResult = Result<(), Box<dyn Error>>;

fn row(id: i64, city: &str) -> DataRow {
    DataRow::new(RowId(id)).with_value("city", Value::Text(city.to_string()))
}

fn providers() -> Result<Vec<(&'static str, StorageProvider)>, Box<dyn Error>> {
    Ok(vec![
        ("in-memory", StorageProvider::in_memory()),
        ("sql", StorageProvider::sql_database_in_memory()?),
        (
            "combined",
            StorageProvider::combined(
                StorageProvider::in_memory(),
                StorageProvider::sql_database_in_memory()?,
            ),
        ),
    ])
}

#[test]
fn double_annotation_counts_once_per_annotation() -> TestResult {
    for (name, provider) in providers()? {
        let factory = provider.create_row_annotation_factory()?;
        let first = factory.create_annotation();
        let second = factory.create_annotation();

        let r = row(1, "oslo");
        factory.annotate(&r, 1, &first)?;
        factory.annotate(&r, 1, &first)?;
        assert_eq!(first.row_count(), 1, "backend {name}");

        factory.annotate(&r, 1, &second)?;
        assert_eq!(second.row_count(), 1, "backend {name}");
        assert_eq!(first.row_count(), 1, "backend {name}");
    }
    Ok(())
}

#[test]
fn reset_clears_only_the_target_annotation() -> TestResult {
    for (name, provider) in providers()? {
        let factory = provider.create_row_annotation_factory()?;
        let cleared = factory.create_annotation();
        let kept = factory.create_annotation();

        factory.annotate(&row(1, "oslo"), 1, &cleared)?;
        factory.annotate(&row(2, "bergen"), 1, &kept)?;

        factory.reset(&cleared)?;

        assert!(factory.rows(&cleared)?.is_empty(), "backend {name}");
        assert_eq!(cleared.row_count(), 0, "backend {name}");
        assert_eq!(factory.rows(&kept)?.len(), 1, "backend {name}");
        assert_eq!(kept.row_count(), 1, "backend {name}");
    }
    Ok(())
}

#[test]
fn threshold_bounds_stored_rows_while_count_stays_exact() -> TestResult {
    let provider = StorageProvider::in_memory_with_threshold(2);
    let factory = provider.create_row_annotation_factory()?;
    let annotation = factory.create_annotation();

    for i in 0..5 {
        factory.annotate(&row(i, "oslo"), 1, &annotation)?;
    }

    assert_eq!(annotation.row_count(), 5);
    assert!(factory.rows(&annotation)?.len() <= 2);
    Ok(())
}

#[test]
fn value_counts_aggregate_per_observed_value() -> TestResult {
    for (name, provider) in providers()? {
        let factory = provider.create_row_annotation_factory()?;
        let annotation = factory.create_annotation();

        factory.annotate(&row(1, "oslo"), 1, &annotation)?;
        factory.annotate(&row(2, "oslo"), 1, &annotation)?;
        factory.annotate(&row(3, "bergen"), 1, &annotation)?;

        let counts = factory.value_counts(&annotation, "city")?;
        assert_eq!(
            counts.get(&Value::Text("oslo".into())),
            Some(&2),
            "backend {name}"
        );
        assert_eq!(
            counts.get(&Value::Text("bergen".into())),
            Some(&1),
            "backend {name}"
        );
    }
    Ok(())
}

#[test]
fn value_counts_weight_rows_the_same_on_every_backend() -> TestResult {
    for (name, provider) in providers()? {
        let factory = provider.create_row_annotation_factory()?;
        let annotation = factory.create_annotation();

        // A row annotated with distinct_count 3 stands for three source
        // rows; every backend must report it with that weight.
        factory.annotate(&row(1, "oslo"), 3, &annotation)?;
        factory.annotate(&row(2, "bergen"), 2, &annotation)?;

        let counts = factory.value_counts(&annotation, "city")?;
        assert_eq!(
            counts.get(&Value::Text("oslo".into())),
            Some(&3),
            "backend {name}"
        );
        assert_eq!(
            counts.get(&Value::Text("bergen".into())),
            Some(&2),
            "backend {name}"
        );
        assert_eq!(annotation.row_count(), 5, "backend {name}");
    }
    Ok(())
}

#[test]
fn transfer_moves_counts_without_rows() -> TestResult {
    for (name, provider) in providers()? {
        let factory = provider.create_row_annotation_factory()?;
        let from = factory.create_annotation();
        let to = factory.create_annotation();

        factory.annotate(&row(1, "oslo"), 4, &from)?;
        factory.transfer_annotations(&from, &to)?;

        assert_eq!(to.row_count(), 4, "backend {name}");
        assert!(factory.rows(&to)?.is_empty(), "backend {name}");
    }
    Ok(())
}

#[test]
fn sql_backed_rows_round_trip_their_values() -> TestResult {
    let dir = tempfile::tempdir()?;
    let provider = StorageProvider::sql_database(dir.path().join("job.db"))?;
    let factory = provider.create_row_annotation_factory()?;
    let annotation = factory.create_annotation();

    let input = DataRow::new(RowId(42))
        .with_value("city", Value::Text("oslo".into()))
        .with_value("age", Value::Int(33));
    factory.annotate(&input, 1, &annotation)?;

    let stored = factory.rows(&annotation)?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id(), RowId(42));
    assert_eq!(stored[0].value("city"), Some(&Value::Text("oslo".into())));
    assert_eq!(stored[0].value("age"), Some(&Value::Int(33)));

    provider.close()?;
    Ok(())
}
