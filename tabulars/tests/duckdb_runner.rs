#![cfg(feature = "duckdb")]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tabula::{
    Dimension, DuckDbRunner, Filter, FilterOperator, Metric, QueryRunner, ReportCompiler,
    ReportConfig, ReportExecutor, SchemaRegistry, SortSpec,
};

fn bootstrap_duckdb(db_path: &Path) -> anyhow::Result<()> {
    let conn = duckdb::Connection::open(db_path)?;
    conn.execute_batch(
        "
        CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name VARCHAR,
            email VARCHAR,
            role VARCHAR,
            created_at TIMESTAMP
        );
        CREATE TABLE agencies (
            id INTEGER PRIMARY KEY,
            name VARCHAR,
            code VARCHAR,
            region VARCHAR,
            status VARCHAR,
            owner_id INTEGER,
            credit_limit INTEGER,
            created_at TIMESTAMP,
            updated_at TIMESTAMP
        );
        CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            agency_id INTEGER,
            import_id INTEGER,
            customer_name VARCHAR,
            status VARCHAR,
            total_points INTEGER,
            total_amount DOUBLE,
            item_count INTEGER,
            created_at TIMESTAMP,
            updated_at TIMESTAMP
        );
        INSERT INTO users VALUES
            (1, 'Ana', 'ana@example.com', 'admin', '2024-01-01'),
            (2, 'Ben', 'ben@example.com', 'agent', '2024-01-01');
        INSERT INTO agencies VALUES
            (1, 'North Travel', 'NT', 'north', 'ACTIVE', 1, 1000, '2024-01-01', '2024-01-01'),
            (2, 'South Tours', 'ST', 'south', 'ACTIVE', 2, 500, '2024-01-01', '2024-01-01');
        INSERT INTO orders VALUES
            (1, 1, NULL, 'Alice', 'PENDING', 100, 10.0, 1, '2024-02-01', '2024-02-01'),
            (2, 1, NULL, 'Bob', 'CONFIRMED', 50, 5.0, 2, '2024-02-02', '2024-02-02'),
            (3, 2, NULL, 'Carla', 'CONFIRMED', 25, 2.5, 1, '2024-02-03', '2024-02-03'),
            (4, 2, NULL, 'Dan', 'CANCELLED', 75, 7.5, 4, '2024-02-04', '2024-02-04');
        ",
    )?;
    Ok(())
}

fn executor(db_path: &Path) -> anyhow::Result<ReportExecutor> {
    let registry = Arc::new(SchemaRegistry::business()?);
    let runner = Arc::new(DuckDbRunner::new(db_path).with_max_concurrency(4));
    Ok(ReportExecutor::new(ReportCompiler::new(registry), runner))
}

#[tokio::test]
async fn grouped_report_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("reports.duckdb");
    bootstrap_duckdb(&db_path)?;
    let executor = executor(&db_path)?;

    let config = ReportConfig {
        dimensions: vec![Dimension::aliased("agency.name", "agency_name")],
        metrics: vec![Metric::sum("total_points").with_alias("points"), Metric::count("id")],
        filters: vec![Filter::new(
            "status",
            FilterOperator::In,
            json!(["PENDING", "CONFIRMED"]),
        )],
        sort: vec![SortSpec::desc("points")],
        limit: Some(10),
    };
    let rows = executor.execute("orders", &config).await?;

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["agency_name"], json!("North Travel"));
    assert_eq!(rows[0]["points"], json!(150));
    assert_eq!(rows[0]["count_id"], json!(2));
    assert_eq!(rows[1]["agency_name"], json!("South Tours"));
    assert_eq!(rows[1]["points"], json!(25));
    Ok(())
}

#[tokio::test]
async fn ordinal_sort_and_limit_param() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("reports.duckdb");
    bootstrap_duckdb(&db_path)?;
    let executor = executor(&db_path)?;

    let config = ReportConfig {
        dimensions: vec![Dimension::new("status")],
        metrics: vec![Metric::sum("item_count")],
        sort: vec![SortSpec::desc("item_count")],
        limit: Some(1),
        ..Default::default()
    };
    let rows = executor.execute("orders", &config).await?;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], json!("CANCELLED"));
    assert_eq!(rows[0]["total_item_count"], json!(4));
    Ok(())
}

#[tokio::test]
async fn requires_chain_joins_owner() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("reports.duckdb");
    bootstrap_duckdb(&db_path)?;
    let executor = executor(&db_path)?;

    let config = ReportConfig {
        dimensions: vec![Dimension::new("agency_owner.name")],
        metrics: vec![Metric::count("id")],
        filters: vec![Filter::new("status", FilterOperator::Neq, "CANCELLED")],
        ..Default::default()
    };
    let rows = executor.execute("orders", &config).await?;

    let by_owner: HashMap<String, i64> = rows
        .iter()
        .map(|row| {
            (
                row["name"].as_str().unwrap_or_default().to_string(),
                row["count_id"].as_i64().unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(by_owner.get("Ana"), Some(&2));
    assert_eq!(by_owner.get("Ben"), Some(&1));
    Ok(())
}

#[tokio::test]
async fn concurrent_runs_share_one_slot() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("reports.duckdb");
    bootstrap_duckdb(&db_path)?;
    // one slot means one pooled connection, handed from task to task
    let runner = DuckDbRunner::new(&db_path).with_max_concurrency(1);

    let mut handles = Vec::new();
    for status in ["PENDING", "CONFIRMED", "CANCELLED", "MISSING"] {
        let runner = runner.clone();
        handles.push(tokio::spawn(async move {
            runner
                .run(
                    "SELECT COUNT(id) AS n FROM orders WHERE status = ?",
                    &[json!(status)],
                )
                .await
        }));
    }
    let mut counts = Vec::new();
    for handle in handles {
        let rows = handle.await??;
        counts.push(rows[0]["n"].as_i64().unwrap_or(-1));
    }
    assert_eq!(counts, vec![1, 2, 1, 0]);
    Ok(())
}

#[tokio::test]
async fn sql_errors_surface_as_execution_failures() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("reports.duckdb");
    bootstrap_duckdb(&db_path)?;
    let runner = DuckDbRunner::new(&db_path);

    let err = runner.run("SELECT nope FROM orders", &[]).await.unwrap_err();
    assert!(!err.is_rejected_config());
    Ok(())
}
