//! Provisioning against a real PostgreSQL server. Skipped unless
//! TEST_DATABASE_URL points at a database the tests may freely modify. The
//! role also needs CREATEDB: one test starts from an empty scratch database.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sitecms_api::db::tenant::{Tenancy, TenantError, TenantId};
use sitecms_api::db::{schema, Database};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use uuid::Uuid;

async fn setup() -> Result<Option<(Database, PgPool, Tenancy)>> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return Ok(None);
    };
    let db = Database::connect(&url).await?;
    schema::bootstrap(&db).await?;
    let Database::Postgres(pool) = db.clone() else {
        anyhow::bail!("TEST_DATABASE_URL must be a PostgreSQL URL");
    };
    let tenancy = Tenancy::for_database(&db);
    tenancy.seeder.ensure_seed_data().await?;
    Ok(Some((db, pool, tenancy)))
}

/// Unique per test run so parallel tests and reruns never collide.
fn tenant_name(prefix: &str) -> String {
    format!("{prefix}_{}", &Uuid::new_v4().simple().to_string()[..12])
}

async fn drop_tenant(pool: &PgPool, tenant: &str) {
    let _ = sqlx::raw_sql(&format!("DROP SCHEMA IF EXISTS \"{tenant}\" CASCADE"))
        .execute(pool)
        .await;
}

/// Starter row counts for header, contact, company and carrousel.
const STARTER_ROWS: [(&str, i64); 4] = [("header", 1), ("contact", 1), ("company", 3), ("carrousel", 5)];

async fn assert_starter_rows(pool: &PgPool, schema: &str) -> Result<()> {
    for (table, rows) in STARTER_ROWS {
        assert_eq!(count(pool, schema, table).await?, rows, "{schema}.{table}");
    }
    Ok(())
}

async fn count(pool: &PgPool, tenant: &str, table: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(&format!("SELECT COUNT(*) FROM \"{tenant}\".\"{table}\""))
        .fetch_one(pool)
        .await?)
}

#[tokio::test]
async fn new_tenant_gets_tables_and_starter_rows() -> Result<()> {
    let Some((_db, pool, tenancy)) = setup().await? else {
        return Ok(());
    };
    let name = tenant_name("fresh");

    let report = tenancy.provisioner.provision(&name).await?;
    assert!(report.schema_created);
    assert!(report.is_complete(), "{report:?}");
    for table in [
        "header",
        "contact",
        "company",
        "carrousel",
        "news",
        "reviews",
        "category",
        "product",
        "manager",
        "manager_category",
        "publication",
        "publication_category",
    ] {
        assert!(report.tables_created.iter().any(|t| t == table), "missing {table}");
    }
    assert!(!report.tables_created.iter().any(|t| t == "user2"));

    assert_eq!(count(&pool, &name, "header").await?, 1);
    assert_eq!(count(&pool, &name, "contact").await?, 1);
    assert_eq!(count(&pool, &name, "company").await?, 3);
    assert_eq!(count(&pool, &name, "carrousel").await?, 5);
    assert_eq!(count(&pool, &name, "news").await?, 0);

    drop_tenant(&pool, &name).await;
    Ok(())
}

#[tokio::test]
async fn provisioning_twice_changes_nothing() -> Result<()> {
    let Some((_db, pool, tenancy)) = setup().await? else {
        return Ok(());
    };
    let name = tenant_name("twice");

    tenancy.provisioner.provision(&name).await?;
    let second = tenancy.provisioner.provision(&name).await?;
    assert!(!second.schema_created);
    assert!(second.tables_created.is_empty());
    assert_eq!(second.rows_copied(), 0);
    assert_eq!(count(&pool, &name, "company").await?, 3);

    drop_tenant(&pool, &name).await;
    Ok(())
}

#[tokio::test]
async fn reconcile_recreates_a_dropped_table() -> Result<()> {
    let Some((_db, pool, tenancy)) = setup().await? else {
        return Ok(());
    };
    let name = tenant_name("heal");
    tenancy.provisioner.provision(&name).await?;

    sqlx::raw_sql(&format!("DROP TABLE \"{name}\".\"carrousel\""))
        .execute(&pool)
        .await?;
    let tenant = TenantId::parse(&name)?;
    assert!(!tenancy
        .registry
        .list_tenant_tables(&tenant)
        .await?
        .contains(&"carrousel".to_string()));

    let report = tenancy.reconciler.reconcile(&name).await?;
    assert_eq!(report.tables_created, vec!["carrousel".to_string()]);
    assert_eq!(count(&pool, &name, "carrousel").await?, 5);
    // Tables that survived keep their rows without duplicates.
    assert_eq!(count(&pool, &name, "company").await?, 3);

    drop_tenant(&pool, &name).await;
    Ok(())
}

#[tokio::test]
async fn copied_sequences_continue_after_seed_rows() -> Result<()> {
    let Some((_db, pool, tenancy)) = setup().await? else {
        return Ok(());
    };
    let name = tenant_name("seq");
    tenancy.provisioner.provision(&name).await?;

    for (table, columns, values) in [
        ("header", "name", "'Otro'"),
        ("carrousel", "title, description", "'t', 'd'"),
    ] {
        let max: i32 = sqlx::query_scalar(&format!("SELECT MAX(id) FROM \"{name}\".\"{table}\""))
            .fetch_one(&pool)
            .await?;
        let id: i32 = sqlx::query_scalar(&format!(
            "INSERT INTO \"{name}\".\"{table}\" ({columns}) VALUES ({values}) RETURNING id"
        ))
        .fetch_one(&pool)
        .await?;
        assert_eq!(id, max + 1, "{table} sequence was not advanced past the copied rows");
    }

    // The tenant sequence is its own: the template keeps counting separately.
    let default: String = sqlx::query_scalar(
        "SELECT column_default::TEXT FROM information_schema.columns
         WHERE table_schema = $1 AND table_name = 'header' AND column_name = 'id'",
    )
    .bind(&name)
    .fetch_one(&pool)
    .await?;
    assert!(default.contains(&name), "{default}");

    drop_tenant(&pool, &name).await;
    Ok(())
}

#[tokio::test]
async fn tenants_are_isolated() -> Result<()> {
    let Some((_db, pool, tenancy)) = setup().await? else {
        return Ok(());
    };
    let a = tenant_name("iso_a");
    let b = tenant_name("iso_b");
    tenancy.provisioner.provision(&a).await?;
    tenancy.provisioner.provision(&b).await?;

    let mut session = tenancy.sessions.open(&a).await?;
    if let sitecms_api::db::Conn::Postgres(conn) = session.conn() {
        sqlx::query("DELETE FROM company").execute(&mut *conn).await?;
    }
    session.release().await?;

    assert_eq!(count(&pool, &a, "company").await?, 0);
    assert_eq!(count(&pool, &b, "company").await?, 3);
    let template: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM public.company")
        .fetch_one(&pool)
        .await?;
    assert!(template >= 3);

    drop_tenant(&pool, &a).await;
    drop_tenant(&pool, &b).await;
    Ok(())
}

#[tokio::test]
async fn concurrent_provisioning_is_serialized() -> Result<()> {
    let Some((_db, pool, tenancy)) = setup().await? else {
        return Ok(());
    };
    let name = tenant_name("race");

    let (first, second) = tokio::join!(
        tenancy.provisioner.provision(&name),
        tenancy.provisioner.provision(&name)
    );
    let (first, second) = (first?, second?);
    assert!(first.schema_created ^ second.schema_created);
    assert_eq!(count(&pool, &name, "carrousel").await?, 5);

    drop_tenant(&pool, &name).await;
    Ok(())
}

#[tokio::test]
async fn sessions_require_an_existing_schema() -> Result<()> {
    let Some((_db, _pool, tenancy)) = setup().await? else {
        return Ok(());
    };
    let missing = tenant_name("ghost");
    assert!(matches!(
        tenancy.sessions.open(&missing).await,
        Err(TenantError::NotFound(_))
    ));
    assert!(matches!(
        tenancy.sessions.open("bad-name").await,
        Err(TenantError::InvalidName(_))
    ));
    Ok(())
}

#[tokio::test]
async fn batch_reconcile_reports_every_tenant() -> Result<()> {
    let Some((_db, pool, tenancy)) = setup().await? else {
        return Ok(());
    };
    let good_a = tenant_name("batch_a");
    let good_b = tenant_name("batch_b");
    // Hyphens are not allowed in tenant names.
    let broken = good_a.replace('_', "-");
    let clients = [&good_a, &good_b, &broken];
    for client in clients {
        sqlx::query(
            "INSERT INTO public.user2 (password, full_name, email, client) VALUES ('x', 'Batch', $1, $2)",
        )
        .bind(format!("{client}@example.com"))
        .bind(client)
        .execute(&pool)
        .await?;
    }

    let outcomes = tenancy.reconciler.reconcile_all().await?;
    let outcome = |name: &str| outcomes.iter().find(|o| o.tenant == name);

    let bad = outcome(broken.as_str()).expect("broken tenant is reported");
    assert!(matches!(bad.result, Err(TenantError::InvalidName(_))), "{bad:?}");
    for name in [&good_a, &good_b] {
        let report = outcome(name.as_str())
            .expect("tenant is reported")
            .result
            .as_ref()
            .map_err(|e| anyhow::anyhow!("{name}: {e}"))?;
        assert!(report.schema_created && report.is_complete(), "{report:?}");
        assert_starter_rows(&pool, name).await?;
    }

    for client in clients {
        sqlx::query("DELETE FROM public.user2 WHERE email = $1")
            .bind(format!("{client}@example.com"))
            .execute(&pool)
            .await?;
    }
    drop_tenant(&pool, &good_a).await;
    drop_tenant(&pool, &good_b).await;
    Ok(())
}

#[tokio::test]
async fn provisioning_seeds_an_unseeded_template_first() -> Result<()> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return Ok(());
    };
    let admin = PgPool::connect(&url).await?;
    let scratch = tenant_name("sitecms_scratch");
    sqlx::raw_sql(&format!("CREATE DATABASE \"{scratch}\""))
        .execute(&admin)
        .await?;

    let result = async {
        let options = PgConnectOptions::from_str(&url)?.database(&scratch);
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let db = Database::Postgres(pool.clone());
        // Template tables only: the seeder never runs here.
        schema::bootstrap(&db).await?;
        assert_eq!(count(&pool, "public", "company").await?, 0);

        let tenancy = Tenancy::for_database(&db);
        let name = tenant_name("lazy");
        let report = tenancy.provisioner.provision(&name).await?;
        assert!(report.is_complete(), "{report:?}");
        assert_eq!(report.rows_copied(), 10);

        assert_starter_rows(&pool, "public").await?;
        assert_starter_rows(&pool, &name).await?;
        pool.close().await;
        anyhow::Ok(())
    }
    .await;

    sqlx::raw_sql(&format!("DROP DATABASE IF EXISTS \"{scratch}\" WITH (FORCE)"))
        .execute(&admin)
        .await?;
    result
}

#[tokio::test]
async fn foreign_keys_point_inside_the_tenant() -> Result<()> {
    let Some((_db, pool, tenancy)) = setup().await? else {
        return Ok(());
    };
    let name = tenant_name("fk");
    let report = tenancy.provisioner.provision(&name).await?;
    assert!(report.is_complete(), "{report:?}");
    for constraint in [
        "product.product_category_id_fkey",
        "publication.publication_publication_category_id_fkey",
    ] {
        assert!(report.constraints_added.iter().any(|c| c == constraint), "{report:?}");
    }

    let targets: Vec<(String, String)> = sqlx::query_as(
        "SELECT rn.nspname::TEXT, rt.relname::TEXT
         FROM pg_constraint c
         JOIN pg_class t ON t.oid = c.conrelid
         JOIN pg_namespace n ON n.oid = t.relnamespace
         JOIN pg_class rt ON rt.oid = c.confrelid
         JOIN pg_namespace rn ON rn.oid = rt.relnamespace
         WHERE c.contype = 'f' AND n.nspname = $1 AND t.relname = 'product'",
    )
    .bind(&name)
    .fetch_all(&pool)
    .await?;
    assert_eq!(targets, vec![(name.clone(), "category".to_string())]);

    // A category id that exists only in the template is not good enough.
    let template_category: i32 =
        sqlx::query_scalar("INSERT INTO public.category (title) VALUES ('Solo plantilla') RETURNING id")
            .fetch_one(&pool)
            .await?;
    let dangling = sqlx::query(&format!(
        "INSERT INTO \"{name}\".product (title, description, photo, category_id) VALUES ('t', 'd', 'p.png', $1)"
    ))
    .bind(template_category)
    .execute(&pool)
    .await;
    assert!(dangling.is_err_and(|e| e
        .as_database_error()
        .is_some_and(|d| d.is_foreign_key_violation())));
    sqlx::query("DELETE FROM public.category WHERE id = $1")
        .bind(template_category)
        .execute(&pool)
        .await?;

    let again = tenancy.provisioner.provision(&name).await?;
    assert!(again.constraints_added.is_empty(), "{again:?}");

    // Dropping the referenced table drops the constraint with it; reconcile
    // brings both back.
    sqlx::raw_sql(&format!("DROP TABLE \"{name}\".category CASCADE"))
        .execute(&pool)
        .await?;
    let healed = tenancy.reconciler.reconcile(&name).await?;
    assert_eq!(healed.tables_created, vec!["category".to_string()]);
    assert_eq!(healed.constraints_added, vec!["product.product_category_id_fkey".to_string()]);

    drop_tenant(&pool, &name).await;
    Ok(())
}

#[tokio::test]
async fn closing_a_dead_session_does_not_fail() -> Result<()> {
    let Some((_db, pool, tenancy)) = setup().await? else {
        return Ok(());
    };
    let name = tenant_name("dead");
    tenancy.provisioner.provision(&name).await?;

    let mut session = tenancy.sessions.open(&name).await?;
    let pid: i32 = match session.conn() {
        sitecms_api::db::Conn::Postgres(conn) => {
            sqlx::query_scalar("SELECT pg_backend_pid()").fetch_one(&mut *conn).await?
        }
        sitecms_api::db::Conn::Sqlite(_) => unreachable!("postgres session"),
    };
    sqlx::query("SELECT pg_terminate_backend($1)")
        .bind(pid)
        .execute(&pool)
        .await?;
    for _ in 0..50 {
        let alive: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_stat_activity WHERE pid = $1)")
                .bind(pid)
                .fetch_one(&pool)
                .await?;
        if !alive {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // The reset fails on the dead connection; closing only logs it.
    session.close().await;

    let mut session = tenancy.sessions.open(&name).await?;
    let rows: i64 = match session.conn() {
        sitecms_api::db::Conn::Postgres(conn) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM company").fetch_one(&mut *conn).await?
        }
        sitecms_api::db::Conn::Sqlite(_) => unreachable!("postgres session"),
    };
    assert_eq!(rows, 3);
    session.close().await;

    drop_tenant(&pool, &name).await;
    Ok(())
}
