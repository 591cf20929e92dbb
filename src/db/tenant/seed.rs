use sqlx::Connection;

use super::{SeededTable, UnitError};
use crate::db::{Conn, Database};
use crate::with_conn;

/// Site entities that ship with starter rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedEntity {
    Header,
    Contact,
    Company,
    Carousel,
}

impl SeedEntity {
    pub const ALL: [SeedEntity; 4] = [
        SeedEntity::Header,
        SeedEntity::Contact,
        SeedEntity::Company,
        SeedEntity::Carousel,
    ];

    pub fn table(self) -> &'static str {
        match self {
            SeedEntity::Header => "header",
            SeedEntity::Contact => "contact",
            SeedEntity::Company => "company",
            SeedEntity::Carousel => "carrousel",
        }
    }

    /// Insert statement for one starter row; text values are bound in order.
    fn insert_sql(self, table: &str) -> String {
        match self {
            SeedEntity::Header => format!("INSERT INTO {table} (name, logo) VALUES ($1, NULL)"),
            SeedEntity::Contact => {
                format!("INSERT INTO {table} (email, phone, address) VALUES ($1, $2, NULL)")
            }
            SeedEntity::Company | SeedEntity::Carousel => format!(
                "INSERT INTO {table} (title, description, photo, status) VALUES ($1, $2, NULL, TRUE)"
            ),
        }
    }

    pub fn rows(self) -> Vec<Vec<String>> {
        match self {
            SeedEntity::Header => vec![vec!["Encabezado".into()]],
            SeedEntity::Contact => vec![vec!["example@email.com".into(), "+7 234 1234".into()]],
            SeedEntity::Company => (1..=3)
                .map(|n| vec![format!("Título {n}"), format!("Descripción para el título {n}.")])
                .collect(),
            SeedEntity::Carousel => (1..=5)
                .map(|n| vec![format!("Carrusel {n}"), format!("Descripción del carrusel {n}")])
                .collect(),
        }
    }
}

/// Insert the starter rows for `entity` into the template namespace when its
/// table is empty. Returns the number of rows inserted. Runs in a nested
/// transaction, so a caller already inside one gets a savepoint.
pub(crate) async fn seed_template_entity(
    conn: Conn<'_>,
    entity: SeedEntity,
) -> Result<u64, sqlx::Error> {
    let table = conn.template_table(entity.table());
    let insert = entity.insert_sql(&table);
    let count_sql = format!("SELECT COUNT(*) FROM {table}");
    let rows = entity.rows();

    with_conn!(conn, |c| {
        let mut tx = c.begin().await?;
        let existing: i64 = sqlx::query_scalar(&count_sql).fetch_one(&mut *tx).await?;
        if existing > 0 {
            tx.commit().await?;
            return Ok(0);
        }
        let mut inserted = 0;
        for row in &rows {
            let mut query = sqlx::query(&insert);
            for value in row {
                query = query.bind(value.as_str());
            }
            inserted += query.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    })
}

#[derive(Debug, Default)]
pub struct SeedReport {
    pub seeded: Vec<SeededTable>,
    pub errors: Vec<UnitError>,
}

/// Keeps the template namespace stocked with starter content.
#[derive(Clone)]
pub struct TemplateSeeder {
    db: Database,
}

impl TemplateSeeder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Seed every empty starter table. One entity failing is logged and the
    /// rest still run; only failing to get a connection is fatal.
    pub async fn ensure_seed_data(&self) -> Result<SeedReport, sqlx::Error> {
        let mut conn = self.db.acquire().await?;
        let mut report = SeedReport::default();

        for entity in SeedEntity::ALL {
            match seed_template_entity(conn.conn(), entity).await {
                Ok(rows) => {
                    if rows > 0 {
                        tracing::info!(table = entity.table(), rows, "Seeded template table");
                    }
                    report.seeded.push(SeededTable {
                        table: entity.table().to_string(),
                        rows,
                    });
                }
                Err(e) => {
                    tracing::warn!(table = entity.table(), "Template seeding failed: {e}");
                    report.errors.push(UnitError {
                        unit: entity.table().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }
}
