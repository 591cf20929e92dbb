//! Template namespace bootstrap. Creates the canonical table set that every
//! tenant is cloned from, plus the cross-tenant identity tables.

use super::Database;

const POSTGRES_TEMPLATE: &str = r#"
CREATE TABLE IF NOT EXISTS public.header (
    id    SERIAL PRIMARY KEY,
    name  VARCHAR(100) NOT NULL,
    logo  VARCHAR(80)
);

CREATE TABLE IF NOT EXISTS public.contact (
    id      SERIAL PRIMARY KEY,
    email   VARCHAR(100) NOT NULL,
    phone   VARCHAR(100) NOT NULL,
    address VARCHAR(255)
);

CREATE TABLE IF NOT EXISTS public.company (
    id          SERIAL PRIMARY KEY,
    title       VARCHAR(100) NOT NULL,
    description TEXT NOT NULL,
    photo       VARCHAR(80),
    status      BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS public.carrousel (
    id          SERIAL PRIMARY KEY,
    title       VARCHAR(100) NOT NULL,
    description TEXT NOT NULL,
    photo       VARCHAR(80),
    status      BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS public.news (
    id          SERIAL PRIMARY KEY,
    title       VARCHAR(100) NOT NULL,
    description TEXT NOT NULL,
    fecha       DATE NOT NULL,
    photo       VARCHAR(80) NOT NULL,
    status      BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS public.reviews (
    id          SERIAL PRIMARY KEY,
    title       VARCHAR(100) NOT NULL,
    description TEXT NOT NULL,
    photo       VARCHAR(80) NOT NULL
);

CREATE TABLE IF NOT EXISTS public.category (
    id    SERIAL PRIMARY KEY,
    title VARCHAR(100) NOT NULL
);

CREATE TABLE IF NOT EXISTS public.product (
    id          SERIAL PRIMARY KEY,
    title       VARCHAR(100) NOT NULL,
    description TEXT NOT NULL,
    photo       VARCHAR(80) NOT NULL,
    category_id INTEGER NOT NULL REFERENCES public.category(id),
    variants    JSONB NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS public.manager_category (
    id    SERIAL PRIMARY KEY,
    title VARCHAR(100) NOT NULL
);

CREATE TABLE IF NOT EXISTS public.manager (
    id          SERIAL PRIMARY KEY,
    title       VARCHAR(100) NOT NULL,
    description TEXT NOT NULL,
    charge      VARCHAR(100) NOT NULL,
    photo       VARCHAR(80)
);

CREATE TABLE IF NOT EXISTS public.publication_category (
    id    SERIAL PRIMARY KEY,
    title VARCHAR(100) NOT NULL
);

CREATE TABLE IF NOT EXISTS public.publication (
    id                      SERIAL PRIMARY KEY,
    title                   VARCHAR(100) NOT NULL,
    photo                   VARCHAR(80),
    file                    VARCHAR(80) NOT NULL,
    publication_category_id INTEGER NOT NULL REFERENCES public.publication_category(id)
);

CREATE TABLE IF NOT EXISTS public.user2 (
    id        SERIAL PRIMARY KEY,
    password  VARCHAR(255) NOT NULL,
    full_name VARCHAR(96) NOT NULL,
    email     VARCHAR(96) NOT NULL UNIQUE,
    client    VARCHAR(50)
);

CREATE TABLE IF NOT EXISTS public.active_sessions (
    id          SERIAL PRIMARY KEY,
    user_id     INTEGER NOT NULL REFERENCES public.user2(id) ON DELETE CASCADE,
    token       TEXT NOT NULL UNIQUE,
    created_at  TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    expires_at  TIMESTAMP NOT NULL,
    last_action TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_active_sessions_user_id    ON public.active_sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_active_sessions_expires_at ON public.active_sessions(expires_at);

CREATE TABLE IF NOT EXISTS public.google_calendar_tokens (
    id         SERIAL PRIMARY KEY,
    user_id    INTEGER NOT NULL,
    token      TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
"#;

const SQLITE_TEMPLATE: &str = r#"
CREATE TABLE IF NOT EXISTS header (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    name  VARCHAR(100) NOT NULL,
    logo  VARCHAR(80)
);

CREATE TABLE IF NOT EXISTS contact (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    email   VARCHAR(100) NOT NULL,
    phone   VARCHAR(100) NOT NULL,
    address VARCHAR(255)
);

CREATE TABLE IF NOT EXISTS company (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    title       VARCHAR(100) NOT NULL,
    description TEXT NOT NULL,
    photo       VARCHAR(80),
    status      BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS carrousel (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    title       VARCHAR(100) NOT NULL,
    description TEXT NOT NULL,
    photo       VARCHAR(80),
    status      BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS news (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    title       VARCHAR(100) NOT NULL,
    description TEXT NOT NULL,
    fecha       DATE NOT NULL,
    photo       VARCHAR(80) NOT NULL,
    status      BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS reviews (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    title       VARCHAR(100) NOT NULL,
    description TEXT NOT NULL,
    photo       VARCHAR(80) NOT NULL
);

CREATE TABLE IF NOT EXISTS category (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    title VARCHAR(100) NOT NULL
);

CREATE TABLE IF NOT EXISTS product (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    title       VARCHAR(100) NOT NULL,
    description TEXT NOT NULL,
    photo       VARCHAR(80) NOT NULL,
    category_id INTEGER NOT NULL REFERENCES category(id),
    variants    TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS manager_category (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    title VARCHAR(100) NOT NULL
);

CREATE TABLE IF NOT EXISTS manager (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    title       VARCHAR(100) NOT NULL,
    description TEXT NOT NULL,
    charge      VARCHAR(100) NOT NULL,
    photo       VARCHAR(80)
);

CREATE TABLE IF NOT EXISTS publication_category (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    title VARCHAR(100) NOT NULL
);

CREATE TABLE IF NOT EXISTS publication (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    title                   VARCHAR(100) NOT NULL,
    photo                   VARCHAR(80),
    file                    VARCHAR(80) NOT NULL,
    publication_category_id INTEGER NOT NULL REFERENCES publication_category(id)
);

CREATE TABLE IF NOT EXISTS user2 (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    password  VARCHAR(255) NOT NULL,
    full_name VARCHAR(96) NOT NULL,
    email     VARCHAR(96) NOT NULL UNIQUE,
    client    VARCHAR(50)
);

CREATE TABLE IF NOT EXISTS active_sessions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL REFERENCES user2(id) ON DELETE CASCADE,
    token       TEXT NOT NULL UNIQUE,
    created_at  TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    expires_at  TIMESTAMP NOT NULL,
    last_action TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS google_calendar_tokens (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    INTEGER NOT NULL,
    token      TEXT NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Create the template and identity tables (idempotent, safe on every startup).
pub async fn bootstrap(db: &Database) -> anyhow::Result<()> {
    match db {
        Database::Postgres(pool) => {
            sqlx::raw_sql("CREATE SCHEMA IF NOT EXISTS public")
                .execute(pool)
                .await?;
            sqlx::raw_sql(POSTGRES_TEMPLATE).execute(pool).await?;
        }
        Database::Sqlite(pool) => {
            sqlx::raw_sql(SQLITE_TEMPLATE).execute(pool).await?;
        }
    }
    tracing::info!(backend = db.backend_name(), "Template tables ready");
    Ok(())
}
