use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_shipping_quotes",
        sql: r#"
CREATE SEQUENCE IF NOT EXISTS shipping_quotes_id_seq START 1;

CREATE TABLE IF NOT EXISTS shipping_quotes (
    id BIGINT PRIMARY KEY DEFAULT nextval('shipping_quotes_id_seq'),
    cache_key TEXT NOT NULL,
    customer_id TEXT,
    quote_id TEXT NOT NULL,
    carrier TEXT NOT NULL,
    service_code TEXT NOT NULL,
    service_name TEXT NOT NULL,
    cost DOUBLE NOT NULL,
    currency TEXT NOT NULL DEFAULT 'USD',
    transit_time TEXT,
    delivery_date TEXT,
    estimated_delivery TEXT,
    shipper_name TEXT NOT NULL,
    shipper_street TEXT NOT NULL,
    shipper_city TEXT NOT NULL,
    shipper_state TEXT NOT NULL,
    shipper_zip_code TEXT NOT NULL,
    shipper_country TEXT NOT NULL DEFAULT 'US',
    recipient_name TEXT NOT NULL,
    recipient_street TEXT NOT NULL,
    recipient_city TEXT NOT NULL,
    recipient_state TEXT NOT NULL,
    recipient_zip_code TEXT NOT NULL,
    recipient_country TEXT NOT NULL DEFAULT 'US',
    packages TEXT NOT NULL,
    raw_api_response TEXT,
    created_at_ms BIGINT NOT NULL,
    updated_at_ms BIGINT NOT NULL,
    expires_at_ms BIGINT NOT NULL
);
"#,
    },
    Migration {
        version: "0002_shipping_quote_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_shipping_quotes_cache_key ON shipping_quotes(cache_key);
CREATE INDEX IF NOT EXISTS idx_shipping_quotes_customer ON shipping_quotes(customer_id);
CREATE INDEX IF NOT EXISTS idx_shipping_quotes_expires_at ON shipping_quotes(expires_at_ms);
"#,
    },
];

/// Applies every migration that is not yet recorded in `schema_migrations`.
pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                [migration.version],
            )?;
        }
    }

    Ok(())
}
