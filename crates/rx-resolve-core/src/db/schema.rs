//! SQLite schema definition.

/// Complete database schema for the rx-resolve product catalog.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Product Catalog
-- ============================================================================

CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    aliases TEXT NOT NULL DEFAULT '[]',           -- JSON array of strings
    price REAL NOT NULL DEFAULT 0,
    stock_quantity INTEGER NOT NULL DEFAULT 0,
    requires_prescription INTEGER NOT NULL DEFAULT 0,
    active_ingredient TEXT,
    therapeutic_group TEXT,
    indication TEXT,
    contraindication TEXT,
    category TEXT,
    subcategory TEXT,
    dosage_form TEXT,
    route TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- FTS5 virtual table for full-text search
CREATE VIRTUAL TABLE IF NOT EXISTS products_fts USING fts5(
    id,
    name,
    aliases,
    active_ingredient,
    content='products',
    content_rowid='rowid'
);

-- Triggers to keep FTS5 in sync with main table
CREATE TRIGGER IF NOT EXISTS products_ai AFTER INSERT ON products BEGIN
    INSERT INTO products_fts(rowid, id, name, aliases, active_ingredient)
    VALUES (new.rowid, new.id, new.name, new.aliases, new.active_ingredient);
END;

CREATE TRIGGER IF NOT EXISTS products_ad AFTER DELETE ON products BEGIN
    INSERT INTO products_fts(products_fts, rowid, id, name, aliases, active_ingredient)
    VALUES ('delete', old.rowid, old.id, old.name, old.aliases, old.active_ingredient);
END;

CREATE TRIGGER IF NOT EXISTS products_au AFTER UPDATE ON products BEGIN
    INSERT INTO products_fts(products_fts, rowid, id, name, aliases, active_ingredient)
    VALUES ('delete', old.rowid, old.id, old.name, old.aliases, old.active_ingredient);
    INSERT INTO products_fts(rowid, id, name, aliases, active_ingredient)
    VALUES (new.rowid, new.id, new.name, new.aliases, new.active_ingredient);
END;

-- Indexes for the taxonomy-filtered candidate search
CREATE INDEX IF NOT EXISTS idx_products_category ON products(category);
CREATE INDEX IF NOT EXISTS idx_products_subcategory ON products(subcategory);
CREATE INDEX IF NOT EXISTS idx_products_ingredient ON products(active_ingredient);
CREATE INDEX IF NOT EXISTS idx_products_group ON products(therapeutic_group);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_fts_trigger() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO products (id, name, aliases, active_ingredient) VALUES (?, ?, ?, ?)",
            ["P1", "Paracetamol 500mg", r#"["panadol"]"#, "Paracetamol"],
        )
        .unwrap();

        // Search via FTS
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM products_fts WHERE products_fts MATCH 'paracetamol'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        // Search aliases
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM products_fts WHERE products_fts MATCH 'panadol'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_fts_update_trigger() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO products (id, name) VALUES (?, ?)",
            ["P1", "Old Name"],
        )
        .unwrap();
        conn.execute(
            "UPDATE products SET name = ? WHERE id = ?",
            ["Efferalgan 500mg", "P1"],
        )
        .unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM products_fts WHERE products_fts MATCH 'efferalgan'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
