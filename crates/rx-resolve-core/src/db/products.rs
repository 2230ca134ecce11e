//! Product catalog operations.

use rusqlite::{params, params_from_iter, OptionalExtension};
use strsim::{jaro_winkler, normalized_levenshtein};

use super::{Database, DbError, DbResult};
use crate::models::Product;

/// Number of FTS candidates to pull before ranking.
const FTS_CANDIDATE_LIMIT: usize = 20;

/// Minimum fuzzy similarity for the reference lookup.
const MIN_REFERENCE_SIMILARITY: f64 = 0.55;

/// Filter for the multi-field candidate search.
///
/// `strict` ANDs every present field (the complete-profile mode); otherwise
/// present fields, the ingredient, and the therapeutic-group keywords are
/// ORed together.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    pub strict: bool,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub dosage_form: Option<String>,
    pub route: Option<String>,
    pub active_ingredient: Option<String>,
    pub group_keywords: Vec<String>,
    pub exclude_id: Option<String>,
    pub limit: usize,
}

impl Database {
    /// Insert or update a product.
    pub fn upsert_product(&self, product: &Product) -> DbResult<()> {
        let aliases_json = serde_json::to_string(&product.aliases)?;

        self.conn.execute(
            r#"
            INSERT INTO products (
                id, name, aliases, price, stock_quantity, requires_prescription,
                active_ingredient, therapeutic_group, indication, contraindication,
                category, subcategory, dosage_form, route, active, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, datetime('now'))
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                aliases = excluded.aliases,
                price = excluded.price,
                stock_quantity = excluded.stock_quantity,
                requires_prescription = excluded.requires_prescription,
                active_ingredient = excluded.active_ingredient,
                therapeutic_group = excluded.therapeutic_group,
                indication = excluded.indication,
                contraindication = excluded.contraindication,
                category = excluded.category,
                subcategory = excluded.subcategory,
                dosage_form = excluded.dosage_form,
                route = excluded.route,
                active = excluded.active,
                updated_at = datetime('now')
            "#,
            params![
                product.id,
                product.name,
                aliases_json,
                product.price,
                product.stock_quantity,
                product.requires_prescription,
                product.active_ingredient,
                product.therapeutic_group,
                product.indication,
                product.contraindication,
                product.category,
                product.subcategory,
                product.dosage_form,
                product.route,
                product.active,
            ],
        )?;
        Ok(())
    }

    /// Get a product by id.
    pub fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let result = self
            .conn
            .query_row(
                &format!("SELECT {} FROM products WHERE id = ?", PRODUCT_COLUMNS),
                [id],
                map_product_row,
            )
            .optional()?;

        result.map(|row| row.try_into()).transpose()
    }

    /// All products, optionally restricted to active ones.
    pub fn list_products(&self, active_only: bool) -> DbResult<Vec<Product>> {
        let sql = if active_only {
            format!(
                "SELECT {} FROM products WHERE active = 1 ORDER BY name",
                PRODUCT_COLUMNS
            )
        } else {
            format!("SELECT {} FROM products ORDER BY name", PRODUCT_COLUMNS)
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], map_product_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }

    /// Mark a product as inactive (soft delete).
    pub fn deactivate_product(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE products SET active = 0, updated_at = datetime('now') WHERE id = ?",
            [id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Full-text search over name, aliases, and ingredient (BM25 ranking).
    /// Multi-word queries require every word (FTS5 implicit AND).
    pub fn search_products(&self, query: &str, limit: usize) -> DbResult<Vec<Product>> {
        self.fts_query(&escape_fts_query(query, false), limit)
    }

    /// Like [`Database::search_products`] but any word may match, for
    /// recovering from partially garbled terms.
    fn search_products_any_word(&self, query: &str, limit: usize) -> DbResult<Vec<Product>> {
        self.fts_query(&escape_fts_query(query, true), limit)
    }

    fn fts_query(&self, match_expr: &str, limit: usize) -> DbResult<Vec<Product>> {
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}, bm25(products_fts) as rank
            FROM products p
            JOIN products_fts fts ON p.rowid = fts.rowid
            WHERE products_fts MATCH ?
            AND p.active = 1
            ORDER BY rank
            LIMIT ?
            "#,
            PREFIXED_PRODUCT_COLUMNS
        ))?;

        let rows = stmt.query_map(params![match_expr, limit as i64], map_product_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }

    /// Zero-or-one best record for a search term.
    ///
    /// Equality on the lowercased name wins outright; otherwise FTS
    /// candidates are filtered to containment matches (either direction,
    /// aliases included) and the closest one by fuzzy similarity is
    /// returned.
    pub fn find_best_by_name(&self, term: &str) -> DbResult<Option<Product>> {
        let trimmed = term.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let exact = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM products WHERE lower(name) = lower(?) AND active = 1",
                    PRODUCT_COLUMNS
                ),
                [trimmed],
                map_product_row,
            )
            .optional()?;
        if let Some(row) = exact {
            return Ok(Some(row.try_into()?));
        }

        let mut candidates = self.search_products(trimmed, FTS_CANDIDATE_LIMIT)?;
        if candidates.is_empty() {
            candidates = self.search_products_any_word(trimmed, FTS_CANDIDATE_LIMIT)?;
        }
        let best = candidates
            .into_iter()
            .filter(|p| p.name_matches(trimmed))
            .map(|p| {
                let score = fuzzy_match(&trimmed.to_lowercase(), &p.name.to_lowercase());
                (p, score)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(best.map(|(p, _)| p))
    }

    /// Similar-named reference record for taxonomy inference.
    ///
    /// Unlike [`Database::find_best_by_name`] this does not require
    /// containment, only a fuzzy similarity above a floor.
    pub fn find_reference(&self, name: &str) -> DbResult<Option<Product>> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let query = trimmed.to_lowercase();
        let mut candidates = self.search_products(trimmed, FTS_CANDIDATE_LIMIT)?;
        if candidates.is_empty() {
            candidates = self.search_products_any_word(trimmed, FTS_CANDIDATE_LIMIT)?;
        }

        let best = candidates
            .into_iter()
            .map(|p| {
                let name_score = fuzzy_match(&query, &p.name.to_lowercase());
                let alias_score = p
                    .aliases
                    .iter()
                    .map(|a| fuzzy_match(&query, &a.to_lowercase()))
                    .fold(0.0_f64, f64::max);
                let ingredient_score = p
                    .active_ingredient
                    .as_deref()
                    .map(|i| fuzzy_match(&query, &i.to_lowercase()))
                    .unwrap_or(0.0);
                (p, name_score.max(alias_score).max(ingredient_score))
            })
            .filter(|(_, score)| *score >= MIN_REFERENCE_SIMILARITY)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(best.map(|(p, _)| p))
    }

    /// Multi-field filtered candidate search.
    pub fn search_candidates(&self, filter: &CandidateFilter) -> DbResult<Vec<Product>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        fn attr_clause(
            col: &str,
            value: &Option<String>,
            clauses: &mut Vec<String>,
            values: &mut Vec<String>,
        ) {
            if let Some(v) = value {
                clauses.push(format!("lower({}) = lower(?)", col));
                values.push(v.clone());
            }
        }

        attr_clause("category", &filter.category, &mut clauses, &mut values);
        attr_clause("subcategory", &filter.subcategory, &mut clauses, &mut values);
        attr_clause("dosage_form", &filter.dosage_form, &mut clauses, &mut values);
        attr_clause("route", &filter.route, &mut clauses, &mut values);

        if let Some(ingredient) = &filter.active_ingredient {
            clauses.push("lower(active_ingredient) LIKE '%' || lower(?) || '%'".into());
            values.push(ingredient.clone());
        }

        if !filter.strict {
            for keyword in &filter.group_keywords {
                clauses.push("lower(therapeutic_group) LIKE '%' || lower(?) || '%'".into());
                values.push(keyword.clone());
            }
        }

        if clauses.is_empty() {
            return Ok(Vec::new());
        }

        let joiner = if filter.strict { " AND " } else { " OR " };
        let mut sql = format!(
            "SELECT {} FROM products WHERE ({}) AND active = 1",
            PRODUCT_COLUMNS,
            clauses.join(joiner)
        );
        if let Some(exclude) = &filter.exclude_id {
            sql.push_str(" AND id <> ?");
            values.push(exclude.clone());
        }
        let limit = if filter.limit == 0 { FTS_CANDIDATE_LIMIT } else { filter.limit };
        sql.push_str(&format!(" ORDER BY name, id LIMIT {}", limit));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), map_product_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }
}

const PRODUCT_COLUMNS: &str = "id, name, aliases, price, stock_quantity, requires_prescription, \
     active_ingredient, therapeutic_group, indication, contraindication, \
     category, subcategory, dosage_form, route, active";

const PREFIXED_PRODUCT_COLUMNS: &str =
    "p.id, p.name, p.aliases, p.price, p.stock_quantity, p.requires_prescription, \
     p.active_ingredient, p.therapeutic_group, p.indication, p.contraindication, \
     p.category, p.subcategory, p.dosage_form, p.route, p.active";

/// Intermediate row struct for database mapping.
struct ProductRow {
    id: String,
    name: String,
    aliases: String,
    price: f64,
    stock_quantity: u32,
    requires_prescription: bool,
    active_ingredient: Option<String>,
    therapeutic_group: Option<String>,
    indication: Option<String>,
    contraindication: Option<String>,
    category: Option<String>,
    subcategory: Option<String>,
    dosage_form: Option<String>,
    route: Option<String>,
    active: bool,
}

fn map_product_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProductRow> {
    Ok(ProductRow {
        id: row.get(0)?,
        name: row.get(1)?,
        aliases: row.get(2)?,
        price: row.get(3)?,
        stock_quantity: row.get(4)?,
        requires_prescription: row.get(5)?,
        active_ingredient: row.get(6)?,
        therapeutic_group: row.get(7)?,
        indication: row.get(8)?,
        contraindication: row.get(9)?,
        category: row.get(10)?,
        subcategory: row.get(11)?,
        dosage_form: row.get(12)?,
        route: row.get(13)?,
        active: row.get(14)?,
    })
}

impl TryFrom<ProductRow> for Product {
    type Error = DbError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: row.id,
            name: row.name,
            aliases: serde_json::from_str(&row.aliases)?,
            price: row.price,
            stock_quantity: row.stock_quantity,
            requires_prescription: row.requires_prescription,
            active_ingredient: row.active_ingredient,
            therapeutic_group: row.therapeutic_group,
            indication: row.indication,
            contraindication: row.contraindication,
            category: row.category,
            subcategory: row.subcategory,
            dosage_form: row.dosage_form,
            route: row.route,
            active: row.active,
        })
    }
}

/// Escape special FTS5 characters and prepare query for prefix matching.
/// Words are ANDed by default; `any_word` joins them with OR instead.
fn escape_fts_query(query: &str, any_word: bool) -> String {
    let cleaned: String = query
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    cleaned
        .split_whitespace()
        .map(|word| format!("{}*", word))
        .collect::<Vec<_>>()
        .join(if any_word { " OR " } else { " " })
}

/// Compute fuzzy string similarity using combined metrics.
fn fuzzy_match(a: &str, b: &str) -> f64 {
    // Jaro-Winkler favors shared prefixes, Levenshtein overall shape
    let jw = jaro_winkler(a, b);
    let lev = normalized_levenshtein(a, b);

    jw * 0.6 + lev * 0.4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn product(id: &str, name: &str) -> Product {
        Product::with_id(id.into(), name.into())
    }

    #[test]
    fn test_upsert_and_get() {
        let db = setup_db();

        let mut p = product("P1", "Paracetamol 500mg");
        p.aliases = vec!["panadol".into(), "hapacol".into()];
        p.price = 25000.0;
        p.stock_quantity = 40;
        p.active_ingredient = Some("Paracetamol".into());
        p.category = Some("Thuốc giảm đau, hạ sốt".into());

        db.upsert_product(&p).unwrap();

        let retrieved = db.get_product("P1").unwrap().unwrap();
        assert_eq!(retrieved.name, "Paracetamol 500mg");
        assert_eq!(retrieved.aliases, vec!["panadol", "hapacol"]);
        assert_eq!(retrieved.price, 25000.0);
        assert_eq!(retrieved.stock_quantity, 40);
    }

    #[test]
    fn test_upsert_updates() {
        let db = setup_db();

        let mut p = product("P1", "Original Name");
        db.upsert_product(&p).unwrap();

        p.name = "Updated Name".into();
        db.upsert_product(&p).unwrap();

        let retrieved = db.get_product("P1").unwrap().unwrap();
        assert_eq!(retrieved.name, "Updated Name");
    }

    #[test]
    fn test_search_products() {
        let db = setup_db();

        let mut p1 = product("P1", "Paracetamol 500mg");
        p1.aliases = vec!["panadol".into()];
        db.upsert_product(&p1).unwrap();

        let p2 = product("P2", "Ibuprofen 400mg");
        db.upsert_product(&p2).unwrap();

        let results = db.search_products("paracetamol", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "P1");

        // Search by alias
        let results = db.search_products("panadol", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "P1");

        // Prefix search
        let results = db.search_products("ibu", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "P2");
    }

    #[test]
    fn test_find_best_by_name_equality_wins() {
        let db = setup_db();
        db.upsert_product(&product("P1", "Paracetamol 500mg")).unwrap();
        db.upsert_product(&product("P2", "Paracetamol 650mg")).unwrap();

        let best = db.find_best_by_name("paracetamol 500mg").unwrap().unwrap();
        assert_eq!(best.id, "P1");
    }

    #[test]
    fn test_find_best_by_name_containment() {
        let db = setup_db();
        db.upsert_product(&product("P1", "Paracetamol 500mg")).unwrap();

        // Product name contains the term
        let best = db.find_best_by_name("Paracetamol").unwrap().unwrap();
        assert_eq!(best.id, "P1");

        // Term contains the product name
        let best = db.find_best_by_name("Paracetamol 500mg 20v").unwrap();
        assert!(best.is_some());

        assert!(db.find_best_by_name("Amoxicillin").unwrap().is_none());
        assert!(db.find_best_by_name("   ").unwrap().is_none());
    }

    #[test]
    fn test_find_reference_fuzzy() {
        let db = setup_db();
        let mut p = product("P1", "Voltaren Emulgel 1%");
        p.active_ingredient = Some("Diclofenac diethylamine".into());
        db.upsert_product(&p).unwrap();

        // Close but not containment
        let found = db.find_reference("voltaren emugel").unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().id, "P1");
    }

    #[test]
    fn test_search_candidates_strict() {
        let db = setup_db();

        let mut gel = product("P1", "Diclofenac Gel 1%");
        gel.category = Some("Thuốc cơ xương khớp".into());
        gel.subcategory = Some("NSAID".into());
        gel.dosage_form = Some("Gel".into());
        gel.route = Some("Dùng ngoài".into());
        db.upsert_product(&gel).unwrap();

        let mut tablet = product("P2", "Meloxicam 7.5mg");
        tablet.category = Some("Thuốc cơ xương khớp".into());
        tablet.subcategory = Some("NSAID".into());
        tablet.dosage_form = Some("Viên nén".into());
        tablet.route = Some("Uống".into());
        db.upsert_product(&tablet).unwrap();

        let filter = CandidateFilter {
            strict: true,
            category: Some("Thuốc cơ xương khớp".into()),
            subcategory: Some("NSAID".into()),
            dosage_form: Some("Gel".into()),
            route: Some("Dùng ngoài".into()),
            limit: 10,
            ..Default::default()
        };

        let results = db.search_candidates(&filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "P1");
    }

    #[test]
    fn test_search_candidates_loose_or() {
        let db = setup_db();

        let mut a = product("P1", "Celecoxib 200mg");
        a.subcategory = Some("NSAID".into());
        db.upsert_product(&a).unwrap();

        let mut b = product("P2", "Alaxan");
        b.therapeutic_group = Some("Kháng viêm không steroid".into());
        db.upsert_product(&b).unwrap();

        let c = product("P3", "Vitamin C 500mg");
        db.upsert_product(&c).unwrap();

        let filter = CandidateFilter {
            strict: false,
            subcategory: Some("NSAID".into()),
            group_keywords: vec!["kháng viêm".into()],
            limit: 10,
            ..Default::default()
        };

        let results = db.search_candidates(&filter).unwrap();
        let ids: Vec<&str> = results.iter().map(|p| p.id.as_str()).collect();
        assert!(ids.contains(&"P1"));
        assert!(ids.contains(&"P2"));
        assert!(!ids.contains(&"P3"));
    }

    #[test]
    fn test_search_candidates_excludes_id_and_inactive() {
        let db = setup_db();

        let mut a = product("P1", "Celecoxib 200mg");
        a.subcategory = Some("NSAID".into());
        db.upsert_product(&a).unwrap();

        let mut b = product("P2", "Etoricoxib 90mg");
        b.subcategory = Some("NSAID".into());
        db.upsert_product(&b).unwrap();
        db.deactivate_product("P2").unwrap();

        let filter = CandidateFilter {
            strict: false,
            subcategory: Some("NSAID".into()),
            exclude_id: Some("P1".into()),
            limit: 10,
            ..Default::default()
        };

        let results = db.search_candidates(&filter).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_candidates_empty_filter() {
        let db = setup_db();
        db.upsert_product(&product("P1", "Anything")).unwrap();

        let filter = CandidateFilter {
            strict: false,
            limit: 10,
            ..Default::default()
        };
        assert!(db.search_candidates(&filter).unwrap().is_empty());
    }

    #[test]
    fn test_deactivate_hides_from_search() {
        let db = setup_db();
        db.upsert_product(&product("P1", "Paracetamol 500mg")).unwrap();
        db.deactivate_product("P1").unwrap();

        assert!(db.search_products("paracetamol", 10).unwrap().is_empty());
        // Still retrievable directly
        let p = db.get_product("P1").unwrap().unwrap();
        assert!(!p.active);
    }

    #[test]
    fn test_fuzzy_match() {
        assert!(fuzzy_match("paracetamol", "paracetamol") > 0.99);
        assert!(fuzzy_match("paracetamol", "paracetaml") > 0.85); // Typo
        assert!(fuzzy_match("paracetamol", "ibuprofen") < 0.5);
    }
}
