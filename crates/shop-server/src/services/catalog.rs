use serde::Deserialize;

use crate::db::{now_timestamp, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{Product, PRODUCT_COLS};

#[derive(Debug, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
}

fn validate(name: &str, price: i64) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::InvalidArgument("Name is required".into()));
    }
    if price < 0 {
        return Err(AppError::InvalidArgument("Price cannot be negative".into()));
    }
    Ok(())
}

pub fn create_product(pool: &DbPool, new: NewProduct) -> AppResult<Product> {
    validate(&new.name, new.price)?;

    let now = now_timestamp();
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO products (name, description, price, deleted, created_at, updated_at) VALUES (?1, ?2, ?3, 0, ?4, ?4)",
        rusqlite::params![new.name.trim(), new.description, new.price, now],
    )?;

    let product = Product {
        id: conn.last_insert_rowid(),
        name: new.name.trim().to_string(),
        description: new.description,
        price: new.price,
        deleted: false,
        created_at: now.clone(),
        updated_at: now,
    };
    tracing::info!(product_id = product.id, price = product.price, "Product created");
    Ok(product)
}

/// Any product by id, deleted or not.
pub fn find_product(conn: &rusqlite::Connection, id: i64) -> AppResult<Option<Product>> {
    let result = conn.query_row(
        &format!("SELECT {PRODUCT_COLS} FROM products WHERE id = ?1"),
        rusqlite::params![id],
        Product::from_row,
    );

    match result {
        Ok(product) => Ok(Some(product)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(AppError::Database(e)),
    }
}

pub fn update_product(pool: &DbPool, id: i64, changes: ProductChanges) -> AppResult<Product> {
    let conn = pool.get()?;

    let existing = find_product(&conn, id)?
        .filter(|p| !p.deleted)
        .ok_or_else(|| AppError::NotFound("Product not found".into()))?;

    let name = changes.name.map(|n| n.trim().to_string()).unwrap_or(existing.name);
    let description = changes.description.unwrap_or(existing.description);
    let price = changes.price.unwrap_or(existing.price);
    validate(&name, price)?;

    let now = now_timestamp();
    conn.execute(
        "UPDATE products SET name = ?1, description = ?2, price = ?3, updated_at = ?4 WHERE id = ?5 AND deleted = 0",
        rusqlite::params![name, description, price, now, id],
    )?;

    Ok(Product {
        name,
        description,
        price,
        updated_at: now,
        ..existing
    })
}

/// Flag a product as deleted. The row stays so purchase history can still join it.
pub fn soft_delete_product(pool: &DbPool, id: i64) -> AppResult<()> {
    let conn = pool.get()?;
    let affected = conn.execute(
        "UPDATE products SET deleted = 1, updated_at = ?1 WHERE id = ?2 AND deleted = 0",
        rusqlite::params![now_timestamp(), id],
    )?;

    if affected == 0 {
        return Err(AppError::NotFound("Product not found".into()));
    }
    tracing::info!(product_id = id, "Product soft-deleted");
    Ok(())
}

pub fn list_products(pool: &DbPool) -> AppResult<Vec<Product>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {PRODUCT_COLS} FROM products WHERE deleted = 0 ORDER BY id"
    ))?;
    let rows = stmt.query_map([], Product::from_row)?;
    let products: Result<Vec<_>, _> = rows.collect();
    Ok(products?)
}

#[cfg(test)]
pub(crate) fn seed_product(pool: &DbPool, name: &str, price: i64) -> Product {
    create_product(
        pool,
        NewProduct {
            name: name.to_string(),
            description: format!("{name} description"),
            price,
        },
    )
    .expect("seed product")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    #[test]
    fn soft_deleted_products_leave_the_listing_but_not_the_table() {
        let pool = memory_pool();
        let keep = seed_product(&pool, "Kettle", 2500);
        let gone = seed_product(&pool, "Toaster", 3000);

        soft_delete_product(&pool, gone.id).unwrap();

        let listed: Vec<i64> = list_products(&pool).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(listed, vec![keep.id]);

        let conn = pool.get().unwrap();
        let historical = find_product(&conn, gone.id).unwrap().unwrap();
        assert!(historical.deleted);
        assert_eq!(historical.price, 3000);
    }

    #[test]
    fn deleting_twice_is_not_found() {
        let pool = memory_pool();
        let product = seed_product(&pool, "Kettle", 2500);
        soft_delete_product(&pool, product.id).unwrap();
        assert!(matches!(
            soft_delete_product(&pool, product.id),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(soft_delete_product(&pool, 999), Err(AppError::NotFound(_))));
    }

    #[test]
    fn update_merges_partial_changes() {
        let pool = memory_pool();
        let product = seed_product(&pool, "Kettle", 2500);

        let updated = update_product(
            &pool,
            product.id,
            ProductChanges {
                price: Some(2200),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(updated.name, "Kettle");
        assert_eq!(updated.price, 2200);
        assert_eq!(list_products(&pool).unwrap()[0].price, 2200);
    }

    #[test]
    fn deleted_products_cannot_be_updated() {
        let pool = memory_pool();
        let product = seed_product(&pool, "Kettle", 2500);
        soft_delete_product(&pool, product.id).unwrap();

        let err = update_product(&pool, product.id, ProductChanges::default()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn invalid_products_are_rejected() {
        let pool = memory_pool();
        let negative = NewProduct { name: "Kettle".into(), description: String::new(), price: -1 };
        let nameless = NewProduct { name: "  ".into(), description: String::new(), price: 1 };

        assert!(matches!(create_product(&pool, negative), Err(AppError::InvalidArgument(_))));
        assert!(matches!(create_product(&pool, nameless), Err(AppError::InvalidArgument(_))));
        assert!(list_products(&pool).unwrap().is_empty());
    }
}
