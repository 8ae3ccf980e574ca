use chrono::NaiveDate;
use serde::Deserialize;

use crate::db::{DbPool, DATE_FORMAT};
use crate::error::{AppError, AppResult};
use crate::models::Sale;

/// Sales report filter. `None` leaves that dimension unconstrained.
#[derive(Debug, Default, Deserialize)]
pub struct SalesFilter {
    #[serde(rename = "user")]
    pub user_name: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn sales_report(pool: &DbPool, filter: &SalesFilter) -> AppResult<Vec<Sale>> {
    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Err(AppError::InvalidArgument("'from' must not be after 'to'".into()));
        }
    }

    let mut where_clause = "WHERE 1 = 1".to_string();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(name) = &filter.user_name {
        params.push(Box::new(format!("%{}%", escape_like(name))));
        where_clause.push_str(&format!(" AND u.name LIKE ?{} ESCAPE '\\'", params.len()));
    }
    if let Some(from) = filter.from {
        params.push(Box::new(from.format(DATE_FORMAT).to_string()));
        where_clause.push_str(&format!(" AND pu.purchase_date >= ?{}", params.len()));
    }
    if let Some(to) = filter.to {
        params.push(Box::new(to.format(DATE_FORMAT).to_string()));
        where_clause.push_str(&format!(" AND pu.purchase_date <= ?{}", params.len()));
    }

    let sql = format!(
        "SELECT u.name, p.name, p.price, pu.purchase_date
         FROM purchases pu
         JOIN users u ON u.id = pu.user_id
         JOIN products p ON p.id = pu.product_id
         {where_clause}
         ORDER BY pu.purchase_date DESC, pu.id DESC"
    );

    let conn = pool.get()?;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(params.iter().map(|p| p.as_ref())),
        |row| {
            Ok(Sale {
                user: row.get(0)?,
                product: row.get(1)?,
                price: row.get(2)?,
                date: row.get(3)?,
            })
        },
    )?;
    let sales: Result<Vec<_>, _> = rows.collect();
    Ok(sales?)
}
