use std::collections::BTreeSet;

use serde::Serialize;

use super::*;
use crate::cascade::{CascadeReport, QUOTATION_PLAN};

const QUOTATION_COLUMNS: &str = "id, deal_id, created_by_user_id, number, title, introduction,
        terms, currency, status, subtotal, tax_rate, tax_amount, discount_amount, total,
        valid_until, version, public_token, created_at, updated_at";
const ITEM_COLUMNS: &str = "id, quotation_id, name, description, quantity, unit_price, unit_type,
        line_total, position, created_at, updated_at";

/// Monetary totals derived from a quotation's items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationTotals {
    pub subtotal: f64,
    pub tax_amount: f64,
    pub total: f64,
}

impl QuotationTotals {
    pub fn compute<I>(line_totals: I, tax_rate: f64, discount_amount: f64) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let subtotal: f64 = line_totals.into_iter().sum();
        let tax_amount = if tax_rate > 0.0 {
            subtotal * tax_rate / 100.0
        } else {
            0.0
        };
        Self {
            subtotal,
            tax_amount,
            total: subtotal + tax_amount - discount_amount,
        }
    }
}

/// `QUO-<year>-` prefix shared by every number issued in that year.
pub fn quotation_number_prefix(year: i32) -> String {
    format!("QUO-{}-", year)
}

impl CrmDb {
    // =========================================================================
    // Quotations
    // =========================================================================

    fn upsert_quotation(&self, q: &Quotation) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO quotations (
                id, deal_id, created_by_user_id, number, title, introduction,
                terms, currency, status, subtotal, tax_rate, tax_amount, discount_amount, total,
                valid_until, version, public_token, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                       ?15, ?16, ?17, ?18, ?19)
             ON CONFLICT(id) DO UPDATE SET
                deal_id = excluded.deal_id,
                created_by_user_id = excluded.created_by_user_id,
                number = excluded.number,
                title = excluded.title,
                introduction = excluded.introduction,
                terms = excluded.terms,
                currency = excluded.currency,
                status = excluded.status,
                tax_rate = excluded.tax_rate,
                discount_amount = excluded.discount_amount,
                valid_until = excluded.valid_until,
                version = excluded.version,
                public_token = excluded.public_token,
                updated_at = excluded.updated_at",
            params![
                q.id,
                q.deal_id,
                q.created_by_user_id,
                q.number,
                q.title,
                q.introduction,
                q.terms,
                q.currency,
                q.status,
                q.subtotal,
                q.tax_rate,
                q.tax_amount,
                q.discount_amount,
                q.total,
                opt_ts(&q.valid_until),
                q.version,
                q.public_token,
                ts(&q.created_at),
                ts(&q.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Write a quotation and recompute its totals from the stored items in
    /// the same transaction. Caller-supplied totals are never kept.
    pub fn save_quotation(&self, q: &Quotation) -> Result<Quotation, DbError> {
        self.with_transaction(|db| {
            db.upsert_quotation(q)?;
            db.recalc_quotation_totals(&q.id)?;
            db.get_quotation(&q.id)?
                .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        })
    }

    pub fn get_quotation(&self, id: &str) -> Result<Option<Quotation>, DbError> {
        self.first_row(
            &format!("SELECT {QUOTATION_COLUMNS} FROM quotations WHERE id = ?1"),
            params![id],
            Self::map_quotation_row,
        )
    }

    pub fn get_quotation_by_number(&self, number: &str) -> Result<Option<Quotation>, DbError> {
        self.first_row(
            &format!("SELECT {QUOTATION_COLUMNS} FROM quotations WHERE number = ?1"),
            params![number],
            Self::map_quotation_row,
        )
    }

    pub fn list_quotations(&self) -> Result<Vec<Quotation>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {QUOTATION_COLUMNS} FROM quotations ORDER BY created_at DESC, rowid DESC"
            ),
            [],
            Self::map_quotation_row,
        )
    }

    pub fn list_quotations_for_deal(&self, deal_id: &str) -> Result<Vec<Quotation>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {QUOTATION_COLUMNS} FROM quotations WHERE deal_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ),
            params![deal_id],
            Self::map_quotation_row,
        )
    }

    /// Next free number for `year`: one past the highest sequence already
    /// issued under the `QUO-<year>-` prefix, padded to at least 3 digits.
    /// Sequences compare numerically, so `QUO-2024-1000` follows `-999`.
    pub fn next_quotation_number(&self, year: i32) -> Result<String, DbError> {
        let prefix = quotation_number_prefix(year);
        let numbers: Vec<String> = self.collect_rows(
            "SELECT number FROM quotations WHERE substr(number, 1, length(?1)) = ?1",
            params![prefix],
            |row| row.get(0),
        )?;

        let highest = numbers
            .iter()
            .filter_map(|n| n.strip_prefix(&prefix))
            .filter(|seq| !seq.is_empty() && seq.bytes().all(|b| b.is_ascii_digit()))
            .filter_map(|seq| seq.parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        let next = highest
            .checked_add(1)
            .ok_or_else(|| DbError::SequenceExhausted(format!("quotation numbers {prefix}")))?;
        Ok(format!("{}{:03}", prefix, next))
    }

    /// Recompute subtotal, tax and total from the quotation's current items.
    /// Returns `None` when the quotation does not exist.
    pub fn recalc_quotation_totals(&self, id: &str) -> Result<Option<QuotationTotals>, DbError> {
        self.with_transaction(|db| {
            let rates: Option<(f64, f64)> = db.first_row(
                "SELECT tax_rate, discount_amount FROM quotations WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let Some((tax_rate, discount_amount)) = rates else {
                return Ok(None);
            };

            let line_totals: Vec<f64> = db.collect_rows(
                "SELECT line_total FROM quotation_items WHERE quotation_id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            let totals = QuotationTotals::compute(line_totals, tax_rate, discount_amount);

            db.conn.execute(
                "UPDATE quotations SET subtotal = ?1, tax_amount = ?2, total = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    totals.subtotal,
                    totals.tax_amount,
                    totals.total,
                    ts(&Utc::now()),
                    id
                ],
            )?;
            Ok(Some(totals))
        })
    }

    /// Delete a quotation and its items.
    pub fn delete_quotation(&self, id: &str) -> Result<CascadeReport, DbError> {
        self.run_cascade(&QUOTATION_PLAN, id)
    }

    fn map_quotation_row(row: &rusqlite::Row) -> rusqlite::Result<Quotation> {
        Ok(Quotation {
            id: row.get(0)?,
            deal_id: row.get(1)?,
            created_by_user_id: row
                .get::<_, Option<String>>(2)?
                .filter(|s| !s.is_empty()),
            number: row.get(3)?,
            title: row.get(4)?,
            introduction: row.get(5)?,
            terms: row.get(6)?,
            currency: row.get(7)?,
            status: row.get(8)?,
            subtotal: row.get(9)?,
            tax_rate: row.get(10)?,
            tax_amount: row.get(11)?,
            discount_amount: row.get(12)?,
            total: row.get(13)?,
            valid_until: row_opt_ts(row, 14)?,
            version: row.get(15)?,
            public_token: row.get(16)?,
            created_at: row_ts(row, 17)?,
            updated_at: row_ts(row, 18)?,
        })
    }

    // =========================================================================
    // Quotation items
    // =========================================================================

    fn upsert_quotation_item(&self, item: &QuotationItem) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO quotation_items (
                id, quotation_id, name, description, quantity, unit_price, unit_type,
                line_total, position, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                quotation_id = excluded.quotation_id,
                name = excluded.name,
                description = excluded.description,
                quantity = excluded.quantity,
                unit_price = excluded.unit_price,
                unit_type = excluded.unit_type,
                line_total = excluded.line_total,
                position = excluded.position,
                updated_at = excluded.updated_at",
            params![
                item.id,
                item.quotation_id,
                item.name,
                item.description,
                item.quantity,
                item.unit_price,
                item.unit_type,
                item.line_total,
                item.position,
                ts(&item.created_at),
                ts(&item.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Write an item and recompute its quotation's totals in one transaction.
    ///
    /// Quantity falls back to 1, the line total to quantity × unit price, and
    /// the position to one past the last item. An item moved between
    /// quotations recomputes both.
    pub fn save_quotation_item(&self, draft: &QuotationItemDraft) -> Result<QuotationItem, DbError> {
        self.with_transaction(|db| {
            let existing = db.get_quotation_item(&draft.id)?;
            let now = Utc::now();

            let quantity = match draft.quantity {
                Some(q) if q != 0.0 => q,
                _ => 1.0,
            };
            let line_total = draft.line_total.unwrap_or(quantity * draft.unit_price);
            let position = match draft.position {
                Some(p) if p > 0 => p,
                _ => match existing {
                    Some(ref e) if e.quotation_id == draft.quotation_id => e.position,
                    _ => db.next_item_position(&draft.quotation_id)?,
                },
            };

            let item = QuotationItem {
                id: draft.id.clone(),
                quotation_id: draft.quotation_id.clone(),
                name: draft.name.clone(),
                description: draft.description.clone(),
                quantity,
                unit_price: draft.unit_price,
                unit_type: draft.unit_type.clone(),
                line_total,
                position,
                created_at: existing.as_ref().map(|e| e.created_at).unwrap_or(now),
                updated_at: now,
            };
            db.upsert_quotation_item(&item)?;

            if let Some(ref previous) = existing {
                if previous.quotation_id != item.quotation_id {
                    db.recalc_quotation_totals(&previous.quotation_id)?;
                }
            }
            db.recalc_quotation_totals(&item.quotation_id)?;
            Ok(item)
        })
    }

    pub fn get_quotation_item(&self, id: &str) -> Result<Option<QuotationItem>, DbError> {
        self.first_row(
            &format!("SELECT {ITEM_COLUMNS} FROM quotation_items WHERE id = ?1"),
            params![id],
            Self::map_item_row,
        )
    }

    /// All items, grouped by quotation in position order.
    pub fn list_quotation_items(&self) -> Result<Vec<QuotationItem>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM quotation_items ORDER BY quotation_id, position, rowid"
            ),
            [],
            Self::map_item_row,
        )
    }

    pub fn list_items_for_quotation(&self, quotation_id: &str) -> Result<Vec<QuotationItem>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM quotation_items WHERE quotation_id = ?1
                 ORDER BY position, rowid"
            ),
            params![quotation_id],
            Self::map_item_row,
        )
    }

    pub fn next_item_position(&self, quotation_id: &str) -> Result<i32, DbError> {
        let max: i32 = self.conn.query_row(
            "SELECT COALESCE(MAX(position), 0) FROM quotation_items WHERE quotation_id = ?1",
            params![quotation_id],
            |row| row.get(0),
        )?;
        max.checked_add(1).ok_or_else(|| {
            DbError::SequenceExhausted(format!("item positions of quotation {quotation_id}"))
        })
    }

    /// Delete items and recompute every quotation they belonged to.
    /// Returns the number of items removed.
    pub fn delete_quotation_items(&self, ids: &[String]) -> Result<usize, DbError> {
        self.with_transaction(|db| {
            let mut affected = BTreeSet::new();
            let mut removed = 0;
            for id in ids {
                let Some(item) = db.get_quotation_item(id)? else {
                    continue;
                };
                removed += db
                    .conn
                    .execute("DELETE FROM quotation_items WHERE id = ?1", params![id])?;
                affected.insert(item.quotation_id);
            }
            for quotation_id in &affected {
                db.recalc_quotation_totals(quotation_id)?;
            }
            Ok(removed)
        })
    }

    pub fn delete_quotation_item(&self, id: &str) -> Result<bool, DbError> {
        Ok(self.delete_quotation_items(&[id.to_string()])? > 0)
    }

    fn map_item_row(row: &rusqlite::Row) -> rusqlite::Result<QuotationItem> {
        Ok(QuotationItem {
            id: row.get(0)?,
            quotation_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            quantity: row.get(4)?,
            unit_price: row.get(5)?,
            unit_type: row.get(6)?,
            line_total: row.get(7)?,
            position: row.get(8)?,
            created_at: row_ts(row, 9)?,
            updated_at: row_ts(row, 10)?,
        })
    }
}
