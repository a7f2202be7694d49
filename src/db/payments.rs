use super::*;

const PAYMENT_COLUMNS: &str = "id, deal_id, title, amount, currency, status, due_at, paid_at,
        method, notes, gil_amount, ric_amount, created_at, updated_at";

impl CrmDb {
    // =========================================================================
    // Payments
    // =========================================================================

    pub fn upsert_payment(&self, payment: &Payment) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO payments (
                id, deal_id, title, amount, currency, status, due_at, paid_at,
                method, notes, gil_amount, ric_amount, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO UPDATE SET
                deal_id = excluded.deal_id,
                title = excluded.title,
                amount = excluded.amount,
                currency = excluded.currency,
                status = excluded.status,
                due_at = excluded.due_at,
                paid_at = excluded.paid_at,
                method = excluded.method,
                notes = excluded.notes,
                gil_amount = excluded.gil_amount,
                ric_amount = excluded.ric_amount,
                updated_at = excluded.updated_at",
            params![
                payment.id,
                payment.deal_id,
                payment.title,
                payment.amount,
                payment.currency,
                payment.status,
                opt_ts(&payment.due_at),
                opt_ts(&payment.paid_at),
                payment.method,
                payment.notes,
                payment.gil_amount,
                payment.ric_amount,
                ts(&payment.created_at),
                ts(&payment.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_payment(&self, id: &str) -> Result<Option<Payment>, DbError> {
        self.first_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
            params![id],
            Self::map_payment_row,
        )
    }

    pub fn list_payments(&self) -> Result<Vec<Payment>, DbError> {
        self.collect_rows(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY created_at DESC, rowid DESC"),
            [],
            Self::map_payment_row,
        )
    }

    pub fn list_payments_for_deal(&self, deal_id: &str) -> Result<Vec<Payment>, DbError> {
        self.collect_rows(
            &format!(
                "SELECT {PAYMENT_COLUMNS} FROM payments WHERE deal_id = ?1
                 ORDER BY created_at DESC, rowid DESC"
            ),
            params![deal_id],
            Self::map_payment_row,
        )
    }

    /// Returns whether a row was removed.
    pub fn delete_payment(&self, id: &str) -> Result<bool, DbError> {
        let rows = self
            .conn
            .execute("DELETE FROM payments WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn map_payment_row(row: &rusqlite::Row) -> rusqlite::Result<Payment> {
        Ok(Payment {
            id: row.get(0)?,
            deal_id: row.get(1)?,
            title: row.get(2)?,
            amount: row.get(3)?,
            currency: row.get(4)?,
            status: row.get(5)?,
            due_at: row_opt_ts(row, 6)?,
            paid_at: row_opt_ts(row, 7)?,
            method: row.get(8)?,
            notes: row.get(9)?,
            gil_amount: row.get(10)?,
            ric_amount: row.get(11)?,
            created_at: row_ts(row, 12)?,
            updated_at: row_ts(row, 13)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_utils::test_db;
    use crate::db::*;
    use crate::test_fixtures::*;

    #[test]
    fn test_payments_by_deal() {
        let db = test_db();
        let mut p = payment("p1", "d1", 100.0);
        p.status = PaymentStatus::Planned;
        p.due_at = Some(at(2024, 6, 1));
        db.upsert_payment(&p).unwrap();
        db.upsert_payment(&payment("p2", "d2", 50.0)).unwrap();

        let for_deal = db.list_payments_for_deal("d1").unwrap();
        assert_eq!(for_deal.len(), 1);
        assert_eq!(for_deal[0].status, PaymentStatus::Planned);
        assert_eq!(for_deal[0].due_at, Some(at(2024, 6, 1)));
        assert_eq!(for_deal[0].paid_at, None);

        assert!(db.delete_payment("p1").unwrap());
        assert!(!db.delete_payment("p1").unwrap());
        assert_eq!(db.list_payments().unwrap().len(), 1);
    }
}
