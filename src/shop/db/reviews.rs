use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};
use sportshub_common::Review;

use super::ShopDb;
use crate::errors::ShopError;

const REVIEW_COLUMNS: &str = "id, user_id, product_id, rating, comment, created_at, updated_at";

fn check_rating(rating: i64) -> Result<()> {
    if !Review::rating_in_range(rating) {
        return Err(ShopError::validation(format!(
            "rating must be between {} and {}",
            Review::MIN_RATING,
            Review::MAX_RATING
        ))
        .into());
    }
    Ok(())
}

impl ShopDb {
    // ── Reviews ───────────────────────────────────────────────────────

    pub fn create_review(
        &self,
        product_id: i64,
        user_id: i64,
        rating: i64,
        comment: &str,
    ) -> Result<Review> {
        check_rating(rating)?;
        self.require_user(user_id)?;
        self.require_product(product_id)?;

        let exists: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM reviews WHERE user_id = ?1 AND product_id = ?2)",
                params![user_id, product_id],
                |row| row.get(0),
            )
            .context("Failed to check for existing review")?;
        if exists {
            return Err(ShopError::DuplicateReview {
                user_id,
                product_id,
            }
            .into());
        }

        self.conn
            .execute(
                "INSERT INTO reviews (user_id, product_id, rating, comment) VALUES (?1, ?2, ?3, ?4)",
                params![user_id, product_id, rating, comment.trim()],
            )
            .context("Failed to insert review")?;
        let id = self.conn.last_insert_rowid();
        self.get_review(id)?
            .context("Review not found after insert")
    }

    pub fn get_review(&self, id: i64) -> Result<Option<Review>> {
        self.conn
            .query_row(
                &format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?1"),
                params![id],
                read_review_row,
            )
            .optional()
            .context("Failed to query review")
    }

    /// Reviews for a product, newest first.
    pub fn list_product_reviews(&self, product_id: i64) -> Result<Vec<Review>> {
        self.require_product(product_id)?;
        self.query_reviews(
            &format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE product_id = ?1 ORDER BY id DESC"),
            product_id,
        )
    }

    pub fn list_user_reviews(&self, user_id: i64) -> Result<Vec<Review>> {
        self.require_user(user_id)?;
        self.query_reviews(
            &format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE user_id = ?1 ORDER BY id DESC"),
            user_id,
        )
    }

    pub fn update_review(
        &self,
        id: i64,
        rating: Option<i64>,
        comment: Option<&str>,
    ) -> Result<Review> {
        if let Some(r) = rating {
            check_rating(r)?;
        }
        let count = self
            .conn
            .execute(
                "UPDATE reviews SET rating = COALESCE(?1, rating), comment = COALESCE(?2, comment),
                 updated_at = datetime('now') WHERE id = ?3",
                params![rating, comment.map(str::trim), id],
            )
            .context("Failed to update review")?;
        if count == 0 {
            return Err(ShopError::ReviewNotFound { id }.into());
        }
        self.get_review(id)?
            .context("Review not found after update")
    }

    pub fn delete_review(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM reviews WHERE id = ?1", params![id])
            .context("Failed to delete review")?;
        Ok(count > 0)
    }

    fn query_reviews(&self, sql: &str, key: i64) -> Result<Vec<Review>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .context("Failed to prepare review query")?;
        let rows = stmt
            .query_map(params![key], read_review_row)
            .context("Failed to query reviews")?;
        let mut reviews = Vec::new();
        for row in rows {
            reviews.push(row.context("Failed to read review row")?);
        }
        Ok(reviews)
    }
}

fn read_review_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        user_id: row.get(1)?,
        product_id: row.get(2)?,
        rating: row.get(3)?,
        comment: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
