use std::str::FromStr;

use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};
use sportshub_common::{HelpTicket, TicketDetail, TicketResponse, TicketStatus};

use super::{ShopDb, required};
use crate::errors::ShopError;

const TICKET_COLUMNS: &str = "id, user_id, subject, message, status, created_at, updated_at";

impl ShopDb {
    // ── Help tickets ──────────────────────────────────────────────────

    pub fn create_ticket(&self, user_id: i64, subject: &str, message: &str) -> Result<HelpTicket> {
        self.require_user(user_id)?;
        let subject = required("subject", subject)?;
        let message = required("message", message)?;
        self.conn
            .execute(
                "INSERT INTO help_tickets (user_id, subject, message, status) VALUES (?1, ?2, ?3, ?4)",
                params![user_id, subject, message, TicketStatus::Open.as_str()],
            )
            .context("Failed to insert help ticket")?;
        let id = self.conn.last_insert_rowid();
        self.get_ticket(id)?
            .context("Help ticket not found after insert")
    }

    pub fn get_ticket(&self, id: i64) -> Result<Option<HelpTicket>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {TICKET_COLUMNS} FROM help_tickets WHERE id = ?1"),
                params![id],
                read_ticket_row,
            )
            .optional()
            .context("Failed to query help ticket")?;
        row.map(TicketRow::into_ticket).transpose()
    }

    /// The ticket with its response thread in creation order.
    pub fn get_ticket_detail(&self, id: i64) -> Result<Option<TicketDetail>> {
        let ticket = match self.get_ticket(id)? {
            Some(t) => t,
            None => return Ok(None),
        };
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, ticket_id, author_id, message, created_at
                 FROM ticket_responses WHERE ticket_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare ticket responses query")?;
        let rows = stmt
            .query_map(params![id], read_response_row)
            .context("Failed to query ticket responses")?;
        let mut responses = Vec::new();
        for row in rows {
            responses.push(row.context("Failed to read ticket response row")?);
        }
        Ok(Some(TicketDetail { ticket, responses }))
    }

    pub fn list_user_tickets(&self, user_id: i64) -> Result<Vec<HelpTicket>> {
        self.require_user(user_id)?;
        self.query_tickets(
            &format!("SELECT {TICKET_COLUMNS} FROM help_tickets WHERE user_id = ?1 ORDER BY id DESC"),
            params![user_id],
        )
    }

    pub fn list_tickets(&self, status: Option<TicketStatus>) -> Result<Vec<HelpTicket>> {
        self.query_tickets(
            &format!(
                "SELECT {TICKET_COLUMNS} FROM help_tickets WHERE (?1 IS NULL OR status = ?1) ORDER BY id DESC"
            ),
            params![status.map(|s| s.as_str())],
        )
    }

    /// Append a response to an open ticket and bump the ticket's `updated_at`.
    pub fn add_ticket_response(
        &self,
        ticket_id: i64,
        author_id: i64,
        message: &str,
    ) -> Result<TicketResponse> {
        let message = required("message", message)?;
        let ticket = self
            .get_ticket(ticket_id)?
            .ok_or(ShopError::TicketNotFound { id: ticket_id })?;
        if ticket.status.is_closed() {
            return Err(ShopError::TicketClosed { id: ticket_id }.into());
        }
        self.require_user(author_id)?;

        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin response transaction")?;
        tx.execute(
            "INSERT INTO ticket_responses (ticket_id, author_id, message) VALUES (?1, ?2, ?3)",
            params![ticket_id, author_id, message],
        )
        .context("Failed to insert ticket response")?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE help_tickets SET updated_at = datetime('now') WHERE id = ?1",
            params![ticket_id],
        )
        .context("Failed to touch help ticket")?;
        tx.commit().context("Failed to commit ticket response")?;

        self.conn
            .query_row(
                "SELECT id, ticket_id, author_id, message, created_at FROM ticket_responses WHERE id = ?1",
                params![id],
                read_response_row,
            )
            .context("Ticket response not found after insert")
    }

    /// Set a ticket's status. Any status may follow any other, so a closed
    /// ticket can be reopened. Returns the previous status with the ticket.
    pub fn set_ticket_status(
        &self,
        id: i64,
        status: TicketStatus,
    ) -> Result<(TicketStatus, HelpTicket)> {
        let ticket = self
            .get_ticket(id)?
            .ok_or(ShopError::TicketNotFound { id })?;
        self.conn
            .execute(
                "UPDATE help_tickets SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![status.as_str(), id],
            )
            .context("Failed to update help ticket status")?;
        let updated = self
            .get_ticket(id)?
            .context("Help ticket not found after status update")?;
        Ok((ticket.status, updated))
    }

    fn query_tickets(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<HelpTicket>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .context("Failed to prepare help ticket query")?;
        let rows = stmt
            .query_map(params, read_ticket_row)
            .context("Failed to query help tickets")?;
        let mut tickets = Vec::new();
        for row in rows {
            tickets.push(row.context("Failed to read help ticket row")?.into_ticket()?);
        }
        Ok(tickets)
    }
}

struct TicketRow {
    id: i64,
    user_id: i64,
    subject: String,
    message: String,
    status: String,
    created_at: String,
    updated_at: String,
}

fn read_ticket_row(row: &Row<'_>) -> rusqlite::Result<TicketRow> {
    Ok(TicketRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        subject: row.get(2)?,
        message: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl TicketRow {
    fn into_ticket(self) -> Result<HelpTicket> {
        let status = TicketStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse ticket status")?;
        Ok(HelpTicket {
            id: self.id,
            user_id: self.user_id,
            subject: self.subject,
            message: self.message,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn read_response_row(row: &Row<'_>) -> rusqlite::Result<TicketResponse> {
    Ok(TicketResponse {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        author_id: row.get(2)?,
        message: row.get(3)?,
        created_at: row.get(4)?,
    })
}
