use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{Row, SqliteConnection};

/// Starting number when a tenant has no prior invoices, or when the most
/// recent invoice number carries no trailing digits to continue from.
pub const SEQUENCE_FLOOR: u64 = 1001;

static TRAILING_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)$").expect("trailing digits pattern to compile"));

/// Hands out consecutive invoice numbers for one import invocation.
///
/// The datastore is consulted once at construction; every subsequent number
/// is incremented locally so a multi-thousand-row import does not re-query
/// per row.
#[derive(Debug)]
pub struct InvoiceSequence {
    prefix: String,
    next: u64,
}

impl InvoiceSequence {
    /// Continue the tenant's sequence from its most recently created
    /// invoice-bearing record.
    pub async fn begin(
        conn: &mut SqliteConnection,
        organization_id: &str,
        prefix_template: &str,
    ) -> Result<Self, sqlx::Error> {
        let row = sqlx::query(
            "SELECT invoice_number FROM service_records \
             WHERE organization_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )
        .bind(organization_id)
        .fetch_optional(conn)
        .await?;

        let last = row
            .map(|row| row.try_get::<String, _>("invoice_number"))
            .transpose()?;

        Ok(Self::continuing(last.as_deref(), prefix_template))
    }

    /// Sequence continuing after `last`, with the tenant's prefix template
    /// applied. Exposed for the mapper tests; `begin` is the datastore path.
    pub fn continuing(last: Option<&str>, prefix_template: &str) -> Self {
        Self {
            prefix: render_prefix(prefix_template),
            next: next_number_after(last),
        }
    }

    /// Produce the next invoice number and advance the local counter.
    pub fn next(&mut self) -> String {
        let number = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        number
    }
}

/// Substitute the `{YYYY}` token with the current year.
pub fn render_prefix(template: &str) -> String {
    template.replace("{YYYY}", &Utc::now().year().to_string())
}

fn next_number_after(last: Option<&str>) -> u64 {
    last.and_then(|value| TRAILING_DIGITS.captures(value))
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse::<u64>().ok())
        .map(|n| n + 1)
        .unwrap_or(SEQUENCE_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continues_numeric_suffix() {
        let mut seq = InvoiceSequence::continuing(Some("INV-2025-1042"), "INV-");
        assert_eq!(seq.next(), "INV-1043");
        assert_eq!(seq.next(), "INV-1044");
    }

    #[test]
    fn starts_at_floor_without_prior_invoices() {
        let mut seq = InvoiceSequence::continuing(None, "INV-");
        assert_eq!(seq.next(), "INV-1001");
    }

    #[test]
    fn starts_at_floor_when_suffix_is_not_numeric() {
        let mut seq = InvoiceSequence::continuing(Some("DRAFT-FINAL"), "INV-");
        assert_eq!(seq.next(), "INV-1001");
    }

    #[test]
    fn substitutes_year_token_in_prefix() {
        let year = Utc::now().year().to_string();
        let mut seq = InvoiceSequence::continuing(None, "INV-{YYYY}-");
        assert_eq!(seq.next(), format!("INV-{year}-1001"));
    }

    #[test]
    fn quote_prefix_runs_through_the_same_renderer() {
        let numbering = crate::model::TenantNumbering::default();
        let mut seq = InvoiceSequence::continuing(None, &numbering.quote_prefix);
        assert_eq!(seq.next(), "QTE-1001");
    }
}
