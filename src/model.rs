use serde::{Deserialize, Serialize};

/// Authenticated tenant context resolved by the (out-of-scope) web boundary.
#[derive(Debug, Clone)]
pub struct ImportContext {
    pub organization_id: String,
    pub user_id: String,
}

/// Per-tenant numbering settings, read from tenant settings storage by the
/// caller before an import starts. Prefix templates support a `{YYYY}` token.
#[derive(Debug, Clone)]
pub struct TenantNumbering {
    pub invoice_prefix: String,
    pub quote_prefix: String,
}

impl Default for TenantNumbering {
    fn default() -> Self {
        Self {
            invoice_prefix: "INV-".to_string(),
            quote_prefix: "QTE-".to_string(),
        }
    }
}

/// Counts of rows created by one import invocation.
///
/// `skipped` tallies per-row recoverables (missing parent mapping, unreadable
/// attachment source, noise line items); they are logged but never fail the
/// import.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub vehicles: u64,
    pub customers: u64,
    pub notes: u64,
    pub service_records: u64,
    pub service_parts: u64,
    pub service_labor: u64,
    pub attachments: u64,
    pub payments: u64,
    pub inventory_parts: u64,
    pub skipped: u64,
}

impl ImportSummary {
    /// Body shape for the boundary layer:
    /// `{ "success": true, "imported": { ... } }`.
    pub fn to_response(&self) -> serde_json::Value {
        serde_json::json!({
            "success": true,
            "imported": self,
        })
    }
}
