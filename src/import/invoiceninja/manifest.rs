//! Typed decode of the Invoice Ninja export manifest.
//!
//! The export is a zip whose `backup.json` holds the foreign collections.
//! Soft-deleted rows are filtered here, before anything reaches the mapper;
//! the only hard structural requirement is a `clients` list at the root.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::AppError;

/// Manifest file at the root of the export archive.
pub const MANIFEST_FILE: &str = "backup.json";

/// Attachable type marking a document as belonging to an invoice.
const INVOICE_ATTACHABLE: &str = "invoices";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("backup.json not found in export archive")]
    Missing,
    #[error("failed to read export manifest: {0}")]
    Read(#[from] std::io::Error),
    #[error("export manifest is not valid json: {0}")]
    Parse(String),
    #[error("export manifest has no clients collection")]
    MissingClients,
}

impl From<ManifestError> for AppError {
    fn from(err: ManifestError) -> Self {
        let code = match &err {
            ManifestError::Missing => "IMPORT/MANIFEST_MISSING",
            ManifestError::Parse(_) | ManifestError::MissingClients => "IMPORT/MANIFEST_INVALID",
            ManifestError::Read(_) => "IO/MANIFEST",
        };
        AppError::new(code, err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignContact {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignClient {
    #[serde(default)]
    pub hashed_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub contacts: Vec<ForeignContact>,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignProduct {
    #[serde(default)]
    pub product_key: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub price: Value,
    #[serde(default)]
    pub cost: Value,
    #[serde(default)]
    pub in_stock_quantity: Value,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignLineItem {
    /// Kind discriminator: "1" products/parts, "2" labor.
    #[serde(default)]
    pub type_id: Value,
    #[serde(default)]
    pub product_key: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub quantity: Value,
    #[serde(default)]
    pub cost: Value,
    #[serde(default)]
    pub line_total: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignInvoice {
    #[serde(default)]
    pub hashed_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub amount: Value,
    #[serde(default)]
    pub discount: Value,
    #[serde(default)]
    pub is_amount_discount: bool,
    #[serde(default)]
    pub public_notes: Option<String>,
    #[serde(default)]
    pub line_items: Vec<ForeignLineItem>,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignPaymentable {
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub amount: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignPayment {
    #[serde(default)]
    pub hashed_id: String,
    #[serde(default)]
    pub type_id: Value,
    #[serde(default)]
    pub amount: Value,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub transaction_reference: Option<String>,
    #[serde(default)]
    pub paymentables: Vec<ForeignPaymentable>,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignDocument {
    #[serde(default)]
    pub hashed_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Path of the file inside the export archive.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub documentable_type: Option<String>,
    #[serde(default)]
    pub documentable_id: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
}

/// The decoded export, soft-deleted rows already filtered out.
#[derive(Debug, Clone, Deserialize)]
pub struct NinjaExport {
    pub clients: Vec<ForeignClient>,
    #[serde(default)]
    pub products: Vec<ForeignProduct>,
    #[serde(default)]
    pub invoices: Vec<ForeignInvoice>,
    #[serde(default)]
    pub payments: Vec<ForeignPayment>,
    #[serde(default)]
    pub documents: Vec<ForeignDocument>,
}

impl NinjaExport {
    /// Lookup from invoice hashed id to its attached documents, filtered to
    /// the invoice attachable type.
    pub fn documents_by_invoice(&self) -> HashMap<&str, Vec<&ForeignDocument>> {
        let mut index: HashMap<&str, Vec<&ForeignDocument>> = HashMap::new();
        for document in &self.documents {
            if document.documentable_type.as_deref() != Some(INVOICE_ATTACHABLE) {
                continue;
            }
            if let Some(invoice_id) = document.documentable_id.as_deref() {
                index.entry(invoice_id).or_default().push(document);
            }
        }
        index
    }
}

/// Load and decode the manifest from an extracted export archive.
pub fn load_manifest(scratch: &Path) -> Result<NinjaExport, ManifestError> {
    let path = scratch.join(MANIFEST_FILE);
    if !path.is_file() {
        return Err(ManifestError::Missing);
    }
    let text = fs::read_to_string(&path)?;
    decode_manifest(&text)
}

/// Decode the manifest body. Fails fast when the root clients collection is
/// missing or not a list; everything else degrades per collection.
pub fn decode_manifest(text: &str) -> Result<NinjaExport, ManifestError> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| ManifestError::Parse(err.to_string()))?;
    match value.get("clients") {
        Some(Value::Array(_)) => {}
        _ => return Err(ManifestError::MissingClients),
    }

    let mut export: NinjaExport =
        serde_json::from_value(value).map_err(|err| ManifestError::Parse(err.to_string()))?;

    export.clients.retain(|row| !row.is_deleted);
    for client in &mut export.clients {
        client.contacts.retain(|row| !row.is_deleted);
    }
    export.products.retain(|row| !row.is_deleted);
    export.invoices.retain(|row| !row.is_deleted);
    export.payments.retain(|row| !row.is_deleted);
    export.documents.retain(|row| !row.is_deleted);

    Ok(export)
}
