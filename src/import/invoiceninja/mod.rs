//! Invoice Ninja export import pipeline.
//!
//! The export is a zip with a `backup.json` manifest and the attached
//! document files. Decode is typed rather than scanned; the write path is the
//! same single-transaction shape as the binary pipeline: customers and the
//! placeholder vehicle first, then invoices with their lines and documents,
//! then payment allocations keyed by the remapped invoice ids.

pub mod manifest;
pub mod map;

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use sqlx::{SqliteConnection, SqlitePool};
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::archive::extract_archive;
use crate::import::IMPORT_TIMEOUT;
use crate::model::{ImportContext, ImportSummary, TenantNumbering};
use crate::sequence::InvoiceSequence;
use crate::storage::{AttachmentCategory, AttachmentStore, StoredAttachment};
use crate::{AppError, AppResult};

use map::{CustomerRow, InventoryRow, InvoiceTotals, LineRow, PaymentRow};

/// Import an Invoice Ninja export archive for one tenant.
///
/// All-or-nothing: either every mapped row commits or none do. The scratch
/// directory is removed on every exit path.
pub async fn import_ninja_export(
    pool: &SqlitePool,
    store: &AttachmentStore,
    ctx: &ImportContext,
    numbering: &TenantNumbering,
    archive_bytes: &[u8],
) -> AppResult<ImportSummary> {
    let started = Instant::now();
    info!(
        target: "wrenchcloud",
        event = "import_started",
        pipeline = "invoiceninja",
        organization_id = %ctx.organization_id,
        bytes = archive_bytes.len()
    );

    let scratch = extract_archive(archive_bytes)?;
    let result = match timeout(
        IMPORT_TIMEOUT,
        run(pool, store, ctx, numbering, scratch.path()),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(AppError::new(
            "IMPORT/TIMEOUT",
            "import exceeded the allowed time",
        )),
    };

    match &result {
        Ok(summary) => info!(
            target: "wrenchcloud",
            event = "import_done",
            pipeline = "invoiceninja",
            duration_ms = started.elapsed().as_millis() as u64,
            customers = summary.customers,
            service_records = summary.service_records,
            payments = summary.payments,
            skipped = summary.skipped
        ),
        Err(err) => error!(
            target: "wrenchcloud",
            event = "import_failed",
            pipeline = "invoiceninja",
            code = err.code(),
            error = %err
        ),
    }

    result
    // scratch drops here; cleanup runs for success and for every error path
}

async fn run(
    pool: &SqlitePool,
    store: &AttachmentStore,
    ctx: &ImportContext,
    numbering: &TenantNumbering,
    scratch: &Path,
) -> AppResult<ImportSummary> {
    let export = manifest::load_manifest(scratch)?;
    if export.clients.is_empty() {
        return Err(AppError::new(
            "IMPORT/NO_CLIENTS",
            "no clients found in export",
        ));
    }
    let documents = export.documents_by_invoice();

    let mut summary = ImportSummary::default();
    let mut tx = pool.begin().await.map_err(AppError::from)?;

    // The schema hangs every service record off a vehicle, which the foreign
    // system does not model. All imported records share one placeholder.
    let placeholder_vehicle_id = insert_placeholder_vehicle(tx.as_mut(), ctx).await?;

    // Foreign hashed id -> created target id; lives and dies with this call.
    let mut customer_ids: HashMap<&str, String> = HashMap::new();
    for client in &export.clients {
        let row = map::map_client(client);
        let id = insert_customer(tx.as_mut(), ctx, &row).await?;
        customer_ids.insert(client.hashed_id.as_str(), id);
        summary.customers += 1;
    }

    for product in &export.products {
        let row = map::map_product(product);
        insert_inventory_part(tx.as_mut(), ctx, &row).await?;
        summary.inventory_parts += 1;
    }

    let mut sequence = InvoiceSequence::begin(
        tx.as_mut(),
        &ctx.organization_id,
        &numbering.invoice_prefix,
    )
    .await
    .map_err(AppError::from)?;

    let mut invoice_ids: HashMap<&str, String> = HashMap::new();
    for invoice in &export.invoices {
        let customer_id = match invoice.client_id.as_deref() {
            Some(client_id) => match customer_ids.get(client_id) {
                Some(id) => Some(id.clone()),
                None => {
                    warn!(
                        target: "wrenchcloud",
                        event = "row_skipped",
                        entity = "invoice",
                        reason = "missing_client_mapping",
                        foreign_client_id = client_id
                    );
                    summary.skipped += 1;
                    continue;
                }
            },
            None => None,
        };

        let (parts, labor, dropped) = map::split_line_items(invoice);
        summary.skipped += dropped;
        let lines: Vec<&LineRow> = parts.iter().chain(labor.iter()).collect();
        let totals = map::reconcile_totals(invoice, &lines);

        // Foreign numbers are kept when present; blanks continue the
        // tenant's sequence.
        let invoice_number = invoice
            .number
            .as_deref()
            .map(str::trim)
            .filter(|number| !number.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| sequence.next());

        let record_id = insert_service_record(
            tx.as_mut(),
            ctx,
            &placeholder_vehicle_id,
            customer_id.as_deref(),
            &invoice_number,
            invoice.date.as_deref(),
            invoice.public_notes.as_deref(),
            &totals,
        )
        .await?;
        summary.service_records += 1;

        for part in &parts {
            insert_service_part(tx.as_mut(), &record_id, part).await?;
            summary.service_parts += 1;
        }
        for line in &labor {
            insert_service_labor(tx.as_mut(), &record_id, line).await?;
            summary.service_labor += 1;
        }

        for document in documents
            .get(invoice.hashed_id.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default()
        {
            let Some(source) = document
                .url
                .as_deref()
                .or(document.name.as_deref())
                .filter(|path| !path.is_empty())
            else {
                summary.skipped += 1;
                continue;
            };
            match store.store_file(
                &ctx.organization_id,
                AttachmentCategory::InvoiceDocuments,
                &invoice.hashed_id,
                &scratch.join(source),
            ) {
                Some(stored) => {
                    insert_service_attachment(
                        tx.as_mut(),
                        &record_id,
                        &stored,
                        AttachmentCategory::InvoiceDocuments,
                    )
                    .await?;
                    summary.attachments += 1;
                }
                None => summary.skipped += 1,
            }
        }

        invoice_ids.insert(invoice.hashed_id.as_str(), record_id);
    }

    for payment in &export.payments {
        let (rows, dropped) = map::map_payment(payment);
        summary.skipped += dropped;
        for row in rows {
            let Some(record_id) = invoice_ids.get(row.foreign_invoice_id.as_str()) else {
                warn!(
                    target: "wrenchcloud",
                    event = "row_skipped",
                    entity = "payment",
                    reason = "missing_invoice_mapping",
                    foreign_invoice_id = %row.foreign_invoice_id
                );
                summary.skipped += 1;
                continue;
            };
            insert_payment(tx.as_mut(), ctx, record_id, &row).await?;
            summary.payments += 1;
        }
    }

    tx.commit().await.map_err(AppError::from)?;
    Ok(summary)
}

async fn insert_placeholder_vehicle(
    conn: &mut SqliteConnection,
    ctx: &ImportContext,
) -> AppResult<String> {
    let id = Uuid::now_v7().to_string();
    sqlx::query(
        "INSERT INTO vehicles \
         (id, organization_id, make, model, year, fuel_type, created_by, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(&id)
    .bind(&ctx.organization_id)
    .bind("Imported")
    .bind("Unassigned")
    .bind(0i64)
    .bind("gasoline")
    .bind(&ctx.user_id)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(conn)
    .await
    .map_err(AppError::from)?;
    Ok(id)
}

async fn insert_customer(
    conn: &mut SqliteConnection,
    ctx: &ImportContext,
    row: &CustomerRow,
) -> AppResult<String> {
    let id = Uuid::now_v7().to_string();
    sqlx::query(
        "INSERT INTO customers \
         (id, organization_id, name, email, phone, address, created_by, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(&id)
    .bind(&ctx.organization_id)
    .bind(&row.name)
    .bind(row.email.as_deref())
    .bind(row.phone.as_deref())
    .bind(row.address.as_deref())
    .bind(&ctx.user_id)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(conn)
    .await
    .map_err(AppError::from)?;
    Ok(id)
}

async fn insert_inventory_part(
    conn: &mut SqliteConnection,
    ctx: &ImportContext,
    row: &InventoryRow,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO inventory_parts \
         (id, organization_id, name, sku, price, cost, quantity, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(&ctx.organization_id)
    .bind(&row.name)
    .bind(row.sku.as_deref())
    .bind(row.price)
    .bind(row.cost)
    .bind(row.quantity)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(conn)
    .await
    .map_err(AppError::from)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn insert_service_record(
    conn: &mut SqliteConnection,
    ctx: &ImportContext,
    vehicle_id: &str,
    customer_id: Option<&str>,
    invoice_number: &str,
    service_date: Option<&str>,
    notes: Option<&str>,
    totals: &InvoiceTotals,
) -> AppResult<String> {
    let id = Uuid::now_v7().to_string();
    sqlx::query(
        "INSERT INTO service_records \
         (id, organization_id, vehicle_id, customer_id, invoice_number, service_date, \
          description, notes, subtotal, discount, tax, total, created_by, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    )
    .bind(&id)
    .bind(&ctx.organization_id)
    .bind(vehicle_id)
    .bind(customer_id)
    .bind(invoice_number)
    .bind(service_date)
    .bind("Imported invoice")
    .bind(notes)
    .bind(totals.subtotal)
    .bind(totals.discount)
    .bind(totals.tax)
    .bind(totals.total)
    .bind(&ctx.user_id)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(conn)
    .await
    .map_err(AppError::from)?;
    Ok(id)
}

async fn insert_service_part(
    conn: &mut SqliteConnection,
    service_record_id: &str,
    row: &LineRow,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO service_parts \
         (id, service_record_id, description, quantity, unit_price, total) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(service_record_id)
    .bind(&row.description)
    .bind(row.quantity)
    .bind(row.unit_price)
    .bind(row.total)
    .execute(conn)
    .await
    .map_err(AppError::from)?;
    Ok(())
}

async fn insert_service_labor(
    conn: &mut SqliteConnection,
    service_record_id: &str,
    row: &LineRow,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO service_labor \
         (id, service_record_id, description, hours, rate, total) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(service_record_id)
    .bind(&row.description)
    .bind(row.quantity)
    .bind(row.unit_price)
    .bind(row.total)
    .execute(conn)
    .await
    .map_err(AppError::from)?;
    Ok(())
}

async fn insert_service_attachment(
    conn: &mut SqliteConnection,
    service_record_id: &str,
    stored: &StoredAttachment,
    category: AttachmentCategory,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO service_attachments \
         (id, service_record_id, file_name, relative_path, mime_type, size_bytes, category) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(service_record_id)
    .bind(&stored.file_name)
    .bind(&stored.relative_path)
    .bind(&stored.mime_type)
    .bind(stored.size_bytes as i64)
    .bind(category.as_str())
    .execute(conn)
    .await
    .map_err(AppError::from)?;
    Ok(())
}

async fn insert_payment(
    conn: &mut SqliteConnection,
    ctx: &ImportContext,
    service_record_id: &str,
    row: &PaymentRow,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO payments \
         (id, organization_id, service_record_id, method, amount, paid_at, reference, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(&ctx.organization_id)
    .bind(service_record_id)
    .bind(row.method.as_str())
    .bind(row.amount)
    .bind(row.date.as_deref())
    .bind(row.reference.as_deref())
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(conn)
    .await
    .map_err(AppError::from)?;
    Ok(())
}
