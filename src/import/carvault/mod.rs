//! CarVault backup import pipeline.
//!
//! A CarVault backup is a zip holding the app's embedded database file plus
//! `images/` and `documents/` trees. The database carries no usable index,
//! so documents are recovered by offset scanning, classified by field
//! presence, and written through one transaction: vehicles first, then notes
//! and service events keyed by the remapped vehicle ids.

pub mod classify;
pub mod codec;
pub mod map;
pub mod scanner;

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use sqlx::{SqliteConnection, SqlitePool};
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::archive::{extract_archive, resolve_backup_root, CARVAULT_DB_FILE};
use crate::import::IMPORT_TIMEOUT;
use crate::model::{ImportContext, ImportSummary, TenantNumbering};
use crate::sequence::InvoiceSequence;
use crate::storage::{AttachmentCategory, AttachmentStore, StoredAttachment};
use crate::{AppError, AppResult};

use map::{NoteRow, ServiceEventRow, VehicleRow};

/// Import a CarVault backup archive for one tenant.
///
/// All-or-nothing: either every mapped row commits or none do. The scratch
/// directory is removed on every exit path.
pub async fn import_carvault_backup(
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
        pipeline = "carvault",
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
            pipeline = "carvault",
            duration_ms = started.elapsed().as_millis() as u64,
            vehicles = summary.vehicles,
            service_records = summary.service_records,
            notes = summary.notes,
            skipped = summary.skipped
        ),
        Err(err) => error!(
            target: "wrenchcloud",
            event = "import_failed",
            pipeline = "carvault",
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
    let root = resolve_backup_root(scratch)?;
    let raw = std::fs::read(root.join(CARVAULT_DB_FILE)).map_err(AppError::from)?;

    let documents = scanner::scan_documents(&raw);
    let classified = classify::classify_documents(documents);
    if classified.vehicles.is_empty() {
        return Err(AppError::new(
            "IMPORT/NO_VEHICLES",
            "no vehicles found in backup",
        ));
    }

    let mut summary = ImportSummary::default();
    let mut tx = pool.begin().await.map_err(AppError::from)?;
    let mut sequence = InvoiceSequence::begin(
        tx.as_mut(),
        &ctx.organization_id,
        &numbering.invoice_prefix,
    )
    .await
    .map_err(AppError::from)?;

    // Foreign vehicle id -> created target id; lives and dies with this call.
    let mut vehicle_ids: HashMap<i64, String> = HashMap::new();

    for foreign in &classified.vehicles {
        let odometer = map::max_mileage_for(&classified.service_events, foreign.id);
        let row = map::map_vehicle(foreign, odometer);
        let image = row.image_file.as_deref().and_then(|file| {
            store.store_file(
                &ctx.organization_id,
                AttachmentCategory::VehicleImages,
                &foreign_key(row.foreign_id),
                &root.join("images").join(file),
            )
        });
        if row.image_file.is_some() && image.is_none() {
            summary.skipped += 1;
        }

        let id = insert_vehicle(tx.as_mut(), ctx, &row, image.as_ref()).await?;
        if let Some(foreign_id) = row.foreign_id {
            vehicle_ids.insert(foreign_id, id);
        }
        summary.vehicles += 1;
    }

    for foreign in &classified.notes {
        let row = map::map_note(foreign);
        let Some(vehicle_id) = vehicle_ids.get(&row.foreign_vehicle_id) else {
            warn!(
                target: "wrenchcloud",
                event = "row_skipped",
                entity = "note",
                reason = "missing_vehicle_mapping",
                foreign_vehicle_id = row.foreign_vehicle_id
            );
            summary.skipped += 1;
            continue;
        };
        insert_note(tx.as_mut(), ctx, vehicle_id, &row).await?;
        summary.notes += 1;
    }

    for foreign in &classified.service_events {
        let row = map::map_service_event(foreign);
        let Some(vehicle_id) = vehicle_ids.get(&row.foreign_vehicle_id) else {
            warn!(
                target: "wrenchcloud",
                event = "row_skipped",
                entity = "service_event",
                reason = "missing_vehicle_mapping",
                foreign_vehicle_id = row.foreign_vehicle_id
            );
            summary.skipped += 1;
            continue;
        };

        let invoice_number = sequence.next();
        let record_id =
            insert_service_record(tx.as_mut(), ctx, vehicle_id, &invoice_number, &row).await?;
        summary.service_records += 1;

        for file in &row.files {
            match store.store_file(
                &ctx.organization_id,
                AttachmentCategory::ServiceFiles,
                &foreign_key(row.foreign_id),
                &root.join(file),
            ) {
                Some(stored) => {
                    insert_service_attachment(
                        tx.as_mut(),
                        &record_id,
                        &stored,
                        AttachmentCategory::ServiceFiles,
                    )
                    .await?;
                    summary.attachments += 1;
                }
                None => summary.skipped += 1,
            }
        }
    }

    tx.commit().await.map_err(AppError::from)?;
    Ok(summary)
}

fn foreign_key(id: Option<i64>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "0".to_string())
}

async fn insert_vehicle(
    conn: &mut SqliteConnection,
    ctx: &ImportContext,
    row: &VehicleRow,
    image: Option<&StoredAttachment>,
) -> AppResult<String> {
    let id = Uuid::now_v7().to_string();
    sqlx::query(
        "INSERT INTO vehicles \
         (id, organization_id, make, model, year, fuel_type, odometer, \
          purchase_price, sold_price, image_path, created_by, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )
    .bind(&id)
    .bind(&ctx.organization_id)
    .bind(&row.make)
    .bind(&row.model)
    .bind(row.year)
    .bind(row.fuel_type.as_str())
    .bind(row.odometer)
    .bind(row.purchase_price)
    .bind(row.sold_price)
    .bind(image.map(|stored| stored.relative_path.as_str()))
    .bind(&ctx.user_id)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(conn)
    .await
    .map_err(AppError::from)?;
    Ok(id)
}

async fn insert_note(
    conn: &mut SqliteConnection,
    ctx: &ImportContext,
    vehicle_id: &str,
    row: &NoteRow,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO notes \
         (id, organization_id, vehicle_id, title, body, pinned, created_by, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(&ctx.organization_id)
    .bind(vehicle_id)
    .bind(&row.title)
    .bind(&row.body)
    .bind(row.pinned)
    .bind(&ctx.user_id)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(conn)
    .await
    .map_err(AppError::from)?;
    Ok(())
}

async fn insert_service_record(
    conn: &mut SqliteConnection,
    ctx: &ImportContext,
    vehicle_id: &str,
    invoice_number: &str,
    row: &ServiceEventRow,
) -> AppResult<String> {
    let id = Uuid::now_v7().to_string();
    sqlx::query(
        "INSERT INTO service_records \
         (id, organization_id, vehicle_id, invoice_number, service_date, odometer, \
          description, notes, subtotal, discount, tax, total, created_by, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 0, ?10, ?11, ?12)",
    )
    .bind(&id)
    .bind(&ctx.organization_id)
    .bind(vehicle_id)
    .bind(invoice_number)
    .bind(row.date.as_deref())
    .bind(row.odometer)
    .bind(&row.description)
    .bind(row.notes.as_deref())
    .bind(row.total)
    .bind(row.total)
    .bind(&ctx.user_id)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(conn)
    .await
    .map_err(AppError::from)?;
    Ok(id)
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
