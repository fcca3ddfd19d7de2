use std::io::{Cursor, Write};

use serde_json::json;
use sqlx::Row;
use tempfile::tempdir;
use zip::write::FileOptions;

use wrenchcloud_import::db::open_memory_pool;
use wrenchcloud_import::import::invoiceninja::import_ninja_export;
use wrenchcloud_import::logging;
use wrenchcloud_import::migrate::apply_migrations;
use wrenchcloud_import::storage::AttachmentStore;
use wrenchcloud_import::{ImportContext, TenantNumbering};

fn ctx() -> ImportContext {
    logging::init();
    ImportContext {
        organization_id: "org-1".to_string(),
        user_id: "user-1".to_string(),
    }
}

fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, FileOptions::default())
            .expect("start zip entry");
        writer.write_all(data).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

fn export_archive(manifest: serde_json::Value, files: &[(&str, &[u8])]) -> Vec<u8> {
    let body = manifest.to_string();
    let mut entries: Vec<(&str, &[u8])> = vec![("backup.json", body.as_bytes())];
    entries.extend_from_slice(files);
    zip_with(&entries)
}

#[tokio::test]
async fn imports_export_end_to_end() {
    let pool = open_memory_pool().await.unwrap();
    apply_migrations(&pool).await.unwrap();
    let base = tempdir().unwrap();
    let store = AttachmentStore::new(base.path());

    let manifest = json!({
        "clients": [{
            "hashed_id": "c1",
            "name": "Pat's Garage",
            "address1": "1 High St",
            "city": "Arklow",
            "contacts": [{"first_name": "Pat", "last_name": "Byrne", "email": "pat@garage.test"}],
        }],
        "products": [{
            "product_key": "OIL-5W30",
            "price": 29.99,
            "cost": 18.0,
            "in_stock_quantity": 12,
        }],
        "invoices": [{
            "hashed_id": "i1",
            "client_id": "c1",
            "number": "0027",
            "date": "2026-02-01",
            "amount": 130.0,
            "line_items": [
                {"type_id": "1", "product_key": "OIL-5W30", "quantity": 2, "cost": 25.0, "line_total": 50.0},
                {"type_id": "2", "notes": "Labor: oil change", "quantity": 1, "cost": 80.0, "line_total": 80.0},
                {"type_id": "1", "quantity": 0, "cost": 0},
            ],
        }],
        "payments": [{
            "hashed_id": "p1",
            "type_id": 3,
            "date": "2026-02-03",
            "transaction_reference": "ch_123",
            "paymentables": [{"invoice_id": "i1", "amount": 130.0}],
        }],
        "documents": [{
            "hashed_id": "d1",
            "name": "receipt.pdf",
            "url": "documents/receipt.pdf",
            "documentable_type": "invoices",
            "documentable_id": "i1",
        }],
    });
    let archive = export_archive(manifest, &[("documents/receipt.pdf", b"pdf bytes")]);

    let summary = import_ninja_export(&pool, &store, &ctx(), &TenantNumbering::default(), &archive)
        .await
        .unwrap();

    assert_eq!(summary.customers, 1);
    assert_eq!(summary.inventory_parts, 1);
    assert_eq!(summary.service_records, 1);
    assert_eq!(summary.service_parts, 1);
    assert_eq!(summary.service_labor, 1);
    assert_eq!(summary.attachments, 1);
    assert_eq!(summary.payments, 1);
    // The empty zero-value line item is noise.
    assert_eq!(summary.skipped, 1);

    let customer = sqlx::query("SELECT name, email, address FROM customers")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(customer.try_get::<String, _>("name").unwrap(), "Pat's Garage");
    assert_eq!(customer.try_get::<String, _>("email").unwrap(), "pat@garage.test");
    assert_eq!(customer.try_get::<String, _>("address").unwrap(), "1 High St, Arklow");

    // Foreign invoice numbers are preserved, totals reconciled.
    let record = sqlx::query(
        "SELECT invoice_number, customer_id, subtotal, discount, tax, total FROM service_records",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(record.try_get::<String, _>("invoice_number").unwrap(), "0027");
    assert!(record.try_get::<Option<String>, _>("customer_id").unwrap().is_some());
    assert_eq!(record.try_get::<f64, _>("subtotal").unwrap(), 130.0);
    assert_eq!(record.try_get::<f64, _>("discount").unwrap(), 0.0);
    assert_eq!(record.try_get::<f64, _>("tax").unwrap(), 0.0);
    assert_eq!(record.try_get::<f64, _>("total").unwrap(), 130.0);

    // Every imported record hangs off the shared placeholder vehicle.
    let vehicle = sqlx::query("SELECT make, model FROM vehicles")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(vehicle.try_get::<String, _>("make").unwrap(), "Imported");
    assert_eq!(vehicle.try_get::<String, _>("model").unwrap(), "Unassigned");

    let payment = sqlx::query("SELECT method, amount, reference FROM payments")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(payment.try_get::<String, _>("method").unwrap(), "credit_card");
    assert_eq!(payment.try_get::<f64, _>("amount").unwrap(), 130.0);
    assert_eq!(payment.try_get::<String, _>("reference").unwrap(), "ch_123");

    let attachment = sqlx::query("SELECT relative_path, category FROM service_attachments")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(
        attachment.try_get::<String, _>("relative_path").unwrap(),
        "org-1/invoice_documents/i1_receipt.pdf"
    );
    assert_eq!(
        attachment.try_get::<String, _>("category").unwrap(),
        "invoice_documents"
    );
    assert!(base.path().join("org-1/invoice_documents/i1_receipt.pdf").is_file());
}

#[tokio::test]
async fn export_without_clients_is_rejected() {
    let pool = open_memory_pool().await.unwrap();
    apply_migrations(&pool).await.unwrap();
    let base = tempdir().unwrap();
    let store = AttachmentStore::new(base.path());

    let archive = export_archive(json!({"clients": [], "invoices": []}), &[]);
    let err = import_ninja_export(&pool, &store, &ctx(), &TenantNumbering::default(), &archive)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "IMPORT/NO_CLIENTS");
    assert_eq!(err.http_status(), 400);

    let count = sqlx::query("SELECT COUNT(*) AS n FROM vehicles")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.try_get::<i64, _>("n").unwrap(), 0);
}

#[tokio::test]
async fn missing_manifest_is_a_descriptive_error() {
    let pool = open_memory_pool().await.unwrap();
    apply_migrations(&pool).await.unwrap();
    let base = tempdir().unwrap();
    let store = AttachmentStore::new(base.path());

    let archive = zip_with(&[("readme.txt", b"not an export")]);
    let err = import_ninja_export(&pool, &store, &ctx(), &TenantNumbering::default(), &archive)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "IMPORT/MANIFEST_MISSING");
    assert_eq!(err.http_status(), 400);
}

#[tokio::test]
async fn malformed_manifest_is_a_descriptive_error() {
    let pool = open_memory_pool().await.unwrap();
    apply_migrations(&pool).await.unwrap();
    let base = tempdir().unwrap();
    let store = AttachmentStore::new(base.path());

    let archive = zip_with(&[("backup.json", b"{\"products\": []}")]);
    let err = import_ninja_export(&pool, &store, &ctx(), &TenantNumbering::default(), &archive)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "IMPORT/MANIFEST_INVALID");
    assert_eq!(err.http_status(), 400);
}

#[tokio::test]
async fn unmapped_references_skip_not_fail() {
    let pool = open_memory_pool().await.unwrap();
    apply_migrations(&pool).await.unwrap();
    let base = tempdir().unwrap();
    let store = AttachmentStore::new(base.path());

    let manifest = json!({
        "clients": [{"hashed_id": "c1", "name": "Kept"}],
        "invoices": [
            {"hashed_id": "i1", "client_id": "c-unknown", "number": "A1", "amount": 10.0},
        ],
        "payments": [{
            "hashed_id": "p1",
            "type_id": 2,
            "paymentables": [{"invoice_id": "i-unknown", "amount": 10.0}],
        }],
    });
    let archive = export_archive(manifest, &[]);

    let summary = import_ninja_export(&pool, &store, &ctx(), &TenantNumbering::default(), &archive)
        .await
        .unwrap();
    assert_eq!(summary.customers, 1);
    assert_eq!(summary.service_records, 0);
    assert_eq!(summary.payments, 0);
    // One unmapped invoice, one unmapped payment allocation.
    assert_eq!(summary.skipped, 2);
}

#[tokio::test]
async fn soft_deleted_rows_never_land() {
    let pool = open_memory_pool().await.unwrap();
    apply_migrations(&pool).await.unwrap();
    let base = tempdir().unwrap();
    let store = AttachmentStore::new(base.path());

    let manifest = json!({
        "clients": [
            {"hashed_id": "c1", "name": "Kept"},
            {"hashed_id": "c2", "name": "Gone", "is_deleted": true},
        ],
        "invoices": [
            {"hashed_id": "i1", "client_id": "c1", "number": "B1", "amount": 5.0},
            {"hashed_id": "i2", "client_id": "c1", "number": "B2", "amount": 5.0, "is_deleted": true},
        ],
    });
    let archive = export_archive(manifest, &[]);

    let summary = import_ninja_export(&pool, &store, &ctx(), &TenantNumbering::default(), &archive)
        .await
        .unwrap();
    assert_eq!(summary.customers, 1);
    assert_eq!(summary.service_records, 1);
    assert_eq!(summary.skipped, 0);
}

#[tokio::test]
async fn blank_invoice_numbers_continue_the_sequence() {
    let pool = open_memory_pool().await.unwrap();
    apply_migrations(&pool).await.unwrap();
    let base = tempdir().unwrap();
    let store = AttachmentStore::new(base.path());

    let manifest = json!({
        "clients": [{"hashed_id": "c1", "name": "Kept"}],
        "invoices": [
            {"hashed_id": "i1", "client_id": "c1", "amount": 5.0},
            {"hashed_id": "i2", "client_id": "c1", "number": "  ", "amount": 6.0},
        ],
    });
    let archive = export_archive(manifest, &[]);

    import_ninja_export(&pool, &store, &ctx(), &TenantNumbering::default(), &archive)
        .await
        .unwrap();

    let numbers: Vec<String> =
        sqlx::query("SELECT invoice_number FROM service_records ORDER BY invoice_number")
            .fetch_all(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.try_get::<String, _>("invoice_number").unwrap())
            .collect();
    assert_eq!(numbers, vec!["INV-1001".to_string(), "INV-1002".to_string()]);
}
