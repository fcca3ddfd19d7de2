//! Pure mapping from Invoice Ninja records to target-entity rows.

use super::manifest::{ForeignClient, ForeignInvoice, ForeignPayment, ForeignProduct};
use crate::import::normalize::{
    client_display_name, code_to_i64, money_to_f64, payment_method_from_code, PaymentMethod,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRow {
    pub foreign_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

pub fn map_client(client: &ForeignClient) -> CustomerRow {
    let primary = client.contacts.first();
    let contact_names = primary.map(|contact| {
        (
            contact.first_name.as_deref().unwrap_or(""),
            contact.last_name.as_deref().unwrap_or(""),
        )
    });
    let fallback = client
        .number
        .clone()
        .filter(|number| !number.trim().is_empty())
        .unwrap_or_else(|| client.hashed_id.clone());

    let address = match (client.address1.as_deref(), client.city.as_deref()) {
        (Some(street), Some(city)) => Some(format!("{street}, {city}")),
        (Some(street), None) => Some(street.to_string()),
        (None, Some(city)) => Some(city.to_string()),
        (None, None) => None,
    };

    CustomerRow {
        foreign_id: client.hashed_id.clone(),
        name: client_display_name(client.name.as_deref(), contact_names, &fallback),
        email: primary.and_then(|contact| contact.email.clone()),
        phone: client
            .phone
            .clone()
            .or_else(|| primary.and_then(|contact| contact.phone.clone())),
        address,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryRow {
    pub name: String,
    pub sku: Option<String>,
    pub price: f64,
    pub cost: f64,
    pub quantity: f64,
}

pub fn map_product(product: &ForeignProduct) -> InventoryRow {
    let name = product
        .product_key
        .as_deref()
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .or_else(|| {
            product
                .notes
                .as_deref()
                .and_then(|notes| notes.lines().next())
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Imported part".to_string());

    InventoryRow {
        sku: product.product_key.clone(),
        name,
        price: money_to_f64(Some(&product.price)),
        cost: money_to_f64(Some(&product.cost)),
        quantity: money_to_f64(Some(&product.in_stock_quantity)),
    }
}

/// Line item kind discriminator: "1" is a product/part, "2" is labor.
/// Unknown codes fall back to part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Part,
    Labor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineRow {
    pub kind: LineKind,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total: f64,
}

/// Split an invoice's line items into part and labor buckets.
///
/// A line with no product key, no notes, and zero total is noise from the
/// foreign editor and is dropped rather than created as a zero-value row.
pub fn split_line_items(invoice: &ForeignInvoice) -> (Vec<LineRow>, Vec<LineRow>, u64) {
    let mut parts = Vec::new();
    let mut labor = Vec::new();
    let mut dropped = 0u64;

    for item in &invoice.line_items {
        let quantity = money_to_f64(Some(&item.quantity));
        let unit_price = money_to_f64(Some(&item.cost));
        let mut total = money_to_f64(Some(&item.line_total));
        if total == 0.0 {
            total = quantity * unit_price;
        }

        let product_key = item.product_key.as_deref().map(str::trim).unwrap_or("");
        let notes = item.notes.as_deref().map(str::trim).unwrap_or("");
        if product_key.is_empty() && notes.is_empty() && total == 0.0 {
            dropped += 1;
            continue;
        }

        let description = if product_key.is_empty() {
            notes.to_string()
        } else {
            product_key.to_string()
        };
        let row = LineRow {
            kind: match code_to_i64(&item.type_id) {
                Some(2) => LineKind::Labor,
                _ => LineKind::Part,
            },
            description,
            quantity,
            unit_price,
            total,
        };
        match row.kind {
            LineKind::Part => parts.push(row),
            LineKind::Labor => labor.push(row),
        }
    }

    (parts, labor, dropped)
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceTotals {
    pub subtotal: f64,
    pub discount: f64,
    pub tax: f64,
    pub total: f64,
}

/// Reconcile invoice amounts against the kept line items.
///
/// Amount-based discounts are taken as-is; percentage discounts are
/// recomputed from the line-item subtotal. The tax amount is back-derived as
/// `total - subtotal + discount` to tolerate upstream rounding; this is a
/// deliberate reconciliation, not a field copy.
pub fn reconcile_totals(invoice: &ForeignInvoice, lines: &[&LineRow]) -> InvoiceTotals {
    let subtotal: f64 = lines.iter().map(|line| line.total).sum();
    let raw_discount = money_to_f64(Some(&invoice.discount));
    let discount = if invoice.is_amount_discount {
        raw_discount
    } else {
        subtotal * raw_discount / 100.0
    };
    let total = money_to_f64(Some(&invoice.amount));
    InvoiceTotals {
        subtotal,
        discount,
        tax: total - subtotal + discount,
        total,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRow {
    pub foreign_invoice_id: String,
    pub method: PaymentMethod,
    pub amount: f64,
    pub date: Option<String>,
    pub reference: Option<String>,
}

/// Fan a payment out to one row per invoice allocation. Allocations without
/// an invoice reference are dropped and reported in the second tuple slot.
pub fn map_payment(payment: &ForeignPayment) -> (Vec<PaymentRow>, u64) {
    let method = payment_method_from_code(code_to_i64(&payment.type_id));
    let mut rows = Vec::new();
    let mut dropped = 0u64;

    for allocation in &payment.paymentables {
        let Some(invoice_id) = allocation
            .invoice_id
            .as_deref()
            .filter(|id| !id.is_empty())
        else {
            dropped += 1;
            continue;
        };
        rows.push(PaymentRow {
            foreign_invoice_id: invoice_id.to_string(),
            method,
            amount: money_to_f64(Some(&allocation.amount)),
            date: payment.date.clone(),
            reference: payment.transaction_reference.clone(),
        });
    }

    (rows, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn invoice(value: serde_json::Value) -> ForeignInvoice {
        serde_json::from_value(value).expect("invoice fixture")
    }

    #[test]
    fn client_name_and_contact_fallbacks() {
        let client: ForeignClient = serde_json::from_value(json!({
            "hashed_id": "abc",
            "name": "",
            "contacts": [
                {"first_name": "Maya", "last_name": "Quinn", "email": "m@q.test"},
            ],
        }))
        .expect("client fixture");
        let row = map_client(&client);
        assert_eq!(row.name, "Maya Quinn");
        assert_eq!(row.email.as_deref(), Some("m@q.test"));

        let bare: ForeignClient =
            serde_json::from_value(json!({"hashed_id": "xyz", "number": "0042"}))
                .expect("bare client");
        assert_eq!(map_client(&bare).name, "Client #0042");
    }

    #[test]
    fn splits_lines_by_kind_and_drops_noise() {
        let invoice = invoice(json!({
            "hashed_id": "i1",
            "line_items": [
                {"type_id": "1", "product_key": "OIL-5W30", "quantity": 2, "cost": 25.0, "line_total": 50.0},
                {"type_id": "2", "notes": "Labor: oil change", "quantity": 1, "cost": 80.0},
                {"type_id": "1", "quantity": 0, "cost": 0},
            ],
        }));

        let (parts, labor, dropped) = split_line_items(&invoice);
        assert_eq!(parts.len(), 1);
        assert_eq!(labor.len(), 1);
        assert_eq!(dropped, 1);
        assert_eq!(parts[0].description, "OIL-5W30");
        assert_eq!(parts[0].total, 50.0);
        assert_eq!(labor[0].total, 80.0);
    }

    #[test]
    fn unknown_line_kind_defaults_to_part() {
        let invoice = invoice(json!({
            "hashed_id": "i1",
            "line_items": [{"type_id": "9", "product_key": "MISC", "line_total": 5.0}],
        }));
        let (parts, labor, dropped) = split_line_items(&invoice);
        assert_eq!(parts.len(), 1);
        assert!(labor.is_empty());
        assert_eq!(dropped, 0);
    }

    #[test]
    fn percentage_discount_recomputed_and_tax_back_derived() {
        let inv = invoice(json!({
            "hashed_id": "i1",
            "amount": 126.0,
            "discount": 10.0,
            "is_amount_discount": false,
        }));
        let lines = vec![
            LineRow {
                kind: LineKind::Part,
                description: "a".into(),
                quantity: 1.0,
                unit_price: 100.0,
                total: 100.0,
            },
            LineRow {
                kind: LineKind::Labor,
                description: "b".into(),
                quantity: 1.0,
                unit_price: 20.0,
                total: 20.0,
            },
        ];
        let refs: Vec<&LineRow> = lines.iter().collect();
        let totals = reconcile_totals(&inv, &refs);
        assert_eq!(totals.subtotal, 120.0);
        assert_eq!(totals.discount, 12.0);
        // tax = total - subtotal + discount; tolerates upstream rounding by
        // construction, so assert the formula rather than a recomputation.
        assert!((totals.tax - 18.0).abs() < 1e-9);
        assert_eq!(totals.total, 126.0);
    }

    #[test]
    fn amount_discount_taken_as_is() {
        let inv = invoice(json!({
            "hashed_id": "i1",
            "amount": 95.0,
            "discount": 5.0,
            "is_amount_discount": true,
        }));
        let line = LineRow {
            kind: LineKind::Part,
            description: "a".into(),
            quantity: 1.0,
            unit_price: 100.0,
            total: 100.0,
        };
        let totals = reconcile_totals(&inv, &[&line]);
        assert_eq!(totals.discount, 5.0);
        assert!((totals.tax - 0.0).abs() < 1e-9);
    }

    #[test]
    fn payment_fans_out_per_allocation() {
        let payment: ForeignPayment = serde_json::from_value(json!({
            "hashed_id": "p1",
            "type_id": 3,
            "date": "2026-01-15",
            "transaction_reference": "ch_123",
            "paymentables": [
                {"invoice_id": "i1", "amount": 60.0},
                {"invoice_id": "i2", "amount": 40.0},
                {"amount": 5.0},
            ],
        }))
        .expect("payment fixture");

        let (rows, dropped) = map_payment(&payment);
        assert_eq!(rows.len(), 2);
        assert_eq!(dropped, 1);
        assert_eq!(rows[0].method, PaymentMethod::CreditCard);
        assert_eq!(rows[0].foreign_invoice_id, "i1");
        assert_eq!(rows[1].amount, 40.0);
    }
}
