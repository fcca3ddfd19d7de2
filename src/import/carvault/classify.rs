//! Buckets recovered CarVault documents into domain categories.
//!
//! The container carries no type tags, so classification is field-presence
//! based: each document is decoded against the candidate shapes in fixed
//! precedence order and the first successful decode wins. Documents matching
//! no shape are dropped.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Vehicle record as CarVault stores it.
#[derive(Debug, Clone, Deserialize)]
pub struct ForeignVehicle {
    #[serde(rename = "_id", default)]
    pub id: Option<i64>,
    #[serde(rename = "Make")]
    pub make: String,
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "Year")]
    pub year: i64,
    #[serde(rename = "ImageFileName", default)]
    pub image_file: Option<String>,
    #[serde(rename = "IsElectric", default)]
    pub is_electric: bool,
    #[serde(rename = "IsDiesel", default)]
    pub is_diesel: bool,
    #[serde(rename = "PurchasePrice", default)]
    pub purchase_price: Option<Value>,
    #[serde(rename = "SoldPrice", default)]
    pub sold_price: Option<Value>,
}

/// Service event (maintenance/repair entry) referencing a vehicle.
#[derive(Debug, Clone, Deserialize)]
pub struct ForeignServiceEvent {
    #[serde(rename = "_id", default)]
    pub id: Option<i64>,
    #[serde(rename = "VehicleId")]
    pub vehicle_id: i64,
    #[serde(rename = "Date")]
    pub date: Value,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Cost")]
    pub cost: Value,
    #[serde(rename = "Mileage", default)]
    pub mileage: Option<i64>,
    #[serde(rename = "Notes", default)]
    pub notes: Option<String>,
    #[serde(rename = "Files", default)]
    pub files: Vec<String>,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,
}

/// Free-text note attached to a vehicle.
#[derive(Debug, Clone, Deserialize)]
pub struct ForeignNote {
    #[serde(rename = "_id", default)]
    pub id: Option<i64>,
    #[serde(rename = "VehicleId")]
    pub vehicle_id: i64,
    #[serde(rename = "Title", default)]
    pub title: Option<String>,
    #[serde(rename = "NoteText")]
    pub body: String,
    #[serde(rename = "Pinned", default)]
    pub pinned: bool,
    #[serde(rename = "Files", default)]
    pub files: Vec<String>,
}

/// Disjoint classification of everything recovered from one backup.
#[derive(Debug, Default)]
pub struct Classified {
    pub vehicles: Vec<ForeignVehicle>,
    pub service_events: Vec<ForeignServiceEvent>,
    pub notes: Vec<ForeignNote>,
    pub dropped: u64,
}

/// Classify recovered documents.
///
/// Precedence matters: some records structurally satisfy more than one
/// bucket, and first match wins. Every document lands in exactly one bucket
/// or is dropped.
pub fn classify_documents(documents: Vec<Map<String, Value>>) -> Classified {
    let mut classified = Classified::default();

    for fields in documents {
        let has_note_body = fields.contains_key("NoteText");
        let has_vehicle_ref = fields.contains_key("VehicleId");
        let value = Value::Object(fields);

        if let Ok(vehicle) = serde_json::from_value::<ForeignVehicle>(value.clone()) {
            classified.vehicles.push(vehicle);
            continue;
        }
        if !has_note_body {
            if let Ok(event) = serde_json::from_value::<ForeignServiceEvent>(value.clone()) {
                classified.service_events.push(event);
                continue;
            }
        }
        if has_note_body && has_vehicle_ref {
            if let Ok(note) = serde_json::from_value::<ForeignNote>(value) {
                classified.notes.push(note);
                continue;
            }
        }
        classified.dropped += 1;
    }

    debug!(
        target: "wrenchcloud",
        event = "classified",
        vehicles = classified.vehicles.len(),
        service_events = classified.service_events.len(),
        notes = classified.notes.len(),
        dropped = classified.dropped
    );
    classified
}
