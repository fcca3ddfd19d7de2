//! Pure mapping from classified CarVault records to target-entity rows.

use serde_json::Value;

use super::classify::{ForeignNote, ForeignServiceEvent, ForeignVehicle};
use crate::import::normalize::{derive_fuel_type, money_to_f64, FuelType};

/// Vehicle row ready for insertion; the foreign id keys the remap table.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRow {
    pub foreign_id: Option<i64>,
    pub make: String,
    pub model: String,
    pub year: i64,
    pub fuel_type: FuelType,
    pub odometer: Option<i64>,
    pub purchase_price: f64,
    pub sold_price: f64,
    pub image_file: Option<String>,
}

/// `odometer` is derived ahead of insertion (rows are never updated): the
/// highest mileage across the vehicle's classified service events.
pub fn map_vehicle(vehicle: &ForeignVehicle, odometer: Option<i64>) -> VehicleRow {
    VehicleRow {
        foreign_id: vehicle.id,
        make: vehicle.make.clone(),
        model: vehicle.model.clone(),
        year: vehicle.year,
        fuel_type: derive_fuel_type(vehicle.is_electric, vehicle.is_diesel),
        odometer,
        purchase_price: money_to_f64(vehicle.purchase_price.as_ref()),
        sold_price: money_to_f64(vehicle.sold_price.as_ref()),
        image_file: vehicle.image_file.clone(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEventRow {
    pub foreign_id: Option<i64>,
    pub foreign_vehicle_id: i64,
    pub date: Option<String>,
    pub odometer: Option<i64>,
    pub description: String,
    pub notes: Option<String>,
    pub total: f64,
    pub files: Vec<String>,
}

pub fn map_service_event(event: &ForeignServiceEvent) -> ServiceEventRow {
    ServiceEventRow {
        foreign_id: event.id,
        foreign_vehicle_id: event.vehicle_id,
        date: date_string(&event.date),
        odometer: event.mileage,
        description: event.description.clone(),
        notes: event.notes.clone(),
        total: money_to_f64(Some(&event.cost)),
        files: event.files.clone(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoteRow {
    pub foreign_vehicle_id: i64,
    pub title: String,
    pub body: String,
    pub pinned: bool,
}

pub fn map_note(note: &ForeignNote) -> NoteRow {
    NoteRow {
        foreign_vehicle_id: note.vehicle_id,
        title: note
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("Imported note")
            .to_string(),
        body: note.body.clone(),
        pinned: note.pinned,
    }
}

/// Highest mileage among `events` belonging to `vehicle_id`.
pub fn max_mileage_for(events: &[ForeignServiceEvent], vehicle_id: Option<i64>) -> Option<i64> {
    let vehicle_id = vehicle_id?;
    events
        .iter()
        .filter(|event| event.vehicle_id == vehicle_id)
        .filter_map(|event| event.mileage)
        .max()
}

fn date_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vehicle() -> ForeignVehicle {
        serde_json::from_value(json!({
            "_id": 3,
            "Make": "Nissan",
            "Model": "Leaf",
            "Year": 2021,
            "IsElectric": true,
            "IsDiesel": true,
            "PurchasePrice": {"$numberDecimal": "18000.50"},
        }))
        .expect("vehicle fixture")
    }

    fn event(vehicle_id: i64, mileage: Option<i64>) -> ForeignServiceEvent {
        serde_json::from_value(json!({
            "_id": 7,
            "VehicleId": vehicle_id,
            "Date": "2025-03-01T00:00:00+00:00",
            "Description": "Brake pads",
            "Cost": {"$numberDecimal": "150.00"},
            "Mileage": mileage,
        }))
        .expect("event fixture")
    }

    #[test]
    fn maps_vehicle_with_derived_fields() {
        let row = map_vehicle(&vehicle(), Some(42000));
        assert_eq!(row.fuel_type, FuelType::Electric);
        assert_eq!(row.purchase_price, 18000.5);
        assert_eq!(row.sold_price, 0.0);
        assert_eq!(row.odometer, Some(42000));
    }

    #[test]
    fn maps_service_event_cost_and_date() {
        let row = map_service_event(&event(3, Some(40000)));
        assert_eq!(row.total, 150.0);
        assert_eq!(row.date.as_deref(), Some("2025-03-01T00:00:00+00:00"));
        assert_eq!(row.odometer, Some(40000));
    }

    #[test]
    fn note_title_falls_back_when_blank() {
        let note: ForeignNote = serde_json::from_value(json!({
            "VehicleId": 3, "NoteText": "body", "Title": "  ",
        }))
        .expect("note fixture");
        assert_eq!(map_note(&note).title, "Imported note");
    }

    #[test]
    fn max_mileage_considers_only_the_vehicle() {
        let events = vec![event(3, Some(40000)), event(3, None), event(4, Some(90000))];
        assert_eq!(max_mileage_for(&events, Some(3)), Some(40000));
        assert_eq!(max_mileage_for(&events, Some(5)), None);
        assert_eq!(max_mileage_for(&events, None), None);
    }
}
