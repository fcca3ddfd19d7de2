use serde_json::Value;

/// Normalize a foreign monetary field to a plain numeric value.
///
/// Foreign exports carry amounts either as a wrapped decimal string
/// (`{"$numberDecimal": "12.50"}`), a bare string, or a plain number.
/// Unparsable or missing values become zero; a single bad number never fails
/// an import.
pub fn money_to_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Value::Object(map)) => map
            .get("$numberDecimal")
            .and_then(Value::as_str)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuelType {
    Gasoline,
    Diesel,
    Electric,
}

impl FuelType {
    pub const fn as_str(self) -> &'static str {
        match self {
            FuelType::Gasoline => "gasoline",
            FuelType::Diesel => "diesel",
            FuelType::Electric => "electric",
        }
    }
}

/// Electric wins over diesel; anything else is gasoline.
pub fn derive_fuel_type(is_electric: bool, is_diesel: bool) -> FuelType {
    if is_electric {
        FuelType::Electric
    } else if is_diesel {
        FuelType::Diesel
    } else {
        FuelType::Gasoline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    BankTransfer,
    Cash,
    CreditCard,
    DebitCard,
    Other,
}

impl PaymentMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cash => "cash",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::Other => "other",
        }
    }
}

/// Foreign discriminator codes arrive as numbers or numeric strings.
pub fn code_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Fixed foreign payment-type code table; unknown codes are "other".
pub fn payment_method_from_code(code: Option<i64>) -> PaymentMethod {
    match code {
        Some(1) => PaymentMethod::BankTransfer,
        Some(2) => PaymentMethod::Cash,
        Some(3) => PaymentMethod::CreditCard,
        Some(4) => PaymentMethod::DebitCard,
        _ => PaymentMethod::Other,
    }
}

/// Display name for an imported client: explicit name, else the primary
/// contact's first+last, else a generic numbered label. Never empty.
pub fn client_display_name(
    name: Option<&str>,
    contact: Option<(&str, &str)>,
    fallback_id: &str,
) -> String {
    if let Some(name) = name {
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    if let Some((first, last)) = contact {
        let full = format!("{} {}", first.trim(), last.trim());
        let full = full.trim().to_string();
        if !full.is_empty() {
            return full;
        }
    }
    format!("Client #{fallback_id}")
}
