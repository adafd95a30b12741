// 📐 Form validation - checked before anything reaches the database

use crate::error::FieldError;
use crate::plate::{self, Plate};
use crate::vehicles::NewVehicle;

/// Validate a registration form, collecting every failing field.
///
/// On success returns the canonical plate the record will be stored under.
pub fn validate_registration(form: &NewVehicle) -> Result<Plate, Vec<FieldError>> {
    let mut errors = Vec::new();

    let plate = if form.plate.trim().is_empty() {
        errors.push(FieldError::new("plate", "Required field is empty"));
        None
    } else if !plate::is_valid(&form.plate) {
        errors.push(FieldError::new(
            "plate",
            format!("'{}' is not a valid plate (use BB-BB-22, BBBB22, AB-12-34 or AB1234)", form.plate.trim()),
        ));
        None
    } else {
        Plate::parse(&form.plate).ok()
    };

    if form.owner.trim().is_empty() {
        errors.push(FieldError::new("owner", "Required field is empty"));
    }

    if form.unit.trim().is_empty() {
        errors.push(FieldError::new("unit", "Required field is empty"));
    }

    match plate {
        Some(plate) if errors.is_empty() => Ok(plate),
        _ => Err(errors),
    }
}

/// Guard names are free text but must not be blank
pub fn validate_guard_name(name: &str) -> Result<String, FieldError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(FieldError::new("guard", "Enter the guard on duty before continuing"))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(plate: &str, owner: &str, unit: &str) -> NewVehicle {
        NewVehicle {
            plate: plate.to_string(),
            owner: owner.to_string(),
            unit: unit.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_form_yields_canonical_plate() {
        let plate = validate_registration(&form("bb-bb-22", "Juan Perez", "101")).unwrap();
        assert_eq!(plate.as_str(), "BBBB22");
    }

    #[test]
    fn test_missing_mandatory_fields() {
        let errors = validate_registration(&form("", " ", "")).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["plate", "owner", "unit"]);
    }

    #[test]
    fn test_bad_plate_with_valid_fields() {
        let errors = validate_registration(&form("ABCD123", "Juan", "101")).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "plate");
    }

    #[test]
    fn test_guard_name() {
        assert_eq!(validate_guard_name("  Ana ").unwrap(), "Ana");
        assert!(validate_guard_name("   ").is_err());
    }
}
