use serde::{Deserialize, Serialize};

const METRES_TO_FEET: f64 = 3.28084;

/// House footprint measured on site, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurements {
    pub width: f64,
    pub length: f64,
    pub height: f64,
    pub platform_height: f64,
}

/// Inclusive range in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidRange {
    pub min: f64,
    pub max: f64,
}

impl ValidRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const WIDTH_RANGE: ValidRange = ValidRange { min: 5.5, max: 9.0 }; // 18-30 ft
pub const LENGTH_RANGE: ValidRange = ValidRange { min: 4.5, max: 7.5 }; // 15-25 ft
pub const HEIGHT_RANGE: ValidRange = ValidRange { min: 2.4, max: 4.5 }; // 8-15 ft
pub const PLATFORM_HEIGHT_RANGE: ValidRange = ValidRange { min: 0.6, max: 2.1 }; // 2-7 ft

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

pub fn validate_measurements(measurements: &Measurements) -> ValidationReport {
    let fields = [
        ("width", measurements.width, WIDTH_RANGE),
        ("length", measurements.length, LENGTH_RANGE),
        ("height", measurements.height, HEIGHT_RANGE),
        ("platformHeight", measurements.platform_height, PLATFORM_HEIGHT_RANGE),
    ];

    let errors: Vec<String> = fields
        .iter()
        .filter(|(_, value, range)| !range.contains(*value))
        .map(|(key, value, range)| {
            format!(
                "{} of {:.2}m is outside valid range ({}-{}m)",
                key, value, range.min, range.max
            )
        })
        .collect();

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// `"6.10m (20.01ft)"`
pub fn format_measurement(value: f64) -> String {
    format!("{:.2}m ({:.2}ft)", value, value * METRES_TO_FEET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longhouse_dimensions_are_valid() {
        let report = validate_measurements(&Measurements {
            width: 6.1,
            length: 7.5,
            height: 4.5,
            platform_height: 1.22,
        });
        assert!(report.is_valid);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_out_of_range_fields_are_reported() {
        let report = validate_measurements(&Measurements {
            width: 4.5,
            length: 5.5,
            height: 3.8,
            platform_height: 2.5,
        });
        assert!(!report.is_valid);
        assert_eq!(
            report.errors,
            vec![
                "width of 4.50m is outside valid range (5.5-9m)".to_string(),
                "platformHeight of 2.50m is outside valid range (0.6-2.1m)".to_string(),
            ]
        );
    }

    #[test]
    fn test_format_measurement() {
        assert_eq!(format_measurement(6.1), "6.10m (20.01ft)");
        assert_eq!(format_measurement(0.0), "0.00m (0.00ft)");
    }
}
