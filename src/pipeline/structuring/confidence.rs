/// Base confidence when no critical field was found.
const BASE_CONFIDENCE: f64 = 0.5;

/// Added per populated critical field.
const PER_FIELD_BONUS: f64 = 0.1;

/// Derived confidence never claims more than this.
const MAX_DERIVED_CONFIDENCE: f64 = 0.95;

/// Confidence for a record whose model output carried none:
/// `min(0.5 + 0.1 * critical_fields, 0.95)`, rounded to two decimals.
pub fn derive_confidence(critical_fields: usize) -> f64 {
    let raw = (BASE_CONFIDENCE + PER_FIELD_BONUS * critical_fields as f64)
        .min(MAX_DERIVED_CONFIDENCE);
    (raw * 100.0).round() / 100.0
}

/// Clamp a model-supplied confidence into [0, 1]. NaN is treated as absent.
pub fn clamp_confidence(value: f64) -> Option<f64> {
    if value.is_nan() {
        None
    } else {
        Some(value.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_fields_gives_base() {
        assert_eq!(derive_confidence(0), 0.5);
    }

    #[test]
    fn four_fields_gives_point_nine() {
        assert_eq!(derive_confidence(4), 0.9);
    }

    #[test]
    fn capped_below_certainty() {
        assert_eq!(derive_confidence(5), 0.95);
        assert_eq!(derive_confidence(6), 0.95);
    }

    #[test]
    fn provided_values_clamped() {
        assert_eq!(clamp_confidence(1.7), Some(1.0));
        assert_eq!(clamp_confidence(-0.2), Some(0.0));
        assert_eq!(clamp_confidence(0.42), Some(0.42));
        assert_eq!(clamp_confidence(f64::NAN), None);
    }
}
