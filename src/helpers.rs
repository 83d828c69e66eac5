//! Guards for floating-point values on their way into storage.
//!
//! PostgreSQL happily stores `NaN` and `±Infinity` in `DOUBLE PRECISION`
//! columns, and the dashboard would then render them. Metrics pass through
//! these helpers so a non-finite value becomes NULL with a warning instead.

/// `Some(v)` for finite values, `None` (logged) for NaN and ±Inf.
pub(crate) fn finite_or_none(v: f64, label: &str) -> Option<f64> {
    if v.is_finite() {
        Some(v)
    } else {
        tracing::warn!("{} is non-finite ({}), storing NULL", label, v);
        None
    }
}

/// Like `finite_or_none`, passing `None` through.
pub(crate) fn opt_finite_or_none(v: Option<f64>, label: &str) -> Option<f64> {
    v.and_then(|x| finite_or_none(x, label))
}

/// Every value finite.
pub(crate) fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finite_or_none_normal() {
        assert_eq!(finite_or_none(3.14, "mae"), Some(3.14));
        assert_eq!(finite_or_none(0.0, "mae"), Some(0.0));
    }

    #[test]
    fn test_finite_or_none_nan() {
        assert_eq!(finite_or_none(f64::NAN, "mape"), None);
    }

    #[test]
    fn test_finite_or_none_infinity() {
        assert_eq!(finite_or_none(f64::INFINITY, "mape"), None);
        assert_eq!(finite_or_none(f64::NEG_INFINITY, "mape"), None);
    }

    #[test]
    fn test_opt_finite_or_none() {
        assert_eq!(opt_finite_or_none(None, "rmse"), None);
        assert_eq!(opt_finite_or_none(Some(2.0), "rmse"), Some(2.0));
        assert_eq!(opt_finite_or_none(Some(f64::NAN), "rmse"), None);
    }

    #[test]
    fn test_all_finite() {
        assert!(all_finite(&[1.0, -2.0, 0.0]));
        assert!(all_finite(&[]));
        assert!(!all_finite(&[1.0, f64::NAN]));
    }
}
