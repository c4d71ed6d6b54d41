//! Rounding helpers used for image alignment.

/// Smallest multiple of `base` that is greater than or equal to `reference`.
///
/// With `force_next`, a `reference` that already is a multiple moves to the
/// following one. A non-positive `base` returns `reference` unchanged.
#[must_use]
pub fn closest_multiple(reference: f64, base: f64, force_next: bool) -> f64 {
    if base <= 0.0 {
        return reference;
    }
    let multiple = (reference / base).ceil() * base;
    if force_next && (multiple - reference).abs() < f64::EPSILON * base.max(1.0) {
        multiple + base
    } else {
        multiple
    }
}

/// Smallest power of `base` that is greater than or equal to `reference`.
///
/// With `force_next`, an exact power moves to the following one.
/// `base` must be greater than one and `reference` positive; otherwise
/// `reference` is returned unchanged.
#[must_use]
pub fn closest_power(reference: f64, base: f64, force_next: bool) -> f64 {
    if base <= 1.0 || reference <= 0.0 {
        return reference;
    }
    let exponent = reference.log(base);
    let rounded = exponent.round();
    let exact = (exponent - rounded).abs() < 1e-9;
    let exponent = match (exact, force_next) {
        (true, true) => rounded + 1.0,
        (true, false) => rounded,
        (false, _) => exponent.ceil(),
    };
    base.powf(exponent)
}

/// Integer form of [`closest_multiple`] used for byte alignment.
#[must_use]
pub fn align_up(len: usize, align: usize) -> usize {
    if align == 0 {
        return len;
    }
    len.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_closest_multiple() {
        assert!(close(closest_multiple(2.0, 2.0, false), 2.0));
        assert!(close(closest_multiple(2.0, 2.0, true), 4.0));
        assert!(close(closest_multiple(3.0, 2.0, false), 4.0));
        assert!(close(closest_multiple(3.0, 2.0, true), 4.0));
        assert!(close(closest_multiple(0.3, 0.25, false), 0.5));
    }

    #[test]
    fn test_closest_multiple_invalid_base() {
        assert!(close(closest_multiple(7.0, 0.0, false), 7.0));
    }

    #[test]
    fn test_closest_power() {
        assert!(close(closest_power(0.1, 10.0, false), 0.1));
        assert!(close(closest_power(0.1, 10.0, true), 1.0));
        assert!(close(closest_power(5.0, 2.0, false), 8.0));
        assert!(close(closest_power(8.0, 2.0, false), 8.0));
        assert!(close(closest_power(8.0, 2.0, true), 16.0));
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 4), 20);
        assert_eq!(align_up(5, 0), 5);
    }
}
