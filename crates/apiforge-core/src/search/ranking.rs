//! Relevance blending: textual score plus recency decay.

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Scale a raw index score into `[0, 1]`.
///
/// The divisor is at least 1 so that a result set of uniformly weak matches
/// is not inflated to full relevance.
#[must_use]
pub fn normalize(score: f64, max_score: f64) -> f64 {
    score / max_score.max(1.0)
}

/// Hyperbolic recency decay in `(0, 1]`, or `0` for never-accessed
/// descriptors. Access times in the future count as "just now".
#[must_use]
pub fn decay(last_accessed: Option<i64>, now_ms: i64, half_life_hours: f64) -> f64 {
    let Some(accessed) = last_accessed else {
        return 0.0;
    };
    let age_hours = (now_ms.saturating_sub(accessed)).max(0) as f64 / MILLIS_PER_HOUR;
    1.0 / (1.0 + age_hours / half_life_hours)
}

/// `alpha * relevance + (1 - alpha) * decay`.
#[must_use]
pub fn combine(alpha: f64, relevance: f64, decay: f64) -> f64 {
    alpha.mul_add(relevance, (1.0 - alpha) * decay)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000;

    #[test]
    fn test_normalize_floor() {
        assert!((normalize(0.5, 0.5) - 0.5).abs() < f64::EPSILON);
        assert!((normalize(4.0, 8.0) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_decay_curve() {
        let now = 100 * HOUR;
        assert!(decay(None, now, 24.0).abs() < f64::EPSILON);
        assert!((decay(Some(now), now, 24.0) - 1.0).abs() < f64::EPSILON);
        assert!((decay(Some(now - 24 * HOUR), now, 24.0) - 0.5).abs() < 1e-12);
        // Clock skew clamps to zero age.
        assert!((decay(Some(now + HOUR), now, 24.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_decay_is_monotonic() {
        let now = 1_000 * HOUR;
        let newer = decay(Some(now - HOUR), now, 24.0);
        let older = decay(Some(now - 48 * HOUR), now, 24.0);
        assert!(newer > older);
        assert!(older > 0.0);
    }

    #[test]
    fn test_combine() {
        assert!((combine(0.75, 1.0, 0.0) - 0.75).abs() < 1e-12);
        assert!((combine(0.75, 0.0, 1.0) - 0.25).abs() < 1e-12);
        assert!((combine(1.0, 0.3, 1.0) - 0.3).abs() < 1e-12);
    }
}
