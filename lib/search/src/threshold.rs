use serde::{Deserialize, Serialize};

/// Keyword counts up to `up_to` (inclusive) allow pre-filtering for
/// structured results of at most `threshold` ids. `None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdBand {
    pub up_to: Option<usize>,
    pub threshold: usize,
}

impl ThresholdBand {
    pub const fn new(up_to: Option<usize>, threshold: usize) -> Self {
        Self { up_to, threshold }
    }
}

pub fn default_bands() -> Vec<ThresholdBand> {
    vec![
        ThresholdBand::new(Some(1), 1000),
        ThresholdBand::new(Some(3), 500),
        ThresholdBand::new(None, 200),
    ]
}

/// Largest structured result that is still pushed into the vector search
/// as a pre-filter. Non-increasing in `keyword_count` for valid bands.
pub fn adaptive_threshold(keyword_count: usize, bands: &[ThresholdBand]) -> usize {
    bands
        .iter()
        .find(|band| band.up_to.map_or(true, |limit| keyword_count <= limit))
        .or_else(|| bands.last())
        .map_or(0, |band| band.threshold)
}

/// Bands must be ordered by `up_to`, end unbounded and never raise the threshold
pub fn validate_bands(bands: &[ThresholdBand]) -> Result<(), String> {
    let last = bands.last().ok_or_else(|| "at least one threshold band is required".to_string())?;
    if last.up_to.is_some() {
        return Err("the last threshold band must be unbounded".into());
    }
    for pair in bands.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        match (a.up_to, b.up_to) {
            (None, _) => return Err("only the last threshold band may be unbounded".into()),
            (Some(x), Some(y)) if y <= x => return Err("threshold bands must be ordered by up_to".into()),
            _ => {}
        }
        if b.threshold > a.threshold {
            return Err("thresholds must not increase with keyword count".into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bands() {
        let bands = default_bands();
        assert_eq!(adaptive_threshold(0, &bands), 1000);
        assert_eq!(adaptive_threshold(1, &bands), 1000);
        assert_eq!(adaptive_threshold(2, &bands), 500);
        assert_eq!(adaptive_threshold(3, &bands), 500);
        assert_eq!(adaptive_threshold(4, &bands), 200);
        assert_eq!(adaptive_threshold(40, &bands), 200);
    }

    #[test]
    fn test_monotone_non_increasing() {
        let bands = default_bands();
        let values: Vec<usize> = (0..20).map(|k| adaptive_threshold(k, &bands)).collect();
        assert!(values.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_validate_bands() {
        assert!(validate_bands(&default_bands()).is_ok());
        assert!(validate_bands(&[]).is_err());
        assert!(validate_bands(&[ThresholdBand::new(Some(2), 100)]).is_err());
        assert!(validate_bands(&[ThresholdBand::new(Some(2), 100), ThresholdBand::new(None, 300)]).is_err());
        assert!(validate_bands(&[ThresholdBand::new(Some(3), 500), ThresholdBand::new(Some(1), 400), ThresholdBand::new(None, 1)]).is_err());
    }
}
