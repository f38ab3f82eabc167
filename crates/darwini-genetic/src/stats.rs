//! Summary statistics of a generation's fitness.

/// Summary of the fitness values of a generation.
#[derive(Debug, Clone, PartialEq)]
pub struct FitnessStats {
    pub min: f64,
    pub max: f64,
    /// Arithmetic mean.
    pub mean: f64,
    /// Upper median for even counts.
    pub median: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

impl FitnessStats {
    /// Computes fitness statistics, or `None` for an empty generation.
    ///
    /// # Examples
    ///
    /// ```
    /// # use darwini_genetic::stats::FitnessStats;
    /// let stats = FitnessStats::new([5.0, 1.0, 9.0, 2.0]).unwrap();
    /// assert_eq!(stats.min, 1.0);
    /// assert_eq!(stats.max, 9.0);
    /// assert_eq!(stats.mean, 4.25);
    /// assert_eq!(stats.median, 5.0);
    /// ```
    #[must_use]
    pub fn new<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut values = values.into_iter().collect::<Vec<_>>();
        values.sort_by(f64::total_cmp);

        let min = *values.first()?;
        let max = *values.last()?;
        let mean = mean(&values)?;
        let median = values[values.len() / 2];
        let variance = mean_of(values.iter().map(|v| (v - mean).powi(2)), values.len());
        Some(Self {
            min,
            max,
            mean,
            median,
            std_dev: variance.sqrt(),
        })
    }
}

/// Arithmetic mean of `values`, or `None` if empty.
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(mean_of(values.iter().copied(), values.len()))
}

#[expect(clippy::cast_precision_loss)]
fn mean_of<I>(values: I, count: usize) -> f64
where
    I: Iterator<Item = f64>,
{
    values.sum::<f64>() / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(FitnessStats::new([]), None);
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_single_value() {
        let stats = FitnessStats::new([3.5]).unwrap();
        assert_eq!(stats.min, 3.5);
        assert_eq!(stats.max, 3.5);
        assert_eq!(stats.mean, 3.5);
        assert_eq!(stats.median, 3.5);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn test_std_dev() {
        let stats = FitnessStats::new([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.std_dev, 2.0);
    }
}
