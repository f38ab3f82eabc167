//! Operations on the flat weight vectors of a controller.
//!
//! Every value produced here lies in the symmetric range `[-max_weight, max_weight]`.

use rand::Rng;
use rand_distr::Normal;

/// Draws `len` weights uniformly from `[-max_weight, max_weight]`.
pub fn random<R>(rng: &mut R, max_weight: f32, len: usize) -> Vec<f32>
where
    R: Rng + ?Sized,
{
    (0..len)
        .map(|_| rng.random_range(-max_weight..=max_weight))
        .collect()
}

/// Blends the weights of two parents with BLX-α crossover.
///
/// Each child weight is drawn from the interval spanned by the parents' weights, widened
/// on both sides by `alpha` times its length. With `alpha = 0.0` the child weight always
/// lies between its parents' weights.
///
/// # Panics
///
/// Panics if the parents have different lengths.
pub fn blx_alpha<R>(
    mother: &[f32],
    father: &[f32],
    alpha: f32,
    max_weight: f32,
    rng: &mut R,
) -> Vec<f32>
where
    R: Rng + ?Sized,
{
    assert_eq!(mother.len(), father.len(), "parents have different lengths");
    mother
        .iter()
        .zip(father)
        .map(|(&m, &f)| {
            let (low, high) = if m <= f { (m, f) } else { (f, m) };
            let margin = alpha * (high - low);
            rng.random_range(low - margin..=high + margin)
                .clamp(-max_weight, max_weight)
        })
        .collect()
}

/// Perturbs each weight with probability `rate` by a sample of `noise`.
pub fn mutate<R>(weights: &mut [f32], noise: Normal<f32>, max_weight: f32, rate: f64, rng: &mut R)
where
    R: Rng + ?Sized,
{
    for w in weights {
        if rng.random_bool(rate) {
            *w = (*w + rng.sample(noise)).clamp(-max_weight, max_weight);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng as _, rngs::StdRng};

    use super::*;

    #[test]
    fn test_random_stays_in_symmetric_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let weights = random(&mut rng, 0.5, 200);
        assert_eq!(weights.len(), 200);
        assert!(weights.iter().all(|w| (-0.5..=0.5).contains(w)));
        assert!(weights.iter().any(|w| *w < 0.0));
    }

    #[test]
    fn test_blx_alpha_zero_stays_between_parents() {
        let mut rng = StdRng::seed_from_u64(11);
        let p1 = [-0.4, 0.1, 0.3, 0.0];
        let p2 = [0.2, 0.1, -0.3, 0.9];
        for _ in 0..50 {
            let child = blx_alpha(&p1, &p2, 0.0, 1.0, &mut rng);
            for ((c, a), b) in child.iter().zip(p1).zip(p2) {
                assert!(*c >= f32::min(a, b) && *c <= f32::max(a, b));
            }
        }
    }

    #[test]
    fn test_blx_alpha_is_clamped() {
        let mut rng = StdRng::seed_from_u64(3);
        let p1 = [-1.0; 16];
        let p2 = [1.0; 16];
        let child = blx_alpha(&p1, &p2, 2.0, 1.0, &mut rng);
        assert!(child.iter().all(|w| (-1.0..=1.0).contains(w)));
    }

    #[test]
    #[should_panic(expected = "parents have different lengths")]
    fn test_blx_alpha_rejects_mismatched_parents() {
        let mut rng = StdRng::seed_from_u64(3);
        let _ = blx_alpha(&[0.0, 1.0], &[0.0], 0.5, 1.0, &mut rng);
    }

    #[test]
    fn test_mutate_rate_zero_is_identity() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut weights = vec![0.25, -0.5, 0.75];
        let noise = Normal::new(0.0, 10.0).unwrap();
        mutate(&mut weights, noise, 1.0, 0.0, &mut rng);
        assert_eq!(weights, vec![0.25, -0.5, 0.75]);
    }

    #[test]
    fn test_mutate_rate_one_changes_and_clamps() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut weights = vec![0.0; 32];
        let noise = Normal::new(0.0, 10.0).unwrap();
        mutate(&mut weights, noise, 1.0, 1.0, &mut rng);
        assert!(weights.iter().any(|w| *w != 0.0));
        assert!(weights.iter().all(|w| (-1.0..=1.0).contains(w)));
    }
}
