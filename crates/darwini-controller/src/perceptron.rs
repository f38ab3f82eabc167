//! Feed-forward multi-layer perceptron controller.
//!
//! A [`Perceptron`] is a stack of fully connected layers with `tanh` activation. Its shape
//! is described by the list of layer sizes, inputs first and outputs last: a shape of
//! `[4, 6, 2]` has 4 inputs, one hidden layer of 6 neurons and 2 outputs.
//!
//! # Recombination
//!
//! A child perceptron is built layer by layer:
//!
//! 1. **Crossover** - every weight and bias is drawn with BLX-α between the two parents
//! 2. **Mutation** - each value is perturbed by Gaussian noise with probability
//!    `mutation_rate`
//!
//! All values stay within `[-max_weight, max_weight]`.
//!
//! # Persisted Form
//!
//! Perceptrons are persisted as pretty-printed JSON. Encoding is deterministic, so a
//! perceptron that is saved, loaded and saved again produces the same bytes.

use rand::Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::{Controller, ControllerError, weights};

const DEFAULT_MAX_WEIGHT: f32 = 1.0;
const DEFAULT_BLX_ALPHA: f32 = 0.2;
const DEFAULT_MUTATION_RATE: f32 = 0.3;
const DEFAULT_MUTATION_SIGMA: f32 = 0.05;

/// Validated settings shared by all perceptrons of a population.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PerceptronParamsDef", into = "PerceptronParamsDef")]
pub struct PerceptronParams {
    layer_sizes: Vec<usize>,
    max_weight: f32,
    blx_alpha: f32,
    mutation_rate: f32,
    mutation_noise: Normal<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PerceptronParamsDef {
    layer_sizes: Vec<usize>,
    #[serde(default = "default_max_weight")]
    max_weight: f32,
    #[serde(default = "default_blx_alpha")]
    blx_alpha: f32,
    #[serde(default = "default_mutation_rate")]
    mutation_rate: f32,
    #[serde(default = "default_mutation_sigma")]
    mutation_sigma: f32,
}

fn default_max_weight() -> f32 {
    DEFAULT_MAX_WEIGHT
}

fn default_blx_alpha() -> f32 {
    DEFAULT_BLX_ALPHA
}

fn default_mutation_rate() -> f32 {
    DEFAULT_MUTATION_RATE
}

fn default_mutation_sigma() -> f32 {
    DEFAULT_MUTATION_SIGMA
}

impl TryFrom<PerceptronParamsDef> for PerceptronParams {
    type Error = ControllerError;

    fn try_from(def: PerceptronParamsDef) -> Result<Self, Self::Error> {
        PerceptronParams::new(
            def.layer_sizes,
            def.max_weight,
            def.blx_alpha,
            def.mutation_rate,
            def.mutation_sigma,
        )
    }
}

impl From<PerceptronParams> for PerceptronParamsDef {
    fn from(params: PerceptronParams) -> Self {
        Self {
            mutation_sigma: params.mutation_sigma(),
            layer_sizes: params.layer_sizes,
            max_weight: params.max_weight,
            blx_alpha: params.blx_alpha,
            mutation_rate: params.mutation_rate,
        }
    }
}

fn invalid(reason: impl Into<String>) -> ControllerError {
    ControllerError::InvalidParams {
        reason: reason.into(),
    }
}

impl PerceptronParams {
    /// Creates perceptron settings.
    ///
    /// # Arguments
    ///
    /// * `layer_sizes` - Neurons per layer, inputs first (at least two non-zero sizes)
    /// * `max_weight` - Bound of the symmetric weight range (must be positive)
    /// * `blx_alpha` - BLX-α crossover range expansion (must be non-negative)
    /// * `mutation_rate` - Probability of mutating each value, in `[0, 1]`
    /// * `mutation_sigma` - Standard deviation of the Gaussian mutation noise
    pub fn new(
        layer_sizes: Vec<usize>,
        max_weight: f32,
        blx_alpha: f32,
        mutation_rate: f32,
        mutation_sigma: f32,
    ) -> Result<Self, ControllerError> {
        if layer_sizes.len() < 2 {
            return Err(invalid("a perceptron needs at least an input and an output layer"));
        }
        if layer_sizes.contains(&0) {
            return Err(invalid("layer sizes must be non-zero"));
        }
        if !(max_weight.is_finite() && max_weight > 0.0) {
            return Err(invalid(format!("max_weight must be positive, got {max_weight}")));
        }
        if !(blx_alpha.is_finite() && blx_alpha >= 0.0) {
            return Err(invalid(format!("blx_alpha must be non-negative, got {blx_alpha}")));
        }
        if !(0.0..=1.0).contains(&mutation_rate) {
            return Err(invalid(format!(
                "mutation_rate must be within [0, 1], got {mutation_rate}"
            )));
        }
        let mutation_noise = Normal::new(0.0, mutation_sigma)
            .ok()
            .filter(|_| mutation_sigma.is_finite())
            .ok_or_else(|| {
                invalid(format!(
                    "mutation_sigma must be finite and non-negative, got {mutation_sigma}"
                ))
            })?;
        Ok(Self {
            layer_sizes,
            max_weight,
            blx_alpha,
            mutation_rate,
            mutation_noise,
        })
    }

    /// Creates perceptron settings with default recombination parameters.
    pub fn with_layers(layer_sizes: Vec<usize>) -> Result<Self, ControllerError> {
        Self::new(
            layer_sizes,
            DEFAULT_MAX_WEIGHT,
            DEFAULT_BLX_ALPHA,
            DEFAULT_MUTATION_RATE,
            DEFAULT_MUTATION_SIGMA,
        )
    }

    #[must_use]
    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    #[must_use]
    pub fn max_weight(&self) -> f32 {
        self.max_weight
    }

    #[must_use]
    pub fn blx_alpha(&self) -> f32 {
        self.blx_alpha
    }

    #[must_use]
    pub fn mutation_rate(&self) -> f32 {
        self.mutation_rate
    }

    #[must_use]
    pub fn mutation_sigma(&self) -> f32 {
        self.mutation_noise.std_dev()
    }
}

/// A fully connected layer: `outputs × inputs` weights (row-major) and one bias per output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Layer {
    inputs: usize,
    outputs: usize,
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl Layer {
    fn random<R>(inputs: usize, outputs: usize, max_weight: f32, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        Self {
            inputs,
            outputs,
            weights: weights::random(rng, max_weight, inputs * outputs),
            biases: weights::random(rng, max_weight, outputs),
        }
    }

    fn recombine<R>(params: &PerceptronParams, mother: &Self, father: &Self, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let mut child = |m: &[f32], f: &[f32]| {
            let mut values =
                weights::blx_alpha(m, f, params.blx_alpha, params.max_weight, &mut *rng);
            weights::mutate(
                &mut values,
                params.mutation_noise,
                params.max_weight,
                params.mutation_rate.into(),
                &mut *rng,
            );
            values
        };
        let weights = child(&mother.weights, &father.weights);
        let biases = child(&mother.biases, &father.biases);
        Self {
            inputs: mother.inputs,
            outputs: mother.outputs,
            weights,
            biases,
        }
    }

    fn forward(&self, inputs: &[f32]) -> Vec<f32> {
        self.weights
            .chunks_exact(self.inputs)
            .zip(&self.biases)
            .map(|(row, bias)| {
                let sum = row.iter().zip(inputs).map(|(w, x)| w * x).sum::<f32>();
                (bias + sum).tanh()
            })
            .collect()
    }
}

/// A feed-forward multi-layer perceptron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Perceptron {
    layers: Vec<Layer>,
}

impl Perceptron {
    /// Returns the layer sizes of this perceptron, inputs first.
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = Vec::with_capacity(self.layers.len() + 1);
        if let Some(first) = self.layers.first() {
            shape.push(first.inputs);
        }
        shape.extend(self.layers.iter().map(|layer| layer.outputs));
        shape
    }

    /// Computes the outputs of the perceptron for the given inputs.
    ///
    /// # Panics
    ///
    /// Panics if `inputs` does not match the input layer size.
    #[must_use]
    pub fn forward(&self, inputs: &[f32]) -> Vec<f32> {
        assert_eq!(inputs.len(), self.shape()[0], "input size mismatch");
        self.layers
            .iter()
            .fold(inputs.to_vec(), |values, layer| layer.forward(&values))
    }

    fn validate(&self) -> Result<(), ControllerError> {
        let malformed = |reason: String| ControllerError::Malformed { reason };
        if self.layers.is_empty() {
            return Err(malformed("perceptron has no layers".to_owned()));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.inputs == 0 || layer.outputs == 0 {
                return Err(malformed(format!("layer {i} has a zero size")));
            }
            if layer.weights.len() != layer.inputs * layer.outputs {
                return Err(malformed(format!(
                    "layer {i} has {} weights, expected {}",
                    layer.weights.len(),
                    layer.inputs * layer.outputs
                )));
            }
            if layer.biases.len() != layer.outputs {
                return Err(malformed(format!(
                    "layer {i} has {} biases, expected {}",
                    layer.biases.len(),
                    layer.outputs
                )));
            }
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[0].outputs != pair[1].inputs {
                return Err(malformed(format!(
                    "layer {} outputs {} values but layer {} expects {}",
                    i,
                    pair[0].outputs,
                    i + 1,
                    pair[1].inputs
                )));
            }
        }
        Ok(())
    }
}

impl Controller for Perceptron {
    type Params = PerceptronParams;

    fn random<R>(params: &PerceptronParams, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let layers = params
            .layer_sizes
            .windows(2)
            .map(|pair| Layer::random(pair[0], pair[1], params.max_weight, &mut *rng))
            .collect();
        Self { layers }
    }

    /// # Panics
    ///
    /// Panics if the parents have different shapes.
    fn recombine<R>(params: &PerceptronParams, mother: &Self, father: &Self, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        assert_eq!(mother.shape(), father.shape(), "parent shapes differ");
        let layers = mother
            .layers
            .iter()
            .zip(&father.layers)
            .map(|(m, f)| Layer::recombine(params, m, f, &mut *rng))
            .collect();
        Self { layers }
    }

    fn check_params(&self, params: &PerceptronParams) -> Result<(), ControllerError> {
        let actual = self.shape();
        if actual != params.layer_sizes {
            return Err(ControllerError::ShapeMismatch {
                expected: params.layer_sizes.clone(),
                actual,
            });
        }
        Ok(())
    }

    fn to_blob(&self) -> Result<Vec<u8>, ControllerError> {
        serde_json::to_vec_pretty(self).map_err(|source| ControllerError::Encode { source })
    }

    fn from_blob(bytes: &[u8]) -> Result<Self, ControllerError> {
        let perceptron: Perceptron =
            serde_json::from_slice(bytes).map_err(|source| ControllerError::Decode { source })?;
        perceptron.validate()?;
        Ok(perceptron)
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng as _, rngs::StdRng};

    use super::*;

    fn params() -> PerceptronParams {
        PerceptronParams::with_layers(vec![3, 5, 2]).unwrap()
    }

    #[test]
    fn test_random_has_requested_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let perceptron = Perceptron::random(&params(), &mut rng);
        assert_eq!(perceptron.shape(), vec![3, 5, 2]);
        assert!(perceptron.check_params(&params()).is_ok());
    }

    #[test]
    fn test_forward_outputs_are_bounded() {
        let mut rng = StdRng::seed_from_u64(2);
        let perceptron = Perceptron::random(&params(), &mut rng);
        let outputs = perceptron.forward(&[1.0, -2.0, 0.5]);
        assert_eq!(outputs.len(), 2);
        assert!(outputs.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_recombine_without_exploration_stays_between_parents() {
        let params = PerceptronParams::new(vec![2, 3], 1.0, 0.0, 0.0, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mother = Perceptron::random(&params, &mut rng);
        let father = Perceptron::random(&params, &mut rng);
        let child = Perceptron::recombine(&params, &mother, &father, &mut rng);

        let (m, f, c) = (&mother.layers[0], &father.layers[0], &child.layers[0]);
        for ((cw, mw), fw) in c.weights.iter().zip(&m.weights).zip(&f.weights) {
            assert!(*cw >= mw.min(*fw) && *cw <= mw.max(*fw));
        }
        assert_eq!(child.shape(), mother.shape());
    }

    #[test]
    fn test_check_params_detects_shape_mismatch() {
        let mut rng = StdRng::seed_from_u64(4);
        let perceptron = Perceptron::random(&params(), &mut rng);
        let other = PerceptronParams::with_layers(vec![3, 2]).unwrap();
        assert!(matches!(
            perceptron.check_params(&other),
            Err(ControllerError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_blob_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(5);
        let perceptron = Perceptron::random(&params(), &mut rng);
        let blob = perceptron.to_blob().unwrap();
        let decoded = Perceptron::from_blob(&blob).unwrap();
        assert_eq!(decoded, perceptron);
        assert_eq!(decoded.to_blob().unwrap(), blob);
    }

    #[test]
    fn test_from_blob_rejects_inconsistent_layers() {
        let blob = br#"{"layers":[{"inputs":2,"outputs":2,"weights":[0.1],"biases":[0.0,0.0]}]}"#;
        assert!(matches!(
            Perceptron::from_blob(blob),
            Err(ControllerError::Malformed { .. })
        ));
        assert!(matches!(
            Perceptron::from_blob(b"not json"),
            Err(ControllerError::Decode { .. })
        ));
    }

    #[test]
    fn test_params_validation() {
        assert!(PerceptronParams::with_layers(vec![4]).is_err());
        assert!(PerceptronParams::with_layers(vec![4, 0, 2]).is_err());
        assert!(PerceptronParams::new(vec![2, 2], 0.0, 0.2, 0.3, 0.05).is_err());
        assert!(PerceptronParams::new(vec![2, 2], 1.0, -0.1, 0.3, 0.05).is_err());
        assert!(PerceptronParams::new(vec![2, 2], 1.0, 0.2, 1.5, 0.05).is_err());
        assert!(PerceptronParams::new(vec![2, 2], 1.0, 0.2, 0.3, -1.0).is_err());
        assert!(PerceptronParams::new(vec![2, 2], 1.0, 0.2, 0.3, f32::NAN).is_err());
    }

    #[test]
    fn test_params_deserialize_with_defaults() {
        let params: PerceptronParams =
            serde_json::from_str(r#"{"layer_sizes":[6,4,1],"mutation_rate":0.1}"#).unwrap();
        assert_eq!(params.layer_sizes(), &[6, 4, 1]);
        assert!((params.mutation_rate() - 0.1).abs() < f32::EPSILON);
        assert!((params.max_weight() - DEFAULT_MAX_WEIGHT).abs() < f32::EPSILON);
        assert!((params.mutation_sigma() - DEFAULT_MUTATION_SIGMA).abs() < f32::EPSILON);

        let invalid = serde_json::from_str::<PerceptronParams>(r#"{"layer_sizes":[6]}"#);
        assert!(invalid.is_err());
    }
}
