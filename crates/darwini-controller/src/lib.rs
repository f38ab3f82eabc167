//! Trainable decision models evolved by the Darwini genetic algorithm.
//!
//! The evolution engine (`darwini-genetic`) never looks inside a controller. It only
//! needs four capabilities, expressed by the [`Controller`] trait:
//!
//! - **Random initialization** - the first generation is made of random controllers
//! - **Recombination** - a child controller is produced from two parent controllers
//! - **Encoding** - a controller is persisted as an opaque byte blob
//! - **Decoding** - a persisted blob is turned back into a controller
//!
//! # Architecture
//!
//! ```text
//! Population (darwini-genetic)
//!     ↓ owns
//! Individual
//!     ↓ owns
//! Controller (this crate)
//!     ↓ evaluated by
//! Arena (fight simulation)
//!     ↓ produces
//! Fitness Score
//! ```
//!
//! # Provided Controllers
//!
//! - [`perceptron::Perceptron`] - A feed-forward multi-layer perceptron whose weights are
//!   recombined with BLX-α crossover and Gaussian mutation (see [`weights`])
//!
//! # Example
//!
//! ```
//! use darwini_controller::{
//!     Controller as _,
//!     perceptron::{Perceptron, PerceptronParams},
//! };
//!
//! let params = PerceptronParams::with_layers(vec![4, 6, 2]).unwrap();
//! let mut rng = rand::rng();
//!
//! let mother = Perceptron::random(&params, &mut rng);
//! let father = Perceptron::random(&params, &mut rng);
//! let child = Perceptron::recombine(&params, &mother, &father, &mut rng);
//!
//! let blob = child.to_blob().unwrap();
//! assert_eq!(Perceptron::from_blob(&blob).unwrap(), child);
//! ```

use std::fmt;

use rand::Rng;

pub mod perceptron;
pub mod weights;

/// Errors produced while configuring, encoding or decoding controllers.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ControllerError {
    #[display("invalid controller parameters: {reason}")]
    InvalidParams { reason: String },
    #[display("controller shape {actual:?} does not match the expected shape {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[display("malformed controller blob: {reason}")]
    Malformed { reason: String },
    #[display("failed to encode controller")]
    Encode { source: serde_json::Error },
    #[display("failed to decode controller")]
    Decode { source: serde_json::Error },
}

/// A trainable decision model that can be evolved by the genetic algorithm.
///
/// Implementations own their internal representation entirely; the evolution engine
/// only creates, recombines and persists them.
pub trait Controller: fmt::Debug + Send + Sync + Sized {
    /// Settings shared by every controller of a population (shape, mutation rates, ...).
    type Params: fmt::Debug + Send + Sync;

    /// Creates a controller with randomly initialized internal state.
    fn random<R>(params: &Self::Params, rng: &mut R) -> Self
    where
        R: Rng + ?Sized;

    /// Produces an offspring controller from two parent controllers.
    ///
    /// Both parents must have been created with the same `params`.
    fn recombine<R>(params: &Self::Params, mother: &Self, father: &Self, rng: &mut R) -> Self
    where
        R: Rng + ?Sized;

    /// Checks that this controller can take part in a population configured with `params`.
    fn check_params(&self, params: &Self::Params) -> Result<(), ControllerError>;

    /// Encodes the controller as a persisted blob.
    ///
    /// Encoding must be deterministic: equal controllers produce identical blobs.
    fn to_blob(&self) -> Result<Vec<u8>, ControllerError>;

    /// Decodes a controller from a blob produced by [`Controller::to_blob`].
    fn from_blob(bytes: &[u8]) -> Result<Self, ControllerError>;
}
