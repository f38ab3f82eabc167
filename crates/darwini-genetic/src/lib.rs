//! Generational evolution engine for populations of trainable controllers.
//!
//! This crate evolves a population of individuals, each wrapping a
//! [`Controller`](darwini_controller::Controller), with a genetic algorithm. Individuals are
//! evaluated by a fight simulation ([`arena::Arena`]), ranked by fitness, the weakest are
//! culled, and the survivors are recombined to repopulate.
//!
//! # How Evolution Works
//!
//! 1. **Bootstrap** - Create `size` individuals with random controllers
//! 2. **Evaluate** - Every individual fights and receives a fitness score
//! 3. **Rank** - Individuals are sorted by fitness, best first
//! 4. **Survive** - The best `nb_survivors` individuals are kept and renumbered `1..=nb_survivors`
//! 5. **Breed** - Each free slot receives a child of two distinct random survivors
//! 6. **Repeat** - Continue for as many generations as needed
//!
//! # Persistence
//!
//! Every individual has a durable record in the population directory (see
//! [`config::StorageLayout`]). Survivor records are carried across the cull with a
//! two-phase commit, described in the [`population`] module. The best controller can be
//! exported to the robot directory for the live simulation with
//! [`Population::best_individual`](population::Population::best_individual).
//!
//! Storage is abstracted by [`storage::Storage`], with a filesystem implementation
//! ([`storage::FsStorage`]) and an in-memory one ([`storage::MemoryStorage`]).
//!
//! # Example
//!
//! ```
//! use darwini_controller::perceptron::{Perceptron, PerceptronParams};
//! use darwini_genetic::{
//!     config::PopulationConfig,
//!     error::SimulationError,
//!     population::Population,
//!     storage::MemoryStorage,
//! };
//!
//! let config = PopulationConfig::new(10, 3);
//! let params = PerceptronParams::with_layers(vec![2, 4, 1]).unwrap();
//! let mut rng = rand::rng();
//! let mut population =
//!     Population::<Perceptron, _>::new(config, params, MemoryStorage::new(), &mut rng).unwrap();
//!
//! // Reward perceptrons answering 1.0 to the input [1.0, 1.0]
//! let arena = |_index: usize, perceptron: &Perceptron| -> Result<f64, SimulationError> {
//!     Ok(f64::from(perceptron.forward(&[1.0, 1.0])[0]))
//! };
//!
//! for _ in 0..5 {
//!     population.evaluate(&arena);
//!     let report = population.advance(&mut rng);
//!     assert!(report.warnings.is_empty());
//! }
//! population.evaluate(&arena);
//!
//! let best = population.best_individual();
//! assert!(best.export_warning.is_none());
//! assert_eq!(population.generation(), 6);
//! ```
//!
//! # Logging
//!
//! Progress is reported with [`tracing`] events: generation milestones at `info` level,
//! storage failures and failed fights at `warn` level, and per-individual details at
//! `debug` level. Installing a subscriber is left to the application.

pub mod arena;
pub mod config;
pub mod error;
pub mod individual;
pub mod population;
pub mod stats;
pub mod storage;
