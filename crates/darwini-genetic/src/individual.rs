//! A single member of the population.

use std::{cmp::Ordering, io, path::Path};

use darwini_controller::Controller;
use rand::Rng;

use crate::{arena::Arena, error::SimulationError, storage::Storage};

/// Fitness given to individuals whose fight failed.
///
/// Failed individuals always rank after every successfully evaluated one.
pub const FAILED_FITNESS: f64 = f64::NEG_INFINITY;

/// An evolved agent: an identifying index, a controller and a fitness score.
///
/// Fitness is undefined until the individual has fought.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual<C> {
    index: usize,
    controller: C,
    fitness: Option<f64>,
    /// Set when the last attempt to persist this individual failed.
    stale: bool,
}

impl<C> Individual<C>
where
    C: Controller,
{
    /// Creates an individual with a freshly randomized controller.
    pub fn random<R>(index: usize, params: &C::Params, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        Self::new(index, C::random(params, rng))
    }

    /// Creates an individual whose controller is a recombination of two parents.
    pub fn bred<R>(index: usize, params: &C::Params, mother: &C, father: &C, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        Self::new(index, C::recombine(params, mother, father, rng))
    }

    /// Persists the controller at `path`.
    pub fn save(&self, storage: &dyn Storage, path: &Path) -> io::Result<()> {
        let blob = self.controller.to_blob().map_err(io::Error::other)?;
        storage.write(path, &blob)
    }

    /// Loads an individual with the given index from the controller persisted at `path`.
    pub fn load(index: usize, storage: &dyn Storage, path: &Path) -> io::Result<Self> {
        let blob = storage.read(path)?;
        let controller =
            C::from_blob(&blob).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self::new(index, controller))
    }
}

impl<C> Individual<C> {
    #[must_use]
    pub fn new(index: usize, controller: C) -> Self {
        Self {
            index,
            controller,
            fitness: None,
            stale: false,
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    #[must_use]
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Returns `true` if the persisted record of this individual may not match its
    /// controller, because the last attempt to persist it failed.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub(crate) fn set_stale(&mut self, stale: bool) {
        self.stale = stale;
    }

    /// Returns the fitness computed by the last fight, if any.
    #[must_use]
    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    /// Runs the fight simulation and stores the resulting fitness.
    ///
    /// A failed fight, or one producing `NaN`, leaves the individual with
    /// [`FAILED_FITNESS`] and returns the error.
    pub fn fight<A>(&mut self, arena: &A) -> Result<f64, SimulationError>
    where
        A: Arena<C> + ?Sized,
    {
        let result = arena
            .fight(self.index, &self.controller)
            .and_then(|fitness| {
                if fitness.is_nan() {
                    Err(SimulationError::new("simulation produced a NaN fitness"))
                } else {
                    Ok(fitness)
                }
            });
        self.fitness = Some(*result.as_ref().unwrap_or(&FAILED_FITNESS));
        result
    }

    /// Value used for ranking: unevaluated individuals rank with failed ones.
    fn rank_key(&self) -> f64 {
        self.fitness.unwrap_or(FAILED_FITNESS)
    }

    /// Compares two individuals for ranking, best first.
    ///
    /// This is a total order on fitness in descending order: sorting with it puts the
    /// fittest individual first, and equal fitness compares as [`Ordering::Equal`] so that
    /// stable sorts keep the prior relative order.
    #[must_use]
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other.rank_key().total_cmp(&self.rank_key())
    }
}

#[cfg(test)]
mod tests {
    use darwini_controller::perceptron::{Perceptron, PerceptronParams};
    use rand::{SeedableRng as _, rngs::StdRng};

    use super::*;
    use crate::storage::MemoryStorage;

    fn individual(index: usize, fitness: Option<f64>) -> Individual<u32> {
        Individual {
            index,
            controller: 0,
            fitness,
            stale: false,
        }
    }

    #[test]
    fn test_fight_stores_fitness() {
        let mut ind = individual(4, None);
        let arena = |index: usize, _: &u32| -> Result<f64, SimulationError> {
            Ok(f64::from(u32::try_from(index).unwrap()) * 2.0)
        };
        assert_eq!(ind.fight(&arena), Ok(8.0));
        assert_eq!(ind.fitness(), Some(8.0));
    }

    #[test]
    fn test_failed_fight_gets_worst_fitness() {
        let mut ind = individual(1, Some(3.0));
        let arena = |_: usize, _: &u32| -> Result<f64, SimulationError> {
            Err(SimulationError::new("robot crashed"))
        };
        assert!(ind.fight(&arena).is_err());
        assert_eq!(ind.fitness(), Some(FAILED_FITNESS));

        let nan_arena = |_: usize, _: &u32| -> Result<f64, SimulationError> { Ok(f64::NAN) };
        assert!(ind.fight(&nan_arena).is_err());
        assert_eq!(ind.fitness(), Some(FAILED_FITNESS));
    }

    #[test]
    fn test_rank_cmp_is_descending_and_stable() {
        let mut members = vec![
            individual(1, Some(1.0)),
            individual(2, None),
            individual(3, Some(5.0)),
            individual(4, Some(1.0)),
            individual(5, Some(FAILED_FITNESS)),
            individual(6, Some(-2.0)),
        ];
        members.sort_by(Individual::rank_cmp);
        let order = members.iter().map(Individual::index).collect::<Vec<_>>();
        assert_eq!(order, vec![3, 1, 4, 6, 2, 5]);

        members.sort_by(Individual::rank_cmp);
        let again = members.iter().map(Individual::index).collect::<Vec<_>>();
        assert_eq!(again, order);
    }

    #[test]
    fn test_save_and_load() {
        let params = PerceptronParams::with_layers(vec![2, 3, 1]).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let storage = MemoryStorage::new();
        storage.create_dir_all(Path::new("/pop")).unwrap();
        let path = Path::new("/pop/Individual2.json");

        let ind = Individual::<Perceptron>::random(2, &params, &mut rng);
        ind.save(&storage, path).unwrap();
        let loaded = Individual::<Perceptron>::load(5, &storage, path).unwrap();
        assert_eq!(loaded.index(), 5);
        assert_eq!(loaded.controller(), ind.controller());
        assert_eq!(loaded.fitness(), None);

        storage.write(path, b"garbage").unwrap();
        let err = Individual::<Perceptron>::load(5, &storage, path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_bred_individual_has_fresh_fitness() {
        let params = PerceptronParams::with_layers(vec![2, 2]).unwrap();
        let mut rng = StdRng::seed_from_u64(10);
        let mother = Perceptron::random(&params, &mut rng);
        let father = Perceptron::random(&params, &mut rng);
        let child = Individual::bred(7, &params, &mother, &father, &mut rng);
        assert_eq!(child.index(), 7);
        assert_eq!(child.fitness(), None);
        assert_eq!(child.controller().shape(), vec![2, 2]);
    }
}
