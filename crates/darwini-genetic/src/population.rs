//! Generational evolution of a population of individuals.
//!
//! # Generation Cycle
//!
//! ```text
//! evaluate()  every individual fights, fitness is refreshed
//!     ↓
//! advance()
//!     RANKED              members sorted by fitness, best first
//!     SURVIVORS_SNAPSHOT  survivors' records copied to the transient namespace, re-indexed 1..=K
//!     CULLED              every live record deleted, members truncated to K
//!     SURVIVORS_RESTORED  transient records renamed into the live namespace
//!     REPOPULATED         children bred from two distinct survivors fill indices K+1..=N
//!     generation + 1
//! ```
//!
//! # Persistence Protocol
//!
//! Survivors are persisted with a two-phase commit over the population directory. The
//! live record of a survivor may sit at the very path its renumbered record will use, so
//! survivors are first staged under transient names, the whole old generation is deleted,
//! and the staged records are committed by rename.
//!
//! Storage failures during an advancement never stop evolution: each failure becomes a
//! [`PersistenceWarning`] in the returned [`AdvanceReport`], and the in-memory population
//! remains the authoritative state.
//!
//! An individual whose record could not be written is flagged
//! [stale](crate::individual::Individual::is_stale). A stale survivor is staged from its
//! in-memory controller instead of its live record, so the next successful advancement
//! overwrites the stale record.
//!
//! # Parallelization
//!
//! Fights and child recombinations run on scoped threads, one per individual. Parents are
//! drawn sequentially from the caller's RNG; each recombination then runs on its own
//! [`Pcg64Mcg`] stream seeded from it, so a seeded caller RNG gives reproducible
//! generations.

use std::{io, panic, path::PathBuf, thread};

use chrono::{DateTime, Utc};
use darwini_controller::Controller;
use rand::{Rng, SeedableRng as _};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    arena::Arena,
    config::{PopulationConfig, StorageLayout},
    error::{PersistenceWarning, PopulationError, RestoreError, SimulationError, StorageOp},
    individual::Individual,
    stats::{self, FitnessStats},
    storage::Storage,
};

/// Mutable part of a population: the generation counter and its members.
#[derive(Debug, Clone)]
pub struct EvolutionState<C> {
    generation: usize,
    members: Vec<Individual<C>>,
}

impl<C> EvolutionState<C> {
    /// Index of the current generation, starting at 1.
    #[must_use]
    pub fn generation(&self) -> usize {
        self.generation
    }

    #[must_use]
    pub fn members(&self) -> &[Individual<C>] {
        &self.members
    }
}

/// A fight that failed during [`Population::evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub struct FightFailure {
    pub index: usize,
    pub error: SimulationError,
}

/// Outcome of [`Population::evaluate`].
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub generation: usize,
    /// Mean fitness of every member, equal to [`Population::average_fitness`].
    ///
    /// A single failed fight makes it [`FAILED_FITNESS`](crate::individual::FAILED_FITNESS).
    pub mean: f64,
    /// Fitness summary of the successful fights, `None` if every fight failed.
    pub stats: Option<FitnessStats>,
    pub failures: Vec<FightFailure>,
}

/// Parents drawn for one child.
///
/// `mother` and `father` are the survivors' indices in the new generation, always distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lineage {
    pub child: usize,
    pub mother: usize,
    pub father: usize,
}

/// Outcome of [`Population::advance`].
#[derive(Debug)]
pub struct AdvanceReport {
    /// Index of the generation that was just produced.
    pub generation: usize,
    pub lineage: Vec<Lineage>,
    /// Storage operations that failed during the transition.
    pub warnings: Vec<PersistenceWarning>,
}

/// Outcome of [`Population::best_individual`].
#[derive(Debug)]
pub struct BestIndividual<'a, C> {
    pub individual: &'a Individual<C>,
    /// Set when the active controller could not be exported.
    pub export_warning: Option<PersistenceWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PopulationMetadata {
    generation: usize,
    size: usize,
    nb_survivors: usize,
    updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct BreedingPlan {
    index: usize,
    mother: usize,
    father: usize,
    rng: Pcg64Mcg,
}

/// A population evolving across generations.
#[derive(Debug)]
pub struct Population<C, S>
where
    C: Controller,
{
    config: PopulationConfig,
    params: C::Params,
    storage: S,
    state: EvolutionState<C>,
}

impl<C, S> Population<C, S>
where
    C: Controller,
    S: Storage,
{
    /// Creates generation 1: `config.size` individuals with random controllers.
    ///
    /// The population and robot directories are created if absent. Each individual is
    /// then persisted to its live record; failures to do so are logged and do not prevent
    /// the population from being created.
    #[instrument(
        level = "debug",
        skip_all,
        fields(size = config.size, nb_survivors = config.nb_survivors)
    )]
    pub fn new<R>(
        config: PopulationConfig,
        params: C::Params,
        storage: S,
        rng: &mut R,
    ) -> Result<Self, PopulationError>
    where
        R: Rng + ?Sized,
    {
        config.validate()?;
        create_dirs(&storage, &config.layout)?;

        let members = (1..=config.size)
            .map(|index| Individual::random(index, &params, &mut *rng))
            .collect();
        let mut population = Self {
            config,
            params,
            storage,
            state: EvolutionState {
                generation: 1,
                members,
            },
        };

        let mut warnings = vec![];
        let Self {
            config,
            storage,
            state,
            ..
        } = &mut population;
        for ind in &mut state.members {
            save_live(storage, &config.layout, ind, &mut warnings);
        }
        population.save_metadata(&mut warnings);
        info!(
            size = population.config.size,
            nb_survivors = population.config.nb_survivors,
            warnings = warnings.len(),
            "population created"
        );
        Ok(population)
    }

    /// Rebuilds a population from its persisted live records and metadata.
    ///
    /// Transient records left by an interrupted advancement are resolved first: they are
    /// committed if the cull had started (some live record is missing), and deleted
    /// otherwise. Fitness values are not persisted, so every restored individual is
    /// unevaluated.
    #[instrument(
        level = "debug",
        skip_all,
        fields(size = config.size, nb_survivors = config.nb_survivors)
    )]
    pub fn restore(
        config: PopulationConfig,
        params: C::Params,
        storage: S,
    ) -> Result<Self, RestoreError> {
        config.validate()?;
        create_dirs(&storage, &config.layout)?;
        let layout = &config.layout;

        let metadata_path = layout.metadata_path();
        let metadata = storage
            .read(&metadata_path)
            .and_then(|bytes| {
                serde_json::from_slice::<PopulationMetadata>(&bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            })
            .map_err(|source| RestoreError::Metadata {
                path: metadata_path.clone(),
                source,
            })?;
        if metadata.size != config.size || metadata.nb_survivors != config.nb_survivors {
            return Err(RestoreError::ConfigMismatch {
                size: config.size,
                nb_survivors: config.nb_survivors,
                found_size: metadata.size,
                found_survivors: metadata.nb_survivors,
            });
        }

        let mut warnings = vec![];
        recover_staged(&storage, &config, &mut warnings);

        let members = (1..=config.size)
            .map(|index| -> Result<Individual<C>, RestoreError> {
                let path = layout.live_path(index);
                let ind = Individual::<C>::load(index, &storage, &path)
                    .map_err(|source| RestoreError::Individual { index, path, source })?;
                ind.controller()
                    .check_params(&params)
                    .map_err(|source| RestoreError::Incompatible { index, source })?;
                Ok(ind)
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            generation = metadata.generation,
            warnings = warnings.len(),
            "population restored"
        );
        Ok(Self {
            config,
            params,
            storage,
            state: EvolutionState {
                generation: metadata.generation,
                members,
            },
        })
    }

    #[must_use]
    pub fn config(&self) -> &PopulationConfig {
        &self.config
    }

    #[must_use]
    pub fn params(&self) -> &C::Params {
        &self.params
    }

    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Consumes the population, returning its storage.
    #[must_use]
    pub fn into_storage(self) -> S {
        self.storage
    }

    #[must_use]
    pub fn state(&self) -> &EvolutionState<C> {
        &self.state
    }

    /// Index of the current generation, starting at 1.
    #[must_use]
    pub fn generation(&self) -> usize {
        self.state.generation
    }

    #[must_use]
    pub fn members(&self) -> &[Individual<C>] {
        &self.state.members
    }

    /// Makes every individual fight to refresh its fitness.
    ///
    /// Fights run in parallel. The member order is left unchanged. Individuals whose
    /// fight fails get [`FAILED_FITNESS`](crate::individual::FAILED_FITNESS) and are
    /// listed in the report.
    #[instrument(level = "debug", skip_all, fields(generation = self.state.generation))]
    pub fn evaluate<A>(&mut self, arena: &A) -> EvaluationReport
    where
        A: Arena<C> + ?Sized,
    {
        let generation = self.state.generation;
        info!("making generation {generation} fight");

        let outcomes = thread::scope(|s| {
            let handles = self
                .state
                .members
                .iter_mut()
                .map(|ind| s.spawn(move || (ind.index(), ind.fight(arena))))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| panic::resume_unwind(payload))
                })
                .collect::<Vec<_>>()
        });

        let mut failures = vec![];
        for (index, outcome) in outcomes {
            match outcome {
                Ok(fitness) => debug!(index, fitness, "fight finished"),
                Err(error) => {
                    warn!(index, %error, "fight failed, ranking individual last");
                    failures.push(FightFailure { index, error });
                }
            }
        }

        let mean = self.average_fitness();
        let stats = FitnessStats::new(
            self.state
                .members
                .iter()
                .filter_map(Individual::fitness)
                .filter(|fitness| fitness.is_finite()),
        );
        match &stats {
            Some(stats) => info!(
                min = stats.min,
                max = stats.max,
                failures = failures.len(),
                "average fitness of generation {generation}: {:.3} ({:.3} over successful fights)",
                mean,
                stats.mean
            ),
            None => warn!("every fight of generation {generation} failed"),
        }
        EvaluationReport {
            generation,
            mean,
            stats,
            failures,
        }
    }

    /// Arithmetic mean of the members' fitness. Unevaluated members count as 0.
    #[must_use]
    pub fn average_fitness(&self) -> f64 {
        stats::mean(&self.fitness_values().collect::<Vec<_>>()).unwrap_or(0.0)
    }

    fn fitness_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.state
            .members
            .iter()
            .map(|ind| ind.fitness().unwrap_or(0.0))
    }

    /// Produces the next generation.
    ///
    /// The best `nb_survivors` individuals are kept with indices `1..=nb_survivors`, and
    /// the remaining slots are filled with children of two distinct survivors. Storage
    /// failures are reported, never fatal: the population always has `size` members and
    /// the generation counter always increases by one.
    #[instrument(level = "debug", skip_all, fields(generation = self.state.generation))]
    pub fn advance<R>(&mut self, rng: &mut R) -> AdvanceReport
    where
        R: Rng + ?Sized,
    {
        info!("generating generation {}", self.state.generation + 1);
        let mut warnings = vec![];

        self.rank();
        self.save_best(&mut warnings);
        self.kill_weaklings(&mut warnings);
        self.load_best(&mut warnings);
        let lineage = self.generate_children(rng, &mut warnings);
        self.state.generation += 1;
        self.save_metadata(&mut warnings);

        info!(
            warnings = warnings.len(),
            "generation {} ready", self.state.generation
        );
        AdvanceReport {
            generation: self.state.generation,
            lineage,
            warnings,
        }
    }

    /// Ranks the members and exports the best controller as the active controller.
    ///
    /// Given unchanged fitness values, repeated calls export the same blob.
    pub fn best_individual(&mut self) -> BestIndividual<'_, C> {
        self.rank();
        let path = self.config.layout.active_controller_path();
        let best = &self.state.members[0];
        let export_warning = best
            .save(&self.storage, &path)
            .err()
            .map(|source| PersistenceWarning::new(StorageOp::Write, path, source));
        match &export_warning {
            Some(warning) => warn!(error = %warning.source, "{warning}"),
            None => debug!(
                index = best.index(),
                fitness = ?best.fitness(),
                "best controller exported"
            ),
        }
        BestIndividual {
            individual: best,
            export_warning,
        }
    }

    /// Sorts members by fitness, best first. Equal fitness keeps the prior order.
    fn rank(&mut self) {
        self.state.members.sort_by(Individual::rank_cmp);
    }

    /// Stages the records of the ranked survivors under transient names `1..=nb_survivors`
    /// and re-indexes the survivors accordingly.
    ///
    /// A survivor whose live record is stale is staged from its in-memory controller.
    /// Afterwards, a survivor is stale only if its staging failed.
    fn save_best(&mut self, warnings: &mut Vec<PersistenceWarning>) {
        let layout = &self.config.layout;
        let survivors = &mut self.state.members[..self.config.nb_survivors];
        for (new_index, ind) in (1..).zip(survivors) {
            let from = layout.live_path(ind.index());
            let to = layout.transient_path(new_index);
            let result = if ind.is_stale() {
                ind.save(&self.storage, &to)
                    .map_err(|source| PersistenceWarning::new(StorageOp::Write, to, source))
            } else {
                self.storage.copy(&from, &to).map_err(|source| {
                    PersistenceWarning::with_target(StorageOp::Copy, from, to, source)
                })
            };
            match result {
                Ok(()) => ind.set_stale(false),
                Err(warning) => {
                    ind.set_stale(true);
                    report(warnings, warning);
                }
            }
            debug!(old_index = ind.index(), new_index, "survivor staged");
            ind.set_index(new_index);
        }
    }

    /// Deletes every live record and drops the individuals beyond the survivors.
    fn kill_weaklings(&mut self, warnings: &mut Vec<PersistenceWarning>) {
        for index in 1..=self.config.size {
            let path = self.config.layout.live_path(index);
            if let Err(source) = self.storage.remove(&path) {
                report(
                    warnings,
                    PersistenceWarning::new(StorageOp::Delete, path, source),
                );
            }
        }
        self.state.members.truncate(self.config.nb_survivors);
    }

    /// Commits the staged survivor records into the live namespace.
    ///
    /// Survivors whose staging failed are not committed and stay stale.
    fn load_best(&mut self, warnings: &mut Vec<PersistenceWarning>) {
        let layout = &self.config.layout;
        let survivors = &mut self.state.members[..self.config.nb_survivors];
        for (index, ind) in (1..).zip(survivors) {
            let from = layout.transient_path(index);
            if ind.is_stale() {
                discard_transient(&self.storage, from, warnings);
                continue;
            }
            let to = layout.live_path(index);
            if let Err(source) = self.storage.rename(&from, &to) {
                ind.set_stale(true);
                report(
                    warnings,
                    PersistenceWarning::with_target(StorageOp::Rename, from.clone(), to, source),
                );
                discard_transient(&self.storage, from, warnings);
            }
        }
    }

    /// Fills the population with children of two distinct survivors.
    fn generate_children<R>(
        &mut self,
        rng: &mut R,
        warnings: &mut Vec<PersistenceWarning>,
    ) -> Vec<Lineage>
    where
        R: Rng + ?Sized,
    {
        let nb_survivors = self.config.nb_survivors;
        let plans = (nb_survivors + 1..=self.config.size)
            .map(|index| {
                let mother = rng.random_range(0..nb_survivors);
                let father = loop {
                    let father = rng.random_range(0..nb_survivors);
                    if father != mother {
                        break father;
                    }
                };
                BreedingPlan {
                    index,
                    mother,
                    father,
                    rng: Pcg64Mcg::from_seed(rng.random()),
                }
            })
            .collect::<Vec<_>>();
        let lineage = plans
            .iter()
            .map(|plan| Lineage {
                child: plan.index,
                mother: plan.mother + 1,
                father: plan.father + 1,
            })
            .collect();

        let survivors = &self.state.members[..nb_survivors];
        let params = &self.params;
        let mut children = thread::scope(|s| {
            let handles = plans
                .into_iter()
                .map(|mut plan| {
                    s.spawn(move || {
                        Individual::bred(
                            plan.index,
                            params,
                            survivors[plan.mother].controller(),
                            survivors[plan.father].controller(),
                            &mut plan.rng,
                        )
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| panic::resume_unwind(payload))
                })
                .collect::<Vec<_>>()
        });

        for child in &mut children {
            save_live(&self.storage, &self.config.layout, child, warnings);
        }
        self.state.members.extend(children);
        lineage
    }

    fn save_metadata(&self, warnings: &mut Vec<PersistenceWarning>) {
        let metadata = PopulationMetadata {
            generation: self.state.generation,
            size: self.config.size,
            nb_survivors: self.config.nb_survivors,
            updated_at: Utc::now(),
        };
        let path = self.config.layout.metadata_path();
        let result = serde_json::to_vec_pretty(&metadata)
            .map_err(io::Error::other)
            .and_then(|bytes| self.storage.write(&path, &bytes));
        if let Err(source) = result {
            report(
                warnings,
                PersistenceWarning::new(StorageOp::Write, path, source),
            );
        }
    }
}

/// Writes an individual to its live record, flagging it stale if that fails.
fn save_live<C, S>(
    storage: &S,
    layout: &StorageLayout,
    ind: &mut Individual<C>,
    warnings: &mut Vec<PersistenceWarning>,
) where
    C: Controller,
    S: Storage,
{
    let path = layout.live_path(ind.index());
    match ind.save(storage, &path) {
        Ok(()) => ind.set_stale(false),
        Err(source) => {
            ind.set_stale(true);
            report(
                warnings,
                PersistenceWarning::new(StorageOp::Write, path, source),
            );
        }
    }
}

fn create_dirs<S>(storage: &S, layout: &StorageLayout) -> Result<(), PopulationError>
where
    S: Storage + ?Sized,
{
    for dir in [&layout.population_dir, &layout.robot_dir] {
        storage
            .create_dir_all(dir)
            .map_err(|source| PopulationError::StorageInit {
                path: dir.clone(),
                source,
            })?;
    }
    Ok(())
}

/// Resolves transient records left behind by an interrupted advancement.
///
/// The decision is taken once for the whole population directory. If every live record
/// is present the cull never started, and staged records are discarded. Otherwise every
/// staged survivor is committed over its live index.
fn recover_staged<S>(
    storage: &S,
    config: &PopulationConfig,
    warnings: &mut Vec<PersistenceWarning>,
) where
    S: Storage + ?Sized,
{
    let layout = &config.layout;
    let cull_started = (1..=config.size).any(|index| !storage.exists(&layout.live_path(index)));
    for index in 1..=config.nb_survivors {
        let staged = layout.transient_path(index);
        if !storage.exists(&staged) {
            continue;
        }
        let live = layout.live_path(index);
        if !cull_started {
            discard_transient(storage, staged, warnings);
        } else if let Err(source) = storage.rename(&staged, &live) {
            report(
                warnings,
                PersistenceWarning::with_target(StorageOp::Rename, staged, live, source),
            );
        } else {
            info!(index, "committed survivor staged by an interrupted advancement");
        }
    }
}

/// Deletes a transient record so that it does not outlive the advancement.
fn discard_transient<S>(storage: &S, path: PathBuf, warnings: &mut Vec<PersistenceWarning>)
where
    S: Storage + ?Sized,
{
    if !storage.exists(&path) {
        return;
    }
    if let Err(source) = storage.remove(&path) {
        report(
            warnings,
            PersistenceWarning::new(StorageOp::Delete, path, source),
        );
    }
}

fn report(warnings: &mut Vec<PersistenceWarning>, warning: PersistenceWarning) {
    warn!(op = %warning.op, error = %warning.source, "{warning}");
    warnings.push(warning);
}
