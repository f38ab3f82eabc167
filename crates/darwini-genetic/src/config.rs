//! Population configuration and the persisted-record naming scheme.
//!
//! A [`PopulationConfig`] is immutable once a population has been created. It can be built
//! in code or read from a JSON file:
//!
//! ```json
//! {
//!   "size": 30,
//!   "nb_survivors": 4,
//!   "layout": {
//!     "population_dir": "data/population",
//!     "robot_dir": "data/robot"
//!   }
//! }
//! ```
//!
//! Every `layout` field is optional and defaults to the values shown in [`StorageLayout`].

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, LoadConfigError};

/// Immutable settings of a population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Number of individuals in every generation.
    pub size: usize,
    /// Number of individuals kept from one generation to the next.
    pub nb_survivors: usize,
    /// Where individuals and the active controller are persisted.
    #[serde(default)]
    pub layout: StorageLayout,
}

impl PopulationConfig {
    /// Creates a configuration using the default storage layout.
    #[must_use]
    pub fn new(size: usize, nb_survivors: usize) -> Self {
        Self {
            size,
            nb_survivors,
            layout: StorageLayout::default(),
        }
    }

    #[must_use]
    pub fn with_layout(mut self, layout: StorageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Reads a configuration from a JSON file and validates it.
    pub fn from_json_file<P>(path: P) -> Result<Self, LoadConfigError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LoadConfigError::Open {
            path: path.to_owned(),
            source,
        })?;
        let config: Self = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            LoadConfigError::Parse {
                path: path.to_owned(),
                source,
            }
        })?;
        config
            .validate()
            .map_err(|source| LoadConfigError::Invalid { source })?;
        Ok(config)
    }

    /// Checks that `2 <= nb_survivors < size`.
    ///
    /// At least two survivors are required so that every child can be bred from two
    /// distinct parents.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let Self {
            size, nb_survivors, ..
        } = *self;
        if nb_survivors < 2 {
            return Err(ConfigurationError::TooFewSurvivors { nb_survivors });
        }
        if nb_survivors >= size {
            return Err(ConfigurationError::TooManySurvivors { nb_survivors, size });
        }
        Ok(())
    }
}

/// Naming scheme of the persisted records.
///
/// - live record of index `i`: `<population_dir>/<individual_name><i>.<extension>`
/// - transient record of index `i`: `<population_dir>/<temp_prefix><individual_name><i>.<extension>`
/// - active controller: `<robot_dir>/<active_controller_name>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageLayout {
    pub population_dir: PathBuf,
    pub robot_dir: PathBuf,
    pub individual_name: String,
    pub temp_prefix: String,
    pub extension: String,
    pub active_controller_name: String,
    pub metadata_name: String,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            population_dir: PathBuf::from("data/population"),
            robot_dir: PathBuf::from("data/robot"),
            individual_name: "Individual".to_owned(),
            temp_prefix: "Temp_".to_owned(),
            extension: "json".to_owned(),
            active_controller_name: "perceptron.json".to_owned(),
            metadata_name: "population.json".to_owned(),
        }
    }
}

impl StorageLayout {
    /// Creates the default layout rooted at `root` (`<root>/population`, `<root>/robot`).
    #[must_use]
    pub fn rooted_at<P>(root: P) -> Self
    where
        P: AsRef<Path>,
    {
        let root = root.as_ref();
        Self {
            population_dir: root.join("population"),
            robot_dir: root.join("robot"),
            ..Self::default()
        }
    }

    /// Path of the committed record of the individual with the given index.
    #[must_use]
    pub fn live_path(&self, index: usize) -> PathBuf {
        self.population_dir.join(format!(
            "{}{index}.{}",
            self.individual_name, self.extension
        ))
    }

    /// Path of the in-flight survivor backup with the given index.
    #[must_use]
    pub fn transient_path(&self, index: usize) -> PathBuf {
        self.population_dir.join(format!(
            "{}{}{index}.{}",
            self.temp_prefix, self.individual_name, self.extension
        ))
    }

    /// Path where the best controller is exported for the live simulation.
    #[must_use]
    pub fn active_controller_path(&self) -> PathBuf {
        self.robot_dir.join(&self.active_controller_name)
    }

    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.population_dir.join(&self.metadata_name)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn test_validate_bounds() {
        assert!(PopulationConfig::new(10, 3).validate().is_ok());
        assert!(PopulationConfig::new(3, 2).validate().is_ok());
        assert!(matches!(
            PopulationConfig::new(10, 1).validate(),
            Err(ConfigurationError::TooFewSurvivors { nb_survivors: 1 })
        ));
        assert!(matches!(
            PopulationConfig::new(10, 0).validate(),
            Err(ConfigurationError::TooFewSurvivors { .. })
        ));
        assert!(matches!(
            PopulationConfig::new(10, 10).validate(),
            Err(ConfigurationError::TooManySurvivors {
                nb_survivors: 10,
                size: 10
            })
        ));
    }

    #[test]
    fn test_naming_scheme() {
        let layout = StorageLayout {
            extension: "xml".to_owned(),
            ..StorageLayout::default()
        };
        assert_eq!(
            layout.live_path(7),
            PathBuf::from("data/population/Individual7.xml")
        );
        assert_eq!(
            layout.transient_path(7),
            PathBuf::from("data/population/Temp_Individual7.xml")
        );
        assert_eq!(
            layout.active_controller_path(),
            PathBuf::from("data/robot/perceptron.json")
        );
    }

    #[test]
    fn test_rooted_layout() {
        let layout = StorageLayout::rooted_at("/tmp/run");
        assert_eq!(
            layout.live_path(12),
            PathBuf::from("/tmp/run/population/Individual12.json")
        );
        assert_eq!(
            layout.metadata_path(),
            PathBuf::from("/tmp/run/population/population.json")
        );
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"size": 12, "nb_survivors": 4, "layout": {{"extension": "xml"}}}}"#
        )
        .unwrap();

        let config = PopulationConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.size, 12);
        assert_eq!(config.nb_survivors, 4);
        assert_eq!(config.layout.extension, "xml");
        assert_eq!(config.layout.individual_name, "Individual");
    }

    #[test]
    fn test_from_json_file_rejects_invalid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"size": 12, "nb_survivors": 1}}"#).unwrap();
        assert!(matches!(
            PopulationConfig::from_json_file(file.path()),
            Err(LoadConfigError::Invalid { .. })
        ));

        let missing = PopulationConfig::from_json_file("/nonexistent/darwini.json");
        assert!(matches!(missing, Err(LoadConfigError::Open { .. })));
    }
}
