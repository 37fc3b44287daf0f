use crate::error::ConfigError;
use crate::models::{Day, Scope, StreamId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_tournament_size() -> usize {
    3
}

fn default_max_consecutive() -> u32 {
    3
}

fn default_repair_attempts() -> u32 {
    8
}

fn default_days() -> Vec<Day> {
    Day::WEEKDAYS.to_vec()
}

/// Parameters of one run. Immutable once the run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub stream_id: StreamId,
    pub semester: u8,
    pub academic_year: String,
    /// Wall-clock budget in seconds.
    pub max_runtime: u64,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
    /// Longest run of adjacent slots a lecturer may teach before it costs.
    #[serde(default = "default_max_consecutive")]
    pub max_consecutive: u32,
    /// Room/slot draws tried per gene placement before settling.
    #[serde(default = "default_repair_attempts")]
    pub repair_attempts: u32,
    #[serde(default = "default_days")]
    pub days: Vec<Day>,
}

impl RunConfig {
    pub fn new(stream_id: StreamId, semester: u8, academic_year: impl Into<String>) -> Self {
        Self {
            population_size: 50,
            generations: 200,
            mutation_rate: 0.05,
            crossover_rate: 0.8,
            stream_id,
            semester,
            academic_year: academic_year.into(),
            max_runtime: 60,
            seed: None,
            tournament_size: default_tournament_size(),
            max_consecutive: default_max_consecutive(),
            repair_attempts: default_repair_attempts(),
            days: default_days(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::new("population_size", "must be greater than 0"));
        }
        if self.generations == 0 {
            return Err(ConfigError::new("generations", "must be greater than 0"));
        }
        for (field, rate) in [
            ("mutation_rate", self.mutation_rate),
            ("crossover_rate", self.crossover_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::new(field, format!("must be within [0, 1], got {rate}")));
            }
        }
        if !matches!(self.semester, 1 | 2) {
            return Err(ConfigError::new(
                "semester",
                format!("must be 1 or 2, got {}", self.semester),
            ));
        }
        if self.academic_year.trim().is_empty() {
            return Err(ConfigError::new("academic_year", "must not be empty"));
        }
        if self.max_runtime == 0 {
            return Err(ConfigError::new("max_runtime", "must be greater than 0 seconds"));
        }
        if self.tournament_size < 2 {
            return Err(ConfigError::new("tournament_size", "must be at least 2"));
        }
        if self.max_consecutive == 0 {
            return Err(ConfigError::new("max_consecutive", "must be at least 1"));
        }
        if self.repair_attempts == 0 {
            return Err(ConfigError::new("repair_attempts", "must be at least 1"));
        }
        if self.days.is_empty() {
            return Err(ConfigError::new("days", "must name at least one teaching day"));
        }
        let mut days = self.days.clone();
        days.sort();
        days.dedup();
        if days.len() != self.days.len() {
            return Err(ConfigError::new("days", "must not repeat a day"));
        }
        Ok(())
    }

    pub fn scope(&self) -> Scope {
        Scope {
            stream_id: self.stream_id,
            semester: self.semester,
            academic_year: self.academic_year.trim().to_string(),
        }
    }

    pub fn runtime_budget(&self) -> Duration {
        Duration::from_secs(self.max_runtime)
    }
}

/// Service settings, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub database: PathBuf,
    pub progress_dir: PathBuf,
    pub allowed_origin: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind: std::env::var("TIMETABLE_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            database: std::env::var("TIMETABLE_DATABASE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("timetable.db")),
            progress_dir: std::env::var("TIMETABLE_PROGRESS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("timetable-progress")),
            allowed_origin: std::env::var("TIMETABLE_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RunConfig {
        RunConfig::new(1, 1, "2024/2025")
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_population() {
        let mut config = valid();
        config.population_size = 0;
        assert_eq!(config.validate().unwrap_err().field, "population_size");
    }

    #[test]
    fn test_rejects_rate_out_of_range() {
        let mut config = valid();
        config.mutation_rate = 1.5;
        assert_eq!(config.validate().unwrap_err().field, "mutation_rate");

        let mut config = valid();
        config.crossover_rate = f64::NAN;
        assert_eq!(config.validate().unwrap_err().field, "crossover_rate");
    }

    #[test]
    fn test_rejects_bad_semester_and_runtime() {
        let mut config = valid();
        config.semester = 3;
        assert_eq!(config.validate().unwrap_err().field, "semester");

        let mut config = valid();
        config.max_runtime = 0;
        assert_eq!(config.validate().unwrap_err().field, "max_runtime");
    }

    #[test]
    fn test_rejects_repeated_days() {
        let mut config = valid();
        config.days = vec![Day::Monday, Day::Monday];
        assert_eq!(config.validate().unwrap_err().field, "days");
    }

    #[test]
    fn test_deserialize_fills_optional_fields() {
        let config: RunConfig = serde_json::from_str(
            r#"{
                "population_size": 10,
                "generations": 5,
                "mutation_rate": 0.1,
                "crossover_rate": 0.9,
                "stream_id": 2,
                "semester": 2,
                "academic_year": "2024/2025",
                "max_runtime": 30
            }"#,
        )
        .unwrap();
        assert_eq!(config.tournament_size, 3);
        assert_eq!(config.days, Day::WEEKDAYS.to_vec());
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());
    }
}
