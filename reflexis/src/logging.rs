use std::collections::HashMap;
use std::error;
use std::sync::{Arc, Mutex};

/// Message severity, ordered from least to most severe.
///
/// The seven levels mirror the classic log-service hierarchy consumed by the
/// reactor's collaborators: `Severe > Warning > Info > Config > Fine >
/// Finer > Finest`. The derived ordering follows declaration order, so
/// severity comparisons read naturally (`severity >= filter`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Finest,
    Finer,
    Fine,
    Config,
    Info,
    Warning,
    Severe,
}

impl Severity {
    /// Maps the severity onto the closest `log` facade level.
    fn to_log_level(self) -> log::Level {
        match self {
            Severity::Severe => log::Level::Error,
            Severity::Warning => log::Level::Warn,
            Severity::Info => log::Level::Info,
            Severity::Config | Severity::Fine => log::Level::Debug,
            Severity::Finer | Severity::Finest => log::Level::Trace,
        }
    }
}

/// A named logger with a severity filter.
///
/// Loggers are obtained from a [`LogTarget`] and shared freely between the
/// reactor and its clients.
pub trait Logger: Send + Sync {
    /// Returns the identifier this logger was registered under.
    fn id(&self) -> &str;

    /// Returns the current severity filter.
    fn level(&self) -> Severity;

    /// Sets the severity filter; messages below it are dropped.
    fn set_level(&self, level: Severity);

    /// Logs a message at the given severity.
    fn log(&self, severity: Severity, message: &str);

    /// Logs a message together with the error that caused it.
    fn log_cause(&self, severity: Severity, message: &str, cause: &dyn error::Error);
}

/// Backend log service consulted by the reactor for named loggers.
///
/// Requesting the same identifier twice yields the same logger instance.
pub trait LogTarget: Send + Sync {
    /// Returns the logger registered under `id`, creating it on first use.
    ///
    /// `resources` names a localisation bundle in environments that support
    /// message localisation; implementations without one ignore it.
    fn get_logger(&self, id: &str, resources: Option<&str>) -> Arc<dyn Logger>;
}

/// Default [`LogTarget`] forwarding to the `log` facade.
///
/// Each named logger becomes a `log` target of the same name, with the
/// severity mapped onto the facade's five levels. The `resources` argument
/// is accepted for interface parity and ignored.
pub struct FacadeLogTarget {
    loggers: Mutex<HashMap<String, Arc<FacadeLogger>>>,
}

impl FacadeLogTarget {
    pub fn new() -> Self {
        FacadeLogTarget {
            loggers: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for FacadeLogTarget {
    fn default() -> Self {
        FacadeLogTarget::new()
    }
}

impl LogTarget for FacadeLogTarget {
    fn get_logger(&self, id: &str, _resources: Option<&str>) -> Arc<dyn Logger> {
        let mut loggers = self.loggers.lock().unwrap();
        let logger = loggers
            .entry(id.to_owned())
            .or_insert_with(|| {
                Arc::new(FacadeLogger {
                    id: id.to_owned(),
                    level: Mutex::new(Severity::Info),
                })
            })
            .clone();
        logger
    }
}

struct FacadeLogger {
    id: String,
    level: Mutex<Severity>,
}

impl Logger for FacadeLogger {
    fn id(&self) -> &str {
        &self.id
    }

    fn level(&self) -> Severity {
        *self.level.lock().unwrap()
    }

    fn set_level(&self, level: Severity) {
        *self.level.lock().unwrap() = level;
    }

    fn log(&self, severity: Severity, message: &str) {
        if severity >= self.level() {
            log::log!(target: &self.id, severity.to_log_level(), "{message}");
        }
    }

    fn log_cause(&self, severity: Severity, message: &str, cause: &dyn error::Error) {
        if severity >= self.level() {
            log::log!(target: &self.id, severity.to_log_level(), "{message}: {cause}");
        }
    }
}
