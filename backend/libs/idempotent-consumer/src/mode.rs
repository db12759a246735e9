/// Whether durable storage is mandatory for this process.
///
/// `Strict` turns a missing or unreachable database into a startup error.
/// `Lenient` downgrades to in-process state and keeps the worker available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistenceMode {
    Strict,
    #[default]
    Lenient,
}

impl PersistenceMode {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `PERSISTENCE_MODE=strict|required` or `APP_ENV=prod|production` select strict.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let normalized = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_ascii_lowercase())
                .unwrap_or_default()
        };

        if matches!(normalized("PERSISTENCE_MODE").as_str(), "strict" | "required") {
            return Self::Strict;
        }
        if matches!(normalized("APP_ENV").as_str(), "prod" | "production") {
            return Self::Strict;
        }
        Self::Lenient
    }

    pub fn is_strict(self) -> bool {
        self == Self::Strict
    }
}
