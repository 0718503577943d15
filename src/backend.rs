//! Naive backend selection for CLI and configuration

/// Which naive store sits under the typed layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// In-process map (default)
    #[default]
    Memory,
    /// A real Redis server
    #[cfg(feature = "redis-backend")]
    Redis,
}

impl Backend {
    /// Parse from string (for CLI/env var)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Some(Backend::Memory),
            #[cfg(feature = "redis-backend")]
            "redis" => Some(Backend::Redis),
            _ => None,
        }
    }

    /// Check if this backend is available (feature enabled)
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Memory => true,
            #[cfg(feature = "redis-backend")]
            Backend::Redis => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            #[cfg(feature = "redis-backend")]
            Backend::Redis => "redis",
        }
    }
}
