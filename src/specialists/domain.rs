use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// Area of expertise a specialist owns.
///
/// Serialized as a lower-case string. Unknown strings deserialize to
/// [`Domain::Custom`] so configured specialists can introduce new domains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    Ui,
    Api,
    Security,
    Test,
    General,
    Custom(String),
}

impl Domain {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ui => "ui",
            Self::Api => "api",
            Self::Security => "security",
            Self::Test => "test",
            Self::General => "general",
            Self::Custom(name) => name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    /// The five built-in domains, in registry priority order.
    pub fn all_builtins() -> Vec<Self> {
        vec![
            Self::Security,
            Self::Test,
            Self::Ui,
            Self::Api,
            Self::General,
        ]
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = std::convert::Infallible;

    /// Never fails: unrecognised names become `Custom`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.to_lowercase().as_str() {
            "ui" | "frontend" => Self::Ui,
            "api" | "backend" => Self::Api,
            "security" | "sec" => Self::Security,
            "test" | "tests" | "testing" | "qa" => Self::Test,
            "general" => Self::General,
            _ => Self::Custom(trimmed.to_string()),
        })
    }
}

impl Serialize for Domain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Domain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or(Domain::General))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_aliases() {
        assert_eq!("UI".parse::<Domain>().unwrap(), Domain::Ui);
        assert_eq!("backend".parse::<Domain>().unwrap(), Domain::Api);
        assert_eq!("qa".parse::<Domain>().unwrap(), Domain::Test);
        assert_eq!(
            "infra".parse::<Domain>().unwrap(),
            Domain::Custom("infra".to_string())
        );
    }

    #[test]
    fn test_serde_round_trip_as_string() {
        let json = serde_json::to_string(&Domain::Security).unwrap();
        assert_eq!(json, "\"security\"");
        let custom: Domain = serde_json::from_str("\"data\"").unwrap();
        assert_eq!(custom, Domain::Custom("data".to_string()));
    }

    #[test]
    fn test_builtins_end_with_general() {
        let all = Domain::all_builtins();
        assert_eq!(all.len(), 5);
        assert_eq!(all.last(), Some(&Domain::General));
        assert!(all.iter().all(Domain::is_builtin));
    }
}
