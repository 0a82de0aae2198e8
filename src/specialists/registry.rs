use super::Domain;
use crate::errors::ConfigError;
use crate::prd::Story;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

/// Id of the fallback specialist that owns everything nobody else matches.
pub const GENERAL_SPECIALIST_ID: &str = "general";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Built-in table, most specific first. `general` has no patterns.
const BUILTIN_SPECIALISTS: &[(&str, &[&str])] = &[
    (
        "security",
        &[
            "**/auth/**",
            "**/security/**",
            "**/*auth*",
            "**/*crypto*",
            "**/*secret*",
        ],
    ),
    (
        "test",
        &[
            "**/tests/**",
            "**/test/**",
            "**/__tests__/**",
            "**/*_test.*",
            "**/*.test.*",
            "**/*.spec.*",
        ],
    ),
    (
        "ui",
        &[
            "**/components/**",
            "**/ui/**",
            "**/pages/**",
            "**/*.tsx",
            "**/*.jsx",
            "**/*.css",
            "**/*.scss",
            "**/*.html",
            "**/*.vue",
            "**/*.svelte",
        ],
    ),
    (
        "api",
        &[
            "**/api/**",
            "**/routes/**",
            "**/handlers/**",
            "**/controllers/**",
            "**/server/**",
        ],
    ),
    (GENERAL_SPECIALIST_ID, &[]),
];

/// User-supplied specialist definition from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialistConfig {
    pub id: String,
    pub domain: Domain,
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// A worker category: a domain plus the file patterns it owns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Specialist {
    pub id: String,
    pub domain: Domain,
    pub file_patterns: Vec<String>,
    #[serde(skip)]
    compiled: Vec<Pattern>,
}

impl Specialist {
    fn compile(id: &str, domain: Domain, patterns: &[String]) -> Result<Self, ConfigError> {
        let compiled = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| ConfigError::InvalidPattern {
                    specialist: id.to_string(),
                    pattern: p.clone(),
                    message: e.msg.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: id.to_string(),
            domain,
            file_patterns: patterns.to_vec(),
            compiled,
        })
    }

    /// Index of the first of this specialist's patterns that matches `path`.
    fn matching_pattern(&self, path: &str) -> Option<usize> {
        self.compiled
            .iter()
            .position(|p| p.matches_with(path, MATCH_OPTIONS))
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matching_pattern(&normalize_path(path)).is_some()
    }

    pub fn is_fallback(&self) -> bool {
        self.id == GENERAL_SPECIALIST_ID
    }
}

/// Normalise a path for matching: forward slashes, no leading `./`.
fn normalize_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    let mut trimmed = unified.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}

/// Static lookup table of specialists.
///
/// Order is significant: configured specialists are consulted before the
/// built-ins, and `general` is always present as the fallback.
#[derive(Debug, Clone)]
pub struct SpecialistRegistry {
    specialists: Vec<Specialist>,
    fallback: usize,
}

impl Default for SpecialistRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SpecialistRegistry {
    /// Registry with only the five built-in specialists.
    pub fn builtin() -> Self {
        Self::from_specialists(builtin_specialists())
    }

    /// Registry with configured specialists placed ahead of the built-ins.
    ///
    /// A configured specialist whose id matches a built-in replaces it.
    pub fn with_custom(custom: &[SpecialistConfig]) -> Result<Self, ConfigError> {
        let mut specialists = custom
            .iter()
            .map(|c| Specialist::compile(&c.id, c.domain.clone(), &c.patterns))
            .collect::<Result<Vec<_>, _>>()?;

        for builtin in builtin_specialists() {
            if !specialists.iter().any(|s| s.id == builtin.id) {
                specialists.push(builtin);
            }
        }

        Ok(Self::from_specialists(specialists))
    }

    fn from_specialists(mut specialists: Vec<Specialist>) -> Self {
        let fallback = match specialists.iter().position(Specialist::is_fallback) {
            Some(index) => index,
            None => {
                specialists.push(Specialist {
                    id: GENERAL_SPECIALIST_ID.to_string(),
                    domain: Domain::General,
                    file_patterns: Vec::new(),
                    compiled: Vec::new(),
                });
                specialists.len() - 1
            }
        };
        Self {
            specialists,
            fallback,
        }
    }

    pub fn specialists(&self) -> &[Specialist] {
        &self.specialists
    }

    pub fn get_specialist(&self, id: &str) -> Option<&Specialist> {
        self.specialists.iter().find(|s| s.id == id)
    }

    pub fn get_specialist_by_domain(&self, domain: &Domain) -> Option<&Specialist> {
        self.specialists.iter().find(|s| &s.domain == domain)
    }

    /// The `general` specialist.
    pub fn fallback(&self) -> &Specialist {
        &self.specialists[self.fallback]
    }

    /// First specialist, in registry order, with a pattern matching `path`.
    pub fn match_file_to_specialist(&self, path: &str) -> Option<&Specialist> {
        let normalized = normalize_path(path);
        if normalized.is_empty() {
            return None;
        }
        self.specialists
            .iter()
            .find(|s| s.matching_pattern(&normalized).is_some())
    }

    /// Resolve the specialist for a story. Never fails.
    ///
    /// Priority: the story's explicit domain, then the specialist matching the
    /// most affected files (ties go to whichever appears first in file
    /// order), then `general`.
    pub fn determine_specialist(&self, story: &Story) -> &Specialist {
        if let Some(specialist) = story
            .domain
            .as_ref()
            .and_then(|d| self.get_specialist_by_domain(d))
        {
            return specialist;
        }

        // (specialist index, votes) in first-seen order
        let mut tally: Vec<(usize, usize)> = Vec::new();
        for file in &story.affected_files {
            let Some(index) = self.match_index(file) else {
                continue;
            };
            match tally.iter_mut().find(|(i, _)| *i == index) {
                Some((_, votes)) => *votes += 1,
                None => tally.push((index, 1)),
            }
        }

        let mut best: Option<(usize, usize)> = None;
        for (index, votes) in tally {
            if best.is_none_or(|(_, top)| votes > top) {
                best = Some((index, votes));
            }
        }

        match best {
            Some((index, _)) => &self.specialists[index],
            None => self.fallback(),
        }
    }

    fn match_index(&self, path: &str) -> Option<usize> {
        let normalized = normalize_path(path);
        if normalized.is_empty() {
            return None;
        }
        self.specialists
            .iter()
            .position(|s| s.matching_pattern(&normalized).is_some())
    }
}

fn builtin_specialists() -> Vec<Specialist> {
    BUILTIN_SPECIALISTS
        .iter()
        .map(|(id, patterns)| Specialist {
            id: id.to_string(),
            domain: id.parse().unwrap_or(Domain::General),
            file_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            compiled: patterns.iter().filter_map(|p| Pattern::new(p).ok()).collect(),
        })
        .collect()
}
