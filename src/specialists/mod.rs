//! Specialist registry: which worker category owns a story.
//!
//! Five specialists are built in: `security`, `test`, `ui`, `api` and the
//! `general` fallback. Each owns a list of glob patterns; a file belongs to
//! the first specialist (in registry order) with a matching pattern.
//! Additional specialists can be configured and are consulted first.
//!
//! ## Example
//!
//! ```
//! use prdforge::prd::Story;
//! use prdforge::specialists::SpecialistRegistry;
//!
//! let registry = SpecialistRegistry::builtin();
//! let story = Story::new("S-1", "Login page")
//!     .with_files(["src/components/Login.tsx", "src/components/Login.css"]);
//! assert_eq!(registry.determine_specialist(&story).id, "ui");
//! ```

mod domain;
mod registry;

pub use domain::Domain;
pub use registry::{GENERAL_SPECIALIST_ID, Specialist, SpecialistConfig, SpecialistRegistry};
