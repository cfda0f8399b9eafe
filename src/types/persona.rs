use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// System-prompt variant chosen in the composer.
///
/// The client treats personas as opaque labels; the backend maps each one to
/// a system prompt.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    #[default]
    General,
    Developer,
    Creative,
    Analyst,
}

impl Persona {
    pub const ALL: [Persona; 4] = [
        Persona::General,
        Persona::Developer,
        Persona::Creative,
        Persona::Analyst,
    ];

    /// Wire id of the persona.
    pub fn id(self) -> &'static str {
        match self {
            Persona::General => "general",
            Persona::Developer => "developer",
            Persona::Creative => "creative",
            Persona::Analyst => "analyst",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Persona::General => "General Assistant",
            Persona::Developer => "Developer Mode",
            Persona::Creative => "Creative Writer",
            Persona::Analyst => "Data Analyst",
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Persona {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Persona::ALL
            .into_iter()
            .find(|p| p.id().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!("unknown persona '{s}' (expected general, developer, creative or analyst)")
            })
    }
}
