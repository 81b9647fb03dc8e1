//! Translator options (spec §6). Serializable so a host program can load
//! them from its own configuration file without the core depending on any
//! particular config format.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservedWordDialect {
    #[serde(rename = "mariadb")]
    MariaDb,
    #[serde(rename = "mariadb_oracle")]
    MariaDbOracle,
}

impl Default for ReservedWordDialect {
    fn default() -> Self {
        ReservedWordDialect::MariaDb
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedWordPolicy {
    pub dialect: ReservedWordDialect,
}

impl Default for ReservedWordPolicy {
    fn default() -> Self {
        Self {
            dialect: ReservedWordDialect::MariaDb,
        }
    }
}

/// MongoDB collation spec attached to invocations that sort or compare
/// strings, matching the MariaDB `utf8mb4_unicode_ci` reference used by the
/// comparison test harness (external, spec §1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collation {
    pub locale: String,
    #[serde(rename = "caseLevel")]
    pub case_level: bool,
    pub strength: i32,
    #[serde(rename = "numericOrdering")]
    pub numeric_ordering: bool,
}

impl Default for Collation {
    fn default() -> Self {
        Self {
            locale: "en".to_string(),
            case_level: false,
            strength: 1,
            numeric_ordering: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslateOptions {
    pub collation: Collation,
    pub implicit_order_on_limit: bool,
    pub reserved_word_policy: ReservedWordPolicy,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            collation: Collation::default(),
            implicit_order_on_limit: true,
            reserved_word_policy: ReservedWordPolicy::default(),
        }
    }
}
