//! The function catalogue: a registry mapping SQL function names
//! (case-insensitive) to deterministic lowering recipes. Built once,
//! immutable for the lifetime of the process (spec §5 concurrency model),
//! and consulted by the lowering engine whenever it lowers a `FunctionCall`.
//!
//! Structural forms (`IF`, `CASE`, `COALESCE`, `NULLIF`) are never registered
//! here — they are recognised as dedicated `Expression` variants by the
//! parser and handled directly by the lowering engine (spec §4.5.3).

mod aggregate;
mod datetime;
mod json;
mod math;
mod regexfn;
mod string;
mod window;

use std::collections::HashMap;
use std::sync::OnceLock;

use bson::Bson;

use crate::error::{ErrorKind, TranslationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Scalar,
    Aggregate,
    Window,
}

pub type ScalarRecipe = Box<dyn Fn(&str, &[Bson]) -> TranslationResult<Bson> + Send + Sync>;
/// `(name, args, distinct) -> accumulator document`.
pub type AggregateRecipe =
    Box<dyn Fn(&str, &[Bson], bool) -> TranslationResult<Bson> + Send + Sync>;
/// `(name, args) -> the operator document placed in a $setWindowFields "output"`.
pub type WindowRecipe = Box<dyn Fn(&str, &[Bson]) -> TranslationResult<Bson> + Send + Sync>;

pub enum Recipe {
    Scalar(ScalarRecipe),
    Aggregate(AggregateRecipe),
    Window(WindowRecipe),
}

pub struct CatalogueEntry {
    pub name: &'static str,
    pub kind: FunctionKind,
    pub min_args: usize,
    pub max_args: usize,
    pub recipe: Recipe,
}

impl CatalogueEntry {
    pub fn check_arity(&self, got: usize) -> TranslationResult<()> {
        if got < self.min_args || got > self.max_args {
            return Err(ErrorKind::ArityMismatch {
                name: self.name.to_string(),
                min: self.min_args,
                max: self.max_args,
                got,
            }
            .into());
        }
        Ok(())
    }
}

pub struct Catalogue {
    entries: HashMap<&'static str, CatalogueEntry>,
}

impl Catalogue {
    pub fn get(&self, name: &str) -> Option<&CatalogueEntry> {
        self.entries.get(name.to_ascii_uppercase().as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name.to_ascii_uppercase().as_str())
    }

    fn build() -> Self {
        let mut entries = HashMap::new();
        let mut insert_all = |list: Vec<CatalogueEntry>| {
            for e in list {
                entries.insert(e.name, e);
            }
        };
        insert_all(datetime::entries());
        insert_all(string::entries());
        insert_all(math::entries());
        insert_all(aggregate::entries());
        insert_all(json::entries());
        insert_all(regexfn::entries());
        insert_all(window::entries());
        Self { entries }
    }
}

static CATALOGUE: OnceLock<Catalogue> = OnceLock::new();

/// The process-wide, immutable function catalogue. Constructed exactly once
/// on first access; every statement translation shares the same reference
/// without synchronisation, since nothing in it is mutated afterward.
pub fn catalogue() -> &'static Catalogue {
    CATALOGUE.get_or_init(Catalogue::build)
}

/// Small helper shared by the family modules: build a scalar entry whose
/// recipe ignores the function name.
pub(crate) fn scalar(
    name: &'static str,
    min_args: usize,
    max_args: usize,
    f: impl Fn(&[Bson]) -> TranslationResult<Bson> + Send + Sync + 'static,
) -> CatalogueEntry {
    CatalogueEntry {
        name,
        kind: FunctionKind::Scalar,
        min_args,
        max_args,
        recipe: Recipe::Scalar(Box::new(move |_, args| f(args))),
    }
}

pub(crate) fn aggregate_entry(
    name: &'static str,
    min_args: usize,
    max_args: usize,
    f: impl Fn(&[Bson], bool) -> TranslationResult<Bson> + Send + Sync + 'static,
) -> CatalogueEntry {
    CatalogueEntry {
        name,
        kind: FunctionKind::Aggregate,
        min_args,
        max_args,
        recipe: Recipe::Aggregate(Box::new(move |_, args, distinct| f(args, distinct))),
    }
}

pub(crate) fn window_entry(
    name: &'static str,
    min_args: usize,
    max_args: usize,
    f: impl Fn(&[Bson]) -> TranslationResult<Bson> + Send + Sync + 'static,
) -> CatalogueEntry {
    CatalogueEntry {
        name,
        kind: FunctionKind::Window,
        min_args,
        max_args,
        recipe: Recipe::Window(Box::new(move |_, args| f(args))),
    }
}

/// Wrap a result in `{$round: [expr, 6]}` — the numeric precision policy
/// statistical aggregates use to match the MariaDB reference (spec §4.4).
pub(crate) fn round6(expr: Bson) -> Bson {
    bson::bson!({ "$round": [expr, 6] })
}
