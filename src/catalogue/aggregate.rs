//! Aggregate function family (spec §4.4). Each recipe returns the
//! `$group`-stage accumulator document for a single output field; the
//! lowering engine (`crate::lowering::select`) is responsible for placing it
//! under the right key and choosing between `$group` and `$setWindowFields`.
//!
//! `DISTINCT` aggregates (`COUNT(DISTINCT x)`, `SUM(DISTINCT x)`, ...) and
//! `GROUP_CONCAT` cannot be expressed as a single accumulator: they need an
//! `$addToSet` (or `$push`) accumulator here, finished off by a `$project`
//! wrapper the lowering engine appends afterward. Recipes that need this flag
//! it by returning an `$addToSet`/`$push` document whose lowering-engine
//! contract is documented alongside `crate::lowering::select::finish_distinct_aggregate`.

use bson::{Bson, bson};

use super::{CatalogueEntry, aggregate_entry, round6};

pub fn entries() -> Vec<CatalogueEntry> {
    vec![
        aggregate_entry("COUNT", 0, 1, |args, distinct| {
            let is_star = args.is_empty() || matches!(args.first(), Some(Bson::String(s)) if s == "$$ROOT_STAR");
            if distinct {
                let field = args.first().cloned().unwrap_or(Bson::String("$$ROOT".into()));
                return Ok(bson!({ "$addToSet": field }));
            }
            if is_star {
                Ok(bson!({ "$sum": 1 }))
            } else {
                Ok(bson!({ "$sum": { "$cond": [{ "$ifNull": [args[0].clone(), false] }, 1, 0] } }))
            }
        }),
        aggregate_entry("SUM", 1, 1, |args, distinct| {
            if distinct {
                Ok(bson!({ "$addToSet": args[0].clone() }))
            } else {
                Ok(bson!({ "$sum": args[0].clone() }))
            }
        }),
        aggregate_entry("AVG", 1, 1, |args, distinct| {
            if distinct {
                Ok(bson!({ "$addToSet": args[0].clone() }))
            } else {
                Ok(bson!({ "$avg": args[0].clone() }))
            }
        }),
        aggregate_entry("MIN", 1, 1, |args, _| Ok(bson!({ "$min": args[0].clone() }))),
        aggregate_entry("MAX", 1, 1, |args, _| Ok(bson!({ "$max": args[0].clone() }))),
        aggregate_entry("GROUP_CONCAT", 1, 1, |args, _| {
            Ok(bson!({ "$push": args[0].clone() }))
        }),
        aggregate_entry("STDDEV_POP", 1, 1, |args, _| {
            Ok(round6(bson!({ "$stdDevPop": args[0].clone() })))
        }),
        aggregate_entry("STDDEV_SAMP", 1, 1, |args, _| {
            Ok(round6(bson!({ "$stdDevSamp": args[0].clone() })))
        }),
        aggregate_entry("STDDEV", 1, 1, |args, _| {
            Ok(round6(bson!({ "$stdDevPop": args[0].clone() })))
        }),
        aggregate_entry("VAR_POP", 1, 1, |args, _| {
            Ok(round6(bson!({ "$pow": [{ "$stdDevPop": args[0].clone() }, 2] })))
        }),
        aggregate_entry("VAR_SAMP", 1, 1, |args, _| {
            Ok(round6(bson!({ "$pow": [{ "$stdDevSamp": args[0].clone() }, 2] })))
        }),
        aggregate_entry("VARIANCE", 1, 1, |args, _| {
            Ok(round6(bson!({ "$pow": [{ "$stdDevPop": args[0].clone() }, 2] })))
        }),
        aggregate_entry("BIT_AND", 1, 1, |args, _| {
            Ok(bson!({ "$accumulator": {
                "init": "function() { return null; }",
                "accumulate": "function(state, value) { return state === null ? value : state & value; }",
                "accumulateArgs": [args[0].clone()],
                "merge": "function(s1, s2) { return s1 === null ? s2 : (s2 === null ? s1 : s1 & s2); }",
                "lang": "js"
            }}))
        }),
        aggregate_entry("BIT_OR", 1, 1, |args, _| {
            Ok(bson!({ "$accumulator": {
                "init": "function() { return null; }",
                "accumulate": "function(state, value) { return state === null ? value : state | value; }",
                "accumulateArgs": [args[0].clone()],
                "merge": "function(s1, s2) { return s1 === null ? s2 : (s2 === null ? s1 : s1 | s2); }",
                "lang": "js"
            }}))
        }),
        aggregate_entry("BIT_XOR", 1, 1, |args, _| {
            Ok(bson!({ "$accumulator": {
                "init": "function() { return null; }",
                "accumulate": "function(state, value) { return state === null ? value : state ^ value; }",
                "accumulateArgs": [args[0].clone()],
                "merge": "function(s1, s2) { return s1 === null ? s2 : (s2 === null ? s1 : s1 ^ s2); }",
                "lang": "js"
            }}))
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{Recipe, catalogue};

    #[test]
    fn count_star_sums_one() {
        let entry = catalogue().get("COUNT").unwrap();
        let Recipe::Aggregate(f) = &entry.recipe else {
            panic!()
        };
        let out = f("COUNT", &[], false).unwrap();
        assert_eq!(out, bson!({ "$sum": 1 }));
    }

    #[test]
    fn count_distinct_uses_add_to_set() {
        let entry = catalogue().get("COUNT").unwrap();
        let Recipe::Aggregate(f) = &entry.recipe else {
            panic!()
        };
        let out = f("COUNT", &[Bson::String("$x".into())], true).unwrap();
        assert_eq!(out, bson!({ "$addToSet": "$x" }));
    }

    #[test]
    fn stddev_pop_rounds_to_six_places() {
        let entry = catalogue().get("STDDEV_POP").unwrap();
        let Recipe::Aggregate(f) = &entry.recipe else {
            panic!()
        };
        let out = f("STDDEV_POP", &[Bson::String("$x".into())], false).unwrap();
        assert_eq!(out, bson!({ "$round": [{ "$stdDevPop": "$x" }, 6] }));
    }
}
