//! Regex function family (spec §4.4, §4.6). Grounded in the same POSIX
//! pattern handling `Expression::Regexp` uses in the lowering engine.

use bson::{Bson, bson};

use super::{CatalogueEntry, scalar};

pub fn entries() -> Vec<CatalogueEntry> {
    vec![
        scalar("REGEXP_INSTR", 2, 2, |args| {
            Ok(bson!({ "$add": [
                { "$indexOfCP": [args[0].clone(), { "$regexFind": { "input": args[0].clone(), "regex": args[1].clone() } }] },
                1,
            ]}))
        }),
        scalar("REGEXP_SUBSTR", 2, 2, |args| {
            Ok(bson!({ "$let": {
                "vars": { "m": { "$regexFind": { "input": args[0].clone(), "regex": args[1].clone() } } },
                "in": "$$m.match",
            }}))
        }),
        scalar("REGEXP_REPLACE", 3, 3, |args| {
            Ok(bson!({ "$replaceAll": {
                "input": args[0].clone(),
                "find": args[1].clone(),
                "replacement": args[2].clone(),
            }}))
        }),
        scalar("REGEXP_LIKE", 2, 3, |args| {
            Ok(bson!({ "$regexMatch": { "input": args[0].clone(), "regex": args[1].clone() } }))
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{Recipe, catalogue};

    #[test]
    fn regexp_like_builds_regex_match() {
        let entry = catalogue().get("REGEXP_LIKE").unwrap();
        let Recipe::Scalar(f) = &entry.recipe else {
            panic!()
        };
        let out = f(
            "REGEXP_LIKE",
            &[Bson::String("$name".into()), Bson::String("^A".into())],
        )
        .unwrap();
        assert_eq!(out, bson!({ "$regexMatch": { "input": "$name", "regex": "^A" } }));
    }
}
