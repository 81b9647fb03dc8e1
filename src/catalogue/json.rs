//! JSON function family (spec §4.4). MariaDB JSON path arguments (e.g.
//! `'$.address.city'`) are translated to MongoDB dotted field access; only
//! literal path strings are supported since dynamic JSON paths have no
//! direct `$getField`/`$setField` equivalent.

use bson::{Bson, bson};

use super::{CatalogueEntry, scalar};
use crate::error::{ErrorKind, TranslationResult};

/// `'$.a.b[0]'` -> `"a.b.0"`. Mongo has no array-index path syntax inside
/// `$getField`, so an index segment is rendered as a plain path component,
/// which only works against embedded documents keyed by stringified indices.
fn json_path_to_field(function: &'static str, path: &Bson) -> TranslationResult<String> {
    let Bson::String(raw) = path else {
        return Err(ErrorKind::UnsupportedArgument {
            function: function.to_string(),
            message: "JSON path must be a literal string".to_string(),
        }
        .into());
    };
    let trimmed = raw.strip_prefix("$.").or_else(|| raw.strip_prefix('$')).unwrap_or(raw);
    let normalized = trimmed.replace(['[', ']'], ".").replace("..", ".");
    Ok(normalized.trim_matches('.').to_string())
}

pub fn entries() -> Vec<CatalogueEntry> {
    vec![
        scalar("JSON_EXTRACT", 2, 2, |args| {
            let field = json_path_to_field("JSON_EXTRACT", &args[1])?;
            Ok(bson!({ "$getField": { "field": field, "input": args[0].clone() } }))
        }),
        scalar("JSON_UNQUOTE", 1, 1, |args| Ok(bson!({ "$toString": args[0].clone() }))),
        scalar("JSON_OBJECT", 0, usize::MAX, |args| {
            if args.len() % 2 != 0 {
                return Err(ErrorKind::UnsupportedArgument {
                    function: "JSON_OBJECT".to_string(),
                    message: "expects an even number of key/value arguments".to_string(),
                }
                .into());
            }
            let mut doc = bson::Document::new();
            for pair in args.chunks(2) {
                let Bson::String(key) = &pair[0] else {
                    return Err(ErrorKind::UnsupportedArgument {
                        function: "JSON_OBJECT".to_string(),
                        message: "keys must be literal strings".to_string(),
                    }
                    .into());
                };
                doc.insert(key.clone(), pair[1].clone());
            }
            Ok(Bson::Document(doc))
        }),
        scalar("JSON_ARRAY", 0, usize::MAX, |args| Ok(Bson::Array(args.to_vec()))),
        scalar("JSON_KEYS", 1, 2, |args| {
            Ok(bson!({ "$map": {
                "input": { "$objectToArray": args[0].clone() },
                "as": "kv",
                "in": "$$kv.k",
            }}))
        }),
        scalar("JSON_LENGTH", 1, 2, |args| {
            Ok(bson!({ "$cond": [
                { "$isArray": args[0].clone() },
                { "$size": args[0].clone() },
                { "$size": { "$objectToArray": args[0].clone() } },
            ]}))
        }),
        scalar("JSON_CONTAINS", 2, 3, |args| {
            Ok(bson!({ "$cond": [
                { "$isArray": args[0].clone() },
                { "$in": [args[1].clone(), args[0].clone()] },
                { "$eq": [args[0].clone(), args[1].clone()] },
            ]}))
        }),
        scalar("JSON_SET", 3, 3, |args| {
            let field = json_path_to_field("JSON_SET", &args[1])?;
            Ok(bson!({ "$setField": { "field": field, "input": args[0].clone(), "value": args[2].clone() } }))
        }),
        scalar("JSON_REPLACE", 3, 3, |args| {
            let field = json_path_to_field("JSON_REPLACE", &args[1])?;
            Ok(bson!({ "$setField": { "field": field, "input": args[0].clone(), "value": args[2].clone() } }))
        }),
        scalar("JSON_REMOVE", 2, 2, |args| {
            let field = json_path_to_field("JSON_REMOVE", &args[1])?;
            Ok(bson!({ "$setField": { "field": field, "input": args[0].clone(), "value": "$$REMOVE" } }))
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{Recipe, catalogue};

    #[test]
    fn json_extract_strips_dollar_prefix() {
        let entry = catalogue().get("JSON_EXTRACT").unwrap();
        let Recipe::Scalar(f) = &entry.recipe else {
            panic!()
        };
        let out = f(
            "JSON_EXTRACT",
            &[Bson::String("$doc".into()), Bson::String("$.address.city".into())],
        )
        .unwrap();
        assert_eq!(out, bson!({ "$getField": { "field": "address.city", "input": "$doc" } }));
    }

    #[test]
    fn json_object_rejects_odd_argument_count() {
        let entry = catalogue().get("JSON_OBJECT").unwrap();
        let Recipe::Scalar(f) = &entry.recipe else {
            panic!()
        };
        let err = f("JSON_OBJECT", &[Bson::String("k".into())]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnsupportedArgument { .. }));
    }
}
