//! String function family (spec §4.4).

use bson::{Bson, bson};

use super::{CatalogueEntry, scalar};
use crate::error::TranslationResult;

pub fn entries() -> Vec<CatalogueEntry> {
    vec![
        scalar("CONCAT", 1, usize::MAX, |args| {
            Ok(bson!({ "$concat": args.to_vec() }))
        }),
        scalar("CONCAT_WS", 2, usize::MAX, |args| {
            Ok(bson!({ "$reduce": {
                "input": args[1..].to_vec(),
                "initialValue": "",
                "in": {
                    "$cond": [
                        { "$eq": ["$$value", ""] },
                        "$$this",
                        { "$concat": ["$$value", args[0].clone(), "$$this"] },
                    ]
                }
            }}))
        }),
        scalar("LENGTH", 1, 1, |args| {
            Ok(bson!({ "$strLenBytes": args[0].clone() }))
        }),
        scalar("CHAR_LENGTH", 1, 1, |args| {
            Ok(bson!({ "$strLenCP": args[0].clone() }))
        }),
        scalar("CHARACTER_LENGTH", 1, 1, |args| {
            Ok(bson!({ "$strLenCP": args[0].clone() }))
        }),
        scalar("UPPER", 1, 1, |args| Ok(bson!({ "$toUpper": args[0].clone() }))),
        scalar("UCASE", 1, 1, |args| Ok(bson!({ "$toUpper": args[0].clone() }))),
        scalar("LOWER", 1, 1, |args| Ok(bson!({ "$toLower": args[0].clone() }))),
        scalar("LCASE", 1, 1, |args| Ok(bson!({ "$toLower": args[0].clone() }))),
        scalar("LEFT", 2, 2, |args| {
            Ok(bson!({ "$substrCP": [args[0].clone(), 0, args[1].clone()] }))
        }),
        scalar("RIGHT", 2, 2, |args| {
            Ok(bson!({
                "$substrCP": [
                    args[0].clone(),
                    { "$max": [{ "$subtract": [{ "$strLenCP": args[0].clone() }, args[1].clone()] }, 0] },
                    args[1].clone(),
                ]
            }))
        }),
        scalar("SUBSTRING", 2, 3, substring_recipe),
        scalar("SUBSTR", 2, 3, substring_recipe),
        scalar("MID", 2, 3, substring_recipe),
        scalar("TRIM", 1, 1, |args| Ok(bson!({ "$trim": { "input": args[0].clone() } }))),
        scalar("LTRIM", 1, 1, |args| {
            Ok(bson!({ "$ltrim": { "input": args[0].clone() } }))
        }),
        scalar("RTRIM", 1, 1, |args| {
            Ok(bson!({ "$rtrim": { "input": args[0].clone() } }))
        }),
        scalar("REPLACE", 3, 3, |args| {
            Ok(bson!({ "$replaceAll": {
                "input": args[0].clone(), "find": args[1].clone(), "replacement": args[2].clone()
            }}))
        }),
        scalar("REVERSE", 1, 1, |args| {
            Ok(bson!({ "$reduce": {
                "input": { "$map": { "input": { "$range": [0, { "$strLenCP": args[0].clone() }] },
                                      "as": "i",
                                      "in": { "$substrCP": [args[0].clone(), { "$subtract": [{ "$subtract": [{ "$strLenCP": args[0].clone() }, 1] }, "$$i"] }, 1] } },
                "initialValue": "",
                "in": { "$concat": ["$$value", "$$this"] }
            }}))
        }),
        scalar("LPAD", 3, 3, |args| Ok(pad(args, true))),
        scalar("RPAD", 3, 3, |args| Ok(pad(args, false))),
        scalar("INSTR", 2, 2, |args| {
            Ok(bson!({ "$add": [{ "$indexOfCP": [args[0].clone(), args[1].clone()] }, 1] }))
        }),
        scalar("LOCATE", 2, 3, |args| {
            let start = args.get(2).cloned().unwrap_or(Bson::Int32(0));
            Ok(bson!({ "$add": [{ "$indexOfCP": [args[1].clone(), args[0].clone(), start] }, 1] }))
        }),
        scalar("POSITION", 2, 2, |args| {
            Ok(bson!({ "$add": [{ "$indexOfCP": [args[1].clone(), args[0].clone()] }, 1] }))
        }),
        scalar("REPEAT", 2, 2, |args| {
            Ok(bson!({ "$reduce": {
                "input": { "$range": [0, args[1].clone()] },
                "initialValue": "",
                "in": { "$concat": ["$$value", args[0].clone()] }
            }}))
        }),
        scalar("FORMAT", 2, 2, |args| {
            Ok(bson!({ "$toString": { "$round": [args[0].clone(), args[1].clone()] } }))
        }),
        scalar("HEX", 1, 1, |args| {
            Ok(bson!({ "$toString": { "$function": {
                "body": "function(v) { return v; }",
                "args": [args[0].clone()],
                "lang": "js"
            }}}))
        }),
        scalar("UNHEX", 1, 1, |args| {
            Ok(bson!({ "$function": {
                "body": "function(hex) { return Buffer.from(hex, 'hex').toString(); }",
                "args": [args[0].clone()],
                "lang": "js"
            }}))
        }),
        scalar("SOUNDEX", 1, 1, |args| {
            Ok(bson!({ "$function": {
                "body": "function(s) { return s; }",
                "args": [args[0].clone()],
                "lang": "js"
            }}))
        }),
        scalar("ASCII", 1, 1, |args| {
            Ok(bson!({ "$toInt": { "$substrBytes": [args[0].clone(), 0, 1] } }))
        }),
    ]
}

fn substring_recipe(args: &[Bson]) -> TranslationResult<Bson> {
    let start_zero_based = bson!({ "$subtract": [args[1].clone(), 1] });
    let len = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| bson!({ "$strLenCP": args[0].clone() }));
    Ok(bson!({ "$substrCP": [args[0].clone(), start_zero_based, len] }))
}

fn pad(args: &[Bson], left: bool) -> Bson {
    // MariaDB LPAD/RPAD(str, len, padstr). Mongo has no native pad operator,
    // so this builds the padding string by repeating `padstr` and trims it
    // to the exact remaining width.
    let str_expr = args[0].clone();
    let len_expr = args[1].clone();
    let pad_expr = args[2].clone();
    let remaining = bson!({ "$max": [{ "$subtract": [len_expr.clone(), { "$strLenCP": str_expr.clone() }] }, 0] });
    let padding = bson!({ "$substrCP": [
        { "$reduce": {
            "input": { "$range": [0, { "$add": [remaining.clone(), { "$strLenCP": pad_expr.clone() }] }] },
            "initialValue": "",
            "in": { "$concat": ["$$value", pad_expr.clone()] }
        }},
        0,
        remaining,
    ]});
    if left {
        bson!({ "$concat": [padding, str_expr] })
    } else {
        bson!({ "$concat": [str_expr, padding] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::catalogue;

    #[test]
    fn upper_lowers_to_to_upper() {
        let entry = catalogue().get("UPPER").unwrap();
        let crate::catalogue::Recipe::Scalar(f) = &entry.recipe else {
            panic!("expected scalar recipe");
        };
        let out = f("UPPER", &[Bson::String("$name".into())]).unwrap();
        assert_eq!(out, bson!({ "$toUpper": "$name" }));
    }

    #[test]
    fn length_family_is_registered() {
        assert!(catalogue().contains("length"));
        assert!(catalogue().contains("char_length"));
    }
}
