//! Math function family (spec §4.4). Also carries `CAST`: not a math
//! function by SQL convention, but its `$convert` lowering is a single
//! expression-builder with no other family home.

use bson::{Bson, bson};

use super::{CatalogueEntry, scalar};
use crate::error::{ErrorKind, TranslationResult};

fn unary(op: &'static str) -> impl Fn(&[Bson]) -> TranslationResult<Bson> {
    move |args| {
        let mut doc = bson::Document::new();
        doc.insert(op, args[0].clone());
        Ok(Bson::Document(doc))
    }
}

/// MariaDB `CAST(... AS type)` target -> `$convert` `to` value.
fn convert_target(function: &'static str, type_name: &str) -> TranslationResult<&'static str> {
    Ok(match type_name.to_ascii_uppercase().as_str() {
        "SIGNED" | "UNSIGNED" | "INTEGER" | "INT" => "long",
        "DECIMAL" | "NUMERIC" => "decimal",
        "CHAR" | "VARCHAR" | "TEXT" => "string",
        "DATE" | "DATETIME" => "date",
        "DOUBLE" | "FLOAT" | "REAL" => "double",
        "BINARY" => "binData",
        other => {
            return Err(ErrorKind::UnsupportedArgument {
                function: function.to_string(),
                message: format!("no MongoDB $convert target for type `{other}`"),
            }
            .into());
        }
    })
}

pub fn entries() -> Vec<CatalogueEntry> {
    vec![
        scalar("CAST", 2, 2, |args| {
            let Bson::String(type_name) = &args[1] else {
                return Err(ErrorKind::UnsupportedArgument {
                    function: "CAST".to_string(),
                    message: "target type must be a literal".to_string(),
                }
                .into());
            };
            let to = convert_target("CAST", type_name)?;
            Ok(bson!({ "$convert": { "input": args[0].clone(), "to": to } }))
        }),
        scalar("ABS", 1, 1, unary("$abs")),
        scalar("CEIL", 1, 1, unary("$ceil")),
        scalar("CEILING", 1, 1, unary("$ceil")),
        scalar("FLOOR", 1, 1, unary("$floor")),
        scalar("SQRT", 1, 1, unary("$sqrt")),
        scalar("EXP", 1, 1, unary("$exp")),
        scalar("LN", 1, 1, unary("$ln")),
        scalar("LOG", 1, 2, |args| {
            if args.len() == 1 {
                Ok(bson!({ "$ln": args[0].clone() }))
            } else {
                Ok(bson!({ "$log": [args[1].clone(), args[0].clone()] }))
            }
        }),
        scalar("LOG2", 1, 1, |args| {
            Ok(bson!({ "$log": [args[0].clone(), 2] }))
        }),
        scalar("LOG10", 1, 1, unary("$log10")),
        scalar("SIN", 1, 1, unary("$sin")),
        scalar("COS", 1, 1, unary("$cos")),
        scalar("TAN", 1, 1, unary("$tan")),
        scalar("ASIN", 1, 1, unary("$asin")),
        scalar("ACOS", 1, 1, unary("$acos")),
        scalar("ATAN", 1, 1, unary("$atan")),
        scalar("ATAN2", 2, 2, |args| {
            Ok(bson!({ "$atan2": [args[0].clone(), args[1].clone()] }))
        }),
        scalar("COT", 1, 1, |args| {
            Ok(bson!({ "$divide": [1, { "$tan": args[0].clone() }] }))
        }),
        scalar("DEGREES", 1, 1, unary("$radiansToDegrees")),
        scalar("RADIANS", 1, 1, unary("$degreesToRadians")),
        scalar("SIGN", 1, 1, |args| {
            Ok(bson!({ "$switch": {
                "branches": [
                    { "case": { "$gt": [args[0].clone(), 0] }, "then": 1 },
                    { "case": { "$lt": [args[0].clone(), 0] }, "then": -1 },
                ],
                "default": 0
            }}))
        }),
        scalar("ROUND", 1, 2, |args| {
            let precision = args.get(1).cloned().unwrap_or(Bson::Int32(0));
            Ok(bson!({ "$round": [args[0].clone(), precision] }))
        }),
        scalar("TRUNCATE", 2, 2, |args| {
            Ok(bson!({ "$trunc": [args[0].clone(), args[1].clone()] }))
        }),
        scalar("MOD", 2, 2, |args| {
            Ok(bson!({ "$mod": [args[0].clone(), args[1].clone()] }))
        }),
        scalar("POWER", 2, 2, |args| {
            Ok(bson!({ "$pow": [args[0].clone(), args[1].clone()] }))
        }),
        scalar("POW", 2, 2, |args| {
            Ok(bson!({ "$pow": [args[0].clone(), args[1].clone()] }))
        }),
        scalar("GREATEST", 1, usize::MAX, |args| {
            Ok(bson!({ "$max": args.to_vec() }))
        }),
        scalar("LEAST", 1, usize::MAX, |args| {
            Ok(bson!({ "$min": args.to_vec() }))
        }),
        scalar("PI", 0, 0, |_| Ok(Bson::Double(std::f64::consts::PI))),
        scalar("RAND", 0, 1, |_| Ok(bson!({ "$rand": {} }))),
        scalar("BIT_AND", 2, 2, |args| {
            Ok(bson!({ "$bitAnd": [args[0].clone(), args[1].clone()] }))
        }),
        scalar("BIT_OR", 2, 2, |args| {
            Ok(bson!({ "$bitOr": [args[0].clone(), args[1].clone()] }))
        }),
        scalar("BIT_XOR", 2, 2, |args| {
            Ok(bson!({ "$bitXor": [args[0].clone(), args[1].clone()] }))
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{Recipe, catalogue};

    #[test]
    fn round_defaults_precision_to_zero() {
        let entry = catalogue().get("ROUND").unwrap();
        let Recipe::Scalar(f) = &entry.recipe else {
            panic!()
        };
        let out = f("ROUND", &[Bson::String("$x".into())]).unwrap();
        assert_eq!(out, bson!({ "$round": ["$x", 0] }));
    }

    #[test]
    fn log_with_one_arg_is_natural_log() {
        let entry = catalogue().get("LOG").unwrap();
        let Recipe::Scalar(f) = &entry.recipe else {
            panic!()
        };
        let out = f("LOG", &[Bson::String("$x".into())]).unwrap();
        assert_eq!(out, bson!({ "$ln": "$x" }));
    }
}
