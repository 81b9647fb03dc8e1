//! Datetime function family (spec §4.4, §4.6). `DATE_ADD`/`DATE_SUB`/
//! `TIMESTAMPADD` rely on the lowering engine's interval convention
//! (`crate::lowering::conv::interval_doc`): an `Expression::Lit(Literal::Interval)`
//! lowers to `{"__amount": n, "__unit": "<mongo unit>"}` rather than a bare
//! number, so the recipe can recover both the amount and the unit string
//! from a single already-lowered argument.

use bson::{Bson, bson, doc};

use super::{CatalogueEntry, scalar};
use crate::error::{ErrorKind, TranslationResult};

fn interval_parts(function: &'static str, b: &Bson) -> TranslationResult<(Bson, Bson)> {
    match b {
        Bson::Document(d) if d.contains_key("__amount") && d.contains_key("__unit") => Ok((
            d.get("__amount").cloned().unwrap(),
            d.get("__unit").cloned().unwrap(),
        )),
        other => Err(ErrorKind::UnsupportedArgument {
            function: function.to_string(),
            message: format!("expected an INTERVAL literal, found {other:?}"),
        }
        .into()),
    }
}

fn date_add_sub(name: &'static str, negate: bool) -> CatalogueEntry {
    scalar(name, 2, 2, move |args| {
        let (amount, unit) = interval_parts(name, &args[1])?;
        let amount = if negate {
            bson!({ "$multiply": [amount, -1] })
        } else {
            amount
        };
        Ok(bson!({ "$dateAdd": { "startDate": args[0].clone(), "unit": unit, "amount": amount } }))
    })
}

fn require_string(function: &'static str, b: &Bson) -> TranslationResult<String> {
    match b {
        Bson::String(s) => Ok(s.clone()),
        other => Err(ErrorKind::UnsupportedArgument {
            function: function.to_string(),
            message: format!("expected a literal unit/format string, found {other:?}"),
        }
        .into()),
    }
}

fn extract_unit_operator(unit: &str) -> Option<&'static str> {
    Some(match unit {
        "YEAR" => "$year",
        "QUARTER" => "$quarter_marker",
        "MONTH" => "$month",
        "WEEK" => "$week",
        "DAY" => "$dayOfMonth",
        "HOUR" => "$hour",
        "MINUTE" => "$minute",
        "SECOND" => "$second",
        "MICROSECOND" => "$millisecond",
        "DAYOFWEEK" => "$dayOfWeek",
        "DAYOFYEAR" => "$dayOfYear",
        "ISOWEEK" => "$isoWeek",
        _ => return None,
    })
}

/// `EXTRACT`/component-extractor dispatch shared between `EXTRACT(unit FROM
/// d)` and the standalone `YEAR(d)`-style functions.
fn extract_component(unit: &str, date_expr: Bson) -> TranslationResult<Bson> {
    if unit == "QUARTER" {
        return Ok(bson!({ "$ceil": { "$divide": [{ "$month": date_expr }, 3] } }));
    }
    let op = extract_unit_operator(unit).ok_or_else(|| ErrorKind::UnsupportedArgument {
        function: "EXTRACT".to_string(),
        message: format!("unknown interval unit `{unit}`"),
    })?;
    let mut doc = bson::Document::new();
    doc.insert(op, date_expr);
    Ok(Bson::Document(doc))
}

fn component_fn(unit: &'static str) -> impl Fn(&[Bson]) -> TranslationResult<Bson> {
    move |args| extract_component(unit, args[0].clone())
}

/// MariaDB `DATE_FORMAT` specifier -> MongoDB `$dateToString` token, or
/// `None` when MongoDB has no native equivalent.
fn format_specifier(c: char) -> Option<&'static str> {
    Some(match c {
        'Y' => "%Y",
        'y' => "%y",
        'm' => "%m",
        'c' => "%m",
        'd' => "%d",
        'e' => "%d",
        'H' => "%H",
        'k' => "%H",
        'i' => "%M",
        'S' => "%S",
        's' => "%S",
        'f' => "%L",
        'j' => "%j",
        'u' => "%V",
        'U' => "%U",
        'V' => "%U",
        'v' => "%V",
        'G' => "%G",
        'X' => "%G",
        'w' => "%w",
        'z' => "%z",
        'Z' => "%Z",
        '%' => "%%",
        _ => return None,
    })
}

fn sql_format_to_mongo(function: &'static str, fmt: &str) -> TranslationResult<String> {
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let spec = chars.next().ok_or_else(|| ErrorKind::UnsupportedFormatSpecifier {
            function: function.to_string(),
            specifier: "%".to_string(),
        })?;
        match format_specifier(spec) {
            Some(mapped) => out.push_str(mapped),
            None => {
                return Err(ErrorKind::UnsupportedFormatSpecifier {
                    function: function.to_string(),
                    specifier: format!("%{spec}"),
                }
                .into());
            }
        }
    }
    Ok(out)
}

pub fn entries() -> Vec<CatalogueEntry> {
    vec![
        scalar("NOW", 0, 1, |_| Ok(bson!({ "$$NOW": Bson::Null }.get("$$NOW").unwrap().clone()))),
        scalar("CURDATE", 0, 0, |_| Ok(bson!({ "$dateTrunc": { "date": "$$NOW", "unit": "day" } }))),
        scalar("CURRENT_DATE", 0, 0, |_| Ok(bson!({ "$dateTrunc": { "date": "$$NOW", "unit": "day" } }))),
        scalar("CURTIME", 0, 0, |_| Ok(bson!("$$NOW"))),
        scalar("CURRENT_TIMESTAMP", 0, 1, |_| Ok(bson!("$$NOW"))),
        scalar("UTC_DATE", 0, 0, |_| Ok(bson!({ "$dateTrunc": { "date": "$$NOW", "unit": "day", "timezone": "UTC" } }))),
        scalar("UTC_TIME", 0, 0, |_| Ok(bson!("$$NOW"))),
        scalar("UTC_TIMESTAMP", 0, 0, |_| Ok(bson!("$$NOW"))),
        scalar("YEAR", 1, 1, component_fn("YEAR")),
        scalar("MONTH", 1, 1, component_fn("MONTH")),
        scalar("DAY", 1, 1, component_fn("DAY")),
        scalar("DAYOFMONTH", 1, 1, component_fn("DAY")),
        scalar("HOUR", 1, 1, component_fn("HOUR")),
        scalar("MINUTE", 1, 1, component_fn("MINUTE")),
        scalar("SECOND", 1, 1, component_fn("SECOND")),
        scalar("MICROSECOND", 1, 1, component_fn("MICROSECOND")),
        scalar("DAYOFWEEK", 1, 1, component_fn("DAYOFWEEK")),
        scalar("DAYOFYEAR", 1, 1, component_fn("DAYOFYEAR")),
        scalar("QUARTER", 1, 1, component_fn("QUARTER")),
        scalar("WEEK", 1, 2, component_fn("WEEK")),
        scalar("WEEKOFYEAR", 1, 1, component_fn("ISOWEEK")),
        scalar("WEEKDAY", 1, 1, |args| {
            // MariaDB WEEKDAY: 0=Monday..6=Sunday. Mongo $dayOfWeek: 1=Sunday..7=Saturday.
            Ok(bson!({ "$mod": [{ "$add": [{ "$subtract": [{ "$dayOfWeek": args[0].clone() }, 2] }, 7] }, 7] }))
        }),
        scalar("YEARWEEK", 1, 2, |args| {
            Ok(bson!({ "$add": [
                { "$multiply": [{ "$isoWeekYear": args[0].clone() }, 100] },
                { "$isoWeek": args[0].clone() },
            ]}))
        }),
        scalar("DAYNAME", 1, 1, |args| {
            Ok(bson!({ "$dateToString": { "date": args[0].clone(), "format": "%w" } }))
        }),
        scalar("MONTHNAME", 1, 1, |args| {
            Ok(bson!({ "$dateToString": { "date": args[0].clone(), "format": "%m" } }))
        }),
        date_add_sub("DATE_ADD", false),
        date_add_sub("ADDDATE", false),
        date_add_sub("DATE_SUB", true),
        date_add_sub("SUBDATE", true),
        scalar("TIMESTAMPADD", 3, 3, |args| {
            let unit = require_string("TIMESTAMPADD", &args[0])?;
            Ok(bson!({ "$dateAdd": { "startDate": args[2].clone(), "unit": unit.to_lowercase(), "amount": args[1].clone() } }))
        }),
        scalar("TIMESTAMPDIFF", 3, 3, |args| {
            let unit = require_string("TIMESTAMPDIFF", &args[0])?;
            Ok(bson!({ "$dateDiff": { "startDate": args[1].clone(), "endDate": args[2].clone(), "unit": unit.to_lowercase() } }))
        }),
        scalar("DATEDIFF", 2, 2, |args| {
            Ok(bson!({ "$dateDiff": { "startDate": args[1].clone(), "endDate": args[0].clone(), "unit": "day" } }))
        }),
        scalar("PERIOD_ADD", 2, 2, |args| {
            Ok(bson!({ "$add": [args[0].clone(), args[1].clone()] }))
        }),
        scalar("PERIOD_DIFF", 2, 2, |args| {
            Ok(bson!({ "$subtract": [args[0].clone(), args[1].clone()] }))
        }),
        scalar("MAKEDATE", 2, 2, |args| {
            Ok(bson!({ "$dateAdd": {
                "startDate": { "$dateFromParts": { "year": args[0].clone() } },
                "unit": "day",
                "amount": { "$subtract": [args[1].clone(), 1] },
            }}))
        }),
        scalar("MAKETIME", 3, 3, |args| {
            Ok(bson!({ "$dateFromParts": {
                "year": 1970, "month": 1, "day": 1,
                "hour": args[0].clone(), "minute": args[1].clone(), "second": args[2].clone(),
            }}))
        }),
        scalar("FROM_DAYS", 1, 1, |args| {
            Ok(bson!({ "$dateAdd": {
                "startDate": { "$dateFromParts": { "year": 1 } },
                "unit": "day",
                "amount": { "$subtract": [args[0].clone(), 1] },
            }}))
        }),
        scalar("TO_DAYS", 1, 1, |args| {
            Ok(bson!({ "$add": [{ "$dateDiff": {
                "startDate": { "$dateFromParts": { "year": 1 } },
                "endDate": args[0].clone(),
                "unit": "day",
            }}, 1] }))
        }),
        scalar("SEC_TO_TIME", 1, 1, |args| {
            Ok(bson!({ "$dateAdd": {
                "startDate": { "$dateFromParts": { "year": 1970, "month": 1, "day": 1 } },
                "unit": "second",
                "amount": args[0].clone(),
            }}))
        }),
        scalar("TIME_TO_SEC", 1, 1, |args| {
            Ok(bson!({ "$add": [
                { "$multiply": [{ "$hour": args[0].clone() }, 3600] },
                { "$multiply": [{ "$minute": args[0].clone() }, 60] },
                { "$second": args[0].clone() },
            ]}))
        }),
        scalar("LAST_DAY", 1, 1, |args| {
            Ok(bson!({ "$dateSubtract": {
                "startDate": { "$dateTrunc": {
                    "date": { "$dateAdd": { "startDate": args[0].clone(), "unit": "month", "amount": 1 } },
                    "unit": "month",
                }},
                "unit": "day",
                "amount": 1,
            }}))
        }),
        scalar("DATE_FORMAT", 2, 2, |args| {
            let fmt = require_string("DATE_FORMAT", &args[1])?;
            let mapped = sql_format_to_mongo("DATE_FORMAT", &fmt)?;
            Ok(bson!({ "$dateToString": { "date": args[0].clone(), "format": mapped } }))
        }),
        scalar("STR_TO_DATE", 2, 2, |args| {
            let fmt = require_string("STR_TO_DATE", &args[1])?;
            let mapped = sql_format_to_mongo("STR_TO_DATE", &fmt)?;
            Ok(bson!({ "$dateFromString": { "dateString": args[0].clone(), "format": mapped } }))
        }),
        scalar("CONVERT_TZ", 3, 3, |args| {
            let tz = require_string("CONVERT_TZ", &args[2])?;
            Ok(bson!({ "$dateFromString": {
                "dateString": { "$dateToString": { "date": args[0].clone(), "timezone": tz } }
            }}))
        }),
        scalar("UNIX_TIMESTAMP", 0, 1, |args| {
            let date = args.first().cloned().unwrap_or(bson!("$$NOW"));
            Ok(bson!({ "$divide": [{ "$toLong": date }, 1000] }))
        }),
        scalar("FROM_UNIXTIME", 1, 2, |args| {
            Ok(bson!({ "$toDate": { "$multiply": [args[0].clone(), 1000] } }))
        }),
        scalar("EXTRACT", 2, 2, |args| {
            let unit = require_string("EXTRACT", &args[0])?;
            extract_component(&unit, args[1].clone())
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{Recipe, catalogue};

    fn run(name: &str, args: &[Bson]) -> Bson {
        let entry = catalogue().get(name).unwrap();
        let Recipe::Scalar(f) = &entry.recipe else {
            panic!("expected scalar")
        };
        f(name, args).unwrap()
    }

    #[test]
    fn extract_year_maps_to_year_operator() {
        let out = run("EXTRACT", &[Bson::String("YEAR".into()), Bson::String("$d".into())]);
        assert_eq!(out, doc! { "$year": "$d" }.into());
    }

    #[test]
    fn date_add_uses_interval_convention() {
        let interval = doc! { "__amount": 3, "__unit": "day" };
        let out = run("DATE_ADD", &[Bson::String("$d".into()), Bson::Document(interval)]);
        assert_eq!(out, bson!({ "$dateAdd": { "startDate": "$d", "unit": "day", "amount": 3 } }));
    }

    #[test]
    fn date_sub_negates_amount() {
        let interval = doc! { "__amount": 3, "__unit": "day" };
        let out = run("DATE_SUB", &[Bson::String("$d".into()), Bson::Document(interval)]);
        assert_eq!(
            out,
            bson!({ "$dateAdd": { "startDate": "$d", "unit": "day", "amount": { "$multiply": [3, -1] } } })
        );
    }

    #[test]
    fn date_format_maps_known_specifiers() {
        let out = run(
            "DATE_FORMAT",
            &[Bson::String("$d".into()), Bson::String("%Y-%m-%d".into())],
        );
        assert_eq!(out, bson!({ "$dateToString": { "date": "$d", "format": "%Y-%m-%d" } }));
    }

    #[test]
    fn date_format_rejects_unmapped_specifier() {
        let entry = catalogue().get("DATE_FORMAT").unwrap();
        let Recipe::Scalar(f) = &entry.recipe else {
            panic!()
        };
        let err = f(
            "DATE_FORMAT",
            &[Bson::String("$d".into()), Bson::String("%M".into())],
        )
        .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnsupportedFormatSpecifier { .. }));
    }
}
