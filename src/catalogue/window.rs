//! Window function family (spec §4.4, §4.5.1). Recipes here produce the
//! operator document placed under a `$setWindowFields` stage's `output`
//! field; partitioning and ordering come from the surrounding `WindowSpec`,
//! not from these recipes.

use bson::bson;

use super::{CatalogueEntry, window_entry};
use crate::error::ErrorKind;

pub fn entries() -> Vec<CatalogueEntry> {
    vec![
        window_entry("ROW_NUMBER", 0, 0, |_| Ok(bson!({ "$documentNumber": {} }))),
        window_entry("RANK", 0, 0, |_| Ok(bson!({ "$rank": {} }))),
        window_entry("DENSE_RANK", 0, 0, |_| Ok(bson!({ "$denseRank": {} }))),
        window_entry("LAG", 1, 2, |args| {
            let default = args.get(1).cloned();
            let mut spec = bson::Document::new();
            spec.insert("by", 1);
            let mut shift = bson::Document::new();
            shift.insert("output", args[0].clone());
            shift.insert("by", -1);
            if let Some(default) = default {
                shift.insert("default", default);
            }
            Ok(bson::Bson::Document(bson::doc! { "$shift": shift }))
        }),
        window_entry("LEAD", 1, 2, |args| {
            let default = args.get(1).cloned();
            let mut shift = bson::Document::new();
            shift.insert("output", args[0].clone());
            shift.insert("by", 1);
            if let Some(default) = default {
                shift.insert("default", default);
            }
            Ok(bson::Bson::Document(bson::doc! { "$shift": shift }))
        }),
        window_entry("FIRST_VALUE", 1, 1, |args| {
            Ok(bson::Bson::Document(
                bson::doc! { "$first": args[0].clone() },
            ))
        }),
        window_entry("LAST_VALUE", 1, 1, |args| {
            Ok(bson::Bson::Document(bson::doc! { "$last": args[0].clone() }))
        }),
        // MongoDB's $setWindowFields has no bucket-count operator; NTILE
        // would need a two-pass count-then-bucket lowering this catalogue
        // layer can't express on its own.
        window_entry("NTILE", 1, 1, |_| {
            Err(ErrorKind::UnsupportedConstruct("NTILE has no $setWindowFields equivalent".to_string()).into())
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{Recipe, catalogue};

    #[test]
    fn row_number_has_no_arguments() {
        let entry = catalogue().get("ROW_NUMBER").unwrap();
        assert_eq!(entry.min_args, 0);
        assert_eq!(entry.max_args, 0);
    }

    #[test]
    fn ntile_is_unsupported() {
        let entry = catalogue().get("NTILE").unwrap();
        let Recipe::Window(f) = &entry.recipe else {
            panic!()
        };
        assert!(f("NTILE", &[bson::Bson::Int32(4)]).is_err());
    }
}
