//! LIKE-pattern-to-regex conversion and the deterministic ordering shim:
//! insert a stable `$sort` before `LIMIT` whenever the query has no
//! explicit ORDER BY, so paging results stays reproducible.

use bson::{Bson, Document, bson};

/// Converts a SQL `LIKE` pattern (`%`/`_` wildcards) to an anchored regex
/// source string. Regex metacharacters in the literal portion are escaped
/// first so a pattern like `50%` only ever matches a literal `50`.
pub(crate) fn like_pattern_to_regex(pattern: &str) -> String {
    let mut regex = String::new();
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\' => {
                regex.push('\\');
                regex.push(ch);
            }
            _ => regex.push(ch),
        }
    }
    if !regex.starts_with(".*") {
        regex.insert_str(0, "^");
    }
    if !regex.ends_with(".*") {
        regex.push('$');
    }
    regex
}

/// `$regexMatch` form used inside an aggregation expression context
/// (projections, HAVING, `$expr`-shaped WHERE). The flat `{field: {$regex:
/// ...}}` form used by `find`/simple `$match` lives in `select::lower_filter`.
pub(crate) fn regex_match(input: Bson, pattern: &str) -> Bson {
    bson!({ "$regexMatch": { "input": input, "regex": like_pattern_to_regex(pattern) } })
}

/// Inserts the `$sort` on `_id` ascending that makes `LIMIT`/`OFFSET`
/// deterministic when the query has no explicit `ORDER BY` (spec §4.7).
/// No-op unless a limit is present, the option is enabled, and there is no
/// explicit ordering already.
pub(crate) fn apply_ordering_shim(
    pipeline: &mut Vec<Document>,
    has_limit: bool,
    has_explicit_order: bool,
    implicit_order_on_limit: bool,
) {
    if has_limit && !has_explicit_order && implicit_order_on_limit {
        pipeline.push(bson::doc! { "$sort": { "_id": 1 } });
    }
}

/// Same shim for the `find` path, where sort is a document on the
/// invocation rather than a pipeline stage.
pub(crate) fn shim_find_sort(
    sort: Option<Document>,
    has_limit: bool,
    implicit_order_on_limit: bool,
) -> Option<Document> {
    if sort.is_some() {
        return sort;
    }
    if has_limit && implicit_order_on_limit {
        return Some(bson::doc! { "_id": 1 });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_becomes_dot_star_and_anchors_remaining_literal() {
        assert_eq!(like_pattern_to_regex("A%"), "^A.*");
        assert_eq!(like_pattern_to_regex("%A"), ".*A$");
        assert_eq!(like_pattern_to_regex("%A%"), ".*A.*");
    }

    #[test]
    fn escapes_regex_metacharacters_in_literal_portion() {
        assert_eq!(like_pattern_to_regex("a.b"), "^a\\.b$");
    }

    #[test]
    fn underscore_becomes_single_char_wildcard() {
        assert_eq!(like_pattern_to_regex("a_c"), "^a.c$");
    }

    #[test]
    fn shim_only_fires_when_limit_present_and_no_explicit_order() {
        let mut pipeline = Vec::new();
        apply_ordering_shim(&mut pipeline, false, false, true);
        assert!(pipeline.is_empty());

        apply_ordering_shim(&mut pipeline, true, true, true);
        assert!(pipeline.is_empty());

        apply_ordering_shim(&mut pipeline, true, false, true);
        assert_eq!(pipeline.len(), 1);
    }
}
