//! End-to-end scenarios translating SQL text straight to the MongoDB
//! invocation a driver would receive, exercising `translate`/`translate_many`
//! as a host program would.

use bson::{Bson, doc};
use sqlmongo_translate::{Op, TranslateOptions, Update, translate, translate_many};

fn opts() -> TranslateOptions {
    TranslateOptions::default()
}

#[test]
fn simple_filtered_find_with_sort_limit_and_collation() {
    let inv = translate(
        "SELECT customerName FROM customers WHERE customerNumber > 100 ORDER BY customerName ASC LIMIT 10;",
        "db",
        &opts(),
    )
    .unwrap();

    assert_eq!(inv.collection, "customers");
    assert_eq!(inv.op, Some(Op::Find));
    assert_eq!(inv.filter, Some(doc! { "customerNumber": { "$gt": 100 } }));
    assert_eq!(inv.projection, Some(doc! { "_id": 0, "customerName": 1 }));
    assert_eq!(inv.sort, Some(doc! { "customerName": 1 }));
    assert_eq!(inv.limit, Some(10));
    assert_eq!(
        inv.collation,
        Some(doc! { "locale": "en", "caseLevel": false, "strength": 1, "numericOrdering": false })
    );
}

#[test]
fn group_by_with_having_and_order_by_lowers_to_aggregate() {
    let inv = translate(
        "SELECT country, COUNT(*) AS n FROM customers GROUP BY country HAVING COUNT(*) > 5 ORDER BY n DESC;",
        "db",
        &opts(),
    )
    .unwrap();

    assert_eq!(inv.op, Some(Op::Aggregate));
    let pipeline = inv.pipeline.unwrap();

    let group = pipeline.iter().find_map(|s| s.get_document("$group").ok()).expect("$group stage");
    assert_eq!(group.get_str("_id").unwrap(), "$country");
    assert_eq!(group.get_document("n").unwrap(), &doc! { "$sum": 1 });
    assert_eq!(group.get_document("country").unwrap(), &doc! { "$first": "$country" });

    let having = pipeline.iter().find_map(|s| s.get_document("$match").ok()).expect("$match stage");
    assert_eq!(having.get_document("n").unwrap(), &doc! { "$gt": 5 });

    let sort = pipeline.iter().find_map(|s| s.get_document("$sort").ok()).expect("$sort stage");
    assert_eq!(sort.get_i32("n").unwrap(), -1);

    let project = pipeline.iter().find_map(|s| s.get_document("$project").ok()).expect("$project stage");
    assert_eq!(project.get_i32("country").unwrap(), 1);
    assert_eq!(project.get_i32("n").unwrap(), 1);
    assert_eq!(project.get_i32("_id").unwrap(), 0);

    // $group precedes $match precedes $sort precedes $project.
    let pos = |key: &str| pipeline.iter().position(|s| s.contains_key(key)).unwrap();
    assert!(pos("$group") < pos("$match"));
    assert!(pos("$match") < pos("$sort"));
    assert!(pos("$sort") < pos("$project"));
}

#[test]
fn left_join_lowers_to_lookup_and_unwind_with_preserve_empty() {
    let inv = translate(
        "SELECT c.customerName, o.orderDate FROM customers c LEFT JOIN orders o ON c.customerNumber = o.customerNumber;",
        "db",
        &opts(),
    )
    .unwrap();

    assert_eq!(inv.collection, "customers");
    assert_eq!(inv.op, Some(Op::Aggregate));
    let pipeline = inv.pipeline.unwrap();

    let lookup = pipeline.iter().find_map(|s| s.get_document("$lookup").ok()).expect("$lookup stage");
    assert_eq!(lookup.get_str("from").unwrap(), "orders");
    assert_eq!(lookup.get_str("as").unwrap(), "o");

    let let_doc = lookup.get_document("let").expect("$lookup.let");
    assert_eq!(let_doc.len(), 1);
    let (var_name, var_value) = let_doc.iter().next().unwrap();
    assert_eq!(var_value, &Bson::String("$customerNumber".to_string()));

    let inner_pipeline = lookup.get_array("pipeline").expect("$lookup.pipeline");
    assert_eq!(inner_pipeline.len(), 1);
    let inner_match = inner_pipeline[0].as_document().unwrap().get_document("$match").unwrap();
    let expr = inner_match.get_document("$expr").unwrap();
    let eq = expr.get_array("$eq").unwrap();
    assert_eq!(eq[0], Bson::String("$customerNumber".to_string()));
    assert_eq!(eq[1], Bson::String(format!("$${var_name}")));

    let unwind = pipeline.iter().find_map(|s| s.get_document("$unwind").ok()).expect("$unwind stage");
    assert_eq!(unwind.get_bool("preserveNullAndEmptyArrays").unwrap(), true);

    let project = pipeline.iter().find_map(|s| s.get_document("$project").ok()).expect("$project stage");
    assert_eq!(project.get_i32("customerName").unwrap(), 1);
    assert_eq!(project.get("orderDate").unwrap(), &Bson::String("$o.orderDate".to_string()));
}

#[test]
fn select_without_from_lowers_to_documents_source() {
    let inv = translate("SELECT 1+1 AS sum;", "db", &opts()).unwrap();

    assert_eq!(inv.op, Some(Op::Aggregate));
    let pipeline = inv.pipeline.unwrap();

    let documents = pipeline.iter().find_map(|s| s.get_array("$documents").ok()).expect("$documents stage");
    assert_eq!(documents, &vec![Bson::Document(doc! {})]);

    let project = pipeline.iter().find_map(|s| s.get_document("$project").ok()).expect("$project stage");
    assert_eq!(project.get_document("sum").unwrap(), &doc! { "$add": [1, 1] });
}

#[test]
fn in_subquery_lowers_to_lookup_and_match_in() {
    let inv = translate(
        "SELECT customerName FROM customers WHERE customerNumber IN (SELECT customerNumber FROM orders);",
        "db",
        &opts(),
    )
    .unwrap();

    assert_eq!(inv.collection, "customers");
    assert_eq!(inv.op, Some(Op::Aggregate));
    let pipeline = inv.pipeline.unwrap();

    let lookup = pipeline.iter().find_map(|s| s.get_document("$lookup").ok()).expect("$lookup stage");
    assert_eq!(lookup.get_str("from").unwrap(), "orders");

    let matched = pipeline
        .iter()
        .filter_map(|s| s.get_document("$match").ok())
        .find(|m| m.contains_key("$expr"))
        .expect("$match $expr stage");
    let expr = matched.get_document("$expr").unwrap();
    assert!(expr.contains_key("$in"));

    let project = pipeline.iter().find_map(|s| s.get_document("$project").ok()).expect("$project stage");
    assert_eq!(project.get_i32("customerName").unwrap(), 1);
}

#[test]
fn if_expression_lowers_to_cond() {
    let inv = translate(
        "SELECT IF(creditLimit > 50000, 'High', 'Low') AS tier FROM customers;",
        "db",
        &opts(),
    )
    .unwrap();

    assert_eq!(inv.op, Some(Op::Aggregate));
    let pipeline = inv.pipeline.unwrap();
    let project = pipeline.iter().find_map(|s| s.get_document("$project").ok()).expect("$project stage");
    assert_eq!(
        project.get_document("tier").unwrap(),
        &doc! { "$cond": [ doc! { "$gt": ["$creditLimit", 50000] }, "High", "Low" ] }
    );
}

#[test]
fn update_with_literal_set_lowers_to_update_many() {
    let inv = translate(
        "UPDATE customers SET contactFirstName = 'Jane' WHERE customerNumber = 500;",
        "db",
        &opts(),
    )
    .unwrap();

    assert_eq!(inv.collection, "customers");
    assert_eq!(inv.op, Some(Op::UpdateMany));
    assert_eq!(inv.filter, Some(doc! { "customerNumber": 500 }));
    match inv.update {
        Some(Update::Document(d)) => assert_eq!(d, doc! { "$set": { "contactFirstName": "Jane" } }),
        other => panic!("expected a plain $set document, got {other:?}"),
    }
}

#[test]
fn translate_many_splits_statements_and_preserves_order() {
    let invocations = translate_many(
        "SELECT * FROM widgets; UPDATE widgets SET qty = 1 WHERE id = 1;",
        "db",
        &opts(),
    )
    .unwrap();
    assert_eq!(invocations.len(), 2);
    assert_eq!(invocations[0].op, Some(Op::Find));
    assert_eq!(invocations[1].op, Some(Op::UpdateMany));
}
