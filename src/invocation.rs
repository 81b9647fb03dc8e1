//! The lowering engine's output: a fully-lowered MongoDB driver call. An
//! `Invocation` contains no host-language values beyond JSON-representable
//! BSON primitives (spec §8, "No client evaluation").

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// One stage of an aggregation pipeline. Stage order is part of the wire
/// contract (spec §6) and must never be reordered downstream.
pub type Stage = Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Op {
    Find,
    Aggregate,
    InsertOne,
    InsertMany,
    UpdateMany,
    DeleteMany,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Find => "find",
            Op::Aggregate => "aggregate",
            Op::InsertOne => "insertOne",
            Op::InsertMany => "insertMany",
            Op::UpdateMany => "updateMany",
            Op::DeleteMany => "deleteMany",
        }
    }
}

/// Either a plain `$set` document (for value-only `SET` clauses) or a full
/// aggregation-pipeline update (when the `SET` right-hand sides reference
/// other columns, spec §4.5.4).
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Document(Document),
    Pipeline(Vec<Stage>),
}

/// A fully lowered MongoDB invocation. Exactly the shape described in
/// spec §6; fields irrelevant to `op` are left `None`/empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Invocation {
    pub collection: String,
    pub op: Option<Op>,

    // find
    pub filter: Option<Document>,
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,

    // aggregate
    pub pipeline: Option<Vec<Stage>>,

    // writes
    pub document: Option<Document>,
    pub documents: Option<Vec<Document>>,
    pub update: Option<Update>,

    pub collation: Option<Document>,
}

impl Invocation {
    pub fn new(collection: impl Into<String>, op: Op) -> Self {
        Self {
            collection: collection.into(),
            op: Some(op),
            ..Default::default()
        }
    }

    pub fn find(collection: impl Into<String>) -> Self {
        Self::new(collection, Op::Find)
    }

    pub fn aggregate(collection: impl Into<String>, pipeline: Vec<Stage>) -> Self {
        let mut inv = Self::new(collection, Op::Aggregate);
        inv.pipeline = Some(pipeline);
        inv
    }

    /// Render to a plain `bson::Document` mirroring spec §6's JSON shape,
    /// useful for snapshot tests and the demonstration CLI.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("collection", self.collection.clone());
        if let Some(op) = self.op {
            doc.insert("op", op.as_str());
        }
        if let Some(f) = &self.filter {
            doc.insert("filter", f.clone());
        }
        if let Some(p) = &self.projection {
            doc.insert("projection", p.clone());
        }
        if let Some(s) = &self.sort {
            doc.insert("sort", s.clone());
        }
        if let Some(s) = self.skip {
            doc.insert("skip", s);
        }
        if let Some(l) = self.limit {
            doc.insert("limit", l);
        }
        if let Some(p) = &self.pipeline {
            doc.insert(
                "pipeline",
                Bson::Array(p.iter().cloned().map(Bson::Document).collect()),
            );
        }
        if let Some(d) = &self.document {
            doc.insert("document", d.clone());
        }
        if let Some(ds) = &self.documents {
            doc.insert(
                "documents",
                Bson::Array(ds.iter().cloned().map(Bson::Document).collect()),
            );
        }
        match &self.update {
            Some(Update::Document(d)) => {
                doc.insert("update", d.clone());
            }
            Some(Update::Pipeline(stages)) => {
                doc.insert(
                    "update",
                    Bson::Array(stages.iter().cloned().map(Bson::Document).collect()),
                );
            }
            None => {}
        }
        if let Some(c) = &self.collation {
            doc.insert("collation", c.clone());
        }
        doc
    }
}
