//! # InformedChoice
//!
//! Resolves a food product (catalog ID, barcode, or free-text query) to a
//! consolidated record: its ingredients, a processing-level score, a
//! nutrition score, evidence-backed health findings, and a purchase link.
//!
//! The scored fields are expensive (each one is an external oracle call),
//! so they are computed on first read and stored; a product is never
//! scored twice.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌────────────┐   ┌──────────┐
//! │ CLI/HTTP │──▶│  Resolver │──▶│  Enricher  │──▶│  Oracle  │
//! │ (ic)     │   │ predicate │   │ fill-once  │   │ LLM/heur │
//! └──────────┘   └─────┬─────┘   └─────┬──────┘   └──────────┘
//!                      │ read          │ partial write
//!                      ▼               ▼
//!                ┌─────────────────────────┐
//!                │   SQLite products+FTS5  │
//!                └─────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ic init                          # create database
//! ic import products.jsonl         # load raw product rows
//! ic lookup --id 42                # resolve + enrich one product
//! ic suggest "peanut but"          # autocomplete
//! ic serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Product and assessment types |
//! | [`error`] | Caller-facing error taxonomy |
//! | [`store`] | Product store trait, SQLite and in-memory backends |
//! | [`oracle`] | Scoring oracle trait and backends |
//! | [`heuristic`] | Keyword-count processing heuristic |
//! | [`enrich`] | Fill-on-read enrichment pipeline |
//! | [`resolve`] | Request validation and product resolution |
//! | [`suggest`] | Autocomplete |
//! | [`import`] | JSON Lines ingestion |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod heuristic;
pub mod import;
pub mod migrate;
pub mod models;
pub mod oracle;
pub mod resolve;
pub mod server;
pub mod store;
pub mod suggest;
