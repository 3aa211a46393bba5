//! # Docket
//!
//! Document intake, classification, and retrieval for office files.
//!
//! Docket ingests PDF, DOCX, and plain-text documents, extracts their text,
//! assigns a three-level category label via a trained statistical classifier,
//! tracks the corpus in a JSON-lines journal, and offers keyword search with
//! highlighted snippets plus corpus-wide summary statistics.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────┐   ┌──────────┐
//! │ Storage  │──▶│  Intake Pipeline       │──▶│ Journal  │
//! │ local/S3 │   │ extract → classify     │   │ (JSONL)  │
//! └──────────┘   └───────────────────────┘   └────┬─────┘
//!      │                                          │
//!      ▼                                          ▼
//! ┌──────────┐                              ┌──────────┐
//! │ annotate │                              │  search  │
//! │ PDF/DOCX │                              │  stats   │
//! └──────────┘                              └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dk ingest reports/*.pdf       # store, extract, classify, journal
//! dk list                       # show the tracked corpus
//! dk search "invoice"           # keyword search with snippets
//! dk stats                      # corpus summary
//! dk annotate report.pdf tax    # embed persistent highlights
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF/DOCX/plain-text extraction |
//! | [`classify`] | Hierarchical TF-IDF + naive-Bayes classifier |
//! | [`search`] | Keyword search with highlighted snippets |
//! | [`annotate`] | Opt-in persistent highlighting of stored files |
//! | [`stats`] | Corpus summary statistics |
//! | [`journal`] | JSON-lines corpus journal |
//! | [`storage`] | Storage trait + local filesystem adapter |
//! | [`storage_s3`] | S3-compatible object storage adapter |
//! | [`ingest`] | Intake, update, and delete orchestration |
//! | [`get`] | Document detail and raw-bytes retrieval |

pub mod annotate;
pub mod classify;
pub mod config;
pub mod extract;
pub mod get;
pub mod ingest;
pub mod journal;
pub mod models;
pub mod search;
pub mod stats;
pub mod storage;
pub mod storage_s3;
