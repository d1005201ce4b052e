//! OCR Ingest Server Library
//!
//! Accepts PDF uploads, rasterizes them into page images, runs OCR over every
//! page and stores the extracted text. The server binary is in main.rs.
//!
//! # Modules
//!
//! - `ingest`: The upload pipeline and its transient artifact handling
//! - `ocr`: Recognition engine backends
//! - `db`: SQLite persistence for documents and extracted text
//! - `routes`: HTTP surface

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod ocr;
pub mod routes;
pub mod state;
