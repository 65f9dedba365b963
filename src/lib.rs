//! Enrichment of ICT asset inventories for DORA registers.
//!
//! A spreadsheet is fetched from a [`store::TableStore`], parsed into a
//! [`table::Table`] by [`sheet`], and every missing "Identified ICT Risks",
//! "Recommended Controls" and "Key Dependencies" cell is filled with one
//! model query through [`lm::ModelQuery`]. [`service`] ties this together
//! behind an HTTP endpoint; [`cli`] exposes the same pass for local files.

pub mod cli;
pub mod config;
pub mod enrich;
pub mod lm;
pub mod service;
pub mod sheet;
pub mod store;
pub mod table;
pub mod util;

#[cfg(test)]
mod test_support;
