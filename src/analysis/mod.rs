//! Conversation analysis.
//!
//! The remote gateway and its HTTP client, the title/summary reply parser,
//! and the day/week aggregation of committed analytics.

pub mod aggregator;
pub mod client;
pub mod gateway;
pub mod parser;

pub use aggregator::TemporalAggregator;
pub use client::{ClientConfig, HttpAnalysisClient};
pub use gateway::{AnalysisGateway, AnalysisStep};
pub use parser::TitleSummaryParser;
