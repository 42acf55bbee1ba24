//! aci-core: Attacker Credibility Index scoring engine.
//!
//! Pipeline:
//!   transcripts → chat_features → ChatFeatureVector
//!   claims + payments + vectors → aggregate (per window) → GroupProfile
//!   GroupProfile + cohort → scoring → AciScoreRecord
//!
//! windowing drives aggregate + score once per time window. store keeps
//! an audit trail of runs; csv and ingest handle the file formats.

pub mod aggregate;
pub mod amount;
pub mod attribution;
pub mod chat_features;
pub mod commitment;
pub mod config;
pub mod csv;
pub mod error;
pub mod evidence;
pub mod ingest;
pub mod scoring;
pub mod store;
pub mod timestamp;
pub mod types;
pub mod windowing;
