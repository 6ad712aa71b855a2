//! Rule repository port: where character packs and their rules come from.

use std::future::Future;
use std::path::PathBuf;

use serde::Serialize;

use nudge_domain::error::NudgeError;
use nudge_domain::rule::Rule;

/// The rules of one character pack, ready to be scheduled.
#[derive(Debug, Clone, Default)]
pub struct RulePack {
    pub pack_id: String,
    /// Valid rules in authored order.
    pub rules: Vec<Rule>,
    /// Directory pre-recorded voice files are resolved against.
    pub audio_dir: Option<PathBuf>,
    /// Number of rules dropped because they failed to parse or validate.
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackSummary {
    pub id: String,
    pub name: String,
}

/// Repository for reading character packs.
pub trait RuleRepository {
    /// Load the rules of a pack.
    ///
    /// Individual bad rules are skipped and counted in [`RulePack::skipped`];
    /// an error means the pack itself could not be read.
    fn load_pack(&self, pack_id: &str) -> impl Future<Output = Result<RulePack, NudgeError>> + Send;

    /// List the packs available.
    fn list_packs(&self) -> impl Future<Output = Result<Vec<PackSummary>, NudgeError>> + Send;
}
