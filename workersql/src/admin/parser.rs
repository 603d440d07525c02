//! Admin command parser.

use tracing::debug;

use super::invalidate::Invalidate;
use super::show_breakers::ShowBreakers;
use super::show_policy::ShowPolicy;
use super::show_splits::ShowSplits;
use super::show_stats::ShowStats;
use super::show_version::ShowVersion;
use super::split::Split;
use super::{AdminContext, Command, Error};
use crate::backend::Row;

/// Parser result.
pub enum ParseResult {
    ShowSplits(ShowSplits),
    ShowPolicy(ShowPolicy),
    ShowBreakers(ShowBreakers),
    ShowStats(ShowStats),
    ShowVersion(ShowVersion),
    Split(Split),
    Invalidate(Invalidate),
}

impl ParseResult {
    pub fn parse(sql: &str) -> Result<Self, Error> {
        let normalized = sql.trim().trim_end_matches(';').to_lowercase();
        let mut tokens = normalized.split_whitespace();

        let result = match (tokens.next(), tokens.next()) {
            (Some("show"), Some("splits")) => ParseResult::ShowSplits(ShowSplits::parse(sql)?),
            (Some("show"), Some("policy")) => ParseResult::ShowPolicy(ShowPolicy::parse(sql)?),
            (Some("show"), Some("breakers")) => {
                ParseResult::ShowBreakers(ShowBreakers::parse(sql)?)
            }
            (Some("show"), Some("stats")) => ParseResult::ShowStats(ShowStats::parse(sql)?),
            (Some("show"), Some("version")) => {
                ParseResult::ShowVersion(ShowVersion::parse(sql)?)
            }
            (Some("split"), Some(_)) => ParseResult::Split(Split::parse(&normalized)?),
            (Some("invalidate"), Some(_)) => {
                ParseResult::Invalidate(Invalidate::parse(&normalized)?)
            }
            _ => return Err(Error::UnknownCommand),
        };

        debug!("admin: {}", result.name());
        Ok(result)
    }

    /// Execute command.
    pub async fn execute(&self, context: &AdminContext) -> Result<Vec<Row>, Error> {
        use ParseResult::*;

        match self {
            ShowSplits(command) => command.execute(context).await,
            ShowPolicy(command) => command.execute(context).await,
            ShowBreakers(command) => command.execute(context).await,
            ShowStats(command) => command.execute(context).await,
            ShowVersion(command) => command.execute(context).await,
            Split(command) => command.execute(context).await,
            Invalidate(command) => command.execute(context).await,
        }
    }

    /// Get command name.
    pub fn name(&self) -> String {
        use ParseResult::*;

        match self {
            ShowSplits(command) => command.name(),
            ShowPolicy(command) => command.name(),
            ShowBreakers(command) => command.name(),
            ShowStats(command) => command.name(),
            ShowVersion(command) => command.name(),
            Split(command) => command.name(),
            Invalidate(command) => command.name(),
        }
    }
}
