//! SHOW STATS command.

use serde_json::json;

use super::prelude::*;
use crate::stats::counters;

pub struct ShowStats;

#[async_trait]
impl Command for ShowStats {
    fn name(&self) -> String {
        "SHOW STATS".into()
    }

    fn parse(_sql: &str) -> Result<Self, Error> {
        Ok(Self)
    }

    async fn execute(&self, _context: &AdminContext) -> Result<Vec<Row>, Error> {
        Ok(counters()
            .snapshot()
            .into_iter()
            .map(|(name, value)| {
                named_row(&[("counter", json!(name)), ("value", json!(value))])
            })
            .collect())
    }
}
