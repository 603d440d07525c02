//! SHOW BREAKERS command.

use serde_json::json;

use super::prelude::*;

pub struct ShowBreakers;

#[async_trait]
impl Command for ShowBreakers {
    fn name(&self) -> String {
        "SHOW BREAKERS".into()
    }

    fn parse(_sql: &str) -> Result<Self, Error> {
        Ok(Self)
    }

    async fn execute(&self, context: &AdminContext) -> Result<Vec<Row>, Error> {
        let mut states = context.client.breakers().states();
        states.sort();

        Ok(states
            .into_iter()
            .map(|(shard, state)| {
                named_row(&[("shard", json!(shard)), ("state", json!(state))])
            })
            .collect())
    }
}
