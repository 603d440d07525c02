//! SHOW VERSION command.

use serde_json::json;

use super::prelude::*;

pub struct ShowVersion;

#[async_trait]
impl Command for ShowVersion {
    fn name(&self) -> String {
        "SHOW VERSION".into()
    }

    fn parse(_sql: &str) -> Result<Self, Error> {
        Ok(Self)
    }

    async fn execute(&self, _context: &AdminContext) -> Result<Vec<Row>, Error> {
        Ok(vec![named_row(&[(
            "version",
            json!(format!("WorkerSQL v{}", env!("CARGO_PKG_VERSION"))),
        )])])
    }
}
