//! Log statements to a file.
//!
//! DO NOT USE IN PRODUCTION. This is very slow.

use tokio::{fs::OpenOptions, io::AsyncWriteExt};

use crate::config::config;
use crate::routing::TenantId;
use crate::util::now_ms;

/// Log one statement with its tenant attribution.
pub(crate) struct QueryLogger<'a> {
    tenant: &'a TenantId,
    sql: &'a str,
}

impl<'a> QueryLogger<'a> {
    pub(crate) fn new(tenant: &'a TenantId, sql: &'a str) -> Self {
        Self { tenant, sql }
    }

    pub(crate) async fn log(&self) -> std::io::Result<()> {
        let path = match &config().general.query_log {
            Some(path) => path.clone(),
            None => return Ok(()),
        };

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .await?;
        let line = format!("{}\t{}\t{}\n", now_ms(), self.tenant, self.sql.trim());
        file.write_all(line.as_bytes()).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config;

    #[tokio::test]
    async fn test_logs_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.log");

        let mut updated = workersql_config::Config::default();
        updated.general.query_log = Some(path.clone());
        config::set(updated);

        QueryLogger::new(&"t1".into(), "SELECT 1 ")
            .log()
            .await
            .unwrap();
        QueryLogger::new(&"t2".into(), "SELECT 2")
            .log()
            .await
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("t1\tSELECT 1"));
        assert!(lines[1].ends_with("t2\tSELECT 2"));

        let mut updated = workersql_config::Config::default();
        updated.general.query_log = None;
        config::set(updated);
    }
}
