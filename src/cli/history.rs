use crate::cli::Handler;
use crate::core::audit::{HistoryLog, SessionRecord};
use crate::core::config::Configuration;
use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use prettytable::{format, row, Table};

/// Display the execution history, newest session first.
#[derive(Debug, Args)]
pub struct HistoryCommand {}

#[async_trait]
impl Handler for HistoryCommand {
    async fn handler(&self) -> Result<()> {
        let configuration = Configuration::load()?;
        let entries = HistoryLog::new(configuration.history_path()).entries()?;

        let table = entries.into_table();
        table.printstd();
        Ok(())
    }
}

/// Trait which defines how resources should be displayed
trait DisplayResource<T = Self>
where
    T: Sized,
{
    fn new_table() -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_CLEAN);
        table
    }
    /// Prints the list of resources in form of table
    fn into_table(&self) -> Table;
}

impl DisplayResource for Vec<SessionRecord> {
    fn into_table(&self) -> Table {
        let mut table = Self::new_table();
        table.set_titles(row![
            "TIMESTAMP",
            "NEW POD",
            "SOURCE POD",
            "NAMESPACE",
            "USER",
            "COMMAND"
        ]);
        if self.is_empty() {
            table.add_row(row!["", "", "", "", "", ""]);
        }
        for record in self.iter().rev() {
            table.add_row(row![
                record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                record.new_pod_name,
                record.source_pod,
                record.namespace,
                record.user,
                record.command.join(" ")
            ]);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn record(new_pod_name: &str, minute: u32) -> SessionRecord {
        SessionRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
            new_pod_name: new_pod_name.to_string(),
            source_pod: "web-7f".to_string(),
            namespace: "prod".to_string(),
            user: "al-ice".to_string(),
            command: vec!["bash".to_string()],
            prefix: String::new(),
            suffix: String::new(),
            labels: BTreeMap::new(),
            env_file: None,
        }
    }

    #[test]
    fn display_history_table_newest_first() {
        let entries = vec![record("clone-1", 0), record("clone-2", 5)];

        let rendered = entries.into_table().to_string();

        let newest = rendered.find("clone-2").unwrap();
        let oldest = rendered.find("clone-1").unwrap();
        assert!(newest < oldest, "newest entry must be rendered first");
        assert!(rendered.contains("2024-05-01 10:05:00"));
        assert_eq!(rendered.matches("web-7f").count(), 2);
    }

    #[test]
    fn empty_history_renders_a_placeholder_row() {
        let entries: Vec<SessionRecord> = Vec::new();

        let table = entries.into_table();
        assert!(table.to_string().contains("TIMESTAMP"));
    }
}
