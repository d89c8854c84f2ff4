use std::collections::BTreeMap;
use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use common::service::{DocumentError, Statistics};

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Stats {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug)]
pub struct StatsOutput {
    pub statistics: Statistics,
    pub json: bool,
}

fn write_section<K: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    counts: &BTreeMap<K, u64>,
) -> fmt::Result {
    writeln!(f, "{}", title.bold())?;
    if counts.is_empty() {
        return writeln!(f, "  {}", "none".dimmed());
    }
    for (key, count) in counts {
        writeln!(f, "  {:<20} {}", key.to_string(), count)?;
    }
    Ok(())
}

impl fmt::Display for StatsOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.statistics;
        if self.json {
            let json = serde_json::to_string_pretty(stats).map_err(|_| fmt::Error)?;
            return write!(f, "{json}");
        }

        writeln!(f, "{} {}", "Documents:".dimmed(), stats.total_documents)?;
        writeln!(f, "{} {}", "Versions:".dimmed(), stats.total_versions)?;
        write_section(f, "By department", &stats.by_department)?;
        write_section(f, "By category", &stats.by_category)?;
        write_section(f, "By status", &stats.by_status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Stats {
    type Error = StatsError;
    type Output = StatsOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open().await?;
        let statistics = state.documents().get_statistics().await?;
        Ok(StatsOutput {
            statistics,
            json: self.json,
        })
    }
}
