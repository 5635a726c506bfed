//! Command session shared by the CLI and the TCP server
//!
//! A session interprets one input at a time. SQL text is recorded through the
//! lineage service; lines starting with `.` are commands. The pending parent
//! ids and the output mode are per-session state and never reach the catalog
//! except as arguments of the next recorded statement.

use std::sync::Arc;

use serde_json::json;

use crate::catalog::{QueryDetail, QueryId};
use crate::error::{Error, Result};
use crate::format::{cell, format_rows, format_table, rows_to_json, OutputFormat};
use crate::lineage::{Execution, Lineage};

/// Help text listing the session commands
pub const HELP: &str = r#"
Commands:
  .help                  Show this help message
  .quit                  Exit
  .history [n]           List the most recent queries
  .show <id>             Show one query with its tables and pinned view
  .graph                 Show the lineage graph
  .from <id>[,<id>...]   Record the next statement as a child of these queries
  .from                  Clear pending parents
  .pin <id>              Pin a query as a materialized view
  .views                 List pinned views
  .preview <view> [n]    Show rows from a pinned view
  .use <view>            Print a starting statement that reads a pinned view
  .delete <id>           Delete a query, its lineage and its pinned view
  .reset                 Delete ALL history and pinned views (irreversible)
  .mode table|json       Set the output format

Anything else is run as SQL and recorded in the history.
"#;

/// Response to one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Text to show; the session continues
    Output(String),
    /// Text to show; the session ends
    Quit(String),
}

impl Reply {
    /// The text to show
    pub fn text(&self) -> &str {
        match self {
            Reply::Output(text) | Reply::Quit(text) => text,
        }
    }
}

/// Per-user interactive state
#[derive(Debug)]
pub struct Session {
    lineage: Arc<Lineage>,
    format: OutputFormat,
    pending_parents: Vec<QueryId>,
}

fn parse_id(arg: Option<&str>) -> Result<QueryId> {
    let arg = arg.ok_or_else(|| Error::Config("missing query id".to_string()))?;
    arg.trim_start_matches(['Q', 'q'])
        .parse()
        .map_err(|_| Error::Config(format!("invalid query id '{}'", arg)))
}

fn parse_ids(args: &[&str]) -> Result<Vec<QueryId>> {
    args.iter()
        .flat_map(|a| a.split(','))
        .filter(|a| !a.is_empty())
        .map(|a| parse_id(Some(a)))
        .collect()
}

fn parse_limit(arg: Option<&str>) -> Result<Option<usize>> {
    arg.map(|a| {
        a.parse()
            .map_err(|_| Error::Config(format!("invalid row limit '{}'", a)))
    })
    .transpose()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)? + "\n")
}

impl Session {
    /// Start a session on a lineage service
    pub fn new(lineage: Arc<Lineage>) -> Self {
        Self {
            lineage,
            format: OutputFormat::Table,
            pending_parents: Vec::new(),
        }
    }

    /// Parents the next statement will be recorded under
    pub fn pending_parents(&self) -> &[QueryId] {
        &self.pending_parents
    }

    /// Current output format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Handle one input. Failures are reported in the reply text, never
    /// propagated.
    pub fn handle(&mut self, input: &str) -> Reply {
        let input = input.trim();
        if input.is_empty() {
            return Reply::Output(String::new());
        }

        let result = if input.starts_with('.') {
            self.handle_command(input)
        } else {
            self.run_statement(input).map(Reply::Output)
        };

        result.unwrap_or_else(|e| Reply::Output(format!("Error: {}\n", e)))
    }

    fn handle_command(&mut self, input: &str) -> Result<Reply> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let args = &parts[1..];

        let output = match parts[0] {
            ".help" => HELP.to_string(),
            ".quit" | ".exit" => return Ok(Reply::Quit("Goodbye!\n".to_string())),
            ".mode" => match args.first().copied() {
                Some("json") => {
                    self.format = OutputFormat::Json;
                    "Output mode set to JSON\n".to_string()
                }
                Some("table") => {
                    self.format = OutputFormat::Table;
                    "Output mode set to Table\n".to_string()
                }
                _ => "Usage: .mode table|json\n".to_string(),
            },
            ".history" => self.show_history(parse_limit(args.first().copied())?)?,
            ".show" => self.show_detail(parse_id(args.first().copied())?)?,
            ".graph" => self.show_graph()?,
            ".from" => {
                self.pending_parents = parse_ids(args)?;
                if self.pending_parents.is_empty() {
                    "No parent selected: the next query will be a root.\n".to_string()
                } else {
                    format!(
                        "The next query will be recorded as a child of: {}\n",
                        self.pending_parents
                            .iter()
                            .map(|id| format!("Q{}", id))
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                }
            }
            ".pin" => {
                let pinned = self.lineage.pin(parse_id(args.first().copied())?)?;
                match self.format {
                    OutputFormat::Json => to_json(&pinned)?,
                    OutputFormat::Table => format!(
                        "Pinned as view {} ({} bytes)\n",
                        pinned.view_name, pinned.storage_bytes
                    ),
                }
            }
            ".views" => self.show_views()?,
            ".preview" => {
                let name = args
                    .first()
                    .ok_or_else(|| Error::Config("missing view name".to_string()))?;
                let rows = self
                    .lineage
                    .preview(name, parse_limit(args.get(1).copied())?)?;
                match self.format {
                    OutputFormat::Json => to_json(&rows_to_json(&rows.columns, &rows.rows))?,
                    OutputFormat::Table if rows.is_empty() => "View is empty.\n".to_string(),
                    OutputFormat::Table => format_rows(&rows.columns, &rows.rows),
                }
            }
            ".use" => {
                let name = args
                    .first()
                    .ok_or_else(|| Error::Config("missing view name".to_string()))?;
                if self.lineage.catalog().artifact_by_name(name)?.is_none() {
                    return Err(Error::ArtifactNotFound(name.to_string()));
                }
                self.pending_parents.clear();
                format!("SELECT * FROM {} LIMIT 100;\n", name)
            }
            ".delete" => {
                let query_id = parse_id(args.first().copied())?;
                self.lineage.delete(query_id)?;
                self.pending_parents.clear();
                format!("Deleted query Q{} and associated metadata.\n", query_id)
            }
            ".reset" => {
                self.lineage.reset()?;
                self.pending_parents.clear();
                "Cleared all query history, lineage, and pinned views. \
                 Other tables are untouched.\n"
                    .to_string()
            }
            other => format!(
                "Unknown command: {}\nType '.help' for available commands.\n",
                other
            ),
        };

        Ok(Reply::Output(output))
    }

    fn run_statement(&mut self, sql: &str) -> Result<String> {
        let parents = std::mem::take(&mut self.pending_parents);
        let execution = self.lineage.record_execution(sql, &parents)?;

        match self.format {
            OutputFormat::Json => to_json(&json!({
                "query_id": execution.query_id,
                "runtime_ms": execution.runtime_ms,
                "row_count": execution.row_count,
                "error_message": execution.error_message,
                "rows": rows_to_json(&execution.columns, &execution.rows),
            })),
            OutputFormat::Table => Ok(render_execution(&execution)),
        }
    }

    fn show_history(&self, limit: Option<usize>) -> Result<String> {
        let history = self.lineage.history(limit)?;
        if self.format == OutputFormat::Json {
            return to_json(&history);
        }
        if history.is_empty() {
            return Ok("No queries logged yet.\n".to_string());
        }

        let columns: Vec<String> = [
            "query_id",
            "executed_at",
            "runtime_ms",
            "row_count",
            "tables",
            "error_message",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();
        let rows: Vec<Vec<String>> = history
            .iter()
            .map(|entry| {
                let r = &entry.record;
                vec![
                    r.query_id.to_string(),
                    r.executed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    r.runtime_ms.to_string(),
                    cell(r.row_count),
                    entry.tables.join(", "),
                    cell(r.error_message.as_deref()),
                ]
            })
            .collect();
        Ok(format_table(&columns, &rows))
    }

    fn show_detail(&self, query_id: QueryId) -> Result<String> {
        let detail = self.lineage.detail(query_id)?;
        match self.format {
            OutputFormat::Json => to_json(&detail),
            OutputFormat::Table => Ok(render_detail(&detail)),
        }
    }

    fn show_graph(&self) -> Result<String> {
        let graph = self.lineage.graph()?;
        if self.format == OutputFormat::Json {
            return to_json(&graph);
        }
        if graph.nodes.is_empty() {
            return Ok("No lineage yet. Run some queries.\n".to_string());
        }

        let mut output = String::new();
        for node in graph.nodes.iter().rev() {
            let id = node.record.query_id;
            let parents = graph.parents_of(id);
            let marker = if node.record.is_failed() { " (failed)" } else { "" };
            if parents.is_empty() {
                output.push_str(&format!("Q{}{}\n", id, marker));
            } else {
                let parents: Vec<String> = parents.iter().map(|p| format!("Q{}", p)).collect();
                output.push_str(&format!("Q{}{} <- {}\n", id, marker, parents.join(", ")));
            }
        }
        Ok(output)
    }

    fn show_views(&self) -> Result<String> {
        let views = self.lineage.artifacts()?;
        if self.format == OutputFormat::Json {
            return to_json(&views);
        }
        if views.is_empty() {
            return Ok("No materialized views pinned yet.\n".to_string());
        }

        let columns: Vec<String> = ["view_id", "view_name", "query_id", "storage_bytes", "created_at"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let rows: Vec<Vec<String>> = views
            .iter()
            .map(|v| {
                vec![
                    v.artifact.view_id.to_string(),
                    v.artifact.view_name.clone(),
                    v.artifact.query_id.to_string(),
                    v.artifact.storage_bytes.to_string(),
                    v.artifact.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                ]
            })
            .collect();
        Ok(format_table(&columns, &rows))
    }
}

fn render_execution(execution: &Execution) -> String {
    if let Some(message) = &execution.error_message {
        return format!("Query Q{} failed: {}\n", execution.query_id, message);
    }

    let mut output = format!(
        "Query Q{} succeeded ({} ms).\n",
        execution.query_id, execution.runtime_ms
    );
    if execution.columns.is_empty() {
        output.push_str(&format!("{} row(s) affected\n", cell(execution.row_count)));
    } else {
        output.push_str(&format_rows(&execution.columns, &execution.rows));
    }
    output
}

fn render_detail(detail: &QueryDetail) -> String {
    let r = &detail.record;
    let mut output = format!("Query Q{}\n{}\n", r.query_id, r.sql_text);
    output.push_str(&format!(
        "Executed: {}, Runtime: {} ms, Rows: {}\n",
        r.executed_at.format("%Y-%m-%d %H:%M:%S"),
        r.runtime_ms,
        cell(r.row_count)
    ));
    output.push_str(&format!("Tables: [{}]\n", detail.tables.join(", ")));
    if let Some(message) = &r.error_message {
        output.push_str(&format!("Error: {}\n", message));
    }
    if let Some(pinned) = &detail.pinned {
        output.push_str(&format!(
            "Pinned as view {} ({} bytes)\n",
            pinned.view_name, pinned.storage_bytes
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DatabaseLocation};

    fn session() -> Session {
        let config = Config::new().database(DatabaseLocation::Memory);
        Session::new(Arc::new(Lineage::open(config).unwrap()))
    }

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_ids(&["1,2", "Q3"]).unwrap(), vec![1, 2, 3]);
        assert!(parse_ids(&[]).unwrap().is_empty());
        assert!(parse_ids(&["x"]).is_err());
    }

    #[test]
    fn test_pending_parents_used_once() {
        let mut session = session();
        session.handle("SELECT 1");
        session.handle(".from 1");
        assert_eq!(session.pending_parents(), &[1]);

        let reply = session.handle("SELECT 2;");
        assert!(reply.text().starts_with("Query Q2 succeeded"));
        assert!(session.pending_parents().is_empty());

        let reply = session.handle(".graph");
        assert_eq!(reply.text(), "Q1\nQ2 <- Q1\n");
    }

    #[test]
    fn test_failed_statement_reply() {
        let mut session = session();
        let reply = session.handle("SELECT * FROM nowhere");
        assert!(reply.text().starts_with("Query Q1 failed: "));
        assert!(reply.text().contains("no such table"));
    }

    #[test]
    fn test_errors_are_replies() {
        let mut session = session();
        assert_eq!(
            session.handle(".pin 9"),
            Reply::Output("Error: Not found: query 9 does not exist\n".to_string())
        );
        assert!(session.handle(".show").text().starts_with("Error:"));
        assert!(session.handle(".bogus").text().starts_with("Unknown command"));
    }

    #[test]
    fn test_quit_and_mode() {
        let mut session = session();
        assert_eq!(session.handle(".mode json").text(), "Output mode set to JSON\n");
        assert_eq!(session.format(), OutputFormat::Json);
        assert!(matches!(session.handle(".quit"), Reply::Quit(_)));
    }

    #[test]
    fn test_json_execution() {
        let mut session = session();
        session.handle(".mode json");
        let reply = session.handle("SELECT 7 AS n");
        let value: serde_json::Value = serde_json::from_str(reply.text()).unwrap();
        assert_eq!(value["query_id"], 1);
        assert_eq!(value["rows"][0]["n"], 7);
        assert!(value["error_message"].is_null());
    }

    #[test]
    fn test_use_clears_parents() {
        let mut session = session();
        session.handle("SELECT 1 AS x");
        session.handle(".pin 1");
        session.handle(".from 1");

        let reply = session.handle(".use qle_view_1");
        assert_eq!(reply.text(), "SELECT * FROM qle_view_1 LIMIT 100;\n");
        assert!(session.pending_parents().is_empty());
        assert!(session.handle(".use qle_view_9").text().starts_with("Error:"));
    }
}
