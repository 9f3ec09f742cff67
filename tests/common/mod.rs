//! Scripted in-memory cluster for integration tests
//!
//! Records every statement it receives and answers by prefix rules. The first
//! matching rule wins; statements with no rule succeed with no rows.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use cockroach_provider::{ProviderError, Result, SessionFactory, SqlSession, TextRow};

#[derive(Clone)]
enum Reply {
    Rows(Vec<TextRow>),
    Fail(String),
}

#[derive(Default)]
struct State {
    rules: Vec<(String, Reply)>,
    statements: Vec<String>,
    opened: usize,
    closed: usize,
    refuse_connections: bool,
}

/// Shared handle to the scripted cluster
#[derive(Clone, Default)]
pub struct Cluster {
    state: Arc<Mutex<State>>,
}

impl Cluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements starting with `prefix` with single-column rows
    pub fn returns(self, prefix: &str, column: &str, values: &[&str]) -> Self {
        let rows = values
            .iter()
            .map(|v| TextRow::new(vec![column.to_string()], vec![Some((*v).to_string())]))
            .collect();
        self.rule(prefix, Reply::Rows(rows))
    }

    /// Answer statements starting with `prefix` with full rows
    pub fn returns_rows(self, prefix: &str, rows: Vec<TextRow>) -> Self {
        self.rule(prefix, Reply::Rows(rows))
    }

    /// Fail statements starting with `prefix` with a server message
    pub fn fails(self, prefix: &str, message: &str) -> Self {
        self.rule(prefix, Reply::Fail(message.to_string()))
    }

    /// Make the database report tables for `SHOW TABLES`
    pub fn with_tables(self) -> Self {
        self.returns("SHOW TABLES", "table_name", &["orders"])
    }

    pub fn refusing_connections(self) -> Self {
        self.state.lock().unwrap().refuse_connections = true;
        self
    }

    fn rule(self, prefix: &str, reply: Reply) -> Self {
        self.state.lock().unwrap().rules.push((prefix.to_string(), reply));
        self
    }

    /// Every statement received so far, in order
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    /// Statements joined one per line, for snapshots
    pub fn transcript(&self) -> String {
        self.statements().join("\n")
    }

    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub fn closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    /// A session outside any factory
    pub fn session(&self) -> ScriptedSession {
        ScriptedSession { cluster: self.clone() }
    }

    pub fn factory(&self) -> ScriptedFactory {
        ScriptedFactory { cluster: self.clone() }
    }

    fn reply(&self, sql: &str) -> Result<Vec<TextRow>> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(sql.to_string());

        let reply = state
            .rules
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Fail(message)) => Err(ProviderError::sql_execution("Statement failed", message)),
            None => Ok(Vec::new()),
        }
    }
}

pub struct ScriptedSession {
    cluster: Cluster,
}

impl SqlSession for ScriptedSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.cluster.reply(sql).map(|rows| rows.len() as u64)
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<TextRow>> {
        self.cluster.reply(sql)
    }
}

pub struct ScriptedFactory {
    cluster: Cluster,
}

impl SessionFactory for ScriptedFactory {
    type Session = ScriptedSession;

    async fn open(&self) -> Result<ScriptedSession> {
        let mut state = self.cluster.state.lock().unwrap();
        if state.refuse_connections {
            return Err(ProviderError::connection("Failed to connect to CockroachDB: connection refused"));
        }
        state.opened += 1;
        drop(state);
        Ok(self.cluster.session())
    }

    async fn close(&self, _session: ScriptedSession) {
        self.cluster.state.lock().unwrap().closed += 1;
    }
}
