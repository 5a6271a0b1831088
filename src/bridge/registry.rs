//! # Prepared-Statement Registry
//!
//! One `PreparedEntry` per schema message with a non-zero id: the compiled
//! statement for its template, the binding plan (one converter per data
//! field), the implicit-seq flag and the resolved output message.
//!
//! Entries are built at open and destroyed at close; the registry is
//! structurally frozen in between, which is what keeps the scratch and
//! indicator addresses handed to the driver stable. Output references
//! resolve in a second pass, after every id is known.

use crate::config::Config;
use crate::odbc::convert::Converter;
use crate::odbc::handle::{succeeded, Connection, Statement};
use crate::scheme::field::option_bool;
use crate::scheme::{Message, Scheme};
use crate::sql::{ddl, query, CreateMode, IndexMode, Template};
use eyre::{bail, ensure, Result, WrapErr};
use hashbrown::HashMap;
use odbc_sys as sys;
use smallvec::SmallVec;
use tracing::{debug, info};

/// Seq value plus its length indicator, boxed for address stability while
/// bound as parameter or column 1.
#[repr(C)]
#[derive(Debug, Default)]
pub struct SeqCell {
    pub value: i64,
    pub ind: sys::Len,
}

pub struct PreparedEntry {
    pub msgid: i32,
    pub table: String,
    pub template: Template,
    pub with_seq: bool,
    /// Message id of the result-row layout (`sql.output`).
    pub output: Option<i32>,
    /// Compiled statement; absent for a `none` template without `sql.query`,
    /// and temporarily lent to the active cursor during a function select.
    pub stmt: Option<Statement>,
    pub converters: SmallVec<[Converter; 8]>,
    pub seq: Box<SeqCell>,
}

/// Reads the template-independent `sql.with-seq` flag (default true).
pub fn message_with_seq(message: &Message) -> Result<bool> {
    match message.option("sql.with-seq") {
        Some(v) => option_bool(v)
            .wrap_err_with(|| format!("message {}: invalid sql.with-seq", message.name())),
        None => Ok(true),
    }
}

fn message_template(message: &Message, config: &Config) -> Result<Template> {
    if message.option("sql.query").is_some() {
        return Ok(Template::None);
    }
    match message.option("sql.template") {
        Some(v) => Template::parse(v)
            .wrap_err_with(|| format!("message {}: invalid sql.template", message.name())),
        None => Ok(config.default_template()),
    }
}

fn execute_ddl(conn: &Connection, sql: &str) -> Result<()> {
    let stmt = Statement::prepare(conn, sql)?;
    let r = stmt.execute();
    // Some drivers answer "already exists" with SQL_NO_DATA; that is fine.
    if !succeeded(r) && r != sys::SqlReturn::NO_DATA {
        bail!("DDL failed:{}\n\t{}", stmt.diag().text, sql);
    }
    Ok(())
}

pub struct Registry {
    entries: HashMap<i32, PreparedEntry>,
}

impl Registry {
    /// Builds all entries: DDL per create-mode, template statements, and the
    /// per-field binding plans. The second pass validates output references.
    pub fn build(conn: &Connection, scheme: &Scheme, config: &Config) -> Result<Self> {
        let mut entries = HashMap::new();

        for message in scheme.messages() {
            if message.id() == 0 {
                debug!(message = message.name(), "no msgid, skipping");
                continue;
            }
            let entry = Self::build_entry(conn, scheme, config, message)
                .wrap_err_with(|| format!("message {}", message.name()))?;
            entries.insert(message.id(), entry);
        }

        // Output references are peers in the registry; patch them once every
        // entry exists.
        let outputs: Vec<(i32, Option<i32>, Template)> = entries
            .values()
            .map(|e| (e.msgid, e.output, e.template))
            .collect();
        for (msgid, output, template) in outputs {
            if template == Template::Function {
                ensure!(
                    output.is_some(),
                    "message {}: function template needs sql.output",
                    msgid
                );
            }
            if let Some(out) = output {
                ensure!(
                    entries.contains_key(&out),
                    "message {}: output message {} not in the registry",
                    msgid,
                    out
                );
            }
        }

        Ok(Self { entries })
    }

    fn build_entry(
        conn: &Connection,
        scheme: &Scheme,
        config: &Config,
        message: &Message,
    ) -> Result<PreparedEntry> {
        let table = message
            .option("sql.table")
            .unwrap_or(message.name())
            .to_owned();
        let template = message_template(message, config)?;
        let with_seq = message_with_seq(message)?;
        let quote = config.quote_mode();

        let create = match message.option("sql.create") {
            Some(v) => option_bool(v)
                .wrap_err_with(|| format!("message {}: invalid sql.create", message.name()))?,
            None => template == Template::Insert,
        };
        if create && config.create_mode() != CreateMode::No {
            info!(table = %table, message = message.name(), "create table");
            let sql = ddl::create_table(message, &table, quote, config.create_mode(), with_seq)?;
            execute_ddl(conn, &sql)
                .wrap_err_with(|| format!("failed to create table '{}'", table))?;
            for sql in ddl::create_indexes(
                message,
                &table,
                quote,
                config.create_mode(),
                with_seq,
                IndexMode::Unique,
            )? {
                execute_ddl(conn, &sql)
                    .wrap_err_with(|| format!("failed to create index on '{}'", table))?;
            }
        }

        let output = match message.option("sql.output") {
            Some(name) => {
                let out = scheme
                    .lookup_name(name)
                    .ok_or_else(|| eyre::eyre!("output message '{}' not in the scheme", name))?;
                ensure!(out.id() != 0, "output message '{}' has no msgid", name);
                Some(out.id())
            }
            None => None,
        };

        let sql = match template {
            Template::Insert => Some(query::insert(message, &table, quote, with_seq)),
            Template::Procedure => Some(query::procedure(message, &table, quote, with_seq)),
            Template::Function => {
                let out_id = output.ok_or_else(|| {
                    eyre::eyre!("function template needs sql.output")
                })?;
                let out = scheme
                    .lookup(out_id)
                    .ok_or_else(|| eyre::eyre!("output message {} not in the scheme", out_id))?;
                Some(query::function(
                    message,
                    out,
                    &table,
                    quote,
                    with_seq,
                    message_with_seq(out)?,
                    config.function_mode(),
                ))
            }
            Template::None => message.option("sql.query").map(str::to_owned),
        };
        let stmt = match sql {
            Some(sql) => Some(Statement::prepare(conn, &sql)?),
            None => None,
        };

        let mut converters = SmallVec::new();
        for (idx, field) in message.data_fields() {
            converters.push(Converter::new(idx, field)?);
        }

        Ok(PreparedEntry {
            msgid: message.id(),
            table,
            template,
            with_seq,
            output,
            stmt,
            converters,
            seq: Box::new(SeqCell::default()),
        })
    }

    pub fn get(&self, msgid: i32) -> Option<&PreparedEntry> {
        self.entries.get(&msgid)
    }

    pub fn get_mut(&mut self, msgid: i32) -> Option<&mut PreparedEntry> {
        self.entries.get_mut(&msgid)
    }
}
