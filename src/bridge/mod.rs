//! # Bridge Channel
//!
//! The connection & cursor state machine tying the registry, the converters
//! and the SQL synthesizers to one ODBC connection.
//!
//! ## Flow
//!
//! ```text
//! post(data)      -> lookup entry -> reset params -> bind seq + fields
//!                    -> execute -> [function: hand the cursor to the read path]
//! post(Query)     -> synthesize SELECT -> bind literals -> execute
//!                    -> bind output columns -> rows pending
//! process()       -> fetch one row -> decode -> data frame
//!                    -> SQL_NO_DATA: close cursor, EndOfData frame
//! ```
//!
//! Exactly one cursor is open at a time; while rows are pending every post
//! fails without side effects. A sqlstate `08S01` latches the channel into
//! the failed state until it is reopened. `Begin`/`Commit`/`Rollback`
//! control frames drive the driver's transaction surface.

pub mod registry;

use crate::config::Config;
use crate::control::{self, Literal, Query};
use crate::odbc::handle::{succeeded, Connection, Environment, Statement};
use crate::scheme::view;
use crate::scheme::Scheme;
use crate::sql::query;
use eyre::{bail, ensure, Result, WrapErr};
use odbc_sys as sys;
use registry::{Registry, SeqCell};
use tracing::{debug, warn};

/// Bus frame kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Control,
}

/// One message on the bus: a typed payload with id and sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub msgid: i32,
    pub seq: i64,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn data(msgid: i32, seq: i64, data: Vec<u8>) -> Self {
        Self {
            frame_type: FrameType::Data,
            msgid,
            seq,
            data,
        }
    }

    pub fn control(msgid: i32, data: Vec<u8>) -> Self {
        Self {
            frame_type: FrameType::Control,
            msgid,
            seq: 0,
            data,
        }
    }

    pub fn end_of_data() -> Self {
        Self::control(control::msgid::END_OF_DATA, Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connected,
    Failed,
}

/// Owned WHERE literal plus its indicator; the bound pointers target the
/// heap data behind these, which stays put for the cursor's lifetime.
struct WhereParam {
    ind: sys::Len,
    value: Literal,
}

/// The open cursor: statement, row buffers and everything driver-visible
/// pointers target.
struct ActiveSelect {
    stmt: Statement,
    /// Entry the statement goes back to at end of data (function selects).
    return_to: Option<i32>,
    /// Message whose converters and layout decode the rows.
    target: i32,
    has_seq: bool,
    fixed: Box<[u8]>,
    tail: Vec<u8>,
    seq: Box<SeqCell>,
    #[allow(dead_code)]
    params: Vec<WhereParam>,
}

pub struct Bridge {
    // Field order is drop order: cursor and prepared statements go before
    // the connection, the connection before the environment.
    active: Option<ActiveSelect>,
    registry: Registry,
    conn: Connection,
    _env: Environment,
    config: Config,
    scheme: Scheme,
    state: State,
    eod_pending: bool,
    in_tx: bool,
}

fn bind_seq_param(stmt: &Statement, index: u16, cell: &mut SeqCell) -> Result<()> {
    cell.ind = std::mem::size_of::<i64>() as sys::Len;
    let r = unsafe {
        sys::SQLBindParameter(
            stmt.raw(),
            index,
            sys::ParamType::Input,
            sys::CDataType::SBigInt,
            sys::SqlDataType::EXT_BIG_INT,
            0,
            0,
            &mut cell.value as *mut i64 as sys::Pointer,
            0,
            &mut cell.ind,
        )
    };
    if !succeeded(r) {
        bail!("failed to bind seq parameter:{}", stmt.diag().text);
    }
    Ok(())
}

fn bind_seq_column(stmt: &Statement, index: u16, cell: &mut SeqCell) -> Result<()> {
    let r = unsafe {
        sys::SQLBindCol(
            stmt.raw(),
            index,
            sys::CDataType::SBigInt,
            &mut cell.value as *mut i64 as sys::Pointer,
            std::mem::size_of::<i64>() as sys::Len,
            &mut cell.ind,
        )
    };
    if !succeeded(r) {
        bail!("failed to bind seq column:{}", stmt.diag().text);
    }
    Ok(())
}

fn bind_where_params(stmt: &Statement, params: &mut [WhereParam]) -> Result<()> {
    for (i, param) in params.iter_mut().enumerate() {
        let index = (i + 1) as u16;
        let (c_type, sql_type, ptr, ind): (_, _, sys::Pointer, sys::Len) = match &mut param.value
        {
            Literal::Int(v) => (
                sys::CDataType::SBigInt,
                sys::SqlDataType::EXT_BIG_INT,
                v as *mut i64 as sys::Pointer,
                std::mem::size_of::<i64>() as sys::Len,
            ),
            Literal::Float(v) => (
                sys::CDataType::Double,
                sys::SqlDataType::DOUBLE,
                v as *mut f64 as sys::Pointer,
                std::mem::size_of::<f64>() as sys::Len,
            ),
            Literal::Str(s) => (
                sys::CDataType::Char,
                sys::SqlDataType::VARCHAR,
                s.as_ptr() as sys::Pointer,
                s.len() as sys::Len,
            ),
        };
        param.ind = ind;
        let r = unsafe {
            sys::SQLBindParameter(
                stmt.raw(),
                index,
                sys::ParamType::Input,
                c_type,
                sql_type,
                0,
                0,
                ptr,
                0,
                &mut param.ind,
            )
        };
        if !succeeded(r) {
            bail!(
                "failed to bind query parameter {}:{}",
                index,
                stmt.diag().text
            );
        }
    }
    Ok(())
}

impl Bridge {
    /// Connects and builds the registry: DDL per create-mode, one prepared
    /// statement and binding plan per message.
    pub fn open(config: Config, scheme: Scheme) -> Result<Self> {
        let env = Environment::new()?;
        let mut conn = Connection::new(&env)?;
        let settings = config.connection_string()?;
        conn.driver_connect(&settings)?;
        let registry = Registry::build(&conn, &scheme, &config)
            .wrap_err("failed to build the statement registry")?;
        Ok(Self {
            active: None,
            registry,
            conn,
            _env: env,
            config,
            scheme,
            state: State::Connected,
            eod_pending: false,
            in_tx: false,
        })
    }

    /// True when the host should keep calling [`Self::process`].
    pub fn pending(&self) -> bool {
        self.active.is_some() || self.eod_pending
    }

    /// Posts one frame. Data frames execute the message's statement; control
    /// frames drive transactions and queries. Fails without side effects
    /// while rows are pending.
    pub fn post(&mut self, frame: &Frame) -> Result<()> {
        ensure!(self.state == State::Connected, "channel is in failed state");
        match frame.frame_type {
            FrameType::Control => self.post_control(frame),
            FrameType::Data => self.post_data(frame),
        }
    }

    fn post_data(&mut self, frame: &Frame) -> Result<()> {
        ensure!(frame.msgid != 0, "unable to post a message without msgid");
        ensure!(
            !self.pending(),
            "previous query is not finished, can not post"
        );

        let message = self
            .scheme
            .lookup(frame.msgid)
            .ok_or_else(|| eyre::eyre!("message {} not found in the scheme", frame.msgid))?;
        let entry = self
            .registry
            .get_mut(frame.msgid)
            .ok_or_else(|| eyre::eyre!("message {} not found", frame.msgid))?;
        ensure!(
            frame.data.len() >= message.size(),
            "message {} payload too short: {} < {}",
            frame.msgid,
            frame.data.len(),
            message.size()
        );
        ensure!(
            entry.converters.len() == message.data_field_count(),
            "binding plan out of sync for message {}",
            frame.msgid
        );
        let stmt = match &entry.stmt {
            Some(stmt) => stmt,
            None => bail!("message {} has no statement template", frame.msgid),
        };

        stmt.reset_params();
        let mut index: u16 = 1;
        if entry.with_seq {
            entry.seq.value = frame.seq;
            bind_seq_param(stmt, index, &mut entry.seq)?;
            index += 1;
        }
        let pmap = message.pmap_field();
        for (converter, (_, field)) in entry.converters.iter_mut().zip(message.data_fields()) {
            let present = match (field.pmap_index(), pmap) {
                (Some(bit), Some(pmap)) => view::pmap_get(&frame.data, pmap, bit)?,
                _ => true,
            };
            if present {
                converter.bind_param(stmt, index, field, &frame.data)?;
            } else {
                converter.bind_param_null(stmt, index, field, &frame.data)?;
            }
            index += 1;
        }

        let r = stmt.execute();
        if succeeded(r) {
            if let Some(output) = entry.output {
                if stmt.num_result_cols()? > 0 {
                    return self.enter_function_select(frame.msgid, output);
                }
                self.eod_pending = true;
            }
            return Ok(());
        }
        if r == sys::SqlReturn::NO_DATA {
            // No rows from the statement; for result-producing templates the
            // select is degenerate and still terminates with EndOfData.
            if entry.output.is_some() {
                self.eod_pending = true;
            }
            return Ok(());
        }
        if r == sys::SqlReturn::NEED_DATA {
            bail!("failed to execute: statement wants data-at-execution");
        }
        let diag = stmt.diag();
        if diag.is_fatal() {
            self.state = State::Failed;
            warn!("connection lost");
        }
        bail!("failed to execute message {}:{}", frame.msgid, diag.text);
    }

    fn post_control(&mut self, frame: &Frame) -> Result<()> {
        match frame.msgid {
            control::msgid::BEGIN => {
                ensure!(!self.in_tx, "transaction already started");
                self.conn.set_autocommit(false)?;
                self.in_tx = true;
                Ok(())
            }
            control::msgid::COMMIT => {
                ensure!(self.in_tx, "commit without begin");
                self.conn.end_tran(true)?;
                self.conn.set_autocommit(true)?;
                self.in_tx = false;
                Ok(())
            }
            control::msgid::ROLLBACK => {
                ensure!(self.in_tx, "rollback without begin");
                self.conn.end_tran(false)?;
                self.conn.set_autocommit(true)?;
                self.in_tx = false;
                Ok(())
            }
            control::msgid::QUERY => self.post_query(frame),
            other => bail!("invalid control message id: {}", other),
        }
    }

    fn post_query(&mut self, frame: &Frame) -> Result<()> {
        ensure!(
            !self.pending(),
            "previous query is not finished, can not start new"
        );
        let query = Query::decode(&frame.data)?;

        let message = self
            .scheme
            .lookup(query.message)
            .ok_or_else(|| eyre::eyre!("message {} not found in the scheme", query.message))?;
        let entry = self
            .registry
            .get(query.message)
            .ok_or_else(|| eyre::eyre!("message {} not found", query.message))?;

        let sql = query::select(
            message,
            &entry.table,
            self.config.quote_mode(),
            entry.with_seq,
            &query.expression,
        )?;
        let stmt = Statement::prepare(&self.conn, &sql)?;

        let mut params: Vec<WhereParam> = query
            .expression
            .into_iter()
            .map(|e| WhereParam {
                ind: 0,
                value: e.value,
            })
            .collect();
        bind_where_params(&stmt, &mut params)?;

        let r = stmt.execute();
        if r == sys::SqlReturn::NO_DATA {
            // Degenerate empty select: nothing to fetch, still one EndOfData.
            self.eod_pending = true;
            return Ok(());
        }
        if !succeeded(r) {
            let diag = stmt.diag();
            if diag.is_fatal() {
                self.state = State::Failed;
                warn!("connection lost");
            }
            bail!("failed to execute query:{}", diag.text);
        }

        self.enter_select(stmt, query.message, None, params)
    }

    /// Re-enters the read path on a function entry's own statement.
    fn enter_function_select(&mut self, owner: i32, output: i32) -> Result<()> {
        let stmt = self
            .registry
            .get_mut(owner)
            .and_then(|e| e.stmt.take())
            .ok_or_else(|| eyre::eyre!("function statement for {} unavailable", owner))?;
        self.enter_select(stmt, output, Some(owner), Vec::new())
    }

    /// Binds output columns and parks the cursor as the active select.
    fn enter_select(
        &mut self,
        stmt: Statement,
        target: i32,
        return_to: Option<i32>,
        params: Vec<WhereParam>,
    ) -> Result<()> {
        let message = self
            .scheme
            .lookup(target)
            .ok_or_else(|| eyre::eyre!("message {} not found in the scheme", target))?;
        let entry = self
            .registry
            .get_mut(target)
            .ok_or_else(|| eyre::eyre!("message {} not found", target))?;
        ensure!(
            entry.converters.len() == message.data_field_count(),
            "binding plan out of sync for message {}",
            target
        );

        let mut active = ActiveSelect {
            stmt,
            return_to,
            target,
            has_seq: entry.with_seq,
            fixed: vec![0u8; message.size()].into_boxed_slice(),
            tail: Vec::new(),
            seq: Box::new(SeqCell::default()),
            params,
        };

        let mut index: u16 = 1;
        if active.has_seq {
            bind_seq_column(&active.stmt, index, &mut active.seq)?;
            index += 1;
        }
        let row = active.fixed.as_mut_ptr();
        let row_len = active.fixed.len();
        for (converter, (_, field)) in entry.converters.iter_mut().zip(message.data_fields()) {
            converter.bind_column(&active.stmt, index, field, row, row_len)?;
            index += 1;
        }

        self.active = Some(active);
        Ok(())
    }

    /// Fetches and decodes one row of the active select, or delivers the
    /// terminating `EndOfData`. Returns `None` when nothing is pending.
    pub fn process(&mut self) -> Result<Option<Frame>> {
        ensure!(self.state == State::Connected, "channel is in failed state");
        if self.active.is_none() {
            if self.eod_pending {
                self.eod_pending = false;
                return Ok(Some(Frame::end_of_data()));
            }
            return Ok(None);
        }

        let r = self.active.as_ref().map(|a| a.stmt.fetch()).unwrap_or(sys::SqlReturn::ERROR);
        if succeeded(r) {
            return self.decode_row().map(Some);
        }
        if r == sys::SqlReturn::NO_DATA {
            debug!("end of data");
            self.finish_cursor();
            return Ok(Some(Frame::end_of_data()));
        }

        let diag = self
            .active
            .as_ref()
            .map(|a| a.stmt.diag())
            .unwrap_or_default();
        if diag.is_fatal() {
            self.state = State::Failed;
            warn!("connection lost");
        }
        self.finish_cursor();
        bail!("failed to fetch:{}", diag.text);
    }

    fn decode_row(&mut self) -> Result<Frame> {
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| eyre::eyre!("no active select statement"))?;
        let message = self
            .scheme
            .lookup(active.target)
            .ok_or_else(|| eyre::eyre!("message {} not found in the scheme", active.target))?;
        let entry = self
            .registry
            .get_mut(active.target)
            .ok_or_else(|| eyre::eyre!("message {} not found", active.target))?;

        active.tail.clear();
        if let Some(pmap) = message.pmap_field() {
            view::pmap_zero(&mut active.fixed, pmap)?;
        }
        for (converter, (_, field)) in entry.converters.iter_mut().zip(message.data_fields()) {
            let present = converter.decode(field, &mut active.fixed, &mut active.tail)?;
            if present {
                if let (Some(bit), Some(pmap)) = (field.pmap_index(), message.pmap_field()) {
                    view::pmap_set(&mut active.fixed, pmap, bit)?;
                }
            }
        }

        let mut data = Vec::with_capacity(active.fixed.len() + active.tail.len());
        data.extend_from_slice(&active.fixed);
        data.extend_from_slice(&active.tail);
        let seq = if active.has_seq { active.seq.value } else { 0 };
        Ok(Frame::data(message.id(), seq, data))
    }

    /// Closes the cursor and returns a lent statement to its entry.
    fn finish_cursor(&mut self) {
        if let Some(active) = self.active.take() {
            active.stmt.close_cursor();
            active.stmt.unbind();
            active.stmt.reset_params();
            if let Some(owner) = active.return_to {
                if let Some(entry) = self.registry.get_mut(owner) {
                    entry.stmt = Some(active.stmt);
                }
            }
        }
    }

    /// Closes the channel: any in-flight select is abandoned, handles are
    /// freed leaf-first by drop order.
    pub fn close(mut self) {
        self.finish_cursor();
    }
}
