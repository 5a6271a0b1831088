//! # Owned ODBC Handles
//!
//! The ODBC handle hierarchy (environment → connection → statement) wrapped
//! in owned types that free on drop, leaf-first. Statement handles carry
//! bindings that point into scratch buffers they do not own; the registry
//! owns both and releases the statement first.

use crate::odbc::diag::{self, Diag};
use eyre::{bail, ensure, Result};
use odbc_sys as sys;
use std::ptr;
use tracing::{debug, info};

/// Returns true for the two success codes.
pub fn succeeded(r: sys::SqlReturn) -> bool {
    r == sys::SqlReturn::SUCCESS || r == sys::SqlReturn::SUCCESS_WITH_INFO
}

/// Owned `SQL_HANDLE_ENV`, configured for ODBC 3.
pub struct Environment {
    handle: sys::HEnv,
}

impl Environment {
    pub fn new() -> Result<Self> {
        let mut handle: sys::Handle = ptr::null_mut();
        let r = unsafe { sys::SQLAllocHandle(sys::HandleType::Env, ptr::null_mut(), &mut handle) };
        ensure!(
            succeeded(r),
            "failed to allocate ODBC environment: {:?}",
            r
        );
        let env = Self {
            handle: handle as sys::HEnv,
        };

        let r = unsafe {
            sys::SQLSetEnvAttr(
                env.handle,
                sys::EnvironmentAttribute::OdbcVersion,
                sys::AttrOdbcVersion::Odbc3.into(),
                0,
            )
        };
        ensure!(succeeded(r), "failed to request ODBC version 3: {:?}", r);
        Ok(env)
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        let _ = unsafe { sys::SQLFreeHandle(sys::HandleType::Env, self.handle as sys::Handle) };
    }
}

/// Owned `SQL_HANDLE_DBC`; disconnects before freeing.
pub struct Connection {
    handle: sys::HDbc,
    connected: bool,
}

impl Connection {
    pub fn new(env: &Environment) -> Result<Self> {
        let mut handle: sys::Handle = ptr::null_mut();
        let r = unsafe {
            sys::SQLAllocHandle(sys::HandleType::Dbc, env.handle as sys::Handle, &mut handle)
        };
        ensure!(succeeded(r), "failed to allocate ODBC connection: {:?}", r);
        Ok(Self {
            handle: handle as sys::HDbc,
            connected: false,
        })
    }

    /// `SQLDriverConnect` with an assembled `K=V;...` string. Returns the
    /// completed connection string the driver reports back.
    pub fn driver_connect(&mut self, settings: &str) -> Result<String> {
        let mut out = [0u8; 1024];
        let mut out_len: i16 = 0;
        let r = unsafe {
            sys::SQLDriverConnect(
                self.handle,
                ptr::null_mut(),
                settings.as_ptr(),
                settings.len() as i16,
                out.as_mut_ptr(),
                out.len() as i16,
                &mut out_len,
                sys::DriverConnectOption::NoPrompt,
            )
        };
        if !succeeded(r) {
            let diag = self.diag();
            bail!("failed to connect to '{}':{}", settings, diag.text);
        }
        self.connected = true;
        let len = (out_len.max(0) as usize).min(out.len());
        let completed = String::from_utf8_lossy(&out[..len]).into_owned();
        info!(connection = %completed, "connected");
        Ok(completed)
    }

    pub fn set_autocommit(&self, on: bool) -> Result<()> {
        let r = unsafe {
            sys::SQLSetConnectAttr(
                self.handle,
                sys::ConnectionAttribute::AutoCommit,
                usize::from(on) as sys::Pointer,
                0,
            )
        };
        if !succeeded(r) {
            bail!("failed to set autocommit:{}", self.diag().text);
        }
        Ok(())
    }

    /// `SQLEndTran` on this connection.
    pub fn end_tran(&self, commit: bool) -> Result<()> {
        let completion = if commit {
            sys::CompletionType::Commit
        } else {
            sys::CompletionType::Rollback
        };
        let r =
            unsafe { sys::SQLEndTran(sys::HandleType::Dbc, self.handle as sys::Handle, completion) };
        if !succeeded(r) {
            bail!("transaction end failed:{}", self.diag().text);
        }
        Ok(())
    }

    pub fn diag(&self) -> Diag {
        diag::drain(sys::HandleType::Dbc, self.handle as sys::Handle)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        unsafe {
            if self.connected {
                let _ = sys::SQLDisconnect(self.handle);
            }
            let _ = sys::SQLFreeHandle(sys::HandleType::Dbc, self.handle as sys::Handle);
        }
    }
}

/// Owned `SQL_HANDLE_STMT`.
pub struct Statement {
    handle: sys::HStmt,
}

impl Statement {
    pub fn new(conn: &Connection) -> Result<Self> {
        let mut handle: sys::Handle = ptr::null_mut();
        let r = unsafe {
            sys::SQLAllocHandle(sys::HandleType::Stmt, conn.handle as sys::Handle, &mut handle)
        };
        if !succeeded(r) {
            bail!("failed to allocate statement:{}", conn.diag().text);
        }
        Ok(Self {
            handle: handle as sys::HStmt,
        })
    }

    /// Allocates and prepares a statement in one step.
    pub fn prepare(conn: &Connection, query: &str) -> Result<Self> {
        debug!(%query, "prepare SQL statement");
        let stmt = Self::new(conn)?;
        let r = unsafe {
            sys::SQLPrepare(stmt.handle, query.as_ptr(), query.len() as i32)
        };
        if !succeeded(r) {
            bail!(
                "failed to prepare statement:{}\n\t{}",
                stmt.diag().text,
                query
            );
        }
        Ok(stmt)
    }

    pub fn raw(&self) -> sys::HStmt {
        self.handle
    }

    pub fn execute(&self) -> sys::SqlReturn {
        unsafe { sys::SQLExecute(self.handle) }
    }

    pub fn fetch(&self) -> sys::SqlReturn {
        unsafe { sys::SQLFetch(self.handle) }
    }

    /// Drops pending parameter bindings; called at every execute boundary.
    pub fn reset_params(&self) {
        let _ = unsafe { sys::SQLFreeStmt(self.handle, sys::FreeStmtOption::ResetParams) };
    }

    /// Unbinds result columns.
    pub fn unbind(&self) {
        let _ = unsafe { sys::SQLFreeStmt(self.handle, sys::FreeStmtOption::Unbind) };
    }

    /// Closes an open cursor, keeping the prepared plan.
    pub fn close_cursor(&self) {
        let _ = unsafe { sys::SQLFreeStmt(self.handle, sys::FreeStmtOption::Close) };
    }

    pub fn num_result_cols(&self) -> Result<i16> {
        let mut cols: i16 = 0;
        let r = unsafe { sys::SQLNumResultCols(self.handle, &mut cols) };
        if !succeeded(r) {
            bail!("failed to count result columns:{}", self.diag().text);
        }
        Ok(cols)
    }

    pub fn diag(&self) -> Diag {
        diag::drain(sys::HandleType::Stmt, self.handle as sys::Handle)
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        let _ = unsafe { sys::SQLFreeHandle(sys::HandleType::Stmt, self.handle as sys::Handle) };
    }
}
