//! # Diagnostics Adapter
//!
//! After any non-success ODBC call the driver leaves diagnostic records on
//! the handle. This module drains them into one report string and keeps the
//! first sqlstate for classification: `08S01` (communication link failure)
//! kills the connection, everything else is a per-operation failure.

use odbc_sys as sys;
use std::fmt::Write;

/// Sqlstate of a lost connection; fatal for the channel.
pub const SQLSTATE_CONNECTION_LOST: &str = "08S01";

/// Drained diagnostics of one failed call.
#[derive(Debug, Clone, Default)]
pub struct Diag {
    /// First record's sqlstate, empty when the driver reported nothing.
    pub state: String,
    /// All records as `\n<state>: <message>`.
    pub text: String,
}

impl Diag {
    pub fn is_fatal(&self) -> bool {
        self.state == SQLSTATE_CONNECTION_LOST
    }
}

/// Iterates the diagnostic records of `handle`.
pub fn drain(handle_type: sys::HandleType, handle: sys::Handle) -> Diag {
    let mut diag = Diag::default();
    let mut record: i16 = 1;
    loop {
        let mut state = [0u8; 6];
        let mut native: i32 = 0;
        let mut message = [0u8; 1024];
        let mut message_len: i16 = 0;
        let r = unsafe {
            sys::SQLGetDiagRec(
                handle_type,
                handle,
                record,
                state.as_mut_ptr(),
                &mut native,
                message.as_mut_ptr(),
                message.len() as i16,
                &mut message_len,
            )
        };
        if r != sys::SqlReturn::SUCCESS && r != sys::SqlReturn::SUCCESS_WITH_INFO {
            break;
        }
        let sqlstate = String::from_utf8_lossy(&state[..5]).into_owned();
        let len = (message_len.max(0) as usize).min(message.len());
        let text = String::from_utf8_lossy(&message[..len]);
        if diag.state.is_empty() {
            diag.state = sqlstate.clone();
        }
        let _ = write!(diag.text, "\n{}: {}", sqlstate, text);
        record += 1;
    }
    diag
}
