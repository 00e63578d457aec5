// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Session statement execution
//!
//! Each session owns at most one open transaction. Statements either manage
//! that transaction explicitly or run inside an implicit one that commits on
//! success and rolls back on error. Closing a session aborts whatever is
//! still open.

use std::sync::Arc;

use tracing::{debug, warn};

use dotsql_common::{SUPER_XID, Xid};

use crate::common::{EngineError, EngineResult};
use crate::statement::{Statement, parse_statement};
use crate::transaction::IsolationLevel;

/// Table-layer contract the executor drives. Implementations route data
/// statements through the serializability manager.
pub trait TableManager: Send + Sync {
    /// Open a transaction at `level`, returning its id and a response
    fn begin(&self, level: IsolationLevel) -> EngineResult<(Xid, Vec<u8>)>;

    fn commit(&self, xid: Xid) -> EngineResult<Vec<u8>>;

    fn abort(&self, xid: Xid) -> EngineResult<Vec<u8>>;

    fn show(&self, xid: Xid) -> EngineResult<Vec<u8>>;

    fn create(&self, xid: Xid, args: &[String]) -> EngineResult<Vec<u8>>;

    fn read(&self, xid: Xid, args: &[String]) -> EngineResult<Vec<u8>>;

    fn insert(&self, xid: Xid, args: &[String]) -> EngineResult<Vec<u8>>;

    fn delete(&self, xid: Xid, args: &[String]) -> EngineResult<Vec<u8>>;

    fn update(&self, xid: Xid, args: &[String]) -> EngineResult<Vec<u8>>;
}

/// Per-session statement dispatcher
pub struct Executor {
    xid: Xid,
    implicit_level: IsolationLevel,
    tables: Arc<dyn TableManager>,
}

impl Executor {
    pub fn new(tables: Arc<dyn TableManager>) -> Self {
        Self::with_implicit_isolation(tables, IsolationLevel::ReadCommitted)
    }

    /// Run implicit transactions at `level` instead of read committed
    pub fn with_implicit_isolation(tables: Arc<dyn TableManager>, level: IsolationLevel) -> Self {
        Self {
            xid: SUPER_XID,
            implicit_level: level,
            tables,
        }
    }

    /// Whether the session currently has an open transaction
    pub fn in_transaction(&self) -> bool {
        self.xid != SUPER_XID
    }

    /// Execute one statement against the session
    pub fn execute(&mut self, sql: &[u8]) -> EngineResult<Vec<u8>> {
        debug!("execute: {}", String::from_utf8_lossy(sql));
        match parse_statement(sql)? {
            Statement::Begin(level) => {
                if self.in_transaction() {
                    return Err(EngineError::NoNestedTransaction);
                }
                let (xid, result) = self.tables.begin(level)?;
                self.xid = xid;
                Ok(result)
            }
            Statement::Commit => {
                if !self.in_transaction() {
                    return Err(EngineError::NotInAnyTransaction);
                }
                // a failed commit (e.g. a sticky serialization error) leaves
                // the session inside the transaction until it aborts
                let result = self.tables.commit(self.xid)?;
                self.xid = SUPER_XID;
                Ok(result)
            }
            Statement::Abort => {
                if !self.in_transaction() {
                    return Err(EngineError::NotInAnyTransaction);
                }
                let result = self.tables.abort(self.xid);
                self.xid = SUPER_XID;
                result
            }
            statement => self.run_in_scope(statement),
        }
    }

    // Run a data statement, wrapping it in an implicit transaction when the
    // session has none open.
    fn run_in_scope(&mut self, statement: Statement) -> EngineResult<Vec<u8>> {
        let implicit = !self.in_transaction();
        if implicit {
            let (xid, _) = self.tables.begin(self.implicit_level)?;
            self.xid = xid;
        }

        let result = self.dispatch(&statement);

        if implicit {
            let xid = self.xid;
            self.xid = SUPER_XID;
            match &result {
                Ok(_) => {
                    self.tables.commit(xid)?;
                }
                Err(_) => {
                    let _ = self.tables.abort(xid);
                }
            }
        }
        result
    }

    fn dispatch(&self, statement: &Statement) -> EngineResult<Vec<u8>> {
        match statement {
            Statement::Show => self.tables.show(self.xid),
            Statement::Create(args) => self.tables.create(self.xid, args),
            Statement::Read(args) => self.tables.read(self.xid, args),
            Statement::Insert(args) => self.tables.insert(self.xid, args),
            Statement::Delete(args) => self.tables.delete(self.xid, args),
            Statement::Update(args) => self.tables.update(self.xid, args),
            Statement::Begin(_) | Statement::Commit | Statement::Abort => Err(
                EngineError::InvalidStatement("transaction control in data scope".to_string()),
            ),
        }
    }

    /// Abort any transaction the session still has open
    pub fn close(&mut self) {
        if self.in_transaction() {
            warn!("abnormal close, rolling back transaction {}", self.xid);
            let _ = self.tables.abort(self.xid);
            self.xid = SUPER_XID;
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.close();
    }
}
