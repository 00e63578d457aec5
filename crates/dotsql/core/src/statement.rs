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

// Statement parsing
// A minimal tokenizer that classifies the statements the executor
// dispatches. Only the leading keyword and the begin options are
// interpreted here; operand meaning belongs to the table layer.

use crate::common::{EngineError, EngineResult};
use crate::transaction::IsolationLevel;

/// A parsed session statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Begin(IsolationLevel),
    Commit,
    Abort,
    Show,
    Create(Vec<String>),
    Read(Vec<String>),
    Insert(Vec<String>),
    Delete(Vec<String>),
    Update(Vec<String>),
}

/// Parse a raw statement. Keywords are case-insensitive.
pub fn parse_statement(sql: &[u8]) -> EngineResult<Statement> {
    let text = std::str::from_utf8(sql)
        .map_err(|_| EngineError::InvalidStatement("statement is not valid utf-8".to_string()))?;
    let mut tokens = text.split_whitespace().map(str::to_string);
    let Some(keyword) = tokens.next() else {
        return Err(EngineError::InvalidStatement("empty statement".to_string()));
    };
    let args: Vec<String> = tokens.collect();

    match keyword.to_ascii_lowercase().as_str() {
        "begin" => parse_begin(&args),
        "commit" => bare(Statement::Commit, "commit", &args),
        "abort" => bare(Statement::Abort, "abort", &args),
        "show" => bare(Statement::Show, "show", &args),
        "create" => Ok(Statement::Create(args)),
        "read" => Ok(Statement::Read(args)),
        "insert" => Ok(Statement::Insert(args)),
        "delete" => Ok(Statement::Delete(args)),
        "update" => Ok(Statement::Update(args)),
        other => Err(EngineError::InvalidStatement(format!(
            "unknown statement `{other}`"
        ))),
    }
}

fn bare(statement: Statement, keyword: &str, args: &[String]) -> EngineResult<Statement> {
    if args.is_empty() {
        Ok(statement)
    } else {
        Err(EngineError::InvalidStatement(format!(
            "`{keyword}` takes no arguments"
        )))
    }
}

// `begin`, optionally followed by `isolation level read committed` or
// `isolation level repeatable read`. The bare form is read committed.
fn parse_begin(args: &[String]) -> EngineResult<Statement> {
    if args.is_empty() {
        return Ok(Statement::Begin(IsolationLevel::ReadCommitted));
    }
    let lowered: Vec<String> = args.iter().map(|a| a.to_ascii_lowercase()).collect();
    let words: Vec<&str> = lowered.iter().map(String::as_str).collect();
    match words.as_slice() {
        ["isolation", "level", "read", "committed"] => {
            Ok(Statement::Begin(IsolationLevel::ReadCommitted))
        }
        ["isolation", "level", "repeatable", "read"] => {
            Ok(Statement::Begin(IsolationLevel::RepeatableRead))
        }
        _ => Err(EngineError::InvalidStatement(
            "bad begin options".to_string(),
        )),
    }
}
