// Session-level tests: executors driving a minimal record-oriented table
// layer that routes every data statement through the serializability
// manager.

use std::sync::Arc;

use parking_lot::Mutex;

use dotsql_core::{
    DataManager, EngineConfig, EngineError, EngineResult, Executor, FileTransactionManager,
    IsolationLevel, ItemId, MemoryDataManager, SerializabilityManager, TableManager, Xid,
};

/// Flat record store: rows are opaque payloads addressed by item id
struct RecordStore {
    sm: SerializabilityManager,
    rows: Mutex<Vec<ItemId>>,
}

impl RecordStore {
    fn open(config: &EngineConfig) -> Arc<Self> {
        let tm = Arc::new(
            FileTransactionManager::open_or_create(&config.path.join("transactions.dtx")).unwrap(),
        );
        let dm = Arc::new(MemoryDataManager::new()) as Arc<dyn DataManager>;
        Arc::new(Self {
            sm: SerializabilityManager::with_max_handles(tm, dm, config.max_entry_handles),
            rows: Mutex::new(Vec::new()),
        })
    }

    fn parse_item(args: &[String]) -> EngineResult<ItemId> {
        let raw = args
            .first()
            .ok_or_else(|| EngineError::InvalidStatement("missing item id".to_string()))?;
        raw.parse::<u64>()
            .map(ItemId)
            .map_err(|_| EngineError::InvalidStatement(format!("bad item id `{raw}`")))
    }
}

impl TableManager for RecordStore {
    fn begin(&self, level: IsolationLevel) -> EngineResult<(Xid, Vec<u8>)> {
        let xid = self.sm.begin(level)?;
        Ok((xid, b"begun".to_vec()))
    }

    fn commit(&self, xid: Xid) -> EngineResult<Vec<u8>> {
        self.sm.commit(xid)?;
        Ok(b"committed".to_vec())
    }

    fn abort(&self, xid: Xid) -> EngineResult<Vec<u8>> {
        self.sm.abort(xid)?;
        Ok(b"aborted".to_vec())
    }

    fn show(&self, xid: Xid) -> EngineResult<Vec<u8>> {
        let mut visible = 0usize;
        for id in self.rows.lock().iter() {
            if self.sm.read(xid, *id)?.is_some() {
                visible += 1;
            }
        }
        Ok(visible.to_string().into_bytes())
    }

    fn create(&self, _xid: Xid, _args: &[String]) -> EngineResult<Vec<u8>> {
        Err(EngineError::InvalidOperation(
            "record stores have no schema".to_string(),
        ))
    }

    fn read(&self, xid: Xid, args: &[String]) -> EngineResult<Vec<u8>> {
        let id = Self::parse_item(args)?;
        Ok(self.sm.read(xid, id)?.unwrap_or_default())
    }

    fn insert(&self, xid: Xid, args: &[String]) -> EngineResult<Vec<u8>> {
        let payload = args.join(" ");
        let id = self.sm.insert(xid, payload.as_bytes())?;
        self.rows.lock().push(id);
        Ok(id.to_string().into_bytes())
    }

    fn delete(&self, xid: Xid, args: &[String]) -> EngineResult<Vec<u8>> {
        let id = Self::parse_item(args)?;
        let deleted = self.sm.delete(xid, id)?;
        Ok(if deleted { b"1".to_vec() } else { b"0".to_vec() })
    }

    fn update(&self, xid: Xid, args: &[String]) -> EngineResult<Vec<u8>> {
        let id = Self::parse_item(args)?;
        if !self.sm.delete(xid, id)? {
            return Ok(b"0".to_vec());
        }
        let payload = args[1..].join(" ");
        let new_id = self.sm.insert(xid, payload.as_bytes())?;
        self.rows.lock().push(new_id);
        Ok(new_id.to_string().into_bytes())
    }
}

fn store(dir: &tempfile::TempDir) -> Arc<RecordStore> {
    let config = EngineConfig {
        path: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    RecordStore::open(&config)
}

fn text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap()
}

#[test]
fn implicit_transactions_round_trip_a_row() {
    let dir = tempfile::tempdir().unwrap();
    let tables = store(&dir);
    let mut session = Executor::new(tables);

    let id = text(session.execute(b"insert first row").unwrap());
    let read = session.execute(format!("read {id}").as_bytes()).unwrap();
    assert_eq!(read, b"first row");
    assert!(!session.in_transaction());
}

#[test]
fn explicit_transaction_spans_statements() {
    let dir = tempfile::tempdir().unwrap();
    let tables = store(&dir);
    let mut session = Executor::new(tables.clone());

    session.execute(b"begin isolation level repeatable read").unwrap();
    let id = text(session.execute(b"insert draft").unwrap());
    assert_eq!(
        session.execute(format!("read {id}").as_bytes()).unwrap(),
        b"draft"
    );
    session.execute(b"commit").unwrap();

    let mut other = Executor::new(tables);
    assert_eq!(
        other.execute(format!("read {id}").as_bytes()).unwrap(),
        b"draft"
    );
}

#[test]
fn update_replaces_the_row_under_a_new_id() {
    let dir = tempfile::tempdir().unwrap();
    let tables = store(&dir);
    let mut session = Executor::new(tables);

    let old = text(session.execute(b"insert version one").unwrap());
    let new = text(session.execute(format!("update {old} version two").as_bytes()).unwrap());
    assert_ne!(old, new);

    assert_eq!(session.execute(format!("read {old}").as_bytes()).unwrap(), b"");
    assert_eq!(
        session.execute(format!("read {new}").as_bytes()).unwrap(),
        b"version two"
    );
}

#[test]
fn show_counts_visible_rows() {
    let dir = tempfile::tempdir().unwrap();
    let tables = store(&dir);
    let mut session = Executor::new(tables);

    let id = text(session.execute(b"insert a").unwrap());
    session.execute(b"insert b").unwrap();
    assert_eq!(session.execute(b"show").unwrap(), b"2");

    session.execute(format!("delete {id}").as_bytes()).unwrap();
    assert_eq!(session.execute(b"show").unwrap(), b"1");
}

#[test]
fn serialization_failure_sticks_until_the_session_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let tables = store(&dir);

    let mut writer = Executor::new(tables.clone());
    let id = text(writer.execute(b"insert contested").unwrap());

    let mut victim = Executor::new(tables.clone());
    victim
        .execute(b"begin isolation level repeatable read")
        .unwrap();
    // pin the snapshot before the competing delete
    victim.execute(format!("read {id}").as_bytes()).unwrap();

    // a later transaction deletes and commits the row
    writer.execute(format!("delete {id}").as_bytes()).unwrap();

    let delete = format!("delete {id}");
    assert!(matches!(
        victim.execute(delete.as_bytes()),
        Err(EngineError::CannotSerialize)
    ));

    // every further statement fails the same way, commit included
    assert!(matches!(
        victim.execute(format!("read {id}").as_bytes()),
        Err(EngineError::CannotSerialize)
    ));
    assert!(matches!(
        victim.execute(b"commit"),
        Err(EngineError::CannotSerialize)
    ));
    assert!(victim.in_transaction());

    // only an explicit abort clears the session
    victim.execute(b"abort").unwrap();
    assert!(!victim.in_transaction());
    victim.execute(format!("read {id}").as_bytes()).unwrap();
}

#[test]
fn nested_begin_is_rejected_without_disturbing_the_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let tables = store(&dir);
    let mut session = Executor::new(tables);

    session.execute(b"begin").unwrap();
    let id = text(session.execute(b"insert kept").unwrap());
    assert!(matches!(
        session.execute(b"begin"),
        Err(EngineError::NoNestedTransaction)
    ));
    session.execute(b"commit").unwrap();

    assert_eq!(
        session.execute(format!("read {id}").as_bytes()).unwrap(),
        b"kept"
    );
}

#[test]
fn failed_statement_rolls_back_only_its_implicit_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let tables = store(&dir);
    let mut session = Executor::new(tables);

    let id = text(session.execute(b"insert stable").unwrap());
    assert!(session.execute(b"create t int32").is_err());
    assert!(!session.in_transaction());

    // earlier committed data is untouched
    assert_eq!(
        session.execute(format!("read {id}").as_bytes()).unwrap(),
        b"stable"
    );
}
