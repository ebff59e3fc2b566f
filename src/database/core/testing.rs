//! Scripted driver for exercising the connection manager without a server

use std::cell::{Ref, RefCell, RefMut};
use std::collections::VecDeque;
use std::rc::Rc;

use super::driver::{
    BufferedCursor, Cursor, Driver, DriverError, ErrorInfo, FetchMode, Handle, ParamMap,
    ServerInfo, Value,
};
use super::engine::ConnectSpec;

/// Shared record of everything the scripted handles were asked to do
#[derive(Default)]
pub struct Script {
    pub connects: usize,
    pub commands: Vec<String>,
    pub runs: Vec<String>,
    pub tx_log: Vec<&'static str>,
    pub failures: VecDeque<DriverError>,
    pub results: VecDeque<(Vec<String>, Vec<Vec<Value>>)>,
    pub fail_connect: bool,
    pub fail_command: Option<String>,
    pub fail_rollback: bool,
    pub last_id: i64,
}

#[derive(Clone, Default)]
pub struct ScriptedDriver {
    script: Rc<RefCell<Script>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self) -> Ref<'_, Script> {
        self.script.borrow()
    }

    pub fn script_mut(&self) -> RefMut<'_, Script> {
        self.script.borrow_mut()
    }

    /// Queue an error for the next statement
    pub fn push_failure(&self, err: DriverError) {
        self.script.borrow_mut().failures.push_back(err);
    }

    /// Queue a result set for the next successful statement
    pub fn push_rows(&self, columns: Vec<&str>, rows: Vec<Vec<Value>>) {
        let columns = columns.into_iter().map(String::from).collect();
        self.script.borrow_mut().results.push_back((columns, rows));
    }
}

impl Driver for ScriptedDriver {
    fn name(&self) -> &str {
        "scripted"
    }

    fn connect(&self, _spec: &ConnectSpec) -> Result<Box<dyn Handle>, DriverError> {
        let mut script = self.script.borrow_mut();
        script.connects += 1;
        if script.fail_connect {
            return Err(DriverError::new("connection refused").with_code(2002));
        }
        Ok(Box::new(ScriptedHandle {
            script: self.script.clone(),
        }))
    }
}

struct ScriptedHandle {
    script: Rc<RefCell<Script>>,
}

impl Handle for ScriptedHandle {
    fn execute_command(&mut self, sql: &str) -> Result<(), DriverError> {
        let mut script = self.script.borrow_mut();
        if script.fail_command.as_deref() == Some(sql) {
            return Err(DriverError::new(format!("command rejected: {}", sql)));
        }
        script.commands.push(sql.to_string());
        Ok(())
    }

    fn run(
        &mut self,
        sql: &str,
        _params: &ParamMap,
        fetch: Option<FetchMode>,
    ) -> Result<Box<dyn Cursor>, DriverError> {
        let mut script = self.script.borrow_mut();
        script.runs.push(sql.to_string());
        if let Some(err) = script.failures.pop_front() {
            return Err(err);
        }
        let cursor = match script.results.pop_front() {
            Some((columns, rows)) => BufferedCursor::new(columns, rows, fetch.unwrap_or_default()),
            None => BufferedCursor::affected(0),
        };
        Ok(Box::new(cursor))
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        self.script.borrow_mut().tx_log.push("begin");
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.script.borrow_mut().tx_log.push("commit");
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        let mut script = self.script.borrow_mut();
        if script.fail_rollback {
            return Err(DriverError::new("rollback refused"));
        }
        script.tx_log.push("rollback");
        Ok(())
    }

    fn last_insert_id(&mut self) -> Result<Value, DriverError> {
        Ok(Value::Integer(self.script.borrow().last_id))
    }

    fn error_info(&self) -> ErrorInfo {
        ErrorInfo::default()
    }

    fn server_info(&self) -> ServerInfo {
        ServerInfo {
            driver: "scripted".to_string(),
            ..Default::default()
        }
    }
}
