//! In-process test doubles shared by unit tests across modules.

use crate::channel::{ChannelError, ChannelRequest, RemoteChannel};
use crate::process::ProcessOutput;
use std::sync::Mutex;
use std::time::Duration;

type Responder = Box<dyn Fn(&[String]) -> ProcessOutput + Send + Sync>;

pub fn ok(stdout: impl Into<String>) -> ProcessOutput {
    ProcessOutput {
        exit_code: Some(0),
        stdout: stdout.into(),
        stderr: String::new(),
        timed_out: false,
        duration_ms: 1,
    }
}

pub fn failed(code: i32, stderr: impl Into<String>) -> ProcessOutput {
    ProcessOutput {
        exit_code: Some(code),
        stdout: String::new(),
        stderr: stderr.into(),
        timed_out: false,
        duration_ms: 1,
    }
}

/// Records every argv it receives and answers with a scripted responder.
pub struct RecordingChannel {
    calls: Mutex<Vec<Vec<String>>>,
    responder: Responder,
    hosts: String,
    auth_rejected: bool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(|_| ok("")),
            hosts: "[]".to_string(),
            auth_rejected: false,
        }
    }

    pub fn respond<F>(mut self, f: F) -> Self
    where
        F: Fn(&[String]) -> ProcessOutput + Send + Sync + 'static,
    {
        self.responder = Box::new(f);
        self
    }

    pub fn with_hosts(mut self, json: impl Into<String>) -> Self {
        self.hosts = json.into();
        self
    }

    pub fn auth_rejected(mut self) -> Self {
        self.auth_rejected = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl RemoteChannel for RecordingChannel {
    fn exec(
        &self,
        req: &ChannelRequest<'_>,
        _timeout: Duration,
    ) -> Result<ProcessOutput, ChannelError> {
        self.calls.lock().unwrap().push(req.argv.to_vec());
        if self.auth_rejected {
            return Err(ChannelError::AuthRejected("ERROR: not logged in".into()));
        }
        Ok((self.responder)(req.argv))
    }

    fn list_hosts(&self, _cluster: &str, _timeout: Duration) -> Result<ProcessOutput, ChannelError> {
        self.calls.lock().unwrap().push(vec!["tsh".into(), "ls".into()]);
        if self.auth_rejected {
            return Err(ChannelError::AuthRejected("ERROR: not logged in".into()));
        }
        Ok(ok(self.hosts.clone()))
    }
}
