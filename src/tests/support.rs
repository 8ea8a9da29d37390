//! Scripted in-memory backend and recording build log used by the tests.

use crate::core::domain::{
    error::{BackendError, CompletionError},
    model::{
        power_state::{MachineCommand, PowerState},
        virtual_machine::{MachineId, MachineListing},
    },
    port::{BuildLogger, CompletionToken, Connector, DatacenterHandle},
    value_object::{DatacenterUri, DatacenterUsername},
};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the next wait on a machine's completion token reports.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// The wait elapses; nothing changes.
    Timeout,
    /// The wait elapses, but the machine has meanwhile reached the target state.
    TimeoutButReached,
    /// The command finishes and the machine reaches the target state.
    Complete,
    /// The backend reports the command failed.
    Fail(&'static str),
    /// The wait never returns.
    Hang,
}

struct FakeMachine {
    id: MachineId,
    state: PowerState,
    script: VecDeque<Step>,
}

#[derive(Default)]
struct BackendState {
    machines: BTreeMap<String, FakeMachine>,
    journal: Vec<(MachineCommand, String)>,
    waits: usize,
    connects: usize,
    refuse: Option<String>,
}

/// An in-memory datacenter whose command outcomes are scripted per machine.
///
/// Without a script, a command completes on the first wait.
#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_machine(&self, name: &str, power_state: PowerState) {
        let mut state = self.state.lock().unwrap();
        let id = MachineId(format!("vm-{}", state.machines.len() + 1));
        state.machines.insert(
            name.to_string(),
            FakeMachine {
                id,
                state: power_state,
                script: VecDeque::new(),
            },
        );
    }

    pub(crate) fn remove_machine(&self, name: &str) {
        self.state.lock().unwrap().machines.remove(name);
    }

    pub(crate) fn script(&self, name: &str, steps: Vec<Step>) {
        let mut state = self.state.lock().unwrap();
        if let Some(machine) = state.machines.get_mut(name) {
            machine.script = steps.into();
        }
    }

    pub(crate) fn set_state(&self, name: &str, power_state: PowerState) {
        if let Some(machine) = self.state.lock().unwrap().machines.get_mut(name) {
            machine.state = power_state;
        }
    }

    pub(crate) fn state_of(&self, name: &str) -> Option<PowerState> {
        self.state
            .lock()
            .unwrap()
            .machines
            .get(name)
            .map(|machine| machine.state)
    }

    /// Every command issued, in order.
    pub(crate) fn journal(&self) -> Vec<(MachineCommand, String)> {
        self.state.lock().unwrap().journal.clone()
    }

    pub(crate) fn commands(&self, command: MachineCommand) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter(|(issued, _)| *issued == command)
            .map(|(_, name)| name)
            .collect()
    }

    pub(crate) fn waits(&self) -> usize {
        self.state.lock().unwrap().waits
    }

    pub(crate) fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub(crate) fn refuse_connections(&self, message: &str) {
        self.state.lock().unwrap().refuse = Some(message.to_string());
    }

    pub(crate) fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    pub(crate) fn handle(&self) -> Arc<dyn DatacenterHandle> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Connector for FakeBackend {
    async fn connect(
        &self,
        _uri: &DatacenterUri,
        _username: &DatacenterUsername,
        _password: &str,
    ) -> Result<Arc<dyn DatacenterHandle>, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        if let Some(message) = state.refuse.clone() {
            return Err(BackendError::Backend(message));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl DatacenterHandle for FakeBackend {
    async fn list_machines(&self) -> Result<Vec<MachineListing>, BackendError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .machines
            .iter()
            .map(|(name, machine)| MachineListing {
                id: machine.id.clone(),
                name: name.clone(),
                power_state: machine.state,
            })
            .collect())
    }

    async fn execute(
        &self,
        command: MachineCommand,
        machine: &MachineId,
    ) -> Result<Box<dyn CompletionToken>, BackendError> {
        let mut state = self.state.lock().unwrap();
        let name = state
            .machines
            .iter()
            .find(|(_, candidate)| &candidate.id == machine)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| BackendError::Backend(format!("no machine with id {}", machine)))?;
        state.journal.push((command, name.clone()));
        Ok(Box::new(FakeToken {
            backend: self.clone(),
            name,
            target: command.target_state(),
        }))
    }

    fn is_open(&self) -> bool {
        true
    }

    async fn close(&self) {}
}

struct FakeToken {
    backend: FakeBackend,
    name: String,
    target: PowerState,
}

#[async_trait]
impl CompletionToken for FakeToken {
    async fn wait(&mut self, _timeout: Duration) -> Result<(), CompletionError> {
        let outcome = {
            let mut state = self.backend.state.lock().unwrap();
            state.waits += 1;
            let Some(machine) = state.machines.get_mut(&self.name) else {
                return Err(CompletionError::Execution("machine vanished".to_string()));
            };
            match machine.script.pop_front().unwrap_or(Step::Complete) {
                Step::Timeout => Some(Err(CompletionError::Timeout)),
                Step::TimeoutButReached => {
                    machine.state = self.target;
                    Some(Err(CompletionError::Timeout))
                }
                Step::Complete => {
                    machine.state = self.target;
                    Some(Ok(()))
                }
                Step::Fail(message) => Some(Err(CompletionError::Execution(message.to_string()))),
                Step::Hang => None,
            }
        };
        match outcome {
            Some(outcome) => outcome,
            None => std::future::pending().await,
        }
    }
}

/// A build log that keeps every line.
#[derive(Default)]
pub(crate) struct RecordingLogger {
    lines: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, fragment: &str) -> usize {
        self.lines()
            .iter()
            .filter(|line| line.contains(fragment))
            .count()
    }

    pub(crate) fn contains(&self, fragment: &str) -> bool {
        self.count(fragment) > 0
    }
}

impl BuildLogger for RecordingLogger {
    fn println(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn error(&self, line: &str) {
        self.errors.lock().unwrap().push(line.to_string());
        self.println(line);
    }
}
