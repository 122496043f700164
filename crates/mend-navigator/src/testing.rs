//! In-memory collaborator doubles shared by the loop and driver tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::Result;

use mend_core::{CommandDecision, CommandRunner, Confirmer, Discovery, FileStore, ModelClient};

/// Replays canned responses in order; empty string once exhausted.
pub(crate) struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<usize>,
}

impl ScriptedModel {
    pub(crate) fn new(responses: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            calls: Mutex::new(0),
        })
    }

    pub(crate) fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, _prompt: &str, _context_files: &[(String, String)]) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    fn token_count(&self, text: &str) -> usize {
        text.len() / 4
    }
}

pub(crate) struct MemFiles {
    map: Mutex<HashMap<String, String>>,
}

impl MemFiles {
    pub(crate) fn new(seed: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            map: Mutex::new(
                seed.iter()
                    .map(|(p, c)| (p.to_string(), c.to_string()))
                    .collect(),
            ),
        })
    }

    pub(crate) fn get(&self, path: &str) -> Option<String> {
        self.map.lock().unwrap().get(path).cloned()
    }
}

impl FileStore for MemFiles {
    fn read(&self, path: &str) -> Option<String> {
        self.get(path)
    }
    fn write(&self, path: &str, content: &str) -> Result<()> {
        self.map
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }
    fn exists(&self, path: &str) -> bool {
        self.map.lock().unwrap().contains_key(path)
    }
    fn delete(&self, path: &str) -> Result<()> {
        self.map.lock().unwrap().remove(path);
        Ok(())
    }
    fn list_tracked(&self) -> Vec<String> {
        self.map.lock().unwrap().keys().cloned().collect()
    }
}

/// Returns the same hit list for every query, counting invocations.
pub(crate) struct MapDiscovery {
    hits: Vec<String>,
    pub(crate) calls: Mutex<usize>,
}

impl MapDiscovery {
    pub(crate) fn new(hits: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            hits: hits.into_iter().map(String::from).collect(),
            calls: Mutex::new(0),
        })
    }
}

impl Discovery for MapDiscovery {
    fn glob_files(&self, _pattern: &str) -> Result<Vec<String>> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.hits.clone())
    }
    fn grep_files(&self, _pattern: &str, _file_pattern: Option<&str>) -> Result<Vec<String>> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.hits.clone())
    }
    fn symbol_files(&self, _symbol: &str) -> Result<Vec<String>> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.hits.clone())
    }
}

pub(crate) struct FixedConfirmer(pub(crate) CommandDecision);

impl Confirmer for FixedConfirmer {
    fn confirm(&self, _prompt: &str) -> CommandDecision {
        self.0
    }
}

pub(crate) struct LoggingRunner {
    pub(crate) log: Mutex<Vec<String>>,
}

impl LoggingRunner {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
        })
    }
}

impl CommandRunner for LoggingRunner {
    fn run(&self, command: &str) -> Result<String> {
        self.log.lock().unwrap().push(command.to_string());
        Ok(format!("ran: {command}"))
    }
}
