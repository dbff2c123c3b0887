use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::time::timeout;

use super::common::instances;
use super::common::EVENTUALLY;
use crate::DirectoryClient;
use crate::DirectoryError;
use crate::QueryOptions;
use crate::QueryResult;
use crate::Result;
use crate::ServiceInstance;

/// Directory whose queries stay open until the test answers them through a
/// [`ScriptHandle`].
///
/// A loop that issued call N+1 has finished processing the answer to call N,
/// which gives tests a deterministic sync point without sleeping.
pub struct ScriptedDirectory {
    calls: mpsc::UnboundedSender<QueryCall>,
    mutation_delay: Duration,
    mutations: Arc<Mutex<Vec<String>>>,
}

pub struct ScriptHandle {
    calls: mpsc::UnboundedReceiver<QueryCall>,
    mutations: Arc<Mutex<Vec<String>>>,
}

/// One query waiting for its answer
pub struct QueryCall {
    pub service: String,
    pub options: QueryOptions,
    responder: oneshot::Sender<Result<QueryResult>>,
}

impl ScriptedDirectory {
    pub fn new() -> (Self, ScriptHandle) {
        Self::with_mutation_delay(Duration::ZERO)
    }

    /// Register and deregister take `delay` before they are recorded.
    pub fn with_mutation_delay(delay: Duration) -> (Self, ScriptHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mutations = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                calls: tx,
                mutation_delay: delay,
                mutations: mutations.clone(),
            },
            ScriptHandle { calls: rx, mutations },
        )
    }

    async fn mutate(
        &self,
        record: String,
    ) -> Result<()> {
        if !self.mutation_delay.is_zero() {
            tokio::time::sleep(self.mutation_delay).await;
        }
        self.mutations.lock().push(record);
        Ok(())
    }
}

#[async_trait]
impl DirectoryClient for ScriptedDirectory {
    async fn query(
        &self,
        service: &str,
        options: QueryOptions,
    ) -> Result<QueryResult> {
        let (responder, answer) = oneshot::channel();
        let call = QueryCall {
            service: service.to_string(),
            options,
            responder,
        };
        if self.calls.send(call).is_err() {
            return Err(DirectoryError::Unavailable("script finished".to_string()).into());
        }
        match answer.await {
            Ok(result) => result,
            Err(_) => Err(DirectoryError::Unavailable("call dropped unanswered".to_string()).into()),
        }
    }

    async fn register(
        &self,
        instance: &ServiceInstance,
    ) -> Result<()> {
        self.mutate(format!("register:{}", instance.id())).await
    }

    async fn deregister(
        &self,
        instance_id: &str,
    ) -> Result<()> {
        self.mutate(format!("deregister:{instance_id}")).await
    }
}

impl ScriptHandle {
    /// Next query issued against the directory.
    ///
    /// # Panics
    /// When no query arrives in time.
    pub async fn next_call(&mut self) -> QueryCall {
        match timeout(EVENTUALLY, self.calls.recv()).await {
            Ok(Some(call)) => call,
            Ok(None) => panic!("directory dropped"),
            Err(_) => panic!("no query issued within {:?}", EVENTUALLY),
        }
    }

    /// Asserts no query is issued during `wait`.
    pub async fn assert_no_call(
        &mut self,
        wait: Duration,
    ) {
        if let Ok(Some(call)) = timeout(wait, self.calls.recv()).await {
            panic!(
                "unexpected query for {} at index {}",
                call.service, call.options.wait_index
            );
        }
    }

    pub fn mutations(&self) -> Vec<String> {
        self.mutations.lock().clone()
    }
}

impl QueryCall {
    pub fn respond(
        self,
        result: Result<QueryResult>,
    ) {
        let _ = self.responder.send(result);
    }

    pub fn reply(
        self,
        index: u64,
        ids: &[&str],
    ) {
        let result = QueryResult::new(index, instances(&self.service, ids));
        self.respond(Ok(result));
    }

    pub fn fail(self) {
        self.respond(Err(DirectoryError::Unavailable("scripted failure".to_string()).into()));
    }
}
