//! Saved test suites and the sequential suite runner.
//!
//! The store holds an immutable snapshot behind an `Arc`. Every mutation
//! clones the snapshot, edits the clone, persists it, and swaps it in whole,
//! so readers never see a half-applied change.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use workbench_core::error::{WorkbenchError, WorkbenchResult};
use workbench_core::form::FormState;

use crate::client::{Connection, Wallet};
use crate::tx::{execute_transaction, ConfirmOptions, ProgramContext, TransactionResult};

/// Pause between consecutive test cases, so state changes made by one case
/// are visible to the next.
pub const DEFAULT_SUITE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedOutcome {
    #[default]
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub name: String,
    pub instruction: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub accounts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_outcome: Option<ExpectedOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: u64,
}

impl TestCase {
    /// The saved form snapshot.
    pub fn form(&self) -> FormState {
        FormState {
            args: self.args.clone(),
            accounts: self.accounts.clone(),
        }
    }

    pub fn expected(&self) -> ExpectedOutcome {
        self.expected_outcome.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuite {
    pub id: String,
    pub name: String,
    pub program_id: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Input for [`SuiteStore::add_test_case`]; id and timestamp are assigned
/// by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTestCase {
    pub name: String,
    pub instruction: String,
    pub form: FormState,
    pub expected_outcome: Option<ExpectedOutcome>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuiteUpdate {
    pub name: Option<String>,
    pub program_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestCaseUpdate {
    pub name: Option<String>,
    pub instruction: Option<String>,
    pub form: Option<FormState>,
    pub expected_outcome: Option<ExpectedOutcome>,
    pub description: Option<String>,
}

/// Everything the store persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default)]
    pub suites: Vec<TestSuite>,
    #[serde(default)]
    pub current_suite_id: Option<String>,
}

impl StoreSnapshot {
    fn suite_mut(&mut self, id: &str) -> WorkbenchResult<&mut TestSuite> {
        self.suites
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| WorkbenchError::SuiteNotFound { id: id.to_string() })
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// `<prefix>_<unix millis>_<9 base36 chars>`.
pub fn generate_id(prefix: &str) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}_{}_{}", prefix, now_millis(), suffix)
}

pub struct SuiteStore {
    snapshot: RwLock<Arc<StoreSnapshot>>,
    path: Option<PathBuf>,
}

impl SuiteStore {
    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        SuiteStore {
            snapshot: RwLock::new(Arc::new(StoreSnapshot::default())),
            path: None,
        }
    }

    /// Load from `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> WorkbenchResult<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = if path.exists() {
            let text = fs::read_to_string(&path).map_err(|e| storage_error(&path, e))?;
            serde_json::from_str(&text).map_err(|e| storage_error(&path, e))?
        } else {
            StoreSnapshot::default()
        };
        tracing::debug!(path = %path.display(), suites = snapshot.suites.len(), "opened suite store");
        Ok(SuiteStore {
            snapshot: RwLock::new(Arc::new(snapshot)),
            path: Some(path),
        })
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Apply `f` to a copy of the current state and commit the copy.
    fn mutate<R>(&self, f: impl FnOnce(&mut StoreSnapshot) -> WorkbenchResult<R>) -> WorkbenchResult<R> {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = StoreSnapshot::clone(&guard);
        let out = f(&mut next)?;
        if let Some(path) = &self.path {
            persist(path, &next)?;
        }
        *guard = Arc::new(next);
        Ok(out)
    }

    pub fn suites(&self) -> Vec<TestSuite> {
        self.snapshot().suites.clone()
    }

    pub fn suite(&self, id: &str) -> Option<TestSuite> {
        self.snapshot().suites.iter().find(|s| s.id == id).cloned()
    }

    pub fn suites_for_program(&self, program_id: &str) -> Vec<TestSuite> {
        self.snapshot()
            .suites
            .iter()
            .filter(|s| s.program_id == program_id)
            .cloned()
            .collect()
    }

    pub fn create_suite(&self, name: &str, program_id: &str) -> WorkbenchResult<String> {
        let id = generate_id("suite");
        let now = now_millis();
        let suite = TestSuite {
            id: id.clone(),
            name: name.to_string(),
            program_id: program_id.to_string(),
            test_cases: vec![],
            created_at: now,
            updated_at: now,
        };
        self.mutate(|state| {
            state.suites.push(suite);
            Ok(())
        })?;
        tracing::info!(suite = %id, name, "created test suite");
        Ok(id)
    }

    pub fn update_suite(&self, id: &str, update: SuiteUpdate) -> WorkbenchResult<()> {
        self.mutate(|state| {
            let suite = state.suite_mut(id)?;
            if let Some(name) = update.name {
                suite.name = name;
            }
            if let Some(program_id) = update.program_id {
                suite.program_id = program_id;
            }
            suite.updated_at = now_millis();
            Ok(())
        })
    }

    /// Deleting the current suite also clears the selection.
    pub fn delete_suite(&self, id: &str) -> WorkbenchResult<()> {
        self.mutate(|state| {
            let before = state.suites.len();
            state.suites.retain(|s| s.id != id);
            if state.suites.len() == before {
                return Err(WorkbenchError::SuiteNotFound { id: id.to_string() });
            }
            if state.current_suite_id.as_deref() == Some(id) {
                state.current_suite_id = None;
            }
            Ok(())
        })
    }

    pub fn set_current_suite(&self, id: Option<&str>) -> WorkbenchResult<()> {
        self.mutate(|state| {
            if let Some(id) = id {
                state.suite_mut(id)?;
            }
            state.current_suite_id = id.map(str::to_string);
            Ok(())
        })
    }

    pub fn current_suite(&self) -> Option<TestSuite> {
        let snapshot = self.snapshot();
        let current = snapshot.current_suite_id.as_deref()?;
        snapshot.suites.iter().find(|s| s.id == current).cloned()
    }

    pub fn add_test_case(&self, suite_id: &str, case: NewTestCase) -> WorkbenchResult<String> {
        let id = generate_id("test");
        let test_case = TestCase {
            id: id.clone(),
            name: case.name,
            instruction: case.instruction,
            args: case.form.args,
            accounts: case.form.accounts,
            expected_outcome: case.expected_outcome,
            description: case.description,
            created_at: now_millis(),
        };
        self.mutate(|state| {
            let suite = state.suite_mut(suite_id)?;
            suite.test_cases.push(test_case);
            suite.updated_at = now_millis();
            Ok(())
        })?;
        Ok(id)
    }

    pub fn update_test_case(&self, suite_id: &str, case_id: &str, update: TestCaseUpdate) -> WorkbenchResult<()> {
        self.mutate(|state| {
            let suite = state.suite_mut(suite_id)?;
            let case = suite
                .test_cases
                .iter_mut()
                .find(|c| c.id == case_id)
                .ok_or_else(|| case_not_found(suite_id, case_id))?;
            if let Some(name) = update.name {
                case.name = name;
            }
            if let Some(instruction) = update.instruction {
                case.instruction = instruction;
            }
            if let Some(form) = update.form {
                case.args = form.args;
                case.accounts = form.accounts;
            }
            if let Some(expected) = update.expected_outcome {
                case.expected_outcome = Some(expected);
            }
            if let Some(description) = update.description {
                case.description = Some(description);
            }
            suite.updated_at = now_millis();
            Ok(())
        })
    }

    pub fn delete_test_case(&self, suite_id: &str, case_id: &str) -> WorkbenchResult<()> {
        self.mutate(|state| {
            let suite = state.suite_mut(suite_id)?;
            let before = suite.test_cases.len();
            suite.test_cases.retain(|c| c.id != case_id);
            if suite.test_cases.len() == before {
                return Err(case_not_found(suite_id, case_id));
            }
            suite.updated_at = now_millis();
            Ok(())
        })
    }

    pub fn get_test_case(&self, suite_id: &str, case_id: &str) -> WorkbenchResult<TestCase> {
        let snapshot = self.snapshot();
        let suite = snapshot
            .suites
            .iter()
            .find(|s| s.id == suite_id)
            .ok_or_else(|| WorkbenchError::SuiteNotFound { id: suite_id.to_string() })?;
        suite
            .test_cases
            .iter()
            .find(|c| c.id == case_id)
            .cloned()
            .ok_or_else(|| case_not_found(suite_id, case_id))
    }
}

fn case_not_found(suite_id: &str, case_id: &str) -> WorkbenchError {
    WorkbenchError::TestCaseNotFound {
        suite_id: suite_id.to_string(),
        id: case_id.to_string(),
    }
}

fn storage_error(path: &Path, err: impl ToString) -> WorkbenchError {
    WorkbenchError::Storage {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Write to a sibling temp file, then rename over the target.
fn persist(path: &Path, snapshot: &StoreSnapshot) -> WorkbenchResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| storage_error(dir, e))?;
    }
    let json = serde_json::to_string_pretty(snapshot).map_err(|e| storage_error(path, e))?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, json).map_err(|e| storage_error(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| storage_error(path, e))
}

/// Runs one test case. The live implementation submits a real transaction.
#[async_trait]
pub trait CaseExecutor: Send + Sync {
    async fn execute(&self, case: &TestCase) -> WorkbenchResult<TransactionResult>;
}

pub struct LiveExecutor<'a> {
    pub ctx: &'a ProgramContext,
    pub wallet: &'a dyn Wallet,
    pub connection: &'a dyn Connection,
    pub opts: ConfirmOptions,
}

#[async_trait]
impl CaseExecutor for LiveExecutor<'_> {
    async fn execute(&self, case: &TestCase) -> WorkbenchResult<TransactionResult> {
        execute_transaction(
            self.ctx,
            &case.instruction,
            &case.form(),
            self.wallet,
            self.connection,
            self.opts,
        )
        .await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub case_id: String,
    pub name: String,
    pub succeeded: bool,
    pub signature: Option<String>,
    pub error: Option<String>,
    pub duration: Duration,
    pub expected: ExpectedOutcome,
}

impl TestResult {
    /// Outcome matched the expectation (a case expected to fail passes when
    /// its transaction fails).
    pub fn passed(&self) -> bool {
        self.succeeded == (self.expected == ExpectedOutcome::Success)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuiteReport {
    pub suite_id: String,
    pub results: Vec<TestResult>,
}

impl SuiteReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }
}

/// Run every case in suite order, one at a time, sleeping `delay` between
/// one case finishing and the next starting.
pub async fn run_suite(suite: &TestSuite, executor: &dyn CaseExecutor, delay: Duration) -> SuiteReport {
    let mut results = Vec::with_capacity(suite.test_cases.len());
    for (i, case) in suite.test_cases.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(delay).await;
        }
        let started = Instant::now();
        let outcome = executor.execute(case).await;
        let duration = started.elapsed();
        let result = match outcome {
            Ok(tx) => TestResult {
                case_id: case.id.clone(),
                name: case.name.clone(),
                succeeded: true,
                signature: Some(tx.signature.to_string()),
                error: None,
                duration,
                expected: case.expected(),
            },
            Err(err) => TestResult {
                case_id: case.id.clone(),
                name: case.name.clone(),
                succeeded: false,
                signature: err.signature().map(str::to_string),
                error: Some(err.to_string()),
                duration,
                expected: case.expected(),
            },
        };
        tracing::info!(
            suite = %suite.id,
            case = %case.name,
            passed = result.passed(),
            elapsed_ms = duration.as_millis() as u64,
            "test case finished"
        );
        results.push(result);
    }
    SuiteReport {
        suite_id: suite.id.clone(),
        results,
    }
}
