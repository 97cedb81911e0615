//! Execution strategies: where a generation job actually runs.
//!
//! The [`Scheduler`](crate::scheduler::Scheduler) owns deduplication and
//! hands each unique job to an [`ExecutionStrategy`] exactly once. The
//! strategy runs it and calls the completion exactly once.
//!
//! | Strategy | Runs jobs | Timeout |
//! |---|---|---|
//! | [`InProcessPool`] | on a fixed rayon pool, FIFO | no (encoding cannot be interrupted) |
//! | [`SubprocessStrategy`] | one child process per job (`run-job`) | optional, child is killed |
//!
//! Both bound concurrency with a rayon pool of `ppc` threads and use
//! `spawn_fifo`, so jobs start in submission order and none starves.

use crate::config::{self, ProcessingConfig, StrategyKind};
use crate::imaging::GenerateError;
use crate::job::{GenerationJob, Generator, JobReport, JobResult};
use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Called exactly once with the job's result.
pub type Completion = Box<dyn FnOnce(JobResult) + Send + 'static>;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("Cannot locate executable for subprocess jobs: {0}")]
    Program(std::io::Error),
}

/// Runs generation jobs. Implementations must call `done` exactly once per
/// spawned job, including when the job panics or times out.
pub trait ExecutionStrategy: Send + Sync {
    fn spawn(&self, job: GenerationJob, done: Completion);

    /// Number of jobs that may run at once.
    fn workers(&self) -> usize;

    fn name(&self) -> &'static str;

    /// Run one job and block until it finishes.
    fn execute(&self, job: GenerationJob) -> JobResult {
        let (tx, rx) = std::sync::mpsc::channel();
        self.spawn(
            job,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.recv().unwrap_or_else(|_| {
            Err(GenerateError::Execution(
                "worker dropped job without result".into(),
            ))
        })
    }
}

fn build_pool(workers: usize, prefix: &'static str) -> Result<rayon::ThreadPool, ExecutorError> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(move |i| format!("{prefix}-{i}"))
        .build()?)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}

// ============================================================================
// In-process pool
// ============================================================================

/// Runs jobs on a dedicated rayon pool inside this process.
pub struct InProcessPool {
    pool: rayon::ThreadPool,
    generator: Generator,
    workers: usize,
}

impl InProcessPool {
    pub fn new(generator: Generator, workers: usize) -> Result<Self, ExecutorError> {
        let workers = workers.max(1);
        Ok(Self {
            pool: build_pool(workers, "derive")?,
            generator,
            workers,
        })
    }
}

impl ExecutionStrategy for InProcessPool {
    fn spawn(&self, job: GenerationJob, done: Completion) {
        let generator = self.generator.clone();
        self.pool.spawn_fifo(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| generator.run(&job)))
                .unwrap_or_else(|payload| Err(GenerateError::Execution(panic_message(payload))));
            done(result);
        });
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn name(&self) -> &'static str {
        "in-process"
    }
}

// ============================================================================
// Subprocess per job
// ============================================================================

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs each job in a child process.
///
/// The child receives the job as JSON on stdin and prints a [`JobReport`]
/// on stdout. A non-zero exit status or unparsable output fails the job;
/// exceeding `timeout` kills the child and fails the job with
/// [`GenerateError::Timeout`].
pub struct SubprocessStrategy {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
    pool: rayon::ThreadPool,
    workers: usize,
}

impl SubprocessStrategy {
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        timeout: Option<Duration>,
        workers: usize,
    ) -> Result<Self, ExecutorError> {
        let workers = workers.max(1);
        Ok(Self {
            program: program.into(),
            args,
            timeout,
            pool: build_pool(workers, "derive-child")?,
            workers,
        })
    }
}

impl ExecutionStrategy for SubprocessStrategy {
    fn spawn(&self, job: GenerationJob, done: Completion) {
        let program = self.program.clone();
        let args = self.args.clone();
        let timeout = self.timeout;
        self.pool.spawn_fifo(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                run_child(&program, &args, &job, timeout)
            }))
            .unwrap_or_else(|payload| Err(GenerateError::Execution(panic_message(payload))));
            done(result);
        });
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn name(&self) -> &'static str {
        "subprocess"
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    pipe: Option<R>,
) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

fn run_child(
    program: &std::path::Path,
    args: &[String],
    job: &GenerationJob,
    timeout: Option<Duration>,
) -> JobResult {
    let exec_err = |what: &str, e: &dyn std::fmt::Display| {
        GenerateError::Execution(format!("{what} {}: {e}", program.display()))
    };

    let payload = serde_json::to_vec(job).map_err(|e| exec_err("cannot serialize job for", &e))?;
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| exec_err("failed to start", &e))?;

    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    if let Some(mut stdin) = child.stdin.take()
        && let Err(e) = stdin.write_all(&payload)
    {
        // The child may exit without reading its input; its status decides.
        tracing::debug!(error = %e, "child closed stdin early");
    }

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if let Some(limit) = timeout
                    && started.elapsed() >= limit
                {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::warn!(
                        media = %job.media_id,
                        timeout_ms = limit.as_millis() as u64,
                        "derivative job timed out, child killed"
                    );
                    return Err(GenerateError::Timeout(limit.as_millis() as u64));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(exec_err("failed to wait for", &e));
            }
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    if !status.success() {
        return Err(GenerateError::Execution(format!(
            "{} exited with {status}: {}",
            program.display(),
            stderr.trim()
        )));
    }

    let report = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| exec_err("no report from", &"empty stdout"))?;
    serde_json::from_str::<JobReport>(report)
        .map_err(|e| exec_err("unreadable report from", &e))?
        .into_result()
}

// ============================================================================
// Construction from config
// ============================================================================

/// Build the configured strategy. Subprocess jobs default to re-running this
/// executable with the hidden `run-job` subcommand.
pub fn build_strategy(
    processing: &ProcessingConfig,
    generator: Generator,
) -> Result<Arc<dyn ExecutionStrategy>, ExecutorError> {
    let workers = config::effective_workers(processing);
    match processing.strategy {
        StrategyKind::InProcess => Ok(Arc::new(InProcessPool::new(generator, workers)?)),
        StrategyKind::Subprocess => {
            let program = match &processing.program {
                Some(program) => program.clone(),
                None => std::env::current_exe().map_err(ExecutorError::Program)?,
            };
            let timeout = processing.timeout_secs.map(Duration::from_secs);
            Ok(Arc::new(SubprocessStrategy::new(
                program,
                vec!["run-job".to_string()],
                timeout,
                workers,
            )?))
        }
    }
}
