//! Execution Engine
//!
//! Walks the AST for one `interpret` call.
//!
//! The `;`/`&` spine is evaluated statement by statement. Each statement is
//! one group (a pipeline, a redirected command or a plain command): its
//! stages are all launched first, then the group's capture session is
//! drained and every child is waited on. Errors inside a group abort the
//! rest of that group, are reported on the error stream, and evaluation
//! moves on to the next statement.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use tracing::{debug, warn};

use crate::ast::types::{AstNode, CommandNode};
use crate::interpreter::builtin_dispatch::{dispatch_builtin, Builtin, BuiltinContext, StreamWriter};
use crate::interpreter::errors::ShellError;
use crate::interpreter::types::{ExecutionContext, JobRecord, StageOutcome};
use crate::parser::lexer::Token;
use crate::process::{
    borrow_stream, CaptureSession, IoConfig, JobHandle, OwnedStream, ProcessBackend, SpawnRequest,
};
use crate::shell::ShellOptions;

pub struct ExecutionEngine<'a, B: ProcessBackend> {
    backend: &'a B,
    /// The command line the AST's tokens point into.
    source: &'a str,
    options: &'a ShellOptions,
    io: Option<&'a mut IoConfig>,
    last_status: i32,
    background_jobs: Vec<JobRecord>,
    /// Set once a child has been given the stdin payload.
    stdin_delivered: bool,
}

impl<'a, B: ProcessBackend> ExecutionEngine<'a, B> {
    pub fn new(
        backend: &'a B,
        source: &'a str,
        options: &'a ShellOptions,
        io: Option<&'a mut IoConfig>,
    ) -> Self {
        Self {
            backend,
            source,
            options,
            io,
            last_status: 0,
            background_jobs: Vec::new(),
            stdin_delivered: false,
        }
    }

    pub fn last_status(&self) -> i32 {
        self.last_status
    }

    pub fn background_jobs(&self) -> &[JobRecord] {
        &self.background_jobs
    }

    /// Evaluate `node`. The result is that of the last statement run.
    pub fn execute(&mut self, node: &AstNode, ctx: ExecutionContext<'_>) -> Result<i32, ShellError> {
        match node {
            AstNode::Seq { left, right } => {
                let result = self.execute_group(left, ctx);
                self.continue_with(result, right.as_deref(), ctx)
            }
            AstNode::Background { left, right } => {
                let result = self.execute_group(left, ctx.in_background()).map(|_| 0);
                self.continue_with(result, right.as_deref(), ctx)
            }
            group => self.execute_group(group, ctx),
        }
    }

    fn continue_with(
        &mut self,
        result: Result<i32, ShellError>,
        right: Option<&AstNode>,
        ctx: ExecutionContext<'_>,
    ) -> Result<i32, ShellError> {
        match (result, right) {
            (result, None) => result,
            (Err(ShellError::Exit(status)), Some(_)) => Err(ShellError::Exit(status)),
            // Already reported by the group.
            (_, Some(right)) => self.execute(right, ctx),
        }
    }

    /// Run one pipeline/redirection/command group to completion.
    pub fn execute_group(
        &mut self,
        node: &AstNode,
        ctx: ExecutionContext<'_>,
    ) -> Result<i32, ShellError> {
        let result = self.run_group(node, ctx);
        match &result {
            Ok(status) => self.last_status = *status,
            Err(ShellError::Exit(_)) => {}
            Err(err) => {
                self.last_status = 1;
                self.report(err);
            }
        }
        result
    }

    fn run_group(&mut self, node: &AstNode, ctx: ExecutionContext<'_>) -> Result<i32, ShellError> {
        let session = match self.io.as_deref() {
            Some(io) if !ctx.background => {
                let mut session = CaptureSession::open(self.backend, io.stdin().is_some())?;
                // Later statements read EOF rather than the host's stdin.
                if self.stdin_delivered {
                    session.skip_stdin_payload();
                }
                Some(session)
            }
            _ => None,
        };

        let mut jobs = Vec::new();
        let launched = self.launch(node, ctx, session.as_ref(), &mut jobs);

        // Whatever was started is drained and waited for, even after an error.
        let drained = match (session, self.io.as_deref_mut()) {
            (Some(session), Some(io)) => self.backend.drain(session, io),
            _ => Ok(()),
        };
        let waited = wait_all(jobs);

        let outcome = launched?;
        drained?;
        let last_job = waited?;
        Ok(match outcome {
            StageOutcome::Finished(status) => status,
            StageOutcome::Spawned => last_job.unwrap_or(0),
        })
    }

    fn launch(
        &mut self,
        node: &AstNode,
        ctx: ExecutionContext<'_>,
        session: Option<&CaptureSession>,
        jobs: &mut Vec<B::Job>,
    ) -> Result<StageOutcome, ShellError> {
        match node {
            AstNode::Pipe { .. } => self.launch_pipeline(node, ctx, session, jobs),
            AstNode::Cmd(command) => self.launch_command(command, ctx, session, jobs),
            AstNode::RedirIn { target, command } => {
                let file = self.open_redirect(target, false)?;
                self.launch(command, ctx.with_input(borrow_stream(&file)), session, jobs)
            }
            AstNode::RedirOut { target, command } => {
                let file = self.open_redirect(target, true)?;
                self.launch(command, ctx.with_output(borrow_stream(&file)), session, jobs)
            }
            AstNode::Seq { .. } | AstNode::Background { .. } => {
                // The grammar never nests a statement inside a group.
                self.execute(node, ctx).map(StageOutcome::Finished)
            }
        }
    }

    /// Launch every stage of a `PIPE` chain, left to right.
    fn launch_pipeline(
        &mut self,
        node: &AstNode,
        ctx: ExecutionContext<'_>,
        session: Option<&CaptureSession>,
        jobs: &mut Vec<B::Job>,
    ) -> Result<StageOutcome, ShellError> {
        let mut stage = node;
        let mut upstream: Option<OwnedStream> = None;
        loop {
            let input = upstream.as_ref().map(|reader| borrow_stream(reader)).or(ctx.input);
            match stage {
                AstNode::Pipe { left, right } => {
                    let pipe = self.backend.pipe()?;
                    let stage_ctx = ExecutionContext {
                        input,
                        output: Some(borrow_stream(&pipe.writer)),
                        background: ctx.background,
                    };
                    debug!(stages = jobs.len() + 1, "pipe wired");
                    self.launch(left, stage_ctx, session, jobs)?;
                    // The writer closes here; only the child holds it now.
                    upstream = Some(pipe.reader);
                    stage = &**right;
                }
                last => {
                    let stage_ctx = ExecutionContext {
                        input,
                        output: ctx.output,
                        background: ctx.background,
                    };
                    return self.launch(last, stage_ctx, session, jobs);
                }
            }
        }
    }

    fn launch_command(
        &mut self,
        command: &CommandNode,
        ctx: ExecutionContext<'_>,
        session: Option<&CaptureSession>,
        jobs: &mut Vec<B::Job>,
    ) -> Result<StageOutcome, ShellError> {
        let argv = command.argv(self.source);
        let Some(program) = argv.first() else {
            return Ok(StageOutcome::Finished(0));
        };

        if let Some(builtin) = Builtin::from_name(program) {
            return self.run_builtin(builtin, &argv[1..], ctx).map(StageOutcome::Finished);
        }

        let payload = match ctx.input {
            Some(_) => None,
            None => session.and_then(CaptureSession::stdin_reader),
        };
        let takes_payload = payload.is_some();
        let request = SpawnRequest {
            argv: &argv,
            stdin: ctx.input.or(payload),
            stdout: ctx.output.or_else(|| session.map(CaptureSession::stdout_writer)),
            stderr: session.map(CaptureSession::stderr_writer),
            background: ctx.background,
        };
        let job = self.backend.spawn(&request)?;
        if takes_payload {
            self.stdin_delivered = true;
        }

        if ctx.background {
            let record = JobRecord {
                id: self.background_jobs.len() + 1,
                pid: job.id(),
                program: program.clone(),
            };
            debug!(job = record.id, pid = record.pid, program = %record.program, "started background job");
            self.background_jobs.push(record);
            job.detach();
        } else {
            jobs.push(job);
        }
        Ok(StageOutcome::Spawned)
    }

    fn run_builtin(
        &mut self,
        builtin: Builtin,
        args: &[String],
        ctx: ExecutionContext<'_>,
    ) -> Result<i32, ShellError> {
        debug!(builtin = builtin.name(), "running builtin");
        let redirected = ctx
            .output
            .map(|stream| stream.try_clone_to_owned().map(File::from))
            .transpose()?;

        let (stdout, stderr) = match self.io.as_deref_mut() {
            Some(io) => {
                let (out, err) = io.sinks();
                (
                    redirected.map_or(StreamWriter::Sink(out), StreamWriter::File),
                    StreamWriter::Sink(err),
                )
            }
            None => (
                redirected.map_or(StreamWriter::Stdout(io::stdout()), StreamWriter::File),
                StreamWriter::Stderr(io::stderr()),
            ),
        };

        let mut builtin_ctx = BuiltinContext {
            args,
            stdout,
            stderr,
            last_status: self.last_status,
            home_dir: self.options.home_dir.as_deref(),
        };
        let status = dispatch_builtin(builtin, &mut builtin_ctx)?;
        drop(builtin_ctx);

        if builtin == Builtin::Exit {
            if self.options.exit_terminates_process {
                debug!(status, "exit builtin terminating process");
                let _ = io::stdout().flush();
                std::process::exit(status);
            }
            return Err(ShellError::Exit(status));
        }
        Ok(status)
    }

    fn open_redirect(&self, target: &Token, write: bool) -> Result<File, ShellError> {
        let path = target.text(self.source);
        let mut options = OpenOptions::new();
        if write {
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o644);
            }
        } else {
            options.read(true);
        }
        options.open(path).map_err(|source| ShellError::Redirect {
            path: path.to_string(),
            source,
        })
    }

    /// Write `err` to the error stream of this call and log it.
    fn report(&mut self, err: &ShellError) {
        warn!(error = %err, "command failed");
        let message = format!("embsh: {}\n", err);
        match self.io.as_deref_mut() {
            Some(io) => io.stderr_sink().deliver(message.as_bytes()),
            None => {
                let _ = io::stderr().write_all(message.as_bytes());
            }
        }
    }
}

/// Wait for every job; returns the last job's status.
///
/// All jobs are waited on even if one wait fails; the first failure wins.
fn wait_all<J: JobHandle>(jobs: Vec<J>) -> Result<Option<i32>, ShellError> {
    let mut last = None;
    let mut failure = None;
    for job in jobs {
        let id = job.id();
        match job.wait() {
            Ok(status) => last = Some(status),
            Err(err) => {
                warn!(pid = id, error = %err, "wait failed");
                if failure.is_none() {
                    failure = Some(err);
                }
            }
        }
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(last),
    }
}
