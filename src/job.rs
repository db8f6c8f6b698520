//! Spoolable jobs and the resumable command stream the interpreter drains.

use crate::command::Command;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Factory for the commands of a job. Invoked once, when the job is dequeued.
///
/// A plan offers a lazy stream through [`generate`](CommandPlan::generate),
/// or a single command through [`single`](CommandPlan::single). A plan that
/// offers neither is dropped by the interpreter.
pub trait CommandPlan: Send + Sync {
    fn generate(&self) -> Option<CommandStream> {
        None
    }

    fn single(&self) -> Option<Command> {
        None
    }
}

/// Plan backed by a closure returning a fresh iterator on every call.
pub struct LazyPlan<F>(F);

impl<F, I> CommandPlan for LazyPlan<F>
where
    F: Fn() -> I + Send + Sync,
    I: IntoIterator<Item = Command>,
    I::IntoIter: Send + 'static,
{
    fn generate(&self) -> Option<CommandStream> {
        Some(CommandStream::new((self.0)()))
    }
}

/// Plan producing exactly one command when dequeued.
pub struct DeferredPlan<F>(F);

impl<F> CommandPlan for DeferredPlan<F>
where
    F: Fn() -> Command + Send + Sync,
{
    fn single(&self) -> Option<Command> {
        Some((self.0)())
    }
}

#[derive(Clone)]
pub enum JobKind {
    /// Bare opcode; becomes a single [`Command::Raw`].
    Code(u16),
    Command(Command),
    /// Structured multi-command job. Spooled as one unit, drained one command per tick.
    Sequence(Vec<Command>),
    Plan(Arc<dyn CommandPlan>),
}

impl fmt::Debug for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Code(code) => f.debug_tuple("Code").field(code).finish(),
            JobKind::Command(command) => f.debug_tuple("Command").field(command).finish(),
            JobKind::Sequence(commands) => f.debug_tuple("Sequence").field(&commands.len()).finish(),
            JobKind::Plan(_) => f.write_str("Plan(..)"),
        }
    }
}

/// A unit of spooled work. Jobs compare equal by id; clones share the id.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    kind: JobKind,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}

impl Job {
    pub fn new(kind: JobKind) -> Self {
        Self { id: JobId::new(), kind }
    }

    pub fn code(code: u16) -> Self {
        Self::new(JobKind::Code(code))
    }

    pub fn command(command: Command) -> Self {
        Self::new(JobKind::Command(command))
    }

    pub fn sequence(commands: impl IntoIterator<Item = Command>) -> Self {
        Self::new(JobKind::Sequence(commands.into_iter().collect()))
    }

    pub fn plan(plan: impl CommandPlan + 'static) -> Self {
        Self::new(JobKind::Plan(Arc::new(plan)))
    }

    /// Job whose commands are produced on demand by `generate`.
    pub fn lazy<F, I>(generate: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Command>,
        I::IntoIter: Send + 'static,
    {
        Self::plan(LazyPlan(generate))
    }

    /// Job whose single command is built when it is dequeued.
    pub fn deferred<F>(build: F) -> Self
    where
        F: Fn() -> Command + Send + Sync + 'static,
    {
        Self::plan(DeferredPlan(build))
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    pub fn is_plan(&self) -> bool {
        matches!(self.kind, JobKind::Plan(_))
    }

    /// Turns the job into the interpreter's in-flight form, invoking plans.
    /// `None` means the job offered nothing to run.
    pub(crate) fn into_in_flight(self) -> Option<InFlight> {
        match self.kind {
            JobKind::Code(raw) => Some(InFlight::Single(Command::Raw(raw))),
            JobKind::Command(command) => Some(InFlight::Single(command)),
            JobKind::Sequence(commands) => Some(InFlight::Stream(CommandStream::new(commands))),
            JobKind::Plan(plan) => plan
                .generate()
                .map(InFlight::Stream)
                .or_else(|| plan.single().map(InFlight::Single)),
        }
    }
}

impl From<Command> for Job {
    fn from(command: Command) -> Self {
        Job::command(command)
    }
}

#[derive(Debug, PartialEq)]
pub enum Pull {
    Next(Command),
    Exhausted,
}

/// Resumable, non-restartable stream of commands.
pub struct CommandStream {
    inner: Box<dyn Iterator<Item = Command> + Send>,
    exhausted: bool,
}

impl CommandStream {
    pub fn new<I>(commands: I) -> Self
    where
        I: IntoIterator<Item = Command>,
        I::IntoIter: Send + 'static,
    {
        Self {
            inner: Box::new(commands.into_iter()),
            exhausted: false,
        }
    }

    /// Produces the next command. Once exhausted, stays exhausted.
    pub fn pull(&mut self) -> Pull {
        if self.exhausted {
            return Pull::Exhausted;
        }
        match self.inner.next() {
            Some(command) => Pull::Next(command),
            None => {
                self.exhausted = true;
                Pull::Exhausted
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl fmt::Debug for CommandStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandStream")
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub(crate) enum InFlight {
    Single(Command),
    Stream(CommandStream),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Mute;
    impl CommandPlan for Mute {}

    #[test]
    fn test_stream_pulls_in_order_then_stays_exhausted() {
        let mut stream = CommandStream::new(vec![Command::Home, Command::LaserOn]);
        assert_eq!(stream.pull(), Pull::Next(Command::Home));
        assert_eq!(stream.pull(), Pull::Next(Command::LaserOn));
        assert_eq!(stream.pull(), Pull::Exhausted);
        assert!(stream.is_exhausted());
        assert_eq!(stream.pull(), Pull::Exhausted);
    }

    #[test]
    fn test_lazy_plan_is_invoked_at_normalization() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let job = Job::lazy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            vec![Command::Home]
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(job.into_in_flight(), Some(InFlight::Stream(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_normalization_of_each_kind() {
        assert!(matches!(
            Job::code(6).into_in_flight(),
            Some(InFlight::Single(Command::Raw(6)))
        ));
        assert!(matches!(
            Job::deferred(|| Command::Beep).into_in_flight(),
            Some(InFlight::Single(Command::Beep))
        ));
        assert!(matches!(
            Job::sequence(vec![Command::Home]).into_in_flight(),
            Some(InFlight::Stream(_))
        ));
        assert!(Job::plan(Mute).into_in_flight().is_none());
    }

    #[test]
    fn test_jobs_compare_by_id() {
        let a = Job::command(Command::Home);
        let b = Job::command(Command::Home);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
