//! Subprocess supervision.
//!
//! Elevated-execution surface for ecosystem compatibility: the broker
//! spawns OS processes under its own privilege on behalf of granted
//! peers, hands back streaming pipe handles, and enforces global and
//! per-owner caps. Children die with their owner.

use std::collections::HashMap;
use std::os::fd::OwnedFd;
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use shizuku_broker_core::{now_millis, AuditEvent, EventType, PeerIdentity};
use shizuku_broker_store::PermissionStore;

use crate::error::{BrokerError, Result};
use crate::platform::{LivenessHandle, PackageDatabase};

/// Hard cap on concurrently supervised children.
pub const MAX_GLOBAL_PROCESSES: usize = 64;

/// Per-owner share of the global cap.
pub const MAX_PER_OWNER_PROCESSES: usize = 8;

/// Poll interval for exit detection.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(15);

#[derive(Debug)]
struct ProcessCounts {
    global: usize,
    per_owner: HashMap<i32, usize>,
}

/// One claimed slot against the process caps.
///
/// Released exactly once, at the first of destroy, detected exit, or
/// owner-death cleanup.
#[derive(Debug)]
struct CountReservation {
    counts: Arc<Mutex<ProcessCounts>>,
    owner_uid: i32,
    released: AtomicBool,
}

impl CountReservation {
    fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut counts = self.counts.lock().unwrap();
        counts.global = counts.global.saturating_sub(1);
        if let Some(count) = counts.per_owner.get_mut(&self.owner_uid) {
            *count -= 1;
            if *count == 0 {
                counts.per_owner.remove(&self.owner_uid);
            }
        }
    }
}

/// A supervised child process.
///
/// Pipe handles are extracted at most once each; exit is observed through
/// `wait`/`wait_timeout`/`exit_value`/`alive`; `destroy` kills the child.
#[derive(Debug)]
pub struct RemoteProcess {
    // Exit detection polls under a short lock so destroy() is never
    // blocked behind a waiter.
    child: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<Option<ChildStdout>>,
    stderr: Mutex<Option<ChildStderr>>,
    reservation: CountReservation,
}

impl RemoteProcess {
    fn new(mut child: Child, reservation: CountReservation) -> Self {
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(stdout),
            stderr: Mutex::new(stderr),
            reservation,
        }
    }

    /// The write end of the child's stdin as a transferable descriptor,
    /// or `None` if the pipe was not set up or already taken.
    pub fn take_stdin(&self) -> Option<OwnedFd> {
        self.stdin.lock().unwrap().take().map(OwnedFd::from)
    }

    /// The read end of the child's stdout, or `None`.
    pub fn take_stdout(&self) -> Option<OwnedFd> {
        self.stdout.lock().unwrap().take().map(OwnedFd::from)
    }

    /// The read end of the child's stderr, or `None`.
    pub fn take_stderr(&self) -> Option<OwnedFd> {
        self.stderr.lock().unwrap().take().map(OwnedFd::from)
    }

    /// Block until the child exits; returns the exit code, or -1 if the
    /// child was killed by a signal or could not be observed.
    pub fn wait(&self) -> i32 {
        loop {
            match self.try_exit() {
                Ok(Some(code)) => return code,
                Ok(None) => thread::sleep(EXIT_POLL_INTERVAL),
                Err(_) => return -1,
            }
        }
    }

    /// Wait up to `timeout` for the child to exit. Returns whether it
    /// exited within the window.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match self.try_exit() {
                Ok(Some(_)) => return true,
                Err(_) => return false,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return false;
                    }
                    thread::sleep(EXIT_POLL_INTERVAL);
                }
            }
        }
    }

    /// The exit code of a finished child; fails `NotExited` while the
    /// child is still running.
    pub fn exit_value(&self) -> Result<i32> {
        match self.try_exit() {
            Ok(Some(code)) => Ok(code),
            _ => Err(BrokerError::NotExited),
        }
    }

    /// Whether the child is still running.
    pub fn alive(&self) -> bool {
        matches!(self.try_exit(), Ok(None))
    }

    /// Kill the child and release its slot.
    pub fn destroy(&self) {
        let mut child = self.child.lock().unwrap();
        if let Err(e) = child.kill() {
            debug!(error = %e, "kill failed (child likely already exited)");
        }
        // Reap; a killed child exits promptly.
        let _ = child.wait();
        drop(child);
        self.reservation.release();
    }

    /// Single non-blocking exit probe. Releases the slot on first observed
    /// exit.
    fn try_exit(&self) -> std::io::Result<Option<i32>> {
        let mut child = self.child.lock().unwrap();
        match child.try_wait() {
            Ok(Some(status)) => {
                drop(child);
                self.reservation.release();
                Ok(Some(status.code().unwrap_or(-1)))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(error = %e, "exit probe failed");
                Err(e)
            }
        }
    }
}

/// Spawns and tracks supervised children for granted peers.
pub struct ProcessSupervisor {
    store: Arc<PermissionStore>,
    packages: Arc<dyn PackageDatabase>,
    counts: Arc<Mutex<ProcessCounts>>,
}

impl ProcessSupervisor {
    /// Assemble the supervisor from the shared store and package database.
    pub fn new(store: Arc<PermissionStore>, packages: Arc<dyn PackageDatabase>) -> Self {
        Self {
            store,
            packages,
            counts: Arc::new(Mutex::new(ProcessCounts {
                global: 0,
                per_owner: HashMap::new(),
            })),
        }
    }

    /// Launch a child for `peer`.
    ///
    /// Fails `NotGranted` without an active grant and `ResourceExhausted`
    /// past either cap. A spawn failure releases the claimed slot and
    /// yields `Ok(None)`. The child is destroyed if `peer` dies.
    pub fn new_process(
        &self,
        peer: PeerIdentity,
        owner_liveness: Arc<dyn LivenessHandle>,
        cmd: &[String],
        env: Option<&[String]>,
        cwd: Option<&Path>,
    ) -> Result<Option<Arc<RemoteProcess>>> {
        let user = peer.user_id();
        let package = self.packages.package_for_uid(peer).ok_or_else(|| {
            BrokerError::NotGranted {
                package: format!("<uid {}>", peer.uid()),
                user,
            }
        })?;
        let granted = self
            .store
            .grant(&package, user)
            .map(|g| g.granted)
            .unwrap_or(false);
        if !granted {
            return Err(BrokerError::NotGranted { package, user });
        }

        let reservation = self.reserve(peer)?;

        if cmd.is_empty() {
            reservation.release();
            warn!(package, "empty command rejected");
            return Ok(None);
        }

        let mut command = Command::new(&cmd[0]);
        command
            .args(&cmd[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(env) = env {
            // An explicit environment replaces the broker's, as an exec
            // with an envp would.
            command.env_clear();
            for entry in env {
                if let Some((key, value)) = entry.split_once('=') {
                    command.env(key, value);
                }
            }
        }
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                reservation.release();
                error!(package, cmd = %cmd[0], error = %e, "spawn failed");
                return Ok(None);
            }
        };

        debug!(package, cmd = %cmd[0], pid = child.id(), "child spawned");
        let process = Arc::new(RemoteProcess::new(child, reservation));

        let watched = Arc::clone(&process);
        let pkg = package.clone();
        let linked = owner_liveness.link_to_death(Box::new(move || {
            warn!(package = %pkg, "owner died; destroying child");
            watched.destroy();
        }));
        if !linked {
            warn!(package, "owner already dead; destroying child");
            process.destroy();
        }

        self.store.append_audit(
            AuditEvent::new(EventType::Use, &package, peer.app_id(), user, now_millis())
                .with_detail(redact_command(cmd)),
        );
        info!(package, user, "elevated process started");
        Ok(Some(process))
    }

    /// Number of supervised children across all owners.
    pub fn global_count(&self) -> usize {
        self.counts.lock().unwrap().global
    }

    /// Number of supervised children owned by `peer`.
    pub fn owner_count(&self, peer: PeerIdentity) -> usize {
        self.counts
            .lock()
            .unwrap()
            .per_owner
            .get(&peer.uid())
            .copied()
            .unwrap_or(0)
    }

    /// Claim one slot against both caps.
    fn reserve(&self, peer: PeerIdentity) -> Result<CountReservation> {
        let mut counts = self.counts.lock().unwrap();
        if counts.global >= MAX_GLOBAL_PROCESSES {
            return Err(BrokerError::ResourceExhausted(format!(
                "global process cap ({MAX_GLOBAL_PROCESSES}) reached"
            )));
        }
        let owner = counts.per_owner.entry(peer.uid()).or_insert(0);
        if *owner >= MAX_PER_OWNER_PROCESSES {
            return Err(BrokerError::ResourceExhausted(format!(
                "per-owner process cap ({MAX_PER_OWNER_PROCESSES}) reached for {peer}"
            )));
        }
        *owner += 1;
        counts.global += 1;
        drop(counts);

        Ok(CountReservation {
            counts: Arc::clone(&self.counts),
            owner_uid: peer.uid(),
            released: AtomicBool::new(false),
        })
    }
}

/// Audit-safe command summary: program plus argument count, never the
/// arguments themselves.
fn redact_command(cmd: &[String]) -> String {
    match cmd.len() {
        0 => String::from("<empty>"),
        1 => cmd[0].clone(),
        n => format!("{} (+{} args)", cmd[0], n - 1),
    }
}
