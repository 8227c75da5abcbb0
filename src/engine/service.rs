use super::{CancellationToken, Decision, LockDecisionEngine, PostUnlock, RecheckKey, UnlockOutcome};
use crate::error::{AppError, Result};
use crate::window::WindowEvent;
use log::{debug, error, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

enum Command {
    Evaluate {
        event: WindowEvent,
        token: CancellationToken,
    },
    /// Never superseded: each due recheck must reach the engine
    Recheck(RecheckKey),
    SubmitPin {
        attempt: String,
        choice: Option<PostUnlock>,
    },
    Shutdown,
}

/// Result handed back to the host on its completion channel.
#[derive(Debug)]
pub enum Completion {
    Decision {
        event: WindowEvent,
        decision: Decision,
    },
    Unlock(UnlockOutcome),
    Failed {
        operation: &'static str,
        error: AppError,
    },
}

/// Runs the decision engine on a worker thread.
///
/// At most one live evaluation is current: submitting a window event cancels
/// the token of the previous one, so stale events are dropped without
/// reaching the host. Rechecks neither cancel nor get cancelled by events;
/// the engine itself drops those whose window has left the foreground.
pub struct LockService {
    commands: Sender<Command>,
    current: Mutex<Option<CancellationToken>>,
    halted: CancellationToken,
    running: Arc<AtomicBool>,
}

impl LockService {
    /// Move `engine` onto a worker thread. Results go to `completions`, which
    /// the host drains on whatever thread it needs.
    pub fn start(
        mut engine: LockDecisionEngine,
        completions: Sender<Completion>,
    ) -> (Self, thread::JoinHandle<()>) {
        let (commands, inbox) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(true));
        let worker_running = Arc::clone(&running);
        let halted = CancellationToken::new();
        let worker_halted = halted.clone();

        let handle = thread::spawn(move || {
            for command in inbox {
                let completion = match command {
                    Command::Evaluate { event, token } => {
                        if token.is_cancelled() {
                            debug!("Dropping superseded event for {}", event.package_name);
                            continue;
                        }
                        match engine.evaluate_with(&event, &token) {
                            Ok(_) if token.is_cancelled() => continue,
                            Ok(decision) => Completion::Decision { event, decision },
                            Err(error) => {
                                error!(
                                    "Evaluation of {}/{} failed: {error}",
                                    event.package_name, event.class_name
                                );
                                Completion::Failed {
                                    operation: "evaluate window event",
                                    error,
                                }
                            }
                        }
                    }
                    Command::Recheck(key) => {
                        if worker_halted.is_cancelled() {
                            continue;
                        }
                        let event = WindowEvent::forced(&key.package_name, &key.class_name);
                        match engine.recheck(&key) {
                            Ok(decision) => Completion::Decision { event, decision },
                            Err(error) => Completion::Failed {
                                operation: "recheck window",
                                error,
                            },
                        }
                    }
                    Command::SubmitPin { attempt, choice } => {
                        let choice = choice.unwrap_or_else(|| engine.default_post_unlock());
                        match engine.submit_pin(&attempt, choice) {
                            Ok(outcome) => Completion::Unlock(outcome),
                            Err(error) => Completion::Failed {
                                operation: "submit pin",
                                error,
                            },
                        }
                    }
                    Command::Shutdown => break,
                };

                if completions.send(completion).is_err() {
                    warn!("Completion receiver dropped, stopping lock service");
                    break;
                }
            }
            worker_running.store(false, Ordering::SeqCst);
        });

        let service = Self {
            commands,
            current: Mutex::new(None),
            halted,
            running,
        };
        (service, handle)
    }

    /// Queue a window event, superseding any evaluation still pending.
    pub fn submit_event(&self, event: WindowEvent) -> Result<()> {
        self.supersede(|token| Command::Evaluate { event, token })
    }

    /// Queue a scheduled recheck behind whatever is already pending.
    pub fn submit_recheck(&self, key: RecheckKey) -> Result<()> {
        self.send(Command::Recheck(key))
    }

    /// Queue a PIN for the pending challenge. `None` uses the configured default choice.
    pub fn submit_pin(&self, attempt: &str, choice: Option<PostUnlock>) -> Result<()> {
        self.send(Command::SubmitPin {
            attempt: attempt.to_string(),
            choice,
        })
    }

    /// Finish queued work, then stop the worker.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    /// Cancel the current evaluation and stop the worker.
    pub fn stop(&self) {
        self.halted.cancel();
        if let Ok(mut current) = self.current.lock() {
            if let Some(token) = current.take() {
                token.cancel();
            }
        }
        if self.commands.send(Command::Shutdown).is_err() {
            debug!("Lock service worker already stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn supersede<F>(&self, command: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Command,
    {
        let token = CancellationToken::new();
        let mut current = self.current.lock().map_err(|_| AppError::LockPoisoned)?;
        if let Some(previous) = current.replace(token.clone()) {
            previous.cancel();
        }
        self.send(command(token))
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| AppError::Internal("lock service is not running".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::SuppressReason;
    use crate::models::LockEntry;
    use crate::test_utils::{setup_test_context, TestHost};
    use std::time::Duration;

    type Started = (
        LockService,
        thread::JoinHandle<()>,
        mpsc::Receiver<Completion>,
        tempfile::TempDir,
    );

    fn start() -> Started {
        let (context, dir) = setup_test_context(EngineConfig::default());
        context.verifier().create_master_pin("1234", "1234", None).unwrap();
        context.store().insert(&LockEntry::new("com.foo", "Main")).unwrap();
        let engine = context.engine(TestHost::new().collaborators()).unwrap();
        let (tx, rx) = mpsc::channel();
        let (service, handle) = LockService::start(engine, tx);
        (service, handle, rx, dir)
    }

    /// com.foo/Main was unlocked with a one-minute grace period that has
    /// just run out; com.foo/Main is still in the foreground.
    fn start_after_grace_period() -> Started {
        let (context, dir) = setup_test_context(EngineConfig::default());
        let host = TestHost::new();
        context.verifier().create_master_pin("1234", "1234", None).unwrap();
        context.store().insert(&LockEntry::new("com.foo", "Main")).unwrap();
        context
            .store()
            .insert(&LockEntry::new("com.qux", "QuxActivity"))
            .unwrap();
        let mut engine = context.engine(host.collaborators()).unwrap();
        engine.evaluate(&WindowEvent::new("com.foo", "Main")).unwrap();
        engine
            .submit_pin("1234", PostUnlock::Ignore { minutes: 1 })
            .unwrap();
        host.clock.advance(60_000);

        let (tx, rx) = mpsc::channel();
        let (service, handle) = LockService::start(engine, tx);
        (service, handle, rx, dir)
    }

    fn decisions(rx: &mpsc::Receiver<Completion>) -> Vec<(String, Decision)> {
        rx.try_iter()
            .filter_map(|c| match c {
                Completion::Decision { event, decision } => Some((event.package_name, decision)),
                Completion::Unlock(_) | Completion::Failed { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_event_then_pin_round_trip() {
        let (service, handle, rx, _dir) = start();
        assert!(service.is_running());

        service.submit_event(WindowEvent::new("com.foo", "Main")).unwrap();
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            Completion::Decision { decision, .. } => {
                assert!(matches!(decision, Decision::Challenge(_)));
            }
            other => panic!("unexpected completion {other:?}"),
        }

        service.submit_pin("1234", None).unwrap();
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            Completion::Unlock(outcome) => assert_eq!(outcome, UnlockOutcome::Unlocked),
            other => panic!("unexpected completion {other:?}"),
        }

        service.shutdown().unwrap();
        handle.join().unwrap();
        assert!(!service.is_running());
    }

    #[test]
    fn test_latest_event_always_completes() {
        let (service, handle, rx, _dir) = start();

        for _ in 0..20 {
            service.submit_event(WindowEvent::new("com.bar", "Main")).unwrap();
        }
        service.submit_event(WindowEvent::new("com.foo", "Main")).unwrap();
        service.shutdown().unwrap();
        handle.join().unwrap();

        let completions: Vec<Completion> = rx.try_iter().collect();
        assert!(!completions.is_empty());
        assert!(completions.len() <= 21);
        match completions.last() {
            Some(Completion::Decision { event, decision }) => {
                assert_eq!(event.package_name, "com.foo");
                assert!(matches!(decision, Decision::Challenge(_)));
            }
            other => panic!("unexpected last completion {other:?}"),
        }
        assert!(!completions.iter().any(|c| matches!(
            c,
            Completion::Decision {
                decision: Decision::Suppressed(SuppressReason::Cancelled),
                ..
            }
        )));
    }

    #[test]
    fn test_stop_rejects_further_work() {
        let (service, handle, _rx, _dir) = start();

        service.stop();
        handle.join().unwrap();

        assert!(service.submit_event(WindowEvent::new("com.foo", "Main")).is_err());
    }

    #[test]
    fn test_stop_after_worker_exit_is_harmless() {
        let (service, handle, _rx, _dir) = start();
        service.shutdown().unwrap();
        handle.join().unwrap();

        service.stop();

        assert!(!service.is_running());
        assert!(service.submit_recheck(RecheckKey::new("com.foo", "Main")).is_err());
    }

    #[test]
    fn test_every_due_recheck_is_evaluated() {
        let (service, handle, rx, _dir) = start_after_grace_period();

        service.submit_recheck(RecheckKey::new("com.foo", "Main")).unwrap();
        service.submit_recheck(RecheckKey::new("com.bar", "Main")).unwrap();
        service.shutdown().unwrap();
        handle.join().unwrap();

        let decisions = decisions(&rx);
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].0, "com.foo");
        assert!(matches!(decisions[0].1, Decision::Challenge(_)));
        assert_eq!(
            decisions[1],
            (
                "com.bar".to_string(),
                Decision::Suppressed(SuppressReason::NotForeground)
            )
        );
    }

    #[test]
    fn test_recheck_does_not_drop_queued_event() {
        let (service, handle, rx, _dir) = start_after_grace_period();

        service
            .submit_event(WindowEvent::new("com.qux", "QuxActivity"))
            .unwrap();
        service.submit_recheck(RecheckKey::new("com.foo", "Main")).unwrap();
        service.shutdown().unwrap();
        handle.join().unwrap();

        let decisions = decisions(&rx);
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].0, "com.qux");
        assert!(matches!(decisions[0].1, Decision::Challenge(_)));
        // com.qux took the foreground first
        assert_eq!(
            decisions[1].1,
            Decision::Suppressed(SuppressReason::NotForeground)
        );
    }
}
