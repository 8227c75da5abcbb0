//! Framed JSON bridge between the engine and the process that owns the
//! accessibility feed and the lock screen UI.
//!
//! Every message is a 4-byte little-endian length followed by that many
//! bytes of UTF-8 JSON, in both directions.

pub mod adapters;

pub use adapters::{DeviceLockFlag, PendingRechecks, WindowClassResolver};

use crate::constants::MAX_MESSAGE_SIZE;
use crate::credential::{PinClear, PinCreation};
use crate::engine::{
    Clock, Collaborators, Completion, Decision, LockService, PostUnlock, SuppressReason,
    SystemClock, UnlockOutcome,
};
use crate::error::{AppError, Result};
use crate::models::LockEntry;
use crate::window::WindowEvent;
use crate::AppContext;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    #[serde(rename = "window_event")]
    WindowEvent(WindowEvent),
    #[serde(rename = "submit_pin")]
    SubmitPin {
        pin: String,
        #[serde(default)]
        choice: Option<PostUnlock>,
    },
    #[serde(rename = "create_pin")]
    CreatePin {
        pin: String,
        reentry: String,
        #[serde(default)]
        hint: Option<String>,
    },
    #[serde(rename = "clear_pin")]
    ClearPin { pin: String },
    #[serde(rename = "device_lock")]
    DeviceLock { locked: bool },
    #[serde(rename = "lock_package")]
    LockPackage {
        #[serde(rename = "packageName")]
        package_name: String,
        #[serde(rename = "isSystemApplication", default)]
        is_system_application: bool,
    },
    #[serde(rename = "unlock_package")]
    UnlockPackage {
        #[serde(rename = "packageName")]
        package_name: String,
    },
    #[serde(rename = "lock_activity")]
    LockActivity {
        #[serde(rename = "packageName")]
        package_name: String,
        #[serde(rename = "activityName")]
        activity_name: String,
        locked: bool,
        #[serde(rename = "isSystemApplication", default)]
        is_system_application: bool,
    },
    #[serde(rename = "list_entries")]
    ListEntries {
        #[serde(rename = "packageName", default)]
        package_name: Option<String>,
    },
    #[serde(rename = "request_state")]
    RequestState,
    /// Drain rechecks that have come due
    #[serde(rename = "tick")]
    Tick,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    #[serde(rename = "challenge")]
    Challenge {
        entry: LockEntry,
        #[serde(rename = "className")]
        class_name: String,
    },
    #[serde(rename = "suppressed")]
    Suppressed {
        #[serde(rename = "packageName")]
        package_name: String,
        #[serde(rename = "className")]
        class_name: String,
        reason: SuppressReason,
    },
    #[serde(rename = "unlock")]
    Unlock { outcome: UnlockOutcome },
    #[serde(rename = "pin_created")]
    PinCreated { created: bool },
    #[serde(rename = "pin_cleared")]
    PinCleared { cleared: bool },
    #[serde(rename = "entries")]
    Entries { entries: Vec<LockEntry> },
    #[serde(rename = "state")]
    State {
        enabled: bool,
        hint: Option<String>,
        #[serde(rename = "pendingRechecks")]
        pending_rechecks: usize,
    },
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "error")]
    Error { message: String },
}

impl From<Completion> for OutgoingMessage {
    fn from(completion: Completion) -> Self {
        match completion {
            Completion::Decision {
                event,
                decision: Decision::Challenge(entry),
            } => Self::Challenge {
                entry,
                class_name: event.class_name,
            },
            Completion::Decision {
                event,
                decision: Decision::Suppressed(reason),
            } => Self::Suppressed {
                package_name: event.package_name,
                class_name: event.class_name,
                reason,
            },
            Completion::Unlock(outcome) => Self::Unlock { outcome },
            Completion::Failed { operation, error } => Self::Error {
                message: format!("Failed to {operation}: {error}"),
            },
        }
    }
}

/// Read one frame. A clean end of input surfaces as `UnexpectedEof`.
pub fn read_frame<R: Read>(input: &mut R) -> io::Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    input.read_exact(&mut len_bytes)?;
    let len = usize::try_from(u32::from_le_bytes(len_bytes))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message too large: {len} bytes (max: {MAX_MESSAGE_SIZE} bytes)"),
        ));
    }

    let mut buffer = vec![0u8; len];
    input.read_exact(&mut buffer)?;
    Ok(buffer)
}

pub fn write_frame<W: Write, T: Serialize>(output: &mut W, message: &T) -> io::Result<()> {
    let json = serde_json::to_vec(message)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Reply too large: {} bytes", json.len()),
        ));
    }
    let len = u32::try_from(json.len())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    output.write_all(&len.to_le_bytes())?;
    output.write_all(&json)?;
    output.flush()
}

fn send<W: Write>(output: &Mutex<W>, message: &OutgoingMessage) -> io::Result<()> {
    let mut guard = output.lock().unwrap_or_else(|poisoned| {
        warn!("Output mutex was poisoned, recovering");
        poisoned.into_inner()
    });
    write_frame(&mut *guard, message)
}

pub struct NativeHost {
    context: AppContext,
    resolver: Arc<WindowClassResolver>,
    device_lock: Arc<DeviceLockFlag>,
    rechecks: Arc<PendingRechecks>,
    clock: Arc<dyn Clock>,
}

impl NativeHost {
    pub fn new(context: AppContext) -> Self {
        let resolver = Arc::new(WindowClassResolver::new(
            &context.config().lock_screen_package,
        ));
        Self {
            context,
            resolver,
            device_lock: Arc::new(DeviceLockFlag::default()),
            rechecks: Arc::new(PendingRechecks::default()),
            clock: Arc::new(SystemClock),
        }
    }

    fn collaborators(&self) -> Collaborators {
        Collaborators {
            resolver: Arc::<WindowClassResolver>::clone(&self.resolver),
            scheduler: Arc::<PendingRechecks>::clone(&self.rechecks),
            device_lock: Arc::<DeviceLockFlag>::clone(&self.device_lock),
            clock: Arc::clone(&self.clock),
        }
    }

    /// Serve requests from `input` until it closes.
    ///
    /// Synchronous replies are written from this thread; engine results are
    /// forwarded from a second thread as they complete. Both share `output`.
    pub fn run<R, W>(&self, mut input: R, output: W) -> Result<()>
    where
        R: Read,
        W: Write + Send + 'static,
    {
        let output = Arc::new(Mutex::new(output));
        let engine = self.context.engine(self.collaborators())?;
        let (completions, results) = mpsc::channel();
        let (service, worker) = LockService::start(engine, completions);

        let forward_output = Arc::clone(&output);
        let forwarder = thread::spawn(move || -> io::Result<()> {
            for completion in results {
                send(&forward_output, &OutgoingMessage::from(completion))?;
            }
            Ok(())
        });

        info!("Native host started");
        let served = self.serve(&mut input, &output, &service);

        if service.shutdown().is_err() {
            debug!("Lock service already stopped");
        }
        worker
            .join()
            .map_err(|_| AppError::Internal("lock service worker panicked".into()))?;
        forwarder
            .join()
            .map_err(|_| AppError::Internal("completion forwarder panicked".into()))??;
        info!("Native host stopped");
        served
    }

    fn serve<R: Read, W: Write>(
        &self,
        input: &mut R,
        output: &Mutex<W>,
        service: &LockService,
    ) -> Result<()> {
        loop {
            let frame = match read_frame(input) {
                Ok(frame) => frame,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            let reply = match serde_json::from_slice::<IncomingMessage>(&frame) {
                Ok(message) => self.handle_message(message, service),
                Err(e) => {
                    warn!("Rejected malformed message: {e}");
                    Some(OutgoingMessage::Error {
                        message: format!("Malformed message: {e}"),
                    })
                }
            };

            if let Some(reply) = reply {
                send(output, &reply)?;
            }
        }
    }

    fn handle_message(
        &self,
        message: IncomingMessage,
        service: &LockService,
    ) -> Option<OutgoingMessage> {
        match self.dispatch(message, service) {
            Ok(reply) => reply,
            Err(e) => {
                error!("Request failed: {e}");
                Some(OutgoingMessage::Error {
                    message: e.to_string(),
                })
            }
        }
    }

    fn dispatch(
        &self,
        message: IncomingMessage,
        service: &LockService,
    ) -> Result<Option<OutgoingMessage>> {
        let store = self.context.store();
        let verifier = self.context.verifier();
        let reply = match message {
            IncomingMessage::WindowEvent(event) => {
                service.submit_event(event)?;
                None
            }
            IncomingMessage::SubmitPin { pin, choice } => {
                service.submit_pin(&pin, choice)?;
                None
            }
            IncomingMessage::CreatePin { pin, reentry, hint } => {
                let created = verifier.create_master_pin(&pin, &reentry, hint.as_deref())?;
                Some(OutgoingMessage::PinCreated {
                    created: created == PinCreation::Created,
                })
            }
            IncomingMessage::ClearPin { pin } => {
                let cleared = verifier.clear_master_pin(&pin)?;
                Some(OutgoingMessage::PinCleared {
                    cleared: cleared == PinClear::Cleared,
                })
            }
            IncomingMessage::DeviceLock { locked } => {
                self.device_lock.set(locked);
                Some(OutgoingMessage::Ok)
            }
            IncomingMessage::LockPackage {
                package_name,
                is_system_application,
            } => {
                store.lock_package(&package_name, is_system_application)?;
                Some(OutgoingMessage::Ok)
            }
            IncomingMessage::UnlockPackage { package_name } => {
                store.unlock_package(&package_name)?;
                Some(OutgoingMessage::Ok)
            }
            IncomingMessage::LockActivity {
                package_name,
                activity_name,
                locked,
                is_system_application,
            } => {
                store.set_activity_lock(
                    &package_name,
                    &activity_name,
                    locked,
                    is_system_application,
                )?;
                Some(OutgoingMessage::Ok)
            }
            IncomingMessage::ListEntries { package_name } => {
                let entries = match package_name {
                    Some(package_name) => store.query_all_for_package(&package_name)?,
                    None => store.query_all()?,
                };
                Some(OutgoingMessage::Entries { entries })
            }
            IncomingMessage::RequestState => Some(OutgoingMessage::State {
                enabled: verifier.has_master_pin()?,
                hint: verifier.hint()?,
                pending_rechecks: self.rechecks.len(),
            }),
            IncomingMessage::Tick => {
                for key in self.rechecks.take_due(self.clock.now_millis()) {
                    service.submit_recheck(key)?;
                }
                None
            }
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use serde_json::{json, Value};
    use std::io::Cursor;

    /// Cloneable sink so the test can inspect what the host wrote.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn frames(messages: &[Value]) -> Vec<u8> {
        let mut input = Vec::new();
        for message in messages {
            write_frame(&mut input, message).unwrap();
        }
        input
    }

    fn run_host(messages: &[Value]) -> Vec<Value> {
        let context = AppContext::in_memory(EngineConfig::default()).unwrap();
        let host = NativeHost::new(context);
        let output = SharedBuffer::default();

        host.run(Cursor::new(frames(messages)), output.clone()).unwrap();

        let bytes = output.0.lock().unwrap().clone();
        let mut cursor = Cursor::new(bytes);
        let mut replies = Vec::new();
        while let Ok(frame) = read_frame(&mut cursor) {
            replies.push(serde_json::from_slice(&frame).unwrap());
        }
        replies
    }

    #[test]
    fn test_frame_round_trip() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &json!({"type": "tick"})).unwrap();

        assert_eq!(&buffer[..4], &15u32.to_le_bytes());
        let frame = read_frame(&mut Cursor::new(buffer)).unwrap();
        assert!(matches!(
            serde_json::from_slice::<IncomingMessage>(&frame).unwrap(),
            IncomingMessage::Tick
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let len = u32::try_from(MAX_MESSAGE_SIZE + 1).unwrap();
        let mut input = Cursor::new(len.to_le_bytes().to_vec());

        let err = read_frame(&mut input).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_parses_window_event_and_pin_choice() {
        let event: IncomingMessage = serde_json::from_value(json!({
            "type": "window_event",
            "packageName": "com.foo",
            "className": "Main"
        }))
        .unwrap();
        let IncomingMessage::WindowEvent(event) = event else {
            panic!("expected a window event");
        };
        assert_eq!(event, WindowEvent::new("com.foo", "Main"));

        let pin: IncomingMessage = serde_json::from_value(json!({
            "type": "submit_pin",
            "pin": "1234",
            "choice": {"kind": "ignore", "minutes": 5}
        }))
        .unwrap();
        assert!(matches!(
            pin,
            IncomingMessage::SubmitPin {
                choice: Some(PostUnlock::Ignore { minutes: 5 }),
                ..
            }
        ));
    }

    #[test]
    fn test_state_before_any_pin() {
        let replies = run_host(&[json!({"type": "request_state"})]);

        assert_eq!(
            replies,
            vec![json!({"type": "state", "enabled": false, "hint": null, "pendingRechecks": 0})]
        );
    }

    #[test]
    fn test_challenge_then_unlock() {
        let replies = run_host(&[
            json!({"type": "create_pin", "pin": "1234", "reentry": "1234", "hint": "year"}),
            json!({"type": "lock_package", "packageName": "com.foo"}),
            json!({"type": "window_event", "packageName": "com.foo", "className": "Main"}),
            json!({"type": "submit_pin", "pin": "1234"}),
        ]);

        assert_eq!(replies[0], json!({"type": "pin_created", "created": true}));
        assert_eq!(replies[1], json!({"type": "ok"}));
        assert_eq!(replies[2]["type"], "challenge");
        assert_eq!(replies[2]["className"], "Main");
        assert_eq!(replies[2]["entry"]["packageName"], "com.foo");
        assert_eq!(
            replies[3],
            json!({"type": "unlock", "outcome": {"result": "unlocked"}})
        );
    }

    #[test]
    fn test_service_disabled_without_pin() {
        let replies = run_host(&[
            json!({"type": "lock_package", "packageName": "com.foo"}),
            json!({"type": "window_event", "packageName": "com.foo", "className": "Main"}),
        ]);

        assert_eq!(replies[1]["type"], "suppressed");
        assert_eq!(replies[1]["reason"], "service_disabled");
    }

    #[test]
    fn test_malformed_message_does_not_stop_host() {
        let replies = run_host(&[
            json!({"type": "no_such_message"}),
            json!({"type": "create_pin", "pin": "1234", "reentry": "4321"}),
        ]);

        assert_eq!(replies[0]["type"], "error");
        assert_eq!(replies[1], json!({"type": "pin_created", "created": false}));
    }

    #[test]
    fn test_invalid_request_reports_error() {
        let replies = run_host(&[
            json!({"type": "create_pin", "pin": "", "reentry": ""}),
            json!({"type": "list_entries"}),
        ]);

        assert_eq!(replies[0]["type"], "error");
        assert_eq!(replies[1], json!({"type": "entries", "entries": []}));
    }
}
