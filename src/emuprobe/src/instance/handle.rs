//! Instance actor
//!
//! `InstanceHandle::spawn` moves an `Instance` onto its own task. That task
//! alone touches the properties: it ticks, sleeps for the driver's delay
//! and applies queued commands while it sleeps.

use super::{Instance, InstanceError, InstanceEvent};
use crate::property::PropertyChange;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const COMMAND_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, InstanceError>>;

enum Command {
    WriteValue {
        path: String,
        value: Value,
        freeze: bool,
        reply: Reply<()>,
    },
    WriteBytes {
        address: u32,
        bytes: Vec<u8>,
        reply: Reply<()>,
    },
    Unfreeze {
        path: String,
        reply: Reply<()>,
    },
    ReloadAddresses,
    Snapshot {
        reply: Reply<Vec<PropertyChange>>,
    },
}

pub struct InstanceHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<InstanceEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl InstanceHandle {
    /// Start the tick loop on a new task
    pub fn spawn(instance: Instance) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_CAPACITY);
        let events = instance.events();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(instance, rx, cancel.clone()));

        Self {
            commands,
            events,
            cancel,
            task,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InstanceEvent> {
        self.events.subscribe()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, InstanceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| InstanceError::Stopped)?;
        response.await.map_err(|_| InstanceError::Stopped)?
    }

    pub async fn write_value(&self, path: &str, value: Value, freeze: bool) -> Result<(), InstanceError> {
        let path = path.to_string();
        self.request(|reply| Command::WriteValue {
            path,
            value,
            freeze,
            reply,
        })
        .await
    }

    pub async fn write_bytes(&self, address: u32, bytes: Vec<u8>) -> Result<(), InstanceError> {
        self.request(|reply| Command::WriteBytes {
            address,
            bytes,
            reply,
        })
        .await
    }

    pub async fn unfreeze(&self, path: &str) -> Result<(), InstanceError> {
        let path = path.to_string();
        self.request(|reply| Command::Unfreeze { path, reply }).await
    }

    /// Resolve dynamic addresses again on the next tick
    pub async fn reload_addresses(&self) -> Result<(), InstanceError> {
        self.commands
            .send(Command::ReloadAddresses)
            .await
            .map_err(|_| InstanceError::Stopped)
    }

    pub async fn snapshot(&self) -> Result<Vec<PropertyChange>, InstanceError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Stop the tick loop, then disconnect the driver
    pub async fn unload(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "instance task ended abnormally");
        }
    }
}

async fn apply(instance: &mut Instance, command: Command) {
    // A dropped receiver just means the caller stopped waiting
    match command {
        Command::WriteValue {
            path,
            value,
            freeze,
            reply,
        } => {
            let _ = reply.send(instance.write_value(&path, &value, freeze).await);
        }
        Command::WriteBytes {
            address,
            bytes,
            reply,
        } => {
            let _ = reply.send(instance.write_bytes(address, &bytes).await);
        }
        Command::Unfreeze { path, reply } => {
            let _ = reply.send(instance.unfreeze(&path));
        }
        Command::ReloadAddresses => instance.reload_addresses(),
        Command::Snapshot { reply } => {
            let result = if instance.is_loaded() {
                Ok(instance.snapshot())
            } else {
                Err(InstanceError::Stopped)
            };
            let _ = reply.send(result);
        }
    }
}

async fn run(mut instance: Instance, mut commands: mpsc::Receiver<Command>, cancel: CancellationToken) {
    loop {
        // A failed tick has already logged and reset; keep answering commands until unloaded
        let delay = if instance.is_loaded() {
            let _ = instance.tick().await;
            instance.delay_between_reads()
        } else {
            None
        };

        let sleep = tokio::time::sleep(delay.unwrap_or_default());
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    shutdown(&mut instance).await;
                    return;
                }
                _ = &mut sleep, if delay.is_some() => break,
                command = commands.recv() => match command {
                    Some(command) => apply(&mut instance, command).await,
                    None => {
                        shutdown(&mut instance).await;
                        return;
                    }
                },
            }
        }
    }
}

async fn shutdown(instance: &mut Instance) {
    if let Err(e) = instance.unload().await {
        debug!(error = %e, "unload failed");
    }
    info!("instance stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::StaticDriver;
    use crate::hook::NoopHooks;
    use crate::mapper::Mapper;
    use serde_json::json;
    use std::time::Duration;

    const MAPPER: &str = r#"{
        "metadata": { "id": "red", "gameName": "Pokemon Red", "platform": "GB" },
        "memory": [ { "start": "0xD000", "length": "0x500" } ],
        "properties": [
            { "path": "player.gender", "type": "uint", "address": "0xD472", "reference": "gender" },
            { "path": "player.badges", "type": "uint", "address": "0xD356" }
        ],
        "glossary": [
            { "name": "gender", "entries": [ { "key": 0, "value": "Male" }, { "key": 1, "value": "Female" } ] }
        ]
    }"#;

    async fn spawn() -> (InstanceHandle, crate::driver::StaticImage) {
        let (handle, image, _events) = spawn_mapper(MAPPER).await;
        (handle, image)
    }

    /// Spawn `mapper`, subscribing before the first tick runs
    async fn spawn_mapper(
        mapper: &str,
    ) -> (
        InstanceHandle,
        crate::driver::StaticImage,
        broadcast::Receiver<InstanceEvent>,
    ) {
        let driver = StaticDriver::new()
            .with_region(0xD000, vec![0; 0x500])
            .with_delay(Duration::from_millis(1));
        let image = driver.image();
        let instance = Instance::load(
            Mapper::from_json_str(mapper).unwrap(),
            Box::new(driver),
            Box::new(NoopHooks::new()),
        )
        .await
        .unwrap();
        let events = instance.subscribe();
        (InstanceHandle::spawn(instance), image, events)
    }

    /// Wait for the first change batch matching `accept`
    async fn change_where(
        events: &mut broadcast::Receiver<InstanceEvent>,
        accept: impl Fn(&[PropertyChange]) -> bool,
    ) -> Vec<PropertyChange> {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("no event in time")
                .unwrap();
            if let InstanceEvent::PropertiesChanged(batch) = event {
                if accept(&batch) {
                    return batch;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_ticks_and_reports_changes() {
        let (handle, image) = spawn().await;
        let mut events = handle.subscribe();

        let first = change_where(&mut events, |_| true).await;
        assert_eq!(first.len(), 2);

        image.poke(0xD356, &[0x03]);
        let batch = change_where(&mut events, |_| true).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].path, "player.badges");
        assert_eq!(batch[0].value, json!(3));

        handle.unload().await;
        assert!(!image.is_connected());
    }

    #[tokio::test]
    async fn test_commands_between_ticks() {
        let (handle, image) = spawn().await;

        handle
            .write_value("player.gender", json!("Female"), false)
            .await
            .unwrap();
        assert_eq!(image.writes(), vec![(0xD472, vec![0x01])]);

        assert!(matches!(
            handle.write_value("player.missing", json!(1), false).await,
            Err(InstanceError::UnknownProperty(_))
        ));

        handle.write_bytes(0xD000, vec![0xAA]).await.unwrap();
        assert_eq!(image.peek(0xD000, 1), Some(vec![0xAA]));

        handle.reload_addresses().await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].path, "player.gender");

        handle.unload().await;
    }

    #[tokio::test]
    async fn test_freeze_through_handle() {
        let (handle, image) = spawn().await;
        let mut events = handle.subscribe();

        handle.write_value("player.badges", json!(8), true).await.unwrap();
        image.poke(0xD356, &[0x01]);

        tokio::time::timeout(Duration::from_secs(2), async {
            while image.peek(0xD356, 1) != Some(vec![8]) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("frozen value was never written back");

        let frozen = change_where(&mut events, |batch| {
            batch.iter().any(|c| c.path == "player.badges" && c.frozen)
        })
        .await;
        assert_eq!(frozen[0].value, json!(8));

        handle.unfreeze("player.badges").await.unwrap();
        handle.unload().await;
    }

    #[tokio::test]
    async fn test_reset_keeps_answering() {
        let (handle, image) = spawn().await;
        let mut events = handle.subscribe();

        image.clear();

        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .unwrap()
                .unwrap();
            if event == InstanceEvent::InstanceReset {
                break;
            }
        }

        assert!(matches!(handle.snapshot().await, Err(InstanceError::Stopped)));
        handle.unload().await;
    }

    #[tokio::test]
    async fn test_unusable_bits_reset_without_killing_task() {
        let mapper = MAPPER.replace(
            r#""address": "0xD356" }"#,
            r#""address": "0xD356", "bits": "0-7,0-7" }"#,
        );
        let (handle, image, mut events) = spawn_mapper(&mapper).await;

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("no event in time")
            .unwrap();
        assert_eq!(event, InstanceEvent::InstanceReset);
        assert!(!image.is_connected());

        assert!(matches!(handle.snapshot().await, Err(InstanceError::Stopped)));
        handle.unload().await;
    }
}
