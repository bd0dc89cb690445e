//! Broadcast Events
//!
//! Delivery of broadcast events to subscribed `<beitem>` elements. Every
//! delivery is queued as an async task; nothing here runs a handler.

use crate::browser::Browser;
use crate::context::WatchedModule;
use bml_events::{AsyncTask, BeventEvent, BeventType, ElementId};
use bml_resource::{parse_component_ref, ComponentId, ModuleKey, ResourcePath};

/// Wildcard for `message_id` / `message_version` beitem attributes
pub const ANY_MESSAGE: u16 = 255;

/// An event message received on a component's stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    /// 0 for immediate events; scheduled events are not delivered
    pub time_mode: u8,
    pub group_id: u16,
    /// Message id in the high byte, version in the low byte
    pub event_msg_id: u16,
    pub private_data: String,
}

impl EventMessage {
    pub fn immediate(message_id: u8, version: u8, private_data: &str) -> Self {
        Self {
            time_mode: 0,
            group_id: 0,
            event_msg_id: (u16::from(message_id) << 8) | u16::from(version),
            private_data: private_data.to_string(),
        }
    }

    pub fn message_id(&self) -> u16 {
        self.event_msg_id >> 8
    }

    pub fn message_version(&self) -> u8 {
        (self.event_msg_id & 0xff) as u8
    }
}

fn parse_filter(value: Option<&str>) -> u16 {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(ANY_MESSAGE)
}

impl Browser {
    fn queue_bevent(&mut self, event: BeventEvent, handler: &str) {
        tracing::debug!("Queue {} for {}", event.event_type.as_str(), event.target);
        self.document.queue.push_async(AsyncTask::Bevent {
            event,
            handler: handler.to_string(),
        });
    }

    /// Subscribed beitems of a type whose `module_ref` names `key`
    fn beitems_for_module(&self, event_type: BeventType, key: ModuleKey) -> Vec<(ElementId, String)> {
        let base = self.active_path();
        self.document
            .tree
            .beitems(event_type)
            .filter(|item| {
                item.attribute("module_ref")
                    .and_then(|r| ResourcePath::parse(r, base).ok())
                    .is_some_and(|path| path.key == key)
            })
            .map(|item| (item.id, item.onoccur.to_string()))
            .collect()
    }

    pub(crate) fn notify_module_locked(&mut self, reference: &str, key: ModuleKey, extended: bool, status: i32) {
        tracing::debug!("ModuleLocked {} status={} extended={}", reference, status, extended);
        for (id, handler) in self.beitems_for_module(BeventType::ModuleLocked, key) {
            let event = BeventEvent::new(BeventType::ModuleLocked, id)
                .with_status(status)
                .with_extended(extended)
                .with_module_ref(reference);
            self.queue_bevent(event, &handler);
        }
    }

    /// Queue DataButtonPressed for every subscribed beitem
    pub(crate) fn raise_data_button(&mut self) -> usize {
        let items: Vec<(ElementId, String)> = self
            .document
            .tree
            .beitems(BeventType::DataButtonPressed)
            .map(|item| (item.id, item.onoccur.to_string()))
            .collect();
        for (id, handler) in &items {
            self.queue_bevent(BeventEvent::new(BeventType::DataButtonPressed, *id), handler);
        }
        items.len()
    }

    /// Compare every watched module against the download announcement.
    ///
    /// Status 2 means announced, 1 absent and 0 a version change while
    /// announced. Each beitem is notified once per observed change,
    /// including its first observation.
    pub(crate) fn watch_modules(&mut self) {
        let base = self.active_path();
        let watched: Vec<(ElementId, String, String, ModuleKey)> = self
            .document
            .tree
            .beitems(BeventType::ModuleUpdated)
            .filter_map(|item| {
                let module_ref = item.attribute("module_ref")?;
                let path = ResourcePath::parse(module_ref, base).ok()?;
                Some((item.id, module_ref.to_string(), item.onoccur.to_string(), path.key))
            })
            .collect();

        for (id, module_ref, handler, key) in watched {
            let version = self.registry().announced_version(key);
            let previous = self.document.watched_modules.get(&id).copied();
            let status = match (version, previous) {
                (None, _) => 1,
                (Some(v), Some(prev)) if prev.status == 2 && prev.version != Some(v) => 0,
                (Some(_), _) => 2,
            };
            let changed = previous.is_none_or(|prev| status == 0 || prev.status != status);
            self.document.watched_modules.insert(
                id,
                WatchedModule {
                    status: if status == 0 { 2 } else { status },
                    version,
                },
            );
            if changed {
                let event = BeventEvent::new(BeventType::ModuleUpdated, id)
                    .with_status(status)
                    .with_module_ref(&module_ref);
                self.queue_bevent(event, &handler);
            }
        }
    }

    /// Deliver event messages received on `component`
    pub(crate) fn deliver_event_messages(&mut self, component: ComponentId, messages: &[EventMessage]) -> usize {
        let Some(active) = self.active_path() else {
            return 0;
        };
        let active_component = active.key.component;

        let subscribers: Vec<(ElementId, ComponentId, u16, u16, String)> = self
            .document
            .tree
            .beitems(BeventType::EventMessageFired)
            .map(|item| {
                let target = item
                    .attribute("es_ref")
                    .and_then(|r| parse_component_ref(r, Some(active)).ok())
                    .unwrap_or(active_component);
                (
                    item.id,
                    target,
                    parse_filter(item.attribute("message_id")),
                    parse_filter(item.attribute("message_version")),
                    item.onoccur.to_string(),
                )
            })
            .collect();

        let mut delivered = 0;
        for (id, target, id_filter, version_filter, handler) in subscribers {
            if target != component {
                continue;
            }
            for message in messages.iter().filter(|m| m.time_mode == 0) {
                let message_id = message.message_id();
                let version = message.message_version();
                if id_filter != ANY_MESSAGE && id_filter != message_id {
                    continue;
                }
                if version_filter != ANY_MESSAGE && version_filter != u16::from(version) {
                    continue;
                }
                if self.document.message_versions.get(&id) == Some(&version) {
                    continue;
                }
                self.document.message_versions.insert(id, version);

                let mut event = BeventEvent::new(BeventType::EventMessageFired, id);
                event.es_ref = format!("/{}", target);
                event.message_id = message_id;
                event.message_version = u16::from(version);
                event.message_group_id = message.group_id;
                event.private_data = message.private_data.clone();
                self.queue_bevent(event, &handler);
                delivered += 1;
            }
        }
        delivered
    }
}
