use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
#[cfg(test)]
use tempfile::NamedTempFile;
use tracing::warn;

use crate::model::store::WindowStore;
use crate::model::window::{
    GroupId, StackId, TransientTarget, WindowHints, WindowKind, WindowRecord, WorkspaceId,
};
use crate::stacking::Stack;
use crate::sys::server::StackWriter;

/// One mutation of the stacking engine, as captured in a trace file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEvent {
    Add(WindowRecord),
    Remove(StackId),
    Raise(StackId),
    Lower(StackId),
    SetHidden { window: StackId, hidden: bool },
    SetHints { window: StackId, hints: WindowHints },
    SetKind { window: StackId, kind: WindowKind },
    SetTransient { window: StackId, target: TransientTarget },
    SetGroup { window: StackId, group: Option<GroupId> },
    SetWorkspace { window: StackId, workspace: Option<WorkspaceId> },
    SetExpectedFocus(Option<StackId>),
    SetStackPosition { window: StackId, position: usize },
    Freeze,
    Thaw,
    Sync,
}

/// Writes engine events to a trace file, one RON line per event.
pub struct Recorder {
    file: Option<File>,
    #[cfg(test)]
    temp: Option<NamedTempFile>,
}

impl Recorder {
    pub fn new(path: Option<&Path>) -> anyhow::Result<Self> {
        Ok(Self {
            file: path.map(File::create).transpose()?,
            #[cfg(test)]
            temp: None,
        })
    }

    #[cfg(test)]
    pub fn new_for_test(temp: NamedTempFile) -> Self {
        Self { file: None, temp: Some(temp) }
    }

    fn file(&mut self) -> Option<&mut File> {
        #[cfg(test)]
        return self.file.as_mut().or(self.temp.as_mut().map(|temp| temp.as_file_mut()));
        #[cfg(not(test))]
        self.file.as_mut()
    }

    pub fn on_event(&mut self, event: &TraceEvent) {
        let Some(file) = self.file() else { return };
        match ron::ser::to_string(event) {
            Ok(line) => {
                if let Err(err) = writeln!(file, "{line}") {
                    warn!(%err, "failed to record event");
                }
            }
            Err(err) => warn!(%err, "failed to serialize event"),
        }
    }
}

/// Drives a recorded trace through the engine, dispatching each event the
/// way the window management layer would. Returns the number of events
/// applied.
pub fn replay(
    path: &Path,
    store: &mut WindowStore,
    stack: &mut Stack,
    server: &mut dyn StackWriter,
) -> anyhow::Result<usize> {
    let file = BufReader::new(File::open(path)?);
    let mut count = 0;
    for line in file.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: TraceEvent = ron::de::from_str(&line)?;
        apply_event(store, stack, server, event);
        count += 1;
    }
    Ok(count)
}

/// Applies a single event to the engine.
pub fn apply_event(
    store: &mut WindowStore,
    stack: &mut Stack,
    server: &mut dyn StackWriter,
    event: TraceEvent,
) {
    match event {
        TraceEvent::Add(record) => {
            let id = record.id;
            let key = store.insert(record);
            server.window_created(id);
            stack.add(store, server, key);
        }
        TraceEvent::Remove(id) => {
            let Some(key) = store.key_of(id) else {
                warn!(window = %id, "remove for an unknown window");
                return;
            };
            stack.remove(store, server, key);
            store.remove(key);
            server.window_destroyed(id);
        }
        TraceEvent::Raise(id) => {
            let Some(key) = store.key_of(id) else {
                warn!(window = %id, "raise for an unknown window");
                return;
            };
            stack.raise(store, server, key);
        }
        TraceEvent::Lower(id) => {
            let Some(key) = store.key_of(id) else {
                warn!(window = %id, "lower for an unknown window");
                return;
            };
            stack.lower(store, server, key);
        }
        TraceEvent::SetHidden { window, hidden } => {
            let Some(key) = store.key_of(window) else {
                warn!(window = %window, "state change for an unknown window");
                return;
            };
            store[key].hidden = hidden;
            stack.mark_layer_dirty(store, server);
        }
        TraceEvent::SetHints { window, hints } => {
            let Some(key) = store.key_of(window) else {
                warn!(window = %window, "state change for an unknown window");
                return;
            };
            store[key].hints = hints;
            stack.mark_layer_dirty(store, server);
        }
        TraceEvent::SetKind { window, kind } => {
            let Some(key) = store.key_of(window) else {
                warn!(window = %window, "state change for an unknown window");
                return;
            };
            store[key].kind = kind;
            stack.freeze();
            stack.mark_layer_dirty(store, server);
            stack.mark_transient_dirty(store, server);
            stack.thaw(store, server);
        }
        TraceEvent::SetTransient { window, target } => {
            let Some(key) = store.key_of(window) else {
                warn!(window = %window, "state change for an unknown window");
                return;
            };
            store[key].transient = target;
            stack.freeze();
            stack.mark_layer_dirty(store, server);
            stack.mark_transient_dirty(store, server);
            stack.thaw(store, server);
        }
        TraceEvent::SetGroup { window, group } => {
            let Some(key) = store.key_of(window) else {
                warn!(window = %window, "state change for an unknown window");
                return;
            };
            store.set_group(key, group);
            stack.freeze();
            stack.mark_layer_dirty(store, server);
            stack.mark_transient_dirty(store, server);
            stack.thaw(store, server);
        }
        TraceEvent::SetWorkspace { window, workspace } => {
            let Some(key) = store.key_of(window) else {
                warn!(window = %window, "state change for an unknown window");
                return;
            };
            store[key].workspace = workspace;
        }
        TraceEvent::SetExpectedFocus(id) => {
            let key = id.and_then(|id| store.key_of(id));
            stack.set_expected_focus(store, server, key);
        }
        TraceEvent::SetStackPosition { window, position } => {
            let Some(key) = store.key_of(window) else {
                warn!(window = %window, "reposition for an unknown window");
                return;
            };
            stack.set_stack_position(store, server, key, position);
        }
        TraceEvent::Freeze => stack.freeze(),
        TraceEvent::Thaw => stack.thaw(store, server),
        TraceEvent::Sync => stack.sync(store, server),
    }
}
