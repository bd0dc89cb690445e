//! Document Runtime
//!
//! Owns the interpreter, the renderer and the [`Browser`] state, and runs
//! the document lifecycle: launch, swap, event queue drain and timers.
//!
//! All entry points take `&mut self`, so a swap or a drain can never be
//! re-entered. A handler that launches a document only records the
//! request; the runtime performs the swap after the handler has unwound.

use crate::bevent::EventMessage;
use crate::browser::{Browser, PendingLaunch, ProgramInfo};
use crate::config::RuntimeConfig;
use crate::context::TimerAction;
use crate::document::{DocumentTree, ScriptBlock};
use crate::interpreter::{Interpreter, ScriptError};
use crate::persistent::PersistentStore;
use crate::render::{Renderer, StatusSink};
use bml_events::{AsyncTask, CurrentEvent, Flow, IntrinsicEvent, IntrinsicEventType, QueuedEvent};
use bml_nav::{AribKey, KeyDispatch};
use bml_resource::{
    CachedModule, ComponentId, FetchError, FetchRequest, ModuleId, ModuleKey, ResourcePath, Waiter,
};
use std::time::Duration;

/// The receiver-side document runtime
pub struct DocumentRuntime<I: Interpreter, R: Renderer> {
    interpreter: I,
    renderer: R,
    browser: Browser,
}

impl<I: Interpreter, R: Renderer> DocumentRuntime<I, R> {
    pub fn new(
        config: RuntimeConfig,
        interpreter: I,
        renderer: R,
        store: Box<dyn PersistentStore>,
        status: Box<dyn StatusSink>,
    ) -> Self {
        Self {
            interpreter,
            renderer,
            browser: Browser::new(config, store, status),
        }
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    pub fn browser_mut(&mut self) -> &mut Browser {
        &mut self.browser
    }

    pub fn interpreter(&self) -> &I {
        &self.interpreter
    }

    pub fn interpreter_mut(&mut self) -> &mut I {
        &mut self.interpreter
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Normalized path of the active document
    pub fn active_document(&self) -> Option<String> {
        self.browser.document().path_string()
    }

    // === Broadcast state ===

    pub fn set_program_map(&mut self, components: impl IntoIterator<Item = ComponentId>) {
        self.browser.registry_mut().set_program_map(components);
    }

    pub fn update_download_info(&mut self, component: ComponentId, modules: impl IntoIterator<Item = (ModuleId, u8)>) {
        self.browser.registry_mut().update_download_info(component, modules);
    }

    pub fn set_program_info(&mut self, program: ProgramInfo) {
        self.browser.set_program_info(program);
    }

    /// Module fetches the host should perform
    pub fn take_fetch_requests(&mut self) -> Vec<FetchRequest> {
        self.browser.registry_mut().take_fetch_requests()
    }

    // === Entry points ===

    /// Launch a document from the host. Returns the script-facing sentinel.
    pub async fn launch_document(&mut self, target: &str) -> f64 {
        let result = self.browser.launch_document(target);
        self.settle().await;
        result
    }

    /// Complete a module fetch, waking lock requests and pending launches
    pub async fn on_module_fetched(&mut self, key: ModuleKey, result: Result<CachedModule, FetchError>) {
        let waiters = self.browser.registry_mut().complete_fetch(key, result);
        let (locks, documents): (Vec<Waiter>, Vec<Waiter>) =
            waiters.into_iter().partition(|w| matches!(w, Waiter::Lock { .. }));

        for waiter in locks {
            if let Waiter::Lock { reference, kind } = waiter {
                self.browser.complete_lock(&reference, key, kind);
            }
        }

        // the latest launch supersedes earlier ones
        if let Some(Waiter::Document { target }) = documents.into_iter().last() {
            if self.browser.registry().is_cached(key) {
                let _ = self.browser.launch_document(&target);
                self.settle().await;
            } else {
                tracing::warn!("Dropping launch of {}: module {} unavailable", target, key);
            }
        }

        self.process_queue().await;
    }

    /// Route a key press through focus navigation into the event queue
    pub async fn key_down(&mut self, key: AribKey) -> KeyDispatch {
        let document = &mut self.browser.document;
        let dispatch = bml_nav::key_down(key, &mut document.focus, &document.tree, &mut document.queue);
        if dispatch == KeyDispatch::DataButton {
            self.browser.raise_data_button();
        }
        self.process_queue().await;
        dispatch
    }

    pub async fn key_up(&mut self, key: AribKey) -> KeyDispatch {
        let document = &mut self.browser.document;
        let dispatch = bml_nav::key_up(key, &document.focus, &document.tree, &mut document.queue);
        self.process_queue().await;
        dispatch
    }

    /// Advance document timers and run whatever became due
    pub async fn tick(&mut self, delta: Duration) {
        let fired = self.browser.document.timers.advance(delta);
        for (id, action) in fired {
            match action {
                TimerAction::Script(source) => {
                    tracing::trace!("Timer {} fired", id);
                    self.browser.document.queue.push_async(AsyncTask::Script { source });
                }
                TimerAction::ModuleWatch => self.browser.watch_modules(),
            }
        }
        self.process_queue().await;
    }

    /// Deliver event messages received on a component's stream
    pub async fn on_event_messages(&mut self, component: ComponentId, messages: &[EventMessage]) {
        self.browser.deliver_event_messages(component, messages);
        self.process_queue().await;
    }

    // === Lifecycle ===

    /// Drain the queue, then perform any transition it requested
    async fn process_queue(&mut self) {
        if self.drain().await.is_exit() {
            self.settle().await;
        }
    }

    /// Perform requested transitions until none is pending
    async fn settle(&mut self) {
        while let Some(launch) = self.browser.take_transition() {
            let path = launch.path.to_string();
            if self.swap(launch).await.is_exit() {
                tracing::debug!("Swap to {} stopped early", path);
            }
        }
    }

    /// Replace the active document
    async fn swap(&mut self, launch: PendingLaunch) -> Flow {
        let PendingLaunch { path, source } = launch;

        // unload the outgoing document
        self.interpreter.reset_stack();
        if let Some(onunload) = self.browser.document.tree.body_handler("onunload").map(str::to_string) {
            self.browser.in_unload = true;
            let flow = self.run_handler(&onunload).await;
            self.browser.in_unload = false;
            self.browser.discard_transition();
            if flow.is_exit() {
                tracing::error!("onunload requested exit; keeping {:?}", self.active_document());
                self.browser.release_launch_pin(path.key);
                return Flow::Exit;
            }
        }

        // fresh context
        tracing::info!("Swapping to {}", path);
        self.browser.record_transition(&path);
        self.interpreter.reset();
        self.browser.begin_document(path.clone());

        // hold the queue across the frame boundary
        self.browser.document.queue.lock();
        self.renderer.present();
        smol::future::yield_now().await;

        // install the new tree
        let mut tree = match self.renderer.transpile(&source, &path) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::error!("{}", e);
                DocumentTree::new()
            }
        };
        self.renderer.post_process(&mut tree);
        self.browser.document.tree = tree;

        // focus, scripts and onload under a second lock
        self.browser.document.queue.lock();
        let flow = self.run_document_scripts(&path).await;

        // always release both locks
        self.browser.document.queue.unlock();
        self.browser.document.queue.unlock();
        if flow.is_exit() || self.drain().await.is_exit() {
            return Flow::Exit;
        }

        // watch subscribed modules
        let interval = self.browser.config().module_watch_interval();
        self.browser.document.timers.schedule(TimerAction::ModuleWatch, interval, 0);
        self.browser.publish_active_status();
        Flow::Continue
    }

    async fn run_document_scripts(&mut self, path: &ResourcePath) -> Flow {
        let document = &mut self.browser.document;
        bml_nav::focus_initial(&mut document.focus, &document.tree, &mut document.queue);

        let mut inline_count = 0;
        for block in self.browser.document.tree.scripts() {
            let (source, label) = match block {
                ScriptBlock::External(src) => {
                    let resource = ResourcePath::parse(&src, Some(path))
                        .ok()
                        .and_then(|p| self.browser.registry_mut().fetch_locked(&p).map(<[u8]>::to_vec));
                    let Some(bytes) = resource else {
                        tracing::warn!("Script {} is not available", src);
                        continue;
                    };
                    (String::from_utf8_lossy(&bytes).into_owned(), src)
                }
                ScriptBlock::Inline(text) => {
                    inline_count += 1;
                    (text, format!("{}[{}]", path, inline_count))
                }
            };

            let result = self.interpreter.add_script(&mut self.browser, &source, &label).await;
            if self.check_flow(result).is_exit() {
                return Flow::Exit;
            }
        }

        match self.browser.document.tree.body_handler("onload").map(str::to_string) {
            Some(onload) => self.run_handler(&onload).await,
            None => Flow::Continue,
        }
    }

    // === Event queue ===

    /// Run queued events in order while the queue is unlocked
    async fn drain(&mut self) -> Flow {
        while let Some(event) = self.browser.document.queue.pop_ready() {
            if self.dispatch(event).await.is_exit() {
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    async fn dispatch(&mut self, event: QueuedEvent) -> Flow {
        match event {
            QueuedEvent::Async(AsyncTask::Key { event, handler, activate }) => {
                if let Some(handler) = handler {
                    self.browser.current_event = Some(CurrentEvent::Intrinsic(event.clone()));
                    let flow = self.run_locked(&handler).await;
                    self.browser.current_event = None;
                    if flow.is_exit() {
                        return Flow::Exit;
                    }
                }
                if activate {
                    self.browser
                        .document
                        .queue
                        .push_sync(IntrinsicEvent::new(IntrinsicEventType::Click, event.target));
                }
                Flow::Continue
            }
            QueuedEvent::Async(AsyncTask::Script { source }) => self.run_handler(&source).await,
            QueuedEvent::Async(AsyncTask::Bevent { event, handler }) => {
                self.browser.current_event = Some(CurrentEvent::Bevent(event));
                let flow = self.run_handler(&handler).await;
                self.browser.current_event = None;
                flow
            }
            QueuedEvent::Sync(event) => {
                let handler = self
                    .browser
                    .document
                    .tree
                    .get(event.target)
                    .and_then(|e| e.handler(event.event_type.handler_attribute()))
                    .map(str::to_string);
                let Some(handler) = handler else {
                    return Flow::Continue;
                };
                self.browser.current_event = Some(CurrentEvent::Intrinsic(event));
                let flow = self.run_locked(&handler).await;
                self.browser.current_event = None;
                flow
            }
        }
    }

    /// Run a handler with the queue locked, releasing the lock on exit too
    async fn run_locked(&mut self, source: &str) -> Flow {
        self.browser.document.queue.lock();
        let flow = self.run_handler(source).await;
        self.browser.document.queue.unlock();
        flow
    }

    async fn run_handler(&mut self, source: &str) -> Flow {
        let result = self.interpreter.execute_handler(&mut self.browser, source).await;
        self.check_flow(result)
    }

    /// Script errors are reported and do not stop the sequence
    fn check_flow(&self, result: Result<Flow, ScriptError>) -> Flow {
        let flow = match result {
            Ok(flow) => flow,
            Err(e) => {
                tracing::warn!("Script error: {}", e);
                Flow::Continue
            }
        };
        if flow.is_exit() || self.browser.transition_pending() {
            Flow::Exit
        } else {
            Flow::Continue
        }
    }
}
