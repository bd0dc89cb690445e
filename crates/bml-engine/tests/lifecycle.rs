//! Document lifecycle integration tests

use bml_engine::bml_events::ElementId;
use bml_engine::bml_nav::{AribKey, KeyDispatch, KeyIgnored};
use bml_engine::bml_resource::{CachedModule, ComponentId, FetchError, ModuleId, ModuleKey, ResourcePath};
use bml_engine::{
    DocumentRuntime, DocumentTree, Element, LogStatus, MemoryStore, ProgramInfo, RenderError, Renderer,
    RuntimeConfig, StubInterpreter,
};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

// ============================================================================
// Harness
// ============================================================================

#[derive(Default)]
struct TestRenderer {
    documents: HashMap<String, DocumentTree>,
    presented: usize,
}

impl Renderer for TestRenderer {
    fn transpile(&mut self, _source: &[u8], path: &ResourcePath) -> Result<DocumentTree, RenderError> {
        self.documents.get(&path.to_string()).cloned().ok_or_else(|| RenderError::Parse {
            path: path.to_string(),
            message: "unknown document".to_string(),
        })
    }

    fn present(&mut self) {
        self.presented += 1;
    }
}

type Runtime = DocumentRuntime<StubInterpreter, TestRenderer>;

/// Builds a runtime whose carousel carries `documents`. Modules listed in
/// `uncached` are announced but not downloaded yet.
fn runtime_with(config: RuntimeConfig, documents: Vec<(&str, DocumentTree)>, uncached: &[ModuleKey]) -> Runtime {
    let mut renderer = TestRenderer::default();
    let mut modules: BTreeMap<ModuleKey, CachedModule> = BTreeMap::new();
    for (path, tree) in documents {
        let path = ResourcePath::parse(path, None).unwrap();
        let name = path.filename.clone().unwrap();
        modules
            .entry(path.key)
            .or_insert_with(|| CachedModule::new(1))
            .resources
            .insert(name, b"<bml/>".to_vec());
        renderer.documents.insert(path.to_string(), tree);
    }

    let mut runtime = DocumentRuntime::new(
        config,
        StubInterpreter::new(),
        renderer,
        Box::new(MemoryStore::new()),
        Box::new(LogStatus),
    );

    let components: Vec<ComponentId> = modules.keys().map(|k| k.component).collect();
    runtime.set_program_map(components.iter().copied());
    for component in &components {
        let announced = modules
            .keys()
            .filter(|k| k.component == *component)
            .map(|k| (k.module, 1u8));
        runtime.update_download_info(*component, announced);
    }
    for (key, module) in modules {
        if !uncached.contains(&key) {
            runtime.browser_mut().registry_mut().insert(key, module);
        }
    }
    runtime
}

fn runtime(documents: Vec<(&str, DocumentTree)>) -> Runtime {
    runtime_with(RuntimeConfig::default(), documents, &[])
}

fn doc(elements: Vec<Element>) -> DocumentTree {
    let mut tree = DocumentTree::new();
    for element in elements {
        tree.push(element);
    }
    tree
}

fn body(onload: &str) -> Element {
    Element::new("body").with_attribute("onload", onload)
}

fn focusable(style: &str) -> Element {
    Element::new("p").with_attribute("style", style)
}

fn beitem(event_type: &str, module_ref: &str, onoccur: &str) -> Element {
    Element::new("beitem")
        .with_attribute("type", event_type)
        .with_attribute("subscribe", "subscribe")
        .with_attribute("module_ref", module_ref)
        .with_attribute("onoccur", onoccur)
}

fn log(runtime: &Runtime) -> Vec<String> {
    runtime.interpreter().log().to_vec()
}

// ============================================================================
// Launch
// ============================================================================

#[test]
fn test_launch_absent_component() {
    smol::block_on(async {
        let mut runtime = runtime(vec![("/40/0000/startup.bml", doc(vec![body("log('a')")]))]);

        let result = runtime.launch_document("/a1/0002/doc.bml").await;
        assert!(result.is_nan());
        assert_eq!(runtime.active_document(), None);
        assert!(runtime.take_fetch_requests().is_empty());
        assert!(runtime.browser().status_text().starts_with("Loading /a1/0002/doc.bml"));
    });
}

#[test]
fn test_launch_malformed_reference() {
    smol::block_on(async {
        let mut runtime = runtime(vec![("/40/0000/startup.bml", doc(vec![body("log('a')")]))]);
        assert!(runtime.launch_document("/4g/0000/startup.bml").await.is_nan());
        assert_eq!(runtime.active_document(), None);
        assert_eq!(runtime.browser().status_text(), "");
        assert!(runtime.browser().registry().locked_modules().is_empty());
    });
}

#[test]
fn test_launch_uncached_fetches_once() {
    smol::block_on(async {
        let key = ModuleKey::new(0xa1, 2);
        let mut runtime = runtime_with(
            RuntimeConfig::default(),
            vec![("/a1/0002/doc.bml", doc(vec![body("log('loaded')")]))],
            &[key],
        );
        runtime.set_program_info(ProgramInfo {
            event_name: "Evening News".to_string(),
            ..Default::default()
        });

        assert!(runtime.launch_document("/a1/0002/doc.bml").await.is_nan());
        assert!(runtime.launch_document("/a1/0002/doc.bml").await.is_nan());
        assert_eq!(runtime.active_document(), None);

        let requests = runtime.take_fetch_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].key, key);

        let module = CachedModule::new(1).with_resource("doc.bml", b"<bml/>".to_vec());
        runtime.on_module_fetched(key, Ok(module)).await;

        assert_eq!(runtime.active_document().as_deref(), Some("/a1/0002/doc.bml"));
        assert_eq!(log(&runtime), vec!["loaded"]);
        assert_eq!(runtime.browser().status_text(), "/a1/0002/doc.bml\nEvening News");
        assert_eq!(runtime.browser().history().count(), 1);
        assert!(runtime.browser().registry().is_pinned(key));
        assert!(!runtime.browser().registry().is_locked(key));
    });
}

#[test]
fn test_launch_waits_for_announcement() {
    smol::block_on(async {
        let late = ModuleKey::new(0x40, 5);
        let mut runtime = runtime_with(
            RuntimeConfig::default(),
            vec![
                ("/40/0000/startup.bml", doc(vec![body("log('startup')")])),
                ("/40/0005/late.bml", doc(vec![body("log('late')")])),
            ],
            &[late],
        );
        runtime.update_download_info(ComponentId(0x40), [(ModuleId(0), 1)]);

        runtime.launch_document("/40/0005/late.bml").await;
        assert_eq!(runtime.active_document(), None);
        assert!(runtime.take_fetch_requests().is_empty());

        runtime.update_download_info(ComponentId(0x40), [(ModuleId(0), 1), (ModuleId(5), 1)]);
        let requests = runtime.take_fetch_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].key, late);

        let module = CachedModule::new(1).with_resource("late.bml", b"<bml/>".to_vec());
        runtime.on_module_fetched(late, Ok(module)).await;
        assert_eq!(runtime.active_document().as_deref(), Some("/40/0005/late.bml"));
        assert_eq!(log(&runtime), vec!["late"]);
    });
}

#[test]
fn test_failed_fetch_drops_launch() {
    smol::block_on(async {
        let key = ModuleKey::new(0xa1, 2);
        let mut runtime = runtime_with(
            RuntimeConfig::default(),
            vec![("/a1/0002/doc.bml", doc(vec![body("log('loaded')")]))],
            &[key],
        );
        runtime.launch_document("/a1/0002/doc.bml").await;
        runtime.on_module_fetched(key, Err(FetchError::NotFound(key))).await;
        assert_eq!(runtime.active_document(), None);
        assert!(log(&runtime).is_empty());
    });
}

// ============================================================================
// Swap
// ============================================================================

#[test]
fn test_swap_runs_scripts_in_order() {
    smol::block_on(async {
        let mut runtime = runtime(vec![(
            "/40/0000/startup.bml",
            doc(vec![
                body("log('onload')"),
                Element::new("script").with_text("log('inline 1')"),
                Element::new("script").with_attribute("src", "lib.js"),
                Element::new("script").with_text("log('inline 2')"),
            ]),
        )]);
        runtime
            .browser_mut()
            .registry_mut()
            .insert(
                ModuleKey::new(0x40, 0),
                CachedModule::new(1)
                    .with_resource("startup.bml", b"<bml/>".to_vec())
                    .with_resource("lib.js", b"log('external')".to_vec()),
            );

        runtime.launch_document("/40/0000/startup.bml").await;
        assert_eq!(log(&runtime), vec!["inline 1", "external", "inline 2", "onload"]);
        assert_eq!(runtime.renderer().presented, 1);
        assert_eq!(runtime.browser().document().queue.depth(), 0);
    });
}

#[test]
fn test_onload_exit_skips_drain() {
    smol::block_on(async {
        let mut runtime = runtime(vec![(
            "/40/0000/startup.bml",
            doc(vec![
                body("log('onload'); exit()"),
                focusable("nav-index: 0").with_attribute("onfocus", "log('focus')"),
            ]),
        )]);

        runtime.launch_document("/40/0000/startup.bml").await;
        assert_eq!(log(&runtime), vec!["onload"]);
        let document = runtime.browser().document();
        assert_eq!(document.queue.depth(), 0);
        assert_eq!(document.queue.len(), 1);
    });
}

#[test]
fn test_script_exit_stops_remaining_blocks() {
    smol::block_on(async {
        let mut runtime = runtime(vec![(
            "/40/0000/startup.bml",
            doc(vec![
                body("log('onload')"),
                Element::new("script").with_text("log('first'); exit()"),
                Element::new("script").with_text("log('second')"),
            ]),
        )]);

        runtime.launch_document("/40/0000/startup.bml").await;
        assert_eq!(log(&runtime), vec!["first"]);
        assert_eq!(runtime.browser().document().queue.depth(), 0);
    });
}

#[test]
fn test_focus_events_drain_after_onload() {
    smol::block_on(async {
        let mut runtime = runtime(vec![(
            "/40/0000/startup.bml",
            doc(vec![
                body("log('onload')"),
                focusable("nav-index: 0").with_attribute("onfocus", "log('focus')"),
            ]),
        )]);

        runtime.launch_document("/40/0000/startup.bml").await;
        assert_eq!(log(&runtime), vec!["onload", "focus"]);
        assert!(runtime.browser().document().queue.is_empty());
    });
}

#[test]
fn test_transition_from_handler() {
    smol::block_on(async {
        let mut runtime = runtime(vec![
            (
                "/40/0000/startup.bml",
                doc(vec![
                    Element::new("body")
                        .with_attribute("onunload", "log('unload'); launchDocument('/40/0000/other.bml')"),
                    focusable("nav-index: 0")
                        .with_attribute("onkeydown", "launchDocument('menu.bml'); log('after')"),
                ]),
            ),
            ("/40/0000/menu.bml", doc(vec![body("log('menu')")])),
        ]);

        runtime.launch_document("/40/0000/startup.bml").await;
        runtime.key_down(AribKey::Enter).await;

        assert_eq!(runtime.active_document().as_deref(), Some("/40/0000/menu.bml"));
        assert_eq!(log(&runtime), vec!["unload", "menu"]);
        let calls = runtime.interpreter().calls();
        assert!(calls.iter().any(|(name, result)| name == "launchDocument" && result.is_nan()));

        let history: Vec<_> = runtime.browser().history().map(|t| t.to.clone()).collect();
        assert_eq!(history, vec!["/40/0000/startup.bml", "/40/0000/menu.bml"]);
    });
}

#[test]
fn test_unload_exit_keeps_document() {
    smol::block_on(async {
        let mut runtime = runtime(vec![
            ("/40/0000/startup.bml", doc(vec![Element::new("body").with_attribute("onunload", "exit()")])),
            ("/40/0000/menu.bml", doc(vec![body("log('menu')")])),
        ]);

        runtime.launch_document("/40/0000/startup.bml").await;
        runtime.launch_document("/40/0000/menu.bml").await;
        assert_eq!(runtime.active_document().as_deref(), Some("/40/0000/startup.bml"));
        assert!(log(&runtime).is_empty());
    });
}

#[test]
fn test_unload_exit_releases_target_module() {
    smol::block_on(async {
        let mut runtime = runtime(vec![
            ("/40/0000/startup.bml", doc(vec![Element::new("body").with_attribute("onunload", "exit()")])),
            ("/40/0001/menu.bml", doc(vec![body("log('menu')")])),
        ]);

        runtime.launch_document("/40/0000/startup.bml").await;
        runtime.launch_document("/40/0001/menu.bml").await;
        assert_eq!(runtime.active_document().as_deref(), Some("/40/0000/startup.bml"));

        let registry = runtime.browser().registry();
        assert!(registry.locked_modules().is_empty());
        assert!(!registry.is_pinned(ModuleKey::new(0x40, 1)));
        assert!(registry.is_pinned(ModuleKey::new(0x40, 0)));
        assert!(runtime.browser().get_locked_module_info().is_empty());
    });
}

// ============================================================================
// Keys
// ============================================================================

fn navigation_document() -> DocumentTree {
    doc(vec![
        body(""),
        focusable("nav-index: 0; nav-down: 1")
            .with_attribute("onkeydown", "logEvent()")
            .with_attribute("onblur", "log('blur 0')"),
        focusable("nav-index: 1; nav-down: 2; visibility: hidden"),
        focusable("nav-index: 2; used-key-list: numeric-tuning")
            .with_attribute("onfocus", "log('focus 2')")
            .with_attribute("onkeydown", "logEvent()")
            .with_attribute("onkeyup", "log('up')"),
    ])
}

#[test]
fn test_navigation_skips_hidden() {
    smol::block_on(async {
        let mut runtime = runtime(vec![("/40/0000/startup.bml", navigation_document())]);
        runtime.launch_document("/40/0000/startup.bml").await;

        let dispatch = runtime.key_down(AribKey::Down).await;
        assert_eq!(dispatch, KeyDispatch::Delivered { focus_moved: true, queued: true });
        assert_eq!(runtime.browser().document().focus.focused(), Some(ElementId(3)));
        assert_eq!(log(&runtime), vec!["blur 0", "focus 2", "keydown:2"]);

        // the new target only accepts numeric keys
        assert_eq!(runtime.key_down(AribKey::Down).await, KeyDispatch::Ignored(KeyIgnored::Filtered));
        runtime.key_down(AribKey::Digit3).await;
        runtime.key_up(AribKey::Digit3).await;
        assert_eq!(log(&runtime), vec!["blur 0", "focus 2", "keydown:2", "keydown:8", "up"]);
    });
}

#[test]
fn test_numeric_key_filtered_by_default() {
    smol::block_on(async {
        let mut runtime = runtime(vec![("/40/0000/startup.bml", navigation_document())]);
        runtime.launch_document("/40/0000/startup.bml").await;

        let dispatch = runtime.key_down(AribKey::Digit1).await;
        assert_eq!(dispatch, KeyDispatch::Ignored(KeyIgnored::Filtered));
        assert!(log(&runtime).is_empty());
    });
}

#[test]
fn test_enter_runs_keydown_then_click() {
    smol::block_on(async {
        let mut runtime = runtime(vec![(
            "/40/0000/startup.bml",
            doc(vec![
                body(""),
                focusable("nav-index: 0")
                    .with_attribute("onkeydown", "logEvent()")
                    .with_attribute("onclick", "log('click'); logEvent()"),
            ]),
        )]);
        runtime.launch_document("/40/0000/startup.bml").await;

        runtime.key_down(AribKey::Enter).await;
        assert_eq!(log(&runtime), vec!["keydown:18", "click", "click:0"]);
        assert!(runtime.browser().current_event().is_none());
    });
}

#[test]
fn test_data_button_pressed() {
    smol::block_on(async {
        let mut runtime = runtime(vec![(
            "/40/0000/startup.bml",
            doc(vec![body(""), beitem("DataButtonPressed", "", "logEvent()")]),
        )]);
        runtime.launch_document("/40/0000/startup.bml").await;

        assert_eq!(runtime.key_down(AribKey::DataButton).await, KeyDispatch::DataButton);
        assert_eq!(log(&runtime), vec!["DataButtonPressed:0"]);
    });
}

// ============================================================================
// Modules
// ============================================================================

#[test]
fn test_extended_lock_on_unannounced_module() {
    smol::block_on(async {
        let mut runtime = runtime(vec![(
            "/0f/0000/startup.bml",
            doc(vec![
                body("lockModuleOnMemoryEx('/0f/0001')"),
                beitem("ModuleLocked", "/0f/0001", "logEvent()"),
            ]),
        )]);
        runtime.launch_document("/0f/0000/startup.bml").await;

        assert_eq!(runtime.interpreter().calls(), &[("lockModuleOnMemoryEx".to_string(), 1.0)]);
        assert_eq!(log(&runtime), vec!["ModuleLocked:-2:ex"]);
    });
}

#[test]
fn test_lock_own_module() {
    smol::block_on(async {
        let mut runtime = runtime(vec![(
            "/40/0000/startup.bml",
            doc(vec![
                body("lockModuleOnMemory('/40/0000')"),
                beitem("ModuleLocked", "/40/0000", "logEvent()"),
            ]),
        )]);
        runtime.launch_document("/40/0000/startup.bml").await;

        assert_eq!(log(&runtime), vec!["ModuleLocked:0"]);
        let info = runtime.browser().get_locked_module_info();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].module, "/40/0000");
        assert_eq!(info[0].kind, 1);

        // releasing the script lock keeps the document readable
        assert_eq!(runtime.browser_mut().unlock_all_modules_on_memory(), 1.0);
        let key = ModuleKey::new(0x40, 0);
        assert!(!runtime.browser().registry().is_locked(key));
        assert!(runtime.browser().registry().is_pinned(key));
    });
}

#[test]
fn test_plain_lock_is_idempotent() {
    smol::block_on(async {
        let mut runtime = runtime(vec![
            (
                "/40/0000/startup.bml",
                doc(vec![
                    body("lockModuleOnMemory('/40/0001'); lockModuleOnMemory('/40/0001')"),
                    beitem("ModuleLocked", "/40/0001", "logEvent()"),
                ]),
            ),
            ("/40/0001/data.bin", doc(vec![])),
        ]);
        runtime.launch_document("/40/0000/startup.bml").await;

        assert_eq!(log(&runtime), vec!["ModuleLocked:0"]);
        let key = ModuleKey::new(0x40, 1);
        assert!(runtime.browser().registry().is_locked(key));
        assert_eq!(runtime.browser_mut().unlock_module_on_memory("/40/0001"), 1.0);
        assert!(!runtime.browser().registry().is_locked(key));
    });
}

#[test]
fn test_async_lock_notification() {
    for (reports_extended, expected) in [(false, "ModuleLocked:0"), (true, "ModuleLocked:0:ex")] {
        smol::block_on(async {
            let key = ModuleKey::new(0x40, 1);
            let config = RuntimeConfig {
                plain_async_lock_reports_extended: reports_extended,
                ..Default::default()
            };
            let mut runtime = runtime_with(
                config,
                vec![
                    (
                        "/40/0000/startup.bml",
                        doc(vec![
                            body("lockModuleOnMemory('/40/0001')"),
                            beitem("ModuleLocked", "/40/0001", "logEvent()"),
                        ]),
                    ),
                    ("/40/0001/data.bin", doc(vec![])),
                ],
                &[key],
            );
            runtime.launch_document("/40/0000/startup.bml").await;
            assert!(log(&runtime).is_empty());
            assert_eq!(runtime.take_fetch_requests().len(), 1);

            runtime.on_module_fetched(key, Ok(CachedModule::new(1))).await;
            assert_eq!(log(&runtime), vec![expected]);
            assert!(runtime.browser().registry().is_locked(key));
        });
    }
}

#[test]
fn test_failed_async_lock() {
    smol::block_on(async {
        let key = ModuleKey::new(0x40, 1);
        let mut runtime = runtime_with(
            RuntimeConfig::default(),
            vec![
                (
                    "/40/0000/startup.bml",
                    doc(vec![
                        body("lockModuleOnMemoryEx('/40/0001')"),
                        beitem("ModuleLocked", "/40/0001", "logEvent()"),
                    ]),
                ),
                ("/40/0001/data.bin", doc(vec![])),
            ],
            &[key],
        );
        runtime.launch_document("/40/0000/startup.bml").await;
        runtime
            .on_module_fetched(key, Err(FetchError::Network("timeout".to_string())))
            .await;
        assert_eq!(log(&runtime), vec!["ModuleLocked:-1:ex"]);
    });
}

// ============================================================================
// Timers
// ============================================================================

#[test]
fn test_interval_timer() {
    smol::block_on(async {
        let mut runtime = runtime(vec![(
            "/40/0000/startup.bml",
            doc(vec![body("setInterval('log(\"tick\")', 100, 2)")]),
        )]);
        runtime.launch_document("/40/0000/startup.bml").await;

        for _ in 0..3 {
            runtime.tick(Duration::from_millis(100)).await;
        }
        assert_eq!(log(&runtime), vec!["tick", "tick"]);
    });
}

#[test]
fn test_module_watch() {
    smol::block_on(async {
        let mut runtime = runtime(vec![(
            "/40/0000/startup.bml",
            doc(vec![body(""), beitem("ModuleUpdated", "/40/0007", "logEvent()")]),
        )]);
        runtime.launch_document("/40/0000/startup.bml").await;

        runtime.tick(Duration::from_millis(1000)).await;
        assert_eq!(log(&runtime), vec!["ModuleUpdated:1"]);

        runtime.tick(Duration::from_millis(1000)).await;
        assert_eq!(log(&runtime).len(), 1);

        runtime.update_download_info(ComponentId(0x40), [(ModuleId(0), 1), (ModuleId(7), 1)]);
        runtime.tick(Duration::from_millis(1000)).await;
        assert_eq!(log(&runtime), vec!["ModuleUpdated:1", "ModuleUpdated:2"]);
    });
}

#[test]
fn test_timers_discarded_on_swap() {
    smol::block_on(async {
        let mut runtime = runtime(vec![
            (
                "/40/0000/startup.bml",
                doc(vec![
                    body("setInterval('log(\"old\")', 100, 0)"),
                    focusable("nav-index: 0").with_attribute("onkeydown", "launchDocument('next.bml')"),
                ]),
            ),
            ("/40/0000/next.bml", doc(vec![body("")])),
        ]);
        runtime.launch_document("/40/0000/startup.bml").await;
        runtime.key_down(AribKey::Enter).await;
        assert_eq!(runtime.active_document().as_deref(), Some("/40/0000/next.bml"));

        runtime.tick(Duration::from_millis(100)).await;
        assert!(log(&runtime).is_empty());
    });
}
