//! Stub Interpreter
//!
//! Minimal implementation of the Interpreter trait for tests and the demo
//! binary. It understands statements of the form `name(arg, ...)`
//! separated by `;` or newlines, where each argument is a quoted string or
//! a number, plus `function name() { ... }` definitions.

use crate::browser::Browser;
use crate::interpreter::{Interpreter, ScriptError};
use crate::persistent::PersistentValue;
use bml_events::{CurrentEvent, Flow};
use std::collections::HashMap;

const MAX_CALL_DEPTH: usize = 32;

/// Call argument
#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Str(String),
    Num(f64),
}

impl Arg {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let quoted = text.len() >= 2
            && ((text.starts_with('"') && text.ends_with('"'))
                || (text.starts_with('\'') && text.ends_with('\'')));
        if quoted {
            return Some(Arg::Str(text[1..text.len() - 1].to_string()));
        }
        text.parse::<f64>().ok().map(Arg::Num)
    }

    fn to_persistent(&self) -> PersistentValue {
        match self {
            Arg::Str(s) => PersistentValue::Text(s.clone()),
            Arg::Num(n) => PersistentValue::Number(*n),
        }
    }
}

/// Split at `separators` outside quotes, parentheses and braces
fn split_top_level(source: &str, separators: &[char]) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for c in source.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                current.push(c);
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' | '{' => {
                    depth += 1;
                    current.push(c);
                }
                ')' | '}' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                c if depth == 0 && separators.contains(&c) => {
                    parts.push(std::mem::take(&mut current));
                }
                c => current.push(c),
            },
        }
    }
    parts.push(current);
    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Stub interpreter.
///
/// Provides:
/// - `log('text')` and `logEvent()` for recording what ran
/// - `exit()` to request that the current sequence stop
/// - the browser calls by name, with or without a `browser.` prefix
/// - user functions without parameters
#[derive(Debug, Default)]
pub struct StubInterpreter {
    functions: HashMap<String, String>,
    log: Vec<String>,
    calls: Vec<(String, f64)>,
}

impl StubInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written by `log` and `logEvent`
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Browser calls made so far with their results
    pub fn calls(&self) -> &[(String, f64)] {
        &self.calls
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
        self.calls.clear();
    }

    fn run(&mut self, browser: &mut Browser, source: &str, label: &str, depth: usize) -> Result<Flow, ScriptError> {
        if depth > MAX_CALL_DEPTH {
            return Err(ScriptError::TooDeep);
        }
        for statement in split_top_level(source, &[';', '\n']) {
            if statement.starts_with("//") {
                continue;
            }
            if let Some(definition) = statement.strip_prefix("function ") {
                self.define(definition, label)?;
                continue;
            }
            let flow = self.call(browser, &statement, label, depth)?;
            if flow.is_exit() || browser.transition_pending() {
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    fn define(&mut self, definition: &str, label: &str) -> Result<(), ScriptError> {
        let syntax = |message: &str| ScriptError::Syntax {
            label: label.to_string(),
            message: message.to_string(),
        };
        let (name, rest) = definition.split_once('(').ok_or_else(|| syntax("expected ("))?;
        let open = rest.find('{').ok_or_else(|| syntax("expected {"))?;
        let close = rest.rfind('}').ok_or_else(|| syntax("expected }"))?;
        if close < open {
            return Err(syntax("unbalanced braces"));
        }
        self.functions
            .insert(name.trim().to_string(), rest[open + 1..close].to_string());
        Ok(())
    }

    fn call(&mut self, browser: &mut Browser, statement: &str, label: &str, depth: usize) -> Result<Flow, ScriptError> {
        let syntax = |message: &str| ScriptError::Syntax {
            label: label.to_string(),
            message: format!("{message}: {statement}"),
        };
        let (name, rest) = statement.split_once('(').ok_or_else(|| syntax("expected call"))?;
        let inner = rest.trim_end().strip_suffix(')').ok_or_else(|| syntax("expected )"))?;
        let name = name.trim();
        let name = name.strip_prefix("browser.").unwrap_or(name);
        let args = split_top_level(inner, &[','])
            .iter()
            .map(|a| Arg::parse(a).ok_or_else(|| syntax("bad argument")))
            .collect::<Result<Vec<_>, _>>()?;

        let text = |i: usize| match args.get(i) {
            Some(Arg::Str(s)) => Ok(s.as_str()),
            _ => Err(syntax("expected string argument")),
        };
        let number = |i: usize| match args.get(i) {
            Some(Arg::Num(n)) => Ok(*n),
            _ => Err(syntax("expected number argument")),
        };

        let result = match name {
            "log" => {
                self.log.push(text(0)?.to_string());
                return Ok(Flow::Continue);
            }
            "logEvent" => {
                let entry = match browser.current_event() {
                    Some(CurrentEvent::Intrinsic(e)) => format!("{}:{}", e.event_type.as_str(), e.key_code),
                    Some(CurrentEvent::Bevent(e)) if e.extended => {
                        format!("{}:{}:ex", e.event_type.as_str(), e.status)
                    }
                    Some(CurrentEvent::Bevent(e)) => format!("{}:{}", e.event_type.as_str(), e.status),
                    None => "none".to_string(),
                };
                self.log.push(entry);
                return Ok(Flow::Continue);
            }
            "exit" => return Ok(Flow::Exit),
            "launchDocument" => browser.launch_document(text(0)?),
            "reloadActiveDocument" => browser.reload_active_document(),
            "lockModuleOnMemory" => browser.lock_module_on_memory(text(0)?),
            "lockModuleOnMemoryEx" => browser.lock_module_on_memory_ex(text(0)?),
            "unlockModuleOnMemory" => browser.unlock_module_on_memory(text(0)?),
            "unlockModuleOnMemoryEx" => browser.unlock_module_on_memory_ex(text(0)?),
            "unlockAllModulesOnMemory" => browser.unlock_all_modules_on_memory(),
            "detectComponent" => browser.detect_component(text(0)?),
            "setCurrentDateMode" => browser.set_current_date_mode(number(0)? as i32),
            "setInterval" => {
                let iterations = args.get(2).map_or(Ok(0.0), |_| number(2))?;
                browser.set_interval(text(0)?, number(1)? as u64, iterations as u32)
            }
            "clearTimer" => browser.clear_timer(number(0)? as u32),
            "pauseTimer" => browser.pause_timer(number(0)? as u32),
            "resumeTimer" => browser.resume_timer(number(0)? as u32),
            "writePersistentArray" => {
                let values: Vec<PersistentValue> = args.iter().skip(2).map(Arg::to_persistent).collect();
                browser.write_persistent_array(text(0)?, text(1)?, &values, None)
            }
            "readPersistentArray" => match browser.read_persistent_array(text(0)?, text(1)?) {
                Some(values) => values.len() as f64,
                None => f64::NAN,
            },
            _ => match self.functions.get(name).cloned() {
                Some(body) => return self.run(browser, &body, label, depth + 1),
                None => return Err(ScriptError::Undefined(name.to_string())),
            },
        };
        self.calls.push((name.to_string(), result));
        Ok(Flow::Continue)
    }
}

impl Interpreter for StubInterpreter {
    fn reset_stack(&mut self) {}

    fn reset(&mut self) {
        self.functions.clear();
    }

    async fn add_script(&mut self, browser: &mut Browser, source: &str, label: &str) -> Result<Flow, ScriptError> {
        tracing::debug!("Evaluating script {}", label);
        self.run(browser, source, label, 0)
    }

    async fn execute_handler(&mut self, browser: &mut Browser, source: &str) -> Result<Flow, ScriptError> {
        self.run(browser, source, "handler", 0)
    }
}
