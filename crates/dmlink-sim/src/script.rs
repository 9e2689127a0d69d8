//! Just enough of the host's script language to answer the client.
//!
//! Recognized, in order of precedence: `DoesFunctionExist("X")`, persistent
//! note calls, calls to a supported energy-filter function, then a literal
//! `Exit(n)`. Anything else evaluates to 0.0.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub enum Note {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct ScriptEngine {
    functions: BTreeSet<String>,
    notes: HashMap<String, Note>,
    slit_in: bool,
    slit_width: f64,
    energy_loss: f64,
}

impl ScriptEngine {
    pub fn new(functions: BTreeSet<String>) -> Self {
        Self {
            functions,
            notes: HashMap::new(),
            slit_in: false,
            slit_width: 20.0,
            energy_loss: 0.0,
        }
    }

    pub fn note(&self, key: &str) -> Option<&Note> {
        self.notes.get(key)
    }

    pub fn slit_in(&self) -> bool {
        self.slit_in
    }

    pub fn slit_width(&self) -> f64 {
        self.slit_width
    }

    pub fn evaluate(&mut self, script: &str) -> f64 {
        if let Some(name) = string_arg(script, "DoesFunctionExist(") {
            return if self.functions.contains(name) { 1.0 } else { -1.0 };
        }
        if let Some(value) = self.notes_call(script) {
            return value;
        }
        if let Some(value) = self.filter_call(script) {
            return value;
        }
        call_args(script, "Exit")
            .and_then(|a| a.trim().parse().ok())
            .unwrap_or(0.0)
    }

    fn notes_call(&mut self, script: &str) -> Option<f64> {
        if let Some(args) = call_args(script, "SetPersistentNumberNote") {
            let (key, value) = split_args(args)?;
            let value = value.trim().parse().ok()?;
            self.notes.insert(unquote(key)?, Note::Number(value));
            return Some(0.0);
        }
        if let Some(args) = call_args(script, "SetPersistentStringNote") {
            let (key, value) = split_args(args)?;
            self.notes.insert(unquote(key)?, Note::Text(unquote(value)?));
            return Some(0.0);
        }
        if let Some(args) = call_args(script, "GetPersistentNumberNote") {
            let (key, _) = split_args(args)?;
            return Some(match self.notes.get(&unquote(key)?) {
                Some(Note::Number(n)) => *n,
                _ => 0.0,
            });
        }
        if let Some(args) = call_args(script, "DeletePersistentNote") {
            self.notes.remove(&unquote(args)?);
            return Some(0.0);
        }
        None
    }

    fn filter_call(&mut self, script: &str) -> Option<f64> {
        let (name, args) = self
            .functions
            .iter()
            .find_map(|f| call_args(script, f).map(|a| (f.as_str(), a)))?;
        let number = || args.trim().parse::<f64>().ok();

        let value = if name.ends_with("GetSlitIn") || name.ends_with("GetSlitState") {
            if self.slit_in { 1.0 } else { -1.0 }
        } else if name.ends_with("SetSlitIn") || name.ends_with("SetSlitState") {
            self.slit_in = number()? != 0.0;
            0.0
        } else if name.ends_with("GetSlitWidth") {
            self.slit_width
        } else if name.ends_with("SetSlitWidth") {
            self.slit_width = number()?;
            1.0
        } else if name.ends_with("GetEnergyLoss") {
            self.energy_loss
        } else if name.ends_with("SetEnergyLoss") {
            self.energy_loss = number()?;
            1.0
        } else if name.ends_with("AlignZeroLoss") || name.ends_with("CenterZLP") {
            1.0
        } else {
            return None;
        };
        Some(value)
    }
}

/// Text between `name(` and the matching `)`.
fn call_args<'a>(script: &'a str, name: &str) -> Option<&'a str> {
    let mut from = 0;
    while let Some(pos) = script[from..].find(name) {
        let start = from + pos;
        let open = start + name.len();
        // Whole identifier only: `IFGetSlitIn` must not match inside `XIFGetSlitIn`.
        let before_ok = script[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_ascii_alphanumeric() || c == '_'));
        if before_ok && script[open..].starts_with('(') {
            let mut depth = 0usize;
            for (i, c) in script[open..].char_indices() {
                match c {
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(&script[open + 1..open + i]);
                        }
                    }
                    _ => {}
                }
            }
            return None;
        }
        from = open;
    }
    None
}

/// First quoted argument of `prefix(...)`.
fn string_arg<'a>(script: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = &script[script.find(prefix)? + prefix.len()..];
    let rest = rest.strip_prefix('"')?;
    Some(&rest[..rest.find('"')?])
}

/// Split `a, b` at the first comma outside quotes.
fn split_args(args: &str) -> Option<(&str, &str)> {
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in args.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => quoted = !quoted,
            ',' if !quoted => return Some((&args[..i], &args[i + 1..])),
            _ => {}
        }
    }
    None
}

fn unquote(literal: &str) -> Option<String> {
    let inner = literal.trim().strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(chars.next()?);
        } else {
            out.push(c);
        }
    }
    Some(out)
}
