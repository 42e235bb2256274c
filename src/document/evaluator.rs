//! Front matter variable resolution.
//!
//! Every string in a document's front matter may reference other top-level
//! keys as `%name`. Bindings come from the document itself first, then from
//! the site-wide globals. Resolution is recursive and cycle-aware:
//!
//! ```text
//! permalink: /%category/%slug/     slug: %title     title: Hello
//!             │         │                │
//!             ▼         ▼                ▼
//!        /news/hello/  ◀── resolve(slug) ── resolve(title)
//! ```
//!
//! Substituted values are stringified; they are never re-parsed as YAML.

use super::error::EvalError;
use regex::{Captures, Regex};
use rustc_hash::FxHashMap;
use serde_yaml::{Mapping, Value};
use std::sync::LazyLock;

/// `%identifier` token
static VARIABLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%([A-Za-z_-]+)").unwrap());

pub struct FrontMatterEvaluator<'a> {
    /// Owning document, for error reporting
    path: &'a str,
    local: &'a Mapping,
    globals: &'a Mapping,
    /// Top-level keys left unevaluated (dynamic permalink patterns)
    raw_keys: &'a [&'a str],
    resolved: FxHashMap<String, String>,
    visiting: Vec<String>,
}

impl<'a> FrontMatterEvaluator<'a> {
    pub fn new(path: &'a str, local: &'a Mapping, globals: &'a Mapping) -> Self {
        Self {
            path,
            local,
            globals,
            raw_keys: &[],
            resolved: FxHashMap::default(),
            visiting: Vec::new(),
        }
    }

    /// Keep the given top-level keys verbatim.
    pub fn keep_raw(mut self, keys: &'a [&'a str]) -> Self {
        self.raw_keys = keys;
        self
    }

    /// Evaluate every value of the document's front matter.
    pub fn evaluate(&mut self) -> Result<Mapping, EvalError> {
        let local = self.local;
        let mut out = Mapping::with_capacity(local.len());
        for (key, value) in local {
            let raw = key.as_str().is_some_and(|k| self.raw_keys.contains(&k));
            let value = if raw { value.clone() } else { self.walk(value)? };
            out.insert(key.clone(), value);
        }
        Ok(out)
    }

    /// Substitute `%name` tokens in free text, leaving unknown tokens as written.
    pub fn substitute_lenient(&mut self, text: &str) -> String {
        VARIABLE
            .replace_all(text, |caps: &Captures| {
                self.resolve(&caps[1])
                    .unwrap_or_else(|_| caps[0].to_string())
            })
            .into_owned()
    }

    fn walk(&mut self, value: &Value) -> Result<Value, EvalError> {
        Ok(match value {
            Value::String(s) => Value::String(self.substitute(s)?),
            Value::Sequence(seq) => Value::Sequence(
                seq.iter()
                    .map(|v| self.walk(v))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Mapping(map) => {
                let mut out = Mapping::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.walk(v)?);
                }
                Value::Mapping(out)
            }
            other => other.clone(),
        })
    }

    fn substitute(&mut self, text: &str) -> Result<String, EvalError> {
        if !text.contains('%') {
            return Ok(text.to_string());
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in VARIABLE.captures_iter(text) {
            let token = caps.get(0).map_or(0..0, |m| m.range());
            out.push_str(&text[last..token.start]);
            out.push_str(&self.resolve(&caps[1])?);
            last = token.end;
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    /// String form of the binding for `name`.
    fn resolve(&mut self, name: &str) -> Result<String, EvalError> {
        if let Some(value) = self.resolved.get(name) {
            return Ok(value.clone());
        }
        if self.visiting.iter().any(|v| v == name) {
            return Err(self.error(name, ErrorKind::Cyclic));
        }

        let (local, globals) = (self.local, self.globals);
        let binding = local
            .get(name)
            .or_else(|| globals.get(name))
            .ok_or_else(|| self.error(name, ErrorKind::Undefined))?;

        let value = match binding {
            Value::String(s) if self.raw_keys.contains(&name) => s.clone(),
            Value::String(s) => {
                self.visiting.push(name.to_string());
                let result = self.substitute(s);
                self.visiting.pop();
                result?
            }
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => {
                return Err(self.error(name, ErrorKind::NonScalar));
            }
        };

        self.resolved.insert(name.to_string(), value.clone());
        Ok(value)
    }

    fn error(&self, name: &str, kind: ErrorKind) -> EvalError {
        let (name, path) = (name.to_string(), self.path.to_string());
        match kind {
            ErrorKind::Undefined => EvalError::UndefinedVariable { name, path },
            ErrorKind::NonScalar => EvalError::NonScalarVariable { name, path },
            ErrorKind::Cyclic => EvalError::CyclicVariable { name, path },
        }
    }
}

enum ErrorKind {
    Undefined,
    NonScalar,
    Cyclic,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mapping(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn evaluate(yaml: &str, globals: &str) -> Result<Mapping, EvalError> {
        let local = mapping(yaml);
        let globals = mapping(globals);
        FrontMatterEvaluator::new("_posts/a.md", &local, &globals).evaluate()
    }

    #[test]
    fn test_substitutes_local_variables() {
        let out = evaluate("title: Hello\npermalink: /blog/%title/\n", "{}").unwrap();
        assert_eq!(out.get("permalink").and_then(Value::as_str), Some("/blog/Hello/"));
    }

    #[test]
    fn test_recursive_resolution() {
        let out = evaluate(
            "title: Hello\nslug: 'post %title'\npermalink: /%slug/\n",
            "{}",
        )
        .unwrap();
        assert_eq!(out.get("permalink").and_then(Value::as_str), Some("/post Hello/"));
    }

    #[test]
    fn test_document_shadows_globals() {
        let out = evaluate("name: Local\ngreeting: Hi %name\n", "name: Global\nsite: S\n").unwrap();
        assert_eq!(out.get("greeting").and_then(Value::as_str), Some("Hi Local"));

        let out = evaluate("greeting: Hi %name\n", "name: Global\n").unwrap();
        assert_eq!(out.get("greeting").and_then(Value::as_str), Some("Hi Global"));
    }

    #[test]
    fn test_nested_values_resolve_against_top_level() {
        let out = evaluate(
            "author: Ann\nmeta:\n  by: '%author'\n  author: Nested\ntags: ['%author', x]\n",
            "{}",
        )
        .unwrap();
        let meta = out.get("meta").and_then(Value::as_mapping).unwrap();
        assert_eq!(meta.get("by").and_then(Value::as_str), Some("Ann"));
        let tags = out.get("tags").and_then(Value::as_sequence).unwrap();
        assert_eq!(tags[0].as_str(), Some("Ann"));
    }

    #[test]
    fn test_scalars_are_stringified() {
        let out = evaluate("n: 3\nflag: true\nempty: ~\ns: '%n %flag %empty.'\n", "{}").unwrap();
        assert_eq!(out.get("s").and_then(Value::as_str), Some("3 true ."));
    }

    #[test]
    fn test_undefined_variable() {
        let err = evaluate("permalink: /%missing/\n", "{}").unwrap_err();
        assert_eq!(
            err,
            EvalError::UndefinedVariable {
                name: "missing".into(),
                path: "_posts/a.md".into()
            }
        );
    }

    #[test]
    fn test_cycle_detected() {
        let err = evaluate("a: '%b'\nb: '%a'\n", "{}").unwrap_err();
        assert!(matches!(err, EvalError::CyclicVariable { .. }));
    }

    #[test]
    fn test_non_scalar_binding_rejected() {
        let err = evaluate("tags: [a, b]\nt: '%tags'\n", "{}").unwrap_err();
        assert!(matches!(err, EvalError::NonScalarVariable { ref name, .. } if name == "tags"));
    }

    #[test]
    fn test_keep_raw_keys() {
        let local = mapping("permalink: /blog/%title/\nlayout: '%kind'\nkind: post\n");
        let globals = Mapping::new();
        let out = FrontMatterEvaluator::new("_pages/blog.html", &local, &globals)
            .keep_raw(&["permalink"])
            .evaluate()
            .unwrap();
        assert_eq!(out.get("permalink").and_then(Value::as_str), Some("/blog/%title/"));
        assert_eq!(out.get("layout").and_then(Value::as_str), Some("post"));
    }

    #[test]
    fn test_lenient_body_substitution() {
        let local = mapping("name: World\n");
        let globals = Mapping::new();
        let mut evaluator = FrontMatterEvaluator::new("p.md", &local, &globals);
        assert_eq!(
            evaluator.substitute_lenient("Hello %name, 50% off %unknown"),
            "Hello World, 50% off %unknown"
        );
    }
}
