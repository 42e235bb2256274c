//! Jinja-syntax rendering on top of `minijinja`.
//!
//! ```text
//! {{ this.title }}                          value lookup
//! {% for post in collections.posts %}       iteration, filters, conditionals
//!   {{ post.url }}
//! {% endfor %}
//! {{ file("partials/footer.html") }}        verbatim include (refused in safe mode)
//! ```
//!
//! Every [`TemplateContext`] value is converted before rendering. Jailed
//! objects become [`JailedValue`]s holding their indexed fields and the
//! results of their dispatch table, nothing else. On a jailed value a
//! lookup reads a field first; otherwise it must name a capability, and a
//! capability outside the dispatch table aborts rendering.
//!
//! Undefined values and `none` render as empty text.

use super::{ContextValue, TemplateContext, TemplateRenderError, Templating};
use crate::{
    context::BuildContext,
    jail::{Accessor, JailError, JailedObject},
};
use minijinja::{
    AutoEscape, Environment, Error, ErrorKind, State, UndefinedBehavior,
    value::{Enumerator, Object, ObjectRepr, Value},
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

pub struct JinjaTemplating {
    root: PathBuf,
    safe: bool,
}

impl JinjaTemplating {
    pub fn new(root: impl Into<PathBuf>, safe: bool) -> Self {
        Self {
            root: root.into(),
            safe,
        }
    }

    pub fn from_context(ctx: &BuildContext) -> Self {
        Self::new(ctx.root(), ctx.safe())
    }

    fn environment(&self, fault: &Fault) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_formatter(|out, state, value| {
            if value.is_none() {
                Ok(())
            } else {
                minijinja::escape_formatter(out, state, value)
            }
        });

        let root = self.root.clone();
        let safe = self.safe;
        let fault = fault.clone();
        env.add_function("file", move |path: String| {
            include(&root, safe, &path).map_err(|err| fault.raise(err))
        });
        env
    }
}

impl Templating for JinjaTemplating {
    fn render(&self, template: &str, context: &TemplateContext<'_>) -> Result<String, TemplateRenderError> {
        let fault = Fault::default();
        let env = self.environment(&fault);

        let globals: Value = context
            .flatten()
            .into_iter()
            .map(|(name, value)| (name, to_value(value, &fault)))
            .collect();
        let result = env.render_str(template, globals);

        // A recorded fault wins: the engine only saw a stand-in error or an
        // undefined value
        if let Some(err) = fault.take() {
            return Err(err);
        }
        result.map_err(|err| match err.kind() {
            ErrorKind::SyntaxError => TemplateRenderError::Syntax(err.to_string()),
            _ => TemplateRenderError::Engine(err),
        })
    }
}

/// Read a project file for `file()`.
fn include(root: &Path, safe: bool, path: &str) -> Result<String, TemplateRenderError> {
    if safe {
        return Err(TemplateRenderError::SafeMode(format!("file(\"{path}\")")));
    }

    let relative = Path::new(path);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(TemplateRenderError::Include {
            path: relative.to_path_buf(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "outside the project root"),
        });
    }

    fs::read_to_string(root.join(relative)).map_err(|source| TemplateRenderError::Include {
        path: relative.to_path_buf(),
        source,
    })
}

// ============================================================================
// Faults
// ============================================================================

/// First typed failure of one render.
///
/// `minijinja` lookups cannot fail and its errors are untyped, so jail
/// denials and include failures are recorded here and surface after
/// rendering stops.
#[derive(Debug, Default, Clone)]
struct Fault(Arc<Mutex<Option<TemplateRenderError>>>);

impl Fault {
    fn raise(&self, err: TemplateRenderError) -> Error {
        let engine_error = Error::new(ErrorKind::InvalidOperation, err.to_string());
        self.0.lock().get_or_insert(err);
        engine_error
    }

    fn take(&self) -> Option<TemplateRenderError> {
        self.0.lock().take()
    }
}

// ============================================================================
// Conversion
// ============================================================================

fn to_value(value: &ContextValue<'_>, fault: &Fault) -> Value {
    match value {
        ContextValue::Json(json) => Value::from_serialize(json),
        ContextValue::Jailed(object) => Value::from_object(JailedValue::capture(object.as_ref(), fault)),
        ContextValue::List(items) => Value::from(items.iter().map(|item| to_value(item, fault)).collect::<Vec<_>>()),
        ContextValue::Map(map) => map
            .iter()
            .map(|(name, item)| (name.as_str(), to_value(item, fault)))
            .collect(),
    }
}

/// What a template sees of a jailed object.
#[derive(Debug)]
struct JailedValue {
    path: String,
    fields: BTreeMap<String, Value>,
    /// Field names in the object's own order
    keys: Vec<String>,
    calls: FxHashMap<Accessor, Value>,
    fault: Fault,
}

impl JailedValue {
    fn capture(object: &dyn JailedObject, fault: &Fault) -> Self {
        let keys = object.keys();
        let fields = keys
            .iter()
            .filter_map(|key| Some((key.clone(), Value::from_serialize(&object.offset_get(key)?))))
            .collect();
        let calls = object
            .exposed()
            .into_iter()
            .map(|(accessor, json)| (accessor, Value::from_serialize(&json)))
            .collect();

        Self {
            path: object.path().to_string(),
            fields,
            keys,
            calls,
            fault: fault.clone(),
        }
    }

    /// Array payloads index as `0..n`.
    fn is_sequence(&self) -> bool {
        !self.keys.is_empty() && self.keys.iter().enumerate().all(|(i, key)| *key == i.to_string())
    }

    fn capability(&self, name: &str) -> Result<Value, JailError> {
        Accessor::from_call(name)
            .and_then(|accessor| self.calls.get(&accessor).cloned())
            .ok_or_else(|| JailError::CapabilityDenied {
                name: name.to_string(),
                path: self.path.clone(),
            })
    }
}

impl Object for JailedValue {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        if self.is_sequence() {
            ObjectRepr::Seq
        } else {
            ObjectRepr::Map
        }
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let name = key.as_str().map_or_else(|| key.to_string(), str::to_string);
        if let Some(value) = self.fields.get(&name) {
            return Some(value.clone());
        }

        // Names that are no capability at all are plain undefined fields
        Accessor::from_call(&name)?;
        match self.capability(&name) {
            Ok(value) => Some(value),
            Err(err) => {
                self.fault.raise(err.into());
                None
            }
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        if self.is_sequence() {
            Enumerator::Seq(self.keys.len())
        } else {
            Enumerator::Values(self.keys.iter().map(|key| Value::from(key.as_str())).collect())
        }
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        if !args.is_empty() {
            return Err(Error::new(
                ErrorKind::TooManyArguments,
                format!("`{method}` on `{}` takes no arguments", self.path),
            ));
        }
        self.capability(method).map_err(|err| self.fault.raise(err.into()))
    }
}
