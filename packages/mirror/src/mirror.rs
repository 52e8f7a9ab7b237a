//! # Mirror Coordinator
//!
//! Keeps a named set of derived views consistent with one canonical
//! document.
//!
//! ```text
//! handle.set_*(..) ──▶ Observer ──▶ on_change ──▶ every converter.from_document
//!                                                         │
//!                                     get(format) ◀── mirror cache
//! ```
//!
//! Recomputation is coarse-grained: any mutation anywhere regenerates every
//! registered mirror from the current document. Converters receive an owned
//! snapshot, so a converter that writes back through a retained handle only
//! hits the reentrancy guard and never a live borrow.
//!
//! The coordinator is single-threaded (`Rc`, `Cell`). The guard is a plain
//! flag for that reason.

use crate::observer::{ChangeEvent, ChangeHandler, DocumentHandle, Observed};
use crate::{Converter, MirrorError, View};
use hgss_model::Document;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use tracing::{debug, instrument, trace, warn};

/// Canonical document plus its derived views
pub struct Mirror {
    inner: Rc<Inner>,
}

struct Inner {
    this: Weak<Inner>,
    observed: RefCell<Observed>,
    converters: RefCell<BTreeMap<String, Rc<dyn Converter>>>,
    mirrors: RefCell<HashMap<String, Rc<View>>>,
    failures: RefCell<HashMap<String, MirrorError>>,
    updating: Cell<bool>,
}

/// Clears the reentrancy flag when a recompute pass ends, even by unwinding
struct UpdateGuard<'a>(&'a Cell<bool>);

impl<'a> UpdateGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Mirror {
    /// Wrap `document`, register `converters` and compute every mirror
    pub fn new<I, S>(document: Document, converters: I) -> Self
    where
        I: IntoIterator<Item = (S, Box<dyn Converter>)>,
        S: Into<String>,
    {
        let converters: BTreeMap<String, Rc<dyn Converter>> = converters
            .into_iter()
            .map(|(name, converter)| (name.into(), Rc::<dyn Converter>::from(converter)))
            .collect();

        let inner = Rc::new_cyclic(|this: &Weak<Inner>| Inner {
            this: this.clone(),
            observed: RefCell::new(Observed::new(document, handler(this.clone()))),
            converters: RefCell::new(converters),
            mirrors: RefCell::new(HashMap::new()),
            failures: RefCell::new(HashMap::new()),
            updating: Cell::new(false),
        });

        inner.recompute_all();
        Self { inner }
    }

    /// Most recently computed view for `format`, `None` if never registered
    pub fn get(&self, format: &str) -> Option<Rc<View>> {
        self.inner.mirrors.borrow().get(format).cloned()
    }

    /// Fresh observed handle on the canonical document
    pub fn document(&self) -> DocumentHandle {
        self.inner.observed.borrow().handle()
    }

    /// Owned copy of the canonical document
    pub fn snapshot(&self) -> Document {
        self.inner.observed.borrow().snapshot()
    }

    /// Replace the canonical document and recompute every mirror. Views of
    /// the old document are dropped first, so a format that fails on the new
    /// one has no view until it succeeds. Handles taken before the call keep
    /// pointing at the old document.
    pub fn set_document(&self, document: Document) {
        let handler = handler(self.inner.this.clone());
        *self.inner.observed.borrow_mut() = Observed::new(document, handler);
        self.inner.mirrors.borrow_mut().clear();
        debug!("Canonical document replaced");
        self.inner.recompute_all();
    }

    /// Replace the canonical document with one built by the converter
    /// registered under `format`. Nothing is installed on failure.
    #[instrument(skip_all, fields(format = %format))]
    pub fn load(&self, format: &str, external: &View) -> Result<(), MirrorError> {
        let converter = self
            .inner
            .converter(format)
            .ok_or_else(|| MirrorError::UnknownFormat(format.to_string()))?;

        let document = converter
            .to_document(external)
            .map_err(|source| MirrorError::Conversion {
                format: format.to_string(),
                source,
            })?;
        document.validate().map_err(|source| MirrorError::Invalid {
            format: format.to_string(),
            source,
        })?;

        self.set_document(document);
        Ok(())
    }

    /// Register `converter` under `name`, replacing any previous one, and
    /// compute only its mirror
    pub fn add_converter(&self, name: impl Into<String>, converter: Box<dyn Converter>) {
        let name = name.into();
        let converter: Rc<dyn Converter> = Rc::from(converter);
        let replaced = self
            .inner
            .converters
            .borrow_mut()
            .insert(name.clone(), Rc::clone(&converter))
            .is_some();
        debug!(format = %name, replaced, "Converter registered");

        self.inner.recompute(vec![(name, converter)]);
    }

    /// Registered format names, sorted
    pub fn formats(&self) -> Vec<String> {
        self.inner.converters.borrow().keys().cloned().collect()
    }

    /// Failure of the latest recompute of `format`, if it failed
    pub fn last_error(&self, format: &str) -> Option<MirrorError> {
        self.inner.failures.borrow().get(format).cloned()
    }
}

impl fmt::Debug for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mirror")
            .field("formats", &self.formats())
            .field("failures", &self.inner.failures.borrow().len())
            .finish()
    }
}

fn handler(inner: Weak<Inner>) -> ChangeHandler {
    Rc::new(move |event: &ChangeEvent| {
        if let Some(inner) = inner.upgrade() {
            inner.on_change(event);
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Inner {
    fn on_change(&self, event: &ChangeEvent) {
        if self.updating.get() {
            trace!(path = %event.path, "Change during recompute ignored");
            return;
        }
        debug!(path = %event.path, "Document changed");
        self.recompute_all();
    }

    fn converter(&self, format: &str) -> Option<Rc<dyn Converter>> {
        self.converters.borrow().get(format).cloned()
    }

    fn recompute_all(&self) {
        let all = self
            .converters
            .borrow()
            .iter()
            .map(|(name, converter)| (name.clone(), Rc::clone(converter)))
            .collect();
        self.recompute(all);
    }

    /// Regenerate the mirrors of `formats` from the current document. Each
    /// format is isolated: a failing converter keeps whatever view it has.
    fn recompute(&self, formats: Vec<(String, Rc<dyn Converter>)>) {
        let _guard = UpdateGuard::enter(&self.updating);
        let document = self.observed.borrow().snapshot();
        debug!(formats = formats.len(), "Recomputing mirrors");

        for (format, converter) in formats {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| converter.from_document(&document)));

            let failure = match outcome {
                Ok(Ok(view)) => {
                    self.mirrors.borrow_mut().insert(format.clone(), Rc::new(view));
                    self.failures.borrow_mut().remove(&format);
                    continue;
                }
                Ok(Err(source)) => MirrorError::Conversion {
                    format: format.clone(),
                    source,
                },
                Err(payload) => MirrorError::Panicked {
                    format: format.clone(),
                    message: panic_message(payload.as_ref()),
                },
            };

            warn!(format = %format, error = %failure, "Mirror not updated");
            self.failures.borrow_mut().insert(format, failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConvertError;
    use hgss_model::{Geometry, Node};
    use serde_json::json;

    /// Emits the ids of every node in preorder
    struct Ids;

    impl Converter for Ids {
        fn to_document(&self, _external: &View) -> Result<Document, ConvertError> {
            Err(ConvertError::Unsupported("ids".to_string()))
        }

        fn from_document(&self, document: &Document) -> Result<View, ConvertError> {
            let mut ids = Vec::new();
            document.root.walk(&mut |node| ids.push(node.id.clone()));
            Ok(View::Json(json!(ids)))
        }
    }

    fn sample() -> Document {
        Document::new(
            Node::group("root").with_child(Node::feature("a", Geometry::point(0.0, 0.0))),
        )
    }

    #[test]
    fn test_mirrors_computed_at_construction() {
        let mirror = Mirror::new(sample(), [("ids", Box::new(Ids) as Box<dyn Converter>)]);

        assert_eq!(*mirror.get("ids").unwrap(), View::Json(json!(["root", "a"])));
        assert!(mirror.get("unknown").is_none());
        assert_eq!(mirror.formats(), vec!["ids".to_string()]);
    }

    #[test]
    fn test_guard_is_clear_between_mutations() {
        let mirror = Mirror::new(sample(), [("ids", Box::new(Ids) as Box<dyn Converter>)]);

        mirror.document().root().set_id("top");
        assert!(!mirror.inner.updating.get());
        mirror.document().node_by_id("a").unwrap().set_id("b");

        assert_eq!(*mirror.get("ids").unwrap(), View::Json(json!(["top", "b"])));
    }

    #[test]
    fn test_handler_outliving_mirror_is_inert() {
        let mirror = Mirror::new(sample(), [("ids", Box::new(Ids) as Box<dyn Converter>)]);
        let handle = mirror.document();
        drop(mirror);

        handle.root().set_id("orphan");
        assert_eq!(handle.root().id().as_deref(), Some("orphan"));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(3_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
