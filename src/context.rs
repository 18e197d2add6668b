use crate::{Container, Error, ListContainer, Value};

/// A transient frame in the lookup stack that expressions evaluate against.
///
/// Contexts are created on the borrow stack while a description traverses a
/// value: each record or sequence pushes a frame pointing at its container,
/// with a non-owning link to the enclosing frame. The root of the value tree
/// owns all the data; frames never outlive the operation that created them,
/// which is what lets parent links exist without reference cycles.
///
/// Name resolution is frame-local (no upward search), with a few reserved
/// forms:
///
/// - `_index` -- the index of the nearest enclosing sequence element
/// - `_<field>_offset`, `_<field>_size`, `_<field>_endoffset`,
///   `_<field>_ptrsize` -- flattened aliases into the frame's meta table
///
/// Looking up a field that holds a deferred rebuild expression forces the
/// expression against this frame, so expressions may reference fields whose
/// values are themselves still expressions.
#[derive(Debug)]
pub struct Context<'a> {
    scope: Scope<'a>,
    parent: Option<&'a Context<'a>>,
    index: Option<usize>,
}

#[derive(Debug)]
enum Scope<'a> {
    Root,
    Struct(&'a Container),
    List(&'a ListContainer),
}

impl<'a> Context<'a> {
    /// The empty frame every operation starts from
    pub fn root() -> Context<'static> {
        Context {
            scope: Scope::Root,
            parent: None,
            index: None,
        }
    }

    /// Pushes a frame for a record
    pub fn enter_struct<'b>(&'b self, container: &'b Container) -> Context<'b> {
        Context {
            scope: Scope::Struct(container),
            parent: Some(self),
            index: None,
        }
    }

    /// Pushes a frame for one element of a sequence
    pub fn enter_list<'b>(&'b self, list: &'b ListContainer, index: usize) -> Context<'b> {
        Context {
            scope: Scope::List(list),
            parent: Some(self),
            index: Some(index),
        }
    }

    /// The enclosing frame, if any
    pub fn parent(&self) -> Option<&Context<'a>> {
        self.parent
    }

    /// The topmost frame that carries data (the root record of the value
    /// tree), or the topmost frame outright
    pub fn root_frame(&self) -> &Context<'a> {
        let mut at = self;
        let mut best = self;
        while let Some(up) = at.parent {
            if !matches!(up.scope, Scope::Root) {
                best = up;
            }
            at = up;
        }
        best
    }

    /// The frame's own container as a value
    pub(crate) fn frame_value(&self) -> Result<Value, Error> {
        match self.scope {
            Scope::Root => Err(Error::context("the root frame holds no value")),
            Scope::Struct(c) => Ok(Value::Struct(c.clone())),
            Scope::List(l) => Ok(Value::List(l.clone())),
        }
    }

    /// Resolves a name against this frame, forcing deferred values
    pub fn get(&self, name: &str) -> Result<Value, Error> {
        if name == "_index" {
            return self
                .nearest_index()
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| Error::context("_index outside of a sequence"));
        }

        if let Scope::Struct(c) = self.scope {
            if let Some(v) = c.get(name) {
                return self.force(v.clone());
            }
            if let Some(v) = meta_alias(c, name) {
                return Ok(v);
            }
        }
        Err(Error::context(name))
    }

    /// Evaluates a deferred value against this frame; plain values pass
    /// through
    pub fn force(&self, value: Value) -> Result<Value, Error> {
        match value {
            Value::Deferred(e) => e.eval(self),
            v => Ok(v),
        }
    }

    fn nearest_index(&self) -> Option<usize> {
        let mut at = self;
        loop {
            if let Some(i) = at.index {
                return Some(i);
            }
            at = at.parent?;
        }
    }
}

/// Resolves `_<field>_offset`-style aliases against a container's meta table
fn meta_alias(container: &Container, name: &str) -> Option<Value> {
    let rest = name.strip_prefix('_')?;
    for (suffix, pick) in [
        ("_endoffset", 0usize),
        ("_ptrsize", 1),
        ("_offset", 2),
        ("_size", 3),
    ] {
        if let Some(field) = rest.strip_suffix(suffix) {
            if let Some(meta) = container.meta(field) {
                let v = match pick {
                    0 => meta.end_offset,
                    1 => meta.ptr_size,
                    2 => meta.offset,
                    _ => meta.size,
                };
                return Some(Value::Int(v as i64));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{container, expr::this, Meta};

    #[test]
    fn test_meta_aliases() {
        let mut c = container! { "data" => 7 };
        c.set_meta(
            "data",
            Meta {
                offset: 4,
                size: 8,
                end_offset: 12,
                ptr_size: 3,
            },
        );
        let root = Context::root();
        let ctx = root.enter_struct(&c);
        assert_eq!(ctx.get("_data_offset").unwrap(), Value::Int(4));
        assert_eq!(ctx.get("_data_size").unwrap(), Value::Int(8));
        assert_eq!(ctx.get("_data_endoffset").unwrap(), Value::Int(12));
        assert_eq!(ctx.get("_data_ptrsize").unwrap(), Value::Int(3));
        assert!(ctx.get("_other_size").is_err());
    }

    #[test]
    fn test_hidden_entries_resolve() {
        let c = container! { "_switchid_payload" => "Beta" };
        let root = Context::root();
        let ctx = root.enter_struct(&c);
        assert_eq!(
            ctx.get("_switchid_payload").unwrap(),
            Value::Str(String::from("Beta"))
        );
    }

    #[test]
    fn test_deferred_forced_through_lookup() {
        let mut c = container! { "base" => 40 };
        c.set("derived", Value::Deferred((this().f("base") + 2).into()));
        let root = Context::root();
        let ctx = root.enter_struct(&c);
        assert_eq!(ctx.get("derived").unwrap(), Value::Int(42));
    }

    #[test]
    fn test_index_walks_up() {
        let list = crate::items![1, 2];
        let item = container! { "x" => 1 };
        let root = Context::root();
        let lctx = root.enter_list(&list, 1);
        let ictx = lctx.enter_struct(&item);
        assert_eq!(ictx.get("_index").unwrap(), Value::Int(1));
        assert!(root.get("_index").is_err());
    }

    #[test]
    fn test_root_frame_skips_empty_root() {
        let top = container! { "a" => 1 };
        let inner = container! { "b" => 2 };
        let root = Context::root();
        let tctx = root.enter_struct(&top);
        let ictx = tctx.enter_struct(&inner);
        assert_eq!(ictx.root_frame().get("a").unwrap(), Value::Int(1));
    }
}
