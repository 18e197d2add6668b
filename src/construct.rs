use crate::{Container, Context, Element, Error, Meta, Stream, Value};
use std::fmt;
use std::path::Path as FsPath;

/// The contract every combinator implements.
///
/// A construct is an immutable node in a format description. The same node
/// drives parsing (bytes to [`Value`]), building ([`Value`] to bytes),
/// preprocessing (meta annotation and deferred rebuild installation), four
/// size views, and element-tree interchange. Descriptions are plain data:
/// they can be shared freely across operations and threads.
///
/// Most implementations only need `parse`, `build`, and whichever size
/// methods are sharper than the provided fallbacks: `sizeof` falls back to
/// `static_sizeof`, `full_sizeof` to `sizeof`, and `expected_sizeof` to
/// `static_sizeof`.
pub trait Construct: fmt::Debug + Send + Sync {
    /// Reads a value from the stream. Implementations record per-field meta
    /// as they go.
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error>;

    /// Writes a value into the stream
    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error>;

    /// First preprocessing sweep: rewrite the value, installing deferred
    /// expressions for fields that are recomputed at build time. The default
    /// passes the value through untouched.
    fn preprocess(&self, obj: Value, _ctx: &Context) -> Result<Value, Error> {
        Ok(obj)
    }

    /// Second preprocessing sweep: compute the span this value occupies at
    /// `offset` and annotate nested containers with meta. The default
    /// derives the span from [`sizeof`](Self::sizeof).
    fn preprocess_size(
        &self,
        obj: Value,
        ctx: &Context,
        offset: u64,
    ) -> Result<(Value, Meta), Error> {
        let size = self.sizeof(&obj, ctx)?;
        Ok((obj, Meta::span(offset, size)))
    }

    /// The size this construct occupies regardless of any particular value.
    /// Failing with the [`UnknownSize`](crate::ErrorKind::UnknownSize) kind
    /// is a non-fatal signal that the size is value-dependent.
    fn static_sizeof(&self, _ctx: &Context) -> Result<u64, Error> {
        Err(Error::unknown_size(self.type_tag()))
    }

    /// The size a concrete value occupies. Falls back to
    /// [`static_sizeof`](Self::static_sizeof).
    fn sizeof(&self, _obj: &Value, ctx: &Context) -> Result<u64, Error> {
        self.static_sizeof(ctx)
    }

    /// The size including pointed-to regions. Falls back to
    /// [`sizeof`](Self::sizeof).
    fn full_sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        self.sizeof(obj, ctx)
    }

    /// The size the value at the cursor occupies, determined by inspecting a
    /// length prefix without parsing the body. The stream is left after
    /// whatever was inspected. Falls back to
    /// [`static_sizeof`](Self::static_sizeof).
    fn expected_sizeof(&self, _stream: &mut Stream, ctx: &Context) -> Result<u64, Error> {
        self.static_sizeof(ctx)
    }

    /// Renders the value into the element tree: either by setting an
    /// attribute on `parent` (simple fields, returning `None`) or by
    /// returning a fresh element for the caller to append.
    fn to_element(
        &self,
        obj: &Value,
        parent: &mut Element,
        name: &str,
        _ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        if self.is_simple() {
            parent.set_attr(name, self.attr_encode(obj)?);
            Ok(None)
        } else {
            Err(Error::xml(format!(
                "{} cannot be represented in an element tree",
                self.type_tag()
            )))
        }
    }

    /// Reads the value back out of the element tree, inserting it (and any
    /// bookkeeping hints) into `out` under `name`. `is_root` marks `parent`
    /// as the element for this construct itself rather than its enclosing
    /// element.
    fn from_element(
        &self,
        parent: &Element,
        name: &str,
        out: &mut Container,
        _is_root: bool,
    ) -> Result<(), Error> {
        if self.is_simple() {
            let s = parent
                .attr(name)
                .ok_or_else(|| Error::xml(format!("missing attribute {}", name)))?;
            let v = self.attr_decode(s)?;
            out.set(name, v);
            Ok(())
        } else {
            Err(Error::xml(format!(
                "{} cannot be read from an element tree",
                self.type_tag()
            )))
        }
    }

    /// Encodes a simple value into attribute text
    fn attr_encode(&self, _obj: &Value) -> Result<String, Error> {
        Err(Error::xml(format!(
            "{} has no attribute representation",
            self.type_tag()
        )))
    }

    /// Decodes attribute text back into a value
    fn attr_decode(&self, _s: &str) -> Result<Value, Error> {
        Err(Error::xml(format!(
            "{} has no attribute representation",
            self.type_tag()
        )))
    }

    /// The field name attached by [`Renamed`], if any
    fn name(&self) -> Option<&str> {
        None
    }

    /// Whether this construct parses into a record and needs a fresh context
    /// frame
    fn is_struct(&self) -> bool {
        false
    }

    /// Whether values serialize as a single attribute string (lets sequences
    /// collapse into one CSV-bracketed attribute)
    fn is_simple(&self) -> bool {
        false
    }

    /// Whether this construct parses into a sequence
    fn is_array(&self) -> bool {
        false
    }

    /// Whether building tolerates a missing entry (constants, computed and
    /// rebuilt fields, padding)
    fn builds_from_none(&self) -> bool {
        false
    }

    /// Whether this construct neither consumes nor produces anything
    /// ([`Pass`](crate::Pass)); conditionals use this to spot optional
    /// branches
    fn is_noop(&self) -> bool {
        false
    }

    /// The construct behind a [`Renamed`] wrapper, `None` for anything else.
    /// [`FocusedSeq`](crate::FocusedSeq) strips the focused member's rename
    /// with this so a caller-supplied element name wins.
    fn renamed_inner(&self) -> Option<&dyn Construct> {
        None
    }

    /// Candidate element tags for this construct, outermost name first
    fn tag_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// A short label used in error messages and as the element tag of
    /// unnamed items
    fn type_tag(&self) -> &'static str {
        "Item"
    }
}

/// Entry points available on every [`Construct`].
pub trait ConstructExt: Construct {
    /// Parses an in-memory buffer
    fn parse_bytes(&self, data: &[u8]) -> Result<Value, Error> {
        let mut stream = Stream::from_bytes(data.to_vec());
        self.parse_stream(&mut stream)
    }

    /// Parses from an existing stream at its cursor
    fn parse_stream(&self, stream: &mut Stream) -> Result<Value, Error> {
        let ctx = Context::root();
        self.parse(stream, &ctx)
    }

    /// Parses the contents of a file
    fn parse_file<P: AsRef<FsPath>>(&self, path: P) -> Result<Value, Error> {
        let data = std::fs::read(path)?;
        self.parse_bytes(&data)
    }

    /// Runs both preprocessing sweeps, returning the annotated value and the
    /// root meta record. The result carries deferred expressions in place of
    /// rebuilt fields and offset/size meta on every container.
    fn preprocessed(&self, obj: Value) -> Result<(Value, Meta), Error> {
        let ctx = Context::root();
        let obj = self.preprocess(obj, &ctx)?;
        self.preprocess_size(obj, &ctx, 0)
    }

    /// Preprocesses and builds a value into a fresh buffer
    fn build_bytes(&self, obj: &Value) -> Result<Vec<u8>, Error> {
        let mut stream = Stream::new();
        self.build_stream(obj, &mut stream)?;
        Ok(stream.into_bytes())
    }

    /// Preprocesses and builds a value into an existing stream
    fn build_stream(&self, obj: &Value, stream: &mut Stream) -> Result<(), Error> {
        let (obj, _) = self.preprocessed(obj.clone())?;
        let ctx = Context::root();
        self.build(&obj, stream, &ctx)
    }

    /// Preprocesses and builds a value into a file
    fn build_file<P: AsRef<FsPath>>(&self, obj: &Value, path: P) -> Result<(), Error> {
        let data = self.build_bytes(obj)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// The value-independent size
    fn static_size(&self) -> Result<u64, Error> {
        self.static_sizeof(&Context::root())
    }

    /// The size a concrete value occupies
    fn size_of(&self, obj: &Value) -> Result<u64, Error> {
        self.sizeof(obj, &Context::root())
    }

    /// The size a concrete value occupies, pointed-to regions included
    fn full_size_of(&self, obj: &Value) -> Result<u64, Error> {
        self.full_sizeof(obj, &Context::root())
    }

    /// Renders a value into an element tree rooted at `name`
    fn to_xml(&self, obj: &Value, name: &str) -> Result<Element, Error> {
        let ctx = Context::root();
        let mut root = Element::new(name);
        match self.to_element(obj, &mut root, name, &ctx)? {
            Some(elem) => Ok(elem),
            None => Ok(root),
        }
    }

    /// Reads a value back out of an element tree
    fn from_xml(&self, elem: &Element) -> Result<Value, Error> {
        let mut out = Container::new();
        self.from_element(elem, elem.tag(), &mut out, true)?;
        out.remove(elem.tag())
            .ok_or_else(|| Error::xml(format!("element {} produced no value", elem.tag())))
    }
}

impl<T: Construct + ?Sized> ConstructExt for T {}

impl<T: Construct + ?Sized> Construct for Box<T> {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        (**self).parse(stream, ctx)
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        (**self).build(obj, stream, ctx)
    }

    fn preprocess(&self, obj: Value, ctx: &Context) -> Result<Value, Error> {
        (**self).preprocess(obj, ctx)
    }

    fn preprocess_size(
        &self,
        obj: Value,
        ctx: &Context,
        offset: u64,
    ) -> Result<(Value, Meta), Error> {
        (**self).preprocess_size(obj, ctx, offset)
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        (**self).static_sizeof(ctx)
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        (**self).sizeof(obj, ctx)
    }

    fn full_sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        (**self).full_sizeof(obj, ctx)
    }

    fn expected_sizeof(&self, stream: &mut Stream, ctx: &Context) -> Result<u64, Error> {
        (**self).expected_sizeof(stream, ctx)
    }

    fn to_element(
        &self,
        obj: &Value,
        parent: &mut Element,
        name: &str,
        ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        (**self).to_element(obj, parent, name, ctx)
    }

    fn from_element(
        &self,
        parent: &Element,
        name: &str,
        out: &mut Container,
        is_root: bool,
    ) -> Result<(), Error> {
        (**self).from_element(parent, name, out, is_root)
    }

    fn attr_encode(&self, obj: &Value) -> Result<String, Error> {
        (**self).attr_encode(obj)
    }

    fn attr_decode(&self, s: &str) -> Result<Value, Error> {
        (**self).attr_decode(s)
    }

    fn name(&self) -> Option<&str> {
        (**self).name()
    }

    fn is_struct(&self) -> bool {
        (**self).is_struct()
    }

    fn is_simple(&self) -> bool {
        (**self).is_simple()
    }

    fn is_array(&self) -> bool {
        (**self).is_array()
    }

    fn builds_from_none(&self) -> bool {
        (**self).builds_from_none()
    }

    fn is_noop(&self) -> bool {
        (**self).is_noop()
    }

    fn renamed_inner(&self) -> Option<&dyn Construct> {
        (**self).renamed_inner()
    }

    fn tag_names(&self) -> Vec<String> {
        (**self).tag_names()
    }

    fn type_tag(&self) -> &'static str {
        (**self).type_tag()
    }
}

/// Attaches a field name to a construct. Only meaningful inside record-like
/// containers and for element emission; everything else defers to the inner
/// construct.
#[derive(Debug)]
pub struct Renamed {
    name: String,
    subcon: Box<dyn Construct>,
}

impl Renamed {
    /// Wraps `subcon` under `name`
    pub fn new<C: Construct + 'static>(name: impl Into<String>, subcon: C) -> Renamed {
        Renamed {
            name: name.into(),
            subcon: Box::new(subcon),
        }
    }
}

/// Shorthand for a named member of a [`Struct`](crate::Struct) or
/// [`FocusedSeq`](crate::FocusedSeq):
/// `field("width", byte())` is `Box::new(Renamed::new("width", byte()))`.
pub fn field<C: Construct + 'static>(name: &str, subcon: C) -> Box<dyn Construct> {
    Box::new(Renamed::new(name, subcon))
}

impl Construct for Renamed {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        self.subcon.parse(stream, ctx)
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        self.subcon.build(obj, stream, ctx)
    }

    fn preprocess(&self, obj: Value, ctx: &Context) -> Result<Value, Error> {
        self.subcon.preprocess(obj, ctx)
    }

    fn preprocess_size(
        &self,
        obj: Value,
        ctx: &Context,
        offset: u64,
    ) -> Result<(Value, Meta), Error> {
        self.subcon.preprocess_size(obj, ctx, offset)
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        self.subcon.static_sizeof(ctx)
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        self.subcon.sizeof(obj, ctx)
    }

    fn full_sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        self.subcon.full_sizeof(obj, ctx)
    }

    fn expected_sizeof(&self, stream: &mut Stream, ctx: &Context) -> Result<u64, Error> {
        self.subcon.expected_sizeof(stream, ctx)
    }

    fn to_element(
        &self,
        obj: &Value,
        parent: &mut Element,
        _name: &str,
        ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        self.subcon.to_element(obj, parent, &self.name, ctx)
    }

    fn from_element(
        &self,
        parent: &Element,
        name: &str,
        out: &mut Container,
        is_root: bool,
    ) -> Result<(), Error> {
        self.subcon.from_element(parent, &self.name, out, is_root)?;
        if name != self.name {
            out.rename(&self.name, name);
        }
        Ok(())
    }

    fn attr_encode(&self, obj: &Value) -> Result<String, Error> {
        self.subcon.attr_encode(obj)
    }

    fn attr_decode(&self, s: &str) -> Result<Value, Error> {
        self.subcon.attr_decode(s)
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn is_struct(&self) -> bool {
        self.subcon.is_struct()
    }

    fn is_simple(&self) -> bool {
        self.subcon.is_simple()
    }

    fn is_array(&self) -> bool {
        self.subcon.is_array()
    }

    fn builds_from_none(&self) -> bool {
        self.subcon.builds_from_none()
    }

    fn is_noop(&self) -> bool {
        self.subcon.is_noop()
    }

    fn renamed_inner(&self) -> Option<&dyn Construct> {
        Some(&*self.subcon)
    }

    fn tag_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        names.extend(self.subcon.tag_names());
        names
    }

    fn type_tag(&self) -> &'static str {
        self.subcon.type_tag()
    }
}
