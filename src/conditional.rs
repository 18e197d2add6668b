use crate::{misc::Pass, Construct, Container, Context, Element, Error, Expr, Meta, Stream, Value};

/// A two-way conditional: parse and build evaluate the condition and defer
/// to the matching branch.
///
/// [`IfThenElse::when`] gives the if-without-else form whose false branch is
/// [`Pass`].
///
/// For element-tree round-trips there is an opt-in
/// [`rebuild_hack`](IfThenElse::with_rebuild_hack): reading back chooses the
/// branch by element tag or attribute presence instead of evaluating the
/// condition, for descriptions where the condition consults data (typically
/// a rebuilt discriminant) that does not exist yet while the record is
/// under construction.
#[derive(Debug)]
pub struct IfThenElse {
    cond: Expr,
    then_sc: Box<dyn Construct>,
    else_sc: Box<dyn Construct>,
    rebuild_hack: bool,
}

impl IfThenElse {
    /// Branches to `then_sc` or `else_sc` on the condition
    pub fn new<E, T, F>(cond: E, then_sc: T, else_sc: F) -> IfThenElse
    where
        E: Into<Expr>,
        T: Construct + 'static,
        F: Construct + 'static,
    {
        IfThenElse {
            cond: cond.into(),
            then_sc: Box::new(then_sc),
            else_sc: Box::new(else_sc),
            rebuild_hack: false,
        }
    }

    /// The if-without-else form: parses `subcon` when the condition holds
    /// and nothing otherwise
    pub fn when<E, T>(cond: E, subcon: T) -> IfThenElse
    where
        E: Into<Expr>,
        T: Construct + 'static,
    {
        IfThenElse::new(cond, subcon, Pass)
    }

    /// Opts into choosing the branch by element shape when reading back
    /// from an element tree
    pub fn with_rebuild_hack(mut self) -> IfThenElse {
        self.rebuild_hack = true;
        self
    }

    fn pick(&self, ctx: &Context) -> Result<&dyn Construct, Error> {
        if self.cond.eval_bool(ctx)? {
            Ok(&*self.then_sc)
        } else {
            Ok(&*self.else_sc)
        }
    }

    /// Reads one branch back out by its element tag or attributes; used when
    /// the condition cannot be evaluated yet
    fn from_element_by_shape(
        &self,
        parent: &Element,
        name: &str,
        out: &mut Container,
        is_root: bool,
    ) -> Result<(), Error> {
        let mut candidates: Vec<&dyn Construct> = Vec::new();
        if self.then_sc.is_noop() {
            candidates.push(&*self.else_sc);
        } else if self.else_sc.is_noop() {
            candidates.push(&*self.then_sc);
        } else {
            candidates.push(&*self.then_sc);
            candidates.push(&*self.else_sc);
        }
        let optional = candidates.len() == 1;

        for sc in &candidates {
            if sc.is_simple() || sc.is_array() {
                let names = sc.tag_names();
                let present = if names.is_empty() {
                    true
                } else {
                    names.iter().any(|n| parent.attr(n).is_some())
                };
                if present {
                    return sc.from_element(parent, name, out, false);
                }
            } else {
                let tag = sc.name().unwrap_or(name);
                let elem = if is_root { Some(parent) } else { parent.find(tag) };
                if let Some(elem) = elem {
                    return sc.from_element(elem, name, out, true);
                }
            }
        }

        if optional {
            // the branch that produced nothing was the no-op one
            Ok(())
        } else {
            Err(Error::xml(format!(
                "no element or attribute matched either branch of {}",
                name
            )))
        }
    }
}

impl Construct for IfThenElse {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        self.pick(ctx)?.parse(stream, ctx)
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        self.pick(ctx)?.build(obj, stream, ctx)
    }

    fn preprocess(&self, obj: Value, ctx: &Context) -> Result<Value, Error> {
        self.pick(ctx)?.preprocess(obj, ctx)
    }

    fn preprocess_size(
        &self,
        obj: Value,
        ctx: &Context,
        offset: u64,
    ) -> Result<(Value, Meta), Error> {
        self.pick(ctx)?.preprocess_size(obj, ctx, offset)
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        match self.pick(ctx) {
            Ok(sc) => sc.static_sizeof(ctx),
            Err(_) => Err(Error::unknown_size("conditional branch is context dependent")),
        }
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        self.pick(ctx)?.sizeof(obj, ctx)
    }

    fn full_sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        self.pick(ctx)?.full_sizeof(obj, ctx)
    }

    fn to_element(
        &self,
        obj: &Value,
        parent: &mut Element,
        name: &str,
        ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        self.pick(ctx)?.to_element(obj, parent, name, ctx)
    }

    fn from_element(
        &self,
        parent: &Element,
        name: &str,
        out: &mut Container,
        is_root: bool,
    ) -> Result<(), Error> {
        if self.rebuild_hack {
            return self.from_element_by_shape(parent, name, out, is_root);
        }
        let taken = {
            let root = Context::root();
            let ctx = root.enter_struct(out);
            self.cond.eval_bool(&ctx)?
        };
        let sc = if taken { &self.then_sc } else { &self.else_sc };
        sc.from_element(parent, name, out, false)
    }

    fn builds_from_none(&self) -> bool {
        self.then_sc.builds_from_none() && self.else_sc.builds_from_none()
    }

    fn tag_names(&self) -> Vec<String> {
        let mut names = self.then_sc.tag_names();
        names.extend(self.else_sc.tag_names());
        names
    }

    fn type_tag(&self) -> &'static str {
        "IfThenElse"
    }
}

/// A multi-way branch selected by a key expression.
///
/// Cases are tried in declaration order against the evaluated key; a
/// missing match falls to the default, and without a default the switch
/// fails. For element-tree interchange each case must be named (use
/// [`field`](crate::field)): the case name becomes the child element tag,
/// and reading back records the chosen name into the enclosing record as
/// `_switchid_<field>` so that a [`Rebuild`](crate::Rebuild) on the
/// discriminant can recover the key.
#[derive(Debug)]
pub struct Switch {
    key: Expr,
    cases: Vec<(Value, Box<dyn Construct>)>,
    default: Option<Box<dyn Construct>>,
}

impl Switch {
    /// A switch branching on `key`
    pub fn new<E: Into<Expr>>(key: E) -> Switch {
        Switch {
            key: key.into(),
            cases: Vec::new(),
            default: None,
        }
    }

    /// Adds a case; name it with [`field`](crate::field) when the switch
    /// participates in element-tree interchange
    pub fn case<K: Into<Value>>(mut self, key: K, subcon: Box<dyn Construct>) -> Switch {
        self.cases.push((key.into(), subcon));
        self
    }

    /// Sets the construct used when no case matches
    pub fn default<C: Construct + 'static>(mut self, subcon: C) -> Switch {
        self.default = Some(Box::new(subcon));
        self
    }

    fn select(&self, ctx: &Context) -> Result<&dyn Construct, Error> {
        let key = self.key.eval(ctx)?;
        for (k, sc) in &self.cases {
            if *k == key {
                return Ok(&**sc);
            }
        }
        match &self.default {
            Some(sc) => Ok(&**sc),
            None => Err(Error::switch(format!(
                "no case matched key {} and no default was given",
                key
            ))),
        }
    }
}

impl Construct for Switch {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        self.select(ctx)?.parse(stream, ctx)
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        self.select(ctx)?.build(obj, stream, ctx)
    }

    fn preprocess(&self, obj: Value, ctx: &Context) -> Result<Value, Error> {
        self.select(ctx)?.preprocess(obj, ctx)
    }

    fn preprocess_size(
        &self,
        obj: Value,
        ctx: &Context,
        offset: u64,
    ) -> Result<(Value, Meta), Error> {
        self.select(ctx)?.preprocess_size(obj, ctx, offset)
    }

    fn static_sizeof(&self, _ctx: &Context) -> Result<u64, Error> {
        Err(Error::unknown_size("switch case is context dependent"))
    }

    fn sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        self.select(ctx)?.sizeof(obj, ctx)
    }

    fn full_sizeof(&self, obj: &Value, ctx: &Context) -> Result<u64, Error> {
        self.select(ctx)?.full_sizeof(obj, ctx)
    }

    fn to_element(
        &self,
        obj: &Value,
        parent: &mut Element,
        name: &str,
        ctx: &Context,
    ) -> Result<Option<Element>, Error> {
        self.select(ctx)?.to_element(obj, parent, name, ctx)
    }

    fn from_element(
        &self,
        parent: &Element,
        name: &str,
        out: &mut Container,
        is_root: bool,
    ) -> Result<(), Error> {
        for (_, case) in &self.cases {
            let case_name = match case.name() {
                Some(n) => n,
                None => continue,
            };

            if case.is_simple() || case.is_array() {
                if parent.attr(case_name).is_none() {
                    continue;
                }
                out.set(&format!("_switchid_{}", name), case_name);
                return case.from_element(parent, name, out, false);
            }

            let elem = if is_root {
                parent
            } else {
                match parent.find(case_name) {
                    Some(e) => e,
                    None => continue,
                }
            };
            out.set(&format!("_switchid_{}", name), case_name);
            return case.from_element(elem, name, out, true);
        }
        Err(Error::xml(format!(
            "no case element matched for switch {}",
            name
        )))
    }

    fn tag_names(&self) -> Vec<String> {
        self.cases
            .iter()
            .filter_map(|(_, sc)| sc.name().map(String::from))
            .collect()
    }

    fn type_tag(&self) -> &'static str {
        "Switch"
    }
}
