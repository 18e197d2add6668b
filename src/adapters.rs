use crate::{Construct, Container, Context, Error, Stream, Value};

/// Maps integer values to symbolic labels over an integer field.
///
/// Parsing returns the label as a string when the integer is mapped and the
/// raw integer otherwise (an unknown discriminant is data, not an error).
/// Building accepts a label (mapping failures are fatal) or passes a raw
/// integer through.
///
/// ```
/// use binform::{byte, ConstructExt, Enum, Value};
///
/// let d = Enum::new(byte(), &[("one", 1), ("two", 2)]);
/// assert_eq!(d.parse_bytes(&[1]).unwrap(), Value::Str("one".into()));
/// assert_eq!(d.parse_bytes(&[9]).unwrap(), Value::Int(9));
/// assert_eq!(d.build_bytes(&Value::Str("two".into())).unwrap(), vec![2]);
/// ```
#[derive(Debug)]
pub struct Enum {
    subcon: Box<dyn Construct>,
    labels: Vec<(String, i64)>,
}

impl Enum {
    /// Labels the values of an integer field
    pub fn new<C: Construct + 'static>(subcon: C, labels: &[(&str, i64)]) -> Enum {
        Enum {
            subcon: Box::new(subcon),
            labels: labels
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
        }
    }

    fn decode(&self, x: i64) -> Value {
        match self.labels.iter().find(|(_, v)| *v == x) {
            Some((name, _)) => Value::Str(name.clone()),
            None => Value::Int(x),
        }
    }

    fn encode(&self, obj: &Value) -> Result<i64, Error> {
        match obj {
            Value::Int(x) => Ok(*x),
            Value::Str(s) => self
                .labels
                .iter()
                .find(|(name, _)| name == s)
                .map(|(_, v)| *v)
                .ok_or_else(|| Error::mapping(format!("no mapping for label {}", s))),
            other => Err(Error::format(format!(
                "expected label or int, got {}",
                other.type_name()
            ))),
        }
    }
}

impl Construct for Enum {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let x = self.subcon.parse(stream, ctx)?.as_int()?;
        Ok(self.decode(x))
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let x = self.encode(obj)?;
        self.subcon.build(&Value::Int(x), stream, ctx)
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        self.subcon.static_sizeof(ctx)
    }

    fn attr_encode(&self, obj: &Value) -> Result<String, Error> {
        match obj {
            Value::Str(s) => Ok(s.clone()),
            Value::Int(x) => Ok(x.to_string()),
            other => Err(Error::format(format!(
                "expected label or int, got {}",
                other.type_name()
            ))),
        }
    }

    fn attr_decode(&self, s: &str) -> Result<Value, Error> {
        if self.labels.iter().any(|(name, _)| name == s) {
            return Ok(Value::Str(s.to_string()));
        }
        s.parse::<i64>()
            .map(Value::Int)
            .map_err(|_| Error::xml(format!("unknown enum literal: {}", s)))
    }

    fn is_simple(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "Enum"
    }
}

/// Decomposes an integer field into named bit flags.
///
/// Parsing returns a record of one boolean per flag. Building accepts such
/// a record, a `"one|two"` label string, or a raw integer. Preprocessing
/// normalizes the value through the label mapping, so bits without a label
/// do not survive a preprocess-then-build round trip: building `255` over
/// `one|two|four|eight` yields `0x0f`.
///
/// ```
/// use binform::{byte, container, ConstructExt, FlagsEnum, Value};
///
/// let d = FlagsEnum::new(byte(), &[("one", 1), ("two", 2), ("four", 4), ("eight", 8)]);
/// let v = d.parse_bytes(&[3]).unwrap();
/// assert_eq!(
///     v,
///     Value::Struct(container! {
///         "one" => true, "two" => true, "four" => false, "eight" => false,
///     })
/// );
/// assert_eq!(d.build_bytes(&Value::Int(255)).unwrap(), vec![0x0f]);
/// ```
#[derive(Debug)]
pub struct FlagsEnum {
    subcon: Box<dyn Construct>,
    flags: Vec<(String, i64)>,
}

impl FlagsEnum {
    /// Names the bits of an integer field
    pub fn new<C: Construct + 'static>(subcon: C, flags: &[(&str, i64)]) -> FlagsEnum {
        FlagsEnum {
            subcon: Box::new(subcon),
            flags: flags
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
        }
    }

    fn decode(&self, x: i64) -> Container {
        let mut out = Container::new();
        for (name, bit) in &self.flags {
            out.set(name, Value::Bool(x & bit == *bit));
        }
        out
    }

    fn encode(&self, obj: &Value) -> Result<i64, Error> {
        match obj {
            Value::Int(x) => Ok(*x),
            Value::Str(s) => {
                let mut out = 0;
                for part in s.split('|').map(str::trim).filter(|p| !p.is_empty()) {
                    let bit = self
                        .flags
                        .iter()
                        .find(|(name, _)| name == part)
                        .map(|(_, v)| *v)
                        .ok_or_else(|| Error::mapping(format!("no flag named {}", part)))?;
                    out |= bit;
                }
                Ok(out)
            }
            Value::Struct(c) => {
                let mut out = 0;
                for (name, v) in c.iter() {
                    if name.starts_with('_') || !v.as_bool()? {
                        continue;
                    }
                    let bit = self
                        .flags
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| *v)
                        .ok_or_else(|| Error::mapping(format!("no flag named {}", name)))?;
                    out |= bit;
                }
                Ok(out)
            }
            other => Err(Error::format(format!(
                "cannot derive flags from {}",
                other.type_name()
            ))),
        }
    }
}

impl Construct for FlagsEnum {
    fn parse(&self, stream: &mut Stream, ctx: &Context) -> Result<Value, Error> {
        let x = self.subcon.parse(stream, ctx)?.as_int()?;
        Ok(Value::Struct(self.decode(x)))
    }

    fn build(&self, obj: &Value, stream: &mut Stream, ctx: &Context) -> Result<(), Error> {
        let x = self.encode(obj)?;
        self.subcon.build(&Value::Int(x), stream, ctx)
    }

    fn preprocess(&self, obj: Value, _ctx: &Context) -> Result<Value, Error> {
        if obj.is_none() {
            return Ok(obj);
        }
        let x = self.encode(&obj)?;
        Ok(Value::Struct(self.decode(x)))
    }

    fn static_sizeof(&self, ctx: &Context) -> Result<u64, Error> {
        self.subcon.static_sizeof(ctx)
    }

    fn attr_encode(&self, obj: &Value) -> Result<String, Error> {
        let x = self.encode(obj)?;
        let set: Vec<&str> = self
            .flags
            .iter()
            .filter(|(_, bit)| x & bit == *bit)
            .map(|(name, _)| name.as_str())
            .collect();
        Ok(set.join("|"))
    }

    fn attr_decode(&self, s: &str) -> Result<Value, Error> {
        let x = self
            .encode(&Value::Str(s.to_string()))
            .map_err(|_| Error::xml(format!("unknown flags literal: {}", s)))?;
        Ok(Value::Struct(self.decode(x)))
    }

    fn is_simple(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "FlagsEnum"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{byte, container, ConstructExt};

    #[test]
    fn test_enum_roundtrip() {
        let d = Enum::new(byte(), &[("giraffe", 1)]);
        assert_eq!(d.parse_bytes(&[1]).unwrap(), Value::Str("giraffe".into()));
        assert_eq!(
            d.build_bytes(&Value::Str("giraffe".into())).unwrap(),
            vec![1]
        );
        assert!(d.build_bytes(&Value::Str("lion".into())).is_err());
        assert_eq!(d.build_bytes(&Value::Int(42)).unwrap(), vec![42]);
    }

    #[test]
    fn test_flags_parse() {
        let d = FlagsEnum::new(byte(), &[("one", 1), ("two", 2)]);
        let v = d.parse_bytes(&[3]).unwrap();
        assert_eq!(
            v,
            Value::Struct(container! { "one" => true, "two" => true })
        );
    }

    #[test]
    fn test_flags_build_from_labels() {
        let d = FlagsEnum::new(byte(), &[("one", 1), ("two", 2)]);
        assert_eq!(
            d.build_bytes(&Value::Str("one|two".into())).unwrap(),
            vec![3]
        );
        assert_eq!(
            d.build_bytes(&Value::Struct(container! { "two" => true, "one" => false }))
                .unwrap(),
            vec![2]
        );
    }

    #[test]
    fn test_flags_normalize_unknown_bits() {
        let d = FlagsEnum::new(
            byte(),
            &[("one", 1), ("two", 2), ("four", 4), ("eight", 8)],
        );
        assert_eq!(d.build_bytes(&Value::Int(255)).unwrap(), vec![0x0f]);
    }
}
