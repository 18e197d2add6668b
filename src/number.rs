use crate::{Construct, Context, Error, Stream, Value};
use byteorder::{ByteOrder, BE, LE};

/// Byte order of a fixed-width field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Most significant byte first
    Big,
    /// Least significant byte first
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumKind {
    Unsigned,
    Signed,
    Float,
}

/// A fixed-width number field.
///
/// Parsing reads the field's width in bytes and decodes per endianness and
/// signedness into [`Value::Int`] (or [`Value::Float`] for the IEEE 754
/// widths); building encodes and rejects out-of-range values. The static
/// size is the width.
///
/// Use the constructors ([`byte`], [`be_u16`], [`le_u32`], [`le_f32`], …)
/// rather than spelling the struct out.
///
/// ```
/// use binform::{be_u16, ConstructExt, Value};
///
/// assert_eq!(be_u16().parse_bytes(&[0x01, 0x02]).unwrap(), Value::Int(258));
/// assert_eq!(be_u16().build_bytes(&Value::Int(258)).unwrap(), vec![0x01, 0x02]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatField {
    width: u8,
    endian: Endian,
    kind: NumKind,
}

macro_rules! number_ctor {
    ($($(#[$docs:meta])* $name:ident => ($width:expr, $endian:expr, $kind:expr)),* $(,)?) => {
        $(
        $(#[$docs])*
        pub fn $name() -> FormatField {
            FormatField { width: $width, endian: $endian, kind: $kind }
        }
        )*
    };
}

number_ctor! {
    /// An unsigned byte
    byte => (1, Endian::Big, NumKind::Unsigned),
    /// A signed byte
    int8 => (1, Endian::Big, NumKind::Signed),
    /// A big-endian unsigned 16 bit integer
    be_u16 => (2, Endian::Big, NumKind::Unsigned),
    /// A little-endian unsigned 16 bit integer
    le_u16 => (2, Endian::Little, NumKind::Unsigned),
    /// A big-endian unsigned 32 bit integer
    be_u32 => (4, Endian::Big, NumKind::Unsigned),
    /// A little-endian unsigned 32 bit integer
    le_u32 => (4, Endian::Little, NumKind::Unsigned),
    /// A big-endian unsigned 64 bit integer
    be_u64 => (8, Endian::Big, NumKind::Unsigned),
    /// A little-endian unsigned 64 bit integer
    le_u64 => (8, Endian::Little, NumKind::Unsigned),
    /// A big-endian signed 16 bit integer
    be_i16 => (2, Endian::Big, NumKind::Signed),
    /// A little-endian signed 16 bit integer
    le_i16 => (2, Endian::Little, NumKind::Signed),
    /// A big-endian signed 32 bit integer
    be_i32 => (4, Endian::Big, NumKind::Signed),
    /// A little-endian signed 32 bit integer
    le_i32 => (4, Endian::Little, NumKind::Signed),
    /// A big-endian signed 64 bit integer
    be_i64 => (8, Endian::Big, NumKind::Signed),
    /// A little-endian signed 64 bit integer
    le_i64 => (8, Endian::Little, NumKind::Signed),
    /// A big-endian IEEE 754 single
    be_f32 => (4, Endian::Big, NumKind::Float),
    /// A little-endian IEEE 754 single
    le_f32 => (4, Endian::Little, NumKind::Float),
    /// A big-endian IEEE 754 double
    be_f64 => (8, Endian::Big, NumKind::Float),
    /// A little-endian IEEE 754 double
    le_f64 => (8, Endian::Little, NumKind::Float),
}

impl FormatField {
    fn decode(&self, data: &[u8]) -> Result<Value, Error> {
        let v = match (self.kind, self.width, self.endian) {
            (NumKind::Unsigned, 1, _) => Value::Int(i64::from(data[0])),
            (NumKind::Signed, 1, _) => Value::Int(i64::from(data[0] as i8)),
            (NumKind::Unsigned, 2, Endian::Big) => Value::Int(i64::from(BE::read_u16(data))),
            (NumKind::Unsigned, 2, Endian::Little) => Value::Int(i64::from(LE::read_u16(data))),
            (NumKind::Signed, 2, Endian::Big) => Value::Int(i64::from(BE::read_i16(data))),
            (NumKind::Signed, 2, Endian::Little) => Value::Int(i64::from(LE::read_i16(data))),
            (NumKind::Unsigned, 4, Endian::Big) => Value::Int(i64::from(BE::read_u32(data))),
            (NumKind::Unsigned, 4, Endian::Little) => Value::Int(i64::from(LE::read_u32(data))),
            (NumKind::Signed, 4, Endian::Big) => Value::Int(i64::from(BE::read_i32(data))),
            (NumKind::Signed, 4, Endian::Little) => Value::Int(i64::from(LE::read_i32(data))),
            (NumKind::Unsigned, 8, Endian::Big) => decode_u64(BE::read_u64(data))?,
            (NumKind::Unsigned, 8, Endian::Little) => decode_u64(LE::read_u64(data))?,
            (NumKind::Signed, 8, Endian::Big) => Value::Int(BE::read_i64(data)),
            (NumKind::Signed, 8, Endian::Little) => Value::Int(LE::read_i64(data)),
            (NumKind::Float, 4, Endian::Big) => Value::Float(f64::from(BE::read_f32(data))),
            (NumKind::Float, 4, Endian::Little) => Value::Float(f64::from(LE::read_f32(data))),
            (NumKind::Float, 8, Endian::Big) => Value::Float(BE::read_f64(data)),
            (NumKind::Float, 8, Endian::Little) => Value::Float(LE::read_f64(data)),
            _ => return Err(Error::format(format!("unsupported field width {}", self.width))),
        };
        Ok(v)
    }

    fn encode(&self, obj: &Value) -> Result<Vec<u8>, Error> {
        let mut out = vec![0u8; usize::from(self.width)];
        if self.kind == NumKind::Float {
            let x = obj.as_float()?;
            match (self.width, self.endian) {
                (4, Endian::Big) => BE::write_f32(&mut out, x as f32),
                (4, Endian::Little) => LE::write_f32(&mut out, x as f32),
                (8, Endian::Big) => BE::write_f64(&mut out, x),
                (8, Endian::Little) => LE::write_f64(&mut out, x),
                _ => return Err(Error::format(format!("unsupported field width {}", self.width))),
            }
            return Ok(out);
        }

        let x = obj.as_int()?;
        self.check_range(x)?;
        match (self.width, self.endian) {
            (1, _) => out[0] = x as u8,
            (2, Endian::Big) => BE::write_u16(&mut out, x as u16),
            (2, Endian::Little) => LE::write_u16(&mut out, x as u16),
            (4, Endian::Big) => BE::write_u32(&mut out, x as u32),
            (4, Endian::Little) => LE::write_u32(&mut out, x as u32),
            (8, Endian::Big) => BE::write_u64(&mut out, x as u64),
            (8, Endian::Little) => LE::write_u64(&mut out, x as u64),
            _ => return Err(Error::format(format!("unsupported field width {}", self.width))),
        }
        Ok(out)
    }

    fn check_range(&self, x: i64) -> Result<(), Error> {
        let bits = u32::from(self.width) * 8;
        let ok = match self.kind {
            NumKind::Unsigned => {
                x >= 0 && (bits == 64 || x < (1i64 << bits))
            }
            NumKind::Signed => {
                bits == 64 || ((-(1i64 << (bits - 1))..(1i64 << (bits - 1))).contains(&x))
            }
            NumKind::Float => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::format(format!(
                "value {} out of range for a {} bit field",
                x, bits
            )))
        }
    }
}

fn decode_u64(x: u64) -> Result<Value, Error> {
    i64::try_from(x)
        .map(Value::Int)
        .map_err(|_| Error::format(format!("value {} out of representable range", x)))
}

impl Construct for FormatField {
    fn parse(&self, stream: &mut Stream, _ctx: &Context) -> Result<Value, Error> {
        let data = stream.read(usize::from(self.width))?;
        self.decode(&data)
    }

    fn build(&self, obj: &Value, stream: &mut Stream, _ctx: &Context) -> Result<(), Error> {
        let data = self.encode(obj)?;
        stream.write(&data)
    }

    fn static_sizeof(&self, _ctx: &Context) -> Result<u64, Error> {
        Ok(u64::from(self.width))
    }

    fn attr_encode(&self, obj: &Value) -> Result<String, Error> {
        match self.kind {
            NumKind::Float => Ok(obj.as_float()?.to_string()),
            _ => Ok(obj.as_int()?.to_string()),
        }
    }

    fn attr_decode(&self, s: &str) -> Result<Value, Error> {
        match self.kind {
            NumKind::Float => s
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| Error::xml(format!("unparseable float literal: {}", s))),
            _ => s
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| Error::xml(format!("unparseable integer literal: {}", s))),
        }
    }

    fn is_simple(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "FormatField"
    }
}

/// A one-byte boolean: zero is false, anything else parses as true, and
/// building writes one or zero. Inside a bit view it occupies a single bit
/// instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flag;

impl Construct for Flag {
    fn parse(&self, stream: &mut Stream, _ctx: &Context) -> Result<Value, Error> {
        if stream.in_bits() {
            Ok(Value::Bool(stream.read_bits(1)? != 0))
        } else {
            Ok(Value::Bool(stream.read(1)?[0] != 0))
        }
    }

    fn build(&self, obj: &Value, stream: &mut Stream, _ctx: &Context) -> Result<(), Error> {
        let set = obj.as_bool()?;
        if stream.in_bits() {
            stream.write_bits(u64::from(set), 1)
        } else {
            stream.write(&[u8::from(set)])
        }
    }

    fn static_sizeof(&self, _ctx: &Context) -> Result<u64, Error> {
        Ok(1)
    }

    fn attr_encode(&self, obj: &Value) -> Result<String, Error> {
        Ok(if obj.as_bool()? { "true" } else { "false" }.to_string())
    }

    fn attr_decode(&self, s: &str) -> Result<Value, Error> {
        match s {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(Error::xml(format!("unparseable flag literal: {}", s))),
        }
    }

    fn is_simple(&self) -> bool {
        true
    }

    fn type_tag(&self) -> &'static str {
        "Flag"
    }
}
