//! Shapes, element types and shape indices.
//!
//! A [`Shape`] is either an array of a [`PrimitiveType`], a tuple of nested
//! shapes, or a token. Leaves of a shape are addressed by a [`ShapeIndex`],
//! the path of tuple element positions from the root.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Element type of an array shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Pred,
    S4,
    S8,
    S16,
    S32,
    S64,
    U4,
    U8,
    U16,
    U32,
    U64,
    F8E5M2,
    F8E4M3FN,
    F8E4M3B11FNUZ,
    F8E5M2FNUZ,
    F8E4M3FNUZ,
    F16,
    BF16,
    F32,
    F64,
    C64,
    C128,
}

impl PrimitiveType {
    /// Width of one element in bytes, `None` for sub-byte types.
    pub fn byte_width(self) -> Option<u64> {
        use PrimitiveType::*;
        match self {
            S4 | U4 => None,
            Pred | S8 | U8 => Some(1),
            F8E5M2 | F8E4M3FN | F8E4M3B11FNUZ | F8E5M2FNUZ | F8E4M3FNUZ => Some(1),
            S16 | U16 | F16 | BF16 => Some(2),
            S32 | U32 | F32 => Some(4),
            S64 | U64 | F64 | C64 => Some(8),
            C128 => Some(16),
        }
    }

    pub fn is_f8(self) -> bool {
        use PrimitiveType::*;
        matches!(self, F8E5M2 | F8E4M3FN | F8E4M3B11FNUZ | F8E5M2FNUZ | F8E4M3FNUZ)
    }

    /// Short textual name as used in signatures (`f32`, `i8`, `ui16`, ...).
    pub fn name(self) -> &'static str {
        use PrimitiveType::*;
        match self {
            Pred => "i1",
            S4 => "i4",
            S8 => "i8",
            S16 => "i16",
            S32 => "i32",
            S64 => "i64",
            U4 => "ui4",
            U8 => "ui8",
            U16 => "ui16",
            U32 => "ui32",
            U64 => "ui64",
            F8E5M2 => "f8E5M2",
            F8E4M3FN => "f8E4M3FN",
            F8E4M3B11FNUZ => "f8E4M3B11FNUZ",
            F8E5M2FNUZ => "f8E5M2FNUZ",
            F8E4M3FNUZ => "f8E4M3FNUZ",
            F16 => "f16",
            BF16 => "bf16",
            F32 => "f32",
            F64 => "f64",
            C64 => "complex<f32>",
            C128 => "complex<f64>",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        use PrimitiveType::*;
        let ty = match name {
            "i1" => Pred,
            "i4" => S4,
            "i8" => S8,
            "i16" => S16,
            "i32" => S32,
            "i64" => S64,
            "ui4" => U4,
            "ui8" => U8,
            "ui16" => U16,
            "ui32" => U32,
            "ui64" => U64,
            "f8E5M2" => F8E5M2,
            "f8E4M3FN" => F8E4M3FN,
            "f8E4M3B11FNUZ" => F8E4M3B11FNUZ,
            "f8E5M2FNUZ" => F8E5M2FNUZ,
            "f8E4M3FNUZ" => F8E4M3FNUZ,
            "f16" => F16,
            "bf16" => BF16,
            "f32" => F32,
            "f64" => F64,
            "complex<f32>" => C64,
            "complex<f64>" => C128,
            _ => return None,
        };
        Some(ty)
    }
}

/// Path from the root of a shape to one of its subshapes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeIndex(pub Vec<usize>);

impl ShapeIndex {
    pub fn root() -> Self {
        ShapeIndex(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, i: usize) {
        self.0.push(i);
    }

    pub fn child(&self, i: usize) -> Self {
        let mut index = self.clone();
        index.push(i);
        index
    }
}

impl From<Vec<usize>> for ShapeIndex {
    fn from(v: Vec<usize>) -> Self {
        ShapeIndex(v)
    }
}

impl fmt::Display for ShapeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", idx)?;
        }
        write!(f, "}}")
    }
}

/// Shape of a value in the program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Shape {
    Array {
        element_type: PrimitiveType,
        dims: Vec<u64>,
        /// Per-dimension dynamic flag; `dims` then holds the upper bound.
        dynamic: Vec<bool>,
    },
    Tuple(Vec<Shape>),
    Token,
}

impl Shape {
    pub fn array(element_type: PrimitiveType, dims: &[u64]) -> Self {
        Shape::Array {
            element_type,
            dims: dims.to_vec(),
            dynamic: vec![false; dims.len()],
        }
    }

    pub fn scalar(element_type: PrimitiveType) -> Self {
        Shape::array(element_type, &[])
    }

    pub fn tuple(elements: Vec<Shape>) -> Self {
        Shape::Tuple(elements)
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Shape::Tuple(_))
    }

    pub fn element_type(&self) -> Option<PrimitiveType> {
        match self {
            Shape::Array { element_type, .. } => Some(*element_type),
            _ => None,
        }
    }

    /// Number of elements of an array shape; tuples and tokens have none.
    /// `None` when the product does not fit in a `u64`.
    pub fn element_count(&self) -> Option<u64> {
        match self {
            Shape::Array { dims, .. } => dims.iter().try_fold(1u64, |acc, &d| acc.checked_mul(d)),
            _ => Some(0),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        match self {
            Shape::Array { dynamic, .. } => dynamic.iter().any(|d| *d),
            Shape::Tuple(elements) => elements.iter().any(Shape::is_dynamic),
            Shape::Token => false,
        }
    }

    pub fn has_primitive_type(&self, ty: PrimitiveType) -> bool {
        match self {
            Shape::Array { element_type, .. } => *element_type == ty,
            Shape::Tuple(elements) => elements.iter().any(|e| e.has_primitive_type(ty)),
            Shape::Token => false,
        }
    }

    pub fn subshape(&self, index: &ShapeIndex) -> Option<&Shape> {
        let mut shape = self;
        for &i in &index.0 {
            match shape {
                Shape::Tuple(elements) => shape = elements.get(i)?,
                _ => return None,
            }
        }
        Some(shape)
    }

    /// All non-tuple subshapes with their indices, in depth-first order.
    pub fn leaves(&self) -> Vec<(ShapeIndex, &Shape)> {
        let mut out = Vec::new();
        collect_leaves(self, ShapeIndex::root(), &mut out);
        out
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            Shape::Tuple(elements) => elements.iter().map(Shape::leaf_count).sum(),
            _ => 1,
        }
    }

    /// Size in bytes of a dense array shape; tuples count one pointer per element.
    pub fn byte_size(&self) -> Option<u64> {
        match self {
            Shape::Array { element_type, .. } => {
                self.element_count()?.checked_mul(element_type.byte_width()?)
            }
            Shape::Tuple(elements) => Some(8 * elements.len() as u64),
            Shape::Token => Some(0),
        }
    }
}

fn collect_leaves<'a>(shape: &'a Shape, index: ShapeIndex, out: &mut Vec<(ShapeIndex, &'a Shape)>) {
    match shape {
        Shape::Tuple(elements) => {
            for (i, element) in elements.iter().enumerate() {
                collect_leaves(element, index.child(i), out);
            }
        }
        _ => out.push((index, shape)),
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Array { element_type, dims, dynamic } => {
                write!(f, "{}[", element_type.name())?;
                for (i, (dim, dyn_dim)) in dims.iter().zip(dynamic).enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    if *dyn_dim {
                        write!(f, "<=")?;
                    }
                    write!(f, "{}", dim)?;
                }
                write!(f, "]")
            }
            Shape::Tuple(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, ")")
            }
            Shape::Token => write!(f, "token[]"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid shape `{text}`: {reason}")]
pub struct ShapeParseError {
    pub text: String,
    pub reason: String,
}

/// Parses the [`Display`](fmt::Display) form, e.g. `(f32[4,4], (i32[], token[]))`.
impl FromStr for Shape {
    type Err = ShapeParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| ShapeParseError {
            text: text.to_string(),
            reason: reason.to_string(),
        };
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let (shape, rest) = parse_shape(&compact).map_err(|r| fail(&r))?;
        if !rest.is_empty() {
            return Err(fail("trailing input"));
        }
        Ok(shape)
    }
}

fn parse_shape(s: &str) -> Result<(Shape, &str), String> {
    if let Some(mut rest) = s.strip_prefix('(') {
        let mut elements = Vec::new();
        if let Some(after) = rest.strip_prefix(')') {
            return Ok((Shape::Tuple(elements), after));
        }
        loop {
            let (element, after) = parse_shape(rest)?;
            elements.push(element);
            if let Some(after) = after.strip_prefix(')') {
                return Ok((Shape::Tuple(elements), after));
            }
            rest = after.strip_prefix(',').ok_or("expected ',' or ')'")?;
        }
    }
    if let Some(rest) = s.strip_prefix("token[]") {
        return Ok((Shape::Token, rest));
    }

    let open = s.find('[').ok_or("expected '['")?;
    let close = s[open..].find(']').ok_or("expected ']'")? + open;
    let element_type = PrimitiveType::from_name(&s[..open])
        .ok_or_else(|| format!("unknown element type '{}'", &s[..open]))?;
    let mut dims = Vec::new();
    let mut dynamic = Vec::new();
    for dim in s[open + 1..close].split(',').filter(|d| !d.is_empty()) {
        let (bound, is_dynamic) = match dim.strip_prefix("<=") {
            Some(bound) => (bound, true),
            None => (dim, false),
        };
        dims.push(bound.parse().map_err(|_| format!("bad dimension '{}'", dim))?);
        dynamic.push(is_dynamic);
    }
    Ok((Shape::Array { element_type, dims, dynamic }, &s[close + 1..]))
}
