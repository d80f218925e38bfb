//! Lowered entry-function signatures.
//!
//! After lowering, the entry function's formal arguments describe every
//! buffer the executable touches. Each argument has a type and a list of
//! named attributes saying what the buffer is: an entry parameter, a constant,
//! an output, or several of these at once.
//!
//! # Text format
//!
//! ```text
//! func @main(%arg0: tensor<4x4xf32> {params = 0},
//!            %arg1: tensor<16xi8> {constant_name = "buffer_for_c0"},
//!            %arg2: tensor<4x4xf32> {output_index = [0], params = 1, must_alias = true},
//!            %arg3: token)
//!     attributes {result_shape = "(f32[4,4])"}
//! ```

pub mod parser;

use std::fmt;

use crate::shape::{PrimitiveType, Shape};

pub use parser::{parse_signature, SignatureParseError};

/// Parameter number of an entry-parameter argument.
pub const ATTR_PARAMS: &str = "params";
/// Shape index within that parameter.
pub const ATTR_PARAM_SHAPE_INDEX: &str = "param_shape_index";
/// Symbol of the constant held by the argument.
pub const ATTR_CONSTANT_NAME: &str = "constant_name";
/// The output must reuse the parameter buffer.
pub const ATTR_MUST_ALIAS: &str = "must_alias";
/// Result shape index the argument produces.
pub const ATTR_OUTPUT_INDEX: &str = "output_index";

/// The only argument attribute keys reconstruction accepts.
pub const ALLOWED_ARG_ATTRIBUTES: [&str; 5] = [
    ATTR_PARAMS,
    ATTR_PARAM_SHAPE_INDEX,
    ATTR_CONSTANT_NAME,
    ATTR_MUST_ALIAS,
    ATTR_OUTPUT_INDEX,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Int(i64),
    Str(String),
    IntList(Vec<i64>),
    Bool(bool),
}

impl AttrValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            AttrValue::IntList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Str(s) => write!(f, "{:?}", s),
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::IntList(v) => {
                write!(f, "[")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", x)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedAttr {
    pub name: String,
    pub value: AttrValue,
}

/// Ranked, statically bounded tensor type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapedType {
    pub element_type: PrimitiveType,
    pub dims: Vec<u64>,
    /// `<=N` dimensions; the bound is stored in `dims`.
    pub dynamic: Vec<bool>,
}

impl ShapedType {
    pub fn new(element_type: PrimitiveType, dims: &[u64]) -> Self {
        Self {
            element_type,
            dims: dims.to_vec(),
            dynamic: vec![false; dims.len()],
        }
    }

    /// `None` when the element count does not fit in a `u64`.
    pub fn num_elements(&self) -> Option<u64> {
        self.dims.iter().try_fold(1u64, |acc, &d| acc.checked_mul(d))
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic.iter().any(|d| *d)
    }

    pub fn to_shape(&self) -> Shape {
        Shape::Array {
            element_type: self.element_type,
            dims: self.dims.clone(),
            dynamic: self.dynamic.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgType {
    Shaped(ShapedType),
    Token,
    Index,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgType::Shaped(ty) => {
                write!(f, "tensor<")?;
                for (dim, dynamic) in ty.dims.iter().zip(&ty.dynamic) {
                    if *dynamic {
                        write!(f, "<=")?;
                    }
                    write!(f, "{}x", dim)?;
                }
                write!(f, "{}>", ty.element_type.name())
            }
            ArgType::Token => write!(f, "token"),
            ArgType::Index => write!(f, "index"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionArg {
    pub name: String,
    pub ty: ArgType,
    pub attrs: Vec<NamedAttr>,
}

impl FunctionArg {
    pub fn new(name: &str, ty: ArgType) -> Self {
        Self { name: name.to_string(), ty, attrs: Vec::new() }
    }

    pub fn with_attr(mut self, name: &str, value: AttrValue) -> Self {
        self.attrs.push(NamedAttr { name: name.to_string(), value });
        self
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|a| a.name == name).map(|a| &a.value)
    }
}

/// The lowered entry function: its name, formal arguments and function attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredFunction {
    pub name: String,
    pub args: Vec<FunctionArg>,
    pub attrs: Vec<NamedAttr>,
}

impl LoweredFunction {
    pub fn new(name: &str, args: Vec<FunctionArg>) -> Self {
        Self { name: name.to_string(), args, attrs: Vec::new() }
    }

    pub fn num_arguments(&self) -> usize {
        self.args.len()
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|a| a.name == name).map(|a| &a.value)
    }
}

impl fmt::Display for LoweredFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func @{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "%{}: {}", arg.name, arg.ty)?;
            write_attrs(f, &arg.attrs, " ")?;
        }
        write!(f, ")")?;
        if !self.attrs.is_empty() {
            write_attrs(f, &self.attrs, " attributes ")?;
        }
        Ok(())
    }
}

fn write_attrs(f: &mut fmt::Formatter<'_>, attrs: &[NamedAttr], lead: &str) -> fmt::Result {
    if attrs.is_empty() {
        return Ok(());
    }
    write!(f, "{}{{", lead)?;
    for (i, attr) in attrs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{} = {}", attr.name, attr.value)?;
    }
    write!(f, "}}")
}
