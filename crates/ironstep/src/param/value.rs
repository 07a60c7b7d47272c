//! Resolved parameter values.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::timespan::format_timespan;

/// A list value shared by reference.
///
/// Activities that expose a list property hand out clones of the same `Arc`,
/// so a parameter bound to that property refers to the very same collection.
pub type SharedList = Arc<Vec<ParamValue>>;

/// A resolved parameter or property value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Duration(Duration),
    List(SharedList),
}

impl ParamValue {
    /// Build a list value from anything convertible.
    pub fn list<T: ToParam>(items: impl IntoIterator<Item = T>) -> Self {
        ParamValue::List(Arc::new(items.into_iter().map(|i| i.to_param()).collect()))
    }

    /// Name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Null => "null",
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "integer",
            ParamValue::Float(_) => "float",
            ParamValue::Text(_) => "text",
            ParamValue::Duration(_) => "time span",
            ParamValue::List(_) => "list",
        }
    }

    /// Borrow the text, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => f.write_str("null"),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Text(s) => f.write_str(s),
            ParamValue::Duration(d) => f.write_str(&format_timespan(*d)),
            ParamValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Conversion of property values into [`ParamValue`].
///
/// Implemented for the primitive types activities typically expose; the
/// `Properties` derive calls it for every exposed field.
pub trait ToParam {
    fn to_param(&self) -> ParamValue;
}

impl ToParam for ParamValue {
    fn to_param(&self) -> ParamValue {
        self.clone()
    }
}

impl<T: ToParam + ?Sized> ToParam for &T {
    fn to_param(&self) -> ParamValue {
        (**self).to_param()
    }
}

impl ToParam for bool {
    fn to_param(&self) -> ParamValue {
        ParamValue::Bool(*self)
    }
}

macro_rules! int_to_param {
    ($($ty:ty),*) => {$(
        impl ToParam for $ty {
            fn to_param(&self) -> ParamValue {
                i64::try_from(*self)
                    .map(ParamValue::Int)
                    .unwrap_or(ParamValue::Float(*self as f64))
            }
        }
    )*};
}

int_to_param!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl ToParam for f32 {
    fn to_param(&self) -> ParamValue {
        ParamValue::Float(f64::from(*self))
    }
}

impl ToParam for f64 {
    fn to_param(&self) -> ParamValue {
        ParamValue::Float(*self)
    }
}

impl ToParam for str {
    fn to_param(&self) -> ParamValue {
        ParamValue::Text(self.to_owned())
    }
}

impl ToParam for String {
    fn to_param(&self) -> ParamValue {
        ParamValue::Text(self.clone())
    }
}

impl ToParam for Duration {
    fn to_param(&self) -> ParamValue {
        ParamValue::Duration(*self)
    }
}

impl ToParam for SharedList {
    fn to_param(&self) -> ParamValue {
        ParamValue::List(Arc::clone(self))
    }
}

impl<T: ToParam> ToParam for Vec<T> {
    fn to_param(&self) -> ParamValue {
        ParamValue::list(self.iter())
    }
}

impl<T: ToParam> ToParam for Option<T> {
    fn to_param(&self) -> ParamValue {
        match self {
            Some(value) => value.to_param(),
            None => ParamValue::Null,
        }
    }
}
