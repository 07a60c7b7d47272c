//! Typed coercion of resolved parameter values.

use std::sync::Arc;
use std::time::Duration;

use super::{ParamValue, SharedList, parse_timespan};

/// Conversion from a resolved [`ParamValue`] into a concrete type.
///
/// Errors are plain reasons; [`Parameters::get`](super::Parameters::get)
/// wraps them into a binding error naming the activity and parameter.
pub trait FromParam: Sized {
    fn from_param(value: ParamValue) -> Result<Self, String>;
}

/// Unit enums whose members bind by name.
///
/// Implemented by `#[derive(ParamEnum)]`, which also provides the
/// [`FromParam`] and [`ToParam`](super::ToParam) impls.
pub trait ParamEnum: Sized + 'static {
    /// Member names in declaration order.
    const VARIANTS: &'static [&'static str];

    /// Look up a member by its exact name.
    fn from_name(name: &str) -> Option<Self>;

    /// Name of this member.
    fn name(&self) -> &'static str;

    /// Member at `index` in declaration order.
    fn from_index(index: usize) -> Option<Self> {
        Self::VARIANTS.get(index).and_then(|name| Self::from_name(name))
    }
}

/// Coerce a value into a [`ParamEnum`].
///
/// Accepts the member name (exact first, then ignoring ASCII case) or its
/// zero-based declaration index.
pub fn enum_from_param<E: ParamEnum>(value: ParamValue) -> Result<E, String> {
    match value {
        ParamValue::Text(text) => {
            let text = text.trim();
            E::from_name(text)
                .or_else(|| {
                    E::VARIANTS
                        .iter()
                        .find(|name| name.eq_ignore_ascii_case(text))
                        .and_then(|name| E::from_name(name))
                })
                .ok_or_else(|| {
                    format!("`{text}` is not one of {}", E::VARIANTS.join(", "))
                })
        }
        ParamValue::Int(index) => usize::try_from(index)
            .ok()
            .and_then(E::from_index)
            .ok_or_else(|| format!("{index} is not a member index")),
        other => Err(mismatch(&other, "enum member")),
    }
}

fn mismatch(value: &ParamValue, expected: &str) -> String {
    format!("cannot convert {} `{value}` to {expected}", value.type_name())
}

impl FromParam for ParamValue {
    fn from_param(value: ParamValue) -> Result<Self, String> {
        Ok(value)
    }
}

impl FromParam for bool {
    fn from_param(value: ParamValue) -> Result<Self, String> {
        match value {
            ParamValue::Bool(b) => Ok(b),
            ParamValue::Text(ref text) => match text.trim() {
                t if t.eq_ignore_ascii_case("true") => Ok(true),
                t if t.eq_ignore_ascii_case("false") => Ok(false),
                _ => Err(mismatch(&value, "bool")),
            },
            other => Err(mismatch(&other, "bool")),
        }
    }
}

macro_rules! int_from_param {
    ($($ty:ty),*) => {$(
        impl FromParam for $ty {
            fn from_param(value: ParamValue) -> Result<Self, String> {
                let target = stringify!($ty);
                match value {
                    ParamValue::Int(i) => <$ty>::try_from(i)
                        .map_err(|_| format!("{i} is out of range for {target}")),
                    ParamValue::Float(f) if f.fract() == 0.0 => <$ty>::try_from(f as i64)
                        .map_err(|_| format!("{f} is out of range for {target}")),
                    ParamValue::Text(ref text) => text
                        .trim()
                        .parse::<$ty>()
                        .map_err(|_| mismatch(&value, target)),
                    other => Err(mismatch(&other, target)),
                }
            }
        }
    )*};
}

int_from_param!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl FromParam for f64 {
    fn from_param(value: ParamValue) -> Result<Self, String> {
        match value {
            ParamValue::Float(f) => Ok(f),
            ParamValue::Int(i) => Ok(i as f64),
            ParamValue::Text(ref text) => text.trim().parse().map_err(|_| mismatch(&value, "f64")),
            other => Err(mismatch(&other, "f64")),
        }
    }
}

impl FromParam for f32 {
    fn from_param(value: ParamValue) -> Result<Self, String> {
        f64::from_param(value).map(|f| f as f32)
    }
}

impl FromParam for String {
    fn from_param(value: ParamValue) -> Result<Self, String> {
        match value {
            ParamValue::Text(text) => Ok(text),
            ParamValue::Null => Err(mismatch(&value, "text")),
            other => Ok(other.to_string()),
        }
    }
}

impl FromParam for Duration {
    fn from_param(value: ParamValue) -> Result<Self, String> {
        match value {
            ParamValue::Duration(d) => Ok(d),
            ParamValue::Text(text) => parse_timespan(&text),
            ParamValue::Int(ms) => u64::try_from(ms)
                .map(Duration::from_millis)
                .map_err(|_| format!("negative duration {ms}ms is not supported")),
            other => Err(mismatch(&other, "time span")),
        }
    }
}

impl FromParam for SharedList {
    fn from_param(value: ParamValue) -> Result<Self, String> {
        match value {
            ParamValue::List(list) => Ok(list),
            other => Err(mismatch(&other, "list")),
        }
    }
}

impl<T: FromParam> FromParam for Vec<T> {
    fn from_param(value: ParamValue) -> Result<Self, String> {
        let list = SharedList::from_param(value)?;
        let items = Arc::try_unwrap(list).unwrap_or_else(|shared| (*shared).clone());
        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| T::from_param(item).map_err(|reason| format!("item {i}: {reason}")))
            .collect()
    }
}

impl<T: FromParam> FromParam for Option<T> {
    fn from_param(value: ParamValue) -> Result<Self, String> {
        match value {
            ParamValue::Null => Ok(None),
            other => T::from_param(other).map(Some),
        }
    }
}
