//! Parameter expressions and their typed values.
//!
//! Activities declare parameters in the scheme as small expressions. The
//! engine resolves every declared parameter right before each action runs,
//! so property references always observe the current activity state:
//!
//! | Expression      | Resolves to                                     |
//! |-----------------|-------------------------------------------------|
//! | `@@True`        | `ParamValue::Bool(true)`                        |
//! | `@@False`       | `ParamValue::Bool(false)`                       |
//! | `[a,b,c]`       | list of text items `a`, `b`, `c`                |
//! | `@Root.Name`    | property `Name` of the instance root activity   |
//! | `@R.Name`       | same as `@Root.Name`                            |
//! | `@Name`         | property `Name` of the executing activity       |
//! | `@@text`        | literal text `@text`                            |
//! | anything else   | literal text                                    |
//!
//! Time spans (`[d.]hh:mm:ss[.fffffff]`), numbers and enum member names stay
//! text until an action asks for a concrete type through
//! [`Parameters::get`].

mod bag;
mod coerce;
mod expr;
mod properties;
mod timespan;
mod value;

pub use bag::Parameters;
pub use coerce::{FromParam, ParamEnum, enum_from_param};
pub use expr::{Expression, PropertyScope};
pub use properties::Properties;
pub use timespan::{format_timespan, parse_timespan};
pub use value::{ParamValue, SharedList, ToParam};
