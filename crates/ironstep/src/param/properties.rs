use super::ParamValue;

/// Named readable properties of an activity.
///
/// `@Name` and `@Root.Name` parameter expressions read through this trait.
/// Usually derived:
///
/// ```ignore
/// use ironstep::Properties;
///
/// #[derive(Default, Properties)]
/// struct Review {
///     approver: String,            // exposed as `Approver`
///     #[property(rename = "Due")]
///     due_in: std::time::Duration,
///     #[property(skip)]
///     cache: Vec<u8>,
/// }
/// ```
pub trait Properties {
    /// Read property `name`, or `None` if the activity exposes no such property.
    fn property(&self, name: &str) -> Option<ParamValue> {
        let _ = name;
        None
    }

    /// Names of every exposed property.
    fn property_names(&self) -> &'static [&'static str] {
        &[]
    }
}

/// An activity without properties.
impl Properties for () {}
