use super::{Expression, FromParam, ParamValue, Properties};
use crate::error::{Error, Result};

/// Resolved parameters handed to an activity's action.
///
/// Built fresh by the engine before every action invocation.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    activity: String,
    values: Vec<(String, ParamValue)>,
}

impl Parameters {
    /// Create an empty bag for `activity`.
    pub fn new(activity: impl Into<String>) -> Self {
        Self {
            activity: activity.into(),
            values: Vec::new(),
        }
    }

    /// Resolve every declaration against the executing and root activities.
    ///
    /// The first failing declaration aborts resolution with
    /// [`Error::Binding`].
    pub fn resolve<'a>(
        activity: &str,
        declarations: impl IntoIterator<Item = (&'a str, &'a Expression)>,
        executing: &dyn Properties,
        root: &dyn Properties,
    ) -> Result<Self> {
        let mut params = Self::new(activity);
        for (name, expression) in declarations {
            let value = expression
                .resolve(executing, root)
                .map_err(|reason| Error::binding(activity, name, reason))?;
            params.insert(name, value);
        }
        Ok(params)
    }

    /// Add or replace a value.
    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        let name = name.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.values.push((name, value)),
        }
    }

    /// Get a parameter coerced to `T`.
    ///
    /// Fails with [`Error::Binding`] if the parameter is not declared or
    /// cannot be converted.
    pub fn get<T: FromParam>(&self, name: &str) -> Result<T> {
        let value = self
            .raw(name)
            .ok_or_else(|| Error::binding(&self.activity, name, "parameter is not declared"))?;
        T::from_param(value.clone()).map_err(|reason| Error::binding(&self.activity, name, reason))
    }

    /// Get a parameter coerced to `T`, or `default` if it is not declared.
    pub fn get_or<T: FromParam>(&self, name: &str, default: T) -> Result<T> {
        if self.contains(name) {
            self.get(name)
        } else {
            Ok(default)
        }
    }

    /// The uncoerced value.
    pub fn raw(&self, name: &str) -> Option<&ParamValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.raw(name).is_some()
    }

    /// Activity these parameters belong to.
    pub fn activity(&self) -> &str {
        &self.activity
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }
}
