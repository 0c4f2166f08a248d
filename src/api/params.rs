//! Query-string access shared by the API and stats servers
//!
//! List parameters are accepted both as repeated keys (`?ids=1&ids=2`) and
//! as comma separated values (`?ids=1,2`).

use std::str::FromStr;

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// Last value given for `key`
    pub fn one(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `key`, comma lists split. `None` when the key is absent
    /// or carries only blank values, so `?ids=` places no constraint.
    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        let values: Vec<String> = self
            .pairs
            .iter()
            .filter(|(k, _)| k == key)
            .flat_map(|(_, v)| v.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        (!values.is_empty()).then_some(values)
    }

    pub fn parsed<T>(&self, key: &str) -> ServiceResult<Option<T>>
    where
        T: FromStr,
    {
        self.one(key)
            .map(|value| {
                value.trim().parse::<T>().map_err(|_| {
                    ServiceError::Validation(format!("invalid value '{value}' for '{key}'"))
                })
            })
            .transpose()
    }

    pub fn parsed_list<T>(&self, key: &str) -> ServiceResult<Option<Vec<T>>>
    where
        T: FromStr,
    {
        self.list(key)
            .map(|values| {
                values
                    .iter()
                    .map(|value| {
                        value.parse::<T>().map_err(|_| {
                            ServiceError::Validation(format!(
                                "invalid value '{value}' for '{key}'"
                            ))
                        })
                    })
                    .collect()
            })
            .transpose()
    }

    pub fn parsed_or<T>(&self, key: &str, default: T) -> ServiceResult<T>
    where
        T: FromStr,
    {
        Ok(self.parsed(key)?.unwrap_or(default))
    }

    pub fn require(&self, key: &str) -> ServiceResult<&str> {
        self.one(key)
            .ok_or_else(|| ServiceError::Validation(format!("missing parameter '{key}'")))
    }
}
