//! A source whose series have already been decoded.

use std::collections::HashMap;

use super::SeriesSource;
use crate::{config::ParameterRequest, error::ConvertError, series::RawSeries};

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,

    /// Keyed by (group, variable name).
    series: HashMap<(Option<String>, String), RawSeries>,
}

impl MemorySource {
    pub fn new<S: Into<String>>(name: S) -> MemorySource {
        MemorySource {
            name: name.into(),
            series: HashMap::new(),
        }
    }

    /// Add a root-group series under its own name.
    pub fn insert(&mut self, series: RawSeries) {
        self.series.insert((None, series.name.clone()), series);
    }

    pub fn insert_in_group<S: Into<String>>(&mut self, group: S, series: RawSeries) {
        self.series
            .insert((Some(group.into()), series.name.clone()), series);
    }

    pub fn with(mut self, series: RawSeries) -> MemorySource {
        self.insert(series);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(&(None, name.to_string()))
    }
}

impl SeriesSource for MemorySource {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn read_series(&self, request: &ParameterRequest) -> Result<Option<RawSeries>, ConvertError> {
        Ok(self
            .series
            .get(&(request.group.clone(), request.spec.name.clone()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_respects_groups() {
        let mut source = MemorySource::new("mem").with(RawSeries::new("depth", vec![1.0], vec![2.0]));
        source.insert_in_group("CTD", RawSeries::new("temp", vec![1.0], vec![10.0]));

        assert!(source.contains("depth"));
        assert!(source
            .read_series(&ParameterRequest::root("depth"))
            .unwrap()
            .is_some());
        assert!(source
            .read_series(&ParameterRequest::root("temp"))
            .unwrap()
            .is_none());

        let mut grouped = ParameterRequest::root("temp");
        grouped.group = Some("CTD".to_string());
        let temp = source.read_series(&grouped).unwrap().unwrap();
        assert_eq!(temp.values, vec![10.0]);
    }
}
