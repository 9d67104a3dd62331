// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{collections::HashMap, sync::Arc};

use core_types::MetricId;

use crate::{
    error::{Result, SeriesError},
    series::BoundedSeries,
};

/// Fixed set of series built once at startup. There is no way to add or drop a metric afterwards.
#[derive(Debug)]
pub struct SeriesRegistry {
    capacity: usize,
    order: Vec<MetricId>,
    series: HashMap<MetricId, Arc<BoundedSeries>>,
}

impl SeriesRegistry {
    pub fn new<I>(capacity: usize, ids: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<MetricId>,
    {
        if capacity == 0 {
            return Err(SeriesError::ZeroCapacity);
        }
        let mut order = Vec::new();
        let mut series = HashMap::new();
        for id in ids {
            let id = id.into();
            if series.contains_key(&id) {
                return Err(SeriesError::DuplicateMetric { id: id.to_string() });
            }
            series.insert(id.clone(), Arc::new(BoundedSeries::new(capacity)?));
            order.push(id);
        }
        Ok(Self {
            capacity,
            order,
            series,
        })
    }

    pub fn get(&self, id: &str) -> Result<&Arc<BoundedSeries>> {
        self.series
            .get(id)
            .ok_or_else(|| SeriesError::UnknownMetric { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.series.contains_key(id)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Metric ids in registration order.
    pub fn ids(&self) -> &[MetricId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricId, &Arc<BoundedSeries>)> {
        self.order.iter().map(|id| (id, &self.series[id]))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
