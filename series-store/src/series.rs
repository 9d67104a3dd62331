// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::collections::VecDeque;

use parking_lot::RwLock;

use crate::{
    error::{Result, SeriesError},
    snapshot::SeriesSnapshot,
};

#[derive(Debug, Clone, Copy)]
struct Point {
    value: f64,
    timestamp_s: i64,
}

/// Fixed-capacity window of the most recent readings for one metric.
///
/// Values and timestamps live in a single deque of pairs so their lengths cannot diverge. Writers
/// take the lock exclusively for one push plus at most one eviction; readers share it.
#[derive(Debug)]
pub struct BoundedSeries {
    capacity: usize,
    points: RwLock<VecDeque<Point>>,
}

impl BoundedSeries {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SeriesError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            points: RwLock::new(VecDeque::with_capacity(capacity)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends at the tail, evicting from the head once `capacity` is exceeded.
    ///
    /// No ordering or value checks: late timestamps land at the tail and non-finite values are
    /// stored as-is.
    pub fn add(&self, value: f64, timestamp_s: i64) {
        let mut points = self.points.write();
        points.push_back(Point { value, timestamp_s });
        while points.len() > self.capacity {
            points.pop_front();
        }
    }

    /// Independent copy of the window as of one instant.
    pub fn snapshot(&self) -> SeriesSnapshot {
        let points = self.points.read();
        let mut values = Vec::with_capacity(points.len());
        let mut timestamps = Vec::with_capacity(points.len());
        for point in points.iter() {
            values.push(point.value);
            timestamps.push(point.timestamp_s);
        }
        SeriesSnapshot { values, timestamps }
    }

    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }
}
