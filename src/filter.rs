use crate::error::FilterError;
use crate::models::{FilterSpec, SignalRecord};
use crate::normalize::parse_timestamp;

impl FilterSpec {
    /// True when no dimension is constrained.
    pub fn is_empty(&self) -> bool {
        is_unset(&self.sim_operators)
            && is_unset(&self.network_types)
            && is_unset(&self.device_names)
            && self.from.is_none()
            && self.to.is_none()
            && self.battery_min.is_none()
            && self.signal_min.is_none()
    }

    pub fn has_time_range(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err(FilterError::InvertedRange {
                from: from.to_rfc3339(),
                to: to.to_rfc3339(),
            }),
            _ => Ok(()),
        }
    }

    pub fn matches(&self, record: &SignalRecord) -> bool {
        if !allows(&self.sim_operators, &record.sim_operator)
            || !allows(&self.network_types, &record.network_type)
            || !allows(&self.device_names, &record.device_name)
        {
            return false;
        }

        if self.battery_min.is_some_and(|min| record.battery < min)
            || self.signal_min.is_some_and(|min| record.signal < min)
        {
            return false;
        }

        if self.has_time_range() {
            let Some(instant) = record.timestamp.as_deref().and_then(parse_timestamp) else {
                return false;
            };
            if self.from.is_some_and(|from| instant < from)
                || self.to.is_some_and(|to| instant > to)
            {
                return false;
            }
        }

        true
    }
}

/// Keep the records matching `spec`, in input order.
pub fn apply(records: &[SignalRecord], spec: &FilterSpec) -> Vec<SignalRecord> {
    if spec.is_empty() {
        return records.to_vec();
    }

    records
        .iter()
        .filter(|record| spec.matches(record))
        .cloned()
        .collect()
}

fn is_unset(values: &Option<Vec<String>>) -> bool {
    values.as_ref().map_or(true, |values| values.is_empty())
}

fn allows(values: &Option<Vec<String>>, candidate: &str) -> bool {
    match values {
        Some(values) if !values.is_empty() => values.iter().any(|value| value == candidate),
        _ => true,
    }
}
