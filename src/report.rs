//! Country → region → city rollup over a snapshot of visits
//!
//! Counts are the number of distinct visit records under a node, not the sum
//! of their `visit_count`. Node order follows first encounter in the input.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::geo::UNKNOWN;
use crate::visits::VisitRecord;

/// One flattened visit with a known location
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitEntry {
    pub origin: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub count: u64,
    pub last_visit: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CityNode {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionNode {
    pub name: String,
    pub count: u64,
    pub cities: Vec<CityNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryNode {
    pub name: String,
    pub count: u64,
    pub regions: Vec<RegionNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitReport {
    pub visits: Vec<VisitEntry>,
    pub origins: Vec<String>,
    pub countries: Vec<CountryNode>,
}

pub fn build_report(records: &[VisitRecord]) -> VisitReport {
    let visits: Vec<VisitEntry> = records
        .iter()
        .map(flatten)
        .filter(is_located)
        .collect();

    let mut origins: Vec<String> = Vec::new();
    for entry in &visits {
        if !origins.contains(&entry.origin) {
            origins.push(entry.origin.clone());
        }
    }

    let countries = rollup(&visits);

    VisitReport {
        visits,
        origins,
        countries,
    }
}

fn flatten(record: &VisitRecord) -> VisitEntry {
    VisitEntry {
        origin: record
            .origin
            .clone()
            .unwrap_or_else(|| UNKNOWN.to_string()),
        country: record.geo.country.clone(),
        region: record.geo.region.clone(),
        city: record.geo.city.clone(),
        count: 1,
        last_visit: record.last_seen,
    }
}

fn is_located(entry: &VisitEntry) -> bool {
    [&entry.origin, &entry.country, &entry.region, &entry.city]
        .iter()
        .all(|f| f.as_str() != UNKNOWN)
}

/// Find the node named `name`, appending a fresh one if absent
fn node_mut<'a, T>(
    nodes: &'a mut Vec<T>,
    name: &str,
    name_of: impl Fn(&T) -> &str,
    create: impl FnOnce() -> T,
) -> &'a mut T {
    let idx = match nodes.iter().position(|n| name_of(n) == name) {
        Some(idx) => idx,
        None => {
            nodes.push(create());
            nodes.len() - 1
        }
    };
    &mut nodes[idx]
}

fn rollup(entries: &[VisitEntry]) -> Vec<CountryNode> {
    let mut countries: Vec<CountryNode> = Vec::new();

    for entry in entries {
        let country = node_mut(
            &mut countries,
            &entry.country,
            |c| c.name.as_str(),
            || CountryNode {
                name: entry.country.clone(),
                count: 0,
                regions: Vec::new(),
            },
        );
        country.count += entry.count;

        let region = node_mut(
            &mut country.regions,
            &entry.region,
            |r| r.name.as_str(),
            || RegionNode {
                name: entry.region.clone(),
                count: 0,
                cities: Vec::new(),
            },
        );
        region.count += entry.count;

        let city = node_mut(
            &mut region.cities,
            &entry.city,
            |c| c.name.as_str(),
            || CityNode {
                name: entry.city.clone(),
                count: 0,
            },
        );
        city.count += entry.count;
    }

    countries
}
