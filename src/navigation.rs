use serde::Serialize;

use crate::config::ROOT_LABEL;
use crate::formats::CatalogLocation;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("history index {index} out of bounds (history length: {len})")]
    OutOfBounds { index: usize, len: usize },
}

/// Visited catalog locations; the last one is current. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NavigationHistory {
    locations: Vec<CatalogLocation>,
}

impl Default for NavigationHistory {
    fn default() -> Self {
        Self::new(CatalogLocation::root())
    }
}

impl NavigationHistory {
    pub fn new(start: CatalogLocation) -> Self {
        Self {
            locations: vec![start],
        }
    }

    pub fn current(&self) -> &CatalogLocation {
        // `locations` always holds at least the start location.
        &self.locations[self.locations.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn locations(&self) -> &[CatalogLocation] {
        &self.locations
    }

    pub fn can_go_back(&self) -> bool {
        self.locations.len() > 1
    }

    pub fn push(&mut self, location: CatalogLocation) {
        self.locations.push(location);
    }

    /// Truncates so that `index` becomes current.
    pub fn jump_to(&mut self, index: usize) -> Result<(), NavigationError> {
        if index >= self.locations.len() {
            return Err(NavigationError::OutOfBounds {
                index,
                len: self.locations.len(),
            });
        }
        self.locations.truncate(index + 1);
        Ok(())
    }

    /// Returns false at the root.
    pub fn back(&mut self) -> bool {
        if !self.can_go_back() {
            return false;
        }
        self.locations.pop();
        true
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.locations
            .iter()
            .enumerate()
            .map(|(index, location)| Breadcrumb {
                index,
                label: breadcrumb_label(location),
                location: location.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub index: usize,
    pub label: String,
    pub location: CatalogLocation,
}

pub fn breadcrumb_label(location: &CatalogLocation) -> String {
    if location.is_root() {
        return ROOT_LABEL.to_owned();
    }
    location
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .next_back()
        .unwrap_or(location.as_str())
        .to_owned()
}
