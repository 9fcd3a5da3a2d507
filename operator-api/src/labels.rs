use std::collections::BTreeMap;

use crate::consts::{API_GROUP, RESOURCE_PLURAL};

/// The labels every operator-owned resource carries, identifying it as
/// managed and pointing back to the cluster that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerLabels {
    pub cluster_name: String,
}

impl OwnerLabels {
    #[must_use]
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
        }
    }

    /// Renders the labels as a `BTreeMap` suitable for `ObjectMeta::labels`.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        let _ = labels.insert("operated-by".to_owned(), API_GROUP.to_owned());
        let _ = labels.insert("heritage".to_owned(), RESOURCE_PLURAL.to_owned());
        let _ = labels.insert("name".to_owned(), self.cluster_name.clone());
        labels
    }

    /// Renders the subset of labels (`operated-by`, `heritage`) used as a
    /// list selector to find all resources owned by this operator,
    /// independent of which cluster they belong to.
    #[must_use]
    pub fn operator_selector() -> String {
        format!("operated-by={API_GROUP},heritage={RESOURCE_PLURAL}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_contains_expected_keys() {
        let labels = OwnerLabels::new("mongo-cluster").to_map();
        assert_eq!(labels.get("name").map(String::as_str), Some("mongo-cluster"));
        assert_eq!(labels.get("operated-by").map(String::as_str), Some(API_GROUP));
        assert_eq!(labels.get("heritage").map(String::as_str), Some(RESOURCE_PLURAL));
    }

    #[test]
    fn selector_is_stable() {
        assert_eq!(
            OwnerLabels::operator_selector(),
            "operated-by=mongodb.com,heritage=mongoclusterconfigurations"
        );
    }
}
