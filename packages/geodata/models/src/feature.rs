//! Typed `GeoJSON` feature properties.
//!
//! Boundary files carry a handful of well-known properties per feature.
//! Those are typed fields here; anything else lands in [`FeatureProperties::extra`]
//! so it survives a read/write cycle without being interpreted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Properties of one geography feature in a boundary file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    /// Geography code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geocode: Option<String>,
    /// Geography type name (e.g. `LSOA`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geotype: Option<String>,
    /// English name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ename: Option<String>,
    /// Welsh name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wname: Option<String>,
    /// Properties without a typed field.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FeatureProperties {
    /// Returns `(geocode, geotype)` when both are present and non-empty.
    #[must_use]
    pub fn code_and_type(&self) -> Option<(&str, &str)> {
        let code = self.geocode.as_deref().filter(|s| !s.is_empty())?;
        let geotype = self.geotype.as_deref().filter(|s| !s.is_empty())?;
        Some((code, geotype))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_unknown_properties() {
        let json = serde_json::json!({
            "geocode": "E01000001",
            "geotype": "LSOA",
            "ename": "City of London 001A",
            "lsoa11nmw": "City of London 001A",
            "objectid": 1
        });

        let props: FeatureProperties = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(props.code_and_type(), Some(("E01000001", "LSOA")));
        assert_eq!(props.wname, None);
        assert_eq!(props.extra.len(), 2);
        assert_eq!(props.extra["objectid"], serde_json::json!(1));

        assert_eq!(serde_json::to_value(&props).unwrap(), json);
    }

    #[test]
    fn missing_code_or_type() {
        let props: FeatureProperties =
            serde_json::from_value(serde_json::json!({ "geocode": "E01000001", "geotype": "" }))
                .unwrap();
        assert_eq!(props.code_and_type(), None);
    }
}
